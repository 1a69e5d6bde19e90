use enigo::Key;

// Named keys accepted next to plain single characters
const NAMED_KEYS: [(&str, Key); 26] = [
    ("space", Key::Space),
    ("enter", Key::Return),
    ("return", Key::Return),
    ("tab", Key::Tab),
    ("esc", Key::Escape),
    ("escape", Key::Escape),
    ("backspace", Key::Backspace),
    ("up", Key::UpArrow),
    ("down", Key::DownArrow),
    ("left", Key::LeftArrow),
    ("right", Key::RightArrow),
    ("shift", Key::Shift),
    ("ctrl", Key::Control),
    ("alt", Key::Alt),
    ("f1", Key::F1),
    ("f2", Key::F2),
    ("f3", Key::F3),
    ("f4", Key::F4),
    ("f5", Key::F5),
    ("f6", Key::F6),
    ("f7", Key::F7),
    ("f8", Key::F8),
    ("f9", Key::F9),
    ("f10", Key::F10),
    ("f11", Key::F11),
    ("f12", Key::F12),
];

/// Turns a configured binding into a key. Empty or unknown bindings are unbound.
pub fn parse_key_binding(binding: &str) -> Option<Key> {
    let binding = binding.trim();

    let mut chars = binding.chars();

    match (chars.next(), chars.next()) {
        (None, _) => None,
        (Some(character), None) => Some(Key::Unicode(character.to_ascii_lowercase())),
        _ => {
            let lowercase = binding.to_lowercase();

            NAMED_KEYS
                .iter()
                .find(|(name, _)| *name == lowercase)
                .map(|(_, key)| *key)
        }
    }
}

/// Human readable name of a key, used in logs and the control panel.
pub fn describe_key(key: &Key) -> String {
    match key {
        Key::Unicode(letter) => format!("Key '{}'", letter.to_uppercase()),
        _ => format!("{:?}", key),
    }
}

/// Names of the serial ports the OS currently reports, empty if enumeration fails.
pub fn available_port_names() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|port| port.port_name).collect(),
        Err(e) => {
            crate::log_warn!("Could not list serial ports: {}", e);

            Vec::new()
        }
    }
}
