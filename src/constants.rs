// General
pub const APP_NAME: &str = "GyroGlove";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LEGACY_CONFIG_FILE_NAME: &str = "configs.glv"; // JSON file written by older releases

// Serial
pub const DEFAULT_COM_PORT: &str = "COM9";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
pub const SERIAL_READ_TIMEOUT: u64 = 10; // in ms, keeps the stop flag responsive with no data
pub const SERIAL_SETTLE_DELAY: u64 = 1000; // in ms, boards reset when the port is opened
pub const SERIAL_READ_CHUNK: usize = 64;
/// Frames queued for a slow observer before new ones are dropped
pub const FRAME_QUEUE_DEPTH: usize = 256;
pub const SERIAL_LINE_LIMIT: usize = 1024; // Bytes kept without seeing a newline before giving up

// Telegram
pub const MOTION_X_TAG: &str = "X";
pub const MOTION_Y_TAG: &str = "Y";
pub const TAG_SEP: &str = ":";

// Channels
pub const CHANNEL_COUNT: usize = 5;
pub const ANALOG_MAX: i32 = 1024; // 10-bit ADC
pub const DEFAULT_CHANNELS: [(&str, i32); CHANNEL_COUNT] = [
    ("D0", 630),
    ("D1", 480),
    ("D2", 480),
    ("D3", 480),
    ("D4", 600),
];
pub const FINGER_NAMES: [&str; CHANNEL_COUNT] = ["Index", "Middle", "Ring", "Thumb", "Pinky"];

// Acquisition
pub const DEFAULT_SENSITIVITY: f64 = 0.8;
pub const DEFAULT_POLL_INTERVAL: u64 = 1; // in ms
pub const DEFAULT_REPEAT_PERIOD_TICKS: u32 = 5; // ≈ 5 poll intervals between repeated presses
pub const DEFAULT_STOP_GRACE: u64 = 2000; // in ms

// Control panel
pub const APP_MIN_WIDTH: i32 = 760;
pub const APP_MIN_HEIGHT: i32 = 520;
pub const PANEL_REFRESH_INTERVAL: u64 = 16; // in ms (16 ≈ 60FPS)
