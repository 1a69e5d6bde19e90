use std::collections::HashMap;

use crate::{
    constants::{MOTION_X_TAG, MOTION_Y_TAG, SERIAL_LINE_LIMIT, TAG_SEP},
    log_warn,
};

/// One decoded serial line. A tag that is missing or malformed is simply absent,
/// it is never reported as zero.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Telegram {
    fields: HashMap<String, i32>,
}

impl Telegram {
    /// Value of a field by its bare name (`"X"`, `"D0"`...).
    pub fn get(&self, name: &str) -> Option<i32> {
        self.fields.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, value: i32) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Motion sample, only when the line carried both axes.
    pub fn motion(&self) -> Option<MotionSample> {
        Some(MotionSample {
            dx: self.get(MOTION_X_TAG)?,
            dy: self.get(MOTION_Y_TAG)?,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MotionSample {
    pub dx: i32,
    pub dy: i32,
}

impl MotionSample {
    pub fn is_still(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }

    /// Cursor delta: the glove's Y axis drives horizontal motion, X drives
    /// (inverted) vertical motion.
    pub fn cursor_delta(&self, sensitivity: f64) -> (f64, f64) {
        (
            self.dy as f64 * sensitivity,
            -(self.dx as f64) * sensitivity,
        )
    }
}

/// Turns one trimmed line into a telegram. Kept behind a trait so a stricter
/// tokenizer can replace the substring search without touching the mapper or driver.
pub trait LineDecoder: Send {
    fn decode(&self, line: &str) -> Telegram;
}

/// Best-effort decoder: looks for every known `NAME:` tag anywhere in the line
/// and reads the whitespace-delimited integer right after it.
#[derive(Debug, Clone)]
pub struct TagDecoder {
    names: Vec<String>,
}

impl TagDecoder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Decoder for the motion axes plus the given channel names.
    pub fn with_channels<'a, I>(channels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names = vec![MOTION_X_TAG.to_string(), MOTION_Y_TAG.to_string()];

        for name in channels {
            if !names.iter().any(|known| known == name) {
                names.push(name.to_string());
            }
        }

        Self { names }
    }
}

impl LineDecoder for TagDecoder {
    fn decode(&self, line: &str) -> Telegram {
        let mut telegram = Telegram::default();

        for name in &self.names {
            let tag = format!("{}{}", name, TAG_SEP);

            if let Some(value) = extract_field(line, &tag) {
                telegram.insert(name, value);
            }
        }

        telegram
    }
}

/// Integer right after the first occurrence of `tag`, up to the next whitespace.
/// `None` if the tag is missing or the token isn't a signed integer.
pub fn extract_field(line: &str, tag: &str) -> Option<i32> {
    if tag.is_empty() {
        return None;
    }

    let (_, rest) = line.split_once(tag)?;

    rest.split_whitespace().next()?.parse::<i32>().ok()
}

/// Reassembles newline-terminated lines out of arbitrary read chunks.
/// Serial reads can stop mid-line, the tail is kept until its newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);

        // No newline in sight, whatever this is it isn't a telegram
        if self.pending.len() > SERIAL_LINE_LIMIT && !self.pending.contains(&b'\n') {
            log_warn!(
                "Discarding {} bytes received without a line ending",
                self.pending.len()
            );

            self.pending.clear();
        }
    }

    /// Next complete line, trimmed. Invalid UTF-8 is replaced rather than rejected
    /// so that a noisy byte only spoils the field it lands in.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&byte| byte == b'\n')?;

        let line: Vec<u8> = self.pending.drain(..=end).collect();

        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glove_decoder() -> TagDecoder {
        TagDecoder::with_channels(["D0", "D1", "D2", "D3", "D4"])
    }

    #[test]
    fn decodes_every_tag_in_a_line() {
        let telegram = glove_decoder().decode("X:12 Y:-4 D0:703");

        assert_eq!(telegram.get("X"), Some(12));
        assert_eq!(telegram.get("Y"), Some(-4));
        assert_eq!(telegram.get("D0"), Some(703));

        for name in ["D1", "D2", "D3", "D4"] {
            assert_eq!(telegram.get(name), None);
        }
    }

    #[test]
    fn field_order_does_not_matter() {
        let telegram = glove_decoder().decode("D4:10 D0:20 Y:3 X:1");

        assert_eq!(telegram.len(), 4);
        assert_eq!(telegram.motion(), Some(MotionSample { dx: 1, dy: 3 }));
    }

    #[test]
    fn malformed_tokens_are_dropped_not_fatal() {
        let decoder = glove_decoder();

        assert_eq!(decoder.decode("D0:abc").get("D0"), None);
        assert!(decoder.decode("garbage").is_empty());

        let telegram = decoder.decode("X:1x Y:2 D0:");
        assert_eq!(telegram.get("X"), None);
        assert_eq!(telegram.get("Y"), Some(2));
        assert_eq!(telegram.get("D0"), None);
        assert_eq!(telegram.motion(), None);
    }

    #[test]
    fn truncated_trailing_field_only_loses_that_field() {
        let telegram = glove_decoder().decode("X:4 Y:5 D0:61\u{fffd}");

        assert_eq!(telegram.motion(), Some(MotionSample { dx: 4, dy: 5 }));
        assert_eq!(telegram.get("D0"), None);
    }

    #[test]
    fn extract_field_reads_up_to_whitespace() {
        assert_eq!(extract_field("D1:480\tD2:1", "D1:"), Some(480));
        assert_eq!(extract_field("D1: 480", "D1:"), Some(480));
        assert_eq!(extract_field("D1:480", "D2:"), None);
        assert_eq!(extract_field("D1:480", ""), None);
    }

    #[test]
    fn motion_maps_axes_onto_the_cursor() {
        let (x, y) = MotionSample { dx: 3, dy: 0 }.cursor_delta(0.8);

        assert_eq!(x, 0.0);
        assert!((y + 2.4).abs() < 1e-9);
        assert!(MotionSample::default().is_still());
    }

    #[test]
    fn line_buffer_joins_split_reads() {
        let mut buffer = LineBuffer::new();

        buffer.push(b"X:1 Y:");
        assert_eq!(buffer.next_line(), None);

        buffer.push(b"2 D0:5\r\nD1:");
        assert_eq!(buffer.next_line().as_deref(), Some("X:1 Y:2 D0:5"));
        assert_eq!(buffer.next_line(), None);

        buffer.push(b"7\n\n");
        assert_eq!(buffer.next_line().as_deref(), Some("D1:7"));
        assert_eq!(buffer.next_line().as_deref(), Some(""));
    }

    #[test]
    fn line_buffer_survives_invalid_utf8_and_runaway_input() {
        let mut buffer = LineBuffer::new();

        buffer.push(&[b'D', b'0', b':', 0xff, b'\n']);
        let line = buffer.next_line().unwrap();
        assert_eq!(glove_decoder().decode(&line).get("D0"), None);

        buffer.push(&vec![b'a'; SERIAL_LINE_LIMIT + 1]);
        buffer.push(b"D2:9\n");
        assert_eq!(buffer.next_line().as_deref(), Some("D2:9"));
    }
}
