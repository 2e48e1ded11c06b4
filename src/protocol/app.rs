//! App-facing codec.
//!
//! Frame grammar: `<json>X`. Server-to-app frames carry a telemetry sample,
//! app-to-server frames a command (with the optional `type` discriminant
//! handled by [`WearableCommand`]'s deserializer).

use super::data::{WearableCommand, WearableSample};
use super::ProtocolError;

pub const MSG_DELIMITER: char = 'X';

/// Stateful decoder/encoder for the app wire format.
#[derive(Debug, Default)]
pub struct AppCodec {
    buffer: String,
}

impl AppCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw socket bytes to the decode buffer.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(data));
    }

    pub fn push_str(&mut self, data: &str) {
        self.buffer.push_str(data);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Decodes at most one command. Without a delimiter the frame is not yet
    /// complete and the buffer is kept; a complete but unparsable frame is
    /// consumed and reported as `None`.
    pub fn decode_command(&mut self) -> Option<WearableCommand> {
        if self.buffer.is_empty() {
            return None;
        }
        let end = self.buffer.find(MSG_DELIMITER)?;
        let payload: String = self.buffer[..end].to_string();
        self.buffer.drain(..=end);
        serde_json::from_str(&payload).ok()
    }

    /// Encodes a telemetry sample followed by the frame delimiter.
    pub fn encode_sample(&self, sample: &WearableSample) -> Result<String, ProtocolError> {
        let payload = serde_json::to_string(sample)?;
        Ok(format!("{payload}{MSG_DELIMITER}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::data::{Color, ColorCommand, ReassignIdCommand};

    #[test]
    fn encoded_sample_ends_with_delimiter() {
        let codec = AppCodec::new();
        let frame = codec.encode_sample(&WearableSample::default()).unwrap();
        assert!(frame.ends_with(MSG_DELIMITER));
        assert!(frame.contains("heartRate"));
    }

    #[test]
    fn tagged_color_command_decodes() {
        let mut codec = AppCodec::new();
        codec.push_str(r#"{"type":"color","id":1,"color":{"r":255,"g":0,"b":0}}X"#);
        assert_eq!(
            codec.decode_command(),
            Some(WearableCommand::Color(ColorCommand {
                id: 1,
                color: Color::new(255, 0, 0),
            }))
        );
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn legacy_untagged_command_defaults_to_color() {
        let mut codec = AppCodec::new();
        codec.push_str(r#"{"id":6,"color":{"r":9,"g":8,"b":7}}X"#);
        assert_eq!(
            codec.decode_command(),
            Some(WearableCommand::Color(ColorCommand {
                id: 6,
                color: Color::new(9, 8, 7),
            }))
        );
    }

    #[test]
    fn id_command_decodes() {
        let mut codec = AppCodec::new();
        codec.push_str(r#"{"type":"id","id":2,"newId":11}X"#);
        assert_eq!(
            codec.decode_command(),
            Some(WearableCommand::ReassignId(ReassignIdCommand {
                id: 2,
                new_id: 11,
            }))
        );
    }

    #[test]
    fn frame_without_delimiter_waits_for_more_input() {
        let mut codec = AppCodec::new();
        codec.push_str(r#"{"id":1"#);
        assert_eq!(codec.decode_command(), None);
        assert!(codec.buffered() > 0);

        codec.push_str(r#"}X"#);
        assert!(codec.decode_command().is_some());
    }

    #[test]
    fn fragmented_byte_at_a_time_decode() {
        let frame = r#"{"type":"id","id":1,"newId":4}X"#;
        let mut codec = AppCodec::new();
        for (i, byte) in frame.as_bytes().iter().enumerate() {
            codec.push_bytes(std::slice::from_ref(byte));
            let decoded = codec.decode_command();
            if i + 1 < frame.len() {
                assert_eq!(decoded, None);
            } else {
                assert_eq!(
                    decoded,
                    Some(WearableCommand::ReassignId(ReassignIdCommand {
                        id: 1,
                        new_id: 4,
                    }))
                );
            }
        }
    }

    #[test]
    fn unparsable_frame_is_consumed() {
        let mut codec = AppCodec::new();
        codec.push_str("not jsonX");
        codec.push_str(r#"{"id":3}X"#);
        assert_eq!(codec.decode_command(), None);
        assert_eq!(
            codec.decode_command(),
            Some(WearableCommand::Color(ColorCommand {
                id: 3,
                color: Color::default(),
            }))
        );
    }
}
