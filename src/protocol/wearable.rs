//! Device-facing codec.
//!
//! Frame grammar: `$<type>:<len>:<payload>&` where `<len>` is the payload's
//! character count and `<type>` is one of [`MSG_TYPE_STATUS`],
//! [`MSG_TYPE_COLOR_CMD`], [`MSG_TYPE_ID_CMD`]. Bytes before the next `$` are
//! garbage from a corrupted stream and are dropped; a frame whose declared
//! length does not match its payload is consumed and discarded, never retried.

use super::data::{ColorCommand, ReassignIdCommand, WearableCommand, WearableSample};
use super::ProtocolError;

pub const MSG_START: char = '$';
pub const MSG_DELIMITER: char = ':';
pub const MSG_END: char = '&';

pub const MSG_TYPE_STATUS: char = 's';
pub const MSG_TYPE_COLOR_CMD: char = 'c';
pub const MSG_TYPE_ID_CMD: char = 'i';

/// Stateful decoder/encoder for the wearable wire format.
#[derive(Debug, Default)]
pub struct WearableCodec {
    buffer: String,
}

impl WearableCodec {
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

    /// Decodes at most one telemetry sample. `None` means either "frame not
    /// yet complete" or "a frame was consumed but unusable"; call again after
    /// the next read.
    pub fn decode_sample(&mut self) -> Option<WearableSample> {
        let (msg_type, payload) = self.next_frame()?;
        if msg_type != MSG_TYPE_STATUS {
            return None;
        }
        serde_json::from_str(&payload).ok()
    }

    /// Decodes at most one command (the wearable side of the link). The frame
    /// type char selects the variant; anything else fails the decode.
    pub fn decode_command(&mut self) -> Option<WearableCommand> {
        let (msg_type, payload) = self.next_frame()?;
        match msg_type {
            MSG_TYPE_COLOR_CMD => serde_json::from_str::<ColorCommand>(&payload)
                .ok()
                .map(WearableCommand::Color),
            MSG_TYPE_ID_CMD => serde_json::from_str::<ReassignIdCommand>(&payload)
                .ok()
                .map(WearableCommand::ReassignId),
            _ => None,
        }
    }

    /// Encodes a telemetry sample as a status frame.
    pub fn encode_sample(&self, sample: &WearableSample) -> Result<String, ProtocolError> {
        let payload = serde_json::to_string(sample)?;
        encode_frame(MSG_TYPE_STATUS, &payload)
    }

    /// Encodes a command with the type char matching its variant.
    pub fn encode_command(&self, cmd: &WearableCommand) -> Result<String, ProtocolError> {
        let msg_type = match cmd {
            WearableCommand::Color(_) => MSG_TYPE_COLOR_CMD,
            WearableCommand::ReassignId(_) => MSG_TYPE_ID_CMD,
        };
        let payload = serde_json::to_string(cmd)?;
        encode_frame(msg_type, &payload)
    }

    /// Extracts the next complete frame, resyncing past garbage. Consumes the
    /// frame from the buffer even when it turns out to be malformed.
    fn next_frame(&mut self) -> Option<(char, String)> {
        if self.buffer.is_empty() {
            return None;
        }

        let start = match self.buffer.find(MSG_START) {
            Some(idx) => idx,
            None => {
                // nothing but garbage
                self.buffer.clear();
                return None;
            }
        };
        if start > 0 {
            self.buffer.drain(..start);
        }

        // The terminator must come after the start marker.
        let end = match self.buffer[MSG_START.len_utf8()..].find(MSG_END) {
            Some(idx) => idx + MSG_START.len_utf8(),
            None => return None,
        };

        let frame: String = self.buffer[MSG_START.len_utf8()..end].to_string();
        self.buffer.drain(..=end);

        let (msg_type, declared_len, payload) = split_frame(&frame)?;
        if payload.chars().count() != declared_len {
            return None;
        }
        Some((msg_type, payload))
    }
}

/// Splits `<type>:<len>:<payload>`; the type must be a single char and the
/// length field non-empty and numeric.
fn split_frame(frame: &str) -> Option<(char, usize, String)> {
    let del1 = frame.find(MSG_DELIMITER)?;
    if del1 == 0 {
        return None;
    }
    let rest = &frame[del1 + 1..];
    let del2 = rest.find(MSG_DELIMITER)?;
    if del2 == 0 {
        return None;
    }

    let mut type_chars = frame[..del1].chars();
    let msg_type = type_chars.next()?;
    if type_chars.next().is_some() {
        return None;
    }

    let declared_len: usize = rest[..del2].trim().parse().ok()?;
    Some((msg_type, declared_len, rest[del2 + 1..].to_string()))
}

fn encode_frame(msg_type: char, payload: &str) -> Result<String, ProtocolError> {
    if payload.trim().is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    Ok(format!(
        "{}{}{}{}{}{}{}",
        MSG_START,
        msg_type,
        MSG_DELIMITER,
        payload.chars().count(),
        MSG_DELIMITER,
        payload,
        MSG_END
    ))
}
