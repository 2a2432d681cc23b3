//! Newline-delimited JSON framing for the bridge socket and the MCP stream.
//!
//! Wire format: one JSON document per line, terminated by `\n`.

use crate::error::CapiResult;
use serde_json::Value;

/// Encode a serializable value as a single JSON line (trailing `\n` included).
pub fn encode_line<T: serde::Serialize>(value: &T) -> CapiResult<Vec<u8>> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse bytes as JSON, falling back to the raw text as a JSON string.
///
/// A peer that answers with something other than JSON still yields a value
/// the caller can surface.
pub fn parse_lenient(data: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(data) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(data).into_owned()),
    }
}

/// Streaming line decoder: accumulates bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed bytes into the decoder and return every complete line.
    ///
    /// Lines are returned without their terminator; a trailing `\r` is trimmed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(data);
        let mut lines = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }

        lines
    }

    /// Take whatever has been buffered without a terminating newline.
    pub fn take_remaining(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Number of bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_appends_single_newline() {
        let line = encode_line(&json!({"a": "x\ny"})).unwrap();
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn partial_line_is_held_until_newline() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"{\"ok\":").is_empty());
        assert_eq!(decoder.pending(), 6);

        let lines = decoder.feed(b"true}\r\n{\"next\"");
        assert_eq!(lines, vec![b"{\"ok\":true}".to_vec()]);
        assert_eq!(decoder.take_remaining(), b"{\"next\"".to_vec());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn several_lines_in_one_chunk() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.feed(b"1\n2\n\n3");
        assert_eq!(lines, vec![b"1".to_vec(), b"2".to_vec(), Vec::new()]);

        assert_eq!(decoder.pending(), 1);
        assert_eq!(decoder.take_remaining(), b"3".to_vec());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn lenient_parse_falls_back_to_text() {
        assert_eq!(parse_lenient(br#"{"result":3}"#), json!({"result": 3}));
        assert_eq!(parse_lenient(b"not json"), json!("not json"));
    }
}
