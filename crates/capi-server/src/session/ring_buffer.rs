//! Bounded text buffer holding a terminal's recent output.
//!
//! Stores the last N characters a session produced so that reads can be
//! served at any time without the server keeping unbounded history.

use capi_core::sanitize::window_lines;

/// Default capacity in characters.
pub const DEFAULT_CAPACITY: usize = 200_000;

/// An append-only text buffer capped at `capacity` characters.
///
/// When an append pushes the total over capacity, the oldest characters are
/// dropped; the newest are always kept.
#[derive(Debug)]
pub struct RingBuffer {
    buf: String,
    capacity: usize,
    /// Characters currently stored (`buf.chars().count()`, tracked incrementally).
    chars: usize,
    /// Total characters ever appended.
    total_written: u64,
}

impl RingBuffer {
    /// Create a new buffer with the given capacity in characters.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: String::new(),
            capacity,
            chars: 0,
            total_written: 0,
        }
    }

    /// Append text, trimming the oldest characters if capacity is exceeded.
    pub fn append(&mut self, text: &str) {
        let incoming = text.chars().count();
        self.total_written += incoming as u64;
        if self.capacity == 0 || incoming == 0 {
            return;
        }

        if incoming >= self.capacity {
            let start = byte_offset(text, incoming - self.capacity);
            self.buf.clear();
            self.buf.push_str(&text[start..]);
            self.chars = self.capacity;
            return;
        }

        self.buf.push_str(text);
        self.chars += incoming;

        if self.chars > self.capacity {
            let cut = byte_offset(&self.buf, self.chars - self.capacity);
            self.buf.drain(..cut);
            self.chars = self.capacity;
        }
    }

    /// Copy of everything currently buffered, oldest first.
    pub fn snapshot(&self) -> String {
        self.buf.clone()
    }

    /// Copy of the buffered text, optionally limited to the trailing `lines`.
    pub fn snapshot_window(&self, lines: Option<i64>) -> String {
        window_lines(&self.buf, lines)
    }

    /// Number of characters currently stored.
    pub fn len(&self) -> usize {
        self.chars
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Total characters ever appended through this buffer.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Discard all buffered text.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.chars = 0;
    }
}

/// Byte offset of the `n`th character of `s` (or `s.len()` past the end).
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_append_snapshot() {
        let mut rb = RingBuffer::new(10);
        rb.append("hello");
        assert_eq!(rb.snapshot(), "hello");
        assert_eq!(rb.len(), 5);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut rb = RingBuffer::new(5);
        rb.append("abcde");
        rb.append("fg");
        assert_eq!(rb.snapshot(), "cdefg");
        assert_eq!(rb.len(), 5);
        assert_eq!(rb.total_written(), 7);
    }

    #[test]
    fn single_append_longer_than_capacity_keeps_tail() {
        let mut rb = RingBuffer::new(4);
        rb.append("xy");
        rb.append("0123456789");
        assert_eq!(rb.snapshot(), "6789");
    }

    #[test]
    fn capacity_never_exceeded() {
        let mut rb = RingBuffer::new(37);
        let mut expected = String::new();
        for i in 0..200 {
            let chunk = format!("{i}-{}\n", "z".repeat(i % 9));
            rb.append(&chunk);
            expected.push_str(&chunk);
            assert!(rb.len() <= rb.capacity);
        }
        let tail: String = expected
            .chars()
            .skip(expected.chars().count() - 37)
            .collect();
        assert_eq!(rb.snapshot(), tail);
    }

    #[test]
    fn preserves_append_order() {
        let mut rb = RingBuffer::new(DEFAULT_CAPACITY);
        for chunk in ["$ echo hi\r\n", "hi\r\n", "$ "] {
            rb.append(chunk);
        }
        assert_eq!(rb.snapshot(), "$ echo hi\r\nhi\r\n$ ");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let mut rb = RingBuffer::new(3);
        rb.append("héllo→");
        assert_eq!(rb.snapshot(), "lo→");
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn snapshot_is_non_destructive() {
        let mut rb = RingBuffer::new(64);
        rb.append("a\nb\nc\n");
        assert_eq!(rb.snapshot_window(Some(1)), "c\n");
        assert_eq!(rb.snapshot(), "a\nb\nc\n");
        assert_eq!(rb.snapshot(), "a\nb\nc\n");
    }

    #[test]
    fn clear_empties() {
        let mut rb = RingBuffer::new(8);
        rb.append("data");
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.snapshot(), "");
        rb.append("x");
        assert_eq!(rb.snapshot(), "x");
    }

    #[test]
    fn zero_capacity() {
        let mut rb = RingBuffer::new(0);
        rb.append("test");
        assert!(rb.is_empty());
    }
}
