//! Append-only little-endian byte sink for container encoding.
//!
//! [`Writer`] is the encoding counterpart of [`crate::file::Parser`]: every
//! field the parser can read, the writer can produce, using the same
//! [`crate::file::LeIO`] primitive encoding and the same `u32`-length-prefixed
//! UTF-8 string layout. Serialization happens entirely in memory; the finished
//! buffer is handed to [`crate::file::Output`] for atomic persistence.

use crate::file::parser::LeIO;

/// A growable buffer that encodes container fields in little-endian order.
///
/// # Examples
///
/// ```rust
/// use patchscope::file::Writer;
///
/// let mut writer = Writer::new();
/// writer.write_le(0x0201u16);
/// writer.write_prefixed_string_utf8("hi");
/// assert_eq!(writer.as_slice(), &[0x01, 0x02, 0x02, 0x00, 0x00, 0x00, b'h', b'i']);
/// ```
#[derive(Default)]
pub struct Writer {
    buffer: Vec<u8>,
}

impl Writer {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Writer { buffer: Vec::new() }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a primitive value in little-endian byte order.
    pub fn write_le<T: LeIO>(&mut self, value: T) {
        value.to_le(&mut self.buffer);
    }

    /// Appends raw bytes unchanged.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends a `u32`-length-prefixed UTF-8 string.
    pub fn write_prefixed_string_utf8(&mut self, text: &str) {
        self.write_le(u32::try_from(text.len()).unwrap_or(u32::MAX));
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Borrows the encoded bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Parser;

    #[test]
    fn primitives_roundtrip_through_parser() {
        let mut writer = Writer::new();
        writer.write_le(0xDEAD_BEEFu32);
        writer.write_le(-7i32);
        writer.write_le(0x42u8);

        let mut parser = Parser::new(writer.as_slice());
        assert_eq!(parser.read_le::<u32>().unwrap(), 0xDEAD_BEEF);
        assert_eq!(parser.read_le::<i32>().unwrap(), -7);
        assert_eq!(parser.read_le::<u8>().unwrap(), 0x42);
    }

    #[test]
    fn strings_roundtrip_through_parser() {
        let mut writer = Writer::new();
        writer.write_prefixed_string_utf8("Game.Game1");
        writer.write_prefixed_string_utf8("");

        let mut parser = Parser::new(writer.as_slice());
        assert_eq!(parser.read_prefixed_string_utf8().unwrap(), "Game.Game1");
        assert_eq!(parser.read_prefixed_string_utf8().unwrap(), "");
    }
}
