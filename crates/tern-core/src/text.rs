//! Bounded text helpers
//!
//! Small utilities for C-style byte strings and fixed-size buffers, as they
//! appear at the OS boundary (interface names, diagnostic lines).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TextError;

/// Maximum interface name size including the terminating NUL
pub const IFNAMSIZ: usize = 16;

/// Length of a NUL-terminated string, looking at no more than `max` bytes
pub fn string_length(bytes: &[u8], max: usize) -> usize {
    bytes
        .iter()
        .take(max)
        .position(|&b| b == 0)
        .unwrap_or_else(|| bytes.len().min(max))
}

/// Byte offset of the first `needle` in `haystack`
pub fn string_find(haystack: &str, needle: char) -> Option<usize> {
    haystack.char_indices().find(|&(_, c)| c == needle).map(|(i, _)| i)
}

/// Whether `s` is non-empty and its last character is `c`
pub fn string_ends_with(s: &str, c: char) -> bool {
    s.chars().next_back() == Some(c)
}

/// Structural UTF-8 check.
///
/// Verifies each lead byte announces one to three continuation bytes and that
/// they are present and well-formed. Overlong forms and surrogates are not
/// rejected.
pub fn is_valid_utf8(bytes: &[u8]) -> bool {
    let mut iter = bytes.iter();

    while let Some(&byte) = iter.next() {
        if byte & 0x80 == 0 {
            continue;
        }

        let continuation = if byte & 0x40 == 0 {
            return false;
        } else if byte & 0x20 == 0 {
            1
        } else if byte & 0x10 == 0 {
            2
        } else if byte & 0x08 == 0 {
            3
        } else {
            return false;
        };

        for _ in 0..continuation {
            match iter.next() {
                Some(&b) if b & 0xc0 == 0x80 => {}
                _ => return false,
            }
        }
    }

    true
}

/// Formatted writer over a fixed byte buffer.
///
/// The content is kept NUL-terminated, so at most `buf.len() - 1` bytes of
/// text fit. Output that does not fit is cut at the byte level.
pub struct StringWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> StringWriter<'a> {
    /// Start an empty string in `buf`
    pub fn new(buf: &'a mut [u8]) -> Self {
        if let Some(first) = buf.first_mut() {
            *first = 0;
        }
        Self { buf, len: 0 }
    }

    /// Bytes of text the buffer can hold
    pub fn capacity(&self) -> usize {
        self.buf.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Written bytes, without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Written text, if truncation did not split a character
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Empty the buffer
    pub fn clear(&mut self) {
        self.len = 0;
        self.terminate();
    }

    /// Append formatted output.
    ///
    /// Returns [`TextError::Truncated`] when the output did not fit, leaving
    /// the buffer full. A failing `Display` impl returns
    /// [`TextError::InvalidArgs`] and empties the buffer.
    pub fn append(&mut self, args: fmt::Arguments<'_>) -> Result<(), TextError> {
        let mut sink = Sink {
            writer: self,
            truncated: false,
        };

        let result = fmt::write(&mut sink, args);
        let truncated = sink.truncated;

        if result.is_err() {
            self.clear();
            return Err(TextError::InvalidArgs);
        }

        if truncated {
            return Err(TextError::Truncated);
        }
        Ok(())
    }

    /// Copy as much of `s` as fits, returning false if any was dropped
    fn push(&mut self, s: &str) -> bool {
        let room = self.capacity().saturating_sub(self.len);
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        self.terminate();
        take == s.len()
    }

    fn terminate(&mut self) {
        if let Some(slot) = self.buf.get_mut(self.len) {
            *slot = 0;
        }
    }
}

impl fmt::Write for StringWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.push(s) { Ok(()) } else { Err(fmt::Error) }
    }
}

impl fmt::Debug for StringWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringWriter")
            .field("text", &String::from_utf8_lossy(self.as_bytes()))
            .field("capacity", &self.capacity())
            .finish()
    }
}

struct Sink<'w, 'a> {
    writer: &'w mut StringWriter<'a>,
    truncated: bool,
}

impl fmt::Write for Sink<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !self.writer.push(s) {
            self.truncated = true;
        }
        Ok(())
    }
}

/// A validated network interface name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Validate a name. It must be non-empty and leave room for the NUL.
    pub fn new(name: impl Into<String>) -> Result<Self, TextError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TextError::Empty);
        }
        if name.contains('\0') {
            return Err(TextError::InvalidArgs);
        }
        if name.len() >= IFNAMSIZ {
            return Err(TextError::TooLong {
                len: name.len(),
                max: IFNAMSIZ - 1,
            });
        }
        Ok(Self(name))
    }

    /// Read a name from a NUL-terminated buffer such as `ifr_name`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TextError> {
        let len = string_length(bytes, IFNAMSIZ);
        if len == IFNAMSIZ {
            return Err(TextError::TooLong {
                len: string_length(bytes, bytes.len()),
                max: IFNAMSIZ - 1,
            });
        }
        let raw = &bytes[..len];
        if !is_valid_utf8(raw) {
            return Err(TextError::InvalidUtf8);
        }
        let name = std::str::from_utf8(raw).map_err(|_| TextError::InvalidUtf8)?;
        Self::new(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InterfaceName {
    fn default() -> Self {
        Self("wpan0".to_string())
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = TextError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}
