//! Length-prefixed codec for nested string lists.
//!
//! Every length is a count of UTF-8 bytes written as zero-padded decimal with
//! at least [`LENGTH_WIDTH`] digits:
//!
//! ```text
//! string  := LEN ':' BYTES ':'
//! list    := '[' COUNT ':' element* ']'
//! element := string | list
//! frame   := LEN ':' PAYLOAD
//! ```
//!
//! The leading byte of an element (`[` or a digit) tells lists and strings
//! apart, so string content is never re-interpreted as structure.

use super::CodecError;
use std::fmt;
use std::io::{self, Read, Write};

/// Minimum number of digits in every length prefix.
pub const LENGTH_WIDTH: usize = 6;

/// Frame payload that ends a session instead of carrying statements.
pub const BYE: &[u8] = b"bye";

/// Largest frame the reader accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Deepest list nesting the decoder accepts.
pub const MAX_DEPTH: usize = 64;

const MAX_LENGTH_DIGITS: usize = 20;

/// A value carried by the protocol: a string or an ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// UTF-8 text
    Str(String),
    /// Ordered sequence of nested values
    List(Vec<Value>),
}

impl Value {
    /// Build a string value.
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// Build a list value from anything convertible into values.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Borrow the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            Value::List(_) => None,
        }
    }

    /// Borrow the items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::Str(_) => None,
            Value::List(items) => Some(items),
        }
    }

    /// Consume the value, returning the string if this is a string.
    pub fn into_string(self) -> Option<String> {
        match self {
            Value::Str(text) => Some(text),
            Value::List(_) => None,
        }
    }

    /// Consume the value, returning the items if this is a list.
    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::Str(_) => None,
            Value::List(items) => Some(items),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Str(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Str(text)
    }
}

impl From<&String> for Value {
    fn from(text: &String) -> Self {
        Value::Str(text.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(text) => f.write_str(text),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Serialize a value into its wire form.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Str(text) => {
            write_length(out, text.len());
            out.push(b':');
            out.extend_from_slice(text.as_bytes());
            out.push(b':');
        }
        Value::List(items) => {
            out.push(b'[');
            write_length(out, items.len());
            out.push(b':');
            for item in items {
                encode_into(item, out);
            }
            out.push(b']');
        }
    }
}

fn write_length(out: &mut Vec<u8>, length: usize) {
    out.extend_from_slice(format!("{length:0width$}", width = LENGTH_WIDTH).as_bytes());
}

/// Parse exactly one value from `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut decoder = Decoder { bytes, pos: 0 };
    let value = decoder.value(0)?;
    let remaining = bytes.len() - decoder.pos;
    if remaining > 0 {
        return Err(CodecError::TrailingBytes { count: remaining });
    }
    Ok(value)
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn value(&mut self, depth: usize) -> Result<Value, CodecError> {
        match self.peek()? {
            b'[' => self.list(depth),
            b'0'..=b'9' => self.string(),
            other => Err(CodecError::UnexpectedElement {
                offset: self.pos,
                found: other as char,
            }),
        }
    }

    fn list(&mut self, depth: usize) -> Result<Value, CodecError> {
        if depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }
        self.expect(b'[')?;
        let count = self.length()?;
        self.expect(b':')?;

        // Every element occupies at least LENGTH_WIDTH + 2 bytes.
        let mut items = Vec::with_capacity(count.min(self.remaining() / (LENGTH_WIDTH + 2)));
        for _ in 0..count {
            items.push(self.value(depth + 1)?);
        }
        self.expect(b']')?;
        Ok(Value::List(items))
    }

    fn string(&mut self) -> Result<Value, CodecError> {
        let length = self.length()?;
        self.expect(b':')?;
        let start = self.pos;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                CodecError::Truncated(format!(
                    "string at offset {start} needs {length} bytes, {} available",
                    self.remaining()
                ))
            })?;
        let text = std::str::from_utf8(&self.bytes[start..end])
            .map_err(|_| CodecError::InvalidUtf8 { offset: start })?;
        self.pos = end;
        self.expect(b':')?;
        Ok(Value::Str(text.to_owned()))
    }

    fn length(&mut self) -> Result<usize, CodecError> {
        let start = self.pos;
        let digits = self.bytes[start..]
            .iter()
            .take_while(|byte| byte.is_ascii_digit())
            .count();
        if !(LENGTH_WIDTH..=MAX_LENGTH_DIGITS).contains(&digits) {
            return Err(CodecError::InvalidLength { offset: start });
        }
        self.pos += digits;
        parse_length(&self.bytes[start..self.pos]).ok_or(CodecError::InvalidLength { offset: start })
    }

    fn expect(&mut self, wanted: u8) -> Result<(), CodecError> {
        let found = self.peek()?;
        if found != wanted {
            return Err(CodecError::UnexpectedByte {
                offset: self.pos,
                expected: wanted as char,
                found: found as char,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn peek(&self) -> Result<u8, CodecError> {
        self.bytes.get(self.pos).copied().ok_or_else(|| {
            CodecError::Truncated(format!("input ends at offset {}", self.pos))
        })
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

fn parse_length(digits: &[u8]) -> Option<usize> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Write one frame: the payload length, a colon, then the payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    write!(writer, "{:0width$}:", payload.len(), width = LENGTH_WIDTH)?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame and return its payload.
///
/// Returns [`CodecError::Closed`] when the stream ends cleanly before the
/// first byte of a frame; ending anywhere later is [`CodecError::Truncated`].
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, CodecError> {
    let mut header = Vec::with_capacity(LENGTH_WIDTH);
    let mut byte = [0u8; 1];
    loop {
        let read = loop {
            match reader.read(&mut byte) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if read == 0 {
            return Err(if header.is_empty() {
                CodecError::Closed
            } else {
                CodecError::Truncated("stream closed inside frame header".into())
            });
        }
        match byte[0] {
            b':' => break,
            digit if digit.is_ascii_digit() && header.len() < MAX_LENGTH_DIGITS => {
                header.push(digit)
            }
            _ => return Err(CodecError::InvalidLength { offset: header.len() }),
        }
    }

    if header.len() < LENGTH_WIDTH {
        return Err(CodecError::InvalidLength { offset: 0 });
    }
    let length = parse_length(&header).ok_or(CodecError::InvalidLength { offset: 0 })?;
    if length > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::Truncated(format!("stream closed inside {length}-byte frame"))
        } else {
            CodecError::Io(err)
        }
    })?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_string_layout() {
        assert_eq!(encode(&Value::str("hi")), b"000002:hi:");
        assert_eq!(encode(&Value::str("")), b"000000::");
    }

    #[test]
    fn test_list_layout() {
        let value = Value::list(["a", "bc"]);
        assert_eq!(encode(&value), b"[000002:000001:a:000002:bc:]");
        assert_eq!(encode(&Value::List(vec![])), b"[000000:]");
    }

    #[test]
    fn test_lengths_count_bytes() {
        let encoded = encode(&Value::str("K\u{f6}ln"));
        assert_eq!(&encoded[..7], b"000005:");
        assert_eq!(decode(&encoded).unwrap(), Value::str("K\u{f6}ln"));
    }

    #[test]
    fn test_nested_lists_decode() {
        let value = Value::List(vec![
            Value::list(["id", "call", "x", "f"]),
            Value::List(vec![Value::str("t"), Value::list(["1", "2"])]),
        ]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_string_that_looks_like_a_list_stays_a_string() {
        let value = Value::str("[000001:000001:a:]");
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_short_string_is_truncated() {
        let err = decode(b"000010:abc:").unwrap_err();
        assert!(matches!(err, CodecError::Truncated(_)), "{err}");
    }

    #[test]
    fn test_missing_terminator_is_rejected() {
        let err = decode(b"000003:abcX").unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedByte { expected: ':', .. }));
    }

    #[test]
    fn test_short_length_prefix_is_rejected() {
        assert!(matches!(
            decode(b"03:abc:").unwrap_err(),
            CodecError::InvalidLength { offset: 0 }
        ));
    }

    #[test]
    fn test_list_count_larger_than_items() {
        let err = decode(b"[000002:000001:a:]").unwrap_err();
        assert!(
            matches!(err, CodecError::UnexpectedElement { offset: 17, found: ']' }),
            "{err}"
        );
    }

    #[test]
    fn test_element_must_start_with_bracket_or_digit() {
        let err = decode(b"x00001:a:").unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedElement { offset: 0, found: 'x' }));
        assert_eq!(
            err.to_string(),
            "expected '[' or a length digit at offset 0, found 'x'"
        );
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        assert!(matches!(
            decode(b"000001:a:xyz").unwrap_err(),
            CodecError::TrailingBytes { count: 3 }
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert!(matches!(
            decode(b"000001:\xff:").unwrap_err(),
            CodecError::InvalidUtf8 { offset: 7 }
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = Vec::new();
        for _ in 0..=MAX_DEPTH {
            bytes.extend_from_slice(b"[000001:");
        }
        assert!(matches!(decode(&bytes).unwrap_err(), CodecError::TooDeep(_)));
    }

    #[test]
    fn test_frames_on_a_stream() {
        let mut stream = Vec::new();
        write_frame(&mut stream, b"first").unwrap();
        write_frame(&mut stream, BYE).unwrap();
        assert_eq!(stream, b"000005:first000003:bye");

        let mut reader = Cursor::new(stream);
        assert_eq!(read_frame(&mut reader).unwrap(), b"first");
        assert_eq!(read_frame(&mut reader).unwrap(), BYE);
        assert!(matches!(read_frame(&mut reader), Err(CodecError::Closed)));
    }

    #[test]
    fn test_frame_closed_mid_payload() {
        let mut reader = Cursor::new(b"000010:abc".to_vec());
        assert!(matches!(read_frame(&mut reader), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_frame_closed_mid_header() {
        let mut reader = Cursor::new(b"0000".to_vec());
        assert!(matches!(read_frame(&mut reader), Err(CodecError::Truncated(_))));
    }

    #[test]
    fn test_frame_header_garbage() {
        let mut reader = Cursor::new(b"00x001:a".to_vec());
        assert!(matches!(
            read_frame(&mut reader),
            Err(CodecError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_oversized_frame_is_refused() {
        let mut reader = Cursor::new(format!("{}:", MAX_FRAME_LEN + 1).into_bytes());
        assert!(matches!(
            read_frame(&mut reader),
            Err(CodecError::FrameTooLarge(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_text_survives(text in any::<String>()) {
            let value = Value::List(vec![Value::str(text.clone())]);
            let decoded = decode(&encode(&value)).unwrap();
            prop_assert_eq!(decoded.as_list().and_then(|items| items[0].as_str()), Some(text.as_str()));
        }
    }
}
