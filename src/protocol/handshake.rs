//! Version line sent by the server as soon as a connection is accepted.

use super::ProtocolError;
use std::io::{self, BufRead, Read, Write};

/// Text preceding the version number on the handshake line.
pub const HANDSHAKE_PREFIX: &str = "Slim -- V";

/// Versions closer than this are considered equal.
pub const VERSION_TOLERANCE: f64 = 1e-4;

const MAX_HANDSHAKE_LEN: u64 = 256;

/// Announce `version` on `writer`.
pub fn write_version_line<W: Write>(writer: &mut W, version: f64) -> io::Result<()> {
    writeln!(writer, "{HANDSHAKE_PREFIX}{version}")?;
    writer.flush()
}

/// Read the handshake line and return the announced version.
pub fn read_version_line<R: BufRead>(reader: &mut R) -> Result<f64, ProtocolError> {
    let mut line = Vec::new();
    Read::take(&mut *reader, MAX_HANDSHAKE_LEN)
        .read_until(b'\n', &mut line)
        .map_err(|err| ProtocolError::Codec(err.into()))?;

    if line.last() != Some(&b'\n') {
        return Err(ProtocolError::MalformedHandshake(
            "stream ended before the version line was complete".into(),
        ));
    }
    let text = String::from_utf8_lossy(&line);
    parse_version(text.trim_end())
}

/// Parse `Slim -- V0.5` (or a bare `0.5`) into a number.
pub fn parse_version(line: &str) -> Result<f64, ProtocolError> {
    let number = line.strip_prefix(HANDSHAKE_PREFIX).unwrap_or(line).trim();
    number.parse::<f64>().map_err(|_| {
        ProtocolError::MalformedHandshake(format!("no version number in {line:?}"))
    })
}

/// Whether two announced versions are the same protocol.
pub fn versions_match(expected: f64, actual: f64) -> bool {
    (expected - actual).abs() < VERSION_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_version_line_layout() {
        let mut out = Vec::new();
        write_version_line(&mut out, 0.5).unwrap();
        assert_eq!(out, b"Slim -- V0.5\n");
    }

    #[test]
    fn test_read_version_line() {
        let mut reader = Cursor::new(b"Slim -- V0.5\n000003:bye".to_vec());
        assert_eq!(read_version_line(&mut reader).unwrap(), 0.5);
        // The rest of the stream is untouched.
        let mut rest = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut rest).unwrap();
        assert_eq!(rest, b"000003:bye");
    }

    #[test]
    fn test_bare_number_is_accepted() {
        assert_eq!(parse_version("0.3").unwrap(), 0.3);
    }

    #[test]
    fn test_unterminated_line_is_malformed() {
        let mut reader = Cursor::new(b"Slim -- V0.5".to_vec());
        assert!(matches!(
            read_version_line(&mut reader),
            Err(ProtocolError::MalformedHandshake(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(parse_version("Hello").is_err());
    }

    #[test]
    fn test_tolerance() {
        assert!(versions_match(0.5, 0.50001));
        assert!(!versions_match(0.5, 0.4));
    }
}
