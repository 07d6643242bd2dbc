//! SLIM wire protocol
//!
//! The protocol layer is free of I/O policy: it knows how to turn nested
//! lists of strings into bytes and back, how to frame those bytes on a
//! stream, and how statements and results map onto lists. Sessions, fixtures,
//! and sockets live in [`crate::runtime`].

/// Length-prefixed list codec and stream framing.
pub mod codec;
/// Exception sentinel encoding shared by server and client.
pub mod exception;
/// Version line exchanged immediately after accept.
pub mod handshake;
/// Typed statements and result entries.
pub mod statement;

pub use codec::{BYE, Value, decode, encode, read_frame, write_frame};
pub use exception::{EXCEPTION_TAG, ExceptionKind, SlimException};
pub use handshake::{read_version_line, write_version_line};
pub use statement::{Instruction, OK, Outcome, ResultEntry, Statement, VOID, Verb};

use std::io;
use thiserror::Error;

/// Errors raised while decoding bytes read from a SLIM stream.
///
/// Every variant is fatal for the session that produced it.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream before the first byte of a frame.
    #[error("stream closed")]
    Closed,

    /// The stream or buffer ended inside a frame or element.
    #[error("truncated input: {0}")]
    Truncated(String),

    /// A length prefix was missing, too short, or out of range.
    #[error("invalid length prefix at offset {offset}")]
    InvalidLength {
        /// Byte offset of the prefix
        offset: usize,
    },

    /// A structural byte did not match the grammar.
    #[error("expected '{expected}' at offset {offset}, found {found:?}")]
    UnexpectedByte {
        /// Byte offset of the mismatch
        offset: usize,
        /// Byte the grammar required
        expected: char,
        /// Byte actually present
        found: char,
    },

    /// An element started with something other than `[` or a length digit.
    #[error("expected '[' or a length digit at offset {offset}, found {found:?}")]
    UnexpectedElement {
        /// Byte offset of the element start
        offset: usize,
        /// Byte actually present
        found: char,
    },

    /// String content was not valid UTF-8.
    #[error("invalid UTF-8 in string element at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset where the string content starts
        offset: usize,
    },

    /// Bytes remained after a complete top-level value.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unconsumed bytes
        count: usize,
    },

    /// Lists were nested deeper than the decoder accepts.
    #[error("lists nested deeper than {0} levels")]
    TooDeep(usize),

    /// A frame announced more bytes than the reader accepts.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that violate the SLIM conversation itself.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The server announced a version other than the one expected.
    #[error("protocol version mismatch: expected {expected}, server announced {actual}")]
    VersionMismatch {
        /// Version compiled into the client
        expected: f64,
        /// Version announced by the server
        actual: f64,
    },

    /// The handshake line could not be parsed.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),

    /// A statement named a verb outside the instruction set.
    #[error("statement '{id}' uses unknown verb '{verb}'")]
    UnknownVerb {
        /// Statement identifier
        id: String,
        /// Verb as received
        verb: String,
    },

    /// A statement did not have the shape its verb requires.
    #[error("malformed statement: {0}")]
    MalformedStatement(String),

    /// A result list did not have the `[id, value]` shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Underlying codec failure
    #[error(transparent)]
    Codec(#[from] CodecError),
}
