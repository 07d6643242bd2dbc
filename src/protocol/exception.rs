//! Exception values carried inside result entries.
//!
//! A failed statement still produces a result entry; its value is a string of
//! the form `__EXCEPTION__:message:<<TAG: detail>>`. Clients match on the
//! sentinel and the tag.

use std::fmt;

/// Sentinel that starts every encoded exception.
pub const EXCEPTION_TAG: &str = "__EXCEPTION__:";

const MESSAGE_OPEN: &str = "message:<<";
const MESSAGE_CLOSE: &str = ">>";

/// Machine-matchable classification of a failed statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// The bound instance has no method with that name and arity.
    NoMethodInClass,
    /// No instance is bound under the requested name.
    NoInstance,
    /// The type is unknown, no constructor takes that many arguments, or the
    /// constructor failed.
    CouldNotInvokeConstructor,
    /// A fixture method failed; the batch continues.
    Fixture,
    /// A fixture method failed and asked for the rest of the batch to stop.
    StopTest,
    /// A tag this crate does not define, as received from a peer.
    Other(String),
}

impl ExceptionKind {
    /// Wire tag for this kind.
    pub fn tag(&self) -> &str {
        match self {
            ExceptionKind::NoMethodInClass => "NO_METHOD_IN_CLASS",
            ExceptionKind::NoInstance => "NO_INSTANCE",
            ExceptionKind::CouldNotInvokeConstructor => "COULD_NOT_INVOKE_CONSTRUCTOR",
            ExceptionKind::Fixture => "FIXTURE_EXCEPTION",
            ExceptionKind::StopTest => "STOP_TEST",
            ExceptionKind::Other(tag) => tag,
        }
    }

    /// Map a wire tag back to its kind.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "NO_METHOD_IN_CLASS" => ExceptionKind::NoMethodInClass,
            "NO_INSTANCE" => ExceptionKind::NoInstance,
            "COULD_NOT_INVOKE_CONSTRUCTOR" => ExceptionKind::CouldNotInvokeConstructor,
            "FIXTURE_EXCEPTION" => ExceptionKind::Fixture,
            "STOP_TEST" => ExceptionKind::StopTest,
            other => ExceptionKind::Other(other.to_owned()),
        }
    }
}

/// A statement failure, as stored in a result entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlimException {
    /// Classification
    pub kind: ExceptionKind,
    /// Free-text detail following the tag
    pub detail: String,
}

impl SlimException {
    /// Create an exception of the given kind.
    pub fn new(kind: ExceptionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// `NO_METHOD_IN_CLASS` for `method` called with `arity` arguments.
    pub fn no_method_in_class(method: &str, arity: usize, class: &str) -> Self {
        Self::new(
            ExceptionKind::NoMethodInClass,
            format!("{method}[{arity}] {class}."),
        )
    }

    /// `NO_INSTANCE` for a call against an unbound name.
    pub fn no_instance(instance: &str, method: &str) -> Self {
        Self::new(ExceptionKind::NoInstance, format!("{instance}.{method}"))
    }

    /// `COULD_NOT_INVOKE_CONSTRUCTOR` for `class` with `arity` arguments.
    pub fn could_not_invoke_constructor(class: &str, arity: usize, reason: &str) -> Self {
        Self::new(
            ExceptionKind::CouldNotInvokeConstructor,
            format!("{class}[{arity}]: {reason}"),
        )
    }

    /// Whether this exception halts the remainder of its batch.
    pub fn is_stop_test(&self) -> bool {
        self.kind == ExceptionKind::StopTest
    }

    /// Wire form, starting with [`EXCEPTION_TAG`].
    ///
    /// An [`ExceptionKind::Other`] with an empty tag is written unwrapped, and
    /// an empty detail drops the `: ` separator, so [`SlimException::parse`]
    /// followed by `encode` reproduces what was received.
    pub fn encode(&self) -> String {
        let tag = self.kind.tag();
        if tag.is_empty() {
            return format!("{EXCEPTION_TAG}{}", self.detail);
        }
        if self.detail.is_empty() {
            return format!("{EXCEPTION_TAG}{MESSAGE_OPEN}{tag}{MESSAGE_CLOSE}");
        }
        format!("{EXCEPTION_TAG}{MESSAGE_OPEN}{tag}: {}{MESSAGE_CLOSE}", self.detail)
    }

    /// Parse a result value. Returns `None` unless it starts with the sentinel.
    ///
    /// Exceptions from peers that do not wrap their message in `message:<<…>>`
    /// come back as [`ExceptionKind::Other`] with an empty tag and the whole
    /// body as detail.
    pub fn parse(value: &str) -> Option<Self> {
        let body = value.strip_prefix(EXCEPTION_TAG)?;
        let wrapped = body
            .strip_prefix(MESSAGE_OPEN)
            .and_then(|rest| rest.strip_suffix(MESSAGE_CLOSE));

        let exception = match wrapped {
            Some(message) => match message.split_once(':') {
                Some((tag, detail)) => Self::new(
                    ExceptionKind::from_tag(tag),
                    detail.strip_prefix(' ').unwrap_or(detail),
                ),
                None => Self::new(ExceptionKind::from_tag(message), ""),
            },
            None => Self::new(ExceptionKind::Other(String::new()), body),
        };
        Some(exception)
    }
}

impl fmt::Display for SlimException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.tag(), self.detail)
    }
}

impl std::error::Error for SlimException {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_form() {
        let exception = SlimException::no_method_in_class("noSuchFunction", 0, "TestSlim");
        assert_eq!(
            exception.encode(),
            "__EXCEPTION__:message:<<NO_METHOD_IN_CLASS: noSuchFunction[0] TestSlim.>>"
        );
    }

    #[test]
    fn test_parse_recovers_kind_and_detail() {
        let original = SlimException::new(ExceptionKind::StopTest, "halt: now");
        let parsed = SlimException::parse(&original.encode()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.is_stop_test());
    }

    #[test]
    fn test_parse_ignores_plain_values() {
        assert!(SlimException::parse("42").is_none());
        assert!(SlimException::parse("").is_none());
    }

    #[test]
    fn test_parse_foreign_exception() {
        let parsed = SlimException::parse("__EXCEPTION__:java.lang.Exception: boom").unwrap();
        assert_eq!(parsed.kind, ExceptionKind::Other(String::new()));
        assert_eq!(parsed.detail, "java.lang.Exception: boom");
    }

    #[test]
    fn test_unknown_tag_is_preserved() {
        let parsed = SlimException::parse("__EXCEPTION__:message:<<NO_CLASS: Foo>>").unwrap();
        assert_eq!(parsed.kind.tag(), "NO_CLASS");
        assert_eq!(parsed.detail, "Foo");
    }

    #[test]
    fn test_parse_then_encode_reproduces_input() {
        for received in [
            "__EXCEPTION__:message:<<FIXTURE_EXCEPTION:   indented\nline>>",
            "__EXCEPTION__:java.lang.RuntimeException: boom",
            "__EXCEPTION__:message:<<STOP_TEST>>",
        ] {
            let parsed = SlimException::parse(received).unwrap();
            assert_eq!(parsed.encode(), received);
        }
    }

    #[test]
    fn test_leading_whitespace_in_detail_is_kept() {
        let parsed =
            SlimException::parse("__EXCEPTION__:message:<<FIXTURE_EXCEPTION:   indented>>").unwrap();
        assert_eq!(parsed.detail, "  indented");
    }
}
