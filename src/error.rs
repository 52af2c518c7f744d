/// An error that can occur while compiling a pattern or running a search.
///
/// There are generally only two things you can do with it:
///
/// * Obtain a human readable message via its `std::fmt::Display` impl.
/// * Classify it with the `is_*` predicates, e.g. to distinguish a pattern
/// syntax problem from malformed input text.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The kind of error that occurred.
#[derive(Clone, Debug)]
enum ErrorKind {
    /// A malformed UTF-8 sequence was found, in a pattern, a character class
    /// or a haystack. The offset points at the first byte of the offending
    /// sequence.
    InvalidUtf8 { offset: usize },
    /// The pattern is not a valid expression of the supported dialect.
    Syntax { msg: &'static str },
    /// An operation was given an argument outside its domain, e.g. removing
    /// an element that is not in a sparse set.
    InvalidArgument { msg: &'static str },
}

impl Error {
    fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn invalid_utf8(offset: usize) -> Error {
        Error { kind: ErrorKind::InvalidUtf8 { offset } }
    }

    pub(crate) fn syntax(msg: &'static str) -> Error {
        Error { kind: ErrorKind::Syntax { msg } }
    }

    pub(crate) fn invalid_argument(msg: &'static str) -> Error {
        Error { kind: ErrorKind::InvalidArgument { msg } }
    }

    /// Returns true if this error was caused by malformed UTF-8.
    pub fn is_invalid_utf8(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidUtf8 { .. })
    }

    /// Returns true if this error was caused by invalid pattern syntax.
    pub fn is_syntax(&self) -> bool {
        matches!(self.kind, ErrorKind::Syntax { .. })
    }

    /// Returns true if this error was caused by an argument outside an
    /// operation's domain.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidArgument { .. })
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            ErrorKind::InvalidUtf8 { offset } => {
                write!(f, "invalid UTF-8 sequence at byte offset {}", offset)
            }
            ErrorKind::Syntax { msg } => {
                write!(f, "invalid pattern syntax: {}", msg)
            }
            ErrorKind::InvalidArgument { msg } => {
                write!(f, "invalid argument: {}", msg)
            }
        }
    }
}
