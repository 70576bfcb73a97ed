//! Error types shared by the reactive core, the registry, the store and the
//! list reconcilers.

use thiserror::Error;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed a value the operation cannot accept.
    Argument,
    /// The operation is well-formed but the current state rejects it.
    Domain,
}

/// Errors raised by the core.
///
/// Every error is returned synchronously to the immediate caller. Nothing in
/// the core retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// An array cell was built from something that is not a sequence.
    #[error("expected an array, found {found}")]
    NotAnArray { found: &'static str },

    /// An object proxy was built from something that is not a mapping.
    #[error("expected an object, found {found}")]
    NotAnObject { found: &'static str },

    /// A value could not be converted to or from its JSON form.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A positional operation referenced an index past the end.
    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A render callback produced an empty fragment.
    #[error("reconciler child cannot be empty")]
    EmptyChild,

    /// A render callback produced a fragment holding several nodes.
    #[error("reconciler child must resolve to a single node, got a fragment of {0} nodes")]
    FragmentChild(usize),

    /// No live cell is registered under this id.
    #[error("no observable registered with id {0}")]
    UnknownObservable(u64),

    /// The registered cell holds a different value type.
    #[error("observable {0} does not hold the requested type")]
    TypeMismatch(u64),

    /// The registered cell cannot be rendered as text.
    #[error("observable {0} has no text representation")]
    NotDisplayable(u64),

    #[error("store entry `{0}` not found")]
    StoreEntryMissing(String),

    #[error("store entry `{0}` already exists")]
    StoreEntryExists(String),

    #[error("store entry `{0}` holds a different type")]
    StoreTypeMismatch(String),
}

impl Error {
    /// Which side of the call is at fault.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotAnArray { .. }
            | Error::NotAnObject { .. }
            | Error::Serialization(_)
            | Error::IndexOutOfBounds { .. } => ErrorKind::Argument,
            _ => ErrorKind::Domain,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_errors_are_classified() {
        assert_eq!(Error::NotAnArray { found: "object" }.kind(), ErrorKind::Argument);
        assert_eq!(
            Error::IndexOutOfBounds { index: 4, len: 2 }.kind(),
            ErrorKind::Argument
        );
    }

    #[test]
    fn domain_errors_are_classified() {
        assert_eq!(Error::EmptyChild.kind(), ErrorKind::Domain);
        assert_eq!(Error::UnknownObservable(3).kind(), ErrorKind::Domain);
        assert_eq!(Error::StoreEntryMissing("user".into()).kind(), ErrorKind::Domain);
    }

    #[test]
    fn empty_child_message_is_stable() {
        assert_eq!(Error::EmptyChild.to_string(), "reconciler child cannot be empty");
    }
}
