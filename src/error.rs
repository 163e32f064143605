//! Error type shared by the store, observer and template layers.
//!
//! Only argument validation produces errors. Teardown paths (unsubscribing
//! twice, removing a listener that is gone) are silent no-ops, and a failed
//! hydration is reported through `tracing` instead of an error.

use std::convert::Infallible;

/// Errors raised synchronously at the call site.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// `store()` was given something other than an object or array.
    #[error("Data must be an object or an array, got {0}")]
    InvalidData(&'static str),

    /// A subscription key was not a number, string or symbol.
    #[error("Key must be a number, string, or symbol, got {0}")]
    InvalidKey(&'static str),

    /// A write walked through a path segment that is not a store.
    #[error("Path '{0}' does not lead to a store")]
    InvalidPath(String),
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::InvalidData("number").to_string(),
            "Data must be an object or an array, got number"
        );
        assert_eq!(
            Error::InvalidKey("array").to_string(),
            "Key must be a number, string, or symbol, got array"
        );
        assert_eq!(
            Error::InvalidPath("a.b".into()).to_string(),
            "Path 'a.b' does not lead to a store"
        );
    }
}
