//! Unified error type for the lapwing library.
//!
//! Library code returns `Error` so callers can match on failure modes;
//! the CLI wraps everything in `anyhow::Result` for convenience.
//!
//! # Error Categories
//!
//! - **InvalidArgument**: a parameter outside its documented domain
//!   (e.g. a frequency threshold outside `[0, 1]`)
//! - **InvalidCharacter**: the sketcher met a byte outside the coded
//!   alphabet {A, C, G, T, U}

use std::fmt;

/// Unified error type for the lapwing library.
#[derive(Debug)]
pub enum Error {
    /// A parameter outside its documented domain.
    InvalidArgument(String),

    /// A sequence byte outside the coded alphabet, with its position.
    InvalidCharacter { byte: u8, position: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::InvalidCharacter { byte, position } => {
                if byte.is_ascii_graphic() {
                    write!(
                        f,
                        "invalid character '{}' at position {}",
                        *byte as char, position
                    )
                } else {
                    write!(
                        f,
                        "invalid character 0x{:02x} at position {}",
                        byte, position
                    )
                }
            }
        }
    }
}

impl std::error::Error for Error {}

/// Convenience type alias for Results using lapwing's `Error`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::invalid_argument("frequency must be in [0, 1]");
        assert!(err.to_string().contains("frequency must be in [0, 1]"));
    }

    #[test]
    fn test_invalid_character_display_printable() {
        let err = Error::InvalidCharacter {
            byte: b'N',
            position: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("'N'"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_invalid_character_display_unprintable() {
        let err = Error::InvalidCharacter {
            byte: 0x07,
            position: 0,
        };
        assert!(err.to_string().contains("0x07"));
    }
}
