use std::fmt;

/// Custom `Error` type for buffer construction and harness failures.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// A zero capacity/element size, an unrepresentable capacity request,
    /// or (fixed-storage mode) a derived capacity that is not a power of two.
    InvalidArgument,
    /// Storage could not be obtained for an owned-allocation buffer.
    AllocationFailure,
    /// Indicates that no positive errno was set.
    ErrnoNotPositive,
    /// Represents any unexpected error.
    Unexpected,
    /// Captures OS-specific error codes.
    OsError(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "Invalid capacity or element size"),
            Error::AllocationFailure => write!(f, "Buffer storage allocation failed"),
            Error::ErrnoNotPositive => write!(f, "No positive errno set"),
            Error::Unexpected => write!(f, "Unexpected error occurred"),
            Error::OsError(code) => write!(f, "OS error with code: {}", code),
        }
    }
}

impl std::error::Error for Error {}

impl From<u32> for Error {
    fn from(code: u32) -> Self {
        Error::OsError(code)
    }
}
