//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;

/// Customized error type for replikv.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RepliKvError(pub String);

impl RepliKvError {
    /// Builds an error from anything string-convertible.
    pub fn msg(m: impl ToString) -> Self {
        RepliKvError(m.to_string())
    }
}

impl fmt::Display for RepliKvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for RepliKvError {}

// Helper macro for saving boiler-plate `impl From<T>`s for transparent
// conversion from various common error types to `RepliKvError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for RepliKvError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                RepliKvError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(rmp_serde::encode::Error);
impl_from_error!(rmp_serde::decode::Error);
impl_from_error!(toml::de::Error);
impl_from_error!(tokio::task::JoinError);
