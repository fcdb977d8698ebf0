//! Outcomes of retried executions.

/// The terminal result of a retried execution.
///
/// `Response` means a value came back through the happy path and
/// `Exception` means the execution ended with an error. A policy may accept
/// an error as a terminal success, in which case the outcome is still an
/// `Exception`; this type tracks the shape of the result, not business-level
/// success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R, E> {
    /// The execution produced a value.
    Response {
        /// Number of attempts made.
        attempts: u32,
        /// The value.
        response: R,
    },
    /// The execution ended with an error.
    Exception {
        /// Number of attempts made.
        attempts: u32,
        /// The error.
        error: E,
    },
}

impl<R, E> Outcome<R, E> {
    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Response { attempts, .. } | Self::Exception { attempts, .. } => *attempts,
        }
    }

    /// Whether a value was produced.
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response { .. })
    }

    /// Build an outcome from an attempt result.
    pub fn from_result(attempts: u32, result: Result<R, E>) -> Self {
        match result {
            Ok(response) => Self::Response { attempts, response },
            Err(error) => Self::Exception { attempts, error },
        }
    }

    /// Drop the attempt count and return the value or error.
    pub fn into_result(self) -> Result<R, E> {
        match self {
            Self::Response { response, .. } => Ok(response),
            Self::Exception { error, .. } => Err(error),
        }
    }
}
