//! Error types for pollbridge.
//!
//! Every boundary operation returns a discriminated [`Result`]; nothing in
//! this layer panics or retries. Each variant has a stable integer code so a
//! thin marshaling layer can pass errors across a foreign boundary — code `0`
//! is the reserved no-error sentinel and is never produced here.

use thiserror::Error;

/// Main error type for all bridge operations.
///
/// "Invalid X" variants signal caller error (a stale or fabricated handle, id
/// or name) and will keep failing on retry. "No ... available" and
/// [`ResultNotArrived`](BridgeError::ResultNotArrived) are normal transient
/// polling states: the caller just polls again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Engine session could not be established at endpoint creation.
    #[error("network failure")]
    Network,

    /// Service descriptor failed to parse at endpoint creation.
    #[error("invalid descriptor")]
    InvalidDescriptor,

    /// Handle does not name a live endpoint in its registry.
    #[error("invalid endpoint handle")]
    InvalidEndpoint,

    /// Function is not part of the service contract.
    #[error("invalid function")]
    InvalidFunction,

    /// Property is not declared by the service contract.
    #[error("invalid property")]
    InvalidProperty,

    /// Result id is unknown — never issued, already consumed, or torn down.
    #[error("invalid result id")]
    InvalidResultId,

    /// Request id is unknown — never dequeued or already replied to.
    #[error("invalid request id")]
    InvalidRequestId,

    /// Listen or callAll queue is currently empty.
    #[error("no result available")]
    NoResultAvailable,

    /// Provider request queue is currently empty.
    #[error("no request available")]
    NoRequestAvailable,

    /// The call's result future is still pending.
    #[error("result not arrived")]
    ResultNotArrived,

    /// No property update available — never requested, still pending, or
    /// already consumed.
    #[error("no property update available")]
    NoUpdateAvailable,
}

impl BridgeError {
    /// Stable integer code for this error (1..=11).
    ///
    /// Code `0` is the no-error sentinel of the marshaled boundary and is
    /// deliberately unmapped.
    pub fn code(self) -> i32 {
        match self {
            BridgeError::Network => 1,
            BridgeError::InvalidDescriptor => 2,
            BridgeError::InvalidEndpoint => 3,
            BridgeError::InvalidFunction => 4,
            BridgeError::InvalidProperty => 5,
            BridgeError::InvalidResultId => 6,
            BridgeError::InvalidRequestId => 7,
            BridgeError::NoResultAvailable => 8,
            BridgeError::NoRequestAvailable => 9,
            BridgeError::ResultNotArrived => 10,
            BridgeError::NoUpdateAvailable => 11,
        }
    }

    /// Reverse of [`code`](Self::code). Returns `None` for the no-error
    /// sentinel and for out-of-range codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(BridgeError::Network),
            2 => Some(BridgeError::InvalidDescriptor),
            3 => Some(BridgeError::InvalidEndpoint),
            4 => Some(BridgeError::InvalidFunction),
            5 => Some(BridgeError::InvalidProperty),
            6 => Some(BridgeError::InvalidResultId),
            7 => Some(BridgeError::InvalidRequestId),
            8 => Some(BridgeError::NoResultAvailable),
            9 => Some(BridgeError::NoRequestAvailable),
            10 => Some(BridgeError::ResultNotArrived),
            11 => Some(BridgeError::NoUpdateAvailable),
            _ => None,
        }
    }

    /// True for the transient polling states that simply mean "nothing yet".
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            BridgeError::NoResultAvailable
                | BridgeError::NoRequestAvailable
                | BridgeError::ResultNotArrived
                | BridgeError::NoUpdateAvailable
        )
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;
