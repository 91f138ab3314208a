//! Error types for the Galaxy3D binder
//!
//! Every failure of the binding and frame-synchronization layer is reported
//! through [`Error`]. Errors are fatal by contract: nothing in the layer
//! retries or degrades after returning one.

use std::fmt;

/// Result type for Galaxy3D binder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D binder errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (Vulkan, mock device, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, descriptor handle, range, etc.)
    InvalidResource(String),

    /// Initialization failed (engine, renderer, configuration)
    InitializationFailed(String),

    /// A bump allocator (descriptor heap or uniform region) ran out of space
    CapacityExhausted {
        /// Name of the exhausted allocator
        what: String,
        /// Size of the request that did not fit
        requested: u64,
        /// Amount already allocated when the request was made
        used: u64,
        /// Total capacity of the allocator
        capacity: u64,
    },

    /// Transition request that would be a no-op on a single subresource
    IllegalTransition(String),

    /// State query on a resource whose backing allocation does not exist
    UseBeforeInit(String),

    /// Device or GPU level failure, with the native diagnostic code
    DeviceFailure {
        /// Native error code (e.g. `VkResult` value)
        code: i32,
        /// Human-readable context
        message: String,
    },

    /// Frame protocol misuse (double begin, nested immediate, static heap reset)
    ProtocolViolation(String),
}

impl Error {
    /// Stable numeric code for the error variant
    ///
    /// Codes below 100 are engine-wide, codes from 100 are specific to the
    /// binding layer. The values never change between releases.
    pub fn diagnostic_code(&self) -> u32 {
        match self {
            Error::BackendError(_) => 1,
            Error::OutOfMemory => 2,
            Error::InvalidResource(_) => 3,
            Error::InitializationFailed(_) => 4,
            Error::CapacityExhausted { .. } => 100,
            Error::IllegalTransition(_) => 101,
            Error::UseBeforeInit(_) => 102,
            Error::DeviceFailure { .. } => 103,
            Error::ProtocolViolation(_) => 104,
        }
    }

    /// Shorthand for a capacity exhaustion error
    pub fn capacity_exhausted(what: impl Into<String>, requested: u64, used: u64, capacity: u64) -> Self {
        Error::CapacityExhausted {
            what: what.into(),
            requested,
            used,
            capacity,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::CapacityExhausted { what, requested, used, capacity } => write!(
                f,
                "Capacity exhausted: {} (requested {}, used {}/{})",
                what, requested, used, capacity
            ),
            Error::IllegalTransition(msg) => write!(f, "Illegal transition: {}", msg),
            Error::UseBeforeInit(msg) => write!(f, "Use before init: {}", msg),
            Error::DeviceFailure { code, message } => {
                write!(f, "Device failure (code {}): {}", code, message)
            }
            Error::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
