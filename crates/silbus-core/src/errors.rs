//! Unified error type for all silbus operations.

use serde::{Deserialize, Serialize};

/// Error raised by silbus components.
///
/// Protocol errors are recovered from locally (log and drop the offending
/// frame); state errors surface violated user contracts; transport errors are
/// translated into peer-shutdown events by the participant.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SilbusError {
    /// Invalid or missing configuration, raised before a participant joins.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// A violated usage contract, e.g. submitting a result for an unknown
    /// call handle or issuing a call with an invalid function type.
    #[error("state error: {message}")]
    State {
        /// Description of the violated contract
        message: String,
    },

    /// An enum value that cannot be represented on the wire.
    #[error("type conversion error: {message}")]
    TypeConversion {
        /// Description of the unrepresentable value
        message: String,
    },

    /// A malformed incoming message.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed frame
        message: String,
    },

    /// A transport-level failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure
        message: String,
    },
}

impl SilbusError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SilbusError>;
