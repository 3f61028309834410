//! Error Types

use thiserror::Error;

/// Failures surfaced at the component boundary. These are contained
/// where they occur (logged, degraded to a placeholder) rather than
/// propagated into the reconciler.
#[derive(Debug, Error)]
pub enum Error {
    /// A lazy component's loader failed.
    #[error("failed to load component `{component}`: {message}")]
    ComponentLoad { component: String, message: String },

    /// A component's setup function failed.
    #[error("setup failed in component `{component}`: {message}")]
    Setup { component: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
