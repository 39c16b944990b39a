//! Error types for the Galaxy3D visibility core
//!
//! Only recoverable errors live here. Content errors (bad bounds) and
//! configuration errors are returned to the caller; queue overflow is
//! counted and logged instead of returned, and threading-contract
//! violations abort the process (see `SceneContext::ensure_owner_thread`).

use std::fmt;

/// Result type for visibility core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Visibility core errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Object bounds are non-finite, inverted or above the sanity threshold
    InvalidBounds(String),

    /// A `SceneConfig` field is out of range
    InvalidConfig(String),

    /// The object is not registered in the spatial index
    UnknownObject(String),

    /// Operation is not valid in the current state
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidBounds(msg) => write!(f, "Invalid bounds: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
            Error::UnknownObject(msg) => write!(f, "Unknown object: {}", msg),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Log an ERROR (with file:line) and build an `Error::InvalidOperation`
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_visibility::engine_err;
/// let err = engine_err!("galaxy3d::Scene", "Frame {} already dispatched", 12);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::galaxy3d::Error::InvalidOperation(message)
    }};
}

/// Log an ERROR and return `Err(Error::InvalidOperation)` from the current function
///
/// # Example
///
/// ```no_run
/// # use galaxy_3d_visibility::engine_bail;
/// fn check(ok: bool) -> galaxy_3d_visibility::galaxy3d::Result<()> {
///     if !ok {
///         engine_bail!("galaxy3d::Scene", "Check failed");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
