//! Exit codes following sysexits.h conventions.
//!
//! These codes give failure modes semantic meaning so cron jobs and CI
//! wrappers around the pipeline can react appropriately.

#![allow(dead_code)] // Constants may be used in future or for documentation

use visage_core::VisageError;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data error (empty encoding snapshot, corrupt artifact).
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input (missing training root).
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (fetch API, downloads).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// I/O error (cannot write store or artifact).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Map an anyhow error chain to an exit code by the core error it wraps.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<VisageError>() {
        Some(VisageError::EmptySnapshot) => DATA_ERROR,
        Some(VisageError::SerializationError(_)) => DATA_ERROR,
        Some(VisageError::DimensionMismatch { .. }) => DATA_ERROR,
        Some(VisageError::UnknownStrategy(_)) => USAGE_ERROR,
        Some(VisageError::InvalidNeighborCount { .. }) => USAGE_ERROR,
        Some(VisageError::InvalidTrainRoot(_)) => INPUT_ERROR,
        Some(VisageError::FetchError(_)) => NETWORK_ERROR,
        Some(VisageError::HttpError(_)) => NETWORK_ERROR,
        Some(VisageError::IoError(_)) => IO_ERROR,
        Some(VisageError::ImageError(_)) => DATA_ERROR,
        Some(VisageError::ExtractionError(_)) => GENERAL_ERROR,
        None => GENERAL_ERROR,
    }
}
