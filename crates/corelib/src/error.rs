//! Errors shared by every crate in the workspace.

use thiserror::Error;

use crate::handle::ResourceKind;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The hook was issued before the hosting library was reloaded; its
    /// release routine no longer belongs to the loaded library.
    #[error(
        "release hook for {kind} '{name}' is stale (issued at epoch {issued}, library is at {current})"
    )]
    StaleReleaseHook {
        kind: ResourceKind,
        name: String,
        issued: u32,
        current: u32,
    },
    #[error("Generic error: {0}")]
    Generic(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
