//! Shared error types for the services crate.

use thiserror::Error;

use gateway::GatewayError;

/// Errors emitted by the attempt session.
///
/// `Clone` so a terminal failure can be replayed to every caller that races
/// into the session after it has already terminated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has not been opened")]
    NotOpen,

    #[error("session is already bound to a different test")]
    AlreadyOpen,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
