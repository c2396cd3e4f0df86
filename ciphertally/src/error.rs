use crate::*;

use thiserror::Error;

/// Error types
///
/// Every variant is fatal to the call that produced it; nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ciphertally: {0} lacks the role required for this operation")]
    Unauthorized(Principal),

    #[error("ciphertally: system is paused")]
    SystemPaused,

    #[error("ciphertally: cooldown active for {action} until {retry_at}")]
    CooldownActive { action: ActionKind, retry_at: u64 },

    #[error("ciphertally: invalid state transition: {0}")]
    InvalidStateTransition(Transition),

    #[error("ciphertally: batch {0} is still open")]
    BatchStillOpen(BatchId),

    #[error("ciphertally: batch {0} was never opened")]
    Uninitialized(BatchId),

    #[error("ciphertally: unknown decryption request {0}")]
    UnknownRequest(RequestId),

    #[error("ciphertally: decryption request {0} was already processed")]
    ReplayDetected(RequestId),

    #[error(
        "ciphertally: state hash mismatch for request {request_id}: expected {expected}, found {actual}"
    )]
    StateMismatch {
        request_id: RequestId,
        expected: StateHash,
        actual: StateHash,
    },

    #[error("ciphertally: decryption proof for request {0} failed to verify")]
    InvalidProof(RequestId),

    #[error("ciphertally: {0} is the administrator and cannot be removed")]
    ProtectedPrincipal(Principal),

    #[error("ciphertally: {0} is already an authorized provider")]
    AlreadyAuthorized(Principal),

    #[error("ciphertally: {0} is not an authorized provider")]
    NotAuthorized(Principal),

    #[error("ciphertally: oracle issued request id {0} twice")]
    DuplicateRequestId(RequestId),

    #[error("ciphertally: malformed cleartexts: {0}")]
    MalformedCleartexts(String),

    #[error("ciphertally: malformed ciphertext")]
    MalformedCiphertext,

    #[error("ciphertally: oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("ciphertally: CBOR error: {0}")]
    CBORSerialization(#[from] serde_cbor::Error),

    #[error("ciphertally: JSON error: {0}")]
    JSONSerialization(#[from] serde_json::Error),

    #[error("ciphertally: error deserializing state: unknown format")]
    DeserializationUnknownFormat,

    #[error("ciphertally: inconsistent ledger state: {0}")]
    InconsistentState(String),
}

impl Error {
    /// True for failures that indicate tampering or an implementation fault rather than a caller
    /// mistake. These are the ones an operator should be paged for.
    pub fn is_integrity_incident(&self) -> bool {
        matches!(self, Error::StateMismatch { .. } | Error::InvalidProof(_))
    }
}

/// The state transition a rejected call attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BatchAlreadyOpen,
    NoBatchOpen,
    AlreadyPaused,
    NotPaused,
    NoOpParameter,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Transition::BatchAlreadyOpen => "a batch is already open",
            Transition::NoBatchOpen => "no batch is open",
            Transition::AlreadyPaused => "already paused",
            Transition::NotPaused => "not paused",
            Transition::NoOpParameter => "parameter already has that value",
        };
        write!(f, "{}", name)
    }
}
