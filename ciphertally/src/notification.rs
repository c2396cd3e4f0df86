use crate::*;

/// Observable record of a successful state change
///
/// Notifications are appended in the order the changes happen and never rewritten.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ProviderAdded {
        provider: Principal,
    },
    ProviderRemoved {
        provider: Principal,
    },
    Paused {
        by: Principal,
    },
    Unpaused {
        by: Principal,
    },
    CooldownSet {
        old: u64,
        new: u64,
    },
    BatchOpened {
        batch_id: BatchId,
    },
    BatchClosed {
        batch_id: BatchId,
    },
    VoteSubmitted {
        voter: Principal,
        batch_id: BatchId,
        ciphertext: CipherHandle,
    },
    DecryptionRequested {
        request_id: RequestId,
        batch_id: BatchId,
        state_hash: StateHash,
    },
    DecryptionCompleted {
        request_id: RequestId,
        batch_id: BatchId,
        yes_count: u64,
        no_count: u64,
    },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::ProviderAdded { .. } => "provider_added",
            Notification::ProviderRemoved { .. } => "provider_removed",
            Notification::Paused { .. } => "paused",
            Notification::Unpaused { .. } => "unpaused",
            Notification::CooldownSet { .. } => "cooldown_set",
            Notification::BatchOpened { .. } => "batch_opened",
            Notification::BatchClosed { .. } => "batch_closed",
            Notification::VoteSubmitted { .. } => "vote_submitted",
            Notification::DecryptionRequested { .. } => "decryption_requested",
            Notification::DecryptionCompleted { .. } => "decryption_completed",
        }
    }
}
