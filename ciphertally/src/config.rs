use uuid::Uuid;

/// Cooldown applied to rate-limited actions when none is configured
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 60;

/// When a rate-limited call's timestamp is recorded
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CooldownCharge {
    /// Record as soon as the cooldown check passes, before the rest of the call runs. A call
    /// that fails afterwards still consumes the window.
    OnAttempt,

    /// Record only once the call has succeeded.
    OnSuccess,
}

impl Default for CooldownCharge {
    fn default() -> Self {
        CooldownCharge::OnAttempt
    }
}

impl std::str::FromStr for CooldownCharge {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_attempt" => Ok(CooldownCharge::OnAttempt),
            "on_success" => Ok(CooldownCharge::OnSuccess),
            other => Err(format!("unknown cooldown charge policy: {}", other)),
        }
    }
}

/// Deployment parameters for a new ledger
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LedgerConfig {
    /// Identity of this deployment. Bound into every state hash, so a request captured on one
    /// deployment can never be completed on another.
    pub system_id: Uuid,

    /// Initial cooldown between rate-limited actions of one caller. The administrator may change
    /// it later.
    pub cooldown_seconds: u64,

    pub cooldown_charge: CooldownCharge,
}

impl LedgerConfig {
    pub fn new(system_id: Uuid) -> Self {
        LedgerConfig {
            system_id,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            cooldown_charge: CooldownCharge::default(),
        }
    }

    pub fn with_cooldown(mut self, cooldown_seconds: u64) -> Self {
        self.cooldown_seconds = cooldown_seconds;
        self
    }

    pub fn with_cooldown_charge(mut self, cooldown_charge: CooldownCharge) -> Self {
        self.cooldown_charge = cooldown_charge;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::new(Uuid::new_v4())
    }
}
