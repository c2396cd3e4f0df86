use anyhow::anyhow;
use ciphertally::{CooldownCharge, LedgerConfig, DEFAULT_COOLDOWN_SECONDS};
use std::env::var;
use uuid::Uuid;

pub struct Config {
    pub system_id: Uuid,
    pub cooldown_seconds: u64,
    pub cooldown_charge: CooldownCharge,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let system_id = match var("CIPHERTALLY_SYSTEM_ID") {
            Ok(val) => Uuid::parse_str(&val)
                .map_err(|e| anyhow!("CIPHERTALLY_SYSTEM_ID is not a valid uuid: {}", e))?,
            Err(_e) => Uuid::new_v4(),
        };

        let cooldown_seconds = match var("CIPHERTALLY_COOLDOWN_SECONDS") {
            Ok(val) => val
                .parse()
                .map_err(|e| anyhow!("CIPHERTALLY_COOLDOWN_SECONDS: {}", e))?,
            Err(_e) => DEFAULT_COOLDOWN_SECONDS,
        };

        let cooldown_charge = match var("CIPHERTALLY_COOLDOWN_CHARGE") {
            Ok(val) => val
                .parse()
                .map_err(|e| anyhow!("CIPHERTALLY_COOLDOWN_CHARGE: {}", e))?,
            Err(_e) => CooldownCharge::default(),
        };

        Ok(Config {
            system_id,
            cooldown_seconds,
            cooldown_charge,
        })
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::new(self.system_id)
            .with_cooldown(self.cooldown_seconds)
            .with_cooldown_charge(self.cooldown_charge)
    }
}
