use crate::*;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use tracing::debug;

/// Rate-limited action kinds. Each kind has its own cooldown window per principal.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Submit,
    RequestDecryption,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            ActionKind::Submit => "submit",
            ActionKind::RequestDecryption => "request_decryption",
        };
        write!(f, "{}", name)
    }
}

/// Last time a principal performed a rate-limited action
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CooldownRecord {
    pub principal: Principal,
    pub action: ActionKind,
    pub last_invoked: u64,
}

/// A passed cooldown check that has not been recorded yet
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownTicket {
    principal: Principal,
    action: ActionKind,
    now: u64,
}

/// Roles, the pause switch and the per-principal cooldown limiter
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccessGuard {
    administrator: Principal,
    providers: IndexSet<Principal>,
    paused: bool,
    cooldown_seconds: u64,

    #[serde(with = "cooldown_records")]
    cooldowns: BTreeMap<(Principal, ActionKind), u64>,
}

impl AccessGuard {
    /// Create a guard. The administrator is authorized as a provider from the start.
    pub fn new(administrator: Principal, cooldown_seconds: u64) -> Self {
        let mut providers = IndexSet::new();
        providers.insert(administrator);
        AccessGuard {
            administrator,
            providers,
            paused: false,
            cooldown_seconds,
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn administrator(&self) -> Principal {
        self.administrator
    }

    pub fn is_provider(&self, principal: &Principal) -> bool {
        self.providers.contains(principal)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Principal> {
        self.providers.iter()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    pub fn last_invoked(&self, principal: &Principal, action: ActionKind) -> Option<u64> {
        self.cooldowns.get(&(*principal, action)).copied()
    }

    /// Seconds until `principal` may perform `action` again, zero if it may act now
    pub fn cooldown_remaining(&self, principal: &Principal, action: ActionKind, now: u64) -> u64 {
        match self.last_invoked(principal, action) {
            Some(last) => last.saturating_add(self.cooldown_seconds).saturating_sub(now),
            None => 0,
        }
    }

    pub fn require_administrator(&self, caller: &Principal) -> Result<(), Error> {
        if *caller != self.administrator {
            debug!(caller = %caller, "rejected: caller is not the administrator");
            return Err(Error::Unauthorized(*caller));
        }
        Ok(())
    }

    pub fn require_authorized_submitter(&self, caller: &Principal) -> Result<(), Error> {
        if !self.providers.contains(caller) {
            debug!(caller = %caller, "rejected: caller is not an authorized provider");
            return Err(Error::Unauthorized(*caller));
        }
        Ok(())
    }

    pub fn require_not_paused(&self) -> Result<(), Error> {
        if self.paused {
            return Err(Error::SystemPaused);
        }
        Ok(())
    }

    /// Check the cooldown without recording anything
    pub fn check_cooldown(
        &self,
        caller: &Principal,
        action: ActionKind,
        now: u64,
    ) -> Result<CooldownTicket, Error> {
        if let Some(last) = self.last_invoked(caller, action) {
            let retry_at = last.saturating_add(self.cooldown_seconds);
            if now < retry_at {
                debug!(caller = %caller, %action, retry_at, "rejected: cooldown active");
                return Err(Error::CooldownActive { action, retry_at });
            }
        }
        Ok(CooldownTicket {
            principal: *caller,
            action,
            now,
        })
    }

    /// Record a passed cooldown check
    pub fn consume(&mut self, ticket: CooldownTicket) {
        self.cooldowns
            .insert((ticket.principal, ticket.action), ticket.now);
    }

    pub fn check_and_consume_cooldown(
        &mut self,
        caller: &Principal,
        action: ActionKind,
        now: u64,
    ) -> Result<(), Error> {
        let ticket = self.check_cooldown(caller, action, now)?;
        self.consume(ticket);
        Ok(())
    }

    pub fn add_provider(&mut self, provider: Principal) -> Result<(), Error> {
        if !self.providers.insert(provider) {
            return Err(Error::AlreadyAuthorized(provider));
        }
        Ok(())
    }

    pub fn remove_provider(&mut self, provider: Principal) -> Result<(), Error> {
        if provider == self.administrator {
            return Err(Error::ProtectedPrincipal(provider));
        }
        if !self.providers.shift_remove(&provider) {
            return Err(Error::NotAuthorized(provider));
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), Error> {
        if self.paused {
            return Err(Error::InvalidStateTransition(Transition::AlreadyPaused));
        }
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<(), Error> {
        if !self.paused {
            return Err(Error::InvalidStateTransition(Transition::NotPaused));
        }
        self.paused = false;
        Ok(())
    }

    /// Change the cooldown, returning the previous value
    pub fn set_cooldown(&mut self, cooldown_seconds: u64) -> Result<u64, Error> {
        if cooldown_seconds == self.cooldown_seconds {
            return Err(Error::InvalidStateTransition(Transition::NoOpParameter));
        }
        let old = self.cooldown_seconds;
        self.cooldown_seconds = cooldown_seconds;
        Ok(old)
    }
}

// Cooldowns are persisted as a list of records; tuple keys have no JSON map representation.
mod cooldown_records {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        cooldowns: &BTreeMap<(Principal, ActionKind), u64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(cooldowns.iter().map(|((principal, action), last)| {
            CooldownRecord {
                principal: *principal,
                action: *action,
                last_invoked: *last,
            }
        }))
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(Principal, ActionKind), u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Vec::<CooldownRecord>::deserialize(deserializer)?;
        Ok(records
            .into_iter()
            .map(|r| ((r.principal, r.action), r.last_invoked))
            .collect())
    }
}
