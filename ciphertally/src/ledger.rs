use crate::*;
use tracing::info;
use uuid::Uuid;

/// Per-call context supplied by the execution environment: the authenticated caller and the
/// current time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub caller: Principal,
    pub now: u64,
}

impl Call {
    pub fn new(caller: Principal, now: u64) -> Self {
        Call { caller, now }
    }
}

/// The complete persisted state of one tallying deployment.
///
/// Every entry point validates all of its preconditions before touching state, so a failed call
/// changes nothing. The one exception is the cooldown record under [`CooldownCharge::OnAttempt`],
/// which is written as soon as the cooldown check passes.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(bound(serialize = "", deserialize = "C: Default"))]
pub struct LedgerState<C: CipherAlgebra> {
    #[serde(skip)]
    algebra: C,

    system_id: Uuid,
    cooldown_charge: CooldownCharge,
    guard: AccessGuard,
    batches: BatchLedger<C>,
    decryptions: DecryptionCoordinator,
    notifications: Vec<Notification>,
}

impl<C: CipherAlgebra> LedgerState<C> {
    pub fn new(config: LedgerConfig, administrator: Principal, algebra: C) -> Self {
        info!(
            system_id = %config.system_id,
            administrator = %administrator,
            cooldown_seconds = config.cooldown_seconds,
            "ledger created"
        );
        LedgerState {
            algebra,
            system_id: config.system_id,
            cooldown_charge: config.cooldown_charge,
            guard: AccessGuard::new(administrator, config.cooldown_seconds),
            batches: BatchLedger::new(),
            decryptions: DecryptionCoordinator::new(),
            notifications: Vec::new(),
        }
    }

    fn notify(&mut self, notification: Notification) {
        info!(event = notification.name(), "{:?}", notification);
        self.notifications.push(notification);
    }

    // Applies the cooldown check for `action` around `body`, recording the call according to the
    // configured charge policy.
    fn rate_limited<T, F>(&mut self, call: &Call, action: ActionKind, body: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Self) -> Result<T, Error>,
    {
        let ticket = self.guard.check_cooldown(&call.caller, action, call.now)?;
        match self.cooldown_charge {
            CooldownCharge::OnAttempt => {
                self.guard.consume(ticket);
                body(self)
            }
            CooldownCharge::OnSuccess => {
                let output = body(self)?;
                self.guard.consume(ticket);
                Ok(output)
            }
        }
    }

    // Administration

    pub fn add_provider(&mut self, call: &Call, provider: Principal) -> Result<(), Error> {
        self.guard.require_administrator(&call.caller)?;
        self.guard.add_provider(provider)?;
        self.notify(Notification::ProviderAdded { provider });
        Ok(())
    }

    pub fn remove_provider(&mut self, call: &Call, provider: Principal) -> Result<(), Error> {
        self.guard.require_administrator(&call.caller)?;
        self.guard.remove_provider(provider)?;
        self.notify(Notification::ProviderRemoved { provider });
        Ok(())
    }

    pub fn pause(&mut self, call: &Call) -> Result<(), Error> {
        self.guard.require_administrator(&call.caller)?;
        self.guard.pause()?;
        self.notify(Notification::Paused { by: call.caller });
        Ok(())
    }

    pub fn unpause(&mut self, call: &Call) -> Result<(), Error> {
        self.guard.require_administrator(&call.caller)?;
        self.guard.unpause()?;
        self.notify(Notification::Unpaused { by: call.caller });
        Ok(())
    }

    pub fn set_cooldown(&mut self, call: &Call, cooldown_seconds: u64) -> Result<(), Error> {
        self.guard.require_administrator(&call.caller)?;
        let old = self.guard.set_cooldown(cooldown_seconds)?;
        self.notify(Notification::CooldownSet {
            old,
            new: cooldown_seconds,
        });
        Ok(())
    }

    // Batch lifecycle

    pub fn open_batch(&mut self, call: &Call) -> Result<BatchId, Error> {
        self.guard.require_not_paused()?;
        self.guard.require_administrator(&call.caller)?;
        let batch_id = self.batches.open_batch(&self.algebra)?;
        self.notify(Notification::BatchOpened { batch_id });
        Ok(batch_id)
    }

    pub fn close_batch(&mut self, call: &Call) -> Result<BatchId, Error> {
        self.guard.require_not_paused()?;
        self.guard.require_administrator(&call.caller)?;
        let batch_id = self.batches.close_batch()?;
        self.notify(Notification::BatchClosed { batch_id });
        Ok(batch_id)
    }

    /// Add an encrypted yes/no choice to the open batch
    pub fn submit_vote(&mut self, call: &Call, choice: &C::Bool) -> Result<BatchId, Error> {
        self.guard.require_not_paused()?;
        self.guard.require_authorized_submitter(&call.caller)?;

        self.rate_limited(call, ActionKind::Submit, |state| {
            let batch_id = state.batches.record_vote(&state.algebra, choice)?;
            let ciphertext = state.algebra.bool_handle(choice);
            state.notify(Notification::VoteSubmitted {
                voter: call.caller,
                batch_id,
                ciphertext,
            });
            Ok(batch_id)
        })
    }

    // Decryption

    /// Snapshot a closed batch's tallies and send them to `oracle` for decryption
    pub fn request_decryption<O: DecryptionOracle + ?Sized>(
        &mut self,
        call: &Call,
        oracle: &mut O,
        batch_id: BatchId,
    ) -> Result<DecryptionRequest, Error> {
        self.guard.require_not_paused()?;
        self.guard.require_authorized_submitter(&call.caller)?;

        self.rate_limited(call, ActionKind::RequestDecryption, |state| {
            let handles = state.batches.closed_snapshot(&state.algebra, batch_id)?;
            let request = state
                .decryptions
                .request(oracle, &state.system_id, batch_id, &handles)?;
            state.notify(Notification::DecryptionRequested {
                request_id: request.request_id,
                batch_id,
                state_hash: request.state_hash,
            });
            Ok(request)
        })
    }

    /// Accept an oracle's result for `request_id` and publish the counts.
    ///
    /// The result is applied at most once, and only if the batch's ciphertexts still hash to the
    /// value captured when the request was made and `verifier` accepts the proof.
    pub fn complete_decryption<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        request_id: RequestId,
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<DecryptedCounts, Error> {
        let batch_id = self
            .decryptions
            .get(&request_id)
            .ok_or(Error::UnknownRequest(request_id))?
            .batch_id;
        let handles = self
            .batches
            .get(batch_id)
            .ok_or(Error::Uninitialized(batch_id))?
            .tally_handles(&self.algebra);

        let counts = self.decryptions.complete(
            verifier,
            &self.system_id,
            &handles,
            request_id,
            cleartexts,
            proof,
        )?;

        self.notify(Notification::DecryptionCompleted {
            request_id,
            batch_id,
            yes_count: counts.yes,
            no_count: counts.no,
        });
        Ok(counts)
    }

    pub fn complete_response<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        response: &DecryptionResponse,
    ) -> Result<DecryptedCounts, Error> {
        self.complete_decryption(
            verifier,
            response.request_id,
            &response.cleartexts,
            &response.proof,
        )
    }

    // Queries

    pub fn algebra(&self) -> &C {
        &self.algebra
    }

    pub fn system_id(&self) -> Uuid {
        self.system_id
    }

    pub fn cooldown_charge(&self) -> CooldownCharge {
        self.cooldown_charge
    }

    pub fn administrator(&self) -> Principal {
        self.guard.administrator()
    }

    pub fn is_provider(&self, principal: &Principal) -> bool {
        self.guard.is_provider(principal)
    }

    pub fn is_paused(&self) -> bool {
        self.guard.is_paused()
    }

    pub fn cooldown_seconds(&self) -> u64 {
        self.guard.cooldown_seconds()
    }

    pub fn cooldown_remaining(&self, principal: &Principal, action: ActionKind, now: u64) -> u64 {
        self.guard.cooldown_remaining(principal, action, now)
    }

    pub fn open_batch_id(&self) -> Option<BatchId> {
        self.batches.open_batch_id()
    }

    pub fn latest_batch_id(&self) -> Option<BatchId> {
        self.batches.latest_batch_id()
    }

    pub fn batch(&self, batch_id: BatchId) -> Option<&Batch<C>> {
        self.batches.get(batch_id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch<C>> {
        self.batches.iter()
    }

    pub fn vote_count(&self, batch_id: BatchId) -> Option<u64> {
        self.batches.get(batch_id).map(|b| b.vote_count())
    }

    pub fn request(&self, request_id: &RequestId) -> Option<&DecryptionRequest> {
        self.decryptions.get(request_id)
    }

    pub fn requests(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.decryptions.iter()
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.decryptions.pending()
    }

    /// Published results for a batch, one per completed request
    pub fn results_for_batch(&self, batch_id: BatchId) -> Vec<DecryptedCounts> {
        self.decryptions
            .for_batch(batch_id)
            .filter_map(|r| r.counts)
            .collect()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    // Persistence

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(test)]
    pub(crate) fn batches_mut(&mut self) -> &mut BatchLedger<C> {
        &mut self.batches
    }
}

impl<C: CipherAlgebra + Default> LedgerState<C> {
    /// Load a snapshot written by `to_bytes` or `to_json`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let state: Self = match bytes.first().copied() {
            // If it starts with `{` then it's JSON
            Some(b'{') => serde_json::from_slice(bytes)?,
            Some(_) => serde_cbor::from_slice(bytes)?,
            None => return Err(Error::DeserializationUnknownFormat),
        };
        state.batches.check_consistency()?;
        Ok(state)
    }
}
