use crate::*;

/// A batch of encrypted votes and its running tally
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(bound = "")]
pub struct Batch<C: CipherAlgebra> {
    id: BatchId,
    yes_tally: C::Int,
    no_tally: C::Int,
    vote_count: u64,
    is_open: bool,
}

impl<C: CipherAlgebra> Batch<C> {
    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn yes_tally(&self) -> &C::Int {
        &self.yes_tally
    }

    pub fn no_tally(&self) -> &C::Int {
        &self.no_tally
    }

    pub fn vote_count(&self) -> u64 {
        self.vote_count
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Tally handles in the order they are sent for decryption: yes, then no
    pub fn tally_handles(&self, algebra: &C) -> Vec<CipherHandle> {
        vec![algebra.handle(&self.yes_tally), algebra.handle(&self.no_tally)]
    }
}

/// Batch lifecycle: at most one batch is open at a time, ids start at 1 and are never reused.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(bound = "")]
pub struct BatchLedger<C: CipherAlgebra> {
    batches: Vec<Batch<C>>,
    open: Option<BatchId>,
}

impl<C: CipherAlgebra> Default for BatchLedger<C> {
    fn default() -> Self {
        BatchLedger {
            batches: Vec::new(),
            open: None,
        }
    }
}

impl<C: CipherAlgebra> BatchLedger<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: BatchId) -> Option<&Batch<C>> {
        if id == 0 {
            return None;
        }
        self.batches.get((id - 1) as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Batch<C>> {
        self.batches.iter()
    }

    pub fn open_batch_id(&self) -> Option<BatchId> {
        self.open
    }

    /// Most recently opened batch, open or closed
    pub fn latest_batch_id(&self) -> Option<BatchId> {
        self.batches.last().map(|b| b.id)
    }

    /// Fails unless no batch is open
    pub fn ensure_none_open(&self) -> Result<(), Error> {
        match self.open {
            Some(_) => Err(Error::InvalidStateTransition(Transition::BatchAlreadyOpen)),
            None => Ok(()),
        }
    }

    /// Id of the open batch, failing if there is none
    pub fn ensure_open(&self) -> Result<BatchId, Error> {
        self.open
            .ok_or(Error::InvalidStateTransition(Transition::NoBatchOpen))
    }

    pub fn open_batch(&mut self, algebra: &C) -> Result<BatchId, Error> {
        self.ensure_none_open()?;

        let id = self.batches.len() as BatchId + 1;
        self.batches.push(Batch {
            id,
            yes_tally: algebra.zero(),
            no_tally: algebra.zero(),
            vote_count: 0,
            is_open: true,
        });
        self.open = Some(id);
        Ok(id)
    }

    pub fn close_batch(&mut self) -> Result<BatchId, Error> {
        let id = self.ensure_open()?;
        let batch = self
            .batches
            .get_mut((id - 1) as usize)
            .ok_or(Error::Uninitialized(id))?;
        batch.is_open = false;
        self.open = None;
        Ok(id)
    }

    /// Check that a loaded ledger agrees with itself. Ids must follow position, and the open
    /// pointer must name the one batch flagged open, if any.
    pub fn check_consistency(&self) -> Result<(), Error> {
        let mut flagged = None;
        for (index, batch) in self.batches.iter().enumerate() {
            let expected = index as BatchId + 1;
            if batch.id != expected {
                return Err(Error::InconsistentState(format!(
                    "batch at position {} has id {}",
                    expected, batch.id
                )));
            }
            if batch.is_open {
                if let Some(other) = flagged {
                    return Err(Error::InconsistentState(format!(
                        "batches {} and {} are both open",
                        other, batch.id
                    )));
                }
                flagged = Some(batch.id);
            }
        }
        if flagged != self.open {
            return Err(Error::InconsistentState(format!(
                "open batch is recorded as {:?} but flagged as {:?}",
                self.open, flagged
            )));
        }
        Ok(())
    }

    /// Fold an encrypted choice into the open batch.
    ///
    /// The choice becomes an encrypted 1 or 0 through a homomorphic select. That value is added
    /// to the yes tally and its complement to the no tally, so every vote lands in exactly one
    /// of them.
    pub fn record_vote(&mut self, algebra: &C, choice: &C::Bool) -> Result<BatchId, Error> {
        let id = self.ensure_open()?;
        let index = (id - 1) as usize;
        let batch = self
            .batches
            .get_mut(index)
            .ok_or(Error::Uninitialized(id))?;

        let one_or_zero = algebra.select(choice, 1, 0);
        let zero_or_one = algebra.complement(1, &one_or_zero);
        batch.yes_tally = algebra.add(&batch.yes_tally, &one_or_zero);
        batch.no_tally = algebra.add(&batch.no_tally, &zero_or_one);
        batch.vote_count += 1;
        Ok(id)
    }

    /// Handles of a closed batch's tallies, ready to be hashed and sent for decryption
    pub fn closed_snapshot(&self, algebra: &C, id: BatchId) -> Result<Vec<CipherHandle>, Error> {
        let batch = self.get(id).ok_or(Error::Uninitialized(id))?;
        if batch.is_open {
            return Err(Error::BatchStillOpen(id));
        }
        Ok(batch.tally_handles(algebra))
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, id: BatchId) -> Option<&mut Batch<C>> {
        if id == 0 {
            return None;
        }
        self.batches.get_mut((id - 1) as usize)
    }
}

#[cfg(test)]
impl<C: CipherAlgebra> Batch<C> {
    pub(crate) fn set_yes_tally(&mut self, value: C::Int) {
        self.yes_tally = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn lifecycle() {
        let algebra = ElGamalAlgebra;
        let mut ledger = BatchLedger::<ElGamalAlgebra>::new();

        assert_eq!(ledger.open_batch_id(), None);
        assert_eq!(ledger.latest_batch_id(), None);
        assert!(matches!(
            ledger.close_batch(),
            Err(Error::InvalidStateTransition(Transition::NoBatchOpen))
        ));

        assert_eq!(ledger.open_batch(&algebra).unwrap(), 1);
        assert!(matches!(
            ledger.open_batch(&algebra),
            Err(Error::InvalidStateTransition(Transition::BatchAlreadyOpen))
        ));
        assert!(matches!(
            ledger.closed_snapshot(&algebra, 1),
            Err(Error::BatchStillOpen(1))
        ));

        assert_eq!(ledger.close_batch().unwrap(), 1);
        assert!(!ledger.get(1).unwrap().is_open());
        assert_eq!(ledger.open_batch(&algebra).unwrap(), 2);
        assert_eq!(ledger.latest_batch_id(), Some(2));
        assert_eq!(ledger.open_batch_id(), Some(2));

        assert!(ledger.get(0).is_none());
        assert!(matches!(
            ledger.closed_snapshot(&algebra, 0),
            Err(Error::Uninitialized(0))
        ));
        assert!(matches!(
            ledger.closed_snapshot(&algebra, 9),
            Err(Error::Uninitialized(9))
        ));
        assert_eq!(ledger.closed_snapshot(&algebra, 1).unwrap().len(), 2);
    }

    #[test]
    fn tallies() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (secret, public) = generate_tally_keypair(&mut rng);
        let table = DiscreteLogTable::new(100);
        let algebra = ElGamalAlgebra;
        let mut ledger = BatchLedger::<ElGamalAlgebra>::new();

        let ballot = public.encrypt_bool(true, &mut rng);
        assert!(matches!(
            ledger.record_vote(&algebra, &ballot),
            Err(Error::InvalidStateTransition(Transition::NoBatchOpen))
        ));

        ledger.open_batch(&algebra).unwrap();
        let choices = [true, false, true, true, false];
        for choice in choices.iter() {
            let ballot = public.encrypt_bool(*choice, &mut rng);
            ledger.record_vote(&algebra, &ballot).unwrap();
        }
        ledger.close_batch().unwrap();

        let batch = ledger.get(1).unwrap();
        assert_eq!(batch.vote_count(), 5);
        assert_eq!(secret.decrypt(batch.yes_tally(), &table), Some(3));
        assert_eq!(secret.decrypt(batch.no_tally(), &table), Some(2));

        // Closed tallies no longer change
        let snapshot = ledger.closed_snapshot(&algebra, 1).unwrap();
        assert!(ledger.record_vote(&algebra, &ballot).is_err());
        assert_eq!(ledger.closed_snapshot(&algebra, 1).unwrap(), snapshot);
    }

    #[test]
    fn empty_batch_tallies_are_zero() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let (secret, _public) = generate_tally_keypair(&mut rng);
        let table = DiscreteLogTable::new(10);
        let algebra = ElGamalAlgebra;
        let mut ledger = BatchLedger::<ElGamalAlgebra>::new();

        ledger.open_batch(&algebra).unwrap();
        ledger.close_batch().unwrap();
        let batch = ledger.get(1).unwrap();
        assert_eq!(batch.vote_count(), 0);
        assert_eq!(secret.decrypt(batch.yes_tally(), &table), Some(0));
        assert_eq!(secret.decrypt(batch.no_tally(), &table), Some(0));
    }

    #[test]
    fn closing_a_missing_batch_fails() {
        let algebra = ElGamalAlgebra;
        let mut ledger = BatchLedger::<ElGamalAlgebra>::new();
        ledger.open_batch(&algebra).unwrap();
        ledger.close_batch().unwrap();
        assert!(ledger.check_consistency().is_ok());

        ledger.open = Some(7);
        assert!(matches!(
            ledger.check_consistency(),
            Err(Error::InconsistentState(_))
        ));
        assert!(matches!(ledger.close_batch(), Err(Error::Uninitialized(7))));
        assert_eq!(ledger.open_batch_id(), Some(7));
    }

    #[test]
    fn inconsistent_open_flags() {
        let algebra = ElGamalAlgebra;
        let mut ledger = BatchLedger::<ElGamalAlgebra>::new();
        ledger.open_batch(&algebra).unwrap();
        assert!(ledger.check_consistency().is_ok());

        // Flagged open but not recorded as open
        ledger.open = None;
        assert!(ledger.check_consistency().is_err());

        // Two batches flagged open
        ledger.open = Some(1);
        ledger.batches.push(Batch {
            id: 2,
            yes_tally: algebra.zero(),
            no_tally: algebra.zero(),
            vote_count: 0,
            is_open: true,
        });
        ledger.open = Some(2);
        assert!(ledger.check_consistency().is_err());

        // Ids out of order
        ledger.batches[0].is_open = false;
        assert!(ledger.check_consistency().is_ok());
        ledger.batches[1].id = 5;
        assert!(ledger.check_consistency().is_err());
    }
}
