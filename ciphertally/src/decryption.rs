use crate::*;
use indexmap::IndexMap;
use std::convert::TryInto;
use tracing::error;
use uuid::Uuid;

/// Width of one cleartext word
pub const WORD_LENGTH: usize = 32;

/// Encode values as 32-byte big-endian words, one per value
pub fn encode_words(values: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * WORD_LENGTH);
    for value in values {
        bytes.extend_from_slice(&[0u8; WORD_LENGTH - 8]);
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    bytes
}

/// Decode a sequence of 32-byte big-endian words, each of which must fit in a u64
pub fn decode_words(bytes: &[u8]) -> Result<Vec<u64>, Error> {
    if bytes.len() % WORD_LENGTH != 0 {
        return Err(Error::MalformedCleartexts(format!(
            "length {} is not a multiple of {}",
            bytes.len(),
            WORD_LENGTH
        )));
    }

    bytes
        .chunks(WORD_LENGTH)
        .enumerate()
        .map(|(i, word)| {
            let (high, low) = word.split_at(WORD_LENGTH - 8);
            if high.iter().any(|b| *b != 0) {
                return Err(Error::MalformedCleartexts(format!(
                    "word {} does not fit in 64 bits",
                    i
                )));
            }
            let low: [u8; 8] = low
                .try_into()
                .map_err(|_| Error::MalformedCleartexts(format!("word {} is truncated", i)))?;
            Ok(u64::from_be_bytes(low))
        })
        .collect()
}

/// Published result of a batch
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct DecryptedCounts {
    pub yes: u64,
    pub no: u64,
}

impl DecryptedCounts {
    pub fn new(yes: u64, no: u64) -> Self {
        DecryptedCounts { yes, no }
    }

    pub fn total(&self) -> u64 {
        self.yes.saturating_add(self.no)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_words(&[self.yes, self.no])
    }

    /// Decode exactly two words, yes then no
    pub fn decode(cleartexts: &[u8]) -> Result<Self, Error> {
        let words = decode_words(cleartexts)?;
        match words.as_slice() {
            [yes, no] => Ok(DecryptedCounts { yes: *yes, no: *no }),
            other => Err(Error::MalformedCleartexts(format!(
                "expected 2 words, found {}",
                other.len()
            ))),
        }
    }
}

/// A decryption request bound to the snapshot it was issued for
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DecryptionRequest {
    pub request_id: RequestId,
    pub batch_id: BatchId,
    pub state_hash: StateHash,
    pub processed: bool,

    #[serde(default)]
    pub counts: Option<DecryptedCounts>,
}

/// Tracks issued decryption requests and validates their results
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DecryptionCoordinator {
    requests: IndexMap<RequestId, DecryptionRequest>,
}

impl DecryptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, request_id: &RequestId) -> Option<&DecryptionRequest> {
        self.requests.get(request_id)
    }

    /// All requests in issuance order
    pub fn iter(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.requests.values()
    }

    pub fn pending(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.requests.values().filter(|r| !r.processed)
    }

    pub fn for_batch(&self, batch_id: BatchId) -> impl Iterator<Item = &DecryptionRequest> {
        self.requests.values().filter(move |r| r.batch_id == batch_id)
    }

    /// Hash `handles`, hand them to the oracle and record the request it issues
    pub fn request<O: DecryptionOracle + ?Sized>(
        &mut self,
        oracle: &mut O,
        system_id: &Uuid,
        batch_id: BatchId,
        handles: &[CipherHandle],
    ) -> Result<DecryptionRequest, Error> {
        let state_hash = StateHash::compute(system_id, handles);
        let request_id = oracle.request_decryption(handles)?;
        if self.requests.contains_key(&request_id) {
            return Err(Error::DuplicateRequestId(request_id));
        }

        let request = DecryptionRequest {
            request_id,
            batch_id,
            state_hash,
            processed: false,
            counts: None,
        };
        self.requests.insert(request_id, request.clone());
        Ok(request)
    }

    /// Validate an oracle result against the stored request and publish it, returning the counts.
    ///
    /// `current_handles` are the batch's tally handles as they are now. Nothing is written unless
    /// every check passes.
    pub fn complete<V: ProofVerifier + ?Sized>(
        &mut self,
        verifier: &V,
        system_id: &Uuid,
        current_handles: &[CipherHandle],
        request_id: RequestId,
        cleartexts: &[u8],
        proof: &[u8],
    ) -> Result<DecryptedCounts, Error> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or(Error::UnknownRequest(request_id))?;

        if request.processed {
            return Err(Error::ReplayDetected(request_id));
        }

        let actual = StateHash::compute(system_id, current_handles);
        if actual != request.state_hash {
            error!(
                target: "ciphertally::integrity",
                request_id = %request_id,
                batch_id = request.batch_id,
                expected = %request.state_hash,
                actual = %actual,
                "ciphertexts changed between request and completion"
            );
            return Err(Error::StateMismatch {
                request_id,
                expected: request.state_hash,
                actual,
            });
        }

        if !verifier.verify(request_id, current_handles, cleartexts, proof) {
            error!(
                target: "ciphertally::integrity",
                request_id = %request_id,
                batch_id = request.batch_id,
                "decryption proof rejected"
            );
            return Err(Error::InvalidProof(request_id));
        }

        let counts = DecryptedCounts::decode(cleartexts)?;

        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(Error::UnknownRequest(request_id))?;
        request.processed = true;
        request.counts = Some(counts);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle(Vec<RequestId>);

    impl DecryptionOracle for FixedOracle {
        fn request_decryption(&mut self, _: &[CipherHandle]) -> Result<RequestId, OracleError> {
            self.0.pop().ok_or(OracleError::Disconnected)
        }
    }

    struct AcceptAll;

    impl ProofVerifier for AcceptAll {
        fn verify(&self, _: RequestId, _: &[CipherHandle], _: &[u8], _: &[u8]) -> bool {
            true
        }
    }

    struct RejectAll;

    impl ProofVerifier for RejectAll {
        fn verify(&self, _: RequestId, _: &[CipherHandle], _: &[u8], _: &[u8]) -> bool {
            false
        }
    }

    fn handles() -> Vec<CipherHandle> {
        vec![CipherHandle::new(vec![1; 4]), CipherHandle::new(vec![2; 4])]
    }

    #[test]
    fn words() {
        let encoded = encode_words(&[7, u64::MAX]);
        assert_eq!(encoded.len(), 64);
        assert_eq!(encoded[31], 7);
        assert_eq!(decode_words(&encoded).unwrap(), vec![7, u64::MAX]);

        assert!(decode_words(&[0u8; 31]).is_err());

        let mut too_wide = encode_words(&[1]);
        too_wide[0] = 1;
        assert!(matches!(
            decode_words(&too_wide),
            Err(Error::MalformedCleartexts(_))
        ));
    }

    #[test]
    fn counts() {
        let counts = DecryptedCounts::new(2, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(DecryptedCounts::decode(&counts.encode()).unwrap(), counts);

        assert!(DecryptedCounts::decode(&encode_words(&[1])).is_err());
        assert!(DecryptedCounts::decode(&encode_words(&[1, 2, 3])).is_err());
        assert!(DecryptedCounts::decode(&[]).is_err());
    }

    #[test]
    fn request_and_complete() {
        let system_id = Uuid::new_v4();
        let id = RequestId::new();
        let mut oracle = FixedOracle(vec![id]);
        let mut coordinator = DecryptionCoordinator::new();

        let request = coordinator
            .request(&mut oracle, &system_id, 1, &handles())
            .unwrap();
        assert_eq!(request.request_id, id);
        assert_eq!(request.state_hash, StateHash::compute(&system_id, &handles()));
        assert_eq!(coordinator.pending().count(), 1);

        let cleartexts = DecryptedCounts::new(3, 4).encode();

        // Failed checks leave the request pending
        assert!(matches!(
            coordinator.complete(&RejectAll, &system_id, &handles(), id, &cleartexts, b""),
            Err(Error::InvalidProof(_))
        ));
        assert!(matches!(
            coordinator.complete(&AcceptAll, &system_id, &handles(), id, &cleartexts[..32], b""),
            Err(Error::MalformedCleartexts(_))
        ));
        let changed = vec![CipherHandle::new(vec![9; 4]), CipherHandle::new(vec![2; 4])];
        assert!(matches!(
            coordinator.complete(&AcceptAll, &system_id, &changed, id, &cleartexts, b""),
            Err(Error::StateMismatch { .. })
        ));
        assert!(!coordinator.get(&id).unwrap().processed);

        let counts = coordinator
            .complete(&AcceptAll, &system_id, &handles(), id, &cleartexts, b"")
            .unwrap();
        assert_eq!(counts, DecryptedCounts::new(3, 4));
        let done = coordinator.get(&id).unwrap();
        assert!(done.processed);
        assert_eq!(done.counts, Some(counts));
        assert_eq!(coordinator.pending().count(), 0);
        assert_eq!(coordinator.for_batch(1).count(), 1);

        let other = DecryptedCounts::new(0, 7).encode();
        assert!(matches!(
            coordinator.complete(&AcceptAll, &system_id, &handles(), id, &other, b""),
            Err(Error::ReplayDetected(_))
        ));
        assert_eq!(
            coordinator.get(&id).unwrap().counts,
            Some(DecryptedCounts::new(3, 4))
        );

        let unknown = RequestId::new();
        assert!(matches!(
            coordinator.complete(&AcceptAll, &system_id, &handles(), unknown, &cleartexts, b""),
            Err(Error::UnknownRequest(_))
        ));
    }

    #[test]
    fn duplicate_request_id() {
        let system_id = Uuid::new_v4();
        let id = RequestId::new();
        let mut oracle = FixedOracle(vec![id, id]);
        let mut coordinator = DecryptionCoordinator::new();

        coordinator
            .request(&mut oracle, &system_id, 1, &handles())
            .unwrap();
        assert!(matches!(
            coordinator.request(&mut oracle, &system_id, 1, &handles()),
            Err(Error::DuplicateRequestId(_))
        ));
        assert_eq!(coordinator.iter().count(), 1);

        // Oracle failures surface unchanged
        assert!(matches!(
            coordinator.request(&mut oracle, &system_id, 1, &handles()),
            Err(Error::Oracle(OracleError::Disconnected))
        ));
    }
}
