use crate::*;
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer};
use rand_core::{CryptoRng, RngCore};
use std::convert::TryFrom;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest count the reference oracle will decrypt unless configured otherwise
pub const DEFAULT_MAX_COUNT: u64 = 1 << 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("ciphertally: decryption oracle is disconnected")]
    Disconnected,

    #[error("ciphertally: oracle received a malformed ciphertext at position {0}")]
    MalformedHandle(usize),

    #[error("ciphertally: ciphertext at position {0} decrypts to a count above the oracle's bound")]
    CountOutOfRange(usize),

    #[error("ciphertally: oracle failed to sign its response: {0}")]
    Signing(String),
}

/// Asynchronous decryption service
///
/// `request_decryption` returns a correlation id immediately. The cleartexts arrive later, out of
/// band, as a [`DecryptionResponse`] that is fed to `LedgerState::complete_decryption`.
pub trait DecryptionOracle {
    fn request_decryption(&mut self, handles: &[CipherHandle]) -> Result<RequestId, OracleError>;
}

/// Checks that `cleartexts` are the oracle's decryption of `handles` for `request_id`
pub trait ProofVerifier {
    fn verify(
        &self,
        request_id: RequestId,
        handles: &[CipherHandle],
        cleartexts: &[u8],
        proof: &[u8],
    ) -> bool;
}

/// An oracle's answer to a decryption request
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DecryptionResponse {
    pub request_id: RequestId,

    #[serde(with = "hex_serde")]
    pub cleartexts: Vec<u8>,

    #[serde(with = "hex_serde")]
    pub proof: Vec<u8>,
}

#[derive(Serialize)]
struct ProofMessage<'a> {
    request_id: RequestId,
    handles: &'a [CipherHandle],
    cleartexts: &'a [u8],
}

fn proof_message(
    request_id: RequestId,
    handles: &[CipherHandle],
    cleartexts: &[u8],
) -> Result<Vec<u8>, Error> {
    let message = ProofMessage {
        request_id,
        handles,
        cleartexts,
    };
    Ok(serde_cbor::to_vec(&message)?)
}

/// Signs decryption results with the oracle's ed25519 key
pub struct OracleSigner {
    keypair: Keypair,
}

impl OracleSigner {
    pub fn new(secret: SecretKey) -> Self {
        let public: PublicKey = (&secret).into();
        OracleSigner {
            keypair: Keypair { secret, public },
        }
    }

    pub fn generate() -> Self {
        let (secret, _public) = generate_keypair();
        OracleSigner::new(secret)
    }

    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let (secret, _public) = generate_keypair_from(rng);
        OracleSigner::new(secret)
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn sign(
        &self,
        request_id: RequestId,
        handles: &[CipherHandle],
        cleartexts: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let message = proof_message(request_id, handles, cleartexts)?;
        Ok(self.keypair.sign(&message).to_bytes().to_vec())
    }

    pub fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.keypair.public)
    }
}

/// [`ProofVerifier`] accepting results signed by one oracle key
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SignatureVerifier {
    oracle_key: PublicKey,
}

impl SignatureVerifier {
    pub fn new(oracle_key: PublicKey) -> Self {
        SignatureVerifier { oracle_key }
    }

    pub fn oracle_key(&self) -> &PublicKey {
        &self.oracle_key
    }
}

impl ProofVerifier for SignatureVerifier {
    fn verify(
        &self,
        request_id: RequestId,
        handles: &[CipherHandle],
        cleartexts: &[u8],
        proof: &[u8],
    ) -> bool {
        let message = match proof_message(request_id, handles, cleartexts) {
            Ok(message) => message,
            Err(_) => return false,
        };
        let signature = match Signature::try_from(proof) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        self.oracle_key.verify_strict(&message, &signature).is_ok()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct OracleConfig {
    /// Upper bound on any decrypted count. Lookup tables are sized from it.
    pub max_count: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

struct Job {
    request_id: RequestId,
    handles: Vec<CipherHandle>,
}

/// In-process oracle holding the tally secret key on a worker thread.
///
/// Jobs go to the worker over a channel; finished responses are collected with
/// [`LocalOracle::next_response`]. A job the worker cannot fulfil is logged and dropped, so its
/// request stays pending.
pub struct LocalOracle {
    jobs: Option<mpsc::Sender<Job>>,
    responses: mpsc::Receiver<DecryptionResponse>,
    worker: Option<thread::JoinHandle<()>>,
    verifier: SignatureVerifier,
}

impl LocalOracle {
    pub fn spawn(key: DecryptionKey, signer: OracleSigner, config: OracleConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (response_tx, response_rx) = mpsc::channel();
        let verifier = signer.verifier();

        let worker = thread::spawn(move || {
            let table = DiscreteLogTable::new(config.max_count);
            for job in job_rx {
                match fulfil(&job, &key, &table, &signer) {
                    Ok(response) => {
                        debug!(request_id = %job.request_id, "decryption job fulfilled");
                        if response_tx.send(response).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(request_id = %job.request_id, error = %e, "dropping decryption job")
                    }
                }
            }
        });

        LocalOracle {
            jobs: Some(job_tx),
            responses: response_rx,
            worker: Some(worker),
            verifier,
        }
    }

    /// Verifier for this oracle's responses
    pub fn verifier(&self) -> SignatureVerifier {
        self.verifier.clone()
    }

    /// Wait up to `timeout` for the next finished response
    pub fn next_response(&self, timeout: Duration) -> Option<DecryptionResponse> {
        self.responses.recv_timeout(timeout).ok()
    }
}

impl DecryptionOracle for LocalOracle {
    fn request_decryption(&mut self, handles: &[CipherHandle]) -> Result<RequestId, OracleError> {
        let jobs = self.jobs.as_ref().ok_or(OracleError::Disconnected)?;
        let request_id = RequestId::new();
        jobs.send(Job {
            request_id,
            handles: handles.to_vec(),
        })
        .map_err(|_| OracleError::Disconnected)?;
        Ok(request_id)
    }
}

impl Drop for LocalOracle {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }
    }
}

/// Wait for the worker to exit, returning false if it panicked
fn join_worker(worker: thread::JoinHandle<()>) -> bool {
    match worker.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            warn!(reason = %reason, "decryption worker panicked");
            false
        }
    }
}

fn fulfil(
    job: &Job,
    key: &DecryptionKey,
    table: &DiscreteLogTable,
    signer: &OracleSigner,
) -> Result<DecryptionResponse, OracleError> {
    let mut counts = Vec::with_capacity(job.handles.len());
    for (i, handle) in job.handles.iter().enumerate() {
        let ciphertext =
            Ciphertext::from_bytes(handle.as_bytes()).map_err(|_| OracleError::MalformedHandle(i))?;
        let count = key
            .decrypt(&ciphertext, table)
            .ok_or(OracleError::CountOutOfRange(i))?;
        counts.push(count);
    }

    let cleartexts = encode_words(&counts);
    let proof = signer
        .sign(job.request_id, &job.handles, &cleartexts)
        .map_err(|e| OracleError::Signing(e.to_string()))?;

    Ok(DecryptionResponse {
        request_id: job.request_id,
        cleartexts,
        proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn signatures() {
        let signer = OracleSigner::generate();
        let verifier = signer.verifier();
        let id = RequestId::new();
        let handles = vec![CipherHandle::new(vec![1, 2]), CipherHandle::new(vec![3])];
        let cleartexts = encode_words(&[4, 5]);

        let proof = signer.sign(id, &handles, &cleartexts).unwrap();
        assert!(verifier.verify(id, &handles, &cleartexts, &proof));

        // Any change to the signed message invalidates the proof
        assert!(!verifier.verify(RequestId::new(), &handles, &cleartexts, &proof));
        assert!(!verifier.verify(id, &handles[..1], &cleartexts, &proof));
        assert!(!verifier.verify(id, &handles, &encode_words(&[5, 4]), &proof));

        let mut tampered = proof.clone();
        tampered[0] ^= 1;
        assert!(!verifier.verify(id, &handles, &cleartexts, &tampered));
        assert!(!verifier.verify(id, &handles, &cleartexts, b"short"));

        // Another oracle's key does not verify
        let other = OracleSigner::generate().verifier();
        assert!(!other.verify(id, &handles, &cleartexts, &proof));
    }

    #[test]
    fn local_oracle() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (secret, public) = generate_tally_keypair(&mut rng);
        let signer = OracleSigner::generate();
        let mut oracle = LocalOracle::spawn(secret, signer, OracleConfig { max_count: 100 });
        let verifier = oracle.verifier();

        let handles: Vec<CipherHandle> = [12u64, 30]
            .iter()
            .map(|v| CipherHandle::from(public.encrypt(*v, &mut rng)))
            .collect();
        let id = oracle.request_decryption(&handles).unwrap();

        let response = oracle.next_response(WAIT).unwrap();
        assert_eq!(response.request_id, id);
        assert_eq!(decode_words(&response.cleartexts).unwrap(), vec![12, 30]);
        assert!(verifier.verify(id, &handles, &response.cleartexts, &response.proof));

        // Jobs that cannot be fulfilled produce no response
        let garbage = vec![CipherHandle::new(vec![0xff; 64])];
        oracle.request_decryption(&garbage).unwrap();
        let too_big = vec![CipherHandle::from(public.encrypt(101, &mut rng))];
        oracle.request_decryption(&too_big).unwrap();
        assert!(oracle.next_response(Duration::from_millis(200)).is_none());

        let json = serde_json::to_string(&response).unwrap();
        let back: DecryptionResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn seeded_signers_match() {
        let a = OracleSigner::from_rng(&mut ChaCha20Rng::seed_from_u64(9));
        let b = OracleSigner::from_rng(&mut ChaCha20Rng::seed_from_u64(9));
        assert_eq!(a.public_key(), b.public_key());

        let id = RequestId::new();
        let handles = vec![CipherHandle::new(vec![1])];
        let cleartexts = encode_words(&[1]);
        let proof = a.sign(id, &handles, &cleartexts).unwrap();
        assert!(b.verifier().verify(id, &handles, &cleartexts, &proof));
    }

    #[test]
    fn worker_panics_are_reported() {
        assert!(join_worker(thread::spawn(|| ())));
        assert!(!join_worker(thread::spawn(|| panic!("worker failed"))));
    }
}
