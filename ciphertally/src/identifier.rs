use crate::*;
use digest::Digest;
use ed25519_dalek::PublicKey;
use sha2::Sha256;
use std::convert::TryInto;
use std::str::FromStr;
use uuid::Uuid;

/// Batch identifier. Batches are numbered from 1; 0 never names a batch.
pub type BatchId = u64;

/// An opaque, fixed-size caller identity
///
/// The execution environment authenticates callers; the ledger only compares principals.
#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(#[serde(with = "hex_32")] [u8; 32]);

impl Principal {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Principal(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<&PublicKey> for Principal {
    fn from(public_key: &PublicKey) -> Self {
        Principal(public_key.to_bytes())
    }
}

impl FromStr for Principal {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Principal(bytes))
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Principal({})", self)
    }
}

/// Correlation id for a decryption request, issued by the oracle
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random request id
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        RequestId::new()
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a ciphertext. Carries nothing about the plaintext.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CipherHandle(#[serde(with = "hex_serde")] Vec<u8>);

impl CipherHandle {
    pub fn new(bytes: Vec<u8>) -> Self {
        CipherHandle(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for CipherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl std::fmt::Debug for CipherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "CipherHandle({})", self)
    }
}

const STATE_HASH_DOMAIN: &[u8] = b"ciphertally/state-hash/v1";

/// Digest binding a decryption request to an exact ciphertext snapshot and to the deployment
/// that issued it.
#[derive(Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StateHash(#[serde(with = "hex_32")] [u8; 32]);

impl StateHash {
    /// Hash an ordered sequence of ciphertext handles together with the system identity.
    ///
    /// Every handle is length-prefixed, so no two distinct sequences share an encoding.
    pub fn compute(system_id: &Uuid, handles: &[CipherHandle]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(STATE_HASH_DOMAIN);
        hasher.update(system_id.as_bytes());
        hasher.update((handles.len() as u64).to_be_bytes());
        for handle in handles {
            hasher.update((handle.as_bytes().len() as u64).to_be_bytes());
            hasher.update(handle.as_bytes());
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        StateHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for StateHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "StateHash({})", self)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_principal() {
        let (_secret, public) = generate_keypair();
        let principal = Principal::from(&public);

        let stringed = principal.to_string();
        assert_eq!(stringed.len(), 64);
        let from_string = Principal::from_str(&stringed).unwrap();
        assert_eq!(principal, from_string);

        assert!(Principal::from_str("abcd").is_err());
        assert!(Principal::from_str("not hex").is_err());

        let json = serde_json::to_string(&principal).unwrap();
        assert_eq!(json, format!("\"{}\"", stringed));
        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(principal, back);
    }

    #[test]
    fn test_state_hash() {
        let system_id = Uuid::new_v4();
        let yes = CipherHandle::new(vec![1, 2, 3]);
        let no = CipherHandle::new(vec![4, 5]);

        let hash = StateHash::compute(&system_id, &[yes.clone(), no.clone()]);
        assert_eq!(hash, StateHash::compute(&system_id, &[yes.clone(), no.clone()]));

        // Order matters
        assert_ne!(hash, StateHash::compute(&system_id, &[no.clone(), yes.clone()]));

        // Same bytes split differently must not collide
        let joined = CipherHandle::new(vec![1, 2, 3, 4, 5]);
        let empty = CipherHandle::new(vec![]);
        assert_ne!(hash, StateHash::compute(&system_id, &[joined, empty]));

        // Another deployment produces another hash
        let other_system = Uuid::new_v4();
        assert_ne!(hash, StateHash::compute(&other_system, &[yes, no]));
    }
}
