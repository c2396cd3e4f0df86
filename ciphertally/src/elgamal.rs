//! Exponential ElGamal over the Ristretto group.
//!
//! A value `m` is encrypted as `(r·G, m·G + r·H)` where `H = x·G` is the tally public key.
//! Ciphertexts add component-wise, which adds the plaintexts. Decryption recovers `m·G` and
//! then solves a bounded discrete log, so this scheme suits counts, not arbitrary integers.

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::{CryptoRng, RngCore};
use std::collections::HashMap;
use std::convert::TryFrom;

pub const CIPHERTEXT_LENGTH: usize = 64;

/// Largest value a [`DiscreteLogTable`] will solve for; larger bounds are clamped to this.
pub const MAX_DISCRETE_LOG: u64 = 1 << 32;

fn base_mul(scalar: &Scalar) -> RistrettoPoint {
    scalar * &RISTRETTO_BASEPOINT_TABLE
}

/// An ElGamal ciphertext
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "CipherHandle", into = "CipherHandle")]
pub struct Ciphertext {
    c1: RistrettoPoint,
    c2: RistrettoPoint,
}

impl Ciphertext {
    /// Encryption of `value` with zero randomness. Anyone can produce it; only useful as a
    /// constant operand.
    pub fn trivial(value: u64) -> Self {
        Ciphertext {
            c1: RistrettoPoint::identity(),
            c2: base_mul(&Scalar::from(value)),
        }
    }

    pub fn to_bytes(&self) -> [u8; CIPHERTEXT_LENGTH] {
        let mut bytes = [0u8; CIPHERTEXT_LENGTH];
        bytes[..32].copy_from_slice(self.c1.compress().as_bytes());
        bytes[32..].copy_from_slice(self.c2.compress().as_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != CIPHERTEXT_LENGTH {
            return Err(Error::MalformedCiphertext);
        }
        let c1 = CompressedRistretto::from_slice(&bytes[..32])
            .decompress()
            .ok_or(Error::MalformedCiphertext)?;
        let c2 = CompressedRistretto::from_slice(&bytes[32..])
            .decompress()
            .ok_or(Error::MalformedCiphertext)?;
        Ok(Ciphertext { c1, c2 })
    }
}

impl From<Ciphertext> for CipherHandle {
    fn from(ciphertext: Ciphertext) -> Self {
        CipherHandle::new(ciphertext.to_bytes().to_vec())
    }
}

impl TryFrom<CipherHandle> for Ciphertext {
    type Error = Error;

    fn try_from(handle: CipherHandle) -> Result<Self, Self::Error> {
        Ciphertext::from_bytes(handle.as_bytes())
    }
}

/// Public key that ballots and tallies are encrypted under
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncryptionKey(RistrettoPoint);

impl EncryptionKey {
    /// Encrypt a count
    pub fn encrypt<R: RngCore + CryptoRng>(&self, value: u64, rng: &mut R) -> Ciphertext {
        let r = Scalar::random(rng);
        Ciphertext {
            c1: base_mul(&r),
            c2: base_mul(&Scalar::from(value)) + r * self.0,
        }
    }

    /// Encrypt a ballot choice as 1 (yes) or 0 (no)
    pub fn encrypt_bool<R: RngCore + CryptoRng>(&self, choice: bool, rng: &mut R) -> Ciphertext {
        self.encrypt(choice as u64, rng)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        CompressedRistretto::from_slice(bytes)
            .decompress()
            .map(EncryptionKey)
    }
}

/// Secret key held by the decryption oracle
#[derive(Clone)]
pub struct DecryptionKey(Scalar);

impl DecryptionKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        DecryptionKey(Scalar::random(rng))
    }

    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey(base_mul(&self.0))
    }

    /// Recover `m` from an encryption of `m`, provided `m <= table.max()`
    pub fn decrypt(&self, ciphertext: &Ciphertext, table: &DiscreteLogTable) -> Option<u64> {
        let point = ciphertext.c2 - self.0 * ciphertext.c1;
        table.solve(&point)
    }
}

/// Generate a tally keypair
pub fn generate_tally_keypair<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> (DecryptionKey, EncryptionKey) {
    let secret = DecryptionKey::generate(rng);
    let public = secret.encryption_key();
    (secret, public)
}

/// Baby-step giant-step lookup for `m` given `m·G`, for `m` in `0..=max`
///
/// `max` is clamped to [`MAX_DISCRETE_LOG`].
pub struct DiscreteLogTable {
    max: u64,
    step: u64,
    baby_steps: HashMap<[u8; 32], u64>,
    giant_step: RistrettoPoint,
}

impl DiscreteLogTable {
    pub fn new(max: u64) -> Self {
        let max = max.min(MAX_DISCRETE_LOG);
        let step = giant_step_size(max);

        let generator = base_mul(&Scalar::one());
        let mut baby_steps = HashMap::with_capacity(step as usize);
        let mut point = RistrettoPoint::identity();
        for j in 0..step {
            baby_steps.insert(point.compress().to_bytes(), j);
            point += generator;
        }

        DiscreteLogTable {
            max,
            step,
            baby_steps,
            giant_step: base_mul(&Scalar::from(step)),
        }
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn solve(&self, point: &RistrettoPoint) -> Option<u64> {
        let mut gamma = *point;
        for i in 0..=self.step {
            if let Some(j) = self.baby_steps.get(gamma.compress().as_bytes()) {
                let value = i * self.step + j;
                return if value <= self.max { Some(value) } else { None };
            }
            gamma -= self.giant_step;
        }
        None
    }
}

// Smallest `step` with `step * step > max`. Callers clamp `max` first, which bounds the loop.
fn giant_step_size(max: u64) -> u64 {
    let mut step = 1u64;
    while step.checked_mul(step).map_or(false, |square| square <= max) {
        step += 1;
    }
    step
}

/// [`CipherAlgebra`] backed by exponential ElGamal
///
/// Both integers and booleans are plain ciphertexts; a boolean is an encryption of 0 or 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElGamalAlgebra;

impl CipherAlgebra for ElGamalAlgebra {
    type Int = Ciphertext;
    type Bool = Ciphertext;

    fn zero(&self) -> Ciphertext {
        Ciphertext::trivial(0)
    }

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: lhs.c1 + rhs.c1,
            c2: lhs.c2 + rhs.c2,
        }
    }

    fn complement(&self, constant: u64, value: &Ciphertext) -> Ciphertext {
        Ciphertext {
            c1: -value.c1,
            c2: base_mul(&Scalar::from(constant)) - value.c2,
        }
    }

    // cond·(t - f) + f, with both constants folded in unconditionally
    fn select(&self, condition: &Ciphertext, if_true: u64, if_false: u64) -> Ciphertext {
        let delta = Scalar::from(if_true) - Scalar::from(if_false);
        Ciphertext {
            c1: delta * condition.c1,
            c2: delta * condition.c2 + base_mul(&Scalar::from(if_false)),
        }
    }

    fn handle(&self, value: &Ciphertext) -> CipherHandle {
        CipherHandle::from(*value)
    }

    fn bool_handle(&self, value: &Ciphertext) -> CipherHandle {
        CipherHandle::from(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn setup() -> (DecryptionKey, EncryptionKey, DiscreteLogTable, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let (secret, public) = generate_tally_keypair(&mut rng);
        (secret, public, DiscreteLogTable::new(1000), rng)
    }

    #[test]
    fn encrypt_decrypt() {
        let (secret, public, table, mut rng) = setup();

        for value in &[0u64, 1, 2, 31, 32, 33, 999, 1000] {
            let ct = public.encrypt(*value, &mut rng);
            assert_eq!(secret.decrypt(&ct, &table), Some(*value));
        }

        // Out of range for the table
        let ct = public.encrypt(1001, &mut rng);
        assert_eq!(secret.decrypt(&ct, &table), None);
    }

    #[test]
    fn table_bounds() {
        assert_eq!(giant_step_size(0), 1);
        assert_eq!(giant_step_size(1000), 32);
        assert_eq!(giant_step_size(1024), 33);
        assert_eq!(giant_step_size(MAX_DISCRETE_LOG), (1 << 16) + 1);

        let table = DiscreteLogTable::new(u64::MAX);
        assert_eq!(table.max(), MAX_DISCRETE_LOG);
        assert_eq!(table.step(), (1 << 16) + 1);

        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let (secret, public) = generate_tally_keypair(&mut rng);
        let ct = public.encrypt(123_456_789, &mut rng);
        assert_eq!(secret.decrypt(&ct, &table), Some(123_456_789));
    }

    #[test]
    fn homomorphic_operations() {
        let (secret, public, table, mut rng) = setup();
        let algebra = ElGamalAlgebra;

        let a = public.encrypt(5, &mut rng);
        let b = public.encrypt(7, &mut rng);
        assert_eq!(secret.decrypt(&algebra.add(&a, &b), &table), Some(12));
        assert_eq!(secret.decrypt(&algebra.zero(), &table), Some(0));
        assert_eq!(secret.decrypt(&algebra.complement(10, &a), &table), Some(5));

        let yes = public.encrypt_bool(true, &mut rng);
        let no = public.encrypt_bool(false, &mut rng);
        assert_eq!(secret.decrypt(&algebra.select(&yes, 1, 0), &table), Some(1));
        assert_eq!(secret.decrypt(&algebra.select(&no, 1, 0), &table), Some(0));
        assert_eq!(secret.decrypt(&algebra.select(&yes, 3, 9), &table), Some(3));
        assert_eq!(secret.decrypt(&algebra.select(&no, 3, 9), &table), Some(9));

        // Selected values are fresh-looking: same choice, different randomness
        let yes_again = public.encrypt_bool(true, &mut rng);
        assert_ne!(
            algebra.handle(&algebra.select(&yes, 1, 0)),
            algebra.handle(&algebra.select(&yes_again, 1, 0))
        );
    }

    #[test]
    fn ciphertext_bytes() {
        let (_secret, public, _table, mut rng) = setup();
        let ct = public.encrypt(42, &mut rng);

        let handle = ElGamalAlgebra.handle(&ct);
        assert_eq!(handle.as_bytes().len(), CIPHERTEXT_LENGTH);
        assert_eq!(Ciphertext::try_from(handle).unwrap(), ct);

        assert!(Ciphertext::from_bytes(&[0u8; 12]).is_err());
        assert!(Ciphertext::from_bytes(&[0xffu8; CIPHERTEXT_LENGTH]).is_err());

        let json = serde_json::to_string(&ct).unwrap();
        let back: Ciphertext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ct);

        let key_bytes = public.to_bytes();
        assert_eq!(EncryptionKey::from_bytes(&key_bytes), Some(public));
    }
}
