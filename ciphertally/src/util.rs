use crate::Principal;
use ed25519_dalek::Keypair;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use rand_core::{CryptoRng, RngCore};

pub fn generate_keypair() -> (SecretKey, PublicKey) {
    generate_keypair_from(&mut rand::rngs::OsRng {})
}

/// Generate a keypair from a caller-supplied RNG, so seeded runs are reproducible
pub fn generate_keypair_from<R: RngCore + CryptoRng>(rng: &mut R) -> (SecretKey, PublicKey) {
    let Keypair { public, secret } = Keypair::generate(rng);
    (secret, public)
}

/// Generate a fresh principal, discarding its secret key
pub fn generate_principal() -> Principal {
    generate_principal_from(&mut rand::rngs::OsRng {})
}

pub fn generate_principal_from<R: RngCore + CryptoRng>(rng: &mut R) -> Principal {
    let (_secret, public) = generate_keypair_from(rng);
    Principal::from(&public)
}
