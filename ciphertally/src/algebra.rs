use crate::CipherHandle;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Operations over an additively homomorphic encryption scheme.
///
/// The ledger never looks inside a ciphertext; it only composes these operations and compares
/// handles. Any scheme offering them can back a ledger without touching batch or decryption
/// logic.
pub trait CipherAlgebra {
    /// Encrypted unsigned integer
    type Int: Clone + Debug + Serialize + DeserializeOwned;

    /// Encrypted boolean
    type Bool: Debug;

    /// Encryption of zero
    fn zero(&self) -> Self::Int;

    /// Encryption of `lhs + rhs`
    fn add(&self, lhs: &Self::Int, rhs: &Self::Int) -> Self::Int;

    /// Encryption of `constant - value`
    fn complement(&self, constant: u64, value: &Self::Int) -> Self::Int;

    /// Encryption of `if_true` when `condition` holds and `if_false` otherwise.
    ///
    /// Implementations must compute both branches; control flow may not depend on the encrypted
    /// condition.
    fn select(&self, condition: &Self::Bool, if_true: u64, if_false: u64) -> Self::Int;

    /// Handle for an encrypted integer. Equal ciphertexts have equal handles.
    fn handle(&self, value: &Self::Int) -> CipherHandle;

    /// Handle for an encrypted boolean
    fn bool_handle(&self, value: &Self::Bool) -> CipherHandle;
}
