//! Homomorphic batch tallying.
//!
//! Encrypted yes/no ballots are accumulated into per-batch ciphertext tallies without ever being
//! decrypted individually. Once a batch is closed, its tally is handed to an external decryption
//! oracle; the plaintext counts are only published after the oracle's answer has been checked
//! against the exact ciphertext snapshot that was requested.
//!
//! All state lives in [`LedgerState`], which every entry point takes by `&mut self`.

#[macro_use]
extern crate serde;

mod access;
mod algebra;
mod batch;
mod config;
mod decryption;
mod elgamal;
mod error;
mod identifier;
mod ledger;
mod notification;
mod oracle;
mod serde_hex;
mod util;

pub use access::*;
pub use algebra::*;
pub use batch::*;
pub use config::*;
pub use decryption::*;
pub use elgamal::*;
pub use error::*;
pub use identifier::*;
pub use ledger::*;
pub use notification::*;
pub use oracle::*;
pub use serde_hex::*;
pub use util::*;
