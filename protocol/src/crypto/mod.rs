//! # Hashing and Address Derivation
//!
//! Thin wrappers around the hash implementations plus the deterministic
//! address derivation used for vault proxies.

pub mod derive;
pub mod hash;

pub use derive::{derive_address, owner_salt, vault_proxy_code_hash};
pub use hash::{blake3_hash_multi, domain_separated_hash, sha256_array};
