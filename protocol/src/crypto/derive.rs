//! Deterministic address derivation.
//!
//! A deployed instance's address is a pure function of who deploys it, the
//! salt it is deployed with and the hash of its creation code:
//!
//! ```text
//! address = last20(BLAKE3(0xff || deployer || salt || code_hash))
//! ```
//!
//! Because nothing else goes into the preimage, anyone can compute the
//! address before the deployment happens. Vault factories rely on this so a
//! user can approve their future vault before it exists.

use super::hash::{blake3_hash_multi, sha256_array};
use crate::types::Address;

/// Prefix byte that keeps derived addresses out of the label namespace.
const DERIVATION_PREFIX: u8 = 0xff;

/// Creation-code identifier of the vault proxy. Every vault proxy is deployed
/// from the same code, so its hash is a constant of the protocol.
pub const VAULT_PROXY_CREATION_CODE: &[u8] = b"margin-protocol/isolation-mode-vault-proxy/v1";

/// Hash of [`VAULT_PROXY_CREATION_CODE`].
pub fn vault_proxy_code_hash() -> [u8; 32] {
    sha256_array(VAULT_PROXY_CREATION_CODE)
}

/// Derives the address of an instance deployed by `deployer` with `salt`.
pub fn derive_address(deployer: &Address, salt: &[u8; 32], code_hash: &[u8; 32]) -> Address {
    let digest = blake3_hash_multi(&[
        &[DERIVATION_PREFIX],
        deployer.as_bytes(),
        salt,
        code_hash,
    ]);
    Address::from_digest(&digest)
}

/// Salt used for a per-owner instance: the owner's address left-padded to 32
/// bytes.
pub fn owner_salt(owner: &Address) -> [u8; 32] {
    let mut salt = [0u8; 32];
    salt[12..].copy_from_slice(owner.as_bytes());
    salt
}
