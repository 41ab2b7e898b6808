//! L1 action signing with an approved agent wallet.
//!
//! An action is hashed as `keccak256(msgpack(action) || nonce_be || vault_flag [|| vault])`,
//! that hash becomes the `connectionId` of an EIP-712 `Agent` message, and the
//! typed-data digest is signed with the agent's secp256k1 key.

use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use sha3::{Digest, Keccak256};

use super::types::SignatureWire;

/// EIP-712 domain chain id used for L1 actions (not the chain the venue runs on).
const L1_CHAIN_ID: u64 = 1337;

/// Signs exchange actions for one agent key.
#[derive(Clone)]
pub struct AgentSigner {
    key: SigningKey,
    address: String,
    is_mainnet: bool,
}

// The key must never reach a log line.
impl std::fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSigner")
            .field("address", &self.address)
            .field("is_mainnet", &self.is_mainnet)
            .finish()
    }
}

impl AgentSigner {
    /// Parse a hex private key (with or without `0x`).
    pub fn from_hex(secret: &str, is_mainnet: bool) -> Result<Self> {
        let bytes = hex::decode(secret.trim().trim_start_matches("0x"))
            .context("Agent secret key is not valid hex")?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Agent secret key is not a valid secp256k1 key: {e}"))?;
        let address = address_of(&key);

        Ok(Self {
            key,
            address,
            is_mainnet,
        })
    }

    /// Lowercase `0x` address of the agent wallet.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn sign_l1_action<A: Serialize>(
        &self,
        action: &A,
        vault_address: Option<&str>,
        nonce: u64,
    ) -> Result<SignatureWire> {
        let connection_id = action_hash(action, vault_address, nonce)?;
        let source = if self.is_mainnet { "a" } else { "b" };
        let digest = agent_digest(source, &connection_id);
        self.sign_digest(&digest)
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<SignatureWire> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest)
            .map_err(|e| anyhow::anyhow!("Failed to sign action: {e}"))?;
        let bytes = signature.to_bytes();

        Ok(SignatureWire {
            r: format!("0x{}", hex::encode(&bytes[..32])),
            s: format!("0x{}", hex::encode(&bytes[32..])),
            v: 27 + recovery_id.to_byte(),
        })
    }
}

pub(crate) fn keccak(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

fn address_of(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Hash identifying an action: the phantom agent's `connectionId`.
pub fn action_hash<A: Serialize>(
    action: &A,
    vault_address: Option<&str>,
    nonce: u64,
) -> Result<[u8; 32]> {
    let mut data = rmp_serde::to_vec_named(action).context("Failed to encode action as msgpack")?;
    data.extend_from_slice(&nonce.to_be_bytes());
    match vault_address {
        None => data.push(0x00),
        Some(vault) => {
            let bytes = hex::decode(vault.trim_start_matches("0x"))
                .context("Vault address is not valid hex")?;
            anyhow::ensure!(bytes.len() == 20, "Vault address must be 20 bytes");
            data.push(0x01);
            data.extend_from_slice(&bytes);
        }
    }
    Ok(keccak(&data))
}

/// EIP-712 digest of `Agent { source, connectionId }` in the `Exchange` domain.
fn agent_digest(source: &str, connection_id: &[u8; 32]) -> [u8; 32] {
    let domain_type = keccak(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let mut chain_id = [0u8; 32];
    chain_id[24..].copy_from_slice(&L1_CHAIN_ID.to_be_bytes());
    let verifying_contract = [0u8; 32];

    let mut domain = Vec::with_capacity(32 * 5);
    domain.extend_from_slice(&domain_type);
    domain.extend_from_slice(&keccak(b"Exchange"));
    domain.extend_from_slice(&keccak(b"1"));
    domain.extend_from_slice(&chain_id);
    domain.extend_from_slice(&verifying_contract);
    let domain_separator = keccak(&domain);

    let agent_type = keccak(b"Agent(string source,bytes32 connectionId)");
    let mut message = Vec::with_capacity(32 * 3);
    message.extend_from_slice(&agent_type);
    message.extend_from_slice(&keccak(source.as_bytes()));
    message.extend_from_slice(connection_id);
    let struct_hash = keccak(&message);

    let mut payload = Vec::with_capacity(2 + 64);
    payload.extend_from_slice(&[0x19, 0x01]);
    payload.extend_from_slice(&domain_separator);
    payload.extend_from_slice(&struct_hash);
    keccak(&payload)
}
