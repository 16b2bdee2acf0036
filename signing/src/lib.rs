//! EIP-712 typed payloads the agents sign, and the orchestrator-side
//! verification of those signatures.
//!
//! Verification never trusts the wire: the struct hash is rebuilt from the
//! orchestrator's own view of the match and the claimed signer must be
//! recovered from the signature.

use alloy::dyn_abi::TypedData;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use alloy_primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use tracing::debug;

use signals_core::error::{Error, Result};
use signals_core::types::Choice;

sol! {
    /// What an agent signs to lock in a match choice.
    #[derive(serde::Serialize)]
    struct MatchChoice {
        uint256 matchId;
        uint8 choice;
        uint256 nonce;
    }

    /// What an agent signs to authorize a gasless tournament join.
    #[derive(serde::Serialize)]
    struct TournamentJoin {
        uint256 tournamentId;
        uint256 nonce;
    }
}

/// Domain parameters shared by every payload this deployment produces.
#[derive(Debug, Clone, Copy)]
pub struct SigningContext {
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl SigningContext {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            chain_id,
            verifying_contract,
        }
    }

    pub fn domain(&self) -> Eip712Domain {
        eip712_domain! {
            name: "Signals",
            version: "2",
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }

    /// Wallet-ready typed data for a match choice. The `choice` field is a
    /// placeholder; the agent substitutes its decision before signing.
    pub fn build_choice_payload(&self, match_id: u64, nonce: U256) -> Result<serde_json::Value> {
        let message = MatchChoice {
            matchId: U256::from(match_id),
            choice: 0,
            nonce,
        };
        let typed = TypedData::from_struct(&message, Some(self.domain()));
        serde_json::to_value(&typed).map_err(Into::into)
    }

    pub fn verify_choice(
        &self,
        match_id: u64,
        choice: Choice,
        nonce: U256,
        signature: &Bytes,
        expected_signer: Address,
    ) -> bool {
        let message = MatchChoice {
            matchId: U256::from(match_id),
            choice: choice as u8,
            nonce,
        };
        self.verify_struct(&message, signature, expected_signer)
    }

    pub fn build_tournament_join_payload(
        &self,
        tournament_id: u64,
        nonce: U256,
    ) -> Result<serde_json::Value> {
        let message = TournamentJoin {
            tournamentId: U256::from(tournament_id),
            nonce,
        };
        let typed = TypedData::from_struct(&message, Some(self.domain()));
        serde_json::to_value(&typed).map_err(Into::into)
    }

    pub fn verify_tournament_join(
        &self,
        tournament_id: u64,
        nonce: U256,
        signature: &Bytes,
        expected_signer: Address,
    ) -> bool {
        let message = TournamentJoin {
            tournamentId: U256::from(tournament_id),
            nonce,
        };
        self.verify_struct(&message, signature, expected_signer)
    }

    fn verify_struct<S: SolStruct>(
        &self,
        message: &S,
        signature: &Bytes,
        expected_signer: Address,
    ) -> bool {
        let hash = message.eip712_signing_hash(&self.domain());
        match recover(signature, &hash) {
            Ok(recovered) => recovered == expected_signer,
            Err(e) => {
                debug!("Signature recovery failed: {}", e);
                false
            }
        }
    }
}

fn recover(signature: &Bytes, prehash: &B256) -> Result<Address> {
    let sig = Signature::from_raw(signature).map_err(|_| Error::InvalidSignature)?;
    sig.recover_address_from_prehash(prehash)
        .map_err(|_| Error::InvalidSignature)
}

/// Public commitment broadcast at lock time: H(signature ‖ salt).
pub fn generate_commit_hash(signature: &Bytes, salt: &B256) -> B256 {
    let mut preimage = Vec::with_capacity(signature.len() + 32);
    preimage.extend_from_slice(signature);
    preimage.extend_from_slice(salt.as_slice());
    keccak256(preimage)
}

/// Fresh 32-byte per-match salt.
pub fn generate_match_salt() -> B256 {
    B256::random()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    fn ctx() -> SigningContext {
        SigningContext::new(8453, Address::repeat_byte(0x42))
    }

    fn sign_choice(
        signer: &PrivateKeySigner,
        ctx: &SigningContext,
        match_id: u64,
        choice: Choice,
        nonce: U256,
    ) -> Bytes {
        let message = MatchChoice {
            matchId: U256::from(match_id),
            choice: choice as u8,
            nonce,
        };
        let hash = message.eip712_signing_hash(&ctx.domain());
        let sig = signer.sign_hash_sync(&hash).unwrap();
        Bytes::from(sig.as_bytes().to_vec())
    }

    #[test]
    fn test_verify_choice_roundtrip() {
        let ctx = ctx();
        let signer = PrivateKeySigner::random();
        let nonce = U256::from(7);
        let sig = sign_choice(&signer, &ctx, 42, Choice::Split, nonce);

        assert!(ctx.verify_choice(42, Choice::Split, nonce, &sig, signer.address()));
        // Tampered choice
        assert!(!ctx.verify_choice(42, Choice::Steal, nonce, &sig, signer.address()));
        // Wrong match
        assert!(!ctx.verify_choice(43, Choice::Split, nonce, &sig, signer.address()));
        // Wrong signer
        assert!(!ctx.verify_choice(42, Choice::Split, nonce, &sig, Address::repeat_byte(9)));
        // Stale nonce
        assert!(!ctx.verify_choice(42, Choice::Split, U256::from(8), &sig, signer.address()));
    }

    #[test]
    fn test_verify_tournament_join_roundtrip() {
        let ctx = ctx();
        let signer = PrivateKeySigner::random();
        let nonce = U256::from(3);
        let message = TournamentJoin {
            tournamentId: U256::from(5),
            nonce,
        };
        let hash = message.eip712_signing_hash(&ctx.domain());
        let sig = Bytes::from(signer.sign_hash_sync(&hash).unwrap().as_bytes().to_vec());

        assert!(ctx.verify_tournament_join(5, nonce, &sig, signer.address()));
        assert!(!ctx.verify_tournament_join(6, nonce, &sig, signer.address()));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let ctx = ctx();
        let sig = Bytes::from(vec![0u8; 65]);
        assert!(!ctx.verify_choice(1, Choice::Split, U256::ZERO, &sig, Address::ZERO));
        let sig = Bytes::from(vec![1, 2, 3]);
        assert!(!ctx.verify_choice(1, Choice::Split, U256::ZERO, &sig, Address::ZERO));
    }

    #[test]
    fn test_choice_payload_shape() {
        let ctx = ctx();
        let payload = ctx.build_choice_payload(9, U256::from(1)).unwrap();
        assert_eq!(payload["primaryType"], "MatchChoice");
        assert_eq!(payload["domain"]["name"], "Signals");
        assert_eq!(payload["domain"]["version"], "2");
        assert!(payload["message"].get("matchId").is_some());
        assert!(payload["message"].get("nonce").is_some());
    }

    #[test]
    fn test_commit_hash_binds_salt_and_signature() {
        let sig_a = Bytes::from(vec![1u8; 65]);
        let sig_b = Bytes::from(vec![2u8; 65]);
        let salt_a = B256::repeat_byte(3);
        let salt_b = B256::repeat_byte(4);

        let h = generate_commit_hash(&sig_a, &salt_a);
        assert_eq!(h, generate_commit_hash(&sig_a, &salt_a));
        assert_ne!(h, generate_commit_hash(&sig_b, &salt_a));
        assert_ne!(h, generate_commit_hash(&sig_a, &salt_b));

        let mut preimage = sig_a.to_vec();
        preimage.extend_from_slice(salt_a.as_slice());
        assert_eq!(h, keccak256(preimage));
    }

    #[test]
    fn test_salts_are_unique() {
        assert_ne!(generate_match_salt(), generate_match_salt());
    }
}
