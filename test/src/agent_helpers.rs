use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolStruct;
use alloy_primitives::{Address, Bytes, U256};

use signals_core::types::Choice;
use signals_signing::{MatchChoice, SigningContext, TournamentJoin};

/// An agent with a throwaway key that can produce every signature the
/// protocol asks for.
pub struct TestAgent {
    signer: PrivateKeySigner,
    pub name: String,
}

impl TestAgent {
    pub fn new(name: &str) -> Self {
        Self {
            signer: PrivateKeySigner::random(),
            name: name.to_string(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn sign_choice(
        &self,
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
        let sig = self.signer.sign_hash_sync(&hash).expect("sign choice");
        Bytes::from(sig.as_bytes().to_vec())
    }

    pub fn sign_join(&self, ctx: &SigningContext, tournament_id: u64, nonce: U256) -> Bytes {
        let message = TournamentJoin {
            tournamentId: U256::from(tournament_id),
            nonce,
        };
        let hash = message.eip712_signing_hash(&ctx.domain());
        let sig = self.signer.sign_hash_sync(&hash).expect("sign join");
        Bytes::from(sig.as_bytes().to_vec())
    }

    /// EIP-191 personal message signature, used for auth challenges.
    pub fn sign_message(&self, message: &str) -> Bytes {
        let sig = self
            .signer
            .sign_message_sync(message.as_bytes())
            .expect("sign message");
        Bytes::from(sig.as_bytes().to_vec())
    }
}
