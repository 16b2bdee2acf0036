//! Challenge/response authentication. A challenge is one-shot: verifying
//! it, successfully or not against the right signer, consumes it.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::Signature;

use signals_core::types::{current_timestamp, Address, Bytes};
use tracing::debug;

struct Challenge {
    text: String,
    expires_at: u64,
}

pub struct AuthChallenge {
    pub challenge_id: String,
    pub challenge: String,
    pub expires_at: u64,
}

pub struct AuthManager {
    ttl_ms: u64,
    challenges: Mutex<HashMap<String, Challenge>>,
}

impl AuthManager {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            challenges: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate_challenge(&self) -> AuthChallenge {
        let now = current_timestamp();
        let challenge_id = hex::encode(rand::random::<[u8; 16]>());
        let nonce = hex::encode(rand::random::<[u8; 32]>());
        let text = format!("Signals authentication\nNonce: 0x{nonce}\nIssued at: {now}");
        let expires_at = now + self.ttl_ms;

        let mut challenges = self.challenges.lock().expect("auth lock");
        challenges.retain(|_, c| c.expires_at > now);
        challenges.insert(
            challenge_id.clone(),
            Challenge {
                text: text.clone(),
                expires_at,
            },
        );

        AuthChallenge {
            challenge_id,
            challenge: text,
            expires_at,
        }
    }

    /// Recover the signer of the challenge text and compare against the
    /// claimed address. Missing, expired, or mismatched → false.
    pub fn verify_challenge(&self, challenge_id: &str, address: Address, signature: &Bytes) -> bool {
        let challenge = {
            let mut challenges = self.challenges.lock().expect("auth lock");
            match challenges.remove(challenge_id) {
                Some(c) => c,
                None => return false,
            }
        };
        if challenge.expires_at < current_timestamp() {
            debug!("Challenge {} expired", challenge_id);
            return false;
        }
        let Ok(sig) = Signature::from_raw(signature) else {
            return false;
        };
        match sig.recover_address_from_msg(challenge.text.as_bytes()) {
            Ok(recovered) => recovered == address,
            Err(e) => {
                debug!("Challenge recovery failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signals_test::TestAgent;

    #[test]
    fn test_challenge_roundtrip() {
        let auth = AuthManager::new(60_000);
        let agent = TestAgent::new("alice");
        let challenge = auth.generate_challenge();
        let sig = agent.sign_message(&challenge.challenge);

        assert!(auth.verify_challenge(&challenge.challenge_id, agent.address(), &sig));
        // Consumed on first use.
        assert!(!auth.verify_challenge(&challenge.challenge_id, agent.address(), &sig));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let auth = AuthManager::new(60_000);
        let agent = TestAgent::new("alice");
        let other = TestAgent::new("mallory");
        let challenge = auth.generate_challenge();
        let sig = other.sign_message(&challenge.challenge);

        assert!(!auth.verify_challenge(&challenge.challenge_id, agent.address(), &sig));
    }

    #[test]
    fn test_expired_challenge_rejected() {
        let auth = AuthManager::new(0);
        let agent = TestAgent::new("alice");
        let challenge = auth.generate_challenge();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let sig = agent.sign_message(&challenge.challenge);

        assert!(!auth.verify_challenge(&challenge.challenge_id, agent.address(), &sig));
    }

    #[test]
    fn test_unknown_challenge_rejected() {
        let auth = AuthManager::new(60_000);
        let agent = TestAgent::new("alice");
        let sig = agent.sign_message("whatever");
        assert!(!auth.verify_challenge("missing", agent.address(), &sig));
    }
}
