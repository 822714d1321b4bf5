//! PKCE (Proof Key for Code Exchange) support for the interactive flow.
//!
//! Implements RFC 7636 so public clients can complete the authorization
//! code flow without a secret. The challenge pair lives for exactly one
//! authorization round trip.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// The challenge method sent to the provider; always S256.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE challenge pair plus the CSRF state for one authorization request.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random verifier, kept secret until token exchange.
    pub code_verifier: String,
    /// `BASE64URL(SHA256(code_verifier))`, sent in the authorization URL.
    pub code_challenge: String,
    /// Random state token validated on redirect completion.
    pub state: String,
}

impl PkceChallenge {
    /// Generate a new challenge with cryptographically secure randomness.
    ///
    /// The verifier is 32 random bytes base64url-encoded (43 characters,
    /// within the RFC 7636 43-128 limit).
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = random_urlsafe(32);
        let code_challenge = challenge_for(&code_verifier);
        let state = random_urlsafe(32);
        Self { code_verifier, code_challenge, state }
    }
}

fn random_urlsafe(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    let random: Vec<u8> = (0..bytes).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(random)
}

fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    //! Unit tests for PKCE generation.
    use super::*;

    /// Verifier and state meet RFC 7636 length and charset constraints.
    #[test]
    fn verifier_format() {
        let pkce = PkceChallenge::generate();

        assert!(pkce.code_verifier.len() >= 43 && pkce.code_verifier.len() <= 128);
        assert!(pkce
            .code_verifier
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
        assert!(pkce.state.len() >= 32);
    }

    /// The challenge is the S256 transform of the verifier.
    #[test]
    fn challenge_matches_verifier() {
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.code_challenge, challenge_for(&pkce.code_verifier));
    }

    /// Known S256 vector from RFC 7636 appendix B.
    #[test]
    fn rfc7636_test_vector() {
        assert_eq!(
            challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    /// Consecutive generations never collide.
    #[test]
    fn generations_are_unique() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();

        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.state, b.state);
    }
}
