//! PKCE (Proof Key for Code Exchange) and CSRF state generation.
//!
//! RFC 7636: <https://datatracker.ietf.org/doc/html/rfc7636>
//!
//! Every random value here is drawn from the operating system's CSPRNG. If the
//! OS cannot supply bytes the caller gets [`OidcError::EntropyUnavailable`];
//! there is no fallback generator.

use crate::error::{OidcError, OidcResult};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Number of random bytes behind a code verifier (86 base64url chars).
pub const VERIFIER_BYTES: usize = 64;

/// Number of random bytes behind a CSRF state value (43 base64url chars).
pub const STATE_BYTES: usize = 32;

/// The only challenge method this client emits.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier and its derived S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

impl PkcePair {
    /// Generate a fresh verifier and challenge.
    pub fn generate() -> OidcResult<Self> {
        let code_verifier = random_urlsafe(VERIFIER_BYTES)?;
        let code_challenge = Self::challenge_for(&code_verifier);

        Ok(Self {
            code_verifier,
            code_challenge,
        })
    }

    /// `base64url_nopad(sha256(verifier))`
    pub fn challenge_for(code_verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    pub fn verify(code_verifier: &str, code_challenge: &str) -> bool {
        Self::challenge_for(code_verifier) == code_challenge
    }

    pub fn method(&self) -> &'static str {
        CODE_CHALLENGE_METHOD
    }
}

/// Generate an opaque CSRF state value for one authorization attempt.
pub fn generate_state() -> OidcResult<String> {
    random_urlsafe(STATE_BYTES)
}

/// Compare a callback's state with the stored one in time independent of
/// where they differ. Both sides are hashed first so lengths leak nothing.
pub(crate) fn state_matches(expected: &str, received: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let received = Sha256::digest(received.as_bytes());
    expected
        .iter()
        .zip(received.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Fill `len` bytes from the OS CSPRNG and base64url-encode them without padding.
pub(crate) fn random_urlsafe(len: usize) -> OidcResult<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| OidcError::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
