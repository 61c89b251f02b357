//! Signed, time-boxed download links.
//!
//! Signature = base64url(HMAC-SHA256(secret, "{resource_id}|{expiry}")),
//! where `expiry` is a Unix timestamp in seconds.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signer errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The secret is empty.
    #[error("signing secret must not be empty")]
    EmptySecret,
    /// The secret was rejected by HMAC.
    #[error("invalid signing secret")]
    InvalidSecret,
    /// The link lifetime does not fit the timestamp range.
    #[error("download link ttl is out of range")]
    ExpiryOutOfRange,
}

/// A signed link's query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedLink {
    /// Unix expiry in seconds.
    pub expires: i64,
    /// URL-safe signature.
    pub signature: String,
}

/// Stateless HMAC signer for anonymous download links.
#[derive(Clone)]
pub struct SignedUrlService {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignedUrlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedUrlService").finish_non_exhaustive()
    }
}

impl SignedUrlService {
    /// Create a signer with a server-held secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SigningError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SigningError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SigningError::InvalidSecret)?;
        Ok(Self { mac })
    }

    /// Signature for `resource_id` valid until `expiry` (Unix seconds).
    #[must_use]
    pub fn compute_signature(&self, resource_id: &str, expiry: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(format!("{resource_id}|{expiry}").as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Sign a link for `resource_id` that lives for `ttl` from `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if `now + ttl` is not a representable time.
    pub fn sign(
        &self,
        resource_id: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<SignedLink, SigningError> {
        let expires = now
            .checked_add_signed(ttl)
            .ok_or(SigningError::ExpiryOutOfRange)?
            .timestamp();
        Ok(SignedLink {
            expires,
            signature: self.compute_signature(resource_id, expires),
        })
    }

    /// Whether `signature` is valid for `resource_id` and has not expired.
    #[must_use]
    pub fn is_valid(&self, resource_id: &str, expiry: i64, signature: &str) -> bool {
        self.is_valid_at(resource_id, expiry, signature, Utc::now())
    }

    /// [`Self::is_valid`] at an explicit time.
    #[must_use]
    pub fn is_valid_at(
        &self,
        resource_id: &str,
        expiry: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() > expiry {
            return false;
        }
        let expected = self.compute_signature(resource_id, expiry);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }
}
