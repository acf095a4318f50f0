//! Purge tokens — signed owner consent for irreversible deletion.
//!
//! A token is `nonce.timestamp.signature` where `nonce` is 16 random bytes
//! (hex), `timestamp` is the issue time in Unix milliseconds and
//! `signature` is hex HMAC-SHA256 over the length-prefixed fields
//! `(contract_id, owner, nonce, timestamp)`.

use chrono::{DateTime, Utc};
use covenant_config::PurgeConfig;
use covenant_core::error::PurgeTokenError;
use covenant_core::{Clock, SystemClock};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 16;

/// A parsed purge token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeToken {
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

impl PurgeToken {
    /// Split a token string into its three fields. Checks shape only; the
    /// signature is checked by [`PurgeSigner::verify`].
    pub fn parse(token: &str) -> Result<Self, PurgeTokenError> {
        let mut parts = token.split('.');
        let (Some(nonce), Some(timestamp), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PurgeTokenError::BadFormat);
        };
        if nonce.is_empty() || signature.is_empty() || !is_canonical_millis(timestamp) {
            return Err(PurgeTokenError::BadFormat);
        }
        let millis: i64 = timestamp.parse().map_err(|_| PurgeTokenError::BadFormat)?;
        let issued_at =
            DateTime::from_timestamp_millis(millis).ok_or(PurgeTokenError::BadFormat)?;

        Ok(Self {
            nonce: nonce.to_string(),
            issued_at,
            signature: signature.to_string(),
        })
    }
}

impl fmt::Display for PurgeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.nonce,
            self.issued_at.timestamp_millis(),
            self.signature
        )
    }
}

/// Issues and verifies purge tokens with a process-held secret.
pub struct PurgeSigner {
    key: Vec<u8>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for PurgeSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurgeSigner")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl PurgeSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: secret.to_vec(),
            clock: Arc::new(SystemClock),
        }
    }

    /// A signer with a fresh random secret. Tokens it issues can only be
    /// verified by this instance.
    pub fn ephemeral() -> Self {
        use rand::Rng;
        let mut key = vec![0u8; 32];
        rand::rng().fill(&mut key[..]);
        Self::new(&key)
    }

    /// Use the configured secret, or an ephemeral one when none is set.
    pub fn from_config(config: &PurgeConfig) -> Self {
        match &config.secret {
            Some(secret) => Self::new(secret.as_bytes()),
            None => {
                tracing::warn!(
                    "No purge secret configured; purge tokens will only verify within this process"
                );
                Self::ephemeral()
            }
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a token. Every call draws a fresh nonce, so identical inputs
    /// never yield identical tokens.
    pub fn generate(&self, contract_id: &str, owner: &str) -> PurgeToken {
        let nonce = generate_nonce();
        let millis = self.clock.now().timestamp_millis();
        // Truncate to the precision the token carries.
        let issued_at = DateTime::from_timestamp_millis(millis).unwrap_or_default();
        let signature = hex::encode(self.sign(contract_id, owner, &nonce, millis));
        PurgeToken {
            nonce,
            issued_at,
            signature,
        }
    }

    /// Parse `token` and check its signature against `(contract_id, owner)`.
    pub fn verify(
        &self,
        token: &str,
        contract_id: &str,
        owner: &str,
    ) -> Result<PurgeToken, PurgeTokenError> {
        let parsed = PurgeToken::parse(token)?;
        // Only the lower-case encoding is issued; any other spelling of the
        // same bytes is an altered token.
        if !parsed
            .signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(PurgeTokenError::BadSignature);
        }
        let provided = hex::decode(&parsed.signature).map_err(|_| PurgeTokenError::BadSignature)?;

        let mut mac = self.mac();
        feed(
            &mut mac,
            contract_id,
            owner,
            &parsed.nonce,
            parsed.issued_at.timestamp_millis(),
        );
        // Constant-time comparison via `verify_slice`
        mac.verify_slice(&provided)
            .map_err(|_| PurgeTokenError::BadSignature)?;
        Ok(parsed)
    }

    fn sign(&self, contract_id: &str, owner: &str, nonce: &str, millis: i64) -> Vec<u8> {
        let mut mac = self.mac();
        feed(&mut mac, contract_id, owner, nonce, millis);
        mac.finalize().into_bytes().to_vec()
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }
}

/// Length-prefix every field so no two field tuples share an encoding.
fn feed(mac: &mut HmacSha256, contract_id: &str, owner: &str, nonce: &str, millis: i64) {
    let millis = millis.to_string();
    for field in [contract_id, owner, nonce, millis.as_str()] {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field.as_bytes());
    }
}

/// Unsigned decimal without leading zeros, the only form `generate` emits.
fn is_canonical_millis(field: &str) -> bool {
    !field.is_empty()
        && field.bytes().all(|b| b.is_ascii_digit())
        && (field == "0" || !field.starts_with('0'))
}

fn generate_nonce() -> String {
    use rand::Rng;
    let mut nonce = [0u8; NONCE_BYTES];
    rand::rng().fill(&mut nonce[..]);
    hex::encode(nonce)
}
