//! Verification of identity-provider access tokens.
//!
//! Tokens are checked either against the provider's published JSON Web Key
//! Set or, when no provider URL is configured, against a shared HS256 secret.
//! Verified claims are cached per token hash for a short TTL so a page load
//! fanning out into many requests verifies the token once.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::OidcConfig;

/// How long a fetched key set is trusted before it is fetched again.
const JWKS_TTL: Duration = Duration::from_secs(60 * 60);

/// Minimum gap between fetches triggered by an unknown key id.
const KEY_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("failed to fetch key set: {0}")]
    KeySet(#[from] reqwest::Error),
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("no key with id `{0}` in the provider's key set")]
    UnknownKey(String),
    #[error("algorithm {0:?} is not accepted for provider tokens")]
    RejectedAlgorithm(Algorithm),
    #[error("no token verification source is configured")]
    NoVerifier,
}

#[derive(Debug, Clone)]
pub enum VerifierMode {
    /// Keys from the provider's `certs` endpoint.
    Jwks { certs_url: String },
    /// HS256 with a shared secret.
    Secret(String),
    /// Nothing to verify against; every token is rejected.
    Disabled,
}

struct CachedClaims {
    claims: Value,
    expires_at: Instant,
}

struct CachedKeySet {
    keys: JwkSet,
    fetched_at: Instant,
}

pub struct TokenVerifier {
    mode: VerifierMode,
    ttl: Duration,
    key_set_ttl: Duration,
    key_refetch_interval: Duration,
    http: reqwest::Client,
    claims_cache: Mutex<HashMap<String, CachedClaims>>,
    key_set: Mutex<Option<CachedKeySet>>,
}

/// Compute the SHA-256 hash of a raw JWT string, returned as a hex-encoded string.
/// Used as the claims cache key so raw tokens are never held as map keys.
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl TokenVerifier {
    pub fn new(mode: VerifierMode, ttl: Duration) -> Self {
        Self {
            mode,
            ttl,
            key_set_ttl: JWKS_TTL,
            key_refetch_interval: KEY_REFETCH_INTERVAL,
            http: reqwest::Client::new(),
            claims_cache: Mutex::new(HashMap::new()),
            key_set: Mutex::new(None),
        }
    }

    /// JWKS mode when a provider URL is configured, shared-secret mode when
    /// only `OIDC_JWT_SECRET` is set.
    pub fn from_config(oidc: &OidcConfig) -> Self {
        let mode = match (&oidc.base_url, &oidc.jwt_secret) {
            (Some(base), _) => VerifierMode::Jwks {
                certs_url: format!("{base}/protocol/openid-connect/certs"),
            },
            (None, Some(secret)) => VerifierMode::Secret(secret.clone()),
            (None, None) => VerifierMode::Disabled,
        };
        Self::new(mode, oidc.token_cache_ttl)
    }

    /// Override how long a key set is trusted and how often an unknown key
    /// id may trigger a refetch.
    pub fn with_key_timing(mut self, key_set_ttl: Duration, key_refetch_interval: Duration) -> Self {
        self.key_set_ttl = key_set_ttl;
        self.key_refetch_interval = key_refetch_interval;
        self
    }

    pub fn mode(&self) -> &VerifierMode {
        &self.mode
    }

    /// Verified claims of `token`, or `None` if it is invalid or expired.
    pub async fn verify(&self, token: &str) -> Option<Value> {
        let key = hash_token(token);
        if let Some(claims) = self.cached(&key) {
            return Some(claims);
        }

        match self.decode(token).await {
            Ok(claims) => {
                self.remember(key, &claims);
                Some(claims)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                None
            }
        }
    }

    fn cached(&self, key: &str) -> Option<Value> {
        let cache = self
            .claims_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.claims.clone())
    }

    /// Cache `claims` until the TTL passes or the token expires, whichever
    /// comes first.
    fn remember(&self, key: String, claims: &Value) {
        let lifetime = match claims.get("exp").and_then(Value::as_u64) {
            Some(exp) => self.ttl.min(Duration::from_secs(exp.saturating_sub(unix_now()))),
            None => self.ttl,
        };
        if lifetime.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut cache = self
            .claims_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, entry| entry.expires_at > now);
        cache.insert(
            key,
            CachedClaims {
                claims: claims.clone(),
                expires_at: now + lifetime,
            },
        );
    }

    /// Number of live entries in the claims cache.
    pub fn cached_tokens(&self) -> usize {
        let now = Instant::now();
        self.claims_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    async fn decode(&self, token: &str) -> Result<Value, VerifyError> {
        match &self.mode {
            VerifierMode::Disabled => Err(VerifyError::NoVerifier),
            VerifierMode::Secret(secret) => {
                let mut validation = Validation::new(Algorithm::HS256);
                validation.validate_aud = false;
                let data = decode::<Value>(
                    token,
                    &DecodingKey::from_secret(secret.as_bytes()),
                    &validation,
                )?;
                Ok(data.claims)
            }
            VerifierMode::Jwks { certs_url } => {
                let header = decode_header(token)?;
                if matches!(
                    header.alg,
                    Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
                ) {
                    return Err(VerifyError::RejectedAlgorithm(header.alg));
                }
                let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
                let key = self.decoding_key(certs_url, &kid).await?;

                let mut validation = Validation::new(header.alg);
                validation.validate_aud = false;
                let data = decode::<Value>(token, &key, &validation)?;
                Ok(data.claims)
            }
        }
    }

    /// Key for `kid`, from the cached set while it is fresh. An unknown id
    /// triggers a refetch at most once per refetch interval.
    async fn decoding_key(&self, certs_url: &str, kid: &str) -> Result<DecodingKey, VerifyError> {
        let (cached, may_fetch) = {
            let slot = self.key_set.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(set) if set.fetched_at.elapsed() < self.key_set_ttl => (
                    set.keys.find(kid).cloned(),
                    set.fetched_at.elapsed() >= self.key_refetch_interval,
                ),
                _ => (None, true),
            }
        };
        if let Some(jwk) = cached {
            return Ok(DecodingKey::from_jwk(&jwk)?);
        }
        if !may_fetch {
            return Err(VerifyError::UnknownKey(kid.to_string()));
        }

        tracing::debug!(url = certs_url, kid, "Fetching provider key set");
        let keys: JwkSet = self
            .http
            .get(certs_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let jwk = keys.find(kid).cloned();

        *self.key_set.lock().unwrap_or_else(PoisonError::into_inner) = Some(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
        });

        let jwk = jwk.ok_or_else(|| VerifyError::UnknownKey(kid.to_string()))?;
        Ok(DecodingKey::from_jwk(&jwk)?)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
