//! Short-lived identity tokens (HS256 JWT).
//!
//! Tokens carry `(user, tenant, role)` and are minted fresh for every
//! remote call; they are never cached. The same key verifies bearer tokens
//! on the HTTP API.
//!
//! Format: `base64url(header).base64url(claims).base64url(hmac_sha256)`,
//! unpadded, with header `{"alg":"HS256","typ":"JWT"}`.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use tenant_rag_core::models::Role;

use crate::config::IdentityConfig;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub tenant_id: String,
    pub role: String,
    pub iss: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    /// Unique token id (UUID v4).
    pub jti: String,
}

impl Claims {
    pub fn role(&self) -> Result<Role> {
        Role::parse(&self.role)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token issuer mismatch")]
    WrongIssuer,
    #[error("token claims invalid: {0}")]
    InvalidClaims(String),
}

/// Signing key plus issuer and lifetime.
#[derive(Clone)]
pub struct IdentityKey {
    secret: Vec<u8>,
    issuer: String,
    ttl_secs: i64,
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKey")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl IdentityKey {
    pub fn new(secret: impl Into<Vec<u8>>, issuer: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            ttl_secs: ttl_secs as i64,
        }
    }

    /// Read the secret from the environment variable named in config.
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .map_err(|_| anyhow!("{} not set", config.secret_env))?;
        if secret.is_empty() {
            return Err(anyhow!("{} is empty", config.secret_env));
        }
        Ok(Self::new(secret, config.issuer.clone(), config.ttl_secs))
    }

    pub fn mint(&self, user_id: &str, tenant_id: &str, role: &Role) -> Result<String> {
        self.mint_at(user_id, tenant_id, role, chrono::Utc::now().timestamp())
    }

    pub fn mint_at(&self, user_id: &str, tenant_id: &str, role: &Role, now: i64) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role: role.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let header = URL_SAFE_NO_PAD.encode(HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header}.{payload}");
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes())?);
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, IdentityError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(IdentityError::Malformed);
        };

        let header_json = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| IdentityError::Malformed)?;
        let header_value: serde_json::Value =
            serde_json::from_slice(&header_json).map_err(|_| IdentityError::Malformed)?;
        if header_value.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
            return Err(IdentityError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| IdentityError::Malformed)?;
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| IdentityError::BadSignature)?;
        mac.update(format!("{header}.{payload}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| IdentityError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| IdentityError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| IdentityError::Malformed)?;

        if claims.iss != self.issuer {
            return Err(IdentityError::WrongIssuer);
        }
        if now >= claims.exp {
            return Err(IdentityError::Expired);
        }
        if claims.sub.trim().is_empty() || claims.tenant_id.trim().is_empty() {
            return Err(IdentityError::InvalidClaims(
                "sub and tenant_id are required".to_string(),
            ));
        }
        claims
            .role()
            .map_err(|e| IdentityError::InvalidClaims(e.to_string()))?;

        Ok(claims)
    }

    fn sign(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| anyhow!("invalid identity secret: {}", e))?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
