//! Stateless approval tokens.
//!
//! Format: `b64url(session_id|approver_email|expiry_unix) "." b64url(hmac_sha256(payload))`,
//! both parts without padding. A token is valid until its expiry; there is no revocation list.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac::{self, Key, HMAC_SHA256};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{codes, AppError};

pub const DEFAULT_SECRET: &str = "change-me";
pub const DEFAULT_TTL_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    /// Shared HMAC secret. Default: "change-me" (logged as a warning).
    pub secret: String,
    /// Lifetime of issued tokens in seconds. Default: 7 days.
    pub ttl_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_SECRET.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub session_id: String,
    pub approver_email: String,
    pub expires_at: i64,
}

#[derive(Clone)]
pub struct TokenAuthenticator {
    key: Key,
    default_ttl_secs: i64,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("secret", &"<redacted>")
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}

impl TokenAuthenticator {
    pub fn new(config: &TokenConfig) -> Result<Self, AppError> {
        if config.secret.is_empty() {
            return Err(AppError::new(codes::CONFIG_INVALID, "Token secret must not be empty"));
        }
        if config.ttl_secs <= 0 {
            return Err(AppError::new(codes::CONFIG_INVALID, "Token ttl must be positive")
                .with_details(format!("ttl_secs={}", config.ttl_secs)));
        }
        if config.secret == DEFAULT_SECRET {
            tracing::warn!("approval tokens are signed with the default secret");
        }
        Ok(Self {
            key: Key::new(HMAC_SHA256, config.secret.as_bytes()),
            default_ttl_secs: config.ttl_secs,
        })
    }

    pub fn default_ttl_secs(&self) -> i64 {
        self.default_ttl_secs
    }

    pub fn issue(
        &self,
        session_id: &str,
        approver_email: &str,
        ttl_secs: Option<i64>,
    ) -> Result<String, AppError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.issue_at(session_id, approver_email, ttl_secs.unwrap_or(self.default_ttl_secs), now)
    }

    pub fn issue_at(
        &self,
        session_id: &str,
        approver_email: &str,
        ttl_secs: i64,
        now_unix: i64,
    ) -> Result<String, AppError> {
        if session_id.is_empty() || session_id.contains('|') {
            return Err(AppError::new(
                codes::TOKEN_ISSUE_INVALID,
                "Session id must be non-empty and must not contain '|'",
            ));
        }
        if approver_email.trim().is_empty() {
            return Err(AppError::new(codes::TOKEN_ISSUE_INVALID, "Approver email is required"));
        }
        // Signed as given, so verify hands back exactly this string.
        if approver_email.trim() != approver_email {
            return Err(AppError::new(
                codes::TOKEN_ISSUE_INVALID,
                "Approver email must not have surrounding whitespace",
            )
            .with_details(format!("approver_email={approver_email:?}")));
        }
        if ttl_secs <= 0 {
            return Err(AppError::new(codes::TOKEN_ISSUE_INVALID, "Token ttl must be positive")
                .with_details(format!("ttl_secs={ttl_secs}")));
        }

        let expiry = now_unix.saturating_add(ttl_secs);
        let payload = format!("{session_id}|{approver_email}|{expiry}");
        let sig = hmac::sign(&self.key, payload.as_bytes());

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            URL_SAFE_NO_PAD.encode(sig.as_ref())
        ))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, AppError> {
        self.verify_at(token, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(&self, token: &str, now_unix: i64) -> Result<TokenClaims, AppError> {
        let (payload_b64, sig_b64) = token.trim().split_once('.').ok_or_else(|| invalid("malformed"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("malformed"))?;
        let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| invalid("malformed"))?;

        // Constant-time comparison.
        hmac::verify(&self.key, &payload, &sig).map_err(|_| invalid("bad_signature"))?;

        let payload = String::from_utf8(payload).map_err(|_| invalid("malformed"))?;
        let (rest, expiry) = payload.rsplit_once('|').ok_or_else(|| invalid("malformed"))?;
        let (session_id, approver_email) = rest.split_once('|').ok_or_else(|| invalid("malformed"))?;
        let expires_at: i64 = expiry.parse().map_err(|_| invalid("malformed"))?;
        if session_id.is_empty() || approver_email.is_empty() {
            return Err(invalid("malformed"));
        }
        if expires_at < now_unix {
            return Err(invalid("expired"));
        }

        Ok(TokenClaims {
            session_id: session_id.to_string(),
            approver_email: approver_email.to_string(),
            expires_at,
        })
    }
}

fn invalid(reason: &str) -> AppError {
    AppError::new(codes::INVALID_TOKEN, "Invalid approval token").with_details(reason)
}
