//! HS256 JSON Web Tokens as used by the media platform.
//!
//! The same token format serves three purposes: participant access tokens,
//! server API authorization, and webhook signatures (where the `sha256`
//! claim carries the digest of the request body).

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Allowed clock skew when checking `exp`/`nbf`
const LEEWAY_SECS: i64 = 10;

/// Errors that can occur while signing or verifying a token
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(&'static str),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Unexpected issuer: {0}")]
    IssuerMismatch(String),

    #[error("Empty signing secret")]
    EmptySecret,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Room permissions granted by a token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_join: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_create: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_list: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_admin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_record: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

impl VideoGrant {
    /// Join-and-publish grant for a participant
    pub fn participant(room: &str) -> Self {
        Self {
            room: Some(room.to_string()),
            room_join: Some(true),
            can_publish: Some(true),
            can_subscribe: Some(true),
            ..Default::default()
        }
    }

    /// Server grant for room administration and recording
    pub fn server(room: Option<&str>) -> Self {
        Self {
            room: room.map(str::to_string),
            room_create: Some(true),
            room_list: Some(true),
            room_admin: Some(true),
            room_record: Some(true),
            ..Default::default()
        }
    }
}

/// Token claims
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// API key that signed the token
    pub iss: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoGrant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    /// Base64 SHA-256 of the webhook body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Claims {
    /// Claims issued by `api_key`, valid from now for `ttl_secs`
    pub fn new(api_key: &str, ttl_secs: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            iss: api_key.to_string(),
            nbf: Some(now),
            exp: Some(now + ttl_secs as i64),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

fn mac(secret: &str) -> Result<HmacSha256, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::EmptySecret);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::EmptySecret)
}

/// Sign claims with HS256
pub fn sign(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    let header = Header {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    );

    let mut mac = mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify signature and validity window, returning the claims
pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    verify_at(token, secret, Utc::now().timestamp())
}

fn verify_at(token: &str, secret: &str, now: i64) -> Result<Claims, TokenError> {
    let mut parts = token.trim().splitn(3, '.');
    let (Some(header), Some(payload), Some(signature)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three segments"));
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| TokenError::Malformed("header is not base64url"))?;
    let header: Header = serde_json::from_slice(&header_bytes)?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed("signature is not base64url"))?;
    let mut mac = mac(secret)?;
    mac.update(signing_input(token).as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed("payload is not base64url"))?;
    let claims: Claims = serde_json::from_slice(&payload)?;

    if let Some(exp) = claims.exp {
        if now > exp + LEEWAY_SECS {
            return Err(TokenError::Expired);
        }
    }
    if let Some(nbf) = claims.nbf {
        if now + LEEWAY_SECS < nbf {
            return Err(TokenError::NotYetValid);
        }
    }

    Ok(claims)
}

/// `header.payload` part of a compact token
fn signing_input(token: &str) -> &str {
    let token = token.trim();
    match token.rfind('.') {
        Some(idx) => &token[..idx],
        None => token,
    }
}

/// Base64 (standard alphabet) SHA-256 of a request body
pub fn body_digest(body: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(body))
}

/// Verify a webhook authorization token against the raw body
pub fn verify_webhook(
    body: &[u8],
    token: &str,
    api_key: &str,
    api_secret: &str,
) -> Result<Claims, TokenError> {
    let claims = verify(token, api_secret)?;
    if claims.iss != api_key {
        return Err(TokenError::IssuerMismatch(claims.iss));
    }
    match claims.sha256.as_deref() {
        Some(digest) if digest == body_digest(body) => Ok(claims),
        _ => Err(TokenError::InvalidSignature),
    }
}
