//! Compact signed session tokens.
//!
//! A token is `base64url(header).base64url(payload).base64url(signature)`
//! without padding, where the signature is HMAC-SHA256 over the first two
//! encoded segments joined by a dot. Verification is pure computation: the
//! session registry is not consulted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{SharedClock, TokenError};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_ISSUER: &str = "xiaokangOS";
pub const TOKEN_AUDIENCE: &str = "xiaokangOS";
pub const SIGNING_ALGORITHM: &str = "HS256";

/// Identity asserted by a verified token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Random per-token id, so two tokens issued in the same second differ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Any additional claims merged in at issue time
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct TokenHeader {
    alg: String,
}

/// Issues and verifies session tokens with a single symmetric key
#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    ttl_seconds: i64,
    clock: SharedClock,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, ttl_seconds: i64, clock: SharedClock) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("Token signing secret must not be empty");
        }
        if ttl_seconds <= 0 {
            anyhow::bail!("Token TTL must be positive, got {}", ttl_seconds);
        }
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
        Ok(Self {
            mac,
            ttl_seconds,
            clock,
        })
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Issue a token for a user with the default claim set
    pub fn issue(&self, user_id: &str, username: &str, role: &str) -> String {
        self.issue_with_claims(user_id, username, role, Map::new())
    }

    /// Issue a token, merging `extra` over the default claims.
    ///
    /// Extra keys override defaults of the same name, reserved ones included.
    pub fn issue_with_claims(
        &self,
        user_id: &str,
        username: &str,
        role: &str,
        extra: Map<String, Value>,
    ) -> String {
        let now = self.clock.now();

        let mut payload = Map::new();
        payload.insert("iss".into(), json!(TOKEN_ISSUER));
        payload.insert("aud".into(), json!(TOKEN_AUDIENCE));
        payload.insert("iat".into(), json!(now));
        payload.insert("nbf".into(), json!(now));
        payload.insert("exp".into(), json!(now + self.ttl_seconds));
        payload.insert("sub".into(), json!(user_id));
        payload.insert("username".into(), json!(username));
        payload.insert("role".into(), json!(role));
        payload.insert("jti".into(), json!(uuid::Uuid::new_v4().to_string()));
        payload.extend(extra);

        let header = json!({ "typ": "JWT", "alg": SIGNING_ALGORITHM });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_b64 = URL_SAFE_NO_PAD.encode(Value::Object(payload).to_string());
        let signing_input = format!("{}.{}", header_b64, payload_b64);
        let signature_b64 = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));

        format!("{}.{}", signing_input, signature_b64)
    }

    /// Verify a token and return its claims unmodified.
    ///
    /// Checks run in order: shape, signature, algorithm, expiry, not-before.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(TokenError::Malformed);
        };

        let expected = URL_SAFE_NO_PAD.encode(self.sign(&format!("{}.{}", header_b64, payload_b64)));
        if !bool::from(expected.as_bytes().ct_eq(signature_b64.as_bytes())) {
            return Err(TokenError::BadSignature);
        }

        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let claims: SessionClaims = decode_segment(payload_b64)?;

        let now = self.clock.now();
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }

        Ok(claims)
    }

    fn sign(&self, signing_input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
