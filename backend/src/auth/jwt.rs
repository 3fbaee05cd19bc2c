//! Session token issuance and validation
//!
//! The session payload is encrypted with AES-256-GCM under a key derived from
//! the configured secret, and the resulting blob travels as the `data` claim of
//! an HS256 JWT. Access and refresh tokens are signed with distinct keys.
//!
//! All key material is derived once, when the service is built.

use crate::config::TokenConfig;
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use anyhow::anyhow;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rolegate_shared::{SessionPayload, TokenPair};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

const NONCE_LEN: usize = 12;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Encrypted session payload (base64url of nonce ‖ ciphertext)
    #[serde(default)]
    pub data: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
}

/// Why a token could not be turned into a session payload
#[derive(Error, Debug)]
pub enum TokenError {
    /// Bad signature, expired, wrong issuer or malformed
    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    /// The signature was valid but the payload could not be recovered
    #[error("token payload could not be decrypted: {0}")]
    Crypto(anyhow::Error),
}

/// Which signing key a token is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Pre-computed HS256 keys
#[derive(Clone)]
pub struct JwtKeys {
    encoding: Arc<EncodingKey>,
    decoding: Arc<DecodingKey>,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

/// Token service for session operations
#[derive(Clone)]
pub struct TokenService {
    access: JwtKeys,
    refresh: JwtKeys,
    cipher: Arc<Aes256Gcm>,
    issuer: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        let digest = Sha256::digest(config.secret_key.expose_secret().as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());

        Self {
            access: JwtKeys::new(config.access_key.expose_secret()),
            refresh: JwtKeys::new(config.refresh_key.expose_secret()),
            cipher: Arc::new(Aes256Gcm::new(key)),
            issuer: config.issuer.clone(),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    #[inline]
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    #[inline]
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Issue an access token, plus a refresh token unless `existing_refresh` is given.
    ///
    /// Refreshing never extends the lifetime of the refresh token itself.
    pub fn sign(
        &self,
        payload: &SessionPayload,
        existing_refresh: Option<&str>,
    ) -> anyhow::Result<TokenPair> {
        let data = self.encrypt(payload)?;
        let access_token = self.issue(&data, TokenKind::Access)?;
        let refresh_token = match existing_refresh {
            Some(_) => None,
            None => Some(self.issue(&data, TokenKind::Refresh)?),
        };

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Check signature, expiry and issuer, then decrypt the payload.
    ///
    /// Returns `Ok(None)` when a correctly signed token carries no payload.
    pub fn verify(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<SessionPayload>, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?.claims;
        if claims.data.is_empty() {
            return Ok(None);
        }

        self.decrypt(&claims.data).map(Some).map_err(TokenError::Crypto)
    }

    fn keys(&self, kind: TokenKind) -> &JwtKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn issue(&self, data: &str, kind: TokenKind) -> anyhow::Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        };
        let now = Utc::now();
        let claims = Claims {
            data: data.to_string(),
            exp: (now + Duration::seconds(ttl)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)
            .map_err(|e| anyhow!("Failed to generate {:?} token: {}", kind, e))
    }

    fn encrypt(&self, payload: &SessionPayload) -> anyhow::Result<String> {
        let plaintext = serde_json::to_vec(payload)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| anyhow!("Failed to encrypt session payload: {}", e))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    fn decrypt(&self, data: &str) -> anyhow::Result<SessionPayload> {
        let blob = URL_SAFE_NO_PAD.decode(data)?;
        if blob.len() <= NONCE_LEN {
            return Err(anyhow!("Session payload is truncated"));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| anyhow!("Failed to decrypt session payload: {}", e))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use secrecy::SecretString;

    fn config() -> TokenConfig {
        TokenConfig {
            issuer: "rolegate-test".into(),
            access_key: SecretString::new("access-key-for-tests-only".into()),
            refresh_key: SecretString::new("refresh-key-for-tests-only".into()),
            secret_key: SecretString::new("content-secret-for-tests".into()),
            access_ttl_secs: 60,
            refresh_ttl_secs: 600,
        }
    }

    fn payload() -> SessionPayload {
        SessionPayload {
            email: "ana@example.com".into(),
            role: "user".into(),
        }
    }

    #[test]
    fn test_sign_and_verify_access_token() {
        let service = TokenService::new(&config());
        let pair = service.sign(&payload(), None).unwrap();

        let decoded = service.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(decoded, Some(payload()));

        let refresh = pair.refresh_token.expect("fresh sign issues a refresh token");
        let decoded = service.verify(&refresh, TokenKind::Refresh).unwrap();
        assert_eq!(decoded, Some(payload()));
    }

    #[test]
    fn test_existing_refresh_token_is_not_reissued() {
        let service = TokenService::new(&config());
        let first = service.sign(&payload(), None).unwrap();
        let refresh = first.refresh_token.unwrap();

        let second = service.sign(&payload(), Some(&refresh)).unwrap();
        assert!(second.refresh_token.is_none());
        assert!(!second.access_token.is_empty());
    }

    #[test]
    fn test_access_and_refresh_keys_are_distinct() {
        let service = TokenService::new(&config());
        let pair = service.sign(&payload(), None).unwrap();

        assert!(matches!(
            service.verify(&pair.access_token, TokenKind::Refresh),
            Err(TokenError::Rejected(_))
        ));
        assert!(matches!(
            service.verify(pair.refresh_token.as_deref().unwrap(), TokenKind::Access),
            Err(TokenError::Rejected(_))
        ));
    }

    #[test]
    fn test_payload_is_not_readable_in_claims() {
        let service = TokenService::new(&config());
        let pair = service.sign(&payload(), None).unwrap();

        let body = pair.access_token.split('.').nth(1).unwrap();
        let claims = String::from_utf8(URL_SAFE_NO_PAD.decode(body).unwrap()).unwrap();
        assert!(!claims.contains("ana@example.com"));
        assert!(claims.contains("rolegate-test"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = TokenService::new(&TokenConfig {
            access_ttl_secs: -10,
            ..config()
        });
        let pair = service.sign(&payload(), None).unwrap();

        assert!(matches!(
            service.verify(&pair.access_token, TokenKind::Access),
            Err(TokenError::Rejected(_))
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let issuer_a = TokenService::new(&config());
        let issuer_b = TokenService::new(&TokenConfig {
            issuer: "someone-else".into(),
            ..config()
        });
        let pair = issuer_b.sign(&payload(), None).unwrap();

        assert!(issuer_a.verify(&pair.access_token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_empty_data_claim_yields_none() {
        let service = TokenService::new(&config());
        let token = service.issue("", TokenKind::Access).unwrap();

        assert_eq!(service.verify(&token, TokenKind::Access).unwrap(), None);
    }

    #[test]
    fn test_foreign_secret_is_a_crypto_failure() {
        let service = TokenService::new(&config());
        let other = TokenService::new(&TokenConfig {
            secret_key: SecretString::new("a-different-content-secret".into()),
            ..config()
        });
        let pair = other.sign(&payload(), None).unwrap();

        assert!(matches!(
            service.verify(&pair.access_token, TokenKind::Access),
            Err(TokenError::Crypto(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Any payload survives a sign/verify cycle unchanged
        #[test]
        fn prop_sign_verify_preserves_payload(
            email in "[a-z]{1,12}@[a-z]{1,8}\\.io",
            role in "[a-z_]{1,16}"
        ) {
            let service = TokenService::new(&config());
            let payload = SessionPayload { email, role };
            let pair = service.sign(&payload, None).unwrap();

            prop_assert_eq!(
                service.verify(&pair.access_token, TokenKind::Access).unwrap(),
                Some(payload)
            );
        }

        /// Flipping any character of the signature invalidates the token
        #[test]
        fn prop_tampered_signature_rejected(index in 0usize..40) {
            let service = TokenService::new(&config());
            let pair = service.sign(&payload(), None).unwrap();

            let token = pair.access_token;
            let sig_start = token.rfind('.').unwrap() + 1;
            let pos = sig_start + index % (token.len() - sig_start);
            let mut bytes = token.into_bytes();
            bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            prop_assert!(service.verify(&tampered, TokenKind::Access).is_err());
        }
    }
}
