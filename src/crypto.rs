//! Connector credential sealing with AES-256-GCM.
//!
//! Credentials are opaque JSON documents (API tokens, consumer keys). They are sealed with
//! additional authenticated data binding them to `organization|kind|shop_domain`, so a
//! ciphertext copied onto another connector row fails to open.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::connector::Model as ConnectorModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("sealed credentials present but no crypto key is configured")]
    MissingKey,
    #[error("credentials are not valid JSON: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM; output is `version | nonce | ciphertext+tag`.
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Associated data binding sealed credentials to their connector identity.
pub fn credentials_aad(organization_id: uuid::Uuid, kind: &str, shop_domain: &str) -> String {
    format!("{organization_id}|{kind}|{}", shop_domain.to_ascii_lowercase())
}

/// Seals a credentials document. Without a key the JSON is stored as-is (development profiles).
pub fn seal_credentials(
    key: Option<&CryptoKey>,
    aad: &str,
    credentials: &serde_json::Value,
) -> Result<Vec<u8>, CryptoError> {
    let plaintext = serde_json::to_vec(credentials)?;
    match key {
        Some(key) => encrypt_bytes(key, aad.as_bytes(), &plaintext),
        None => Ok(plaintext),
    }
}

/// Opens the credentials stored on a connector row.
///
/// Rows written without a key hold plain JSON and are read back directly.
pub fn open_credentials(
    key: Option<&CryptoKey>,
    connector: &ConnectorModel,
) -> Result<serde_json::Value, CryptoError> {
    let Some(stored) = connector.credentials_ciphertext.as_deref() else {
        return Ok(serde_json::Value::Null);
    };
    if stored.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    let plaintext = if is_encrypted_payload(stored) {
        let key = key.ok_or(CryptoError::MissingKey)?;
        let aad = credentials_aad(connector.organization_id, &connector.kind, &connector.shop_domain);
        decrypt_bytes(key, aad.as_bytes(), stored)?
    } else {
        stored.to_vec()
    };

    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![7u8; 32]).expect("valid test key")
    }

    fn connector_with(credentials: Option<Vec<u8>>, organization_id: Uuid) -> ConnectorModel {
        ConnectorModel {
            id: Uuid::new_v4(),
            organization_id,
            kind: "shopify".to_string(),
            shop_domain: "demo.myshopify.com".to_string(),
            credentials_ciphertext: credentials,
            currency: Some("USD".to_string()),
            status: "active".to_string(),
            last_sync_at: None,
            sync_cursor: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn sealed_credentials_open_on_the_same_connector() {
        let key = test_key();
        let org = Uuid::new_v4();
        let aad = credentials_aad(org, "shopify", "Demo.myshopify.com");
        let sealed = seal_credentials(Some(&key), &aad, &json!({"access_token": "shpat_1"})).unwrap();
        assert!(is_encrypted_payload(&sealed));

        let opened = open_credentials(Some(&key), &connector_with(Some(sealed), org)).unwrap();
        assert_eq!(opened["access_token"], "shpat_1");
    }

    #[test]
    fn sealed_credentials_fail_on_another_organization() {
        let key = test_key();
        let aad = credentials_aad(Uuid::new_v4(), "shopify", "demo.myshopify.com");
        let sealed = seal_credentials(Some(&key), &aad, &json!({"access_token": "x"})).unwrap();

        let result = open_credentials(Some(&key), &connector_with(Some(sealed), Uuid::new_v4()));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn plain_json_is_read_without_a_key() {
        let stored = serde_json::to_vec(&json!({"consumer_key": "ck"})).unwrap();
        let opened = open_credentials(None, &connector_with(Some(stored), Uuid::new_v4())).unwrap();
        assert_eq!(opened["consumer_key"], "ck");
    }

    #[test]
    fn sealed_credentials_need_a_key() {
        let key = test_key();
        let org = Uuid::new_v4();
        let aad = credentials_aad(org, "shopify", "demo.myshopify.com");
        let sealed = seal_credentials(Some(&key), &aad, &json!({})).unwrap();
        let result = open_credentials(None, &connector_with(Some(sealed), org));
        assert!(matches!(result, Err(CryptoError::MissingKey)));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret").unwrap();
        encrypted[14] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let second = encrypt_bytes(&key, b"aad", b"same").unwrap();
        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
    }
}
