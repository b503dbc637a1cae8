//! Decrypted vault entries and per-field AES-256-GCM decryption.
//!
//! An [`Entry`] is one `item` row joined with one of its `itemfield` rows.
//! Only fields of type `password` are encrypted; every other field type is
//! stored as plaintext and passes through untouched.
//!
//! Password values are stored hex-encoded as `ciphertext || tag`. The item's
//! `key` column holds a 32-byte AES key followed by the 12-byte GCM nonce,
//! and the AAD is the item UUID with its dashes removed, hex-decoded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::{Zeroize, Zeroizing};

use crate::crypto;
use crate::error::{Result, VaultError};

/// Field type whose value is encrypted.
pub const PASSWORD_KIND: &str = "password";

/// One item/field pair as returned by a vault query.
#[derive(Clone, Default, Serialize)]
pub struct Entry {
    pub uuid: String,
    /// Field type (`password`, `username`, `email`, ...).
    #[serde(rename = "card_type")]
    pub kind: String,
    #[serde(rename = "created")]
    pub created_at: i64,
    #[serde(rename = "updated")]
    pub updated_at: i64,
    pub last_used: i64,
    pub title: String,
    /// Usually the login name.
    pub subtitle: String,
    pub note: String,
    pub category: String,
    pub label: String,
    pub icon: String,
    pub trashed: i64,
    pub deleted: i64,
    pub sensitive: bool,
    /// Stored value: hex ciphertext for passwords (wiped once decryption
    /// was attempted), plaintext otherwise.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw_value: String,
    /// Decrypted password, set only after a successful [`Entry::decrypt`].
    #[serde(skip_serializing_if = "is_blank")]
    pub decrypted_value: Zeroizing<String>,
    #[serde(skip)]
    item_key: Zeroizing<Vec<u8>>,
}

fn is_blank(value: &str) -> bool {
    value.is_empty()
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("uuid", &self.uuid)
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("category", &self.category)
            .field("label", &self.label)
            .field("trashed", &self.trashed)
            .field("deleted", &self.deleted)
            .field("decrypted", &!self.decrypted_value.is_empty())
            .finish_non_exhaustive()
    }
}

impl Entry {
    /// Attach the item's key blob (AES key followed by GCM nonce).
    pub fn with_item_key(mut self, item_key: Vec<u8>) -> Self {
        self.item_key = Zeroizing::new(item_key);
        self
    }

    pub fn is_trashed(&self) -> bool {
        self.trashed != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted != 0
    }

    /// Whether this field's value is encrypted at rest.
    pub fn is_password(&self) -> bool {
        self.kind == PASSWORD_KIND
    }

    /// The value a caller should display: the decrypted password for
    /// password fields, the stored plaintext for everything else.
    pub fn value(&self) -> &str {
        if self.is_password() {
            self.decrypted_value.as_str()
        } else {
            self.raw_value.as_str()
        }
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.updated_at, 0)
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.last_used, 0)
    }

    /// Decrypt the password value in place.
    ///
    /// A no-op for non-password fields and empty values. The key blob is
    /// wiped once the attempt is made, whatever its outcome.
    ///
    /// # Errors
    ///
    /// - [`VaultError::RecordDeleted`] when the key material was cleared.
    /// - [`VaultError::DecryptionFailed`] on a decode or authentication error.
    pub fn decrypt(&mut self) -> Result<()> {
        if self.raw_value.is_empty() || !self.is_password() {
            return Ok(());
        }

        let item_key = std::mem::take(&mut self.item_key);
        let result = decrypt_value(&self.uuid, &self.raw_value, &item_key);
        self.raw_value.zeroize();

        self.decrypted_value = Zeroizing::new(result?);
        Ok(())
    }
}

/// Consume an entry and return it decrypted.
pub fn decrypt(mut entry: Entry) -> Result<Entry> {
    entry.decrypt()?;
    Ok(entry)
}

fn decrypt_value(uuid: &str, hex_value: &str, item_key: &[u8]) -> Result<String> {
    // Tombstoned items keep their row but have the key blob cleared.
    if item_key.len() <= crypto::KEY_LEN {
        return Err(VaultError::RecordDeleted {
            uuid: uuid.to_string(),
        });
    }
    let (key, nonce) = item_key.split_at(crypto::KEY_LEN);

    let ciphertext = hex::decode(hex_value).map_err(|e| VaultError::DecryptionFailed {
        reason: format!("value is not hex: {e}"),
    })?;
    let aad = hex::decode(uuid.replace('-', "")).map_err(|e| VaultError::DecryptionFailed {
        reason: format!("uuid is not hex: {e}"),
    })?;

    let plaintext = crypto::open(key, nonce, &aad, &ciphertext)?;
    String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::DecryptionFailed {
        reason: "plaintext is not UTF-8".into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "a2ec30c0-aeed-41f7-aed7-cc50e69ff506";

    fn sealed_entry(plaintext: &str) -> Entry {
        let key = crypto::random_bytes(crypto::KEY_LEN).unwrap();
        let nonce = crypto::random_bytes(crypto::NONCE_LEN_BYTES).unwrap();
        let aad = hex::decode(UUID.replace('-', "")).unwrap();
        let sealed = crypto::seal(&key, &nonce, &aad, plaintext.as_bytes()).unwrap();

        let mut item_key = key;
        item_key.extend_from_slice(&nonce);
        Entry {
            uuid: UUID.to_string(),
            kind: PASSWORD_KIND.to_string(),
            title: "Example".to_string(),
            raw_value: hex::encode(sealed),
            ..Entry::default()
        }
        .with_item_key(item_key)
    }

    #[test]
    fn decrypts_password_field() {
        let entry = decrypt(sealed_entry("S3cr3t!")).unwrap();
        assert_eq!(entry.decrypted_value.as_str(), "S3cr3t!");
        assert_eq!(entry.value(), "S3cr3t!");
        assert!(entry.item_key.is_empty());
        assert!(entry.raw_value.is_empty());
    }

    #[test]
    fn non_password_fields_pass_through() {
        let entry = Entry {
            uuid: UUID.to_string(),
            kind: "username".to_string(),
            raw_value: "alice@example.com".to_string(),
            ..Entry::default()
        };
        let entry = decrypt(entry).unwrap();
        assert!(entry.decrypted_value.is_empty());
        assert_eq!(entry.value(), "alice@example.com");
    }

    #[test]
    fn empty_value_is_noop() {
        let entry = Entry {
            uuid: UUID.to_string(),
            kind: PASSWORD_KIND.to_string(),
            ..Entry::default()
        };
        let entry = decrypt(entry).unwrap();
        assert!(entry.decrypted_value.is_empty());
    }

    #[test]
    fn cleared_key_is_record_deleted() {
        let entry = sealed_entry("S3cr3t!").with_item_key(Vec::new());
        assert!(matches!(decrypt(entry), Err(VaultError::RecordDeleted { .. })));
    }

    #[test]
    fn missing_nonce_is_record_deleted() {
        let entry = sealed_entry("S3cr3t!").with_item_key(vec![1u8; crypto::KEY_LEN]);
        assert!(matches!(decrypt(entry), Err(VaultError::RecordDeleted { .. })));
    }

    #[test]
    fn short_nonce_fails_decryption() {
        let entry = sealed_entry("S3cr3t!").with_item_key(vec![1u8; crypto::KEY_LEN + 4]);
        assert!(matches!(
            decrypt(entry),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn tampered_value_fails_and_is_scrubbed() {
        let mut entry = sealed_entry("S3cr3t!");
        let mut bytes = hex::decode(&entry.raw_value).unwrap();
        bytes[0] ^= 0x01;
        entry.raw_value = hex::encode(bytes);

        assert!(matches!(
            entry.decrypt(),
            Err(VaultError::DecryptionFailed { .. })
        ));
        assert!(entry.decrypted_value.is_empty());
        assert!(entry.raw_value.is_empty());
        assert!(entry.item_key.is_empty());
    }

    #[test]
    fn wrong_uuid_fails_authentication() {
        let mut entry = sealed_entry("S3cr3t!");
        entry.uuid = "b2ec30c0-aeed-41f7-aed7-cc50e69ff506".to_string();
        assert!(matches!(
            decrypt(entry),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn non_hex_value_fails() {
        let mut entry = sealed_entry("S3cr3t!");
        entry.raw_value = "zz".to_string();
        assert!(matches!(
            decrypt(entry),
            Err(VaultError::DecryptionFailed { .. })
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let entry = decrypt(sealed_entry("S3cr3t!")).unwrap();
        let rendered = format!("{entry:?}");
        assert!(!rendered.contains("S3cr3t!"));
        assert!(rendered.contains("decrypted: true"));
    }

    #[test]
    fn serializes_with_original_field_names() {
        let entry = Entry {
            uuid: UUID.to_string(),
            kind: "username".to_string(),
            created_at: 1_600_000_000,
            ..Entry::default()
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["card_type"], "username");
        assert_eq!(json["created"], 1_600_000_000);
        assert!(json.get("decrypted_value").is_none());
        assert!(json.get("item_key").is_none());
    }
}
