//! Vault error types.
//!
//! Every public API in this crate returns [`VaultError`]. The variants map
//! one-to-one onto the failure classes a caller has to tell apart (missing
//! vault, keyfile policy, bad credentials, per-record decryption, PIN cache),
//! so the CLI can pick messages and exit codes without matching on strings.

use std::path::PathBuf;

/// Unified error type for the Enpass vault reader.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Vault location / metadata -----------------------------------------
    /// The vault directory, database file or `vault.json` does not exist.
    #[error("vault not found: {}", path.display())]
    VaultNotFound { path: PathBuf },

    /// `vault.json` (or the database header it is paired with) could not be
    /// parsed into usable key-derivation parameters.
    #[error("vault info is corrupt: {reason}")]
    VaultInfoCorrupt { reason: String },

    // -- Keyfile policy -----------------------------------------------------
    /// The vault was created with a keyfile but none was supplied.
    #[error("this vault requires a keyfile")]
    KeyfileRequired,

    /// A keyfile was supplied for a vault that does not use one.
    #[error("a keyfile was supplied but this vault does not use one")]
    KeyfileNotNeeded,

    /// The keyfile could not be read from disk.
    #[error("could not read keyfile {}: {source}", path.display())]
    KeyfileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The keyfile is not an XML document carrying a hex payload.
    #[error("keyfile is malformed: {reason}")]
    KeyfileMalformed { reason: String },

    // -- Credentials --------------------------------------------------------
    /// The database did not open with the derived key. Deliberately does not
    /// say whether the password, the keyfile or the file itself is at fault.
    #[error("invalid credentials or unreadable vault")]
    InvalidCredentials,

    /// No password or cached key could be obtained and prompting is disabled.
    #[error("no credentials available: {reason}")]
    CredentialsIncomplete { reason: String },

    /// Reading a password or PIN from the terminal failed.
    #[error("could not read {what} from the terminal: {source}")]
    PromptFailed {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    // -- Crypto -------------------------------------------------------------
    /// PBKDF2 parameters were unusable.
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    /// Sealing data (PIN cache) failed.
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// A field value failed to decode or authenticate.
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// The record was tombstoned and its key material cleared.
    #[error("entry {uuid} has been deleted")]
    RecordDeleted { uuid: String },

    // -- PIN cache ----------------------------------------------------------
    /// The PIN is shorter than the configured minimum.
    #[error("PIN must be at least {min} characters")]
    PinTooShort { min: usize },

    /// The cached key could not be unwrapped (wrong PIN or damaged blob).
    #[error("credential cache could not be unlocked: {reason}")]
    CacheCorrupt { reason: String },

    /// The platform secret store refused the operation.
    #[error("secret store unavailable: {reason}")]
    KeychainUnavailable { reason: String },

    // -- Session / queries --------------------------------------------------
    /// The session was already closed.
    #[error("vault session is closed")]
    SessionClosed,

    /// A query returned columns other than the ones the row type binds.
    #[error("unexpected database schema: {reason}")]
    UnexpectedSchema { reason: String },

    /// No live entry matched the filter.
    #[error("no entry matches the given filters")]
    EntryNotFound,

    /// More than one live entry matched where exactly one was required.
    #[error("{count} entries match the given filters, expected exactly one")]
    AmbiguousEntry { count: usize },

    // -- Underlying errors --------------------------------------------------
    /// SQLite / SQLCipher error from `rusqlite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic ------------------------------------------------------------
    /// Catch-all for internal errors that don't fit a typed variant.
    #[error("internal vault error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
