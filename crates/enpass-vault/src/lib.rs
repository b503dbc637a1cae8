//! Read-only access to Enpass 6 vaults.
//!
//! An Enpass vault is a SQLCipher database (`vault.enpassdb`) plus a JSON
//! metadata file (`vault.json`). This crate derives the database key from the
//! master password (and optional keyfile), opens the store, runs filtered
//! queries over its items and decrypts password fields. An optional PIN
//! cache lets a short PIN stand in for the master password on later runs.
//!
//! # Modules
//!
//! - [`info`]: vault directory layout and `vault.json`.
//! - [`keyfile`], [`kdf`]: master secret and database key derivation.
//! - [`crypto`]: AES-256-GCM and PBKDF2 on `ring`.
//! - [`credentials`]: credential assembly and the unlock flow.
//! - [`keychain`], [`pin`]: the PIN-wrapped key cache and its stores.
//! - [`query`], [`repository`]: SQL construction and row binding.
//! - [`session`]: locating, opening and querying a vault.
//! - [`entry`]: entries and field decryption.
//! - [`error`]: unified error type.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use enpass_vault::{EntryFilter, Vault, VaultCredentials};
//!
//! # fn example() -> enpass_vault::Result<()> {
//! let vault = Vault::locate("/home/me/Documents/Enpass/Vaults/primary")?;
//! let credentials = VaultCredentials::new().with_password("correct horse");
//! let mut session = vault.open(&credentials)?;
//!
//! let filter = EntryFilter {
//!     titles: vec!["git%".into()],
//!     order_by: vec!["title".into()],
//!     ..EntryFilter::default()
//! };
//! for entry in session.query(&filter)?.entries {
//!     println!("{}: {}", entry.title, entry.value());
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod info;
pub mod kdf;
pub mod keychain;
pub mod keyfile;
pub mod pin;
pub mod query;
pub mod repository;
pub mod session;

pub use credentials::{
    CredentialState, EnvOverrides, KeySource, PinOptions, Prompter, UnlockOptions,
    VaultCredentials, unlock,
};
pub use entry::{Entry, decrypt};
pub use error::{Result, VaultError};
pub use info::{VaultInfo, VaultPaths, default_vault_path};
pub use keychain::{FileSecretStore, SecretStore, platform_store};
pub use pin::PinCache;
pub use query::{EntryFilter, OrderField};
pub use repository::{EntryRepository, QueryResult, SqlCipherRepository};
pub use session::{Session, Vault};
