//! Credential assembly: deciding where the database key comes from.
//!
//! Sources are tried in a fixed order until the credentials are complete:
//!
//! 1. the master password from the environment,
//! 2. the master password from the configuration file,
//! 3. the PIN cache, when PIN mode is on,
//! 4. an interactive prompt, unless running non-interactively.
//!
//! The caller gathers environment values into [`UnlockOptions`]; nothing in
//! this module reads process globals. After a successful open in PIN mode a
//! freshly derived key is written back to the cache. The PIN itself is only
//! requested once the cache is read or written.

use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::info::VaultInfo;
use crate::kdf;
use crate::keychain::SecretStore;
use crate::pin::{self, PinCache};
use crate::session::{Session, Vault};

/// Master password override.
pub const ENV_MASTER_PASSWORD: &str = "MASTERPW";
/// PIN override.
pub const ENV_PIN: &str = "ENP_PIN";
/// Pepper appended to the PIN before stretching.
pub const ENV_PIN_PEPPER: &str = "ENP_PIN_PEPPER";
/// PIN PBKDF2 iteration count override.
pub const ENV_PIN_ITERATIONS: &str = "ENP_PIN_ITER_COUNT";

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Where a database key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Cache,
    Derived,
}

/// Progress of credential assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Neither a password nor a key is available yet.
    NeedPassword,
    /// The key was unwrapped from the PIN cache.
    HaveCachedKey,
    /// The key was derived from the master password.
    HaveDerivedKey,
    /// Complete; ready to open the vault.
    Ready,
}

/// Secrets needed to open a vault.
#[derive(Default)]
pub struct VaultCredentials {
    password: Option<Zeroizing<String>>,
    keyfile: Option<PathBuf>,
    database_key: Option<(Zeroizing<Vec<u8>>, KeySource)>,
}

impl std::fmt::Debug for VaultCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCredentials")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keyfile", &self.keyfile)
            .field("key_source", &self.key_source())
            .finish()
    }
}

impl VaultCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.set_password(Zeroizing::new(password.into()));
        self
    }

    pub fn with_keyfile(mut self, keyfile: Option<PathBuf>) -> Self {
        self.keyfile = keyfile;
        self
    }

    pub fn with_database_key(mut self, key: Zeroizing<Vec<u8>>, source: KeySource) -> Self {
        self.database_key = Some((key, source));
        self
    }

    pub fn set_password(&mut self, password: Zeroizing<String>) {
        self.password = Some(password);
    }

    pub fn keyfile(&self) -> Option<&std::path::Path> {
        self.keyfile.as_deref()
    }

    pub fn key_source(&self) -> Option<KeySource> {
        self.database_key.as_ref().map(|(_, source)| *source)
    }

    /// True when a password or a database key is present.
    pub fn is_complete(&self) -> bool {
        self.database_key.is_some() || self.password.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// The assembly state these credentials are in.
    pub fn state(&self) -> CredentialState {
        match self.key_source() {
            Some(KeySource::Cache) => CredentialState::HaveCachedKey,
            Some(KeySource::Derived) => CredentialState::HaveDerivedKey,
            None => CredentialState::NeedPassword,
        }
    }

    /// Replace the password with the key derived from it.
    ///
    /// A key that is already present suppresses derivation.
    pub fn derive(&mut self, info: &VaultInfo) -> Result<()> {
        if self.database_key.is_some() {
            tracing::debug!("skipping database key derivation, key already set");
            self.password = None;
            return Ok(());
        }
        let key = self.derive_key(info)?;
        self.database_key = Some((key, KeySource::Derived));
        self.password = None;
        Ok(())
    }

    /// The database key: the stored one, or one derived from the password.
    pub fn resolve_key(&self, info: &VaultInfo) -> Result<Zeroizing<Vec<u8>>> {
        match &self.database_key {
            Some((key, _)) => Ok(key.clone()),
            None => self.derive_key(info),
        }
    }

    fn derive_key(&self, info: &VaultInfo) -> Result<Zeroizing<Vec<u8>>> {
        let password = self.password.as_ref().ok_or_else(|| VaultError::CredentialsIncomplete {
            reason: "no master password or cached key".into(),
        })?;
        kdf::derive_database_key(password, self.keyfile.as_deref(), info)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Reads one secret from the user with echo disabled.
pub trait Prompter {
    fn read_secret(&mut self, prompt: &str) -> std::io::Result<Zeroizing<String>>;
}

/// PIN cache settings.
pub struct PinOptions {
    /// PIN from the environment; prompted for when `None`.
    pub pin: Option<Zeroizing<String>>,
    pub pepper: Zeroizing<String>,
    pub iterations: u32,
    pub min_pin_len: usize,
    pub store: Box<dyn SecretStore>,
}

impl PinOptions {
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            pin: None,
            pepper: Zeroizing::new(String::new()),
            iterations: pin::DEFAULT_ITERATIONS,
            min_pin_len: pin::DEFAULT_MIN_PIN_LEN,
            store,
        }
    }

    pub fn with_min_pin_len(mut self, min_pin_len: usize) -> Self {
        self.min_pin_len = min_pin_len;
        self
    }

    /// Apply `ENP_PIN`, `ENP_PIN_PEPPER` and `ENP_PIN_ITER_COUNT`.
    pub fn with_env(mut self, env: &EnvOverrides) -> Self {
        if let Some(pin) = &env.pin {
            self.pin = Some(pin.clone());
        }
        if let Some(pepper) = &env.pin_pepper {
            self.pepper = pepper.clone();
        }
        if let Some(iterations) = env.pin_iterations {
            self.iterations = iterations;
        }
        self
    }
}

/// Everything [`unlock`] needs besides the vault and a prompter.
#[derive(Default)]
pub struct UnlockOptions {
    pub env_password: Option<Zeroizing<String>>,
    pub config_password: Option<Zeroizing<String>>,
    pub keyfile: Option<PathBuf>,
    pub non_interactive: bool,
    /// PIN mode; `None` disables the cache.
    pub pin: Option<PinOptions>,
}

/// Credential-related environment values, captured once by the caller.
#[derive(Default, Clone)]
pub struct EnvOverrides {
    pub master_password: Option<Zeroizing<String>>,
    pub pin: Option<Zeroizing<String>>,
    pub pin_pepper: Option<Zeroizing<String>>,
    pub pin_iterations: Option<u32>,
}

impl EnvOverrides {
    /// Collect overrides through `lookup`, e.g. `|name| std::env::var(name).ok()`.
    ///
    /// Empty values count as unset. An unparsable iteration count is ignored
    /// with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |name: &str| lookup(name).filter(|v| !v.is_empty()).map(Zeroizing::new);

        let pin_iterations = lookup(ENV_PIN_ITERATIONS).and_then(|raw| match raw.trim().parse() {
            Ok(0) | Err(_) => {
                tracing::warn!(value = %raw, "ignoring invalid {ENV_PIN_ITERATIONS}");
                None
            }
            Ok(n) => Some(n),
        });

        Self {
            master_password: secret(ENV_MASTER_PASSWORD),
            pin: secret(ENV_PIN),
            pin_pepper: secret(ENV_PIN_PEPPER),
            pin_iterations,
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Assemble credentials for `vault`, open it, and refresh the PIN cache.
///
/// # Errors
///
/// - [`VaultError::CredentialsIncomplete`] when no source yields a key and
///   prompting is disabled.
/// - [`VaultError::PromptFailed`] when reading from the terminal fails.
/// - [`VaultError::PinTooShort`] / [`VaultError::CacheCorrupt`] from the
///   PIN cache.
/// - Any error of [`Vault::open`].
pub fn unlock(vault: &Vault, options: UnlockOptions, prompter: &mut dyn Prompter) -> Result<Session> {
    let UnlockOptions {
        env_password,
        config_password,
        keyfile,
        non_interactive,
        pin,
    } = options;

    let mut credentials = VaultCredentials::new().with_keyfile(keyfile);
    let mut cache = LazyCache::new(pin);

    let mut state = CredentialState::NeedPassword;
    let mut env_password = env_password;
    let mut config_password = config_password;
    loop {
        tracing::debug!(?state, "credential assembly");
        state = match state {
            CredentialState::NeedPassword => {
                if let Some(password) = env_password.take() {
                    tracing::debug!("using master password from the environment");
                    credentials.set_password(password);
                } else if let Some(password) = config_password.take() {
                    tracing::debug!("using master password from the configuration");
                    credentials.set_password(password);
                } else if let Some(key) = cache.read(vault, non_interactive, prompter)? {
                    credentials = credentials.with_database_key(key, KeySource::Cache);
                } else if non_interactive {
                    return Err(VaultError::CredentialsIncomplete {
                        reason: "no master password or cached key, and prompting is disabled".into(),
                    });
                } else {
                    let password = prompter
                        .read_secret("Vault password: ")
                        .map_err(|source| VaultError::PromptFailed {
                            what: "master password",
                            source,
                        })?;
                    if password.is_empty() {
                        return Err(VaultError::CredentialsIncomplete {
                            reason: "empty vault password provided".into(),
                        });
                    }
                    credentials.set_password(password);
                }

                if credentials.is_complete() {
                    credentials.derive(vault.info())?;
                }
                credentials.state()
            }
            CredentialState::HaveCachedKey | CredentialState::HaveDerivedKey => CredentialState::Ready,
            CredentialState::Ready => break,
        };
    }

    let session = vault.open(&credentials)?;
    if credentials.key_source() == Some(KeySource::Derived) {
        cache.refresh(vault, non_interactive, prompter, session.database_key())?;
    }
    Ok(session)
}

/// The PIN cache, built on first use so the PIN is only asked for when the
/// cache is actually read or written.
struct LazyCache {
    options: Option<PinOptions>,
    cache: Option<PinCache<Box<dyn SecretStore>>>,
}

impl LazyCache {
    fn new(options: Option<PinOptions>) -> Self {
        Self {
            options,
            cache: None,
        }
    }

    /// The cached key, if PIN mode is on and the cache holds one.
    fn read(
        &mut self,
        vault: &Vault,
        non_interactive: bool,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match self.get(vault, non_interactive, prompter)? {
            Some(cache) => cache.read(),
            None => Ok(None),
        }
    }

    /// Store a freshly derived key. Store failures leave the session usable
    /// and are only logged.
    fn refresh(
        &mut self,
        vault: &Vault,
        non_interactive: bool,
        prompter: &mut dyn Prompter,
        database_key: &[u8],
    ) -> Result<()> {
        if let Some(cache) = self.get(vault, non_interactive, prompter)? {
            if let Err(e) = cache.write(database_key) {
                tracing::warn!(error = %e, "could not update the PIN cache");
            }
        }
        Ok(())
    }

    /// Build the cache on first call, reading the PIN from the options or the
    /// prompter. `None` when PIN mode is off, or no PIN is given and
    /// prompting is disabled.
    fn get(
        &mut self,
        vault: &Vault,
        non_interactive: bool,
        prompter: &mut dyn Prompter,
    ) -> Result<Option<&mut PinCache<Box<dyn SecretStore>>>> {
        if let Some(options) = self.options.take() {
            self.cache = open_cache(vault, options, non_interactive, prompter)?;
        }
        Ok(self.cache.as_mut())
    }
}

/// Initialize the PIN cache from `options`, prompting for the PIN if needed.
fn open_cache(
    vault: &Vault,
    options: PinOptions,
    non_interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<Option<PinCache<Box<dyn SecretStore>>>> {
    let PinOptions {
        pin,
        pepper,
        iterations,
        min_pin_len,
        store,
    } = options;

    let pin = match pin {
        Some(pin) => pin,
        None if non_interactive => {
            tracing::warn!("PIN mode is on but no PIN is available without prompting");
            return Ok(None);
        }
        None => prompter
            .read_secret("PIN: ")
            .map_err(|source| VaultError::PromptFailed { what: "PIN", source })?,
    };

    PinCache::initialize(store, vault.identity(), &pin, &pepper, iterations, min_pin_len).map(Some)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::SALT_LEN;

    fn info() -> VaultInfo {
        VaultInfo::from_parts(r#"{"kdf_iter": 1000, "have_keyfile": 0}"#, [3u8; SALT_LEN]).unwrap()
    }

    #[test]
    fn empty_credentials_need_password() {
        let creds = VaultCredentials::new();
        assert!(!creds.is_complete());
        assert_eq!(creds.state(), CredentialState::NeedPassword);
        assert!(matches!(
            creds.resolve_key(&info()),
            Err(VaultError::CredentialsIncomplete { .. })
        ));
    }

    #[test]
    fn empty_password_is_incomplete() {
        assert!(!VaultCredentials::new().with_password("").is_complete());
    }

    #[test]
    fn derive_replaces_password_with_key() {
        let mut creds = VaultCredentials::new().with_password("hunter2");
        assert!(creds.is_complete());
        creds.derive(&info()).unwrap();

        assert_eq!(creds.state(), CredentialState::HaveDerivedKey);
        assert!(creds.password.is_none());
        let expected = kdf::derive_database_key("hunter2", None, &info()).unwrap();
        assert_eq!(creds.resolve_key(&info()).unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn cached_key_suppresses_derivation() {
        let mut creds = VaultCredentials::new()
            .with_password("hunter2")
            .with_database_key(Zeroizing::new(vec![9u8; 32]), KeySource::Cache);
        creds.derive(&info()).unwrap();

        assert_eq!(creds.state(), CredentialState::HaveCachedKey);
        assert_eq!(creds.resolve_key(&info()).unwrap().as_slice(), &[9u8; 32]);
    }

    #[test]
    fn debug_redacts_password() {
        let creds = VaultCredentials::new().with_password("hunter2");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn env_overrides_from_lookup() {
        let env = EnvOverrides::from_lookup(|name| match name {
            ENV_MASTER_PASSWORD => Some("pw".into()),
            ENV_PIN => Some("12345678".into()),
            ENV_PIN_PEPPER => Some(String::new()),
            ENV_PIN_ITERATIONS => Some("5000".into()),
            _ => None,
        });
        assert_eq!(env.master_password.as_deref().map(String::as_str), Some("pw"));
        assert_eq!(env.pin.as_deref().map(String::as_str), Some("12345678"));
        assert!(env.pin_pepper.is_none());
        assert_eq!(env.pin_iterations, Some(5000));
    }

    #[test]
    fn invalid_iteration_count_is_ignored() {
        for raw in ["zero", "0", "-5"] {
            let env = EnvOverrides::from_lookup(|name| {
                (name == ENV_PIN_ITERATIONS).then(|| raw.to_string())
            });
            assert_eq!(env.pin_iterations, None);
        }
    }

    #[test]
    fn pin_options_take_env_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::keychain::FileSecretStore::in_dir(dir.path(), "primary");
        let env = EnvOverrides {
            pin: Some(Zeroizing::new("12345678".into())),
            pin_pepper: Some(Zeroizing::new("salt".into())),
            pin_iterations: Some(42),
            ..EnvOverrides::default()
        };
        let options = PinOptions::new(Box::new(store)).with_env(&env);
        assert_eq!(options.pin.as_deref().map(String::as_str), Some("12345678"));
        assert_eq!(options.pepper.as_str(), "salt");
        assert_eq!(options.iterations, 42);
        assert_eq!(options.min_pin_len, pin::DEFAULT_MIN_PIN_LEN);
    }

    #[test]
    fn pin_options_min_length_override() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::keychain::FileSecretStore::in_dir(dir.path(), "primary");
        let options = PinOptions::new(Box::new(store)).with_min_pin_len(4);
        assert_eq!(options.min_pin_len, 4);
    }
}
