//! Configuration file and the merged runtime settings.
//!
//! The optional TOML file lives at `--config` or, by default, at
//! `<user config dir>/enpass-cli/config.toml`:
//!
//! ```toml
//! vault_path = "~/Documents/Enpass/Vaults/primary"
//! keyfile = "~/enpass.enpasskey"
//! output_style = "list"
//! pin = true
//! min_pin_len = 8
//! non_interactive = false
//! ```
//!
//! Values are merged with the precedence flag > environment > file >
//! built-in default into a [`Settings`] value that is passed by reference.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use enpass_vault::{EntryFilter, EnvOverrides};
use enpass_vault::pin::DEFAULT_MIN_PIN_LEN;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::cli::{FilterArgs, GlobalArgs, OutputStyle};

const CONFIG_DIR: &str = "enpass-cli";
const CONFIG_FILE: &str = "config.toml";

/// On-disk configuration. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub vault_path: Option<PathBuf>,
    pub vault_password: Option<String>,
    pub output_style: Option<OutputStyle>,
    pub keyfile: Option<PathBuf>,
    pub pin: Option<bool>,
    pub min_pin_len: Option<usize>,
    pub non_interactive: Option<bool>,
}

impl FileConfig {
    /// Parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read the config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse the config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), else the default file if it
    /// exists, else an empty configuration.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let path = expand_home(path);
            if !path.is_file() {
                bail!("the config file {} does not exist", path.display());
            }
            return Self::load(&path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// `<user config dir>/enpass-cli/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything a command needs, merged from flags, environment and file.
pub struct Settings {
    pub vault_path: PathBuf,
    pub keyfile: Option<PathBuf>,
    pub kind: String,
    pub titles: Vec<String>,
    pub categories: Vec<String>,
    pub logins: Vec<String>,
    pub labels: Vec<String>,
    pub uuids: Vec<String>,
    pub case_sensitive: bool,
    pub non_interactive: bool,
    pub pin: bool,
    pub min_pin_len: usize,
    pub output_style: OutputStyle,
    pub config_password: Option<Zeroizing<String>>,
    pub env: EnvOverrides,
}

impl Settings {
    /// Merge the sources. `filters` holds the terms from both sides of the
    /// subcommand.
    ///
    /// # Errors
    ///
    /// Fails when no vault path is given and the home directory is unknown.
    pub fn resolve(
        args: &GlobalArgs,
        filters: FilterArgs,
        file: FileConfig,
        env: EnvOverrides,
    ) -> Result<Self> {
        let vault_path = match args.vault.clone().or(file.vault_path) {
            Some(path) => expand_home(&path),
            None => enpass_vault::default_vault_path()
                .context("no vault path given and the home directory is unknown")?,
        };
        let keyfile = args
            .keyfile
            .clone()
            .or(file.keyfile)
            .map(|path| expand_home(&path));

        let config_password = file
            .vault_password
            .filter(|p| !p.is_empty())
            .map(Zeroizing::new);
        if config_password.is_some() {
            tracing::debug!("config file provides a vault password");
        }

        Ok(Self {
            vault_path,
            keyfile,
            kind: args.kind.clone(),
            titles: filters.title,
            categories: filters.category,
            logins: filters.login,
            labels: filters.label,
            uuids: filters.uuid,
            case_sensitive: args.sensitive,
            non_interactive: args.non_interactive || file.non_interactive.unwrap_or(false),
            pin: args.pin || file.pin.unwrap_or(false),
            min_pin_len: file.min_pin_len.unwrap_or(DEFAULT_MIN_PIN_LEN),
            output_style: file.output_style.unwrap_or_default(),
            config_password,
            env,
        })
    }

    /// The entry filter for these settings, sorted by `order_by`.
    pub fn filter(&self, order_by: &[String]) -> EntryFilter {
        EntryFilter {
            kind: self.kind.clone(),
            categories: self.categories.clone(),
            titles: self.titles.clone(),
            logins: self.logins.clone(),
            labels: self.labels.clone(),
            uuids: self.uuids.clone(),
            case_sensitive: self.case_sensitive,
            order_by: order_by.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn resolve(extra: &[&str], file: FileConfig) -> Settings {
        let argv = std::iter::once("enpass")
            .chain(extra.iter().copied())
            .chain(std::iter::once("list"));
        let cli = Cli::try_parse_from(argv).unwrap();
        Settings::resolve(&cli.global, cli.filters(), file, EnvOverrides::default()).unwrap()
    }

    #[test]
    fn parses_full_config() {
        let config: FileConfig = toml::from_str(
            r#"
            vault_path = "/vaults/primary"
            vault_password = "pw"
            output_style = "json"
            keyfile = "/keys/vault.enpasskey"
            pin = true
            non_interactive = true
            "#,
        )
        .unwrap();
        assert_eq!(config.vault_path, Some(PathBuf::from("/vaults/primary")));
        assert_eq!(config.output_style, Some(OutputStyle::Json));
        assert_eq!(config.pin, Some(true));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<FileConfig>("colour = true").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileConfig::discover(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn discover_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "output_style = \"list\"\n").unwrap();
        let config = FileConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.output_style, Some(OutputStyle::List));
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig {
            vault_path: Some(PathBuf::from("/from/file")),
            keyfile: Some(PathBuf::from("/file.key")),
            ..FileConfig::default()
        };
        let settings = resolve(&["--vault", "/from/flag"], file);
        assert_eq!(settings.vault_path, PathBuf::from("/from/flag"));
        assert_eq!(settings.keyfile, Some(PathBuf::from("/file.key")));
    }

    #[test]
    fn file_fills_in_booleans_and_style() {
        let file = FileConfig {
            vault_path: Some(PathBuf::from("/v")),
            pin: Some(true),
            non_interactive: Some(true),
            output_style: Some(OutputStyle::List),
            vault_password: Some("pw".into()),
            ..FileConfig::default()
        };
        let settings = resolve(&[], file);
        assert!(settings.pin);
        assert!(settings.non_interactive);
        assert_eq!(settings.output_style, OutputStyle::List);
        assert_eq!(settings.config_password.as_deref().map(String::as_str), Some("pw"));
    }

    #[test]
    fn empty_config_password_is_ignored() {
        let file = FileConfig {
            vault_path: Some(PathBuf::from("/v")),
            vault_password: Some(String::new()),
            ..FileConfig::default()
        };
        let settings = resolve(&[], file);
        assert!(settings.config_password.is_none());
    }

    #[test]
    fn filter_carries_every_flag() {
        let settings = resolve(
            &["-v", "/v", "-t", "a", "-c", "b", "-l", "c", "--label", "d", "--uuid", "e", "--sensitive"],
            FileConfig::default(),
        );
        let filter = settings.filter(&["title".to_string()]);
        assert_eq!(filter.kind, "password");
        assert_eq!(filter.titles, vec!["a"]);
        assert_eq!(filter.categories, vec!["b"]);
        assert_eq!(filter.logins, vec!["c"]);
        assert_eq!(filter.labels, vec!["d"]);
        assert_eq!(filter.uuids, vec!["e"]);
        assert!(filter.case_sensitive);
        assert_eq!(filter.order_by, vec!["title"]);
    }

    #[test]
    fn min_pin_len_from_file_or_default() {
        let settings = resolve(&["-v", "/v"], FileConfig::default());
        assert_eq!(settings.min_pin_len, DEFAULT_MIN_PIN_LEN);

        let config: FileConfig = toml::from_str("vault_path = \"/v\"\nmin_pin_len = 6\n").unwrap();
        assert_eq!(resolve(&[], config).min_pin_len, 6);
    }

    #[test]
    fn tilde_is_expanded() {
        let expanded = expand_home(Path::new("~/vault"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("vault"));
        assert_eq!(expand_home(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
