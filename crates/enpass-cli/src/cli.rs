//! CLI argument definitions for `enpass`.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

/// Read entries from an Enpass vault.
#[derive(Parser, Debug)]
#[command(
    name = "enpass",
    version,
    about = "Read entries from an Enpass 6 vault",
    long_about = "Lists, shows and prints entries of an Enpass vault. Filters accept `%` as a \
                  wildcard and can be repeated; repeated values of one filter are OR-ed, \
                  different filters are AND-ed."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level flags. All but the filters may also follow the subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to your Enpass vault.
    #[arg(short = 'v', long, global = true)]
    pub vault: Option<PathBuf>,

    /// Path to your Enpass vault keyfile.
    #[arg(short = 'k', long, global = true)]
    pub keyfile: Option<PathBuf>,

    /// The type of field to select (password, username, email, ...). An empty
    /// value selects every type.
    #[arg(long = "type", global = true, default_value = "password")]
    pub kind: String,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Make filters case-sensitive.
    #[arg(long, global = true)]
    pub sensitive: bool,

    /// Disable prompts and fail instead.
    #[arg(short = 'n', long, visible_alias = "nonInteractive", global = true)]
    pub non_interactive: bool,

    /// Cache the vault key behind a PIN.
    #[arg(short = 'p', long, global = true)]
    pub pin: bool,

    /// Log level: error, warn, info, debug or trace. `RUST_LOG` overrides it.
    #[arg(
        long,
        global = true,
        default_value = "warn",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    pub log: String,

    /// Configuration file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Repeatable entry filters.
///
/// Accepted both before and after the subcommand; [`Cli::filters`] joins the
/// two positions.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Filter on entry title.
    #[arg(short = 't', long)]
    pub title: Vec<String>,

    /// Filter on entry category.
    #[arg(short = 'c', long)]
    pub category: Vec<String>,

    /// Filter on entry login.
    #[arg(short = 'l', long)]
    pub login: Vec<String>,

    /// Filter on field label.
    #[arg(long)]
    pub label: Vec<String>,

    /// Filter on entry UUID.
    #[arg(long)]
    pub uuid: Vec<String>,
}

impl FilterArgs {
    /// Append `other`'s terms after this one's.
    pub fn merge(&mut self, other: &FilterArgs) {
        self.title.extend(other.title.iter().cloned());
        self.category.extend(other.category.iter().cloned());
        self.login.extend(other.login.iter().cloned());
        self.label.extend(other.label.iter().cloned());
        self.uuid.extend(other.uuid.iter().cloned());
    }
}

impl Cli {
    /// Filters given before the subcommand followed by those given after it.
    pub fn filters(&self) -> FilterArgs {
        let mut filters = self.global.filters.clone();
        if let Some(after) = self.command.filters() {
            filters.merge(after);
        }
        filters
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List entries without their values.
    List(ListArgs),

    /// Show entries with their decrypted values.
    Show(ListArgs),

    /// Print the value of the one entry matching the filters.
    Pass(PassArgs),

    /// Inspect or reset the PIN-protected key cache.
    Pin(PinArgs),
}

impl Commands {
    fn filters(&self) -> Option<&FilterArgs> {
        match self {
            Commands::List(args) | Commands::Show(args) => Some(&args.filters),
            Commands::Pass(args) => Some(&args.filters),
            Commands::Pin(_) => None,
        }
    }
}

/// Flags of `list` and `show`.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Include trashed entries.
    #[arg(long)]
    pub trashed: bool,

    /// Fields to sort by.
    #[arg(short = 'o', long, default_value = "title")]
    pub orderby: Vec<String>,

    /// Output the entries as JSON.
    #[arg(long, conflicts_with_all = ["list", "yaml", "table"])]
    pub json: bool,

    /// Output the entries one field per line, like SQLite line mode.
    #[arg(long, conflicts_with_all = ["yaml", "table"])]
    pub list: bool,

    /// Output the entries as YAML.
    #[arg(long, conflicts_with = "table")]
    pub yaml: bool,

    /// Output the entries as an aligned table.
    #[arg(long)]
    pub table: bool,
}

impl ListArgs {
    /// Output style chosen on the command line, if any.
    pub fn style(&self) -> Option<OutputStyle> {
        [
            (self.json, OutputStyle::Json),
            (self.list, OutputStyle::List),
            (self.yaml, OutputStyle::Yaml),
            (self.table, OutputStyle::Table),
        ]
        .into_iter()
        .find_map(|(set, style)| set.then_some(style))
    }
}

/// Flags of `pass`.
#[derive(Args, Debug, Clone)]
pub struct PassArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Fields to sort by.
    #[arg(short = 'o', long, default_value = "title")]
    pub orderby: Vec<String>,
}

/// Flags of `pin`.
#[derive(Args, Debug, Clone)]
pub struct PinArgs {
    /// Delete the cached key for this vault.
    #[arg(long)]
    pub reset: bool,
}

/// How entries are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// One line per entry.
    #[default]
    Default,
    /// One `key = value` line per field.
    List,
    /// A JSON array.
    Json,
    /// A YAML sequence.
    Yaml,
    /// Columns with a header row.
    Table,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
