use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// Config files tried in order; the first existing one wins
pub const CONFIG_FILES: [&str; 4] = ["versed.toml", "versed.yaml", "versed.json", ".versed.toml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings
{
    /// Tree scanned by session operations
    pub root: PathBuf,

    /// Directory names never descended into while looking for version stores
    pub skip_dirs: Vec<String>,

    /// Extra globs pruned during the walk
    pub skip_globs: Vec<String>,

    /// What happens when the pre-mutation backup fails
    pub backup_policy: BackupPolicy,

    /// Hold the per-path advisory lock across backup + mutate
    pub lock: bool,

    /// Directory for `versed.log`
    pub log_dir: PathBuf,

    /// Defaults for `search`
    pub search: SearchConfig,
}

/// Abort-or-continue on backup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy
{
    /// Backup failure aborts the operation before the file is touched
    #[default]
    Strict,
    /// Backup failure is logged and reported; the mutation still happens
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig
{
    pub similarity_threshold: f64,
    pub max_results: usize,
    pub context_lines: usize,
}

impl Default for SearchConfig
{
    fn default() -> Self
    {
        Self { similarity_threshold: 0.8, max_results: 10, context_lines: 2 }
    }
}

impl Default for Settings
{
    fn default() -> Self
    {
        Self {
            root: PathBuf::from("."),
            skip_dirs: [
                ".git",
                ".hg",
                ".svn",
                "__pycache__",
                ".mypy_cache",
                ".pytest_cache",
                "node_modules",
                "target",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_globs: Vec::new(),
            backup_policy: BackupPolicy::Strict,
            lock: true,
            log_dir: PathBuf::from(".versed/logs"),
            search: SearchConfig::default(),
        }
    }
}

/// Load settings: explicit file (if given) or the first existing default
/// file, then `VERSED_*` environment overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<Settings>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None =>
        {
            for path in &CONFIG_FILES
            {
                if Path::new(path).exists()
                {
                    builder = builder.add_source(config::File::with_name(path));
                    break;
                }
            }
        }
    }

    // VERSED_LOCK=false, VERSED_SEARCH__MAX_RESULTS=5
    builder = builder.add_source(
        config::Environment::with_prefix("VERSED")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Settings = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("versed.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let settings = Settings::default();
    let toml_string =
        toml::to_string_pretty(&settings).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
