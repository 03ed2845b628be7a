use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;

use super::{OutputFormat, print_json, resolve_format};
use crate::config::{CONFIG_TOML, RigConfig, SETTINGS_DIR, find_config};
use crate::error::ExitError;
use crate::namepool::NamePool;

/// Flags shared by every name pool subcommand.
#[derive(Debug, clap::Args)]
pub struct PoolArgs {
    /// Rig directory (default: current directory)
    #[arg(long)]
    pub rig_root: Option<PathBuf>,
    /// Rig name (default: config `name`, then the rig directory name)
    #[arg(long)]
    pub rig: Option<String>,
    /// Names of workers currently alive, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub live: Vec<String>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl PoolArgs {
    fn rig_root(&self) -> anyhow::Result<PathBuf> {
        match &self.rig_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("could not determine current directory"),
        }
    }

    /// Open the rig's pool and seed in-use tracking from `--live`.
    fn open(&self) -> anyhow::Result<(PathBuf, RigConfig, NamePool)> {
        let root = self.rig_root()?;
        let config = RigConfig::load_for_rig(&root)?;
        let rig_name = self.rig.clone().unwrap_or_else(|| config.rig_name(&root));
        let pool = NamePool::open(&root, &rig_name, &config.namepool).map_err(ExitError::from)?;
        pool.reconcile(&self.live);
        Ok((root, config, pool))
    }
}

#[derive(Debug, Subcommand)]
pub enum NamesCommand {
    /// Allocate a worker name
    Allocate {
        #[command(flatten)]
        args: PoolArgs,
    },
    /// Return a name to the pool
    Release {
        name: String,
        #[command(flatten)]
        args: PoolArgs,
    },
    /// Reset in-use tracking to the given live worker names
    Reconcile {
        /// Live worker names
        names: Vec<String>,
        #[command(flatten)]
        args: PoolArgs,
    },
    /// Switch the rig to another theme and record it in the rig config
    Theme {
        theme: String,
        #[command(flatten)]
        args: PoolArgs,
    },
    /// Show pool state
    Status {
        #[command(flatten)]
        args: PoolArgs,
    },
    /// List built-in and custom themes
    Themes {
        #[command(flatten)]
        args: PoolArgs,
    },
}

impl NamesCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Self::Allocate { args } => allocate(args),
            Self::Release { name, args } => release(name, args),
            Self::Reconcile { names, args } => reconcile(names, args),
            Self::Theme { theme, args } => set_theme(theme, args),
            Self::Status { args } => status(args),
            Self::Themes { args } => list_themes(args),
        }
    }
}

fn allocate(args: &PoolArgs) -> anyhow::Result<()> {
    let (_, _, pool) = args.open()?;
    let name = pool.update(NamePool::allocate).map_err(ExitError::from)?;
    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&serde_json::json!({
            "rig": pool.rig_name(),
            "theme": pool.theme(),
            "name": name,
        })),
        OutputFormat::Pretty | OutputFormat::Text => {
            println!("{name}");
            Ok(())
        }
    }
}

fn release(name: &str, args: &PoolArgs) -> anyhow::Result<()> {
    let (_, _, pool) = args.open()?;
    let was_in_use = pool.is_in_use(name);
    pool.update(|p| p.release(name)).map_err(ExitError::from)?;
    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&serde_json::json!({
            "name": name,
            "released": was_in_use,
        })),
        OutputFormat::Pretty | OutputFormat::Text => {
            if was_in_use {
                println!("released {name}");
            } else {
                println!("{name} was not in use");
            }
            Ok(())
        }
    }
}

fn reconcile(names: &[String], args: &PoolArgs) -> anyhow::Result<()> {
    let (_, _, pool) = args.open()?;
    let live: Vec<&str> = names
        .iter()
        .chain(&args.live)
        .map(String::as_str)
        .collect();
    pool.update(|p| p.reconcile(&live)).map_err(ExitError::from)?;
    render_status(&pool, args.format)
}

fn set_theme(theme: &str, args: &PoolArgs) -> anyhow::Result<()> {
    let (root, mut config, pool) = args.open()?;
    pool.update(|p| p.set_theme(theme))
        .and_then(|set| set)
        .map_err(ExitError::from)?;

    config.namepool.style = Some(theme.to_string());
    config.namepool.names.clear();
    let path = write_config(&root, &config)?;
    tracing::info!(theme, config = %path.display(), "rig theme updated");

    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&pool.status()),
        OutputFormat::Pretty | OutputFormat::Text => {
            println!("theme set to {theme} ({})", path.display());
            Ok(())
        }
    }
}

/// Write the config back in place; JSON configs are migrated to TOML.
fn write_config(root: &Path, config: &RigConfig) -> anyhow::Result<PathBuf> {
    let path = match find_config(root) {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => path,
        _ => root.join(SETTINGS_DIR).join(CONFIG_TOML),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, config.to_toml()?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn status(args: &PoolArgs) -> anyhow::Result<()> {
    let (_, _, pool) = args.open()?;
    render_status(&pool, args.format)
}

fn render_status(pool: &NamePool, format: Option<OutputFormat>) -> anyhow::Result<()> {
    let status = pool.status();
    match resolve_format(format) {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Text => {
            println!(
                "rig={} theme={} max={} overflow_next={} in_use={} available={}",
                status.rig_name,
                status.theme,
                status.max_size,
                status.overflow_next,
                status.in_use.len(),
                status.available.len()
            );
            Ok(())
        }
        OutputFormat::Pretty => {
            println!("Rig:            {}", status.rig_name);
            println!("Theme:          {}", status.theme);
            println!("Themed limit:   {}", status.max_size);
            println!("Next overflow:  {}", status.overflow_next);
            if status.in_use.is_empty() {
                println!("In use:         (none)");
            } else {
                println!("In use:         {}", status.in_use.join(", "));
            }
            println!("Available:      {}", status.available.len());
            Ok(())
        }
    }
}

fn list_themes(args: &PoolArgs) -> anyhow::Result<()> {
    let (_, _, pool) = args.open()?;
    let active = pool.theme();
    let themes = pool.available_themes();
    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&serde_json::json!({
            "active": active,
            "themes": themes,
        })),
        OutputFormat::Pretty | OutputFormat::Text => {
            for theme in &themes {
                let marker = if *theme == active { "*" } else { " " };
                println!("{marker} {theme}");
            }
            Ok(())
        }
    }
}
