//! Subcommands, plus the world/config loading they share.

pub mod config;
pub mod preview;
pub mod reconcile;
pub mod rescan;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use relay_core::config::{self as relay_config, RelayConfig};
use relay_engine::{MemoryWorld, Reconciler};
use relay_renderer::CommentRenderer;

/// Where the world snapshot and config come from.
#[derive(Args, Debug, Clone)]
pub struct WorldArgs {
    /// World snapshot (JSON) holding contributions, comments, tracker
    /// records and directory data.
    #[arg(long, value_name = "FILE")]
    pub world: PathBuf,

    /// Config file [default: ~/.relay/config.yaml].
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// A loaded world plus a reconciler wired to it.
pub struct Session {
    pub world: Arc<MemoryWorld>,
    pub config: RelayConfig,
    pub reconciler: Reconciler,
    world_path: PathBuf,
}

impl WorldArgs {
    pub fn open(&self) -> Result<Session> {
        let config = load_config(self.config.as_ref())?;
        let world = MemoryWorld::load(&self.world)
            .with_context(|| format!("failed to load world snapshot {}", self.world.display()))?;
        let world = Arc::new(world);
        let renderer = CommentRenderer::with_overrides(config.template_dir.as_deref())
            .context("failed to load comment templates")?;
        let reconciler = Reconciler::new(
            world.clone(),
            world.clone(),
            world.clone(),
            Arc::new(config.clone()),
            Arc::new(renderer),
        );
        Ok(Session {
            world,
            config,
            reconciler,
            world_path: self.world.clone(),
        })
    }
}

impl Session {
    /// Write the world back to its snapshot file.
    pub fn persist(&self) -> Result<()> {
        self.world.save(&self.world_path).with_context(|| {
            format!(
                "failed to save world snapshot {}",
                self.world_path.display()
            )
        })
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<RelayConfig> {
    match path {
        Some(path) => relay_config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => relay_config::load().context("failed to load ~/.relay/config.yaml"),
    }
}
