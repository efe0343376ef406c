//! `relay preview <contribution>`: unified diffs of the bot comments a pass
//! would post, edit or delete. Writes nothing.

use anyhow::{Context, Result};
use clap::Args;

use relay_core::types::ContributionId;
use relay_engine::{preview_comments, Trigger};

use super::WorldArgs;

/// Arguments for `relay preview`.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Contribution to preview, e.g. `openedx/edx-platform#123`.
    pub contribution: ContributionId,

    #[command(flatten)]
    pub world: WorldArgs,
}

impl PreviewArgs {
    pub fn run(self) -> Result<()> {
        let session = self.world.open()?;
        let pass = session
            .reconciler
            .plan(&Trigger::rescan(self.contribution.clone()))
            .with_context(|| format!("planning failed for {}", self.contribution))?;
        let previews = preview_comments(&pass, session.reconciler.renderer())
            .with_context(|| format!("rendering failed for {}", self.contribution))?;

        if previews.is_empty() {
            println!("No comment changes for {}.", self.contribution);
            return Ok(());
        }

        for preview in previews {
            println!("# {} {}", preview.action, preview.kind);
            print!("{}", preview.unified_diff);
            if !preview.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
