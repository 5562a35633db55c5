use anyhow::{Context as _, Result};
use clap::Args;
use dredge_core::directory::CategoryDirectory;
use dredge_core::extract::ExtractJob;

use super::{ExtractCtx, PipelineSelector, resolve_filter, run_extract};

#[derive(Args, Debug)]
pub struct StagesArgs {
    /// Pipeline to extract: 'all' or a 1-based number from `dg list`.
    #[arg(long, default_value = "all", value_parser = PipelineSelector::parse)]
    pub pipeline: PipelineSelector,

    /// Emit every stage change instead of the first date per stage.
    #[arg(long)]
    pub full: bool,
}

pub fn run_stages(args: &StagesArgs, ctx: &ExtractCtx<'_>) -> Result<()> {
    let filter = resolve_filter(ctx.client, args.pipeline)?;

    // History values can reference stages from any pipeline a deal has ever
    // lived in, so the lookup always spans all pipelines even when the
    // search is filtered to one.
    let directory = CategoryDirectory::for_all_pipelines(ctx.client)
        .context("failed to build the stage directory")?;

    let job = ExtractJob::stage_history(filter, args.full);
    run_extract(ctx, "stages", &job, &directory)
}
