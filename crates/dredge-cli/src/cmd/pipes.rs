use anyhow::{Context as _, Result};
use clap::Args;
use dredge_core::directory::CategoryDirectory;
use dredge_core::extract::ExtractJob;

use super::{ExtractCtx, PipelineSelector, resolve_filter, run_extract};

#[derive(Args, Debug)]
pub struct PipesArgs {
    /// Pipeline to extract: 'all' or a 1-based number from `dg list`.
    #[arg(long, default_value = "all", value_parser = PipelineSelector::parse)]
    pub pipeline: PipelineSelector,

    /// Emit every pipeline change instead of the first date per pipeline.
    #[arg(long)]
    pub full: bool,
}

pub fn run_pipes(args: &PipesArgs, ctx: &ExtractCtx<'_>) -> Result<()> {
    let filter = resolve_filter(ctx.client, args.pipeline)?;
    let directory = CategoryDirectory::pipeline_labels(ctx.client)
        .context("failed to build the pipeline directory")?;

    let job = ExtractJob::pipeline_history(filter, args.full);
    run_extract(ctx, "pipes", &job, &directory)
}
