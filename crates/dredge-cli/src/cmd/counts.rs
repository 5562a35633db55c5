use anyhow::Result;
use clap::Args;
use dredge_core::directory::CategoryDirectory;
use dredge_core::extract::ExtractJob;

use super::{ExtractCtx, PipelineSelector, resolve_filter, run_extract};

#[derive(Args, Debug)]
pub struct CountsArgs {
    /// Pipeline to extract: 'all' or a 1-based number from `dg list`.
    #[arg(long, default_value = "all", value_parser = PipelineSelector::parse)]
    pub pipeline: PipelineSelector,
}

pub fn run_counts(args: &CountsArgs, ctx: &ExtractCtx<'_>) -> Result<()> {
    let filter = resolve_filter(ctx.client, args.pipeline)?;

    // Counting never resolves labels, so no stage lookups are fetched.
    let job = ExtractJob::stage_change_counts(filter);
    run_extract(ctx, "counts", &job, &CategoryDirectory::empty())
}
