//! Subcommand handlers and the plumbing they share.

pub mod counts;
pub mod list;
pub mod pipes;
pub mod stages;

use std::path::Path;

use anyhow::{Context as _, Result};
use dredge_core::cancel::CancelToken;
use dredge_core::client::{CrmApi as _, HubSpotClient};
use dredge_core::directory::CategoryDirectory;
use dredge_core::extract::{self, ExtractJob};
use dredge_core::model::Pipeline;
use dredge_core::sink::CsvDir;
use tracing::warn;

use crate::output::{self, OutputMode};

/// Everything an extract subcommand needs besides its own flags.
pub struct ExtractCtx<'a> {
    pub client: &'a HubSpotClient,
    pub out_dir: &'a Path,
    pub output: OutputMode,
    pub cancel: &'a CancelToken,
}

/// Pipeline selection: everything, or one pipeline picked by its 1-based
/// position in the `dg list` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineSelector {
    All,
    Index(usize),
}

impl PipelineSelector {
    /// clap value parser: `all` (any case) or a 1-based integer.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        raw.parse::<usize>()
            .map(Self::Index)
            .map_err(|_| format!("expected 'all' or a pipeline number, got '{raw}'"))
    }

    /// Resolve against the enumerated pipeline list. An out-of-range number
    /// falls back to the first pipeline with a warning rather than erroring.
    fn resolve(self, pipelines: &[Pipeline]) -> Option<String> {
        match self {
            Self::All => None,
            Self::Index(position) => {
                if let Some(pipeline) = position.checked_sub(1).and_then(|i| pipelines.get(i)) {
                    Some(pipeline.id.clone())
                } else {
                    let first = pipelines.first()?;
                    warn!(
                        position,
                        fallback = %first.label,
                        "pipeline selection out of range, using the first pipeline"
                    );
                    Some(first.id.clone())
                }
            }
        }
    }
}

/// Turn the selector into a concrete search filter, enumerating pipelines
/// only when a position actually needs resolving.
pub fn resolve_filter(client: &HubSpotClient, selector: PipelineSelector) -> Result<Option<String>> {
    match selector {
        PipelineSelector::All => Ok(None),
        PipelineSelector::Index(_) => {
            let pipelines = client.list_pipelines().context("failed to list pipelines")?;
            Ok(selector.resolve(&pipelines))
        }
    }
}

/// Run one extraction job and render its report.
pub fn run_extract(
    ctx: &ExtractCtx<'_>,
    mode: &str,
    job: &ExtractJob,
    directory: &CategoryDirectory,
) -> Result<()> {
    let mut sink = CsvDir::new(ctx.out_dir, job.file_prefix.clone());
    let report = extract::run(ctx.client, job, directory, &mut sink, ctx.cancel)
        .with_context(|| format!("{mode} extraction failed"))?;

    output::render_report(mode, &report, ctx.client.request_count(), ctx.out_dir, ctx.output)
}
