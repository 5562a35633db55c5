//! Report rendering: human-readable totals or stable JSON.

use std::path::Path;

use anyhow::Result;
use dredge_core::extract::RunReport;
use serde_json::json;

/// The two output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    #[must_use]
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Print one run's totals.
pub fn render_report(
    mode: &str,
    report: &RunReport,
    api_requests: usize,
    out_dir: &Path,
    output: OutputMode,
) -> Result<()> {
    if output.is_json() {
        let mut value = serde_json::to_value(report)?;
        value["mode"] = json!(mode);
        value["api_requests"] = json!(api_requests);
        value["output_dir"] = json!(out_dir.display().to_string());
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("dg {mode}");
    println!("  files written:    {}", report.files_written);
    println!("  deals processed:  {}", report.deals_processed);
    println!("  rows written:     {}", report.rows_written);
    println!("  deals skipped:    {}", report.deals_skipped);
    println!("  API requests:     {api_requests}");
    println!("  output dir:       {}", out_dir.display());

    if report.interrupted {
        println!();
        println!("You chose to interrupt the extraction. Good bye!");
    }

    Ok(())
}
