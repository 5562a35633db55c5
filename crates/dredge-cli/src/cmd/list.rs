use anyhow::{Context as _, Result};
use dredge_core::client::{CrmApi as _, HubSpotClient};
use serde_json::json;

use crate::output::OutputMode;

/// Enumerate pipelines so the operator can pick a `--pipeline` number.
pub fn run_list(client: &HubSpotClient, output: OutputMode) -> Result<()> {
    let pipelines = client.list_pipelines().context("failed to list pipelines")?;

    if output.is_json() {
        let rows: Vec<_> = pipelines
            .iter()
            .enumerate()
            .map(|(index, pipeline)| {
                json!({
                    "position": index + 1,
                    "id": pipeline.id,
                    "label": pipeline.label,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Your pipelines, 1 to {}:", pipelines.len());
    for (index, pipeline) in pipelines.iter().enumerate() {
        println!("{}. {} (ID: {})", index + 1, pipeline.label, pipeline.id);
    }

    Ok(())
}
