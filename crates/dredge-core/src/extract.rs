//! The paginated extraction run.
//!
//! Drives the deal search page by page: each page gets one history fetch per
//! deal, one reduction pass, and exactly one batch written through the sink
//! before the next page is requested. The cursor is the only mutable run
//! state; the loop is a two-state machine (`Fetching` -> `Done`) that stops
//! on an empty result page or an absent continuation token.
//!
//! Failure policy: a deal the CRM no longer knows is logged and skipped, any
//! other remote error aborts the run. Batches already written stay on disk;
//! each file is a complete, independent unit and there is no rollback.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::client::{ApiError, CrmApi, SearchQuery};
use crate::directory::CategoryDirectory;
use crate::history;
use crate::reduce::{ReductionPolicy, reduce};
use crate::sink::BatchSink;

/// Errors that abort an extraction run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to write extract output: {0}")]
    Sink(#[from] std::io::Error),
}

/// Everything that parametrizes one extraction run. The three constructors
/// mirror the three report modes; page sizes and file prefixes are fixed
/// per mode.
#[derive(Debug, Clone)]
pub struct ExtractJob {
    /// Deal property whose version history is extracted.
    pub property: String,
    /// Properties requested from the search endpoint.
    pub search_properties: Vec<String>,
    /// Output file name prefix, completed by the 1-based batch index.
    pub file_prefix: String,
    /// Fixed CSV header for this mode.
    pub header: Vec<String>,
    pub policy: ReductionPolicy,
    pub page_size: u32,
    /// Restrict the search to one pipeline; `None` extracts everything.
    pub pipeline_filter: Option<String>,
}

impl ExtractJob {
    /// Deal-stage history. `full` emits every event; otherwise only the
    /// first date each stage was reached.
    #[must_use]
    pub fn stage_history(pipeline_filter: Option<String>, full: bool) -> Self {
        Self {
            property: "dealstage".to_string(),
            search_properties: owned(&["dealstage", "dealname"]),
            file_prefix: "deal_stage_history_".to_string(),
            header: owned(&["Deal ID", "Deal Name", "Deal Stage", "Timestamp"]),
            policy: if full {
                ReductionPolicy::AllEvents
            } else {
                ReductionPolicy::FirstPerCategory
            },
            page_size: 20,
            pipeline_filter,
        }
    }

    /// Deal-pipeline history: which pipelines a deal has moved through.
    #[must_use]
    pub fn pipeline_history(pipeline_filter: Option<String>, full: bool) -> Self {
        Self {
            property: "pipeline".to_string(),
            search_properties: owned(&["dealstage", "dealname", "pipeline"]),
            file_prefix: "deal_pipeline_history_".to_string(),
            header: owned(&["Deal ID", "Deal Name", "Pipeline Name", "Timestamp"]),
            policy: if full {
                ReductionPolicy::AllEvents
            } else {
                ReductionPolicy::FirstPerCategory
            },
            page_size: 50,
            pipeline_filter,
        }
    }

    /// Stage-change counts: one row per deal.
    #[must_use]
    pub fn stage_change_counts(pipeline_filter: Option<String>) -> Self {
        Self {
            property: "dealstage".to_string(),
            search_properties: owned(&["dealstage", "dealname"]),
            file_prefix: "deal_stage_changes_".to_string(),
            header: owned(&["Deal ID", "Deal Name", "Number of Stage Changes"]),
            policy: ReductionPolicy::ChangeCount,
            page_size: 20,
            pipeline_filter,
        }
    }
}

fn owned(fields: &[&str]) -> Vec<String> {
    fields.iter().map(ToString::to_string).collect()
}

/// Aggregated totals for one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub files_written: u32,
    pub deals_processed: usize,
    pub rows_written: usize,
    pub deals_skipped: usize,
    pub interrupted: bool,
}

enum PageState {
    Fetching(Option<String>),
    Done,
}

/// Run one extraction to completion, interruption, or first fatal error.
///
/// # Errors
///
/// Returns [`ExtractError::Api`] on any remote failure other than a
/// skippable missing deal, and [`ExtractError::Sink`] if a batch cannot be
/// written.
pub fn run(
    api: &dyn CrmApi,
    job: &ExtractJob,
    directory: &CategoryDirectory,
    sink: &mut dyn BatchSink,
    cancel: &CancelToken,
) -> Result<RunReport, ExtractError> {
    sink.prepare()?;

    let query = SearchQuery {
        pipeline_id: job.pipeline_filter.clone(),
        properties: job.search_properties.clone(),
        page_size: job.page_size,
    };

    let mut report = RunReport::default();
    let mut state = PageState::Fetching(None);
    let mut file_index = 1_u32;

    while let PageState::Fetching(cursor) = state {
        if cancel.is_cancelled() {
            report.interrupted = true;
            break;
        }

        debug!(cursor = cursor.as_deref().unwrap_or("<start>"), "requesting deal page");
        let page = api.search_deals(&query, cursor.as_deref())?;
        if page.deals.is_empty() {
            state = PageState::Done;
            continue;
        }

        info!(deals = page.deals.len(), file_index, "processing page");
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut cancelled_mid_page = false;

        for deal in &page.deals {
            if cancel.is_cancelled() {
                cancelled_mid_page = true;
                break;
            }

            let events = match history::fetch_property_history(api, &deal.id, &job.property) {
                Ok(events) => events,
                Err(ApiError::DealNotFound(id)) => {
                    warn!(deal = %id, "deal unknown to the CRM, skipping");
                    report.deals_skipped += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            for row in reduce(deal, &events, directory, job.policy) {
                rows.push(row.into_record());
            }
            report.deals_processed += 1;
        }

        // A partially processed page is still written: every file on disk
        // is a complete, independent unit, so prior work survives an
        // interrupt mid-page.
        sink.write_batch(file_index, &job.header, &rows)?;
        report.files_written += 1;
        report.rows_written += rows.len();
        info!(total = report.deals_processed, "deals processed so far");

        if cancelled_mid_page {
            report.interrupted = true;
            break;
        }

        state = match page.next_cursor {
            Some(next) => PageState::Fetching(Some(next)),
            None => PageState::Done,
        };
        file_index += 1;
    }

    if report.interrupted {
        info!("extraction interrupted; partial output kept");
    }

    Ok(report)
}
