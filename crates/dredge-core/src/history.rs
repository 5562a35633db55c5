//! Per-deal property history normalization.
//!
//! Wraps the raw version-history collaborator call and turns its entries
//! into an ordered [`ChangeEvent`] sequence for one property of one deal.
//! Entries without a `value` represent unset/cleared states, not state
//! transitions, and are dropped here. Values stay raw strings; resolving
//! them to labels is the reducer's job (the change-count policy never needs
//! labels at all).

use crate::client::{ApiError, CrmApi};
use crate::model::ChangeEvent;

/// Fetch and normalize one deal's history for `property`.
///
/// Remote delivery order is preserved.
///
/// # Errors
///
/// Returns [`ApiError::DealNotFound`] if the deal id is unknown, so the
/// caller can choose between skipping the deal and aborting the run, or
/// another [`ApiError`] if the history fetch fails.
pub fn fetch_property_history(
    api: &dyn CrmApi,
    deal_id: &str,
    property: &str,
) -> Result<Vec<ChangeEvent>, ApiError> {
    let versions = api.property_history(deal_id, property)?;

    Ok(versions
        .into_iter()
        .filter_map(|version| {
            version.value.map(|raw_value| ChangeEvent {
                timestamp_ms: version.timestamp,
                raw_value,
            })
        })
        .collect())
}
