//! Engine-facing data model.
//!
//! These are the shapes the reduction engine operates on. The raw HubSpot
//! wire types live next to the HTTP client and are mapped into these before
//! anything else sees them.

/// A deal pipeline as enumerated by the CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub id: String,
    pub label: String,
}

/// One stage within a pipeline. Stage ids are only unique within their
/// owning pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub id: String,
    pub label: String,
}

/// The paginated record being processed: a deal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deal {
    pub id: String,
    pub name: String,
}

/// One page of deal-search results plus the continuation token.
///
/// An absent `next_cursor` means the search is exhausted.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub deals: Vec<Deal>,
    pub next_cursor: Option<String>,
}

/// A raw property version entry as returned by the history endpoint.
///
/// `value: None` marks an unset/cleared state rather than a transition;
/// such entries are filtered out before reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyVersion {
    pub timestamp: i64,
    pub value: Option<String>,
}

/// One recorded transition of a deal property, timestamp in epoch
/// milliseconds.
///
/// Events arrive in whatever order the remote returns them. That order is
/// not guaranteed chronological and the engine never re-sorts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub timestamp_ms: i64,
    pub raw_value: String,
}
