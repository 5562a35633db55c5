//! History reduction: collapse one deal's change events into report rows.
//!
//! Three policies:
//!
//! - [`ReductionPolicy::AllEvents`]: one row per event, in remote delivery
//!   order (which is not guaranteed chronological, and is reproduced as-is).
//! - [`ReductionPolicy::FirstPerCategory`]: one row per distinct resolved
//!   label, carrying the earliest timestamp seen for that label; an argmin
//!   per group in O(events) time and O(distinct labels) space. Rows come out
//!   in first-insertion order, and ties keep the first event (strict
//!   less-than updates only).
//! - [`ReductionPolicy::ChangeCount`]: one row per deal with the number of
//!   value-carrying events.
//!
//! Timestamps format as local-time `YYYY-MM-DD HH:MM`. That is a contract:
//! the output uses the local timezone of the process, not UTC.

use chrono::{DateTime, Local};

use crate::directory::CategoryDirectory;
use crate::model::{ChangeEvent, Deal};

/// The strategy for collapsing a change-event sequence into rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionPolicy {
    AllEvents,
    FirstPerCategory,
    ChangeCount,
}

/// One output row. The shape depends on the policy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Transition {
        deal_id: String,
        deal_name: String,
        label: String,
        at: String,
    },
    Count {
        deal_id: String,
        deal_name: String,
        changes: usize,
    },
}

impl Row {
    /// Flatten into the string fields written to the batch sink.
    #[must_use]
    pub fn into_record(self) -> Vec<String> {
        match self {
            Self::Transition {
                deal_id,
                deal_name,
                label,
                at,
            } => vec![deal_id, deal_name, label, at],
            Self::Count {
                deal_id,
                deal_name,
                changes,
            } => vec![deal_id, deal_name, changes.to_string()],
        }
    }
}

/// Reduce one deal's events under `policy`.
#[must_use]
pub fn reduce(
    deal: &Deal,
    events: &[ChangeEvent],
    directory: &CategoryDirectory,
    policy: ReductionPolicy,
) -> Vec<Row> {
    match policy {
        ReductionPolicy::AllEvents => events
            .iter()
            .map(|event| Row::Transition {
                deal_id: deal.id.clone(),
                deal_name: deal.name.clone(),
                label: directory.resolve(&event.raw_value).to_string(),
                at: format_local_timestamp(event.timestamp_ms),
            })
            .collect(),

        ReductionPolicy::FirstPerCategory => {
            // Argmin per resolved label, insertion-ordered. Event counts per
            // page are small enough that a linear label scan beats carrying
            // an index map.
            let mut firsts: Vec<(String, i64)> = Vec::new();
            for event in events {
                let label = directory.resolve(&event.raw_value);
                if let Some(index) = firsts.iter().position(|(seen, _)| seen == label) {
                    if event.timestamp_ms < firsts[index].1 {
                        firsts[index].1 = event.timestamp_ms;
                    }
                } else {
                    firsts.push((label.to_string(), event.timestamp_ms));
                }
            }

            firsts
                .into_iter()
                .map(|(label, earliest)| Row::Transition {
                    deal_id: deal.id.clone(),
                    deal_name: deal.name.clone(),
                    label,
                    at: format_local_timestamp(earliest),
                })
                .collect()
        }

        ReductionPolicy::ChangeCount => vec![Row::Count {
            deal_id: deal.id.clone(),
            deal_name: deal.name.clone(),
            changes: events.len(),
        }],
    }
}

/// Epoch milliseconds to local-time `YYYY-MM-DD HH:MM`.
///
/// Milliseconds floor-divide to seconds. A timestamp outside chrono's
/// representable range falls back to the raw millisecond value.
#[must_use]
pub fn format_local_timestamp(timestamp_ms: i64) -> String {
    DateTime::from_timestamp(timestamp_ms.div_euclid(1000), 0).map_or_else(
        || timestamp_ms.to_string(),
        |utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiError, CrmApi, SearchQuery};
    use crate::model::{Pipeline, PropertyVersion, SearchPage, Stage};

    struct StagesOnly;

    impl CrmApi for StagesOnly {
        fn list_pipelines(&self) -> Result<Vec<Pipeline>, ApiError> {
            Ok(vec![Pipeline {
                id: "1".to_string(),
                label: "Sales".to_string(),
            }])
        }

        fn pipeline_stages(&self, _pipeline_id: &str) -> Result<Vec<Stage>, ApiError> {
            Ok(vec![
                Stage {
                    id: "10".to_string(),
                    label: "New".to_string(),
                },
                Stage {
                    id: "20".to_string(),
                    label: "Won".to_string(),
                },
            ])
        }

        fn search_deals(
            &self,
            _query: &SearchQuery,
            _after: Option<&str>,
        ) -> Result<SearchPage, ApiError> {
            unreachable!()
        }

        fn property_history(
            &self,
            _deal_id: &str,
            _property: &str,
        ) -> Result<Vec<PropertyVersion>, ApiError> {
            unreachable!()
        }
    }

    fn deal() -> Deal {
        Deal {
            id: "d1".to_string(),
            name: "Acme expansion".to_string(),
        }
    }

    fn event(timestamp_ms: i64, raw: &str) -> ChangeEvent {
        ChangeEvent {
            timestamp_ms,
            raw_value: raw.to_string(),
        }
    }

    fn directory() -> CategoryDirectory {
        CategoryDirectory::for_all_pipelines(&StagesOnly).expect("directory")
    }

    #[test]
    fn first_per_category_keeps_insertion_order_with_argmin_timestamps() {
        // "New" is seen first, then "Won", then "New" again with an earlier
        // timestamp. The row order stays New, Won; New carries the minimum.
        let events = [
            event(1_000_000, "10"),
            event(2_000_000, "20"),
            event(500_000, "10"),
        ];

        let rows = reduce(&deal(), &events, &directory(), ReductionPolicy::FirstPerCategory);
        assert_eq!(rows.len(), 2);

        let Row::Transition { label, at, .. } = &rows[0] else {
            panic!("expected transition row");
        };
        assert_eq!(label, "New");
        assert_eq!(at, &format_local_timestamp(500_000));

        let Row::Transition { label, at, .. } = &rows[1] else {
            panic!("expected transition row");
        };
        assert_eq!(label, "Won");
        assert_eq!(at, &format_local_timestamp(2_000_000));
    }

    #[test]
    fn first_per_category_ties_keep_the_first_event() {
        // Two distinct raw values resolving to the same missing label would
        // collide; here the same label arrives twice with an equal timestamp
        // and the later one must not overwrite.
        let events = [event(1_000, "10"), event(1_000, "10")];
        let rows = reduce(&deal(), &events, &directory(), ReductionPolicy::FirstPerCategory);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn change_count_emits_one_row_with_the_event_count() {
        let events = [
            event(1_000_000, "10"),
            event(2_000_000, "20"),
            event(500_000, "10"),
        ];

        let rows = reduce(&deal(), &events, &directory(), ReductionPolicy::ChangeCount);
        assert_eq!(
            rows,
            vec![Row::Count {
                deal_id: "d1".to_string(),
                deal_name: "Acme expansion".to_string(),
                changes: 3,
            }]
        );
    }

    #[test]
    fn change_count_of_empty_history_is_zero() {
        let rows = reduce(&deal(), &[], &CategoryDirectory::empty(), ReductionPolicy::ChangeCount);
        assert_eq!(
            rows[0],
            Row::Count {
                deal_id: "d1".to_string(),
                deal_name: "Acme expansion".to_string(),
                changes: 0,
            }
        );
    }

    #[test]
    fn all_events_preserves_delivery_order_without_sorting() {
        let events = [
            event(2_000_000, "20"),
            event(500_000, "10"),
            event(1_000_000, "20"),
        ];

        let rows = reduce(&deal(), &events, &directory(), ReductionPolicy::AllEvents);
        let labels: Vec<&str> = rows
            .iter()
            .map(|row| match row {
                Row::Transition { label, .. } => label.as_str(),
                Row::Count { .. } => panic!("unexpected count row"),
            })
            .collect();

        assert_eq!(labels, vec!["Won", "New", "Won"]);
    }

    #[test]
    fn unknown_category_falls_back_to_the_raw_value() {
        let events = [event(1_000_000, "99")];
        let rows = reduce(&deal(), &events, &directory(), ReductionPolicy::AllEvents);

        let Row::Transition { label, .. } = &rows[0] else {
            panic!("expected transition row");
        };
        assert_eq!(label, "99");
    }

    #[test]
    fn into_record_flattens_both_row_shapes() {
        let transition = Row::Transition {
            deal_id: "d1".to_string(),
            deal_name: "Acme".to_string(),
            label: "Won".to_string(),
            at: "2024-03-01 09:30".to_string(),
        };
        assert_eq!(transition.into_record(), vec!["d1", "Acme", "Won", "2024-03-01 09:30"]);

        let count = Row::Count {
            deal_id: "d2".to_string(),
            deal_name: "Beta".to_string(),
            changes: 7,
        };
        assert_eq!(count.into_record(), vec!["d2", "Beta", "7"]);
    }

    #[test]
    fn local_timestamp_has_minute_precision_shape() {
        let formatted = format_local_timestamp(1_700_000_000_000);
        // Local-timezone dependent, so assert the shape, not the instant.
        assert_eq!(formatted.len(), 16);
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[7..8], "-");
        assert_eq!(&formatted[10..11], " ");
        assert_eq!(&formatted[13..14], ":");
    }

    #[test]
    fn sub_second_timestamps_floor_toward_the_earlier_second() {
        // 1999 ms and 1000 ms land in the same second; 2000 ms does not.
        assert_eq!(format_local_timestamp(1_999), format_local_timestamp(1_000));
        // -1 ms floors to second -1, not 0.
        assert_eq!(format_local_timestamp(-1), format_local_timestamp(-1_000));
    }
}
