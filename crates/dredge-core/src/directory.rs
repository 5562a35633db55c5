//! Category lookup: raw stage/pipeline ids to human-readable labels.
//!
//! Built once per run from the metadata endpoints, then shared read-only by
//! every reduction call. Resolution never fails: an id the directory has
//! never seen (a deleted or legacy category the CRM still references from
//! old history entries) resolves to itself.
//!
//! # Known limitation
//!
//! Stage ids are only unique within their owning pipeline, but history
//! entries carry the bare stage id with no pipeline qualifier. The merged
//! [`CategoryDirectory::for_all_pipelines`] map therefore flattens all stage
//! ids into one keyspace, and a later pipeline silently overwrites an earlier
//! one when two pipelines share a stage id. Scoping the key by pipeline would
//! make those history values unresolvable, so the flat map is kept and the
//! collision is documented instead.

use std::collections::HashMap;

use tracing::debug;

use crate::client::{ApiError, CrmApi};

/// Immutable id-to-label mapping for one category family (stages of one
/// pipeline, stages of all pipelines, or pipelines themselves).
#[derive(Debug, Clone, Default)]
pub struct CategoryDirectory {
    entries: HashMap<String, String>,
}

impl CategoryDirectory {
    /// A directory that resolves nothing. Used by reductions that never
    /// look at labels.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stage labels for a single pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::PipelineNotFound`] if the id is unknown to the
    /// CRM, or another [`ApiError`] if the stage fetch fails.
    pub fn for_pipeline(api: &dyn CrmApi, pipeline_id: &str) -> Result<Self, ApiError> {
        let mut entries = HashMap::new();
        for stage in api.pipeline_stages(pipeline_id)? {
            entries.insert(stage.id, stage.label);
        }

        debug!(pipeline = pipeline_id, stages = entries.len(), "built stage directory");
        Ok(Self { entries })
    }

    /// Stage labels for every pipeline, merged into one flat map. See the
    /// module docs for the stage-id collision behavior.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the pipeline listing or any stage fetch
    /// fails.
    pub fn for_all_pipelines(api: &dyn CrmApi) -> Result<Self, ApiError> {
        let mut entries = HashMap::new();
        for pipeline in api.list_pipelines()? {
            for stage in api.pipeline_stages(&pipeline.id)? {
                entries.insert(stage.id, stage.label);
            }
        }

        debug!(stages = entries.len(), "built merged stage directory");
        Ok(Self { entries })
    }

    /// Labels for the pipelines themselves (pipeline-history mode).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the pipeline listing fails.
    pub fn pipeline_labels(api: &dyn CrmApi) -> Result<Self, ApiError> {
        let mut entries = HashMap::new();
        for pipeline in api.list_pipelines()? {
            entries.insert(pipeline.id, pipeline.label);
        }

        Ok(Self { entries })
    }

    /// Resolve a raw category id to its label, falling back to the raw id
    /// itself when absent.
    #[must_use]
    pub fn resolve<'a>(&'a self, raw: &'a str) -> &'a str {
        self.entries.get(raw).map_or(raw, String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SearchQuery;
    use crate::model::{Pipeline, PropertyVersion, SearchPage, Stage};

    struct FakeApi {
        pipelines: Vec<Pipeline>,
        stages: Vec<(String, Vec<Stage>)>,
    }

    impl CrmApi for FakeApi {
        fn list_pipelines(&self) -> Result<Vec<Pipeline>, ApiError> {
            Ok(self.pipelines.clone())
        }

        fn pipeline_stages(&self, pipeline_id: &str) -> Result<Vec<Stage>, ApiError> {
            self.stages
                .iter()
                .find(|(id, _)| id == pipeline_id)
                .map(|(_, stages)| stages.clone())
                .ok_or_else(|| ApiError::PipelineNotFound(pipeline_id.to_string()))
        }

        fn search_deals(
            &self,
            _query: &SearchQuery,
            _after: Option<&str>,
        ) -> Result<SearchPage, ApiError> {
            unreachable!("directory construction never searches deals")
        }

        fn property_history(
            &self,
            _deal_id: &str,
            _property: &str,
        ) -> Result<Vec<PropertyVersion>, ApiError> {
            unreachable!("directory construction never reads history")
        }
    }

    fn stage(id: &str, label: &str) -> Stage {
        Stage {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    fn api() -> FakeApi {
        FakeApi {
            pipelines: vec![
                Pipeline {
                    id: "p1".to_string(),
                    label: "Sales".to_string(),
                },
                Pipeline {
                    id: "p2".to_string(),
                    label: "Renewals".to_string(),
                },
            ],
            stages: vec![
                (
                    "p1".to_string(),
                    vec![stage("10", "New"), stage("20", "Won")],
                ),
                (
                    "p2".to_string(),
                    vec![stage("20", "Renewed"), stage("30", "Churned")],
                ),
            ],
        }
    }

    #[test]
    fn for_pipeline_maps_only_that_pipelines_stages() {
        let directory = CategoryDirectory::for_pipeline(&api(), "p1").expect("known pipeline");
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.resolve("10"), "New");
        assert_eq!(directory.resolve("30"), "30");
    }

    #[test]
    fn for_pipeline_surfaces_unknown_pipeline() {
        let err = CategoryDirectory::for_pipeline(&api(), "nope").expect_err("unknown pipeline");
        assert!(matches!(err, ApiError::PipelineNotFound(id) if id == "nope"));
    }

    #[test]
    fn merged_directory_lets_later_pipelines_overwrite_collisions() {
        let directory = CategoryDirectory::for_all_pipelines(&api()).expect("directory");
        // p1 and p2 both define stage "20"; p2 is listed later and wins.
        assert_eq!(directory.resolve("20"), "Renewed");
        assert_eq!(directory.resolve("10"), "New");
        assert_eq!(directory.resolve("30"), "Churned");
        assert_eq!(directory.len(), 3);
    }

    #[test]
    fn pipeline_labels_map_pipeline_ids() {
        let directory = CategoryDirectory::pipeline_labels(&api()).expect("directory");
        assert_eq!(directory.resolve("p1"), "Sales");
        assert_eq!(directory.resolve("p2"), "Renewals");
    }

    #[test]
    fn resolve_falls_back_to_the_raw_id() {
        let directory = CategoryDirectory::empty();
        assert!(directory.is_empty());
        assert_eq!(directory.resolve("99"), "99");
    }
}
