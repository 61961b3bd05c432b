//! Per-component resolution results.

use std::cmp::Reverse;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::component::Component;
use super::data_point::{normalize_unit, DataPoint};

/// Every data point found for one component.
///
/// Deserializing goes through [`ComponentResolution::new`], so data points
/// edited or reordered outside the pipeline come back in confidence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ResolutionInput")]
pub struct ComponentResolution {
    pub component: Component,

    /// Ordered by confidence (high first), then by search rank.
    pub data_points: Vec<DataPoint>,

    /// Documents the search adapter returned.
    pub documents_retrieved: usize,

    /// Documents that produced no usable data point.
    pub documents_discarded: usize,

    /// Set when the search itself failed; the resolution is then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_error: Option<String>,
}

/// Wire shape accepted when deserializing a resolution.
#[derive(Deserialize)]
struct ResolutionInput {
    component: Component,
    #[serde(default)]
    data_points: Vec<DataPoint>,
    #[serde(default)]
    documents_retrieved: usize,
    #[serde(default)]
    documents_discarded: usize,
    #[serde(default)]
    search_error: Option<String>,
}

impl From<ResolutionInput> for ComponentResolution {
    fn from(input: ResolutionInput) -> Self {
        let mut resolution = ComponentResolution::new(input.component, input.data_points)
            .with_document_counts(input.documents_retrieved, input.documents_discarded);
        resolution.search_error = input.search_error;
        resolution
    }
}

impl ComponentResolution {
    /// Build a resolution, ordering the data points.
    pub fn new(component: Component, mut data_points: Vec<DataPoint>) -> Self {
        // Stable sort keeps rank order within a confidence level.
        data_points.sort_by(|a, b| {
            b.extraction_confidence
                .cmp(&a.extraction_confidence)
                .then(a.rank.cmp(&b.rank))
        });
        Self {
            component,
            data_points,
            documents_retrieved: 0,
            documents_discarded: 0,
            search_error: None,
        }
    }

    /// A resolution with no data points.
    pub fn empty(component: Component) -> Self {
        Self::new(component, Vec::new())
    }

    /// An empty resolution caused by a failed search.
    pub fn search_failed(component: Component, error: impl Into<String>) -> Self {
        let mut resolution = Self::empty(component);
        resolution.search_error = Some(error.into());
        resolution
    }

    pub fn with_document_counts(mut self, retrieved: usize, discarded: usize) -> Self {
        self.documents_retrieved = retrieved;
        self.documents_discarded = discarded;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data_points.is_empty()
    }

    /// The highest-confidence data point, earliest search rank on ties.
    pub fn best(&self) -> Option<&DataPoint> {
        self.data_points
            .iter()
            .min_by_key(|p| (Reverse(p.extraction_confidence), p.rank))
    }

    /// Smallest and largest observed value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.data_points.iter().fold(None, |range, point| match range {
            None => Some((point.value, point.value)),
            Some((min, max)) => Some((min.min(point.value), max.max(point.value))),
        })
    }

    /// Distinct units (canonical form) seen across the data points.
    pub fn distinct_units(&self) -> Vec<String> {
        let mut units: Vec<String> = Vec::new();
        for point in &self.data_points {
            let unit = normalize_unit(&point.unit);
            if !units.contains(&unit) {
                units.push(unit);
            }
        }
        units
    }
}

/// Resolutions keyed by component name.
///
/// Iteration follows the order components were submitted, whatever order
/// they completed in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSet {
    resolutions: IndexMap<String, ComponentResolution>,

    /// Components whose resolution was cancelled before completing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cancelled: Vec<String>,
}

impl ResolutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the resolution for its component.
    pub fn insert(&mut self, resolution: ComponentResolution) {
        let name = resolution.component.name.clone();
        self.cancelled.retain(|c| c != &name);
        self.resolutions.insert(name, resolution);
    }

    /// Builder-style insert.
    pub fn with(mut self, resolution: ComponentResolution) -> Self {
        self.insert(resolution);
        self
    }

    pub(crate) fn mark_cancelled(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.cancelled.contains(&name) {
            self.cancelled.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComponentResolution> {
        self.resolutions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ComponentResolution)> {
        self.resolutions.iter()
    }

    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    /// Components cancelled before their resolution completed.
    pub fn cancelled(&self) -> &[String] {
        &self.cancelled
    }

    /// Whether every submitted component finished resolving.
    pub fn is_complete(&self) -> bool {
        self.cancelled.is_empty()
    }

    /// Names of completed components that found no data points.
    pub fn empty_components(&self) -> Vec<String> {
        self.resolutions
            .iter()
            .filter(|(_, r)| r.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Merge another set in; its resolutions replace ours by name.
    ///
    /// Used to retry a subset of components and fold the fresh results back.
    pub fn merge(&mut self, other: ResolutionSet) {
        for (_, resolution) in other.resolutions {
            self.insert(resolution);
        }
        for name in other.cancelled {
            if !self.resolutions.contains_key(&name) {
                self.mark_cancelled(name);
            }
        }
    }
}

impl FromIterator<ComponentResolution> for ResolutionSet {
    fn from_iter<T: IntoIterator<Item = ComponentResolution>>(iter: T) -> Self {
        let mut set = Self::new();
        for resolution in iter {
            set.insert(resolution);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::data_point::Confidence;

    fn point(value: f64, confidence: Confidence, rank: usize) -> DataPoint {
        DataPoint::new(value, "USD", format!("https://example.com/{}", rank))
            .with_confidence(confidence)
            .with_rank(rank)
    }

    #[test]
    fn test_data_points_ordered_by_confidence_then_rank() {
        let resolution = ComponentResolution::new(
            Component::from_variable("spend"),
            vec![
                point(1.0, Confidence::Low, 0),
                point(2.0, Confidence::High, 3),
                point(3.0, Confidence::Medium, 1),
                point(4.0, Confidence::High, 2),
            ],
        );
        let values: Vec<f64> = resolution.data_points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![4.0, 2.0, 3.0, 1.0]);
        assert_eq!(resolution.best().unwrap().value, 4.0);
        assert_eq!(resolution.value_range(), Some((1.0, 4.0)));
    }

    #[test]
    fn test_deserialized_points_are_reordered() {
        let json = serde_json::json!({
            "component": {"name": "spend", "description": "spend", "unit": null},
            "data_points": [
                point(300.0, Confidence::Low, 0),
                point(500.0, Confidence::High, 1),
            ],
            "documents_retrieved": 2,
            "documents_discarded": 0
        });

        let resolution: ComponentResolution = serde_json::from_value(json).unwrap();
        assert_eq!(resolution.data_points[0].value, 500.0);
        assert_eq!(resolution.documents_retrieved, 2);
    }

    #[test]
    fn test_best_ignores_vector_order() {
        let mut resolution = ComponentResolution::new(
            Component::from_variable("spend"),
            vec![point(300.0, Confidence::Low, 0), point(500.0, Confidence::High, 1)],
        );
        resolution.data_points.reverse();
        assert_eq!(resolution.best().unwrap().value, 500.0);
    }

    #[test]
    fn test_empty_resolution() {
        let resolution = ComponentResolution::empty(Component::from_variable("schools"));
        assert!(resolution.is_empty());
        assert!(resolution.best().is_none());
        assert!(resolution.value_range().is_none());
    }

    #[test]
    fn test_set_preserves_insertion_order() {
        let set: ResolutionSet = ["c", "a", "b"]
            .into_iter()
            .map(|name| ComponentResolution::empty(Component::from_variable(name)))
            .collect();
        let names: Vec<&String> = set.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(set.empty_components(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_merge_replaces_and_clears_cancelled() {
        let mut set = ResolutionSet::new()
            .with(ComponentResolution::empty(Component::from_variable("a")));
        set.mark_cancelled("b");
        assert!(!set.is_complete());

        let retry = ResolutionSet::new()
            .with(ComponentResolution::new(
                Component::from_variable("a"),
                vec![point(10.0, Confidence::High, 0)],
            ))
            .with(ComponentResolution::empty(Component::from_variable("b")));
        set.merge(retry);

        assert!(set.is_complete());
        assert_eq!(set.get("a").unwrap().best().unwrap().value, 10.0);
        assert_eq!(set.len(), 2);
    }
}
