//! Estimates produced by synthesis.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::data_point::DataPoint;
use super::formula::Formula;

/// Observed spread of one component's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Something a reader of the estimate should know about its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateFlag {
    /// The chosen data point's unit differs from the component's expected unit.
    UnitMismatch {
        component: String,
        expected: String,
        found: String,
    },

    /// A component's data points disagree on unit, so its range mixes units.
    MixedUnits {
        component: String,
        units: Vec<String>,
    },
}

/// A market-size estimate.
///
/// `low_bound`/`high_bound` come from a min/max sensitivity sweep over the
/// observed data points, not from a statistical confidence interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub formula: Formula,
    pub point_value: f64,
    pub low_bound: f64,
    pub high_bound: f64,

    /// The data point chosen for each component, in formula variable order.
    pub inputs_used: IndexMap<String, DataPoint>,

    /// The value spread swept for each component.
    pub ranges: IndexMap<String, ValueRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<EstimateFlag>,
}

impl Estimate {
    pub fn has_flags(&self) -> bool {
        !self.flags.is_empty()
    }
}

/// Synthesis state when some components have no data.
///
/// No evaluation has been performed; the caller decides whether to retry
/// resolution for `unresolved` or accept the gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialEstimate {
    pub formula: Formula,

    /// Best data point for each component that did resolve.
    pub inputs_used: IndexMap<String, DataPoint>,

    pub unresolved: Vec<String>,
}

/// Complete estimate or flagged partial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EstimateOutcome {
    Complete(Estimate),
    Partial(PartialEstimate),
}

impl EstimateOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn estimate(&self) -> Option<&Estimate> {
        match self {
            Self::Complete(estimate) => Some(estimate),
            Self::Partial(_) => None,
        }
    }

    pub fn formula(&self) -> &Formula {
        match self {
            Self::Complete(estimate) => &estimate.formula,
            Self::Partial(partial) => &partial.formula,
        }
    }
}
