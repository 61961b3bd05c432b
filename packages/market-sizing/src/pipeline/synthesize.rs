//! Synthesis: formula + resolved data points → estimate.
//!
//! Pure functions. The base value of each variable is its highest-confidence
//! data point. The bounds come from a min/max sensitivity sweep: the formula
//! is evaluated once with every variable at its smallest observed value and
//! once with every variable at its largest, and the two results are ordered.
//! This is not a statistical confidence interval, and for formulas that are
//! not monotone in every variable it does not bound all combinations.
//!
//! Units are never converted. Disagreements are reported as
//! [`EstimateFlag`]s on the estimate.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::SynthesisError;
use crate::types::{
    data_point::{units_match, DataPoint},
    estimate::{Estimate, EstimateFlag, EstimateOutcome, PartialEstimate, ValueRange},
    formula::Formula,
    resolution::{ComponentResolution, ResolutionSet},
};

/// Compute the estimate for `formula`.
///
/// Fails with [`SynthesisError::UnresolvedComponent`] before evaluating
/// anything if any variable has no data points.
pub fn synthesize(formula: &Formula, resolutions: &ResolutionSet) -> Result<Estimate, SynthesisError> {
    let unresolved = unresolved_variables(formula, resolutions);
    if !unresolved.is_empty() {
        return Err(SynthesisError::UnresolvedComponent {
            components: unresolved,
        });
    }

    let expression = formula.parse_expression()?;

    let mut inputs_used: IndexMap<String, DataPoint> = IndexMap::new();
    let mut ranges: IndexMap<String, ValueRange> = IndexMap::new();
    let mut flags = Vec::new();

    for variable in formula.variables() {
        let Some((resolution, best, (min, max))) = resolutions
            .get(variable)
            .and_then(|r| Some((r, r.best()?, r.value_range()?)))
        else {
            // Unreachable after the unresolved check.
            return Err(SynthesisError::UnresolvedComponent {
                components: vec![variable.clone()],
            });
        };

        flags.extend(unit_flags(variable, resolution, best));
        inputs_used.insert(variable.clone(), best.clone());
        ranges.insert(variable.clone(), ValueRange { min, max });
    }

    let base: HashMap<String, f64> = inputs_used
        .iter()
        .map(|(name, point)| (name.clone(), point.value))
        .collect();
    let all_min: HashMap<String, f64> = ranges.iter().map(|(n, r)| (n.clone(), r.min)).collect();
    let all_max: HashMap<String, f64> = ranges.iter().map(|(n, r)| (n.clone(), r.max)).collect();

    let point_value = expression.evaluate_with(&base)?;
    let swept_min = expression.evaluate_with(&all_min)?;
    let swept_max = expression.evaluate_with(&all_max)?;

    Ok(Estimate {
        formula: formula.clone(),
        point_value,
        low_bound: swept_min.min(swept_max),
        high_bound: swept_min.max(swept_max),
        inputs_used,
        ranges,
        flags,
    })
}

/// Like [`synthesize`], but returns a flagged partial state instead of the
/// unresolved-component error.
pub fn synthesize_or_partial(
    formula: &Formula,
    resolutions: &ResolutionSet,
) -> Result<EstimateOutcome, SynthesisError> {
    match synthesize(formula, resolutions) {
        Ok(estimate) => Ok(EstimateOutcome::Complete(estimate)),
        Err(SynthesisError::UnresolvedComponent { components }) => {
            let inputs_used = formula
                .variables()
                .iter()
                .filter_map(|v| {
                    let best = resolutions.get(v)?.best()?;
                    Some((v.clone(), best.clone()))
                })
                .collect();

            Ok(EstimateOutcome::Partial(PartialEstimate {
                formula: formula.clone(),
                inputs_used,
                unresolved: components,
            }))
        }
        Err(e) => Err(e),
    }
}

fn unresolved_variables(formula: &Formula, resolutions: &ResolutionSet) -> Vec<String> {
    formula
        .variables()
        .iter()
        .filter(|v| resolutions.get(v).map_or(true, ComponentResolution::is_empty))
        .cloned()
        .collect()
}

fn unit_flags(variable: &str, resolution: &ComponentResolution, best: &DataPoint) -> Vec<EstimateFlag> {
    let mut flags = Vec::new();

    if let Some(expected) = &resolution.component.unit {
        if !units_match(expected, &best.unit) {
            flags.push(EstimateFlag::UnitMismatch {
                component: variable.to_string(),
                expected: expected.clone(),
                found: best.unit.clone(),
            });
        }
    }

    let units = resolution.distinct_units();
    if units.len() > 1 {
        flags.push(EstimateFlag::MixedUnits {
            component: variable.to_string(),
            units,
        });
    }

    flags
}
