//! Search strategies
//!
//! A sampler proposes one value per declared parameter and is told the
//! outcome of every trial. Whatever history it keeps is its own.

use churn_core::config::{ParamKind, ParamRange};
use churn_core::{ParamMap, ParamValue};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::BTreeMap;

use super::TrialRecord;

/// Declared search space (name → range)
pub type SearchSpace = BTreeMap<String, ParamRange>;

/// Capability interface for search strategies
pub trait Sampler: Send {
    fn name(&self) -> &'static str;

    /// Propose a full assignment of `space`
    fn propose(&mut self, space: &SearchSpace, rng: &mut StdRng) -> ParamMap;

    /// Record the outcome of a finished trial
    fn observe(&mut self, trial: &TrialRecord);
}

/// Independent uniform draws per trial
#[derive(Clone, Debug, Default)]
pub struct RandomSampler;

impl RandomSampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for RandomSampler {
    fn name(&self) -> &'static str {
        "random"
    }

    fn propose(&mut self, space: &SearchSpace, rng: &mut StdRng) -> ParamMap {
        space
            .iter()
            .map(|(name, range)| (name.clone(), sample_uniform(range, &mut *rng)))
            .collect()
    }

    fn observe(&mut self, _trial: &TrialRecord) {}
}

/// Draw one value from a range
///
/// Floats are uniform (log-uniform when `log` is set); ints are uniform over
/// the inclusive integer range, or log-uniform and rounded when `log` is set.
pub fn sample_uniform(range: &ParamRange, rng: &mut impl Rng) -> ParamValue {
    if range.kind == ParamKind::Int && !range.log {
        let (low, high) = (range.min.ceil() as i64, range.max.floor() as i64);
        return ParamValue::Int(rng.gen_range(low..=high));
    }

    let (low, high) = internal_bounds(range);
    let x = if high > low { rng.gen_range(low..=high) } else { low };
    from_internal(range, x)
}

/// Bounds of the space values are sampled in (log space for log ranges)
pub(crate) fn internal_bounds(range: &ParamRange) -> (f64, f64) {
    let (min, max) = match range.kind {
        ParamKind::Int => (range.min.ceil(), range.max.floor()),
        ParamKind::Float => (range.min, range.max),
    };
    if range.log {
        (min.ln(), max.ln())
    } else {
        (min, max)
    }
}

/// Map a value of a previous assignment into sampling space
pub(crate) fn to_internal(range: &ParamRange, value: &ParamValue) -> Option<f64> {
    let v = value.as_f64()?;
    if range.log {
        (v > 0.0).then(|| v.ln())
    } else {
        Some(v)
    }
}

/// Map a sampling-space value back into a parameter value inside the range
pub(crate) fn from_internal(range: &ParamRange, x: f64) -> ParamValue {
    let v = if range.log { x.exp() } else { x };
    match range.kind {
        ParamKind::Int => {
            let (low, high) = (range.min.ceil(), range.max.floor());
            ParamValue::Int(v.round().clamp(low, high) as i64)
        }
        ParamKind::Float => ParamValue::Float(v.clamp(range.min, range.max)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn space() -> SearchSpace {
        let mut space = SearchSpace::new();
        space.insert("eta".to_string(), ParamRange::log_float(0.01, 0.3));
        space.insert("max_depth".to_string(), ParamRange::int(3, 8));
        space.insert("subsample".to_string(), ParamRange::float(0.6, 1.0));
        space.insert("brand_new_knob".to_string(), ParamRange::float(-2.0, 2.0));
        space
    }

    fn inside(range: &ParamRange, value: &ParamValue) -> bool {
        let v = value.as_f64().unwrap();
        match range.kind {
            ParamKind::Int => matches!(value, ParamValue::Int(_)) && v >= range.min && v <= range.max,
            ParamKind::Float => v >= range.min && v <= range.max,
        }
    }

    #[test]
    fn test_random_assignments_stay_inside_ranges() {
        let space = space();
        let mut sampler = RandomSampler::new();
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            let assignment = sampler.propose(&space, &mut rng);
            assert_eq!(assignment.len(), space.len());
            for (name, range) in &space {
                assert!(inside(range, &assignment[name]), "{name} = {}", assignment[name]);
            }
        }
    }

    #[test]
    fn test_int_range_covers_both_ends() {
        let range = ParamRange::int(3, 5);
        let mut rng = StdRng::seed_from_u64(11);
        let seen: std::collections::BTreeSet<i64> = (0..200)
            .map(|_| sample_uniform(&range, &mut rng).as_i64().unwrap())
            .collect();
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sample_uniform(&ParamRange::float(0.5, 0.5), &mut rng), ParamValue::Float(0.5));
        assert_eq!(sample_uniform(&ParamRange::int(4, 4), &mut rng), ParamValue::Int(4));
    }

    #[test]
    fn test_log_scale_favours_small_values() {
        let range = ParamRange::log_float(0.001, 1.0);
        let mut rng = StdRng::seed_from_u64(5);
        let below = (0..2000)
            .filter(|_| sample_uniform(&range, &mut rng).as_f64().unwrap() < 0.1)
            .count();
        // Two of three decades lie below 0.1
        assert!(below > 1100 && below < 1550, "{below}");
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let space = space();
        let a = RandomSampler::new().propose(&space, &mut StdRng::seed_from_u64(9));
        let b = RandomSampler::new().propose(&space, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
