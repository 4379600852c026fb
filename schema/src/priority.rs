use std::env;

use once_cell::sync::Lazy;

use crate::Time;

/// Weights read from the environment the first time they are needed.
/// They stay fixed for the rest of the process.
pub static PROCESS_WEIGHTS: Lazy<PriorityWeights> = Lazy::new(PriorityWeights::from_env);

/// Order values are normalised by this divisor before weighting
const VALUE_NORMALIZER: f64 = 50.0;

/// Weights of the priority function:
/// `value_weight * (value / 50) - time_weight * creation_time`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriorityWeights {
    pub value_weight: f64,
    pub time_weight: f64,
}

impl PriorityWeights {
    pub const DEFAULT_VALUE_WEIGHT: f64 = 0.3;
    pub const DEFAULT_TIME_WEIGHT: f64 = 0.7;

    pub fn new(value_weight: f64, time_weight: f64) -> Self {
        Self {
            value_weight,
            time_weight,
        }
    }

    /// Both weights set to `1.0`
    pub fn unit() -> Self {
        Self::new(1.0, 1.0)
    }

    /// Reads `VALUE_WEIGHT` and `TIME_WEIGHT`, keeping the default for any
    /// variable that is missing or not a positive finite number.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            value_weight: weight_from_env("VALUE_WEIGHT", defaults.value_weight),
            time_weight: weight_from_env("TIME_WEIGHT", defaults.time_weight),
        }
    }

    /// Higher value raises the priority, later creation lowers it
    pub fn priority(&self, value: u64, creation_time: Time) -> f64 {
        self.value_weight * (value as f64 / VALUE_NORMALIZER)
            - self.time_weight * creation_time as f64
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VALUE_WEIGHT, Self::DEFAULT_TIME_WEIGHT)
    }
}

fn weight_from_env(name: &str, default: f64) -> f64 {
    let Ok(raw) = env::var(name) else {
        return default;
    };

    match raw.trim().parse::<f64>() {
        Ok(weight) if weight.is_finite() && weight > 0.0 => weight,
        _ => {
            log::warn!("ignoring {}={:?}, using {}", name, raw, default);
            default
        }
    }
}
