//! Shot-budget adaptation during training

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::machine_learning::core::ConfigurationError;

/// Signature of a user-supplied policy: `(current budget, objective calls so far, best loss)`
pub type ShotRuleFn = dyn Fn(Option<usize>, usize, f64) -> Option<usize> + Send + Sync;

/// How the shot budget evolves over the objective calls of one `fit`
#[derive(Clone, Default)]
pub enum ShotPolicy {
    /// Never change the budget
    #[default]
    Constant,
    /// Multiply the budget by a factor, rounding down
    Multiplicative(f64),
    /// Add a fixed number of shots
    Additive(usize),
    /// Arbitrary rule; called on every objective call
    Custom(Arc<ShotRuleFn>),
}

impl ShotPolicy {
    pub fn custom<F>(rule: F) -> Self
    where
        F: Fn(Option<usize>, usize, f64) -> Option<usize> + Send + Sync + 'static,
    {
        ShotPolicy::Custom(Arc::new(rule))
    }

    /// Budget to use for the objective call numbered `call_index`.
    ///
    /// Built-in policies only act every `delay` calls, never on the first
    /// call, and leave an exact (`None`) budget alone.
    pub fn next_budget(&self, current: Option<usize>, call_index: usize, best_loss: f64, delay: usize) -> Option<usize> {
        let due = delay > 0 && call_index > 0 && call_index % delay == 0;

        match self {
            ShotPolicy::Constant => current,
            ShotPolicy::Multiplicative(factor) if due => {
                current.map(|shots| (factor * shots as f64).floor().max(0.0) as usize)
            }
            ShotPolicy::Additive(increment) if due => current.map(|shots| shots.saturating_add(*increment)),
            ShotPolicy::Multiplicative(_) | ShotPolicy::Additive(_) => current,
            ShotPolicy::Custom(rule) => rule(current, call_index, best_loss),
        }
    }
}

impl fmt::Debug for ShotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShotPolicy::Constant => write!(f, "Constant"),
            ShotPolicy::Multiplicative(factor) => write!(f, "Multiplicative({})", factor),
            ShotPolicy::Additive(increment) => write!(f, "Additive({})", increment),
            ShotPolicy::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl fmt::Display for ShotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShotPolicy::Constant => write!(f, "none"),
            ShotPolicy::Multiplicative(factor) => write!(f, "x{}", factor),
            ShotPolicy::Additive(increment) => write!(f, "+{}", increment),
            ShotPolicy::Custom(_) => write!(f, "custom"),
        }
    }
}

/// Parses the rendering produced by `Display`; custom rules cannot be restored
impl FromStr for ShotPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigurationError::InvalidValue(format!("unknown shot policy {:?}", s));

        if s == "none" {
            Ok(ShotPolicy::Constant)
        } else if let Some(factor) = s.strip_prefix('x') {
            factor.parse().map(ShotPolicy::Multiplicative).map_err(|_| invalid())
        } else if let Some(increment) = s.strip_prefix('+') {
            increment.parse().map(ShotPolicy::Additive).map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_policy_never_changes() {
        let policy = ShotPolicy::Constant;
        assert_eq!(policy.next_budget(Some(100), 40, 0.5, 20), Some(100));
        assert_eq!(policy.next_budget(None, 40, 0.5, 20), None);
    }

    #[test]
    fn test_multiplicative_fires_on_delay_multiples() {
        let policy = ShotPolicy::Multiplicative(1.5);
        assert_eq!(policy.next_budget(Some(100), 0, 1.0, 20), Some(100));
        assert_eq!(policy.next_budget(Some(100), 19, 1.0, 20), Some(100));
        assert_eq!(policy.next_budget(Some(100), 20, 1.0, 20), Some(150));
        assert_eq!(policy.next_budget(Some(101), 40, 1.0, 20), Some(151));
        assert_eq!(policy.next_budget(None, 20, 1.0, 20), None);
    }

    #[test]
    fn test_additive_policy() {
        let policy = ShotPolicy::Additive(10);
        assert_eq!(policy.next_budget(Some(50), 5, 1.0, 5), Some(60));
        assert_eq!(policy.next_budget(Some(50), 6, 1.0, 5), Some(50));
    }

    #[test]
    fn test_custom_policy_sees_best_loss() {
        let policy = ShotPolicy::custom(|current, _, best| if best < 0.1 { current.map(|s| s * 2) } else { current });
        assert_eq!(policy.next_budget(Some(8), 3, 0.05, 20), Some(16));
        assert_eq!(policy.next_budget(Some(8), 3, 0.5, 20), Some(8));
        assert_eq!(policy.to_string(), "custom");
        assert!("custom".parse::<ShotPolicy>().is_err());
    }

    #[test]
    fn test_description_parses_back() {
        let restored: ShotPolicy = ShotPolicy::Multiplicative(1.5).to_string().parse().unwrap();
        assert_eq!(restored.next_budget(Some(10), 20, 0.0, 20), Some(15));

        let restored: ShotPolicy = ShotPolicy::Additive(7).to_string().parse().unwrap();
        assert_eq!(restored.to_string(), "+7");
        assert!(matches!("none".parse::<ShotPolicy>(), Ok(ShotPolicy::Constant)));
    }
}
