use crate::engine::validation::{FieldError, FieldProblem};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Decimal places used when a step cannot be honoured
pub const DEFAULT_DECIMALS: u32 = 2;

// Decimal places kept after step multiplication to drop float noise (0.1 * 23)
const NOISE_DECIMALS: i32 = 9;

/// Largest number of units a single plan may dispense
pub const MAX_UNITS: u32 = 1_000;

/// How a formula's output is made administrable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    None,
    Decimals(u32),
    Step(f64),
    Tablets(Vec<f64>),
}

/// Tablet (or patch) combination chosen for a dose
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabletPlan {
    pub count: u32,
    pub strength: f64,
    /// Requested minus dispensed; positive means the plan gives less than asked
    pub residual: f64,
}

impl TabletPlan {
    pub fn dispensed(&self) -> f64 {
        self.count as f64 * self.strength
    }
}

/// Practical value produced by applying a rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rounded {
    pub value: f64,
    pub tablets: Option<TabletPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundingPolicy {
    default_decimals: u32,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            default_decimals: DEFAULT_DECIMALS,
        }
    }
}

impl RoundingPolicy {
    pub fn new(default_decimals: u32) -> Self {
        Self { default_decimals }
    }

    pub fn default_decimals(&self) -> u32 {
        self.default_decimals
    }

    pub fn round_decimals(&self, value: f64, places: u32) -> f64 {
        round_places(value, places as i32)
    }

    /// Nearest multiple of `step`. A zero, negative or non-finite step falls
    /// back to the default decimal rounding.
    pub fn round_to_step(&self, value: f64, step: f64) -> f64 {
        if !(step.is_finite() && step > 0.0) {
            return self.round_decimals(value, self.default_decimals);
        }
        round_places((value / step).round() * step, NOISE_DECIMALS)
    }

    /// Largest multiple of `step` not above `value`
    pub fn floor_to_step(&self, value: f64, step: f64) -> f64 {
        if !(step.is_finite() && step > 0.0) {
            let factor = 10f64.powi(self.default_decimals as i32);
            return (value * factor).floor() / factor;
        }
        // tolerate 2.9999999 meaning 3 steps
        let steps = (value / step + 1e-9).floor();
        round_places(steps * step, NOISE_DECIMALS)
    }

    /// Choose a single strength and a count of units for `value`.
    ///
    /// For every strength the floor and ceiling counts are candidates, zero
    /// included; the one with the smallest absolute residual wins, ties going
    /// to the fewest units dispensed and then to the earlier strength in the
    /// list. Counts above `MAX_UNITS` are never proposed.
    pub fn round_tablet_count(&self, value: f64, strengths: &[f64]) -> Result<TabletPlan> {
        check_strengths(strengths)?;
        if !(value.is_finite() && value >= 0.0) {
            return Err(EngineError::InvalidInput(FieldError::new(
                "dose",
                FieldProblem::NotNumeric(value.to_string()),
            )));
        }

        let mut best: Option<TabletPlan> = None;
        for &strength in strengths {
            let floor = (value / strength + 1e-9).floor();
            for count in [floor, floor + 1.0] {
                if let Some(plan) = plan_for(value, count, strength) {
                    best = pick(best, plan);
                }
            }
        }

        best.ok_or_else(|| too_many_units(value, strengths))
    }

    /// Apply a rule to a value
    pub fn apply(&self, rule: &RoundingRule, value: f64) -> Result<Rounded> {
        let rounded = match rule {
            RoundingRule::None => Rounded {
                value,
                tablets: None,
            },
            RoundingRule::Decimals(places) => Rounded {
                value: self.round_decimals(value, *places),
                tablets: None,
            },
            RoundingRule::Step(step) => Rounded {
                value: self.round_to_step(value, *step),
                tablets: None,
            },
            RoundingRule::Tablets(strengths) => {
                let plan = self.round_tablet_count(value, strengths)?;
                Rounded {
                    value: round_places(plan.dispensed(), NOISE_DECIMALS),
                    tablets: Some(plan),
                }
            }
        };

        Ok(rounded)
    }

    /// Apply a rule without letting the practical value exceed `max`
    pub fn apply_within(&self, rule: &RoundingRule, value: f64, max: f64) -> Result<Rounded> {
        let rounded = self.apply(rule, value)?;
        if rounded.value <= max + 1e-9 {
            return Ok(rounded);
        }

        let value = match rule {
            RoundingRule::Step(step) => self.floor_to_step(max, *step),
            RoundingRule::Decimals(places) => {
                let factor = 10f64.powi(*places as i32);
                (max * factor).floor() / factor
            }
            RoundingRule::Tablets(strengths) => {
                // fall back to the largest plan that fits under the cap
                let plan = strengths
                    .iter()
                    .filter_map(|&strength| {
                        plan_for(max, (max / strength + 1e-9).floor(), strength)
                    })
                    .fold(None, pick)
                    .ok_or_else(|| too_many_units(max, strengths))?;
                return Ok(Rounded {
                    value: round_places(plan.dispensed(), NOISE_DECIMALS),
                    tablets: Some(plan),
                });
            }
            RoundingRule::None => max,
        };

        Ok(Rounded {
            value,
            tablets: None,
        })
    }
}

// Counts are worked out in f64 and only narrowed once they are in range
fn plan_for(value: f64, count: f64, strength: f64) -> Option<TabletPlan> {
    if !(0.0..=MAX_UNITS as f64).contains(&count) {
        return None;
    }
    let count = count as u32;
    Some(TabletPlan {
        count,
        strength,
        residual: round_places(value - count as f64 * strength, NOISE_DECIMALS),
    })
}

fn pick(best: Option<TabletPlan>, plan: TabletPlan) -> Option<TabletPlan> {
    match best {
        Some(current) if !is_better(&plan, &current) => Some(current),
        _ => Some(plan),
    }
}

fn check_strengths(strengths: &[f64]) -> Result<()> {
    if strengths.is_empty() {
        return Err(invalid_strengths("no tablet strengths configured"));
    }
    if let Some(bad) = strengths.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(invalid_strengths(&format!(
            "tablet strength must be positive, got {}",
            bad
        )));
    }
    Ok(())
}

fn too_many_units(value: f64, strengths: &[f64]) -> EngineError {
    let largest = strengths.iter().copied().fold(0.0, f64::max);
    EngineError::InvalidInput(FieldError::new(
        "dose",
        FieldProblem::Invalid(format!(
            "{} needs more than {} units of the largest strength ({})",
            value, MAX_UNITS, largest
        )),
    ))
}

fn is_better(candidate: &TabletPlan, current: &TabletPlan) -> bool {
    let a = candidate.residual.abs();
    let b = current.residual.abs();
    if (a - b).abs() > 1e-9 {
        return a < b;
    }
    candidate.count < current.count
}

fn round_places(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn invalid_strengths(message: &str) -> EngineError {
    EngineError::InvalidInput(FieldError::new(
        "strengths",
        FieldProblem::Invalid(message.to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_step() {
        let policy = RoundingPolicy::default();
        assert_eq!(policy.round_to_step(2.26, 0.5), 2.5);
        assert_eq!(policy.round_to_step(2.24, 0.5), 2.0);
        assert_eq!(policy.round_to_step(2.34, 0.1), 2.3);
        assert_eq!(policy.round_to_step(180.0, 1.0), 180.0);
        assert_eq!(policy.round_to_step(187.0, 12.5), 187.5);
    }

    #[test]
    fn test_round_to_step_invalid_step_uses_decimals() {
        let policy = RoundingPolicy::default();
        assert_eq!(policy.round_to_step(3.14159, 0.0), 3.14);
        assert_eq!(policy.round_to_step(3.14159, -1.0), 3.14);
        assert_eq!(policy.round_to_step(3.14159, f64::NAN), 3.14);

        let policy = RoundingPolicy::new(1);
        assert_eq!(policy.round_to_step(3.14159, 0.0), 3.1);
    }

    #[test]
    fn test_floor_to_step() {
        let policy = RoundingPolicy::default();
        assert_eq!(policy.floor_to_step(1000.0, 300.0), 900.0);
        assert_eq!(policy.floor_to_step(3.0, 0.1), 3.0);
    }

    #[test]
    fn test_tablet_count_minimizes_residual() {
        let policy = RoundingPolicy::default();
        let plan = policy.round_tablet_count(60.0, &[1.0, 5.0, 25.0]).unwrap();
        assert_eq!(plan.residual, 0.0);
        // 60 mg: 12 x 5 mg beats 60 x 1 mg; 25 mg leaves a residual
        assert_eq!(plan.strength, 5.0);
        assert_eq!(plan.count, 12);

        let plan = policy.round_tablet_count(23.0, &[5.0, 25.0]).unwrap();
        assert_eq!(plan.strength, 25.0);
        assert_eq!(plan.count, 1);
        assert_eq!(plan.residual, -2.0);
    }

    #[test]
    fn test_tablet_count_tie_breaks_on_fewest_units() {
        let policy = RoundingPolicy::default();
        // 50 mg: 2 x 25 or 10 x 5, both exact
        let plan = policy.round_tablet_count(50.0, &[5.0, 25.0]).unwrap();
        assert_eq!(plan.count, 2);
        assert_eq!(plan.strength, 25.0);

        // 7.5 with 5 mg tablets: 1 (residual 2.5) or 2 (residual -2.5)
        let plan = policy.round_tablet_count(7.5, &[5.0]).unwrap();
        assert_eq!(plan.count, 1);
        assert_eq!(plan.residual, 2.5);
    }

    #[test]
    fn test_tablet_count_can_be_zero() {
        let policy = RoundingPolicy::default();
        // 2 is closer to nothing than to one 12
        let plan = policy.round_tablet_count(2.0, &[12.0, 25.0]).unwrap();
        assert_eq!(plan.count, 0);
        assert_eq!(plan.residual, 2.0);

        let plan = policy.round_tablet_count(1.0, &[25.0]).unwrap();
        assert_eq!(plan.count, 0);
        assert_eq!(plan.residual, 1.0);

        // 20 of 25 is still nearer one unit
        let plan = policy.round_tablet_count(20.0, &[25.0]).unwrap();
        assert_eq!(plan.count, 1);
    }

    #[test]
    fn test_tablet_count_rejects_huge_doses() {
        let policy = RoundingPolicy::default();
        let err = policy.round_tablet_count(1e12, &[12.0, 25.0]).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "dose");
        assert!(policy.round_tablet_count(f64::MAX, &[1.0]).is_err());

        // small strengths that overflow are skipped while a larger one fits
        let plan = policy.round_tablet_count(5_000.0, &[1.0, 25.0]).unwrap();
        assert_eq!(plan.strength, 25.0);
        assert_eq!(plan.count, 200);

        let err = policy
            .apply_within(&RoundingRule::Tablets(vec![1.0]), 1e12, 1e11)
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "dose");
    }

    #[test]
    fn test_tablet_count_rejects_bad_strengths() {
        let policy = RoundingPolicy::default();
        assert!(policy.round_tablet_count(10.0, &[]).is_err());
        assert!(policy.round_tablet_count(10.0, &[5.0, 0.0]).is_err());
    }

    #[test]
    fn test_apply_within_cap() {
        let policy = RoundingPolicy::default();
        let rounded = policy
            .apply_within(&RoundingRule::Step(300.0), 1000.0, 1000.0)
            .unwrap();
        assert_eq!(rounded.value, 900.0);

        let rounded = policy
            .apply_within(&RoundingRule::Step(1.0), 1000.0, 1000.0)
            .unwrap();
        assert_eq!(rounded.value, 1000.0);

        let rounded = policy
            .apply_within(&RoundingRule::Tablets(vec![25.0, 40.0]), 60.0, 60.0)
            .unwrap();
        assert!(rounded.value <= 60.0);
        assert_eq!(rounded.tablets.unwrap().strength, 25.0);
    }
}
