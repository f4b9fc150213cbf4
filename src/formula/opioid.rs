use crate::engine::validation::{FieldError, FieldProblem};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Oral,
    Parenteral,
    /// Dose is a delivery rate in mcg/h
    Transdermal,
}

/// Conversion coefficient of one agent to oral morphine equivalents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpioidAgent {
    pub route: Route,
    /// mg OME per mg (or per mcg/h per hour for transdermal)
    pub coefficient: f64,
}

/// One current opioid
#[derive(Debug, Clone, PartialEq)]
pub struct OpioidEntry {
    pub agent: String,
    /// mg per dose, or mcg/h for transdermal agents
    pub dose: f64,
    /// Ignored for transdermal agents
    pub doses_per_day: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpioidConversion {
    /// mg/day OME across all entries
    pub total_ome: f64,
    /// Target daily dose (mg/day) or rate (mcg/h) before the reduction
    pub equivalent_dose: f64,
    pub reduction_factor: f64,
    /// Target dose after cross-tolerance reduction, unrounded
    pub target_dose: f64,
    pub target_route: Route,
}

/// Agent name -> coefficient.
///
/// The defaults are placeholders taken from commonly published OME tables and
/// must be verified before clinical use; deployments override them through
/// configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OpioidTable {
    agents: BTreeMap<String, OpioidAgent>,
}

impl Default for OpioidTable {
    fn default() -> Self {
        let mut table = Self {
            agents: BTreeMap::new(),
        };
        table.insert("morphine", Route::Oral, 1.0);
        table.insert("morphine_iv", Route::Parenteral, 3.0);
        table.insert("oxycodone", Route::Oral, 1.5);
        table.insert("hydrocodone", Route::Oral, 1.0);
        table.insert("hydromorphone", Route::Oral, 5.0);
        table.insert("oxymorphone", Route::Oral, 3.0);
        table.insert("codeine", Route::Oral, 0.15);
        table.insert("tramadol", Route::Oral, 0.2);
        table.insert("tapentadol", Route::Oral, 0.4);
        table.insert("methadone", Route::Oral, 4.7);
        table.insert("fentanyl_patch", Route::Transdermal, 0.1);
        table
    }
}

impl OpioidTable {
    pub fn empty() -> Self {
        Self {
            agents: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, route: Route, coefficient: f64) {
        self.agents
            .insert(name.to_string(), OpioidAgent { route, coefficient });
    }

    pub fn get(&self, name: &str) -> Result<&OpioidAgent> {
        self.agents.get(name).ok_or_else(|| {
            EngineError::InvalidInput(FieldError::new(
                "agent",
                FieldProblem::UnknownChoice {
                    value: name.to_string(),
                    options: self.names(),
                },
            ))
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// mg/day OME for one entry
    pub fn ome_for(&self, agent: &str, dose: f64, doses_per_day: f64) -> Result<f64> {
        let agent = self.get(agent)?;
        let ome = match agent.route {
            Route::Transdermal => dose * 24.0 * agent.coefficient,
            Route::Oral | Route::Parenteral => dose * doses_per_day * agent.coefficient,
        };
        Ok(ome)
    }

    /// Daily dose (mg/day) or rate (mcg/h) of `agent` equivalent to `ome`
    pub fn dose_for(&self, agent: &str, ome: f64) -> Result<f64> {
        let agent = self.get(agent)?;
        let dose = match agent.route {
            Route::Transdermal => ome / (24.0 * agent.coefficient),
            Route::Oral | Route::Parenteral => ome / agent.coefficient,
        };
        Ok(dose)
    }

    /// Sum entries to OME, convert to `target`, reduce by `cross_tolerance_pct`
    pub fn convert(
        &self,
        entries: &[OpioidEntry],
        target: &str,
        cross_tolerance_pct: f64,
    ) -> Result<OpioidConversion> {
        if entries.is_empty() {
            return Err(EngineError::InvalidInput(FieldError::missing("entries")));
        }
        if !(0.0..=100.0).contains(&cross_tolerance_pct) {
            return Err(EngineError::InvalidInput(FieldError::new(
                "cross_tolerance_pct",
                FieldProblem::Invalid(format!(
                    "{} is not a percentage between 0 and 100",
                    cross_tolerance_pct
                )),
            )));
        }

        let mut total_ome = 0.0;
        for entry in entries {
            total_ome += self.ome_for(&entry.agent, entry.dose, entry.doses_per_day)?;
        }

        let target_route = self.get(target)?.route;
        let equivalent_dose = self.dose_for(target, total_ome)?;
        let reduction_factor = (100.0 - cross_tolerance_pct) / 100.0;

        Ok(OpioidConversion {
            total_ome,
            equivalent_dose,
            reduction_factor,
            target_dose: equivalent_dose * reduction_factor,
            target_route,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(agent: &str, dose: f64, doses_per_day: f64) -> OpioidEntry {
        OpioidEntry {
            agent: agent.to_string(),
            dose,
            doses_per_day,
        }
    }

    #[test]
    fn test_ome_per_entry() {
        let table = OpioidTable::default();
        assert_eq!(table.ome_for("oxycodone", 10.0, 4.0).unwrap(), 60.0);
        // transdermal: mcg/h x 24 x coefficient, frequency ignored
        let patch = table.ome_for("fentanyl_patch", 25.0, 3.0).unwrap();
        assert!((patch - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_through_morphine() {
        let table = OpioidTable::default();
        for (agent, dose, per_day) in [
            ("oxycodone", 20.0, 2.0),
            ("hydromorphone", 4.0, 6.0),
            ("codeine", 60.0, 4.0),
        ] {
            let ome = table.ome_for(agent, dose, per_day).unwrap();
            let morphine = table.dose_for("morphine", ome).unwrap();
            let back_ome = table.ome_for("morphine", morphine, 1.0).unwrap();
            let back = table.dose_for(agent, back_ome).unwrap();
            assert!((back - dose * per_day).abs() < 1e-9, "{} round trip", agent);
        }
    }

    #[test]
    fn test_convert_sums_and_reduces() {
        let table = OpioidTable::default();
        let conversion = table
            .convert(
                &[entry("oxycodone", 10.0, 4.0), entry("morphine", 15.0, 2.0)],
                "hydromorphone",
                25.0,
            )
            .unwrap();

        assert_eq!(conversion.total_ome, 90.0);
        assert_eq!(conversion.equivalent_dose, 18.0);
        assert_eq!(conversion.reduction_factor, 0.75);
        assert!((conversion.target_dose - 13.5).abs() < 1e-9);
        assert_eq!(conversion.target_route, Route::Oral);
    }

    #[test]
    fn test_convert_to_transdermal_uses_inverse() {
        let table = OpioidTable::default();
        let conversion = table
            .convert(&[entry("morphine", 30.0, 4.0)], "fentanyl_patch", 0.0)
            .unwrap();
        // 120 mg OME / (24 x 0.1) = 50 mcg/h
        assert!((conversion.target_dose - 50.0).abs() < 1e-9);
        assert_eq!(conversion.target_route, Route::Transdermal);
    }

    #[test]
    fn test_unknown_agent() {
        let table = OpioidTable::default();
        let err = table.ome_for("heroin", 10.0, 1.0).unwrap_err();
        match err {
            EngineError::InvalidInput(field) => {
                assert_eq!(field.field, "agent");
                assert!(matches!(field.problem, FieldProblem::UnknownChoice { .. }));
            }
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_and_bad_percentage() {
        let table = OpioidTable::default();
        assert!(table.convert(&[], "morphine", 25.0).is_err());
        assert!(table
            .convert(&[entry("morphine", 10.0, 1.0)], "morphine", 120.0)
            .is_err());
    }
}
