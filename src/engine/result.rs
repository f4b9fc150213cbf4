use crate::engine::inputs::EchoedInput;
use crate::formula::spec::AuxOutput;
use crate::rounding::TabletPlan;
use crate::units::Unit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one calculation. Built once by the engine and read-only after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputationResult {
    formula_id: String,
    formula_name: String,
    timestamp: DateTime<Utc>,
    inputs: Vec<EchoedInput>,
    raw_output: f64,
    applied_cap: bool,
    cap_max: Option<f64>,
    output: f64,
    unit: Unit,
    output_label: String,
    tablets: Option<TabletPlan>,
    aux: Vec<AuxOutput>,
    warnings: Vec<String>,
    notes: Vec<String>,
}

/// Field-by-field assembly used by the engine
#[derive(Debug, Clone)]
pub(crate) struct ResultParts {
    pub formula_id: String,
    pub formula_name: String,
    pub timestamp: DateTime<Utc>,
    pub inputs: Vec<EchoedInput>,
    pub raw_output: f64,
    pub applied_cap: bool,
    pub cap_max: Option<f64>,
    pub output: f64,
    pub unit: Unit,
    pub output_label: String,
    pub tablets: Option<TabletPlan>,
    pub aux: Vec<AuxOutput>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

impl From<ResultParts> for ComputationResult {
    fn from(parts: ResultParts) -> Self {
        Self {
            formula_id: parts.formula_id,
            formula_name: parts.formula_name,
            timestamp: parts.timestamp,
            inputs: parts.inputs,
            raw_output: parts.raw_output,
            applied_cap: parts.applied_cap,
            cap_max: parts.cap_max,
            output: parts.output,
            unit: parts.unit,
            output_label: parts.output_label,
            tablets: parts.tablets,
            aux: parts.aux,
            warnings: parts.warnings,
            notes: parts.notes,
        }
    }
}

impl ComputationResult {
    pub fn formula_id(&self) -> &str {
        &self.formula_id
    }

    pub fn formula_name(&self) -> &str {
        &self.formula_name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Inputs in declared field order; row fields follow their group
    pub fn inputs(&self) -> &[EchoedInput] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&EchoedInput> {
        self.inputs.iter().find(|input| input.name == name)
    }

    /// Formula output before capping and rounding
    pub fn raw_output(&self) -> f64 {
        self.raw_output
    }

    /// True only when a clamping cap replaced the raw output
    pub fn applied_cap(&self) -> bool {
        self.applied_cap
    }

    /// Maximum in effect for this calculation, if the formula has a cap
    pub fn cap_max(&self) -> Option<f64> {
        self.cap_max
    }

    /// Practical (capped and rounded) output
    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn output_label(&self) -> &str {
        &self.output_label
    }

    pub fn tablets(&self) -> Option<&TabletPlan> {
        self.tablets.as_ref()
    }

    pub fn aux(&self) -> &[AuxOutput] {
        &self.aux
    }

    pub fn aux_value(&self, name: &str) -> Option<f64> {
        self.aux.iter().find(|aux| aux.name == name).map(|aux| aux.value)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
