use crate::config::EngineConfig;
use crate::engine::fields::FieldBinder;
use crate::engine::inputs::{FormulaInputs, RawInputs};
use crate::engine::result::{ComputationResult, ResultParts};
use crate::engine::validation::ValidationErrors;
use crate::error::{EngineError, Result};
use crate::formula::spec::{AuxOutput, CapMode, FormulaSpec, FormulaSummary};
use crate::formula::FormulaRegistry;
use crate::rounding::{Rounded, RoundingPolicy};
use crate::units::{format_number, Unit, UnitConverter};
use chrono::{DateTime, Utc};

// µg/mL per mg/mL
const UG_PER_MG: f64 = 1_000.0;

/// Validates, converts, computes, caps and rounds.
///
/// Immutable after construction; share one engine and keep a
/// `HistoryStore` per session.
#[derive(Debug, Clone)]
pub struct DoseEngine {
    registry: FormulaRegistry,
    policy: RoundingPolicy,
}

impl DoseEngine {
    pub fn new(registry: FormulaRegistry) -> Self {
        Self {
            registry,
            policy: RoundingPolicy::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            registry: FormulaRegistry::builtin(config),
            policy: RoundingPolicy::new(config.rounding.default_decimals),
        }
    }

    pub fn with_defaults() -> Self {
        Self::from_config(&EngineConfig::default())
    }

    pub fn registry(&self) -> &FormulaRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RoundingPolicy {
        &self.policy
    }

    pub fn describe(&self, formula_id: &str) -> Result<FormulaSummary> {
        Ok(self.registry.get(formula_id)?.summary())
    }

    pub fn compute(&self, formula_id: &str, raw: &RawInputs) -> Result<ComputationResult> {
        self.compute_at(formula_id, raw, Utc::now())
    }

    /// `compute` with a caller-supplied timestamp
    pub fn compute_at(
        &self,
        formula_id: &str,
        raw: &RawInputs,
        timestamp: DateTime<Utc>,
    ) -> Result<ComputationResult> {
        let spec = self.registry.get(formula_id)?;

        let converter = match spec.molecular_weight {
            Some(mw) => UnitConverter::new().with_molecular_weight(mw),
            None => UnitConverter::new(),
        };

        let mut errors = ValidationErrors::new();
        let bound = FieldBinder::new(&converter).bind(&spec.fields, raw, "", &mut errors);
        if !errors.is_empty() {
            log::debug!(
                "Formula '{}' rejected {} field(s): {:?}",
                spec.id,
                errors.len(),
                errors.fields()
            );
            return Err(EngineError::Validation(errors));
        }

        let output = spec.evaluate(&bound.inputs)?;
        if !output.value.is_finite() {
            return Err(EngineError::Conversion(format!(
                "formula '{}' produced a non-finite result",
                spec.id
            )));
        }

        let unit = output.unit.unwrap_or(spec.output_unit);
        let rule = output.rounding.clone().unwrap_or_else(|| spec.rounding.clone());
        let mut warnings = output.warnings.clone();
        let raw_output = output.value;

        let cap = spec.cap.as_ref().map(|cap| (cap, cap.effective_max(&bound.inputs)));
        let mut applied_cap = false;
        let mut value = raw_output;

        if let Some((cap, max)) = cap {
            if raw_output > max {
                match cap.mode {
                    CapMode::Clamp => {
                        applied_cap = true;
                        value = max;
                        warnings.push(format!(
                            "Calculated {} {} exceeds the maximum of {} {}; capped to {} {}",
                            format_number(raw_output),
                            unit,
                            format_number(max),
                            unit,
                            format_number(max),
                            unit
                        ));
                    }
                    CapMode::WarnOnly => {
                        warnings.push(format!(
                            "Calculated {} {} exceeds the usual maximum of {} {}",
                            format_number(raw_output),
                            unit,
                            format_number(max),
                            unit
                        ));
                    }
                }
                log::warn!(
                    "Formula '{}' output {} above cap {} ({:?})",
                    spec.id,
                    raw_output,
                    max,
                    cap.mode
                );
            }
        }

        let rounded = match cap {
            Some((cap, max)) if cap.mode == CapMode::Clamp => {
                self.policy.apply_within(&rule, value, max)?
            }
            _ => self.policy.apply(&rule, value)?,
        };

        if let Some(plan) = rounded.tablets.filter(|plan| plan.count == 0 && value > 0.0) {
            warnings.push(format!(
                "Calculated {} {} is closer to none than to one {} {} unit",
                format_number(value),
                unit,
                format_number(plan.strength),
                unit
            ));
        }

        let mut aux = output.aux;
        if let Some(volume) = self.liquid_volume(spec, &bound.inputs, &rounded) {
            aux.push(volume);
        }

        log::debug!(
            "Formula '{}': raw {} -> practical {} {}",
            spec.id,
            raw_output,
            rounded.value,
            unit
        );

        Ok(ResultParts {
            formula_id: spec.id.clone(),
            formula_name: spec.name.clone(),
            timestamp,
            inputs: bound.echoed,
            raw_output,
            applied_cap,
            cap_max: cap.map(|(_, max)| max),
            output: rounded.value,
            unit,
            output_label: spec.output_label.clone(),
            tablets: rounded.tablets,
            aux,
            warnings,
            notes: spec.notes.clone(),
        }
        .into())
    }

    // Volume of the preparation that delivers the practical dose
    fn liquid_volume(
        &self,
        spec: &FormulaSpec,
        inputs: &FormulaInputs,
        rounded: &Rounded,
    ) -> Option<AuxOutput> {
        let liquid = spec.liquid_volume.as_ref()?;
        let strength = inputs.optional_number(&liquid.concentration_field)?;
        if strength <= 0.0 {
            return None;
        }

        let mg_per_ml = strength / UG_PER_MG;
        let volume = self
            .policy
            .round_to_step(rounded.value / mg_per_ml, liquid.step_ml);
        Some(AuxOutput {
            name: "liquid_volume".to_string(),
            label: "Volume".to_string(),
            value: volume,
            unit: Some(Unit::Millilitre),
        })
    }
}

impl Default for DoseEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}
