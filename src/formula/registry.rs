use crate::config::{value_to_default, EngineConfig, FormulaOverride};
use crate::error::{EngineError, Result};
use crate::formula::builtin;
use crate::formula::spec::{Cap, CapMode, FormulaSpec, FormulaSummary};
use std::collections::HashMap;

/// Formula id -> specification
#[derive(Debug, Clone, Default)]
pub struct FormulaRegistry {
    formulas: HashMap<String, FormulaSpec>,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog with `[formulas.<id>]` overrides applied
    pub fn builtin(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        for spec in builtin::catalog(config) {
            let id = spec.id.clone();
            registry.register(&id, spec);
        }

        for (id, overrides) in &config.formulas {
            match registry.formulas.get_mut(id) {
                Some(spec) => apply_override(spec, overrides),
                None => log::warn!("Config names unknown formula '{}', ignoring", id),
            }
        }

        registry
    }

    /// Register `spec` under `id`, replacing any formula already there
    pub fn register(&mut self, id: &str, mut spec: FormulaSpec) {
        spec.id = id.to_string();
        if self.formulas.insert(id.to_string(), spec).is_some() {
            log::debug!("Replaced formula '{}'", id);
        }
    }

    pub fn get(&self, id: &str) -> Result<&FormulaSpec> {
        self.formulas
            .get(id)
            .ok_or_else(|| EngineError::UnknownFormula(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.formulas.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.formulas.keys().map(|id| id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Specs in id order
    pub fn iter(&self) -> impl Iterator<Item = &FormulaSpec> {
        self.ids().into_iter().filter_map(move |id| self.formulas.get(id))
    }

    pub fn summaries(&self) -> Vec<FormulaSummary> {
        self.iter().map(|spec| spec.summary()).collect()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }
}

fn apply_override(spec: &mut FormulaSpec, overrides: &FormulaOverride) {
    for (field, value) in &overrides.defaults {
        let Some(text) = value_to_default(value) else {
            log::warn!(
                "Default for '{}.{}' must be a number, string or boolean",
                spec.id,
                field
            );
            continue;
        };
        match spec.field_spec_mut(field) {
            Some(field_spec) => field_spec.default = Some(text),
            None => log::warn!("Formula '{}' has no field '{}'", spec.id, field),
        }
    }

    if overrides.cap_max.is_some() || overrides.cap_mode.is_some() {
        let mut cap = spec.cap.clone().unwrap_or_else(|| Cap::clamp(f64::INFINITY));
        if let Some(max) = overrides.cap_max {
            cap.max = max;
        }
        if let Some(mode) = overrides.cap_mode {
            cap.mode = mode;
        }
        if cap.max.is_finite() {
            spec.cap = Some(cap);
        } else {
            log::warn!(
                "Formula '{}' has no cap; cap_mode without cap_max is ignored",
                spec.id
            );
        }
    }

    if let Some(rule) = &overrides.rounding {
        if spec.rounding_per_result {
            log::warn!(
                "Formula '{}' picks its rounding per result; the rounding override is ignored",
                spec.id
            );
        } else {
            spec.rounding = rule.clone();
        }
    }

    if let Some(cap) = &spec.cap {
        log::debug!(
            "Formula '{}' cap: {} ({})",
            spec.id,
            cap.max,
            match cap.mode {
                CapMode::Clamp => "clamp",
                CapMode::WarnOnly => "warn only",
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inputs::FormulaInputs;
    use crate::formula::spec::FormulaOutput;
    use crate::rounding::RoundingRule;
    use crate::units::Unit;

    #[test]
    fn test_builtin_catalog() {
        let registry = FormulaRegistry::builtin(&EngineConfig::default());
        assert!(registry.contains("paracetamol"));
        assert!(registry.contains("opioid_conversion"));
        assert!(registry.contains("acetaminophen_nomogram"));

        let ids = registry.ids();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(registry.iter().count(), registry.len());
    }

    #[test]
    fn test_unknown_formula() {
        let registry = FormulaRegistry::new();
        assert_eq!(
            registry.get("digoxin").unwrap_err(),
            EngineError::UnknownFormula("digoxin".to_string())
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = FormulaRegistry::new();
        registry.register(
            "constant",
            FormulaSpec::new("x", "One", Unit::Milligram, |_| Ok(FormulaOutput::new(1.0))),
        );
        registry.register(
            "constant",
            FormulaSpec::new("x", "Two", Unit::Milligram, |_| Ok(FormulaOutput::new(2.0))),
        );

        let spec = registry.get("constant").unwrap();
        assert_eq!(spec.id, "constant");
        assert_eq!(spec.name, "Two");
        assert_eq!(spec.evaluate(&FormulaInputs::new()).unwrap().value, 2.0);
    }

    #[test]
    fn test_config_overrides() {
        let config = EngineConfig::load_from_str(
            r#"
[formulas.paracetamol]
cap_max = 750
rounding = { step = 5.0 }

[formulas.paracetamol.defaults]
mg_per_kg = 12.5

[formulas.anion_gap]
cap_mode = "warn_only"

[formulas.digoxin]
cap_max = 1
"#,
        )
        .unwrap();
        let registry = FormulaRegistry::builtin(&config);

        let paracetamol = registry.get("paracetamol").unwrap();
        let cap = paracetamol.cap.as_ref().unwrap();
        assert_eq!(cap.max, 750.0);
        assert_eq!(cap.mode, CapMode::Clamp);
        assert_eq!(cap.override_field.as_deref(), Some("max_single_mg"));
        assert_eq!(paracetamol.rounding, RoundingRule::Step(5.0));
        assert_eq!(
            paracetamol.field_spec("mg_per_kg").unwrap().default.as_deref(),
            Some("12.5")
        );

        // a mode without a maximum cannot create a cap
        assert!(registry.get("anion_gap").unwrap().cap.is_none());
        assert!(!registry.contains("digoxin"));
    }

    #[test]
    fn test_rounding_override_skips_per_result_formulas() {
        let config = EngineConfig::load_from_str(
            r#"
[formulas.opioid_conversion]
rounding = { step = 5.0 }
"#,
        )
        .unwrap();
        let defaults = FormulaRegistry::builtin(&EngineConfig::default());
        let registry = FormulaRegistry::builtin(&config);

        let spec = registry.get("opioid_conversion").unwrap();
        assert!(spec.rounding_per_result);
        assert_eq!(
            spec.rounding,
            defaults.get("opioid_conversion").unwrap().rounding
        );
    }
}
