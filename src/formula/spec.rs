use crate::engine::inputs::FormulaInputs;
use crate::error::Result;
use crate::rounding::RoundingRule;
use crate::units::{QuantityKind, Unit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pure function from canonical inputs to a raw output
pub type FormulaFn = Arc<dyn Fn(&FormulaInputs) -> Result<FormulaOutput> + Send + Sync>;

/// What a field holds
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// A number of `kind`; `unit` is the default when none is submitted.
    /// Bounds are in the kind's canonical unit. A scalar field listing
    /// further units in `accepts` hands bare numbers to the formula without
    /// a unit, leaving the choice to it.
    Quantity {
        kind: QuantityKind,
        unit: Unit,
        min: Option<f64>,
        max: Option<f64>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        accepts: Vec<Unit>,
    },
    Choice { options: Vec<String> },
    /// Repeated group of nested fields
    Rows { fields: Vec<FieldSpec> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    pub required: bool,
    /// Value used when the field is left blank (declared unit, or option text)
    pub default: Option<String>,
}

impl FieldSpec {
    pub fn quantity(name: &str, label: &str, kind: QuantityKind, unit: Unit) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::Quantity {
                kind,
                unit,
                min: None,
                max: None,
                accepts: Vec::new(),
            },
            required: true,
            default: None,
        }
    }

    pub fn choice(name: &str, label: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::Choice {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            required: true,
            default: None,
        }
    }

    pub fn rows(name: &str, label: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: FieldType::Rows { fields },
            required: true,
            default: None,
        }
    }

    /// Inclusive bounds in canonical units
    pub fn bounds(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        if let FieldType::Quantity { min, max, .. } = &mut self.field_type {
            *min = lower;
            *max = upper;
        }
        self
    }

    pub fn also_accepts(mut self, extra: Unit) -> Self {
        if let FieldType::Quantity { accepts, .. } = &mut self.field_type {
            accepts.push(extra);
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: impl ToString) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn kind(&self) -> Option<QuantityKind> {
        match &self.field_type {
            FieldType::Quantity { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapMode {
    /// Replace the output with the maximum
    Clamp,
    /// Keep the output, attach a warning
    WarnOnly,
}

/// Safety maximum for a formula's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cap {
    pub max: f64,
    pub mode: CapMode,
    /// Input field whose value, when provided, lowers `max`
    pub override_field: Option<String>,
}

impl Cap {
    pub fn clamp(max: f64) -> Self {
        Self {
            max,
            mode: CapMode::Clamp,
            override_field: None,
        }
    }

    pub fn warn_only(max: f64) -> Self {
        Self {
            max,
            mode: CapMode::WarnOnly,
            override_field: None,
        }
    }

    pub fn overridden_by(mut self, field: &str) -> Self {
        self.override_field = Some(field.to_string());
        self
    }

    /// Maximum in effect for these inputs. The override field can only
    /// tighten the cap.
    pub fn effective_max(&self, inputs: &FormulaInputs) -> f64 {
        self.override_field
            .as_deref()
            .and_then(|field| inputs.optional_number(field))
            .map_or(self.max, |requested| requested.min(self.max))
    }
}

/// Secondary value reported next to the main output (daily total, volume...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxOutput {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub unit: Option<Unit>,
}

/// What a formula function returns before capping and rounding
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOutput {
    pub value: f64,
    /// Overrides the formula's declared output unit
    pub unit: Option<Unit>,
    /// Overrides the formula's declared rounding
    pub rounding: Option<RoundingRule>,
    pub aux: Vec<AuxOutput>,
    pub warnings: Vec<String>,
}

impl FormulaOutput {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            unit: None,
            rounding: None,
            aux: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn in_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn rounded_by(mut self, rule: RoundingRule) -> Self {
        self.rounding = Some(rule);
        self
    }

    pub fn with_aux(mut self, name: &str, label: &str, value: f64, unit: Option<Unit>) -> Self {
        self.aux.push(AuxOutput {
            name: name.to_string(),
            label: label.to_string(),
            value,
            unit,
        });
        self
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Liquid volume reported next to a dose: practical dose divided by the
/// preparation strength given in `concentration_field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidVolume {
    pub concentration_field: String,
    pub step_ml: f64,
}

/// Declarative description of one calculator
#[derive(Clone)]
pub struct FormulaSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub output_label: String,
    pub output_unit: Unit,
    pub cap: Option<Cap>,
    pub rounding: RoundingRule,
    /// The function sets `FormulaOutput::rounding` on every result, so
    /// `rounding` is never consulted
    pub rounding_per_result: bool,
    /// Molecular weight for µmol/L inputs, g/mol
    pub molecular_weight: Option<f64>,
    /// Static safety text shown with every result
    pub notes: Vec<String>,
    pub liquid_volume: Option<LiquidVolume>,
    pub compute: FormulaFn,
}

impl FormulaSpec {
    pub fn new<F>(id: &str, name: &str, output_unit: Unit, compute: F) -> Self
    where
        F: Fn(&FormulaInputs) -> Result<FormulaOutput> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            fields: Vec::new(),
            output_label: "Result".to_string(),
            output_unit,
            cap: None,
            rounding: RoundingRule::Decimals(crate::rounding::DEFAULT_DECIMALS),
            rounding_per_result: false,
            molecular_weight: None,
            notes: Vec::new(),
            liquid_volume: None,
            compute: Arc::new(compute),
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn output_label(mut self, label: &str) -> Self {
        self.output_label = label.to_string();
        self
    }

    pub fn cap(mut self, cap: Cap) -> Self {
        self.cap = Some(cap);
        self
    }

    pub fn rounding(mut self, rule: RoundingRule) -> Self {
        self.rounding = rule;
        self
    }

    pub fn rounding_per_result(mut self) -> Self {
        self.rounding_per_result = true;
        self
    }

    pub fn molecular_weight(mut self, grams_per_mole: f64) -> Self {
        self.molecular_weight = Some(grams_per_mole);
        self
    }

    pub fn note(mut self, text: &str) -> Self {
        self.notes.push(text.to_string());
        self
    }

    pub fn liquid_volume(mut self, concentration_field: &str, step_ml: f64) -> Self {
        self.liquid_volume = Some(LiquidVolume {
            concentration_field: concentration_field.to_string(),
            step_ml,
        });
        self
    }

    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_spec_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    pub fn evaluate(&self, inputs: &FormulaInputs) -> Result<FormulaOutput> {
        (self.compute)(inputs)
    }

    /// Serializable description for UI forms
    pub fn summary(&self) -> FormulaSummary {
        FormulaSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
            output_label: self.output_label.clone(),
            output_unit: self.output_unit,
            cap: self.cap.clone(),
            rounding: self.rounding.clone(),
            notes: self.notes.clone(),
            liquid_volume: self.liquid_volume.clone(),
        }
    }
}

impl fmt::Debug for FormulaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaSpec")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("output_unit", &self.output_unit)
            .field("cap", &self.cap)
            .field("rounding", &self.rounding)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FormulaSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSpec>,
    pub output_label: String,
    pub output_unit: Unit,
    pub cap: Option<Cap>,
    pub rounding: RoundingRule,
    pub notes: Vec<String>,
    pub liquid_volume: Option<LiquidVolume>,
}
