use crate::engine::validation::{FieldError, FieldProblem};
use crate::error::{EngineError, Result};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value exactly as a form control produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Flag(bool),
    Text(String),
    // Repeated groups, e.g. one row per current opioid
    Rows(Vec<RawInputs>),
}

impl RawValue {
    /// Empty text counts as "not provided", never as zero
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Rows(rows) => rows.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Flag(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            RawValue::Text(s) => write!(f, "{}", s.trim()),
            RawValue::Rows(rows) => write!(f, "{} row(s)", rows.len()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Flag(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<Vec<RawInputs>> for RawValue {
    fn from(rows: Vec<RawInputs>) -> Self {
        RawValue::Rows(rows)
    }
}

/// Field name -> raw value, as submitted by one form.
/// A field's unit may be given inline (`"12 lb"`) or in a `<field>_unit` key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInputs {
    values: BTreeMap<String, RawValue>,
}

impl RawInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<RawValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.values.get(name)
    }

    /// Value of `name` unless missing or blank
    pub fn provided(&self, name: &str) -> Option<&RawValue> {
        self.values.get(name).filter(|v| !v.is_blank())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Companion key carrying the unit of `field`
pub fn unit_key(field: &str) -> String {
    format!("{}_unit", field)
}

/// A validated value in canonical units
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Number { value: f64, unit: Option<Unit> },
    Choice(String),
    Rows(Vec<FormulaInputs>),
}

/// Validated, unit-normalized inputs handed to a formula
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormulaInputs {
    values: BTreeMap<String, InputValue>,
}

impl FormulaInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: InputValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.insert(name, InputValue::Number { value, unit: None });
        self
    }

    pub fn with_choice(mut self, name: &str, value: &str) -> Self {
        self.insert(name, InputValue::Choice(value.to_string()));
        self
    }

    pub fn with_rows(mut self, name: &str, rows: Vec<FormulaInputs>) -> Self {
        self.insert(name, InputValue::Rows(rows));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Canonical numeric value of a field the formula requires
    pub fn number(&self, name: &str) -> Result<f64> {
        match self.values.get(name) {
            Some(InputValue::Number { value, .. }) => Ok(*value),
            Some(_) => Err(wrong_type(name, "a number")),
            None => Err(EngineError::InvalidInput(FieldError::missing(name))),
        }
    }

    pub fn optional_number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(InputValue::Number { value, .. }) => Some(*value),
            _ => None,
        }
    }

    /// Unit a number was submitted in, when one is known
    pub fn unit(&self, name: &str) -> Option<Unit> {
        match self.values.get(name) {
            Some(InputValue::Number { unit, .. }) => *unit,
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            Some(InputValue::Choice(value)) => Ok(value.as_str()),
            Some(_) => Err(wrong_type(name, "a choice")),
            None => Err(EngineError::InvalidInput(FieldError::missing(name))),
        }
    }

    /// Yes/no choice; absent counts as no
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(InputValue::Choice(v)) if v == "yes")
    }

    pub fn rows(&self, name: &str) -> Result<&[FormulaInputs]> {
        match self.values.get(name) {
            Some(InputValue::Rows(rows)) => Ok(rows.as_slice()),
            Some(_) => Err(wrong_type(name, "a list of rows")),
            None => Err(EngineError::InvalidInput(FieldError::missing(name))),
        }
    }
}

fn wrong_type(name: &str, expected: &str) -> EngineError {
    EngineError::InvalidInput(FieldError::new(
        name,
        FieldProblem::Invalid(format!("expected {}", expected)),
    ))
}

/// One input echoed back in a result: what was typed and what was used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoedInput {
    pub name: String,
    pub label: String,
    /// Raw text as submitted; `None` when a declared default was used
    pub raw: Option<String>,
    /// Value handed to the formula (canonical unit)
    pub value: Option<f64>,
    pub unit: Option<Unit>,
    /// Choice fields echo the selected option
    pub choice: Option<String>,
}

impl EchoedInput {
    /// Short text for records and summaries
    pub fn display_value(&self) -> String {
        if let Some(choice) = &self.choice {
            return choice.clone();
        }
        match (self.value, self.unit) {
            (Some(value), Some(unit)) => {
                format!("{} {}", crate::units::format_number(value), unit)
            }
            (Some(value), None) => crate::units::format_number(value),
            _ => self.raw.clone().unwrap_or_default(),
        }
    }
}
