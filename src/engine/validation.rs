use serde::{Deserialize, Serialize};
use std::fmt;

/// What is wrong with one form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FieldProblem {
    Missing,
    NotNumeric(String),
    InvalidUnit(String),
    BelowMinimum { value: f64, min: f64 },
    AboveMaximum { value: f64, max: f64 },
    UnknownChoice { value: String, options: Vec<String> },
    Invalid(String),
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => write!(f, "is required"),
            FieldProblem::NotNumeric(raw) => write!(f, "'{}' is not a number", raw),
            FieldProblem::InvalidUnit(msg) => write!(f, "{}", msg),
            FieldProblem::BelowMinimum { value, min } => {
                write!(f, "{} is below the minimum of {}", value, min)
            }
            FieldProblem::AboveMaximum { value, max } => {
                write!(f, "{} is above the maximum of {}", value, max)
            }
            FieldProblem::UnknownChoice { value, options } => write!(
                f,
                "'{}' is not one of: {}",
                value,
                options.join(", ")
            ),
            FieldProblem::Invalid(msg) => write!(f, "{}", msg),
        }
    }
}

/// A problem with a named field. Nested rows use paths like `entries[1].dose`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub problem: FieldProblem,
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: FieldProblem) -> Self {
        Self {
            field: field.into(),
            problem,
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, FieldProblem::Missing)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Every field problem found in one validation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn add_problem(&mut self, field: impl Into<String>, problem: FieldProblem) {
        self.add(FieldError::new(field, problem));
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn as_slice(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.errors.iter()
    }

    /// Names of the offending fields, in the order they were found
    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation failed ({} field(s)):", self.errors.len())?;
        for error in &self.errors {
            writeln!(f, "  [{}] {}", error.field, error.problem)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_every_problem() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add(FieldError::missing("weight"));
        errors.add_problem(
            "mg_per_kg",
            FieldProblem::BelowMinimum {
                value: -1.0,
                min: 0.0,
            },
        );

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.fields(), vec!["weight", "mg_per_kg"]);

        let text = errors.to_string();
        assert!(text.contains("[weight] is required"));
        assert!(text.contains("[mg_per_kg] -1 is below the minimum of 0"));
    }

    #[test]
    fn test_into_result() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add(FieldError::missing("weight"));
        assert_eq!(errors.into_result().unwrap_err().len(), 1);
    }
}
