// Turns one form submission into validated, canonical formula inputs.
//
// Every declared field is visited even after a failure so the caller gets
// the full list of problems from a single pass.

use crate::engine::inputs::{unit_key, EchoedInput, FormulaInputs, InputValue, RawInputs, RawValue};
use crate::engine::validation::{FieldProblem, ValidationErrors};
use crate::error::EngineError;
use crate::formula::spec::{FieldSpec, FieldType};
use crate::units::{split_quantity_string, QuantityKind, Unit, UnitConverter};
use std::collections::HashSet;

/// Validated inputs plus what to echo back in the result
#[derive(Debug, Clone, Default)]
pub struct BoundFields {
    pub inputs: FormulaInputs,
    pub echoed: Vec<EchoedInput>,
}

pub struct FieldBinder<'a> {
    converter: &'a UnitConverter,
}

impl<'a> FieldBinder<'a> {
    pub fn new(converter: &'a UnitConverter) -> Self {
        Self { converter }
    }

    /// Validate and convert `raw` against `fields`. Problems are collected
    /// into `errors`; the returned inputs hold only the fields that passed.
    pub fn bind(
        &self,
        fields: &[FieldSpec],
        raw: &RawInputs,
        prefix: &str,
        errors: &mut ValidationErrors,
    ) -> BoundFields {
        let mut bound = BoundFields::default();

        for field in fields {
            let path = format!("{}{}", prefix, field.name);
            match &field.field_type {
                FieldType::Quantity {
                    kind,
                    unit,
                    min,
                    max,
                    accepts,
                } => {
                    let spec = QuantitySpec {
                        kind: *kind,
                        unit: *unit,
                        min: *min,
                        max: *max,
                        accepts,
                    };
                    self.bind_quantity(field, &spec, raw, &path, &mut bound, errors);
                }
                FieldType::Choice { options } => {
                    bind_choice(field, options, raw, &path, &mut bound, errors);
                }
                FieldType::Rows { fields: row_fields } => {
                    self.bind_rows(field, row_fields, raw, &path, &mut bound, errors);
                }
            }
        }

        log_unknown_keys(fields, raw, prefix);
        bound
    }

    fn bind_quantity(
        &self,
        field: &FieldSpec,
        spec: &QuantitySpec,
        raw: &RawInputs,
        path: &str,
        bound: &mut BoundFields,
        errors: &mut ValidationErrors,
    ) {
        let (number, unit, explicit, raw_text) = match raw.provided(&field.name) {
            Some(value) => {
                let (number, inline_unit) = match parse_number(value) {
                    Ok(parsed) => parsed,
                    Err(problem) => {
                        errors.add_problem(path, problem);
                        return;
                    }
                };

                let unit_text = inline_unit.or_else(|| companion_unit(raw, &field.name));
                let explicit = unit_text.is_some();
                let unit = match unit_text {
                    Some(text) => match text.parse::<Unit>() {
                        Ok(unit) => unit,
                        Err(_) => {
                            errors.add_problem(
                                path,
                                FieldProblem::InvalidUnit(format!(
                                    "'{}' is not a recognised unit",
                                    text
                                )),
                            );
                            return;
                        }
                    },
                    None => spec.unit,
                };
                (number, unit, explicit, Some(value.to_string()))
            }
            None => match &field.default {
                Some(default) => match default.trim().parse::<f64>() {
                    Ok(number) => (number, spec.unit, false, None),
                    Err(_) => {
                        errors.add_problem(
                            path,
                            FieldProblem::Invalid(format!(
                                "configured default '{}' is not a number",
                                default
                            )),
                        );
                        return;
                    }
                },
                None => {
                    if field.required {
                        errors.add_problem(path, FieldProblem::Missing);
                    }
                    return;
                }
            },
        };

        let (value, unit) = match self.canonicalize(number, unit, spec) {
            Ok(canonical) => canonical,
            Err(problem) => {
                errors.add_problem(path, problem);
                return;
            }
        };

        if let Some(min) = spec.min.filter(|min| value < *min) {
            errors.add_problem(path, FieldProblem::BelowMinimum { value, min });
            return;
        }
        if let Some(max) = spec.max.filter(|max| value > *max) {
            errors.add_problem(path, FieldProblem::AboveMaximum { value, max });
            return;
        }

        // a bare number on a multi-unit field leaves the unit to the formula
        let input_unit = (explicit || spec.accepts.is_empty()).then_some(unit);
        bound.inputs.insert(
            &field.name,
            InputValue::Number {
                value,
                unit: input_unit,
            },
        );
        bound.echoed.push(EchoedInput {
            name: path.to_string(),
            label: field.label.clone(),
            raw: raw_text,
            value: Some(value),
            unit: Some(unit),
            choice: None,
        });
    }

    // Scalars are never converted, so they only accept their declared units
    fn canonicalize(
        &self,
        number: f64,
        unit: Unit,
        spec: &QuantitySpec,
    ) -> Result<(f64, Unit), FieldProblem> {
        if spec.kind == QuantityKind::Scalar {
            if unit != spec.unit && !spec.accepts.contains(&unit) {
                return Err(FieldProblem::InvalidUnit(format!(
                    "expected {}, got {}",
                    spec.unit, unit
                )));
            }
            return Ok((number, unit));
        }

        match self.converter.to_canonical(number, unit, spec.kind) {
            Ok(quantity) => Ok((quantity.value, quantity.unit)),
            Err(EngineError::InvalidUnit { unit, kind }) => Err(FieldProblem::InvalidUnit(
                format!("{} is not a {} unit", unit, kind),
            )),
            Err(other) => Err(FieldProblem::InvalidUnit(other.to_string())),
        }
    }

    fn bind_rows(
        &self,
        field: &FieldSpec,
        row_fields: &[FieldSpec],
        raw: &RawInputs,
        path: &str,
        bound: &mut BoundFields,
        errors: &mut ValidationErrors,
    ) {
        let rows = match raw.provided(&field.name) {
            Some(RawValue::Rows(rows)) => rows,
            Some(_) => {
                errors.add_problem(
                    path,
                    FieldProblem::Invalid("expected a list of rows".to_string()),
                );
                return;
            }
            None => {
                if field.required {
                    errors.add_problem(path, FieldProblem::Missing);
                }
                return;
            }
        };

        let mut bound_rows = Vec::with_capacity(rows.len());
        let mut row_echoes = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let row_prefix = format!("{}[{}].", path, index);
            let row_bound = self.bind(row_fields, row, &row_prefix, errors);
            bound_rows.push(row_bound.inputs);
            row_echoes.extend(row_bound.echoed);
        }

        bound.echoed.push(EchoedInput {
            name: path.to_string(),
            label: field.label.clone(),
            raw: Some(format!("{} row(s)", rows.len())),
            value: Some(rows.len() as f64),
            unit: None,
            choice: None,
        });
        bound.echoed.extend(row_echoes);
        bound.inputs.insert(&field.name, InputValue::Rows(bound_rows));
    }
}

struct QuantitySpec<'s> {
    kind: QuantityKind,
    unit: Unit,
    min: Option<f64>,
    max: Option<f64>,
    accepts: &'s [Unit],
}

fn bind_choice(
    field: &FieldSpec,
    options: &[String],
    raw: &RawInputs,
    path: &str,
    bound: &mut BoundFields,
    errors: &mut ValidationErrors,
) {
    let (selected, raw_text) = match raw.provided(&field.name) {
        Some(RawValue::Text(text)) => (text.trim().to_string(), Some(text.clone())),
        Some(RawValue::Flag(flag)) => {
            let text = if *flag { "yes" } else { "no" };
            (text.to_string(), Some(text.to_string()))
        }
        Some(RawValue::Number(n)) => (n.to_string(), Some(n.to_string())),
        Some(RawValue::Rows(_)) => {
            errors.add_problem(
                path,
                FieldProblem::Invalid("expected a single choice".to_string()),
            );
            return;
        }
        None => match &field.default {
            Some(default) => (default.clone(), None),
            None => {
                if field.required {
                    errors.add_problem(path, FieldProblem::Missing);
                }
                return;
            }
        },
    };

    if !options.iter().any(|option| *option == selected) {
        errors.add_problem(
            path,
            FieldProblem::UnknownChoice {
                value: selected,
                options: options.to_vec(),
            },
        );
        return;
    }

    bound
        .inputs
        .insert(&field.name, InputValue::Choice(selected.clone()));
    bound.echoed.push(EchoedInput {
        name: path.to_string(),
        label: field.label.clone(),
        raw: raw_text,
        value: None,
        unit: None,
        choice: Some(selected),
    });
}

// Number plus any unit typed inline ("12 lb")
fn parse_number(value: &RawValue) -> Result<(f64, Option<String>), FieldProblem> {
    let (number, unit) = match value {
        RawValue::Number(n) => (*n, None),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            match trimmed.parse::<f64>() {
                Ok(n) => (n, None),
                Err(_) => match split_quantity_string(trimmed) {
                    Some(parsed) => (parsed.value, Some(parsed.unit_text)),
                    None => return Err(FieldProblem::NotNumeric(trimmed.to_string())),
                },
            }
        }
        other => return Err(FieldProblem::NotNumeric(other.to_string())),
    };

    if !number.is_finite() {
        return Err(FieldProblem::NotNumeric(value.to_string()));
    }
    Ok((number, unit))
}

fn companion_unit(raw: &RawInputs, field: &str) -> Option<String> {
    match raw.provided(&unit_key(field)) {
        Some(RawValue::Text(text)) => Some(text.trim().to_string()),
        Some(other) => Some(other.to_string()),
        None => None,
    }
}

fn log_unknown_keys(fields: &[FieldSpec], raw: &RawInputs, prefix: &str) {
    let mut known: HashSet<String> = HashSet::new();
    for field in fields {
        known.insert(field.name.clone());
        known.insert(unit_key(&field.name));
    }

    for key in raw.keys() {
        if !known.contains(key) {
            log::warn!("Ignoring undeclared input '{}{}'", prefix, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight() -> FieldSpec {
        FieldSpec::quantity("weight", "Weight", QuantityKind::Mass, Unit::Kilogram)
            .bounds(Some(0.3), Some(250.0))
    }

    fn bind(fields: &[FieldSpec], raw: &RawInputs) -> (BoundFields, ValidationErrors) {
        let converter = UnitConverter::new();
        let mut errors = ValidationErrors::new();
        let bound = FieldBinder::new(&converter).bind(fields, raw, "", &mut errors);
        (bound, errors)
    }

    #[test]
    fn test_unit_sources() {
        let fields = [weight()];

        let (bound, errors) = bind(&fields, &RawInputs::new().with("weight", "22 lb"));
        assert!(errors.is_empty());
        assert!((bound.inputs.number("weight").unwrap() - 9.979).abs() < 1e-3);
        assert_eq!(bound.echoed[0].raw.as_deref(), Some("22 lb"));

        let (bound, _) = bind(
            &fields,
            &RawInputs::new().with("weight", "1500").with("weight_unit", "g"),
        );
        assert_eq!(bound.inputs.number("weight").unwrap(), 1.5);

        let (bound, _) = bind(&fields, &RawInputs::new().with("weight", 12.0));
        assert_eq!(bound.inputs.number("weight").unwrap(), 12.0);
    }

    #[test]
    fn test_problems_are_reported() {
        let fields = [weight()];

        let (_, errors) = bind(&fields, &RawInputs::new().with("weight", "heavy"));
        assert_eq!(
            errors.as_slice()[0].problem,
            FieldProblem::NotNumeric("heavy".to_string())
        );

        let (_, errors) = bind(&fields, &RawInputs::new().with("weight", "12 mg/dL"));
        assert!(matches!(
            errors.as_slice()[0].problem,
            FieldProblem::InvalidUnit(_)
        ));

        let (_, errors) = bind(&fields, &RawInputs::new().with("weight", "0"));
        assert!(matches!(
            errors.as_slice()[0].problem,
            FieldProblem::BelowMinimum { .. }
        ));

        let (_, errors) = bind(&fields, &RawInputs::new().with("weight", ""));
        assert_eq!(errors.as_slice()[0].problem, FieldProblem::Missing);
    }

    #[test]
    fn test_scalar_rejects_other_units() {
        let fields = [FieldSpec::quantity(
            "mg_per_kg",
            "Dose per kg",
            QuantityKind::Scalar,
            Unit::MilligramPerKilogram,
        )];

        let (bound, errors) = bind(&fields, &RawInputs::new().with("mg_per_kg", "15 mg/kg"));
        assert!(errors.is_empty());
        assert_eq!(bound.inputs.number("mg_per_kg").unwrap(), 15.0);

        let (_, errors) = bind(&fields, &RawInputs::new().with("mg_per_kg", "15 mg/kg/day"));
        assert_eq!(errors.fields(), vec!["mg_per_kg"]);
    }

    #[test]
    fn test_defaults_and_choices() {
        let fields = [
            FieldSpec::quantity("doses", "Doses", QuantityKind::Scalar, Unit::DosesPerDay)
                .optional()
                .default_value(3),
            FieldSpec::choice("include_potassium", "K", &["no", "yes"])
                .optional()
                .default_value("no"),
        ];

        let (bound, errors) = bind(&fields, &RawInputs::new());
        assert!(errors.is_empty());
        assert_eq!(bound.inputs.number("doses").unwrap(), 3.0);
        assert!(!bound.inputs.flag("include_potassium"));
        assert!(bound.echoed[0].raw.is_none());

        let (bound, _) = bind(&fields, &RawInputs::new().with("include_potassium", true));
        assert!(bound.inputs.flag("include_potassium"));

        let (_, errors) = bind(&fields, &RawInputs::new().with("include_potassium", "maybe"));
        assert!(matches!(
            errors.as_slice()[0].problem,
            FieldProblem::UnknownChoice { .. }
        ));
    }

    #[test]
    fn test_row_paths() {
        let fields = [FieldSpec::rows(
            "entries",
            "Entries",
            vec![
                FieldSpec::choice("agent", "Agent", &["morphine", "oxycodone"]),
                FieldSpec::quantity("dose", "Dose", QuantityKind::Scalar, Unit::Milligram),
            ],
        )];

        let raw = RawInputs::new().with(
            "entries",
            vec![
                RawInputs::new().with("agent", "morphine").with("dose", 10.0),
                RawInputs::new().with("agent", "heroin"),
            ],
        );

        let (_, errors) = bind(&fields, &raw);
        assert_eq!(errors.fields(), vec!["entries[1].agent", "entries[1].dose"]);
    }
}
