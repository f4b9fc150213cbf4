// Flat record and plain-text renderings of a result, for the export and
// clipboard collaborators. Nothing here writes files.

use crate::engine::{ComputationResult, EchoedInput};
use crate::formula::spec::{FieldType, FormulaSpec};
use crate::units::format_number;
use serde::Serialize;
use std::fmt::Write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Ordered `(column, value)` pairs. The columns depend only on the formula,
/// never on which optional fields were filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub columns: Vec<(String, String)>,
}

impl Record {
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn values(&self) -> Vec<&str> {
        self.columns.iter().map(|(_, value)| value.as_str()).collect()
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Header line followed by the value line, comma separated
    pub fn to_csv(&self) -> String {
        let header: Vec<String> = self.header().into_iter().map(csv_field).collect();
        let values: Vec<String> = self.values().into_iter().map(csv_field).collect();
        format!("{}\n{}\n", header.join(","), values.join(","))
    }
}

pub fn to_record(result: &ComputationResult, spec: &FormulaSpec) -> Record {
    let mut columns = vec![
        ("formula".to_string(), result.formula_id().to_string()),
        (
            "timestamp".to_string(),
            result.timestamp().format(TIMESTAMP_FORMAT).to_string(),
        ),
    ];

    for field in &spec.fields {
        let value = match &field.field_type {
            FieldType::Rows { .. } => rows_value(result.inputs(), &field.name),
            _ => result
                .input(&field.name)
                .map(|input| input.display_value())
                .unwrap_or_default(),
        };
        columns.push((field.name.clone(), value));
    }

    columns.push(("raw_output".to_string(), format_number(result.raw_output())));
    columns.push((
        "capped".to_string(),
        if result.applied_cap() { "yes" } else { "no" }.to_string(),
    ));
    columns.push(("practical_output".to_string(), format_number(result.output())));
    columns.push(("unit".to_string(), result.unit().to_string()));
    columns.push(("warnings".to_string(), result.warnings().join("; ")));

    Record { columns }
}

// One row per group, nested values separated by spaces
fn rows_value(inputs: &[EchoedInput], field: &str) -> String {
    let prefix = format!("{}[", field);
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();

    for input in inputs.iter().filter(|input| input.name.starts_with(&prefix)) {
        let index = input.name[prefix.len()..]
            .split(']')
            .next()
            .and_then(|index| index.parse::<usize>().ok());
        let Some(index) = index else {
            continue;
        };
        match rows.last_mut() {
            Some((last, values)) if *last == index => values.push(input.display_value()),
            _ => rows.push((index, vec![input.display_value()])),
        }
    }

    rows.into_iter()
        .map(|(_, values)| values.join(" "))
        .collect::<Vec<_>>()
        .join("; ")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Multi-line summary for the clipboard
pub fn text_summary(result: &ComputationResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", result.formula_name());
    let _ = writeln!(out, "{}", result.timestamp().format(TIMESTAMP_FORMAT));

    if !result.inputs().is_empty() {
        let _ = writeln!(out, "Inputs:");
        for input in result.inputs() {
            let _ = writeln!(out, "  {}: {}", input.label, input.display_value());
        }
    }

    let _ = write!(
        out,
        "{}: {} {}",
        result.output_label(),
        format_number(result.output()),
        result.unit()
    );
    if result.applied_cap() {
        let _ = write!(
            out,
            " (capped, calculated {})",
            format_number(result.raw_output())
        );
    }
    let _ = writeln!(out);

    if let Some(plan) = result.tablets() {
        let _ = writeln!(
            out,
            "  {} x {} {}",
            plan.count,
            format_number(plan.strength),
            result.unit()
        );
    }

    for aux in result.aux() {
        match aux.unit {
            Some(unit) => {
                let _ = writeln!(out, "{}: {} {}", aux.label, format_number(aux.value), unit);
            }
            None => {
                let _ = writeln!(out, "{}: {}", aux.label, format_number(aux.value));
            }
        }
    }

    if !result.warnings().is_empty() {
        let _ = writeln!(out, "Warnings:");
        for warning in result.warnings() {
            let _ = writeln!(out, "  - {}", warning);
        }
    }

    if !result.notes().is_empty() {
        let _ = writeln!(out, "Notes:");
        for note in result.notes() {
            let _ = writeln!(out, "  - {}", note);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DoseEngine, RawInputs};
    use chrono::{TimeZone, Utc};

    fn compute(engine: &DoseEngine, id: &str, json: &str) -> ComputationResult {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        engine
            .compute_at(id, &RawInputs::from_json(json).unwrap(), at)
            .unwrap()
    }

    #[test]
    fn test_record_columns_are_fixed() {
        let engine = DoseEngine::with_defaults();
        let spec = engine.registry().get("paracetamol").unwrap();

        let short = to_record(&compute(&engine, "paracetamol", r#"{"weight": 12}"#), spec);
        let full = to_record(
            &compute(
                &engine,
                "paracetamol",
                r#"{"weight": 80, "max_single_mg": 900, "concentration": 50}"#,
            ),
            spec,
        );

        assert_eq!(short.header(), full.header());
        assert_eq!(
            short.header(),
            vec![
                "formula",
                "timestamp",
                "weight",
                "mg_per_kg",
                "max_single_mg",
                "concentration",
                "raw_output",
                "capped",
                "practical_output",
                "unit",
                "warnings",
            ]
        );

        assert_eq!(short.get("timestamp"), Some("2024-03-01 09:30:00 UTC"));
        assert_eq!(short.get("weight"), Some("12 kg"));
        assert_eq!(short.get("max_single_mg"), Some(""));
        assert_eq!(short.get("capped"), Some("no"));
        assert_eq!(full.get("capped"), Some("yes"));
        assert_eq!(full.get("practical_output"), Some("900"));
    }

    #[test]
    fn test_rows_column() {
        let engine = DoseEngine::with_defaults();
        let spec = engine.registry().get("opioid_conversion").unwrap();
        let result = compute(
            &engine,
            "opioid_conversion",
            r#"{"entries": [{"agent": "oxycodone", "dose": 10, "doses_per_day": 4},
                            {"agent": "morphine", "dose": 15, "doses_per_day": 2}],
                "target_agent": "morphine", "cross_tolerance_pct": 0}"#,
        );

        let record = to_record(&result, spec);
        assert_eq!(
            record.get("entries"),
            Some("oxycodone 10 mg 4 doses/day; morphine 15 mg 2 doses/day")
        );
    }

    #[test]
    fn test_csv_quotes_commas() {
        let record = Record {
            columns: vec![
                ("formula".to_string(), "paracetamol".to_string()),
                ("warnings".to_string(), "a, b".to_string()),
            ],
        };
        assert_eq!(record.to_csv(), "formula,warnings\nparacetamol,\"a, b\"\n");
    }

    #[test]
    fn test_text_summary() {
        let engine = DoseEngine::with_defaults();
        let result = compute(&engine, "paracetamol", r#"{"weight": 80}"#);
        let text = text_summary(&result);

        assert!(text.starts_with("Paracetamol (weight-based)\n2024-03-01 09:30:00 UTC\n"));
        assert!(text.contains("  Body weight: 80 kg\n"));
        assert!(text.contains("Dose: 1000 mg (capped, calculated 1200)\n"));
        assert!(text.contains("Warnings:\n  - "));
        assert!(text.contains("Notes:\n"));
    }
}
