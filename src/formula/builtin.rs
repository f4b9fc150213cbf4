// Built-in calculator catalog.
//
// Every constant used here comes from `EngineConfig` or is a field default
// that `[formulas.<id>.defaults]` can replace.

use crate::config::EngineConfig;
use crate::engine::inputs::FormulaInputs;
use crate::engine::validation::{FieldError, FieldProblem};
use crate::error::{EngineError, Result};
use crate::formula::opioid::{OpioidEntry, Route};
use crate::formula::spec::{Cap, FieldSpec, FormulaOutput, FormulaSpec};
use crate::rounding::RoundingRule;
use crate::units::{format_number, QuantityKind, Unit};

// g/dL per canonical concentration unit (µg/mL)
const UG_PER_ML_IN_G_PER_DL: f64 = 10_000.0;

// mg per dose or mcg/h, far above any real regimen
const MAX_OPIOID_DOSE: f64 = 10_000.0;

const LIQUID_NOTE: &str =
    "Liquid volume is shown only when the preparation strength is entered.";

pub fn catalog(config: &EngineConfig) -> Vec<FormulaSpec> {
    vec![
        paracetamol(config),
        ibuprofen(config),
        ceftriaxone(config),
        amoxicillin(config),
        prednisolone(),
        maintenance_fluids(),
        anion_gap(config),
        acetaminophen_nomogram(config),
        opioid_conversion(config),
    ]
}

fn weight_field() -> FieldSpec {
    FieldSpec::quantity("weight", "Body weight", QuantityKind::Mass, Unit::Kilogram)
        .bounds(Some(0.3), Some(250.0))
}

fn concentration_field() -> FieldSpec {
    FieldSpec::quantity(
        "concentration",
        "Preparation strength",
        QuantityKind::Concentration,
        Unit::MilligramPerMillilitre,
    )
    .bounds(Some(1.0), None)
    .optional()
}

fn per_kg_field(default: f64, min: f64, max: f64) -> FieldSpec {
    FieldSpec::quantity(
        "mg_per_kg",
        "Dose per kg",
        QuantityKind::Scalar,
        Unit::MilligramPerKilogram,
    )
    .bounds(Some(min), Some(max))
    .optional()
    .default_value(default)
}

fn weight_based(inputs: &FormulaInputs) -> Result<FormulaOutput> {
    let weight = inputs.number("weight")?;
    let per_kg = inputs.number("mg_per_kg")?;
    Ok(FormulaOutput::new(weight * per_kg))
}

fn paracetamol(config: &EngineConfig) -> FormulaSpec {
    FormulaSpec::new("paracetamol", "Paracetamol (weight-based)", Unit::Milligram, weight_based)
        .describe("Single oral or IV dose from body weight.")
        .field(weight_field())
        .field(per_kg_field(15.0, 10.0, 20.0))
        .field(
            FieldSpec::quantity(
                "max_single_mg",
                "Maximum single dose",
                QuantityKind::Amount,
                Unit::Milligram,
            )
            .bounds(Some(1.0), Some(1000.0))
            .optional(),
        )
        .field(concentration_field())
        .output_label("Dose")
        .cap(Cap::clamp(1000.0).overridden_by("max_single_mg"))
        .rounding(RoundingRule::Step(1.0))
        .liquid_volume("concentration", config.rounding.liquid_volume_step_ml)
        .note("Do not exceed 4 doses (60 mg/kg, 4 g) in 24 hours.")
        .note("Check all other paracetamol-containing products.")
        .note(LIQUID_NOTE)
}

fn ibuprofen(config: &EngineConfig) -> FormulaSpec {
    FormulaSpec::new("ibuprofen", "Ibuprofen (weight-based)", Unit::Milligram, weight_based)
        .describe("Single oral dose from body weight.")
        .field(weight_field())
        .field(per_kg_field(10.0, 5.0, 10.0))
        .field(concentration_field())
        .output_label("Dose")
        .cap(Cap::clamp(400.0))
        .rounding(RoundingRule::Step(1.0))
        .liquid_volume("concentration", config.rounding.liquid_volume_step_ml)
        .note("Avoid in dehydration, renal impairment and active bleeding.")
        .note(LIQUID_NOTE)
}

fn ceftriaxone(config: &EngineConfig) -> FormulaSpec {
    FormulaSpec::new("ceftriaxone", "Ceftriaxone", Unit::Milligram, weight_based)
        .describe("Once-daily IV/IM dose from body weight.")
        .field(weight_field())
        .field(per_kg_field(50.0, 20.0, 100.0))
        .field(concentration_field())
        .output_label("Dose")
        .cap(Cap::clamp(2000.0))
        .rounding(RoundingRule::Step(1.0))
        .liquid_volume("concentration", config.rounding.liquid_volume_step_ml)
        .note("Do not mix with calcium-containing solutions.")
}

fn amoxicillin(config: &EngineConfig) -> FormulaSpec {
    FormulaSpec::new("amoxicillin", "Amoxicillin (divided daily)", Unit::Milligram, |inputs| {
        let weight = inputs.number("weight")?;
        let per_kg_day = inputs.number("mg_per_kg_per_day")?;
        let doses = inputs.number("doses_per_day")?;

        let daily = weight * per_kg_day;
        Ok(FormulaOutput::new(daily / doses).with_aux(
            "daily_total",
            "Daily total",
            daily,
            Some(Unit::MilligramPerDay),
        ))
    })
    .describe("Daily dose from body weight, divided into equal doses.")
    .field(weight_field())
    .field(
        FieldSpec::quantity(
            "mg_per_kg_per_day",
            "Daily dose per kg",
            QuantityKind::Scalar,
            Unit::MilligramPerKilogramPerDay,
        )
        .bounds(Some(20.0), Some(100.0))
        .optional()
        .default_value(50),
    )
    .field(
        FieldSpec::quantity(
            "doses_per_day",
            "Doses per day",
            QuantityKind::Scalar,
            Unit::DosesPerDay,
        )
        .bounds(Some(1.0), Some(4.0))
        .optional()
        .default_value(3),
    )
    .field(concentration_field())
    .output_label("Dose")
    .cap(Cap::warn_only(1000.0))
    .rounding(RoundingRule::Step(1.0))
    .liquid_volume("concentration", config.rounding.liquid_volume_step_ml)
    .note("High-dose regimens above 1 g per dose need senior review.")
    .note(LIQUID_NOTE)
}

fn prednisolone() -> FormulaSpec {
    FormulaSpec::new("prednisolone", "Prednisolone", Unit::MilligramPerDay, |inputs| {
        let weight = inputs.number("weight")?;
        let per_kg_day = inputs.number("mg_per_kg_per_day")?;
        Ok(FormulaOutput::new(weight * per_kg_day))
    })
    .describe("Once-daily oral dose rounded to whole tablets.")
    .field(weight_field())
    .field(
        FieldSpec::quantity(
            "mg_per_kg_per_day",
            "Daily dose per kg",
            QuantityKind::Scalar,
            Unit::MilligramPerKilogramPerDay,
        )
        .bounds(Some(0.5), Some(2.0))
        .optional()
        .default_value(1),
    )
    .output_label("Daily dose")
    .cap(Cap::clamp(60.0))
    .rounding(RoundingRule::Tablets(vec![1.0, 5.0, 25.0]))
    .note("Give in the morning with food.")
}

fn maintenance_fluids() -> FormulaSpec {
    FormulaSpec::new(
        "maintenance_fluids",
        "Maintenance fluids (4-2-1)",
        Unit::MillilitrePerHour,
        |inputs| {
            let weight = inputs.number("weight")?;
            let rate = holliday_segar_rate(weight);
            Ok(FormulaOutput::new(rate).with_aux(
                "daily_volume",
                "Daily volume",
                rate * 24.0,
                Some(Unit::Millilitre),
            ))
        },
    )
    .describe("Hourly maintenance rate: 4 mL/kg for the first 10 kg, 2 for the next 10, 1 after.")
    .field(weight_field())
    .output_label("Rate")
    .cap(Cap::clamp(100.0))
    .rounding(RoundingRule::Step(1.0))
    .note("Reduce in cardiac, renal or SIADH-risk patients.")
}

/// mL/h by the 4-2-1 rule
pub fn holliday_segar_rate(weight_kg: f64) -> f64 {
    let first = weight_kg.min(10.0);
    let second = (weight_kg - 10.0).clamp(0.0, 10.0);
    let rest = (weight_kg - 20.0).max(0.0);
    first * 4.0 + second * 2.0 + rest
}

fn electrolyte_field(name: &str, label: &str) -> FieldSpec {
    FieldSpec::quantity(name, label, QuantityKind::Electrolyte, Unit::MillimolePerLitre)
        .bounds(Some(0.0), Some(250.0))
}

fn anion_gap(config: &EngineConfig) -> FormulaSpec {
    let settings = config.anion_gap.clone();

    FormulaSpec::new("anion_gap", "Anion gap", Unit::MillimolePerLitre, move |inputs| {
        let sodium = inputs.number("sodium")?;
        let chloride = inputs.number("chloride")?;
        let bicarbonate = inputs.number("bicarbonate")?;

        let mut gap = sodium - (chloride + bicarbonate);
        if inputs.flag("include_potassium") {
            let potassium = inputs.optional_number("potassium").ok_or_else(|| {
                EngineError::InvalidInput(FieldError::new(
                    "potassium",
                    FieldProblem::Invalid("required when potassium is included".to_string()),
                ))
            })?;
            gap += potassium;
        }

        let mut output = FormulaOutput::new(gap);
        let mut reported = gap;

        if let Some(albumin) = inputs.optional_number("albumin") {
            let albumin_g_dl = albumin / UG_PER_ML_IN_G_PER_DL;
            let corrected = gap
                + settings.albumin_factor * (settings.albumin_reference_g_dl - albumin_g_dl);
            output = FormulaOutput::new(corrected).with_aux(
                "uncorrected_gap",
                "Uncorrected gap",
                gap,
                Some(Unit::MillimolePerLitre),
            );
            reported = corrected;
        }

        if reported > settings.normal_high {
            output.warn(format!(
                "Anion gap {} mmol/L is above the reference range ({}-{})",
                format_number(reported),
                format_number(settings.normal_low),
                format_number(settings.normal_high)
            ));
        } else if reported < settings.normal_low {
            output.warn(format!(
                "Anion gap {} mmol/L is below the reference range ({}-{})",
                format_number(reported),
                format_number(settings.normal_low),
                format_number(settings.normal_high)
            ));
        }

        Ok(output)
    })
    .describe("Na - (Cl + HCO3), optionally with K and albumin correction.")
    .field(electrolyte_field("sodium", "Sodium"))
    .field(electrolyte_field("chloride", "Chloride"))
    .field(electrolyte_field("bicarbonate", "Bicarbonate"))
    .field(
        FieldSpec::choice("include_potassium", "Include potassium", &["no", "yes"])
            .optional()
            .default_value("no"),
    )
    .field(electrolyte_field("potassium", "Potassium").bounds(Some(0.0), Some(15.0)).optional())
    .field(
        FieldSpec::quantity(
            "albumin",
            "Albumin",
            QuantityKind::Concentration,
            Unit::GramPerDecilitre,
        )
        .bounds(Some(0.0), Some(100_000.0))
        .optional(),
    )
    .output_label("Anion gap")
    .rounding(RoundingRule::Decimals(1))
    .note("Interpret with the laboratory's own reference range.")
}

fn acetaminophen_nomogram(config: &EngineConfig) -> FormulaSpec {
    let curve = config.nomogram.curve();

    FormulaSpec::new(
        "acetaminophen_nomogram",
        "Paracetamol overdose nomogram",
        Unit::MicrogramPerMillilitre,
        move |inputs| {
            let hours = inputs.number("hours_since_ingestion")?;
            let threshold = curve.threshold(hours);
            let mut output = FormulaOutput::new(threshold);

            if hours < curve.start_hours {
                output.warn(format!(
                    "Levels taken before {} h cannot be interpreted; repeat at {} h",
                    format_number(curve.start_hours),
                    format_number(curve.start_hours)
                ));
            } else if hours > curve.end_hours {
                output.warn(format!(
                    "Beyond {} h the nomogram does not apply; treat on clinical grounds",
                    format_number(curve.end_hours)
                ));
            }

            if let Some(level) = inputs.optional_number("concentration") {
                output = output.with_aux(
                    "measured_level",
                    "Measured level",
                    level,
                    Some(Unit::MicrogramPerMillilitre),
                );
                if level >= threshold {
                    output.warn(format!(
                        "Measured level {} µg/mL is at or above the treatment line ({} µg/mL)",
                        format_number(level),
                        format_number(threshold)
                    ));
                }
            }

            Ok(output)
        },
    )
    .describe("Treatment threshold for a single acute ingestion.")
    .field(
        FieldSpec::quantity(
            "hours_since_ingestion",
            "Time since ingestion",
            QuantityKind::Time,
            Unit::Hour,
        )
        .bounds(Some(0.0), Some(72.0)),
    )
    .field(
        FieldSpec::quantity(
            "concentration",
            "Measured paracetamol level",
            QuantityKind::Concentration,
            Unit::MicrogramPerMillilitre,
        )
        .bounds(Some(0.0), None)
        .optional(),
    )
    .output_label("Treatment threshold")
    .rounding(RoundingRule::Decimals(2))
    .molecular_weight(config.nomogram.molecular_weight)
    .note("Not valid for staggered or unknown-time ingestions.")
}

fn opioid_conversion(config: &EngineConfig) -> FormulaSpec {
    let table = config.opioid_table();
    let settings = config.opioid_settings.clone();
    let agents = table.names();
    let agent_options: Vec<&str> = agents.iter().map(|a| a.as_str()).collect();
    let default_pct = settings.default_cross_tolerance_pct;

    FormulaSpec::new(
        "opioid_conversion",
        "Opioid conversion (OME)",
        Unit::MilligramPerDay,
        move |inputs| {
            let mut entries = Vec::new();
            for (index, row) in inputs.rows("entries")?.iter().enumerate() {
                let agent = row.choice("agent")?;
                let expected = match table.get(agent)?.route {
                    Route::Transdermal => Unit::MicrogramPerHour,
                    Route::Oral | Route::Parenteral => Unit::Milligram,
                };
                if let Some(unit) = row.unit("dose").filter(|unit| *unit != expected) {
                    return Err(EngineError::InvalidInput(FieldError::new(
                        format!("entries[{}].dose", index),
                        FieldProblem::InvalidUnit(format!(
                            "{} is dosed in {}, got {}",
                            agent, expected, unit
                        )),
                    )));
                }
                entries.push(OpioidEntry {
                    agent: agent.to_string(),
                    dose: row.number("dose")?,
                    doses_per_day: row.number("doses_per_day")?,
                });
            }

            let target = inputs.choice("target_agent")?;
            let reduction = inputs.number("cross_tolerance_pct")?;
            let conversion = table.convert(&entries, target, reduction)?;

            let (unit, rounding) = match conversion.target_route {
                Route::Transdermal => (
                    Unit::MicrogramPerHour,
                    RoundingRule::Tablets(settings.patch_strengths_mcg_h.clone()),
                ),
                Route::Oral | Route::Parenteral => (
                    Unit::MilligramPerDay,
                    RoundingRule::Step(settings.oral_step_mg),
                ),
            };

            let mut output = FormulaOutput::new(conversion.target_dose)
                .in_unit(unit)
                .rounded_by(rounding)
                .with_aux(
                    "total_ome",
                    "Total oral morphine equivalent",
                    conversion.total_ome,
                    Some(Unit::MilligramPerDay),
                )
                .with_aux(
                    "equivalent_dose",
                    "Equivalent dose before reduction",
                    conversion.equivalent_dose,
                    Some(unit),
                );

            if conversion.total_ome >= settings.high_ome_threshold {
                output.warn(format!(
                    "Total OME {} mg/day is at or above {} mg/day; seek specialist advice",
                    format_number(conversion.total_ome),
                    format_number(settings.high_ome_threshold)
                ));
            }

            Ok(output)
        },
    )
    .describe("Sum current opioids as oral morphine equivalents and convert to a new agent.")
    .field(FieldSpec::rows(
        "entries",
        "Current opioids",
        vec![
            FieldSpec::choice("agent", "Agent", &agent_options),
            FieldSpec::quantity(
                "dose",
                "Dose (mg, or mcg/h for patches)",
                QuantityKind::Scalar,
                Unit::Milligram,
            )
            .also_accepts(Unit::MicrogramPerHour)
            .bounds(Some(0.0), Some(MAX_OPIOID_DOSE)),
            FieldSpec::quantity(
                "doses_per_day",
                "Doses per day",
                QuantityKind::Scalar,
                Unit::DosesPerDay,
            )
            .bounds(Some(1.0), Some(24.0))
            .optional()
            .default_value(1),
        ],
    ))
    .field(FieldSpec::choice("target_agent", "Convert to", &agent_options))
    .field(
        FieldSpec::quantity(
            "cross_tolerance_pct",
            "Cross-tolerance reduction",
            QuantityKind::Scalar,
            Unit::Percent,
        )
        .bounds(Some(0.0), Some(100.0))
        .optional()
        .default_value(default_pct),
    )
    .output_label("Target daily dose")
    .rounding_per_result()
    .note("Conversion coefficients are approximate; verify against local guidance.")
    .note("Titrate to effect and monitor for sedation and respiratory depression.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(id: &str) -> FormulaSpec {
        catalog(&EngineConfig::default())
            .into_iter()
            .find(|spec| spec.id == id)
            .unwrap()
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let specs = catalog(&EngineConfig::default());
        let mut ids: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), specs.len());
    }

    #[test]
    fn test_holliday_segar() {
        assert_eq!(holliday_segar_rate(8.0), 32.0);
        assert_eq!(holliday_segar_rate(15.0), 50.0);
        assert_eq!(holliday_segar_rate(30.0), 70.0);
    }

    #[test]
    fn test_anion_gap_with_albumin() {
        let spec = find("anion_gap");
        let inputs = FormulaInputs::new()
            .with_number("sodium", 140.0)
            .with_number("chloride", 100.0)
            .with_number("bicarbonate", 24.0)
            // 2 g/dL in canonical µg/mL
            .with_number("albumin", 20_000.0);

        let output = spec.evaluate(&inputs).unwrap();
        assert_eq!(output.value, 21.0);
        assert_eq!(output.aux[0].value, 16.0);
        assert_eq!(output.warnings.len(), 1);
    }

    #[test]
    fn test_anion_gap_potassium_required_when_included() {
        let spec = find("anion_gap");
        let inputs = FormulaInputs::new()
            .with_number("sodium", 140.0)
            .with_number("chloride", 104.0)
            .with_number("bicarbonate", 24.0)
            .with_choice("include_potassium", "yes");

        let err = spec.evaluate(&inputs).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "potassium");

        let output = spec
            .evaluate(&inputs.with_number("potassium", 4.0))
            .unwrap();
        assert_eq!(output.value, 16.0);
    }

    #[test]
    fn test_nomogram_warnings() {
        let spec = find("acetaminophen_nomogram");

        let early = spec
            .evaluate(&FormulaInputs::new().with_number("hours_since_ingestion", 2.0))
            .unwrap();
        assert_eq!(early.value, 150.0);
        assert_eq!(early.warnings.len(), 1);

        let toxic = spec
            .evaluate(
                &FormulaInputs::new()
                    .with_number("hours_since_ingestion", 8.0)
                    .with_number("concentration", 120.0),
            )
            .unwrap();
        assert!(toxic.value < 120.0);
        assert_eq!(toxic.warnings.len(), 1);
    }

    #[test]
    fn test_opioid_transdermal_target() {
        let spec = find("opioid_conversion");
        let inputs = FormulaInputs::new()
            .with_rows(
                "entries",
                vec![FormulaInputs::new()
                    .with_choice("agent", "morphine")
                    .with_number("dose", 30.0)
                    .with_number("doses_per_day", 4.0)],
            )
            .with_choice("target_agent", "fentanyl_patch")
            .with_number("cross_tolerance_pct", 0.0);

        let output = spec.evaluate(&inputs).unwrap();
        assert!((output.value - 50.0).abs() < 1e-9);
        assert_eq!(output.unit, Some(Unit::MicrogramPerHour));
        assert!(matches!(output.rounding, Some(RoundingRule::Tablets(_))));
        // 120 mg/day OME crosses the high-dose threshold
        assert_eq!(output.warnings.len(), 1);
    }
}
