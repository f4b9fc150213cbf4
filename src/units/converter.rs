use crate::error::{EngineError, Result};
use crate::units::types::{Quantity, QuantityKind, Unit};

const POUND_IN_KG: f64 = 0.453_592_37;

/// Normalizes form values to the canonical unit of their kind.
///
/// Molar concentrations (µmol/L) need the molecular weight of the analyte;
/// build the converter with [`UnitConverter::with_molecular_weight`] when a
/// formula accepts them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UnitConverter {
    molecular_weight: Option<f64>,
}

impl UnitConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Molecular weight in g/mol used for µmol/L <-> µg/mL
    pub fn with_molecular_weight(mut self, grams_per_mole: f64) -> Self {
        self.molecular_weight = Some(grams_per_mole);
        self
    }

    pub fn molecular_weight(&self) -> Option<f64> {
        self.molecular_weight
    }

    /// Units registered for a kind, canonical unit first
    pub fn registered_units(kind: QuantityKind) -> &'static [Unit] {
        match kind {
            QuantityKind::Mass => &[Unit::Kilogram, Unit::Gram, Unit::Pound],
            QuantityKind::Amount => &[Unit::Milligram, Unit::Gram, Unit::Microgram],
            QuantityKind::Concentration => &[
                Unit::MicrogramPerMillilitre,
                Unit::MilligramPerLitre,
                Unit::MilligramPerDecilitre,
                Unit::GramPerDecilitre,
                Unit::GramPerLitre,
                Unit::MilligramPerMillilitre,
                Unit::MicromolePerLitre,
            ],
            QuantityKind::Electrolyte => &[Unit::MillimolePerLitre, Unit::MilliequivalentPerLitre],
            QuantityKind::Time => &[Unit::Hour, Unit::Minute, Unit::Day],
            QuantityKind::Volume => &[Unit::Millilitre, Unit::Litre],
            QuantityKind::Scalar => &[
                Unit::MilligramPerKilogram,
                Unit::MilligramPerKilogramPerDay,
                Unit::Percent,
                Unit::DosesPerDay,
                Unit::MicrogramPerHour,
                Unit::MillilitrePerHour,
                Unit::MilligramPerDay,
            ],
        }
    }

    pub fn is_registered(unit: Unit, kind: QuantityKind) -> bool {
        Self::registered_units(kind).contains(&unit)
    }

    /// Convert `value` given in `from_unit` to the canonical unit of `kind`.
    /// Scalars pass through unchanged in their own unit.
    pub fn to_canonical(&self, value: f64, from_unit: Unit, kind: QuantityKind) -> Result<Quantity> {
        let factor = self.factor_to_canonical(from_unit, kind)?;

        match kind.canonical_unit() {
            Some(canonical) => Ok(Quantity::new(value * factor, canonical)),
            None => Ok(Quantity::new(value, from_unit)),
        }
    }

    /// Convert a canonical value of `kind` into `to_unit`
    pub fn from_canonical(&self, value: f64, to_unit: Unit, kind: QuantityKind) -> Result<Quantity> {
        let factor = self.factor_to_canonical(to_unit, kind)?;
        Ok(Quantity::new(value / factor, to_unit))
    }

    /// Convert between two units of the same kind
    pub fn convert(&self, quantity: Quantity, to_unit: Unit, kind: QuantityKind) -> Result<Quantity> {
        let canonical = self.to_canonical(quantity.value, quantity.unit, kind)?;
        self.from_canonical(canonical.value, to_unit, kind)
    }

    // Multiplier taking `unit` to the canonical unit of `kind`
    fn factor_to_canonical(&self, unit: Unit, kind: QuantityKind) -> Result<f64> {
        if !Self::is_registered(unit, kind) {
            return Err(EngineError::InvalidUnit {
                unit: unit.symbol().to_string(),
                kind,
            });
        }

        let factor = match (kind, unit) {
            (QuantityKind::Mass, Unit::Gram) => 0.001,
            (QuantityKind::Mass, Unit::Pound) => POUND_IN_KG,
            (QuantityKind::Amount, Unit::Gram) => 1_000.0,
            (QuantityKind::Amount, Unit::Microgram) => 0.001,
            (QuantityKind::Concentration, Unit::MilligramPerDecilitre) => 10.0,
            (QuantityKind::Concentration, Unit::GramPerDecilitre) => 10_000.0,
            (QuantityKind::Concentration, Unit::GramPerLitre)
            | (QuantityKind::Concentration, Unit::MilligramPerMillilitre) => 1_000.0,
            (QuantityKind::Concentration, Unit::MicromolePerLitre) => {
                let mw = self.molecular_weight.ok_or_else(|| {
                    EngineError::Conversion(
                        "µmol/L needs a molecular weight to convert to µg/mL".to_string(),
                    )
                })?;
                if !(mw.is_finite() && mw > 0.0) {
                    return Err(EngineError::Conversion(format!(
                        "molecular weight must be positive, got {}",
                        mw
                    )));
                }
                mw / 1_000.0
            }
            (QuantityKind::Time, Unit::Minute) => 1.0 / 60.0,
            (QuantityKind::Time, Unit::Day) => 24.0,
            (QuantityKind::Volume, Unit::Litre) => 1_000.0,
            // canonical units, mg/L == µg/mL, mEq/L == mmol/L for monovalent ions, scalars
            _ => 1.0,
        };

        Ok(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_round_trip() {
        let converter = UnitConverter::new();
        for kg in [0.5, 3.2, 12.0, 80.0, 145.7] {
            let lb = converter
                .from_canonical(kg, Unit::Pound, QuantityKind::Mass)
                .unwrap();
            let back = converter
                .to_canonical(lb.value, Unit::Pound, QuantityKind::Mass)
                .unwrap();
            assert!((back.value - kg).abs() < 1e-6);
            assert_eq!(back.unit, Unit::Kilogram);
        }
    }

    #[test]
    fn test_mass_units() {
        let converter = UnitConverter::new();
        let q = converter
            .to_canonical(12_000.0, Unit::Gram, QuantityKind::Mass)
            .unwrap();
        assert!((q.value - 12.0).abs() < 1e-9);

        let q = converter
            .to_canonical(22.0, Unit::Pound, QuantityKind::Mass)
            .unwrap();
        assert!((q.value - 9.979_032_14).abs() < 1e-6);
    }

    #[test]
    fn test_gram_depends_on_kind() {
        let converter = UnitConverter::new();
        let amount = converter
            .to_canonical(1.5, Unit::Gram, QuantityKind::Amount)
            .unwrap();
        assert_eq!(amount.value, 1500.0);
        assert_eq!(amount.unit, Unit::Milligram);

        let weight = converter
            .to_canonical(1500.0, Unit::Gram, QuantityKind::Mass)
            .unwrap();
        assert!((weight.value - 1.5).abs() < 1e-12);
        assert_eq!(weight.unit, Unit::Kilogram);
    }

    #[test]
    fn test_unregistered_unit() {
        let converter = UnitConverter::new();
        let err = converter
            .to_canonical(10.0, Unit::Hour, QuantityKind::Mass)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidUnit {
                unit: "h".to_string(),
                kind: QuantityKind::Mass
            }
        );
    }

    #[test]
    fn test_molar_concentration() {
        let converter = UnitConverter::new().with_molecular_weight(151.16);
        // 1000 µmol/L paracetamol ~ 151 µg/mL
        let q = converter
            .to_canonical(1000.0, Unit::MicromolePerLitre, QuantityKind::Concentration)
            .unwrap();
        assert!((q.value - 151.16).abs() < 1e-9);

        let back = converter
            .from_canonical(q.value, Unit::MicromolePerLitre, QuantityKind::Concentration)
            .unwrap();
        assert!((back.value - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_molar_concentration_needs_molecular_weight() {
        let converter = UnitConverter::new();
        let err = converter
            .to_canonical(1000.0, Unit::MicromolePerLitre, QuantityKind::Concentration)
            .unwrap_err();
        assert!(matches!(err, EngineError::Conversion(_)));
    }

    #[test]
    fn test_albumin_units() {
        let converter = UnitConverter::new();
        let g_dl = converter
            .convert(
                Quantity::new(35.0, Unit::GramPerLitre),
                Unit::GramPerDecilitre,
                QuantityKind::Concentration,
            )
            .unwrap();
        assert!((g_dl.value - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_scalar_passes_through() {
        let converter = UnitConverter::new();
        let q = converter
            .to_canonical(15.0, Unit::MilligramPerKilogram, QuantityKind::Scalar)
            .unwrap();
        assert_eq!(q, Quantity::new(15.0, Unit::MilligramPerKilogram));
    }

    #[test]
    fn test_time_units() {
        let converter = UnitConverter::new();
        let q = converter
            .to_canonical(90.0, Unit::Minute, QuantityKind::Time)
            .unwrap();
        assert!((q.value - 1.5).abs() < 1e-12);
        let q = converter
            .to_canonical(1.0, Unit::Day, QuantityKind::Time)
            .unwrap();
        assert_eq!(q.value, 24.0);
    }
}
