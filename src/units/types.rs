use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical quantity families a form field can carry.
///
/// Every kind has one canonical unit that formulas consume. `Scalar` values
/// (ratios, per-kg rates, counts) are never converted: the field declares the
/// one unit it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    /// Body weight
    Mass,
    /// Drug amount
    Amount,
    /// Mass concentration in plasma or in a liquid preparation
    Concentration,
    /// Serum electrolytes
    Electrolyte,
    Time,
    Volume,
    Scalar,
}

impl QuantityKind {
    /// Canonical unit for this kind. `None` for scalars, which keep their
    /// declared unit.
    pub fn canonical_unit(self) -> Option<Unit> {
        match self {
            QuantityKind::Mass => Some(Unit::Kilogram),
            QuantityKind::Amount => Some(Unit::Milligram),
            QuantityKind::Concentration => Some(Unit::MicrogramPerMillilitre),
            QuantityKind::Electrolyte => Some(Unit::MillimolePerLitre),
            QuantityKind::Time => Some(Unit::Hour),
            QuantityKind::Volume => Some(Unit::Millilitre),
            QuantityKind::Scalar => None,
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuantityKind::Mass => "mass",
            QuantityKind::Amount => "amount",
            QuantityKind::Concentration => "concentration",
            QuantityKind::Electrolyte => "electrolyte",
            QuantityKind::Time => "time",
            QuantityKind::Volume => "volume",
            QuantityKind::Scalar => "scalar",
        };
        write!(f, "{}", name)
    }
}

/// Unit symbols understood by the engine. Which kinds accept a symbol is
/// decided by the converter's registration table, so `g` can be both a body
/// weight and a drug amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Kilogram,
    Gram,
    Pound,
    Milligram,
    Microgram,
    MicrogramPerMillilitre,
    MilligramPerLitre,
    MilligramPerDecilitre,
    GramPerDecilitre,
    GramPerLitre,
    MilligramPerMillilitre,
    MicromolePerLitre,
    MillimolePerLitre,
    MilliequivalentPerLitre,
    Hour,
    Minute,
    Day,
    Millilitre,
    Litre,
    MicrogramPerHour,
    MilligramPerKilogram,
    MilligramPerKilogramPerDay,
    Percent,
    DosesPerDay,
    MillilitrePerHour,
    MilligramPerDay,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Pound => "lb",
            Unit::Milligram => "mg",
            Unit::Microgram => "mcg",
            Unit::MicrogramPerMillilitre => "µg/mL",
            Unit::MilligramPerLitre => "mg/L",
            Unit::MilligramPerDecilitre => "mg/dL",
            Unit::GramPerDecilitre => "g/dL",
            Unit::GramPerLitre => "g/L",
            Unit::MilligramPerMillilitre => "mg/mL",
            Unit::MicromolePerLitre => "µmol/L",
            Unit::MillimolePerLitre => "mmol/L",
            Unit::MilliequivalentPerLitre => "mEq/L",
            Unit::Hour => "h",
            Unit::Minute => "min",
            Unit::Day => "day",
            Unit::Millilitre => "mL",
            Unit::Litre => "L",
            Unit::MicrogramPerHour => "mcg/h",
            Unit::MilligramPerKilogram => "mg/kg",
            Unit::MilligramPerKilogramPerDay => "mg/kg/day",
            Unit::Percent => "%",
            Unit::DosesPerDay => "doses/day",
            Unit::MillilitrePerHour => "mL/h",
            Unit::MilligramPerDay => "mg/day",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Unit {
    type Err = EngineError;

    /// Accepts the spellings form controls produce: case-insensitive, `µ`,
    /// `μ`, `u` and `mcg` interchangeable, plural and long names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace(['µ', 'μ'], "u")
            .replace("mcg", "ug")
            .replace(' ', "");

        let unit = match normalized.as_str() {
            "kg" | "kgs" | "kilogram" | "kilograms" => Unit::Kilogram,
            "g" | "gram" | "grams" => Unit::Gram,
            "lb" | "lbs" | "pound" | "pounds" => Unit::Pound,
            "mg" | "milligram" | "milligrams" => Unit::Milligram,
            "ug" | "microgram" | "micrograms" => Unit::Microgram,
            "ug/ml" => Unit::MicrogramPerMillilitre,
            "mg/l" => Unit::MilligramPerLitre,
            "mg/dl" => Unit::MilligramPerDecilitre,
            "g/dl" => Unit::GramPerDecilitre,
            "g/l" => Unit::GramPerLitre,
            "mg/ml" => Unit::MilligramPerMillilitre,
            "umol/l" => Unit::MicromolePerLitre,
            "mmol/l" => Unit::MillimolePerLitre,
            "meq/l" => Unit::MilliequivalentPerLitre,
            "h" | "hr" | "hrs" | "hour" | "hours" => Unit::Hour,
            "min" | "mins" | "minute" | "minutes" => Unit::Minute,
            "d" | "day" | "days" => Unit::Day,
            "ml" | "millilitre" | "milliliter" | "millilitres" | "milliliters" => Unit::Millilitre,
            "l" | "litre" | "liter" | "litres" | "liters" => Unit::Litre,
            "ug/h" | "ug/hr" => Unit::MicrogramPerHour,
            "mg/kg" => Unit::MilligramPerKilogram,
            "mg/kg/day" | "mg/kg/d" => Unit::MilligramPerKilogramPerDay,
            "%" | "percent" => Unit::Percent,
            "doses/day" | "/day" | "perday" | "x/day" => Unit::DosesPerDay,
            "ml/h" | "ml/hr" => Unit::MillilitrePerHour,
            "mg/day" | "mg/d" => Unit::MilligramPerDay,
            _ => {
                return Err(EngineError::Conversion(format!(
                    "'{}' is not a recognised unit",
                    s.trim()
                )))
            }
        };

        Ok(unit)
    }
}

/// A numeric value tagged with its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            crate::units::formatter::format_number(self.value),
            self.unit
        )
    }
}

/// Result of splitting a text value such as `"12.5 kg"`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuantity {
    pub value: f64,
    /// Unit text as typed, not yet resolved
    pub unit_text: String,
    /// Original input string for display
    pub original: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_aliases() {
        assert_eq!("kg".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert_eq!("LBS".parse::<Unit>().unwrap(), Unit::Pound);
        assert_eq!("mcg/mL".parse::<Unit>().unwrap(), Unit::MicrogramPerMillilitre);
        assert_eq!("µg/mL".parse::<Unit>().unwrap(), Unit::MicrogramPerMillilitre);
        assert_eq!("umol/L".parse::<Unit>().unwrap(), Unit::MicromolePerLitre);
        assert_eq!("hours".parse::<Unit>().unwrap(), Unit::Hour);
        assert_eq!("mcg/hr".parse::<Unit>().unwrap(), Unit::MicrogramPerHour);
        assert_eq!(" mg / kg ".parse::<Unit>().unwrap(), Unit::MilligramPerKilogram);
    }

    #[test]
    fn test_parse_unknown_unit() {
        let err = "furlong".parse::<Unit>().unwrap_err();
        assert!(err.to_string().contains("furlong"));
    }

    #[test]
    fn test_symbol_round_trip() {
        for unit in [
            Unit::Kilogram,
            Unit::MicrogramPerMillilitre,
            Unit::MicromolePerLitre,
            Unit::MilliequivalentPerLitre,
            Unit::MilligramPerKilogramPerDay,
            Unit::DosesPerDay,
        ] {
            assert_eq!(unit.symbol().parse::<Unit>().unwrap(), unit);
        }
    }

    #[test]
    fn test_canonical_units() {
        assert_eq!(QuantityKind::Mass.canonical_unit(), Some(Unit::Kilogram));
        assert_eq!(
            QuantityKind::Concentration.canonical_unit(),
            Some(Unit::MicrogramPerMillilitre)
        );
        assert_eq!(QuantityKind::Scalar.canonical_unit(), None);
    }
}
