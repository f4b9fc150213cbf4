use crate::units::types::ParsedQuantity;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex pattern to detect quantity strings typed into a form field
    /// Matches: number (optional decimal, optional scientific notation) + optional whitespace + unit
    /// Examples: "12 kg", "12kg", "3.5 lb", "150 mcg/mL", "25 µmol/L", "0.5e1 h"
    static ref QUANTITY_PATTERN: Regex = Regex::new(
        r"^(-?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?)\s*([a-zA-Zµμ%/][a-zA-Zµμ%/ ]*)$"
    ).unwrap();
}

/// Split a quantity string into its number and unit text.
/// Returns `None` when the text is not of that shape; the unit is not resolved here.
pub fn split_quantity_string(s: &str) -> Option<ParsedQuantity> {
    let trimmed = s.trim();
    let captures = QUANTITY_PATTERN.captures(trimmed)?;
    let value = captures.get(1)?.as_str().parse::<f64>().ok()?;
    let unit_text = captures.get(2)?.as_str().trim().to_string();

    Some(ParsedQuantity {
        value,
        unit_text,
        original: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_detection() {
        for text in ["12 kg", "12kg", "10.5 lb", "150 mcg/mL", "25 µmol/L", "1e3 mg", "25 %", "15 mg / kg"] {
            assert!(split_quantity_string(text).is_some(), "{}", text);
        }
        for text in ["100", "kg", "hello world", "", "   "] {
            assert!(split_quantity_string(text).is_none(), "{:?}", text);
        }
    }

    #[test]
    fn test_split_quantity() {
        let parsed = split_quantity_string(" 3.5 lb ").unwrap();
        assert_eq!(parsed.value, 3.5);
        assert_eq!(parsed.unit_text, "lb");
        assert_eq!(parsed.original, "3.5 lb");

        let parsed = split_quantity_string("150mcg/mL").unwrap();
        assert_eq!(parsed.value, 150.0);
        assert_eq!(parsed.unit_text, "mcg/mL");

        assert!(split_quantity_string("twelve kg").is_none());
    }
}
