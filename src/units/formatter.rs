/// Render a number for display: at most three decimals, no trailing zeros
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let text = format!("{:.3}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(180.0), "180");
        assert_eq!(format_number(26.524), "26.524");
        assert_eq!(format_number(26.52447), "26.524");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0001), "0");
    }
}
