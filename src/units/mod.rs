// Units of measure: symbols, quantity kinds, canonical conversion and number formatting

pub mod converter;
pub mod detector;
pub mod formatter;
pub mod types;

pub use converter::UnitConverter;
pub use detector::split_quantity_string;
pub use formatter::format_number;
pub use types::{ParsedQuantity, Quantity, QuantityKind, Unit};
