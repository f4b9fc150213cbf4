pub mod builtin;
pub mod nomogram;
pub mod opioid;
pub mod registry;
pub mod spec;

pub use nomogram::Nomogram;
pub use opioid::{OpioidAgent, OpioidConversion, OpioidEntry, OpioidTable, Route};
pub use registry::FormulaRegistry;
pub use spec::{
    AuxOutput, Cap, CapMode, FieldSpec, FieldType, FormulaFn, FormulaOutput, FormulaSpec,
    FormulaSummary, LiquidVolume,
};
