//! Declarative dose-calculation engine: unit normalization, validation,
//! formula evaluation, safety caps and practical rounding for a catalog of
//! clinical calculators, plus an in-memory session history.

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod history;
pub mod report;
pub mod rounding;
pub mod units;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use config::{ConfigError, EngineConfig};
pub use engine::{ComputationResult, DoseEngine, RawInputs, RawValue};
pub use error::{EngineError, Result};
pub use formula::{FormulaRegistry, FormulaSpec};
pub use history::{HistoryEntry, HistoryStore};
pub use rounding::{RoundingPolicy, RoundingRule};
pub use units::{Quantity, QuantityKind, Unit, UnitConverter};
