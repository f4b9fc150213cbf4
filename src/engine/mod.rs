pub mod dose;
pub mod fields;
pub mod inputs;
pub mod result;
pub mod validation;

pub use dose::DoseEngine;
pub use fields::{BoundFields, FieldBinder};
pub use inputs::{unit_key, EchoedInput, FormulaInputs, InputValue, RawInputs, RawValue};
pub use result::ComputationResult;
pub use validation::{FieldError, FieldProblem, ValidationErrors};
