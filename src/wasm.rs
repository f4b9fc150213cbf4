// WebAssembly bindings for the dose calculators
use crate::config::EngineConfig;
use crate::engine::{ComputationResult, DoseEngine, RawInputs};
use crate::error::EngineError;
use crate::history::HistoryStore;
use crate::report;
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct DoseCalcWasm {
    engine: DoseEngine,
    // one per page session
    history: HistoryStore,
}

#[derive(Serialize)]
struct HistoryRecord {
    position: u64,
    record: report::Record,
    summary: String,
}

#[wasm_bindgen]
impl DoseCalcWasm {
    /// Build the engine from optional TOML configuration text
    #[wasm_bindgen(constructor)]
    pub fn new(config_content: Option<String>) -> Result<DoseCalcWasm, JsValue> {
        let config = match config_content {
            Some(content) => EngineConfig::load_from_str(&content)
                .map_err(|e| js_error(&format!("Failed to load config: {}", e)))?,
            None => EngineConfig::default(),
        };

        Ok(Self {
            engine: DoseEngine::from_config(&config),
            history: HistoryStore::new(),
        })
    }

    /// JSON array of formula summaries, sorted by id
    #[wasm_bindgen]
    pub fn list_formulas(&self) -> Result<String, JsValue> {
        to_json(&self.engine.registry().summaries())
    }

    /// JSON summary of one formula, for building its form
    #[wasm_bindgen]
    pub fn describe_formula(&self, formula_id: &str) -> Result<String, JsValue> {
        let summary = self.engine.describe(formula_id).map_err(engine_error)?;
        to_json(&summary)
    }

    /// Compute without recording. `inputs_json` is the form's field map.
    #[wasm_bindgen]
    pub fn compute(&self, formula_id: &str, inputs_json: &str) -> Result<String, JsValue> {
        let result = self.run(formula_id, inputs_json)?;
        to_json(&result)
    }

    /// Compute and append the result to this session's history
    #[wasm_bindgen]
    pub fn compute_and_record(
        &mut self,
        formula_id: &str,
        inputs_json: &str,
    ) -> Result<String, JsValue> {
        let result = self.run(formula_id, inputs_json)?;
        let json = to_json(&result)?;
        self.history.append(result);
        Ok(json)
    }

    /// JSON array of history entries, most recent first
    #[wasm_bindgen]
    pub fn history(&self) -> Result<String, JsValue> {
        to_json(&self.history.list())
    }

    #[wasm_bindgen]
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Flat records and text summaries of the history, most recent first
    #[wasm_bindgen]
    pub fn history_records(&self) -> Result<String, JsValue> {
        let mut records = Vec::with_capacity(self.history.len());
        for entry in self.history.list() {
            let spec = self
                .engine
                .registry()
                .get(entry.result.formula_id())
                .map_err(engine_error)?;
            records.push(HistoryRecord {
                position: entry.position,
                record: report::to_record(&entry.result, spec),
                summary: report::text_summary(&entry.result),
            });
        }
        to_json(&records)
    }
}

impl DoseCalcWasm {
    fn run(&self, formula_id: &str, inputs_json: &str) -> Result<ComputationResult, JsValue> {
        let inputs = RawInputs::from_json(inputs_json)
            .map_err(|e| js_error(&format!("Failed to parse inputs JSON: {}", e)))?;
        self.engine
            .compute(formula_id, &inputs)
            .map_err(engine_error)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value)
        .map_err(|e| js_error(&format!("Failed to serialize result: {}", e)))
}

fn js_error(message: &str) -> JsValue {
    js_sys::Error::new(message).into()
}

// Field problems travel on the Error as a JSON `fields` property
fn engine_error(error: EngineError) -> JsValue {
    let js = js_sys::Error::new(&error.to_string());
    if !error.field_errors().is_empty() {
        if let Ok(fields) = serde_json::to_string(error.field_errors()) {
            let _ = js_sys::Reflect::set(&js, &JsValue::from_str("fields"), &JsValue::from_str(&fields));
        }
    }
    js.into()
}
