use crate::formula::nomogram::Nomogram;
use crate::formula::opioid::{OpioidTable, Route};
use crate::formula::spec::CapMode;
use crate::rounding::{RoundingRule, DEFAULT_DECIMALS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use toml::Value;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration. Every clinical constant the catalog uses lives here
/// so deployments can correct coefficients and caps without a rebuild.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub rounding: RoundingSettings,

    #[serde(default)]
    pub nomogram: NomogramSettings,

    #[serde(default)]
    pub anion_gap: AnionGapSettings,

    #[serde(default)]
    pub opioid_settings: OpioidSettings,

    // Agents added to, or replacing entries of, the built-in OME table
    #[serde(default)]
    pub opioids: BTreeMap<String, OpioidAgentConfig>,

    // Per-formula adjustments, keyed by formula id
    #[serde(default)]
    pub formulas: BTreeMap<String, FormulaOverride>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoundingSettings {
    #[serde(default = "default_decimals")]
    pub default_decimals: u32,

    #[serde(default = "default_volume_step")]
    pub liquid_volume_step_ml: f64,
}

impl Default for RoundingSettings {
    fn default() -> Self {
        Self {
            default_decimals: default_decimals(),
            liquid_volume_step_ml: default_volume_step(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NomogramSettings {
    #[serde(default = "default_start_hours")]
    pub start_hours: f64,
    #[serde(default = "default_start_threshold")]
    pub start_threshold: f64,
    #[serde(default = "default_end_hours")]
    pub end_hours: f64,
    #[serde(default = "default_end_threshold")]
    pub end_threshold: f64,
    // acetaminophen, g/mol
    #[serde(default = "default_molecular_weight")]
    pub molecular_weight: f64,
}

impl Default for NomogramSettings {
    fn default() -> Self {
        Self {
            start_hours: default_start_hours(),
            start_threshold: default_start_threshold(),
            end_hours: default_end_hours(),
            end_threshold: default_end_threshold(),
            molecular_weight: default_molecular_weight(),
        }
    }
}

impl NomogramSettings {
    pub fn curve(&self) -> Nomogram {
        Nomogram {
            start_hours: self.start_hours,
            start_threshold: self.start_threshold,
            end_hours: self.end_hours,
            end_threshold: self.end_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnionGapSettings {
    #[serde(default = "default_gap_low")]
    pub normal_low: f64,
    #[serde(default = "default_gap_high")]
    pub normal_high: f64,
    #[serde(default = "default_albumin_reference")]
    pub albumin_reference_g_dl: f64,
    #[serde(default = "default_albumin_factor")]
    pub albumin_factor: f64,
}

impl Default for AnionGapSettings {
    fn default() -> Self {
        Self {
            normal_low: default_gap_low(),
            normal_high: default_gap_high(),
            albumin_reference_g_dl: default_albumin_reference(),
            albumin_factor: default_albumin_factor(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpioidSettings {
    #[serde(default = "default_high_ome")]
    pub high_ome_threshold: f64,
    #[serde(default = "default_cross_tolerance")]
    pub default_cross_tolerance_pct: f64,
    #[serde(default = "default_oral_step")]
    pub oral_step_mg: f64,
    #[serde(default = "default_patch_strengths")]
    pub patch_strengths_mcg_h: Vec<f64>,
}

impl Default for OpioidSettings {
    fn default() -> Self {
        Self {
            high_ome_threshold: default_high_ome(),
            default_cross_tolerance_pct: default_cross_tolerance(),
            oral_step_mg: default_oral_step(),
            patch_strengths_mcg_h: default_patch_strengths(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpioidAgentConfig {
    #[serde(default = "default_route")]
    pub route: Route,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FormulaOverride {
    // Field defaults, e.g. `mg_per_kg = 12.5`
    #[serde(default)]
    pub defaults: HashMap<String, Value>,

    #[serde(default)]
    pub cap_max: Option<f64>,

    #[serde(default)]
    pub cap_mode: Option<CapMode>,

    #[serde(default)]
    pub rounding: Option<RoundingRule>,
}

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}

fn default_volume_step() -> f64 {
    0.5
}

fn default_start_hours() -> f64 {
    4.0
}

fn default_start_threshold() -> f64 {
    150.0
}

fn default_end_hours() -> f64 {
    24.0
}

fn default_end_threshold() -> f64 {
    4.69
}

fn default_molecular_weight() -> f64 {
    151.16
}

fn default_gap_low() -> f64 {
    8.0
}

fn default_gap_high() -> f64 {
    12.0
}

fn default_albumin_reference() -> f64 {
    4.0
}

fn default_albumin_factor() -> f64 {
    2.5
}

fn default_high_ome() -> f64 {
    90.0
}

fn default_cross_tolerance() -> f64 {
    25.0
}

fn default_oral_step() -> f64 {
    0.5
}

fn default_patch_strengths() -> Vec<f64> {
    vec![12.0, 25.0, 50.0, 75.0, 100.0]
}

fn default_route() -> Route {
    Route::Oral
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nomogram = &self.nomogram;
        if !(nomogram.start_threshold > 0.0 && nomogram.end_threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "nomogram thresholds must be positive".to_string(),
            ));
        }
        if nomogram.end_hours <= nomogram.start_hours {
            return Err(ConfigError::Invalid(format!(
                "nomogram end_hours ({}) must be after start_hours ({})",
                nomogram.end_hours, nomogram.start_hours
            )));
        }
        if nomogram.molecular_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "nomogram molecular_weight must be positive".to_string(),
            ));
        }

        for (name, agent) in &self.opioids {
            if !(agent.coefficient.is_finite() && agent.coefficient > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "opioid '{}' coefficient must be positive, got {}",
                    name, agent.coefficient
                )));
            }
        }

        let pct = self.opioid_settings.default_cross_tolerance_pct;
        if !(0.0..=100.0).contains(&pct) {
            return Err(ConfigError::Invalid(format!(
                "default_cross_tolerance_pct must be between 0 and 100, got {}",
                pct
            )));
        }

        for (id, formula) in &self.formulas {
            if let Some(max) = formula.cap_max {
                if !(max.is_finite() && max > 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "formula '{}' cap_max must be positive, got {}",
                        id, max
                    )));
                }
            }
        }

        Ok(())
    }

    /// Built-in OME table with configured agents merged over it
    pub fn opioid_table(&self) -> OpioidTable {
        let mut table = OpioidTable::default();
        for (name, agent) in &self.opioids {
            table.insert(name, agent.route, agent.coefficient);
        }
        table
    }
}

/// Render a TOML default as the text a form would have submitted
pub fn value_to_default(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        _ => None,
    }
}
