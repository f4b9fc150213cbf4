use serde::{Deserialize, Serialize};

/// Two-point treatment line of the acetaminophen (Rumack-Matthew) nomogram.
///
/// Between the reference points the threshold decays log-linearly; outside
/// them it is held at the nearest reference value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nomogram {
    pub start_hours: f64,
    /// µg/mL at `start_hours`
    pub start_threshold: f64,
    pub end_hours: f64,
    /// µg/mL at `end_hours`
    pub end_threshold: f64,
}

impl Default for Nomogram {
    fn default() -> Self {
        Self {
            start_hours: 4.0,
            start_threshold: 150.0,
            end_hours: 24.0,
            end_threshold: 4.69,
        }
    }
}

impl Nomogram {
    /// Treatment threshold in µg/mL `hours` after ingestion
    pub fn threshold(&self, hours: f64) -> f64 {
        if hours <= self.start_hours {
            return self.start_threshold;
        }
        if hours >= self.end_hours {
            return self.end_threshold;
        }

        let log_start = self.start_threshold.log10();
        let log_end = self.end_threshold.log10();
        let fraction = (hours - self.start_hours) / (self.end_hours - self.start_hours);
        10f64.powf(log_start + (log_end - log_start) * fraction)
    }
}
