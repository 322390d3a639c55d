use crate::constant::{DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::error::Error;

/// Sampling parameters sent with every batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    /// Sampling temperature; `0.0` selects greedy decoding
    pub temperature: f64,
    /// Nucleus-sampling threshold in `(0, 1]`
    pub top_p: f64,
    /// Cap on generated tokens; `None` lets the engine fill its sequence window
    pub max_gen_len: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_gen_len: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::Config(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.max_gen_len == Some(0) {
            return Err(Error::Config("max_gen_len must be at least 1".to_string()));
        }
        Ok(())
    }
}
