//! Clamp caller-supplied generation parameters into a provider's accepted range

use crate::types::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Bounded generation parameters forwarded to a provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Apply defaults and clamp to `ceiling` and the temperature range.
///
/// A token limit of zero or below and a NaN temperature are treated as
/// absent. Infinite temperatures clamp like any other out-of-range value.
pub fn normalize(max_tokens: Option<i64>, temperature: Option<f64>, ceiling: u32) -> GenerationParams {
    let max_tokens = match max_tokens.filter(|n| *n > 0) {
        Some(n) => n.min(i64::from(ceiling)) as u32,
        None => DEFAULT_MAX_TOKENS.min(ceiling),
    };
    let temperature = temperature
        .filter(|t| !t.is_nan())
        .unwrap_or(f64::from(DEFAULT_TEMPERATURE))
        .clamp(f64::from(MIN_TEMPERATURE), f64::from(MAX_TEMPERATURE)) as f32;

    GenerationParams {
        max_tokens,
        temperature,
    }
}
