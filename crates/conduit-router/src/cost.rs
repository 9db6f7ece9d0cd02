//! Cost calculation from token counts and per-1K pricing.

use crate::error::{Result, RoutingError};
use crate::types::{ModelCandidate, Pricing};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use conduit_abstraction::estimate_tokens;

/// Cost of `input_tokens` + `output_tokens` under `pricing`, in USD.
///
/// # Errors
/// Returns `RoutingError::InvalidTokenCount` if either count is negative.
#[allow(clippy::cast_precision_loss)]
pub fn cost(input_tokens: i64, output_tokens: i64, pricing: &Pricing) -> Result<f64> {
    if input_tokens < 0 || output_tokens < 0 {
        return Err(RoutingError::InvalidTokenCount { input: input_tokens, output: output_tokens });
    }
    Ok(input_tokens as f64 / 1000.0 * pricing.input_per_1k
        + output_tokens as f64 / 1000.0 * pricing.output_per_1k)
}

/// Itemised cost of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Cost of the input tokens.
    pub input_cost_usd: f64,
    /// Cost of the output tokens.
    pub output_cost_usd: f64,
    /// Input + output.
    pub total_cost_usd: f64,
    /// Effective price per 1000 tokens across input and output.
    pub cost_per_1k_tokens: f64,
    /// Savings against the most expensive registered model for the same tokens.
    pub estimated_savings_usd: f64,
}

impl CostBreakdown {
    /// Itemises the cost of an invocation.
    ///
    /// # Errors
    /// Returns `RoutingError::InvalidTokenCount` if either count is negative.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(input_tokens: i64, output_tokens: i64, pricing: &Pricing) -> Result<Self> {
        let input_cost_usd = cost(input_tokens, 0, pricing)?;
        let output_cost_usd = cost(0, output_tokens, pricing)?;
        let total_cost_usd = input_cost_usd + output_cost_usd;
        let total_tokens = input_tokens + output_tokens;
        let cost_per_1k_tokens = if total_tokens > 0 {
            total_cost_usd / total_tokens as f64 * 1000.0
        } else {
            0.0
        };

        Ok(Self {
            input_cost_usd,
            output_cost_usd,
            total_cost_usd,
            cost_per_1k_tokens,
            estimated_savings_usd: 0.0,
        })
    }

    /// Records savings against a reference total; never negative.
    #[must_use]
    pub fn with_savings_against(mut self, reference_total_usd: f64) -> Self {
        self.estimated_savings_usd = (reference_total_usd - self.total_cost_usd).max(0.0);
        self
    }
}

/// Expected output tokens for `input_tokens`, capped at the model's output budget.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn expected_output_tokens(candidate: &ModelCandidate, input_tokens: u32, output_ratio: f64) -> u32 {
    let expected = (f64::from(input_tokens) * output_ratio.max(0.0)).ceil() as u32;
    expected.min(candidate.max_output_tokens)
}

/// Pre-invocation cost estimate used for scoring.
#[must_use]
pub fn estimate_cost(candidate: &ModelCandidate, input_tokens: u32, output_ratio: f64) -> f64 {
    let output = expected_output_tokens(candidate, input_tokens, output_ratio);
    // u32 counts are never negative
    cost(i64::from(input_tokens), i64::from(output), &candidate.pricing()).unwrap_or(0.0)
}

/// Cheapest achievable cost: the input alone, with no output.
#[must_use]
pub fn minimum_cost(candidate: &ModelCandidate, input_tokens: u32) -> f64 {
    cost(i64::from(input_tokens), 0, &candidate.pricing()).unwrap_or(0.0)
}

/// One row of a cost comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostComparison {
    /// Model id.
    pub model_id: String,
    /// Provider.
    pub provider: String,
    /// Total cost for the compared token counts.
    pub total_cost_usd: f64,
}

/// Ranks candidates by total cost for the given token counts, cheapest first.
///
/// Equal costs keep the input order.
///
/// # Errors
/// Returns `RoutingError::InvalidTokenCount` if either count is negative.
pub fn compare<'a, I>(candidates: I, input_tokens: i64, output_tokens: i64) -> Result<Vec<CostComparison>>
where
    I: IntoIterator<Item = &'a ModelCandidate>,
{
    let mut rows = candidates
        .into_iter()
        .map(|c| {
            Ok(CostComparison {
                model_id: c.id.clone(),
                provider: c.provider.clone(),
                total_cost_usd: cost(input_tokens, output_tokens, &c.pricing())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    rows.sort_by(|a, b| a.total_cost_usd.partial_cmp(&b.total_cost_usd).unwrap_or(Ordering::Equal));
    Ok(rows)
}
