//! Token usage accounting.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use bot_team_llm::ChatResponse;
use serde::Serialize;

/// Token counts for one (model, tier) bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenCounts {
    /// Prompt tokens net of cached tokens.
    pub input: u64,
    pub input_cached: u64,
    pub output: u64,
    pub total: u64,
}

impl AddAssign for TokenCounts {
    fn add_assign(&mut self, other: Self) {
        self.input += other.input;
        self.input_cached += other.input_cached;
        self.output += other.output;
        self.total += other.total;
    }
}

/// Bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UsageKey {
    pub model: String,
    /// Service tier as reported by the provider.
    pub tier: String,
}

/// Token usage accumulated across a call chain, bucketed by model and tier.
///
/// Only grows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageStats {
    buckets: BTreeMap<UsageKey, TokenCounts>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response's usage.
    ///
    /// Skipped when the response lacks usage, model or service tier.
    /// Returns whether anything was recorded.
    pub fn accumulate(&mut self, response: &ChatResponse) -> bool {
        let (Some(usage), Some(model), Some(tier)) = (
            response.usage.as_ref(),
            response.model.as_deref(),
            response.service_tier.as_deref(),
        ) else {
            tracing::debug!("Response carries no complete usage, skipping accumulation");
            return false;
        };

        let cached = usage.cached_tokens();
        let counts = TokenCounts {
            input: usage.prompt_tokens.saturating_sub(cached),
            input_cached: cached,
            output: usage.completion_tokens,
            total: usage.total_tokens,
        };

        tracing::info!(
            model = %model,
            tier = %tier,
            input = counts.input,
            input_cached = counts.input_cached,
            output = counts.output,
            total = counts.total,
            "Accumulated usage"
        );
        self.record(model, tier, counts);
        true
    }

    pub fn record(&mut self, model: &str, tier: &str, counts: TokenCounts) {
        *self
            .buckets
            .entry(UsageKey {
                model: model.to_string(),
                tier: tier.to_string(),
            })
            .or_default() += counts;
    }

    pub fn get(&self, model: &str, tier: &str) -> Option<&TokenCounts> {
        self.buckets.get(&UsageKey {
            model: model.to_string(),
            tier: tier.to_string(),
        })
    }

    /// Buckets in (model, tier) order.
    pub fn iter(&self) -> impl Iterator<Item = (&UsageKey, &TokenCounts)> {
        self.buckets.iter()
    }

    /// Sum over all buckets.
    pub fn totals(&self) -> TokenCounts {
        let mut sum = TokenCounts::default();
        for counts in self.buckets.values() {
            sum += *counts;
        }
        sum
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_team_llm::Usage;

    fn response(model: &str, tier: &str, usage: Usage) -> ChatResponse {
        ChatResponse::text("ok")
            .with_model(model)
            .with_service_tier(tier)
            .with_usage(usage)
    }

    #[test]
    fn test_accumulate_nets_cached_tokens() {
        let mut stats = UsageStats::new();
        assert!(stats.accumulate(&response(
            "gpt-4o",
            "default",
            Usage::new(100, 20).with_cached_tokens(30)
        )));

        let counts = stats.get("gpt-4o", "default").unwrap();
        assert_eq!(
            *counts,
            TokenCounts {
                input: 70,
                input_cached: 30,
                output: 20,
                total: 120,
            }
        );
    }

    #[test]
    fn test_accumulate_is_additive_per_bucket() {
        let mut stats = UsageStats::new();
        stats.accumulate(&response("gpt-4o", "default", Usage::new(10, 5)));
        stats.accumulate(&response("gpt-4o", "default", Usage::new(7, 3)));
        stats.accumulate(&response("gpt-4o", "flex", Usage::new(1, 1)));

        assert_eq!(stats.len(), 2);
        let default = stats.get("gpt-4o", "default").unwrap();
        assert_eq!(default.input, 17);
        assert_eq!(default.output, 8);
        assert_eq!(default.total, 25);
        assert_eq!(stats.totals().total, 27);
    }

    #[test]
    fn test_accumulate_skips_incomplete_responses() {
        let mut stats = UsageStats::new();
        let no_tier = ChatResponse::text("x")
            .with_model("gpt-4o")
            .with_usage(Usage::new(1, 1));
        let no_usage = ChatResponse::text("x")
            .with_model("gpt-4o")
            .with_service_tier("default");
        let no_model = ChatResponse::text("x")
            .with_service_tier("default")
            .with_usage(Usage::new(1, 1));

        assert!(!stats.accumulate(&no_tier));
        assert!(!stats.accumulate(&no_usage));
        assert!(!stats.accumulate(&no_model));
        assert!(stats.is_empty());
    }

    #[test]
    fn test_cached_exceeding_prompt_saturates() {
        let mut stats = UsageStats::new();
        stats.accumulate(&response(
            "m",
            "default",
            Usage::new(5, 0).with_cached_tokens(9),
        ));
        assert_eq!(stats.get("m", "default").unwrap().input, 0);
    }
}
