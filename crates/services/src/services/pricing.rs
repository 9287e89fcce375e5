//! Token pricing used for spend tracking.

use super::ai_provider::TokenUsage;

/// USD per million tokens: (model prefix, input, output). First prefix match wins.
const PRICES: &[(&str, f64, f64)] = &[
    ("claude-opus", 15.0, 75.0),
    ("claude-sonnet", 3.0, 15.0),
    ("claude-3-7-sonnet", 3.0, 15.0),
    ("claude-3-5-sonnet", 3.0, 15.0),
    ("claude-3-5-haiku", 0.8, 4.0),
    ("claude-haiku", 1.0, 5.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4.1-mini", 0.4, 1.6),
    ("gpt-4.1", 2.0, 8.0),
];

/// Applied to models missing from the table so unknown models are never free
const FALLBACK_PRICE: (f64, f64) = (3.0, 15.0);

pub fn price_per_million(model: &str) -> (f64, f64) {
    PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|(_, input, output)| (*input, *output))
        .unwrap_or(FALLBACK_PRICE)
}

pub fn estimate_cost(model: &str, usage: TokenUsage) -> f64 {
    let (input, output) = price_per_million(model);
    (usage.input_tokens as f64 * input + usage.output_tokens as f64 * output) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_lookup_prefers_specific_entry() {
        assert_eq!(price_per_million("gpt-4o-mini-2024-07-18"), (0.15, 0.6));
        assert_eq!(price_per_million("gpt-4o-2024-08-06"), (2.5, 10.0));
        assert_eq!(price_per_million("mystery-model"), FALLBACK_PRICE);
    }

    #[test]
    fn test_estimate_cost() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 100_000,
        };
        let cost = estimate_cost("claude-sonnet-4-20250514", usage);
        assert!((cost - 4.5).abs() < 1e-9);
    }
}
