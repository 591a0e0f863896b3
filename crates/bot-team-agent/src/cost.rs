//! Token pricing and cost calculation.
//!
//! Prices are USD per million tokens, keyed by (tier, model), loaded from a
//! CSV with header `tier,model,input,input_cached,output`. Blank cells mean
//! the token type has no price for that row.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::usage::UsageStats;

/// Project-local price table, checked before anything else.
pub const DEFAULT_PRICING_PATH: &str = "config/chat_gpt_cost.csv";

/// Price table compiled into the crate, used when no file is found.
const BUNDLED_PRICES: &str = include_str!("../data/chat_gpt_cost.csv");

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for price lookup and loading.
#[derive(Debug, Error)]
pub enum PricingError {
    /// None of the candidate price files exist.
    #[error("No pricing file found at {}", display_paths(.searched))]
    NoPricingFile { searched: Vec<PathBuf> },

    /// No row, or no price for a required token type.
    #[error(
        "No pricing found for model: {model}, tier: {tier} (normalized: {normalized_tier}), \
         token_type: {token_type}"
    )]
    NotFound {
        model: String,
        tier: String,
        normalized_tier: String,
        token_type: TokenType,
    },

    /// The price file could not be read or parsed.
    #[error("Failed to read price table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: csv::Error,
    },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────────────────────────────────────

/// Priced token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Input,
    InputCached,
    Output,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::InputCached => "input_cached",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Providers report the standard tier as `default`.
pub fn normalize_tier(tier: &str) -> &str {
    match tier {
        "default" => "standard",
        other => other,
    }
}

/// Source of per-million-token prices.
pub trait PriceLookup: Send + Sync {
    /// Price for one token type.
    ///
    /// `Ok(None)` means the model and tier are known but this token type has
    /// no price. An unknown model or tier is [`PricingError::NotFound`].
    fn lookup(
        &self,
        model: &str,
        tier: &str,
        token_type: TokenType,
    ) -> Result<Option<f64>, PricingError>;
}

/// Prices for one (tier, model) row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelPrices {
    pub input: Option<f64>,
    pub input_cached: Option<f64>,
    pub output: Option<f64>,
}

impl ModelPrices {
    pub fn get(&self, token_type: TokenType) -> Option<f64> {
        match token_type {
            TokenType::Input => self.input,
            TokenType::InputCached => self.input_cached,
            TokenType::Output => self.output,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    tier: String,
    model: String,
    input: Option<f64>,
    input_cached: Option<f64>,
    output: Option<f64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Price Table
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory price table.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    rows: HashMap<(String, String), ModelPrices>,
    source: Option<PathBuf>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse CSV rows from any reader. Later rows for the same key win.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Self::new();
        for row in csv_reader.deserialize() {
            let row: PriceRow = row?;
            table.insert(
                &row.tier,
                &row.model,
                ModelPrices {
                    input: row.input,
                    input_cached: row.input_cached,
                    output: row.output,
                },
            );
        }
        Ok(table)
    }

    pub fn from_csv_str(csv: &str) -> Result<Self, PricingError> {
        Self::from_reader(csv.as_bytes()).map_err(|source| PricingError::Read {
            path: "<inline>".to_string(),
            source,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, PricingError> {
        let read_error = |source: csv::Error| PricingError::Read {
            path: path.display().to_string(),
            source,
        };
        let file = std::fs::File::open(path).map_err(|e| read_error(e.into()))?;
        let mut table = Self::from_reader(file).map_err(read_error)?;
        table.source = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), rows = table.len(), "Loaded price table");
        Ok(table)
    }

    /// The price table shipped with the crate.
    pub fn bundled() -> Result<Self, PricingError> {
        Self::from_reader(BUNDLED_PRICES.as_bytes()).map_err(|source| PricingError::Read {
            path: "<bundled>".to_string(),
            source,
        })
    }

    /// Find a price table relative to the working directory.
    pub fn discover(pricing_file: Option<&Path>) -> Result<Self, PricingError> {
        Self::discover_in(Path::new("."), pricing_file)
    }

    /// Find a price table: `config/chat_gpt_cost.csv` under `base`, then
    /// `pricing_file`, then the bundled table.
    ///
    /// A configured `pricing_file` that does not exist is an error rather
    /// than a silent fallback.
    pub fn discover_in(base: &Path, pricing_file: Option<&Path>) -> Result<Self, PricingError> {
        let local = base.join(DEFAULT_PRICING_PATH);
        if local.is_file() {
            return Self::from_path(&local);
        }

        match pricing_file {
            Some(path) => {
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    base.join(path)
                };
                if path.is_file() {
                    Self::from_path(&path)
                } else {
                    Err(PricingError::NoPricingFile {
                        searched: vec![local, path],
                    })
                }
            }
            None => {
                tracing::debug!("No price table on disk, using bundled prices");
                Self::bundled()
            }
        }
    }

    pub fn insert(&mut self, tier: &str, model: &str, prices: ModelPrices) {
        self.rows
            .insert((tier.to_string(), model.to_string()), prices);
    }

    pub fn prices(&self, model: &str, tier: &str) -> Option<&ModelPrices> {
        self.rows
            .get(&(normalize_tier(tier).to_string(), model.to_string()))
    }

    /// File the table was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl PriceLookup for PriceTable {
    fn lookup(
        &self,
        model: &str,
        tier: &str,
        token_type: TokenType,
    ) -> Result<Option<f64>, PricingError> {
        self.prices(model, tier)
            .map(|prices| prices.get(token_type))
            .ok_or_else(|| not_found(model, tier, token_type))
    }
}

fn not_found(model: &str, tier: &str, token_type: TokenType) -> PricingError {
    PricingError::NotFound {
        model: model.to_string(),
        tier: tier.to_string(),
        normalized_tier: normalize_tier(tier).to_string(),
        token_type,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cost
// ─────────────────────────────────────────────────────────────────────────────

/// Total USD cost of `usage`.
///
/// A missing cached-input price counts as zero. A missing input or output
/// price is [`PricingError::NotFound`].
pub fn total_cost(usage: &UsageStats, prices: &dyn PriceLookup) -> Result<f64, PricingError> {
    let mut cost = 0.0;
    for (key, counts) in usage.iter() {
        let priced = |token_type| -> Result<f64, PricingError> {
            prices
                .lookup(&key.model, &key.tier, token_type)?
                .ok_or_else(|| not_found(&key.model, &key.tier, token_type))
        };
        let input = priced(TokenType::Input)?;
        let output = priced(TokenType::Output)?;
        let cached = prices
            .lookup(&key.model, &key.tier, TokenType::InputCached)?
            .unwrap_or(0.0);

        cost += (counts.input as f64 * input
            + counts.input_cached as f64 * cached
            + counts.output as f64 * output)
            / TOKENS_PER_UNIT;
    }
    Ok(cost)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::TokenCounts;

    const PRICES: &str = "\
tier,model,input,input_cached,output
flex,gpt-5,0.625,0.0625,5.00
standard,gpt-5,1.25,0.125,10.00
batch,gpt-5-pro,7.50,,60.00
";

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_lookup_prices() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.lookup("gpt-5", "flex", TokenType::Input).unwrap(),
            Some(0.625)
        );
        assert_eq!(
            table.lookup("gpt-5", "flex", TokenType::InputCached).unwrap(),
            Some(0.0625)
        );
        assert_eq!(
            table.lookup("gpt-5", "flex", TokenType::Output).unwrap(),
            Some(5.0)
        );
    }

    #[test]
    fn test_default_tier_normalizes_to_standard() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        assert_eq!(
            table.lookup("gpt-5", "default", TokenType::Output).unwrap(),
            Some(10.0)
        );
        assert_eq!(normalize_tier("flex"), "flex");
    }

    #[test]
    fn test_blank_cell_is_absent_price() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        assert_eq!(
            table
                .lookup("gpt-5-pro", "batch", TokenType::InputCached)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_model_names_everything() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        let err = table
            .lookup("gpt-9", "default", TokenType::InputCached)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No pricing found for model: gpt-9, tier: default (normalized: standard), \
             token_type: input_cached"
        );
    }

    #[test]
    fn test_total_cost() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        let mut usage = UsageStats::new();
        usage.record(
            "gpt-5",
            "flex",
            TokenCounts {
                input: 1_000_000,
                input_cached: 1_000_000,
                output: 100_000,
                total: 2_100_000,
            },
        );
        usage.record(
            "gpt-5",
            "default",
            TokenCounts {
                input: 200_000,
                input_cached: 0,
                output: 0,
                total: 200_000,
            },
        );

        // flex: 0.625 + 0.0625 + 0.5; standard: 0.25
        let cost = total_cost(&usage, &table).unwrap();
        assert!(approx(cost, 1.4375), "cost was {cost}");
    }

    #[test]
    fn test_total_cost_treats_missing_cached_price_as_zero() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        let mut usage = UsageStats::new();
        usage.record(
            "gpt-5-pro",
            "batch",
            TokenCounts {
                input: 1_000_000,
                input_cached: 500_000,
                output: 0,
                total: 1_500_000,
            },
        );
        assert!(approx(total_cost(&usage, &table).unwrap(), 7.5));
    }

    #[test]
    fn test_total_cost_of_nothing_is_zero() {
        let table = PriceTable::new();
        assert_eq!(total_cost(&UsageStats::new(), &table).unwrap(), 0.0);
    }

    #[test]
    fn test_total_cost_unknown_model() {
        let table = PriceTable::from_csv_str(PRICES).unwrap();
        let mut usage = UsageStats::new();
        usage.record("mystery", "default", TokenCounts::default());
        assert!(matches!(
            total_cost(&usage, &table),
            Err(PricingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_discover_prefers_project_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_PRICING_PATH),
            "tier,model,input,input_cached,output\nstandard,local-model,1,,2\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("other.csv"), PRICES).unwrap();

        let table = PriceTable::discover_in(dir.path(), Some(Path::new("other.csv"))).unwrap();
        assert!(table.prices("local-model", "default").is_some());
        assert!(table.prices("gpt-5", "flex").is_none());
        assert_eq!(table.source(), Some(dir.path().join(DEFAULT_PRICING_PATH).as_path()));
    }

    #[test]
    fn test_discover_uses_configured_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("prices.csv"), PRICES).unwrap();

        let table = PriceTable::discover_in(dir.path(), Some(Path::new("prices.csv"))).unwrap();
        assert!(table.prices("gpt-5-pro", "batch").is_some());
    }

    #[test]
    fn test_discover_missing_configured_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = PriceTable::discover_in(dir.path(), Some(Path::new("nope.csv"))).unwrap_err();
        assert!(matches!(err, PricingError::NoPricingFile { .. }));
        assert!(err.to_string().starts_with("No pricing file found at"));
    }

    #[test]
    fn test_discover_falls_back_to_bundled() {
        let dir = tempfile::TempDir::new().unwrap();
        let table = PriceTable::discover_in(dir.path(), None).unwrap();
        assert!(table.source().is_none());
        assert_eq!(
            table.lookup("gpt-5", "flex", TokenType::Input).unwrap(),
            Some(0.625)
        );
        assert_eq!(
            table.lookup("gpt-5", "default", TokenType::InputCached).unwrap(),
            Some(0.125)
        );
    }

    #[test]
    fn test_malformed_price_is_read_error() {
        let err = PriceTable::from_csv_str("tier,model,input,input_cached,output\nstandard,x,abc,,1\n")
            .unwrap_err();
        assert!(matches!(err, PricingError::Read { .. }));
    }
}
