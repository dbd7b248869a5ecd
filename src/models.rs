use crate::allocator::Reconciliation;
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub data_file: Option<String>,
    pub data_url: Option<String>,
    pub output_directory: Option<String>,
    pub spending_file: Option<String>,
    // Placement constraints
    pub budget: f64,
    pub age_range: [u32; 2],
    pub income_range: [u64; 2],
    pub min_employed_percentage: f64,
    pub top_num: usize,
    // Allocation settings
    pub money_precision: u32,
    pub reconciliation: Reconciliation,
    pub cap_to_ad_cost: bool,
    pub ad_cost_overrides: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            data_file: Some("data/locations.csv".to_string()),
            data_url: None,
            output_directory: Some("output".to_string()),
            spending_file: None,
            budget: 10_000.0,
            age_range: [18, 65],
            income_range: [0, 250_000],
            min_employed_percentage: 0.0,
            top_num: 5,
            money_precision: 2,
            reconciliation: Reconciliation::LargestShare,
            cap_to_ad_cost: false,
            ad_cost_overrides: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", file_path))?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)
            .with_context(|| format!("Failed to write config file: {}", file_path))?;
        Ok(())
    }
}

/// How a location reports employment: an absolute head count or a share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Employment {
    Count(u64),
    Percentage(f64),
}

/// One city row after load-time validation. Never mutated once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub city: String,
    pub population: u64,
    pub employment: Employment,
    pub median_age: f64,
    pub median_income: f64,
    pub foot_traffic: f64,
    pub ad_cost: f64,
}

impl LocationRecord {
    /// Employed share of the population, 0..=100.
    pub fn employed_percentage(&self) -> f64 {
        match self.employment {
            Employment::Percentage(pct) => pct,
            Employment::Count(_) if self.population == 0 => 0.0,
            Employment::Count(count) => count as f64 / self.population as f64 * 100.0,
        }
    }
}

/// A source row that failed validation and was kept out of scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    pub line: u64,
    pub city: Option<String>,
    pub reason: String,
}

/// All records for one run, plus whatever the loader had to throw away.
#[derive(Debug, Clone, Default)]
pub struct LocationDataset {
    pub source: String,
    pub records: Vec<LocationRecord>,
    pub rejected: Vec<RejectedRow>,
}

impl LocationDataset {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Raw CSV row. Cells stay strings so that loosely formatted numbers
/// ("$1,200", "23.5%", "25-34") can be cleaned up before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationRow {
    pub city: Option<String>,
    pub population: Option<String>,
    pub employed_population: Option<String>,
    pub employed_percentage: Option<String>,
    pub median_age: Option<String>,
    pub median_income: Option<String>,
    pub foot_traffic: Option<String>,
    pub ad_cost: Option<String>,
}

impl LocationRow {
    pub fn city_name(&self) -> Option<String> {
        self.city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Validate the row and turn it into a record. The error is a
    /// human-readable reason for the rejection log.
    pub fn into_record(self) -> Result<LocationRecord, String> {
        let city = self.city_name().ok_or("missing city name")?;

        let population = required_number(&self.population, "population")?;
        if population <= 0.0 || population.fract() != 0.0 {
            return Err(format!("population must be a positive whole number, got {}", population));
        }
        let population = population as u64;

        let employment = match (
            non_empty(&self.employed_population),
            non_empty(&self.employed_percentage),
        ) {
            (Some(count), _) => {
                let count = parse_numeric_cell(count)
                    .ok_or_else(|| format!("employed_population is not a number: '{}'", count))?;
                if count < 0.0 || count.fract() != 0.0 {
                    return Err(format!("employed_population must be a whole number >= 0, got {}", count));
                }
                if count as u64 > population {
                    return Err(format!(
                        "employed_population {} exceeds population {}",
                        count, population
                    ));
                }
                Employment::Count(count as u64)
            }
            (None, Some(pct)) => {
                let pct = parse_numeric_cell(pct)
                    .ok_or_else(|| format!("employed_percentage is not a number: '{}'", pct))?;
                if !(0.0..=100.0).contains(&pct) {
                    return Err(format!("employed_percentage must be within [0, 100], got {}", pct));
                }
                Employment::Percentage(pct)
            }
            (None, None) => return Err("missing employed_population or employed_percentage".to_string()),
        };

        let age_cell = non_empty(&self.median_age).ok_or("missing median_age")?;
        let median_age = parse_age_cell(age_cell)
            .ok_or_else(|| format!("median_age is neither a number nor a bracket: '{}'", age_cell))?;

        let median_income = required_number(&self.median_income, "median_income")?;
        if median_income < 0.0 {
            return Err(format!("median_income must be >= 0, got {}", median_income));
        }

        let foot_traffic = required_number(&self.foot_traffic, "foot_traffic")?;
        if foot_traffic < 0.0 {
            return Err(format!("foot_traffic must be >= 0, got {}", foot_traffic));
        }

        let ad_cost = required_number(&self.ad_cost, "ad_cost")?;
        if ad_cost <= 0.0 {
            return Err(format!("ad_cost must be > 0, got {}", ad_cost));
        }

        Ok(LocationRecord {
            city,
            population,
            employment,
            median_age,
            median_income,
            foot_traffic,
            ad_cost,
        })
    }
}

/// Actual or simulated spend for one city.
#[derive(Debug, Clone, PartialEq)]
pub struct Expenditure {
    pub city: String,
    pub spent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpendingRow {
    pub city: String,
    pub spent: String,
}

static NUMERIC_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s$€£,%_]").expect("numeric noise pattern is valid"));

static AGE_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*(?:-|–|to)\s*(\d+(?:\.\d+)?)\s*$")
        .expect("age bracket pattern is valid")
});

static AGE_OPEN_ENDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*\+\s*$").expect("open age pattern is valid"));

/// Parse a number cell, ignoring currency symbols, thousands separators and
/// a trailing percent sign. Returns `None` for anything not finite.
pub fn parse_numeric_cell(cell: &str) -> Option<f64> {
    let cleaned = NUMERIC_NOISE.replace_all(cell, "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a median age: plain number, "25-34" bracket (midpoint) or "65+".
pub fn parse_age_cell(cell: &str) -> Option<f64> {
    if let Some(caps) = AGE_BRACKET.captures(cell) {
        let low = caps[1].parse::<f64>().ok()?;
        let high = caps[2].parse::<f64>().ok()?;
        if low > high {
            return None;
        }
        return Some((low + high) / 2.0);
    }
    if let Some(caps) = AGE_OPEN_ENDED.captures(cell) {
        return caps[1].parse::<f64>().ok();
    }
    parse_numeric_cell(cell).filter(|age| *age >= 0.0)
}

/// Normalize a CSV header: lowercase, trimmed, spaces and dashes folded to `_`.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

fn non_empty(cell: &Option<String>) -> Option<&str> {
    cell.as_deref().map(str::trim).filter(|c| !c.is_empty())
}

fn required_number(cell: &Option<String>, column: &str) -> Result<f64, String> {
    let raw = non_empty(cell).ok_or_else(|| format!("missing {}", column))?;
    parse_numeric_cell(raw).ok_or_else(|| format!("{} is not a number: '{}'", column, raw))
}
