use crate::models::{
    normalize_header, parse_numeric_cell, Config, DataSourceMode, Expenditure, LocationDataset,
    LocationRow, RejectedRow, SpendingRow,
};
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;

const REQUIRED_COLUMNS: [&str; 6] = [
    "city",
    "population",
    "median_age",
    "median_income",
    "foot_traffic",
    "ad_cost",
];

const EMPLOYMENT_COLUMNS: [&str; 2] = ["employed_population", "employed_percentage"];

pub struct LocationLoader {
    client: reqwest::Client,
}

impl LocationLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Load the dataset from wherever the config points.
    pub async fn load(&self, config: &Config) -> Result<LocationDataset> {
        match config.data_source_mode {
            DataSourceMode::Local => {
                let path = config
                    .data_file
                    .as_deref()
                    .context("data_source_mode is 'local' but no data_file is set")?;
                self.load_file(path)
            }
            DataSourceMode::Internet => {
                let url = config
                    .data_url
                    .as_deref()
                    .context("data_source_mode is 'internet' but no data_url is set")?;
                self.load_url(url).await
            }
        }
    }

    pub fn load_file(&self, file_path: &str) -> Result<LocationDataset> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read file: {}", file_path))?;

        parse_csv_content(&content, file_path)
    }

    pub async fn load_url(&self, url: &str) -> Result<LocationDataset> {
        log::info!("Fetching location data from: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url))?;

        if !response.status().is_success() {
            bail!("HTTP request failed with status: {}", response.status());
        }

        let content = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {}", url))?;

        parse_csv_content(&content, url)
    }

    pub fn load_spending_file(&self, file_path: &str) -> Result<Vec<Expenditure>> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read spending file: {}", file_path))?;

        parse_spending_content(&content, file_path)
    }
}

/// Parse a location CSV. Rows that fail validation are logged and kept in
/// `rejected`; a malformed file (missing columns, broken CSV) is an error.
pub fn parse_csv_content(content: &str, source: &str) -> Result<LocationDataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = normalized_headers(&mut reader, source)?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        bail!("{} is missing required column(s): {}", source, missing.join(", "));
    }
    if !EMPLOYMENT_COLUMNS.iter().any(|column| headers.iter().any(|h| h == *column)) {
        bail!("{} needs an employed_population or employed_percentage column", source);
    }

    let mut dataset = LocationDataset {
        source: source.to_string(),
        ..LocationDataset::default()
    };
    let mut seen_cities = HashSet::new();

    for result in reader.records() {
        let record = result.with_context(|| format!("Malformed CSV in {}", source))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let row: LocationRow = match record.deserialize(Some(&headers)) {
            Ok(row) => row,
            Err(e) => {
                reject(&mut dataset, line, None, e.to_string());
                continue;
            }
        };

        let city = row.city_name();
        match row.into_record() {
            Ok(location) => {
                if seen_cities.insert(location.city.to_lowercase()) {
                    dataset.records.push(location);
                } else {
                    reject(&mut dataset, line, city, "duplicate city, keeping the first row".to_string());
                }
            }
            Err(reason) => reject(&mut dataset, line, city, reason),
        }
    }

    log::info!(
        "Loaded {} location(s) from {} ({} rejected)",
        dataset.records.len(),
        source,
        dataset.rejected.len()
    );

    Ok(dataset)
}

/// Parse a `city,spent` CSV. Unlike the location file, a bad row here is an
/// error: spend figures are not something to silently drop.
pub fn parse_spending_content(content: &str, source: &str) -> Result<Vec<Expenditure>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = normalized_headers(&mut reader, source)?;
    for column in ["city", "spent"] {
        if !headers.iter().any(|h| h == column) {
            bail!("{} is missing required column: {}", source, column);
        }
    }

    let mut expenditures = Vec::new();
    for result in reader.records() {
        let record = result.with_context(|| format!("Malformed CSV in {}", source))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: SpendingRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("{} line {}: unreadable row", source, line))?;

        let spent = parse_numeric_cell(&row.spent)
            .with_context(|| format!("{} line {}: spent is not a number: '{}'", source, line, row.spent))?;
        if spent < 0.0 {
            bail!("{} line {}: spent must be >= 0, got {}", source, line, spent);
        }

        expenditures.push(Expenditure {
            city: row.city,
            spent,
        });
    }

    Ok(expenditures)
}

fn normalized_headers(reader: &mut csv::Reader<&[u8]>, source: &str) -> Result<csv::StringRecord> {
    let headers: csv::StringRecord = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header from {}", source))?
        .iter()
        .map(normalize_header)
        .collect();
    reader.set_headers(headers.clone());
    Ok(headers)
}

fn reject(dataset: &mut LocationDataset, line: u64, city: Option<String>, reason: String) {
    log::warn!(
        "Skipping {} line {} ({}): {}",
        dataset.source,
        line,
        city.as_deref().unwrap_or("unknown city"),
        reason
    );
    dataset.rejected.push(RejectedRow { line, city, reason });
}
