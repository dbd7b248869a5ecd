mod allocator;
mod analyzer;
mod error;
mod filter;
mod loader;
mod models;
mod ranker;
mod report;

use allocator::{BudgetAllocator, MoneyPrecision, Reconciliation};
use analyzer::{PlacementAnalyzer, PlacementOutcome, PlacementRequest};
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use filter::DemographicConstraints;
use loader::LocationLoader;
use models::{Config, DataSourceMode};
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

fn cli() -> Command {
    Command::new("ad-placement-analyzer")
        .version("1.0")
        .about("Ranks city ad placements by cost efficiency and splits a budget across the best ones")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_FILE),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .value_name("FILE")
                .help("Location CSV file (switches to local mode)")
                .conflicts_with("url"),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .value_name("URL")
                .help("Location CSV URL (switches to internet mode)"),
        )
        .arg(
            Arg::new("budget")
                .short('b')
                .long("budget")
                .value_name("AMOUNT")
                .help("Total budget to allocate")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("age-range")
                .long("age-range")
                .value_names(["MIN", "MAX"])
                .num_args(2)
                .help("Inclusive median age range")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("income-range")
                .long("income-range")
                .value_names(["MIN", "MAX"])
                .num_args(2)
                .help("Inclusive median income range")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("min-employed")
                .long("min-employed")
                .value_name("PERCENT")
                .help("Minimum employed percentage (0-100)")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("top")
                .short('n')
                .long("top")
                .value_name("COUNT")
                .help("Number of top locations to fund")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("precision")
                .long("precision")
                .value_name("DIGITS")
                .help("Decimal places money is rounded to")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("reconciliation")
                .long("reconciliation")
                .value_name("STRATEGY")
                .help("Where rounding leftovers go")
                .value_parser(["largest-share", "largest-remainder"]),
        )
        .arg(
            Arg::new("cap-to-ad-cost")
                .long("cap-to-ad-cost")
                .help("Never allocate more to a location than its ad cost")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("spending")
                .long("spending")
                .value_name("FILE")
                .help("CSV of actual spend (city,spent) to compare against the allocation"),
        )
        .arg(
            Arg::new("ad-cost")
                .long("ad-cost")
                .value_name("CITY=AMOUNT")
                .help("Use a different ad cost for one city (repeatable)")
                .action(ArgAction::Append)
                .value_parser(parse_ad_cost_override),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Output directory for reports"),
        )
}

fn parse_ad_cost_override(value: &str) -> Result<(String, f64), String> {
    let (city, amount) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CITY=AMOUNT, got '{}'", value))?;
    let city = city.trim();
    if city.is_empty() {
        return Err(format!("missing city in '{}'", value));
    }
    let amount = models::parse_numeric_cell(amount)
        .ok_or_else(|| format!("'{}' is not a valid amount", amount.trim()))?;
    Ok((city.to_string(), amount))
}

/// Command-line values win over the config file.
fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(data) = matches.get_one::<String>("data") {
        config.data_source_mode = DataSourceMode::Local;
        config.data_file = Some(data.clone());
    }
    if let Some(url) = matches.get_one::<String>("url") {
        config.data_source_mode = DataSourceMode::Internet;
        config.data_url = Some(url.clone());
    }
    if let Some(budget) = matches.get_one::<f64>("budget") {
        config.budget = *budget;
    }
    if let Some(mut ages) = matches.get_many::<u32>("age-range") {
        if let (Some(min), Some(max)) = (ages.next(), ages.next()) {
            config.age_range = [*min, *max];
        }
    }
    if let Some(mut incomes) = matches.get_many::<u64>("income-range") {
        if let (Some(min), Some(max)) = (incomes.next(), incomes.next()) {
            config.income_range = [*min, *max];
        }
    }
    if let Some(pct) = matches.get_one::<f64>("min-employed") {
        config.min_employed_percentage = *pct;
    }
    if let Some(top) = matches.get_one::<usize>("top") {
        config.top_num = *top;
    }
    if let Some(precision) = matches.get_one::<u32>("precision") {
        config.money_precision = *precision;
    }
    if let Some(strategy) = matches.get_one::<String>("reconciliation") {
        config.reconciliation = match strategy.as_str() {
            "largest-remainder" => Reconciliation::LargestRemainder,
            _ => Reconciliation::LargestShare,
        };
    }
    if matches.get_flag("cap-to-ad-cost") {
        config.cap_to_ad_cost = true;
    }
    if let Some(spending) = matches.get_one::<String>("spending") {
        config.spending_file = Some(spending.clone());
    }
    if let Some(overrides) = matches.get_many::<(String, f64)>("ad-cost") {
        for (city, amount) in overrides {
            config.ad_cost_overrides.insert(city.clone(), *amount);
        }
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_directory = Some(output.clone());
    }
}

fn build_request(config: &Config) -> Result<PlacementRequest> {
    let constraints = DemographicConstraints::new(
        (config.age_range[0] as f64, config.age_range[1] as f64),
        (config.income_range[0] as f64, config.income_range[1] as f64),
        config.min_employed_percentage,
    )?;

    let request = PlacementRequest {
        constraints,
        budget: config.budget,
        top_num: config.top_num,
        precision: MoneyPrecision::new(config.money_precision)?,
        reconciliation: config.reconciliation,
        cap_to_ad_cost: config.cap_to_ad_cost,
        ad_cost_overrides: config.ad_cost_overrides.clone(),
    };
    request.validate()?;
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();

    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_FILE);

    // Load or create configuration
    let mut config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        default_config
    };
    apply_overrides(&mut config, &matches);

    let request = build_request(&config).context("Invalid placement settings")?;
    let output_dir = config.output_directory.as_deref().unwrap_or("output");

    println!("💰 Budget: {:.2}", config.budget);
    println!(
        "🎯 Age {}-{}, income {}-{}, at least {}% employed, top {}",
        config.age_range[0],
        config.age_range[1],
        config.income_range[0],
        config.income_range[1],
        config.min_employed_percentage,
        config.top_num
    );
    if !config.ad_cost_overrides.is_empty() {
        println!("✏️  Ad cost overrides for: {}", config.ad_cost_overrides.keys().cloned().collect::<Vec<_>>().join(", "));
    }

    let loader = LocationLoader::new();
    let dataset = loader.load(&config).await?;
    println!("📄 Loaded {} location(s) from {}", dataset.records.len(), dataset.source);

    if dataset.is_empty() {
        println!("❌ No valid locations found in {}", dataset.source);
        return Ok(());
    }

    let plan = match PlacementAnalyzer::new(&dataset).analyze(&request)? {
        PlacementOutcome::Ranked(plan) => plan,
        PlacementOutcome::NoMatches => {
            println!("❌ No locations match your criteria. Try relaxing the age, income or employment constraints.");
            return Ok(());
        }
    };

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;
    report::clean_output_directory(output_dir)?;

    report::write_rankings_csv(&plan, output_dir)?;
    report::write_allocation_csv(&plan, output_dir)?;
    report::write_summary_report(&plan, &dataset, output_dir)?;
    report::print_summary(&plan, &dataset);
    if !plan.unmatched_overrides.is_empty() {
        println!(
            "   ⚠️  Ad cost override(s) matched no city: {}",
            plan.unmatched_overrides.join(", ")
        );
    }

    if let Some(spending_file) = config.spending_file.as_deref() {
        let spending = loader.load_spending_file(spending_file)?;
        let spending_report = BudgetAllocator::new(request.precision, request.reconciliation)
            .track_spending(&plan.allocation, &spending)
            .with_context(|| format!("Failed to compare spending from {}", spending_file))?;
        report::write_spending_csv(&spending_report, output_dir)?;
        report::print_spending(&spending_report);
    }

    println!("\n✅ Analysis complete! Reports written to: {}", output_dir);
    Ok(())
}
