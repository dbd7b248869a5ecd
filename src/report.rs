use crate::allocator::SpendingReport;
use crate::analyzer::PlacementPlan;
use crate::models::LocationDataset;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::Path;

const CHART_WIDTH: usize = 40;

const REPORT_FILES: [&str; 4] = [
    "rankings.csv",
    "allocation.csv",
    "spending.csv",
    "placement_summary.txt",
];

/// Remove report files left by a previous run.
pub fn clean_output_directory(output_dir: &str) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    for item in &REPORT_FILES {
        let item_path = output_path.join(item);
        if item_path.is_file() {
            fs::remove_file(&item_path)
                .with_context(|| format!("Failed to remove {}", item_path.display()))?;
            log::debug!("Removed previous report: {}", item);
        }
    }

    Ok(())
}

pub fn write_rankings_csv(plan: &PlacementPlan, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join("rankings.csv");
    let mut writer = Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;

    writer.write_record([
        "Rank",
        "City",
        "Audience Reach",
        "Ad Cost",
        "Cost Efficiency Score",
        "Allocated Budget",
    ])?;

    let decimals = plan.allocation.precision().decimals() as usize;
    for row in &plan.rows {
        writer.write_record(&[
            row.rank.to_string(),
            row.city.clone(),
            format!("{:.0}", row.audience_reach),
            format!("{:.2}", row.ad_cost),
            format!("{:.6}", row.cost_efficiency_score),
            format!("{:.*}", decimals, row.allocated_budget),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_allocation_csv(plan: &PlacementPlan, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join("allocation.csv");
    let mut writer = Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;

    let allocation = &plan.allocation;
    let decimals = allocation.precision().decimals() as usize;

    writer.write_record(["City", "Allocated Budget", "Share (%)", "Capped"])?;
    for entry in allocation.entries() {
        let share = entry.units() as f64 / allocation.total_units() as f64 * 100.0;
        writer.write_record(&[
            entry.city.clone(),
            format!("{:.*}", decimals, entry.amount),
            format!("{:.2}", share),
            if entry.capped { "yes" } else { "no" }.to_string(),
        ])?;
    }
    if allocation.unallocated_units() > 0 {
        writer.write_record(&[
            "(unallocated)".to_string(),
            format!("{:.*}", decimals, allocation.unallocated()),
            format!(
                "{:.2}",
                allocation.unallocated_units() as f64 / allocation.total_units() as f64 * 100.0
            ),
            String::new(),
        ])?;
    }
    writer.write_record(&[
        "TOTAL".to_string(),
        format!("{:.*}", decimals, allocation.total_budget()),
        "100.00".to_string(),
        String::new(),
    ])?;

    writer.flush()?;
    Ok(())
}

pub fn write_spending_csv(report: &SpendingReport, output_dir: &str) -> Result<()> {
    let csv_path = Path::new(output_dir).join("spending.csv");
    let mut writer = Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;

    let decimals = report.precision.decimals() as usize;
    let money = |amount: f64| format!("{:.*}", decimals, amount);

    writer.write_record(["City", "Allocated", "Spent", "Remaining"])?;
    for location in &report.locations {
        writer.write_record(&[
            location.city.clone(),
            money(location.allocated),
            money(location.spent),
            money(location.delta),
        ])?;
    }
    for expenditure in &report.untracked {
        writer.write_record(&[
            format!("{} (not allocated)", expenditure.city),
            money(0.0),
            money(expenditure.spent),
            money(-expenditure.spent),
        ])?;
    }
    writer.write_record(&[
        "TOTAL".to_string(),
        money(report.total_allocated),
        money(report.total_spent),
        money(report.total_delta),
    ])?;

    writer.flush()?;
    Ok(())
}

/// Plain-text summary of the run, written next to the CSV files.
pub fn write_summary_report(plan: &PlacementPlan, dataset: &LocationDataset, output_dir: &str) -> Result<()> {
    let mut content = String::new();
    content.push_str("Ad Placement Analysis\n");
    content.push_str("=====================\n\n");
    content.push_str(&format!(
        "Data source: {}\n\
        Locations loaded: {}\n\
        Rows rejected: {}\n\
        Locations matching constraints: {}\n\
        Locations ranked: {}\n\
        Total budget: {:.2}\n\n",
        dataset.source,
        dataset.records.len(),
        dataset.rejected.len(),
        plan.matched_locations,
        plan.rows.len(),
        plan.allocation.total_budget(),
    ));

    for row in &plan.rows {
        content.push_str(&format!(
            "{}. {}\n\
            Audience reach: {:.0}\n\
            Ad cost: {:.2}\n\
            Cost efficiency: {:.4}\n\
            Allocated budget: {:.2}{}\n\n",
            row.rank,
            row.city,
            row.audience_reach,
            row.ad_cost,
            row.cost_efficiency_score,
            row.allocated_budget,
            if row.capped { " (capped at ad cost)" } else { "" },
        ));
    }

    content.push_str("Allocation chart\n");
    content.push_str(&render_bar_chart(plan));

    fs::write(Path::new(output_dir).join("placement_summary.txt"), content)?;
    Ok(())
}

/// Horizontal bar chart of allocated budget per city.
pub fn render_bar_chart(plan: &PlacementPlan) -> String {
    let label_width = plan.rows.iter().map(|row| row.city.chars().count()).max().unwrap_or(0);
    let largest = plan
        .rows
        .iter()
        .map(|row| row.allocated_budget)
        .fold(0.0_f64, f64::max);

    let mut chart = String::new();
    for row in &plan.rows {
        let bar_len = if largest > 0.0 {
            (row.allocated_budget / largest * CHART_WIDTH as f64).round() as usize
        } else {
            0
        };
        chart.push_str(&format!(
            "{:<width$} | {} {:.2}\n",
            row.city,
            "█".repeat(bar_len),
            row.allocated_budget,
            width = label_width
        ));
    }
    chart
}

pub fn print_summary(plan: &PlacementPlan, dataset: &LocationDataset) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    println!(
        "📂 {} location(s) loaded, {} matched the constraints, {} ranked",
        dataset.records.len(),
        plan.matched_locations,
        plan.rows.len()
    );
    if !dataset.rejected.is_empty() {
        println!("   ⚠️  {} row(s) rejected while loading (run with RUST_LOG=warn for details)", dataset.rejected.len());
    }

    println!("\n🏆 Top locations by cost efficiency:");
    for row in &plan.rows {
        println!(
            "   {}. {} - reach {:.0}, cost {:.2}, efficiency {:.4} → {:.2}{}",
            row.rank,
            row.city,
            row.audience_reach,
            row.ad_cost,
            row.cost_efficiency_score,
            row.allocated_budget,
            if row.capped { " (capped)" } else { "" }
        );
    }

    println!("\n💰 Budget allocation:");
    for line in render_bar_chart(plan).lines() {
        println!("   {}", line);
    }
    println!(
        "\n   Allocated {:.2} of {:.2}",
        plan.allocation.allocated_total(),
        plan.allocation.total_budget()
    );
    if plan.allocation.unallocated_units() > 0 {
        println!(
            "   ⚠️  {:.2} left unallocated: every location is at its ad cost",
            plan.allocation.unallocated()
        );
    }
}

pub fn print_spending(report: &SpendingReport) {
    let decimals = report.precision.decimals() as usize;

    println!("\n🧾 Spending vs allocation:");
    for location in &report.locations {
        let marker = if location.delta < 0.0 { "❌" } else { "✅" };
        println!(
            "   {} {} - allocated {:.*}, spent {:.*}, remaining {:.*}",
            marker,
            location.city,
            decimals,
            location.allocated,
            decimals,
            location.spent,
            decimals,
            location.delta
        );
    }
    for expenditure in &report.untracked {
        println!(
            "   ❓ {} - spent {:.*} without an allocation",
            expenditure.city, decimals, expenditure.spent
        );
    }
    println!(
        "   Total: allocated {:.*}, spent {:.*}, remaining {:.*}",
        decimals, report.total_allocated, decimals, report.total_spent, decimals, report.total_delta
    );
}
