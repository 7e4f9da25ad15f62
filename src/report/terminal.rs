use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{Package, PackageStatus};

/// How many diagnostic log entries `-v` prints.
pub const MAX_ERRORS_SHOWN: usize = 10;

const STATUSES: [PackageStatus; 5] = [
    PackageStatus::Success,
    PackageStatus::NoCopyright,
    PackageStatus::NoLicense,
    PackageStatus::Unavailable,
    PackageStatus::Failed,
];

/// Print the run summary to stderr, keeping stdout free for the notices.
///
/// `verbose` adds a per-package table for everything that did not fully
/// succeed, and the first [`MAX_ERRORS_SHOWN`] diagnostic log entries.
pub fn render(packages: &[Package], errors: &[String], verbose: bool, quiet: bool) {
    let count = |status: PackageStatus| packages.iter().filter(|p| p.status == status).count();

    if quiet {
        eprintln!(
            "Total: {}  Success: {}  Incomplete: {}  Failed: {}",
            packages.len(),
            count(PackageStatus::Success).to_string().green(),
            (count(PackageStatus::NoCopyright) + count(PackageStatus::NoLicense))
                .to_string()
                .yellow(),
            (count(PackageStatus::Unavailable) + count(PackageStatus::Failed))
                .to_string()
                .red(),
        );
        return;
    }

    eprintln!("\n {} v{}", "purl-notices".bold(), env!("CARGO_PKG_VERSION"));
    eprintln!(" ┌────────────────────────────────────────────────────┐");
    eprintln!(" │  {:<48} │", "SUMMARY".bold());
    eprintln!(" │  {:<48} │", format!("Packages processed : {}", packages.len()));
    for status in STATUSES {
        let (mark, label) = status_mark(status);
        eprintln!(" │  {:<48} │", format!("{}  {:<16}: {:>4}", mark, label, count(status)));
    }
    eprintln!(" └────────────────────────────────────────────────────┘\n");

    let incomplete: Vec<&Package> = packages
        .iter()
        .filter(|p| p.status != PackageStatus::Success)
        .collect();
    if verbose && !incomplete.is_empty() {
        eprintln!(" {} Packages needing attention:\n", "[WARN]".yellow().bold());
        eprintln!("{}", status_table(&incomplete));
        eprintln!();
    }

    if verbose && !errors.is_empty() {
        eprintln!(" {} Errors encountered:", "[ERROR]".red().bold());
        for error in errors.iter().take(MAX_ERRORS_SHOWN) {
            eprintln!("  - {}", error);
        }
        if errors.len() > MAX_ERRORS_SHOWN {
            eprintln!("  ... and {} more", errors.len() - MAX_ERRORS_SHOWN);
        }
        eprintln!();
    }
}

fn status_mark(status: PackageStatus) -> (ColoredString, &'static str) {
    match status {
        PackageStatus::Success => ("✓".green(), "Success"),
        PackageStatus::NoCopyright => ("⚠".yellow(), "No copyright"),
        PackageStatus::NoLicense => ("⚠".yellow(), "No license"),
        PackageStatus::Unavailable => ("✗".red(), "Unavailable"),
        PackageStatus::Failed => ("✗".red(), "Failed"),
        PackageStatus::Pending => ("…".dimmed(), "Pending"),
    }
}

fn status_table(packages: &[&Package]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Licenses").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Detail").add_attribute(Attribute::Bold),
        ]);

    for package in packages {
        let status_color = match package.status {
            PackageStatus::Success => Color::Green,
            PackageStatus::NoCopyright | PackageStatus::NoLicense => Color::Yellow,
            PackageStatus::Unavailable | PackageStatus::Failed => Color::Red,
            PackageStatus::Pending => Color::DarkGrey,
        };
        let licenses = package.license_ids().join(", ");

        table.add_row(vec![
            Cell::new(package.purl.clone().unwrap_or_else(|| package.display_name())),
            Cell::new(if licenses.is_empty() { "-".to_string() } else { licenses }),
            Cell::new(package.status.to_string())
                .fg(status_color)
                .set_alignment(CellAlignment::Center),
            Cell::new(package.error_message.as_deref().unwrap_or("")),
        ]);
    }

    table
}
