//! Console rendering of comparison and migration results.

use colored::*;
use regmigrate_core::{ComparisonResult, MigrationOutcome, MissingIn, ValidationGap};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct CollisionRow {
    #[tabled(rename = "ID")]
    id: i32,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Conflicts with")]
    conflicting: String,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        return;
    }
    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    println!("{}", table);
}

pub fn print_comparison(result: &ComparisonResult) {
    println!("{}", "Registry comparison".bold());
    println!("  Subjects only in source:      {}", result.source_only_subjects.len());
    println!("  Subjects only in destination: {}", result.dest_only_subjects.len());
    println!("  Subjects in both:             {}", result.common_subjects.len());

    let missing: Vec<VersionRow> = result
        .version_differences
        .iter()
        .filter(|d| d.missing_in == MissingIn::Dest)
        .map(|d| VersionRow {
            subject: d.subject.clone(),
            version: d.version.to_string(),
            detail: "missing in destination".to_string(),
        })
        .collect();
    if missing.is_empty() {
        println!("{}", "Destination has every source version".green());
    } else {
        println!("\n{} version(s) to migrate:", missing.len().to_string().yellow());
        print_table(missing);
    }

    if !result.schema_differences.is_empty() {
        println!(
            "\n{} version(s) with different payloads:",
            result.schema_differences.len().to_string().red()
        );
        print_table(
            result
                .schema_differences
                .iter()
                .map(|d| VersionRow {
                    subject: d.subject.clone(),
                    version: d.version.to_string(),
                    detail: format!("source id {} vs dest id {}", d.source_id, d.dest_id),
                })
                .collect(),
        );
    }

    if !result.id_differences.is_empty() {
        println!(
            "\n{} identical version(s) carry different ids",
            result.id_differences.len()
        );
    }

    if result.has_collisions() {
        println!("\n{}", "ID collisions (block id-preserving migration):".red().bold());
        print_table(
            result
                .collisions
                .iter()
                .map(|c| CollisionRow {
                    id: c.id,
                    source: format!("{} v{}", c.subject, c.version),
                    conflicting: format!("{} v{}", c.conflicting_subject, c.conflicting_version),
                })
                .collect(),
        );
    }
}

pub fn print_outcome(outcome: &MigrationOutcome, dry_run: bool) {
    let verb = if dry_run { "would migrate" } else { "migrated" };
    println!(
        "\n{}: {} {}, {} failed, {} skipped",
        "Migration summary".bold(),
        outcome.successful.len().to_string().green(),
        verb,
        outcome.failed.len().to_string().red(),
        outcome.skipped.len()
    );

    print_table(
        outcome
            .successful
            .iter()
            .map(|s| VersionRow {
                subject: s.subject.clone(),
                version: s.version.to_string(),
                detail: match (&s.new_id, &s.note) {
                    (Some(id), Some(note)) => format!("id {} ({})", id, note),
                    (Some(id), None) => format!("id {}", id),
                    (None, Some(note)) => note.clone(),
                    (None, None) => String::new(),
                },
            })
            .collect(),
    );

    if !outcome.failed.is_empty() {
        println!("\n{}", "Failed:".red().bold());
        print_table(
            outcome
                .failed
                .iter()
                .map(|f| VersionRow {
                    subject: f.subject.clone(),
                    version: f.version.to_string(),
                    detail: f.reason.clone(),
                })
                .collect(),
        );
    }
}

pub fn print_validation(gaps: &[ValidationGap]) {
    if gaps.is_empty() {
        println!("{}", "Validation passed: destination covers the source".green());
        return;
    }
    println!("{}", "Validation found gaps:".red().bold());
    print_table(
        gaps.iter()
            .map(|g| VersionRow {
                subject: g.subject.clone(),
                version: g.version.map_or_else(|| "-".to_string(), |v| v.to_string()),
                detail: g.reason.clone(),
            })
            .collect(),
    );
}
