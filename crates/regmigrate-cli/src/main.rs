//! regmigrate: one-directional schema registry migration.
//!
//! Reads every subject and version from a source registry and replays what
//! the destination is missing, optionally preserving numeric schema ids.
//! Connection settings come from flags or the environment
//! (`SOURCE_SCHEMA_REGISTRY_URL`, `DEST_SCHEMA_REGISTRY_URL`, credentials,
//! contexts); behavior toggles (`DRY_RUN`, `PRESERVE_IDS`, ...) back the
//! `migrate` subcommand flags.
//!
//! Exit code is 0 on full success and 1 when id collisions block the run or
//! any version could not be migrated.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use regmigrate_core::{
    apply_post_migration_mode, cleanup_destination, compare, read_all, validate,
    HttpRegistryClient, MigrationEngine, MigrationOptions, RegistryMode, RetryOrchestrator,
    SchemaRegistry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod report;

#[derive(Parser)]
#[command(name = "regmigrate")]
#[command(about = "Migrate schemas between schema registries", long_about = None)]
struct Cli {
    /// Source registry URL
    #[arg(long, env = "SOURCE_SCHEMA_REGISTRY_URL")]
    source_url: String,

    #[arg(long, env = "SOURCE_USERNAME")]
    source_username: Option<String>,

    #[arg(long, env = "SOURCE_PASSWORD", hide_env_values = true)]
    source_password: Option<String>,

    /// Source registry context name
    #[arg(long, env = "SOURCE_CONTEXT")]
    source_context: Option<String>,

    /// Destination registry URL
    #[arg(long, env = "DEST_SCHEMA_REGISTRY_URL")]
    dest_url: String,

    #[arg(long, env = "DEST_USERNAME")]
    dest_username: Option<String>,

    #[arg(long, env = "DEST_PASSWORD", hide_env_values = true)]
    dest_password: Option<String>,

    /// Destination registry context name
    #[arg(long, env = "DEST_CONTEXT")]
    dest_context: Option<String>,

    /// Attach the import-mode marker header to destination writes
    #[arg(long, env = "DEST_IMPORT_MODE")]
    dest_import_mode: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff the two registries without writing anything
    Compare,

    /// Replay missing source versions into the destination
    Migrate {
        /// Report what would happen without writing
        #[arg(long, env = "DRY_RUN")]
        dry_run: bool,

        /// Keep source schema ids via IMPORT mode
        #[arg(long, env = "PRESERVE_IDS")]
        preserve_ids: bool,

        /// Delete every destination subject before migrating
        #[arg(long, env = "CLEANUP_DESTINATION")]
        cleanup_destination: bool,

        /// Make cleanup deletions permanent so ids can be reused
        #[arg(long, env = "PERMANENT_DELETE")]
        permanent_delete: bool,

        /// Retry failed versions with compatibility checks disabled
        #[arg(long, env = "RETRY_FAILED")]
        retry_failed: bool,

        /// On compatibility rejection, disable checks, replay, and restore
        #[arg(long, env = "AUTO_HANDLE_COMPATIBILITY")]
        auto_handle_compatibility: bool,

        /// Global mode to set on the destination after a non-dry run
        #[arg(long, env = "DEST_MODE_AFTER_MIGRATION")]
        dest_mode_after: Option<RegistryMode>,
    },

    /// Inspect and repair destination subject write modes
    Modes {
        #[command(subcommand)]
        command: ModeCommands,
    },
}

#[derive(Subcommand)]
enum ModeCommands {
    /// List subjects whose mode differs from the global one
    List,
    /// Set one subject back to READWRITE
    Fix { subject: String },
    /// Set every READONLY subject back to READWRITE
    FixAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let source = HttpRegistryClient::new(
        &cli.source_url,
        cli.source_username.clone(),
        cli.source_password.clone(),
        cli.source_context.clone(),
        false,
    )
    .context("invalid source registry configuration")?;
    let dest = HttpRegistryClient::new(
        &cli.dest_url,
        cli.dest_username.clone(),
        cli.dest_password.clone(),
        cli.dest_context.clone(),
        cli.dest_import_mode,
    )
    .context("invalid destination registry configuration")?;

    info!(
        source = %cli.source_url,
        dest = %cli.dest_url,
        import_header = cli.dest_import_mode,
        "registry clients ready"
    );

    match cli.command {
        Commands::Compare => run_compare(&source, &dest).await,
        Commands::Migrate {
            dry_run,
            preserve_ids,
            cleanup_destination: cleanup,
            permanent_delete,
            retry_failed,
            auto_handle_compatibility,
            dest_mode_after,
        } => {
            run_migrate(
                &source,
                &dest,
                MigrationOptions {
                    dry_run,
                    preserve_ids,
                    auto_handle_compatibility,
                },
                cleanup,
                permanent_delete,
                retry_failed,
                dest_mode_after,
            )
            .await
        }
        Commands::Modes { command } => run_modes(&dest, command).await,
    }
}

async fn run_compare(source: &dyn SchemaRegistry, dest: &dyn SchemaRegistry) -> Result<()> {
    let source_snap = read_all(source, "source")
        .await
        .context("failed to read source registry")?;
    let dest_snap = read_all(dest, "dest")
        .await
        .context("failed to read destination registry")?;
    report::print_comparison(&compare(&source_snap, &dest_snap));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_migrate(
    source: &dyn SchemaRegistry,
    dest: &dyn SchemaRegistry,
    options: MigrationOptions,
    cleanup: bool,
    permanent_delete: bool,
    retry_failed: bool,
    dest_mode_after: Option<RegistryMode>,
) -> Result<()> {
    let source_snap = read_all(source, "source")
        .await
        .context("failed to read source registry")?;
    let mut dest_snap = read_all(dest, "dest")
        .await
        .context("failed to read destination registry")?;

    let comparison = compare(&source_snap, &dest_snap);
    report::print_comparison(&comparison);

    if comparison.has_collisions() && !cleanup {
        bail!(
            "{} id collision(s) detected; rerun with --cleanup-destination \
             or resolve them manually",
            comparison.collisions.len()
        );
    }

    if cleanup {
        let deleted = cleanup_destination(dest, permanent_delete)
            .await
            .context("destination cleanup failed")?;
        println!("Deleted {} destination subject(s)", deleted);
        dest_snap = read_all(dest, "dest")
            .await
            .context("failed to re-read destination registry")?;
    }

    let engine = MigrationEngine::new(options);
    let mut outcome = engine
        .migrate(&source_snap, &dest_snap, dest)
        .await
        .context("migration aborted")?;

    if retry_failed && !options.dry_run && !outcome.failed.is_empty() {
        println!(
            "\nRetrying {} failed version(s) with compatibility disabled",
            outcome.failed.len()
        );
        let retry = RetryOrchestrator::new(options.preserve_ids)
            .retry(source, dest, &outcome.failed)
            .await
            .context("retry pass aborted")?;
        outcome.absorb_retry(retry);
    }

    report::print_outcome(&outcome, options.dry_run);

    if !options.dry_run {
        let expect_ids = options.preserve_ids && !id_preservation_degraded(&outcome);
        let gaps = validate(source, dest, expect_ids)
            .await
            .context("validation pass failed")?;
        report::print_validation(&gaps);

        if let Some(mode) = dest_mode_after {
            apply_post_migration_mode(dest, mode)
                .await
                .context("failed to set destination mode")?;
            println!("Destination global mode set to {}", mode);
        }
    }

    if !outcome.is_clean() {
        bail!("{} version(s) failed to migrate", outcome.failed.len());
    }
    Ok(())
}

/// Id preservation is only validated strictly when every success actually
/// kept its id; fallbacks (IMPORT refused, registry-assigned ids) are
/// reported in notes instead of failing validation.
fn id_preservation_degraded(outcome: &regmigrate_core::MigrationOutcome) -> bool {
    outcome
        .successful
        .iter()
        .any(|s| s.note.as_deref().is_some_and(|n| n.contains("id preservation skipped")))
}

async fn run_modes(dest: &dyn SchemaRegistry, command: ModeCommands) -> Result<()> {
    match command {
        ModeCommands::List => {
            let global = dest.get_global_mode().await?;
            println!("Global mode: {}", global);
            let mut overridden = 0;
            for subject in dest.list_subjects().await? {
                let mode = dest.get_subject_mode(&subject).await?;
                if mode != global {
                    println!("  {} {}", subject, mode.to_string().yellow());
                    overridden += 1;
                }
            }
            if overridden == 0 {
                println!("{}", "No subject-level overrides".green());
            }
        }
        ModeCommands::Fix { subject } => {
            dest.set_subject_mode(&subject, RegistryMode::Readwrite)
                .await
                .with_context(|| format!("failed to set mode for {subject}"))?;
            println!("{} set to READWRITE", subject);
        }
        ModeCommands::FixAll => {
            let mut fixed = 0;
            for subject in dest.list_subjects().await? {
                if dest.get_subject_mode(&subject).await? == RegistryMode::Readonly {
                    dest.set_subject_mode(&subject, RegistryMode::Readwrite)
                        .await
                        .with_context(|| format!("failed to set mode for {subject}"))?;
                    println!("{} set to READWRITE", subject);
                    fixed += 1;
                }
            }
            println!("Fixed {} subject(s)", fixed);
        }
    }
    Ok(())
}
