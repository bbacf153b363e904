///
/// This module implements the CLI interface for func-publish: command parsing, argument
/// validation, the async entrypoint, and the user-visible progress messages.
///
/// All pipeline logic (file selection, packaging, settings reconciliation, upload) lives in
/// the [`func-publish-core`] crate. This module wires real HTTP clients and the terminal
/// prompt into it.
///
/// ## How To Use
/// - Command line: `func-publish publish <APP_NAME> [options]`, see `--help`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`func-publish-core`]: ../../func-publish-core/
use crate::arm::ArmClient;
use crate::blob::AzureBlobStore;
use crate::load_config::{load_config, DEFAULT_CONFIG_FILE};
use crate::prompt::TerminalPrompt;
use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use func_publish_core::archive::{find_project_root, list_files, ListError, ListMode};
use func_publish_core::config::PublishOptions;
use func_publish_core::ignore::{load_ignore_file, IgnoreFileError, IgnoreRuleSet};
use func_publish_core::publish::{PublishError, PublishStage, Publisher};
use func_publish_core::reconcile::{Reconciliation, Resolution};
use func_publish_core::settings::{read_local_settings, LOCAL_SETTINGS_FILE};
use std::path::{Path, PathBuf};

/// CLI for func-publish: package a Function App project and publish it to Azure.
#[derive(Debug, Parser)]
#[clap(
    name = "func-publish",
    version,
    about = "Publish a Function App project and its app settings to Azure"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish the project in the current (or given) directory to a Function App
    Publish(PublishArgs),
}

#[derive(Debug, Clone, Default, Args)]
#[clap(group(
    ArgGroup::new("settings_source")
        .args(["publish_local_settings", "publish_settings_only"])
))]
pub struct PublishArgs {
    /// Name of the target Function App
    pub app_name: String,

    /// Path to the YAML config file (defaults to func-publish.yaml in the project root)
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Directory to start looking for host.json from (defaults to the current directory)
    #[clap(long)]
    pub project_dir: Option<PathBuf>,

    /// Merge local.settings.json into the app settings while publishing
    #[clap(short = 'i', long)]
    pub publish_local_settings: bool,

    /// Only publish local.settings.json, skip packaging and upload
    #[clap(short = 'o', long)]
    pub publish_settings_only: bool,

    /// Overwrite differing app settings without asking
    #[clap(short = 'y', long, requires = "settings_source")]
    pub overwrite_settings: bool,

    /// List the files .funcignore excludes from publishing
    #[clap(
        long,
        conflicts_with_all = ["list_included_files", "publish_local_settings", "publish_settings_only"]
    )]
    pub list_ignored_files: bool,

    /// List the files that will be published
    #[clap(
        long,
        conflicts_with_all = ["publish_local_settings", "publish_settings_only"]
    )]
    pub list_included_files: bool,
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Publish(args) => publish(args).await,
    }
}

async fn publish(args: PublishArgs) -> Result<()> {
    let start = match &args.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let root = find_project_root(&start);
    tracing::info!(root = %root.display(), app = %args.app_name, "Resolved project root");

    let ignore_rules = ignore_rules(&root);

    if args.list_included_files || args.list_ignored_files {
        let mode = if args.list_included_files {
            ListMode::Included
        } else {
            ListMode::Ignored
        };
        return list(&root, ignore_rules.as_ref(), mode);
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));
    let config = load_config(&config_path)?;

    let mut options = PublishOptions::new(&root);
    options.ignore_rules = ignore_rules;
    options.publish_local_settings = args.publish_local_settings;
    options.overwrite_settings = args.overwrite_settings;
    if args.publish_local_settings || args.publish_settings_only {
        let local = read_local_settings(&root)
            .with_context(|| format!("Failed to read {LOCAL_SETTINGS_FILE}"))?;
        options.local_settings = Some(local);
    }
    options.trace_loaded();

    let remote = ArmClient::new(&config, &args.app_name);
    let store = AzureBlobStore::new();
    let publisher = Publisher::new(&remote, &store);
    let mut prompt = TerminalPrompt::stdio();

    if args.publish_settings_only {
        let report = publisher
            .publish_settings_only(&options, &mut prompt, &mut |stage| {
                if stage == PublishStage::Start {
                    println!("Getting site publishing info...");
                }
            })
            .await
            .map_err(report_failure)?;
        print_resolutions(&report.reconciliation);
        tracing::info!(command = "publish", "Settings published");
    } else {
        let report = publisher
            .publish(&options, &mut prompt, &mut print_stage)
            .await
            .map_err(report_failure)?;
        if let Some(reconciliation) = &report.reconciliation {
            print_resolutions(reconciliation);
        }
        tracing::info!(
            command = "publish",
            blob = %report.blob_name,
            entries = report.entries.len(),
            bytes = report.package_bytes,
            sha256 = %report.sha256,
            "Publish complete"
        );
    }
    Ok(())
}

fn ignore_rules(root: &Path) -> Option<IgnoreRuleSet> {
    match load_ignore_file(root) {
        Ok(rules) => Some(rules),
        Err(IgnoreFileError::NotFound) => {
            tracing::debug!("No ignore file, every file will be published");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unusable ignore file");
            None
        }
    }
}

fn list(root: &Path, rules: Option<&IgnoreRuleSet>, mode: ListMode) -> Result<()> {
    match list_files(root, rules, mode) {
        Ok(paths) => {
            for path in paths {
                println!("{path}");
            }
            Ok(())
        }
        Err(ListError::NoIgnoreFile) => {
            eprintln!("No .funcignore file");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Console lines for a publish stage. Upload success is only reported once the
/// settings pointing at the package have been persisted.
fn stage_messages(stage: PublishStage) -> &'static [&'static str] {
    match stage {
        PublishStage::Start => &["Preparing archive..."],
        PublishStage::Succeeded => &[
            "Uploading content...",
            "Upload completed successfully.",
            "Deployment completed successfully.",
        ],
        PublishStage::ArchiveBuilt
        | PublishStage::SettingsFetched
        | PublishStage::Uploaded
        | PublishStage::SettingsUpdateAttempted
        | PublishStage::Failed => &[],
    }
}

fn print_stage(stage: PublishStage) {
    for line in stage_messages(stage) {
        println!("{line}");
    }
}

fn print_resolutions(reconciliation: &Reconciliation) {
    for entry in &reconciliation.resolutions {
        match entry.resolution {
            Resolution::Added | Resolution::Unchanged => {
                println!("Setting {} = ****", entry.key);
            }
            Resolution::Overwritten { forced: true } => {
                println!(
                    "App setting {} is different between azure and {LOCAL_SETTINGS_FILE}",
                    entry.key
                );
                println!("Overwriting setting in azure with local value because '--overwrite-settings [-y]' was specified.");
            }
            Resolution::Overwritten { forced: false } | Resolution::Kept => {}
        }
    }
}

fn report_failure(err: PublishError) -> anyhow::Error {
    if let PublishError::UpdateSettings { source, .. } = &err {
        eprintln!("Error updating app settings:");
        eprintln!("{source}");
    }
    anyhow::Error::new(err)
}
