//! Inspect a module manifest
//!
//! Prints the activation plan (INIT order, NORMAL levels, exclusions) a manifest
//! produces under given feature flags and permissions, or validates it.
//!
//! # Usage
//!
//! ```bash
//! # Plan with two flags enabled
//! mfe-plan plan modules.json --flag beta --flag reports
//!
//! # Flags and permissions from an orchestrator config, JSON output
//! mfe-plan plan modules.json --config orchestrator.toml --json
//!
//! # Validate only
//! mfe-plan validate modules.toml
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use mfe_orchestrator::config::OrchestratorConfig;
use mfe_orchestrator::module::registry::{ActivationPlan, ExclusionReason, ModuleDescriptor};
use mfe_orchestrator::module::security::GateEvaluator;
use mfe_orchestrator::module::validation::{ManifestValidator, ValidationResult};
use mfe_orchestrator::module::{ModuleManifest, ModuleRegistry};
use mfe_orchestrator::utils::init_logging;

#[derive(Parser, Debug)]
#[command(name = "mfe-plan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Logging filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the activation plan for a manifest
    Plan {
        /// Manifest file (.json or .toml)
        manifest: PathBuf,

        /// Orchestrator config supplying flags and permissions
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Enable a feature flag (repeatable)
        #[arg(long = "flag", action = clap::ArgAction::Append)]
        flags: Vec<String>,

        /// Grant an access permission (repeatable)
        #[arg(long = "permission", action = clap::ArgAction::Append)]
        permissions: Vec<String>,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a manifest and its registry invariants
    Validate {
        /// Manifest file (.json or .toml)
        manifest: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(Some(cli.log.as_str()));

    let result = match cli.command {
        Command::Plan {
            manifest,
            config,
            flags,
            permissions,
            json,
        } => plan(&manifest, config.as_deref(), flags, permissions, json),
        Command::Validate { manifest } => validate(&manifest),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn plan(
    manifest_path: &Path,
    config_path: Option<&Path>,
    flags: Vec<String>,
    permissions: Vec<String>,
    json: bool,
) -> anyhow::Result<bool> {
    let mut config = match config_path {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    config
        .feature_flags
        .extend(flags.into_iter().map(|flag| (flag, true)));
    config
        .access_permissions
        .extend(permissions.into_iter().map(|perm| (perm, true)));

    let manifest = ModuleManifest::from_file(manifest_path)?;
    let registry = ModuleRegistry::from_manifest(manifest)?;
    let plan = ActivationPlan::build(&registry, &config.gate_evaluator())?;
    debug!("Built plan for {} modules", registry.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(true)
}

fn print_plan(plan: &ActivationPlan) {
    println!("init:");
    for (position, name) in plan.init.iter().enumerate() {
        println!("  {}. {}", position + 1, name);
    }

    for (index, level) in plan.levels.iter().enumerate() {
        println!("level {}: {}", index, level.join(", "));
    }

    if !plan.excluded.is_empty() {
        println!("excluded:");
        for exclusion in &plan.excluded {
            let reason = match &exclusion.reason {
                ExclusionReason::Gated {
                    missing_flags,
                    missing_permissions,
                } => format!(
                    "gated (flags: {:?}, permissions: {:?})",
                    missing_flags, missing_permissions
                ),
                ExclusionReason::MissingDependency { dependency } => {
                    format!("unknown dependency {}", dependency)
                }
                ExclusionReason::DependencyExcluded { dependency } => {
                    format!("dependency {} excluded", dependency)
                }
            };
            println!("  {}: {}", exclusion.module, reason);
        }
    }
}

fn validate(manifest_path: &Path) -> anyhow::Result<bool> {
    let manifest = ModuleManifest::from_file(manifest_path)?;
    let validator = ManifestValidator::new();

    let mut ok = true;
    for entry in &manifest.modules {
        let descriptor = ModuleDescriptor::from(entry.clone());
        if let ValidationResult::Invalid(problems) = validator.validate(&descriptor) {
            ok = false;
            for problem in problems {
                eprintln!("{}: {}", descriptor.name, problem);
            }
        }
    }
    if !ok {
        return Ok(false);
    }

    let registry = ModuleRegistry::from_manifest(manifest)?;
    // Cycle detection runs before gating, so any evaluator will do
    let plan = ActivationPlan::build(&registry, &GateEvaluator::deny_all())?;
    for exclusion in plan
        .excluded
        .iter()
        .filter(|e| matches!(e.reason, ExclusionReason::MissingDependency { .. }))
    {
        eprintln!("{}: {:?}", exclusion.module, exclusion.reason);
        ok = false;
    }

    if ok {
        println!("{} modules OK", registry.len());
    }
    Ok(ok)
}
