//! locus CLI: derive and explain distributed physical plans.

use clap::{Parser, Subcommand};
use locus_core::config::PlannerConfig;
use locus_planner::dsl::ConfigOverrides;
use locus_planner::{
    derive_plan, explain_json, explain_with, parse_yaml_catalog, parse_yaml_plan, ExplainOptions,
};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "locus")]
#[command(about = "Distribution derivation and exchange placement for distributed SQL plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive a plan against a catalog and print the physical tree
    Explain {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,

        /// Path to the catalog YAML file (locations + tables)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Table group to compile against (overrides config)
        #[arg(long)]
        table_group: Option<String>,

        /// Place every fresh compute stage on the single location
        #[arg(long)]
        force_single_location: bool,

        /// Do not use part-fix keys to prove colocation
        #[arg(long)]
        no_part_fix_colocation: bool,

        /// Prefix lines with node ids and append output columns
        #[arg(short, long)]
        verbose: bool,

        /// Print the physical tree as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a plan YAML file (syntax and schema check)
    Validate {
        /// Path to the plan YAML file
        #[arg(short, long)]
        plan: PathBuf,
    },
}

/// Flags given on the command line; these win over the plan document.
#[derive(Debug, Default)]
struct CliOverrides {
    table_group: Option<String>,
    force_single_location: bool,
    no_part_fix_colocation: bool,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Explain {
            plan,
            catalog,
            table_group,
            force_single_location,
            no_part_fix_colocation,
            verbose,
            json,
        } => {
            let overrides = CliOverrides {
                table_group,
                force_single_location,
                no_part_fix_colocation,
            };
            if let Err(e) = explain_plan(&plan, &catalog, &overrides, verbose, json) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { plan } => {
            if let Err(e) = validate_plan(&plan) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Plan is valid");
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Env defaults, then the document's `config:` block, then CLI flags.
fn resolve_config(doc: &ConfigOverrides, cli: &CliOverrides) -> PlannerConfig {
    let mut config = PlannerConfig::from_env();
    doc.apply(&mut config);
    if let Some(group) = &cli.table_group {
        config.table_group = group.clone();
    }
    if cli.force_single_location {
        config.force_single_location = true;
    }
    if cli.no_part_fix_colocation {
        config.enable_part_fix_key_colocation = false;
    }
    config
}

fn validate_plan(plan_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(plan_path)?;
    let parsed = parse_yaml_plan(&yaml_content)?;
    parsed.plan.schema()?;
    Ok(())
}

fn explain_plan(
    plan_path: &PathBuf,
    catalog_path: &PathBuf,
    overrides: &CliOverrides,
    verbose: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_yaml_plan(&fs::read_to_string(plan_path)?)?;
    let (registry, catalog) = parse_yaml_catalog(&fs::read_to_string(catalog_path)?)?;
    let config = resolve_config(&parsed.config, overrides);
    info!(table_group = %config.table_group, tables = catalog.len(), "deriving plan");

    let root = derive_plan(&parsed.plan, &registry, &catalog, &config)?;
    if json {
        println!("{}", explain_json(&root)?);
        return Ok(());
    }
    let opts = ExplainOptions {
        ids: verbose,
        columns: verbose,
    };

    println!("Physical Plan (locus {})", locus_core::VERSION);
    println!("==========================");
    println!();
    print!("{}", explain_with(&root, opts));
    println!();
    println!("Nodes: {}", root.node_count());
    println!("Exchanges: {}", root.exchanges().len());
    println!("Fingerprint: {}", root.fingerprint()?.short());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{resolve_config, CliOverrides, ConfigOverrides};

    #[test]
    fn document_config_overrides_defaults() {
        let doc = ConfigOverrides {
            table_group: Some("analytics".into()),
            force_single_location: Some(true),
            ..Default::default()
        };
        let config = resolve_config(&doc, &CliOverrides::default());
        assert_eq!(config.table_group, "analytics");
        assert!(config.force_single_location);
    }

    #[test]
    fn cli_overrides_higher_priority_than_document() {
        let doc = ConfigOverrides {
            table_group: Some("analytics".into()),
            enable_part_fix_key_colocation: Some(true),
            ..Default::default()
        };
        let cli = CliOverrides {
            table_group: Some("reporting".into()),
            no_part_fix_colocation: true,
            ..Default::default()
        };
        let config = resolve_config(&doc, &cli);
        assert_eq!(config.table_group, "reporting");
        assert!(!config.enable_part_fix_key_colocation);
    }
}
