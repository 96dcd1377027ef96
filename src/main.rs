//! Rulegraph CLI - rule-based build graphs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use rulegraph::config::ConfigOverrides;
use rulegraph::dag::{DagBuilder, Graph};
use rulegraph::error::{FixSuggestion, Result, RuleGraphError};
use rulegraph::event_log::EventLog;
use rulegraph::rules::{FunctionTable, RuleRegistry};
use rulegraph::runtime::Executor;
use rulegraph::source::LocalFs;
use rulegraph::Rulefile;

#[derive(Parser)]
#[command(name = "rulegraph")]
#[command(about = "Rulegraph - rule-based build graphs with wildcard matching")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the graph for the targets and run out-of-date jobs
    Run(RunArgs),

    /// Load the rule file and register every rule
    Validate {
        /// Rule file
        #[arg(short, long, default_value = "Rulefile.yaml")]
        file: PathBuf,
    },

    /// List rules and their output templates
    List {
        /// Rule file
        #[arg(short, long, default_value = "Rulefile.yaml")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Target paths (defaults to the rule file's `targets:`)
    targets: Vec<String>,

    /// Rule file
    #[arg(short, long, default_value = "Rulefile.yaml")]
    file: PathBuf,

    /// Print the graph without running anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Dry-run output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Override a config value (key.path=value)
    #[arg(long = "config", value_name = "KEY=VALUE")]
    config: Vec<String>,

    /// Merge a YAML config file over the rule file's config
    #[arg(long = "configfile", value_name = "FILE")]
    configfile: Vec<PathBuf>,

    /// Working directory for paths, scans and commands
    #[arg(short = 'd', long)]
    directory: Option<PathBuf>,

    /// Run every job even when its outputs are up to date
    #[arg(long)]
    force: bool,

    /// Resolve target subtrees concurrently
    #[arg(long)]
    parallel: bool,

    /// Fail the build when a source file is missing
    #[arg(long)]
    strict_sources: bool,

    /// Write the event log as JSON to FILE
    #[arg(long, value_name = "FILE")]
    events: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate { file } => validate(&file),
        Commands::List { file } => list(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut rulefile = Rulefile::load(&args.file)?;
    let overrides = ConfigOverrides {
        files: args.configfile.clone(),
        values: args.config.clone(),
    };
    overrides.apply(rulefile.config_mut())?;

    let workdir = args
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let registry = Arc::new(rulefile.to_registry(&FunctionTable::new(), &workdir)?);

    let targets = if args.targets.is_empty() {
        rulefile.targets.clone()
    } else {
        args.targets.clone()
    };

    let events = EventLog::new();
    let result = build_and_run(&args, registry, &workdir, &targets, &events).await;

    if let Some(path) = &args.events {
        let json = serde_json::to_string_pretty(&events.to_json())?;
        std::fs::write(path, json)?;
    }
    result
}

async fn build_and_run(
    args: &RunArgs,
    registry: Arc<RuleRegistry>,
    workdir: &Path,
    targets: &[String],
    events: &EventLog,
) -> Result<()> {
    let builder = DagBuilder::new(registry, Arc::new(LocalFs::new(workdir)))
        .strict_sources(args.strict_sources)
        .with_events(events.clone());

    let graph = if args.parallel {
        builder.build_concurrent(targets).await?
    } else {
        builder.build(targets)?
    };

    if args.dry_run {
        match args.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
            Format::Text => print_graph(&graph),
        }
        return Ok(());
    }

    let summary = Executor::new(workdir)
        .force(args.force)
        .with_events(events.clone())
        .execute(&graph)
        .await?;

    println!(
        "{} {} job(s) run, {} up to date ({}ms)",
        "✓".green(),
        summary.executed,
        summary.skipped,
        summary.duration_ms
    );
    Ok(())
}

fn print_graph(graph: &Graph) {
    for (id, job) in graph.topological_order() {
        let wildcards = job.wildcards.to_string();
        if wildcards.is_empty() {
            println!("{} {}", "rule".cyan().bold(), job.rule.bold());
        } else {
            println!(
                "{} {} [{}]",
                "rule".cyan().bold(),
                job.rule.bold(),
                wildcards
            );
        }
        println!("    jobid: {}", id);

        let outputs: Vec<&str> = job.output_paths().collect();
        println!("    output: {}", outputs.join(", "));

        let inputs: Vec<&str> = job.input_paths().collect();
        if !inputs.is_empty() {
            println!("    input: {}", inputs.join(", "));
        }
        for (name, value) in &job.params {
            println!("    params.{}: {}", name, value);
        }
        if let Some(command) = &job.command {
            println!("    shell: {}", command.dimmed());
        }
        println!();
    }

    for source in graph.sources() {
        if source.exists {
            println!("{} {}", "source".green(), source.path);
        } else {
            println!("{} {} (missing)", "source".yellow(), source.path);
        }
    }

    let missing = graph.missing_sources().count();
    println!(
        "{} {} job(s), {} source(s), {} missing",
        "→".cyan(),
        graph.len(),
        graph.sources().len(),
        missing
    );
}

fn load_registry(file: &Path) -> Result<(Rulefile, RuleRegistry)> {
    let rulefile = Rulefile::load(file)?;
    let registry = rulefile.to_registry(&FunctionTable::new(), Path::new("."))?;
    Ok((rulefile, registry))
}

fn validate(file: &Path) -> Result<()> {
    let (rulefile, registry) = load_registry(file)?;

    println!("{} Rule file '{}' is valid", "✓".green(), file.display());
    println!("  Rules: {}", registry.len());
    println!("  Default targets: {}", rulefile.targets.len());
    if !registry.rule_order().is_empty() {
        println!("  Rule order: {}", registry.rule_order().join(" > "));
    }
    Ok(())
}

fn list(file: &Path) -> Result<()> {
    let (_, registry) = load_registry(file)?;
    if registry.is_empty() {
        return Err(RuleGraphError::Config {
            reason: format!("'{}' declares no rules", file.display()),
        });
    }

    for rule in registry.rules() {
        let outputs: Vec<&str> = rule.outputs().values().map(|t| t.as_str()).collect();
        println!("{}  {}", rule.name().bold(), outputs.join(", "));
    }
    Ok(())
}
