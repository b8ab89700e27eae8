//! GeneForge CLI - automated genetic circuit design.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geneforge_catalog::{reference_catalog, CatalogSet, PartCatalog};
use geneforge_controller::{
    AdapterSet, ControllerConfig, IterationController, SessionOutcome, SessionPool, StopHandle,
};
use geneforge_core::{CircuitSpec, PartRole, SessionId, Verdict};
use geneforge_planner::ReplayPlanner;
use geneforge_storage::{JsonlSessionLog, SessionHistory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geneforge")]
#[command(about = "Design/simulate/refine loop for genetic logic circuits", long_about = None)]
struct Cli {
    /// Session log directory
    #[arg(long, global = true, default_value = ".geneforge")]
    log_dir: PathBuf,

    /// Part catalog JSON (defaults to the built-in E. coli library)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Directory of part libraries (`*.UCF.json` or catalog `*.json`),
    /// added alongside --catalog and replacing libraries with the same id
    #[arg(long, global = true)]
    library_dir: Option<PathBuf>,

    /// Controller config JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Design one circuit
    Design {
        /// Circuit spec JSON
        #[arg(long, conflicts_with = "expr")]
        spec: Option<PathBuf>,
        /// Output expression, e.g. "GFP=A & !B" (repeatable)
        #[arg(long)]
        expr: Vec<String>,
        /// Input signals for --expr, comma separated
        #[arg(long, value_delimiter = ',')]
        inputs: Vec<String>,
        /// Override the iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Design several circuits concurrently
    Batch {
        /// Circuit spec JSON files
        #[arg(required = true)]
        specs: Vec<PathBuf>,
        /// Override the iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Show a recorded session
    History {
        /// Session ID
        id: String,
        /// Re-run the recorded actions against the current adapters
        #[arg(long)]
        rerun: bool,
    },
    /// List part libraries and their parts
    Catalog {
        /// Only this library
        #[arg(long)]
        library: Option<String>,
        /// Only parts for this organism
        #[arg(long)]
        organism: Option<String>,
        /// Only parts with this role (sensor, gate, reporter)
        #[arg(long)]
        role: Option<PartRole>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let catalog = match &cli.catalog {
        Some(path) => PartCatalog::load(path)
            .await
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => reference_catalog(),
    };
    let mut catalogs = CatalogSet::from(catalog);
    if let Some(dir) = &cli.library_dir {
        let scanned = CatalogSet::scan(dir)
            .await
            .with_context(|| format!("scanning libraries in {}", dir.display()))?;
        // A scanned library replaces a loaded one with the same id
        for library in scanned.iter() {
            catalogs = catalogs.with(library.clone());
        }
    }
    let mut config = match &cli.config {
        Some(path) => ControllerConfig::load(path).await?,
        None => ControllerConfig::default(),
    };

    match cli.command {
        Commands::Design { spec, expr, inputs, max_iterations } => {
            if let Some(max) = max_iterations {
                config = config.with_max_iterations(max);
            }
            let spec = match spec {
                Some(path) => load_spec(&path).await?,
                None => spec_from_expressions(&expr, &inputs)?,
            };
            let controller = controller(catalogs, config, &cli.log_dir).await?;
            stop_on_ctrl_c(controller.stop_handle());

            let outcome = controller.run(spec).await?;
            print_outcome(&outcome);
        }
        Commands::Batch { specs, max_iterations } => {
            if let Some(max) = max_iterations {
                config = config.with_max_iterations(max);
            }
            let mut loaded = Vec::with_capacity(specs.len());
            for path in &specs {
                loaded.push(load_spec(path).await?);
            }
            let controller = Arc::new(controller(catalogs, config, &cli.log_dir).await?);
            stop_on_ctrl_c(controller.stop_handle());
            let pool = SessionPool::from_config(controller);

            for (path, result) in specs.iter().zip(pool.run_all(loaded).await) {
                println!("== {}", path.display());
                match result {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => println!("  error: {}", e),
                }
            }
        }
        Commands::History { id, rerun } => {
            let session: SessionId = id.parse().map_err(|_| anyhow::anyhow!("Invalid session ID"))?;
            let log = JsonlSessionLog::new(&cli.log_dir).await?;
            let history = SessionHistory::load(&log, session).await?;
            print_history(&history);

            if rerun {
                let Some(spec) = history.spec.clone() else {
                    bail!("session {} has no recorded spec", session);
                };
                if let Some(max) = history.max_iterations {
                    config = config.with_max_iterations(max);
                }
                let planner = Arc::new(ReplayPlanner::from_history(&history));
                let controller = controller(catalogs, config, &cli.log_dir).await?.with_planner(planner);
                let outcome = controller.run(spec).await?;
                println!();
                println!("Re-run:");
                print_outcome(&outcome);
            }
        }
        Commands::Catalog { library, organism, role } => {
            if let Some(id) = &library {
                if catalogs.get(id).is_none() {
                    bail!("unknown library '{}' (loaded: {})", id, catalogs.libraries().join(", "));
                }
            }
            for catalog in catalogs.iter().filter(|c| library.as_deref().map_or(true, |l| c.library() == l)) {
                let parts: Vec<_> = catalog
                    .list()
                    .into_iter()
                    .filter(|p| organism.as_deref().map_or(true, |o| p.organism == o))
                    .filter(|p| role.map_or(true, |r| p.role() == r))
                    .collect();

                println!("Library {} ({} parts)", catalog.library(), parts.len());
                for part in parts {
                    println!(
                        "  {} | {} | {} | range {:.1}",
                        part.id,
                        part.role(),
                        part.organism,
                        part.dynamic_range()
                    );
                }
            }
        }
    }

    Ok(())
}

async fn controller(catalogs: CatalogSet, config: ControllerConfig, log_dir: &Path) -> Result<IterationController> {
    config.validate()?;
    let log = JsonlSessionLog::new(log_dir)
        .await
        .with_context(|| format!("opening session log in {}", log_dir.display()))?;
    let adapters = AdapterSet::from_config(catalogs, &config);
    Ok(IterationController::new(adapters, Arc::new(log)).with_config(config))
}

/// Ctrl-C asks running sessions to stop at their next iteration boundary.
fn stop_on_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested; finishing the current iteration");
            stop.request_stop();
        }
    });
}

async fn load_spec(path: &Path) -> Result<CircuitSpec> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading spec {}", path.display()))?;
    let spec: CircuitSpec = serde_json::from_str(&text).with_context(|| format!("parsing spec {}", path.display()))?;
    spec.validate()?;
    Ok(spec)
}

fn spec_from_expressions(exprs: &[String], inputs: &[String]) -> Result<CircuitSpec> {
    if exprs.is_empty() {
        bail!("either --spec or --expr is required");
    }
    let mut pairs = Vec::with_capacity(exprs.len());
    for e in exprs {
        let Some((output, source)) = e.split_once('=') else {
            bail!("expected <output>=<expression>, got '{}'", e);
        };
        pairs.push((output.trim(), source.trim()));
    }
    let inputs: Vec<&str> = inputs.iter().map(|s| s.trim()).collect();
    Ok(CircuitSpec::from_expressions("cli", inputs, &pairs)?)
}

fn print_outcome(outcome: &SessionOutcome) {
    println!("Session: {}", outcome.session);
    println!("  Status: {}", outcome.status);
    println!("  Iterations: {}", outcome.iterations);

    let Some(best) = &outcome.best else {
        return;
    };
    println!("  Best version: v{} ({})", best.revision, best.id);
    for (slot, part) in &best.assignment.parts {
        println!("    {} <- {}", slot, part.label());
    }
    if let Some(diagnosis) = &outcome.best_diagnosis {
        for row in diagnosis.logic_failures() {
            println!(
                "    wrong: {} row {} is {:.3}, expected {}",
                row.output,
                row.row,
                row.level,
                if row.expected_on { "ON" } else { "OFF" }
            );
        }
        for check in diagnosis.violations() {
            println!(
                "    violated: {} {} = {:.3} (bound {:.3})",
                check.output, check.kind, check.actual, check.bound
            );
        }
    }
}

fn print_history(history: &SessionHistory) {
    println!("Session: {}", history.session);
    if let Some(spec) = &history.spec {
        println!("  Spec: {} ({} -> {})", spec.name, spec.inputs.join(","), spec.outputs.join(","));
    }
    for version in &history.versions {
        let verdict = history
            .diagnosis(version.id)
            .map(|d| match d.verdict {
                Verdict::Pass => "pass",
                Verdict::Fail => "fail",
                Verdict::Inconclusive => "inconclusive",
            })
            .unwrap_or("-");
        println!("  v{} {} [{}]", version.revision, version.id, verdict);
        if let Some(action) = history.action_for(version.id) {
            println!("    next: {} ({})", action, action.rationale);
        }
    }
    for (version, failure) in &history.failures {
        match version {
            Some(id) => println!("  failure at {}: {}", id, failure),
            None => println!("  failure: {}", failure),
        }
    }
    match &history.status {
        Some(status) => println!("  Status: {}", status),
        None => println!("  Status: unfinished"),
    }
}
