//! xi CLI: drive the kernel and evaluation loop against the offline mock port.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::{json, Value};

use xi_kernel::config::XiConfig;
use xi_kernel::error::KernelError;
use xi_kernel::eval::{Evaluator, Goal};
use xi_kernel::kernel::Kernel;
use xi_kernel::port::mock::MockPort;
use xi_kernel::symbol::{EdgeSpec, SymbolSpec};

#[derive(Parser)]
#[command(name = "xi", version, about = "Capability-gated symbolic graph kernel")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation loop for a goal and print the result as JSON.
    Evaluate {
        /// Goal identifier; step symbols are named `<goal>:step:<n>`.
        #[arg(long, default_value = "goal")]
        goal: String,

        /// Task text the goal works toward.
        #[arg(long)]
        task: String,

        /// Step budget (overrides the configured default).
        #[arg(long)]
        max_steps: Option<usize>,

        /// Mock port signals completion on this call.
        #[arg(long)]
        complete_at: Option<usize>,

        /// Mock port fails on this call.
        #[arg(long)]
        fail_at: Option<usize>,

        /// Anchor the goal as a symbol so step 1 links to it.
        #[arg(long)]
        anchor: bool,

        /// Print only the outcome summary, not the final snapshot.
        #[arg(long)]
        summary: bool,
    },

    /// Walk through warrant enforcement, lineage, and invariant reporting.
    Demo,

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => XiConfig::load(path)?,
        None => XiConfig::default(),
    };

    match cli.command {
        Commands::Evaluate {
            goal,
            task,
            max_steps,
            complete_at,
            fail_at,
            anchor,
            summary,
        } => {
            let mut port = MockPort::new();
            if let Some(call) = complete_at {
                port = port.complete_on(call);
            }
            if let Some(call) = fail_at {
                port = port.fail_on(call);
            }
            let mut kernel = Kernel::new(Arc::new(port), config.kernel.clone());

            let spec = json!({ "task": task });
            if anchor {
                kernel.create_symbol(SymbolSpec::new(goal.as_str(), "goal", spec.clone()))?;
            }

            let mut goal = Goal::new(goal, spec);
            if let Some(n) = max_steps {
                goal = goal.with_max_steps(n);
            }

            let evaluator = Evaluator::new(config.evaluator.clone());
            let result = evaluator.run(&mut kernel, &goal);

            let output = if summary {
                json!({
                    "goalId": result.goal_id,
                    "completed": result.completed,
                    "outcome": result.outcome,
                    "totalSteps": result.total_steps,
                    "invariantViolations": result.invariant_violations,
                })
            } else {
                serde_json::to_value(&result).into_diagnostic()?
            };
            println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        }

        Commands::Demo => run_demo(&config)?,

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn run_demo(config: &XiConfig) -> Result<()> {
    let mut kernel = Kernel::new(Arc::new(MockPort::new()), config.kernel.clone());

    kernel.create_symbol(SymbolSpec::new("a", "concept", json!({"name": "A"})))?;
    kernel.create_symbol(SymbolSpec::new("b", "concept", json!({"name": "B"})))?;
    println!("created symbols a, b");

    match kernel.create_edge(EdgeSpec::new("a", "b", "rel").warrant(Default::default())) {
        Err(KernelError::MissingWarrant { .. }) => println!("edge without warrant rejected"),
        Err(e) => return Err(e.into()),
        Ok(_) => println!("unexpected: edge without warrant accepted"),
    }

    let edge = kernel.create_edge(EdgeSpec::new("a", "b", "rel").because("test"))?;
    println!(
        "edge {} -> {} ({}) weight {} accepted",
        edge.src, edge.dst, edge.rel, edge.weight
    );

    let child = kernel.prompt(
        "a:elaboration",
        xi_kernel::kernel::PromptSpec::task("Elaborate on A").with_parent("a"),
    )?;
    println!("prompted {} with lineage {:?}", child.id, child.lineage);

    match kernel.update_symbol("missing", Default::default()) {
        Err(KernelError::NotFound { id }) => println!("update of {id} rejected: not found"),
        Err(e) => return Err(e.into()),
        Ok(_) => println!("unexpected: update of missing symbol succeeded"),
    }

    let report = kernel.last_report();
    println!(
        "invariants: {} violation(s), {} warning(s)",
        report.violations.len(),
        report.warnings.len()
    );
    for line in report.all() {
        println!("  {line}");
    }

    let snapshot: Value = serde_json::to_value(kernel.snapshot()).into_diagnostic()?;
    println!("{}", serde_json::to_string_pretty(&snapshot["metadata"]).into_diagnostic()?);
    Ok(())
}
