//! mysql-agent: MySQL diagnostic agent.
//!
//! Usage:
//!   mysql-agent init                  Write a default config
//!   mysql-agent serve                 Serve Agent.Query over JSON-RPC
//!   mysql-agent ask "why slow?"       Answer one question and exit
//!   mysql-agent tools                 List the diagnostic catalog

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mysql_agent::config::{self, AgentConfig, CONFIG_FILE};
use mysql_agent::database::{connect_lazy, MysqlSource};
use mysql_agent::rpc;
use mysql_agent::service::{AgentContext, DiagnosticService};
use mysql_agent::tools::mysql_registry;
use mysql_agent::types::{QueryRequest, SourceStatus};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "mysql-agent")]
#[command(version)]
#[command(about = "Answer MySQL diagnostic questions with grounded reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Agent home directory (holds agent.toml). Defaults to ~/.mysql-agent.
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default agent.toml into the home directory.
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },

    /// Serve Agent.Query over line-delimited JSON-RPC.
    Serve {
        /// Listen address, overrides [server] in the config.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Diagnose one question and print the report.
    Ask {
        /// The question, e.g. "why is the database slow?"
        #[arg(required = true)]
        question: Vec<String>,

        /// Per-request deadline in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the raw response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the diagnostic tools and their parameters.
    Tools,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = match &cli.home {
        Some(home) => PathBuf::from(shellexpand::tilde(home).into_owned()),
        None => config::default_home_dir(),
    };
    let loaded = load(&home_dir);

    // Initialize logging: RUST_LOG, then --log-level, then the config file.
    let level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.log_level.clone()))
        .unwrap_or_else(|| "info".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { force } => cmd_init(&home_dir, force),
        Commands::Serve { addr } => cmd_serve(loaded?, addr).await,
        Commands::Ask {
            question,
            timeout,
            json,
        } => cmd_ask(loaded?, question.join(" "), timeout, json).await,
        Commands::Tools => cmd_tools(loaded?),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path, force: bool) -> Result<()> {
    let path = home_dir.join(CONFIG_FILE);
    if path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            "!".yellow().bold(),
            path.display()
        );
        return Ok(());
    }

    config::save_config(&AgentConfig::default(), &path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("{} Wrote {}", ">>>".green().bold(), path.display());
    println!("    Set [mysql] credentials and DEEPSEEK_API_KEY (or [inference].api_key).");
    Ok(())
}

async fn cmd_serve(cfg: AgentConfig, addr: Option<String>) -> Result<()> {
    let addr = addr.unwrap_or_else(|| cfg.server_addr());
    let service = DiagnosticService::new(Arc::new(AgentContext::from_config(cfg)));

    // Initialize eagerly so configuration problems show up at startup. A
    // failure is cached and returned to every request.
    if let Err(e) = service.context().runtime().await {
        error!("Agent initialization failed, queries will be rejected: {}", e);
    }

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    println!("{} Serving Agent.Query on {}", ">>>".green().bold(), addr);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server = tokio::spawn(rpc::serve(listener, service, server_cancel));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Server stopped with error: {}", e),
        Err(e) => warn!("Server task join error: {}", e),
    }
    info!("Shutdown complete");
    Ok(())
}

async fn cmd_ask(cfg: AgentConfig, question: String, timeout: Option<u64>, json: bool) -> Result<()> {
    let service = DiagnosticService::new(Arc::new(AgentContext::from_config(cfg)));
    let request = QueryRequest {
        timeout_seconds: timeout,
        ..QueryRequest::new(question)
    };

    let outcome = service
        .run_query(request)
        .await
        .context("Agent initialization failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.response)?);
        return Ok(());
    }

    println!();
    println!("{}", outcome.response.answer);
    if outcome.response.sources.is_empty() {
        return Ok(());
    }

    println!();
    let origin = outcome
        .plan_origin
        .map(|o| o.to_string())
        .unwrap_or_else(|| "none".into());
    println!("{} (plan: {})", "Sources".bold(), origin.dimmed());
    for source in &outcome.response.sources {
        let status = match source.status {
            SourceStatus::Success => format!("{:<6}", "ok").green(),
            SourceStatus::Error => format!("{:<6}", "error").red(),
        };
        print!("  {:<22} {} {:>6}ms", source.tool, status, source.duration_ms);
        match &source.error {
            Some(e) => println!("  {}", e.dimmed()),
            None => println!(),
        }
    }
    if !outcome.summarized {
        println!("{}", "Report generation failed; raw data shown above.".yellow());
    }
    Ok(())
}

fn cmd_tools(cfg: AgentConfig) -> Result<()> {
    let source = Arc::new(MysqlSource::new(connect_lazy(&cfg.mysql)));
    let registry = mysql_registry(source, &cfg.mysql);

    println!();
    println!("{}", "=== Diagnostic Tools ===".bold());
    for def in registry.definitions() {
        println!();
        println!("  {}", def.name.cyan().bold());
        println!("    {}", def.description);
        if let Some(props) = def.parameters["properties"].as_object() {
            for (name, schema) in props {
                println!(
                    "    --{} ({}) {}",
                    name,
                    schema["type"].as_str().unwrap_or("any"),
                    schema["description"].as_str().unwrap_or_default().dimmed()
                );
            }
        }
    }

    println!();
    println!("{}", "Required signals:".bold());
    for signal in &cfg.signals {
        let marker = if registry.contains(&signal.tool) {
            "+".green()
        } else {
            "-".red()
        };
        println!("  {} {:<18} {} ({})", marker, signal.key, signal.name, signal.tool);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load `<home>/agent.toml` (defaults when absent) and apply env overrides.
fn load(home_dir: &Path) -> Result<AgentConfig> {
    let path = home_dir.join(CONFIG_FILE);
    let mut cfg = config::load_config(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    cfg.apply_env_overrides();
    Ok(cfg)
}
