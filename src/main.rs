//! mcp-aegis - declarative conformance tester for MCP servers
//!
//! Spawns an MCP server over stdio, runs YAML-described test suites against
//! it, and reports pass/fail with structured diagnostics.

use clap::{Parser, Subcommand};
use mcp_aegis::runner::ConsoleReporter;
use mcp_aegis::{config, query, suite, TestRunner};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcp-aegis")]
#[command(about = "Declarative conformance tester for MCP servers", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to the server configuration file
    #[arg(short, long, env = "MCP_AEGIS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MCP_AEGIS_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    /// Test file globs, e.g. 'tests/**/*.test.yml'
    patterns: Vec<String>,

    /// Select suites by description or tests by name: a substring, or
    /// /regex/ with an optional i flag
    #[arg(long)]
    filter: Option<String>,

    /// Show expected/actual previews for every failure
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the server's tools, or call one and print the result
    Query {
        /// Tool to call; omit to list tools
        tool: Option<String>,

        /// Tool arguments as a JSON object
        args: Option<String>,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,

        /// Suppress informational output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Scaffold a configuration file and an example test suite
    Init {
        /// Directory to scaffold into
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Some(Commands::Query {
            tool,
            args,
            json,
            quiet,
        }) => {
            let (config, _path) = config::ServerConfig::discover_and_load(cli.config.as_deref())?;
            let args = match args {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("Invalid JSON arguments: {}", e))?,
                None => serde_json::json!({}),
            };
            let options = query::QueryOptions {
                tool,
                args,
                json,
                quiet,
            };
            Ok(query::run_query(config, options).await?)
        }

        Some(Commands::Init { dir }) => init_scaffold(&dir),

        None => run_tests(cli).await,
    }
}

async fn run_tests(cli: Cli) -> anyhow::Result<i32> {
    if cli.patterns.is_empty() {
        eprintln!("No test file patterns given. Try: mcp-aegis 'tests/**/*.test.yml'");
        return Ok(0);
    }

    let files = expand_globs(&cli.patterns)?;
    if files.is_empty() {
        println!("No test files matched.");
        return Ok(0);
    }

    let (config, config_path) = config::ServerConfig::discover_and_load(cli.config.as_deref())?;
    info!("Using config {}", config_path.display());

    let mut suites = suite::load_suites(&files)?;
    if let Some(spec) = &cli.filter {
        let filter = suite::Filter::parse(spec)?;
        suites = suites.into_iter().filter_map(|s| filter.apply(s)).collect();
        if suites.is_empty() {
            println!("Filter matched no suites or tests.");
            return Ok(0);
        }
    }

    let runner = TestRunner::new(config);
    let mut reporter = ConsoleReporter::new(cli.verbose);
    let summary = runner.run(&suites, &mut reporter).await;
    Ok(reporter.finish(&summary))
}

fn expand_globs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        // A literal path is taken as-is so shells without glob expansion
        // still work.
        let path = PathBuf::from(pattern);
        if path.is_file() {
            files.push(path);
            continue;
        }
        for entry in glob::glob(pattern)
            .map_err(|e| anyhow::anyhow!("Invalid glob '{}': {}", pattern, e))?
        {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn init_scaffold(dir: &std::path::Path) -> anyhow::Result<i32> {
    std::fs::create_dir_all(dir.join("tests"))?;

    let config_path = dir.join("aegis.config.json");
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, include_str!("../templates/aegis.config.json"))?;
        println!("Created {}", config_path.display());
    }

    let suite_path = dir.join("tests/example.test.yml");
    if suite_path.exists() {
        println!("Example suite already exists: {}", suite_path.display());
    } else {
        std::fs::write(&suite_path, include_str!("../templates/example.test.yml"))?;
        println!("Created {}", suite_path.display());
    }

    println!();
    println!("Edit {} to point at your server, then run:", config_path.display());
    println!("  mcp-aegis 'tests/**/*.test.yml'");
    Ok(0)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
