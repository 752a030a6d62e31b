//! sqlweave: statement definition CLI
//!
//! # Usage
//!
//! ```bash
//! # Render a statement
//! sqlweave render UserMapper.find --input '{"id": 7, "name": "ann"}'
//!
//! # List loaded namespaces and statements
//! sqlweave list --dir mappers
//!
//! # Run against a database
//! sqlweave run UserMapper.find --input '{"id": 7}' --database-url sqlite::memory:
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqlweave::config::Placeholder;
use sqlweave::engine::style_for_url;
use sqlweave::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlweave")]
#[command(version)]
#[command(about = "Render and run templated SQL statement definitions", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlweave list
    sqlweave render UserMapper.find --input '{\"id\": 7}'
    sqlweave run UserMapper.find --input '{\"id\": 7}' --format json")]
struct Cli {
    /// Directory holding statement definition files
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Definition file extension
    #[arg(long, global = true)]
    extension: Option<String>,

    /// Database connection URL
    #[arg(long, env = "SQLWEAVE_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Marker style for parameterized SQL
    #[arg(long, value_enum, global = true)]
    style: Option<StyleArg>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StyleArg {
    Question,
    Dollar,
}

impl From<StyleArg> for Placeholder {
    fn from(arg: StyleArg) -> Self {
        match arg {
            StyleArg::Question => Placeholder::Question,
            StyleArg::Dollar => Placeholder::Dollar,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a statement to literal and parameterized SQL
    Render {
        /// Statement id, `Namespace.id`
        id: String,
        /// Input as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    /// List loaded namespaces and statements
    List,
    /// Load every definition file and report problems
    Check,
    /// Render and execute a statement
    Run {
        /// Statement id, `Namespace.id`
        id: String,
        /// Input as a JSON object
        #[arg(short, long, default_value = "{}")]
        input: String,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "sqlweave=debug" } else { "sqlweave=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(dir) = &cli.dir {
        config.sources.dir = dir.clone();
    }
    if let Some(extension) = &cli.extension {
        config.sources.extension = extension.clone();
    }
    if let Some(url) = &cli.database_url {
        config.database.url = Some(url.clone());
    }
    if let Some(style) = cli.style {
        config.placeholder = style.into();
    }

    match &cli.command {
        Commands::Render { id, input } => {
            let weave = render_session(&config)?;
            render_statement(&weave, id, input)
        }
        Commands::List => list_statements(&config.load_registry()?),
        Commands::Check => check(&config),
        Commands::Run { id, input, format } => {
            if config.database.url.is_none() {
                bail!("No database URL. Use --database-url or set SQLWEAVE_DATABASE_URL");
            }
            let weave = config.open().await?;
            run_statement(&weave, id, input, format, cli.verbose).await
        }
    }
}

/// A driverless session whose marker style follows the configuration, or
/// the configured database URL.
fn render_session(config: &Config) -> Result<SqlWeave> {
    let style = config
        .placeholder
        .style()
        .or_else(|| config.database.url.as_deref().map(style_for_url))
        .unwrap_or_default();
    Ok(SqlWeave::builder()
        .registry(config.load_registry()?)
        .style(style)
        .build())
}

fn parse_input(input: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(input).context("--input must be valid JSON")?;
    if !value.is_object() {
        bail!("--input must be a JSON object");
    }
    Ok(value)
}

fn render_statement(weave: &SqlWeave, id: &str, input: &str) -> Result<()> {
    let prepared = weave.prepare(id, &parse_input(input)?)?;

    println!("{} {}", "Statement:".dimmed(), format!("{} ({})", prepared.id, prepared.tag()).cyan());
    println!();
    println!("{}", "Literal SQL:".green().bold());
    println!("{}", prepared.literal.white());
    println!();
    println!("{}", "Parameterized SQL:".green().bold());
    println!("{}", prepared.sql.white());

    if !prepared.params.is_empty() {
        println!();
        println!("{}", "Bindings:".cyan());
        for (i, param) in prepared.params.iter().enumerate() {
            let marker = match weave.style() {
                PlaceholderStyle::Dollar => format!("${}", i + 1),
                PlaceholderStyle::Question => format!("#{}", i + 1),
            };
            println!("  {} = {}", marker, param_to_string(param).yellow());
        }
    }
    Ok(())
}

fn list_statements(registry: &Registry) -> Result<()> {
    let namespaces = registry.namespaces();
    if namespaces.is_empty() {
        println!("{}", "(no namespaces loaded)".dimmed());
        return Ok(());
    }

    for namespace in namespaces {
        println!(
            "{} {}",
            namespace.name().cyan().bold(),
            format!("({})", namespace.origin()).dimmed()
        );
        for (id, node) in namespace.statements() {
            let tag = node.tag();
            println!("  {:8} {}", tag.yellow(), id.white());
        }
    }
    Ok(())
}

fn check(config: &Config) -> Result<()> {
    match config.load_registry() {
        Ok(registry) => {
            let namespaces = registry.namespaces();
            let statements: usize = namespaces.iter().map(|ns| ns.len()).sum();
            println!(
                "{} {} namespace(s), {} statement(s) in {}",
                "✓".green(),
                namespaces.len().to_string().cyan(),
                statements.to_string().cyan(),
                config.sources.dir.display()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            bail!("definition check failed");
        }
    }
}

async fn run_statement(weave: &SqlWeave, id: &str, input: &str, format: &OutputFormat, verbose: bool) -> Result<()> {
    let prepared = weave.prepare(id, &parse_input(input)?)?;
    if verbose {
        println!("{} {}", "SQL:".dimmed(), prepared.sql.yellow());
    }

    let rows = weave.run(&prepared).await?;
    if prepared.kind.returns_rows() {
        format_output(&rows, format);
    } else {
        let affected = u64::from_rows(rows)?;
        println!("{} {} rows affected", "✓".green(), affected);
    }
    Ok(())
}

fn format_output(rows: &RowSet, format: &OutputFormat) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = rows
                .rows
                .iter()
                .map(|row| serde_json::Value::from(Value::Tree(row.clone())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Table => {
            let columns = &rows.columns;

            // Calculate column widths
            let mut widths: HashMap<&String, usize> = columns.iter().map(|c| (c, c.len())).collect();
            for row in &rows.rows {
                for (col, val) in row.iter() {
                    let len = param_to_string(val).chars().count();
                    if let Some(w) = widths.get_mut(col) {
                        *w = (*w).max(len);
                    }
                }
            }

            let header: Vec<String> = columns
                .iter()
                .map(|c| format!("{:width$}", c, width = widths[c]))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = columns.iter().map(|c| "─".repeat(widths[c])).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in &rows.rows {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let val = row.get(c).map(param_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = widths[c])
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", rows.len().to_string().cyan());
        }
    }
}

fn param_to_string(val: &Value) -> String {
    match val {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
