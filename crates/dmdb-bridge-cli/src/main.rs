//! dmdb-bridge CLI - DM database access and MySQL to DM table migration.

use clap::{Parser, Subcommand};
use dmdb_bridge::{BridgeError, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "dmdb-bridge")]
#[command(about = "DM database adapter: native queries and MySQL to DM table migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy one MySQL table into DM page by page
    Migrate {
        /// Table to read from the MySQL source
        #[arg(long)]
        source_table: String,

        /// Table to write in the DM target
        #[arg(long)]
        target_table: String,

        /// Override rows per page
        #[arg(long)]
        page_limit: Option<u64>,
    },

    /// Run a native SQL statement against DM
    Query {
        /// Statement text, passed through unchanged
        #[arg(long)]
        sql: String,
    },

    /// Test the DM connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BridgeError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(BridgeError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    dispatch(cli.command, config, cli.output_json).await
}

#[cfg(feature = "odbc")]
async fn dispatch(command: Commands, config: Config, output_json: bool) -> Result<(), BridgeError> {
    use dmdb_bridge::{AdapterOptions, DmAdapter, NativeResult, OdbcPool, HEALTH_CHECK_SQL};

    let adapter = DmAdapter::new(
        OdbcPool::new(&config.target),
        AdapterOptions::from(&config.target),
    );

    let result: Result<(), BridgeError> = async {
        match command {
            Commands::Migrate {
                source_table,
                target_table,
                page_limit,
            } => migrate(&adapter, &config, &source_table, &target_table, page_limit, output_json).await,

            Commands::Query { sql } => {
                let result = adapter.send_native_query(&sql, &[]).await?;
                if output_json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    match result {
                        NativeResult::Affected(n) => println!("{} row(s) affected", n),
                        NativeResult::Rows(rows) => {
                            for row in &rows {
                                println!("{}", serde_json::to_string(row)?);
                            }
                            println!("({} row(s))", rows.len());
                        }
                    }
                }
                Ok(())
            }

            Commands::HealthCheck => {
                let start = std::time::Instant::now();
                adapter.open().await?;
                adapter.send_native_query(HEALTH_CHECK_SQL, &[]).await?;
                let latency_ms = start.elapsed().as_millis() as u64;

                if output_json {
                    let report = serde_json::json!({
                        "target": format!("{}:{}", config.target.host, config.target.port),
                        "connected": true,
                        "latency_ms": latency_ms,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Health Check Results:");
                    println!(
                        "  Target (DM {}:{}): OK ({}ms)",
                        config.target.host, config.target.port, latency_ms
                    );
                }
                Ok(())
            }
        }
    }
    .await;

    adapter.close().await;
    result
}

#[cfg(not(feature = "odbc"))]
async fn dispatch(_command: Commands, _config: Config, _output_json: bool) -> Result<(), BridgeError> {
    Err(BridgeError::Config(
        "dmdb-bridge was built without ODBC support; rebuild with --features odbc to reach a DM target"
            .to_string(),
    ))
}

#[cfg(all(feature = "odbc", feature = "mysql"))]
async fn migrate<P: dmdb_bridge::ConnectionPool>(
    adapter: &dmdb_bridge::DmAdapter<P>,
    config: &Config,
    source_table: &str,
    target_table: &str,
    page_limit: Option<u64>,
    output_json: bool,
) -> Result<(), BridgeError> {
    use dmdb_bridge::MigrationOptions;

    let source = config
        .source
        .as_ref()
        .ok_or_else(|| BridgeError::Config("migrate requires a `source` section".to_string()))?;

    let mut options = MigrationOptions::from(&config.migration);
    if let Some(limit) = page_limit {
        options.page_limit = limit;
    }

    let start = std::time::Instant::now();
    let summary = adapter
        .migrate_from_mysql(source, source_table, target_table, options)
        .await?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\nMigration completed!");
        println!("  Source: {}.{}", source.database, source_table);
        println!("  Target: {}", adapter.compiler().table(target_table)?);
        println!("  Duration: {:.2}s", start.elapsed().as_secs_f64());
        println!("  Pages: {}", summary.pages_read);
        println!("  Rows read: {}", summary.source_rows_read);
        println!("  Rows written: {}", summary.target_rows_written);
        if !summary.failures.is_empty() {
            println!("  Failed rows: {}", summary.failures.len());
            for failure in &summary.failures {
                println!("    {}", failure.error);
            }
        }
    }
    Ok(())
}

#[cfg(all(feature = "odbc", not(feature = "mysql")))]
async fn migrate<P: dmdb_bridge::ConnectionPool>(
    _adapter: &dmdb_bridge::DmAdapter<P>,
    _config: &Config,
    _source_table: &str,
    _target_table: &str,
    _page_limit: Option<u64>,
    _output_json: bool,
) -> Result<(), BridgeError> {
    Err(BridgeError::Config(
        "dmdb-bridge was built without MySQL support".to_string(),
    ))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
