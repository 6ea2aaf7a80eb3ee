//! IPI-CORE command-line host.
//!
//! ## CLI Subcommands
//!
//! - `ipi-core-cli process <ip>...` - Look up addresses and print JSON results
//! - `ipi-core-cli serve` - Keep the engine loaded with triggers active until Ctrl-C
//! - `ipi-core-cli config [show|validate]` - Inspect the effective configuration
//!
//! Configuration comes from `IPI_*` environment variables, or from the TOML
//! file named by `IPI_CONFIG_FILE`.

use std::process::ExitCode;
use std::sync::Arc;

use ipi_core::config::EngineConfig;
use ipi_core::distributor::{DataDistributor, MirrorDistributor};
use ipi_core::telemetry::{init_logging, LogConfig};
use ipi_core::{Engine, EngineError, TableBackend};

const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "process" => {
            let ips = &args[2..];
            if ips.is_empty() {
                eprintln!("process: at least one IP address is required");
                print_command_help("process");
                return ExitCode::FAILURE;
            }
            init_cli_logging();
            let config = match load_config() {
                Ok(c) => c.with_auto_update(false).with_file_watch(false),
                Err(code) => return code,
            };
            run_process(config, ips).await
        }
        "serve" => {
            init_cli_logging();
            let config = match load_config() {
                Ok(c) => c,
                Err(code) => return code,
            };
            run_serve(config).await
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let config = match load_config() {
                Ok(c) => c,
                Err(code) => return code,
            };
            match subcommand {
                "show" => print_json(&config.effective_config()),
                "validate" => match config.validate() {
                    Ok(path) => {
                        println!("Configuration valid, data file {}", path.display());
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        eprintln!("Configuration invalid: {}", e);
                        ExitCode::from(EXIT_CONFIG)
                    }
                },
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("ipi-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn init_cli_logging() {
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn load_config() -> Result<EngineConfig, ExitCode> {
    match std::env::var_os("IPI_CONFIG_FILE") {
        Some(path) => EngineConfig::from_toml_file(std::path::Path::new(&path)).map_err(|e| {
            eprintln!("Failed to load config: {}", e);
            ExitCode::from(EXIT_CONFIG)
        }),
        None => Ok(EngineConfig::from_env()),
    }
}

/// `file://` update URLs are served by the mirror distributor.
fn distributor_for(config: &EngineConfig) -> Option<Arc<dyn DataDistributor>> {
    let url = config.update_url.as_deref()?;
    MirrorDistributor::from_url(url).map(|m| Arc::new(m) as Arc<dyn DataDistributor>)
}

async fn start_engine(config: EngineConfig) -> Result<Engine, ExitCode> {
    let distributor = distributor_for(&config);
    Engine::with_distributor(config, Arc::new(TableBackend::new()), distributor)
        .await
        .map_err(|e| {
            eprintln!("Failed to start engine: {}", e);
            match e {
                EngineError::Configuration(_) => ExitCode::from(EXIT_CONFIG),
                _ => ExitCode::FAILURE,
            }
        })
}

async fn run_process(config: EngineConfig, ips: &[String]) -> ExitCode {
    let engine = match start_engine(config).await {
        Ok(e) => e,
        Err(code) => return code,
    };

    let mut failed = false;
    for ip in ips {
        let entry = match engine.process(ip) {
            Ok(results) => serde_json::json!({ "ip": ip, "results": results }),
            Err(e) => {
                failed = true;
                serde_json::json!({ "ip": ip, "error": e.to_string() })
            }
        };
        println!("{}", entry);
    }

    engine.stop().await;
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run_serve(config: EngineConfig) -> ExitCode {
    let engine = match start_engine(config).await {
        Ok(e) => e,
        Err(code) => return code,
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for Ctrl-C: {}", e);
    }

    let report = engine.stop().await;
    eprintln!(
        "Stopped: {}/{} background tasks acknowledged",
        report.acknowledged, report.requested
    );
    ExitCode::SUCCESS
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "ipi-core - on-premise IP intelligence engine host v{}

USAGE:
    ipi-core-cli <COMMAND> [ARGS]

COMMANDS:
    process <IP>...  Look up one or more addresses, print JSON results
    serve            Load the dataset and keep it fresh until Ctrl-C
    config           Show or validate the effective configuration
    version          Show version information
    help             Show this help message

ENVIRONMENT:
    IPI_CONFIG_FILE            TOML config file (replaces IPI_* variables)
    IPI_DATA_FILE              Data file path (required)
    IPI_PERFORMANCE_PROFILE    Default, LowMemory, BalancedTemp, Balanced,
                               HighPerformance, InMemory, SingleLoaded
    IPI_AUTO_UPDATE            Poll for updates (default: true)
    IPI_UPDATE_URL             Update source; file:// selects a local mirror
    IPI_LICENSE_KEY            Distributor license key
    IPI_FILE_WATCH             Reload on data file change (default: true)
    IPI_TEMP_DATA_COPY         Load from private snapshots (default: true)
    IPI_LOG_FORMAT             json or pretty (default: json)
    IPI_LOG_LEVEL              Log filter (default: info)

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "process" => {
            eprintln!(
                "ipi-core-cli process - Look up addresses

USAGE:
    ipi-core-cli process <IP>...

DESCRIPTION:
    Loads the data file once, prints one JSON line per address and exits.
    File watch and auto update are disabled for this command.

EXAMPLES:
    IPI_DATA_FILE=/srv/ipi/data.ipi ipi-core-cli process 185.28.167.77
    ipi-core-cli process 145.23.184.233 fdaa:bbcc:ddee:0:995f:d63a:f2a1:f189
"
            );
        }
        "serve" => {
            eprintln!(
                "ipi-core-cli serve - Keep the dataset loaded

USAGE:
    ipi-core-cli serve

DESCRIPTION:
    Loads the data file and runs the enabled triggers: the file watcher
    reloads when the data file changes, the update poller fetches newer
    files from IPI_UPDATE_URL. Ctrl-C stops the triggers, then releases
    the dataset and removes the snapshot directory.
"
            );
        }
        "config" => {
            eprintln!(
                "ipi-core-cli config - Inspect configuration

USAGE:
    ipi-core-cli config [show|validate]

SUBCOMMANDS:
    show      Print the effective configuration as JSON (default)
    validate  Check the configuration, exit 2 if invalid
"
            );
        }
        _ => {
            eprintln!("No help available for: {}", command);
            print_usage();
        }
    }
}
