//! update-request-modifier
//!
//! Command-line front end for the update-check interceptor.
//!
//! ```text
//!   endpoints / check-config ──▶ config file (TOML)
//!   logs / clear / uninstall ──▶ log store (SQLite or memory)
//!   send ──▶ intercepting client ──▶ upstream ──▶ row finalized
//!   run  ──▶ clear scheduler + config hot reload (+ /metrics) until Ctrl+C
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{Method, Request};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tower::ServiceExt;

use update_request_modifier::audit::LogQuery;
use update_request_modifier::config::watcher::ConfigReloader;
use update_request_modifier::config::{load_config, load_or_default, save_config, ConfigError, ModifierConfig};
use update_request_modifier::http::{build_client, BodyEncoding, RequestBody};
use update_request_modifier::lifecycle::{shutdown_signal, ClearScheduler, Shutdown};
use update_request_modifier::observability::{init_logging, metrics, ClearTrigger};
use update_request_modifier::store::{open_store, SortColumn, SortOrder};
use update_request_modifier::{SharedConfig, UpdateInterceptor};

#[derive(Parser)]
#[command(name = "update-request-modifier")]
#[command(about = "Intercept, rewrite and audit outgoing update checks", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "update-request-modifier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration file
    CheckConfig,
    /// Manage monitored endpoints
    Endpoints {
        #[command(subcommand)]
        action: EndpointAction,
    },
    /// Query the request log
    Logs {
        /// Substring of the URL or user-agent
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
        /// Defaults to store.logs_per_page
        #[arg(long)]
        per_page: Option<u32>,
        #[arg(long, value_enum, default_value_t = SortArg::Time)]
        sort: SortArg,
        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
    },
    /// Delete every log row
    Clear,
    /// Drop the log table
    Uninstall,
    /// Send an update check through the intercepting client
    Send {
        url: String,
        /// Body field as name=value (repeatable)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        #[arg(long)]
        user_agent: Option<String>,
        /// Send a JSON body instead of a form
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduled clear with config hot reload until Ctrl+C
    Run,
}

#[derive(Subcommand)]
enum EndpointAction {
    List,
    Add { url: String },
    Remove { url: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Time,
    Url,
    UserAgent,
    ResponseCode,
}

impl From<SortArg> for SortColumn {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Time => SortColumn::Time,
            SortArg::Url => SortColumn::Url,
            SortArg::UserAgent => SortColumn::UserAgent,
            SortArg::ResponseCode => SortColumn::ResponseCode,
        }
    }
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match cli.command {
        Commands::CheckConfig => load_config(&cli.config)?,
        _ => load_or_default(&cli.config)?,
    };
    init_logging(&config.observability)?;

    match cli.command {
        Commands::CheckConfig => {
            println!("{} is valid", cli.config.display());
            println!("  endpoints:        {}", config.interception.endpoints.len());
            println!("  store:            {:?} ({})", config.store.backend, config.store.path);
            println!("  scheduled clear:  {}", config.schedule.clear_enabled);
        }
        Commands::Endpoints { action } => edit_endpoints(&cli.config, config, action)?,
        Commands::Logs {
            search,
            page,
            per_page,
            sort,
            asc,
        } => {
            let interceptor = interceptor(config)?;
            let query = LogQuery {
                search,
                page,
                page_size: per_page.unwrap_or(interceptor.config().load().store.logs_per_page),
                sort: SortOrder {
                    column: sort.into(),
                    ascending: asc,
                },
            };
            let page = interceptor.logs().query(&query)?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Clear => {
            let removed = interceptor(config)?.clear_logs(ClearTrigger::Manual)?;
            println!("Removed {removed} log rows");
        }
        Commands::Uninstall => {
            interceptor(config)?.logs().teardown()?;
            println!("Log table removed");
        }
        Commands::Send {
            url,
            fields,
            user_agent,
            json,
        } => send(config, url, fields, user_agent, json).await?,
        Commands::Run => run(&cli.config, config).await?,
    }

    Ok(())
}

fn interceptor(config: ModifierConfig) -> Result<UpdateInterceptor, Box<dyn std::error::Error>> {
    let store = open_store(&config.store)?;
    Ok(UpdateInterceptor::new(SharedConfig::new(config), store))
}

fn edit_endpoints(path: &Path, mut config: ModifierConfig, action: EndpointAction) -> Result<(), ConfigError> {
    let mut endpoints = config.interception.endpoints.clone();
    match action {
        EndpointAction::List => {
            for endpoint in &endpoints {
                println!("{endpoint}");
            }
            return Ok(());
        }
        EndpointAction::Add { url } => endpoints.push(url),
        EndpointAction::Remove { url } => {
            let wanted = url.trim();
            endpoints.retain(|endpoint| endpoint != wanted);
        }
    }

    config
        .interception
        .set_endpoints(&endpoints)
        .map_err(ConfigError::Validation)?;
    save_config(path, &config)?;
    println!("{} endpoints configured", config.interception.endpoints.len());
    Ok(())
}

async fn send(
    config: ModifierConfig,
    url: String,
    fields: Vec<(String, String)>,
    user_agent: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let interceptor = Arc::new(interceptor(config)?);
    let client = build_client(interceptor.clone())?;

    let mut builder = Request::builder().uri(&url);
    if let Some(user_agent) = &user_agent {
        builder = builder.header(USER_AGENT, user_agent);
    }

    let request = if fields.is_empty() {
        builder.method(Method::GET).body(Body::empty())?
    } else {
        let (encoding, content_type) = if json {
            (BodyEncoding::Json, "application/json")
        } else {
            (BodyEncoding::Form, "application/x-www-form-urlencoded")
        };
        let fields: Map<String, Value> = fields.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        let body = RequestBody::Fields { encoding, fields }.encode();
        builder
            .method(Method::POST)
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))?
    };

    match client.oneshot(request).await {
        Ok(response) => println!("{} {}", response.status(), url),
        Err(e) => println!("request failed: {e}"),
    }

    let latest = interceptor.logs().query(&LogQuery {
        page_size: 1,
        ..LogQuery::default()
    })?;
    if let Some(row) = latest.rows.first() {
        println!("{}", serde_json::to_string_pretty(row)?);
    }
    Ok(())
}

async fn run(path: &Path, config: ModifierConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        endpoints = config.interception.endpoints.len(),
        clear_interval_secs = config.schedule.clear_interval_secs,
        "update-request-modifier starting"
    );

    if let Some(listen) = config.observability.metrics_listen {
        metrics::install_exporter(listen)?;
    }

    let interceptor = Arc::new(interceptor(config)?);
    let shutdown = Shutdown::new();

    // keep the watcher alive for the lifetime of run()
    let _watcher = if path.exists() {
        Some(ConfigReloader::new(path, interceptor.config().clone()).watch()?)
    } else {
        tracing::warn!(path = %path.display(), "No config file, hot reload disabled");
        None
    };

    let scheduler = tokio::spawn(ClearScheduler::from_config(interceptor.clone()).run(shutdown.subscribe()));

    shutdown.trigger_on(shutdown_signal()).await;

    let _ = scheduler.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
