use clap::Parser;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::network::{DEFAULT_API_PORT, DEFAULT_API_TOKEN};
use pkg_constants::paths::{DEFAULT_SERVER_CONFIG, DEFAULT_SERVER_DATA_DIR};
use pkg_controllers::ProvisioningSettings;
use pkg_types::config::{ServerConfigFile, load_config_file};
use pkg_types::rbac::check_role_tables;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "tenantd", about = "Tenant project provisioning and access reconciliation")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Bearer token required on every API request
    #[arg(long)]
    token: Option<String>,

    /// Log output: `text` or `json`
    #[arg(long)]
    log_format: Option<String>,

    /// Logins per second allowed from one client address (0 disables)
    #[arg(long)]
    login_rate_limit: Option<f64>,

    /// Keep all state in memory instead of SlateDB
    #[arg(long)]
    in_memory: bool,
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;

    // Merge: CLI args > config file > defaults
    let log_format = cli
        .log_format
        .or_else(|| file_cfg.log_format.clone())
        .unwrap_or_else(|| "text".to_string());
    init_tracing(&log_format);
    info!("Config file: {}", cli.config);

    check_role_tables()?;

    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_API_PORT);
    let data_dir = if cli.in_memory {
        None
    } else {
        Some(
            cli.data_dir
                .or_else(|| file_cfg.data_dir.clone())
                .unwrap_or_else(|| DEFAULT_SERVER_DATA_DIR.to_string()),
        )
    };
    let token = cli
        .token
        .or_else(|| file_cfg.token.clone())
        .unwrap_or_else(|| DEFAULT_API_TOKEN.to_string());
    let settings = ProvisioningSettings::from_config(&file_cfg);
    let login_rate_limit = cli.login_rate_limit.or(file_cfg.login_rate_limit);

    info!("Starting tenantd");
    info!("  Port:      {}", port);
    info!("  Data dir:  {}", data_dir.as_deref().unwrap_or("<memory>"));
    info!("  Token:     {}***", token.chars().take(4).collect::<String>());
    info!("  Tenant quota: {} resources", settings.tenant_quota.len());

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        data_dir,
        token,
        settings,
        login_rate_limit,
    };

    start_server(config).await?;

    Ok(())
}
