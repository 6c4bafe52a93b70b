use std::{future::IntoFuture, net::SocketAddr, path::Path, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{WrapErr, eyre},
};
use conduit::{
    GatewayService, HttpClientAdapter, HttpHandler,
    config::{GatewayConfigValidator, load_config, loader::load_config_unchecked},
    metrics, tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (YAML by default; .toml and .json by extension)
    #[clap(short, long, default_value = "config.yaml", global = true)]
    config: String,

    /// Log level or `tracing` filter directive; `RUST_LOG` takes precedence
    #[clap(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs instead of human readable ones
    #[clap(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file
    Validate,
    /// Initialize a new configuration file
    Init,
    /// Start the gateway server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(&args.config).await,
        Commands::Init => init_config_command(&args.config).await,
        Commands::Serve => {
            tracing_setup::init_tracing_with_config(&args.log_level, args.json_logs, true)?;
            serve(&args.config).await
        }
    }
}

async fn serve(config_path: &str) -> Result<()> {
    metrics::init_metrics();

    let config = load_config(config_path)
        .await
        .wrap_err_with(|| format!("Failed to load configuration from {config_path}"))?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .wrap_err_with(|| format!("Invalid listen address: {}", config.listen_addr))?;

    let http_client = Arc::new(
        HttpClientAdapter::from_config(&config.forwarding)
            .wrap_err("Failed to create HTTP client")?,
    );
    let gateway = Arc::new(GatewayService::new(&config, http_client)?);
    let app = Arc::new(HttpHandler::new(gateway)).router();

    // Create graceful shutdown manager
    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {:?}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        services = config.services.len(),
        "Conduit API Gateway listening on {}",
        addr
    );

    let drain_shutdown = graceful_shutdown.clone();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = drain_shutdown.wait_for_shutdown_signal().await;
        tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
    })
    .into_future();

    tokio::select! {
        result = server => {
            result.wrap_err("Server error")?;
            tracing::info!("Graceful shutdown completed");
        }
        _ = graceful_shutdown.drain_deadline() => {
            return Err(eyre!(
                "In-flight requests did not finish within {:?}",
                graceful_shutdown.drain_timeout()
            ));
        }
    }

    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let mut config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };
    GatewayConfigValidator::normalize(&mut config);

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Services: {}", config.services.len());
            for service in &config.services {
                println!(
                    "     - {} {} -> {} host(s){}{}",
                    service.name,
                    service.prefix,
                    service.hosts.len(),
                    if service.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
                        ", api key"
                    } else {
                        ""
                    },
                    match service.rate_limit {
                        Some(rate) if rate > 0.0 => format!(", {rate} req/s"),
                        _ => String::new(),
                    }
                );
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all hosts start with http:// or https://");
            println!("   • Give every service a unique name and a prefix");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8001')");
            println!("   • Use humantime durations such as '30s' or '500ms'");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Conduit API Gateway Configuration

# The address to listen on
listen_addr: "127.0.0.1:8001"

# Outbound connections to backends
forwarding:
  # request_timeout: "30s"
  pool_idle_timeout: "90s"
  pool_max_idle_per_host: 32
  max_body_bytes: 10485760

# Bucket capacity for rate limited services without their own `burst`
rate_limiting:
  burst: 10

# Services, matched by prefix in the order listed
services:
  - name: orders
    prefix: /orders
    hosts:
      - "http://127.0.0.1:9000"
      - "http://127.0.0.1:9001"
    port: 9000
    rate_limit: 2

  - name: vendors
    prefix: /vendors
    hosts:
      - "http://127.0.0.1:3001"
    port: 3001
    api_key: "change-me"
"#;

    tokio::fs::write(path, default_config)
        .await
        .wrap_err("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'conduit serve --config {config_path}' to start the server");
    Ok(())
}
