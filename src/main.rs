use std::sync::Arc;

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use ingress_gateway::{
    adapters::{
        FileSnapshotProvider, HttpClientAdapter, HttpHandler, HttpSnapshotProvider, IngressServer,
    },
    config::{
        ServerConfigValidator,
        loader::load_config,
        models::{ClusterSource, ServerConfig},
    },
    core::{RebuildPipeline, RoutingTable, RoutingTableStore},
    metrics,
    ports::{http_client::HttpClient, snapshot_provider::SnapshotProvider},
    tracing_setup,
    utils::graceful_shutdown::{GracefulShutdown, ShutdownReason},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(flatten)]
    serve: ServeArgs,
}

/// Settings that override the configuration file and environment.
#[derive(clap::Args, Debug, Clone, Default)]
struct ServeArgs {
    /// Configuration file (YAML, JSON or TOML)
    #[clap(short, long)]
    config: Option<String>,

    /// Address both listeners bind to
    #[clap(long)]
    host: Option<String>,

    /// Plain HTTP port
    #[clap(long)]
    port: Option<u16>,

    /// TLS port
    #[clap(long)]
    tls_port: Option<u16>,

    /// Cluster manifest path or http(s) URL
    #[clap(long)]
    cluster_source: Option<String>,

    /// Quiet period before rebuilding after changes (e.g. 500ms, 2s)
    #[clap(long)]
    quiescence_window: Option<String>,

    /// Log filter directive (e.g. info, ingress_gateway=debug)
    #[clap(long)]
    log_level: Option<String>,

    /// Human readable logs instead of JSON
    #[clap(long)]
    pretty_logs: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the gateway (default)
    Serve(ServeArgs),
    /// Validate the configuration and print the routing table built from the cluster source
    Validate(ServeArgs),
}

impl ServeArgs {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tls_port) = self.tls_port {
            config.tls_port = tls_port;
        }
        if let Some(source) = &self.cluster_source {
            config.cluster_source = source.clone();
        }
        if let Some(window) = &self.quiescence_window {
            config.quiescence_window = window.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.pretty_logs {
            config.logging.json = false;
        }
    }

    async fn load(&self) -> Result<ServerConfig> {
        let mut config = load_config(self.config.as_deref())
            .await
            .wrap_err("Failed to load configuration")?;
        self.apply(&mut config);
        Ok(config)
    }
}

fn create_snapshot_provider(config: &ServerConfig) -> Result<Arc<dyn SnapshotProvider>> {
    match config.source_kind() {
        ClusterSource::Http(url) => {
            let poll_interval = config
                .poll_interval_duration()
                .wrap_err("Invalid poll_interval")?;
            Ok(Arc::new(
                HttpSnapshotProvider::new(url, poll_interval)
                    .wrap_err("Failed to create HTTP snapshot provider")?,
            ))
        }
        ClusterSource::File(path) => Ok(Arc::new(
            FileSnapshotProvider::new(&path)
                .with_context(|| format!("Failed to watch {}", path.display()))?,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate(validate)) => validate_command(&validate).await,
        Some(Commands::Serve(serve)) => serve_command(&serve).await,
        None => serve_command(&args.serve).await,
    }
}

async fn serve_command(args: &ServeArgs) -> Result<()> {
    let config = args.load().await?;
    ServerConfigValidator::validate(&config).wrap_err("Invalid configuration")?;

    tracing_setup::init_tracing(&config.logging)?;
    metrics::init_metrics();

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already.",
            e
        );
    }

    let quiescence_window = config
        .quiescence_window_duration()
        .wrap_err("Invalid quiescence_window")?;
    let resync_interval = config
        .resync_interval_duration()
        .wrap_err("Invalid resync_interval")?;
    let shutdown_timeout = config
        .shutdown_timeout_duration()
        .wrap_err("Invalid shutdown_timeout")?;
    let plain_addr = config.plain_addr().wrap_err("Invalid bind address")?;
    let tls_addr = config.tls_addr().wrap_err("Invalid bind address")?;

    tracing::info!(
        source = %config.cluster_source,
        plain = %plain_addr,
        tls = %tls_addr,
        window = %config.quiescence_window,
        resync = %config.resync_interval,
        "Starting ingress gateway"
    );

    let store = Arc::new(RoutingTableStore::new());
    let snapshot_provider =
        create_snapshot_provider(&config).context("Failed to create snapshot provider")?;
    let pipeline = Arc::new(
        RebuildPipeline::new(snapshot_provider, store.clone(), quiescence_window)
            .with_resync_interval(resync_interval),
    );

    let graceful_shutdown = Arc::new(GracefulShutdown::with_timeout(shutdown_timeout));
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let http_handler = Arc::new(HttpHandler::new(store.clone(), http_client));

    let server = IngressServer::bind(plain_addr, tls_addr, http_handler, store)
        .await
        .context("Failed to start listeners")?;

    let pipeline_task = {
        let token = graceful_shutdown.shutdown_token();
        tokio::spawn(async move { pipeline.run(token).await })
    };

    let server_result = server.serve(graceful_shutdown.clone()).await;

    // Listeners only return on shutdown or failure; make sure the pipeline follows.
    graceful_shutdown.trigger_shutdown(ShutdownReason::Graceful);
    if let Err(e) = pipeline_task.await {
        tracing::error!("Rebuild pipeline task failed: {}", e);
    }

    server_result.context("Listener failed")?;
    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration, build one routing table from the cluster source and print it.
async fn validate_command(args: &ServeArgs) -> Result<()> {
    tracing_setup::init_console_tracing()?;

    let config = args.load().await?;
    println!("🔍 Validating configuration");

    if let Err(e) = ServerConfigValidator::validate(&config) {
        eprintln!("❌ Configuration validation failed:");
        eprintln!("{e}");
        std::process::exit(1);
    }
    println!("✅ Configuration validation: OK");

    let provider = create_snapshot_provider(&config)?;
    let snapshot = match provider.list_ingress_rules().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("❌ Cluster source {} unusable:", config.cluster_source);
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };
    let table = RoutingTable::build(Some(&snapshot));

    println!();
    println!("📋 Routing Summary ({}):", config.cluster_source);
    println!("   • Ingresses: {}", snapshot.ingresses.len());
    println!("   • TLS certificates: {}", snapshot.certificates.len());
    println!("   • Hosts with TLS: {}", table.certificate_host_count());
    println!("   • Hosts: {}", table.host_count());
    for (host, backends) in table.hosts() {
        let host = if host.is_empty() { "<no host>" } else { host };
        println!("     {host}");
        for backend in backends {
            println!("       {backend}");
        }
    }
    Ok(())
}
