//! oscrpc - Request/reply RPC over OSC datagrams
//!
//! Serves a small set of demo procedures, or calls procedures on a running server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use oscrpc::config::{self, Config};
use oscrpc::protocol;
use oscrpc::{
    ClientConfig, ClientError, Procedure, ProcedureError, Registry, RpcClient, ServeMode, Server,
};

/// oscrpc - Request/reply RPC over OSC datagrams
#[derive(Parser)]
#[command(name = "oscrpc")]
#[command(author = "oscrpc Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Serve and call procedures over OSC/UDP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo procedures
    Serve {
        /// Interface to bind to
        #[arg(short, long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Dispatch each request before receiving the next
        #[arg(long)]
        inline: bool,
    },

    /// Call a procedure on a server
    Call {
        /// Procedure name
        procedure: String,

        /// Positional arguments
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,

        #[command(flatten)]
        target: Target,
    },

    /// List the procedures a server exposes
    List {
        #[command(flatten)]
        target: Target,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Server to talk to
#[derive(clap::Args)]
struct Target {
    /// Server host
    #[arg(short, long)]
    server: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Reply timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Target {
    fn apply(self, mut config: ClientConfig) -> ClientConfig {
        if let Some(server) = self.server {
            config.server = server;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { bind, port, inline } => {
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind_address = bind;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            if inline {
                server_config.mode = ServeMode::Inline;
            }
            run_server(server_config).await?;
        }
        Commands::Call {
            procedure,
            args,
            target,
        } => {
            let client = RpcClient::from_config(&target.apply(config.client.clone())).await?;
            match client.call(&procedure, args).await {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(ClientError::Fault(fault)) => anyhow::bail!("{} failed: {}", procedure, fault),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::List { target } => {
            let client = RpcClient::from_config(&target.apply(config.client.clone())).await?;
            for signature in client.list_procedures().await? {
                println!("{}", signature);
            }
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Procedures served by `oscrpc serve`
async fn demo_registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());

    registry
        .register(
            Procedure::new("add", |args| {
                args.expect_len(2)?;
                let x: i64 = args.get(0)?;
                let y: i64 = args.get(1)?;
                Ok(json!(x + y))
            })
            .param("x")
            .param("y"),
        )
        .await;

    registry
        .register(
            Procedure::new("div", |args| {
                args.expect_len(2)?;
                let x: f64 = args.get(0)?;
                let y: f64 = args.get(1)?;
                if y == 0.0 {
                    return Err(ProcedureError::failed("float division by zero"));
                }
                Ok(json!(x / y))
            })
            .typed_param("x", "f64")
            .typed_param("y", "f64")
            .returns("f64"),
        )
        .await;

    registry
}

/// Run the server until Ctrl+C
async fn run_server(server_config: oscrpc::ServerConfig) -> anyhow::Result<()> {
    let mut server = Server::new(server_config, demo_registry().await);
    let addr = server.start().await?;

    println!("Start serving on {}", addr);
    for signature in server.registry().list_signatures().await {
        println!("  {}{}", protocol::ADDRESS_PREFIX, signature);
    }
    println!("Press Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    println!("\nStopping server");

    server.stop().await?;
    Ok(())
}
