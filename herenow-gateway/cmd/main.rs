//! HereNow 网关服务
//!
//! ```text
//! herenow-gateway [-v] [-P <port>] [-c <config>] start
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use herenow_core::config::load_config;
use herenow_core::tracing::init_tracing_from_config;
use herenow_gateway::ApplicationBootstrap;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "herenow-gateway", about = "HereNow real-time gateway", disable_version_flag = true)]
struct Cli {
    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Listen port (overrides configuration)
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Configuration file or directory
    #[arg(short = 'c', long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the service
    Start,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    let Some(Command::Start) = cli.command else {
        let _ = Cli::command().print_help();
        println!();
        return;
    };

    let mut config = load_config(cli.config.as_deref()).clone();
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_tracing_from_config(Some(&config.logging));

    if let Err(err) = ApplicationBootstrap::run(&config).await {
        error!(error = %format!("{err:#}"), "gateway exited with error");
        std::process::exit(1);
    }
}
