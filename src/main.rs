//! markup-proxy binary.
//!
//! ```text
//!     Client ──▶ http server ──▶ cache lookup ──HIT──▶ replay
//!                                     │
//!                                    MISS
//!                                     ▼
//!                                  backend
//!                                     │
//!                     configured HTML/XML type, 200, fits?
//!                         │ no                    │ yes
//!                         ▼                       ▼
//!                    pass through     parse → plugins → render → cache
//! ```

use std::path::PathBuf;

use clap::Parser;

use markup_proxy::lifecycle::{self, StartupOptions};

#[derive(Debug, Parser)]
#[command(name = "markup-proxy", version, about = "Caching reverse proxy with HTML/XML processing plugins")]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding listener.bind_address
    #[arg(short, long)]
    addr: Option<String>,

    /// Log level, overriding observability.log_level
    #[arg(long)]
    log_level: Option<String>,

    /// Reload automatically when the configuration file changes
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let options = StartupOptions {
        config_path: cli.config,
        bind_address: cli.addr,
        log_level: cli.log_level,
        watch: cli.watch,
    };

    if let Err(e) = lifecycle::run(options).await {
        tracing::error!(error = %e, "Startup failed");
        eprintln!("markup-proxy: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
