use std::path::PathBuf;

use clap::Parser;

/// Transparent TCP redirector that tunnels intercepted connections
/// through an osocks relay server.
#[derive(Debug, Parser)]
#[command(name = "ioredir", version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,
}
