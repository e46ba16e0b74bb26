use std::{net::IpAddr, path::PathBuf};

use clap::Parser;
use indoor_telemetry::server::DEFAULT_PORT;

#[derive(Debug, Parser)]
pub struct Args {
    /// Address to bind; defaults to the address the host name resolves to.
    #[arg(long, env = "COAP_BIND_ADDR")]
    pub bind: Option<IpAddr>,

    #[arg(long, env = "COAP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// SQLite file; defaults to `data.db` next to the executable.
    #[arg(long, env = "TELEMETRY_DATABASE")]
    pub database: Option<PathBuf>,
}
