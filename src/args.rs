use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};

use crate::udp_session::UdpConfig;

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
pub enum Transport {
    Tcp,
    Udp,
}

/// IPK25-CHAT protocol client
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// transport variant to use
    #[arg(short = 't', value_enum)]
    pub transport: Transport,

    /// server hostname or IPv4 address
    #[arg(short = 's')]
    pub server: String,

    /// server port
    #[arg(short = 'p', default_value_t = 4567)]
    pub port: u16,

    /// UDP confirmation timeout in milliseconds
    #[arg(short = 'd', default_value_t = 250)]
    pub confirm_timeout_ms: u16,

    /// maximum number of UDP retransmissions
    #[arg(short = 'r', default_value_t = 3)]
    pub max_retransmissions: u8,
}

impl Args {
    /// Resolve `-s` to a concrete IPv4 socket address.
    pub async fn resolve_server_addr(&self) -> anyhow::Result<SocketAddr> {
        tokio::net::lookup_host((self.server.as_str(), self.port))
            .await
            .with_context(|| format!("couldn't resolve server address '{}'", self.server))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| anyhow!("no IPv4 address found for '{}'", self.server))
    }

    pub fn udp_config(&self) -> UdpConfig {
        UdpConfig {
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms as u64),
            max_retransmissions: self.max_retransmissions,
        }
    }
}
