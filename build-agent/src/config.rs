// Agent configuration
// Command-line values with BUILD_AGENT_* environment fallbacks

use build_pipeline::queue::default_output_root;
use build_pipeline::QueueConfig;

use clap::Args;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RPC_PORT: u16 = 5511;
pub const DEFAULT_DISCOVERY_PORT: u16 = 5512;

/// Where builds are written and how often the queue polls for work
#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    /// Root output directory for builds
    #[arg(long, env = "BUILD_AGENT_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Queue poll interval in milliseconds
    #[arg(long, env = "BUILD_AGENT_POLL_INTERVAL_MS", default_value_t = 200)]
    pub poll_interval_ms: u64,
}

impl QueueArgs {
    pub fn output_root(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_root)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.output_root())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

/// Settings for a listening agent
#[derive(Args, Debug, Clone)]
pub struct AgentConfig {
    /// Name advertised to submitters (defaults to the host name)
    #[arg(long, env = "BUILD_AGENT_NAME")]
    pub name: Option<String>,

    /// Address the gRPC server listens on
    #[arg(long, env = "BUILD_AGENT_LISTEN", default_value_t = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_RPC_PORT)))]
    pub listen: SocketAddr,

    /// UDP port beacons are broadcast to
    #[arg(long, env = "BUILD_AGENT_DISCOVERY_PORT", default_value_t = DEFAULT_DISCOVERY_PORT)]
    pub discovery_port: u16,

    /// Milliseconds between discovery beacons
    #[arg(long, env = "BUILD_AGENT_BEACON_INTERVAL_MS", default_value_t = 2000)]
    pub beacon_interval_ms: u64,

    /// Do not broadcast discovery beacons
    #[arg(long, env = "BUILD_AGENT_NO_BEACON")]
    pub no_beacon: bool,

    #[command(flatten)]
    pub queue: QueueArgs,
}

impl AgentConfig {
    /// Configured name, else the host name, else a fixed fallback
    pub fn agent_name(&self) -> String {
        self.name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "build-agent".to_string())
    }

    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        agent: AgentConfig,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["build-agent"]).unwrap();
        let agent = cli.agent;

        assert_eq!(agent.listen.port(), DEFAULT_RPC_PORT);
        assert!(agent.listen.ip().is_unspecified());
        assert_eq!(agent.discovery_port, DEFAULT_DISCOVERY_PORT);
        assert_eq!(agent.beacon_interval(), Duration::from_secs(2));
        assert_eq!(
            agent.queue.queue_config().poll_interval,
            Duration::from_millis(200)
        );
        assert!(!agent.agent_name().is_empty());
    }

    #[test]
    fn test_explicit_values() {
        let cli = TestCli::try_parse_from([
            "build-agent",
            "--name",
            "linux-01",
            "--listen",
            "127.0.0.1:6000",
            "--discovery-port",
            "6001",
            "--output-dir",
            "/tmp/builds",
            "--no-beacon",
        ])
        .unwrap();
        let agent = cli.agent;

        assert_eq!(agent.agent_name(), "linux-01");
        assert_eq!(agent.listen, "127.0.0.1:6000".parse::<SocketAddr>().unwrap());
        assert_eq!(agent.discovery_port, 6001);
        assert!(agent.no_beacon);
        assert_eq!(agent.queue.output_root(), PathBuf::from("/tmp/builds"));
    }
}
