// ============================================================================
// Configuration and CLI
// ============================================================================

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "proxysync",
    about = "Renders HAProxy and Nginx configs from discovered backends"
)]
pub struct Config {
    /// JSON service manifest with the generator sections
    #[arg(long, short, env = "PROXYSYNC_CONFIG")]
    pub config: PathBuf,

    /// Health check server port (0 disables it)
    #[arg(long, env = "HEALTH_PORT", default_value = "8080")]
    pub health_port: u16,

    /// Restart clock tick interval (milliseconds)
    #[arg(long, env = "TICK_MS", default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,

    /// Re-render every N ticks even without manifest changes (0 disables it)
    #[arg(long, env = "RESYNC_TICKS", default_value = "10")]
    pub resync_ticks: u64,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = Config::try_parse_from(["proxysync", "--config", "/etc/proxysync.json"]).unwrap();
        assert_eq!(config.config, PathBuf::from("/etc/proxysync.json"));
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.resync_ticks, 10);
        assert!(!config.log_json);
    }

    #[test]
    fn zero_tick_is_rejected() {
        assert!(Config::try_parse_from(["proxysync", "-c", "x.json", "--tick-ms", "0"]).is_err());
    }

    #[test]
    fn config_is_required() {
        assert!(Config::try_parse_from(["proxysync"]).is_err());
    }
}
