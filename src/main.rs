use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::runtime::Builder;

use dv_router::{RouterConfig, RouterEngine, RouterSettings, Termination};

// Either the router id alone or all four positionals.
#[derive(Parser)]
#[command(name = "dv-router", about = "Distance-vector router node")]
struct Cli {
    /// Router id, 0..=998
    #[arg(allow_negative_numbers = true, required_unless_present = "config")]
    router_id: Option<i64>,

    /// Host name of the relay server
    #[arg(requires_all = ["server_port", "update_interval"])]
    server_name: Option<String>,

    /// TCP port of the relay server
    server_port: Option<u16>,

    /// Routing update interval in milliseconds
    #[arg(allow_negative_numbers = true)]
    update_interval: Option<i64>,

    /// JSON file with router settings, used instead of positional arguments
    #[arg(
        long,
        conflicts_with_all = ["router_id", "server_name", "server_port", "update_interval"]
    )]
    config: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<RouterSettings> {
        if let Some(path) = &self.config {
            return Ok(RouterSettings::load(path)?);
        }

        let mut settings = RouterSettings::default();
        if let Some(id) = self.router_id {
            settings.router_id = id;
        }
        if let Some(name) = &self.server_name {
            settings.server_name = name.clone();
        }
        if let Some(port) = self.server_port {
            settings.server_port = port;
        }
        if let Some(interval) = self.update_interval {
            settings.update_interval_ms = interval;
        }
        Ok(settings)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    println!("starting Router #{} with parameters:", settings.router_id);
    println!("Relay server host name: {}", settings.server_name);
    println!("Relay server port number: {}", settings.server_port);
    println!("Routing update interval: {} (milli-seconds)", settings.update_interval_ms);

    let config = RouterConfig::from_settings(&settings)?;
    let router_id = config.router_id;

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = rt.block_on(async {
        let mut engine = RouterEngine::new(config);
        engine.start().await
    });

    match &report.termination {
        Termination::Quit => println!("Router terminated normally"),
        other => println!("Router terminated: {}", other),
    }

    println!();
    println!("Routing Table at Router #{}", router_id);
    print!("{}", report.table);

    if let Termination::HandshakeFailed(e) = report.termination {
        anyhow::bail!("handshake with relay failed: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dv-router").chain(args.iter().copied()))
    }

    #[test]
    fn router_id_alone_uses_default_relay() {
        let settings = parse(&["3"]).unwrap().settings().unwrap();
        assert_eq!(settings.router_id, 3);
        assert_eq!(settings.server_name, "localhost");
        assert_eq!(settings.server_port, 2227);
        assert_eq!(settings.update_interval_ms, 1000);
    }

    #[test]
    fn all_four_positionals() {
        let settings = parse(&["2", "relay.local", "4000", "250"])
            .unwrap()
            .settings()
            .unwrap();
        assert_eq!(settings.router_id, 2);
        assert_eq!(settings.server_name, "relay.local");
        assert_eq!(settings.server_port, 4000);
        assert_eq!(settings.update_interval_ms, 250);
    }

    #[test]
    fn partial_positionals_are_rejected() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["2", "relay.local"]).is_err());
        assert!(parse(&["2", "relay.local", "4000"]).is_err());
    }

    #[test]
    fn config_file_replaces_positionals() {
        assert!(parse(&["--config", "router.json"]).is_ok());
        assert!(parse(&["2", "--config", "router.json"]).is_err());
    }
}
