extern crate tokio;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use miette::{miette, Result};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use br24_receive::navico::NavicoReceive;
use br24_receive::radar::{RadarError, RadarHost, ReceiveSettings};
use br24_receive::{Cli, VERSION};

/// Stand-alone host: no navigation data, everything the radar tells us is logged
struct LoggingHost {
    key: String,
}

impl RadarHost for LoggingHost {
    fn radar_position(&self) -> Option<(f64, f64)> {
        None
    }

    fn heading_true(&self) -> f64 {
        0.0
    }

    fn set_radar_heading(&self, heading: Option<(f64, bool)>) {
        log::trace!("{}: radar heading {:?}", self.key, heading);
    }

    fn detected_radar(&self, interface: Ipv4Addr, radar: SocketAddrV4) {
        info!("{}: radar at {} via interface {}", self.key, radar, interface);
    }

    fn set_build_info(&self, info: &str) {
        info!("{}: {}", self.key, info);
    }

    fn set_status(&self, status: &str) {
        debug!("{}: status '{}'", self.key, status);
    }
}

fn load_settings(path: &Path) -> anyhow::Result<ReceiveSettings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read settings file {}", path.display()))?;
    let settings = serde_json::from_str(&text)
        .with_context(|| format!("Cannot parse settings file {}", path.display()))?;
    Ok(settings)
}

struct Receiver {
    args: Cli,
    settings: ReceiveSettings,
}

impl Receiver {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), RadarError> {
        let key = self.args.radar.to_string();
        let host = Arc::new(LoggingHost { key: key.clone() });
        let mut receiver = NavicoReceive::start(self.args.radar, self.settings, host)?;

        let mut status_interval =
            tokio::time::interval(Duration::from_secs(self.args.status_interval.max(1)));
        let deadline = self
            .args
            .duration
            .map(|seconds| Instant::now() + Duration::from_secs(seconds));

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    break;
                },
                _ = status_interval.tick() => {
                    let state = receiver.state().snapshot();
                    info!(
                        "{}: {} | {} | {}",
                        key,
                        receiver.status(),
                        state.operating.get(),
                        state.statistics
                    );
                    if log::log_enabled!(log::Level::Debug) {
                        match serde_json::to_string(&state) {
                            Ok(json) => debug!("{}: {}", key, json),
                            Err(e) => warn!("{}: cannot serialize state: {}", key, e),
                        }
                    }
                },
                _ = sleep_until_opt(deadline) => {
                    info!("{}: run time is over", key);
                    subsys.request_shutdown();
                    break;
                },
            }
        }

        receiver.shutdown();
        match tokio::task::spawn_blocking(move || receiver.wait_exited(Duration::from_secs(2)))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("{}: cannot wait for receive thread: {}", key, e);
                Ok(())
            }
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = args.verbose.log_level_filter();
    env_logger::Builder::from_env(Env::default())
        .filter_level(log_level)
        .init();

    info!("BR24 receive {} loglevel {}", VERSION, log_level);

    let base = match &args.settings {
        Some(path) => load_settings(path).map_err(|e| miette!("{:#}", e))?,
        None => ReceiveSettings::default(),
    };
    let settings = args.receive_settings(base);
    if settings.ignore_radar_heading {
        warn!("Ignoring the heading sent by the radar");
    }
    debug!("Receive settings {:?}", settings);

    let receiver = Receiver { args, settings };

    Toplevel::new(|s| async move {
        s.start(SubsystemBuilder::new("Receiver", |a| receiver.run(a)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_millis(5000))
    .await
    .map_err(Into::into)
}
