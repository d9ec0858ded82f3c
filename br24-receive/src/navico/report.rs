use std::net::SocketAddrV4;

use br24_core::protocol::report::parse_report;
use br24_core::{DispatchEvent, Model, RadarState, Report, ReportDispatcher};

/// What the caller should publish after releasing the state lock
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ReportOutcome {
    /// The datagram is a radar report
    pub accepted: bool,
    pub status: Option<String>,
    pub build_info: Option<String>,
}

/// Decodes report datagrams and applies them to the radar state
pub(crate) struct ReportProcessor {
    key: String,
    dispatcher: ReportDispatcher,
    reported_unknown: [bool; 256],
    reported_unknown_model: bool,
}

impl ReportProcessor {
    pub fn new(key: &str) -> Self {
        ReportProcessor {
            key: key.to_string(),
            dispatcher: ReportDispatcher::new(),
            reported_unknown: [false; 256],
            reported_unknown_model: false,
        }
    }

    /// Process one report datagram from `from` with the state locked
    pub fn process_report(
        &mut self,
        data: &[u8],
        from: SocketAddrV4,
        state: &mut RadarState,
        now_ms: u64,
    ) -> ReportOutcome {
        state.refresh_radar_timeout(now_ms);

        let report = match parse_report(data) {
            Ok(report) => report,
            Err(e) => {
                log::trace!("{}: ignoring {} byte datagram: {}", self.key, data.len(), e);
                return ReportOutcome::default();
            }
        };

        match &report {
            Report::Unrecognized { length, kind } | Report::Secondary { length, kind } => {
                if !self.reported_unknown[*kind as usize] {
                    self.reported_unknown[*kind as usize] = true;
                    log::trace!(
                        "{}: report {:02X} {:02X} length {}: {:02X?}",
                        self.key,
                        kind,
                        data[1],
                        length,
                        data
                    );
                }
            }
            Report::Settings(s) => {
                log::debug!(
                    "{}: state range={} gain={} sea={} rain={} if_rejection={} tgt_boost={} tgt_expansion={}",
                    self.key,
                    s.range,
                    s.gain,
                    s.sea,
                    s.rain,
                    s.interference_rejection,
                    s.target_boost,
                    s.target_expansion
                );
            }
            Report::Identification(id) => {
                log::debug!("{}: radar_type={:02X}", self.key, id.radar_type);
            }
            other => {
                log::debug!("{}: {:?}", self.key, other);
            }
        }

        let mut outcome = ReportOutcome {
            accepted: true,
            ..Default::default()
        };

        match self.dispatcher.dispatch(&report, state, now_ms) {
            Some(DispatchEvent::StatusChanged(status)) => {
                log::info!("{}: reports status {}", self.key, status.label());
                outcome.status = Some(format!("{} IP {} {}", self.key, from, status.label()));
            }
            Some(DispatchEvent::BuildInfo { text, model }) => {
                if model == Model::Unknown {
                    if !self.reported_unknown_model {
                        self.reported_unknown_model = true;
                        log::info!("{}: unknown radar type", self.key);
                    }
                } else {
                    log::info!("{}: radar report tells us this is a Navico {}", self.key, model);
                }
                outcome.build_info = Some(text);
            }
            None => {}
        }

        outcome
    }
}
