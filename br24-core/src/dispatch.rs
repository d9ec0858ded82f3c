//! Report dispatcher: applies decoded reports to the radar state.
//!
//! Raw 0..255 device scales become 0..100 here. Controls in automatic mode get
//! a value from the auto sentinel range instead; how "auto" is encoded differs
//! per control.

use crate::protocol::report::{
    IdentificationReport, InstallationReport, Model, RadarStatus, Report, ScanReport,
    SettingsReport,
};
use crate::state::{ControlValue, RadarOperatingState, RadarState, AUTO_RANGE};

/// Something the caller should pass on to the outside world
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// The status byte changed
    StatusChanged(RadarStatus),
    /// Firmware build information arrived
    BuildInfo { text: String, model: Model },
}

/// Scale a 0..255 device value to 0..100
fn percent(raw: u32) -> i32 {
    (raw as u64 * 100 / 255) as i32
}

/// Tenths of a degree to whole degrees in (-180, 180]
fn bearing_alignment(raw: u16) -> i32 {
    let degrees = (raw as i32 / 10).rem_euclid(360);
    if degrees > 180 {
        degrees - 360
    } else {
        degrees
    }
}

/// Applies reports to a [`RadarState`]. Remembers the last status byte so a
/// status is only acted on when it changes.
#[derive(Debug, Default)]
pub struct ReportDispatcher {
    last_status: Option<u8>,
}

impl ReportDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(
        &mut self,
        report: &Report,
        state: &mut RadarState,
        now_ms: u64,
    ) -> Option<DispatchEvent> {
        match report {
            Report::Status(s) => self.status(s.status, state, now_ms),
            Report::Settings(s) => {
                settings(s, state);
                None
            }
            Report::Identification(id) => Some(identification(id, state)),
            Report::Installation(i) => {
                installation(i, state);
                None
            }
            Report::Scan(s) => {
                scan(s, state);
                None
            }
            Report::Unrecognized { .. } | Report::Secondary { .. } => None,
        }
    }

    fn status(&mut self, status: u8, state: &mut RadarState, now_ms: u64) -> Option<DispatchEvent> {
        if self.last_status == Some(status) {
            return None;
        }
        self.last_status = Some(status);

        let status = RadarStatus::from_byte(status);
        match status {
            RadarStatus::Standby => {
                state.operating.update(RadarOperatingState::Standby, now_ms);
            }
            RadarStatus::Transmit => {
                state.operating.update(RadarOperatingState::Transmit, now_ms);
            }
            RadarStatus::WakingUp => {
                state.operating.update(RadarOperatingState::WakingUp, now_ms);
                // data is expected soon, not yet
                state.refresh_data_timeout(now_ms);
            }
            RadarStatus::Unknown(_) => {}
        }
        Some(DispatchEvent::StatusChanged(status))
    }
}

fn settings(s: &SettingsReport, state: &mut RadarState) {
    let controls = &mut state.controls;

    if s.gain_auto == 1 {
        controls.gain.update(ControlValue::AUTO);
    } else {
        controls.gain.update(percent(s.gain as u32));
    }
    controls.rain.update(percent(s.rain as u32));
    if s.sea_auto > 0 {
        controls.sea.update(AUTO_RANGE - s.sea_auto as i32);
    } else {
        controls.sea.update(percent(s.sea));
    }
    controls.target_boost.update(s.target_boost as i32);
    controls
        .interference_rejection
        .update(s.interference_rejection as i32);
    controls.target_expansion.update(s.target_expansion as i32);
    controls.range.update((s.range / 10) as i32);
}

fn identification(id: &IdentificationReport, state: &mut RadarState) -> DispatchEvent {
    let model = id.model();
    if model != Model::Unknown {
        state.model = model;
    }
    DispatchEvent::BuildInfo {
        text: id.build_info(),
        model,
    }
}

fn installation(i: &InstallationReport, state: &mut RadarState) {
    state
        .controls
        .bearing_alignment
        .update(bearing_alignment(i.bearing_alignment));
    state
        .controls
        .antenna_height
        .update(i.antenna_height as i32 / 1000);
}

fn scan(s: &ScanReport, state: &mut RadarState) {
    let controls = &mut state.controls;

    controls.scan_speed.update(s.scan_speed as i32);
    controls.noise_rejection.update(s.noise_rejection as i32);
    controls.target_separation.update(s.target_separation as i32);
    if s.sls_auto == 1 {
        controls.side_lobe_suppression.update(ControlValue::AUTO);
    } else {
        controls
            .side_lobe_suppression
            .update(percent(s.side_lobe_suppression as u32));
    }
    controls
        .local_interference_rejection
        .update(s.local_interference_rejection as i32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::report::{parse_report, StatusReport};

    fn settings_report(gain_auto: u32, gain: u8, sea_auto: u8, sea: u32) -> Report {
        Report::Settings(SettingsReport {
            range: 18520,
            gain_auto,
            gain,
            sea_auto,
            sea,
            rain: 255,
            interference_rejection: 2,
            target_expansion: 1,
            target_boost: 3,
        })
    }

    #[test]
    fn test_status_transitions() {
        let mut d = ReportDispatcher::new();
        let mut state = RadarState::new();

        let ev = d.dispatch(&Report::Status(StatusReport { status: 1 }), &mut state, 10);
        assert_eq!(ev, Some(DispatchEvent::StatusChanged(RadarStatus::Standby)));
        assert_eq!(state.operating.get(), RadarOperatingState::Standby);

        // repeat of the same status does nothing
        let ev = d.dispatch(&Report::Status(StatusReport { status: 1 }), &mut state, 20);
        assert_eq!(ev, None);

        let ev = d.dispatch(&Report::Status(StatusReport { status: 5 }), &mut state, 30);
        assert_eq!(ev, Some(DispatchEvent::StatusChanged(RadarStatus::WakingUp)));
        assert_eq!(state.operating.get(), RadarOperatingState::WakingUp);
        assert_eq!(state.data_timeout_ms, 30 + crate::state::DATA_TIMEOUT_MS);

        let ev = d.dispatch(&Report::Status(StatusReport { status: 2 }), &mut state, 40);
        assert_eq!(ev, Some(DispatchEvent::StatusChanged(RadarStatus::Transmit)));
        assert_eq!(state.operating.get(), RadarOperatingState::Transmit);
    }

    #[test]
    fn test_unknown_status_keeps_state() {
        let mut d = ReportDispatcher::new();
        let mut state = RadarState::new();
        d.dispatch(&Report::Status(StatusReport { status: 2 }), &mut state, 0);

        let ev = d.dispatch(&Report::Status(StatusReport { status: 9 }), &mut state, 1);
        assert_eq!(ev, Some(DispatchEvent::StatusChanged(RadarStatus::Unknown(9))));
        assert_eq!(state.operating.get(), RadarOperatingState::Transmit);
    }

    #[test]
    fn test_settings_scaling() {
        let mut d = ReportDispatcher::new();
        let mut state = RadarState::new();
        d.dispatch(&settings_report(0, 128, 0, 51), &mut state, 0);

        let c = &state.controls;
        assert_eq!(c.gain.value, 50);
        assert_eq!(c.sea.value, 20);
        assert_eq!(c.rain.value, 100);
        assert_eq!(c.interference_rejection.value, 2);
        assert_eq!(c.target_expansion.value, 1);
        assert_eq!(c.target_boost.value, 3);
        assert_eq!(c.range.value, 1852);
        assert!(c.gain.modified);
    }

    #[test]
    fn test_gain_auto_ignores_raw_gain() {
        for gain in [0u8, 77, 255] {
            let mut state = RadarState::new();
            ReportDispatcher::new().dispatch(&settings_report(1, gain, 0, 0), &mut state, 0);
            assert_eq!(state.controls.gain.value, ControlValue::AUTO);
            assert!(state.controls.gain.is_auto());
        }
    }

    #[test]
    fn test_sea_auto_levels() {
        let mut state = RadarState::new();
        let mut d = ReportDispatcher::new();
        d.dispatch(&settings_report(0, 0, 1, 200), &mut state, 0);
        assert_eq!(state.controls.sea.value, AUTO_RANGE - 1);
        d.dispatch(&settings_report(0, 0, 2, 200), &mut state, 0);
        assert_eq!(state.controls.sea.value, AUTO_RANGE - 2);
        assert!(state.controls.sea.is_auto());
    }

    #[test]
    fn test_installation() {
        let mut state = RadarState::new();
        let mut d = ReportDispatcher::new();
        let report = |ba, ah| {
            Report::Installation(InstallationReport {
                bearing_alignment: ba,
                antenna_height: ah,
            })
        };

        d.dispatch(&report(3550, 4500), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, -5);
        assert_eq!(state.controls.antenna_height.value, 4);

        d.dispatch(&report(1800, 999), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, 180);
        assert_eq!(state.controls.antenna_height.value, 0);

        d.dispatch(&report(1810, 0), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, -179);

        // past a full turn still lands in (-180, 180]
        d.dispatch(&report(6000, 0), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, -120);
        d.dispatch(&report(3600, 0), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, 0);
        d.dispatch(&report(65535, 0), &mut state, 0);
        assert_eq!(state.controls.bearing_alignment.value, 73);
    }

    #[test]
    fn test_scan() {
        let mut state = RadarState::new();
        let mut d = ReportDispatcher::new();
        let mut report = ScanReport {
            local_interference_rejection: 1,
            scan_speed: 1,
            sls_auto: 0,
            side_lobe_suppression: 255,
            noise_rejection: 2,
            target_separation: 3,
        };
        d.dispatch(&Report::Scan(report), &mut state, 0);
        let c = &state.controls;
        assert_eq!(c.side_lobe_suppression.value, 100);
        assert_eq!(c.scan_speed.value, 1);
        assert_eq!(c.noise_rejection.value, 2);
        assert_eq!(c.target_separation.value, 3);
        assert_eq!(c.local_interference_rejection.value, 1);

        report.sls_auto = 1;
        d.dispatch(&Report::Scan(report), &mut state, 0);
        assert_eq!(state.controls.side_lobe_suppression.value, ControlValue::AUTO);
    }

    #[test]
    fn test_identification() {
        let mut state = RadarState::new();
        let ev = ReportDispatcher::new().dispatch(
            &Report::Identification(IdentificationReport {
                radar_type: 0x08,
                firmware_date: "Jan 1 2015".into(),
                firmware_time: "12:00".into(),
            }),
            &mut state,
            0,
        );
        assert_eq!(
            ev,
            Some(DispatchEvent::BuildInfo {
                text: "Firmware date: Jan 1 2015 12:00".into(),
                model: Model::Gen3
            })
        );
        assert_eq!(state.model, Model::Gen3);
    }

    #[test]
    fn test_unrecognized_never_mutates() {
        let mut d = ReportDispatcher::new();
        let mut state = RadarState::new();
        state.controls.gain.update(33);
        state.controls.acknowledge_all();
        let before = state.controls.clone();

        for (kind, len) in [(0x01u8, 17usize), (0x02, 98), (0x07, 188), (0x08, 21), (0x05, 564)] {
            let mut data = vec![kind, 0xC4];
            data.resize(len, 0xff);
            let report = parse_report(&data).unwrap();
            assert!(matches!(report, Report::Unrecognized { .. }));
            assert_eq!(d.dispatch(&report, &mut state, 0), None);
        }
        let secondary = parse_report(&[0x10, 0xF5, 1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(d.dispatch(&secondary, &mut state, 0), None);

        assert_eq!(state.controls, before);
        assert_eq!(state.operating.get(), RadarOperatingState::Off);
    }
}
