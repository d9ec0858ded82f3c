use std::time::Instant;

use br24_core::protocol::spoke::parse_frame;
use br24_core::{ParseError, RadarOperatingState, RadarState, SequenceTracker, SpokeMeta};

/// Heading sent by the radar: (degrees, is-true), or None when it has none
pub(crate) type RadarHeading = Option<(f64, bool)>;

/// Per-frame inputs that come from outside the frame
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameContext {
    pub now_ms: u64,
    pub position: Option<(f64, f64)>,
    /// Vessel heading on the raw 4096 circle
    pub heading_raw: i32,
    pub ignore_radar_heading: bool,
    pub multi_sweep_filter: bool,
}

/// Turns spoke frames into image updates and statistics
pub(crate) struct FrameProcessor {
    key: String,
    sequence: SequenceTracker,
    prev_angle: u16,
    first_spoke_seen: bool,
    started: Instant,
}

impl FrameProcessor {
    pub fn new(key: &str) -> Self {
        FrameProcessor {
            key: key.to_string(),
            sequence: SequenceTracker::new(),
            prev_angle: 0,
            first_spoke_seen: false,
            started: Instant::now(),
        }
    }

    /// Process one frame with the state locked.
    ///
    /// Returns the radar heading of the last line, for the caller to publish
    /// once the lock is released. `None` when the frame had no usable line.
    pub fn process_frame(
        &mut self,
        data: &[u8],
        state: &mut RadarState,
        ctx: &FrameContext,
    ) -> Option<RadarHeading> {
        state.refresh_radar_timeout(ctx.now_ms);
        state.refresh_data_timeout(ctx.now_ms);
        state
            .operating
            .update(RadarOperatingState::Transmit, ctx.now_ms);

        state.statistics.packets += 1;
        let frame = match parse_frame(data) {
            Ok(frame) => frame,
            Err(e) => {
                log::trace!("{}: {}", self.key, e);
                state.statistics.broken_packets += 1;
                return None;
            }
        };
        if !frame.is_nominal() {
            state.statistics.broken_packets += 1;
        }

        if !self.first_spoke_seen {
            self.first_spoke_seen = true;
            log::info!(
                "{}: First radar spoke received after {} ms",
                self.key,
                self.started.elapsed().as_millis()
            );
        }

        log::trace!(
            "{}: Received UDP frame with {} spokes",
            self.key,
            frame.scanlines()
        );

        let mut heading = None;
        for line in frame.lines() {
            state.statistics.spokes += 1;

            let line = match line {
                Ok(line) => line,
                Err(ParseError::SpokeHeaderLength {
                    sequence,
                    header_len,
                }) => {
                    log::trace!("{}: strange header length {}", self.key, header_len);
                    // do not draw anything with this one
                    state.statistics.missing_spokes += 1;
                    self.sequence.resync(sequence);
                    continue;
                }
                Err(e) => {
                    log::debug!("{}: {}", self.key, e);
                    state.statistics.broken_spokes += 1;
                    continue;
                }
            };

            if !line.has_normal_status() {
                log::trace!("{}: strange status {:02x}", self.key, line.status);
                state.statistics.broken_spokes += 1;
            }
            state.statistics.missing_spokes += self.sequence.observe(line.sequence);

            heading = Some(match line.heading.degrees() {
                Some(degrees) if !ctx.ignore_radar_heading => {
                    Some((degrees, line.heading.is_true()))
                }
                _ => None,
            });

            let angle = line.angle();
            let bearing = line.bearing(ctx.heading_raw);
            log::trace!(
                "{}: range {} angle {} bearing {}",
                self.key,
                line.range_meters,
                angle,
                bearing
            );

            if angle < self.prev_angle {
                state.statistics.full_rotation();
                log::debug!("{}: {}", self.key, state.statistics);
            }
            self.prev_angle = angle;

            state.range_meters = line.range_meters;
            state.image.process_spoke(
                angle,
                line.returns,
                SpokeMeta {
                    bearing,
                    range_meters: line.range_meters,
                    time_ms: ctx.now_ms,
                    position: ctx.position,
                },
                ctx.multi_sweep_filter,
            );
        }

        heading
    }
}
