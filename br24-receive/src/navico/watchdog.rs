//! Staleness counters of the receive loop.
//!
//! Both counters count idle waits. Packets set them negative, which buys
//! extra time before they reach the threshold.

/// Length of one wait of the receive loop
pub const MILLIS_PER_SELECT: u64 = 250;

/// Number of waits in `seconds`
pub const fn seconds_select(seconds: i32) -> i32 {
    seconds * 1000 / MILLIS_PER_SELECT as i32
}

const THRESHOLD: i32 = seconds_select(2);

/// What ran out during an idle wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expired {
    /// No report for too long; the radar is gone
    pub radar: bool,
    /// No spokes for too long; the image is stale
    pub spokes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watchdog {
    no_data: i32,
    no_spoke: i32,
}

impl Watchdog {
    pub fn reset(&mut self) {
        self.no_data = 0;
        self.no_spoke = 0;
    }

    pub fn data_received(&mut self) {
        self.no_data = -15;
        self.no_spoke = -5;
    }

    pub fn report_accepted(&mut self) {
        self.no_data = seconds_select(-15);
    }

    /// A wait passed without any packet
    pub fn idle(&mut self) -> Expired {
        let mut expired = Expired::default();

        if self.no_data >= THRESHOLD {
            self.no_data = 0;
            expired.radar = true;
        } else {
            self.no_data += 1;
        }

        if self.no_spoke >= THRESHOLD {
            self.no_spoke = 0;
            expired.spokes = true;
        } else {
            self.no_spoke += 1;
        }

        expired
    }
}
