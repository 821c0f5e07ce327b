//! Presentation and decode timestamps in 90 kHz units.

use std::fmt::{Display, Formatter};

/// Clock rate of PES timestamps.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// Timestamps are 33-bit counters.
pub const TIMESTAMP_MASK: u64 = (1 << 33) - 1;

/// A PTS/DTS pair, either half possibly absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

impl Timestamps {
    pub fn new(pts: Option<u64>, dts: Option<u64>) -> Self {
        Self { pts, dts }
    }

    pub fn is_empty(&self) -> bool {
        self.pts.is_none() && self.dts.is_none()
    }

    /// Moves the pair out, leaving both halves absent.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Fills each absent half from `other`.
    pub fn fill_from(&mut self, other: &Timestamps) {
        if self.pts.is_none() {
            self.pts = other.pts;
        }
        if self.dts.is_none() {
            self.dts = other.dts;
        }
    }
}

/// The in-force timestamp of the previous container packet, captured when the next
/// container header is parsed.
///
/// Consumed at most once, by the first frame header discovered with bytes that were
/// carried over from that previous packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanningTimestamp {
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    armed: bool,
}

impl SpanningTimestamp {
    /// Replaces any unconsumed value with `timestamps` and arms it.
    pub fn arm(&mut self, timestamps: Timestamps) {
        self.pts = timestamps.pts;
        self.dts = timestamps.dts;
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Consumes the value, disarming it. Returns `None` when nothing was armed.
    pub fn take(&mut self) -> Option<Timestamps> {
        if !self.armed {
            return None;
        }

        let timestamps = Timestamps::new(self.pts.take(), self.dts.take());
        self.armed = false;
        Some(timestamps)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Formats a 90 kHz timestamp as `hh:mm:ss.mmm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pts(pub u64);

impl Display for Pts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let millis = (self.0 & TIMESTAMP_MASK) / (PTS_CLOCK_HZ / 1000);
        let secs = millis / 1000;

        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            millis % 1000
        )
    }
}

#[test]
fn spanning_is_consumed_once() {
    let mut spanning = SpanningTimestamp::default();
    assert_eq!(spanning.take(), None);

    spanning.arm(Timestamps::new(Some(900), None));
    assert!(spanning.is_armed());
    assert_eq!(spanning.take(), Some(Timestamps::new(Some(900), None)));
    assert!(!spanning.is_armed());
    assert_eq!(spanning.take(), None);
}

#[test]
fn pts_display() {
    assert_eq!(Pts(0).to_string(), "00:00:00.000");
    assert_eq!(Pts(90_000 * 3661 + 45_000).to_string(), "01:01:01.500");
}
