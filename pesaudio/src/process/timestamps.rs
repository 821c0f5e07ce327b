use log::{error, trace};

use crate::structs::audio_description::AudioDescriptionMetadata;
use crate::structs::timestamp::{SpanningTimestamp, Timestamps};

/// Decides which container timestamp each collated frame carries.
///
/// A frame header takes the timestamp of the packet it was found in, unless some of
/// its bytes were carried over from the previous packet. Then it takes the spanning
/// timestamp, which is the previous packet's.
///
/// Timestamps move through three slots: `current` (the in-force container value),
/// `next` (chosen for the frame header most recently discovered) and `pending` (the
/// frame about to be delivered).
#[derive(Debug, Default)]
pub struct TimestampPropagator {
    current: Timestamps,
    current_ad: Option<AudioDescriptionMetadata>,
    spanning: SpanningTimestamp,
    next: Timestamps,
    next_ad: Option<AudioDescriptionMetadata>,
    pending: Timestamps,
    pending_ad: Option<AudioDescriptionMetadata>,
    fallbacks: u64,
}

impl TimestampPropagator {
    /// A container header was parsed. The timestamp in force until now becomes the
    /// spanning one.
    pub fn on_container_header(
        &mut self,
        timestamps: Timestamps,
        audio_description: Option<AudioDescriptionMetadata>,
    ) {
        self.spanning.arm(self.current.take());
        self.current = timestamps;
        self.current_ad = audio_description;
    }

    /// Picks the timestamp for a newly discovered frame header.
    ///
    /// `header_bytes` is how many header bytes are accumulated, `offset_into_packet`
    /// how many bytes of the current packet have been consumed. More header bytes than
    /// consumed packet bytes means the header started in the previous packet.
    pub fn select(&mut self, header_bytes: usize, offset_into_packet: usize) {
        let spanning = if offset_into_packet < header_bytes {
            let taken = self.spanning.take();
            if taken.is_none() {
                error!(
                    "Frame header spans packets but no spanning timestamp was captured, \
                     using the current one"
                );
                self.fallbacks += 1;
            }
            taken
        } else {
            None
        };

        match spanning {
            Some(timestamps) => {
                trace!("Frame header takes the spanning timestamp {timestamps:?}");
                self.next = timestamps;
            }
            None => {
                self.next = self.current.take();
                self.next_ad = self.current_ad;
            }
        }
    }

    /// The frame in progress is complete. It takes the timestamp chosen for its
    /// header unless an explicit one was already set.
    pub fn complete_frame(&mut self) {
        self.pending.fill_from(&self.next);
        self.pending_ad = self.next_ad;
    }

    pub fn take_pending(&mut self) -> (Timestamps, Option<AudioDescriptionMetadata>) {
        (self.pending.take(), self.pending_ad.take())
    }

    /// Timestamps supplied out of band by the caller for the frame in progress. They
    /// take precedence over stream-derived ones.
    pub fn set_explicit(&mut self, timestamps: Timestamps) {
        if timestamps.pts.is_some() {
            self.pending.pts = timestamps.pts;
        }
        if timestamps.dts.is_some() {
            self.pending.dts = timestamps.dts;
        }
    }

    /// How often a spanning timestamp was wanted but not available.
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    pub fn reset(&mut self) {
        *self = Self {
            fallbacks: self.fallbacks,
            ..Default::default()
        };
    }
}

#[test]
fn spanning_selection() {
    let mut propagator = TimestampPropagator::default();
    let a = Timestamps::new(Some(1000), None);
    let b = Timestamps::new(Some(2000), None);

    propagator.on_container_header(a, None);
    propagator.select(4, 4);
    propagator.on_container_header(b, None);

    // header found with two of its four bytes in the previous packet, whose stamp
    // was already taken by the header before it
    propagator.select(4, 2);
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0, Timestamps::default());

    propagator.select(4, 100);
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0, b);
    assert_eq!(propagator.fallbacks(), 0);
}

#[test]
fn spanning_takes_unconsumed_stamp() {
    let mut propagator = TimestampPropagator::default();
    let a = Timestamps::new(Some(1000), None);
    let b = Timestamps::new(Some(2000), None);

    propagator.on_container_header(a, None);
    propagator.on_container_header(b, None);

    propagator.select(4, 2);
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0.pts, Some(1000));

    propagator.select(4, 100);
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0, b);
}

#[test]
fn spanning_fallback() {
    let mut propagator = TimestampPropagator::default();
    let a = Timestamps::new(Some(1000), Some(900));

    propagator.current = a;
    propagator.select(4, 0);
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0, a);
    assert_eq!(propagator.fallbacks(), 1);
}

#[test]
fn explicit_precedence() {
    let mut propagator = TimestampPropagator::default();
    propagator.on_container_header(Timestamps::new(Some(1000), None), None);
    propagator.select(4, 4);

    propagator.set_explicit(Timestamps::new(Some(5), None));
    propagator.complete_frame();
    assert_eq!(propagator.take_pending().0, Timestamps::new(Some(5), None));
}
