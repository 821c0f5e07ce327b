use std::ops::Add;

/// Collator configuration.
///
/// Provides the immutable [`Configuration`](config::Configuration) value built once
/// per stream.
pub mod config;

/// Container (PES) packet synchronization.
///
/// Provides the [`PacketSynchronizer`](packet::PacketSynchronizer) that locks to
/// PES start codes, assembles headers and yields payload spans.
pub mod packet;

/// Elementary stream frame synchronization and error recovery.
///
/// Provides the [`FrameSynchronizer`](frame::FrameSynchronizer) that finds frame
/// headers inside payload spans, accumulates frames and resynchronizes after a lost
/// lock.
pub mod frame;

/// Attachment of container timestamps to collated frames.
pub mod timestamps;

/// Extraction of control markers embedded in the elementary stream.
pub mod control;

/// Frame and control consumers.
pub mod sink;

/// The two-stage collator facade.
///
/// Provides the [`Collator`](collator::Collator), the single data-plane entry point.
pub mod collator;

#[cfg(test)]
pub(crate) mod testing;

/// Counters kept by the collation stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub packets: u64,
    pub pes_sync_lost: u64,
    pub malformed_headers: u64,
    pub es_sync_lost: u64,
    pub recoveries: u64,
    pub frames_delivered: u64,
    pub bytes_discarded: u64,
    pub control_records: u64,
    pub timestamp_fallbacks: u64,
}

impl Add for Statistics {
    type Output = Statistics;

    fn add(self, other: Statistics) -> Statistics {
        Statistics {
            packets: self.packets + other.packets,
            pes_sync_lost: self.pes_sync_lost + other.pes_sync_lost,
            malformed_headers: self.malformed_headers + other.malformed_headers,
            es_sync_lost: self.es_sync_lost + other.es_sync_lost,
            recoveries: self.recoveries + other.recoveries,
            frames_delivered: self.frames_delivered + other.frames_delivered,
            bytes_discarded: self.bytes_discarded + other.bytes_discarded,
            control_records: self.control_records + other.control_records,
            timestamp_fallbacks: self.timestamp_fallbacks + other.timestamp_fallbacks,
        }
    }
}
