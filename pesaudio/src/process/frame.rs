use std::mem;

use log::Level::Warn;
use log::{debug, trace, warn};

use crate::formats::{FrameFormatStrategy, SyncState};
use crate::log_or_err;
use crate::process::Statistics;
use crate::process::config::Configuration;
use crate::process::sink::FrameSink;
use crate::process::timestamps::TimestampPropagator;
use crate::structs::frame::Frame;
use crate::utils::accumulation::AccumulationBuffer;
use crate::utils::buffer_pool::BufferPool;
use crate::utils::cursor::{ByteCursor, PotentialHeaderTail};
use crate::utils::errors::Fault;

/// Accumulation buffers that may be live at once: the one in use and the one being
/// reprocessed after a lost lock.
const LIVE_BUFFERS: usize = 2;

/// Finds frame headers in payload spans and accumulates complete frames.
///
/// The accumulation buffer holds the frame in progress followed by whatever header
/// bytes of the next frame have been read. A frame is delivered once the header after
/// it has been seen and accepted by the format strategy.
///
/// When the strategy rejects a header, the bytes accumulated so far are handed over to
/// a reprocessing loop that starts one byte past the failed lock and feeds them back
/// through the same state machine with a fresh buffer. A second loss of sync inside
/// that loop does not recurse: it unwinds with [`Fault::UnwindRequested`] and the
/// loop resumes from where the inner attempt locked.
#[derive(Debug)]
pub struct FrameSynchronizer {
    strategy: Box<dyn FrameFormatStrategy>,
    state: SyncState,
    header_len: usize,
    max_frame_size: usize,
    pool: BufferPool,
    acc: AccumulationBuffer,
    acc_limit: usize,
    tail: PotentialHeaderTail,
    got_header_bytes: usize,
    payload_remaining: isize,
    frame_ready: bool,
    zero_length_pending: bool,
    recovering: bool,
    unwind_rewind: usize,
    timestamps: TimestampPropagator,
    pub(crate) fail_level: log::Level,
    pub(crate) stats: Statistics,
}

impl FrameSynchronizer {
    pub fn new(
        strategy: Box<dyn FrameFormatStrategy>,
        config: &Configuration,
    ) -> Result<Self, Fault> {
        let header_len = strategy.header_len();
        let pool = BufferPool::new(config.max_pooled_buffers, config.accumulation_capacity)
            .with_live_limit(LIVE_BUFFERS);
        let acc_limit = config.max_frame_size + header_len;
        let acc = AccumulationBuffer::acquire(&pool, acc_limit)?;

        Ok(Self {
            strategy,
            state: SyncState::SeekingSync,
            header_len,
            max_frame_size: config.max_frame_size,
            pool,
            acc,
            acc_limit,
            tail: PotentialHeaderTail::new(header_len.saturating_sub(1)),
            got_header_bytes: 0,
            payload_remaining: 0,
            frame_ready: false,
            zero_length_pending: false,
            recovering: false,
            unwind_rewind: 0,
            timestamps: TimestampPropagator::default(),
            fail_level: config.fail_level,
            stats: Statistics::default(),
        })
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn strategy(&self) -> &dyn FrameFormatStrategy {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> &mut dyn FrameFormatStrategy {
        self.strategy.as_mut()
    }

    pub fn timestamps(&self) -> &TimestampPropagator {
        &self.timestamps
    }

    pub fn timestamps_mut(&mut self) -> &mut TimestampPropagator {
        &mut self.timestamps
    }

    /// Bytes currently accumulated for the frame in progress.
    pub fn accumulated(&self) -> usize {
        self.acc.len()
    }

    /// Processes one payload span. `offset` is how many payload bytes of the same
    /// container packet came before it.
    ///
    /// Lost sync is recovered internally. Only faults the recovery cannot absorb, or
    /// any fault in strict mode, are returned.
    pub fn feed(
        &mut self,
        data: &[u8],
        offset: usize,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Fault> {
        let mut cursor = ByteCursor::new(data);
        self.process(&mut cursor, offset, sink)
    }

    fn process(
        &mut self,
        cursor: &mut ByteCursor,
        base: usize,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Fault> {
        while self.has_work(cursor) {
            let Err(fault) = self.step(cursor, base, sink) else {
                continue;
            };

            let result = if fault.triggers_recovery() {
                self.recover(fault, base + cursor.consumed(), sink)
            } else {
                Err(fault)
            };

            if let Err(fault) = result {
                self.discard_accumulated();
                return Err(fault);
            }
        }

        Ok(())
    }

    fn has_work(&self, cursor: &ByteCursor) -> bool {
        if !cursor.is_empty() {
            return true;
        }

        match self.state {
            SyncState::SeekingSync => false,
            SyncState::Synchronized | SyncState::SeekingFrameEnd => {
                self.got_header_bytes >= self.header_len
            }
            SyncState::ReadSubFrame | SyncState::SkipSubFrame => self.payload_remaining <= 0,
            SyncState::FrameComplete | SyncState::ValidateFrame => true,
        }
    }

    fn step(
        &mut self,
        cursor: &mut ByteCursor,
        base: usize,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Fault> {
        match self.state {
            SyncState::SeekingSync => self.search_for_sync(cursor),
            SyncState::Synchronized | SyncState::SeekingFrameEnd => {
                self.read_partial_header(cursor, base)
            }
            SyncState::ReadSubFrame | SyncState::SkipSubFrame => self.read_frame(cursor),
            SyncState::FrameComplete => {
                self.deliver_complete_frame(sink);
                Ok(())
            }
            SyncState::ValidateFrame => self.validate_frame(base + cursor.consumed(), sink),
        }
    }

    fn search_for_sync(&mut self, cursor: &mut ByteCursor) -> Result<(), Fault> {
        let data = cursor.peek();

        match self.strategy.find_sync_word(data, self.tail.as_slice()) {
            Some(offset) if offset >= 0 => {
                let offset = offset as usize;
                if offset > 0 {
                    debug!("Skipped {offset} bytes before a {} sync word", self.strategy.name());
                    self.stats.bytes_discarded += offset as u64;
                }
                cursor.advance(offset);
                self.acc.clear();
                self.got_header_bytes = 0;
            }
            Some(offset) => {
                let tail = self.tail.as_slice();
                let carried = offset.unsigned_abs().min(tail.len());
                trace!("Sync word starts {carried} bytes before this payload span");

                self.acc.clear();
                self.acc.push(&tail[tail.len() - carried..])?;
                self.got_header_bytes = carried;
                self.stats.bytes_discarded =
                    self.stats.bytes_discarded.saturating_sub(carried as u64);
            }
            None => {
                self.tail.push(data);
                self.stats.bytes_discarded += data.len() as u64;
                cursor.advance(data.len());
                return Ok(());
            }
        }

        self.tail.clear();
        self.state = SyncState::Synchronized;
        Ok(())
    }

    fn read_partial_header(&mut self, cursor: &mut ByteCursor, base: usize) -> Result<(), Fault> {
        let bytes = cursor.take(self.header_len.saturating_sub(self.got_header_bytes));
        if !bytes.is_empty() {
            self.acc.push(bytes)?;
            self.got_header_bytes += bytes.len();
            self.zero_length_pending = false;
        }
        if self.got_header_bytes < self.header_len {
            return Ok(());
        }

        let old_state = self.state;
        let decision = self
            .strategy
            .decide_next_state_and_length(self.acc.tail(self.header_len), old_state)?;
        let length = decision.length;

        if length == 0 {
            if self.zero_length_pending {
                return Err(Fault::ImplausibleLength {
                    length,
                    max: self.max_frame_size,
                });
            }
            debug!("{} header announces a zero length frame", self.strategy.name());
            self.zero_length_pending = true;
        }
        if length > self.max_frame_size {
            return Err(Fault::ImplausibleLength {
                length,
                max: self.max_frame_size,
            });
        }

        self.payload_remaining = length as isize - self.header_len as isize;
        self.state = decision.next.into();
        trace!("{old_state:?} -> {:?}, frame length {length}", self.state);

        match self.state {
            SyncState::FrameComplete => {
                self.frame_ready = true;
                self.timestamps.complete_frame();
            }
            SyncState::SkipSubFrame => {
                self.acc.truncate(self.acc.len() - self.header_len);
                self.stats.bytes_discarded += self.header_len as u64;
            }
            _ => {}
        }

        if self.state == SyncState::FrameComplete || old_state == SyncState::Synchronized {
            self.timestamps
                .select(self.got_header_bytes, base + cursor.consumed());
        }

        Ok(())
    }

    fn read_frame(&mut self, cursor: &mut ByteCursor) -> Result<(), Fault> {
        if self.payload_remaining < 0 {
            // the frame is shorter than a header, part of the next header is already in
            self.got_header_bytes = self.payload_remaining.unsigned_abs();
            self.state = SyncState::SeekingFrameEnd;
            return Ok(());
        }

        let bytes = cursor.take(self.payload_remaining as usize);
        if self.state == SyncState::ReadSubFrame {
            self.acc.push(bytes)?;
        } else {
            self.stats.bytes_discarded += bytes.len() as u64;
        }
        if !bytes.is_empty() {
            self.zero_length_pending = false;
        }

        self.payload_remaining -= bytes.len() as isize;
        if self.payload_remaining == 0 {
            self.got_header_bytes = 0;
            self.state = SyncState::SeekingFrameEnd;
        }
        Ok(())
    }

    fn deliver_complete_frame(&mut self, sink: &mut dyn FrameSink) {
        let length = self.acc.len() - self.header_len.min(self.acc.len());
        let data = self.acc.split_front(length);
        let (timestamps, ancillary) = self.timestamps.take_pending();

        self.frame_ready = false;
        self.state = SyncState::ReadSubFrame;

        if data.is_empty() {
            return;
        }

        trace!("Delivering {} byte frame, pts {:?}", data.len(), timestamps.pts);
        self.stats.frames_delivered += 1;
        sink.deliver_frame(Frame::new(data, timestamps, ancillary, true));
    }

    /// Splits the frame in progress at its first internal sync word, delivers the
    /// front and feeds the rest back through the state machine.
    fn validate_frame(&mut self, outer_offset: usize, sink: &mut dyn FrameSink) -> Result<(), Fault> {
        if self.recovering {
            self.unwind_rewind = self.acc.len();
            return Err(Fault::UnwindRequested);
        }

        let fresh = AccumulationBuffer::acquire(&self.pool, self.acc_limit)?;
        let old = mem::replace(&mut self.acc, fresh);
        let data = old.as_slice();

        let split = match self
            .strategy
            .find_sync_word(data.get(1..).unwrap_or_default(), &[])
        {
            Some(offset) if offset >= 0 => offset as usize + 1,
            _ => data.len(),
        };
        debug!("Validated frame split at {split} of {} bytes", data.len());

        self.timestamps.complete_frame();
        let (timestamps, ancillary) = self.timestamps.take_pending();
        self.stats.frames_delivered += 1;
        sink.deliver_frame(Frame::new(data[..split].to_vec(), timestamps, ancillary, true));

        self.state = SyncState::SeekingSync;
        self.frame_ready = false;
        self.got_header_bytes = 0;
        self.tail.clear();

        self.recovering = true;
        let result = self.reprocess(data, split, false, outer_offset, sink);
        self.recovering = false;
        result
    }

    fn recover(
        &mut self,
        fault: Fault,
        outer_offset: usize,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Fault> {
        self.state = SyncState::SeekingSync;
        self.frame_ready = false;
        self.zero_length_pending = false;

        if self.recovering {
            debug!("{fault} while reprocessing, unwinding");
            self.unwind_rewind = self.acc.len();
            return Err(Fault::UnwindRequested);
        }

        self.stats.es_sync_lost += 1;
        log_or_err!(self, Warn, fault);

        if !self.strategy.reprocess_on_error() {
            self.discard_accumulated();
            return Ok(());
        }

        let fresh = AccumulationBuffer::acquire(&self.pool, self.acc_limit)?;
        let mut old = mem::replace(&mut self.acc, fresh);
        old.shrink_to_fit();
        self.got_header_bytes = 0;
        self.tail.clear();

        self.recovering = true;
        let result = self.reprocess(old.as_slice(), 0, true, outer_offset, sink);
        self.recovering = false;
        result
    }

    fn reprocess(
        &mut self,
        data: &[u8],
        mut start: usize,
        mut drop_first: bool,
        base: usize,
        sink: &mut dyn FrameSink,
    ) -> Result<(), Fault> {
        while data.len().saturating_sub(start) > 1 {
            if drop_first {
                start += 1;
                self.stats.bytes_discarded += 1;
            }
            drop_first = true;
            self.stats.recoveries += 1;
            self.tail.clear();
            self.state = SyncState::SeekingSync;

            let remaining = &data[start..];
            match self.strategy.find_sync_word(remaining, &[]) {
                Some(offset) if offset >= 0 => {
                    trace!("Resynchronizing {offset} bytes into {} reprocessed", remaining.len());
                    self.stats.bytes_discarded += offset as u64;
                    start += offset as usize;
                }
                _ => {
                    let keep = remaining.len().min(self.header_len - 1);
                    self.stats.bytes_discarded += (remaining.len() - keep) as u64;
                    start = data.len() - keep;
                }
            }

            let mut cursor = ByteCursor::new(&data[start..]);
            match self.process(&mut cursor, base, sink) {
                Ok(()) => return Ok(()),
                Err(Fault::UnwindRequested) => {
                    let rewind = mem::take(&mut self.unwind_rewind);
                    let consumed = cursor.consumed();
                    if rewind > consumed {
                        warn!(
                            "Lost lock {rewind} bytes back with only {consumed} reprocessed, \
                             giving up on the remaining {} bytes",
                            data.len() - start - consumed
                        );
                        self.discard_accumulated();
                        return Ok(());
                    }
                    start += consumed - rewind;
                }
                Err(fault) => return Err(fault),
            }
        }

        Ok(())
    }

    /// Forces out the frame in progress, unvalidated unless its end was already
    /// confirmed, and returns to seeking sync.
    pub fn flush(&mut self, sink: &mut dyn FrameSink) {
        match self.state {
            SyncState::FrameComplete if self.frame_ready => self.deliver_complete_frame(sink),
            SyncState::SeekingFrameEnd => {
                let keep = self.acc.len() - self.got_header_bytes.min(self.acc.len());
                self.acc.truncate(keep);
                self.deliver_unvalidated(sink);
            }
            SyncState::ReadSubFrame | SyncState::SkipSubFrame | SyncState::ValidateFrame => {
                self.deliver_unvalidated(sink)
            }
            SyncState::SeekingSync | SyncState::Synchronized | SyncState::FrameComplete => {}
        }

        self.discard_accumulated();
        self.tail.clear();
    }

    fn deliver_unvalidated(&mut self, sink: &mut dyn FrameSink) {
        if self.acc.is_empty() {
            return;
        }

        self.timestamps.complete_frame();
        let (timestamps, ancillary) = self.timestamps.take_pending();
        let data = self.acc.split_front(self.acc.len());

        warn!(
            "Flushing {} byte frame not confirmed by a following header",
            data.len()
        );
        self.stats.frames_delivered += 1;
        sink.deliver_frame(Frame::new(data, timestamps, ancillary, false));
    }

    /// Drops the frame in progress without touching timestamps or strategy state.
    pub fn discard_accumulated(&mut self) {
        self.stats.bytes_discarded += self.acc.len() as u64;
        self.acc.clear();
        self.got_header_bytes = 0;
        self.payload_remaining = 0;
        self.frame_ready = false;
        self.zero_length_pending = false;
        self.state = SyncState::SeekingSync;
    }

    pub fn reset(&mut self) {
        self.discard_accumulated();
        self.tail.clear();
        self.strategy.reset();
        self.timestamps.reset();
        self.recovering = false;
        self.unwind_rewind = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::adts::{AdtsStrategy, adts_header};
    use crate::formats::{Decision, NextState};
    use crate::process::testing::{TestCodec, skipped_sub_frame, test_frame};

    fn synchronizer(strategy: impl FrameFormatStrategy + 'static) -> FrameSynchronizer {
        synchronizer_with(strategy, &Configuration::default())
    }

    fn synchronizer_with(
        strategy: impl FrameFormatStrategy + 'static,
        config: &Configuration,
    ) -> FrameSynchronizer {
        match FrameSynchronizer::new(Box::new(strategy), config) {
            Ok(sync) => sync,
            Err(err) => panic!("{err}"),
        }
    }

    fn collate(chunks: &[&[u8]]) -> anyhow::Result<Vec<Frame>> {
        let mut sync = synchronizer(TestCodec::default());
        let mut frames = Vec::new();
        for chunk in chunks {
            sync.feed(chunk, 0, &mut frames)?;
        }
        sync.flush(&mut frames);
        Ok(frames)
    }

    fn payloads(frames: &[Frame]) -> Vec<Vec<u8>> {
        frames.iter().map(|frame| frame.data.to_vec()).collect()
    }

    #[test]
    fn resync_is_independent_of_delivery_boundaries() -> anyhow::Result<()> {
        let frames = [
            test_frame(&[1, 2, 3, 4]),
            test_frame(&[5, 6]),
            test_frame(&[7]),
        ];
        let mut stream = vec![0x11, 0xA5, 0x22, 0x33];
        for frame in &frames {
            stream.extend_from_slice(frame);
        }

        let whole = collate(&[&stream])?;
        assert_eq!(payloads(&whole), frames);
        assert!(whole[0].validated && whole[1].validated);
        assert!(!whole[2].validated);

        for split in 1..stream.len() {
            let parts = collate(&[&stream[..split], &stream[split..]])?;
            assert_eq!(parts, whole, "split at {split}");
        }

        let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(collate(&bytewise)?, whole);
        Ok(())
    }

    #[test]
    fn zero_length_header_does_not_stall() -> anyhow::Result<()> {
        let mut stream = vec![0xA5, 0x5A, 0x00, 0x00];
        stream.extend_from_slice(&test_frame(&[1, 2, 3, 4]));
        stream.extend_from_slice(&test_frame(&[5, 6]));

        let mut sync = synchronizer(TestCodec::default());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;

        assert_eq!(payloads(&frames), [test_frame(&[1, 2, 3, 4])]);
        assert_eq!(sync.stats.es_sync_lost, 1);
        assert_eq!(sync.state(), SyncState::SeekingFrameEnd);
        Ok(())
    }

    #[test]
    fn nested_false_locks_unwind() -> anyhow::Result<()> {
        let mut stream = vec![
            0xA5, 0x5A, 0x00, 0x10, // claims 16 bytes
            0xA5, 0x5A, 0x00, 0x01, // too short to be a frame
            0xA5, 0x5A, 0x00, 0x02, // too short to be a frame
            0x11, 0x22, 0x33, 0x44, //
            0xEE, 0xEE, 0xEE, 0xEE, // no header where the first frame ends
        ];
        let third = test_frame(&[0x77, 0x88]);
        let fourth = test_frame(&[0x99]);
        stream.extend_from_slice(&third);
        stream.extend_from_slice(&fourth);

        let mut sync = synchronizer(TestCodec::default());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;
        sync.flush(&mut frames);

        assert_eq!(payloads(&frames), [third, fourth]);
        assert!(frames[0].validated);
        assert_eq!(sync.stats.es_sync_lost, 1);
        assert_eq!(sync.stats.recoveries, 3);
        assert!(sync.pool.peak_live() <= LIVE_BUFFERS);
        assert_eq!(sync.pool.live(), 1);
        Ok(())
    }

    #[test]
    fn recovery_finds_frame_inside_false_one() -> anyhow::Result<()> {
        let mut stream = vec![0xA5, 0x5A, 0x00, 0x0C, 0x01, 0x02, 0x03, 0x04];
        let second = test_frame(&[0x05, 0x06, 0x07, 0x08]);
        let third = test_frame(&[0x09]);
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&third);

        let frames = collate(&[&stream])?;
        assert_eq!(payloads(&frames), [second, third]);
        assert!(frames[0].validated);
        Ok(())
    }

    #[test]
    fn trivial_recovery_discards() -> anyhow::Result<()> {
        let mut stream = test_frame(&[1, 2, 3, 4]);
        stream.extend_from_slice(&[0xEE; 4]);
        let second = test_frame(&[5]);
        let third = test_frame(&[6]);
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&third);

        let mut sync = synchronizer(TestCodec::trivial_recovery());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;

        assert_eq!(payloads(&frames), [second]);
        assert_eq!(sync.stats.es_sync_lost, 1);
        assert_eq!(sync.stats.recoveries, 0);
        Ok(())
    }

    #[test]
    fn strict_mode_returns_lost_sync() -> anyhow::Result<()> {
        let mut stream = test_frame(&[1, 2, 3, 4]);
        stream.extend_from_slice(&[0xEE; 4]);

        let config = Configuration::default().strict();
        let mut sync = synchronizer_with(TestCodec::default(), &config);
        let mut frames = Vec::new();

        let result = sync.feed(&stream, 0, &mut frames);
        assert!(matches!(result, Err(Fault::SyncLost(_))));
        assert_eq!(sync.state(), SyncState::SeekingSync);
        assert_eq!(sync.accumulated(), 0);

        let mut next = test_frame(&[5]);
        next.extend_from_slice(&test_frame(&[6]));
        sync.feed(&next, 0, &mut frames)?;
        assert_eq!(payloads(&frames), [test_frame(&[5])]);
        Ok(())
    }

    #[test]
    fn configuration_change_splits_frame() -> anyhow::Result<()> {
        let frame = |channels: u8, length: u16, body: usize| {
            let mut bytes = adts_header(3, channels, length).to_vec();
            bytes.resize(body, 0);
            bytes
        };

        // the first header claims two frames' worth of bytes
        let mut stream = frame(2, 32, 16);
        let hidden = frame(1, 16, 16);
        stream.extend_from_slice(&hidden);
        let third = frame(1, 16, 16);
        let fourth = frame(1, 16, 16);
        stream.extend_from_slice(&third);
        stream.extend_from_slice(&fourth);

        let mut sync = synchronizer(AdtsStrategy::default());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;
        sync.flush(&mut frames);

        assert_eq!(
            payloads(&frames),
            [frame(2, 32, 16), hidden, third, fourth]
        );
        assert_eq!(
            frames.iter().map(|frame| frame.validated).collect::<Vec<_>>(),
            [true, true, true, false]
        );
        assert_eq!(sync.stats.es_sync_lost, 0);
        Ok(())
    }

    #[test]
    fn skipped_sub_frame_is_dropped() -> anyhow::Result<()> {
        let first = test_frame(&[1, 2]);
        let skipped = skipped_sub_frame(&[0xFF]);
        let second = test_frame(&[3]);
        let third = test_frame(&[4]);

        let mut stream = first.clone();
        stream.extend_from_slice(&skipped);
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&third);

        let mut sync = synchronizer(TestCodec::skipping_flagged());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;
        sync.flush(&mut frames);

        assert_eq!(payloads(&frames), [first, second, third]);
        assert!(frames[0].validated && frames[1].validated);
        assert_eq!(sync.stats.bytes_discarded, skipped.len() as u64);
        assert_eq!(sync.stats.es_sync_lost, 0);
        Ok(())
    }

    /// Announces a zero length, ending the frame at this header, the first time a
    /// header follows a frame. Every later decision is the plain test codec's.
    #[derive(Debug, Default)]
    struct ZeroLengthOnce {
        codec: TestCodec,
        zeroed: bool,
    }

    impl FrameFormatStrategy for ZeroLengthOnce {
        fn name(&self) -> &'static str {
            "zero once"
        }

        fn header_len(&self) -> usize {
            self.codec.header_len()
        }

        fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize> {
            self.codec.find_sync_word(data, tail)
        }

        fn decide_next_state_and_length(
            &mut self,
            header: &[u8],
            state: SyncState,
        ) -> Result<Decision, Fault> {
            if state == SyncState::SeekingFrameEnd && !self.zeroed {
                self.zeroed = true;
                return Ok(Decision::new(NextState::FrameComplete, 0));
            }
            self.codec.decide_next_state_and_length(header, state)
        }
    }

    #[test]
    fn zero_length_once_then_real_length() -> anyhow::Result<()> {
        let first = test_frame(&[1, 2]);
        let second = test_frame(&[3]);
        let third = test_frame(&[4]);

        let mut stream = first.clone();
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&third);

        let mut sync = synchronizer(ZeroLengthOnce::default());
        let mut frames = Vec::new();
        sync.feed(&stream, 0, &mut frames)?;

        assert_eq!(payloads(&frames), [first, second]);
        assert_eq!(sync.stats.bytes_discarded, 0);
        assert_eq!(sync.stats.es_sync_lost, 0);
        assert_eq!(sync.stats.recoveries, 0);
        Ok(())
    }
}
