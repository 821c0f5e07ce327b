//! Stream builders and a minimal codec for collator tests.

use crate::formats::{Decision, FrameFormatStrategy, NextState, SyncState, find_sync_with};
use crate::process::sink::{ControlSink, Direction};
use crate::structs::pes_header::encode_timestamp;
use crate::utils::errors::Fault;

pub(crate) const TEST_SYNC: [u8; 2] = [0xA5, 0x5A];
pub(crate) const TEST_HEADER_LEN: usize = 4;

/// Length bit marking a sub-frame to skip when the codec runs in skip mode.
pub(crate) const TEST_SKIP_FLAG: u16 = 0x8000;

/// Test codec: `A5 5A` followed by the 16-bit big-endian frame length, header
/// included.
#[derive(Debug, Clone)]
pub(crate) struct TestCodec {
    private_length: usize,
    reprocess: bool,
    skip_flagged: bool,
}

impl Default for TestCodec {
    fn default() -> Self {
        Self {
            private_length: 0,
            reprocess: true,
            skip_flagged: false,
        }
    }
}

impl TestCodec {
    pub(crate) fn with_private_length(private_length: usize) -> Self {
        Self {
            private_length,
            ..Default::default()
        }
    }

    pub(crate) fn trivial_recovery() -> Self {
        Self {
            reprocess: false,
            ..Default::default()
        }
    }

    /// Headers with [`TEST_SKIP_FLAG`] set announce a sub-frame to drop.
    pub(crate) fn skipping_flagged() -> Self {
        Self {
            skip_flagged: true,
            ..Default::default()
        }
    }
}

impl FrameFormatStrategy for TestCodec {
    fn name(&self) -> &'static str {
        "test"
    }

    fn header_len(&self) -> usize {
        TEST_HEADER_LEN
    }

    fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize> {
        find_sync_with(data, tail, TEST_SYNC.len(), |window| window == TEST_SYNC)
    }

    fn decide_next_state_and_length(
        &mut self,
        header: &[u8],
        state: SyncState,
    ) -> Result<Decision, Fault> {
        if header[..2] != TEST_SYNC {
            return Err(Fault::SyncLost("no test sync word"));
        }

        let mut length = u16::from_be_bytes([header[2], header[3]]);
        let skip = self.skip_flagged && length & TEST_SKIP_FLAG != 0;
        if skip {
            length &= !TEST_SKIP_FLAG;
        }

        let length = length as usize;
        if length != 0 && length < TEST_HEADER_LEN {
            return Err(Fault::SyncLost("test frame shorter than its header"));
        }

        if skip {
            return Ok(Decision::new(NextState::SkipSubFrame, length));
        }
        Ok(Decision::for_state(state, length))
    }

    fn private_data_length(&self, _stream_id: u8) -> usize {
        self.private_length
    }

    fn reprocess_on_error(&self) -> bool {
        self.reprocess
    }
}

/// A test codec frame carrying `payload`.
pub(crate) fn test_frame(payload: &[u8]) -> Vec<u8> {
    let length = (TEST_HEADER_LEN + payload.len()) as u16;
    let mut frame = TEST_SYNC.to_vec();
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// A sub-frame the skipping test codec drops.
pub(crate) fn skipped_sub_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = test_frame(payload);
    frame[2] |= (TEST_SKIP_FLAG >> 8) as u8;
    frame
}

pub(crate) fn pes_packet(stream_id: u8, pts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    pes_packet_with_private(stream_id, pts, &[], payload)
}

pub(crate) fn pes_packet_with_private(
    stream_id: u8,
    pts: Option<u64>,
    private: &[u8],
    payload: &[u8],
) -> Vec<u8> {
    let optional: Vec<u8> = pts
        .map(|pts| encode_timestamp(0b0010, pts).to_vec())
        .unwrap_or_default();
    let length = 3 + optional.len() + private.len() + payload.len();

    let mut packet = vec![0x00, 0x00, 0x01, stream_id];
    packet.extend_from_slice(&(length as u16).to_be_bytes());
    packet.push(0x80);
    packet.push(if pts.is_some() { 0x80 } else { 0x00 });
    packet.push(optional.len() as u8);
    packet.extend_from_slice(&optional);
    packet.extend_from_slice(private);
    packet.extend_from_slice(payload);
    packet
}

/// Control events in the order they were dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlCall {
    TimeRequest([u32; 2]),
    Discontinuity(Direction, bool),
    Splicing(u8, i64),
    PtsAlarm(u64, [u32; 2]),
}

impl ControlSink for Vec<ControlCall> {
    fn on_time_request(&mut self, marker_ids: [u32; 2]) {
        self.push(ControlCall::TimeRequest(marker_ids));
    }

    fn on_discontinuity(&mut self, direction: Direction, smooth: bool) {
        self.push(ControlCall::Discontinuity(direction, smooth));
    }

    fn on_splicing(&mut self, flags: u8, pts_offset: i64) {
        self.push(ControlCall::Splicing(flags, pts_offset));
    }

    fn on_pts_alarm(&mut self, pts: u64, marker_ids: [u32; 2]) {
        self.push(ControlCall::PtsAlarm(pts, marker_ids));
    }
}
