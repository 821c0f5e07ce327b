//! AAC in ADTS framing.
//!
//! The 12-bit ADTS sync word shows up in AAC payload far more often than longer
//! sync patterns do, so a header found where a frame should end is compared with the
//! locked configuration. A mismatch means the frame in progress may hide a shorter
//! real frame: the collator is asked to validate it, splitting at any internal sync
//! word, and the new configuration is locked.

use log::{debug, trace};

use crate::formats::{Decision, FrameFormatStrategy, NextState, SyncState, find_sync_with};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::Fault;

pub const ADTS_HEADER_LEN: usize = 7;

const SAMPLE_RATES: [u32; 12] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub profile: u8,
    pub sampling_index: u8,
    pub channel_configuration: u8,
    pub frame_length: usize,
}

impl AdtsHeader {
    pub fn is_sync(window: &[u8]) -> bool {
        window.len() >= 2 && window[0] == 0xFF && window[1] & 0xF6 == 0xF0
    }

    pub fn parse(header: &[u8]) -> Result<Self, Fault> {
        if header.len() < ADTS_HEADER_LEN || !Self::is_sync(header) {
            return Err(Fault::SyncLost("no ADTS sync word"));
        }

        let mut bs = BsIoSliceReader::from_slice(&header[2..]);
        let truncated = |_| Fault::SyncLost("truncated ADTS header");

        let profile: u8 = bs.get_n(2).map_err(truncated)?;
        let sampling_index: u8 = bs.get_n(4).map_err(truncated)?;
        bs.skip_n(1).map_err(truncated)?;
        let channel_configuration: u8 = bs.get_n(3).map_err(truncated)?;
        // original, home, copyright id bit, copyright id start
        bs.skip_n(4).map_err(truncated)?;
        let frame_length: u16 = bs.get_n(13).map_err(truncated)?;

        if sampling_index as usize >= SAMPLE_RATES.len() {
            return Err(Fault::SyncLost("reserved ADTS sampling index"));
        }
        if (frame_length as usize) < ADTS_HEADER_LEN {
            return Err(Fault::SyncLost("ADTS frame shorter than its header"));
        }

        Ok(Self {
            profile,
            sampling_index,
            channel_configuration,
            frame_length: frame_length as usize,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATES[self.sampling_index as usize]
    }

    fn configuration(&self) -> (u8, u8, u8) {
        (self.profile, self.sampling_index, self.channel_configuration)
    }
}

#[derive(Debug, Default)]
pub struct AdtsStrategy {
    locked: Option<(u8, u8, u8)>,
}

impl FrameFormatStrategy for AdtsStrategy {
    fn name(&self) -> &'static str {
        "AAC ADTS"
    }

    fn header_len(&self) -> usize {
        ADTS_HEADER_LEN
    }

    fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize> {
        find_sync_with(data, tail, 2, AdtsHeader::is_sync)
    }

    fn decide_next_state_and_length(
        &mut self,
        header: &[u8],
        state: SyncState,
    ) -> Result<Decision, Fault> {
        let parsed = AdtsHeader::parse(header)?;
        let configuration = parsed.configuration();

        trace!(
            "ADTS profile {} @ {} Hz, {} channels, {} bytes",
            parsed.profile,
            parsed.sample_rate(),
            parsed.channel_configuration,
            parsed.frame_length
        );

        let previous = self.locked.replace(configuration);
        if state == SyncState::SeekingFrameEnd
            && previous.is_some_and(|locked| locked != configuration)
        {
            debug!(
                "ADTS configuration {:?} differs from the locked {:?}, validating frame",
                configuration, previous
            );
            return Ok(Decision::new(NextState::ValidateFrame, parsed.frame_length));
        }

        Ok(Decision::for_state(state, parsed.frame_length))
    }

    fn reset(&mut self) {
        self.locked = None;
    }
}

#[cfg(test)]
pub(crate) fn adts_header(sampling_index: u8, channels: u8, frame_length: u16) -> [u8; 7] {
    [
        0xFF,
        0xF1,
        0x40 | (sampling_index << 2) | (channels >> 2),
        ((channels & 3) << 6) | ((frame_length >> 11) as u8 & 3),
        (frame_length >> 3) as u8,
        ((frame_length & 7) << 5) as u8 | 0x1F,
        0xFC,
    ]
}

#[test]
fn header_fields() -> anyhow::Result<()> {
    let header = AdtsHeader::parse(&adts_header(4, 2, 371))?;
    assert_eq!(header.profile, 1);
    assert_eq!(header.sample_rate(), 44100);
    assert_eq!(header.channel_configuration, 2);
    assert_eq!(header.frame_length, 371);

    assert!(AdtsHeader::parse(&adts_header(13, 2, 371)).is_err());
    assert!(AdtsHeader::parse(&adts_header(4, 2, 5)).is_err());
    Ok(())
}

#[test]
fn configuration_change_requests_validation() -> anyhow::Result<()> {
    let mut strategy = AdtsStrategy::default();

    let first =
        strategy.decide_next_state_and_length(&adts_header(3, 2, 200), SyncState::Synchronized)?;
    assert_eq!(first.next, NextState::ReadSubFrame);

    let same =
        strategy.decide_next_state_and_length(&adts_header(3, 2, 210), SyncState::SeekingFrameEnd)?;
    assert_eq!(same.next, NextState::FrameComplete);

    let changed =
        strategy.decide_next_state_and_length(&adts_header(3, 6, 210), SyncState::SeekingFrameEnd)?;
    assert_eq!(changed.next, NextState::ValidateFrame);

    let relocked =
        strategy.decide_next_state_and_length(&adts_header(3, 6, 220), SyncState::SeekingFrameEnd)?;
    assert_eq!(relocked.next, NextState::FrameComplete);
    Ok(())
}
