//! MPEG-1, MPEG-2 and MPEG-2.5 audio, Layers I to III.
//!
//! ## Header
//!
//! ```text
//! sync(11) version(2) layer(2) protection(1)
//! bitrate_index(4) sampling_index(2) padding(1) private(1)
//! mode(2) mode_extension(2) copyright(1) original(1) emphasis(2)
//! ```
//!
//! The first header found after sync locks version, layer and sampling rate. A later
//! header that disagrees is treated as lost sync rather than a format change.

use log::{debug, trace};

use crate::formats::{Decision, FrameFormatStrategy, SyncState, find_sync_with};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::Fault;

pub const MPEG_AUDIO_HEADER_LEN: usize = 4;

const BITRATES_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATES_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const BITRATES_V2_L23: [u32; 15] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

const SAMPLE_RATES_V1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_V2: [u32; 3] = [22050, 24000, 16000];
const SAMPLE_RATES_V25: [u32; 3] = [11025, 12000, 8000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegAudioHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
}

impl MpegAudioHeader {
    pub fn parse(header: &[u8]) -> Option<Self> {
        let mut bs = BsIoSliceReader::from_slice(header);

        if bs.get_n::<u16>(11).ok()? != 0x7FF {
            return None;
        }

        let version = match bs.get_n::<u8>(2).ok()? {
            0 => MpegVersion::V25,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match bs.get_n::<u8>(2).ok()? {
            1 => Layer::III,
            2 => Layer::II,
            3 => Layer::I,
            _ => return None,
        };
        bs.skip_n(1).ok()?;

        let bitrate_index = bs.get_n::<u8>(4).ok()? as usize;
        let sampling_index = bs.get_n::<u8>(2).ok()? as usize;
        if bitrate_index == 0 || bitrate_index == 15 || sampling_index == 3 {
            return None;
        }
        let padding = bs.get().ok()?;

        let bitrates = match (version, layer) {
            (MpegVersion::V1, Layer::I) => &BITRATES_V1_L1,
            (MpegVersion::V1, Layer::II) => &BITRATES_V1_L2,
            (MpegVersion::V1, Layer::III) => &BITRATES_V1_L3,
            (_, Layer::I) => &BITRATES_V2_L1,
            _ => &BITRATES_V2_L23,
        };
        let sample_rates = match version {
            MpegVersion::V1 => &SAMPLE_RATES_V1,
            MpegVersion::V2 => &SAMPLE_RATES_V2,
            MpegVersion::V25 => &SAMPLE_RATES_V25,
        };

        Some(Self {
            version,
            layer,
            bitrate_kbps: bitrates[bitrate_index],
            sample_rate: sample_rates[sampling_index],
            padding,
        })
    }

    pub fn frame_length(&self) -> usize {
        let bitrate = self.bitrate_kbps * 1000;
        let padding = self.padding as u32;

        let length = match (self.layer, self.version) {
            (Layer::I, _) => (12 * bitrate / self.sample_rate + padding) * 4,
            (Layer::II, _) | (Layer::III, MpegVersion::V1) => {
                144 * bitrate / self.sample_rate + padding
            }
            (Layer::III, _) => 72 * bitrate / self.sample_rate + padding,
        };

        length as usize
    }

    fn configuration(&self) -> (MpegVersion, Layer, u32) {
        (self.version, self.layer, self.sample_rate)
    }
}

#[derive(Debug, Default)]
pub struct MpegAudioStrategy {
    locked: Option<(MpegVersion, Layer, u32)>,
}

impl FrameFormatStrategy for MpegAudioStrategy {
    fn name(&self) -> &'static str {
        "MPEG audio"
    }

    fn header_len(&self) -> usize {
        MPEG_AUDIO_HEADER_LEN
    }

    fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize> {
        find_sync_with(data, tail, MPEG_AUDIO_HEADER_LEN, |window| {
            MpegAudioHeader::parse(window).is_some()
        })
    }

    fn decide_next_state_and_length(
        &mut self,
        header: &[u8],
        state: SyncState,
    ) -> Result<Decision, Fault> {
        let parsed =
            MpegAudioHeader::parse(header).ok_or(Fault::SyncLost("invalid MPEG audio header"))?;

        match self.locked {
            Some(locked) if state != SyncState::Synchronized => {
                if locked != parsed.configuration() {
                    debug!(
                        "MPEG audio header {:?} does not match the locked {:?}",
                        parsed.configuration(),
                        locked
                    );
                    return Err(Fault::SyncLost("MPEG audio configuration changed"));
                }
            }
            _ => self.locked = Some(parsed.configuration()),
        }

        let length = parsed.frame_length();
        trace!(
            "MPEG audio {:?} layer {:?}: {} kbps @ {} Hz, {} bytes",
            parsed.version, parsed.layer, parsed.bitrate_kbps, parsed.sample_rate, length
        );

        Ok(Decision::for_state(state, length))
    }

    fn reset(&mut self) {
        self.locked = None;
    }
}

#[test]
fn frame_lengths() {
    // MPEG-1 Layer III, 128 kbps, 44.1 kHz, padded
    let header = MpegAudioHeader::parse(&[0xFF, 0xFB, 0x92, 0x64]);
    assert_eq!(header.map(|h| h.frame_length()), Some(418));

    // MPEG-1 Layer II, 192 kbps, 48 kHz
    let header = MpegAudioHeader::parse(&[0xFF, 0xFD, 0xA4, 0x00]);
    assert_eq!(header.map(|h| h.frame_length()), Some(576));

    // MPEG-2 Layer III, 64 kbps, 24 kHz
    let header = MpegAudioHeader::parse(&[0xFF, 0xF3, 0x84, 0x00]);
    assert_eq!(header.map(|h| h.frame_length()), Some(192));

    // reserved sampling index
    assert_eq!(MpegAudioHeader::parse(&[0xFF, 0xFB, 0x9C, 0x00]), None);
}

#[test]
fn locked_configuration() -> anyhow::Result<()> {
    let mut strategy = MpegAudioStrategy::default();
    let l3_44k = [0xFF, 0xFB, 0x90, 0x64];
    let l3_48k = [0xFF, 0xFB, 0x94, 0x64];

    let first = strategy.decide_next_state_and_length(&l3_44k, SyncState::Synchronized)?;
    assert_eq!(first.next, crate::formats::NextState::ReadSubFrame);
    assert_eq!(first.length, 417);

    assert!(matches!(
        strategy.decide_next_state_and_length(&l3_48k, SyncState::SeekingFrameEnd),
        Err(Fault::SyncLost(_))
    ));

    strategy.reset();
    strategy.decide_next_state_and_length(&l3_48k, SyncState::Synchronized)?;
    Ok(())
}
