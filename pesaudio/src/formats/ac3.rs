//! AC-3 and E-AC-3 (Dolby Digital and Dolby Digital Plus).
//!
//! Both share the `0x0B77` sync word. `bsid` tells them apart: up to 10 is AC-3,
//! 11 to 16 is E-AC-3. E-AC-3 dependent substreams extend the independent substream
//! in front of them and are collated into the same frame.
//!
//! On DVD the audio rides in `private_stream_1` behind a 4-byte header of
//! sub-stream id, frame count and first access unit pointer.

use log::trace;

use crate::formats::{Decision, FrameFormatStrategy, NextState, SyncState, find_sync_with};
use crate::structs::pes_header::PRIVATE_STREAM_1;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::Fault;

pub const AC3_HEADER_LEN: usize = 6;
pub const AC3_SYNC_WORD: [u8; 2] = [0x0B, 0x77];
pub const DVD_PRIVATE_HEADER_LEN: usize = 4;

const AC3_BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Independent,
    Dependent,
    Ac3Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Header {
    pub bsid: u8,
    pub stream_type: StreamType,
    pub frame_length: usize,
}

impl Ac3Header {
    pub fn parse(header: &[u8]) -> Result<Self, Fault> {
        if header.len() < AC3_HEADER_LEN || header[..2] != AC3_SYNC_WORD {
            return Err(Fault::SyncLost("no AC-3 sync word"));
        }

        let bsid = header[5] >> 3;
        match bsid {
            0..=10 => Self::parse_ac3(header, bsid),
            11..=16 => Self::parse_eac3(header, bsid),
            _ => Err(Fault::SyncLost("unsupported AC-3 bsid")),
        }
    }

    fn parse_ac3(header: &[u8], bsid: u8) -> Result<Self, Fault> {
        let fscod = header[4] >> 6;
        let frmsizecod = (header[4] & 0x3F) as usize;

        let bitrate = *AC3_BITRATES
            .get(frmsizecod / 2)
            .ok_or(Fault::SyncLost("invalid AC-3 frmsizecod"))?;
        let words = match fscod {
            0 => bitrate * 2,
            1 => bitrate * 96_000 / 44_100 + (frmsizecod & 1) as u32,
            2 => bitrate * 3,
            _ => return Err(Fault::SyncLost("reserved AC-3 fscod")),
        };

        Ok(Self {
            bsid,
            stream_type: StreamType::Independent,
            frame_length: words as usize * 2,
        })
    }

    fn parse_eac3(header: &[u8], bsid: u8) -> Result<Self, Fault> {
        let mut bs = BsIoSliceReader::from_slice(&header[2..]);
        let truncated = |_| Fault::SyncLost("truncated E-AC-3 header");

        let stream_type = match bs.get_n::<u8>(2).map_err(truncated)? {
            0 => StreamType::Independent,
            1 => StreamType::Dependent,
            2 => StreamType::Ac3Convert,
            _ => return Err(Fault::SyncLost("reserved E-AC-3 strmtyp")),
        };
        let _substreamid: u8 = bs.get_n(3).map_err(truncated)?;
        let frmsiz: u16 = bs.get_n(11).map_err(truncated)?;

        if header[4] >> 6 == 3 && (header[4] >> 4) & 3 == 3 {
            return Err(Fault::SyncLost("reserved E-AC-3 fscod2"));
        }

        Ok(Self {
            bsid,
            stream_type,
            frame_length: (frmsiz as usize + 1) * 2,
        })
    }
}

#[derive(Debug, Default)]
pub struct Ac3Strategy;

impl FrameFormatStrategy for Ac3Strategy {
    fn name(&self) -> &'static str {
        "AC-3"
    }

    fn header_len(&self) -> usize {
        AC3_HEADER_LEN
    }

    fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize> {
        find_sync_with(data, tail, AC3_SYNC_WORD.len(), |window| {
            window == AC3_SYNC_WORD
        })
    }

    fn decide_next_state_and_length(
        &mut self,
        header: &[u8],
        state: SyncState,
    ) -> Result<Decision, Fault> {
        let parsed = Ac3Header::parse(header)?;

        trace!(
            "AC-3 bsid {} {:?} substream, {} bytes",
            parsed.bsid, parsed.stream_type, parsed.frame_length
        );

        if parsed.stream_type == StreamType::Dependent {
            return Ok(Decision::new(NextState::ReadSubFrame, parsed.frame_length));
        }

        Ok(Decision::for_state(state, parsed.frame_length))
    }

    fn private_data_length(&self, stream_id: u8) -> usize {
        if stream_id == PRIVATE_STREAM_1 {
            DVD_PRIVATE_HEADER_LEN
        } else {
            0
        }
    }

    fn handle_private_data(&mut self, data: &[u8]) -> Result<(), Fault> {
        if let &[substream_id, frame_count, pointer_hi, pointer_lo] = data {
            trace!(
                "DVD private header: sub-stream {substream_id:#04X}, {frame_count} frames, \
                 first access unit at {}",
                u16::from_be_bytes([pointer_hi, pointer_lo])
            );
        }
        Ok(())
    }
}

#[test]
fn ac3_frame_lengths() -> anyhow::Result<()> {
    // 48 kHz, 448 kbps
    let header = Ac3Header::parse(&[0x0B, 0x77, 0x00, 0x00, 0x1E, 0x40])?;
    assert_eq!(header.frame_length, 1792);

    // 44.1 kHz, 32 kbps, odd frmsizecod
    let header = Ac3Header::parse(&[0x0B, 0x77, 0x00, 0x00, 0x41, 0x40])?;
    assert_eq!(header.frame_length, 140);

    assert!(Ac3Header::parse(&[0x0B, 0x77, 0x00, 0x00, 0xC0, 0x40]).is_err());
    Ok(())
}

#[test]
fn eac3_dependent_substream() -> anyhow::Result<()> {
    let mut strategy = Ac3Strategy::default();
    let independent = [0x0B, 0x77, 0x02, 0xFF, 0x3F, 0x80];
    let dependent = [0x0B, 0x77, 0x40, 0x7F, 0x3F, 0x80];

    let first = strategy.decide_next_state_and_length(&independent, SyncState::Synchronized)?;
    assert_eq!(first, Decision::new(NextState::ReadSubFrame, 1536));

    let second = strategy.decide_next_state_and_length(&dependent, SyncState::SeekingFrameEnd)?;
    assert_eq!(second, Decision::new(NextState::ReadSubFrame, 256));

    let third = strategy.decide_next_state_and_length(&independent, SyncState::SeekingFrameEnd)?;
    assert_eq!(third.next, NextState::FrameComplete);

    assert_eq!(strategy.private_data_length(PRIVATE_STREAM_1), 4);
    assert_eq!(strategy.private_data_length(0xC0), 0);
    Ok(())
}
