//! PES container packet header.
//!
//! ## Layout
//!
//! ```text
//! 00 00 01 | stream_id | PES_packet_length(16)
//! '10' scrambling(2) priority alignment copyright original     -- flags byte 1
//! PTS_DTS(2) ESCR ES_rate DSM_trick copy_info CRC extension    -- flags byte 2
//! PES_header_data_length(8)
//! optional fields ... stuffing                                 -- header_data_length bytes
//! private data area                                            -- strategy supplied length
//! ```
//!
//! Timestamps are 33-bit values split 3/15/15 over a 40-bit field, with a `1` marker
//! bit after each group.

use std::io;

use log::{trace, warn};

use crate::structs::audio_description::{AD_DESCRIPTOR_SIZE, AudioDescriptionMetadata};
use crate::structs::timestamp::Timestamps;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

pub const PES_START_CODE_PREFIX: u32 = 0x00_00_01;

/// Start code, stream id and packet length.
pub const PES_PACKET_PREFIX_SIZE: usize = 6;

/// Prefix plus both flag bytes and `PES_header_data_length`.
pub const PES_FIXED_HEADER_SIZE: usize = 9;

/// Bytes after `PES_packet_length` that belong to the fixed header.
const PES_LENGTH_COVERED_FIXED: usize = PES_FIXED_HEADER_SIZE - PES_PACKET_PREFIX_SIZE;

pub const PROGRAM_STREAM_MAP: u8 = 0xBC;
pub const PRIVATE_STREAM_1: u8 = 0xBD;
pub const PADDING_STREAM: u8 = 0xBE;
pub const PRIVATE_STREAM_2: u8 = 0xBF;
pub const ECM_STREAM: u8 = 0xF0;
pub const EMM_STREAM: u8 = 0xF1;
pub const DSMCC_STREAM: u8 = 0xF2;
pub const H222_1_TYPE_E: u8 = 0xF8;
pub const PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;

/// Whether packets of `stream_id` carry the optional PES header after their length.
pub fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        PROGRAM_STREAM_MAP
            | PADDING_STREAM
            | PRIVATE_STREAM_2
            | ECM_STREAM
            | EMM_STREAM
            | DSMCC_STREAM
            | H222_1_TYPE_E
            | PROGRAM_STREAM_DIRECTORY
    )
}

/// Bytes needed to learn the full header length: the fixed header.
#[inline]
pub fn header_data_length(fixed: &[u8]) -> Option<usize> {
    fixed.get(PES_FIXED_HEADER_SIZE - 1).map(|&len| len as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCodeSearch {
    /// Offset of the first `00 00 01 xx` whose class byte was accepted.
    Found(usize),
    /// No start code. The last bytes form a start code prefix of this length.
    Trailing(usize),
}

/// Scans for `00 00 01` followed by a class byte accepted by `accept`.
pub fn find_start_code(data: &[u8], accept: impl Fn(u8) -> bool) -> StartCodeSearch {
    let mut matched = 0;

    for (i, &byte) in data.iter().enumerate() {
        matched = match (matched, byte) {
            (3, code) if accept(code) => return StartCodeSearch::Found(i - 3),
            (0 | 1, 0x00) => matched + 1,
            (2, 0x00) => 2,
            (2, 0x01) => 3,
            (3, 0x00) => 1,
            _ => 0,
        };
    }

    StartCodeSearch::Trailing(matched)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerHeader {
    pub stream_id: u8,
    /// `PES_packet_length`, zero when the packet is unbounded.
    pub total_length: usize,
    /// Fixed header, optional fields and private data area.
    pub header_length: usize,
    /// Payload bytes following the header, zero when unbounded.
    pub payload_length: usize,
    pub private_area_length: usize,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub audio_description: Option<AudioDescriptionMetadata>,
}

#[derive(Debug, Clone, Copy, Default)]
struct OptionalFlags {
    pts_dts: u8,
    escr: bool,
    es_rate: bool,
    dsm_trick_mode: bool,
    additional_copy_info: bool,
    crc: bool,
    extension: bool,
}

impl ContainerHeader {
    /// Parses a complete header of `PES_FIXED_HEADER_SIZE + header_data_length +
    /// private_area_length` bytes.
    ///
    /// Only the given bytes are read. The optional fields are bounded by
    /// `PES_header_data_length` and never run into the private data area.
    pub fn parse(header: &[u8], private_area_length: usize) -> Result<Self, HeaderError> {
        if header.len() < PES_FIXED_HEADER_SIZE {
            return Err(HeaderError::Truncated {
                field: "fixed header",
                available: header.len(),
            });
        }

        let fixed = &header[..PES_FIXED_HEADER_SIZE];
        let mut bs = BsIoSliceReader::from_slice(fixed);
        let truncated = truncated("fixed header", PES_FIXED_HEADER_SIZE);

        let start_code: u32 = bs.get_n(24).map_err(&truncated)?;
        if start_code != PES_START_CODE_PREFIX {
            return Err(HeaderError::BadStartCode(start_code));
        }

        let stream_id: u8 = bs.get_n(8).map_err(&truncated)?;
        let total_length: usize = bs.get_n::<u16>(16).map_err(&truncated)? as usize;

        if bs.get_n::<u8>(2).map_err(&truncated)? != 0b10 {
            return Err(HeaderError::NotMpeg2Syntax(fixed[6]));
        }
        // scrambling, priority, alignment, copyright, original
        bs.skip_n(6).map_err(&truncated)?;

        let flags = OptionalFlags {
            pts_dts: bs.get_n(2).map_err(&truncated)?,
            escr: bs.get().map_err(&truncated)?,
            es_rate: bs.get().map_err(&truncated)?,
            dsm_trick_mode: bs.get().map_err(&truncated)?,
            additional_copy_info: bs.get().map_err(&truncated)?,
            crc: bs.get().map_err(&truncated)?,
            extension: bs.get().map_err(&truncated)?,
        };
        let data_length: usize = bs.get_n::<u8>(8).map_err(&truncated)? as usize;

        let header_length = PES_FIXED_HEADER_SIZE + data_length + private_area_length;
        if header.len() < header_length {
            return Err(HeaderError::Truncated {
                field: "private data area",
                available: header.len(),
            });
        }

        let covered = PES_LENGTH_COVERED_FIXED + data_length + private_area_length;
        let payload_length = if total_length == 0 {
            0
        } else if total_length < covered {
            return Err(HeaderError::LengthUnderflow {
                packet: total_length,
                header: covered,
            });
        } else {
            total_length - covered
        };

        let optional = &header[PES_FIXED_HEADER_SIZE..PES_FIXED_HEADER_SIZE + data_length];
        let (timestamps, audio_description) = Self::parse_optional_fields(optional, flags)?;

        trace!(
            "PES header: stream {stream_id:#04X}, length {total_length}, header {header_length}, \
             pts {:?}, dts {:?}",
            timestamps.pts, timestamps.dts
        );

        Ok(Self {
            stream_id,
            total_length,
            header_length,
            payload_length,
            private_area_length,
            pts: timestamps.pts,
            dts: timestamps.dts,
            audio_description,
        })
    }

    pub fn timestamps(&self) -> Timestamps {
        Timestamps::new(self.pts, self.dts)
    }

    /// The private data area that follows the optional fields.
    pub fn private_area<'a>(&self, header: &'a [u8]) -> &'a [u8] {
        let end = self.header_length.min(header.len());
        &header[end.saturating_sub(self.private_area_length)..end]
    }

    fn parse_optional_fields(
        optional: &[u8],
        flags: OptionalFlags,
    ) -> Result<(Timestamps, Option<AudioDescriptionMetadata>), HeaderError> {
        let available = optional.len();
        let mut bs = BsIoSliceReader::from_slice(optional);
        let mut timestamps = Timestamps::default();

        match flags.pts_dts {
            0b10 => {
                timestamps.pts = Some(read_timestamp(&mut bs, "PTS", available)?);
            }
            0b11 => {
                timestamps.pts = Some(read_timestamp(&mut bs, "PTS", available)?);
                timestamps.dts = Some(read_timestamp(&mut bs, "DTS", available)?);
            }
            0b01 => {
                warn!("PES header signals a DTS without a PTS, ignoring the DTS");
                bs.skip_n(40).map_err(truncated("DTS", available))?;
            }
            _ => {}
        }

        let skips = [
            (flags.escr, "ESCR", 48),
            (flags.es_rate, "ES_rate", 24),
            (flags.dsm_trick_mode, "DSM trick mode", 8),
            (flags.additional_copy_info, "additional copy info", 8),
            (flags.crc, "previous PES CRC", 16),
        ];
        for (present, field, bits) in skips {
            if present {
                bs.skip_n(bits).map_err(truncated(field, available))?;
            }
        }

        let mut audio_description = None;
        if flags.extension {
            let private_data_flag = bs.get().map_err(truncated("PES extension", available))?;
            // pack header, sequence counter, P-STD buffer, reserved, extension 2
            bs.skip_n(7).map_err(truncated("PES extension", available))?;

            if private_data_flag {
                let mut private_data = [0u8; AD_DESCRIPTOR_SIZE];
                bs.get_bytes(&mut private_data)
                    .map_err(truncated("PES private data", available))?;
                audio_description = AudioDescriptionMetadata::from_private_data(&private_data);
            }
        }

        Ok((timestamps, audio_description))
    }
}

fn truncated(field: &'static str, available: usize) -> impl Fn(io::Error) -> HeaderError {
    move |_| HeaderError::Truncated { field, available }
}

fn read_timestamp(
    bs: &mut BsIoSliceReader,
    field: &'static str,
    available: usize,
) -> Result<u64, HeaderError> {
    let truncated = truncated(field, available);

    bs.skip_n(4).map_err(&truncated)?;
    let mut value: u64 = 0;
    for (bits, marker) in [(3, 7), (15, 23), (15, 39)] {
        value = (value << bits) | bs.get_n::<u64>(bits).map_err(&truncated)?;
        if !bs.get().map_err(&truncated)? {
            return Err(HeaderError::MarkerBitNotSet { field, bit: marker });
        }
    }

    Ok(value)
}

/// Encodes `value` as a 40-bit timestamp field with the given 4-bit prefix.
pub fn encode_timestamp(prefix: u8, value: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((value >> 29) & 0x0E) as u8) | 1,
        (value >> 22) as u8,
        (((value >> 14) & 0xFE) as u8) | 1,
        (value >> 7) as u8,
        (((value << 1) & 0xFE) as u8) | 1,
    ]
}

#[test]
fn start_code_search() {
    let audio = |code: u8| code >= 0xC0;

    assert_eq!(
        find_start_code(&[0x12, 0x00, 0x00, 0x00, 0x01, 0xC0], audio),
        StartCodeSearch::Found(2)
    );
    assert_eq!(
        find_start_code(&[0x00, 0x00, 0x01, 0xB3, 0x00, 0x00, 0x01, 0xC1], audio),
        StartCodeSearch::Found(4)
    );
    assert_eq!(
        find_start_code(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0xC1], audio),
        StartCodeSearch::Found(3)
    );
    assert_eq!(
        find_start_code(&[0x55, 0x00, 0x00, 0x01], audio),
        StartCodeSearch::Trailing(3)
    );
    assert_eq!(
        find_start_code(&[0x55, 0x00, 0x00, 0x00], audio),
        StartCodeSearch::Trailing(2)
    );
    assert_eq!(find_start_code(&[0x55, 0x00], audio), StartCodeSearch::Trailing(1));
    assert_eq!(find_start_code(&[0x00, 0x55], audio), StartCodeSearch::Trailing(0));
}

#[test]
fn parse_pts_dts() -> anyhow::Result<()> {
    let pts = 0x1_2345_6789;
    let dts = 0x0_0000_1000;

    let mut header = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x20, 0x84, 0xC0, 0x0A];
    header.extend_from_slice(&encode_timestamp(0b0011, pts));
    header.extend_from_slice(&encode_timestamp(0b0001, dts));

    let parsed = ContainerHeader::parse(&header, 0)?;
    assert_eq!(parsed.stream_id, 0xC0);
    assert_eq!(parsed.pts, Some(pts));
    assert_eq!(parsed.dts, Some(dts));
    assert_eq!(parsed.header_length, 19);
    assert_eq!(parsed.payload_length, 0x20 - 3 - 10);
    Ok(())
}

#[test]
fn marker_bit_and_bounds() {
    let mut header = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x20, 0x80, 0x80, 0x05];
    header.extend_from_slice(&encode_timestamp(0b0010, 90_000));
    header[11] &= 0xFE;
    assert_eq!(
        ContainerHeader::parse(&header, 0),
        Err(HeaderError::MarkerBitNotSet {
            field: "PTS",
            bit: 23
        })
    );

    // ESCR flagged but the optional area only has room for the PTS
    let mut header = vec![0x00, 0x00, 0x01, 0xC0, 0x00, 0x20, 0x80, 0xA0, 0x05];
    header.extend_from_slice(&encode_timestamp(0b0010, 90_000));
    assert_eq!(
        ContainerHeader::parse(&header, 0),
        Err(HeaderError::Truncated {
            field: "ESCR",
            available: 5
        })
    );

    let header = [0x00, 0x00, 0x01, 0xC0, 0x00, 0x02, 0x80, 0x00, 0x00];
    assert_eq!(
        ContainerHeader::parse(&header, 0),
        Err(HeaderError::LengthUnderflow {
            packet: 2,
            header: 3
        })
    );

    let header = [0x00, 0x00, 0x01, 0xC0, 0x00, 0x08, 0x0F, 0x00, 0x00];
    assert_eq!(
        ContainerHeader::parse(&header, 0),
        Err(HeaderError::NotMpeg2Syntax(0x0F))
    );
}

#[test]
fn private_area_and_descriptor() -> anyhow::Result<()> {
    let mut header = vec![0x00, 0x00, 0x01, 0xBD, 0x00, 0x00, 0x80, 0x01, 0x11];
    header.push(0x80);
    let mut descriptor = [0u8; AD_DESCRIPTOR_SIZE];
    descriptor[1..6].copy_from_slice(b"DTGAD");
    descriptor[6] = 0x20;
    descriptor[8] = b'1';
    header.extend_from_slice(&descriptor);
    header.extend_from_slice(&[0x80, 0x01, 0x00, 0x01]);

    let parsed = ContainerHeader::parse(&header, 4)?;
    assert_eq!(parsed.payload_length, 0);
    assert_eq!(parsed.private_area(&header), &[0x80, 0x01, 0x00, 0x01]);
    assert_eq!(parsed.audio_description.map(|ad| ad.fade), Some(0x20));
    assert!(!has_optional_header(PADDING_STREAM));
    assert!(has_optional_header(PRIVATE_STREAM_1));
    Ok(())
}
