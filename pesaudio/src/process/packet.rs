use log::Level::Warn;
use log::{debug, trace, warn};

use crate::formats::FrameFormatStrategy;
use crate::log_or_err;
use crate::process::Statistics;
use crate::process::config::{Configuration, SubStreamFilter};
use crate::structs::pes_header::{
    ContainerHeader, PES_FIXED_HEADER_SIZE, PES_PACKET_PREFIX_SIZE, StartCodeSearch,
    find_start_code, has_optional_header, header_data_length,
};
use crate::utils::cursor::ByteCursor;
use crate::utils::errors::Fault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketState {
    SeekingHeader,
    AccumulatingHeader,
    PayloadLiveOut {
        remaining: usize,
        offset: usize,
        discard: bool,
    },
    SkippingPacket {
        remaining: usize,
    },
}

/// What the packet synchronizer found in the bytes it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketEvent<'a> {
    /// A complete, well-formed container header.
    Header {
        header: ContainerHeader,
        private_data: Vec<u8>,
        /// The payload of this packet is dropped by the sub-stream filter.
        discard: bool,
    },
    /// A span of payload. `offset` counts the payload bytes of the same packet that
    /// were delivered before it.
    Payload { data: &'a [u8], offset: usize },
}

/// Locks to PES start codes and splits the transport byte stream into container
/// headers and payload spans.
///
/// A start code cut by a delivery boundary is remembered as a count of trailing
/// prefix bytes and completed from the front of the next delivery.
#[derive(Debug)]
pub struct PacketSynchronizer {
    state: PacketState,
    header: Vec<u8>,
    trailing_start_code_bytes: usize,
    ignore_codes: std::ops::RangeInclusive<u8>,
    sub_stream_filter: Option<SubStreamFilter>,
    pass_private_data: bool,
    pub(crate) fail_level: log::Level,
    pub(crate) stats: Statistics,
}

impl PacketSynchronizer {
    pub fn new(config: &Configuration) -> Self {
        Self {
            state: PacketState::SeekingHeader,
            header: Vec::with_capacity(PES_FIXED_HEADER_SIZE + 255),
            trailing_start_code_bytes: 0,
            ignore_codes: config.ignore_codes.clone(),
            sub_stream_filter: config.sub_stream_filter,
            pass_private_data: config.pass_private_data,
            fail_level: config.fail_level,
            stats: Statistics::default(),
        }
    }

    /// Drops any partial header and goes back to seeking a start code.
    pub fn reset(&mut self) {
        self.state = PacketState::SeekingHeader;
        self.header.clear();
        self.trailing_start_code_bytes = 0;
    }

    /// Consumes bytes from `cursor` until a header or payload span is found, or the
    /// cursor is exhausted (`Ok(None)`).
    ///
    /// A malformed header is contained here: the packet is abandoned and the search
    /// for the next start code resumes. It is only returned as an error when the
    /// configured fail level asks for it.
    pub fn next_event<'a>(
        &mut self,
        cursor: &mut ByteCursor<'a>,
        strategy: &dyn FrameFormatStrategy,
    ) -> Result<Option<PacketEvent<'a>>, Fault> {
        loop {
            match self.state {
                PacketState::SeekingHeader => {
                    if cursor.is_empty() {
                        return Ok(None);
                    }
                    self.search_for_header(cursor);
                }
                PacketState::AccumulatingHeader => {
                    if let Some(event) = self.read_partial_header(cursor, strategy)? {
                        return Ok(Some(event));
                    }
                    if cursor.is_empty() && self.state == PacketState::AccumulatingHeader {
                        return Ok(None);
                    }
                }
                PacketState::PayloadLiveOut {
                    remaining,
                    offset,
                    discard,
                } => {
                    if cursor.is_empty() {
                        return Ok(None);
                    }

                    let data = cursor.take(remaining);
                    let remaining = remaining - data.len();
                    self.state = if remaining == 0 {
                        PacketState::SeekingHeader
                    } else {
                        PacketState::PayloadLiveOut {
                            remaining,
                            offset: offset + data.len(),
                            discard,
                        }
                    };

                    if discard {
                        self.stats.bytes_discarded += data.len() as u64;
                        continue;
                    }
                    return Ok(Some(PacketEvent::Payload { data, offset }));
                }
                PacketState::SkippingPacket { remaining } => {
                    if cursor.is_empty() {
                        return Ok(None);
                    }

                    let skipped = cursor.take(remaining).len();
                    self.stats.bytes_discarded += skipped as u64;
                    self.state = match remaining - skipped {
                        0 => PacketState::SeekingHeader,
                        remaining => PacketState::SkippingPacket { remaining },
                    };
                }
            }
        }
    }

    fn search_for_header(&mut self, cursor: &mut ByteCursor) {
        while self.trailing_start_code_bytes > 0 {
            let Some(byte) = cursor.first() else {
                return;
            };

            match (self.trailing_start_code_bytes, byte) {
                (3, code) if !self.ignore_codes.contains(&code) => {
                    trace!("Start code 00 00 01 {code:02X} spans two deliveries");
                    cursor.advance(1);
                    self.header.clear();
                    self.header.extend_from_slice(&[0x00, 0x00, 0x01, code]);
                    self.trailing_start_code_bytes = 0;
                    self.state = PacketState::AccumulatingHeader;
                    return;
                }
                (2, 0x01) | (1, 0x00) => {
                    self.trailing_start_code_bytes += 1;
                    cursor.advance(1);
                }
                (2, 0x00) => cursor.advance(1),
                _ => self.trailing_start_code_bytes = 0,
            }
        }

        let data = cursor.peek();
        match find_start_code(data, |code| !self.ignore_codes.contains(&code)) {
            StartCodeSearch::Found(offset) => {
                if offset > 0 {
                    debug!("Skipped {offset} bytes before a PES start code");
                    self.stats.bytes_discarded += offset as u64;
                }
                cursor.advance(offset);
                self.header.clear();
                self.state = PacketState::AccumulatingHeader;
            }
            StartCodeSearch::Trailing(trailing) => {
                trace!(
                    "No PES start code in {} bytes, {trailing} might start one",
                    data.len()
                );
                self.stats.bytes_discarded += (data.len() - trailing) as u64;
                cursor.advance(data.len());
                self.trailing_start_code_bytes = trailing;
            }
        }
    }

    fn read_partial_header<'a>(
        &mut self,
        cursor: &mut ByteCursor<'a>,
        strategy: &dyn FrameFormatStrategy,
    ) -> Result<Option<PacketEvent<'a>>, Fault> {
        if self.header.len() < PES_PACKET_PREFIX_SIZE {
            let bytes = cursor.take(PES_PACKET_PREFIX_SIZE - self.header.len());
            self.header.extend_from_slice(bytes);
            if self.header.len() < PES_PACKET_PREFIX_SIZE {
                return Ok(None);
            }

            let stream_id = self.header[3];
            if !has_optional_header(stream_id) {
                let length = u16::from_be_bytes([self.header[4], self.header[5]]) as usize;
                trace!("Skipping {length} bytes of stream {stream_id:#04X}");
                self.header.clear();
                self.state = match length {
                    0 => PacketState::SeekingHeader,
                    remaining => PacketState::SkippingPacket { remaining },
                };
                return Ok(None);
            }
        }

        if self.header.len() < PES_FIXED_HEADER_SIZE {
            let bytes = cursor.take(PES_FIXED_HEADER_SIZE - self.header.len());
            self.header.extend_from_slice(bytes);
            if self.header.len() < PES_FIXED_HEADER_SIZE {
                return Ok(None);
            }
        }

        let stream_id = self.header[3];
        let private_length = strategy.private_data_length(stream_id);
        let header_length = PES_FIXED_HEADER_SIZE
            + header_data_length(&self.header).unwrap_or_default()
            + private_length;

        if self.header.len() < header_length {
            let bytes = cursor.take(header_length - self.header.len());
            self.header.extend_from_slice(bytes);
            if self.header.len() < header_length {
                return Ok(None);
            }
        }

        let parsed = ContainerHeader::parse(&self.header, private_length);
        let header = match parsed {
            Ok(header) => header,
            Err(err) => {
                self.reset();
                self.stats.pes_sync_lost += 1;
                self.stats.malformed_headers += 1;
                log_or_err!(self, Warn, Fault::MalformedHeader(err));
                return Ok(None);
            }
        };

        let private_data = header.private_area(&self.header).to_vec();
        self.header.clear();
        self.stats.packets += 1;

        let discard = self
            .sub_stream_filter
            .is_some_and(|filter| !filter.accepts(&private_data));
        if discard {
            trace!(
                "Sub-stream {:#04X} filtered out",
                private_data.first().copied().unwrap_or_default()
            );
        }

        self.state = if header.total_length == 0 {
            warn!(
                "Unbounded PES packet on stream {:#04X}, seeking the next start code",
                header.stream_id
            );
            PacketState::SeekingHeader
        } else if header.payload_length == 0 {
            PacketState::SeekingHeader
        } else {
            let offset = if self.pass_private_data && !discard {
                private_data.len()
            } else {
                0
            };
            PacketState::PayloadLiveOut {
                remaining: header.payload_length,
                offset,
                discard,
            }
        };

        trace!(
            "PES packet on stream {:#04X}: {} payload bytes",
            header.stream_id, header.payload_length
        );

        Ok(Some(PacketEvent::Header {
            header,
            private_data,
            discard,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{TestCodec, pes_packet};

    fn collect(
        sync: &mut PacketSynchronizer,
        chunks: &[&[u8]],
    ) -> anyhow::Result<(Vec<ContainerHeader>, Vec<u8>)> {
        let strategy = TestCodec::default();
        let mut headers = Vec::new();
        let mut payload = Vec::new();

        for chunk in chunks {
            let mut cursor = ByteCursor::new(chunk);
            while let Some(event) = sync.next_event(&mut cursor, &strategy)? {
                match event {
                    PacketEvent::Header { header, .. } => headers.push(header),
                    PacketEvent::Payload { data, .. } => payload.extend_from_slice(data),
                }
            }
        }

        Ok((headers, payload))
    }

    #[test]
    fn start_code_split_across_deliveries() -> anyhow::Result<()> {
        let packet = pes_packet(0xC0, Some(9000), &[1, 2, 3, 4, 5]);
        let mut stream = vec![0xAB, 0xCD];
        stream.extend_from_slice(&packet);

        for split in 1..stream.len() {
            let mut sync = PacketSynchronizer::new(&Configuration::default());
            let (headers, payload) = collect(&mut sync, &[&stream[..split], &stream[split..]])?;

            assert_eq!(headers.len(), 1, "split at {split}");
            assert_eq!(headers[0].pts, Some(9000));
            assert_eq!(payload, [1, 2, 3, 4, 5]);
        }
        Ok(())
    }

    #[test]
    fn headerless_streams_are_skipped() -> anyhow::Result<()> {
        let mut stream = vec![0x00, 0x00, 0x01, 0xBE, 0x00, 0x04, 0x00, 0x00, 0x01, 0xC0];
        stream.extend_from_slice(&pes_packet(0xC0, None, &[7, 7]));

        let mut sync = PacketSynchronizer::new(&Configuration::default());
        let (headers, payload) = collect(&mut sync, &[&stream])?;

        assert_eq!(headers.len(), 1);
        assert_eq!(payload, [7, 7]);
        Ok(())
    }

    #[test]
    fn malformed_header_is_contained() -> anyhow::Result<()> {
        let mut broken = pes_packet(0xC0, Some(1234), &[9, 9, 9]);
        broken[11] &= 0xFE;
        let mut stream = broken;
        stream.extend_from_slice(&pes_packet(0xC0, Some(5678), &[1, 2]));

        let mut sync = PacketSynchronizer::new(&Configuration::default());
        let (headers, payload) = collect(&mut sync, &[&stream])?;
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].pts, Some(5678));
        assert_eq!(payload, [1, 2]);
        assert_eq!(sync.stats.malformed_headers, 1);

        let mut strict = PacketSynchronizer::new(&Configuration::default().strict());
        let err = collect(&mut strict, &[&stream]).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<Fault>()),
            Some(Fault::MalformedHeader(_))
        ));
        Ok(())
    }

    #[test]
    fn sub_stream_filter_discards_payload() -> anyhow::Result<()> {
        let config = Configuration {
            sub_stream_filter: Some(SubStreamFilter {
                mask: 0xFF,
                code: 0x81,
            }),
            ..Default::default()
        };
        let mut stream = crate::process::testing::pes_packet_with_private(
            0xBD,
            Some(90),
            &[0x80, 0x01, 0x00, 0x01],
            &[1, 1, 1],
        );
        stream.extend_from_slice(&crate::process::testing::pes_packet_with_private(
            0xBD,
            Some(180),
            &[0x81, 0x01, 0x00, 0x01],
            &[2, 2],
        ));

        let mut sync = PacketSynchronizer::new(&config);
        let strategy = TestCodec::with_private_length(4);
        let mut cursor = ByteCursor::new(&stream);
        let mut events = Vec::new();
        while let Some(event) = sync.next_event(&mut cursor, &strategy)? {
            events.push(event);
        }

        assert!(matches!(
            events[0],
            PacketEvent::Header { discard: true, .. }
        ));
        assert!(matches!(
            events[1],
            PacketEvent::Header { discard: false, .. }
        ));
        assert_eq!(
            events[2],
            PacketEvent::Payload {
                data: &[2, 2],
                offset: 0
            }
        );
        assert_eq!(events.len(), 3);
        Ok(())
    }
}
