use log::{error, trace};

use crate::structs::control::{
    CONTROL_START_CODE, ControlRecord, PES_CONTROL_SIZE, is_valid_marker,
};
use crate::structs::pes_header::{StartCodeSearch, find_start_code};
use crate::utils::cursor::ByteCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractorState {
    /// `trailing` start code prefix bytes from an earlier delivery are held back.
    Seeking { trailing: usize },
    /// A control start code was seen, the rest of the marker is being gathered.
    Partial,
}

/// Held-back bytes that turned out not to be a control marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSpill {
    bytes: [u8; PES_CONTROL_SIZE],
    len: usize,
}

impl ControlSpill {
    fn new(bytes: &[u8]) -> Self {
        let mut spill = Self {
            bytes: [0; PES_CONTROL_SIZE],
            len: bytes.len(),
        };
        spill.bytes[..bytes.len()].copy_from_slice(bytes);
        spill
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent<'a> {
    /// Transport bytes to pass on unchanged.
    Forward(&'a [u8]),
    /// Held-back bytes to pass on, ahead of anything forwarded after them.
    Spill(ControlSpill),
    Record(ControlRecord),
}

/// Removes in-band control markers from the transport byte stream.
///
/// Bytes that could still belong to a marker are held back until the marker is
/// either complete or ruled out, so every marker is reported exactly once wherever
/// the delivery boundaries fall.
#[derive(Debug)]
pub struct ControlChannelExtractor {
    state: ExtractorState,
    stored: [u8; PES_CONTROL_SIZE],
    got: usize,
}

impl Default for ControlChannelExtractor {
    fn default() -> Self {
        Self {
            state: ExtractorState::Seeking { trailing: 0 },
            stored: [0; PES_CONTROL_SIZE],
            got: 0,
        }
    }
}

impl ControlChannelExtractor {
    /// Next event from `cursor`, or `None` once the cursor is exhausted.
    pub fn next_event<'a>(&mut self, cursor: &mut ByteCursor<'a>) -> Option<ControlEvent<'a>> {
        loop {
            match self.state {
                ExtractorState::Seeking { trailing: 0 } => {
                    if cursor.is_empty() {
                        return None;
                    }

                    let data = cursor.peek();
                    match find_start_code(data, |code| code == CONTROL_START_CODE) {
                        StartCodeSearch::Found(0) => {
                            self.stored[..4].copy_from_slice(cursor.take(4));
                            self.got = 4;
                            self.state = ExtractorState::Partial;
                        }
                        StartCodeSearch::Found(offset) => {
                            return Some(ControlEvent::Forward(cursor.take(offset)));
                        }
                        StartCodeSearch::Trailing(trailing) => {
                            let forward = cursor.take(data.len() - trailing);
                            self.stored[..trailing].copy_from_slice(cursor.take_all());
                            self.state = ExtractorState::Seeking { trailing };
                            if !forward.is_empty() {
                                return Some(ControlEvent::Forward(forward));
                            }
                        }
                    }
                }
                ExtractorState::Seeking { trailing } => {
                    let byte = cursor.first()?;
                    if let Some(spill) = self.continue_prefix(trailing, byte, cursor) {
                        return Some(ControlEvent::Spill(spill));
                    }
                }
                ExtractorState::Partial => {
                    let bytes = cursor.take(PES_CONTROL_SIZE - self.got);
                    self.stored[self.got..self.got + bytes.len()].copy_from_slice(bytes);
                    self.got += bytes.len();
                    if self.got < PES_CONTROL_SIZE {
                        return None;
                    }

                    if let Some(event) = self.complete_marker() {
                        return Some(event);
                    }
                }
            }
        }
    }

    /// Extends a start code prefix held back from an earlier delivery by one byte.
    fn continue_prefix(
        &mut self,
        trailing: usize,
        byte: u8,
        cursor: &mut ByteCursor,
    ) -> Option<ControlSpill> {
        match (trailing, byte) {
            (3, CONTROL_START_CODE) => {
                trace!("Control start code spans two deliveries");
                cursor.advance(1);
                self.stored[3] = byte;
                self.got = 4;
                self.state = ExtractorState::Partial;
                None
            }
            (3, 0x00) => {
                cursor.advance(1);
                let spill = ControlSpill::new(&self.stored[..3]);
                self.stored[0] = 0x00;
                self.state = ExtractorState::Seeking { trailing: 1 };
                Some(spill)
            }
            (2, 0x01) | (1, 0x00) => {
                cursor.advance(1);
                self.stored[trailing] = byte;
                self.state = ExtractorState::Seeking {
                    trailing: trailing + 1,
                };
                None
            }
            (2, 0x00) => {
                cursor.advance(1);
                Some(ControlSpill::new(&[0x00]))
            }
            _ => {
                self.state = ExtractorState::Seeking { trailing: 0 };
                Some(ControlSpill::new(&self.stored[..trailing]))
            }
        }
    }

    fn complete_marker(&mut self) -> Option<ControlEvent<'static>> {
        if is_valid_marker(&self.stored) {
            self.state = ExtractorState::Seeking { trailing: 0 };
            self.got = 0;

            return match ControlRecord::parse(&self.stored) {
                Ok(record) => {
                    trace!("Control marker {record:?}");
                    Some(ControlEvent::Record(record))
                }
                Err(err) => {
                    error!("{err}, marker dropped");
                    None
                }
            };
        }

        // not a marker, look for another start code from the second byte on
        let keep = match find_start_code(&self.stored[1..], |code| code == CONTROL_START_CODE) {
            StartCodeSearch::Found(offset) => {
                self.state = ExtractorState::Partial;
                PES_CONTROL_SIZE - 1 - offset
            }
            StartCodeSearch::Trailing(trailing) => {
                self.state = ExtractorState::Seeking { trailing };
                trailing
            }
        };

        let spill = ControlSpill::new(&self.stored[..PES_CONTROL_SIZE - keep]);
        self.stored.copy_within(PES_CONTROL_SIZE - keep.., 0);
        self.got = if self.state == ExtractorState::Partial {
            keep
        } else {
            0
        };
        Some(ControlEvent::Spill(spill))
    }

    /// Releases any held-back bytes, for the end of the stream.
    pub fn drain(&mut self) -> Option<ControlSpill> {
        let held = match self.state {
            ExtractorState::Seeking { trailing } => trailing,
            ExtractorState::Partial => self.got,
        };
        self.reset();

        (held > 0).then(|| ControlSpill::new(&self.stored[..held]))
    }

    pub fn reset(&mut self) {
        self.state = ExtractorState::Seeking { trailing: 0 };
        self.got = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::control::encode_marker;

    fn extract(chunks: &[&[u8]]) -> (Vec<u8>, Vec<ControlRecord>) {
        let mut extractor = ControlChannelExtractor::default();
        let mut forwarded = Vec::new();
        let mut records = Vec::new();

        for chunk in chunks {
            let mut cursor = ByteCursor::new(chunk);
            while let Some(event) = extractor.next_event(&mut cursor) {
                match event {
                    ControlEvent::Forward(data) => forwarded.extend_from_slice(data),
                    ControlEvent::Spill(spill) => forwarded.extend_from_slice(spill.as_slice()),
                    ControlEvent::Record(record) => records.push(record),
                }
            }
        }
        if let Some(spill) = extractor.drain() {
            forwarded.extend_from_slice(spill.as_slice());
        }

        (forwarded, records)
    }

    #[test]
    fn marker_split_across_deliveries() {
        let mut stream = vec![1, 2, 3];
        stream.extend_from_slice(&encode_marker(0x01, &[]));
        stream.extend_from_slice(&[4, 5]);

        let (forwarded, records) = extract(&[&stream[..16], &stream[16..]]);
        assert_eq!(forwarded, [1, 2, 3, 4, 5]);
        assert_eq!(records, [ControlRecord::BreakForward]);

        for split in 0..=stream.len() {
            assert_eq!(
                extract(&[&stream[..split], &stream[split..]]),
                (forwarded.clone(), records.clone()),
                "split at {split}"
            );
        }
    }

    #[test]
    fn false_marker_is_forwarded() {
        let mut stream = vec![0x00, 0x00, 0x01, 0xFB];
        stream.extend_from_slice(&encode_marker(0x00, &[0, 0, 0, 1, 0, 0, 0, 2]));
        stream.push(9);

        let (forwarded, records) = extract(&[&stream]);
        assert_eq!(forwarded, [0x00, 0x00, 0x01, 0xFB, 9]);
        assert_eq!(
            records,
            [ControlRecord::TimeRequest {
                marker_ids: [1, 2]
            }]
        );

        let mut lookalike = vec![0x00, 0x00, 0x00, 0x01, 0xFB];
        lookalike.extend_from_slice(&[0x55; 30]);
        lookalike.extend_from_slice(&[0x00, 0x00]);
        let (forwarded, records) = extract(&[&lookalike]);
        assert_eq!(forwarded, lookalike);
        assert!(records.is_empty());
    }

    #[test]
    fn unknown_command_is_dropped() {
        let mut stream = vec![7];
        stream.extend_from_slice(&encode_marker(0x42, &[]));
        stream.push(8);

        let (forwarded, records) = extract(&[&stream]);
        assert_eq!(forwarded, [7, 8]);
        assert!(records.is_empty());
    }
}
