use crate::utils::errors::ControlError;

/// Size of an in-band control marker.
pub const PES_CONTROL_SIZE: usize = 24;

/// Stream id byte of the start code that introduces a control marker.
pub const CONTROL_START_CODE: u8 = 0xFB;

const MARKER_SIGNATURE: [u8; 14] = [
    0x00, 0x00, 0x01, CONTROL_START_CODE, 0x00, 0x14, 0x80, 0x01, 0x11, 0x80, b'S', b'T', b'M',
    b'M',
];

/// Whether the 24 bytes starting at a control start code form a control marker.
pub fn is_valid_marker(marker: &[u8; PES_CONTROL_SIZE]) -> bool {
    marker[..MARKER_SIGNATURE.len()] == MARKER_SIGNATURE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    TimeRequest,
    BreakForward,
    BreakBackward,
    BreakBackwardSmooth,
    Splicing,
}

impl TryFrom<u8> for ControlKind {
    type Error = ControlError;

    fn try_from(command: u8) -> Result<Self, Self::Error> {
        match command {
            0x00 => Ok(ControlKind::TimeRequest),
            0x01 => Ok(ControlKind::BreakForward),
            0x02 => Ok(ControlKind::BreakBackward),
            0x03 => Ok(ControlKind::BreakBackwardSmooth),
            0x04 => Ok(ControlKind::Splicing),
            _ => Err(ControlError::UnknownCommand(command)),
        }
    }
}

/// A decoded control marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRecord {
    /// Asks to be told when the stream reaches the next PTS.
    TimeRequest { marker_ids: [u32; 2] },
    BreakForward,
    BreakBackward,
    /// A backward break that keeps the timeline continuous.
    BreakBackwardSmooth,
    /// A splice point; `pts_offset` is a signed 40-bit value.
    Splicing { flags: u8, pts_offset: i64 },
}

impl ControlRecord {
    /// Decodes a marker already checked with [`is_valid_marker`].
    pub fn parse(marker: &[u8; PES_CONTROL_SIZE]) -> Result<Self, ControlError> {
        let record = match ControlKind::try_from(marker[14])? {
            ControlKind::TimeRequest => ControlRecord::TimeRequest {
                marker_ids: [
                    u32::from_be_bytes([marker[15], marker[16], marker[17], marker[18]]),
                    u32::from_be_bytes([marker[19], marker[20], marker[21], marker[22]]),
                ],
            },
            ControlKind::BreakForward => ControlRecord::BreakForward,
            ControlKind::BreakBackward => ControlRecord::BreakBackward,
            ControlKind::BreakBackwardSmooth => ControlRecord::BreakBackwardSmooth,
            ControlKind::Splicing => {
                let raw = (u64::from(marker[20]) << 32)
                    | u64::from(u32::from_be_bytes([
                        marker[16], marker[17], marker[18], marker[19],
                    ]));
                ControlRecord::Splicing {
                    flags: marker[15],
                    pts_offset: ((raw << 24) as i64) >> 24,
                }
            }
        };

        Ok(record)
    }
}

/// Builds a control marker, mostly for tests and stream generators.
pub fn encode_marker(command: u8, payload: &[u8]) -> [u8; PES_CONTROL_SIZE] {
    let mut marker = [0u8; PES_CONTROL_SIZE];
    marker[..MARKER_SIGNATURE.len()].copy_from_slice(&MARKER_SIGNATURE);
    marker[14] = command;

    let payload = &payload[..payload.len().min(PES_CONTROL_SIZE - 15)];
    marker[15..15 + payload.len()].copy_from_slice(payload);
    marker
}

#[test]
fn marker_signature() {
    let mut marker = encode_marker(0x01, &[]);
    assert!(is_valid_marker(&marker));
    assert_eq!(ControlRecord::parse(&marker), Ok(ControlRecord::BreakForward));

    marker[12] = b'X';
    assert!(!is_valid_marker(&marker));
}

#[test]
fn command_payloads() {
    let time = encode_marker(0x00, &[0, 0, 0, 7, 0x12, 0x34, 0x56, 0x78]);
    assert_eq!(
        ControlRecord::parse(&time),
        Ok(ControlRecord::TimeRequest {
            marker_ids: [7, 0x1234_5678]
        })
    );

    // offset -2 as 40-bit two's complement: low 32 bits FF FF FF FE, high byte FF
    let splice = encode_marker(0x04, &[0x03, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF]);
    assert_eq!(
        ControlRecord::parse(&splice),
        Ok(ControlRecord::Splicing {
            flags: 0x03,
            pts_offset: -2
        })
    );

    let forward = encode_marker(0x04, &[0x00, 0x00, 0x00, 0x01, 0x00, 0x01]);
    assert_eq!(
        ControlRecord::parse(&forward),
        Ok(ControlRecord::Splicing {
            flags: 0x00,
            pts_offset: 0x1_0000_0100
        })
    );

    assert_eq!(
        ControlRecord::parse(&encode_marker(0x09, &[])),
        Err(ControlError::UnknownCommand(0x09))
    );
}
