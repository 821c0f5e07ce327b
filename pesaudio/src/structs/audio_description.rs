//! Audio description descriptor carried in the PES private data field.
//!
//! Broadcasters signal audio description (narration mixed over the main
//! programme) with a 16-byte block tagged `DTGAD`:
//!
//! | Byte   | Content                                   |
//! |--------|-------------------------------------------|
//! | 0      | reserved / descriptor length              |
//! | 1..6   | ASCII `DTGAD`                             |
//! | 6      | fade byte                                 |
//! | 7      | pan byte                                  |
//! | 8      | version tag, `'1'` or `'2'`               |
//! | 9..12  | centre, front and surround gain (v2 only) |

use log::trace;

pub const AD_DESCRIPTOR_TAG: &[u8; 5] = b"DTGAD";
pub const AD_DESCRIPTOR_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioDescriptionMetadata {
    pub fade: u8,
    pub pan: u8,
    pub gain_center: u8,
    pub gain_front: u8,
    pub gain_surround: u8,
    pub valid: bool,
}

impl AudioDescriptionMetadata {
    /// Reads the descriptor out of a PES private data field.
    ///
    /// Returns `None` when the field does not hold a `DTGAD` descriptor at all. A
    /// tagged descriptor with an unknown version is returned with `valid` cleared.
    pub fn from_private_data(data: &[u8]) -> Option<Self> {
        if data.len() < 9 || &data[1..6] != AD_DESCRIPTOR_TAG {
            return None;
        }

        let mut metadata = Self {
            fade: data[6],
            pan: data[7],
            ..Default::default()
        };

        match data[8] {
            b'1' => metadata.valid = true,
            b'2' if data.len() >= 12 => {
                metadata.gain_center = data[9];
                metadata.gain_front = data[10];
                metadata.gain_surround = data[11];
                metadata.valid = true;
            }
            version => trace!("Unsupported audio description version {version:#04X}"),
        }

        Some(metadata)
    }
}

#[test]
fn descriptor_versions() {
    let mut field = [0u8; AD_DESCRIPTOR_SIZE];
    field[0] = 0x0F;
    field[1..6].copy_from_slice(AD_DESCRIPTOR_TAG);
    field[6] = 0x40;
    field[7] = 0x7F;
    field[8] = b'1';
    field[9] = 0x11;

    let v1 = AudioDescriptionMetadata::from_private_data(&field);
    assert_eq!(
        v1,
        Some(AudioDescriptionMetadata {
            fade: 0x40,
            pan: 0x7F,
            valid: true,
            ..Default::default()
        })
    );

    field[8] = b'2';
    field[10] = 0x22;
    field[11] = 0x33;
    let v2 = AudioDescriptionMetadata::from_private_data(&field);
    assert_eq!(
        v2.map(|ad| (ad.gain_center, ad.gain_front, ad.gain_surround)),
        Some((0x11, 0x22, 0x33))
    );

    field[8] = b'9';
    assert_eq!(
        AudioDescriptionMetadata::from_private_data(&field).map(|ad| ad.valid),
        Some(false)
    );

    field[1] = b'X';
    assert_eq!(AudioDescriptionMetadata::from_private_data(&field), None);
}
