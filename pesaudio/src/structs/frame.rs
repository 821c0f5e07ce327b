use std::sync::Arc;

use crate::structs::audio_description::AudioDescriptionMetadata;
use crate::structs::timestamp::Timestamps;

/// One collated audio access unit.
///
/// `validated` is false only for a frame forced out by a flush, whose end was never
/// confirmed by a following frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Arc<[u8]>,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    pub ancillary: Option<AudioDescriptionMetadata>,
    pub validated: bool,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        timestamps: Timestamps,
        ancillary: Option<AudioDescriptionMetadata>,
        validated: bool,
    ) -> Self {
        Self {
            data: data.into(),
            pts: timestamps.pts,
            dts: timestamps.dts,
            ancillary,
            validated,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
