//! Codec-specific frame format strategies.
//!
//! The frame synchronizer never branches on codec identity. Everything it needs to
//! know about a format (where a frame header starts, how long the frame is, whether
//! more sub-frames follow) comes from a [`FrameFormatStrategy`] injected at
//! construction.
//!
//! - **MPEG audio** ([`mpeg_audio`]): MPEG-1/2/2.5 Layer I, II and III
//! - **AC-3** ([`ac3`]): AC-3 and E-AC-3 with dependent substreams
//! - **ADTS** ([`adts`]): AAC in ADTS framing

use std::fmt::{Debug, Display};

use crate::utils::errors::Fault;

pub mod ac3;
pub mod adts;
pub mod mpeg_audio;

/// States of the elementary stream (frame level) state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    /// Scanning for a sync word.
    #[default]
    SeekingSync,
    /// A sync word was found, its header is being accumulated.
    Synchronized,
    /// Accumulating the header expected right after the frame in progress.
    SeekingFrameEnd,
    /// Absorbing frame payload.
    ReadSubFrame,
    /// Discarding a sub-frame the consumer does not want.
    SkipSubFrame,
    /// The accumulated frame is ready for delivery.
    FrameComplete,
    /// The accumulated frame must be checked for an internal sync word.
    ValidateFrame,
}

/// What a strategy decides after seeing a complete frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// The header completes the frame in progress.
    FrameComplete,
    /// Absorb the sub-frame into the frame in progress.
    ReadSubFrame,
    /// Drop the header and the sub-frame it announces.
    SkipSubFrame,
    /// Split the frame in progress at an internal sync word before going on.
    ValidateFrame,
}

impl From<NextState> for SyncState {
    fn from(next: NextState) -> Self {
        match next {
            NextState::FrameComplete => SyncState::FrameComplete,
            NextState::ReadSubFrame => SyncState::ReadSubFrame,
            NextState::SkipSubFrame => SyncState::SkipSubFrame,
            NextState::ValidateFrame => SyncState::ValidateFrame,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next: NextState,
    /// Length of the (sub-)frame announced by the header, header included.
    pub length: usize,
}

impl Decision {
    pub fn new(next: NextState, length: usize) -> Self {
        Self { next, length }
    }

    /// The usual decision for formats without sub-frames: a header found right after
    /// sync only starts a frame, one found at a frame end completes the previous one.
    pub fn for_state(state: SyncState, length: usize) -> Self {
        let next = if state == SyncState::Synchronized {
            NextState::ReadSubFrame
        } else {
            NextState::FrameComplete
        };

        Self { next, length }
    }
}

/// Capability interface implemented once per codec.
pub trait FrameFormatStrategy: Send + Debug {
    fn name(&self) -> &'static str;

    /// Bytes needed to decide on a frame header, sync word included.
    fn header_len(&self) -> usize;

    /// Looks for the next sync word.
    ///
    /// `tail` holds the last bytes of earlier deliveries that did not contain a sync
    /// word. A negative offset `-k` means the sync word starts `k` bytes before the end
    /// of `tail`.
    fn find_sync_word(&mut self, data: &[u8], tail: &[u8]) -> Option<isize>;

    /// Examines a complete frame header seen in `state`.
    fn decide_next_state_and_length(
        &mut self,
        header: &[u8],
        state: SyncState,
    ) -> Result<Decision, Fault>;

    /// Length of the private data area following the PES header of `stream_id`.
    fn private_data_length(&self, _stream_id: u8) -> usize {
        0
    }

    fn handle_private_data(&mut self, _data: &[u8]) -> Result<(), Fault> {
        Ok(())
    }

    /// Whether lost sync is recovered by reprocessing the accumulated bytes. When
    /// false they are simply discarded.
    fn reprocess_on_error(&self) -> bool {
        true
    }

    /// Forgets any stream state, such as a locked header configuration.
    fn reset(&mut self) {}
}

/// Shared sync search over the retained tail and the live data.
///
/// `is_sync` is given exactly `sync_len` bytes. Candidates that start inside `tail`
/// are checked first, oldest first, and reported as negative offsets.
pub fn find_sync_with(
    data: &[u8],
    tail: &[u8],
    sync_len: usize,
    is_sync: impl Fn(&[u8]) -> bool,
) -> Option<isize> {
    let mut window = Vec::with_capacity(sync_len);

    for k in (1..sync_len.min(tail.len() + 1)).rev() {
        if sync_len - k > data.len() {
            continue;
        }

        window.clear();
        window.extend_from_slice(&tail[tail.len() - k..]);
        window.extend_from_slice(&data[..sync_len - k]);
        if is_sync(&window) {
            return Some(-(k as isize));
        }
    }

    data.windows(sync_len)
        .position(is_sync)
        .map(|offset| offset as isize)
}

/// Supported elementary stream formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    MpegAudio,
    Ac3,
    Adts,
}

impl Format {
    pub fn create(self) -> Box<dyn FrameFormatStrategy> {
        match self {
            Format::MpegAudio => Box::new(mpeg_audio::MpegAudioStrategy::default()),
            Format::Ac3 => Box::new(ac3::Ac3Strategy::default()),
            Format::Adts => Box::new(adts::AdtsStrategy::default()),
        }
    }

    /// File extension of the collated elementary stream.
    pub fn extension(self) -> &'static str {
        match self {
            Format::MpegAudio => "mpa",
            Format::Ac3 => "ac3",
            Format::Adts => "aac",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::MpegAudio => write!(f, "MPEG audio"),
            Format::Ac3 => write!(f, "AC-3"),
            Format::Adts => write!(f, "AAC ADTS"),
        }
    }
}

#[test]
fn sync_across_tail() {
    let is_sync = |w: &[u8]| w == [0x0B, 0x77];

    assert_eq!(find_sync_with(&[0x77, 0x00], &[0x12, 0x0B], 2, is_sync), Some(-1));
    assert_eq!(find_sync_with(&[0x00, 0x0B, 0x77], &[0x12], 2, is_sync), Some(1));
    assert_eq!(find_sync_with(&[0x00, 0x0B], &[], 2, is_sync), None);
    assert_eq!(find_sync_with(&[], &[0x0B], 2, is_sync), None);

    let is_long_sync = |w: &[u8]| w == [1, 2, 3, 4];
    assert_eq!(find_sync_with(&[4, 9], &[0, 1, 2, 3], 4, is_long_sync), Some(-3));
    assert_eq!(find_sync_with(&[3, 4], &[9, 1, 2], 4, is_long_sync), Some(-2));
}
