use std::ops::RangeInclusive;

use anyhow::{Result, ensure};
use log::Level;

/// DVD style sub-stream selection on the first byte of the PES private data area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubStreamFilter {
    pub mask: u8,
    pub code: u8,
}

impl SubStreamFilter {
    pub fn accepts(&self, private_data: &[u8]) -> bool {
        private_data
            .first()
            .is_none_or(|&byte| byte & self.mask == self.code)
    }
}

/// Per-stream collator configuration. Built once, validated, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Start code class bytes that never begin a container packet.
    pub ignore_codes: RangeInclusive<u8>,
    pub max_frame_size: usize,
    pub accumulation_capacity: usize,
    pub max_pooled_buffers: usize,
    pub control_data: bool,
    pub pass_private_data: bool,
    pub sub_stream_filter: Option<SubStreamFilter>,
    pub fail_level: Level,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            ignore_codes: 0x00..=0xBC,
            max_frame_size: 64 * 1024,
            accumulation_capacity: 64 * 1024,
            max_pooled_buffers: 4,
            control_data: false,
            pass_private_data: false,
            sub_stream_filter: None,
            fail_level: Level::Error,
        }
    }
}

impl Configuration {
    /// Makes contained faults, down to warnings, fail the call that hit them.
    pub fn strict(mut self) -> Self {
        self.fail_level = Level::Warn;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.ignore_codes.contains(&0xC0) || !self.ignore_codes.contains(&0xBD),
            "Ignore range {:#04X}..={:#04X} leaves no audio stream id",
            self.ignore_codes.start(),
            self.ignore_codes.end()
        );
        ensure!(self.max_frame_size > 0, "Maximum frame size must be positive");
        ensure!(
            self.max_frame_size <= 16 * 1024 * 1024,
            "Maximum frame size {} is implausibly large",
            self.max_frame_size
        );
        ensure!(
            self.max_pooled_buffers > 0,
            "At least one pooled buffer is required"
        );
        Ok(())
    }
}

#[test]
fn validation() {
    assert!(Configuration::default().validate().is_ok());

    let config = Configuration {
        ignore_codes: 0x00..=0xFF,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    let config = Configuration {
        max_frame_size: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());

    assert_eq!(Configuration::default().strict().fail_level, Level::Warn);
}

#[test]
fn sub_stream_filter() {
    let filter = SubStreamFilter {
        mask: 0xF8,
        code: 0x80,
    };
    assert!(filter.accepts(&[0x81, 0x01]));
    assert!(!filter.accepts(&[0xA0]));
    assert!(filter.accepts(&[]));
}
