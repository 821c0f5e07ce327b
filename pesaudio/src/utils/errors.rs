#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Failure taxonomy of the collator.
///
/// `MalformedHeader` is contained by the packet synchronizer, `ImplausibleLength` and
/// `SyncLost` are turned into a resynchronization by the frame synchronizer, and
/// `UnwindRequested` never leaves the recovery loop. Only `BufferExhausted` is expected to
/// reach the caller of [`Collator::input`](crate::process::collator::Collator::input).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Malformed container header: {0}")]
    MalformedHeader(#[from] HeaderError),

    #[error("Implausible frame length {length} (maximum {max})")]
    ImplausibleLength { length: usize, max: usize },

    #[error("Frame sync lost: {0}")]
    SyncLost(&'static str),

    #[error("Error recovery re-entered, unwinding to the outer attempt")]
    UnwindRequested,

    #[error("No accumulation buffer available ({live} of {limit} in use)")]
    BufferExhausted { live: usize, limit: usize },
}

impl Fault {
    /// Whether the frame synchronizer answers this fault with a resynchronization.
    pub fn triggers_recovery(&self) -> bool {
        !matches!(self, Fault::UnwindRequested | Fault::BufferExhausted { .. })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Marker bit {bit} of {field} is not set")]
    MarkerBitNotSet { field: &'static str, bit: u8 },

    #[error("Invalid start code prefix {0:#08X}")]
    BadStartCode(u32),

    #[error("Not MPEG-2 PES syntax, flags byte {0:#04X}")]
    NotMpeg2Syntax(u8),

    #[error("{field} overruns the {available} byte header area")]
    Truncated {
        field: &'static str,
        available: usize,
    },

    #[error("PES_packet_length {packet} is shorter than the {header} header bytes it must cover")]
    LengthUnderflow { packet: usize, header: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Unsupported control data command {0:#04X}")]
    UnknownCommand(u8),
}

#[test]
fn recovery_classification() {
    assert!(Fault::SyncLost("test").triggers_recovery());
    assert!(Fault::ImplausibleLength { length: 9, max: 8 }.triggers_recovery());
    assert!(Fault::from(HeaderError::NotMpeg2Syntax(0x0F)).triggers_recovery());
    assert!(!Fault::UnwindRequested.triggers_recovery());
    assert!(!Fault::BufferExhausted { live: 2, limit: 2 }.triggers_recovery());
}
