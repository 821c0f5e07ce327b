#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Collation of audio elementary streams out of PES (packetized elementary stream)
//! packets.
//!
//! ### Stages
//!
//! **Packet level**: PES start codes are located, headers are parsed and their PTS/DTS
//! captured, and payload spans are handed on.
//! **Frame level**: codec sync words are located inside the payload and complete
//! frames are accumulated and delivered.
//!
//! An optional control channel removes 24-byte in-band control markers before either
//! stage runs.
//!
//! ### Timestamps
//!
//! A frame carries the timestamp of the packet its header was found in. A header that
//! started in the previous packet carries that packet's timestamp instead.
//!
//! ## Quick Start
//!
//! 1. Pick a [`formats::Format`] and build its strategy
//! 2. Create a [`process::collator::Collator`] with a frame sink
//! 3. Push deliveries through [`process::collator::Collator::input`], then flush

/// Codec-specific frame format strategies.
///
/// - **MPEG audio** ([`formats::mpeg_audio`])
/// - **AC-3 / E-AC-3** ([`formats::ac3`])
/// - **ADTS** ([`formats::adts`])
pub mod formats;

/// Collation stages and their facade.
///
/// 1. **Control Channel** ([`process::control`]): In-band marker extraction.
///
/// 2. **Packet Sync** ([`process::packet`]): PES header parsing.
///
/// 3. **Frame Sync** ([`process::frame`]): Frame accumulation and error recovery.
///
/// 4. **Collator** ([`process::collator`]): Single entry point tying the stages
///    together.
pub mod process;

/// Data structures representing PES and collation components.
///
/// - **PES Header** ([`structs::pes_header`]): Container header parsing
/// - **Audio Description** ([`structs::audio_description`]): Broadcast AD descriptor
/// - **Timestamps** ([`structs::timestamp`]): PTS/DTS pairs
/// - **Frames** ([`structs::frame`]): Delivered access units
/// - **Control Records** ([`structs::control`]): In-band control markers
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **Cursor** ([`utils::cursor`]): Byte window bookkeeping
/// - **Accumulation** ([`utils::accumulation`]): Owned frame buffers
/// - **Buffer Management** ([`utils::buffer_pool`]): Memory allocation
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
