//! Data structures shared by the collation stages.
//!
//! Contains the parsed container header with its optional audio description
//! descriptor, the timestamp pair carried alongside collated data, delivered frames
//! and the control records embedded in the elementary stream.

pub mod audio_description;
pub mod control;
pub mod frame;
pub mod pes_header;
pub mod timestamp;
