//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, the byte cursor and header tail, pooled accumulation
//! buffers and the error types shared by every stage of the collator.

pub mod accumulation;
pub mod bitstream_io;
pub mod buffer_pool;
pub mod cursor;
pub mod errors;
