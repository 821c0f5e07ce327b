use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Size of the deliveries handed to the collator.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Unified input reader over a file or stdin.
pub struct InputReader {
    reader: Box<dyn Read + Send>,
    bytes_read: u64,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let input_path = input_path.as_ref();

        let reader: Box<dyn Read + Send> = if input_path.to_string_lossy() == "-" {
            Box::new(io::stdin())
        } else {
            let file = File::open(input_path)
                .with_context(|| format!("Cannot open input {}", input_path.display()))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self::from_reader(reader))
    }

    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Hands each chunk read to `callback` until EOF or until it returns `Ok(false)`.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let count = match self.reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(count) => count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.bytes_read += count as u64;

            if !callback(&buffer[..count])? {
                break;
            }
        }

        Ok(())
    }
}

#[test]
fn chunks_cover_input() -> Result<()> {
    let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
    let mut reader = InputReader::from_reader(Box::new(io::Cursor::new(data.clone())));

    let mut collected = Vec::new();
    reader.process_chunks(300, |chunk| {
        assert!(chunk.len() <= 300);
        collected.extend_from_slice(chunk);
        Ok(true)
    })?;

    assert_eq!(collected, data);
    assert_eq!(reader.bytes_read(), 1000);
    Ok(())
}
