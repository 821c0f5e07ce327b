use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use indicatif::ProgressBar;
use pesaudio::formats::Format;
use pesaudio::process::Statistics;
use pesaudio::process::collator::{Collator, InputDescriptor};
use pesaudio::process::config::Configuration;
use pesaudio::structs::frame::Frame;

use crate::input::{CHUNK_SIZE, InputReader};

pub struct CollatorThreadConfig {
    pub input_path: PathBuf,
    pub format: Format,
    pub config: Configuration,
    pub tx: mpsc::Sender<Frame>,
    pub pb_clone: Option<ProgressBar>,
}

/// Reads the input on its own thread and sends every collated frame over `tx`.
///
/// The channel closes when the thread ends, after the final flush.
pub fn spawn_collator_thread(config: CollatorThreadConfig) -> thread::JoinHandle<Result<Statistics>> {
    thread::spawn(move || -> Result<Statistics> {
        let CollatorThreadConfig {
            input_path,
            format,
            config,
            tx,
            pb_clone,
        } = config;

        let mut input_reader = InputReader::new(&input_path)?;
        let mut collator = Collator::new(format.create(), config, tx, ())?;
        let descriptor = InputDescriptor::default();

        input_reader.process_chunks(CHUNK_SIZE, |chunk| {
            collator.input(&descriptor, chunk)?;

            if let Some(ref pb) = pb_clone {
                pb.inc(chunk.len() as u64);
            }
            Ok(true)
        })?;

        collator.flush()?;

        let stats = collator.statistics();
        log::info!(
            "Collation complete: {} bytes in {} packets, {} frames",
            input_reader.bytes_read(),
            stats.packets,
            stats.frames_delivered
        );
        Ok(stats)
    })
}

/// Waits for the collator thread, closing out the progress bar either way.
pub fn join_collator_thread(
    handle: thread::JoinHandle<Result<Statistics>>,
    pb: &Option<ProgressBar>,
) -> Result<Statistics> {
    match handle.join() {
        Ok(Ok(stats)) => Ok(stats),
        Ok(Err(e)) => {
            if let Some(pb) = pb {
                pb.abandon_with_message("collation failed");
            }
            Err(e)
        }
        Err(_) => {
            if let Some(pb) = pb {
                pb.abandon_with_message("collator thread panicked");
            }
            Err(anyhow::anyhow!("Collator thread panicked"))
        }
    }
}
