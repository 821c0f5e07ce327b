use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use anyhow::{Context, Result};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pesaudio::formats::Format;
use pesaudio::structs::audio_description::AudioDescriptionMetadata;
use pesaudio::structs::frame::Frame;
use serde::Serialize;

use super::command::{Cli, CollateArgs};
use super::worker::{CollatorThreadConfig, join_collator_thread, spawn_collator_thread};
use crate::config::resolve;

pub fn create_path_with_suffix(base_path: &Path, suffix: &str) -> Result<PathBuf> {
    let file_name = base_path
        .file_name()
        .with_context(|| format!("Output path {} has no file name", base_path.display()))?;

    let mut path = base_path.to_path_buf();
    path.set_file_name(format!("{}.{suffix}", file_name.to_string_lossy()));
    Ok(path)
}

/// One frame of the YAML index written next to the elementary stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    offset: u64,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dts: Option<u64>,
    validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ad: Option<AudioDescriptionEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioDescriptionEntry {
    fade: u8,
    pan: u8,
    gain_center: u8,
    gain_front: u8,
    gain_surround: u8,
    valid: bool,
}

impl From<&AudioDescriptionMetadata> for AudioDescriptionEntry {
    fn from(ad: &AudioDescriptionMetadata) -> Self {
        Self {
            fade: ad.fade,
            pan: ad.pan,
            gain_center: ad.gain_center,
            gain_front: ad.gain_front,
            gain_surround: ad.gain_surround,
            valid: ad.valid,
        }
    }
}

/// Writes the collated elementary stream and keeps its frame index.
struct FrameWriter<W: Write> {
    stream: W,
    index: Vec<IndexEntry>,
    offset: u64,
}

impl<W: Write> FrameWriter<W> {
    fn new(stream: W) -> Self {
        Self {
            stream,
            index: Vec::new(),
            offset: 0,
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stream.write_all(&frame.data)?;
        self.index.push(IndexEntry {
            offset: self.offset,
            size: frame.len(),
            pts: frame.pts,
            dts: frame.dts,
            validated: frame.validated,
            ad: frame.ancillary.as_ref().map(AudioDescriptionEntry::from),
        });
        self.offset += frame.len() as u64;
        Ok(())
    }

    fn finalize<I: Write>(mut self, index: I) -> Result<()> {
        self.stream.flush()?;
        serde_yaml_ng::to_writer(index, &self.index)?;
        Ok(())
    }
}

/// Writes frames until the collator closes the channel. Returns the frame count and
/// how many of those were unvalidated.
///
/// `rx` is dropped on return, so after a write error the collator's sends fail and
/// the thread still runs to completion and can be joined.
fn receive_frames<W: Write>(
    rx: mpsc::Receiver<Frame>,
    mut writer: Option<&mut FrameWriter<W>>,
    pb: &Option<ProgressBar>,
) -> Result<(u64, u64)> {
    let mut frame_count = 0u64;
    let mut partial_frames = 0u64;
    while let Ok(frame) = rx.recv() {
        if let Some(writer) = writer.as_mut() {
            writer.write_frame(&frame)?;
        }

        frame_count += 1;
        if !frame.validated {
            partial_frames += 1;
        }
        if frame_count.is_multiple_of(100) {
            if let Some(pb) = pb {
                pb.set_message(format!("{frame_count} frames"));
            }
        }
    }
    Ok((frame_count, partial_frames))
}

pub fn cmd_collate(args: &CollateArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let stream = &args.stream;
    let format = Format::from(stream.format);
    let config = resolve(cli, stream)?;

    log::info!(
        "Collating {format} stream: {} (strict mode: {})",
        stream.input.display(),
        cli.strict
    );

    let mut writer = match &args.output_path {
        Some(base_path) => {
            let stream_path = create_path_with_suffix(base_path, format.extension())?;
            let index_path = create_path_with_suffix(base_path, "index.yaml")?;
            log::info!(
                "Writing {} and {}",
                stream_path.display(),
                index_path.display()
            );
            let file = File::create(&stream_path)
                .with_context(|| format!("Cannot create {}", stream_path.display()))?;
            Some((FrameWriter::new(BufWriter::new(file)), index_path))
        }
        None => None,
    };

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bytes} read\n{msg} | elapsed: {elapsed_precise}",
        )?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("0 frames");
        Some(pb)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel();
    let collate_thread = spawn_collator_thread(CollatorThreadConfig {
        input_path: stream.input.clone(),
        format,
        config,
        tx,
        pb_clone: pb.clone(),
    });

    let received = receive_frames(rx, writer.as_mut().map(|(writer, _)| writer), &pb);
    let stats = join_collator_thread(collate_thread, &pb);
    let (frame_count, partial_frames) = received.inspect_err(|_| {
        if let Some(pb) = &pb {
            pb.abandon_with_message("write failed");
        }
    })?;
    let stats = stats?;

    if let Some((writer, index_path)) = writer {
        let index = File::create(&index_path)
            .with_context(|| format!("Cannot create {}", index_path.display()))?;
        writer.finalize(BufWriter::new(index))?;
    }

    if let Some(pb) = pb {
        pb.finish_with_message(format!("{frame_count} frames"));
    }

    log::info!(
        "{frame_count} frames collated ({partial_frames} unvalidated), {} recoveries, {} bytes discarded",
        stats.recoveries,
        stats.bytes_discarded
    );

    Ok(())
}

#[test]
fn output_paths() -> Result<()> {
    assert_eq!(
        create_path_with_suffix(Path::new("out/stream"), "ac3")?,
        PathBuf::from("out/stream.ac3")
    );
    assert_eq!(
        create_path_with_suffix(Path::new("take.1"), "index.yaml")?,
        PathBuf::from("take.1.index.yaml")
    );
    assert!(create_path_with_suffix(Path::new("/"), "ac3").is_err());
    Ok(())
}

#[test]
fn index_records_frame_layout() -> Result<()> {
    use pesaudio::structs::timestamp::Timestamps;

    let mut writer = FrameWriter::new(Vec::new());
    writer.write_frame(&Frame::new(
        vec![1, 2, 3],
        Timestamps::new(Some(9000), None),
        None,
        true,
    ))?;
    writer.write_frame(&Frame::new(
        vec![4, 5],
        Timestamps::default(),
        Some(AudioDescriptionMetadata {
            fade: 7,
            valid: true,
            ..Default::default()
        }),
        false,
    ))?;

    assert_eq!(writer.stream, [1, 2, 3, 4, 5]);

    let mut index = Vec::new();
    writer.finalize(&mut index)?;
    let index = String::from_utf8(index)?;

    let entries: Vec<serde_yaml_ng::Value> = serde_yaml_ng::from_str(&index)?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["offset"].as_u64(), Some(0));
    assert_eq!(entries[0]["pts"].as_u64(), Some(9000));
    assert!(entries[0].get("dts").is_none());
    assert_eq!(entries[1]["offset"].as_u64(), Some(3));
    assert_eq!(entries[1]["size"].as_u64(), Some(2));
    assert_eq!(entries[1]["validated"].as_bool(), Some(false));
    assert_eq!(entries[1]["ad"]["fade"].as_u64(), Some(7));
    assert_eq!(entries[1]["ad"]["gainCenter"].as_u64(), Some(0));
    Ok(())
}

#[test]
fn write_error_releases_collator() -> Result<()> {
    use std::io;
    use std::thread;

    use pesaudio::structs::timestamp::Timestamps;

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let (tx, rx) = mpsc::channel();
    let sender = thread::spawn(move || {
        let mut sent = 0;
        for _ in 0..1000 {
            let frame = Frame::new(vec![0; 8], Timestamps::default(), None, true);
            if tx.send(frame).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    });

    let mut writer = FrameWriter::new(FullDisk);
    assert!(receive_frames(rx, Some(&mut writer), &None).is_err());
    assert!(writer.index.is_empty());

    let sent = sender
        .join()
        .map_err(|_| anyhow::anyhow!("sender panicked"))?;
    assert!(sent >= 1);
    Ok(())
}
