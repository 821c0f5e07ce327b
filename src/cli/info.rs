use std::sync::mpsc;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pesaudio::formats::Format;
use pesaudio::process::Statistics;
use pesaudio::structs::frame::Frame;
use pesaudio::structs::timestamp::Pts;

use super::command::{Cli, InfoArgs};
use super::worker::{CollatorThreadConfig, join_collator_thread, spawn_collator_thread};
use crate::config::resolve;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let stream = &args.stream;
    let format = Format::from(stream.format);
    let config = resolve(cli, stream)?;

    log::info!("Analyzing {format} stream: {}", stream.input.display());

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing frames...");
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
        pb_clone: None,
    });

    let mut summary = StreamSummary::default();
    while let Ok(frame) = rx.recv() {
        summary.add_frame(&frame);

        if summary.frames.is_multiple_of(100) {
            if let Some(ref pb) = pb {
                pb.set_message(format!("Analyzing frames...       {}", summary.frames));
            }
        }
    }

    let stats = join_collator_thread(collate_thread, &pb)?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    if summary.frames == 0 {
        println!("No {format} frames found in the stream.");
        println!("Check --format and, for DVD streams, --stream-id-filter.");
        return Ok(());
    }

    println!();
    println!("{format} Stream Information");
    println!("=========================");
    println!();
    display_summary(&summary);
    display_statistics(&stats);

    Ok(())
}

#[derive(Debug, Default)]
struct StreamSummary {
    frames: u64,
    bytes: u64,
    unvalidated: u64,
    first_pts: Option<u64>,
    last_pts: Option<u64>,
    min_size: Option<usize>,
    max_size: usize,
    described: u64,
}

impl StreamSummary {
    fn add_frame(&mut self, frame: &Frame) {
        self.frames += 1;
        self.bytes += frame.len() as u64;
        if !frame.validated {
            self.unvalidated += 1;
        }
        if frame.ancillary.is_some() {
            self.described += 1;
        }

        if let Some(pts) = frame.pts {
            self.first_pts.get_or_insert(pts);
            self.last_pts = Some(pts);
        }

        self.min_size = Some(self.min_size.map_or(frame.len(), |min| min.min(frame.len())));
        self.max_size = self.max_size.max(frame.len());
    }
}

fn display_summary(summary: &StreamSummary) {
    println!("Frames");
    println!("  Frames collated           {}", summary.frames);
    if summary.unvalidated > 0 {
        println!("  Unvalidated frames        {}", summary.unvalidated);
    }

    let size_mb = summary.bytes as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        summary.bytes
    );
    if let Some(min_size) = summary.min_size {
        println!(
            "  Frame size                {min_size}..{} bytes",
            summary.max_size
        );
    }

    match (summary.first_pts, summary.last_pts) {
        (Some(first), Some(last)) => {
            println!("  First PTS                 {}", Pts(first));
            println!("  Last PTS                  {}", Pts(last));
        }
        _ => println!("  PTS                       none"),
    }

    if summary.described > 0 {
        println!("  Audio description         {} frames", summary.described);
    }
    println!();
}

fn display_statistics(stats: &Statistics) {
    println!("Collation Statistics");
    println!("  Packets                   {}", stats.packets);
    println!("  Packet sync lost          {}", stats.pes_sync_lost);
    println!("  Malformed headers         {}", stats.malformed_headers);
    println!("  Frame sync lost           {}", stats.es_sync_lost);
    println!("  Recoveries                {}", stats.recoveries);
    println!("  Bytes discarded           {}", stats.bytes_discarded);
    println!("  Control records           {}", stats.control_records);
    println!("  Timestamp fallbacks       {}", stats.timestamp_fallbacks);
    println!();
}

#[test]
fn summary_tracks_pts_and_sizes() {
    use pesaudio::structs::timestamp::Timestamps;

    let mut summary = StreamSummary::default();
    summary.add_frame(&Frame::new(vec![0; 10], Timestamps::default(), None, true));
    summary.add_frame(&Frame::new(
        vec![0; 4],
        Timestamps::new(Some(900), None),
        None,
        true,
    ));
    summary.add_frame(&Frame::new(
        vec![0; 6],
        Timestamps::new(Some(2700), Some(1800)),
        None,
        false,
    ));

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.bytes, 20);
    assert_eq!(summary.unvalidated, 1);
    assert_eq!(summary.first_pts, Some(900));
    assert_eq!(summary.last_pts, Some(2700));
    assert_eq!(summary.min_size, Some(4));
    assert_eq!(summary.max_size, 10);
}
