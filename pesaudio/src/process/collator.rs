use anyhow::Result;
use log::Level::Warn;
use log::{debug, trace};

use crate::formats::FrameFormatStrategy;
use crate::log_or_err;
use crate::process::Statistics;
use crate::process::config::Configuration;
use crate::process::control::{ControlChannelExtractor, ControlEvent};
use crate::process::frame::FrameSynchronizer;
use crate::process::packet::{PacketEvent, PacketSynchronizer};
use crate::process::sink::{ControlSink, Direction, FrameSink};
use crate::structs::control::ControlRecord;
use crate::structs::frame::Frame;
use crate::structs::pes_header::ContainerHeader;
use crate::structs::timestamp::Timestamps;
use crate::utils::cursor::ByteCursor;
use crate::utils::errors::Fault;

/// Out-of-band timestamps that came with a delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputDescriptor {
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

impl InputDescriptor {
    pub fn timestamps(&self) -> Timestamps {
        Timestamps::new(self.pts, self.dts)
    }
}

/// Turns a PES audio byte stream, delivered in arbitrary pieces, into complete audio
/// frames with their timestamps.
///
/// Two stages run on every delivery: the [`PacketSynchronizer`] strips container
/// headers, then the [`FrameSynchronizer`] collates the payload into frames. When
/// control data is enabled, in-band control markers are removed before either stage
/// sees the bytes.
#[derive(Debug)]
pub struct Collator<F: FrameSink = Vec<Frame>, C: ControlSink = ()> {
    config: Configuration,
    control: Option<ControlChannelExtractor>,
    packets: PacketSynchronizer,
    frames: FrameSynchronizer,
    alarm: Option<[u32; 2]>,
    control_records: u64,
    frame_sink: F,
    control_sink: C,
}

impl<F: FrameSink, C: ControlSink> Collator<F, C> {
    pub fn new(
        strategy: Box<dyn FrameFormatStrategy>,
        config: Configuration,
        frame_sink: F,
        control_sink: C,
    ) -> Result<Self> {
        config.validate()?;

        debug!(
            "Collating {} with {} byte frames at most",
            strategy.name(),
            config.max_frame_size
        );
        let frames = FrameSynchronizer::new(strategy, &config)?;

        Ok(Self {
            control: config.control_data.then(ControlChannelExtractor::default),
            packets: PacketSynchronizer::new(&config),
            frames,
            alarm: None,
            control_records: 0,
            frame_sink,
            control_sink,
            config,
        })
    }

    /// Processes one delivery. Frames completed by it are handed to the frame sink
    /// before this returns.
    pub fn input(&mut self, descriptor: &InputDescriptor, data: &[u8]) -> Result<(), Fault> {
        self.frames
            .timestamps_mut()
            .set_explicit(descriptor.timestamps());

        if self.control.is_none() {
            return self.collate(data);
        }

        let mut cursor = ByteCursor::new(data);
        while let Some(event) = self
            .control
            .as_mut()
            .and_then(|control| control.next_event(&mut cursor))
        {
            match event {
                ControlEvent::Forward(bytes) => self.collate(bytes)?,
                ControlEvent::Spill(spill) => self.collate(spill.as_slice())?,
                ControlEvent::Record(record) => self.dispatch(record),
            }
        }

        Ok(())
    }

    fn collate(&mut self, data: &[u8]) -> Result<(), Fault> {
        let mut cursor = ByteCursor::new(data);
        let result = self.collate_packets(&mut cursor);
        if result.is_err() {
            self.frames.discard_accumulated();
            self.packets.reset();
        }
        result
    }

    fn collate_packets(&mut self, cursor: &mut ByteCursor) -> Result<(), Fault> {
        loop {
            let malformed = self.packets.stats.malformed_headers;
            let event = self.packets.next_event(cursor, self.frames.strategy())?;
            if self.packets.stats.malformed_headers != malformed {
                // the payload after a broken header is lost, so is the frame it continued
                self.frames.discard_accumulated();
            }

            match event {
                None => return Ok(()),
                Some(PacketEvent::Header {
                    header,
                    private_data,
                    discard,
                }) => self.on_container_header(&header, &private_data, discard)?,
                Some(PacketEvent::Payload { data, offset }) => {
                    self.frames.feed(data, offset, &mut self.frame_sink)?
                }
            }
        }
    }

    fn on_container_header(
        &mut self,
        header: &ContainerHeader,
        private_data: &[u8],
        discard: bool,
    ) -> Result<(), Fault> {
        self.frames
            .timestamps_mut()
            .on_container_header(header.timestamps(), header.audio_description);

        if let (Some(pts), Some(marker_ids)) = (header.pts, self.alarm) {
            trace!("PTS alarm {marker_ids:?} reached at {pts}");
            self.alarm = None;
            self.control_sink.on_pts_alarm(pts, marker_ids);
        }

        if discard || private_data.is_empty() {
            return Ok(());
        }

        if let Err(fault) = self.frames.strategy_mut().handle_private_data(private_data) {
            log_or_err!(self.config, Warn, fault);
        }
        if self.config.pass_private_data {
            self.frames.feed(private_data, 0, &mut self.frame_sink)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, record: ControlRecord) {
        self.control_records += 1;

        match record {
            ControlRecord::TimeRequest { marker_ids } => {
                self.alarm = Some(marker_ids);
                self.control_sink.on_time_request(marker_ids);
            }
            ControlRecord::BreakForward => self.discontinuity(Direction::Forward, false),
            ControlRecord::BreakBackward => self.discontinuity(Direction::Backward, false),
            ControlRecord::BreakBackwardSmooth => self.discontinuity(Direction::Backward, true),
            ControlRecord::Splicing { flags, pts_offset } => {
                debug!("Splicing, flags {flags:#04X}, PTS offset {pts_offset}");
                self.input_jump(false);
                self.control_sink.on_splicing(flags, pts_offset);
            }
        }
    }

    fn discontinuity(&mut self, direction: Direction, smooth: bool) {
        debug!("{direction:?} break, smooth {smooth}");
        self.input_jump(smooth);
        self.control_sink.on_discontinuity(direction, smooth);
    }

    /// The input jumps to an unrelated position. Accumulated data is dropped, and so
    /// are the timestamps unless the jump keeps the timeline `continuous`.
    pub fn input_jump(&mut self, continuous: bool) {
        self.frames.discard_accumulated();
        if !continuous {
            self.frames.timestamps_mut().reset();
        }
        self.packets.reset();
    }

    /// Drops the frame in progress.
    pub fn discard_accumulated(&mut self) {
        self.frames.discard_accumulated();
    }

    /// Forces out the frame in progress and returns to seeking sync.
    pub fn flush(&mut self) -> Result<(), Fault> {
        if let Some(spill) = self.control.as_mut().and_then(|control| control.drain()) {
            self.collate(spill.as_slice())?;
        }

        self.frames.flush(&mut self.frame_sink);
        self.packets.reset();
        Ok(())
    }

    /// Returns every stage to its initial state.
    pub fn reset(&mut self) {
        if let Some(control) = self.control.as_mut() {
            control.reset();
        }
        self.packets.reset();
        self.frames.reset();
        self.alarm = None;
    }

    pub fn statistics(&self) -> Statistics {
        self.packets.stats
            + self.frames.stats
            + Statistics {
                control_records: self.control_records,
                timestamp_fallbacks: self.frames.timestamps().fallbacks(),
                ..Default::default()
            }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn frame_sink(&self) -> &F {
        &self.frame_sink
    }

    pub fn frame_sink_mut(&mut self) -> &mut F {
        &mut self.frame_sink
    }

    pub fn control_sink(&self) -> &C {
        &self.control_sink
    }

    pub fn into_sinks(self) -> (F, C) {
        (self.frame_sink, self.control_sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{
        ControlCall, TestCodec, pes_packet, pes_packet_with_private, test_frame,
    };
    use crate::structs::control::encode_marker;

    type TestCollator = Collator<Vec<Frame>, Vec<ControlCall>>;

    fn collator(codec: TestCodec, config: Configuration) -> Result<TestCollator> {
        Collator::new(Box::new(codec), config, Vec::new(), Vec::new())
    }

    fn feed(collator: &mut TestCollator, chunks: &[&[u8]]) -> Result<(), Fault> {
        for chunk in chunks {
            collator.input(&InputDescriptor::default(), chunk)?;
        }
        Ok(())
    }

    #[test]
    fn packet_split_inside_pts() -> Result<()> {
        let pts = 0x1_2345_6789;
        let mut payload = test_frame(&[1, 2, 3, 4]);
        payload.extend_from_slice(&test_frame(&[5, 6]));
        let packet = pes_packet(0xC0, Some(pts), &payload);

        let mut collator = collator(TestCodec::default(), Configuration::default())?;
        feed(&mut collator, &[&packet[..11], &packet[11..]])?;
        collator.flush()?;

        let stats = collator.statistics();
        let frames = collator.frame_sink();
        assert_eq!(stats.packets, 1);
        assert_eq!(stats.frames_delivered, 2);
        assert_eq!(frames[0].as_ref(), test_frame(&[1, 2, 3, 4]));
        assert_eq!(frames[0].pts, Some(pts));
        assert!(frames[0].validated);
        assert_eq!(frames[1].pts, None);
        assert!(!frames[1].validated);
        Ok(())
    }

    #[test]
    fn header_carried_over_takes_previous_timestamp() -> Result<()> {
        let first = test_frame(&[1, 2, 3, 4]);
        let second = test_frame(&[5, 6]);

        let mut payload = vec![0xEE, 0xEE];
        payload.extend_from_slice(&first[..2]);
        let mut stream = pes_packet(0xC0, Some(1000), &payload);

        let mut payload = first[2..].to_vec();
        payload.extend_from_slice(&second);
        payload.extend_from_slice(&test_frame(&[7]));
        stream.extend_from_slice(&pes_packet(0xC0, Some(2000), &payload));

        let mut collator = collator(TestCodec::default(), Configuration::default())?;
        feed(&mut collator, &[&stream])?;

        let frames = collator.frame_sink();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), first);
        assert_eq!(frames[0].pts, Some(1000));
        assert_eq!(frames[1].as_ref(), second);
        assert_eq!(frames[1].pts, Some(2000));
        Ok(())
    }

    #[test]
    fn explicit_timestamps_take_precedence() -> Result<()> {
        let mut payload = test_frame(&[1, 2]);
        payload.extend_from_slice(&test_frame(&[3]));
        let packet = pes_packet(0xC0, Some(1000), &payload);

        let mut collator = collator(TestCodec::default(), Configuration::default())?;
        let descriptor = InputDescriptor {
            pts: Some(42),
            dts: None,
        };
        collator.input(&descriptor, &packet)?;

        assert_eq!(collator.frame_sink()[0].pts, Some(42));
        Ok(())
    }

    #[test]
    fn control_marker_split_across_deliveries() -> Result<()> {
        let mut stream = encode_marker(0x00, &[0, 0, 0, 3, 0, 0, 0, 4]).to_vec();
        let mut payload = test_frame(&[1, 2]);
        payload.extend_from_slice(&test_frame(&[3]));
        stream.extend_from_slice(&pes_packet(0xC0, Some(9000), &payload));
        stream.extend_from_slice(&pes_packet(0xC0, Some(9900), &[]));

        let config = Configuration {
            control_data: true,
            ..Default::default()
        };
        let mut collator = collator(TestCodec::default(), config)?;
        feed(&mut collator, &[&stream[..13], &stream[13..]])?;

        let (frames, calls) = collator.into_sinks();
        assert_eq!(
            calls,
            [
                ControlCall::TimeRequest([3, 4]),
                ControlCall::PtsAlarm(9000, [3, 4]),
            ]
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pts, Some(9000));
        Ok(())
    }

    #[test]
    fn break_discards_frame_in_progress() -> Result<()> {
        let first = test_frame(&[1, 2, 3, 4]);
        let mut stream = pes_packet(0xC0, Some(1000), &first[..6]);
        stream.extend_from_slice(&encode_marker(0x03, &[]));

        let mut payload = test_frame(&[5]);
        payload.extend_from_slice(&test_frame(&[6]));
        stream.extend_from_slice(&pes_packet(0xC0, Some(2000), &payload));

        let config = Configuration {
            control_data: true,
            ..Default::default()
        };
        let mut collator = collator(TestCodec::default(), config)?;
        feed(&mut collator, &[&stream])?;

        assert_eq!(collator.statistics().control_records, 1);
        let (frames, calls) = collator.into_sinks();
        assert_eq!(
            calls,
            [ControlCall::Discontinuity(Direction::Backward, true)]
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), test_frame(&[5]));
        assert_eq!(frames[0].pts, Some(2000));
        Ok(())
    }

    #[test]
    fn breaks_and_splicing_reach_the_control_sink() -> Result<()> {
        let first = test_frame(&[1, 2, 3, 4]);
        let mut stream = pes_packet(0xC0, Some(1000), &first[..6]);
        stream.extend_from_slice(&encode_marker(0x01, &[]));
        stream.extend_from_slice(&encode_marker(0x02, &[]));
        stream.extend_from_slice(&encode_marker(0x04, &[0x03, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF]));

        let mut payload = test_frame(&[5]);
        payload.extend_from_slice(&test_frame(&[6]));
        stream.extend_from_slice(&pes_packet(0xC0, Some(2000), &payload));

        let config = Configuration {
            control_data: true,
            ..Default::default()
        };
        let mut collator = collator(TestCodec::default(), config)?;
        feed(&mut collator, &[&stream])?;

        assert_eq!(collator.statistics().control_records, 3);
        let (frames, calls) = collator.into_sinks();
        assert_eq!(
            calls,
            [
                ControlCall::Discontinuity(Direction::Forward, false),
                ControlCall::Discontinuity(Direction::Backward, false),
                ControlCall::Splicing(0x03, -2),
            ]
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), test_frame(&[5]));
        assert_eq!(frames[0].pts, Some(2000));
        Ok(())
    }

    #[test]
    fn spanning_header_without_timestamp_is_counted() -> Result<()> {
        let frame = test_frame(&[1, 2]);
        let mut collator = collator(TestCodec::default(), Configuration::default())?;

        // header split across two spans with no container header before either
        collator.frames.feed(&frame[..2], 0, &mut collator.frame_sink)?;
        collator.frames.feed(&frame[2..], 0, &mut collator.frame_sink)?;

        let stats = collator.statistics();
        assert_eq!(stats.timestamp_fallbacks, 1);
        assert_eq!(stats.es_sync_lost, 0);
        Ok(())
    }

    #[test]
    fn private_data_is_forwarded_ahead_of_payload() -> Result<()> {
        let frame = test_frame(&[1, 2]);
        let mut payload = frame[4..].to_vec();
        payload.extend_from_slice(&test_frame(&[3]));
        let packet = pes_packet_with_private(0xBD, Some(500), &frame[..4], &payload);

        let config = Configuration {
            pass_private_data: true,
            ..Default::default()
        };
        let mut collator = collator(TestCodec::with_private_length(4), config)?;
        feed(&mut collator, &[&packet])?;

        let frames = collator.frame_sink();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), frame);
        assert_eq!(frames[0].pts, Some(500));
        Ok(())
    }

    #[test]
    fn malformed_header_drops_frame_in_progress() -> Result<()> {
        let first = test_frame(&[1, 2, 3, 4]);
        let mut stream = pes_packet(0xC0, Some(1000), &first[..6]);
        let mut broken = pes_packet(0xC0, Some(2000), &first[6..]);
        broken[11] &= 0xFE;
        stream.extend_from_slice(&broken);

        let mut payload = test_frame(&[5]);
        payload.extend_from_slice(&test_frame(&[6]));
        stream.extend_from_slice(&pes_packet(0xC0, Some(3000), &payload));

        let mut tolerant = collator(TestCodec::default(), Configuration::default())?;
        feed(&mut tolerant, &[&stream])?;
        assert_eq!(tolerant.statistics().malformed_headers, 1);
        assert_eq!(tolerant.frame_sink().len(), 1);
        assert_eq!(tolerant.frame_sink()[0].as_ref(), test_frame(&[5]));
        assert_eq!(tolerant.frame_sink()[0].pts, Some(3000));

        let mut strict = collator(TestCodec::default(), Configuration::default().strict())?;
        assert!(matches!(
            feed(&mut strict, &[&stream]),
            Err(Fault::MalformedHeader(_))
        ));
        Ok(())
    }

    #[test]
    fn input_jump_forgets_partial_frame() -> Result<()> {
        let first = test_frame(&[1, 2, 3, 4]);
        let mut collator = collator(TestCodec::default(), Configuration::default())?;
        feed(
            &mut collator,
            &[&pes_packet(0xC0, Some(1000), &first[..5])],
        )?;

        collator.input_jump(false);

        let mut payload = test_frame(&[5]);
        payload.extend_from_slice(&test_frame(&[6]));
        feed(&mut collator, &[&pes_packet(0xC0, None, &payload)])?;

        let frames = collator.frame_sink();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref(), test_frame(&[5]));
        assert_eq!(frames[0].pts, None);
        Ok(())
    }
}
