use std::collections::VecDeque;
use std::sync::mpsc::Sender;

use log::debug;

use crate::structs::frame::Frame;

/// Consumer of collated frames.
pub trait FrameSink {
    fn deliver_frame(&mut self, frame: Frame);
}

impl FrameSink for Vec<Frame> {
    fn deliver_frame(&mut self, frame: Frame) {
        self.push(frame);
    }
}

impl FrameSink for VecDeque<Frame> {
    fn deliver_frame(&mut self, frame: Frame) {
        self.push_back(frame);
    }
}

impl FrameSink for Sender<Frame> {
    fn deliver_frame(&mut self, frame: Frame) {
        if self.send(frame).is_err() {
            debug!("Frame receiver hung up, dropping frame");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Consumer of in-band control events. Every method defaults to ignoring the event.
pub trait ControlSink {
    fn on_time_request(&mut self, _marker_ids: [u32; 2]) {}

    /// A playback break. `smooth` breaks keep the timeline continuous.
    fn on_discontinuity(&mut self, _direction: Direction, _smooth: bool) {}

    fn on_splicing(&mut self, _flags: u8, _pts_offset: i64) {}

    /// The PTS a time request was waiting for has been reached.
    fn on_pts_alarm(&mut self, _pts: u64, _marker_ids: [u32; 2]) {}
}

impl ControlSink for () {}
