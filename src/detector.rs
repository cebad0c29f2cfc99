//! Hand-tracking detector interface.
//!
//! The tracker is an external collaborator: frames go in through
//! [`HandDetector::submit`] and results come back, possibly several frames
//! later, through [`HandDetector::poll`]. A frame with no fresh result is
//! normal and simply draws no overlay.

use std::collections::VecDeque;
use std::path::Path;

use crate::error::{TryOnError, TryOnResult};
use crate::landmarks::Detection;
use crate::video::VideoFrame;

pub trait HandDetector {
    /// Hands a frame to the tracker.
    fn submit(&mut self, frame: &VideoFrame);

    /// The newest finished result, if one arrived since the last poll.
    fn poll(&mut self) -> Option<Detection>;

    /// Releases the tracker. Further submits are ignored.
    fn close(&mut self) {}
}

/// Replays a recorded landmark stream.
///
/// The recording holds one JSON [`Detection`] per line; blank lines mean "no
/// hands". Results trail submissions by `latency` frames and the recording
/// loops when it runs out.
#[derive(Debug)]
pub struct ReplayDetector {
    recording: Vec<Detection>,
    cursor: usize,
    latency: usize,
    in_flight: VecDeque<Detection>,
    closed: bool,
}

impl ReplayDetector {
    pub fn new(recording: Vec<Detection>, latency: usize) -> TryOnResult<Self> {
        if recording.is_empty() {
            return Err(TryOnError::detector_init("landmark recording is empty"));
        }
        Ok(Self {
            recording,
            cursor: 0,
            latency,
            in_flight: VecDeque::with_capacity(latency + 1),
            closed: false,
        })
    }

    pub fn from_jsonl(text: &str, latency: usize) -> TryOnResult<Self> {
        let recording = text
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if line.trim().is_empty() {
                    return Ok(Detection::none());
                }
                serde_json::from_str(line).map_err(|e| {
                    TryOnError::detector_init(format!("recording line {}: {e}", i + 1))
                })
            })
            .collect::<TryOnResult<Vec<_>>>()?;
        Self::new(recording, latency)
    }

    pub fn from_file(path: impl AsRef<Path>, latency: usize) -> TryOnResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TryOnError::detector_init(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_jsonl(&text, latency)
    }

    pub fn len(&self) -> usize {
        self.recording.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl HandDetector for ReplayDetector {
    fn submit(&mut self, _frame: &VideoFrame) {
        if self.closed {
            return;
        }
        let detection = self.recording[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.recording.len();
        self.in_flight.push_back(detection);
    }

    fn poll(&mut self) -> Option<Detection> {
        if self.closed || self.in_flight.len() <= self.latency {
            return None;
        }
        self.in_flight.pop_front()
    }

    fn close(&mut self) {
        if !self.closed {
            tracing::debug!("replay detector closed");
        }
        self.closed = true;
        self.in_flight.clear();
    }
}

/// Detector returning a fixed script of per-frame results.
#[cfg(test)]
pub(crate) struct ScriptedDetector {
    pub script: VecDeque<Option<Detection>>,
    pub pending: Option<Detection>,
    pub closed: std::rc::Rc<std::cell::Cell<bool>>,
}

#[cfg(test)]
impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Option<Detection>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            pending: None,
            closed: Default::default(),
        }
    }
}

#[cfg(test)]
impl HandDetector for ScriptedDetector {
    fn submit(&mut self, _frame: &VideoFrame) {
        self.pending = self.script.pop_front().flatten();
    }

    fn poll(&mut self) -> Option<Detection> {
        self.pending.take()
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{HandLandmarks, Landmark};

    fn frame(index: u64) -> VideoFrame {
        VideoFrame::new(index, image::RgbaImage::new(4, 4))
    }

    fn recording() -> String {
        let hand = format!("[{}]", vec![r#"{"x":0.5,"y":0.5}"#; 21].join(","));
        format!("{{\"hands\":[{hand}]}}\n\n{{\"hands\":[]}}\n")
    }

    #[test]
    fn parses_lines_and_blank_frames() {
        let detector = ReplayDetector::from_jsonl(&recording(), 0).unwrap();
        assert_eq!(detector.len(), 3);
    }

    #[test]
    fn zero_latency_answers_same_frame() {
        let mut detector = ReplayDetector::from_jsonl(&recording(), 0).unwrap();
        assert!(detector.poll().is_none());
        detector.submit(&frame(0));
        let first = detector.poll().unwrap();
        assert_eq!(first.hands.len(), 1);
        assert!(detector.poll().is_none());
    }

    #[test]
    fn latency_delays_results() {
        let mut detector = ReplayDetector::from_jsonl(&recording(), 2).unwrap();
        detector.submit(&frame(0));
        assert!(detector.poll().is_none());
        detector.submit(&frame(1));
        assert!(detector.poll().is_none());
        detector.submit(&frame(2));
        assert_eq!(detector.poll().unwrap().hands.len(), 1);
    }

    #[test]
    fn recording_loops() {
        let mut detector = ReplayDetector::from_jsonl(&recording(), 0).unwrap();
        for i in 0..3 {
            detector.submit(&frame(i));
            detector.poll();
        }
        detector.submit(&frame(3));
        assert_eq!(detector.poll().unwrap().hands.len(), 1);
    }

    #[test]
    fn bad_recordings_fail_initialization() {
        let err = ReplayDetector::from_jsonl("", 0).unwrap_err();
        assert!(matches!(err, TryOnError::DetectorInit(_)));
        let err = ReplayDetector::from_jsonl("{not json}", 0).unwrap_err();
        assert!(matches!(err, TryOnError::DetectorInit(_)));
        let err = ReplayDetector::from_file("/nonexistent/hands.jsonl", 0).unwrap_err();
        assert!(matches!(err, TryOnError::DetectorInit(_)));
    }

    #[test]
    fn closed_detector_goes_quiet() {
        let hand = HandLandmarks::from_key_points(
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.45, 0.3, 0.0),
            Landmark::new(0.5, 0.28, 0.0),
            Landmark::new(0.55, 0.3, 0.0),
        );
        let mut detector = ReplayDetector::new(vec![Detection::single(hand)], 0).unwrap();
        detector.close();
        detector.submit(&frame(0));
        assert!(detector.poll().is_none());
        assert!(detector.is_closed());
    }
}
