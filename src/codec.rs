//! Run-length codec for per-window membership labels.
//!
//! The trainer scans millions of windows per image set; storing one
//! label per window would dwarf the examples themselves. Instead each
//! image's window stream is kept as `(run, label)` pairs and replayed
//! during remasking. The codec is the source of truth for which scanned
//! windows are positive, negative, or ignored, so encode/decode must be
//! exact.

use serde::{Deserialize, Serialize};

/// Membership of one scanned window.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowLabel {
    Positive,
    Negative,
    Ignored,
}

/// A maximal run of identical labels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub len: u32,
    pub label: WindowLabel,
}

/// Encode a label stream as maximal runs.
pub fn encode(labels: &[WindowLabel]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    for &label in labels {
        match runs.last_mut() {
            Some(run) if run.label == label && run.len < u32::MAX => run.len += 1,
            _ => runs.push(Run { len: 1, label }),
        }
    }
    runs
}

/// Total number of windows a run stream covers.
pub fn decoded_len(runs: &[Run]) -> usize {
    runs.iter().map(|r| r.len as usize).sum()
}

/// Streaming decoder; yields one label per scanned window.
pub struct RunDecoder<'a> {
    runs: &'a [Run],
    idx: usize,
    remaining: u32,
}

impl<'a> RunDecoder<'a> {
    pub fn new(runs: &'a [Run]) -> Self {
        Self {
            runs,
            idx: 0,
            remaining: runs.first().map_or(0, |r| r.len),
        }
    }
}

impl Iterator for RunDecoder<'_> {
    type Item = WindowLabel;

    fn next(&mut self) -> Option<WindowLabel> {
        while self.remaining == 0 {
            self.idx += 1;
            self.remaining = self.runs.get(self.idx)?.len;
        }
        self.remaining -= 1;
        Some(self.runs[self.idx].label)
    }
}
