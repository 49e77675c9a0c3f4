//! The cascade itself.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::geometry::Rect;
use crate::image::NormIntegral;
use super::stage::Stage;

use std::fs;
use std::path::Path;

/// An ordered soft cascade over a fixed base window.
///
/// Score accumulates stage by stage; with early rejection enabled a
/// window is dropped the moment its running score falls below the
/// current stage's `min_pos_score_th`. A window that survives every
/// stage is accepted iff its final score reaches `final_score_th`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cascade {
    pub base_width: usize,
    pub base_height: usize,
    pub n_thresholds: usize,
    pub stages: Vec<Stage>,
    pub final_score_th: f32,
}

impl Cascade {
    /// An empty cascade for the given base window.
    pub fn new(base_width: usize, base_height: usize, n_thresholds: usize) -> Self {
        Self {
            base_width,
            base_height,
            n_thresholds,
            stages: Vec::new(),
            final_score_th: 0.0,
        }
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Run the cascade on one window. Returns `None` when the window is
    /// rejected early, otherwise the final cumulative score (which the
    /// caller still compares against `final_score_th`).
    pub fn classify(
        &self,
        image: &NormIntegral,
        window: &Rect,
        reject_early: bool,
    ) -> Option<f32> {
        let inv_norm = image.inv_norm(window);
        let (x, y) = (window.x_min, window.y_min);
        let mut score = 0.0f32;
        for stage in &self.stages {
            score += stage.score(image, x, y, inv_norm);
            if reject_early && score < stage.min_pos_score_th {
                return None;
            }
        }
        Some(score)
    }

    /// Cumulative score after every stage, with no early rejection.
    /// The calibrator consumes these per-window traces.
    pub fn score_trace(&self, image: &NormIntegral, window: &Rect) -> Vec<f32> {
        let inv_norm = image.inv_norm(window);
        let (x, y) = (window.x_min, window.y_min);
        let mut score = 0.0f32;
        self.stages.iter()
            .map(|stage| {
                score += stage.score(image, x, y, inv_norm);
                score
            })
            .collect()
    }

    /// A pure scaled copy: base window and every feature geometry
    /// multiplied by `scale`, thresholds and scores untouched.
    pub fn rescaled(&self, scale: f32) -> Self {
        Self {
            base_width: (self.base_width as f32 * scale + 0.5) as usize,
            base_height: (self.base_height as f32 * scale + 0.5) as usize,
            n_thresholds: self.n_thresholds,
            stages: self.stages.iter().map(|s| s.rescaled(scale)).collect(),
            final_score_th: self.final_score_th,
        }
    }

    /// Serialize to JSON. The whitespace text format (`save`) stays the
    /// canonical interchange format; JSON is for tooling.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string(self)
            .expect("cascade serialization cannot fail");
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(&path)?;
        serde_json::from_str(&json).map_err(|e| {
            crate::errors::Error::MalformedCascade {
                path: path.as_ref().to_path_buf(),
                line: e.line(),
                reason: e.to_string(),
            }
        })
    }
}
