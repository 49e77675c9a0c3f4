//! The canonical whitespace-delimited cascade file format.
//!
//! Layout: `baseW baseH`, `nStages nTh`, then per stage `nTh` lines of
//! `threshold deltaScore` (highest threshold first), one line of
//! `lastDeltaScore minPosScoreTh`, one feature record, and a trailing
//! global `finalScoreTh`. A rectangle feature record is its type code
//! `1`, the rectangle count, then per rectangle a weight line and a
//! coordinate line; the norm pseudo-feature is just the code `2`.
//!
//! Floats are written with round-trip precision, so
//! `save(load(f))` reproduces every numeric field bit for bit.

use crate::errors::{Error, Result};
use crate::feature::{Feature, RectFeature, WeightedRect};
use crate::geometry::Rect;
use super::cascade_struct::Cascade;
use super::stage::Stage;

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const FEATURE_RECTS: i32 = 1;
const FEATURE_NORM: i32 = 2;

/// Whitespace tokenizer that remembers the line each token came from,
/// so parse errors can point at it.
struct Tokens<'a> {
    path: &'a Path,
    remaining: &'a str,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(path: &'a Path, content: &'a str) -> Self {
        Self { path, remaining: content, line: 1 }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::MalformedCascade {
            path: self.path.to_path_buf(),
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_token(&mut self) -> Result<&'a str> {
        let mut start = None;
        for (i, c) in self.remaining.char_indices() {
            if c == '\n' {
                self.line += 1;
            } else if !c.is_whitespace() {
                start = Some(i);
                break;
            }
        }
        let start = start.ok_or_else(|| self.error("unexpected end of file"))?;
        let rest = &self.remaining[start..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.remaining = &rest[end..];
        Ok(&rest[..end])
    }

    fn next_i32(&mut self) -> Result<i32> {
        let tok = self.next_token()?;
        tok.parse().map_err(|_| self.error(format!("expected integer, got {tok:?}")))
    }

    fn next_usize(&mut self) -> Result<usize> {
        let tok = self.next_token()?;
        tok.parse().map_err(|_| self.error(format!("expected count, got {tok:?}")))
    }

    fn next_f32(&mut self) -> Result<f32> {
        let tok = self.next_token()?;
        tok.parse().map_err(|_| self.error(format!("expected float, got {tok:?}")))
    }
}

fn read_feature(tokens: &mut Tokens<'_>) -> Result<Feature> {
    match tokens.next_i32()? {
        FEATURE_RECTS => {
            let n_rects = tokens.next_usize()?;
            if n_rects == 0 {
                return Err(tokens.error("rectangle feature with zero rects"));
            }
            let mut rects = Vec::with_capacity(n_rects);
            for _ in 0..n_rects {
                let weight = tokens.next_f32()?;
                let x_min = tokens.next_i32()?;
                let y_min = tokens.next_i32()?;
                let x_max = tokens.next_i32()?;
                let y_max = tokens.next_i32()?;
                if x_min > x_max || y_min > y_max {
                    return Err(tokens.error("inverted feature rectangle"));
                }
                rects.push(WeightedRect {
                    weight,
                    rect: Rect { x_min, y_min, x_max, y_max },
                });
            }
            Ok(Feature::Rects(RectFeature::new(rects)))
        },
        FEATURE_NORM => Ok(Feature::Norm),
        other => Err(tokens.error(format!("unknown feature type {other}"))),
    }
}

fn write_feature(out: &mut String, feature: &Feature) {
    match feature {
        Feature::Rects(f) => {
            writeln!(out, "{FEATURE_RECTS}").unwrap();
            writeln!(out, "{}", f.rects.len()).unwrap();
            for wr in &f.rects {
                writeln!(out, "{}", wr.weight).unwrap();
                writeln!(
                    out,
                    "{} {} {} {}",
                    wr.rect.x_min, wr.rect.y_min, wr.rect.x_max, wr.rect.y_max,
                ).unwrap();
            }
        },
        Feature::Norm => {
            writeln!(out, "{FEATURE_NORM}").unwrap();
        },
    }
}

impl Cascade {
    /// Parse a cascade from its text file. Any malformed field is fatal;
    /// no partial cascade is usable.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut tokens = Tokens::new(path, &content);

        let base_width = tokens.next_usize()?;
        let base_height = tokens.next_usize()?;
        if base_width == 0 || base_height == 0 {
            return Err(tokens.error("zero base window"));
        }
        let n_stages = tokens.next_usize()?;
        let n_thresholds = tokens.next_usize()?;

        let mut stages = Vec::with_capacity(n_stages);
        for _ in 0..n_stages {
            let mut thresholds = Vec::with_capacity(n_thresholds);
            let mut delta_scores = Vec::with_capacity(n_thresholds + 1);
            for _ in 0..n_thresholds {
                thresholds.push(tokens.next_f32()?);
                delta_scores.push(tokens.next_f32()?);
            }
            delta_scores.push(tokens.next_f32()?);
            let min_pos_score_th = tokens.next_f32()?;
            for pair in thresholds.windows(2) {
                if pair[0] <= pair[1] {
                    return Err(tokens.error("thresholds out of order"));
                }
            }
            let feature = read_feature(&mut tokens)?;
            stages.push(Stage { feature, thresholds, delta_scores, min_pos_score_th });
        }
        let final_score_th = tokens.next_f32()?;

        Ok(Self {
            base_width,
            base_height,
            n_thresholds,
            stages,
            final_score_th,
        })
    }

    /// Write the cascade in the canonical text format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = String::new();
        writeln!(out, "{} {}", self.base_width, self.base_height).unwrap();
        writeln!(out, "{} {}", self.stages.len(), self.n_thresholds).unwrap();
        for stage in &self.stages {
            debug_assert_eq!(stage.thresholds.len(), self.n_thresholds);
            for (th, ds) in stage.thresholds.iter().zip(&stage.delta_scores) {
                writeln!(out, "{th} {ds}").unwrap();
            }
            writeln!(
                out,
                "{} {}",
                stage.delta_scores[self.n_thresholds],
                stage.min_pos_score_th,
            ).unwrap();
            write_feature(&mut out, &stage.feature);
        }
        writeln!(out, "{}", self.final_score_th).unwrap();
        fs::write(path, out)?;
        Ok(())
    }
}
