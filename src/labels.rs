//! The labeled-image-folder format.
//!
//! A folder's `label.txt` starts with the image count; each image record
//! is a filename line, a label-kind code, and for labeled images an
//! object count followed by one line of five named landmarks per object.

use colored::Colorize;

use crate::errors::{Error, Result};
use crate::geometry::{FacePoints, Point2f, Rect};

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Annotation state of one image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LabelKind {
    Unannotated,
    Discarded,
    NoFace,
    AllLabeled,
    PartiallyLabeled,
}

impl LabelKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Unannotated => -2,
            Self::Discarded => -1,
            Self::NoFace => 0,
            Self::AllLabeled => 1,
            Self::PartiallyLabeled => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(Self::Unannotated),
            -1 => Some(Self::Discarded),
            0 => Some(Self::NoFace),
            1 => Some(Self::AllLabeled),
            2 => Some(Self::PartiallyLabeled),
            _ => None,
        }
    }

    /// Whether the record carries landmark lines.
    pub fn has_objects(self) -> bool {
        matches!(self, Self::AllLabeled | Self::PartiallyLabeled)
    }
}

/// One labeled image: where it lives, how it is annotated, and the
/// ground-truth boxes derived from its landmarks.
#[derive(Clone, Debug)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub kind: LabelKind,
    pub objects: Vec<FacePoints>,
    pub boxes: Vec<Rect>,
}

impl ImageInfo {
    /// Drop objects whose landmarks describe a tilted or profile face.
    ///
    /// Tilt: eye slope above 0.25 (or non-positive eye distance).
    /// Profile: nose x outside the eye span or the mouth span.
    /// With no objects left the image is discarded; with some dropped it
    /// becomes partially labeled.
    pub fn validate(&mut self) {
        if !self.kind.has_objects() {
            return;
        }
        let before = self.objects.len();
        self.objects.retain(|pts| {
            let xdist = pts.reye.x - pts.leye.x;
            if xdist <= 0.0 {
                return false;
            }
            let ydist = pts.reye.y - pts.leye.y;
            if (ydist / xdist).abs() > 0.25 {
                return false;
            }
            pts.nose.x >= pts.leye.x
                && pts.nose.x <= pts.reye.x
                && pts.nose.x >= pts.lmouth.x
                && pts.nose.x <= pts.rmouth.x
        });
        if self.objects.len() == before {
            return;
        }
        if self.objects.is_empty() {
            self.kind = LabelKind::Discarded;
            self.boxes.clear();
        } else {
            self.kind = LabelKind::PartiallyLabeled;
            self.boxes = self.objects.iter().map(FacePoints::bounding_box).collect();
        }
    }
}

/// Parse a folder's label file. A broken image record is logged and
/// skipped; only a broken header aborts the whole file.
pub fn read_label_file<P, Q>(path: P, image_dir: Q) -> Result<Vec<ImageInfo>>
    where P: AsRef<Path>,
          Q: AsRef<Path>,
{
    let path = path.as_ref();
    let image_dir = image_dir.as_ref();
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines();

    let count: usize = lines.next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or_else(|| Error::MalformedLabelFile {
            path: path.to_path_buf(),
            reason: "missing image count".into(),
        })?;

    let mut infos = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(name) = lines.next() else { break };
        match read_one_record(name, &mut lines, image_dir) {
            Ok(info) => infos.push(info),
            Err(reason) => {
                eprintln!(
                    "{} skipping image {}: {reason}",
                    "[WARN]".bold().yellow(),
                    name.trim(),
                );
            },
        }
    }
    Ok(infos)
}

fn read_one_record<'a>(
    name: &str,
    lines: &mut impl Iterator<Item = &'a str>,
    image_dir: &Path,
) -> std::result::Result<ImageInfo, String> {
    let kind_code: i32 = lines.next()
        .and_then(|l| l.trim().parse().ok())
        .ok_or("missing label kind")?;
    let kind = LabelKind::from_code(kind_code)
        .ok_or_else(|| format!("unknown label kind {kind_code}"))?;

    let mut objects = Vec::new();
    if kind.has_objects() {
        let n_obj: usize = lines.next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or("missing object count")?;
        if n_obj == 0 {
            return Err("labeled image with zero objects".into());
        }
        for _ in 0..n_obj {
            let line = lines.next().ok_or("missing landmark line")?;
            objects.push(parse_landmarks(line)?);
        }
    }
    let boxes = objects.iter().map(FacePoints::bounding_box).collect();
    Ok(ImageInfo {
        path: image_dir.join(name.trim()),
        kind,
        objects,
        boxes,
    })
}

/// One landmark line:
/// `leye {x,y}\treye {x,y}\tnose {x,y}\tlmouth {x,y}\trmouth {x,y}`.
fn parse_landmarks(line: &str) -> std::result::Result<FacePoints, String> {
    let mut pts = FacePoints::default();
    let fields: [(&str, &mut Point2f); 5] = [
        ("leye", &mut pts.leye),
        ("reye", &mut pts.reye),
        ("nose", &mut pts.nose),
        ("lmouth", &mut pts.lmouth),
        ("rmouth", &mut pts.rmouth),
    ];
    let mut parts = line.split('\t').filter(|p| !p.trim().is_empty());
    for (key, pt) in fields {
        let part = parts.next().ok_or_else(|| format!("missing {key} point"))?;
        let part = part.trim();
        let rest = part.strip_prefix(key)
            .ok_or_else(|| format!("expected {key}, got {part:?}"))?
            .trim();
        let inner = rest.strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .ok_or_else(|| format!("malformed point for {key}: {rest:?}"))?;
        let (x, y) = inner.split_once(',')
            .ok_or_else(|| format!("malformed point for {key}: {inner:?}"))?;
        pt.x = x.trim().parse().map_err(|_| format!("bad x for {key}"))?;
        pt.y = y.trim().parse().map_err(|_| format!("bad y for {key}"))?;
    }
    Ok(pts)
}

/// Write a label file covering `infos`, with landmark coordinates at
/// two decimals as the labeling tools produce them.
pub fn write_label_file<P: AsRef<Path>>(path: P, infos: &[ImageInfo]) -> Result<()> {
    let mut out = String::new();
    writeln!(out, "{}", infos.len()).unwrap();
    for info in infos {
        let name = info.path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        writeln!(out, "{name}").unwrap();
        writeln!(out, "{}", info.kind.code()).unwrap();
        if info.kind.has_objects() {
            writeln!(out, "{}", info.objects.len()).unwrap();
            for pts in &info.objects {
                writeln!(
                    out,
                    "leye {{{:.2},{:.2}}}\treye {{{:.2},{:.2}}}\tnose {{{:.2},{:.2}}}\t\
                     lmouth {{{:.2},{:.2}}}\trmouth {{{:.2},{:.2}}}",
                    pts.leye.x, pts.leye.y,
                    pts.reye.x, pts.reye.y,
                    pts.nose.x, pts.nose.y,
                    pts.lmouth.x, pts.lmouth.y,
                    pts.rmouth.x, pts.rmouth.y,
                ).unwrap();
            }
        }
    }
    fs::write(path, out)?;
    Ok(())
}
