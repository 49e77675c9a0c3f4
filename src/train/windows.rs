//! Window enumeration and labeling for training.
//!
//! The trainer must visit exactly the windows the detector will later
//! scan, in the same order, so the disk-paged score buffer and the
//! run-length label streams index the same population. The ladder here
//! mirrors the detector's: scales ascend geometrically, windows go
//! row-major within a scale.

use crate::codec::WindowLabel;
use crate::constants::MAX_NUM_SCALE;
use crate::geometry::Rect;
use crate::labels::{ImageInfo, LabelKind};

/// One scanned window: its rectangle, ladder rung, and scale factor
/// relative to the base window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScanWindow {
    pub rect: Rect,
    pub rung: usize,
    pub scale: f32,
}

/// Enumerate every window of the scan ladder that fits an
/// `img_width x img_height` image.
pub fn scan_windows(
    img_width: usize,
    img_height: usize,
    base_width: usize,
    base_height: usize,
    step_size: f32,
    step_scale: f32,
) -> Vec<ScanWindow> {
    let img_w = img_width as i32;
    let img_h = img_height as i32;

    let mut windows = Vec::new();
    let mut scale = 1.0f32;
    for rung in 0..MAX_NUM_SCALE {
        let width = (base_width as f32 * scale + 0.5) as i32;
        let height = (base_height as f32 * scale + 0.5) as i32;
        if width > img_w || height > img_h {
            scale *= step_scale;
            continue;
        }
        let step_x = ((width as f32 * step_size + 0.5) as i32).max(1);
        let step_y = ((height as f32 * step_size + 0.5) as i32).max(1);
        let mut y = 0;
        while y + height <= img_h {
            let mut x = 0;
            while x + width <= img_w {
                windows.push(ScanWindow {
                    rect: Rect { x_min: x, y_min: y, x_max: x + width, y_max: y + height },
                    rung,
                    scale,
                });
                x += step_x;
            }
            y += step_y;
        }
        scale *= step_scale;
    }
    windows
}

/// Label each scanned window of one image against its annotation.
///
/// A window tightly covering a labeled box is positive. A window
/// loosely near any box is ignored so near-misses never poison the
/// negative set. The rest are negative on fully labeled and no-face
/// images, and ignored on partially labeled ones (an unlabeled face
/// may be hiding anywhere). Unannotated and discarded images produce
/// all-ignored streams.
pub fn label_windows(
    info: &ImageInfo,
    windows: &[ScanWindow],
    step_size: f32,
    step_scale: f32,
) -> Vec<WindowLabel> {
    let background = match info.kind {
        LabelKind::NoFace | LabelKind::AllLabeled => WindowLabel::Negative,
        LabelKind::PartiallyLabeled => WindowLabel::Ignored,
        LabelKind::Unannotated | LabelKind::Discarded => {
            return vec![WindowLabel::Ignored; windows.len()];
        },
    };

    windows.iter()
        .map(|w| {
            let mut label = background;
            for truth in &info.boxes {
                if w.rect.matches_tight(truth, step_size, step_scale) {
                    return WindowLabel::Positive;
                }
                if w.rect.matches_detection(truth) {
                    label = WindowLabel::Ignored;
                }
            }
            label
        })
        .collect()
}
