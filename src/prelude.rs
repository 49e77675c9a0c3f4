//! Exports the types most programs need.
//!
pub use crate::cascade::{
    Cascade,
    Stage,
};

pub use crate::detect::{
    // Multiscale scanning
    Detections,
    Detector,

    // Overlap grouping
    merge_rects,
};

pub use crate::feature::{
    Feature,
    FeatureBank,
    RectFeature,
};

pub use crate::geometry::{
    FacePoints,
    Point2f,
    Rect,
    ScoredRect,
};

pub use crate::image::{
    GrayImage,
    Integral,
    NormIntegral,
    RectSum,
};

pub use crate::labels::{
    read_label_file,
    write_label_file,
    ImageInfo,
    LabelKind,
};

pub use crate::train::{
    ImageSource,
    MemoryImageSource,
    TrainConfig,
    Trainer,
};

pub use crate::calibrate::{
    Calibrator,
    PrunePolicy,
};

pub use crate::eval::{
    evaluate_roc,
    plot_roc,
    RocPoint,
};

pub use crate::errors::{
    Error,
    Result,
};
