//! The soft cascade: an ordered sequence of quantized weak classifiers
//! plus its persistent file representations.

mod stage;
mod cascade_struct;
mod text_io;

pub use stage::Stage;
pub use cascade_struct::Cascade;
