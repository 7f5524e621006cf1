//! Reframe turns horizontal video into 9:16 vertical video by cropping a
//! user-selected region and recomposing it onto a 1080x1920 canvas.

pub mod compose;
pub mod crop;
pub mod encode;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod selector;
pub mod settings;
pub mod source;
