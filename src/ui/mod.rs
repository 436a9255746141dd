pub mod icons;
pub mod loop_progress;

pub use loop_progress::{LoopUI, UiMode};
