//! Example image-processing program built on `tl-client`.

pub mod listener;
pub mod resize;

pub use listener::ConsoleListener;
pub use resize::{sample_images, step_options, CaptionStyle, STEP_NAME, STEP_ROBOT};
