//! Slide abstraction: an opened CZI file, its pyramid levels, and the
//! region-painting entry point.

mod associated_image;
mod level;
#[allow(clippy::module_inception)]
mod slide;

pub use associated_image::AssociatedImage;
pub use level::{Level, LevelInfo};
pub use slide::Slide;
