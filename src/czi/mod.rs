//! CZI container parsing: segment headers, the subblock directory, the
//! metadata XML, and the top-level open sequence.

mod directory;
mod parser;
mod segment;
pub mod subblock;
mod xml;

pub use parser::{open_czi, read_subblock_pixels, AssociatedImageData, CziDocument};
pub use xml::ImageMetadata;
