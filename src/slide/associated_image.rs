//! Non-pyramid images attached to a slide: label, macro, thumbnail.

use std::sync::Arc;

use crate::codec::Argb32Buffer;

#[derive(Debug, Clone)]
pub struct AssociatedImage {
    pub width: u32,
    pub height: u32,
    pub buffer: Arc<Argb32Buffer>,
}
