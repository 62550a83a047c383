use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Holds the most recently acquired frame.
///
/// The acquisition worker is the only writer. Readers get the whole
/// `Arc<Frame>` that was current when they looked, never a frame in the
/// middle of being replaced.
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    latest: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = Some(Arc::new(frame));
    }

    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_none()
    }
}
