use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::ImageFormat;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

use super::frame::Frame;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub file_name: String,
    pub captured_at: DateTime<Utc>,
}

/// Saves frames as PNG files named after their capture time.
#[derive(Debug)]
pub struct PictureCapture {
    dir: PathBuf,
    pause: Duration,
    last_stamp: Mutex<i64>,
}

impl PictureCapture {
    pub fn new(dir: impl Into<PathBuf>, pause: Duration) -> Self {
        Self {
            dir: dir.into(),
            pause,
            last_stamp: Mutex::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the frame and then pauses to bound the capture rate. Failures
    /// are logged and reported as `None`; they never reach the caller as
    /// errors.
    pub async fn capture(&self, frame: Arc<Frame>) -> Option<SavedImage> {
        let saved = match self.try_capture(frame).await {
            Ok(saved) => {
                info!("Image saved: {}", saved.path.display());
                Some(saved)
            }
            Err(e) => {
                error!(
                    operation = "take_picture",
                    dir = %self.dir.display(),
                    "Capture failed: {}",
                    e
                );
                None
            }
        };
        tokio::time::sleep(self.pause).await;
        saved
    }

    pub async fn try_capture(&self, frame: Arc<Frame>) -> Result<SavedImage, CaptureError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| CaptureError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let captured_at = Utc::now();
        let file_name = self.next_file_name(captured_at);
        let path = self.dir.join(&file_name);

        let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, image::ImageError> {
            let mut buf = Cursor::new(Vec::new());
            frame.image.write_to(&mut buf, ImageFormat::Png)?;
            Ok(buf.into_inner())
        })
        .await??;

        let io_err = |source| CaptureError::Io {
            path: path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        file.write_all(&png).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        Ok(SavedImage {
            path,
            file_name,
            captured_at,
        })
    }

    /// `<unix seconds>.<microseconds>.png`, strictly increasing per instance
    /// even when the clock has not advanced.
    fn next_file_name(&self, now: DateTime<Utc>) -> String {
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stamp = now.timestamp_micros().max(*last + 1);
        *last = stamp;
        format!("{}.{:06}.png", stamp / 1_000_000, stamp % 1_000_000)
    }
}
