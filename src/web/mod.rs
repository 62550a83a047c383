pub mod server;


use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::config::{PicturesConfig, WebConfig};

pub use server::PictureServer;

/// Turns saved picture names into URLs on the picture server.
#[derive(Debug, Clone)]
pub struct PictureLocator {
    dir: PathBuf,
    base_url: String,
}

impl PictureLocator {
    pub fn new(web: &WebConfig, pictures: &PicturesConfig) -> Self {
        Self::with_base_url(
            &pictures.dir,
            format!("http://{}:{}", web.public_host, web.port),
        )
    }

    pub fn with_base_url(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    pub fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), file_name)
    }

    /// Most recently created file in the pictures directory.
    pub fn latest_file(&self) -> Option<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Cannot list pictures: {}", e);
                return None;
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let created = created_at(&entry.path())?;
                Some((created, entry.file_name().to_string_lossy().into_owned()))
            })
            .max()
            .map(|(_, name)| name)
    }
}

fn created_at(path: &Path) -> Option<SystemTime> {
    let metadata = std::fs::metadata(path).ok()?;
    metadata.created().or_else(|_| metadata.modified()).ok()
}
