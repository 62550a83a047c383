use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{PicturesConfig, WebConfig};

/// Serves saved pictures over plain HTTP.
pub struct PictureServer {
    pictures_dir: PathBuf,
    bind_addr: String,
}

impl PictureServer {
    pub fn new(web: &WebConfig, pictures: &PicturesConfig) -> Self {
        Self {
            pictures_dir: pictures.dir.clone(),
            bind_addr: format!("{}:{}", web.bind_host, web.port),
        }
    }

    pub fn routes(&self) -> Router {
        Router::new()
            .fallback_service(ServeDir::new(&self.pictures_dir))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .context(format!("Failed to bind picture server to {}", self.bind_addr))?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            "Serving {} on http://{}",
            self.pictures_dir.display(),
            listener.local_addr()?
        );
        axum::serve(listener, self.routes())
            .await
            .context("Picture server failed")?;
        Ok(())
    }
}
