//! Image generation client
//!
//! The image API is a plain GET: the prompt is a URL-encoded path segment and
//! the generation settings are query parameters. The response body is the
//! raw image, which is written under the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

/// Error type for image generation
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0} from image service")]
    Status(u16),

    #[error("Failed to save image: {0}")]
    Io(#[from] std::io::Error),
}

/// Generation settings sent as query parameters
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub enhance: bool,
    pub safe: bool,
    pub private: bool,
    pub no_watermark: bool,
    pub timeout: Duration,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            seed: 42,
            enhance: true,
            safe: true,
            private: true,
            no_watermark: true,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Client for the remote image API
#[derive(Clone)]
pub struct ImageClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl ImageClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.filter(|t| !t.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// URL for a prompt (query parameters are added separately)
    pub fn prompt_url(&self, prompt: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(prompt)
        )
    }

    /// Query parameters for a request
    pub fn query(&self, model: &str, options: &ImageOptions) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("width", options.width.to_string()),
            ("height", options.height.to_string()),
            ("model", model.to_string()),
            ("seed", options.seed.to_string()),
        ];
        let flags = [
            ("enhance", options.enhance),
            ("safe", options.safe),
            ("private", options.private),
            ("nologo", options.no_watermark),
        ];
        for (name, enabled) in flags {
            if enabled {
                params.push((name, "true".to_string()));
            }
        }
        if let Some(token) = &self.token {
            params.push(("token", token.clone()));
        }
        params
    }

    /// Generate an image and save it under `out_dir`
    ///
    /// # Returns
    /// Path of the written file
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &ImageOptions,
        out_dir: &Path,
    ) -> Result<PathBuf, ImageError> {
        let response = self
            .client
            .get(self.prompt_url(prompt))
            .query(&self.query(model, options))
            .timeout(options.timeout)
            .header(
                reqwest::header::USER_AGENT,
                concat!("shellpilot/", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(image_file_name(prompt, model));
        tokio::fs::write(&path, &bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), model, "image saved");
        Ok(path)
    }
}

/// Stable file name for a prompt/model pair
pub fn image_file_name(prompt: &str, model: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}", prompt, model).as_bytes());
    format!("ai_image_{}.jpg", &hex::encode(digest)[..8])
}
