//! External image fetching
//!
//! Downloads `http(s)` images referenced from note bodies so they can be
//! stored as page attachments instead of hotlinked.

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::debug;

use crate::models::Attachment;

/// Fetch timeout in seconds
const FETCH_TIMEOUT: u64 = 10;

/// Downloads an image by URL.
///
/// Returns `None` on any failure; the converter then keeps the URL.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Option<Attachment>;
}

/// `ImageFetcher` over a blocking reqwest client
pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT))
            .user_agent(concat!("everwiki/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn fetch_inner(&self, url: &str) -> Result<Attachment> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            bail!("HTTP {}", response.status());
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(content_type_essence)
            .unwrap_or_else(|| "image/png".to_string());

        if !mime_type.starts_with("image/") {
            bail!("not an image ({})", mime_type);
        }

        let data = response.bytes()?.to_vec();
        let filename = filename_from_url(url).map(|name| with_image_extension(name, &mime_type));
        Ok(Attachment::from_data(data, mime_type, filename))
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Option<Attachment> {
        match self.fetch_inner(url) {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                debug!("Image download failed for {}: {}", url, e);
                None
            }
        }
    }
}

/// `text/html; charset=utf-8` → `text/html`
fn content_type_essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or(value)
        .trim()
        .to_ascii_lowercase()
}

/// Last path segment of a URL with unsafe characters replaced by `_`
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;

    let cleaned: String = segment
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Append the MIME type's extension unless the name already has an image one
fn with_image_extension(filename: String, mime_type: &str) -> String {
    const IMAGE_EXTENSIONS: [&str; 7] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".bmp"];

    let lower = filename.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return filename;
    }

    let ext = match crate::models::extension_for_mime(mime_type) {
        "" => ".png",
        ext => ext,
    };
    format!("{}{}", filename, ext)
}
