//! Concurrent image loading for the main content.
//!
//! Every `<img src>` is resolved against the document URL and fetched once,
//! over HTTP(S) or from the local filesystem. Images that cannot be loaded
//! are logged and left out; the packager drops their `<img>` elements.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use pagebinder_shared::{ImageAsset, ImageAssets, ImageOptions, PagebinderError, Result};

/// User-Agent string for image requests.
const USER_AGENT: &str = concat!("Pagebinder/", env!("CARGO_PKG_VERSION"));

static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("valid selector"));

/// Distinct, non-empty `src` values of every `<img>` in `html`, in document order.
pub fn collect_image_sources(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    let mut seen = HashSet::new();
    fragment
        .select(&IMG)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && seen.insert(src.to_string()))
        .map(str::to_string)
        .collect()
}

/// Fetches images referenced by content.
pub struct ImageLoader {
    client: Client,
    options: ImageOptions,
}

impl ImageLoader {
    pub fn new(options: ImageOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| PagebinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, options })
    }

    /// Load every image referenced by `html`, resolving relative sources against `base`.
    ///
    /// Never fails as a whole: images that cannot be loaded are skipped.
    #[instrument(skip_all, fields(base = %base))]
    pub async fn load(&self, html: &str, base: &Url) -> ImageAssets {
        if !self.options.enabled {
            debug!("image loading disabled");
            return ImageAssets::default();
        }

        let mut targets: BTreeMap<Url, Vec<String>> = BTreeMap::new();
        for src in collect_image_sources(html) {
            match resolve(base, &src) {
                Some(url) => targets.entry(url).or_default().push(src),
                None => debug!(%src, "unsupported image source, skipping"),
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::with_capacity(targets.len());
        for (url, sources) in targets {
            let client = self.client.clone();
            let sem = semaphore.clone();
            let max_bytes = self.options.max_bytes;

            handles.push(tokio::spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => fetch_image(&client, &url, max_bytes).await,
                    Err(e) => Err(PagebinderError::Network(e.to_string())),
                };
                (url, sources, result)
            }));
        }

        let mut assets = ImageAssets::default();
        let mut skipped = 0_usize;
        for joined in join_all(handles).await {
            match joined {
                Ok((_, sources, Ok(asset))) => {
                    for src in sources {
                        assets.insert(src, asset.clone());
                    }
                }
                Ok((url, _, Err(e))) => {
                    warn!(%url, error = %e, "failed to load image, skipping");
                    skipped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "image task failed");
                    skipped += 1;
                }
            }
        }

        info!(loaded = assets.unique().len(), skipped, "images loaded");
        assets
    }
}

fn resolve(base: &Url, src: &str) -> Option<Url> {
    let mut url = base.join(src).ok()?;
    url.set_fragment(None);
    matches!(url.scheme(), "http" | "https" | "file").then_some(url)
}

async fn fetch_image(client: &Client, url: &Url, max_bytes: u64) -> Result<ImageAsset> {
    let (bytes, content_type) = match url.scheme() {
        "file" => {
            let path = url
                .to_file_path()
                .map_err(|_| PagebinderError::validation(format!("{url}: not a local path")))?;
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| PagebinderError::io(&path, e))?;
            (bytes, None)
        }
        _ => fetch_remote(client, url, max_bytes).await?,
    };

    if bytes.len() as u64 > max_bytes {
        return Err(PagebinderError::validation(format!(
            "{url}: {} bytes exceeds limit of {max_bytes}",
            bytes.len()
        )));
    }

    // The extension is consulted only when no content type was declared.
    let media_type = match content_type {
        Some(ct) if ct.starts_with("image/") => ct,
        Some(ct) => {
            return Err(PagebinderError::validation(format!(
                "{url}: served as {ct}, not an image"
            )));
        }
        None => media_type_from_path(url.path())
            .map(str::to_string)
            .ok_or_else(|| PagebinderError::validation(format!("{url}: not an image")))?,
    };

    let extension = extension_for(&media_type);
    let href = format!("images/{}.{extension}", short_hash(&bytes));
    debug!(%url, %href, size = bytes.len(), "image loaded");

    Ok(ImageAsset {
        href,
        media_type,
        bytes,
    })
}

async fn fetch_remote(
    client: &Client,
    url: &Url,
    max_bytes: u64,
) -> Result<(Vec<u8>, Option<String>)> {
    let mut response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| PagebinderError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PagebinderError::Network(format!("{url}: HTTP {status}")));
    }

    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(PagebinderError::validation(format!(
            "{url}: declared size exceeds limit of {max_bytes}"
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    let mut bytes = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PagebinderError::Network(format!("{url}: body read failed: {e}")))?
    {
        if (bytes.len() + chunk.len()) as u64 > max_bytes {
            return Err(PagebinderError::validation(format!(
                "{url}: body exceeds limit of {max_bytes}"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok((bytes, content_type))
}

/// Guess an image media type from a path extension.
pub fn media_type_from_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        _ => return None,
    })
}

fn extension_for(media_type: &str) -> &str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        other => other
            .strip_prefix("image/")
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("img"),
    }
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}
