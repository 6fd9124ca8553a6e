//! Decoded slide images and the shared cache every transition loads through.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// A decoded RGBA8 image.
#[derive(Clone)]
pub struct Asset {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("key", &self.key)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("asset {0} not found")]
    NotFound(String),
    #[error("failed to decode asset {key}: {message}")]
    Decode { key: String, message: String },
    #[error("asset {key} did not load within {after:?}")]
    Timeout { key: String, after: Duration },
    #[error("asset loader task failed: {0}")]
    Join(String),
}

/// Where assets come from. Implementations must be cheap to call concurrently.
pub trait AssetSource: Send + Sync + 'static {
    fn fetch(&self, key: &str) -> BoxFuture<'static, Result<Asset, AssetError>>;
}

/// Reads and decodes images below a root directory.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsAssetSource {
    fn fetch(&self, key: &str) -> BoxFuture<'static, Result<Asset, AssetError>> {
        let path = self.root.join(key);
        let key = key.to_string();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || decode_rgba8(&path, key))
                .await
                .map_err(|err| AssetError::Join(err.to_string()))?
        })
    }
}

fn decode_rgba8(path: &Path, key: String) -> Result<Asset, AssetError> {
    let reader = match image::ImageReader::open(path) {
        Ok(reader) => reader,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(AssetError::NotFound(key)),
        Err(err) => {
            return Err(AssetError::Decode {
                key,
                message: err.to_string(),
            });
        }
    };
    let decoded = reader
        .with_guessed_format()
        .map_err(|err| err.to_string())
        .and_then(|reader| reader.decode().map_err(|err| err.to_string()));
    match decoded {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let (width, height) = rgba.dimensions();
            debug!(key, width, height, "decoded asset");
            Ok(Asset {
                key,
                width,
                height,
                pixels: rgba.into_raw(),
            })
        }
        Err(message) => Err(AssetError::Decode { key, message }),
    }
}

type Slot = Arc<OnceCell<Arc<Asset>>>;

/// Memoising asset loader shared by all transitions.
///
/// Concurrent loads of one key wait on a single fetch. Failures are not
/// remembered, so a later request tries again.
pub struct AssetCache {
    source: Arc<dyn AssetSource>,
    timeout: Duration,
    entries: Mutex<HashMap<String, Slot>>,
}

impl AssetCache {
    pub fn new(source: Arc<dyn AssetSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, key: &str) -> Result<Arc<Asset>, AssetError> {
        let slot = self.slot(key);
        slot.get_or_try_init(|| async {
            debug!(key, "fetching asset");
            match tokio::time::timeout(self.timeout, self.source.fetch(key)).await {
                Ok(Ok(asset)) => Ok(Arc::new(asset)),
                Ok(Err(err)) => {
                    warn!(key, error = %err, "asset load failed");
                    Err(err)
                }
                Err(_) => {
                    warn!(key, after = ?self.timeout, "asset load timed out");
                    Err(AssetError::Timeout {
                        key: key.to_string(),
                        after: self.timeout,
                    })
                }
            }
        })
        .await
        .cloned()
    }

    /// Returns the asset only if an earlier load already finished.
    pub fn cached(&self, key: &str) -> Option<Arc<Asset>> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    fn slot(&self, key: &str) -> Slot {
        self.lock().entry(key.to_string()).or_default().clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCache")
            .field("timeout", &self.timeout)
            .field("entries", &self.lock().len())
            .finish()
    }
}
