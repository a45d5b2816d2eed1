//! Item repository access
//!
//! A repository advertises the releases of every item it offers. The HTTP
//! implementation fetches one `index.yaml` per kind and keeps it in an
//! on-disk cache with a TTL to reduce network requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::index::{IndexEntry, RepositoryIndex};
use crate::item::ItemKind;
use crate::version::{Version, VersionSpec};

/// Where an archive can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadLocation {
    Url(String),
    Path(PathBuf),
}

impl std::fmt::Display for DownloadLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadLocation::Url(url) => f.write_str(url),
            DownloadLocation::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A single downloadable release advertised by a repository
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub slug: String,
    pub name: String,
    pub version: Version,
    pub download: DownloadLocation,
    /// Expected archive digest (`sha256:<hex>`)
    pub digest: Option<String>,
}

impl Release {
    fn from_entry(entry: &IndexEntry) -> Result<Self> {
        let url = entry.download_url().with_context(|| {
            format!(
                "No download URL available for {} {}",
                entry.name, entry.version
            )
        })?;

        let download = match url.strip_prefix("file://") {
            Some(path) => DownloadLocation::Path(PathBuf::from(path)),
            None => DownloadLocation::Url(url.to_string()),
        };

        Ok(Self {
            slug: entry.name.clone(),
            name: entry.display_name().to_string(),
            version: entry.version.clone(),
            download,
            digest: entry.digest.clone(),
        })
    }
}

/// Source of installable releases
#[async_trait]
pub trait Repository: Send + Sync {
    /// Latest release of `slug`, or `None` when the repository does not know it
    async fn lookup(&self, kind: ItemKind, slug: &str) -> Result<Option<Release>>;

    /// Release of `slug` matching `spec` (exact, `latest`, `^x.y`, `~x.y`)
    async fn lookup_version(
        &self,
        kind: ItemKind,
        slug: &str,
        spec: &str,
    ) -> Result<Option<Release>>;
}

/// Resolve a release from an already-loaded index
fn resolve_in_index(index: &RepositoryIndex, slug: &str, spec: &str) -> Result<Option<Release>> {
    let Some(latest) = index.get_latest(slug) else {
        return Ok(None);
    };

    if let Some(entry) = index.resolve_version(slug, spec) {
        return Release::from_entry(entry).map(Some);
    }

    // Exact versions missing from the index follow the versioned file naming
    match VersionSpec::parse(spec) {
        VersionSpec::Exact(version) => match latest.at_version(&version) {
            Some(entry) => Release::from_entry(&entry).map(Some),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Repository over indexes held in memory
#[derive(Debug, Clone, Default)]
pub struct IndexedRepository {
    indexes: HashMap<ItemKind, RepositoryIndex>,
}

impl IndexedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, kind: ItemKind, index: RepositoryIndex) -> Self {
        self.indexes.insert(kind, index);
        self
    }
}

#[async_trait]
impl Repository for IndexedRepository {
    async fn lookup(&self, kind: ItemKind, slug: &str) -> Result<Option<Release>> {
        self.lookup_version(kind, slug, "latest").await
    }

    async fn lookup_version(
        &self,
        kind: ItemKind,
        slug: &str,
        spec: &str,
    ) -> Result<Option<Release>> {
        match self.indexes.get(&kind) {
            Some(index) => resolve_in_index(index, slug, spec),
            None => Ok(None),
        }
    }
}

/// Cached index metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedIndex {
    /// When the index was cached (Unix timestamp)
    pub cached_at: u64,

    /// The cached index
    pub index: RepositoryIndex,
}

/// On-disk index cache keyed by URL
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
    ttl: Duration,
}

impl IndexCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    /// Get cache file path for a URL
    fn path_for_url(&self, url: &str) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let hash = hasher.finish();

        self.dir.join(format!("index_{hash:016x}.yaml"))
    }

    /// Load cached index if still fresh
    pub fn load(&self, url: &str) -> Result<Option<RepositoryIndex>> {
        let cache_path = self.path_for_url(url);

        if !cache_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&cache_path)
            .with_context(|| format!("Failed to read cache: {}", cache_path.display()))?;

        let cached: CachedIndex = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse cache: {}", cache_path.display()))?;

        let age = Duration::from_secs(unix_now().saturating_sub(cached.cached_at));

        if age > self.ttl {
            tracing::debug!("Cache expired for {} (age: {:?})", url, age);
            return Ok(None);
        }

        tracing::debug!("Using cached index for {} (age: {:?})", url, age);
        Ok(Some(cached.index))
    }

    /// Save index to cache
    pub fn save(&self, url: &str, index: &RepositoryIndex) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cache directory: {}", self.dir.display())
        })?;

        let cache_path = self.path_for_url(url);
        let cached = CachedIndex {
            cached_at: unix_now(),
            index: index.clone(),
        };

        let content = serde_yaml_ng::to_string(&cached).context("Failed to serialize cache")?;

        std::fs::write(&cache_path, content)
            .with_context(|| format!("Failed to write cache: {}", cache_path.display()))?;

        tracing::debug!("Saved index to cache: {}", cache_path.display());
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Repository served over HTTP, one `index.yaml` per kind
pub struct HttpRepository {
    config: crate::config::RepositoryConfig,
    cache: Option<IndexCache>,
    force_refresh: bool,
    loaded: tokio::sync::Mutex<HashMap<ItemKind, RepositoryIndex>>,
}

impl HttpRepository {
    pub fn new(config: crate::config::RepositoryConfig) -> Self {
        let cache = crate::config::TroveConfig::cache_dir()
            .map(|dir| IndexCache::new(dir, config.cache_ttl()));

        Self {
            config,
            cache,
            force_refresh: false,
            loaded: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_cache(mut self, cache: Option<IndexCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Bypass the on-disk cache and always fetch fresh indexes
    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Index for `kind`, fetched at most once per process
    async fn index(&self, kind: ItemKind) -> Result<RepositoryIndex> {
        let mut loaded = self.loaded.lock().await;
        if let Some(index) = loaded.get(&kind) {
            return Ok(index.clone());
        }

        let url = self.config.index_url(kind);
        let index = self.fetch_index_cached(&url).await?;
        tracing::debug!("Loaded {} index: {} items", kind, index.item_count());

        loaded.insert(kind, index.clone());
        Ok(index)
    }

    async fn fetch_index_cached(&self, url: &str) -> Result<RepositoryIndex> {
        if !self.force_refresh {
            if let Some(cache) = &self.cache {
                if let Ok(Some(cached)) = cache.load(url) {
                    return Ok(cached);
                }
            }
        }

        let index = fetch_index_from_url(url).await?;

        // Caching is best effort
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(url, &index) {
                tracing::warn!("Failed to save index to cache: {}", e);
            }
        }

        Ok(index)
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn lookup(&self, kind: ItemKind, slug: &str) -> Result<Option<Release>> {
        self.lookup_version(kind, slug, "latest").await
    }

    async fn lookup_version(
        &self,
        kind: ItemKind,
        slug: &str,
        spec: &str,
    ) -> Result<Option<Release>> {
        let index = self.index(kind).await?;
        resolve_in_index(&index, slug, spec)
    }
}

/// Fetch an index from a URL (no caching)
#[cfg(feature = "remote")]
async fn fetch_index_from_url(url: &str) -> Result<RepositoryIndex> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("trove/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch repository index from {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!(
            "Failed to fetch repository index: HTTP {} from {}",
            response.status(),
            url
        );
    }

    let content = response
        .text()
        .await
        .context("Failed to read response body")?;

    RepositoryIndex::from_yaml(&content)
        .with_context(|| format!("Failed to parse repository index from {url}"))
}

/// Stub for when remote access is disabled
#[cfg(not(feature = "remote"))]
async fn fetch_index_from_url(url: &str) -> Result<RepositoryIndex> {
    anyhow::bail!("Cannot fetch {url}: remote feature is not enabled. Rebuild with --features remote")
}
