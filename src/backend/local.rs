//! Content-addressed local disk store
//!
//! Layout mirrors the toolchain's own cache: 256 shard directories named by
//! the first byte of the action ID, each holding `<version><hex id>` bodies
//! and `.meta` sidecars. Both are written to a uniquely named temp file and
//! renamed into place, so a reader never sees a partial file under its final
//! name.

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Prefix on every entry file; bump when the on-disk format changes
pub const FILE_FORMAT_VERSION: &str = "v1-";

/// Suffix of metadata sidecar files
const META_SUFFIX: &str = ".meta";

/// Metadata stored beside a cached body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub output_id: Vec<u8>,
    pub size: u64,
    pub put_time: DateTime<Utc>,
}

impl EntryMeta {
    /// Render as the sidecar text format
    pub fn encode(&self) -> String {
        format!(
            "outputID:{}\nsize:{}\ntime:{}\n",
            hex::encode(&self.output_id),
            self.size,
            self.put_time.timestamp()
        )
    }

    /// Parse the sidecar text format
    pub fn decode(content: &str) -> Result<Self, String> {
        let mut output_id_hex: Option<&str> = None;
        let mut size: u64 = 0;
        let mut unix: i64 = 0;

        for line in content.lines().map(str::trim) {
            if let Some(value) = line.strip_prefix("outputID:") {
                output_id_hex = Some(value);
            } else if let Some(value) = line.strip_prefix("size:") {
                size = value
                    .parse()
                    .map_err(|e| format!("invalid size {:?}: {}", value, e))?;
            } else if let Some(value) = line.strip_prefix("time:") {
                unix = value
                    .parse()
                    .map_err(|e| format!("invalid time {:?}: {}", value, e))?;
            }
        }

        // An empty value is a valid, empty output ID; only a missing line is corrupt.
        let output_id_hex = output_id_hex.ok_or_else(|| "missing outputID field".to_string())?;
        let output_id =
            hex::decode(output_id_hex).map_err(|e| format!("invalid outputID: {}", e))?;
        let put_time = Utc
            .timestamp_opt(unix, 0)
            .single()
            .ok_or_else(|| format!("time out of range: {}", unix))?;

        Ok(Self {
            output_id,
            size,
            put_time,
        })
    }
}

/// Local disk cache rooted at an absolute directory
#[derive(Debug, Clone)]
pub struct LocalCache {
    cache_dir: PathBuf,
}

impl LocalCache {
    /// Open (creating if needed) a cache rooted at `cache_dir`
    ///
    /// All 256 shard directories are created up front so writes never need
    /// to create directories.
    pub async fn open(cache_dir: &Path) -> CacheResult<Self> {
        fs::create_dir_all(cache_dir)
            .await
            .map_err(|e| CacheError::CacheDirCreate {
                path: cache_dir.to_path_buf(),
                source: e,
            })?;

        let cache_dir = fs::canonicalize(cache_dir).await.map_err(|e| {
            CacheError::io(format!("resolving cache directory {}", cache_dir.display()), e)
        })?;

        for shard in 0..=u8::MAX {
            let shard_dir = cache_dir.join(format!("{:02x}", shard));
            fs::create_dir_all(&shard_dir)
                .await
                .map_err(|e| CacheError::CacheDirCreate {
                    path: shard_dir.clone(),
                    source: e,
                })?;
        }

        Ok(Self { cache_dir })
    }

    /// Absolute root directory of the cache
    pub fn root(&self) -> &Path {
        &self.cache_dir
    }

    /// Path where the body for `action_id` lives (whether or not it exists)
    pub fn entry_path(&self, action_id: &[u8]) -> CacheResult<PathBuf> {
        let hex_id = hex_action_id(action_id)?;
        Ok(self
            .cache_dir
            .join(&hex_id[..2])
            .join(format!("{}{}", FILE_FORMAT_VERSION, hex_id)))
    }

    /// Path of the metadata sidecar for `action_id`
    pub fn meta_path(&self, action_id: &[u8]) -> CacheResult<PathBuf> {
        let mut path = self.entry_path(action_id)?.into_os_string();
        path.push(META_SUFFIX);
        Ok(PathBuf::from(path))
    }

    /// Atomically write the body for `action_id`, returning its final path
    pub async fn write(&self, action_id: &[u8], body: &[u8]) -> CacheResult<PathBuf> {
        let path = self.entry_path(action_id)?;
        write_atomic(&path, body).await?;
        Ok(path)
    }

    /// Atomically write the metadata sidecar for `action_id`
    pub async fn write_meta(&self, action_id: &[u8], meta: &EntryMeta) -> CacheResult<()> {
        let path = self.meta_path(action_id)?;
        write_atomic(&path, meta.encode().as_bytes()).await
    }

    /// Write body then sidecar
    ///
    /// A sidecar failure is only logged: the body is cached and readable at
    /// the returned path, but later lookups will miss until it is rewritten.
    pub async fn write_with_meta(
        &self,
        action_id: &[u8],
        body: &[u8],
        meta: &EntryMeta,
    ) -> CacheResult<PathBuf> {
        let path = self.write(action_id, body).await?;

        if let Err(e) = self.write_meta(action_id, meta).await {
            warn!(
                action_id = %hex::encode(action_id),
                error = %e,
                "Failed to write local cache metadata"
            );
        }

        Ok(path)
    }

    /// Look up metadata for `action_id`
    ///
    /// Returns `None` for anything that is not a trustworthy entry. The
    /// sidecar is read directly rather than stat-ing the body first.
    pub async fn check(&self, action_id: &[u8]) -> CacheResult<Option<EntryMeta>> {
        let meta_path = self.meta_path(action_id)?;

        let content = match fs::read_to_string(&meta_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                self.report_unusable_meta(action_id, &e.to_string()).await;
                return Ok(None);
            }
        };

        match EntryMeta::decode(&content) {
            Ok(meta) => Ok(Some(meta)),
            Err(reason) => {
                self.report_unusable_meta(action_id, &reason).await;
                Ok(None)
            }
        }
    }

    async fn report_unusable_meta(&self, action_id: &[u8], reason: &str) {
        let hex_id = hex::encode(action_id);
        warn!(action_id = %hex_id, error = %reason, "Failed to read local cache metadata");

        let Ok(path) = self.entry_path(action_id) else {
            return;
        };
        if fs::try_exists(&path).await.unwrap_or(false) {
            warn!(
                action_id = %hex_id,
                path = %path.display(),
                "Local cache file exists but metadata is missing or corrupted"
            );
        }
    }

    /// Remove every entry, keeping the shard directories
    ///
    /// Returns the number of files removed.
    pub async fn clear(&self) -> CacheResult<usize> {
        let mut removed = 0;

        for shard in 0..=u8::MAX {
            let shard_dir = self.cache_dir.join(format!("{:02x}", shard));
            let mut entries = match fs::read_dir(&shard_dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(CacheError::io(
                        format!("reading shard {}", shard_dir.display()),
                        e,
                    ))
                }
            };

            let mut paths = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| CacheError::io("reading shard entry", e))?
            {
                paths.push(entry.path());
            }

            // Sidecars go first so a body is never left behind as a hit.
            paths.sort_by_key(|p| !is_meta_path(p));

            for path in paths {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    // Raced with another clear or a temp-file cleanup.
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(CacheError::io(
                            format!("removing cache file {}", path.display()),
                            e,
                        ))
                    }
                }
            }
        }

        Ok(removed)
    }
}

/// Hex-encode an action ID, rejecting IDs too short to shard
pub fn hex_action_id(action_id: &[u8]) -> CacheResult<String> {
    if action_id.is_empty() {
        return Err(CacheError::InvalidActionId("empty action ID".to_string()));
    }
    Ok(hex::encode(action_id))
}

fn is_meta_path(path: &Path) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(META_SUFFIX))
}

/// Write `data` to a unique temp file beside `path` and rename it into place
async fn write_atomic(path: &Path, data: &[u8]) -> CacheResult<()> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp_path = PathBuf::from(tmp_path);

    let result = write_then_rename(&tmp_path, path, data).await;
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }
    result
}

async fn write_then_rename(tmp_path: &Path, path: &Path, data: &[u8]) -> CacheResult<()> {
    let mut file = fs::File::create(tmp_path)
        .await
        .map_err(|e| CacheError::io(format!("creating temp file {}", tmp_path.display()), e))?;
    file.write_all(data)
        .await
        .map_err(|e| CacheError::io(format!("writing temp file {}", tmp_path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| CacheError::io(format!("flushing temp file {}", tmp_path.display()), e))?;
    drop(file);

    fs::rename(tmp_path, path)
        .await
        .map_err(|e| CacheError::io(format!("renaming into {}", path.display()), e))
}
