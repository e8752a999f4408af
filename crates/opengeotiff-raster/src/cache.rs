//! Raster acquisition with a local file cache.
//!
//! A source locator is either a local path or an `http(s)` URL. Remote files
//! are downloaded once into the cache directory and reused on later runs
//! without revalidation. ZIP archives (detected by content, not by name) are
//! extracted into the cache directory and the raster inside is picked by
//! extension.
//!
//! ## Target file selection
//!
//! A URL fragment names the wanted archive member, e.g.
//! `https://host/atlas.zip#GHI.tif`. The first `.tif`/`.tiff` member whose
//! path contains the fragment (case-insensitive) is used; when nothing
//! matches, or no fragment is given, the largest raster in the archive wins.
//!
//! Downloads block the calling thread and have no overall timeout, so a
//! stalled server stalls the caller.

use crate::error::CacheError;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache name used when a URL has no usable path segment.
const FALLBACK_NAME: &str = "download";

/// Suffix of the directory an archive is extracted into.
const EXTRACTED_SUFFIX: &str = "_extracted";

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Where a raster comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// `http://` or `https://` resource.
    Remote {
        /// URL without its fragment.
        url: Url,
        /// Archive member hint taken from the URL fragment.
        target: Option<String>,
    },
    /// File on the local filesystem.
    Local {
        /// Path to the file.
        path: PathBuf,
        /// Archive member hint taken from a trailing `#name`.
        target: Option<String>,
    },
}

impl SourceLocator {
    /// Interpret a locator string.
    ///
    /// Strings that parse as `http`/`https` URLs are remote; anything else
    /// is a local path. A local path that does not exist but does once a
    /// trailing `#name` is removed has that suffix treated as the target hint.
    pub fn parse(locator: &str) -> Self {
        if let Ok(mut url) = Url::parse(locator) {
            if matches!(url.scheme(), "http" | "https") {
                let target = url
                    .fragment()
                    .map(|f| percent_decode_str(f).decode_utf8_lossy().into_owned())
                    .filter(|f| !f.is_empty());
                url.set_fragment(None);
                return SourceLocator::Remote { url, target };
            }
        }

        let path = PathBuf::from(locator);
        if !path.exists() {
            if let Some((base, fragment)) = locator.rsplit_once('#') {
                if !fragment.is_empty() && Path::new(base).exists() {
                    return SourceLocator::Local {
                        path: PathBuf::from(base),
                        target: Some(fragment.to_string()),
                    };
                }
            }
        }
        SourceLocator::Local { path, target: None }
    }

    /// Archive member hint, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            SourceLocator::Remote { target, .. } | SourceLocator::Local { target, .. } => {
                target.as_deref()
            }
        }
    }

    /// Whether the locator points at a remote resource.
    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocator::Remote { .. })
    }

    fn describe(&self) -> String {
        match self {
            SourceLocator::Remote { url, .. } => url.to_string(),
            SourceLocator::Local { path, .. } => path.display().to_string(),
        }
    }
}

/// Derive a filesystem-safe cache name from a URL.
///
/// Uses the percent-decoded last path segment; query and fragment never leak
/// into the name. Redirect links carrying a `url=` parameter use the first
/// `*.zip` token anywhere in the decoded URL instead.
pub fn cache_file_name(url: &Url) -> String {
    let decoded = percent_decode_str(url.as_str()).decode_utf8_lossy();

    if decoded.contains("url=") {
        let zip_token = decoded
            .split(['/', '&', '?'])
            .find_map(|token| {
                let lower = token.to_ascii_lowercase();
                lower.find(".zip").map(|pos| &token[..pos + 4])
            })
            .filter(|name| name.len() > 4);
        if let Some(name) = zip_token {
            return sanitize(name);
        }
    }

    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
        .unwrap_or_default();

    if segment.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        sanitize(&segment)
    }
}

/// Replace characters that are awkward in file names.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// Resolves source locators to local raster files, downloading and
/// extracting into a cache directory as needed.
pub struct RasterCache {
    /// Cache directory for downloads and extracted archives.
    cache_dir: PathBuf,
    /// HTTP client for downloads.
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for RasterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterCache")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl RasterCache {
    /// Create a cache rooted at `cache_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> CacheResult<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        fs::create_dir_all(&cache_dir).map_err(|e| {
            CacheError::fetch(
                cache_dir.display().to_string(),
                format!("cannot create cache directory: {}", e),
            )
        })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| CacheError::fetch(cache_dir.display().to_string(), e))?;

        Ok(Self { cache_dir, client })
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path a remote URL is cached under.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        self.cache_dir.join(cache_file_name(url))
    }

    /// Resolve a locator to a local raster file.
    ///
    /// Remote sources are fetched unless already cached; archives are
    /// extracted and searched for the raster.
    pub fn resolve(&self, locator: &SourceLocator) -> CacheResult<PathBuf> {
        let local = self.fetch(locator)?;

        if is_zip(&local).map_err(|e| CacheError::fetch(locator.describe(), e))? {
            let extracted = self.extract(&local)?;
            return select_raster(&extracted, locator.target());
        }

        Ok(local)
    }

    /// Make the locator's bytes available locally without archive handling.
    pub fn fetch(&self, locator: &SourceLocator) -> CacheResult<PathBuf> {
        match locator {
            SourceLocator::Local { path, .. } => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(CacheError::fetch(
                        path.display().to_string(),
                        "file does not exist",
                    ))
                }
            }
            SourceLocator::Remote { url, .. } => {
                let cache_path = self.cache_path(url);
                if cache_path.is_file() {
                    info!("Using cached {}", cache_path.display());
                    return Ok(cache_path);
                }
                self.download(url, &cache_path)?;
                Ok(cache_path)
            }
        }
    }

    /// Download `url` into `cache_path` via a `.part` file.
    ///
    /// The final name only appears once the body has been fully written.
    fn download(&self, url: &Url, cache_path: &Path) -> CacheResult<()> {
        info!("Downloading {} -> {}", url, cache_path.display());

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| CacheError::fetch(url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(CacheError::fetch(
                url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }

        let part_path = part_path(cache_path);
        let result = (|| -> io::Result<u64> {
            let mut file = BufWriter::new(File::create(&part_path)?);
            let bytes = response
                .copy_to(&mut file)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            file.flush()?;
            fs::rename(&part_path, cache_path)?;
            Ok(bytes)
        })();

        match result {
            Ok(bytes) => {
                info!("Downloaded {} bytes", bytes);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                Err(CacheError::fetch(url.as_str(), e))
            }
        }
    }

    /// Extract a ZIP archive into the cache, reusing a previous extraction.
    fn extract(&self, archive_path: &Path) -> CacheResult<PathBuf> {
        let target_dir = self.cache_dir.join(extraction_dir_name(archive_path));
        if target_dir.is_dir() {
            debug!("Reusing extracted archive {}", target_dir.display());
            return Ok(target_dir);
        }

        info!("Extracting {}", archive_path.display());
        let staging = part_path(&target_dir);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| CacheError::archive(archive_path, e))?;
        }

        let result = unzip_into(archive_path, &staging)
            .and_then(|_| fs::rename(&staging, &target_dir).map_err(|e| e.to_string()));
        if let Err(reason) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(CacheError::archive(archive_path, reason));
        }

        Ok(target_dir)
    }
}

/// Sibling path with a `.part` suffix appended.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// `foo.zip` extracts into `foo_extracted`.
fn extraction_dir_name(archive_path: &Path) -> String {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = if name.to_ascii_lowercase().ends_with(".zip") {
        &name[..name.len() - 4]
    } else {
        name.as_str()
    };
    format!("{}{}", stem, EXTRACTED_SUFFIX)
}

/// Whether the file starts with the ZIP local-header signature.
fn is_zip(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn unzip_into(archive_path: &Path, dest: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    fs::create_dir_all(dest).map_err(|e| e.to_string())?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| e.to_string())?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let mut out = BufWriter::new(File::create(&out_path).map_err(|e| e.to_string())?);
        io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;
        out.flush().map_err(|e| e.to_string())?;
    }

    Ok(())
}

fn has_raster_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// Pick the raster to use from an extracted archive.
pub fn select_raster(dir: &Path, target: Option<&str>) -> CacheResult<PathBuf> {
    let mut rasters: Vec<(PathBuf, u64)> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && has_raster_extension(entry.path()))
        .map(|entry| {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (entry.into_path(), size)
        })
        .collect();

    if rasters.is_empty() {
        return Err(CacheError::archive(dir, "no .tif raster found in archive"));
    }

    if let Some(target) = target {
        let needle = target.to_lowercase();
        if let Some((path, _)) = rasters.iter().find(|(p, _)| {
            p.strip_prefix(dir)
                .unwrap_or(p)
                .to_string_lossy()
                .to_lowercase()
                .contains(&needle)
        }) {
            info!("Found target file: {}", path.display());
            return Ok(path.clone());
        }
        warn!(
            "{} not found in archive; falling back to largest raster",
            target
        );
    }

    // Largest wins; the earliest path wins ties
    rasters.sort_by(|a, b| b.1.cmp(&a.1));
    let (path, size) = rasters.swap_remove(0);
    debug!("Selected {} ({} bytes)", path.display(), size);
    Ok(path)
}
