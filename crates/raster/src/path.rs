//! Source resolution: demo aliases, local paths, and remote references.
//!
//! Remote sources (`http(s)://`, `s3://`) are fetched once into a per-process
//! cache directory and opened from disk; repeat opens of the same URL reuse
//! the downloaded copy.

use crate::demo::{self, DemoScene};
use crate::geotiff::GeoTiffSource;
use crate::source::RasterSource;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use tile_common::{TileError, TileResult};
use tracing::{debug, info};

/// How a `filename` request value resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Demo(DemoScene),
    Local(PathBuf),
}

/// Resolve a `filename` request value without opening it.
pub fn resolve_source(filename: &str) -> TileResult<ResolvedSource> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(TileError::MissingParameter("filename".to_string()));
    }
    if let Some(scene) = demo_alias(trimmed) {
        return Ok(ResolvedSource::Demo(scene));
    }
    if let Some(url) = remote_url(trimmed)? {
        return fetch_remote(&url).map(ResolvedSource::Local);
    }
    let path = PathBuf::from(trimmed);
    if path.is_file() {
        Ok(ResolvedSource::Local(path))
    } else {
        Err(TileError::SourceNotFound(trimmed.to_string()))
    }
}

/// Resolve and open a raster source.
pub fn open_source(filename: &str) -> TileResult<Box<dyn RasterSource>> {
    match resolve_source(filename)? {
        ResolvedSource::Demo(scene) => Ok(Box::new(demo::build(scene))),
        ResolvedSource::Local(path) => Ok(Box::new(GeoTiffSource::open(&path)?)),
    }
}

fn demo_alias(name: &str) -> Option<DemoScene> {
    match name.to_ascii_lowercase().as_str() {
        "demo" | "bahamas" => Some(DemoScene::Rgb),
        "elevation" | "dem" | "topo" => Some(DemoScene::Elevation),
        "pixels" => Some(DemoScene::Pixels),
        _ => None,
    }
}

pub(crate) fn remote_url(filename: &str) -> TileResult<Option<String>> {
    if let Some(rest) = filename.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            TileError::invalid_param("filename", "s3 reference must look like s3://bucket/key")
        })?;
        if bucket.is_empty() || key.is_empty() {
            return Err(TileError::invalid_param(
                "filename",
                "s3 reference must look like s3://bucket/key",
            ));
        }
        Ok(Some(format!("https://{}.s3.amazonaws.com/{}", bucket, key)))
    } else if filename.starts_with("http://") || filename.starts_with("https://") {
        Ok(Some(filename.to_string()))
    } else {
        Ok(None)
    }
}

/// Directory holding downloaded remote rasters.
pub fn cache_dir() -> PathBuf {
    std::env::temp_dir().join("localtileserver")
}

/// Remove every downloaded raster and recreate the cache directory.
pub fn purge_cache() -> std::io::Result<()> {
    let dir = cache_dir();
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)
}

fn cache_file_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", hex, extension_of(url))
}

fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next().and_then(|seg| seg.rsplit_once('.')) {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 => format!(".{}", ext),
        _ => String::new(),
    }
}

fn fetch_remote(url: &str) -> TileResult<PathBuf> {
    let dir = cache_dir();
    fs::create_dir_all(&dir)?;
    let target = dir.join(cache_file_name(url));
    if target.is_file() {
        debug!(url, path = %target.display(), "remote raster already cached");
        return Ok(target);
    }

    info!(url, "downloading remote raster");
    let response = reqwest::blocking::get(url)
        .map_err(|e| TileError::SourceReadError(format!("{}: {}", url, e)))?;
    if !response.status().is_success() {
        return Err(TileError::SourceReadError(format!(
            "{}: HTTP {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| TileError::SourceReadError(format!("{}: {}", url, e)))?;

    // Write-then-rename so a concurrent open never sees a partial download.
    let partial = dir.join(format!("{}.part-{}", cache_file_name(url), std::process::id()));
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, &target)?;
    info!(url, bytes = bytes.len(), "remote raster cached");
    Ok(target)
}
