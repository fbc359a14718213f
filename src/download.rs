//! Resolve the `weights_path` of a codec config to a checkpoint on disk.
//!
//! `hf://` paths go through the HuggingFace Hub cache. Plain HTTP(S) URLs are
//! cached under [`cache_dir`]. Anything else is a local path.

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable overriding the HTTP checkpoint cache.
pub const CACHE_ENV: &str = "DACPREP_CACHE";

/// Where a checkpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsSource {
    /// `hf://owner/repo/path/to/file[@revision]`
    Hub {
        repo_id: String,
        file: String,
        revision: Option<String>,
    },
    /// `http://` or `https://` URL.
    Http(String),
    Local(PathBuf),
}

impl WeightsSource {
    pub fn parse(path: &str) -> Result<Self> {
        if let Some(hub) = path.strip_prefix("hf://") {
            let mut parts = hub.splitn(3, '/');
            let (Some(owner), Some(repo), Some(file)) = (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("Invalid hf:// path: {path}");
            };
            if owner.is_empty() || repo.is_empty() || file.is_empty() {
                anyhow::bail!("Invalid hf:// path: {path}");
            }
            let (file, revision) = match file.split_once('@') {
                Some((file, rev)) => (file, Some(rev.to_string())),
                None => (file, None),
            };
            return Ok(Self::Hub {
                repo_id: format!("{owner}/{repo}"),
                file: file.to_string(),
                revision,
            });
        }
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Self::Http(path.to_string()));
        }
        Ok(Self::Local(PathBuf::from(path)))
    }

    /// Fetch the checkpoint if needed and return its local path.
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            Self::Hub {
                repo_id,
                file,
                revision,
            } => {
                log::info!("Fetching {file} from {repo_id}");
                let repo = match revision {
                    Some(rev) => hf_hub::Repo::with_revision(
                        repo_id.clone(),
                        hf_hub::RepoType::Model,
                        rev.clone(),
                    ),
                    None => hf_hub::Repo::model(repo_id.clone()),
                };
                Api::new()?
                    .repo(repo)
                    .get(file)
                    .with_context(|| format!("Failed to fetch {file} from {repo_id}"))
            }
            Self::Http(url) => fetch_cached(url, &cache_dir()?),
            Self::Local(path) => {
                if !path.exists() {
                    anyhow::bail!("No such file or directory: {}", path.display());
                }
                Ok(path.clone())
            }
        }
    }
}

/// Resolve `path` (see [`WeightsSource`]) to a local checkpoint file.
pub fn download_if_necessary(path: &str) -> Result<PathBuf> {
    WeightsSource::parse(path)?.resolve()
}

/// `$DACPREP_CACHE`, or `~/.cache/dacprep`; created on first use.
pub fn cache_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(CACHE_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = std::env::var_os("HOME").unwrap_or_else(|| ".".into());
            Path::new(&home).join(".cache").join("dacprep")
        }
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
    Ok(dir)
}

fn fetch_cached(url: &str, dir: &Path) -> Result<PathBuf> {
    let target = dir.join(cache_file_name(url));
    if target.exists() {
        log::debug!("Using cached {}", target.display());
        return Ok(target);
    }

    log::info!("Downloading {url}...");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow::anyhow!("Failed to download {url}: {e}"))?;
    // Stream to a sibling file so an interrupted download never looks complete.
    let partial = target.with_extension("partial");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("Failed to read response from {url}"))?;
    file.sync_all()?;
    drop(file);
    fs::rename(&partial, &target)?;
    log::info!("Saved {}", target.display());
    Ok(target)
}

fn cache_file_name(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}
