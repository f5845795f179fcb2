// src/gpg.rs

//! GPG key materialization
//!
//! `gpgkey` entries come in two shapes: inline armored key blocks and
//! URLs. Before metadata loading, inline keys are written to files under
//! the per-request persistdir so the engine sees only URLs. After
//! resolution, every key of every contributing repo is dereferenced back
//! to key text for the response payload.

use crate::error::{Error, Result};
use crate::repository::RepoConfig;
use reqwest::blocking::Client;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Armor header marking an inline key
pub const PEM_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// A single `gpgkey` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Armored key text carried in the configuration itself
    Inline(String),
    /// Anything else is passed along as a URL
    Url(String),
}

impl KeySource {
    /// Classify an entry by probing for the armor header
    pub fn classify(value: String) -> KeySource {
        if value.trim_start().starts_with(PEM_HEADER) {
            KeySource::Inline(value)
        } else {
            KeySource::Url(value)
        }
    }
}

/// Create the key directory under the per-request persistdir
///
/// Keys may be private-adjacent material, so the directory is 0700.
pub fn key_dir(persistdir: &Path) -> Result<PathBuf> {
    let dir = persistdir.join("gpgkeys");
    fs::create_dir_all(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    Ok(dir)
}

/// Write a repo's inline keys to disk and return its key-URL list
///
/// Inline entries become `file://` URIs pointing into `key_dir`; URL
/// entries pass through unchanged, whatever their scheme.
pub fn sack_key_urls(repo_id: &str, keys: &[KeySource], key_dir: &Path) -> Result<Vec<String>> {
    let mut urls = Vec::with_capacity(keys.len());
    for (idx, key) in keys.iter().enumerate() {
        match key {
            KeySource::Inline(text) => {
                let path = key_dir.join(format!("{}-{}.asc", repo_id, idx));
                fs::write(&path, text)?;
                debug!("Materialized inline key for '{}' at {}", repo_id, path.display());
                urls.push(format!("file://{}", path.display()));
            }
            KeySource::Url(url) => urls.push(url.clone()),
        }
    }
    Ok(urls)
}

/// Dereference every key of a repo to key text, in declaration order
///
/// The image root is applied only to repos read from that root; repos
/// supplied in the request reference host-absolute paths. Remote keys go
/// through the repo's own HTTP client (TLS settings, proxy), built on the
/// first `http(s)` URL encountered.
pub fn repo_key_texts(
    repo: &RepoConfig,
    root_dir: Option<&Path>,
    proxy: Option<&str>,
) -> Result<Vec<String>> {
    let root = if repo.request_sourced { None } else { root_dir };
    let mut client: Option<Client> = None;
    repo.gpgkeys
        .iter()
        .map(|key| key_text(key, root, repo, proxy, &mut client))
        .collect()
}

/// Resolve one key source to key text
fn key_text(
    key: &KeySource,
    root: Option<&Path>,
    repo: &RepoConfig,
    proxy: Option<&str>,
    client: &mut Option<Client>,
) -> Result<String> {
    match key {
        KeySource::Inline(text) => Ok(text.clone()),
        KeySource::Url(url) => {
            if let Some(path) = url.strip_prefix("file://") {
                let path = match root {
                    Some(root) => root.join(path.trim_start_matches('/')),
                    None => PathBuf::from(path),
                };
                fs::read_to_string(&path).map_err(|e| {
                    Error::GpgKeyRead(format!(
                        "Failed to read GPG key {}: {}",
                        path.display(),
                        e
                    ))
                })
            } else if url.starts_with("http://") || url.starts_with("https://") {
                if client.is_none() {
                    *client = Some(repo.http_client(proxy).map_err(|e| {
                        Error::GpgKeyRead(format!("Failed to fetch GPG key {}: {}", url, e))
                    })?);
                }
                let client = client.as_ref().expect("client was just built");

                // One GET, no retries; transient failures fail the request
                let response = client
                    .get(url)
                    .send()
                    .map_err(|e| Error::GpgKeyRead(format!("Failed to fetch GPG key {}: {}", url, e)))?;
                if !response.status().is_success() {
                    return Err(Error::GpgKeyRead(format!(
                        "Failed to fetch GPG key {}: HTTP {}",
                        url,
                        response.status()
                    )));
                }
                response
                    .text()
                    .map_err(|e| Error::GpgKeyRead(format!("Failed to read GPG key {}: {}", url, e)))
            } else {
                Err(Error::GpgKeyRead(format!(
                    "Unsupported GPG key URL scheme: {}",
                    url
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\
                       mQINBFzMWxkBEADHrskpBgN9OphmhRkc7P\n\
                       -----END PGP PUBLIC KEY BLOCK-----\n";

    fn test_repo(gpgkeys: Vec<KeySource>, request_sourced: bool) -> RepoConfig {
        RepoConfig {
            id: "baseos".to_string(),
            name: None,
            source: crate::repository::RepoSource::Baseurls(vec!["https://example.com".into()]),
            sslverify: None,
            sslcacert: None,
            sslclientkey: None,
            sslclientcert: None,
            gpgcheck: None,
            repo_gpgcheck: None,
            gpgkeys,
            key_urls: Vec::new(),
            metadata_expire: 20,
            module_hotfixes: None,
            request_sourced,
        }
    }

    #[test]
    fn test_classify_inline_vs_url() {
        assert_eq!(
            KeySource::classify(KEY.to_string()),
            KeySource::Inline(KEY.to_string())
        );
        assert_eq!(
            KeySource::classify("https://example.com/key.asc".to_string()),
            KeySource::Url("https://example.com/key.asc".to_string())
        );
        assert_eq!(
            KeySource::classify("file:///etc/pki/key.asc".to_string()),
            KeySource::Url("file:///etc/pki/key.asc".to_string())
        );
    }

    #[test]
    fn test_key_dir_mode() {
        let persist = TempDir::new().unwrap();
        let dir = key_dir(persist.path()).unwrap();
        assert!(dir.ends_with("gpgkeys"));
        let mode = fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_inline_keys_become_file_urls() {
        let persist = TempDir::new().unwrap();
        let dir = key_dir(persist.path()).unwrap();
        let keys = vec![
            KeySource::Inline(KEY.to_string()),
            KeySource::Url("https://example.com/key.asc".to_string()),
        ];

        let urls = sack_key_urls("baseos", &keys, &dir).unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].starts_with("file://"));
        assert_eq!(urls[1], "https://example.com/key.asc");

        let written = fs::read_to_string(urls[0].strip_prefix("file://").unwrap()).unwrap();
        assert_eq!(written, KEY);
    }

    #[test]
    fn test_inline_key_text_is_verbatim() {
        let repo = test_repo(vec![KeySource::Inline(KEY.to_string())], true);
        let texts = repo_key_texts(&repo, None, None).unwrap();
        assert_eq!(texts, vec![KEY.to_string()]);
    }

    #[test]
    fn test_file_url_read_with_root_prefix() {
        let root = TempDir::new().unwrap();
        let key_path = root.path().join("etc/pki/key.asc");
        fs::create_dir_all(key_path.parent().unwrap()).unwrap();
        fs::write(&key_path, KEY).unwrap();

        // Root-sourced repo: path re-anchored under the image root
        let repo = test_repo(
            vec![KeySource::Url("file:///etc/pki/key.asc".to_string())],
            false,
        );
        let texts = repo_key_texts(&repo, Some(root.path()), None).unwrap();
        assert_eq!(texts, vec![KEY.to_string()]);

        // Request-sourced repo: same URL is host-absolute and missing
        let repo = test_repo(
            vec![KeySource::Url("file:///etc/pki/key.asc".to_string())],
            true,
        );
        let err = repo_key_texts(&repo, Some(root.path()), None).unwrap_err();
        assert_eq!(err.kind(), "GPGKeyReadError");
        assert!(err.to_string().contains("/etc/pki/key.asc"));
    }

    #[test]
    fn test_unknown_scheme_is_rejected_at_read_time() {
        let repo = test_repo(
            vec![KeySource::Url("ftp://example.com/key.asc".to_string())],
            true,
        );
        let err = repo_key_texts(&repo, None, None).unwrap_err();
        assert_eq!(err.kind(), "GPGKeyReadError");

        // The same entry passes through untouched for sack purposes
        let persist = TempDir::new().unwrap();
        let dir = key_dir(persist.path()).unwrap();
        let urls = sack_key_urls("baseos", &repo.gpgkeys, &dir).unwrap();
        assert_eq!(urls, vec!["ftp://example.com/key.asc".to_string()]);
    }
}
