// src/repository/mod.rs

//! Repository configuration loading
//!
//! This module materializes normalized repository objects from two places:
//! - repo descriptors supplied directly in the request (Phase A)
//! - `.repo` files found under an image root's `etc/yum.repos.d` (Phase B)
//!
//! Request-sourced repos are treated as host-absolute. Repos read from an
//! image root get their TLS key and certificate paths re-anchored under
//! that root, and URL variables (`$releasever`, `$basearch`, plus the
//! definitions in the root's vars directories) are substituted everywhere.

use crate::config::SackConfig;
use crate::error::{Error, Result};
use crate::gpg::KeySource;
use crate::request::{Arguments, RepoDescriptor};
use ini::Ini;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata re-validation window applied when a repo does not set one.
/// Deliberately short: a cheap revalidation per invocation instead of
/// stale metadata when repositories change between builds.
pub const DEFAULT_METADATA_EXPIRE: i64 = 20;

/// Where the remote metadata for a repository comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    /// Static mirror list, tried in order
    Baseurls(Vec<String>),
    /// Metalink XML document enumerating mirrors
    Metalink(String),
    /// Plain-text mirror list, one URL per line
    Mirrorlist(String),
}

/// Normalized repository configuration
#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub id: String,
    pub name: Option<String>,
    pub source: RepoSource,
    pub sslverify: Option<bool>,
    pub sslcacert: Option<String>,
    pub sslclientkey: Option<String>,
    pub sslclientcert: Option<String>,
    pub gpgcheck: Option<bool>,
    pub repo_gpgcheck: Option<bool>,
    pub gpgkeys: Vec<KeySource>,
    /// Engine-facing key-URL list: URL entries from `gpgkeys` plus a
    /// `file://` URI for every materialized inline key; filled once the
    /// inline keys are written to disk
    pub key_urls: Vec<String>,
    /// Seconds until cached metadata must be revalidated; -1 never expires
    pub metadata_expire: i64,
    pub module_hotfixes: Option<bool>,
    /// True for repos supplied in the request, false for repos read from
    /// the image root; decides path re-anchoring at key-read time
    pub request_sourced: bool,
}

impl RepoConfig {
    fn from_descriptor(desc: &RepoDescriptor, subst: &Substitutions) -> Result<Self> {
        let source = repo_source(
            desc.baseurl.as_deref(),
            desc.metalink.as_deref(),
            desc.mirrorlist.as_deref(),
            &desc.id,
            subst,
        )?;

        let mut gpgkeys = Vec::new();
        if let Some(key) = &desc.gpgkey {
            gpgkeys.push(KeySource::classify(subst.apply(key)));
        }
        for key in desc.gpgkeys.as_deref().unwrap_or(&[]) {
            gpgkeys.push(KeySource::classify(subst.apply(key)));
        }

        Ok(Self {
            id: desc.id.clone(),
            name: desc.name.clone(),
            source,
            sslverify: desc.sslverify,
            sslcacert: desc.sslcacert.clone(),
            sslclientkey: desc.sslclientkey.clone(),
            sslclientcert: desc.sslclientcert.clone(),
            gpgcheck: desc.gpgcheck,
            repo_gpgcheck: desc.repo_gpgcheck,
            gpgkeys,
            key_urls: Vec::new(),
            metadata_expire: desc
                .metadata_expire
                .as_deref()
                .map(parse_metadata_expire)
                .unwrap_or(DEFAULT_METADATA_EXPIRE),
            module_hotfixes: desc.module_hotfixes,
            request_sourced: true,
        })
    }

    /// HTTP client honoring this repo's TLS settings and the request proxy
    ///
    /// Used for metadata downloads and `http(s)` GPG key fetches alike;
    /// callers construct it only when a network URL actually comes up so
    /// purely local repositories never read the certificate files.
    pub fn http_client(&self, proxy: Option<&str>) -> Result<Client> {
        let mut builder = Client::builder().timeout(HTTP_TIMEOUT);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Repo(format!("Invalid proxy URL {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        if self.sslverify == Some(false) {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(cacert) = &self.sslcacert {
            let pem = fs::read(cacert)
                .map_err(|e| Error::Repo(format!("Failed to read CA cert {}: {}", cacert, e)))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::Repo(format!("Invalid CA cert {}: {}", cacert, e)))?;
            builder = builder.add_root_certificate(cert);
        }
        if let (Some(cert), Some(key)) = (&self.sslclientcert, &self.sslclientkey) {
            let pem = fs::read(cert)
                .map_err(|e| Error::Repo(format!("Failed to read client cert {}: {}", cert, e)))?;
            let key_pem = fs::read(key)
                .map_err(|e| Error::Repo(format!("Failed to read client key {}: {}", key, e)))?;
            let identity = reqwest::Identity::from_pkcs8_pem(&pem, &key_pem)
                .map_err(|e| Error::Repo(format!("Invalid client identity {}: {}", cert, e)))?;
            builder = builder.identity(identity);
        }

        builder.build().map_err(|e| {
            Error::Repo(format!(
                "Failed to create HTTP client for '{}': {}",
                self.id, e
            ))
        })
    }
}

/// Load all repositories for a request
///
/// Phase A materializes the request's repo descriptors. Phase B, only when
/// `root_dir` is set, loads every repo file under the root's
/// `etc/yum.repos.d`, skipping ids already claimed by the request.
pub fn load_repos(args: &Arguments, config: &SackConfig) -> Result<Vec<RepoConfig>> {
    let mut subst = Substitutions::new(&config.arch, &config.basearch, &config.releasever);
    if let Some(root) = &args.root_dir {
        subst.load_root_vars(Path::new(root));
    }

    let mut repos = Vec::new();
    for desc in &args.repos {
        repos.push(RepoConfig::from_descriptor(desc, &subst)?);
    }

    if let Some(root) = &args.root_dir {
        let request_ids: Vec<String> = repos.iter().map(|r| r.id.clone()).collect();
        for repo in load_root_repos(Path::new(root), &subst)? {
            if request_ids.iter().any(|id| id.as_str() == repo.id.as_str()) {
                debug!("Repo '{}' from image root shadowed by request", repo.id);
                continue;
            }
            repos.push(repo);
        }
    }

    info!("Loaded {} repositories", repos.len());
    Ok(repos)
}

/// Read every `.repo` file under `<root>/etc/yum.repos.d`
fn load_root_repos(root: &Path, subst: &Substitutions) -> Result<Vec<RepoConfig>> {
    let repos_dir = root.join("etc/yum.repos.d");
    let mut repos = Vec::new();

    if !repos_dir.is_dir() {
        debug!("No repos dir at {}", repos_dir.display());
        return Ok(repos);
    }

    let mut entries: Vec<PathBuf> = fs::read_dir(&repos_dir)
        .map_err(|e| Error::Repo(format!("Failed to list {}: {}", repos_dir.display(), e)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "repo"))
        .collect();
    entries.sort();

    for path in entries {
        repos.extend(parse_repo_file(&path, root, subst)?);
    }
    Ok(repos)
}

/// Parse one `.repo` file; each INI section is a repository
fn parse_repo_file(path: &Path, root: &Path, subst: &Substitutions) -> Result<Vec<RepoConfig>> {
    debug!("Parsing repo file {}", path.display());
    let ini = Ini::load_from_file(path)
        .map_err(|e| Error::Repo(format!("Failed to parse {}: {}", path.display(), e)))?;

    let mut repos = Vec::new();
    for (section, props) in ini.iter() {
        let id = match section {
            Some(id) => id.to_string(),
            None => continue,
        };

        if props.get("enabled").map(is_true) == Some(false) {
            debug!("Skipping disabled repo '{}'", id);
            continue;
        }

        let baseurls: Option<Vec<String>> = props
            .get("baseurl")
            .map(|v| v.split_whitespace().map(String::from).collect());
        let source = repo_source(
            baseurls.as_deref(),
            props.get("metalink"),
            props.get("mirrorlist"),
            &id,
            subst,
        )?;

        let gpgkeys = props
            .get("gpgkey")
            .map(|v| {
                v.split_whitespace()
                    .map(|k| KeySource::classify(subst.apply(k)))
                    .collect()
            })
            .unwrap_or_default();

        repos.push(RepoConfig {
            id,
            name: props.get("name").map(String::from),
            source,
            sslverify: props.get("sslverify").map(is_true),
            sslcacert: props.get("sslcacert").map(|p| reanchor(p, root)),
            sslclientkey: props.get("sslclientkey").map(|p| reanchor(p, root)),
            sslclientcert: props.get("sslclientcert").map(|p| reanchor(p, root)),
            gpgcheck: props.get("gpgcheck").map(is_true),
            repo_gpgcheck: props.get("repo_gpgcheck").map(is_true),
            gpgkeys,
            key_urls: Vec::new(),
            metadata_expire: props
                .get("metadata_expire")
                .map(parse_metadata_expire)
                .unwrap_or(DEFAULT_METADATA_EXPIRE),
            module_hotfixes: props.get("module_hotfixes").map(is_true),
            request_sourced: false,
        });
    }
    Ok(repos)
}

fn repo_source(
    baseurls: Option<&[String]>,
    metalink: Option<&str>,
    mirrorlist: Option<&str>,
    id: &str,
    subst: &Substitutions,
) -> Result<RepoSource> {
    let present = [
        baseurls.is_some(),
        metalink.is_some(),
        mirrorlist.is_some(),
    ];
    if present.iter().filter(|&&p| p).count() != 1 {
        return Err(Error::InvalidRequest(format!(
            "repo '{}' needs exactly one of 'baseurl', 'metalink', 'mirrorlist'",
            id
        )));
    }

    if let Some(urls) = baseurls {
        Ok(RepoSource::Baseurls(
            urls.iter().map(|u| subst.apply(u)).collect(),
        ))
    } else if let Some(url) = metalink {
        Ok(RepoSource::Metalink(subst.apply(url)))
    } else {
        Ok(RepoSource::Mirrorlist(subst.apply(mirrorlist.unwrap())))
    }
}

/// Prefix an absolute TLS path with the image root
fn reanchor(path: &str, root: &Path) -> String {
    if let Some(rel) = path.strip_prefix('/') {
        root.join(rel).to_string_lossy().into_owned()
    } else {
        path.to_string()
    }
}

fn is_true(value: &str) -> bool {
    value == "1" || value == "yes" || value == "true" || value == "on"
}

/// Parse a metadata-expire duration string into seconds
///
/// Accepts bare seconds, `N[smhd]` suffixes, and `-1`/`never` for no
/// expiry. Unparseable values fall back to the 20-second default.
pub fn parse_metadata_expire(value: &str) -> i64 {
    let value = value.trim();
    if value == "-1" || value.eq_ignore_ascii_case("never") {
        return -1;
    }
    let (digits, unit) = match value.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => value.split_at(idx),
        None => (value, ""),
    };
    let Ok(n) = digits.parse::<i64>() else {
        warn!("Unparseable metadata_expire {:?}, using default", value);
        return DEFAULT_METADATA_EXPIRE;
    };
    match unit {
        "" | "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        _ => {
            warn!("Unparseable metadata_expire {:?}, using default", value);
            DEFAULT_METADATA_EXPIRE
        }
    }
}

/// URL variable substitution
///
/// Seeded with `$arch`, `$basearch` and `$releasever`; an image root's
/// `etc/yum/vars` and `etc/dnf/vars` definitions are layered on top.
#[derive(Debug, Clone)]
pub struct Substitutions {
    vars: HashMap<String, String>,
}

impl Substitutions {
    pub fn new(arch: &str, basearch: &str, releasever: &str) -> Self {
        let mut vars = HashMap::new();
        vars.insert("arch".to_string(), arch.to_string());
        vars.insert("basearch".to_string(), basearch.to_string());
        vars.insert("releasever".to_string(), releasever.to_string());
        Self { vars }
    }

    /// Layer variable definitions from the image root's vars directories
    pub fn load_root_vars(&mut self, root: &Path) {
        for dir in ["etc/yum/vars", "etc/dnf/vars"] {
            let vars_dir = root.join(dir);
            let Ok(entries) = fs::read_dir(&vars_dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                match fs::read_to_string(&path) {
                    Ok(value) => {
                        self.vars
                            .insert(name.to_string(), value.trim_end().to_string());
                    }
                    Err(e) => warn!("Ignoring unreadable var file {}: {}", path.display(), e),
                }
            }
        }
    }

    /// Replace `$name` and `${name}` occurrences
    pub fn apply(&self, input: &str) -> String {
        let mut out = input.to_string();
        // Longest names first so overlapping variable names resolve
        // against the most specific definition
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        for name in names {
            let value = &self.vars[name];
            out = out.replace(&format!("${{{}}}", name), value);
            out = out.replace(&format!("${}", name), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn subst() -> Substitutions {
        Substitutions::new("x86_64", "x86_64", "9")
    }

    fn descriptor(json: serde_json::Value) -> RepoDescriptor {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_exactly_one_source_required() {
        let desc = descriptor(serde_json::json!({"id": "broken"}));
        let err = RepoConfig::from_descriptor(&desc, &subst()).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");

        let desc = descriptor(serde_json::json!({
            "id": "broken",
            "baseurl": ["https://a"],
            "metalink": "https://b"
        }));
        assert!(RepoConfig::from_descriptor(&desc, &subst()).is_err());
    }

    #[test]
    fn test_descriptor_defaults() {
        let desc = descriptor(serde_json::json!({
            "id": "baseos",
            "baseurl": ["https://example.com/$releasever/$basearch/os"]
        }));
        let repo = RepoConfig::from_descriptor(&desc, &subst()).unwrap();
        assert_eq!(repo.metadata_expire, DEFAULT_METADATA_EXPIRE);
        assert!(repo.request_sourced);
        assert_eq!(
            repo.source,
            RepoSource::Baseurls(vec!["https://example.com/9/x86_64/os".to_string()])
        );
    }

    #[test]
    fn test_metadata_expire_parsing() {
        assert_eq!(parse_metadata_expire("20s"), 20);
        assert_eq!(parse_metadata_expire("90"), 90);
        assert_eq!(parse_metadata_expire("5m"), 300);
        assert_eq!(parse_metadata_expire("6h"), 21600);
        assert_eq!(parse_metadata_expire("2d"), 172800);
        assert_eq!(parse_metadata_expire("-1"), -1);
        assert_eq!(parse_metadata_expire("never"), -1);
        assert_eq!(parse_metadata_expire("soon"), DEFAULT_METADATA_EXPIRE);
    }

    #[test]
    fn test_substitution_from_vars_dir() {
        let root = TempDir::new().unwrap();
        let vars = root.path().join("etc/dnf/vars");
        std::fs::create_dir_all(&vars).unwrap();
        std::fs::write(vars.join("contentdir"), "pub/rocky\n").unwrap();

        let mut subst = subst();
        subst.load_root_vars(root.path());
        assert_eq!(
            subst.apply("https://mirror/$contentdir/$releasever"),
            "https://mirror/pub/rocky/9"
        );
        assert_eq!(
            subst.apply("https://mirror/${basearch}/os"),
            "https://mirror/x86_64/os"
        );
    }

    #[test]
    fn test_root_repo_file_loading() {
        let root = TempDir::new().unwrap();
        let repos_d = root.path().join("etc/yum.repos.d");
        std::fs::create_dir_all(&repos_d).unwrap();
        std::fs::write(
            repos_d.join("x.repo"),
            "[appstream]\n\
             name=AppStream\n\
             baseurl=https://example.com/$releasever/appstream\n\
             sslcacert=/etc/pki/ca.pem\n\
             gpgcheck=1\n\
             metadata_expire=6h\n\
             \n\
             [disabled]\n\
             baseurl=https://example.com/disabled\n\
             enabled=0\n",
        )
        .unwrap();

        let repos = load_root_repos(root.path(), &subst()).unwrap();
        assert_eq!(repos.len(), 1);
        let repo = &repos[0];
        assert_eq!(repo.id, "appstream");
        assert!(!repo.request_sourced);
        assert_eq!(repo.gpgcheck, Some(true));
        assert_eq!(repo.metadata_expire, 21600);
        assert_eq!(
            repo.source,
            RepoSource::Baseurls(vec!["https://example.com/9/appstream".to_string()])
        );
        // Absolute TLS paths are re-anchored under the image root
        assert_eq!(
            repo.sslcacert.as_deref(),
            Some(root.path().join("etc/pki/ca.pem").to_str().unwrap())
        );
    }

    #[test]
    fn test_request_repo_shadows_root_repo() {
        let root = TempDir::new().unwrap();
        let repos_d = root.path().join("etc/yum.repos.d");
        std::fs::create_dir_all(&repos_d).unwrap();
        std::fs::write(
            repos_d.join("a.repo"),
            "[baseos]\nbaseurl=https://from-root/baseos\n",
        )
        .unwrap();

        let args = crate::request::Arguments {
            repos: vec![descriptor(serde_json::json!({
                "id": "baseos",
                "baseurl": ["https://from-request/baseos"]
            }))],
            root_dir: Some(root.path().to_str().unwrap().to_string()),
            ..Default::default()
        };
        let config = crate::config::SackConfig::new(
            "x86_64",
            "9",
            "platform:el9",
            None,
            std::path::PathBuf::from("/tmp/cache"),
        );

        let repos = load_repos(&args, &config).unwrap();
        assert_eq!(repos.len(), 1);
        assert!(repos[0].request_sourced);
        assert_eq!(
            repos[0].source,
            RepoSource::Baseurls(vec!["https://from-request/baseos".to_string()])
        );
    }
}
