// src/sack/mod.rs

//! Metadata sack: a queryable index of repository metadata
//!
//! For each configured repository the sack resolves a mirror, downloads
//! `repodata/repomd.xml` and the primary metadata it points at, and parses
//! the result into an in-memory package index. Downloaded metadata is
//! cached on disk per repository and reused within the repo's
//! `metadata_expire` window.

pub mod package;

pub use package::{Checksum, Package};

use crate::config::SackConfig;
use crate::error::{Error, Result};
use crate::repository::{RepoConfig, RepoSource};
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::blocking::Client;
use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cached file names under `<cacheroot>/<repo_id>/`
const CACHE_REPOMD: &str = "repomd.xml";
const CACHE_PRIMARY: &str = "primary.xml";
const CACHE_MIRROR: &str = "mirror";

/// In-memory package index over all configured repositories
pub struct Sack {
    config: SackConfig,
    packages: Vec<Package>,
}

impl Sack {
    /// Load metadata for every repo into a fresh sack
    ///
    /// Packages whose architecture is incompatible with the configured
    /// one are dropped at load time.
    pub fn load(config: SackConfig, repos: &[RepoConfig]) -> Result<Sack> {
        let mut packages = Vec::new();
        for repo in repos {
            let fetcher = Fetcher::new(repo, config.proxy.as_deref());
            let mut pkgs = load_repo(&config, &fetcher, repo)?;
            pkgs.retain(|p| config.arch_compatible(&p.arch));
            info!("Loaded {} packages from repo '{}'", pkgs.len(), repo.id);
            packages.append(&mut pkgs);
        }
        Ok(Sack { config, packages })
    }

    /// Construct a sack over an already-built package index
    ///
    /// This is the engine boundary used by tests and alternate metadata
    /// sources; no arch filtering is applied.
    pub fn with_packages(config: SackConfig, packages: Vec<Package>) -> Sack {
        Sack { config, packages }
    }

    pub fn config(&self) -> &SackConfig {
        &self.config
    }

    /// Every available package, in repository load order
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }
}

/// Fetches metadata for one repository
///
/// `file://` URLs are served straight from disk; the TLS-configured HTTP
/// client is built on first network use so purely local repositories
/// never touch the repo's certificate files.
struct Fetcher<'a> {
    repo: &'a RepoConfig,
    proxy: Option<&'a str>,
    client: RefCell<Option<Client>>,
}

impl<'a> Fetcher<'a> {
    fn new(repo: &'a RepoConfig, proxy: Option<&'a str>) -> Self {
        Self {
            repo,
            proxy,
            client: RefCell::new(None),
        }
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            return fs::read(path)
                .map_err(|e| Error::Repo(format!("Failed to read {}: {}", url, e)));
        }

        let mut slot = self.client.borrow_mut();
        if slot.is_none() {
            *slot = Some(self.repo.http_client(self.proxy)?);
        }
        let client = slot.as_ref().expect("client was just built");

        let response = client
            .get(url)
            .send()
            .map_err(|e| Error::Repo(format!("Failed to download {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Repo(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| Error::Repo(format!("Failed to read {}: {}", url, e)))
    }

    fn fetch_string(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url)?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Repo(format!("Invalid UTF-8 in {}: {}", url, e)))
    }
}

/// Load one repository's package list, from cache when still fresh
fn load_repo(config: &SackConfig, fetcher: &Fetcher, repo: &RepoConfig) -> Result<Vec<Package>> {
    let cache_dir = config.cache_root.join(&repo.id);
    let repomd_path = cache_dir.join(CACHE_REPOMD);
    let primary_path = cache_dir.join(CACHE_PRIMARY);
    let mirror_path = cache_dir.join(CACHE_MIRROR);

    if cache_is_fresh(&repomd_path, repo.metadata_expire)
        && primary_path.exists()
        && mirror_path.exists()
    {
        debug!("Using cached metadata for repo '{}'", repo.id);
        let primary = fs::read_to_string(&primary_path).map_err(|e| {
            Error::Repo(format!("Failed to read cached metadata for '{}': {}", repo.id, e))
        })?;
        let base = fs::read_to_string(&mirror_path)
            .map_err(|e| {
                Error::Repo(format!("Failed to read cached mirror for '{}': {}", repo.id, e))
            })?
            .trim()
            .to_string();
        return parse_primary(&primary, &repo.id, &base);
    }

    let base = resolve_mirror(fetcher, repo, config.fastest_mirror)?;
    debug!("Repo '{}' resolved to mirror {}", repo.id, base);

    let repomd_url = format!("{}/repodata/repomd.xml", base.trim_end_matches('/'));
    let repomd = fetcher.fetch_string(&repomd_url)?;
    let location = parse_repomd(&repomd)?.ok_or_else(|| {
        Error::Repo(format!("No primary metadata listed in {}", repomd_url))
    })?;

    let primary_url = format!("{}/{}", base.trim_end_matches('/'), location);
    let raw = fetcher.fetch_bytes(&primary_url)?;
    let primary = decompress(&raw, &location)?;

    // Cache writes are best-effort; a read-only cache never fails a request
    if let Err(e) = write_cache(&cache_dir, &repomd, &primary, &base) {
        warn!("Failed to cache metadata for '{}': {}", repo.id, e);
    }

    parse_primary(&primary, &repo.id, &base)
}

fn write_cache(cache_dir: &Path, repomd: &str, primary: &str, base: &str) -> std::io::Result<()> {
    fs::create_dir_all(cache_dir)?;
    fs::write(cache_dir.join(CACHE_PRIMARY), primary)?;
    fs::write(cache_dir.join(CACHE_MIRROR), base)?;
    // repomd.xml last: its mtime is the freshness marker
    fs::write(cache_dir.join(CACHE_REPOMD), repomd)
}

fn cache_is_fresh(repomd_path: &Path, metadata_expire: i64) -> bool {
    if metadata_expire < 0 {
        return repomd_path.exists();
    }
    fs::metadata(repomd_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .map(|age| age.as_secs() < metadata_expire as u64)
        .unwrap_or(false)
}

/// Pick the mirror base URL for a repository
fn resolve_mirror(fetcher: &Fetcher, repo: &RepoConfig, fastest_mirror: bool) -> Result<String> {
    match &repo.source {
        RepoSource::Baseurls(urls) => {
            let first = urls.first().ok_or_else(|| {
                Error::Repo(format!("Repo '{}' has an empty baseurl list", repo.id))
            })?;
            if urls.len() == 1 || !fastest_mirror {
                return Ok(first.clone());
            }
            // First mirror to answer the metadata probe wins
            for url in urls {
                if probe(fetcher, url) {
                    return Ok(url.clone());
                }
            }
            Err(Error::Repo(format!(
                "No responsive mirror for repo '{}'",
                repo.id
            )))
        }
        RepoSource::Metalink(url) => {
            let text = fetcher.fetch_string(url)?;
            let mirrors = parse_metalink(&text)?;
            let first = mirrors.first().ok_or_else(|| {
                Error::Repo(format!("No usable mirrors in metalink for '{}'", repo.id))
            })?;
            // Metalink URLs point at repomd.xml itself
            Ok(first
                .strip_suffix("/repodata/repomd.xml")
                .unwrap_or(first)
                .to_string())
        }
        RepoSource::Mirrorlist(url) => {
            let text = fetcher.fetch_string(url)?;
            text.lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from)
                .ok_or_else(|| {
                    Error::Repo(format!("Empty mirrorlist for repo '{}'", repo.id))
                })
        }
    }
}

fn probe(fetcher: &Fetcher, base: &str) -> bool {
    let url = format!("{}/repodata/repomd.xml", base.trim_end_matches('/'));
    fetcher.fetch_bytes(&url).is_ok()
}

/// Decompress primary metadata based on the location extension
fn decompress(raw: &[u8], location: &str) -> Result<String> {
    if location.ends_with(".gz") {
        let mut gz = GzDecoder::new(raw);
        let mut out = String::new();
        gz.read_to_string(&mut out)
            .map_err(|e| Error::Repo(format!("Failed to decompress {}: {}", location, e)))?;
        Ok(out)
    } else if location.ends_with(".zst") {
        let bytes = zstd::decode_all(raw)
            .map_err(|e| Error::Repo(format!("Failed to decompress {}: {}", location, e)))?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Repo(format!("Invalid UTF-8 in {}: {}", location, e)))
    } else if location.ends_with(".xz") || location.ends_with(".bz2") {
        Err(Error::Repo(format!(
            "Unsupported metadata compression: {}",
            location
        )))
    } else {
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::Repo(format!("Invalid UTF-8 in {}: {}", location, e)))
    }
}

fn attr_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Find the primary metadata location in a repomd.xml document
///
/// Only plain `primary` data is considered; zchunk variants are never
/// selected.
fn parse_repomd(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;
    let mut location = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"data" => {
                in_primary = attr_value(&e, b"type").as_deref() == Some("primary");
            }
            Ok(Event::Start(e) | Event::Empty(e))
                if e.name().as_ref() == b"location" && in_primary =>
            {
                location = attr_value(&e, b"href");
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"data" => {
                in_primary = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Repo(format!("Failed to parse repomd.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(location)
}

/// Dependency list currently being filled while walking a `<format>` block
#[derive(Clone, Copy, PartialEq, Eq)]
enum DepKind {
    Requires,
    Provides,
    Recommends,
}

/// Parse primary.xml into package records
fn parse_primary(xml: &str, repo_id: &str, remote_base: &str) -> Result<Vec<Package>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<PackageBuilder> = None;
    let mut current_tag = String::new();
    let mut dep_kind: Option<DepKind> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "package" => current = Some(PackageBuilder::default()),
                    "rpm:requires" | "requires" => dep_kind = Some(DepKind::Requires),
                    "rpm:provides" | "provides" => dep_kind = Some(DepKind::Provides),
                    "rpm:recommends" | "recommends" => dep_kind = Some(DepKind::Recommends),
                    _ => handle_attrs(&e, &tag, &mut current),
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "rpm:entry" || tag == "entry" {
                    if let (Some(kind), Some(pkg)) = (dep_kind, current.as_mut()) {
                        if let Some(name) = attr_value(&e, b"name") {
                            pkg.add_dependency(kind, name);
                        }
                    }
                } else {
                    handle_attrs(&e, &tag, &mut current);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(pkg) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_tag.as_str() {
                        "name" => pkg.name = Some(text),
                        "arch" => pkg.arch = Some(text),
                        "summary" => pkg.summary = text,
                        "description" => pkg.description = text,
                        "url" => pkg.url = text,
                        "checksum" => pkg.checksum_hex = Some(text),
                        "rpm:license" => pkg.license = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                match e.name().as_ref() {
                    b"package" => {
                        if let Some(builder) = current.take() {
                            match builder.build(repo_id, remote_base) {
                                Ok(pkg) => packages.push(pkg),
                                Err(e) => warn!("Skipping malformed package entry: {}", e),
                            }
                        }
                    }
                    b"rpm:requires" | b"requires" | b"rpm:provides" | b"provides"
                    | b"rpm:recommends" | b"recommends" => dep_kind = None,
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Repo(format!("Failed to parse primary.xml: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

fn handle_attrs(e: &BytesStart, tag: &str, current: &mut Option<PackageBuilder>) {
    let Some(pkg) = current.as_mut() else {
        return;
    };
    match tag {
        "version" => {
            pkg.epoch = attr_value(e, b"epoch");
            pkg.ver = attr_value(e, b"ver");
            pkg.rel = attr_value(e, b"rel");
        }
        "checksum" => pkg.checksum_type = attr_value(e, b"type"),
        "time" => pkg.buildtime = attr_value(e, b"build"),
        "location" => pkg.location = attr_value(e, b"href"),
        _ => {}
    }
}

/// Accumulates one `<package>` element during the primary.xml walk
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    summary: String,
    description: String,
    url: String,
    license: String,
    buildtime: Option<String>,
    checksum_type: Option<String>,
    checksum_hex: Option<String>,
    location: Option<String>,
    requires: Vec<String>,
    provides: Vec<String>,
    recommends: Vec<String>,
}

impl PackageBuilder {
    fn add_dependency(&mut self, kind: DepKind, name: String) {
        // rpmlib() capabilities and file dependencies are satisfied by
        // the runtime, not by other packages
        if name.starts_with("rpmlib(") || name.starts_with('/') {
            return;
        }
        match kind {
            DepKind::Requires => self.requires.push(name),
            DepKind::Provides => self.provides.push(name),
            DepKind::Recommends => self.recommends.push(name),
        }
    }

    fn build(self, repo_id: &str, remote_base: &str) -> Result<Package> {
        let name = self
            .name
            .ok_or_else(|| Error::Repo("Missing package name".to_string()))?;
        let version = self
            .ver
            .ok_or_else(|| Error::Repo(format!("Missing version for '{}'", name)))?;
        let release = self
            .rel
            .ok_or_else(|| Error::Repo(format!("Missing release for '{}'", name)))?;
        let arch = self
            .arch
            .ok_or_else(|| Error::Repo(format!("Missing arch for '{}'", name)))?;
        let location = self
            .location
            .ok_or_else(|| Error::Repo(format!("Missing location for '{}'", name)))?;
        let hex = self
            .checksum_hex
            .ok_or_else(|| Error::Repo(format!("Missing checksum for '{}'", name)))?;

        let epoch = match self.epoch.as_deref() {
            None | Some("") => 0,
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Repo(format!("Invalid epoch for '{}': {}", name, e)))?,
        };
        let buildtime = self
            .buildtime
            .as_deref()
            .unwrap_or("0")
            .parse()
            .unwrap_or(0);

        Ok(Package {
            name,
            epoch,
            version,
            release,
            arch,
            summary: self.summary,
            description: self.description,
            url: self.url,
            license: self.license,
            buildtime,
            checksum: Checksum {
                algorithm: self
                    .checksum_type
                    .as_deref()
                    .unwrap_or("sha256")
                    .to_lowercase(),
                hex,
            },
            location,
            repo_id: repo_id.to_string(),
            remote_base: remote_base.to_string(),
            requires: self.requires,
            provides: self.provides,
            recommends: self.recommends,
        })
    }
}

/// Parse a metalink document into an ordered mirror list
///
/// Entries are ordered by declared preference; https mirrors are tried
/// before http ones.
fn parse_metalink(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut entries: Vec<(i32, String)> = Vec::new();
    let mut pending: Option<i32> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"url" => {
                let protocol = attr_value(&e, b"protocol");
                let preference = attr_value(&e, b"preference")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0);
                pending = match protocol.as_deref() {
                    Some("https") => Some(preference + 1000),
                    Some("http") => Some(preference),
                    _ => None,
                };
            }
            Ok(Event::Text(e)) => {
                if let Some(score) = pending.take() {
                    let url = e.unescape().unwrap_or_default().trim().to_string();
                    if !url.is_empty() {
                        entries.push((score, url));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Repo(format!("Failed to parse metalink: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    entries.sort_by_key(|(score, _)| std::cmp::Reverse(*score));
    Ok(entries.into_iter().map(|(_, url)| url).collect())
}
