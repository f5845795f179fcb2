// src/response.rs

//! Wire response types and the single-document emitter
//!
//! Exactly one JSON document reaches stdout per invocation: the response
//! object on success, or `{"kind": ..., "reason": ...}` on failure. The
//! human-readable `"<Kind>: <reason>"` line goes to stderr only.

use crate::error::{Error, Result};
use crate::repository::{RepoConfig, RepoSource};
use crate::sack::Package;
use chrono::DateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

/// A package in a depsolve plan
#[derive(Debug, Serialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub repo_id: String,
    /// Repo-relative payload path
    pub path: String,
    /// Absolute URL at the mirror chosen during resolution
    pub remote_location: String,
    /// `<algo>:<hex>` as declared by the repository metadata
    pub checksum: String,
}

impl ResolvedPackage {
    pub fn from_package(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            epoch: pkg.epoch,
            version: pkg.version.clone(),
            release: pkg.release.clone(),
            arch: pkg.arch.clone(),
            repo_id: pkg.repo_id.clone(),
            path: pkg.location.clone(),
            remote_location: pkg.remote_location(),
            checksum: pkg.checksum.to_wire(),
        }
    }
}

/// Full package descriptor returned by `dump` and `search`
#[derive(Debug, Serialize)]
pub struct PackageInfo {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub url: String,
    pub repo_id: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// RFC 3339 UTC rendering of the build timestamp
    pub buildtime: String,
    pub license: String,
}

impl PackageInfo {
    pub fn from_package(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            summary: pkg.summary.clone(),
            description: pkg.description.clone(),
            url: pkg.url.clone(),
            repo_id: pkg.repo_id.clone(),
            epoch: pkg.epoch,
            version: pkg.version.clone(),
            release: pkg.release.clone(),
            arch: pkg.arch.clone(),
            buildtime: format_buildtime(pkg.buildtime),
            license: pkg.license.clone(),
        }
    }
}

fn format_buildtime(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Echo of a repository that sourced at least one resolved package
#[derive(Debug, Serialize)]
pub struct RepoEcho {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metalink: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrorlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslverify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslcacert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslclientkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslclientcert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpgcheck: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_gpgcheck: Option<bool>,
    /// Normalized to seconds; -1 means the metadata never expires
    pub metadata_expire: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_hotfixes: Option<bool>,
    /// Key bodies, never URLs or paths
    pub gpgkeys: Vec<String>,
}

impl RepoEcho {
    pub fn from_config(repo: &RepoConfig, gpgkeys: Vec<String>) -> Self {
        let (baseurl, metalink, mirrorlist) = match &repo.source {
            RepoSource::Baseurls(urls) => (Some(urls.clone()), None, None),
            RepoSource::Metalink(url) => (None, Some(url.clone()), None),
            RepoSource::Mirrorlist(url) => (None, None, Some(url.clone())),
        };
        Self {
            id: repo.id.clone(),
            name: repo.name.clone(),
            baseurl,
            metalink,
            mirrorlist,
            sslverify: repo.sslverify,
            sslcacert: repo.sslcacert.clone(),
            sslclientkey: repo.sslclientkey.clone(),
            sslclientcert: repo.sslclientcert.clone(),
            gpgcheck: repo.gpgcheck,
            repo_gpgcheck: repo.repo_gpgcheck,
            metadata_expire: repo.metadata_expire,
            module_hotfixes: repo.module_hotfixes,
            gpgkeys,
        }
    }
}

/// The single success document written to stdout
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// `depsolve`: the plan plus every repo that sourced a package
    Depsolve {
        packages: Vec<ResolvedPackage>,
        repos: BTreeMap<String, RepoEcho>,
    },
    /// `dump` and `search`
    PackageList { packages: Vec<PackageInfo> },
}

impl Response {
    pub fn depsolve(packages: &[&Package], repos: BTreeMap<String, RepoEcho>) -> Self {
        Response::Depsolve {
            packages: packages
                .iter()
                .map(|p| ResolvedPackage::from_package(p))
                .collect(),
            repos,
        }
    }

    pub fn package_list(packages: &[&Package]) -> Self {
        Response::PackageList {
            packages: packages
                .iter()
                .map(|p| PackageInfo::from_package(p))
                .collect(),
        }
    }
}

/// Tagged error document written to stdout on failure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub reason: String,
}

impl ErrorResponse {
    pub fn from_error(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Write the success document
pub fn write_success<W: Write>(out: &mut W, response: &Response) -> Result<()> {
    serde_json::to_writer(&mut *out, response)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Write the error document; the stderr diagnostic line is the caller's
pub fn write_error<W: Write>(out: &mut W, err: &Error) -> Result<()> {
    serde_json::to_writer(&mut *out, &ErrorResponse::from_error(err))?;
    out.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sack::Checksum;

    fn sample_package() -> Package {
        Package {
            name: "a".to_string(),
            epoch: 0,
            version: "1".to_string(),
            release: "1".to_string(),
            arch: "x86_64".to_string(),
            summary: "Package a".to_string(),
            license: "MIT".to_string(),
            buildtime: 86400,
            checksum: Checksum {
                algorithm: "sha256".to_string(),
                hex: "abcd".to_string(),
            },
            location: "Packages/a-1-1.x86_64.rpm".to_string(),
            repo_id: "baseos".to_string(),
            remote_base: "https://mirror/os".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolved_package_shape() {
        let resolved = ResolvedPackage::from_package(&sample_package());
        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["name"], "a");
        assert_eq!(value["epoch"], 0);
        assert_eq!(value["repo_id"], "baseos");
        assert_eq!(value["path"], "Packages/a-1-1.x86_64.rpm");
        assert_eq!(
            value["remote_location"],
            "https://mirror/os/Packages/a-1-1.x86_64.rpm"
        );
        assert_eq!(value["checksum"], "sha256:abcd");
    }

    #[test]
    fn test_buildtime_rfc3339() {
        assert_eq!(format_buildtime(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_buildtime(86400), "1970-01-02T00:00:00Z");
    }

    #[test]
    fn test_error_response_shape() {
        let err = Error::InvalidRequest("no 'repos' or 'root_dir' specified".to_string());
        let mut out = Vec::new();
        write_error(&mut out, &err).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["kind"], "InvalidRequest");
        assert_eq!(value["reason"], "no 'repos' or 'root_dir' specified");
    }

    #[test]
    fn test_exactly_one_document() {
        let mut out = Vec::new();
        let response = Response::package_list(&[]);
        write_success(&mut out, &response).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_ok());
    }
}
