// src/config.rs

//! Cache directory resolution and metadata engine configuration
//!
//! The cache root is decided exactly once per request. A privileged caller
//! can lock it via the `OVERWRITE_CACHE_DIR` environment variable, in which
//! case the request's `cachedir` is ignored and the cache is partitioned
//! per architecture underneath the override.

use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Environment variable locking the cache root
pub const CACHE_DIR_OVERRIDE_ENV: &str = "OVERWRITE_CACHE_DIR";

/// Resolve the metadata cache root for this request
pub fn resolve_cache_dir(request_cachedir: Option<&str>, arch: &str) -> Result<PathBuf> {
    let override_dir = env::var(CACHE_DIR_OVERRIDE_ENV).ok();
    resolve_cache_dir_with(override_dir.as_deref(), request_cachedir, arch)
}

/// Cache root resolution with an explicit override value
///
/// A non-empty override wins unconditionally and appends `/<arch>` so that
/// concurrent invocations for different architectures never share metadata.
pub fn resolve_cache_dir_with(
    override_dir: Option<&str>,
    request_cachedir: Option<&str>,
    arch: &str,
) -> Result<PathBuf> {
    let root = match override_dir {
        Some(dir) if !dir.is_empty() => {
            debug!("Cache dir locked by environment: {}", dir);
            PathBuf::from(dir).join(arch)
        }
        _ => match request_cachedir {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => return Err(Error::Config("No cache dir set".to_string())),
        },
    };
    debug!("Using cache dir: {}", root.display());
    Ok(root)
}

/// Configuration handed to the metadata engine when constructing a sack
///
/// There is no process-wide engine state; everything the engine needs to
/// know travels in this struct.
#[derive(Debug, Clone)]
pub struct SackConfig {
    pub arch: String,
    pub basearch: String,
    pub releasever: String,
    pub module_platform_id: String,
    pub proxy: Option<String>,
    pub cache_root: PathBuf,
    /// Partial-range metadata downloads; disabled to keep cache reuse
    /// across architectures from degenerating into slow range requests
    pub zchunk: bool,
    /// Bias mirror selection by response latency
    pub fastest_mirror: bool,
}

impl SackConfig {
    pub fn new(
        arch: &str,
        releasever: &str,
        module_platform_id: &str,
        proxy: Option<String>,
        cache_root: PathBuf,
    ) -> Self {
        Self {
            arch: arch.to_string(),
            basearch: basearch(arch).to_string(),
            releasever: releasever.to_string(),
            module_platform_id: module_platform_id.to_string(),
            proxy,
            cache_root,
            zchunk: false,
            fastest_mirror: true,
        }
    }

    /// True when `pkg_arch` is installable on the configured architecture
    pub fn arch_compatible(&self, pkg_arch: &str) -> bool {
        pkg_arch == "noarch" || pkg_arch == self.arch || basearch(pkg_arch) == self.basearch
    }
}

/// Map a concrete architecture to its repository base architecture
pub fn basearch(arch: &str) -> &str {
    match arch {
        "i386" | "i486" | "i586" | "i686" | "athlon" => "i386",
        "amd64" => "x86_64",
        "armv5tel" | "armv6l" | "armv7l" => "arm",
        "armv6hl" | "armv7hl" | "armv7hnl" => "armhfp",
        "ppc64le" | "ppc64" | "ppc" => arch,
        _ => arch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_request() {
        let dir =
            resolve_cache_dir_with(Some("/var/cache/solver"), Some("/tmp/mine"), "x86_64").unwrap();
        assert_eq!(dir, PathBuf::from("/var/cache/solver/x86_64"));
    }

    #[test]
    fn test_override_is_arch_partitioned() {
        let a = resolve_cache_dir_with(Some("/c"), None, "x86_64").unwrap();
        let b = resolve_cache_dir_with(Some("/c"), None, "aarch64").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_request_cachedir_used_without_override() {
        let dir = resolve_cache_dir_with(None, Some("/tmp/mine"), "x86_64").unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/mine"));

        let dir = resolve_cache_dir_with(Some(""), Some("/tmp/mine"), "x86_64").unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/mine"));
    }

    #[test]
    fn test_no_cache_dir_is_an_error() {
        let err = resolve_cache_dir_with(None, None, "x86_64").unwrap_err();
        assert_eq!(err.kind(), "Error");
        assert_eq!(err.to_string(), "No cache dir set");

        let err = resolve_cache_dir_with(None, Some(""), "x86_64").unwrap_err();
        assert_eq!(err.to_string(), "No cache dir set");
    }

    #[test]
    fn test_basearch_mapping() {
        assert_eq!(basearch("x86_64"), "x86_64");
        assert_eq!(basearch("i686"), "i386");
        assert_eq!(basearch("armv7hl"), "armhfp");
        assert_eq!(basearch("aarch64"), "aarch64");
    }

    #[test]
    fn test_arch_compatibility() {
        let config = SackConfig::new(
            "x86_64",
            "9",
            "platform:el9",
            None,
            PathBuf::from("/tmp/cache"),
        );
        assert!(config.arch_compatible("x86_64"));
        assert!(config.arch_compatible("noarch"));
        assert!(!config.arch_compatible("aarch64"));
        assert!(!config.zchunk);
        assert!(config.fastest_mirror);
    }
}
