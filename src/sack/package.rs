// src/sack/package.rs

//! Package records held by the metadata sack

use crate::version::compare_evr;
use std::cmp::Ordering;

/// Package checksum as declared by the repository metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksum {
    /// Algorithm name, lowercased ("sha256", "sha512", ...)
    pub algorithm: String,
    pub hex: String,
}

impl Checksum {
    /// Wire rendering: `<algo>:<hex>`
    pub fn to_wire(&self) -> String {
        format!("{}:{}", self.algorithm, self.hex)
    }
}

/// One available package in the sack
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub summary: String,
    pub description: String,
    pub url: String,
    pub license: String,
    /// Unix timestamp of the package build
    pub buildtime: i64,
    pub checksum: Checksum,
    /// Repo-relative payload path from the metadata `location` element
    pub location: String,
    pub repo_id: String,
    /// Mirror base URL chosen when this repo's metadata was resolved
    pub remote_base: String,
    /// Capability names this package requires
    pub requires: Vec<String>,
    /// Capability names this package provides (its own name is implicit)
    pub provides: Vec<String>,
    /// Weak dependencies, honored only when a transaction asks for them
    pub recommends: Vec<String>,
}

impl Package {
    /// Canonical NEVRA identity; the epoch appears only when non-zero
    pub fn nevra(&self) -> String {
        if self.epoch > 0 {
            format!(
                "{}-{}:{}-{}.{}",
                self.name, self.epoch, self.version, self.release, self.arch
            )
        } else {
            format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
        }
    }

    /// Order two packages by (epoch, version, release)
    pub fn compare_version(&self, other: &Package) -> Ordering {
        compare_evr(
            (self.epoch, &self.version, &self.release),
            (other.epoch, &other.version, &other.release),
        )
    }

    /// True when this package satisfies the named capability
    pub fn provides_capability(&self, capability: &str) -> bool {
        self.name == capability || self.provides.iter().any(|p| p == capability)
    }

    /// Absolute download URL at the mirror chosen during resolution
    pub fn remote_location(&self) -> String {
        format!(
            "{}/{}",
            self.remote_base.trim_end_matches('/'),
            self.location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, epoch: u32, version: &str, release: &str) -> Package {
        Package {
            name: name.to_string(),
            epoch,
            version: version.to_string(),
            release: release.to_string(),
            arch: "x86_64".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_nevra_rendering() {
        assert_eq!(pkg("vim", 0, "9.0", "1.el9").nevra(), "vim-9.0-1.el9.x86_64");
        assert_eq!(
            pkg("openssl", 1, "3.0.7", "2.el9").nevra(),
            "openssl-1:3.0.7-2.el9.x86_64"
        );
    }

    #[test]
    fn test_version_ordering() {
        assert_eq!(
            pkg("kernel", 0, "5.2", "1").compare_version(&pkg("kernel", 0, "5.1", "1")),
            Ordering::Greater
        );
        assert_eq!(
            pkg("kernel", 0, "5.1", "1").compare_version(&pkg("kernel", 1, "1.0", "1")),
            Ordering::Less
        );
    }

    #[test]
    fn test_provides_capability() {
        let mut a = pkg("a", 0, "1", "1");
        a.provides = vec!["libfoo".to_string()];
        assert!(a.provides_capability("a"));
        assert!(a.provides_capability("libfoo"));
        assert!(!a.provides_capability("libbar"));
    }

    #[test]
    fn test_remote_location_joins_mirror_and_path() {
        let mut a = pkg("a", 0, "1", "1");
        a.remote_base = "https://mirror.example.com/baseos/".to_string();
        a.location = "Packages/a/a-1-1.x86_64.rpm".to_string();
        assert_eq!(
            a.remote_location(),
            "https://mirror.example.com/baseos/Packages/a/a-1-1.x86_64.rpm"
        );
        assert_eq!(
            Checksum {
                algorithm: "sha256".to_string(),
                hex: "ab12".to_string()
            }
            .to_wire(),
            "sha256:ab12"
        );
    }
}
