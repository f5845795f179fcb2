// src/query.rs

//! Package queries: `dump` and `search`
//!
//! `dump` enumerates every available package. `search` filters by name
//! patterns whose semantics depend on their shape: a bare name matches
//! exactly, `*text*` matches as a substring, and any other `*` pattern is
//! a glob.

use crate::error::{Error, Result};
use crate::sack::{Package, Sack};
use glob::Pattern;
use tracing::debug;

/// How a single search pattern matches package names
enum NameFilter {
    Exact(String),
    Substring(String),
    Glob(Pattern),
}

impl NameFilter {
    fn parse(pattern: &str) -> Result<NameFilter> {
        if !pattern.contains('*') {
            Ok(NameFilter::Exact(pattern.to_string()))
        } else if pattern.len() >= 2 && pattern.starts_with('*') && pattern.ends_with('*') {
            Ok(NameFilter::Substring(
                pattern[1..pattern.len() - 1].to_string(),
            ))
        } else {
            let glob = Pattern::new(pattern).map_err(|e| {
                Error::InvalidRequest(format!("invalid package pattern {:?}: {}", pattern, e))
            })?;
            Ok(NameFilter::Glob(glob))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Exact(exact) => name == exact,
            NameFilter::Substring(text) => name.contains(text.as_str()),
            NameFilter::Glob(glob) => glob.matches(name),
        }
    }
}

/// Every available package in the sack
pub fn dump(sack: &Sack) -> Vec<&Package> {
    sack.packages().iter().collect()
}

/// Filter available packages by name patterns
///
/// Results are concatenated in pattern order; duplicates across patterns
/// are kept. With `latest`, each matched name is reduced to its highest
/// NEVRA.
pub fn search<'a>(sack: &'a Sack, patterns: &[String], latest: bool) -> Result<Vec<&'a Package>> {
    let mut results = Vec::new();
    for pattern in patterns {
        let filter = NameFilter::parse(pattern)?;
        let mut matched: Vec<&Package> = sack
            .packages()
            .iter()
            .filter(|p| filter.matches(&p.name))
            .collect();
        if latest {
            matched = reduce_to_latest(matched);
        }
        debug!("Pattern {:?} matched {} packages", pattern, matched.len());
        results.extend(matched);
    }
    Ok(results)
}

/// Keep only the highest-versioned package per name, preserving the
/// order in which names first appear
fn reduce_to_latest(packages: Vec<&Package>) -> Vec<&Package> {
    let mut latest: Vec<&Package> = Vec::new();
    for pkg in packages {
        match latest.iter_mut().find(|p| p.name == pkg.name) {
            Some(seen) => {
                if pkg.compare_version(*seen).is_gt() {
                    *seen = pkg;
                }
            }
            None => latest.push(pkg),
        }
    }
    latest
}
