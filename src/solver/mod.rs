// src/solver/mod.rs

//! Transaction resolution
//!
//! `depsolve` folds over the request's transactions in order. Each step
//! starts from a fresh goal but seeds it with everything the previous
//! step resolved, marked as installed, so later transactions solve
//! against the cumulative image instead of an empty root. The final
//! step's install set is the plan.

use crate::error::{Error, Result};
use crate::request::TransactionRequest;
use crate::sack::{Package, Sack};
use glob::Pattern;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Resolve a sequence of transactions against the sack
///
/// Returns the final transaction's resolved packages in the order the
/// resolver selected them: carried-over installs first, then requested
/// packages and their dependencies in discovery order.
pub fn depsolve<'a>(
    sack: &'a Sack,
    transactions: &[TransactionRequest],
) -> Result<Vec<&'a Package>> {
    let all_specs: Vec<String> = transactions
        .iter()
        .flat_map(|t| t.package_specs.iter().cloned())
        .collect();

    let mut installed: Vec<&Package> = Vec::new();
    for (idx, transaction) in transactions.iter().enumerate() {
        debug!(
            "Resolving transaction {}/{} ({} specs)",
            idx + 1,
            transactions.len(),
            transaction.package_specs.len()
        );
        installed = resolve_transaction(sack, transaction, &installed, &all_specs)?;
    }

    info!("Depsolve produced {} packages", installed.len());
    Ok(installed)
}

/// Resolve one transaction on top of the given installed set
fn resolve_transaction<'a>(
    sack: &'a Sack,
    transaction: &TransactionRequest,
    previously_installed: &[&'a Package],
    all_specs: &[String],
) -> Result<Vec<&'a Package>> {
    let excludes = compile_specs(&transaction.exclude_specs)?;
    let allowed_repos: Option<HashSet<&str>> = transaction
        .repo_ids
        .as_ref()
        .map(|ids| ids.iter().map(String::as_str).collect());

    // Candidates the goal may draw new installs from
    let available: Vec<&Package> = sack
        .packages()
        .iter()
        .filter(|p| {
            allowed_repos
                .as_ref()
                .map(|repos| repos.contains(p.repo_id.as_str()))
                .unwrap_or(true)
        })
        .filter(|p| !excludes.iter().any(|s| s.matches(p)))
        .collect();

    // Prior installs are strict: they re-enter the goal as concrete
    // packages, untouched by this transaction's excludes
    let mut selected: Vec<&Package> = previously_installed.to_vec();
    let mut selected_names: HashSet<&str> = selected.iter().map(|p| p.name.as_str()).collect();
    let mut provided: HashSet<&str> = HashSet::new();
    for pkg in &selected {
        provided.insert(pkg.name.as_str());
        provided.extend(pkg.provides.iter().map(String::as_str));
    }

    let mut queue: VecDeque<&Package> = VecDeque::new();
    let mut marking_failures: Vec<&str> = Vec::new();

    for spec in &transaction.package_specs {
        let matcher = SpecMatcher::parse(spec)?;
        let mut matches: Vec<&Package> = available
            .iter()
            .copied()
            .filter(|p| matcher.matches(p))
            .collect();
        if matches.is_empty() {
            marking_failures.push(spec.as_str());
            continue;
        }

        // One install per matched name, best candidate first
        rank_candidates(sack, &mut matches, None);
        let mut names_done: HashSet<&str> = HashSet::new();
        for pkg in matches {
            if !names_done.insert(pkg.name.as_str()) {
                continue;
            }
            if selected_names.contains(pkg.name.as_str()) {
                continue;
            }
            select(pkg, &mut selected, &mut selected_names, &mut provided, &mut queue);
        }
    }

    if !marking_failures.is_empty() {
        return Err(Error::Marking(format!(
            "cannot mark packages for installation: {}",
            marking_failures.join(", ")
        )));
    }

    while let Some(pkg) = queue.pop_front() {
        for requirement in &pkg.requires {
            if provided.contains(requirement.as_str()) {
                continue;
            }
            let provider = find_provider(sack, &available, requirement).ok_or_else(|| {
                Error::Depsolve(format!(
                    "cannot satisfy requirement '{}' needed by {} (package specs: {})",
                    requirement,
                    pkg.nevra(),
                    all_specs.join(", ")
                ))
            })?;
            select(provider, &mut selected, &mut selected_names, &mut provided, &mut queue);
        }

        if transaction.install_weak_deps {
            for recommendation in &pkg.recommends {
                if provided.contains(recommendation.as_str()) {
                    continue;
                }
                // A weak dependency without a provider is not an error
                match find_provider(sack, &available, recommendation) {
                    Some(provider) => {
                        select(provider, &mut selected, &mut selected_names, &mut provided, &mut queue)
                    }
                    None => debug!(
                        "No provider for weak dependency '{}' of {}",
                        recommendation,
                        pkg.nevra()
                    ),
                }
            }
        }
    }

    Ok(selected)
}

fn select<'a>(
    pkg: &'a Package,
    selected: &mut Vec<&'a Package>,
    selected_names: &mut HashSet<&'a str>,
    provided: &mut HashSet<&'a str>,
    queue: &mut VecDeque<&'a Package>,
) {
    selected.push(pkg);
    selected_names.insert(pkg.name.as_str());
    provided.insert(pkg.name.as_str());
    provided.extend(pkg.provides.iter().map(String::as_str));
    queue.push_back(pkg);
}

/// Best provider for a capability among the available candidates
fn find_provider<'a>(
    sack: &Sack,
    available: &[&'a Package],
    capability: &str,
) -> Option<&'a Package> {
    let mut candidates: Vec<&Package> = available
        .iter()
        .copied()
        .filter(|p| p.provides_capability(capability))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    rank_candidates(sack, &mut candidates, Some(capability));
    Some(candidates[0])
}

/// Order candidates best-first: a package named after the capability
/// beats an indirect provider, then higher version, then native
/// architecture, then name and repo for determinism
fn rank_candidates(sack: &Sack, candidates: &mut [&Package], capability: Option<&str>) {
    let native = sack.config().arch.clone();
    candidates.sort_by(|a, b| {
        let a_named = capability.map(|c| a.name == c).unwrap_or(false);
        let b_named = capability.map(|c| b.name == c).unwrap_or(false);
        b_named
            .cmp(&a_named)
            .then_with(|| b.compare_version(a))
            .then_with(|| (b.arch == native).cmp(&(a.arch == native)))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.repo_id.cmp(&b.repo_id))
    });
}

/// A package spec: an exact name, a name glob, or a NEVRA glob
enum SpecMatcher {
    Exact(String),
    Glob(Pattern),
}

impl SpecMatcher {
    fn parse(spec: &str) -> Result<SpecMatcher> {
        if spec.contains('*') || spec.contains('?') || spec.contains('[') {
            let glob = Pattern::new(spec).map_err(|e| {
                Error::InvalidRequest(format!("invalid package spec {:?}: {}", spec, e))
            })?;
            Ok(SpecMatcher::Glob(glob))
        } else {
            Ok(SpecMatcher::Exact(spec.to_string()))
        }
    }

    fn matches(&self, pkg: &Package) -> bool {
        match self {
            SpecMatcher::Exact(name) => pkg.name == *name || pkg.nevra() == *name,
            SpecMatcher::Glob(glob) => glob.matches(&pkg.name) || glob.matches(&pkg.nevra()),
        }
    }
}

fn compile_specs(specs: &[String]) -> Result<Vec<SpecMatcher>> {
    specs.iter().map(|s| SpecMatcher::parse(s)).collect()
}
