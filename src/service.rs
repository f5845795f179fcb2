// src/service.rs

//! One-request solver lifecycle
//!
//! A request flows validator → cache resolver → repository loader →
//! key materializer → sack → query or depsolve → response. All scratch
//! state (the persistdir and its materialized keys, the in-memory sack)
//! lives exactly as long as the request.

use crate::config::{self, SackConfig};
use crate::error::Result;
use crate::gpg;
use crate::query;
use crate::repository::{self, RepoConfig};
use crate::request::{Command, Request};
use crate::response::{RepoEcho, Response};
use crate::sack::{Package, Sack};
use crate::solver;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;

/// Handle one validated-or-rejected request end to end
pub fn handle(request: &Request) -> Result<Response> {
    let command = request.validate()?;
    let cache_root = config::resolve_cache_dir(request.cachedir.as_deref(), &request.arch)?;
    let sack_config = SackConfig::new(
        &request.arch,
        &request.releasever,
        &request.module_platform_id,
        request.proxy.clone(),
        cache_root,
    );

    let args = request.arguments();
    let mut repos = repository::load_repos(args, &sack_config)?;

    // Per-request scratch directory; deleted on drop whether the request
    // succeeds or fails
    let persistdir = tempfile::tempdir()?;
    let key_dir = gpg::key_dir(persistdir.path())?;
    for repo in &mut repos {
        repo.key_urls = gpg::sack_key_urls(&repo.id, &repo.gpgkeys, &key_dir)?;
        if !repo.key_urls.is_empty() {
            debug!("Repo '{}' key URLs: {}", repo.id, repo.key_urls.join(" "));
        }
    }

    let sack = Sack::load(sack_config, &repos)?;

    match command {
        Command::Dump => Ok(Response::package_list(&query::dump(&sack))),
        Command::Search => {
            let search = args.search.as_ref().expect("validated");
            let packages = query::search(&sack, &search.packages, search.latest)?;
            Ok(Response::package_list(&packages))
        }
        Command::Depsolve => {
            let packages = solver::depsolve(&sack, &args.transactions)?;
            let repos_map = response_repos(
                &packages,
                &repos,
                args.root_dir.as_deref().map(Path::new),
                request.proxy.as_deref(),
            )?;
            Ok(Response::depsolve(&packages, repos_map))
        }
    }
}

/// Echo every repo that sourced a resolved package, keys materialized
///
/// Key fetches use each repo's own HTTP client so a repo's TLS settings
/// apply to its key URLs the same way they apply to its metadata.
fn response_repos(
    packages: &[&Package],
    repos: &[RepoConfig],
    root_dir: Option<&Path>,
    proxy: Option<&str>,
) -> Result<BTreeMap<String, RepoEcho>> {
    let used: BTreeSet<&str> = packages.iter().map(|p| p.repo_id.as_str()).collect();

    let mut map = BTreeMap::new();
    for repo in repos.iter().filter(|r| used.contains(r.id.as_str())) {
        let gpgkeys = gpg::repo_key_texts(repo, root_dir, proxy)?;
        map.insert(repo.id.clone(), RepoEcho::from_config(repo, gpgkeys));
    }
    Ok(map)
}
