// src/request.rs

//! Wire request schema and structural validation
//!
//! One JSON request arrives on stdin per invocation. The types here
//! deserialize it leniently; `Request::validate` then enforces the schema
//! before anything touches the filesystem or the network.

use crate::error::{Error, Result};
use serde::Deserialize;

/// Commands understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Dump,
    Depsolve,
    Search,
}

/// Top-level request object
#[derive(Debug, Default, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub command: String,

    /// Target architecture, e.g. "x86_64"
    #[serde(default)]
    pub arch: String,

    /// Modularity platform tag, e.g. "platform:el9"
    #[serde(default)]
    pub module_platform_id: String,

    #[serde(default)]
    pub releasever: String,

    /// Optional HTTP proxy URL for metadata and key fetches
    #[serde(default)]
    pub proxy: Option<String>,

    /// Metadata cache root; ignored when the environment override is set
    #[serde(default)]
    pub cachedir: Option<String>,

    #[serde(default)]
    pub arguments: Option<Arguments>,
}

/// Command-specific arguments
#[derive(Debug, Default, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub repos: Vec<RepoDescriptor>,

    /// Image root filesystem; when set, repo files under
    /// `<root>/etc/yum.repos.d` are loaded as well
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Ordered transaction list for `depsolve`
    #[serde(default)]
    pub transactions: Vec<TransactionRequest>,

    /// Search parameters for `search`
    #[serde(default)]
    pub search: Option<SearchArgs>,
}

/// A repository supplied directly in the request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub baseurl: Option<Vec<String>>,
    #[serde(default)]
    pub metalink: Option<String>,
    #[serde(default)]
    pub mirrorlist: Option<String>,
    #[serde(default)]
    pub sslverify: Option<bool>,
    #[serde(default)]
    pub sslcacert: Option<String>,
    #[serde(default)]
    pub sslclientkey: Option<String>,
    #[serde(default)]
    pub sslclientcert: Option<String>,
    #[serde(default)]
    pub gpgcheck: Option<bool>,
    #[serde(default)]
    pub repo_gpgcheck: Option<bool>,
    /// Single key URL (legacy form)
    #[serde(default)]
    pub gpgkey: Option<String>,
    /// Key list; each entry is an inline armored key block or a URL
    #[serde(default)]
    pub gpgkeys: Option<Vec<String>>,
    /// Duration string, e.g. "20s", "6h"; defaults to "20s" when unset
    #[serde(default)]
    pub metadata_expire: Option<String>,
    #[serde(default)]
    pub module_hotfixes: Option<bool>,
}

/// One depsolve transaction
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "package-specs", default)]
    pub package_specs: Vec<String>,

    #[serde(rename = "exclude-specs", default)]
    pub exclude_specs: Vec<String>,

    /// When present, installs are drawn only from these repositories
    #[serde(rename = "repo-ids", default)]
    pub repo_ids: Option<Vec<String>>,

    #[serde(default)]
    pub install_weak_deps: bool,
}

/// Arguments for the `search` command
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchArgs {
    #[serde(default)]
    pub packages: Vec<String>,

    /// Reduce each package name to its highest NEVRA
    #[serde(default)]
    pub latest: bool,
}

impl Request {
    /// Validate the request structure and return the parsed command
    ///
    /// Purely structural: no filesystem or network access happens here.
    pub fn validate(&self) -> Result<Command> {
        if self.command.is_empty() {
            return Err(Error::InvalidRequest("no 'command' specified".to_string()));
        }
        let command = match self.command.as_str() {
            "dump" => Command::Dump,
            "depsolve" => Command::Depsolve,
            "search" => Command::Search,
            other => {
                return Err(Error::InvalidRequest(format!(
                    "invalid 'command' {:?}",
                    other
                )))
            }
        };

        if self.arch.is_empty() {
            return Err(Error::InvalidRequest("no 'arch' specified".to_string()));
        }
        if self.module_platform_id.is_empty() {
            return Err(Error::InvalidRequest(
                "no 'module_platform_id' specified".to_string(),
            ));
        }
        if self.releasever.is_empty() {
            return Err(Error::InvalidRequest(
                "no 'releasever' specified".to_string(),
            ));
        }

        let arguments = self
            .arguments
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest("no 'arguments' specified".to_string()))?;

        if arguments.repos.is_empty() && arguments.root_dir.is_none() {
            return Err(Error::InvalidRequest(
                "no 'repos' or 'root_dir' specified".to_string(),
            ));
        }

        if command == Command::Search && arguments.search.is_none() {
            return Err(Error::InvalidRequest(
                "no 'search' arguments specified".to_string(),
            ));
        }

        Ok(command)
    }

    /// Validated arguments accessor; callers run `validate` first
    pub fn arguments(&self) -> &Arguments {
        self.arguments.as_ref().expect("request was validated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: serde_json::Value) -> Request {
        serde_json::from_value(json).unwrap()
    }

    fn base_request() -> serde_json::Value {
        serde_json::json!({
            "command": "dump",
            "arch": "x86_64",
            "module_platform_id": "platform:el9",
            "releasever": "9",
            "arguments": {
                "repos": [{"id": "baseos", "baseurl": ["https://example.com/baseos"]}]
            }
        })
    }

    #[test]
    fn test_valid_request() {
        let req = request(base_request());
        assert_eq!(req.validate().unwrap(), Command::Dump);
    }

    #[test]
    fn test_missing_command() {
        let mut v = base_request();
        v.as_object_mut().unwrap().remove("command");
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        assert_eq!(err.to_string(), "no 'command' specified");
    }

    #[test]
    fn test_unknown_command() {
        let mut v = base_request();
        v["command"] = "upgrade".into();
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[test]
    fn test_empty_arch_rejected() {
        let mut v = base_request();
        v["arch"] = "".into();
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.to_string(), "no 'arch' specified");
    }

    #[test]
    fn test_missing_arguments() {
        let mut v = base_request();
        v.as_object_mut().unwrap().remove("arguments");
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.to_string(), "no 'arguments' specified");
    }

    #[test]
    fn test_no_repos_and_no_root_dir() {
        let mut v = base_request();
        v["arguments"] = serde_json::json!({"repos": []});
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.to_string(), "no 'repos' or 'root_dir' specified");
    }

    #[test]
    fn test_root_dir_alone_is_enough() {
        let mut v = base_request();
        v["arguments"] = serde_json::json!({"root_dir": "/img"});
        assert!(request(v).validate().is_ok());
    }

    #[test]
    fn test_search_requires_search_args() {
        let mut v = base_request();
        v["command"] = "search".into();
        let err = request(v).validate().unwrap_err();
        assert_eq!(err.to_string(), "no 'search' arguments specified");
    }

    #[test]
    fn test_transaction_field_names() {
        let txn: TransactionRequest = serde_json::from_value(serde_json::json!({
            "package-specs": ["vim", "kernel-5.*"],
            "exclude-specs": ["vim-minimal"],
            "repo-ids": ["baseos"],
            "install_weak_deps": true
        }))
        .unwrap();
        assert_eq!(txn.package_specs, vec!["vim", "kernel-5.*"]);
        assert_eq!(txn.exclude_specs, vec!["vim-minimal"]);
        assert_eq!(txn.repo_ids.as_deref(), Some(&["baseos".to_string()][..]));
        assert!(txn.install_weak_deps);
    }
}
