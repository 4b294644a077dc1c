//! Profile tables describing which browser-API expressions act as taint
//! sources and sinks.
//!
//! The tables ship with versioned defaults and can be extended from a JSON
//! override document, so new APIs are a configuration change rather than a
//! code change. Names are dotted API paths (`chrome.cookies.getAll`);
//! `browser.`-prefixed lookups are normalized to `chrome.` so Firefox-style
//! code matches the same entries.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// What kind of data an API source yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Result of a privileged browser API (cookies, history, tabs, ...).
    PrivilegedApi,
    /// Read from extension storage.
    StorageRead,
}

/// Where a sink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Outgoing extension message (`port.postMessage`, `tabs.sendMessage`).
    MessageSend,
    /// Write into extension storage.
    StorageWrite,
    /// DOM- or code-execution sink reachable from content scripts.
    CodeExecution,
    /// Privileged browser API taking attacker-influencable arguments.
    PrivilegedApi,
}

/// How the dotted name of a profile entry is matched against call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    #[default]
    Exact,
    /// Matches any dotted name ending in the entry (used for method-style
    /// sinks like `.postMessage` whose receiver is a local variable).
    Suffix,
}

/// One API whose result (or callback payload) is sensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    pub api: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub name_match: NameMatch,
    /// Argument position of the result callback, when the API delivers its
    /// result through one.
    #[serde(default)]
    pub callback_index: Option<usize>,
    /// Parameter positions of the callback that carry the sensitive value.
    #[serde(default = "default_param_indices")]
    pub param_indices: Vec<usize>,
}

fn default_param_indices() -> Vec<usize> {
    vec![0]
}

/// One API whose arguments act as a taint sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkProfile {
    pub api: String,
    pub kind: SinkKind,
    #[serde(default)]
    pub name_match: NameMatch,
    /// Argument positions that are sinks; empty means every argument.
    #[serde(default)]
    pub arg_indices: Vec<usize>,
}

/// The full profile document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiProfiles {
    pub version: String,
    pub sources: Vec<SourceProfile>,
    pub sinks: Vec<SinkProfile>,
    /// `sender` properties whose comparison counts as a sender guard.
    pub guard_properties: Vec<String>,
    /// DOM element properties that are sinks when assigned to.
    pub dom_property_sinks: Vec<String>,
    /// Extension storage areas tracked by the storage census.
    pub storage_areas: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile override {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("failed to parse profile override {0}: {1}")]
    Parse(String, #[source] serde_json::Error),
}

/// Partial document accepted as an override; everything is optional and
/// extends the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileOverride {
    pub version: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceProfile>,
    #[serde(default)]
    pub sinks: Vec<SinkProfile>,
    #[serde(default)]
    pub guard_properties: Vec<String>,
    #[serde(default)]
    pub dom_property_sinks: Vec<String>,
}

impl ApiProfiles {
    /// The built-in tables. The version string tracks the table contents,
    /// not the crate version.
    pub fn defaults() -> ApiProfiles {
        let privileged = |api: &str, cb: usize| SourceProfile {
            api: api.to_string(),
            kind: SourceKind::PrivilegedApi,
            name_match: NameMatch::Exact,
            callback_index: Some(cb),
            param_indices: vec![0],
        };
        let storage_read = |api: &str| SourceProfile {
            api: api.to_string(),
            kind: SourceKind::StorageRead,
            name_match: NameMatch::Exact,
            callback_index: Some(1),
            param_indices: vec![0],
        };
        let sink = |api: &str, kind: SinkKind, args: &[usize]| SinkProfile {
            api: api.to_string(),
            kind,
            name_match: NameMatch::Exact,
            arg_indices: args.to_vec(),
        };

        ApiProfiles {
            version: "2024-06".to_string(),
            sources: vec![
                privileged("chrome.cookies.get", 1),
                privileged("chrome.cookies.getAll", 1),
                privileged("chrome.cookies.getAllCookieStores", 0),
                privileged("chrome.history.search", 1),
                privileged("chrome.history.getVisits", 1),
                privileged("chrome.tabs.query", 1),
                privileged("chrome.tabs.get", 1),
                privileged("chrome.tabs.captureVisibleTab", 1),
                privileged("chrome.bookmarks.getTree", 0),
                privileged("chrome.bookmarks.search", 1),
                privileged("chrome.downloads.search", 1),
                privileged("chrome.identity.getAuthToken", 1),
                privileged("chrome.identity.getProfileUserInfo", 0),
                privileged("chrome.topSites.get", 0),
                privileged("chrome.webRequest.onBeforeRequest.addListener", 0),
                storage_read("chrome.storage.local.get"),
                storage_read("chrome.storage.sync.get"),
                storage_read("chrome.storage.session.get"),
                storage_read("chrome.storage.managed.get"),
            ],
            sinks: vec![
                sink("chrome.tabs.sendMessage", SinkKind::MessageSend, &[1]),
                sink("chrome.runtime.sendMessage", SinkKind::MessageSend, &[0]),
                sink("chrome.tabs.executeScript", SinkKind::CodeExecution, &[]),
                sink("chrome.scripting.executeScript", SinkKind::CodeExecution, &[]),
                sink("chrome.tabs.update", SinkKind::PrivilegedApi, &[]),
                sink("chrome.tabs.create", SinkKind::PrivilegedApi, &[]),
                sink("chrome.downloads.download", SinkKind::PrivilegedApi, &[0]),
                sink("chrome.cookies.set", SinkKind::PrivilegedApi, &[0]),
                sink("chrome.storage.local.set", SinkKind::StorageWrite, &[0]),
                sink("chrome.storage.sync.set", SinkKind::StorageWrite, &[0]),
                sink("chrome.storage.session.set", SinkKind::StorageWrite, &[0]),
                sink("eval", SinkKind::CodeExecution, &[0]),
                sink("Function", SinkKind::CodeExecution, &[]),
                sink("setTimeout", SinkKind::CodeExecution, &[0]),
                sink("setInterval", SinkKind::CodeExecution, &[0]),
                sink("document.write", SinkKind::CodeExecution, &[0]),
                sink("document.writeln", SinkKind::CodeExecution, &[0]),
                SinkProfile {
                    api: ".postMessage".to_string(),
                    kind: SinkKind::MessageSend,
                    name_match: NameMatch::Suffix,
                    arg_indices: vec![0],
                },
                SinkProfile {
                    api: ".insertAdjacentHTML".to_string(),
                    kind: SinkKind::CodeExecution,
                    name_match: NameMatch::Suffix,
                    arg_indices: vec![1],
                },
            ],
            guard_properties: vec![
                "url".to_string(),
                "origin".to_string(),
                "id".to_string(),
                "frameId".to_string(),
                "tab.url".to_string(),
            ],
            dom_property_sinks: vec![
                "innerHTML".to_string(),
                "outerHTML".to_string(),
                "srcdoc".to_string(),
            ],
            storage_areas: vec![
                "local".to_string(),
                "sync".to_string(),
                "session".to_string(),
                "managed".to_string(),
            ],
        }
    }

    /// Defaults extended with an override document read from `path`.
    pub fn with_override_file(path: &Path) -> Result<ApiProfiles, ProfileError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ProfileError::Io(path.display().to_string(), e))?;
        let over: ProfileOverride = serde_json::from_str(&data)
            .map_err(|e| ProfileError::Parse(path.display().to_string(), e))?;
        let mut profiles = ApiProfiles::defaults();
        profiles.extend(over);
        Ok(profiles)
    }

    pub fn extend(&mut self, over: ProfileOverride) {
        if let Some(version) = over.version {
            self.version = version;
        }
        self.sources.extend(over.sources);
        self.sinks.extend(over.sinks);
        for g in over.guard_properties {
            if !self.guard_properties.contains(&g) {
                self.guard_properties.push(g);
            }
        }
        for p in over.dom_property_sinks {
            if !self.dom_property_sinks.contains(&p) {
                self.dom_property_sinks.push(p);
            }
        }
    }

    /// Source entry matching a dotted call name, if any.
    pub fn source(&self, dotted: &str) -> Option<&SourceProfile> {
        let dotted = normalize(dotted);
        self.sources.iter().find(|s| match s.name_match {
            NameMatch::Exact => s.api == dotted,
            NameMatch::Suffix => dotted.ends_with(&s.api),
        })
    }

    /// Sink entry matching a dotted call name, if any.
    pub fn sink(&self, dotted: &str) -> Option<&SinkProfile> {
        let dotted = normalize(dotted);
        self.sinks.iter().find(|s| match s.name_match {
            NameMatch::Exact => s.api == dotted,
            NameMatch::Suffix => dotted.ends_with(&s.api),
        })
    }

    /// Storage area accessed by a dotted name like `chrome.storage.local.get`,
    /// together with the operation (`get`, `set`, `remove`, `clear`).
    pub fn storage_access(&self, dotted: &str) -> Option<(String, String)> {
        let dotted = normalize(dotted);
        let rest = dotted.strip_prefix("chrome.storage.")?;
        let (area, op) = rest.split_once('.')?;
        if !self.storage_areas.iter().any(|a| a == area) {
            return None;
        }
        if !matches!(op, "get" | "getBytesInUse" | "set" | "remove" | "clear") {
            return None;
        }
        Some((area.to_string(), op.to_string()))
    }
}

/// Folds `browser.` onto `chrome.` so both namespaces hit the same entries.
fn normalize(dotted: &str) -> String {
    match dotted.strip_prefix("browser.") {
        Some(rest) => format!("chrome.{rest}"),
        None => dotted.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_know_cookies_and_storage() {
        let p = ApiProfiles::defaults();
        let cookies = p.source("chrome.cookies.getAll").unwrap();
        assert_eq!(cookies.kind, SourceKind::PrivilegedApi);
        assert_eq!(cookies.callback_index, Some(1));
        let storage = p.source("chrome.storage.local.get").unwrap();
        assert_eq!(storage.kind, SourceKind::StorageRead);
        assert!(p.sink("chrome.storage.local.set").is_some());
    }

    #[test]
    fn browser_prefix_normalizes_to_chrome() {
        let p = ApiProfiles::defaults();
        assert!(p.source("browser.cookies.getAll").is_some());
        assert_eq!(
            p.storage_access("browser.storage.sync.set"),
            Some(("sync".to_string(), "set".to_string()))
        );
    }

    #[test]
    fn suffix_entries_match_port_post_message() {
        let p = ApiProfiles::defaults();
        let sink = p.sink("port.postMessage").unwrap();
        assert_eq!(sink.kind, SinkKind::MessageSend);
        assert_eq!(p.sink("somePort.postMessage").unwrap().api, ".postMessage");
    }

    #[test]
    fn overrides_extend_the_defaults() {
        let mut p = ApiProfiles::defaults();
        p.extend(ProfileOverride {
            version: Some("test-1".to_string()),
            sources: vec![SourceProfile {
                api: "chrome.debugger.getTargets".to_string(),
                kind: SourceKind::PrivilegedApi,
                name_match: NameMatch::Exact,
                callback_index: Some(0),
                param_indices: vec![0],
            }],
            sinks: vec![],
            guard_properties: vec!["url".to_string()],
            dom_property_sinks: vec![],
        });
        assert_eq!(p.version, "test-1");
        assert!(p.source("chrome.debugger.getTargets").is_some());
        // No duplicate guard properties.
        assert_eq!(p.guard_properties.iter().filter(|g| *g == "url").count(), 1);
    }
}
