//! Environment snapshots handed verbatim to child processes.

use std::collections::BTreeMap;
use std::path::Path;

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

/// A flat set of environment variables.
///
/// A process spec that carries an `Env` runs its child with exactly these
/// variables; without one the child inherits the parent's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    /// An empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    ///
    /// Variables whose name or value is not valid unicode are converted lossily.
    #[must_use]
    pub fn current() -> Self {
        let vars = std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect();
        Self { vars }
    }

    /// Set a variable, replacing any previous value.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Remove a variable.
    #[must_use]
    pub fn remove(mut self, key: &str) -> Self {
        self.vars.remove(key);
        self
    }

    /// Put `dir` in front of the list stored in `key`.
    #[must_use]
    pub fn prepend_path(self, key: &str, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().display().to_string();
        let value = match self.get(key) {
            Some(existing) if !existing.is_empty() => format!("{dir}{PATH_SEPARATOR}{existing}"),
            _ => dir,
        };
        self.set(key, value)
    }

    /// Put `dir` at the end of the list stored in `key`.
    #[must_use]
    pub fn append_path(self, key: &str, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().display().to_string();
        let value = match self.get(key) {
            Some(existing) if !existing.is_empty() => format!("{existing}{PATH_SEPARATOR}{dir}"),
            _ => dir,
        };
        self.set(key, value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
