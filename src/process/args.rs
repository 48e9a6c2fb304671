//! Command-line fragments and their rendering rules.

use std::ops::BitOr;
use std::path::{Path, PathBuf};

use url::Url;

/// Options attached to one argument fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArgFlags {
    /// Only include the fragment when verbose logging is on.
    pub verbose: bool,
    /// Only include the fragment when verbose logging is off.
    pub quiet: bool,
    /// Join key and value without a space.
    pub nospace: bool,
    /// Quote string and URL values.
    pub quote: bool,
}

impl ArgFlags {
    pub const NONE: Self = Self {
        verbose: false,
        quiet: false,
        nospace: false,
        quote: false,
    };
    pub const VERBOSE: Self = Self {
        verbose: true,
        ..Self::NONE
    };
    pub const QUIET: Self = Self {
        quiet: true,
        ..Self::NONE
    };
    pub const NOSPACE: Self = Self {
        nospace: true,
        ..Self::NONE
    };
    pub const QUOTE: Self = Self {
        quote: true,
        ..Self::NONE
    };

    /// Whether a fragment with these flags is part of the command line.
    #[must_use]
    pub fn included(self, verbose_logging: bool) -> bool {
        if self.verbose && !verbose_logging {
            return false;
        }
        if self.quiet && verbose_logging {
            return false;
        }
        true
    }
}

impl BitOr for ArgFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            verbose: self.verbose || rhs.verbose,
            quiet: self.quiet || rhs.quiet,
            nospace: self.nospace || rhs.nospace,
            quote: self.quote || rhs.quote,
        }
    }
}

/// A value that can appear on a command line.
pub trait ArgValue {
    /// Render the value, quoting it when `force_quote` is set.
    fn to_arg(&self, force_quote: bool) -> String;
}

fn quoted(s: &str) -> String {
    format!("\"{s}\"")
}

impl ArgValue for str {
    fn to_arg(&self, force_quote: bool) -> String {
        if force_quote {
            quoted(self)
        } else {
            self.to_string()
        }
    }
}

impl ArgValue for String {
    fn to_arg(&self, force_quote: bool) -> String {
        self.as_str().to_arg(force_quote)
    }
}

// Paths always end up quoted, they routinely contain spaces.
impl ArgValue for Path {
    fn to_arg(&self, _force_quote: bool) -> String {
        quoted(&self.display().to_string())
    }
}

impl ArgValue for PathBuf {
    fn to_arg(&self, force_quote: bool) -> String {
        self.as_path().to_arg(force_quote)
    }
}

impl ArgValue for Url {
    fn to_arg(&self, force_quote: bool) -> String {
        self.as_str().to_arg(force_quote)
    }
}

impl<T: ArgValue + ?Sized> ArgValue for &T {
    fn to_arg(&self, force_quote: bool) -> String {
        (**self).to_arg(force_quote)
    }
}

/// An element accepted by [`ProcessSpec::args`](super::ProcessSpec::args).
///
/// Plain strings become a bare fragment, `(key, value)` pairs follow the
/// same rules as [`ProcessSpec::kv`](super::ProcessSpec::kv).
pub trait ArgItem {
    fn into_fragment(self, flags: ArgFlags) -> Fragment;
}

impl ArgItem for &str {
    fn into_fragment(self, flags: ArgFlags) -> Fragment {
        Fragment::new(self, "", flags)
    }
}

impl ArgItem for String {
    fn into_fragment(self, flags: ArgFlags) -> Fragment {
        Fragment::new(self, "", flags)
    }
}

impl ArgItem for &String {
    fn into_fragment(self, flags: ArgFlags) -> Fragment {
        Fragment::new(self.as_str(), "", flags)
    }
}

impl<K: AsRef<str>, V: ArgValue> ArgItem for (K, V) {
    fn into_fragment(self, flags: ArgFlags) -> Fragment {
        let value = self.1.to_arg(flags.quote);
        Fragment::new(self.0.as_ref(), value, flags)
    }
}

/// One key/value piece of a composed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    key: String,
    value: String,
    flags: ArgFlags,
}

impl Fragment {
    /// `value` is expected to be already rendered (and quoted if needed).
    pub fn new(key: impl Into<String>, value: impl Into<String>, flags: ArgFlags) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags,
        }
    }

    /// The fragment's text, or `None` when it is excluded or empty.
    #[must_use]
    pub fn render(&self, verbose_logging: bool) -> Option<String> {
        if !self.flags.included(verbose_logging) {
            return None;
        }

        if self.key.is_empty() && self.value.is_empty() {
            return None;
        }

        let text = if self.key.is_empty() {
            self.value.clone()
        } else if self.flags.nospace || self.key.ends_with('=') {
            format!("{}{}", self.key, self.value)
        } else if self.value.is_empty() {
            self.key.clone()
        } else {
            format!("{} {}", self.key, self.value)
        };

        Some(text)
    }
}

/// Render fragments in order, each preceded by a single space.
#[must_use]
pub fn render_fragments(fragments: &[Fragment], verbose_logging: bool) -> String {
    fragments
        .iter()
        .filter_map(|f| f.render(verbose_logging))
        .fold(String::new(), |mut out, text| {
            out.push(' ');
            out.push_str(&text);
            out
        })
}
