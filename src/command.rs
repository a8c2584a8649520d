//! Command string builders.
//!
//! Instrument commands are assembled from small pieces: a channel letter
//! spliced into an attribute path, a value behind an `=`, a unit suffix.
//! [`SubArg`] concatenates decorated fragments and [`ExecArgs`] joins
//! argument/value pairs with a separator.
//!
//! ```
//! use instrument_control::command::{ExecArgs, SubArg};
//!
//! let smu = SubArg::new("smu").elem("a");
//! let args = ExecArgs::new()
//!     .arg(&smu, "", "")
//!     .arg(".source.output", SubArg::new(&smu).elem(".OUTPUT_ON"), " = ");
//! assert_eq!(args.to_string(), "smua.source.output = smua.OUTPUT_ON");
//! ```

use std::fmt;

/// A string built from `prefix + value + suffix` fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubArg {
    elements: Vec<String>,
}

impl SubArg {
    /// Start with a single undecorated fragment.
    pub fn new(arg: impl fmt::Display) -> Self {
        Self::default().elem(arg)
    }

    /// Start with a fragment wrapped in a prefix and suffix.
    pub fn with_affixes(arg: impl fmt::Display, prefix: &str, suffix: &str) -> Self {
        Self::default().elem_with(arg, prefix, suffix)
    }

    /// Append an undecorated fragment.
    #[must_use]
    pub fn elem(self, arg: impl fmt::Display) -> Self {
        self.elem_with(arg, "", "")
    }

    /// Append `prefix + arg + suffix`.
    #[must_use]
    pub fn elem_with(mut self, arg: impl fmt::Display, prefix: &str, suffix: &str) -> Self {
        self.elements.push(format!("{prefix}{arg}{suffix}"));
        self
    }

    /// True when no fragment was added.
    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(String::is_empty)
    }
}

impl fmt::Display for SubArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            f.write_str(element)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    argument: String,
    separator: String,
    value: String,
}

/// Ordered argument/value pairs rendered as `argument + separator + value`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecArgs {
    entries: Vec<Entry>,
}

impl ExecArgs {
    /// Empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument with its value.
    #[must_use]
    pub fn arg(
        mut self,
        argument: impl fmt::Display,
        value: impl fmt::Display,
        separator: &str,
    ) -> Self {
        self.entries.push(Entry {
            argument: argument.to_string(),
            separator: separator.to_owned(),
            value: value.to_string(),
        });
        self
    }

    /// Append a bare fragment.
    #[must_use]
    pub fn raw(self, fragment: impl fmt::Display) -> Self {
        self.arg(fragment, "", "")
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing was added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ExecArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{}{}{}", entry.argument, entry.separator, entry.value)?;
        }
        Ok(())
    }
}
