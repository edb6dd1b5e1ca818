//! Stage configuration and typed parameter lookup.
//!
//! A [`Configuration`] pairs one stage's [`ParameterMap`] with the run's
//! [`ArgumentMap`]. Lookups are made on behalf of a component label (for
//! example `Metric0`) at a resolution level. The first of these that exists
//! supplies the values:
//!
//! 1. `<label><Key>[level]`
//! 2. `<Key>[level]`
//! 3. `<label><Key>`
//! 4. `<Key>`
//!
//! and the value at the requested entry index is converted with
//! [`FromParameter`]. An empty label skips the prefixed forms.

pub mod args;
#[cfg(feature = "json")]
pub mod json;
pub mod parameter_file;

pub use args::{ArgumentMap, CommandLine};
pub use parameter_file::{ParameterEntry, ParameterMap};

use crate::util::{MultiRegError, MultiRegResult};

/// Conversion from a stored string value.
pub trait FromParameter: Sized {
    /// Human readable name of the expected type, used in error messages.
    const EXPECTED: &'static str;

    fn from_parameter(value: &str) -> Option<Self>;
}

impl FromParameter for bool {
    const EXPECTED: &'static str = "boolean (\"true\" or \"false\")";

    fn from_parameter(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }
}

impl FromParameter for String {
    const EXPECTED: &'static str = "string";

    fn from_parameter(value: &str) -> Option<Self> {
        Some(value.to_string())
    }
}

macro_rules! from_parameter_via_parse {
    ($($ty:ty => $expected:expr),+ $(,)?) => {
        $(
            impl FromParameter for $ty {
                const EXPECTED: &'static str = $expected;

                fn from_parameter(value: &str) -> Option<Self> {
                    value.trim().parse().ok()
                }
            }
        )+
    };
}

from_parameter_via_parse!(
    u32 => "unsigned integer",
    u64 => "unsigned integer",
    usize => "unsigned integer",
    i32 => "integer",
    i64 => "integer",
    f32 => "floating point number",
    f64 => "floating point number",
);

/// Where a resolved value list came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSource {
    /// A `[level]` override.
    LevelOverride,
    /// The level-independent entry.
    Default,
}

/// Values found for a lookup.
#[derive(Clone, Debug)]
pub struct Resolved<'a> {
    /// The key that supplied the values (with label prefix if any).
    pub key: String,
    pub values: &'a [String],
    pub source: ValueSource,
}

/// Read-only configuration of one stage.
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    parameters: ParameterMap,
    arguments: ArgumentMap,
}

impl Configuration {
    pub fn new(parameters: ParameterMap, arguments: ArgumentMap) -> Self {
        Self {
            parameters,
            arguments,
        }
    }

    /// A configuration without command-line arguments.
    pub fn from_parameters(parameters: ParameterMap) -> Self {
        Self::new(parameters, ArgumentMap::default())
    }

    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    pub fn arguments(&self) -> &ArgumentMap {
        &self.arguments
    }

    /// Value of a command-line argument.
    pub fn argument(&self, key: &str) -> Option<&str> {
        self.arguments.get(key)
    }

    /// Returns the values that a lookup resolves to, if any.
    pub fn resolve(&self, key: &str, label: &str, level: usize) -> Option<Resolved<'_>> {
        let prefixed = (!label.is_empty()).then(|| format!("{label}{key}"));
        let candidates: Vec<&str> = prefixed.as_deref().into_iter().chain([key]).collect();

        for name in &candidates {
            if let Some(entry) = self.parameters.entry(name) {
                if let Some(values) = entry.level_values(level) {
                    return Some(Resolved {
                        key: (*name).to_string(),
                        values,
                        source: ValueSource::LevelOverride,
                    });
                }
            }
        }
        for name in &candidates {
            if let Some(entry) = self.parameters.entry(name) {
                if let Some(values) = entry.default_values() {
                    return Some(Resolved {
                        key: (*name).to_string(),
                        values,
                        source: ValueSource::Default,
                    });
                }
            }
        }
        None
    }

    /// Typed lookup of one entry.
    ///
    /// Returns `Ok(None)` when nothing resolves and `required` is false, and
    /// [`MultiRegError::MissingParameter`] when `required` is true.
    pub fn read<T: FromParameter>(
        &self,
        key: &str,
        label: &str,
        level: usize,
        entry_index: usize,
        required: bool,
    ) -> MultiRegResult<Option<T>> {
        let found = self
            .resolve(key, label, level)
            .and_then(|r| r.values.get(entry_index).map(|v| (r.key, v)));
        match found {
            Some((stored, value)) => convert(&stored, value).map(Some),
            None if required => Err(MultiRegError::MissingParameter {
                key: key.to_string(),
                label: label.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Typed lookup with a fallback value.
    pub fn read_or<T: FromParameter>(
        &self,
        key: &str,
        label: &str,
        level: usize,
        entry_index: usize,
        default: T,
    ) -> MultiRegResult<T> {
        Ok(self
            .read(key, label, level, entry_index, false)?
            .unwrap_or(default))
    }

    /// Typed lookup that fails if nothing resolves.
    pub fn read_required<T: FromParameter>(
        &self,
        key: &str,
        label: &str,
        level: usize,
        entry_index: usize,
    ) -> MultiRegResult<T> {
        self.read(key, label, level, entry_index, true)?
            .ok_or_else(|| MultiRegError::MissingParameter {
                key: key.to_string(),
                label: label.to_string(),
            })
    }

    /// Per-resolution scalar lookup.
    ///
    /// An override for `level` wins. Otherwise the level-independent entry is
    /// read as one value per resolution (`(Key v0 v1 v2)`): value `level` if
    /// present, else value 0.
    pub fn read_for_level<T: FromParameter>(
        &self,
        key: &str,
        label: &str,
        level: usize,
        default: T,
    ) -> MultiRegResult<T> {
        let Some(resolved) = self.resolve(key, label, level) else {
            return Ok(default);
        };
        let index = match resolved.source {
            ValueSource::LevelOverride => 0,
            ValueSource::Default if level < resolved.values.len() => level,
            ValueSource::Default => 0,
        };
        match resolved.values.get(index) {
            Some(value) => convert(&resolved.key, value),
            None => Ok(default),
        }
    }

    /// All values of a vector-valued parameter.
    pub fn read_vector<T: FromParameter>(
        &self,
        key: &str,
        label: &str,
        level: usize,
    ) -> MultiRegResult<Option<Vec<T>>> {
        self.resolve(key, label, level)
            .map(|r| r.values.iter().map(|v| convert(&r.key, v)).collect())
            .transpose()
    }

    /// Number of values a lookup resolves to.
    pub fn count_values(&self, key: &str, label: &str, level: usize) -> usize {
        self.resolve(key, label, level)
            .map(|r| r.values.len())
            .unwrap_or(0)
    }
}

fn convert<T: FromParameter>(key: &str, value: &str) -> MultiRegResult<T> {
    T::from_parameter(value).ok_or_else(|| MultiRegError::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
        expected: T::EXPECTED,
    })
}
