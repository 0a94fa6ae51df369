//! Feature settings files.
//!
//! Text format, one feature per line: `Name<TAB>Value`. Blank lines and lines
//! starting with `#` are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettingsParseError {
    #[error("line {line}: expected `Name<TAB>Value`")]
    MissingValue { line: usize },
    #[error("line {line}: empty feature name")]
    EmptyName { line: usize },
}

/// Ordered feature name/value map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureSet {
    features: BTreeMap<String, String>,
}

impl FeatureSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.features.get(name).map(String::as_str)
    }

    /// Parse a feature as a number, ignoring values that do not parse.
    pub fn get_parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.features.insert(name.into(), value.to_string());
    }

    /// Overwrite features with those from `other`.
    pub fn merge(&mut self, other: FeatureSet) {
        self.features.extend(other.features);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromStr for FeatureSet {
    type Err = SettingsParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut features = BTreeMap::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let (name, value) = line
                .split_once('\t')
                .ok_or(SettingsParseError::MissingValue { line: idx + 1 })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(SettingsParseError::EmptyName { line: idx + 1 });
            }
            features.insert(name.to_string(), value.trim().to_string());
        }
        Ok(Self { features })
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# pencam feature settings")?;
        for (name, value) in &self.features {
            writeln!(f, "{name}\t{value}")?;
        }
        Ok(())
    }
}
