//! Parameter files: `(Key value1 value2 ...)` entries.
//!
//! Values are kept as strings; quoting only groups characters (a quoted value
//! may contain spaces). `//` starts a comment that runs to the end of the
//! line. A key written as `Key[L]` holds the override for resolution level
//! `L`; a plain key holds the level-independent entry.

use crate::util::{MultiRegError, MultiRegResult};
use std::collections::BTreeMap;
use std::path::Path;

/// Values stored under one key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterEntry {
    default: Option<Vec<String>>,
    levels: BTreeMap<usize, Vec<String>>,
}

impl ParameterEntry {
    /// The level-independent values.
    pub fn default_values(&self) -> Option<&[String]> {
        self.default.as_deref()
    }

    /// The override for one resolution level.
    pub fn level_values(&self, level: usize) -> Option<&[String]> {
        self.levels.get(&level).map(Vec::as_slice)
    }
}

/// All entries of one stage's parameter file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterMap {
    entries: BTreeMap<String, ParameterEntry>,
    warnings: Vec<String>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a parameter file; `.json` files need the `json` feature.
    pub fn from_path(path: &Path) -> MultiRegResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| MultiRegError::io(path, err))?;
        #[cfg(feature = "json")]
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            return Self::from_json_str(&text);
        }
        Self::parse(&text)
    }

    /// Parses parameter-file text.
    pub fn parse(text: &str) -> MultiRegResult<Self> {
        let mut map = Self::new();
        let mut tokens: Vec<String> = Vec::new();
        let mut open_line = None;
        let mut line = 1usize;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\n' => line += 1,
                '/' if chars.peek() == Some(&'/') => {
                    while let Some(&next) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                '(' => {
                    if open_line.is_some() {
                        return Err(syntax(line, "nested \"(\""));
                    }
                    open_line = Some(line);
                    tokens.clear();
                }
                ')' => {
                    let Some(start) = open_line.take() else {
                        return Err(syntax(line, "\")\" without matching \"(\""));
                    };
                    let mut items = std::mem::take(&mut tokens).into_iter();
                    let key = items.next().ok_or_else(|| syntax(start, "empty entry"))?;
                    map.insert(&key, items.collect(), start)?;
                }
                '"' => {
                    if open_line.is_none() {
                        return Err(syntax(line, "value outside of an entry"));
                    }
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\n') | None => return Err(syntax(line, "unterminated string")),
                            Some(ch) => value.push(ch),
                        }
                    }
                    tokens.push(value);
                }
                c if c.is_whitespace() => {}
                c => {
                    if open_line.is_none() {
                        return Err(syntax(line, "text outside of an entry"));
                    }
                    let mut value = String::from(c);
                    while let Some(&next) = chars.peek() {
                        if next.is_whitespace() || next == '(' || next == ')' || next == '"' {
                            break;
                        }
                        value.push(next);
                        chars.next();
                    }
                    tokens.push(value);
                }
            }
        }
        if let Some(start) = open_line {
            return Err(syntax(start, "unterminated entry"));
        }
        Ok(map)
    }

    /// Inserts an entry whose key may carry a `[level]` suffix.
    pub(crate) fn insert(
        &mut self,
        raw_key: &str,
        values: Vec<String>,
        line: usize,
    ) -> MultiRegResult<()> {
        let (key, level) = split_level(raw_key).ok_or_else(|| {
            syntax(line, &format!("malformed level suffix in \"{raw_key}\""))
        })?;
        let entry = self.entries.entry(key.to_string()).or_default();
        let replaced = match level {
            Some(level) => entry.levels.insert(level, values).is_some(),
            None => entry.default.replace(values).is_some(),
        };
        if replaced {
            self.warnings
                .push(format!("parameter \"{raw_key}\" is given more than once; the last value is used"));
        }
        Ok(())
    }

    /// Sets the level-independent values of a key.
    pub fn set<S: Into<String>>(&mut self, key: &str, values: impl IntoIterator<Item = S>) {
        self.entries.entry(key.to_string()).or_default().default =
            Some(values.into_iter().map(Into::into).collect());
    }

    /// Sets the override of a key for one resolution level.
    pub fn set_level<S: Into<String>>(
        &mut self,
        key: &str,
        level: usize,
        values: impl IntoIterator<Item = S>,
    ) {
        self.entries
            .entry(key.to_string())
            .or_default()
            .levels
            .insert(level, values.into_iter().map(Into::into).collect());
    }

    pub fn entry(&self, key: &str) -> Option<&ParameterEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Level-independent values of a key.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).and_then(ParameterEntry::default_values)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Warnings collected while parsing (repeated keys).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Serializes the map back to parameter-file text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, entry) in &self.entries {
            if let Some(values) = &entry.default {
                out.push_str(&format_entry(key, values));
                out.push('\n');
            }
            for (level, values) in &entry.levels {
                out.push_str(&format_entry(&format!("{key}[{level}]"), values));
                out.push('\n');
            }
        }
        out
    }
}

fn syntax(line: usize, reason: &str) -> MultiRegError {
    MultiRegError::ParameterFileSyntax {
        line,
        reason: reason.to_string(),
    }
}

/// Splits `Key[3]` into `("Key", Some(3))`; `None` if the suffix is malformed.
fn split_level(raw: &str) -> Option<(&str, Option<usize>)> {
    match raw.find('[') {
        None => Some((raw, None)),
        Some(open) => {
            let inner = raw[open + 1..].strip_suffix(']')?;
            let level = inner.parse().ok()?;
            (open > 0).then_some((&raw[..open], Some(level)))
        }
    }
}

/// Formats one entry; numeric values stay bare, everything else is quoted.
pub fn format_entry<S: AsRef<str>>(key: &str, values: &[S]) -> String {
    let mut out = format!("({key}");
    for value in values {
        let value = value.as_ref();
        out.push(' ');
        if value.parse::<f64>().is_ok() {
            out.push_str(value);
        } else {
            out.push('"');
            out.push_str(value);
            out.push('"');
        }
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::{format_entry, ParameterMap};
    use crate::util::MultiRegError;

    #[test]
    fn parses_entries_comments_and_quotes() {
        let text = r#"
            // registration setup
            (Metric "AdvancedMeanSquares")
            (NumberOfResolutions 3)   // coarse to fine
            (ImagePyramidSchedule 4 4 2 2 1 1)
            (ResultImageFormat "a b")
        "#;
        let map = ParameterMap::parse(text).unwrap();
        assert_eq!(map.values("Metric").unwrap(), &["AdvancedMeanSquares".to_string()]);
        assert_eq!(map.values("ImagePyramidSchedule").unwrap().len(), 6);
        assert_eq!(map.values("ResultImageFormat").unwrap(), &["a b".to_string()]);
        assert!(map.warnings().is_empty());
    }

    #[test]
    fn level_suffix_declares_an_override() {
        let map = ParameterMap::parse("(MaximumStepLength 1.0)\n(MaximumStepLength[2] 0.25)").unwrap();
        let entry = map.entry("MaximumStepLength").unwrap();
        assert_eq!(entry.default_values().unwrap(), &["1.0".to_string()]);
        assert_eq!(entry.level_values(2).unwrap(), &["0.25".to_string()]);
        assert!(entry.level_values(1).is_none());
    }

    #[test]
    fn repeated_keys_warn_and_keep_last() {
        let map = ParameterMap::parse("(Metric \"A\")\n(Metric \"B\")").unwrap();
        assert_eq!(map.values("Metric").unwrap(), &["B".to_string()]);
        assert_eq!(map.warnings().len(), 1);
    }

    #[test]
    fn syntax_errors_report_the_line() {
        let err = ParameterMap::parse("(Metric \"A\"\n(Transform \"B\")").unwrap_err();
        assert_eq!(
            err,
            MultiRegError::ParameterFileSyntax {
                line: 2,
                reason: "nested \"(\"".to_string(),
            }
        );
        let err = ParameterMap::parse("(Key[x] 1)").unwrap_err();
        assert!(matches!(err, MultiRegError::ParameterFileSyntax { line: 1, .. }));
        assert!(ParameterMap::parse("(Metric \"A)").is_err());
    }

    #[test]
    fn text_round_trips() {
        let mut map = ParameterMap::new();
        map.set("Transform", ["TranslationTransform"]);
        map.set("TransformParameters", ["1.5", "-2"]);
        map.set_level("Scales", 1, ["10"]);
        let reparsed = ParameterMap::parse(&map.to_text()).unwrap();
        assert_eq!(reparsed, map);
        assert_eq!(format_entry("A", &["x", "3"]), "(A \"x\" 3)");
    }
}
