//! Command-line argument map.
//!
//! Arguments are consumed as `key value` pairs. Every `-p` is queued in order
//! and also stored as `-p(1)`, `-p(2)`, ...; any other key keeps its first
//! value and later duplicates only produce a warning. `-out` always ends with
//! a path separator.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Usage hint printed when no (or an unrecognized single) argument is given.
pub const USAGE_HINT: &str = "Use \"multireg --help\" for information about multireg-usage.";

/// What the command line asks for.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandLine {
    /// Print the usage hint and exit successfully.
    Usage,
    /// Print the help text and exit successfully.
    Help,
    /// Print the version and exit successfully.
    Version,
    /// Run the registration with these arguments.
    Run(ArgumentMap),
}

impl CommandLine {
    /// Interprets the arguments that follow the program name.
    pub fn parse<S: AsRef<str>>(argv0: &str, args: &[S]) -> Self {
        match args {
            [] => Self::Usage,
            [only] => match only.as_ref() {
                "-help" | "--help" => Self::Help,
                "--version" => Self::Version,
                _ => Self::Usage,
            },
            _ => Self::Run(ArgumentMap::from_args(argv0, args)),
        }
    }
}

/// Ordered key/value arguments of one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArgumentMap {
    entries: BTreeMap<String, String>,
    parameter_files: Vec<String>,
    warnings: Vec<String>,
}

impl ArgumentMap {
    /// Builds the map from `key value` pairs; a trailing unpaired key is ignored.
    pub fn from_args<S: AsRef<str>>(argv0: &str, args: &[S]) -> Self {
        let mut map = Self::default();
        for pair in args.chunks_exact(2) {
            map.push(pair[0].as_ref(), pair[1].as_ref());
        }
        map.entries.insert("-argv0".to_string(), argv0.to_string());
        map
    }

    fn push(&mut self, key: &str, value: &str) {
        if key == "-p" {
            self.parameter_files.push(value.to_string());
            let indexed = format!("-p({})", self.parameter_files.len());
            self.entries.insert(indexed, value.to_string());
            return;
        }
        let mut value = value.to_string();
        if key == "-out" && !value.ends_with(std::path::MAIN_SEPARATOR) && !value.ends_with('/')
        {
            value.push(std::path::MAIN_SEPARATOR);
        }
        if self.entries.contains_key(key) {
            self.warnings.push(format!(
                "argument {key} is only required once; \"{key} {value}\" is ignored"
            ));
        } else {
            self.entries.insert(key.to_string(), value);
        }
    }

    /// Value of an argument.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets an argument, replacing any earlier value.
    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Parameter files in the order they were given.
    pub fn parameter_files(&self) -> &[String] {
        &self.parameter_files
    }

    /// Normalized `-out` directory.
    pub fn output_directory(&self) -> Option<PathBuf> {
        self.get("-out").map(PathBuf::from)
    }

    /// Warnings collected while parsing (duplicate keys).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// A copy of the map with `-p` pointing at one stage's parameter file.
    pub fn for_stage(&self, parameter_file: &str) -> Self {
        let mut stage = self.clone();
        stage.entries.insert("-p".to_string(), parameter_file.to_string());
        stage
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
