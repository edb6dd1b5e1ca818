//! JSON parameter files (feature `json`).
//!
//! A JSON parameter file is one object; each member is a scalar or an array of
//! scalars, and member names may carry the same `[level]` suffix as text
//! parameter files:
//!
//! ```json
//! { "Metric": "AdvancedMeanSquares", "NumberOfResolutions": 2,
//!   "MaximumStepLength[1]": 0.5, "ImagePyramidSchedule": [2, 2, 1, 1] }
//! ```

use crate::config::parameter_file::ParameterMap;
use crate::util::{MultiRegError, MultiRegResult};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonScalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl JsonScalar {
    fn into_value(self) -> String {
        match self {
            JsonScalar::Bool(b) => b.to_string(),
            JsonScalar::Number(n) => n.to_string(),
            JsonScalar::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonEntry {
    One(JsonScalar),
    Many(Vec<JsonScalar>),
}

impl ParameterMap {
    /// Parses a JSON parameter file.
    pub fn from_json_str(text: &str) -> MultiRegResult<Self> {
        let object: BTreeMap<String, JsonEntry> =
            serde_json::from_str(text).map_err(|err| MultiRegError::ParameterFileSyntax {
                line: err.line(),
                reason: err.to_string(),
            })?;
        let mut map = ParameterMap::new();
        for (key, entry) in object {
            let values = match entry {
                JsonEntry::One(v) => vec![v.into_value()],
                JsonEntry::Many(vs) => vs.into_iter().map(JsonScalar::into_value).collect(),
            };
            map.insert(&key, values, 0)?;
        }
        Ok(map)
    }
}
