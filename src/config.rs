//! Option registry: dotted-name configuration keys
//! (`matrix.preproc.xform`, `matrix.preproc.min_coverage`,
//! `affinity.cores`, ...), seeded from `CSX_`-prefixed environment
//! variables and overridable by explicit calls, consumed by the public
//! facade to build [`crate::encode::EncodeConfig`]/[`crate::build::BuildConfig`].

use std::collections::BTreeMap;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Result<bool, Error> {
        match self {
            OptionValue::Bool(b) => Ok(*b),
            _ => Err(Error::InvalidConfig(format!("expected bool, got {self:?}"))),
        }
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match self {
            OptionValue::Int(i) => Ok(*i),
            _ => Err(Error::InvalidConfig(format!("expected int, got {self:?}"))),
        }
    }

    pub fn as_float(&self) -> Result<f64, Error> {
        match self {
            OptionValue::Float(f) => Ok(*f),
            OptionValue::Int(i) => Ok(*i as f64),
            _ => Err(Error::InvalidConfig(format!("expected float, got {self:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            OptionValue::Str(s) => Ok(s),
            _ => Err(Error::InvalidConfig(format!("expected string, got {self:?}"))),
        }
    }

    /// Parses a raw environment-variable string into the best-fitting
    /// variant: `true`/`false` -> bool, an integer literal -> int, a
    /// float literal -> float, anything else -> string.
    fn from_env_str(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return OptionValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return OptionValue::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return OptionValue::Float(f);
        }
        OptionValue::Str(raw.to_string())
    }
}

/// Converts a dotted option key (`matrix.preproc.min_coverage`) into its
/// environment-variable name (`CSX_MATRIX_PREPROC_MIN_COVERAGE`).
fn env_name(key: &str) -> String {
    format!("CSX_{}", key.to_uppercase().replace('.', "_"))
}

/// A dotted-name key/value store, seeded from the process environment at
/// construction and mutable afterward via [`Config::set`], which always
/// takes precedence over whatever the environment provided.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: BTreeMap<String, OptionValue>,
}

impl Config {
    /// Every key in `known_keys` is looked up in the environment (as
    /// `CSX_<KEY_UPPER_WITH_UNDERSCORES>`) and recorded if present.
    pub fn from_env(known_keys: &[&str]) -> Self {
        let mut values = BTreeMap::new();
        for &key in known_keys {
            if let Ok(raw) = std::env::var(env_name(key)) {
                values.insert(key.to_string(), OptionValue::from_env_str(&raw));
            }
        }
        Self { values }
    }

    pub fn set(&mut self, key: &str, value: OptionValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, Error> {
        self.values.get(key).map(|v| v.as_bool()).transpose().map(|v| v.unwrap_or(default))
    }

    pub fn get_int(&self, key: &str, default: i64) -> Result<i64, Error> {
        self.values.get(key).map(|v| v.as_int()).transpose().map(|v| v.unwrap_or(default))
    }

    pub fn get_float(&self, key: &str, default: f64) -> Result<f64, Error> {
        self.values.get(key).map(|v| v.as_float()).transpose().map(|v| v.unwrap_or(default))
    }

    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, Error> {
        match self.values.get(key) {
            Some(v) => v.as_str(),
            None => Ok(default),
        }
    }
}

/// Every option key this crate recognizes, used both to seed [`Config::from_env`]
/// and (not enforced here) to validate a caller's explicit `set` calls.
pub const KNOWN_KEYS: &[&str] = &[
    "matrix.preproc.xform",
    "matrix.preproc.min_unit_size",
    "matrix.preproc.max_unit_size",
    "matrix.preproc.min_coverage",
    "matrix.preproc.split_blocks",
    "matrix.preproc.sampling",
    "matrix.symmetric",
    "affinity.cores",
    "runtime.nr_threads",
    "runtime.numa",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_set_overrides_default() {
        let mut cfg = Config::default();
        assert_eq!(cfg.get_float("matrix.preproc.min_coverage", 0.1).unwrap(), 0.1);
        cfg.set("matrix.preproc.min_coverage", OptionValue::Float(0.25));
        assert_eq!(cfg.get_float("matrix.preproc.min_coverage", 0.1).unwrap(), 0.25);
    }

    #[test]
    fn env_name_uppercases_and_replaces_dots() {
        assert_eq!(env_name("matrix.preproc.xform"), "CSX_MATRIX_PREPROC_XFORM");
    }

    #[test]
    fn from_env_parses_typed_values() {
        // SAFETY: test-only, single-threaded env mutation.
        unsafe {
            std::env::set_var("CSX_RUNTIME_NR_THREADS", "4");
        }
        let cfg = Config::from_env(&["runtime.nr_threads"]);
        assert_eq!(cfg.get_int("runtime.nr_threads", 1).unwrap(), 4);
        unsafe {
            std::env::remove_var("CSX_RUNTIME_NR_THREADS");
        }
    }
}
