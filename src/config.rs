use crate::assembly::{AssemblyOptions, DEFAULT_PER_TYPE};
use crate::codec::{CodecOptions, DEFAULT_MAX_CELL_CHARS};
use std::path::PathBuf;

pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened at start-up, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub random_per_type: usize,
    pub max_cell_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            random_per_type: DEFAULT_PER_TYPE,
            max_cell_chars: DEFAULT_MAX_CELL_CHARS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unparseable or non-positive
    /// numbers keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(ws) = get("EXAMD_WORKSPACE") {
            cfg.workspace = Some(PathBuf::from(ws));
        }
        if let Some(filter) = get("EXAMD_LOG").or_else(|| get("RUST_LOG")) {
            cfg.log_filter = filter;
        }
        if let Some(n) = get("EXAMD_RANDOM_PER_TYPE").and_then(|v| v.parse::<usize>().ok()) {
            if n > 0 {
                cfg.random_per_type = n;
            }
        }
        if let Some(n) = get("EXAMD_MAX_CELL_CHARS").and_then(|v| v.parse::<usize>().ok()) {
            if n > 0 {
                cfg.max_cell_chars = n;
            }
        }
        cfg
    }

    pub fn assembly(&self) -> AssemblyOptions {
        AssemblyOptions {
            per_type: self.random_per_type,
        }
    }

    pub fn codec(&self) -> CodecOptions {
        CodecOptions {
            max_cell_chars: self.max_cell_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let cfg = Config::from_lookup(lookup(&[]));
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.assembly().per_type, 5);
        assert_eq!(cfg.codec().max_cell_chars, 256);
    }

    #[test]
    fn env_overrides_and_log_fallback() {
        let cfg = Config::from_lookup(lookup(&[
            ("EXAMD_WORKSPACE", "/tmp/ws"),
            ("RUST_LOG", "debug"),
            ("EXAMD_RANDOM_PER_TYPE", "3"),
            ("EXAMD_MAX_CELL_CHARS", "oops"),
        ]));
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(cfg.log_filter, "debug");
        assert_eq!(cfg.random_per_type, 3);
        assert_eq!(cfg.max_cell_chars, DEFAULT_MAX_CELL_CHARS);

        let cfg = Config::from_lookup(lookup(&[("EXAMD_LOG", "warn"), ("RUST_LOG", "debug")]));
        assert_eq!(cfg.log_filter, "warn");
    }
}
