//! Ordered discovery of host utilities.

use std::collections::{HashMap, HashSet};

/// What the probe can observe about the host.
pub trait Host: Send + Sync {
    fn has_program(&self, name: &str) -> bool;
    fn env_var(&self, key: &str) -> Option<String>;
}

pub struct SystemHost;

impl Host for SystemHost {
    fn has_program(&self, name: &str) -> bool {
        tern_execution::find_executable(name).is_some()
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Fixed host description, for tests and headless overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub programs: HashSet<String>,
    pub env: HashMap<String, String>,
}

impl StaticHost {
    pub fn with_programs(programs: &[&str]) -> Self {
        Self {
            programs: programs.iter().map(|p| p.to_string()).collect(),
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

impl Host for StaticHost {
    fn has_program(&self, name: &str) -> bool {
        self.programs.contains(name)
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.env.get(key).cloned()
    }
}

/// First candidate whose utility exists on the host.
pub fn first_available<T: Copy>(host: &dyn Host, candidates: &[(T, &str)]) -> Option<T> {
    candidates
        .iter()
        .find(|(_, program)| host.has_program(program))
        .map(|(backend, _)| *backend)
}
