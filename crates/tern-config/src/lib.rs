use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Locations searched when no explicit config path is given, in priority order.
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./tern.toml", "~/.config/tern/config.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub computer_control: ComputerControlConfig,
}

/// Which wire protocol the model endpoint speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    /// OpenAI chat-completions, including compatible gateways reached via `base_url`.
    #[serde(rename = "openai")]
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
        }
    }

    fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAI),
            other => anyhow::bail!("Unknown provider '{}'. Valid providers: anthropic, openai", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: String,
    /// Falls back to the provider's conventional environment variable when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            model: "claude-sonnet-4-5".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 8192,
            temperature: None,
        }
    }
}

impl ProviderConfig {
    /// The configured key, or the one exported in the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(self.kind.api_key_env_var()).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Hard cap on model calls per operator request.
    pub max_iterations: u32,
    pub enable_streaming: bool,
    /// Ask before running tools that change files, spawn processes or drive the desktop.
    pub confirm_side_effects: bool,
    /// Number of turns kept in persisted session memory.
    pub history_limit: usize,
    pub max_retry_attempts: u32,
    pub bash_timeout_seconds: u64,
    pub bash_output_limit_bytes: usize,
    pub max_glob_results: usize,
    pub max_grep_matches: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            enable_streaming: true,
            confirm_side_effects: true,
            history_limit: 50,
            max_retry_attempts: 3,
            bash_timeout_seconds: 120,
            bash_output_limit_bytes: 30_000,
            max_glob_results: 200,
            max_grep_matches: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComputerControlConfig {
    pub enabled: bool,
    /// Attach a screenshot when a request appears to be about what is on screen.
    pub auto_capture: bool,
    pub command_timeout_seconds: u64,
    /// Captures wider than this are scaled down before being sent to the model.
    pub max_screenshot_width: u32,
}

impl Default for ComputerControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_capture: true,
            command_timeout_seconds: 10,
            max_screenshot_width: 1568,
        }
    }
}

impl Config {
    /// Load configuration, writing a default document on first run.
    ///
    /// With an explicit path that does not exist yet, the defaults are written
    /// there. Otherwise the default search paths are tried and, when none
    /// exists, `~/.config/tern/config.toml` is created.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = Self::resolve_path(config_path);

        if !path.exists() {
            let default_config = Self::default();
            if let Err(e) = default_config.save(&path) {
                eprintln!("Warning: Could not save default config: {}", e);
            } else {
                info!("Created default configuration at {}", path.display());
                println!("Created default configuration at: {}", path.display());
            }
            return Ok(default_config);
        }

        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Parse a TOML document; missing keys take their default values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The file `load` reads (or creates) for `config_path`.
    pub fn resolve_path(config_path: Option<&str>) -> PathBuf {
        match config_path {
            Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
            None => Self::find_existing_config().unwrap_or_else(Self::default_config_path),
        }
    }

    fn find_existing_config() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
            let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
            expanded.exists().then_some(expanded)
        })
    }

    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .map(|mut path| {
                path.push(".config");
                path.push("tern");
                path.push("config.toml");
                path
            })
            .unwrap_or_else(|| PathBuf::from("tern.toml"))
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be at least 1");
        }
        if self.agent.bash_timeout_seconds == 0 {
            anyhow::bail!("agent.bash_timeout_seconds must be at least 1");
        }
        if self.provider.model.trim().is_empty() {
            anyhow::bail!("provider.model must not be empty");
        }
        Ok(())
    }

    /// The document as `save` writes it.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the configuration via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = self.to_toml()?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, toml_string)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load_with_overrides(
        config_path: Option<&str>,
        provider_override: Option<String>,
        model_override: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(provider) = provider_override {
            config.provider.kind = provider.parse()?;
        }

        if let Some(model) = model_override {
            config.provider.model = model;
        }

        Ok(config)
    }

    /// Look up a dotted key such as `agent.max_iterations`.
    pub fn get_value(&self, key: &str) -> Result<String> {
        let root = toml::Value::try_from(self)?;
        let mut current = &root;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("Unknown configuration key '{}'", key))?;
        }
        Ok(match current {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Set a dotted key from its textual form, keeping the existing value's type.
    ///
    /// The updated document is re-validated; on failure `self` is untouched.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut root = toml::Value::try_from(&*self)?;
        let (section_path, leaf) = match key.rsplit_once('.') {
            Some((section, leaf)) => (Some(section), leaf),
            None => (None, key),
        };

        // Absent optional keys have no type to follow; a literal string is the fallback
        let candidates = match section_table(&mut root, section_path, key)?.get(leaf) {
            Some(existing) => vec![parse_like(existing, raw)
                .with_context(|| format!("Invalid value '{}' for '{}'", raw, key))?],
            None if section_path.is_some() => {
                let inferred = infer_value(raw);
                let literal = toml::Value::String(raw.to_string());
                if inferred == literal {
                    vec![inferred]
                } else {
                    vec![inferred, literal]
                }
            }
            None => anyhow::bail!("Unknown configuration key '{}'", key),
        };

        let mut last_error = None;
        for new_value in candidates {
            if matches!(new_value, toml::Value::Table(_)) {
                anyhow::bail!("'{}' is a section, not a value", key);
            }
            section_table(&mut root, section_path, key)?.insert(leaf.to_string(), new_value);
            match root.clone().try_into::<Config>() {
                Ok(updated) => {
                    // Unknown leaf keys are silently dropped by serde; detect that case.
                    if section_path.is_some() && updated.get_value(key).is_err() {
                        anyhow::bail!("Unknown configuration key '{}'", key);
                    }
                    updated.validate()?;
                    *self = updated;
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => Err(anyhow::Error::new(e).context(format!("Invalid value '{}' for '{}'", raw, key))),
            None => anyhow::bail!("Invalid value '{}' for '{}'", raw, key),
        }
    }
}

/// The table holding `key`'s leaf, walking `section_path` from the root.
fn section_table<'a>(
    root: &'a mut toml::Value,
    section_path: Option<&str>,
    key: &str,
) -> Result<&'a mut toml::value::Table> {
    let mut table = root
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("Configuration root is not a table"))?;
    if let Some(section_path) = section_path {
        for part in section_path.split('.') {
            table = table
                .get_mut(part)
                .and_then(|v| v.as_table_mut())
                .ok_or_else(|| anyhow::anyhow!("Unknown configuration key '{}'", key))?;
        }
    }
    Ok(table)
}

fn parse_like(existing: &toml::Value, raw: &str) -> Result<toml::Value> {
    Ok(match existing {
        toml::Value::Boolean(_) => toml::Value::Boolean(parse_bool(raw)?),
        toml::Value::Integer(_) => toml::Value::Integer(raw.trim().parse()?),
        toml::Value::Float(_) => toml::Value::Float(raw.trim().parse()?),
        toml::Value::Table(_) => toml::Value::Table(Default::default()),
        _ => toml::Value::String(raw.to_string()),
    })
}

fn infer_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.trim().parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.trim().parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.trim().parse::<f64>() {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests;
