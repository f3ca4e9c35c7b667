#[cfg(test)]
mod tests {
    use crate::{Config, ProviderKind};
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.max_iterations, 25);
        assert_eq!(config.agent.bash_timeout_seconds, 120);
        assert!(config.agent.enable_streaming);
        assert!(config.agent.confirm_side_effects);
        assert_eq!(config.provider.kind, ProviderKind::Anthropic);
        assert!(!config.computer_control.enabled);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(config_path.to_str().unwrap())).unwrap();
        assert_eq!(config, Config::default());
        assert!(config_path.exists(), "default config should be written on first run");

        // Second load reads the file that was just written
        let reloaded = Config::load(Some(config_path.to_str().unwrap())).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_document_merges_over_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[provider]
kind = "openai"
model = "gpt-4o"
base_url = "https://gateway.example.com/v1"

[agent]
max_iterations = 10
confirm_side_effects = false
"#,
        )
        .unwrap();

        let config = Config::load(Some(config_path.to_str().unwrap())).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::OpenAI);
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("https://gateway.example.com/v1")
        );
        assert_eq!(config.agent.max_iterations, 10);
        assert!(!config.agent.confirm_side_effects);
        // Untouched keys keep their defaults
        assert_eq!(config.agent.history_limit, 50);
        assert!(config.agent.enable_streaming);
        assert_eq!(config.computer_control.max_screenshot_width, 1568);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_toml_str("[agent]\nmax_iterations = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_iterations"));

        assert!(Config::from_toml_str("[provider]\nkind = \"gemini\"\n").is_err());
    }

    #[test]
    fn test_overrides_apply_last() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Config::default().save(&config_path).unwrap();

        let config = Config::load_with_overrides(
            Some(config_path.to_str().unwrap()),
            Some("openai".to_string()),
            Some("gpt-4.1".to_string()),
        )
        .unwrap();
        assert_eq!(config.provider.kind, ProviderKind::OpenAI);
        assert_eq!(config.provider.model, "gpt-4.1");

        let err = Config::load_with_overrides(
            Some(config_path.to_str().unwrap()),
            Some("nope".to_string()),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_get_and_set_values() {
        let mut config = Config::default();
        assert_eq!(config.get_value("agent.max_iterations").unwrap(), "25");
        assert_eq!(config.get_value("provider.model").unwrap(), "claude-sonnet-4-5");

        config.set_value("agent.max_iterations", "7").unwrap();
        assert_eq!(config.agent.max_iterations, 7);

        config.set_value("agent.enable_streaming", "off").unwrap();
        assert!(!config.agent.enable_streaming);

        config.set_value("provider.base_url", "http://localhost:8080").unwrap();
        assert_eq!(config.provider.base_url.as_deref(), Some("http://localhost:8080"));

        config.set_value("provider.temperature", "0.5").unwrap();
        assert_eq!(config.provider.temperature, Some(0.5));
    }

    #[test]
    fn test_set_unset_string_key_from_numeric_text() {
        let mut config = Config::default();
        assert!(config.provider.api_key.is_none());

        config.set_value("provider.api_key", "12345").unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("12345"));

        config.set_value("provider.base_url", "true").unwrap();
        assert_eq!(config.provider.base_url.as_deref(), Some("true"));
    }

    #[test]
    fn test_set_value_errors_leave_config_untouched() {
        let mut config = Config::default();
        let before = config.clone();

        assert!(config.set_value("agent.max_iterations", "lots").is_err());
        assert!(config.set_value("agent.max_iterations", "0").is_err());
        assert!(config.set_value("agent.no_such_key", "1").is_err());
        assert!(config.set_value("nowhere.key", "1").is_err());
        assert!(config.set_value("agent", "1").is_err());

        assert_eq!(config, before);
    }

    #[test]
    #[serial]
    fn test_api_key_falls_back_to_environment() {
        let mut config = Config::default();
        std::env::set_var("ANTHROPIC_API_KEY", "env-key");
        assert_eq!(config.provider.resolved_api_key().as_deref(), Some("env-key"));

        config.provider.api_key = Some("file-key".to_string());
        assert_eq!(config.provider.resolved_api_key().as_deref(), Some("file-key"));
        std::env::remove_var("ANTHROPIC_API_KEY");

        config.provider.api_key = Some("   ".to_string());
        assert_eq!(config.provider.resolved_api_key(), None);
    }

    #[test]
    fn test_save_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.provider.api_key = Some("secret".to_string());
        config.computer_control.enabled = true;
        config.save(&config_path).unwrap();

        let loaded = Config::load(Some(config_path.to_str().unwrap())).unwrap();
        assert_eq!(loaded, config);
        assert!(!temp_dir.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn test_explicit_path_is_resolved_as_given() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom.toml");
        assert_eq!(Config::resolve_path(config_path.to_str()), config_path);
    }

    #[test]
    fn test_to_toml_contains_sections() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[agent]"));
        assert!(rendered.contains("max_iterations = 25"));
        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
