//! Integration tests for layered configuration loading

use figment::Jail;
use rentcast_ingest::config::{AppConfig, ConfigError};
use rentcast_ingest::fetcher::{FetchSettings, Fetcher, FetcherError};
use std::time::Duration;

#[test]
fn test_defaults_without_file_or_env() {
    Jail::expect_with(|_jail| {
        let config = AppConfig::load(None).unwrap();
        // The key may come from the caller's environment
        let config = AppConfig {
            api_key: None,
            ..config
        };
        assert_eq!(config, AppConfig::default());
        Ok(())
    });
}

#[test]
fn test_toml_file_overrides_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "rentcast.toml",
            r#"
            requests_per_second = 5
            default_page_size = 100
            max_attempts = 4
            max_pages = 12
            database_url = "sqlite://listings.db"
            "#,
        )?;

        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.requests_per_second, 5);
        assert_eq!(config.default_page_size, 100);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.max_pages, Some(12));
        assert_eq!(config.database_url, "sqlite://listings.db");
        // Untouched keys keep their defaults
        assert_eq!(config.max_page_size, 500);
        assert_eq!(config.base_url, "https://api.rentcast.io");
        Ok(())
    });
}

#[test]
fn test_environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            r#"
            requests_per_second = 5
            api_key = "from-file"
            "#,
        )?;
        jail.set_env("RENTCAST_REQUESTS_PER_SECOND", "8");
        jail.set_env("RENTCAST_API_KEY", "from-env");

        let config = AppConfig::load(Some("custom.toml".as_ref())).unwrap();
        assert_eq!(config.requests_per_second, 8);
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        Ok(())
    });
}

#[test]
fn test_settings_follow_config() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "rentcast.toml",
            r#"
            default_page_size = 25
            max_attempts = 6
            request_timeout_secs = 9
            base_backoff_ms = 200
            "#,
        )?;

        let config = AppConfig::load(None).unwrap();
        let settings = FetchSettings::from_config(&config);
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.timeout, Duration::from_secs(9));
        assert_eq!(settings.retry.max_attempts, 6);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(200));
        Ok(())
    });
}

#[test]
fn test_out_of_range_values_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("zero-rate.toml", "requests_per_second = 0")?;
        jail.create_file("big-page.toml", "max_page_size = 1000")?;
        jail.create_file("jitter.toml", "jitter_ratio = 2.0")?;

        for file in ["zero-rate.toml", "big-page.toml", "jitter.toml"] {
            let err = AppConfig::load(Some(file.as_ref())).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{file}: {err}");
        }
        Ok(())
    });
}

#[test]
fn test_malformed_values_fail_extraction() {
    Jail::expect_with(|jail| {
        jail.create_file("bad.toml", r#"max_attempts = "lots""#)?;

        let err = AppConfig::load(Some("bad.toml".as_ref())).unwrap_err();
        assert!(matches!(err, ConfigError::Extract(_)), "{err}");
        Ok(())
    });
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    Jail::expect_with(|_jail| {
        let err = AppConfig::load(Some("nowhere.toml".as_ref())).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
        Ok(())
    });
}

#[test]
fn test_fetcher_requires_api_key() {
    Jail::expect_with(|jail| {
        jail.set_env("RENTCAST_API_KEY", "   ");

        let config = AppConfig::load(None).unwrap();
        let err = Fetcher::from_config(&config).unwrap_err();
        assert!(matches!(err, FetcherError::MissingApiKey));
        Ok(())
    });
}
