use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_backend(config)?;
    validate_timeouts(config)?;
    validate_proxy_url("proxy", config.backend.proxy.as_deref())?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_backend(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
        return Err(validation_err(
            "backend.base_url must start with http:// or https://",
        ));
    }
    url::Url::parse(&backend.base_url)
        .map_err(|err| validation_err(format!("backend.base_url is not a valid URL: {err}")))?;
    if !backend.chat_path.starts_with('/') {
        return Err(validation_err("backend.chat_path must start with '/'"));
    }
    Ok(())
}

fn validate_timeouts(config: &AppConfig) -> Result<(), ConfigError> {
    let backend = &config.backend;
    if backend.connect_timeout_secs == 0 {
        return Err(validation_err(
            "backend.connect_timeout_secs must be greater than 0",
        ));
    }
    if let Some(idle) = backend.idle_read_timeout_secs {
        if idle == 0 {
            return Err(validation_err(
                "backend.idle_read_timeout_secs must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_proxy_url(field_name: &str, proxy: Option<&str>) -> Result<(), ConfigError> {
    let Some(proxy) = proxy.map(str::trim) else {
        return Ok(());
    };
    if proxy.is_empty() {
        return Err(validation_err(format!(
            "backend.{field_name} cannot be empty when set"
        )));
    }
    let parsed = url::Url::parse(proxy).map_err(|err| {
        validation_err(format!("backend.{field_name} is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "backend.{field_name} must use http:// or https://"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            backend: BackendConfig {
                base_url: "http://10.0.0.5:927".to_string(),
                ..BackendConfig::default()
            },
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = make_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = make_valid_config();
        config.backend.base_url = "ftp://bad.url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_chat_path_requires_leading_slash() {
        let mut config = make_valid_config();
        config.backend.chat_path = "api/rag/chat".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut config = make_valid_config();
        config.backend.idle_read_timeout_secs = Some(0);
        assert!(validate_config(&config).is_err());

        config.backend.idle_read_timeout_secs = None;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let mut config = make_valid_config();
        config.backend.connect_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = make_valid_config();
        config.features.log_level = "VERBOSE".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = make_valid_config();
        config.features.log_level = "warning".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_proxy_must_be_http() {
        let mut config = make_valid_config();
        config.backend.proxy = Some("socks5://127.0.0.1:1080".to_string());
        assert!(validate_config(&config).is_err());

        config.backend.proxy = Some("   ".to_string());
        assert!(validate_config(&config).is_err());

        config.backend.proxy = Some("http://127.0.0.1:3128".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
