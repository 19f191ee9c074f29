//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("matching.candidate_limit must be between 1 and 100, got {0}")]
    InvalidCandidateLimit(u32),
    #[error("limits.outbound_queue must be at least 1")]
    InvalidOutboundQueue,
    #[error("limits.max_message_bytes ({0}) must not exceed limits.max_frame_bytes ({1})")]
    MessageLargerThanFrame(usize, usize),
    #[error("timeouts.ping and timeouts.timeout must be at least 1 second")]
    InvalidTimeouts,
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    let limit = config.matching.candidate_limit;
    if !(1..=100).contains(&limit) {
        errors.push(ValidationError::InvalidCandidateLimit(limit));
    }

    if config.limits.outbound_queue == 0 {
        errors.push(ValidationError::InvalidOutboundQueue);
    }
    if config.limits.max_message_bytes > config.limits.max_frame_bytes {
        errors.push(ValidationError::MessageLargerThanFrame(
            config.limits.max_message_bytes,
            config.limits.max_frame_bytes,
        ));
    }

    if config.timeouts.ping == 0 || config.timeouts.timeout == 0 {
        errors.push(ValidationError::InvalidTimeouts);
    }

    // TLS validation
    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    // Database path validation
    if let Some(ref db) = config.database {
        if db.path != ":memory:" {
            if let Some(parent) = Path::new(&db.path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    errors.push(ValidationError::DatabasePathInvalid(db.path.clone()));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> String {
        r#"
[server]
name = "support.local"

[listen]
address = "127.0.0.1:8080"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_server_name_fails() {
        let toml = r#"
[server]
name = " "

[listen]
address = "127.0.0.1:8080"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::MissingServerName)));
    }

    #[test]
    fn test_all_errors_are_collected() {
        let toml = r#"
[server]
name = ""

[listen]
address = "127.0.0.1:8080"

[matching]
candidate_limit = 0

[limits]
outbound_queue = 0
max_message_bytes = 10
max_frame_bytes = 5

[timeouts]
ping = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
    }

    #[test]
    fn test_missing_tls_cert_fails() {
        let toml = r#"
[server]
name = "support.local"

[listen]
address = "127.0.0.1:8080"

[tls]
address = "127.0.0.1:8443"
cert_path = "/nonexistent/cert.pem"
key_path = "/nonexistent/key.pem"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::TlsCertNotFound(_))));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::TlsKeyNotFound(_))));
    }

    #[test]
    fn test_memory_database_skips_path_check() {
        let toml = format!("{}\n[database]\npath = \":memory:\"\n", minimal_valid_config());
        let config: Config = toml::from_str(&toml).unwrap();
        assert!(validate(&config).is_ok());
    }
}
