use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::config::models::{ClusterSource, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem at once.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(config) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_ports(config) {
            errors.push(e);
        }

        if let Err(e) = Self::validate_cluster_source(&config.cluster_source) {
            errors.push(e);
        }

        for (field, value, allow_zero) in [
            ("quiescence_window", &config.quiescence_window, true),
            ("poll_interval", &config.poll_interval, false),
            ("resync_interval", &config.resync_interval, false),
            ("shutdown_timeout", &config.shutdown_timeout, true),
        ] {
            if let Err(e) = Self::validate_duration(field, value, allow_zero) {
                errors.push(e);
            }
        }

        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(config: &ServerConfig) -> ValidationResult<()> {
        if config.bind_ip().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: config.host.clone(),
                reason: "Must be an IP address (e.g., '0.0.0.0' or '::')".to_string(),
            });
        }
        Ok(())
    }

    /// Both listeners bind the same host, so the ports must differ. Port 0
    /// (pick any free port) may be used for both.
    fn validate_ports(config: &ServerConfig) -> ValidationResult<()> {
        if config.port != 0 && config.port == config.tls_port {
            return Err(ValidationError::InvalidField {
                field: "tls_port".to_string(),
                message: format!("must differ from port ({})", config.port),
            });
        }
        Ok(())
    }

    fn validate_cluster_source(source: &str) -> ValidationResult<()> {
        if source.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "cluster_source".to_string(),
            });
        }
        match ClusterSource::parse(source) {
            ClusterSource::Http(url) => Self::validate_url(&url, "cluster_source"),
            ClusterSource::File(_) => Ok(()),
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_duration(field: &str, value: &str, allow_zero: bool) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(d) if d == Duration::ZERO && !allow_zero => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "must be greater than zero".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("invalid duration '{value}' ({e}); use units like 500ms, 1s, 2m"),
            }),
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
