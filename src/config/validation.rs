use std::{collections::HashSet, net::SocketAddr};

use crate::{
    config::models::{ForwardingConfig, GatewayConfig, ServiceConfig},
    core::rate_limiter::refill_period,
};

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

    #[error("Duplicate service name '{name}'")]
    DuplicateService { name: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Bring service prefixes into canonical form (leading `/`).
    pub fn normalize(config: &mut GatewayConfig) {
        for service in &mut config.services {
            let trimmed = service.prefix.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('/') {
                let adjusted = format!("/{trimmed}");
                tracing::warn!(
                    service = %service.name,
                    prefix = %adjusted,
                    "Service prefix adjusted to start with '/'"
                );
                service.prefix = adjusted;
            } else if trimmed.len() != service.prefix.len() {
                service.prefix = trimmed.to_string();
            }
        }
    }

    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, service) in config.services.iter().enumerate() {
            if let Err(mut service_errors) = Self::validate_service(index, service) {
                errors.append(&mut service_errors);
            }
            if !service.name.is_empty() && !seen.insert(service.name.as_str()) {
                errors.push(ValidationError::DuplicateService {
                    name: service.name.clone(),
                });
            }
        }

        if config.rate_limiting.burst == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limiting.burst".to_string(),
                message: "Burst must be greater than 0".to_string(),
            });
        }

        if let Err(mut forwarding_errors) = Self::validate_forwarding(&config.forwarding) {
            errors.append(&mut forwarding_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:8001' or '0.0.0.0:8001')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single service entry
    fn validate_service(index: usize, service: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let label = if service.name.is_empty() {
            format!("service {index}")
        } else {
            format!("service '{}'", service.name)
        };

        if service.name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("service {index}: name"),
            });
        }

        if service.prefix.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("{label}: prefix"),
            });
        } else if !service.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} prefix"),
                message: "Service prefixes must start with '/'".to_string(),
            });
        }

        if service.hosts.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} hosts"),
                message: "At least one host is required".to_string(),
            });
        }
        for (i, host) in service.hosts.iter().enumerate() {
            if let Err(e) = Self::validate_url(host, &format!("{label} host {i}")) {
                errors.push(e);
            }
        }

        if service.port <= 0 {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} port"),
                message: "Port must be positive".to_string(),
            });
        }

        if service.burst == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: format!("{label} burst"),
                message: "Burst must be greater than 0".to_string(),
            });
        }

        match service.rate_limit {
            Some(rate) if !rate.is_finite() => errors.push(ValidationError::InvalidField {
                field: format!("{label} rate_limit"),
                message: "Rate limit must be a finite number".to_string(),
            }),
            // Zero and negative rates mean unlimited.
            Some(rate) if rate > 0.0 => {
                if let Err(message) = refill_period(rate) {
                    errors.push(ValidationError::InvalidField {
                        field: format!("{label} rate_limit"),
                        message: format!("Rate limit {message}"),
                    });
                }
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_forwarding(config: &ForwardingConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(raw) = &config.request_timeout {
            match humantime::parse_duration(raw) {
                Ok(d) if d.is_zero() => errors.push(ValidationError::InvalidField {
                    field: "forwarding.request_timeout".to_string(),
                    message: "Timeout must be greater than 0".to_string(),
                }),
                Ok(_) => {}
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: "forwarding.request_timeout".to_string(),
                    message: format!("Invalid duration '{raw}': {e}"),
                }),
            }
        }

        if let Err(e) = humantime::parse_duration(&config.pool_idle_timeout) {
            errors.push(ValidationError::InvalidField {
                field: "forwarding.pool_idle_timeout".to_string(),
                message: format!("Invalid duration '{}': {e}", config.pool_idle_timeout),
            });
        }

        if config.max_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "forwarding.max_body_bytes".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
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
