//! Configuration validation.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_tasks(config, &mut result);

        Ok(result)
    }

    /// Number of whitespace-separated fields a cron expression must have.
    pub fn cron_field_count_ok(cron: &str) -> bool {
        matches!(cron.split_whitespace().count(), 6 | 7)
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.max_workers == 0 {
            result.add_error(ValidationError::new(
                "scheduler.max_workers",
                "max_workers must be at least 1",
            ));
        } else if scheduler.max_workers > 64 {
            result.add_warning(ValidationWarning::new(
                "scheduler.max_workers",
                "max_workers is very high (>64)",
            ));
        }

        if scheduler.shutdown_grace_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "scheduler.shutdown_grace_secs",
                "Grace period is 0, in-flight jobs are abandoned immediately on shutdown",
            ));
        }

        let timezone = scheduler.timezone.to_ascii_lowercase();
        if timezone != "utc" && timezone != "local" {
            result.add_error(ValidationError::new(
                "scheduler.timezone",
                format!(
                    "Unknown timezone '{}', valid values: UTC, local",
                    scheduler.timezone
                ),
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        // Anything else is treated as a filter directive such as "taskhands=debug".
        if !LOG_LEVELS.contains(&level.as_str()) && !level.contains('=') {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, LOG_LEVELS
                ),
            ));
        }
    }

    fn validate_tasks(config: &Config, result: &mut ValidationResult) {
        if config.tasks.is_empty() {
            result.add_warning(ValidationWarning::new("tasks", "No tasks configured"));
        }

        let mut normalized: HashMap<String, &str> = HashMap::new();

        for (key, entry) in &config.tasks {
            let path = format!("tasks.{}", key);

            if key.trim().is_empty() || key.trim() != key {
                result.add_error(ValidationError::new(
                    &path,
                    "Task key must be non-empty without surrounding whitespace",
                ));
            }

            if entry.cron.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.cron", path),
                    "Cron expression cannot be empty",
                ));
            } else if !Self::cron_field_count_ok(&entry.cron) {
                result.add_error(ValidationError::new(
                    format!("{}.cron", path),
                    format!(
                        "Expected 6 or 7 fields (seconds first), got {}",
                        entry.cron.split_whitespace().count()
                    ),
                ));
            }

            if entry.job.as_deref().is_some_and(|job| job.trim().is_empty()) {
                result.add_error(ValidationError::new(
                    format!("{}.job", path),
                    "Job kind cannot be empty",
                ));
            }

            let folded = key.to_ascii_lowercase().replace('_', "-");
            if let Some(previous) = normalized.insert(folded, key) {
                result.add_warning(ValidationWarning::new(
                    &path,
                    format!("Task key is easily confused with '{}'", previous),
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
