use crate::diagnostics::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};
use crate::{LoggingConfig, MetadataConflictPolicy, StrataConfig, MAX_PAGE_SIZE};

impl StrataConfig {
    /// Validate semantic invariants for a configuration.
    ///
    /// Validation reports as many problems as possible in one pass.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();

        validate_logging(self, &mut out);
        validate_storage(self, &mut out);
        validate_metadata(self, &mut out);
        validate_workspace(self, &mut out);

        out
    }
}

fn validate_logging(config: &StrataConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }

    if config.logging.buffer_lines == 0 {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "logging.buffer_lines".to_string(),
            message: "must be >= 1; using a single-line buffer".to_string(),
        });
    }
}

fn validate_storage(config: &StrataConfig, out: &mut ValidationDiagnostics) {
    let page_size = config.storage.page_size;
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        out.errors.push(ConfigValidationError::InvalidValue {
            toml_path: "storage.page_size".to_string(),
            message: format!("must be between 1 and {MAX_PAGE_SIZE} (got {page_size})"),
        });
    }
}

fn validate_metadata(config: &StrataConfig, out: &mut ValidationDiagnostics) {
    if config.metadata.on_conflict == MetadataConflictPolicy::FirstWins
        && !config.metadata.freeze_on_load
    {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "metadata.freeze_on_load".to_string(),
            message: "`first_wins` conflict resolution expects a frozen registry".to_string(),
        });
    }
}

fn validate_workspace(config: &StrataConfig, out: &mut ValidationDiagnostics) {
    if config.workspace.slow_listener_ms == 0 {
        out.warnings.push(ConfigWarning::InvalidValue {
            toml_path: "workspace.slow_listener_ms".to_string(),
            message: "0 reports every listener invocation as slow".to_string(),
        });
    }
}
