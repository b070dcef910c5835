// Config error types with helpful error messages
// Provides kind, document location, source context and suggestions

use std::fmt;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detailed config error with location and context
#[derive(Debug, Clone)]
pub struct ConfigError {
    /// Error message
    pub message: String,
    /// The kind of error
    pub kind: ConfigErrorKind,
    /// Line and column (1-indexed), when the parser reported one
    pub location: Option<(usize, usize)>,
    /// Path of the offending node, e.g. `targets[0].build_steps[1]`
    pub path: Option<String>,
    /// Surrounding source lines
    pub context: String,
    /// Optional suggestion for fixing the error
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// JSON/YAML syntax error
    Syntax,
    /// Structurally invalid document or step fields
    Malformed,
    /// No registered module owns the step discriminator
    UnknownStepType,
    /// More than one registered module claims the discriminator
    AmbiguousStepType,
    /// Two targets share a name
    DuplicateTarget,
    /// Document could not be read
    Io,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            location: None,
            path: None,
            context: String::new(),
            suggestion: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Malformed, message)
    }

    pub fn unknown_step_type(stage: impl fmt::Display, type_name: &str) -> Self {
        Self::new(
            ConfigErrorKind::UnknownStepType,
            format!("unknown {} step type '{}'", stage, type_name),
        )
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.location = Some((line, column));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn with_suggestion_opt(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    /// Create context from source content around the recorded line
    pub fn with_source_context(mut self, source: &str, context_lines: usize) -> Self {
        let Some((line, column)) = self.location else {
            return self;
        };

        let lines: Vec<&str> = source.lines().collect();
        let start = line.saturating_sub(context_lines + 1);
        let end = (line + context_lines).min(lines.len());

        let mut context = String::new();
        for (i, text) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = i + 1;
            let prefix = if line_num == line { ">" } else { " " };
            context.push_str(&format!("{} {:4} | {}\n", prefix, line_num, text));

            if line_num == line && column > 0 {
                let indicator = " ".repeat(column.saturating_sub(1)) + "^";
                context.push_str(&format!("       | {}\n", indicator));
            }
        }

        self.context = context;
        self
    }

    /// Create from a serde_json error
    pub fn from_json_error(err: &serde_json::Error, source: &str) -> Self {
        let kind = match err.classify() {
            serde_json::error::Category::Syntax | serde_json::error::Category::Eof => {
                ConfigErrorKind::Syntax
            }
            serde_json::error::Category::Io => ConfigErrorKind::Io,
            serde_json::error::Category::Data => ConfigErrorKind::Malformed,
        };
        let message = strip_position_suffix(&err.to_string());
        let suggestion = suggest_fix(&message);

        ConfigError::new(kind, message)
            .with_location(err.line(), err.column())
            .with_source_context(source, 2)
            .with_suggestion_opt(suggestion)
    }

    /// Create from a serde_yaml error
    pub fn from_yaml_error(err: &serde_yaml::Error, source: &str) -> Self {
        let message = strip_position_suffix(&err.to_string());
        let kind = if message.contains("did not find expected")
            || message.contains("found character")
            || message.contains("mapping values are not allowed")
        {
            ConfigErrorKind::Syntax
        } else {
            ConfigErrorKind::Malformed
        };
        let suggestion = suggest_fix(&message);

        let mut error = ConfigError::new(kind, message).with_suggestion_opt(suggestion);
        if let Some(location) = err.location() {
            error = error
                .with_location(location.line(), location.column())
                .with_source_context(source, 2);
        }
        error
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.message)?;

        if let Some(path) = &self.path {
            write!(f, "\n  --> at {}", path)?;
        }
        if let Some((line, column)) = self.location {
            write!(f, "\n  --> line {}:{}", line, column)?;
        }
        if !self.context.is_empty() {
            write!(f, "\n\n{}", self.context.trim_end())?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nhelp: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for ConfigError {}

/// serde appends " at line X column Y" to its messages; location is kept separately
fn strip_position_suffix(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Suggest fixes for common mistakes
fn suggest_fix(message: &str) -> Option<String> {
    if message.contains("missing field `project_name`") {
        return Some("every project document needs a top-level 'project_name'".to_string());
    }
    if message.contains("missing field `target_name`") {
        return Some("each entry under 'targets' needs a 'target_name'".to_string());
    }
    if message.contains("missing field `source`") {
        return Some(
            "each target needs a 'source' step, e.g. { \"type\": \"Git\", ... }".to_string(),
        );
    }
    if message.contains("unknown field") {
        return Some(
            "check the field name spelling; config fields use snake_case".to_string(),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_syntax_error_has_location() {
        let source = "{\n  \"project_name\": \"demo\",\n  \"targets\": [\n}";
        let err = serde_json::from_str::<serde_json::Value>(source).unwrap_err();
        let config_error = ConfigError::from_json_error(&err, source);

        assert_eq!(config_error.kind, ConfigErrorKind::Syntax);
        assert_eq!(config_error.location.map(|(line, _)| line), Some(4));
        assert!(config_error.context.contains(">    4 | }"));
        assert!(!config_error.message.contains(" at line "));
    }

    #[test]
    fn test_display_includes_path_and_help() {
        let error = ConfigError::malformed("missing field `command`")
            .with_path("targets[0].build_steps[0]")
            .with_suggestion("add a command");

        let rendered = error.to_string();
        assert!(rendered.starts_with("config error: missing field `command`"));
        assert!(rendered.contains("--> at targets[0].build_steps[0]"));
        assert!(rendered.contains("help: add a command"));
    }

    #[test]
    fn test_suggestion_for_missing_project_name() {
        let source = "{\"targets\": []}";

        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Doc {
            project_name: String,
        }

        let err = serde_json::from_str::<Doc>(source).unwrap_err();
        let config_error = ConfigError::from_json_error(&err, source);
        assert_eq!(config_error.kind, ConfigErrorKind::Malformed);
        assert!(config_error.suggestion.unwrap().contains("project_name"));
    }
}
