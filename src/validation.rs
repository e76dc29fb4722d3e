use crate::errors::{ConfigError, ConfigResult};
use regex::Regex;
use std::sync::OnceLock;

/// A trait that configuration values implement for validation.
pub trait Validate {
    /// Validates the value and returns an error if validation fails.
    fn validate(&self) -> ConfigResult<()>;
}

// Common regex patterns
fn identifier_regex() -> &'static Regex {
    static IDENTIFIER_REGEX: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn hostname_regex() -> &'static Regex {
    static HOSTNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    HOSTNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*(:[0-9]{1,5})?$")
            .unwrap()
    })
}

/// Plain SQL identifier: safe to double-quote into generated statements
pub fn is_sql_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

/// DNS hostname with an optional port, as it appears in Canvas URLs
pub fn is_hostname(value: &str) -> bool {
    value.len() <= 253 && hostname_regex().is_match(value)
}

/// Quote an identifier for SQL text.
///
/// Catalog names are checked with `is_sql_identifier`, but column names read
/// back from the database are not, so embedded `"` is doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Hostname flags shared by pull and push.
///
/// `-c` selects the Canvas hostname; `-r` names its replacement and is only
/// meaningful when `-c` is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameFlags {
    pub canvas_hostname: Option<String>,
    pub replacement_hostname: Option<String>,
}

impl Validate for HostnameFlags {
    fn validate(&self) -> ConfigResult<()> {
        if self.replacement_hostname.is_some() && self.canvas_hostname.is_none() {
            return Err(ConfigError::flag_combination("-r", "-c"));
        }
        if let Some(host) = &self.canvas_hostname {
            if !is_hostname(host) {
                return Err(ConfigError::invalid_hostname("-c", host));
            }
        }
        if let Some(host) = &self.replacement_hostname {
            if !is_hostname(host) {
                return Err(ConfigError::invalid_hostname("-r", host));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_sql_identifier("courses"));
        assert!(is_sql_identifier("_whiteboard_elements2"));
        assert!(!is_sql_identifier("2courses"));
        assert!(!is_sql_identifier("courses; DROP TABLE users"));
        assert!(!is_sql_identifier("\"quoted\""));
        assert!(!is_sql_identifier(""));
    }

    #[test]
    fn test_hostname_validation() {
        assert!(is_hostname("canvas.example.edu"));
        assert!(is_hostname("bcourses.berkeley.edu"));
        assert!(is_hostname("localhost:3000"));
        assert!(!is_hostname("https://canvas.example.edu"));
        assert!(!is_hostname("canvas.example.edu/courses"));
        assert!(!is_hostname("-bad.edu"));
        assert!(!is_hostname(""));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(quote_identifier("a\"; DROP TABLE x; --"), "\"a\"\"; DROP TABLE x; --\"");
    }

    #[test]
    fn test_replacement_requires_canvas_hostname() {
        let flags = HostnameFlags {
            canvas_hostname: None,
            replacement_hostname: Some("canvas.new.edu".to_string()),
        };
        assert_eq!(
            flags.validate().unwrap_err(),
            ConfigError::flag_combination("-r", "-c")
        );
    }

    #[test]
    fn test_hostname_flags_valid_combinations() {
        assert!(HostnameFlags::default().validate().is_ok());

        let filter_only = HostnameFlags {
            canvas_hostname: Some("canvas.old.edu".to_string()),
            replacement_hostname: None,
        };
        assert!(filter_only.validate().is_ok());

        let both = HostnameFlags {
            canvas_hostname: Some("canvas.old.edu".to_string()),
            replacement_hostname: Some("canvas.new.edu".to_string()),
        };
        assert!(both.validate().is_ok());
    }

    #[test]
    fn test_hostname_flags_reject_urls() {
        let flags = HostnameFlags {
            canvas_hostname: Some("https://canvas.old.edu".to_string()),
            replacement_hostname: None,
        };
        assert!(matches!(
            flags.validate(),
            Err(ConfigError::InvalidHostname { .. })
        ));
    }
}
