use crate::errors::{ConfigError, ConfigResult};
use crate::types::FieldValue;
use crate::validation::{HostnameFlags, Validate};
use regex::Regex;
use std::borrow::Cow;

/// Replaces references to one Canvas hostname with another.
///
/// A reference is an occurrence of the hostname (case-insensitive) that is not
/// part of a longer hostname: `https://canvas.old.edu/courses/1` and a bare
/// `canvas.old.edu` both match, `api.canvas.old.edu` and
/// `canvas.old.edu.example.com` do not.
#[derive(Debug, Clone)]
pub struct HostnameRewriteRule {
    match_host: String,
    replacement_host: String,
    pattern: Regex,
}

impl HostnameRewriteRule {
    pub fn new(match_host: &str, replacement_host: &str) -> ConfigResult<Self> {
        let flags = HostnameFlags {
            canvas_hostname: Some(match_host.to_string()),
            replacement_hostname: Some(replacement_host.to_string()),
        };
        flags.validate()?;

        let pattern = Regex::new(&format!("(?i){}", regex::escape(match_host)))
            .map_err(|e| ConfigError::invalid_hostname("-c", &format!("{} ({})", match_host, e)))?;

        Ok(Self {
            match_host: match_host.to_string(),
            replacement_host: replacement_host.to_string(),
            pattern,
        })
    }

    /// Build the rule from `-c`/`-r`; `None` when no replacement was requested
    pub fn from_flags(flags: &HostnameFlags) -> ConfigResult<Option<Self>> {
        flags.validate()?;
        match (&flags.canvas_hostname, &flags.replacement_hostname) {
            (Some(match_host), Some(replacement)) => Ok(Some(Self::new(match_host, replacement)?)),
            _ => Ok(None),
        }
    }

    pub fn match_host(&self) -> &str {
        &self.match_host
    }

    pub fn replacement_host(&self) -> &str {
        &self.replacement_host
    }

    pub fn rewrite<'a>(&self, value: &'a str) -> Cow<'a, str> {
        let mut rewritten: Option<String> = None;
        let mut last = 0;

        for found in self.pattern.find_iter(value) {
            if !is_reference(value, found.start(), found.end()) {
                continue;
            }
            let buffer = rewritten.get_or_insert_with(|| String::with_capacity(value.len()));
            buffer.push_str(&value[last..found.start()]);
            buffer.push_str(&self.replacement_host);
            last = found.end();
        }

        match rewritten {
            Some(mut buffer) => {
                buffer.push_str(&value[last..]);
                Cow::Owned(buffer)
            }
            None => Cow::Borrowed(value),
        }
    }

    pub fn rewrite_field(&self, value: FieldValue) -> FieldValue {
        match value {
            FieldValue::Text(text) => {
                let replaced = match self.rewrite(&text) {
                    Cow::Owned(replaced) => Some(replaced),
                    Cow::Borrowed(_) => None,
                };
                FieldValue::Text(replaced.unwrap_or(text))
            }
            other => other,
        }
    }
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn is_reference(value: &str, start: usize, end: usize) -> bool {
    if let Some(before) = value[..start].chars().next_back() {
        if is_host_char(before) {
            return false;
        }
    }

    let mut after = value[end..].chars();
    match after.next() {
        None => true,
        // A trailing period ends a sentence unless another label follows
        Some('.') => after.next().map_or(true, |c| !is_host_char(c)),
        Some(c) => !is_host_char(c),
    }
}
