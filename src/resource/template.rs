//! Path templates (`projects/{{project}}/regions/{{region}}/...`)
//!
//! The same template renders both the ReconcilerID and request URLs.
//! Variables after the `?` are percent-encoded.

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

const VARIABLE_PATTERN: &str = r"\{\{(\w+)\}\}";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no value for template variable {0:?}")]
    MissingValue(String),

    #[error("invalid pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
}

fn variable_regex() -> Result<Regex, TemplateError> {
    Regex::new(VARIABLE_PATTERN).map_err(|e| TemplateError::Pattern {
        pattern: VARIABLE_PATTERN.to_string(),
        message: e.to_string(),
    })
}

/// Substitute every `{{var}}` using `lookup`
pub fn render<F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let re = variable_regex()?;
    let query_start = template.find('?').unwrap_or(template.len());

    let mut out = String::with_capacity(template.len());
    let mut last_end = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = lookup(name.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TemplateError::MissingValue(name.as_str().to_string()))?;

        out.push_str(&template[last_end..whole.start()]);
        if whole.start() > query_start {
            out.push_str(&urlencoding::encode(&value));
        } else {
            out.push_str(&value);
        }
        last_end = whole.end();
    }
    out.push_str(&template[last_end..]);

    Ok(out)
}

/// Names of the variables a template uses, in order
pub fn variables(template: &str) -> Vec<String> {
    match variable_regex() {
        Ok(re) => re
            .captures_iter(template)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Match `import_id` against each pattern in order, first match wins
///
/// Patterns are anchored at both ends. Returns the named groups of the
/// matching pattern.
pub fn parse_import(
    formats: &[&str],
    import_id: &str,
) -> Result<Option<HashMap<String, String>>, TemplateError> {
    for format in formats {
        let anchored = format!("^{}$", format);
        let re = Regex::new(&anchored).map_err(|e| TemplateError::Pattern {
            pattern: format.to_string(),
            message: e.to_string(),
        })?;

        if let Some(caps) = re.captures(import_id) {
            let groups = re
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect();
            return Ok(Some(groups));
        }
    }

    Ok(None)
}
