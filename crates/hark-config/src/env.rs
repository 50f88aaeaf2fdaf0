use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Failure while substituting `{{ env.VAR }}` placeholders
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("line {line}: environment variable `{name}` is not set")]
    Missing { line: usize, name: String },
    #[error("line {line}: unsupported placeholder scope `{key}`, expected `env.NAME`")]
    Scope { line: usize, key: String },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `{{ env.NAME }}` or `{{ env.NAME | default("value") }}`
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Substitute environment placeholders in raw configuration text
///
/// Comment lines are copied verbatim so documented examples never need the
/// variables they mention.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for (index, line) in input.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
        } else {
            lines.push(expand_line(index + 1, line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line_number: usize, line: &str) -> Result<String, ExpandError> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |captures: &Captures<'_>| {
        match resolve(line_number, &captures[1], captures.get(2).map(|m| m.as_str())) {
            Ok(value) => value,
            Err(error) => {
                failure.get_or_insert(error);
                String::new()
            }
        }
    });

    match failure {
        Some(error) => Err(error),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(line: usize, key: &str, default: Option<&str>) -> Result<String, ExpandError> {
    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(ExpandError::Scope {
            line,
            key: key.to_string(),
        });
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ExpandError::Missing {
            line,
            name: name.to_string(),
        }),
    }
}
