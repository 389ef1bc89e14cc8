use crate::utils::error::{MappingError, Result};
use regex::Regex;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> MappingError {
    MappingError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// An absolute http(s) URL, such as the EDGAR archive root.
pub fn validate_url(field: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| invalid(field, raw, format!("not a URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(field, raw, format!("scheme '{}' is not http(s)", other))),
    }
}

pub fn validate_path(field: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field, path, "path is empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field, path, "path contains a NUL byte"));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(field, value, format!("must be within {}..={}", min, max)));
    }
    Ok(())
}

pub fn validate_at_least(field: &str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(invalid(field, value, format!("must be at least {}", min)));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| MappingError::MissingConfigError {
        field: field.to_string(),
    })
}

pub fn validate_non_empty_string(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, value, "must not be blank"));
    }
    Ok(())
}

/// EDGAR refuses anonymous clients; the agent must name a contact address.
pub fn validate_user_agent(field: &str, agent: &str) -> Result<()> {
    validate_non_empty_string(field, agent)?;
    if !agent.split_whitespace().any(|word| word.contains('@')) {
        return Err(invalid(
            field,
            agent,
            "must include a contact email, e.g. \"Jane Smith jane@example.com\"",
        ));
    }
    Ok(())
}

pub fn validate_patterns(field: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns {
        Regex::new(pattern).map_err(|e| invalid(field, pattern, e.to_string()))?;
    }
    Ok(())
}
