//! Field checks shared by the request handlers.
//!
//! Every check trims its input and returns the cleaned value, or a
//! `BadRequest` naming the offending field.

use crate::error::{AppError, AppResult};

/// Required text with a character-count range.
pub fn text(field: &str, value: &str, min: usize, max: usize) -> AppResult<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            return Err(AppError::bad_request(format!("{} cannot be empty", field)));
        }
        return Err(AppError::bad_request(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    if len > max {
        return Err(AppError::bad_request(format!(
            "{} must be {} characters or less",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Optional text: absent or blank becomes `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> AppResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => text(field, v, 1, max).map(Some),
    }
}

pub fn username(value: &str) -> AppResult<String> {
    let value = text("username", value, 3, 30)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AppError::bad_request(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(value)
}

pub fn email(value: Option<&str>) -> AppResult<Option<String>> {
    let Some(value) = optional_text("email", value, 254)? else {
        return Ok(None);
    };
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Some(value)),
        _ => Err(AppError::bad_request("email is not a valid address")),
    }
}

pub fn password(value: &str) -> AppResult<&str> {
    let len = value.chars().count();
    if !(8..=128).contains(&len) {
        return Err(AppError::bad_request(
            "password must be between 8 and 128 characters",
        ));
    }
    Ok(value)
}

/// Absolute http(s) URL, or a path served by this service (`/uploads/...`).
pub fn link(field: &str, value: &str) -> AppResult<String> {
    let value = text(field, value, 1, 2048)?;
    if value.starts_with('/') && !value.starts_with("//") {
        return Ok(value);
    }
    match url::Url::parse(&value) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(value),
        _ => Err(AppError::bad_request(format!(
            "{} must be an http(s) URL",
            field
        ))),
    }
}

pub fn optional_link(field: &str, value: Option<&str>) -> AppResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => link(field, v).map(Some),
    }
}

/// Parse one value of a closed set, naming the field on failure.
pub fn choice<T: std::str::FromStr<Err = String>>(field: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|e: String| AppError::bad_request(format!("{}: {}", field, e)))
}
