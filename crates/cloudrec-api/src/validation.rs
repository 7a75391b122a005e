//! Input validation utilities for console forms
//!
//! Every failure here is caught at form-commit time and never reaches the
//! network layer.

use validator::ValidationError;

/// Maximum length for rule_code field
pub const MAX_RULE_CODE_LENGTH: usize = 128;

/// Maximum length for rule_name field
pub const MAX_RULE_NAME_LENGTH: usize = 128;

/// Maximum length for a notification target name (group chat name)
pub const MAX_TARGET_NAME_LENGTH: usize = 256;

/// Maximum length for a webhook / callback url
pub const MAX_URL_LENGTH: usize = 2048;

/// Validate rule_code format
///
/// Rule code must:
/// - Not be empty
/// - Not exceed MAX_RULE_CODE_LENGTH characters
/// - Contain only alphanumeric characters, hyphens, and underscores
pub fn validate_rule_code(rule_code: &str) -> Result<(), ValidationError> {
    if rule_code.is_empty() {
        return Err(ValidationError::new("rule_code_empty"));
    }
    if rule_code.len() > MAX_RULE_CODE_LENGTH {
        return Err(ValidationError::new("rule_code_too_long"));
    }
    if !rule_code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::new("rule_code_invalid_chars"));
    }
    Ok(())
}

/// Validate rule_name (blank names are rejected)
pub fn validate_rule_name(rule_name: &str) -> Result<(), ValidationError> {
    if rule_name.trim().is_empty() {
        return Err(ValidationError::new("rule_name_empty"));
    }
    if rule_name.chars().count() > MAX_RULE_NAME_LENGTH {
        return Err(ValidationError::new("rule_name_too_long"));
    }
    Ok(())
}

/// Validate a notification target name
pub fn validate_target_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("target_name_empty"));
    }
    if name.chars().count() > MAX_TARGET_NAME_LENGTH {
        return Err(ValidationError::new("target_name_too_long"));
    }
    Ok(())
}

/// Validate a webhook / callback url; only http(s) is accepted
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::new("url_empty"));
    }
    if url.len() > MAX_URL_LENGTH {
        return Err(ValidationError::new("url_too_long"));
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ValidationError::new("url_invalid")),
    }
}

/// Validate a time-of-day entry of a timing schedule (`HH:mm`)
pub fn validate_time_of_day(time: &str) -> Result<(), ValidationError> {
    let Some((hour, minute)) = time.split_once(':') else {
        return Err(ValidationError::new("time_invalid"));
    };
    if hour.len() != 2 || minute.len() != 2 {
        return Err(ValidationError::new("time_invalid"));
    }
    match (hour.parse::<u8>(), minute.parse::<u8>()) {
        (Ok(h), Ok(m)) if h < 24 && m < 60 => Ok(()),
        _ => Err(ValidationError::new("time_invalid")),
    }
}

/// Deepest nesting of `(` and `!` accepted in a condition expression
pub const MAX_CONDITION_DEPTH: usize = 32;

#[derive(Debug, PartialEq)]
enum CondToken {
    Id(u32),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Validate a whitelist condition over config item ids, e.g. `1 && (2 || !3)`.
///
/// `&&` binds tighter than `||`. Every id must be one of `ids`.
pub fn validate_condition(condition: &str, ids: &[u32]) -> Result<(), ValidationError> {
    let tokens =
        tokenize_condition(condition).ok_or_else(|| ValidationError::new("condition_invalid_token"))?;
    let mut pos = 0;
    parse_or(&tokens, &mut pos, ids, 0)?;
    if pos != tokens.len() {
        return Err(ValidationError::new("condition_trailing_tokens"));
    }
    Ok(())
}

fn tokenize_condition(condition: &str) -> Option<Vec<CondToken>> {
    let mut tokens = Vec::new();
    let mut chars = condition.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' => tokens.push(CondToken::Open),
            ')' => tokens.push(CondToken::Close),
            '!' => tokens.push(CondToken::Not),
            '&' | '|' => {
                chars.next_if_eq(&c)?;
                tokens.push(if c == '&' { CondToken::And } else { CondToken::Or });
            }
            c if c.is_ascii_digit() => {
                let mut digits = c.to_string();
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    digits.push(d);
                }
                tokens.push(CondToken::Id(digits.parse().ok()?));
            }
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    Some(tokens)
}

fn parse_or(
    tokens: &[CondToken],
    pos: &mut usize,
    ids: &[u32],
    depth: usize,
) -> Result<(), ValidationError> {
    parse_and(tokens, pos, ids, depth)?;
    while tokens.get(*pos) == Some(&CondToken::Or) {
        *pos += 1;
        parse_and(tokens, pos, ids, depth)?;
    }
    Ok(())
}

fn parse_and(
    tokens: &[CondToken],
    pos: &mut usize,
    ids: &[u32],
    depth: usize,
) -> Result<(), ValidationError> {
    parse_unary(tokens, pos, ids, depth)?;
    while tokens.get(*pos) == Some(&CondToken::And) {
        *pos += 1;
        parse_unary(tokens, pos, ids, depth)?;
    }
    Ok(())
}

fn parse_unary(
    tokens: &[CondToken],
    pos: &mut usize,
    ids: &[u32],
    depth: usize,
) -> Result<(), ValidationError> {
    if depth > MAX_CONDITION_DEPTH {
        return Err(ValidationError::new("condition_too_deep"));
    }
    match tokens.get(*pos) {
        Some(CondToken::Not) => {
            *pos += 1;
            parse_unary(tokens, pos, ids, depth + 1)
        }
        Some(CondToken::Open) => {
            *pos += 1;
            parse_or(tokens, pos, ids, depth + 1)?;
            if tokens.get(*pos) != Some(&CondToken::Close) {
                return Err(ValidationError::new("condition_unbalanced"));
            }
            *pos += 1;
            Ok(())
        }
        Some(CondToken::Id(id)) if ids.contains(id) => {
            *pos += 1;
            Ok(())
        }
        Some(CondToken::Id(_)) => Err(ValidationError::new("condition_unknown_id")),
        _ => Err(ValidationError::new("condition_incomplete")),
    }
}
