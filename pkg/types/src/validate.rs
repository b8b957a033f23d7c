use anyhow::{Result, bail};

const MAX_SEGMENT_LEN: usize = 63;

/// Validate an object name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    check_length("name", name)?;
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        bail!(
            "name '{}' contains '{}'; only lowercase letters, digits, and hyphens are allowed",
            name,
            c
        );
    }
    Ok(())
}

/// Validate a label value such as a principal id or tenant short name.
/// Rules: empty, or max 63 chars of `[A-Za-z0-9._-]` starting and ending
/// with an alphanumeric.
pub fn validate_label_value(value: &str) -> Result<()> {
    check_length("label value", value)?;
    if value.is_empty() {
        return Ok(());
    }
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(value.chars().next()) || !edge_ok(value.chars().last()) {
        bail!("label value '{}' must start and end with a letter or digit", value);
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        bail!("label value '{}' contains '{}'", value, c);
    }
    Ok(())
}

fn check_length(what: &str, value: &str) -> Result<()> {
    if value.len() > MAX_SEGMENT_LEN {
        bail!(
            "{} '{}' exceeds {} characters (got {})",
            what,
            value,
            MAX_SEGMENT_LEN,
            value.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_name("c1").is_ok());
        assert!(validate_name("pro-4f9a1").is_ok());
        assert!(validate_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("Pro-1").is_err());
        assert!(validate_name("pro_1").is_err());
        assert!(validate_name("-pro").is_err());
        assert!(validate_name("pro-").is_err());
        assert!(validate_name(&"p".repeat(64)).is_err());
    }

    #[test]
    fn label_values() {
        assert!(validate_label_value("").is_ok());
        assert!(validate_label_value("u-42").is_ok());
        assert!(validate_label_value("Acme.Corp_1").is_ok());
        assert!(validate_label_value("-u").is_err());
        assert!(validate_label_value("u.").is_err());
        assert!(validate_label_value("a b").is_err());
        assert!(validate_label_value("sso_user://x").is_err());
        assert!(validate_label_value(&"x".repeat(64)).is_err());
    }
}
