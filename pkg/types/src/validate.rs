use anyhow::{Result, bail};
use pkg_constants::controller::MAX_DURATION_SECONDS;

/// Validate a Kubernetes-style resource name.
/// Rules: lowercase `[a-z0-9-]`, max 63 chars, no leading/trailing hyphens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name.len() > 63 {
        bail!("name '{}' exceeds 63 characters (got {})", name, name.len());
    }
    if name.starts_with('-') || name.ends_with('-') {
        bail!("name '{}' must not start or end with a hyphen", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!(
            "name '{}' must contain only lowercase letters, digits, and hyphens [a-z0-9-]",
            name
        );
    }
    Ok(())
}

/// Validate a window or inactivity duration given in whole seconds.
/// Negative values cannot be represented; overly large ones are rejected so
/// that instant arithmetic never leaves the calendar range.
pub fn validate_duration_seconds(field: &str, secs: u64) -> Result<()> {
    if secs > MAX_DURATION_SECONDS {
        bail!(
            "{} must be at most {} seconds (got {})",
            field,
            MAX_DURATION_SECONDS,
            secs
        );
    }
    Ok(())
}
