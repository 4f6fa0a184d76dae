//! Interactive prompts

use anyhow::{Context, Result};
use dialoguer::{Confirm, Password, theme::ColorfulTheme};
use tracing::{debug, warn};

/// Password source for scripted use
pub const PASSWORD_ENV_VAR: &str = "CURFEW_PASSWORD";

/// Skips confirmations when set
pub const YES_ENV_VAR: &str = "CURFEW_YES";

/// Wrong passwords accepted before a command gives up
pub const MAX_PASSWORD_ATTEMPTS: u32 = 3;

fn password_from_env() -> Option<String> {
    std::env::var(PASSWORD_ENV_VAR).ok().map(|pw| {
        debug!("using password from {} env var", PASSWORD_ENV_VAR);
        warn!(
            "Using password from {} environment variable. \
             Environment variables may be visible to other processes via /proc on Linux.",
            PASSWORD_ENV_VAR
        );
        pw
    })
}

pub fn password(prompt: &str) -> Result<String> {
    if let Some(pw) = password_from_env() {
        return Ok(pw);
    }
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()
        .context("Failed to read password")
}

pub fn new_password(prompt: &str) -> Result<String> {
    if let Some(pw) = password_from_env() {
        return Ok(pw);
    }
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords don't match")
        .interact()
        .context("Failed to read password")
}

pub fn confirm(prompt: &str) -> Result<bool> {
    if std::env::var(YES_ENV_VAR).is_ok() {
        return Ok(true);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// Ask for a password until `check` accepts it. An env-supplied password
/// gets a single try since asking again would return the same value.
pub fn with_attempts<T>(
    prompt: &str,
    mut check: impl FnMut(&str) -> Result<Option<T>>,
) -> Result<T> {
    let attempts = if std::env::var(PASSWORD_ENV_VAR).is_ok() {
        1
    } else {
        MAX_PASSWORD_ATTEMPTS
    };

    for attempt in 1..=attempts {
        let pw = password(prompt)?;
        if let Some(value) = check(&pw)? {
            return Ok(value);
        }
        let left = attempts - attempt;
        if left > 0 {
            eprintln!("Incorrect password ({} attempt(s) left)", left);
        }
    }
    anyhow::bail!("Incorrect password")
}
