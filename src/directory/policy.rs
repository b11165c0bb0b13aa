//! Password complexity rules applied by [`MemoryDirectory`](super::MemoryDirectory).
//!
//! Mirrors the default Active Directory complexity policy so mock mode and
//! tests reject the same passwords a domain controller would.

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Checks `password` for account `sam_account_name`.
///
/// Returns the first violated rule as a human-readable message.
pub fn check_password(password: &str, sam_account_name: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }

    let classes = [
        password.chars().any(char::is_uppercase),
        password.chars().any(char::is_lowercase),
        password.chars().any(|c| c.is_ascii_digit()),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    if classes.iter().filter(|present| **present).count() < 3 {
        return Err(
            "must contain characters from three of: uppercase, lowercase, digits, symbols"
                .to_string(),
        );
    }

    let account = sam_account_name.trim_end_matches('$').to_lowercase();
    if account.chars().count() > 2 && password.to_lowercase().contains(&account) {
        return Err("must not contain the account name".to_string());
    }

    Ok(())
}
