//! Field rules shared by the auth and admin payloads.
//!
//! The functions have the shape `garde` expects from `#[garde(custom(..))]`.

/// Validates a username: 3 to 64 ASCII letters or digits.
pub fn username<T: AsRef<str> + ?Sized>(value: &T, _ctx: &()) -> garde::Result {
    let value = value.as_ref();
    if value.len() < 3 {
        return Err(garde::Error::new("Username must be at least 3 characters long"));
    }

    if value.len() > 64 {
        return Err(garde::Error::new("Username must be at most 64 characters"));
    }

    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(garde::Error::new("Username must be alphanumeric"));
    }

    Ok(())
}

/// Validates password strength: 8 to 128 characters with an uppercase
/// letter, a lowercase letter, a digit and a symbol.
pub fn strong_password<T: AsRef<str> + ?Sized>(value: &T, _ctx: &()) -> garde::Result {
    let value = value.as_ref();
    if value.len() < 8 {
        return Err(garde::Error::new("Password must be at least 8 characters long"));
    }

    if value.len() > 128 {
        return Err(garde::Error::new("Password must be at most 128 characters"));
    }

    let has_upper = value.chars().any(|c| c.is_uppercase());
    let has_lower = value.chars().any(|c| c.is_lowercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    let has_symbol = value.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !(has_upper && has_lower && has_digit && has_symbol) {
        return Err(garde::Error::new(
            "Password must include uppercase, lowercase, number, and symbol",
        ));
    }

    Ok(())
}

/// Validates a role or permission name: lowercase letters, digits and `_`.
pub fn identifier<T: AsRef<str> + ?Sized>(value: &T, _ctx: &()) -> garde::Result {
    let value = value.as_ref();
    if value.is_empty() || value.len() > 64 {
        return Err(garde::Error::new("Must be between 1 and 64 characters"));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(garde::Error::new(
            "Must contain only lowercase letters, numbers, and underscores",
        ));
    }

    Ok(())
}

/// Validates a non-empty permission list of identifiers.
pub fn permission_list<T: AsRef<[String]> + ?Sized>(value: &T, ctx: &()) -> garde::Result {
    let value = value.as_ref();
    if value.is_empty() {
        return Err(garde::Error::new("Permissions must be a non-empty list"));
    }
    value.iter().try_for_each(|p| identifier(p.trim(), ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(username("clerk01", &()).is_ok());
        assert!(username("ab", &()).is_err());
        assert!(username("no_underscore", &()).is_err());
        assert!(username("spa ce", &()).is_err());
    }

    #[test]
    fn passwords_need_every_class() {
        assert!(strong_password("Str0ng!pass", &()).is_ok());
        assert!(strong_password("Sh0rt!", &()).is_err());
        assert!(strong_password("alllowercase1!", &()).is_err());
        assert!(strong_password("NoDigits!here", &()).is_err());
        assert!(strong_password("NoSymbols123", &()).is_err());
    }

    #[test]
    fn permission_lists() {
        assert!(permission_list(&vec!["view_audit_logs".to_string()], &()).is_ok());
        assert!(permission_list(&Vec::<String>::new(), &()).is_err());
        assert!(permission_list(&vec!["Bad-Name".to_string()], &()).is_err());
    }
}
