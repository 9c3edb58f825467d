//! Credential checking against the statically configured user list.

use crate::config::Credential;

/// Walk the configured list and return true on the first matching
/// (username, password) pair. Spec.md §4.2 permits upgrading this to a
/// constant-time comparison; plain equality is the reference contract.
pub fn check(users: &[Credential], username: &str, password: &str) -> bool {
    users
        .iter()
        .any(|c| c.username == username && c.password == password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<Credential> {
        vec![Credential {
            username: "admin".to_string(),
            password: "123456".to_string(),
        }]
    }

    #[test]
    fn test_valid_credentials() {
        assert!(check(&users(), "admin", "123456"));
    }

    #[test]
    fn test_wrong_password() {
        assert!(!check(&users(), "admin", "wrong"));
    }

    #[test]
    fn test_unknown_user() {
        assert!(!check(&users(), "nobody", "123456"));
    }
}
