//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Generate a prefixed identifier, e.g. `cb-3f2a...`
pub fn prefixed(prefix: &str) -> String {
    format!("{}-{}", prefix, generate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_is_unique() {
        let a = prefixed("cb");
        let b = prefixed("cb");
        assert!(a.starts_with("cb-"));
        assert_ne!(a, b);
    }
}
