//! Nanoid-style identifier generation.
//!
//! Opinionated helpers with a preset length and alphabet, plus prefixed
//! variants (`<prefix>_<id>`) for typed identifiers.

use rand::Rng;

/// Preset id length used by the prefixed helpers.
pub const LENGTH: usize = 17;

/// Preset alphabet used by the prefixed helpers.
pub const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVXZWKYabcdefghijklmnopqrstuvxzwky0123456789";

/// Returns a new id of `length` characters drawn from `alphabet`.
pub fn generate(alphabet: &str, length: usize) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    debug_assert!(!chars.is_empty(), "alphabet must not be empty");

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}

/// Returns a function that generates ids with the given configuration.
pub fn generator(alphabet: impl Into<String>, length: usize) -> impl Fn() -> String {
    let alphabet = alphabet.into();
    move || generate(&alphabet, length)
}

/// Verifies that `id` is `length` characters, all drawn from `alphabet`.
pub fn is_valid(alphabet: &str, length: usize, id: &str) -> bool {
    id.chars().count() == length && id.chars().all(|c| alphabet.contains(c))
}

/// Returns a new id of the preset length and alphabet, prefixed as
/// `<prefix>_<id>`.
pub fn generate_prefixed(prefix: &str) -> String {
    format!("{prefix}_{}", generate(ALPHABET, LENGTH))
}

/// Returns a function that generates prefixed ids.
pub fn prefixed_generator(prefix: impl Into<String>) -> impl Fn() -> String {
    let prefix = prefix.into();
    move || generate_prefixed(&prefix)
}

/// Verifies that `id` is `<prefix>_<id>` with the preset length and
/// alphabet.
pub fn is_valid_prefixed(prefix: &str, id: &str) -> bool {
    match id.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('_')) {
        Some(rest) => is_valid(ALPHABET, LENGTH, rest),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_respects_alphabet_and_length() {
        let id = generate("abc", 32);
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| "abc".contains(c)));
    }

    #[test]
    fn generated_ids_validate() {
        for _ in 0..100 {
            let id = generate(ALPHABET, LENGTH);
            assert!(is_valid(ALPHABET, LENGTH, &id));
        }
    }

    #[test]
    fn is_valid_rejects_wrong_length_and_foreign_chars() {
        assert!(!is_valid("abc", 3, "ab"));
        assert!(!is_valid("abc", 3, "abd"));
        assert!(is_valid("abc", 3, "cba"));
    }

    #[test]
    fn prefixed_ids_round_trip() {
        let id = generate_prefixed("user");
        assert!(id.starts_with("user_"));
        assert!(is_valid_prefixed("user", &id));
        assert!(!is_valid_prefixed("org", &id));
    }

    #[test]
    fn prefixed_validation_rejects_malformed_ids() {
        assert!(!is_valid_prefixed("user", "user-abc"));
        assert!(!is_valid_prefixed("user", "user_"));
        assert!(!is_valid_prefixed("user", &format!("user_{}", "!".repeat(LENGTH))));
    }

    #[test]
    fn generators_are_reusable() {
        let gen = generator("xyz", 8);
        assert_ne!(gen(), gen());

        let gen = prefixed_generator("task");
        let id = gen();
        assert!(is_valid_prefixed("task", &id));
    }
}
