//! Validation rule composition.
//!
//! Small reusable rules for validating identifiers at the RPC boundary,
//! and the adapter that turns a failed validation into an
//! `INVALID_ARGUMENT` gRPC status.

use thiserror::Error;

use crate::id;

/// A failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// A validation rule over a string value.
pub trait Rule: Send + Sync {
    fn validate(&self, value: &str) -> Result<(), ValidationError>;
}

/// Runs every rule against `value`, stopping at the first failure.
pub fn validate(value: &str, rules: &[&dyn Rule]) -> Result<(), ValidationError> {
    for rule in rules {
        rule.validate(value)?;
    }
    Ok(())
}

/// Maps a failed validation to an `INVALID_ARGUMENT` gRPC status.
pub fn invalid_argument(err: ValidationError) -> tonic::Status {
    tonic::Status::invalid_argument(format!("invalid argument: {err}"))
}

/// Rule checking that a value is a prefixed id with the preset length and
/// alphabet of the [`id`](crate::id) module.
pub fn is_id(prefix: impl Into<String>) -> impl Rule {
    IdRule {
        prefix: prefix.into(),
        alphabet: None,
        length: None,
    }
}

/// Rule checking that a value is a nanoid with an explicit alphabet and
/// length, optionally prefixed.
pub fn is_nanoid(prefix: impl Into<String>, alphabet: impl Into<String>, length: usize) -> impl Rule {
    IdRule {
        prefix: prefix.into(),
        alphabet: Some(alphabet.into()),
        length: Some(length),
    }
}

struct IdRule {
    prefix: String,
    alphabet: Option<String>,
    length: Option<usize>,
}

impl Rule for IdRule {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        let valid = match (&self.alphabet, self.length) {
            (Some(alphabet), Some(length)) if self.prefix.is_empty() => {
                id::is_valid(alphabet, length, value)
            }
            (Some(alphabet), Some(length)) => value
                .strip_prefix(&self.prefix)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|rest| id::is_valid(alphabet, length, rest))
                .unwrap_or(false),
            _ => id::is_valid_prefixed(&self.prefix, value),
        };

        if valid {
            Ok(())
        } else {
            Err(ValidationError("the value is not a valid id".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_id_accepts_generated_ids() {
        let rule = is_id("user");
        let value = id::generate_prefixed("user");
        assert!(rule.validate(&value).is_ok());
    }

    #[test]
    fn is_id_rejects_foreign_prefixes_and_garbage() {
        let rule = is_id("user");
        assert!(rule.validate(&id::generate_prefixed("org")).is_err());
        assert!(rule.validate("not an id").is_err());
    }

    #[test]
    fn is_nanoid_with_explicit_rules() {
        let rule = is_nanoid("", "abc", 4);
        assert!(rule.validate("abca").is_ok());
        assert!(rule.validate("abcd").is_err());

        let rule = is_nanoid("job", "abc", 4);
        assert!(rule.validate("job_abca").is_ok());
        assert!(rule.validate("abca").is_err());
    }

    #[test]
    fn validate_stops_at_first_failure() {
        let id_rule = is_id("user");
        let nano_rule = is_nanoid("", "abc", 4);
        let err = validate("zzzz", &[&nano_rule, &id_rule]).unwrap_err();
        assert_eq!(err, ValidationError("the value is not a valid id".into()));
    }

    #[test]
    fn invalid_argument_maps_to_grpc_status() {
        let status = invalid_argument(ValidationError("bad id".into()));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("bad id"));
    }
}
