//! Request-input validation.
//!
//! Collects field failures into one map so the caller sees everything wrong
//! with their input at once, then terminates the request with a 422.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::GateError;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is well-formed")
});

pub const MSG_MUST_BE_PROVIDED: &str = "must be provided";

/// Accumulator for validation failures, keyed by field.
#[derive(Debug, Default)]
pub struct Checks {
    errors: BTreeMap<String, String>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field` unless one is already present.
    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record a failure when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Terminate with `ValidationFailed` if anything was recorded.
    pub fn finish(self) -> Result<(), GateError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(GateError::ValidationFailed(self.errors))
        }
    }
}

pub fn check_email(checks: &mut Checks, email: &str) {
    checks.check(!email.is_empty(), "email", MSG_MUST_BE_PROVIDED);
    if !email.is_empty() {
        checks.check(
            EMAIL_RX.is_match(email),
            "email",
            "must be a valid email address",
        );
    }
}

pub fn check_password(checks: &mut Checks, password: &str) {
    checks.check(!password.is_empty(), "password", MSG_MUST_BE_PROVIDED);
    checks.check(
        password.len() >= 8,
        "password",
        "must be at least 8 bytes long",
    );
    checks.check(
        password.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn check_name(checks: &mut Checks, name: &str) {
    checks.check(!name.is_empty(), "name", MSG_MUST_BE_PROVIDED);
    checks.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_passes() {
        let mut checks = Checks::new();
        check_name(&mut checks, "Alice");
        check_email(&mut checks, "alice@example.com");
        check_password(&mut checks, "pa55word123");
        assert!(checks.finish().is_ok());
    }

    #[test]
    fn failures_are_collected_per_field() {
        let mut checks = Checks::new();
        check_name(&mut checks, "");
        check_email(&mut checks, "not-an-email");
        check_password(&mut checks, "short");

        let err = checks.finish().unwrap_err();
        let GateError::ValidationFailed(fields) = err else {
            panic!("expected ValidationFailed");
        };
        assert_eq!(fields.len(), 3);
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn first_failure_per_field_wins() {
        let mut checks = Checks::new();
        // Empty password trips both the provided and length checks.
        check_password(&mut checks, "");

        let err = checks.finish().unwrap_err();
        let GateError::ValidationFailed(fields) = err else {
            panic!("expected ValidationFailed");
        };
        assert_eq!(fields.get("password").unwrap(), MSG_MUST_BE_PROVIDED);
    }
}
