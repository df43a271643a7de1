// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Request-payload validators for `submit_message` (§4.6 step 4). Ground:
//! the teacher's `Regex::new` + `once_cell::sync::Lazy` pattern for
//! precompiled, process-wide regexes.

use courier_common::error::ErrorKind;
use once_cell::sync::Lazy;
use regex::Regex;

const MIN_BODY_LEN: usize = 1;
const MAX_BODY_LEN: usize = 1000;

static E164: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("E.164 pattern is valid"));

pub fn validate_sender_number(sender_number: &str) -> Result<(), ErrorKind> {
    if E164.is_match(sender_number) {
        Ok(())
    } else {
        Err(ErrorKind::validation(
            "sender_number",
            "must match E.164, e.g. +12025551234",
        ))
    }
}

/// Length is measured in Unicode code points, not bytes (§4.6 step 4).
pub fn validate_message_body(message_body: &str) -> Result<(), ErrorKind> {
    let len = message_body.chars().count();
    if (MIN_BODY_LEN..=MAX_BODY_LEN).contains(&len) {
        Ok(())
    } else {
        Err(ErrorKind::validation(
            "message_body",
            format!("must be {MIN_BODY_LEN}..={MAX_BODY_LEN} code points, got {len}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_e164() {
        assert!(validate_sender_number("+12025551234").is_ok());
    }

    #[test]
    fn rejects_missing_plus() {
        assert!(validate_sender_number("12025551234").is_err());
    }

    #[test]
    fn rejects_leading_zero_country_code() {
        assert!(validate_sender_number("+0123456789").is_err());
    }

    #[test]
    fn rejects_empty_body() {
        assert!(validate_message_body("").is_err());
    }

    #[test]
    fn accepts_unicode_body_counted_in_code_points() {
        let body = "héllo 👋".to_string();
        assert!(validate_message_body(&body).is_ok());
    }

    #[test]
    fn rejects_body_over_limit() {
        let body = "x".repeat(MAX_BODY_LEN + 1);
        assert!(validate_message_body(&body).is_err());
    }

    #[test]
    fn accepts_body_at_limit() {
        let body = "x".repeat(MAX_BODY_LEN);
        assert!(validate_message_body(&body).is_ok());
    }
}
