//! Credential format validation.
//!
//! [`CredentialBundle`] is the set of four values an organization needs
//! before any platform call can be made. [`validate`] checks their *shape*
//! only, with no network call, and collects one error per failed field so a
//! setup form can show every problem at once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The platform's user/system access tokens carry a known prefix.
const ACCESS_TOKEN_PREFIX: &str = "EAA";

/// Long-lived tokens are typically well over this length; anything shorter
/// is suspicious but not provably wrong.
const SHORT_TOKEN_LEN: usize = 40;

/// Plausible digit-length bounds for Graph API object ids.
const ID_MIN_DIGITS: usize = 5;
const ID_MAX_DIGITS: usize = 32;

/// The four externally-supplied values that link an organization to a
/// WhatsApp Business account.
///
/// A bundle is **complete** when all four fields are non-empty; anything
/// less gates the organization as "not configured" regardless of what else
/// is stored.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    /// Bearer token for outbound Graph API calls.
    pub access_token: String,
    /// The Meta App the token was issued through.
    pub app_id: String,
    /// The business phone number's Graph object id.
    pub phone_number_id: String,
    /// WhatsApp Business Account (WABA) id.
    pub business_account_id: String,
}

impl CredentialBundle {
    /// Whether all four fields are present. This is the only gate any
    /// feature check uses; partially-written bundles never count.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty()
            && !self.app_id.is_empty()
            && !self.phone_number_id.is_empty()
            && !self.business_account_id.is_empty()
    }
}

// Manual impl so an accidental `{:?}` in a log line can never leak the
// raw access token.
impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("access_token", &crate::mask_token(&self.access_token))
            .field("app_id", &self.app_id)
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .finish()
    }
}

/// A single failed field with an actionable message.
#[derive(Serialize, PartialEq, Eq, Clone, Debug)]
pub struct FieldError {
    /// Which bundle field failed (`accessToken`, `appId`, ...).
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of format validation. Ephemeral, never persisted.
///
/// Serialize-only: the field names borrow `'static` strings, and nothing
/// ever reads a result back in.
#[derive(Serialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// The per-field error messages, ready for an API envelope.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("valid");
        }
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Validates the shape of a credential bundle.
///
/// Pure function: no network call, no state. Every failed field contributes
/// exactly one [`FieldError`]; validation never short-circuits.
pub fn validate(bundle: &CredentialBundle) -> ValidationResult {
    let mut result = ValidationResult::default();

    if bundle.access_token.is_empty() {
        result.errors.push(FieldError {
            field: "accessToken",
            message: "access token is required".into(),
        });
    } else if !bundle.access_token.starts_with(ACCESS_TOKEN_PREFIX) {
        result.errors.push(FieldError {
            field: "accessToken",
            message: format!("access token must start with '{ACCESS_TOKEN_PREFIX}'"),
        });
    } else if bundle.access_token.len() < SHORT_TOKEN_LEN {
        result.warnings.push(
            "access token is unusually short; long-lived tokens are typically longer".into(),
        );
    }

    check_numeric_id(&mut result, "appId", &bundle.app_id);
    check_numeric_id(&mut result, "phoneNumberId", &bundle.phone_number_id);
    check_numeric_id(&mut result, "wabaId", &bundle.business_account_id);

    result
}

fn check_numeric_id(result: &mut ValidationResult, field: &'static str, value: &str) {
    if value.is_empty() {
        result.errors.push(FieldError {
            field,
            message: format!("{field} is required"),
        });
    } else if !value.bytes().all(|b| b.is_ascii_digit()) {
        result.errors.push(FieldError {
            field,
            message: format!("{field} must be a numeric id"),
        });
    } else if value.len() < ID_MIN_DIGITS || value.len() > ID_MAX_DIGITS {
        result.errors.push(FieldError {
            field,
            message: format!("{field} has an implausible length"),
        });
    }
}
