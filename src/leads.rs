use std::sync::Arc;

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionEngine;
use crate::errors::AppError;
use crate::models::LeadAttributionSnapshot;
use crate::services::LeadService;

/// Lead form payload as the UI collects it.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    /// Property the lead was submitted from, when any.
    pub property_id: Option<String>,
}

/// Validated lead as written to the lead table, attribution attached.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSubmission {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub property_id: Option<String>,
    pub attribution: LeadAttributionSnapshot,
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    // Basic checks
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // Detect fake patterns (repeated digits)
    let fake_patterns = [
        "999999",    // Common fake: test999999@gmail.com
        "111111",    // Common fake: 1111111111@
        "000000",    // Common fake: 000000@
        "123456789", // Sequential fake
    ];

    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!(
                "❌ Invalid email detected (fake pattern '{}'): {}",
                pattern,
                email
            );
            return false;
        }
    }

    // RFC 5322 simplified email regex
    // Matches: local@domain.tld
    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    if !email_regex.is_match(email) {
        tracing::warn!("❌ Invalid email format: {}", email);
        return false;
    }

    true
}

/// Validate and normalize a lead phone number
///
/// Uses the phonenumber library (port of Google's libphonenumber) to:
/// - Parse with the Egyptian region (EG) as the default for national input
/// - Accept any valid international number given in +CC form
/// - Return normalized E.164 format (+201001234567)
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_phone(raw: &str) -> (bool, String) {
    // Skip empty or very short strings
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    // Parse with Egyptian country code as default region
    match phonenumber::parse(Some(CountryId::EG), raw) {
        Ok(number) => {
            // Check if valid
            if phonenumber::is_valid(&number) {
                // Format to E.164 (+201001234567)
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid phone number: {}", raw);
                (false, "Invalid phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Lead submission pipeline: validates the form, attaches the attribution
/// snapshot, writes the lead, and records the submission in the session
/// event buffer.
pub struct LeadPipeline {
    leads: Arc<LeadService>,
    attribution: Arc<AttributionEngine>,
}

impl LeadPipeline {
    pub fn new(leads: Arc<LeadService>, attribution: Arc<AttributionEngine>) -> Self {
        Self { leads, attribution }
    }

    /// Validates and submits a lead. Validation failures block submission
    /// with a field-level message; the remote write itself is the one call
    /// in the client that surfaces its error to the caller.
    pub async fn submit(&self, request: LeadRequest) -> Result<(), AppError> {
        let submission = self.validate(request)?;
        self.leads.submit(&submission).await?;
        self.attribution.log_session_event(
            "lead_submitted",
            submission.property_id.as_deref(),
            None,
        );
        Ok(())
    }

    fn validate(&self, request: LeadRequest) -> Result<LeadSubmission, AppError> {
        if request.name.trim().is_empty() {
            return Err(AppError::BadRequest("name: required".to_string()));
        }
        if request.email.is_none() && request.phone.is_none() {
            return Err(AppError::BadRequest(
                "contact: email or phone required".to_string(),
            ));
        }

        let email = match request.email {
            Some(ref email) => {
                if !is_valid_email(email) {
                    return Err(AppError::BadRequest("email: invalid format".to_string()));
                }
                Some(email.to_lowercase())
            }
            None => None,
        };

        let phone = match request.phone {
            Some(ref phone) => {
                let (valid, normalized) = validate_phone(phone);
                if !valid {
                    return Err(AppError::BadRequest(format!("phone: {}", normalized)));
                }
                Some(normalized)
            }
            None => None,
        };

        Ok(LeadSubmission {
            name: request.name.trim().to_string(),
            email,
            phone,
            message: request.message,
            property_id: request.property_id,
            attribution: self.attribution.lead_attribution(),
        })
    }
}
