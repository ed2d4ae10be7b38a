//! Email lookup client
//!
//! One outbound request per contact to the email-finder service. Every
//! failure is folded into a [`LookupOutcome`]; callers always get a value
//! back and decide themselves what to do with it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::LookupConfig;
use crate::db::models::{SearchStatus, SearchType};
use crate::db::NewSearchRecord;
use crate::errors::{AppError, Result};
use crate::metrics;

/// Placeholder for enrichment fields the service did not return
pub const UNKNOWN: &str = "Unknown";

/// The person being looked up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
}

impl Contact {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            company: company.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Why a lookup produced no contact
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error: {status}")]
    Service { status: u16 },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No email found")]
    NoEmailFound,
}

impl LookupError {
    /// Map a non-2xx status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => LookupError::InvalidApiKey,
            402 => LookupError::InsufficientCredits,
            429 => LookupError::RateLimited,
            other => LookupError::Service { status: other },
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            LookupError::InvalidApiKey => "invalid_api_key",
            LookupError::InsufficientCredits => "insufficient_credits",
            LookupError::RateLimited => "rate_limited",
            LookupError::Service { .. } => "service_error",
            LookupError::Transport(_) => "transport",
            LookupError::InvalidResponse(_) => "invalid_response",
            LookupError::NoEmailFound => "no_email",
        }
    }
}

/// Contact details resolved by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundContact {
    pub email: String,
    pub confidence: i32,
    pub title: Option<String>,
    pub domain: String,
    pub full_name: String,
    pub industry: String,
    pub website: String,
    pub company_size: String,
    pub country: String,
    pub city: String,
    pub email_status: String,
}

/// Normalized result of one lookup: contact details or an error, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Found(FoundContact),
    Failed(LookupError),
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            LookupOutcome::Found(_) => None,
            LookupOutcome::Failed(err) => Some(err.to_string()),
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "found",
            LookupOutcome::Failed(err) => err.kind(),
        }
    }

    /// Search record for this outcome. Failed lookups are stored as
    /// `not_found` with the error message attached.
    pub fn into_record(self, subject: &Contact, search_type: SearchType) -> NewSearchRecord {
        match self {
            LookupOutcome::Found(found) => {
                let mut record = NewSearchRecord::new(
                    &subject.first_name,
                    &subject.last_name,
                    &subject.company,
                    SearchStatus::Found,
                )
                .with_search_type(search_type);
                record.email = Some(found.email);
                record.confidence = Some(found.confidence);
                record.title = found.title;
                record.domain = Some(found.domain);
                record.full_name = Some(found.full_name);
                record.industry = Some(found.industry);
                record.website = Some(found.website);
                record.company_size = Some(found.company_size);
                record.country = Some(found.country);
                record.city = Some(found.city);
                record.email_status = Some(found.email_status);
                record
            }
            LookupOutcome::Failed(err) => NewSearchRecord::new(
                &subject.first_name,
                &subject.last_name,
                &subject.company,
                SearchStatus::NotFound,
            )
            .with_search_type(search_type)
            .with_error(err.to_string()),
        }
    }
}

/// Trait for email discovery
#[async_trait]
pub trait EmailLookup: Send + Sync {
    /// Look up one contact. Never fails; errors are part of the outcome.
    async fn lookup(&self, subject: &Contact, api_key: &str) -> LookupOutcome;
}

/// Best-effort text for an enrichment field: strings as sent, numbers and
/// booleans in their JSON form, anything else absent
fn text_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

/// Confidence score, accepting integers, floats and numeric strings.
/// Fractions are truncated and the result clamped to 0..=100.
fn score_field(data: &Value) -> i32 {
    let score = match data.get("score") {
        Some(Value::Number(n)) => n.as_i64().map(|i| i as f64).or_else(|| n.as_f64()),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    score
        .filter(|s| s.is_finite())
        .map(|s| s.trunc().clamp(0.0, 100.0) as i32)
        .unwrap_or(0)
}

/// Turn a raw service response into an outcome.
///
/// Success is decided by the `email` field alone; every other field is
/// read leniently and falls back to a default.
pub fn interpret_response(status: u16, body: &str, subject: &Contact) -> LookupOutcome {
    if !(200..300).contains(&status) {
        return LookupOutcome::Failed(LookupError::from_status(status));
    }

    let parsed: Value = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => return LookupOutcome::Failed(LookupError::InvalidResponse(e.to_string())),
    };

    let data = parsed.get("data").unwrap_or(&Value::Null);
    let Some(email) = data
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
    else {
        return LookupOutcome::Failed(LookupError::NoEmailFound);
    };

    let full_name = match (
        text_field(data, "full_name"),
        text_field(data, "first_name"),
        text_field(data, "last_name"),
    ) {
        (Some(full), _, _) => full,
        (_, Some(first), Some(last)) => format!("{} {}", first, last),
        _ => subject.full_name(),
    };

    let email_status = data
        .get("verification")
        .and_then(|v| text_field(v, "status"));

    LookupOutcome::Found(FoundContact {
        email: email.to_string(),
        confidence: score_field(data),
        title: text_field(data, "position"),
        domain: text_field(data, "domain").unwrap_or_else(|| subject.company.clone()),
        full_name,
        industry: or_unknown(text_field(data, "industry")),
        website: or_unknown(text_field(data, "website")),
        company_size: or_unknown(text_field(data, "company_size")),
        country: or_unknown(text_field(data, "country")),
        city: or_unknown(text_field(data, "city")),
        email_status: or_unknown(email_status),
    })
}

/// HTTP client for the email-finder API
pub struct EmailFinderClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmailFinderClient {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, subject: &Contact, api_key: &str) -> LookupOutcome {
        let url = format!("{}/email-finder", self.base_url);
        let full_name = subject.full_name();

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("full_name", full_name.as_str()),
                ("company", subject.company.as_str()),
                ("api_key", api_key),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return LookupOutcome::Failed(LookupError::Transport(e.to_string())),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return LookupOutcome::Failed(LookupError::from_status(status));
        }

        match response.text().await {
            Ok(body) => interpret_response(status, &body, subject),
            Err(e) => LookupOutcome::Failed(LookupError::Transport(e.to_string())),
        }
    }
}

#[async_trait]
impl EmailLookup for EmailFinderClient {
    async fn lookup(&self, subject: &Contact, api_key: &str) -> LookupOutcome {
        let start = Instant::now();
        let outcome = self.request(subject, api_key).await;

        if let LookupOutcome::Failed(err) = &outcome {
            tracing::warn!(
                company = %subject.company,
                error = %err,
                "Email lookup failed"
            );
        }
        metrics::record_lookup(start.elapsed().as_secs_f64(), outcome.metric_label());
        outcome
    }
}

/// Deterministic lookup for local development and tests.
///
/// Resolves `first.last@company.com` for every contact, except that the key
/// `"invalid"` behaves like a rejected credential.
pub struct MockLookup;

#[async_trait]
impl EmailLookup for MockLookup {
    async fn lookup(&self, subject: &Contact, api_key: &str) -> LookupOutcome {
        if api_key == "invalid" {
            return LookupOutcome::Failed(LookupError::InvalidApiKey);
        }

        let slug = |s: &str| {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        };
        let domain = format!("{}.com", slug(&subject.company));
        let body = serde_json::json!({
            "data": {
                "email": format!(
                    "{}.{}@{}",
                    slug(&subject.first_name),
                    slug(&subject.last_name),
                    domain
                ),
                "score": 80,
                "domain": domain,
            }
        });
        interpret_response(200, &body.to_string(), subject)
    }
}

/// Create a lookup client based on configuration
pub fn create_lookup(config: &LookupConfig) -> Result<Arc<dyn EmailLookup>> {
    if config.base_url == "mock" {
        tracing::warn!("Using mock email lookup");
        return Ok(Arc::new(MockLookup));
    }
    Ok(Arc::new(EmailFinderClient::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn john() -> Contact {
        Contact::new("John", "Doe", "Acme")
    }

    #[test]
    fn test_known_status_codes() {
        let cases = [
            (401, LookupError::InvalidApiKey, "Invalid API key"),
            (402, LookupError::InsufficientCredits, "Insufficient credits"),
            (429, LookupError::RateLimited, "Rate limit exceeded"),
            (503, LookupError::Service { status: 503 }, "API error: 503"),
        ];
        for (status, expected, message) in cases {
            let outcome = interpret_response(status, "{}", &john());
            assert_eq!(outcome, LookupOutcome::Failed(expected));
            assert_eq!(outcome.error_message().as_deref(), Some(message));
        }
    }

    #[test]
    fn test_unauthorized_outcome_has_no_contact_fields() {
        let record = interpret_response(401, "", &john()).into_record(&john(), SearchType::Single);
        assert_eq!(record.status, SearchStatus::NotFound);
        assert_eq!(record.error_message.as_deref(), Some("Invalid API key"));
        assert!(record.email.is_none());
        assert!(record.domain.is_none());
        assert!(record.confidence.is_none());
    }

    #[test]
    fn test_full_response() {
        let body = r#"{
            "data": {
                "email": "john.doe@acme.io",
                "score": 97,
                "position": "CTO",
                "domain": "acme.io",
                "first_name": "Johnny",
                "last_name": "Doe",
                "industry": "Software",
                "website": "https://acme.io",
                "company_size": "51-200",
                "country": "US",
                "city": "Austin",
                "verification": { "status": "valid" }
            }
        }"#;

        let LookupOutcome::Found(found) = interpret_response(200, body, &john()) else {
            panic!("expected a found outcome");
        };
        assert_eq!(found.email, "john.doe@acme.io");
        assert_eq!(found.confidence, 97);
        assert_eq!(found.title.as_deref(), Some("CTO"));
        assert_eq!(found.domain, "acme.io");
        assert_eq!(found.full_name, "Johnny Doe");
        assert_eq!(found.company_size, "51-200");
        assert_eq!(found.email_status, "valid");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let body = r#"{ "data": { "email": "jd@acme.com" } }"#;
        let LookupOutcome::Found(found) = interpret_response(200, body, &john()) else {
            panic!("expected a found outcome");
        };
        assert_eq!(found.confidence, 0);
        assert_eq!(found.domain, "Acme");
        assert_eq!(found.full_name, "John Doe");
        assert!(found.title.is_none());
        for field in [
            &found.industry,
            &found.website,
            &found.company_size,
            &found.country,
            &found.city,
            &found.email_status,
        ] {
            assert_eq!(field, UNKNOWN);
        }
    }

    #[test]
    fn test_no_email_in_successful_response() {
        for body in [
            r#"{ "data": { "email": null, "score": 0 } }"#,
            r#"{ "data": {} }"#,
            r#"{ "data": null }"#,
            r#"{}"#,
        ] {
            assert_eq!(
                interpret_response(200, body, &john()),
                LookupOutcome::Failed(LookupError::NoEmailFound)
            );
        }
    }

    #[test]
    fn test_loosely_typed_fields_keep_the_email() {
        let body = r#"{ "data": { "email": "jd@acme.com", "score": 97.5 } }"#;
        let LookupOutcome::Found(found) = interpret_response(200, body, &john()) else {
            panic!("expected a found outcome");
        };
        assert_eq!(found.email, "jd@acme.com");
        assert_eq!(found.confidence, 97);

        let body = r#"{ "data": {
            "email": "jd@acme.com",
            "score": "140",
            "company_size": 50,
            "industry": ["Software"],
            "website": null,
            "position": 7,
            "verification": "valid"
        } }"#;
        let LookupOutcome::Found(found) = interpret_response(200, body, &john()) else {
            panic!("expected a found outcome");
        };
        assert_eq!(found.confidence, 100);
        assert_eq!(found.company_size, "50");
        assert_eq!(found.industry, UNKNOWN);
        assert_eq!(found.website, UNKNOWN);
        assert_eq!(found.title.as_deref(), Some("7"));
        assert_eq!(found.email_status, UNKNOWN);
    }

    #[test]
    fn test_score_bounds() {
        for (score, expected) in [("-3", 0), ("42.9", 42), ("1e9", 100), ("\"n/a\"", 0)] {
            let body = format!(r#"{{ "data": {{ "email": "jd@acme.com", "score": {} }} }}"#, score);
            let LookupOutcome::Found(found) = interpret_response(200, &body, &john()) else {
                panic!("expected a found outcome");
            };
            assert_eq!(found.confidence, expected, "score {}", score);
        }
    }

    #[test]
    fn test_non_string_email_is_not_found() {
        let body = r#"{ "data": { "email": 42 } }"#;
        assert_eq!(
            interpret_response(200, body, &john()),
            LookupOutcome::Failed(LookupError::NoEmailFound)
        );
    }

    #[test]
    fn test_unparseable_body() {
        let outcome = interpret_response(200, "<html>", &john());
        assert!(matches!(
            outcome,
            LookupOutcome::Failed(LookupError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_found_record_fields() {
        let body = r#"{ "data": { "email": "jd@acme.com", "score": 55 } }"#;
        let record = interpret_response(200, body, &john()).into_record(&john(), SearchType::Advanced);
        assert_eq!(record.status, SearchStatus::Found);
        assert_eq!(record.search_type, SearchType::Advanced);
        assert_eq!(record.email.as_deref(), Some("jd@acme.com"));
        assert_eq!(record.confidence, Some(55));
        assert!(record.error_message.is_none());
        assert!(record.batch_id.is_none());
    }

    #[tokio::test]
    async fn test_mock_lookup() {
        let found = MockLookup.lookup(&Contact::new("Ada", "Love-lace", "Big Co"), "key").await;
        let LookupOutcome::Found(found) = found else {
            panic!("expected a found outcome");
        };
        assert_eq!(found.email, "ada.lovelace@bigco.com");

        let rejected = MockLookup.lookup(&john(), "invalid").await;
        assert_eq!(rejected, LookupOutcome::Failed(LookupError::InvalidApiKey));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_failure() {
        let client = EmailFinderClient::new(&LookupConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            pacing_delay_ms: 0,
        })
        .unwrap();

        let outcome = client.lookup(&john(), "key").await;
        assert!(matches!(outcome, LookupOutcome::Failed(LookupError::Transport(_))));
    }
}
