//! Provider-error classification.
//!
//! Raw provider errors never cross the flow-executor boundary; every
//! failure is mapped here into a closed taxonomy with a recommended
//! action. This function is the single place fallback policy is decided:
//! flow executors report, the orchestrator enacts, and nothing else gets
//! an opinion.

use std::fmt;

use thiserror::Error;
use tokenforge_common::{ErrorClassification, ErrorSeverity};

use super::provider::RawProviderError;

/// The closed taxonomy of classified provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The user or tenant has not granted the requested scopes.
    ConsentRequired,
    /// Step-up (multi-factor) authentication is required.
    MfaRequired,
    /// A cached or refresh credential is no longer valid.
    InvalidGrant,
    /// Authority/grant-type mismatch (e.g. tenant misconfiguration).
    UnsupportedEndpoint,
    /// The app registration does not allow the requested flow.
    ClientMisconfigured,
    /// Transport failure reaching the provider.
    NetworkError,
    /// The caller withdrew the request.
    Cancelled,
    /// Unclassified provider failure.
    Unknown,
}

impl ErrorKind {
    /// The action the orchestrator should take for this kind.
    #[must_use]
    pub fn recommended_action(self) -> RecommendedAction {
        match self {
            Self::ConsentRequired | Self::MfaRequired => RecommendedAction::Escalate,
            Self::InvalidGrant => RecommendedAction::DiscardCacheAndEscalate,
            Self::NetworkError => RecommendedAction::RetryWithBackoff,
            Self::Cancelled => RecommendedAction::Terminate,
            Self::UnsupportedEndpoint | Self::ClientMisconfigured | Self::Unknown => {
                RecommendedAction::Fatal
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConsentRequired => "consent required",
            Self::MfaRequired => "mfa required",
            Self::InvalidGrant => "invalid grant",
            Self::UnsupportedEndpoint => "unsupported endpoint",
            Self::ClientMisconfigured => "client misconfigured",
            Self::NetworkError => "network error",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// What the orchestrator should do with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendedAction {
    /// Move to the next executor in the fallback chain.
    Escalate,
    /// Drop the offending cache entry, then move to the next executor.
    DiscardCacheAndEscalate,
    /// Retry the same executor with bounded backoff.
    RetryWithBackoff,
    /// Surface to the caller; no retry, no escalation.
    Fatal,
    /// Stop immediately; the request was withdrawn.
    Terminate,
}

/// A provider failure after classification.
///
/// Carries the taxonomy kind, the derived action, and a human-readable
/// message preserving the provider's description.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
}

impl ClassifiedError {
    /// Build a classified error for a known kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Classified cancellation (caller withdrew the request).
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// The taxonomy kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The action recommended for this failure.
    #[must_use]
    pub fn action(&self) -> RecommendedAction {
        self.kind.recommended_action()
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ErrorClassification for ClassifiedError {
    fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::NetworkError
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            ErrorKind::Cancelled => ErrorSeverity::Info,
            ErrorKind::ConsentRequired
            | ErrorKind::MfaRequired
            | ErrorKind::InvalidGrant
            | ErrorKind::NetworkError => ErrorSeverity::Warning,
            ErrorKind::UnsupportedEndpoint
            | ErrorKind::ClientMisconfigured
            | ErrorKind::Unknown => ErrorSeverity::Error,
        }
    }
}

/// Map a raw provider error into the closed taxonomy.
///
/// Provider error codes follow the AAD error contract: an OAuth error
/// code, an optional human description carrying `AADSTS`-prefixed
/// diagnostic codes, and an optional suberror. Description codes are
/// checked first because step-up and consent conditions frequently arrive
/// under generic OAuth codes like `invalid_grant`.
#[must_use]
pub fn classify(raw: &RawProviderError) -> ClassifiedError {
    match raw {
        RawProviderError::Transport(message) => {
            ClassifiedError::new(ErrorKind::NetworkError, message.clone())
        }
        RawProviderError::Protocol { error, error_description, suberror } => {
            let description = error_description.as_deref().unwrap_or_default();
            let suberror = suberror.as_deref().unwrap_or_default();
            let message = if description.is_empty() {
                error.clone()
            } else {
                format!("{error}: {description}")
            };

            let kind = classify_protocol(error, description, suberror);
            ClassifiedError::new(kind, message)
        }
    }
}

fn classify_protocol(error: &str, description: &str, suberror: &str) -> ErrorKind {
    // Step-up conditions ride on generic codes; check diagnostics first.
    if suberror == "mfa_required"
        || description.contains("AADSTS50079")
        || description.contains("AADSTS50076")
    {
        return ErrorKind::MfaRequired;
    }
    if suberror == "consent_required" || description.contains("AADSTS65001") {
        return ErrorKind::ConsentRequired;
    }

    match error {
        "interaction_required" | "consent_required" | "login_required" => {
            ErrorKind::ConsentRequired
        }
        "invalid_grant" | "expired_token" | "bad_token" => ErrorKind::InvalidGrant,
        "unsupported_grant_type" => ErrorKind::UnsupportedEndpoint,
        "unauthorized_client" | "invalid_client" => ErrorKind::ClientMisconfigured,
        "authorization_declined" | "access_denied" => ErrorKind::Cancelled,
        "temporarily_unavailable" | "server_error" => ErrorKind::NetworkError,
        _ => {
            if description.contains("AADSTS90010") {
                ErrorKind::UnsupportedEndpoint
            } else if description.contains("AADSTS70002")
                || description.contains("AADSTS7000218")
                || description.contains("AADSTS700016")
            {
                ErrorKind::ClientMisconfigured
            } else if description.contains("AADSTS70008") {
                ErrorKind::InvalidGrant
            } else {
                ErrorKind::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the error classifier.
    use super::*;

    fn protocol(error: &str, description: &str) -> RawProviderError {
        RawProviderError::Protocol {
            error: error.to_string(),
            error_description: if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            },
            suberror: None,
        }
    }

    /// Every taxonomy row maps to its table-specified action.
    #[test]
    fn recommended_actions_follow_the_table() {
        assert_eq!(ErrorKind::ConsentRequired.recommended_action(), RecommendedAction::Escalate);
        assert_eq!(ErrorKind::MfaRequired.recommended_action(), RecommendedAction::Escalate);
        assert_eq!(
            ErrorKind::InvalidGrant.recommended_action(),
            RecommendedAction::DiscardCacheAndEscalate
        );
        assert_eq!(
            ErrorKind::UnsupportedEndpoint.recommended_action(),
            RecommendedAction::Fatal
        );
        assert_eq!(
            ErrorKind::ClientMisconfigured.recommended_action(),
            RecommendedAction::Fatal
        );
        assert_eq!(
            ErrorKind::NetworkError.recommended_action(),
            RecommendedAction::RetryWithBackoff
        );
        assert_eq!(ErrorKind::Cancelled.recommended_action(), RecommendedAction::Terminate);
        assert_eq!(ErrorKind::Unknown.recommended_action(), RecommendedAction::Fatal);
    }

    /// OAuth code mapping across the taxonomy.
    #[test]
    fn oauth_code_mapping() {
        let cases = [
            ("interaction_required", ErrorKind::ConsentRequired),
            ("consent_required", ErrorKind::ConsentRequired),
            ("login_required", ErrorKind::ConsentRequired),
            ("invalid_grant", ErrorKind::InvalidGrant),
            ("expired_token", ErrorKind::InvalidGrant),
            ("unsupported_grant_type", ErrorKind::UnsupportedEndpoint),
            ("unauthorized_client", ErrorKind::ClientMisconfigured),
            ("invalid_client", ErrorKind::ClientMisconfigured),
            ("authorization_declined", ErrorKind::Cancelled),
            ("access_denied", ErrorKind::Cancelled),
            ("temporarily_unavailable", ErrorKind::NetworkError),
            ("server_error", ErrorKind::NetworkError),
            ("something_new", ErrorKind::Unknown),
        ];

        for (code, expected) in cases {
            let classified = classify(&protocol(code, ""));
            assert_eq!(classified.kind(), expected, "code {code}");
        }
    }

    /// Diagnostic codes in the description refine generic OAuth codes.
    #[test]
    fn description_codes_take_precedence() {
        let mfa = classify(&protocol(
            "invalid_grant",
            "AADSTS50079: The user is required to use multi-factor authentication.",
        ));
        assert_eq!(mfa.kind(), ErrorKind::MfaRequired);

        let consent = classify(&protocol(
            "invalid_grant",
            "AADSTS65001: The user or administrator has not consented.",
        ));
        assert_eq!(consent.kind(), ErrorKind::ConsentRequired);

        let endpoint = classify(&protocol(
            "invalid_request",
            "AADSTS90010: The grant type is not supported over the /common endpoint.",
        ));
        assert_eq!(endpoint.kind(), ErrorKind::UnsupportedEndpoint);

        let registration = classify(&protocol(
            "invalid_request",
            "AADSTS70002: The request body must contain: client_secret or client_assertion.",
        ));
        assert_eq!(registration.kind(), ErrorKind::ClientMisconfigured);
    }

    /// The MFA suberror refines an otherwise-invalid grant.
    #[test]
    fn suberror_refinement() {
        let raw = RawProviderError::Protocol {
            error: "invalid_grant".to_string(),
            error_description: None,
            suberror: Some("mfa_required".to_string()),
        };
        assert_eq!(classify(&raw).kind(), ErrorKind::MfaRequired);
    }

    /// Transport failures classify as retryable network errors.
    #[test]
    fn transport_is_network_error() {
        let classified = classify(&RawProviderError::Transport("connection refused".to_string()));
        assert_eq!(classified.kind(), ErrorKind::NetworkError);
        assert!(classified.is_retryable());
        assert_eq!(classified.severity(), ErrorSeverity::Warning);
    }

    /// Messages preserve the provider code and description.
    #[test]
    fn message_preserves_provider_detail() {
        let classified = classify(&protocol("invalid_grant", "token revoked"));
        assert_eq!(classified.to_string(), "invalid grant: invalid_grant: token revoked");

        let bare = classify(&protocol("invalid_grant", ""));
        assert_eq!(bare.message(), "invalid_grant");
    }

    /// Cancellation is informational, everything fatal is an error.
    #[test]
    fn severity_mapping() {
        assert_eq!(ClassifiedError::cancelled("stop").severity(), ErrorSeverity::Info);
        assert_eq!(
            ClassifiedError::new(ErrorKind::ClientMisconfigured, "x").severity(),
            ErrorSeverity::Error
        );
        assert!(!ClassifiedError::new(ErrorKind::Unknown, "x").is_retryable());
    }
}
