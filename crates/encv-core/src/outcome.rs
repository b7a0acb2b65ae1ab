//! Typed invocation results.
//!
//! Every pipeline command reports through an [`InvocationResponse`], the same
//! `{statusCode, body}` envelope the stages originally exchanged, with a
//! structured [`InvocationOutcome`] instead of a bare success flag.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InvocationOutcome {
    Success,
    /// The stage completed but some rows were not applied.
    Partial { reasons: Vec<String> },
    Failure { reason: String },
}

impl InvocationOutcome {
    /// `Success` when `reasons` is empty, otherwise `Partial`.
    #[must_use]
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            InvocationOutcome::Success
        } else {
            InvocationOutcome::Partial { reasons }
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success)
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, InvocationOutcome::Failure { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseBody<T> {
    /// `true` only when every row was applied.
    pub success: bool,
    pub outcome: InvocationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationResponse<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody<T>,
}

impl<T> InvocationResponse<T> {
    #[must_use]
    pub fn new(outcome: InvocationOutcome, data: Option<T>) -> Self {
        let status_code = if outcome.is_failure() { 500 } else { 200 };
        Self {
            status_code,
            body: ResponseBody {
                success: outcome.is_success(),
                outcome,
                data,
            },
        }
    }

    #[must_use]
    pub fn success(data: T) -> Self {
        Self::new(InvocationOutcome::Success, Some(data))
    }

    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::new(
            InvocationOutcome::Failure {
                reason: reason.into(),
            },
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn success_envelope_shape() {
        let response = InvocationResponse::success(json!([1, 2]));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "statusCode": 200,
                "body": {"success": true, "outcome": {"status": "success"}, "data": [1, 2]}
            })
        );
    }

    #[test]
    fn partial_is_not_success_but_still_200() {
        let outcome = InvocationOutcome::from_reasons(vec!["row 3: missing field `date`".into()]);
        let response = InvocationResponse::new(outcome, Some(json!({})));
        assert_eq!(response.status_code, 200);
        assert!(!response.body.success);
        assert_eq!(
            serde_json::to_value(&response.body.outcome).unwrap(),
            json!({"status": "partial", "reasons": ["row 3: missing field `date`"]})
        );
    }

    #[test]
    fn failure_envelope_omits_data() {
        let response = InvocationResponse::<()>::failure("connection refused");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["statusCode"], 500);
        assert_eq!(value["body"]["success"], false);
        assert_eq!(value["body"]["outcome"]["reason"], "connection refused");
        assert!(value["body"].get("data").is_none());
    }

    #[test]
    fn empty_reasons_mean_success() {
        assert!(InvocationOutcome::from_reasons(vec![]).is_success());
    }
}
