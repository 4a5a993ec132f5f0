//! Backend response envelope `{ code, message, data }`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shown when the backend gives none
pub const DEFAULT_FAILURE_MESSAGE: &str = "请求失败";

/// Whether an envelope code means success; the backend uses both 1 and 200
pub fn is_success(code: i64) -> bool {
    code == 1 || code == 200
}

/// Login endpoints report their own failures and skip the success check
pub fn bypasses_check(url: &str) -> bool {
    url.contains("/login")
}

/// Envelope wrapping every backend JSON response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        is_success(self.code)
    }

    /// Split into payload or failure
    pub fn into_result(self) -> Result<Option<T>, ApiFailure> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ApiFailure::new(self.code, self.message))
        }
    }

    /// Like [`into_result`](Self::into_result), except responses for login
    /// endpoints always pass through
    pub fn into_result_for(self, url: &str) -> Result<Option<T>, ApiFailure> {
        if bypasses_check(url) {
            Ok(self.data)
        } else {
            self.into_result()
        }
    }
}

/// A failed backend call, from the envelope code or the HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("API failure {code}: {message}")]
pub struct ApiFailure {
    pub code: i64,
    pub message: String,
}

/// What the client does about a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureAction {
    /// Drop the session and go to the login page
    ForceLogout { redirect: &'static str },
    /// Show a notification
    Notify(String),
}

impl ApiFailure {
    pub fn new(code: i64, message: Option<String>) -> Self {
        ApiFailure {
            code,
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        }
    }

    pub fn action(&self) -> FailureAction {
        match self.code {
            401 => FailureAction::ForceLogout { redirect: "/login" },
            403 => FailureAction::Notify("权限不足，请联系管理员".to_string()),
            404 => FailureAction::Notify("请求的资源不存在".to_string()),
            500 => FailureAction::Notify("服务器内部错误，请稍后重试".to_string()),
            _ => FailureAction::Notify(self.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(json: &str) -> ApiEnvelope<Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_success_codes() {
        assert!(is_success(1));
        assert!(is_success(200));
        assert!(!is_success(0));
        assert!(!is_success(201));
    }

    #[test]
    fn test_into_result() {
        let ok = parse(r#"{"code":1,"message":"ok","data":{"total":3}}"#);
        assert_eq!(ok.into_result().unwrap().unwrap()["total"], 3);

        let empty = parse(r#"{"code":200}"#);
        assert_eq!(empty.into_result().unwrap(), None);

        let failed = parse(r#"{"code":0,"message":"文件过大"}"#).into_result().unwrap_err();
        assert_eq!(failed.code, 0);
        assert_eq!(failed.action(), FailureAction::Notify("文件过大".into()));
    }

    #[test]
    fn test_login_bypass() {
        let env = parse(r#"{"code":0,"message":"密码错误"}"#);
        assert!(env.clone().into_result_for("/api/user/login").is_ok());
        assert!(env.into_result_for("/api/media/list").is_err());
    }

    #[test]
    fn test_failure_actions() {
        assert_eq!(
            ApiFailure::new(401, None).action(),
            FailureAction::ForceLogout { redirect: "/login" }
        );
        assert_eq!(
            ApiFailure::new(403, Some("nope".into())).action(),
            FailureAction::Notify("权限不足，请联系管理员".into())
        );
        assert_eq!(
            ApiFailure::new(418, None).action(),
            FailureAction::Notify(DEFAULT_FAILURE_MESSAGE.into())
        );
    }
}
