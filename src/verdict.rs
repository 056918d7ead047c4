//! Client for the remote verdict service.
//!
//! The agent never scores a user itself. Each cycle's features are posted
//! to the service's authenticate endpoint and the verdict it returns drives
//! the controller. The enrollment endpoint is exposed for the CLI.

use crate::core::device::DeviceInfo;
use crate::core::features::FeatureMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Verdict service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictConfig {
    /// Base URL of the service (default: http://127.0.0.1:8000)
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "crate::config::duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl VerdictConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Get the authenticate endpoint URL.
    pub fn authenticate_url(&self) -> String {
        format!("{}/authenticate", self.base())
    }

    /// Get the feature enrollment endpoint URL.
    pub fn enroll_url(&self) -> String {
        format!("{}/enroll", self.base())
    }

    pub fn typing_pattern_save_url(&self) -> String {
        format!("{}/typingdna/save", self.base())
    }

    pub fn typing_pattern_verify_url(&self) -> String {
        format!("{}/typingdna/verify", self.base())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/", self.base())
    }
}

/// Verdict client error types.
#[derive(Debug)]
pub enum VerdictError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
    /// The service answered without scoring the features
    NotScored { status: String, message: String },
}

impl std::fmt::Display for VerdictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictError::Config(msg) => write!(f, "Verdict config error: {msg}"),
            VerdictError::Network(msg) => write!(f, "Verdict network error: {msg}"),
            VerdictError::Server { status, message } => {
                write!(f, "Verdict server error ({status}): {message}")
            }
            VerdictError::Serialization(msg) => write!(f, "Verdict serialization error: {msg}"),
            VerdictError::NotScored { status, message } => {
                write!(f, "Features not scored ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for VerdictError {}

/// Authentication request for one capture cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictRequest {
    pub user_id: String,
    pub features: FeatureMap,
    pub session_id: String,
    pub device_info: DeviceInfo,
    #[serde(
        rename = "typingdna_pattern",
        serialize_with = "pattern_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub typing_pattern: Option<String>,
}

/// A genuine sample stored for the user by the enrollment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureEnrollmentRequest {
    pub user_id: String,
    pub features: FeatureMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(
        rename = "typingdna_pattern",
        serialize_with = "pattern_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub typing_pattern: Option<String>,
}

/// Response from the enrollment endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnrollmentResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub user_id: String,
    /// Genuine samples stored so far
    #[serde(default)]
    pub enrollment_count: u64,
    #[serde(default)]
    pub train_info: Option<String>,
    /// Whether enough samples exist for `/authenticate` to score
    #[serde(default)]
    pub can_authenticate: bool,
}

/// Typing-pattern save or verify request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypingPatternRequest {
    pub user_id: String,
    pub typing_pattern: String,
    pub text_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

/// Typing patterns travel as `{"pattern": "..."}` inside feature submissions.
fn pattern_object<S>(pattern: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;

    match pattern {
        Some(pattern) => {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry("pattern", pattern)?;
            map.end()
        }
        None => serializer.serialize_none(),
    }
}

/// Decision returned by the verdict service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Genuine,
    Impostor,
    Unknown,
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // "uncertain" and anything unrecognised carry no decision.
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_lowercase().as_str() {
            "genuine" => Verdict::Genuine,
            "impostor" => Verdict::Impostor,
            _ => Verdict::Unknown,
        })
    }
}

/// Outcome of one authentication cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthCycleResult {
    pub verdict: Verdict,
    /// Clamped to 0..=1
    pub confidence: f64,
    pub risk_level: String,
    pub requires_step_up: bool,
}

impl AuthCycleResult {
    /// Whether this result demands step-up verification.
    pub fn demands_step_up(&self) -> bool {
        self.requires_step_up || self.verdict == Verdict::Impostor
    }
}

/// Raw response body from the authenticate endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VerdictResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub requires_step_up: Option<bool>,
}

impl TryFrom<VerdictResponse> for AuthCycleResult {
    type Error = VerdictError;

    fn try_from(response: VerdictResponse) -> Result<Self, Self::Error> {
        // e.g. insufficient_enrollment / model_not_ready
        let Some(verdict) = response.verdict else {
            return Err(VerdictError::NotScored {
                status: response.status.unwrap_or_else(|| "unknown".to_string()),
                message: response.message.unwrap_or_default(),
            });
        };

        let confidence = response
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Ok(AuthCycleResult {
            verdict,
            confidence,
            risk_level: response.risk_level.unwrap_or_else(|| "unknown".to_string()),
            requires_step_up: response.requires_step_up.unwrap_or(false),
        })
    }
}

/// Anything that can turn a feature submission into a verdict.
#[async_trait]
pub trait VerdictService: Send + Sync {
    async fn authenticate(&self, request: &VerdictRequest)
        -> Result<AuthCycleResult, VerdictError>;
}

/// HTTP client for the verdict service.
pub struct HttpVerdictClient {
    config: VerdictConfig,
    client: reqwest::Client,
}

impl HttpVerdictClient {
    /// Create a new verdict client.
    pub fn new(config: VerdictConfig) -> Result<Self, VerdictError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VerdictError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &VerdictConfig {
        &self.config
    }

    /// Test connection to the service.
    pub async fn test_connection(&self) -> Result<bool, VerdictError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| VerdictError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Store a feature vector as a genuine sample for the user.
    pub async fn enroll_features(
        &self,
        request: &FeatureEnrollmentRequest,
    ) -> Result<EnrollmentResponse, VerdictError> {
        let body = self.post_json(&self.config.enroll_url(), request).await?;
        serde_json::from_value(body).map_err(|e| VerdictError::Serialization(e.to_string()))
    }

    /// Store a typing pattern for later verification.
    pub async fn save_typing_pattern(
        &self,
        request: &TypingPatternRequest,
    ) -> Result<serde_json::Value, VerdictError> {
        self.post_json(&self.config.typing_pattern_save_url(), request)
            .await
    }

    /// Check a typing pattern against the stored ones.
    pub async fn verify_typing_pattern(
        &self,
        request: &TypingPatternRequest,
    ) -> Result<serde_json::Value, VerdictError> {
        self.post_json(&self.config.typing_pattern_verify_url(), request)
            .await
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<serde_json::Value, VerdictError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| VerdictError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VerdictError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| VerdictError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl VerdictService for HttpVerdictClient {
    async fn authenticate(
        &self,
        request: &VerdictRequest,
    ) -> Result<AuthCycleResult, VerdictError> {
        let body = self
            .post_json(&self.config.authenticate_url(), request)
            .await?;
        let response: VerdictResponse =
            serde_json::from_value(body).map_err(|e| VerdictError::Serialization(e.to_string()))?;
        response.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<AuthCycleResult, VerdictError> {
        let response: VerdictResponse = serde_json::from_str(json).unwrap();
        response.try_into()
    }

    #[test]
    fn test_verdict_config_urls() {
        let config = VerdictConfig::new("http://127.0.0.1:8000/");
        assert_eq!(config.authenticate_url(), "http://127.0.0.1:8000/authenticate");
        assert_eq!(config.enroll_url(), "http://127.0.0.1:8000/enroll");
        assert_eq!(
            config.typing_pattern_save_url(),
            "http://127.0.0.1:8000/typingdna/save"
        );
        assert_eq!(
            config.typing_pattern_verify_url(),
            "http://127.0.0.1:8000/typingdna/verify"
        );
        assert_eq!(config.health_url(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn test_parses_scored_response() {
        let result = parse(
            r#"{"status": "authenticated", "verdict": "impostor", "confidence": 0.91,
                "risk_level": "high", "requires_step_up": true, "final_score": 0.12}"#,
        )
        .unwrap();
        assert_eq!(result.verdict, Verdict::Impostor);
        assert_eq!(result.confidence, 0.91);
        assert_eq!(result.risk_level, "high");
        assert!(result.requires_step_up);
        assert!(result.demands_step_up());
    }

    #[test]
    fn test_uncertain_and_unrecognised_verdicts_map_to_unknown() {
        let uncertain = parse(r#"{"verdict": "uncertain", "confidence": 0.5}"#).unwrap();
        assert_eq!(uncertain.verdict, Verdict::Unknown);
        assert!(!uncertain.demands_step_up());

        let odd = parse(r#"{"verdict": "suspicious"}"#).unwrap();
        assert_eq!(odd.verdict, Verdict::Unknown);
        assert_eq!(odd.risk_level, "unknown");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = parse(r#"{"verdict": "genuine", "confidence": 1.7}"#).unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_unscored_response_is_an_error() {
        let err = parse(
            r#"{"status": "insufficient_enrollment", "message": "Need at least 3 enrollments"}"#,
        )
        .unwrap_err();
        match err {
            VerdictError::NotScored { status, message } => {
                assert_eq!(status, "insufficient_enrollment");
                assert!(message.contains("3 enrollments"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_request_omits_missing_typing_pattern() {
        let request = VerdictRequest {
            user_id: "alice".to_string(),
            features: FeatureMap::new(),
            session_id: "s-1".to_string(),
            device_info: crate::core::device::DeviceInfo::detect_with(
                &Default::default(),
                |_| None,
            ),
            typing_pattern: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("typingdna_pattern").is_none());
        assert_eq!(json["user_id"], "alice");
        assert!(json["device_info"].get("userAgent").is_some());
    }

    #[test]
    fn test_request_wraps_typing_pattern() {
        let request = VerdictRequest {
            user_id: "alice".to_string(),
            features: FeatureMap::new(),
            session_id: "s-1".to_string(),
            device_info: crate::core::device::DeviceInfo::detect_with(
                &Default::default(),
                |_| None,
            ),
            typing_pattern: Some("0,3.2,1".to_string()),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["typingdna_pattern"]["pattern"], "0,3.2,1");
    }

    #[test]
    fn test_feature_enrollment_request_shape() {
        let mut features = FeatureMap::new();
        features.insert("dwell_mean".to_string(), 70.0);
        features.insert("key_count".to_string(), 2.0);

        let bare = FeatureEnrollmentRequest {
            user_id: "alice".to_string(),
            features: features.clone(),
            device_info: None,
            typing_pattern: None,
        };
        let json = serde_json::to_value(&bare).unwrap();
        assert_eq!(json["user_id"], "alice");
        assert_eq!(json["features"]["dwell_mean"], 70.0);
        assert_eq!(json["features"]["key_count"], 2.0);
        assert!(json.get("device_info").is_none());
        assert!(json.get("typingdna_pattern").is_none());

        let full = FeatureEnrollmentRequest {
            device_info: Some(crate::core::device::DeviceInfo::detect_with(
                &Default::default(),
                |_| None,
            )),
            typing_pattern: Some("0,3.2,1".to_string()),
            ..bare
        };
        let json = serde_json::to_value(&full).unwrap();
        assert!(json["device_info"].get("timezone").is_some());
        assert_eq!(json["typingdna_pattern"]["pattern"], "0,3.2,1");
    }

    #[test]
    fn test_parses_enrollment_response() {
        let response: EnrollmentResponse = serde_json::from_str(
            r#"{"status": "enrolled", "user_id": "alice", "enrollment_count": 2,
                "train_info": "Need at least 3 enrollments", "can_authenticate": false}"#,
        )
        .unwrap();
        assert_eq!(response.enrollment_count, 2);
        assert!(!response.can_authenticate);
        assert_eq!(response.train_info.as_deref(), Some("Need at least 3 enrollments"));
    }

    #[test]
    fn test_typing_pattern_request_omits_missing_quality() {
        let request = TypingPatternRequest {
            user_id: "alice".to_string(),
            typing_pattern: "0,3.2,1".to_string(),
            text_id: "7".to_string(),
            quality: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["typing_pattern"], "0,3.2,1");
        assert_eq!(json["text_id"], "7");
        assert!(json.get("quality").is_none());
    }
}
