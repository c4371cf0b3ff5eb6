//! HTTP client for the remote face recognition service.
//!
//! The service is an opaque HTTP endpoint:
//!
//! ```text
//! POST {base}/recognize        multipart "file"        -> {found, user?, confidence?, reason?}
//! POST {base}/add-user/{name}  multipart "file", auth  -> 200/201 per image
//! POST {base}/train            auth                    -> 200
//! ```
//!
//! The client is a thin transport: no retries, no caching. The kiosk decides
//! what a verdict means for the lock.

use crate::error::{FaceServiceError, FaceServiceResult};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECOGNIZE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_TRAIN_TIMEOUT: Duration = Duration::from_secs(120);

const IMAGE_MIME: &str = "image/jpeg";

/// Face service connection settings.
///
/// # Example
///
/// ```
/// use smartlocker_network::FaceServiceConfig;
/// use std::time::Duration;
///
/// let config = FaceServiceConfig::new("http://10.0.0.5:8000")
///     .with_admin_token("s3cret")
///     .with_recognize_timeout(Duration::from_secs(5));
/// assert_eq!(config.base_url, "http://10.0.0.5:8000");
/// ```
#[derive(Debug, Clone)]
pub struct FaceServiceConfig {
    pub base_url: String,

    /// Bearer token for registration and training.
    pub admin_token: Option<String>,

    pub connect_timeout: Duration,
    pub recognize_timeout: Duration,
    pub upload_timeout: Duration,

    /// Training runs server-side and can take minutes.
    pub train_timeout: Duration,
}

impl Default for FaceServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            admin_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recognize_timeout: DEFAULT_RECOGNIZE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            train_timeout: DEFAULT_TRAIN_TIMEOUT,
        }
    }
}

impl FaceServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    pub fn with_recognize_timeout(mut self, timeout: Duration) -> Self {
        self.recognize_timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_train_timeout(mut self, timeout: Duration) -> Self {
        self.train_timeout = timeout;
        self
    }
}

/// Answer from `POST /recognize`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FaceVerdict {
    pub found: bool,

    #[serde(default, rename = "user")]
    pub identity: Option<String>,

    #[serde(default)]
    pub confidence: Option<f64>,

    /// Why the face was not recognized, when the service says.
    #[serde(default)]
    pub reason: Option<String>,
}

impl FaceVerdict {
    /// The recognized identity, if the service found a match that names one.
    pub fn matched_identity(&self) -> Option<&str> {
        if !self.found {
            return None;
        }
        self.identity
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Client for the face recognition service.
#[derive(Debug, Clone)]
pub struct FaceServiceClient {
    http: Client,
    base: Url,
    config: FaceServiceConfig,
}

impl FaceServiceClient {
    /// # Errors
    ///
    /// Returns `FaceServiceError::Configuration` if the base URL does not
    /// parse or the HTTP client cannot be built.
    pub fn new(config: FaceServiceConfig) -> FaceServiceResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| FaceServiceError::Configuration(format!("invalid base URL: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FaceServiceError::Configuration(format!(
                "base URL cannot carry paths: {}",
                config.base_url
            )));
        }

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| FaceServiceError::Configuration(e.to_string()))?;

        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &FaceServiceConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> FaceServiceResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| FaceServiceError::Configuration("base URL cannot carry paths".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.admin_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn image_form(image: Vec<u8>, file_name: String) -> FaceServiceResult<Form> {
        let part = Part::bytes(image)
            .file_name(file_name)
            .mime_str(IMAGE_MIME)
            .map_err(|e| FaceServiceError::RequestFailed(e.to_string()))?;
        Ok(Form::new().part("file", part))
    }

    async fn send(request: RequestBuilder) -> FaceServiceResult<Response> {
        let response = request
            .send()
            .await
            .map_err(FaceServiceError::from_transport)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FaceServiceError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FaceServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Ask the service who is in `image` (JPEG bytes).
    pub async fn recognize(&self, image: Vec<u8>) -> FaceServiceResult<FaceVerdict> {
        let url = self.endpoint(&["recognize"])?;
        debug!(%url, bytes = image.len(), "Submitting face for recognition");

        let form = Self::image_form(image, "image.jpg".into())?;
        let request = self
            .http
            .post(url)
            .timeout(self.config.recognize_timeout)
            .multipart(form);

        let verdict: FaceVerdict = Self::send(request).await?.json().await.map_err(|e| {
            FaceServiceError::InvalidResponse(format!("failed to parse verdict: {e}"))
        })?;

        debug!(found = verdict.found, identity = ?verdict.identity, "Face verdict");
        Ok(verdict)
    }

    /// Upload reference images for `identity`, one request per image.
    ///
    /// Stops at the first rejected image. Returns the number uploaded.
    pub async fn register_face(
        &self,
        identity: &str,
        images: Vec<Vec<u8>>,
    ) -> FaceServiceResult<usize> {
        let url = self.endpoint(&["add-user", identity])?;
        let total = images.len();

        for (index, image) in images.into_iter().enumerate() {
            let form = Self::image_form(image, format!("img{}.jpg", index + 1))?;
            let request = self
                .authorized(self.http.post(url.clone()))
                .timeout(self.config.upload_timeout)
                .multipart(form);

            if let Err(e) = Self::send(request).await {
                warn!(identity, image = index + 1, error = %e, "Face upload rejected");
                return Err(e);
            }
            debug!(identity, image = index + 1, total, "Face image uploaded");
        }

        info!(identity, images = total, "Face registration uploaded");
        Ok(total)
    }

    /// Ask the service to retrain its model.
    pub async fn train(&self) -> FaceServiceResult<()> {
        let url = self.endpoint(&["train"])?;
        let request = self
            .authorized(self.http.post(url))
            .timeout(self.config.train_timeout);

        Self::send(request).await?;
        info!("Face model training completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_verdict_found() {
        let verdict: FaceVerdict =
            serde_json::from_str(r#"{"found": true, "user": "Ana", "confidence": 87.5}"#).unwrap();
        assert!(verdict.found);
        assert_eq!(verdict.matched_identity(), Some("Ana"));
        assert_eq!(verdict.confidence, Some(87.5));
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn test_verdict_not_found_with_reason() {
        let verdict: FaceVerdict =
            serde_json::from_str(r#"{"found": false, "reason": "no face detected"}"#).unwrap();
        assert_eq!(verdict.matched_identity(), None);
        assert_eq!(verdict.reason.as_deref(), Some("no face detected"));
    }

    #[rstest]
    #[case(r#"{"found": true}"#)]
    #[case(r#"{"found": true, "user": "  "}"#)]
    fn test_found_without_name_has_no_identity(#[case] json: &str) {
        let verdict: FaceVerdict = serde_json::from_str(json).unwrap();
        assert_eq!(verdict.matched_identity(), None);
    }

    #[rstest]
    #[case("http://host:8000", "http://host:8000/add-user/Ana%20Maria")]
    #[case("http://host:8000/", "http://host:8000/add-user/Ana%20Maria")]
    #[case("http://host/api/", "http://host/api/add-user/Ana%20Maria")]
    fn test_endpoint_joins_and_encodes(#[case] base: &str, #[case] expected: &str) {
        let client = FaceServiceClient::new(FaceServiceConfig::new(base)).unwrap();
        let url = client.endpoint(&["add-user", "Ana Maria"]).unwrap();
        assert_eq!(url.as_str(), expected);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = FaceServiceClient::new(FaceServiceConfig::new("not a url"));
        assert!(matches!(result, Err(FaceServiceError::Configuration(_))));
    }
}
