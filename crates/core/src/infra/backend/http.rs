use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::domain::backend::{
    BackendError, ErrorBody, InlineUploadRequest, InlineUploadResponse, StatusResponse,
    TranslationBackend, UploadSlot, UploadSlotRequest,
};

/// reqwest を使った翻訳APIクライアント
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(format!("HTTP request failed: {e}"))
    }
}

/// 非2xxなら本文の `error` を拾って Http エラーにする
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Http {
        status: status.as_u16(),
        message: ErrorBody::extract(&body),
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    let body = response.text().await.map_err(map_send_error)?;
    serde_json::from_str(&body)
        .map_err(|e| BackendError::Malformed(format!("response parse error: {e}")))
}

#[async_trait]
impl TranslationBackend for HttpBackend {
    async fn request_upload_slot(
        &self,
        endpoint: &str,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlot, BackendError> {
        let response = self
            .client
            .post(format!("{endpoint}/presigned-url"))
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    async fn put_upload(
        &self,
        upload_url: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        let response = self
            .client
            .put(upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(map_send_error)?;

        check_status(response).await.map(|_| ())
    }

    async fn submit_inline(
        &self,
        endpoint: &str,
        request: &InlineUploadRequest,
    ) -> Result<InlineUploadResponse, BackendError> {
        let response = self
            .client
            .post(format!("{endpoint}/upload"))
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    async fn poll_status(
        &self,
        endpoint: &str,
        request_id: &str,
    ) -> Result<StatusResponse, BackendError> {
        let response = self
            .client
            .get(format!("{endpoint}/status"))
            .query(&[("request_id", request_id)])
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let response = self.client.get(url).send().await.map_err(map_send_error)?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(map_send_error)?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &str {
        "http"
    }
}
