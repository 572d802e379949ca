//! HTTP implementation of [`ConversionBackend`] for the GeoConverter API.
//!
//! ## Endpoints
//!
//! ```text
//! GET    /api/formats          → {vector: [...], raster: [...]}
//! POST   /api/detect           multipart(file, lang)                → {file_type}
//! POST   /api/convert          multipart(file, output_format, lang) → {filename, download_url, ...}
//! GET    {download_url}        → raw bytes
//! DELETE /api/cleanup/{id}     → {success, message}
//! GET    /api/health           → {status, gdal_available}
//! ```
//!
//! Failed requests carry `{"detail": "..."}` with a message already
//! localized by the server; it is surfaced through [`ServiceError::detail`].

use super::ConversionBackend;
use crate::config::{is_url, ClientConfig};
use crate::error::{GeoConvertError, ServiceError};
use crate::i18n::Locale;
use crate::model::{
    ArtifactId, CandidateFile, ConversionResult, DetectedType, DownloadHandle, FormatCatalog,
    HealthStatus,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// reqwest-backed client for the conversion service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpBackend {
    /// Build a backend from a validated configuration.
    pub fn new(config: ClientConfig) -> Result<Self, GeoConvertError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| GeoConvertError::ClientBuild(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask the server whether it is up and GDAL is usable.
    pub async fn health(&self) -> Result<HealthStatus, ServiceError> {
        let url = self.config.endpoint("/api/health");
        debug!("GET {}", url);
        let response = check(self.client.get(&url).send().await?).await?;
        Ok(response.json::<HealthStatus>().await?)
    }

    fn upload_part(file: &CandidateFile) -> Result<Part, ServiceError> {
        Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime())
            .map_err(|e| ServiceError::Transport(format!("invalid MIME hint '{}': {e}", file.mime())))
    }

    fn download_url(&self, handle: &DownloadHandle) -> String {
        if is_url(handle.as_str()) {
            handle.as_str().to_string()
        } else {
            self.config.endpoint(handle.as_str())
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    file_type: DetectedType,
}

#[derive(Debug, Deserialize)]
struct CleanupResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn fetch_formats(&self) -> Result<FormatCatalog, ServiceError> {
        let url = self.config.endpoint("/api/formats");
        debug!("GET {}", url);
        let response = check(self.client.get(&url).send().await?).await?;
        let catalog: FormatCatalog = response.json().await?;
        Ok(FormatCatalog::new(catalog.vector, catalog.raster))
    }

    async fn detect_type(
        &self,
        file: &CandidateFile,
        locale: &Locale,
    ) -> Result<DetectedType, ServiceError> {
        let url = self.config.endpoint("/api/detect");
        debug!("POST {} ({}, {} bytes)", url, file.name(), file.size());
        let form = Form::new()
            .part("file", Self::upload_part(file)?)
            .text("lang", locale.as_str().to_string());
        let response = check(self.client.post(&url).multipart(form).send().await?).await?;
        let body: DetectResponse = response.json().await?;
        if !body.file_type.is_known() {
            return Err(ServiceError::InvalidResponse(
                "server did not classify the file as vector or raster".into(),
            ));
        }
        Ok(body.file_type)
    }

    async fn convert(
        &self,
        file: &CandidateFile,
        output_format: &str,
        locale: &Locale,
    ) -> Result<ConversionResult, ServiceError> {
        let url = self.config.endpoint("/api/convert");
        info!("Converting {} → {}", file.name(), output_format);
        let form = Form::new()
            .part("file", Self::upload_part(file)?)
            .text("output_format", output_format.to_string())
            .text("lang", locale.as_str().to_string());
        let response = check(self.client.post(&url).multipart(form).send().await?).await?;
        Ok(response.json::<ConversionResult>().await?)
    }

    async fn download_artifact(&self, handle: &DownloadHandle) -> Result<Vec<u8>, ServiceError> {
        let url = self.download_url(handle);
        debug!("GET {}", url);
        let response = check(self.client.get(&url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn cleanup_artifact(&self, id: &ArtifactId) -> Result<(), ServiceError> {
        let url = self.config.endpoint(&format!("/api/cleanup/{}", id.as_str()));
        debug!("DELETE {}", url);
        let response = check(self.client.delete(&url).send().await?).await?;
        let ack: CleanupResponse = response.json().await?;
        if ack.success {
            Ok(())
        } else {
            Err(ServiceError::InvalidResponse(format!(
                "cleanup of '{id}' not acknowledged: {}",
                ack.message
            )))
        }
    }
}

/// Turn a non-success response into [`ServiceError::Rejected`], extracting
/// the server's `detail` message when present.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        detail: extract_detail(&body),
    })
}

/// Pull the user message out of an error body.
///
/// Handles both `{"detail": "text"}` and request-validation bodies of the
/// form `{"detail": [{"msg": "text", ...}]}`.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail")?;
    let text = match detail {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .first()?
            .get("msg")?
            .as_str()?
            .to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_from_string_body() {
        assert_eq!(
            extract_detail(r#"{"detail": "Unsupported output format."}"#).as_deref(),
            Some("Unsupported output format.")
        );
    }

    #[test]
    fn detail_from_validation_body() {
        let body = r#"{"detail": [{"loc": ["body", "file"], "msg": "field required", "type": "value_error.missing"}]}"#;
        assert_eq!(extract_detail(body).as_deref(), Some("field required"));
    }

    #[test]
    fn detail_absent_or_blank() {
        assert_eq!(extract_detail("Internal Server Error"), None);
        assert_eq!(extract_detail(r#"{"error": "x"}"#), None);
        assert_eq!(extract_detail(r#"{"detail": "   "}"#), None);
        assert_eq!(extract_detail(r#"{"detail": 42}"#), None);
    }

    #[test]
    fn download_url_resolves_relative_handles() {
        let config = ClientConfig::builder()
            .base_url("http://geo.local:8000")
            .build()
            .unwrap();
        let backend = HttpBackend::new(config).unwrap();
        assert_eq!(
            backend.download_url(&DownloadHandle::new("/api/download/1_a.kml")),
            "http://geo.local:8000/api/download/1_a.kml"
        );
        assert_eq!(
            backend.download_url(&DownloadHandle::new("https://cdn.example/x.tif")),
            "https://cdn.example/x.tif"
        );
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let config = ClientConfig::builder()
            .base_url("http://127.0.0.1:9")
            .connect_timeout_secs(1)
            .build()
            .unwrap();
        let backend = HttpBackend::new(config).unwrap();
        let err = tokio_test::block_on(backend.fetch_formats()).unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)), "got: {err:?}");
    }
}
