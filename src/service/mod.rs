//! The remote collaborators the workflow depends on.
//!
//! Every call is a single attempt returning `Result<_, ServiceError>`; the
//! controller decides what a failure means for the workflow. Tests drive the
//! controller with scripted implementations of [`ConversionBackend`];
//! production code uses [`http::HttpBackend`].

pub mod http;

use crate::error::ServiceError;
use crate::i18n::Locale;
use crate::model::{ArtifactId, CandidateFile, ConversionResult, DetectedType, DownloadHandle, FormatCatalog};
use async_trait::async_trait;

pub use http::HttpBackend;

/// Format Catalog, Type Detection, Conversion and Artifact Store services.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Supported output formats, partitioned by category.
    async fn fetch_formats(&self) -> Result<FormatCatalog, ServiceError>;

    /// Classify a file as vector or raster.
    async fn detect_type(
        &self,
        file: &CandidateFile,
        locale: &Locale,
    ) -> Result<DetectedType, ServiceError>;

    /// Convert a file to the given output format.
    async fn convert(
        &self,
        file: &CandidateFile,
        output_format: &str,
        locale: &Locale,
    ) -> Result<ConversionResult, ServiceError>;

    /// Retrieve the bytes of a converted artifact.
    async fn download_artifact(&self, handle: &DownloadHandle) -> Result<Vec<u8>, ServiceError>;

    /// Delete a server-held artifact.
    async fn cleanup_artifact(&self, id: &ArtifactId) -> Result<(), ServiceError>;
}
