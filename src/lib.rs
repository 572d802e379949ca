//! # geoconvert-client
//!
//! Client-side workflow for a remote GDAL/OGR geospatial conversion service.
//!
//! ## Why this crate?
//!
//! Converting a shapefile to GeoJSON or a GeoTIFF to PNG through a remote
//! service takes five network round trips, and each of them can fail on its
//! own. A user can also change their mind at any moment. This crate owns
//! the state machine behind that: it only offers output formats that match
//! the detected data type, never lets a superseded request overwrite newer
//! state, and releases server-side artifacts once they are delivered.
//!
//! ## Workflow Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Select    stage the file, clear everything downstream
//!  ├─ 2. Detect    POST /api/detect          → vector | raster
//!  ├─ 3. Gate      enable only the formats of the detected category
//!  ├─ 4. Convert   POST /api/convert         → filename + download handle
//!  ├─ 5. Download  GET  <download handle>    → artifact bytes
//!  └─ 6. Cleanup   DELETE /api/cleanup/<id>  (best effort)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geoconvert_client::{CandidateFile, ClientConfig, WorkflowController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://localhost:8000")
//!         .locale("fr")
//!         .build()?;
//!     let workflow = WorkflowController::connect(&config, None).await?;
//!
//!     let file = CandidateFile::from_path("parcels.geojson").await?;
//!     let kind = workflow.select_file(Some(file)).await?;
//!     eprintln!("detected {kind}");
//!
//!     workflow.select_format("shp")?;
//!     let result = workflow.convert().await?;
//!     let saved = workflow.download_to(".").await?;
//!     eprintln!("{} -> {}", result.filename, saved.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `geoconvert` binary (clap + anyhow + indicatif + tracing-subscriber + futures) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! geoconvert-client = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod i18n;
pub mod model;
pub mod observer;
pub mod service;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL};
pub use error::{GeoConvertError, ServiceError, Step, ValidationError, WorkflowError};
pub use i18n::{Locale, Message, Preferences, SUPPORTED_LOCALES};
pub use model::{
    human_size, mime_hint, Artifact, ArtifactId, CandidateFile, ConversionResult, DetectedType,
    DownloadHandle, FileSummary, FormatCatalog, FormatDescriptor, HealthStatus, SavedArtifact,
};
pub use observer::{NoopObserver, SharedObserver, WorkflowObserver};
pub use service::{ConversionBackend, HttpBackend};
pub use workflow::{
    FormatAvailability, FormatOption, Phase, StepError, WorkflowController, WorkflowSnapshot,
};
