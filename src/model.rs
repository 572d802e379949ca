//! Data exchanged with the conversion service and held by the workflow.

use crate::error::GeoConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── CandidateFile ────────────────────────────────────────────────────────

/// The file currently staged for conversion.
///
/// The payload is shared read-only between the controller and in-flight
/// detection/conversion requests; cloning is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct CandidateFile {
    name: String,
    mime: String,
    data: Arc<[u8]>,
}

impl CandidateFile {
    /// Build a candidate from an in-memory payload. The MIME hint is derived
    /// from the file extension.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let mime = mime_hint(&name).to_string();
        let data: Vec<u8> = data.into();
        Self {
            name,
            mime,
            data: Arc::from(data),
        }
    }

    /// Override the MIME hint.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    /// Read a local file into a candidate.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, GeoConvertError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GeoConvertError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => GeoConvertError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => GeoConvertError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Lightweight description for snapshots and logs.
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            size: self.size(),
            mime: self.mime.clone(),
        }
    }
}

impl fmt::Debug for CandidateFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Name, size and MIME hint of a [`CandidateFile`], without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub size: u64,
    pub mime: String,
}

/// MIME hint for the upload, keyed on the extensions the service accepts.
pub fn mime_hint(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "geojson" => "application/geo+json",
        "json" => "application/json",
        "kml" => "application/vnd.google-earth.kml+xml",
        "gpx" => "application/gpx+xml",
        "gml" => "application/gml+xml",
        "gpkg" => "application/geopackage+sqlite3",
        "tif" | "tiff" => "image/tiff",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "csv" => "text/csv",
        "dxf" => "image/vnd.dxf",
        "shp" => "application/x-esri-shape",
        _ => "application/octet-stream",
    }
}

/// Render a byte count as `Bytes`/`KB`/`MB`/`GB` with up to two decimals.
pub fn human_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut i = 0;
    while value >= 1024.0 && i < UNITS.len() - 1 {
        value /= 1024.0;
        i += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[i])
}

// ── Detected type ────────────────────────────────────────────────────────

/// Classification of a file as vector or raster geodata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedType {
    Vector,
    Raster,
    /// Detection has not completed, or failed.
    #[default]
    #[serde(other)]
    Unknown,
}

impl DetectedType {
    pub fn is_known(self) -> bool {
        !matches!(self, DetectedType::Unknown)
    }
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectedType::Vector => "vector",
            DetectedType::Raster => "raster",
            DetectedType::Unknown => "unknown",
        })
    }
}

// ── Format catalog ───────────────────────────────────────────────────────

/// One convertible output format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Identifier sent as `output_format`, unique within its list.
    pub code: String,
    /// Human-readable name.
    #[serde(rename = "name")]
    pub display_name: String,
    /// File extension of the produced artifact, without the dot.
    pub extension: String,
}

impl FormatDescriptor {
    pub fn new(
        code: impl Into<String>,
        display_name: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
            extension: extension.into(),
        }
    }
}

/// Server-advertised output formats, partitioned by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatCatalog {
    #[serde(default)]
    pub vector: Vec<FormatDescriptor>,
    #[serde(default)]
    pub raster: Vec<FormatDescriptor>,
}

impl FormatCatalog {
    /// Build a catalog, dropping later duplicates of a code within a list.
    pub fn new(vector: Vec<FormatDescriptor>, raster: Vec<FormatDescriptor>) -> Self {
        Self {
            vector: dedup_codes(vector),
            raster: dedup_codes(raster),
        }
    }

    /// The list matching a detected type; empty for `Unknown`.
    pub fn formats_for(&self, kind: DetectedType) -> &[FormatDescriptor] {
        match kind {
            DetectedType::Vector => &self.vector,
            DetectedType::Raster => &self.raster,
            DetectedType::Unknown => &[],
        }
    }

    /// Which category, if any, lists `code`.
    pub fn category_of(&self, code: &str) -> Option<DetectedType> {
        if self.vector.iter().any(|f| f.code == code) {
            Some(DetectedType::Vector)
        } else if self.raster.iter().any(|f| f.code == code) {
            Some(DetectedType::Raster)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty() && self.raster.is_empty()
    }
}

fn dedup_codes(list: Vec<FormatDescriptor>) -> Vec<FormatDescriptor> {
    let mut seen = std::collections::HashSet::new();
    list.into_iter()
        .filter(|f| seen.insert(f.code.clone()))
        .collect()
}

// ── Conversion result ────────────────────────────────────────────────────

/// Opaque reference to a converted artifact awaiting retrieval.
///
/// The service hands out a path such as `/api/download/<job>_<file>`; the
/// trailing segment doubles as the artifact identifier for cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadHandle(String);

impl DownloadHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The artifact identifier: the handle's last non-empty path segment,
    /// without any query string or fragment.
    pub fn artifact_id(&self) -> Option<ArtifactId> {
        let path = self.0.split(['?', '#']).next().unwrap_or("");
        path.rsplit('/')
            .find(|s| !s.is_empty())
            .map(|s| ArtifactId(s.to_string()))
    }
}

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a server-held artifact, used for cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// File name the artifact should be saved under.
    pub filename: String,
    /// Server's (localized) success message.
    #[serde(default)]
    pub message: String,
    /// Category the server read the input as.
    pub input_type: DetectedType,
    /// Output format code.
    pub output_format: String,
    /// Where to fetch the artifact from.
    #[serde(rename = "download_url")]
    pub download_handle: DownloadHandle,
}

/// Converted artifact bytes delivered to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Where a downloaded artifact was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Server health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub gdal_available: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.gdal_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_hint_by_extension() {
        assert_eq!(mime_hint("parcels.GeoJSON"), "application/geo+json");
        assert_eq!(mime_hint("dem.tif"), "image/tiff");
        assert_eq!(mime_hint("dem.TIFF"), "image/tiff");
        assert_eq!(mime_hint("broken.xyz"), "application/octet-stream");
        assert_eq!(mime_hint("no_extension"), "application/octet-stream");
    }

    #[test]
    fn human_size_units() {
        assert_eq!(human_size(0), "0 Bytes");
        assert_eq!(human_size(512), "512 Bytes");
        assert_eq!(human_size(1024), "1 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn artifact_id_is_trailing_segment() {
        let h = DownloadHandle::new("/api/download/1234_parcels.geojson");
        assert_eq!(h.artifact_id().unwrap().as_str(), "1234_parcels.geojson");

        let abs = DownloadHandle::new("https://host/api/download/abc_dem.tif?sig=1");
        assert_eq!(abs.artifact_id().unwrap().as_str(), "abc_dem.tif");

        let trailing = DownloadHandle::new("/api/download/abc_x.kml/");
        assert_eq!(trailing.artifact_id().unwrap().as_str(), "abc_x.kml");

        assert!(DownloadHandle::new("").artifact_id().is_none());
    }

    #[test]
    fn detected_type_wire_format() {
        let v: DetectedType = serde_json::from_str("\"vector\"").unwrap();
        assert_eq!(v, DetectedType::Vector);
        let other: DetectedType = serde_json::from_str("\"pointcloud\"").unwrap();
        assert_eq!(other, DetectedType::Unknown);
        assert_eq!(serde_json::to_string(&DetectedType::Raster).unwrap(), "\"raster\"");
    }

    #[test]
    fn conversion_result_decodes_service_payload() {
        let json = r#"{
            "success": true,
            "message": "File converted successfully!",
            "download_url": "/api/download/42_parcels.geojson",
            "filename": "parcels.geojson",
            "input_type": "vector",
            "output_format": "geojson"
        }"#;
        let r: ConversionResult = serde_json::from_str(json).unwrap();
        assert_eq!(r.filename, "parcels.geojson");
        assert_eq!(r.input_type, DetectedType::Vector);
        assert_eq!(r.download_handle.as_str(), "/api/download/42_parcels.geojson");
    }

    #[test]
    fn catalog_lookup_and_dedup() {
        let catalog = FormatCatalog::new(
            vec![
                FormatDescriptor::new("geojson", "GeoJSON", "geojson"),
                FormatDescriptor::new("shp", "Shapefile", "shp"),
                FormatDescriptor::new("geojson", "Duplicate", "json"),
            ],
            vec![FormatDescriptor::new("tif", "GeoTIFF", "tif")],
        );
        assert_eq!(catalog.vector.len(), 2);
        assert_eq!(catalog.vector[0].display_name, "GeoJSON");
        assert_eq!(catalog.category_of("shp"), Some(DetectedType::Vector));
        assert_eq!(catalog.category_of("tif"), Some(DetectedType::Raster));
        assert_eq!(catalog.category_of("nc"), None);
        assert!(catalog.formats_for(DetectedType::Unknown).is_empty());
    }

    #[test]
    fn candidate_debug_hides_payload() {
        let f = CandidateFile::new("a.kml", vec![1u8; 2048]);
        let dbg = format!("{f:?}");
        assert!(dbg.contains("size: 2048"), "got: {dbg}");
        assert_eq!(f.mime(), "application/vnd.google-earth.kml+xml");
    }

    #[tokio::test]
    async fn from_path_reports_missing_file() {
        let err = CandidateFile::from_path("/definitely/not/here.shp")
            .await
            .unwrap_err();
        assert!(matches!(err, GeoConvertError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.gpx");
        std::fs::write(&path, b"<gpx/>").unwrap();
        let f = CandidateFile::from_path(&path).await.unwrap();
        assert_eq!(f.name(), "roads.gpx");
        assert_eq!(f.size(), 6);
        assert_eq!(f.bytes(), b"<gpx/>");
    }
}
