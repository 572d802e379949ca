//! Locale tags, fallback messages and the persisted language preference.
//!
//! The server localizes its own error messages from the locale tag sent with
//! each request. The client only needs a small table for the messages it
//! produces itself: local validation failures and the generic fallbacks used
//! when a failed response carries no server message.

use crate::error::GeoConvertError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locales with a fallback-message table. Anything else reads English.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "fr", "es"];

/// A short language tag such as `en` or `fr`.
///
/// Not validated beyond trimming and lower-casing; unknown tags are passed
/// through to the server unchanged and read English client-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag used to look up client-side messages.
    fn table_key(&self) -> &str {
        let primary = self.0.split(['-', '_']).next().unwrap_or("");
        if SUPPORTED_LOCALES.contains(&primary) {
            primary
        } else {
            "en"
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Messages the workflow emits on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    SelectFileFirst,
    SelectFormatFirst,
    DetectionFailed,
    ConversionError,
    DownloadFailed,
}

impl Message {
    /// Localized text for this message.
    pub fn text(self, locale: &Locale) -> &'static str {
        use Message::*;
        match (self, locale.table_key()) {
            (SelectFileFirst, "fr") => "Veuillez d'abord sélectionner un fichier",
            (SelectFileFirst, "es") => "Por favor, primero seleccione un archivo",
            (SelectFileFirst, _) => "Please select a file first",

            (SelectFormatFirst, "fr") => "Veuillez sélectionner un format de sortie",
            (SelectFormatFirst, "es") => "Por favor, seleccione un formato de salida",
            (SelectFormatFirst, _) => "Please select an output format",

            (DetectionFailed, "fr") => "Impossible de détecter le type de fichier",
            (DetectionFailed, "es") => "No se pudo detectar el tipo de archivo",
            (DetectionFailed, _) => "Could not detect the file type",

            (ConversionError, "fr") => "Une erreur s'est produite lors de la conversion",
            (ConversionError, "es") => "Se produjo un error durante la conversión",
            (ConversionError, _) => "An error occurred during conversion",

            (DownloadFailed, "fr") => "Échec du téléchargement du fichier converti",
            (DownloadFailed, "es") => "Error al descargar el archivo convertido",
            (DownloadFailed, _) => "Failed to download the converted file",
        }
    }
}

// ── Persisted preference ─────────────────────────────────────────────────

/// Client-persisted user preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Preferred UI/server language, if the user ever chose one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Locale>,
}

impl Preferences {
    /// Default location: `$GEOCONVERT_PREFS`, else
    /// `{config_dir}/geoconvert/preferences.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("GEOCONVERT_PREFS") {
            if !p.is_empty() {
                return PathBuf::from(p);
            }
        }
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(std::env::temp_dir);
        base.join("geoconvert").join("preferences.json")
    }

    /// Load preferences; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, GeoConvertError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No preferences at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(GeoConvertError::Preferences {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_str(&raw).map_err(|e| GeoConvertError::Preferences {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write preferences atomically, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), GeoConvertError> {
        let err = |reason: String| GeoConvertError::Preferences {
            path: path.to_path_buf(),
            reason,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| err(e.to_string()))?;
        let json = serde_json::to_string_pretty(self).map_err(|e| err(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| err(e.to_string()))?;
        tmp.persist(path).map_err(|e| err(e.error.to_string()))?;
        Ok(())
    }

    /// The locale to use: the stored language, else `en`.
    pub fn locale(&self) -> Locale {
        self.language.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_normalises_case_and_whitespace() {
        assert_eq!(Locale::new(" FR ").as_str(), "fr");
    }

    #[test]
    fn unknown_locale_reads_english() {
        let de = Locale::new("de");
        assert_eq!(
            Message::ConversionError.text(&de),
            "An error occurred during conversion"
        );
    }

    #[test]
    fn regional_tag_uses_primary_language() {
        let ca = Locale::new("fr-CA");
        assert_eq!(
            Message::SelectFileFirst.text(&ca),
            "Veuillez d'abord sélectionner un fichier"
        );
    }

    #[test]
    fn every_message_is_translated() {
        let all = [
            Message::SelectFileFirst,
            Message::SelectFormatFirst,
            Message::DetectionFailed,
            Message::ConversionError,
            Message::DownloadFailed,
        ];
        let en = Locale::default();
        for tag in ["fr", "es"] {
            let loc = Locale::new(tag);
            for m in all {
                assert_ne!(m.text(&loc), m.text(&en), "{m:?} untranslated for {tag}");
            }
        }
    }

    #[test]
    fn preferences_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        assert_eq!(Preferences::load(&path).unwrap(), Preferences::default());

        let prefs = Preferences {
            language: Some(Locale::new("es")),
        };
        prefs.save(&path).unwrap();
        let loaded = Preferences::load(&path).unwrap();
        assert_eq!(loaded.locale().as_str(), "es");
    }

    #[test]
    fn corrupt_preferences_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Preferences::load(&path),
            Err(GeoConvertError::Preferences { .. })
        ));
    }
}
