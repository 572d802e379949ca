//! Format Gate: which output formats may be chosen for the detected type.
//!
//! Both category lists are always presented. Entries are enabled only when
//! detection has finished and the entry's category matches the detected
//! type, so a raster-only format can never be selected for a vector file.

use super::WorkflowController;
use crate::error::{Step, WorkflowError};
use crate::model::{DetectedType, FormatCatalog, FormatDescriptor};
use serde::Serialize;
use tracing::debug;

/// One entry of the format picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub descriptor: FormatDescriptor,
    pub enabled: bool,
    pub selected: bool,
}

/// Both category lists with their enabled mask.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatAvailability {
    pub vector: Vec<FormatOption>,
    pub raster: Vec<FormatOption>,
}

impl FormatAvailability {
    pub fn enabled_codes(&self) -> Vec<&str> {
        self.vector
            .iter()
            .chain(self.raster.iter())
            .filter(|o| o.enabled)
            .map(|o| o.descriptor.code.as_str())
            .collect()
    }

    pub fn is_enabled(&self, code: &str) -> bool {
        self.enabled_codes().contains(&code)
    }

    pub fn none_enabled(&self) -> bool {
        self.enabled_codes().is_empty()
    }
}

/// Build the picker for a detected type.
pub(crate) fn availability(
    catalog: &FormatCatalog,
    detected: DetectedType,
    detecting: bool,
    selected: Option<&str>,
) -> FormatAvailability {
    let options = |list: &[FormatDescriptor], category: DetectedType| -> Vec<FormatOption> {
        list.iter()
            .map(|d| FormatOption {
                descriptor: d.clone(),
                enabled: !detecting && detected == category,
                selected: selected == Some(d.code.as_str()),
            })
            .collect()
    };
    FormatAvailability {
        vector: options(&catalog.vector, DetectedType::Vector),
        raster: options(&catalog.raster, DetectedType::Raster),
    }
}

/// Why `code` may not be selected right now, if it may not.
pub(crate) fn rejection(
    catalog: &FormatCatalog,
    detected: DetectedType,
    detecting: bool,
    code: &str,
) -> Option<String> {
    if detecting {
        return Some("file type detection is still running".into());
    }
    if !detected.is_known() {
        return Some("no file with a detected type is selected".into());
    }
    match catalog.category_of(code) {
        None => Some("not in the server's format catalog".into()),
        Some(category) if category != detected => Some(format!(
            "{category} format cannot be produced from {detected} data"
        )),
        Some(_) => None,
    }
}

impl WorkflowController {
    /// The format picker for the current state.
    pub fn available_formats(&self) -> FormatAvailability {
        let state = self.lock();
        availability(
            self.catalog(),
            state.detected,
            state.detecting,
            state.selected_format.as_deref(),
        )
    }

    /// Choose the output format.
    ///
    /// Codes outside the enabled list are rejected and leave the selection
    /// untouched, as does any choice while a conversion is in flight. A successful selection clears the visible error; choosing
    /// the already-selected code again changes nothing.
    pub fn select_format(&self, code: &str) -> Result<(), WorkflowError> {
        let snapshot = {
            let mut state = self.lock();
            if state.result.is_some() {
                return Err(WorkflowError::ResultPending);
            }
            if state.converting {
                return Err(WorkflowError::Busy {
                    step: Step::Conversion,
                });
            }
            if let Some(reason) = rejection(self.catalog(), state.detected, state.detecting, code)
            {
                debug!("Rejected format '{}': {}", code, reason);
                return Err(WorkflowError::FormatRejected {
                    code: code.to_string(),
                    reason,
                });
            }
            if state.selected_format.as_deref() == Some(code) && state.error.is_none() {
                return Ok(());
            }
            state.selected_format = Some(code.to_string());
            state.error = None;
            self.publish(&state)
        };
        debug!("Selected output format '{}'", code);
        self.notify(&snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FormatCatalog {
        FormatCatalog::new(
            vec![
                FormatDescriptor::new("geojson", "GeoJSON", "geojson"),
                FormatDescriptor::new("shp", "Shapefile", "shp"),
            ],
            vec![
                FormatDescriptor::new("tif", "GeoTIFF", "tif"),
                FormatDescriptor::new("hfa", "Erdas Imagine", "img"),
            ],
        )
    }

    #[test]
    fn unknown_type_enables_nothing_but_lists_everything() {
        let a = availability(&catalog(), DetectedType::Unknown, false, None);
        assert_eq!(a.vector.len(), 2);
        assert_eq!(a.raster.len(), 2);
        assert!(a.none_enabled());
    }

    #[test]
    fn vector_enables_only_vector() {
        let a = availability(&catalog(), DetectedType::Vector, false, Some("shp"));
        assert_eq!(a.enabled_codes(), vec!["geojson", "shp"]);
        assert!(a.vector[1].selected);
        assert!(a.raster.iter().all(|o| !o.enabled));
    }

    #[test]
    fn raster_enables_only_raster() {
        let a = availability(&catalog(), DetectedType::Raster, false, None);
        assert_eq!(a.enabled_codes(), vec!["tif", "hfa"]);
    }

    #[test]
    fn detecting_disables_everything() {
        let a = availability(&catalog(), DetectedType::Vector, true, None);
        assert!(a.none_enabled());
    }

    #[test]
    fn rejection_reasons() {
        let c = catalog();
        assert!(rejection(&c, DetectedType::Raster, false, "shp")
            .unwrap()
            .contains("vector format"));
        assert!(rejection(&c, DetectedType::Unknown, false, "shp").is_some());
        assert!(rejection(&c, DetectedType::Vector, true, "shp").is_some());
        assert!(rejection(&c, DetectedType::Vector, false, "nope").is_some());
        assert!(rejection(&c, DetectedType::Vector, false, "geojson").is_none());
    }
}
