//! Coordinate validation for location ingestion

use crate::frames::LocationReport;
use crate::{Error, Result};

/// Validate a location report before persistence or broadcast
///
/// Rejects non-finite or out-of-range coordinates and samples whose
/// reported accuracy radius exceeds `max_accuracy_m`.
///
/// # Errors
///
/// Returns `Error::Validation` describing the first failing field.
pub fn validate(report: &LocationReport, max_accuracy_m: f64) -> Result<()> {
    if !report.latitude.is_finite() || report.latitude.abs() > 90.0 {
        return Err(Error::Validation(format!(
            "latitude out of range: {}",
            report.latitude
        )));
    }
    if !report.longitude.is_finite() || report.longitude.abs() > 180.0 {
        return Err(Error::Validation(format!(
            "longitude out of range: {}",
            report.longitude
        )));
    }
    if let Some(accuracy) = report.accuracy {
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(Error::Validation(format!("invalid accuracy: {accuracy}")));
        }
        if accuracy > max_accuracy_m {
            return Err(Error::Validation(format!(
                "accuracy {accuracy}m beyond accepted radius {max_accuracy_m}m"
            )));
        }
    }
    Ok(())
}
