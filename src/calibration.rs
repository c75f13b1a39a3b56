//! Pressure calibration table.
//!
//! The vendor SDK converts between controller units and mbar using a table
//! of coefficients that the caller owns and hands to every pressure call.
//! [`CalibrationTable`] owns that buffer and refuses to expose it until it
//! has been filled by [`CalibrationTable::load_default`].

use tracing::{debug, warn};

use crate::error::{Ob1Error, Result};
use crate::sdk::Ob1Sdk;

/// Number of coefficients in a calibration table.
pub const CALIBRATION_LEN: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CalibrationState {
    Unloaded,
    Loaded,
    Failed { reason: String },
}

/// Owned calibration coefficients.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    coefficients: Box<[f64]>,
    state: CalibrationState,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationTable {
    /// Zeroed, unloaded table of [`CALIBRATION_LEN`] coefficients.
    pub fn new() -> Self {
        Self {
            coefficients: vec![0.0; CALIBRATION_LEN].into_boxed_slice(),
            state: CalibrationState::Unloaded,
        }
    }

    /// Fill the table with the SDK's default calibration.
    ///
    /// On failure the table stays unusable and every later pressure
    /// conversion reports [`Ob1Error::CalibrationUnavailable`].
    pub fn load_default<S: Ob1Sdk + ?Sized>(&mut self, sdk: &mut S) -> Result<()> {
        match sdk.default_calibration(&mut self.coefficients) {
            Ok(()) => {
                self.state = CalibrationState::Loaded;
                debug!(len = self.coefficients.len(), "default calibration loaded");
                Ok(())
            }
            Err(status) => {
                let reason = format!("Elveflow_Calibration_Default returned {}", status);
                warn!(status = status.code(), "default calibration failed");
                self.coefficients.fill(0.0);
                self.state = CalibrationState::Failed {
                    reason: reason.clone(),
                };
                Err(Ob1Error::CalibrationUnavailable { reason })
            }
        }
    }

    /// Mark the table unusable without touching the SDK (open failed).
    pub(crate) fn mark_unavailable(&mut self, reason: impl Into<String>) {
        self.state = CalibrationState::Failed {
            reason: reason.into(),
        };
    }

    /// Whether pressure conversions may use this table.
    pub fn is_loaded(&self) -> bool {
        self.state == CalibrationState::Loaded
    }

    /// Coefficients, only once loaded.
    pub fn coefficients(&self) -> Result<&[f64]> {
        match &self.state {
            CalibrationState::Loaded => Ok(&self.coefficients),
            CalibrationState::Unloaded => Err(Ob1Error::CalibrationUnavailable {
                reason: "calibration not loaded".to_string(),
            }),
            CalibrationState::Failed { reason } => Err(Ob1Error::CalibrationUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Capacity of the table.
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// Whether the table has no capacity at all.
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// One coefficient, `None` when out of bounds or not loaded.
    pub fn get(&self, index: usize) -> Option<f64> {
        if self.is_loaded() {
            self.coefficients.get(index).copied()
        } else {
            None
        }
    }

    /// Short state description for status reports.
    pub fn describe(&self) -> String {
        match &self.state {
            CalibrationState::Unloaded => "not loaded".to_string(),
            CalibrationState::Loaded => format!("loaded ({} coefficients)", self.len()),
            CalibrationState::Failed { reason } => format!("unavailable: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{MockSdk, SdkOp};

    #[test]
    fn test_unloaded_table_is_gated() {
        let table = CalibrationTable::new();
        assert!(!table.is_loaded());
        assert_eq!(table.len(), CALIBRATION_LEN);
        assert!(matches!(
            table.coefficients(),
            Err(Ob1Error::CalibrationUnavailable { .. })
        ));
        assert_eq!(table.get(0), None);
    }

    #[test]
    fn test_load_default() {
        let mut sdk = MockSdk::new();
        let mut table = CalibrationTable::new();
        table.load_default(&mut sdk).unwrap();
        assert!(table.is_loaded());
        assert_eq!(table.coefficients().unwrap().len(), CALIBRATION_LEN);
        assert!(table.get(CALIBRATION_LEN - 1).is_some());
        assert_eq!(table.get(CALIBRATION_LEN), None);
    }

    #[test]
    fn test_load_failure_keeps_table_unusable() {
        let mut sdk = MockSdk::new().with_failure(SdkOp::DefaultCalibration, -12);
        let mut table = CalibrationTable::new();
        let err = table.load_default(&mut sdk).unwrap_err();
        assert!(matches!(err, Ob1Error::CalibrationUnavailable { .. }));
        assert!(!table.is_loaded());
        assert!(table.describe().contains("-12"));
    }
}
