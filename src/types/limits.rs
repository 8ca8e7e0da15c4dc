//! Specification limits shared by capability analysis and forecast risk checks

use serde::{Deserialize, Serialize};

/// Lower/upper specification limits for one parameter. Either side may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecLimits {
    #[serde(default)]
    pub lsl: Option<f64>,
    #[serde(default)]
    pub usl: Option<f64>,
}

impl SpecLimits {
    pub fn new(lsl: Option<f64>, usl: Option<f64>) -> Self {
        Self { lsl, usl }
    }

    pub fn two_sided(lsl: f64, usl: f64) -> Self {
        Self::new(Some(lsl), Some(usl))
    }

    pub fn is_empty(&self) -> bool {
        self.lsl.is_none() && self.usl.is_none()
    }

    pub fn below_lower(&self, value: f64) -> bool {
        self.lsl.is_some_and(|l| value < l)
    }

    pub fn above_upper(&self, value: f64) -> bool {
        self.usl.is_some_and(|u| value > u)
    }
}
