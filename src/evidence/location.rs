use serde::{Deserialize, Serialize};

/// A location fix handed over by the capture collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub lat: f64,
    pub lon: f64,
    pub accuracy_meters: Option<f64>,
    /// Age of the fix at capture time
    pub age_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationState {
    Fresh,
    Stale,
    None,
}

impl LocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationState::Fresh => "Fresh",
            LocationState::Stale => "Stale",
            LocationState::None => "None",
        }
    }
}

/// Freshness thresholds for a location fix
///
/// Ages up to `fresh_max_age_secs` are fresh, ages above `stale_after_secs` are stale,
/// and anything in between takes `gap_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationPolicy {
    pub fresh_max_age_secs: u64,
    pub stale_after_secs: u64,
    pub gap_state: LocationState,
}

impl Default for LocationPolicy {
    fn default() -> Self {
        Self {
            fresh_max_age_secs: 10,
            stale_after_secs: 120,
            gap_state: LocationState::Fresh,
        }
    }
}

impl LocationPolicy {
    pub fn classify(&self, fix: Option<&LocationFix>) -> LocationState {
        match fix {
            None => LocationState::None,
            Some(fix) if fix.age_seconds <= self.fresh_max_age_secs => LocationState::Fresh,
            Some(fix) if fix.age_seconds > self.stale_after_secs => LocationState::Stale,
            Some(_) => self.gap_state,
        }
    }
}
