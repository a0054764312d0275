pub mod alert;
pub mod analyzer;
pub mod hysteresis;
pub mod rules;
pub mod scale;

pub use alert::{Alert, AlertSet};
pub use analyzer::{GestureAnalyzer, Thresholds, TrackResult, TrackState};
pub use hysteresis::HysteresisCounter;
pub use rules::{evaluate, GestureSignals, Side, TorsoRegion};
pub use scale::shoulder_width;
