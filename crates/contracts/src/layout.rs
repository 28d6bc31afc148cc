//! Stitched container layout
//!
//! Fixed paths that downstream catalogs rely on. Changing any of these breaks
//! readers of existing files.

/// Root group
pub const ENTRY: &str = "/entry";

/// Detector payload sub-tree (referenced, not owned)
pub const DETECTOR_GROUP: &str = "/entry/detector";

/// Aggregate-sum sub-tree
pub const SUM_GROUP: &str = "/entry/sum";

/// Per-frame attribute sub-tree
pub const ATTRIBUTES_GROUP: &str = "/entry/NDAttributes";

/// CompletionIndex, one unique id per scan point
pub const UNIQUE_ID_PATH: &str = "/entry/NDAttributes/NDArrayUniqueId";

/// AggregateSum, one cross-module sum per scan point
pub const SUM_PATH: &str = "/entry/sum/sum";

/// Primary payload
pub const DATA_PATH: &str = "/entry/detector/detector";

/// Groups every skeleton must contain
pub const REQUIRED_GROUPS: [&str; 3] = [DETECTOR_GROUP, SUM_GROUP, ATTRIBUTES_GROUP];

/// Bases under which per-axis setpoint links are installed
pub const SETPOINT_BASES: [&str; 2] = [DETECTOR_GROUP, SUM_GROUP];

/// Links always forwarded to the first module's raw file
pub const DEFAULT_LINKS: [&str; 4] = [
    "/entry/detector/axes",
    "/entry/detector/signal",
    "/entry/sum/axes",
    "/entry/sum/signal",
];

/// Setpoint array path for an axis under `base`
pub fn setpoint_path(base: &str, axis: &str) -> String {
    format!("{base}/{axis}_set")
}

/// Setpoint index path for an axis under `base`
pub fn setpoint_indices_path(base: &str, axis: &str) -> String {
    format!("{base}/{axis}_set_indices")
}

/// Expand a `{}` placeholder template
///
/// Only the first `{}` is substituted.
pub fn expand_template(template: &str, value: &str) -> String {
    template.replacen("{}", value, 1)
}
