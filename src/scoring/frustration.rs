//! Frustration estimation from memory content.
//!
//! When a caller does not supply an explicit frustration score, the content
//! is scanned for graded lexical markers across four severity bands and the
//! highest band matched wins. No markers means 0.0.

/// Band scores, highest severity first.
const EXTREME: f64 = 0.9;
const HIGH: f64 = 0.7;
const MEDIUM: f64 = 0.45;
const LOW: f64 = 0.25;

const EXTREME_MARKERS: &[&str] = &[
    "nightmare",
    "impossible",
    "hate",
    "worst",
    "terrible",
    "disaster",
    "furious",
    "hell",
];

const HIGH_MARKERS: &[&str] = &[
    "frustrated",
    "frustrating",
    "stuck",
    "blocked",
    "wasted",
    "painful",
    "struggling",
    "struggle",
    "headache",
    "annoying",
];

const MEDIUM_MARKERS: &[&str] = &[
    "confusing",
    "confused",
    "broken",
    "failed",
    "failure",
    "finally",
    "bug",
    "error",
    "workaround",
];

const LOW_MARKERS: &[&str] = &[
    "tricky",
    "weird",
    "strange",
    "unexpected",
    "gotcha",
    "issue",
];

/// Estimate a frustration score in `[0.0, 1.0]` from content.
///
/// Matching is case-insensitive on whole words, so "debug" does not trigger
/// the "bug" marker.
pub fn estimate(content: &str) -> f64 {
    let words: Vec<String> = content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let contains = |markers: &[&str]| -> bool {
        words.iter().any(|w| markers.contains(&w.as_str()))
    };

    if contains(EXTREME_MARKERS) {
        EXTREME
    } else if contains(HIGH_MARKERS) {
        HIGH
    } else if contains(MEDIUM_MARKERS) {
        MEDIUM
    } else if contains(LOW_MARKERS) {
        LOW
    } else {
        0.0
    }
}

/// Resolve the final frustration score: an explicit value wins (after range
/// validation by the caller), otherwise estimate from content.
pub fn resolve(explicit: Option<f64>, content: &str) -> f64 {
    match explicit {
        Some(v) => v,
        None => estimate(content),
    }
}
