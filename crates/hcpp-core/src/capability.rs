//! Health Connect data types ("capabilities") an app can request.
//!
//! Requested capabilities are read off OCR'd permission dialogs, so the raw
//! strings are noisy. Only names on [`RECOGNIZED_CAPABILITIES`] survive.

use std::collections::HashSet;

/// Capability names recognised on the permission screen.
///
/// Includes one OCR misreading (`Total calores buurmred`) that appears
/// verbatim in the study's screenshots.
pub const RECOGNIZED_CAPABILITIES: &[&str] = &[
    "Distance",
    "Exercise",
    "Blood pressure",
    "Body fat",
    "Heart rate",
    "Weight",
    "Active calories burned",
    "Total calories burned",
    "Resting heart rate",
    "Steps",
    "Floors climbed",
    "Sleep",
    "Heart rate variability",
    "Basal body temperature",
    "Oxygen saturation",
    "Total calores buurmred",
    "Nutrition",
    "Blood glucose",
    "Body temperature",
    "Elevation gained",
    "Hydration",
    "Bone mass",
    "Menstruation",
    "Respiratory rate",
    "Basal metabolic rate",
    "Lean body mass",
    "Body water mass",
    "Height",
    "Power",
    "Speed",
    "VO2 max",
    "Exercise route",
    "Spotting",
    "Sexual activity",
    "Ovulation test",
    "Cervical mucus",
];

const SECTION_START: &[&str] = &["Allowed to read", "Allowed to write"];
const SECTION_END: &str = "Manage app";
/// Substrings that mark a line as dialog chrome or OCR noise.
const NOISE: &[&str] = &["access", "ennee"];

pub fn is_recognized(name: &str) -> bool {
    RECOGNIZED_CAPABILITIES.contains(&name)
}

/// Deduplicate and whitelist raw capability names, keeping first-seen order.
///
/// Unrecognised strings are dropped silently.
pub fn filter_capabilities<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|name| is_recognized(name))
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Extract requested capabilities from the OCR text of a permission dialog.
///
/// Lines are collected between an "Allowed to read"/"Allowed to write"
/// heading and the "Manage app" footer. Candidate lines must be longer than
/// three characters once trimmed, must not start with a digit, and must not
/// contain dialog noise. Survivors are passed through [`filter_capabilities`].
pub fn extract_requested(ocr_text: &str) -> Vec<String> {
    let mut in_section = false;
    let mut candidates = Vec::new();

    for line in ocr_text.lines() {
        if SECTION_START.iter().any(|m| line.contains(m)) {
            in_section = true;
        } else if line.contains(SECTION_END) {
            in_section = false;
        }

        let trimmed = line.trim();
        if in_section
            && trimmed.len() > 3
            && !line.starts_with(|c: char| c.is_ascii_digit())
            && !NOISE.iter().any(|n| line.contains(n))
        {
            candidates.push(trimmed);
        }
    }

    filter_capabilities(candidates)
}
