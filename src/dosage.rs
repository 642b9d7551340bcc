//! Dosage display normalization.
//!
//! Dosages are free text and may already carry a unit ("5ml", "1片"). Every
//! place that shows dosage and unit together (reminder bodies, list rows,
//! pillbox slot badges) goes through [`format_dosage`] so the unit is never
//! printed twice.

use std::sync::LazyLock;

use regex::Regex;

static DOSAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(\.\d+)?)\s*(.*)$").expect("dosage pattern is valid")
});

/// Join a dosage string and a unit.
///
/// A unit embedded in the dosage wins over the supplied one.
pub fn format_dosage(dosage: &str, unit: &str) -> String {
    let dosage = dosage.trim();
    let unit = unit.trim();

    match DOSAGE_PATTERN.captures(dosage) {
        Some(caps) => {
            let amount = caps.get(1).map_or("", |m| m.as_str());
            let remainder = caps.get(3).map_or("", |m| m.as_str()).trim();
            if remainder.is_empty() {
                format!("{amount}{unit}")
            } else {
                format!("{amount}{remainder}")
            }
        }
        None => format!("{dosage}{unit}"),
    }
}
