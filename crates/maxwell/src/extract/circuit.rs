use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ResponseExtractor;

const SUMMARY_MAX_CHARS: usize = 200;
const SUMMARY_FALLBACK: &str = "Circuit analyzed successfully";

// Label synonyms, then `[:\s]+`, then number, optional SI prefix, unit.
static RESISTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:Req|equivalent resistance|total resistance)[:\s]+([0-9.]+\s*[kKmMG]?(?:[Ω\u{2126}]|ohms?))\b",
    )
    .expect("valid regex")
});
static VOLTAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:voltage|V)[:\s]+([0-9.]+\s*[kKmM]?V)\b").expect("valid regex")
});
static CURRENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:current|I)[:\s]+([0-9.]+\s*[kKmMµμu]?A)\b").expect("valid regex")
});
static IMPEDANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:impedance|Z)[:\s]+([0-9.]+\s*[kKmMG]?(?:[Ω\u{2126}]|ohms?))\b")
        .expect("valid regex")
});
static POWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:power|Pavg|P)[:\s]+([0-9.]+\s*[kKmM]?W)\b").expect("valid regex")
});
static FREQUENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:frequency|f)[:\s]+([0-9.]+\s*[kKmMG]?Hz)\b").expect("valid regex")
});

/// The six scalar quantities the analyzer looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Resistance,
    Voltage,
    Current,
    Impedance,
    Power,
    Frequency,
}

impl Quantity {
    pub const ALL: [Quantity; 6] = [
        Quantity::Voltage,
        Quantity::Current,
        Quantity::Resistance,
        Quantity::Impedance,
        Quantity::Power,
        Quantity::Frequency,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quantity::Resistance => "Equivalent Resistance",
            Quantity::Voltage => "Voltage",
            Quantity::Current => "Current",
            Quantity::Impedance => "Impedance",
            Quantity::Power => "Power",
            Quantity::Frequency => "Frequency",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Quantity::Resistance => &RESISTANCE_RE,
            Quantity::Voltage => &VOLTAGE_RE,
            Quantity::Current => &CURRENT_RE,
            Quantity::Impedance => &IMPEDANCE_RE,
            Quantity::Power => &POWER_RE,
            Quantity::Frequency => &FREQUENCY_RE,
        }
    }

    /// First match in `text`, value and unit as written (e.g. `"0.5 A"`).
    pub fn find_in(self, text: &str) -> Option<String> {
        self.pattern()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scalar values found in an analysis. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitFields {
    pub resistance: Option<String>,
    pub voltage: Option<String>,
    pub current: Option<String>,
    pub impedance: Option<String>,
    pub power: Option<String>,
    pub frequency: Option<String>,
}

impl CircuitFields {
    pub fn get(&self, quantity: Quantity) -> Option<&str> {
        let field = match quantity {
            Quantity::Resistance => &self.resistance,
            Quantity::Voltage => &self.voltage,
            Quantity::Current => &self.current,
            Quantity::Impedance => &self.impedance,
            Quantity::Power => &self.power,
            Quantity::Frequency => &self.frequency,
        };
        field.as_deref()
    }

    /// Present fields in display order.
    pub fn present(&self) -> Vec<(Quantity, &str)> {
        Quantity::ALL
            .iter()
            .filter_map(|&q| self.get(q).map(|v| (q, v)))
            .collect()
    }

    /// Impedance and frequency only show up in AC analyses.
    pub fn is_ac(&self) -> bool {
        self.impedance.is_some() || self.frequency.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }
}

/// One completed image analysis. Replaced wholesale by the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub full_text: String,
    pub fields: CircuitFields,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitExtractor;

impl ResponseExtractor for CircuitExtractor {
    type Output = AnalysisResult;

    fn extract(&self, text: &str) -> AnalysisResult {
        AnalysisResult {
            summary: summarize(text),
            full_text: text.to_string(),
            fields: extract_fields(text),
        }
    }
}

pub fn extract_fields(text: &str) -> CircuitFields {
    CircuitFields {
        resistance: Quantity::Resistance.find_in(text),
        voltage: Quantity::Voltage.find_in(text),
        current: Quantity::Current.find_in(text),
        impedance: Quantity::Impedance.find_in(text),
        power: Quantity::Power.find_in(text),
        frequency: Quantity::Frequency.find_in(text),
    }
}

/// First two lines joined by a space, cut to 200 characters.
pub fn summarize(text: &str) -> String {
    let joined = text.split('\n').take(2).collect::<Vec<_>>().join(" ");
    let summary: String = joined.chars().take(SUMMARY_MAX_CHARS).collect();
    if summary.trim().is_empty() {
        SUMMARY_FALLBACK.to_string()
    } else {
        summary
    }
}
