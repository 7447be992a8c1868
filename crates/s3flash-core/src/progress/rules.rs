//! Line classification.
//!
//! The flashing tool prints free-form text. Each line is matched against a
//! fixed table of known phrases; the first matching rule decides the kind.
//! Lines no rule recognises are `Unclassified` and only get logged.

use std::sync::LazyLock;

use regex::Regex;

static RE_WRITE_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Writing at 0x([[:xdigit:]]+)").unwrap());

// Matches both "(42 %)" and "42.5%".
static RE_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").unwrap());

/// What a single output line means.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Connecting,
    ChipDetected { detail: String },
    StubReady,
    Write {
        address: Option<u32>,
        percent: Option<f64>,
    },
    HashVerified,
    Reset,
    ErrorMarker,
    Unclassified,
}

#[derive(Debug, Clone, Copy)]
enum RuleKind {
    Chip,
    Stub,
    Write,
    Verified,
    Reset,
    Connecting,
    Error,
}

struct Rule {
    kind: RuleKind,
    needles: &'static [&'static str],
}

/// Ordered rule table. Earlier rules win.
static RULES: &[Rule] = &[
    Rule {
        kind: RuleKind::Chip,
        needles: &["Chip is ", "Chip type:", "Detecting chip type"],
    },
    Rule {
        kind: RuleKind::Stub,
        needles: &["Uploading stub", "Stub running", "Stub flasher running"],
    },
    Rule {
        kind: RuleKind::Write,
        needles: &["Writing at 0x"],
    },
    Rule {
        kind: RuleKind::Verified,
        needles: &["Hash of data verified"],
    },
    Rule {
        kind: RuleKind::Reset,
        needles: &["Hard resetting", "Soft resetting"],
    },
    Rule {
        kind: RuleKind::Connecting,
        needles: &["Connecting"],
    },
    Rule {
        kind: RuleKind::Error,
        needles: &["Error", "Failed", "error:", "A fatal error occurred"],
    },
];

impl Rule {
    fn find(&self, line: &str) -> Option<&'static str> {
        self.needles.iter().copied().find(|n| line.contains(n))
    }

    fn extract(&self, needle: &str, line: &str) -> LineKind {
        match self.kind {
            RuleKind::Chip => {
                let detail = line
                    .split_once(needle)
                    .map(|(_, rest)| rest.trim_start_matches('.').trim())
                    .unwrap_or_default();
                LineKind::ChipDetected {
                    detail: detail.to_string(),
                }
            }
            RuleKind::Stub => LineKind::StubReady,
            RuleKind::Write => LineKind::Write {
                address: parse_write_address(line),
                percent: parse_percent(line),
            },
            RuleKind::Verified => LineKind::HashVerified,
            RuleKind::Reset => LineKind::Reset,
            RuleKind::Connecting => LineKind::Connecting,
            RuleKind::Error => LineKind::ErrorMarker,
        }
    }
}

/// Classify one output line.
pub fn classify(line: &str) -> LineKind {
    RULES
        .iter()
        .find_map(|rule| rule.find(line).map(|needle| rule.extract(needle, line)))
        .unwrap_or(LineKind::Unclassified)
}

fn parse_write_address(line: &str) -> Option<u32> {
    let caps = RE_WRITE_ADDR.captures(line)?;
    u32::from_str_radix(caps.get(1)?.as_str(), 16).ok()
}

fn parse_percent(line: &str) -> Option<f64> {
    let caps = RE_PERCENT.captures(line)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}
