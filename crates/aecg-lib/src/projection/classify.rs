//! Clinical labels (`PON`, `QON`, `RPEAK`, `TOFF`, ...) from HL7 wave-component codes.
//!
//! Vendors deviate from the nominal coding in several ways, so the label is
//! decided by an ordered rule table: the first rule whose predicate matches
//! decides the label. Reordering the table reclassifies real data.

use crate::annotation::{AnnotationRecord, BoundarySlot};
use crate::error::{AecgError, Result};

pub const WAVC_GENERIC: &str = "MDC_ECG_WAVC";
pub const WAVC_TYPE: &str = "MDC_ECG_WAVC_TYPE";
pub const WAVC_PEAK: &str = "MDC_ECG_WAVC_PEAK";
pub const WAVC_PWAVE: &str = "MDC_ECG_WAVC_PWAVE";
pub const WAVC_QRSWAVE: &str = "MDC_ECG_WAVC_QRSWAVE";
pub const WAVC_RWAVE: &str = "MDC_ECG_WAVC_RWAVE";
pub const WAVC_TWAVE: &str = "MDC_ECG_WAVC_TWAVE";
pub const WAVC_PRSEG: &str = "MDC_ECG_WAVC_PRSEG";
pub const WAVC_QRSTWAVE: &str = "MDC_ECG_WAVC_QRSTWAVE";
pub const WAVC_QWAVE: &str = "MDC_ECG_WAVC_QWAVE";
pub const WAVC_QSWAVE: &str = "MDC_ECG_WAVC_QSWAVE";
pub const WAVC_SWAVE: &str = "MDC_ECG_WAVC_SWAVE";
pub const WAVC_STJ: &str = "MDC_ECG_WAVC_STJ";

/// The three code fields that drive classification.
#[derive(Debug, Clone, Copy)]
pub struct WaveCodes<'a> {
    pub code_type: &'a str,
    pub wave_component: &'a str,
    pub wave_component_secondary: &'a str,
}

impl<'a> WaveCodes<'a> {
    pub fn of(record: &'a AnnotationRecord) -> Self {
        Self {
            code_type: &record.code_type,
            wave_component: &record.wave_component,
            wave_component_secondary: &record.wave_component_secondary,
        }
    }

    fn any(&self, code: &str) -> bool {
        self.code_type == code || self.wave_component == code || self.wave_component_secondary == code
    }

    fn component(&self, code: &str) -> bool {
        self.wave_component == code || self.wave_component_secondary == code
    }

    fn describe(&self) -> String {
        format!(
            "{}/{}/{}",
            self.code_type, self.wave_component, self.wave_component_secondary
        )
    }
}

/// One entry of the classification table.
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&WaveCodes<'_>) -> bool,
    /// Label for the slot, or `None` when the rule has no label for that slot.
    pub label: fn(&WaveCodes<'_>, BoundarySlot, &str) -> Option<String>,
}

fn wave(prefix: &str, suffix: &str) -> Option<String> {
    Some(format!("{}{}", prefix, suffix))
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "p-wave",
        applies: |c| c.any(WAVC_PWAVE),
        label: |_, _, suffix| wave("P", suffix),
    },
    Rule {
        name: "qrs-wave",
        applies: |c| c.any(WAVC_QRSWAVE),
        label: |_, slot, suffix| match slot {
            BoundarySlot::Value => wave("R", suffix),
            _ => wave("Q", suffix),
        },
    },
    Rule {
        name: "r-wave",
        applies: |c| c.any(WAVC_RWAVE),
        label: |_, _, suffix| wave("R", suffix),
    },
    Rule {
        name: "t-wave",
        applies: |c| c.any(WAVC_TWAVE),
        label: |_, _, suffix| wave("T", suffix),
    },
    Rule {
        name: "pr-segment",
        applies: |c| c.code_type == WAVC_TYPE && c.component(WAVC_PRSEG),
        label: |_, slot, suffix| match slot {
            BoundarySlot::Low => wave("P", suffix),
            BoundarySlot::High => Some("QON".to_string()),
            BoundarySlot::Value => None,
        },
    },
    Rule {
        name: "qrst-wave",
        applies: |c| c.code_type == WAVC_TYPE && c.component(WAVC_QRSTWAVE),
        label: |_, slot, suffix| match slot {
            BoundarySlot::Low => wave("Q", suffix),
            _ => wave("T", suffix),
        },
    },
    Rule {
        name: "qrst-wave-typed",
        applies: |c| {
            c.code_type == WAVC_QRSTWAVE
                && c.wave_component == WAVC_QRSTWAVE
                && c.wave_component_secondary.is_empty()
        },
        label: |_, slot, suffix| match slot {
            BoundarySlot::Low => wave("Q", suffix),
            BoundarySlot::High => wave("T", suffix),
            BoundarySlot::Value => None,
        },
    },
    Rule {
        name: "q-wave",
        applies: |c| c.code_type == WAVC_QWAVE && c.component(WAVC_QWAVE),
        label: |_, _, suffix| wave("Q", suffix),
    },
    Rule {
        name: "qs-wave",
        applies: |c| c.code_type == WAVC_TYPE && c.component(WAVC_QSWAVE),
        label: |_, _, suffix| wave("Q", suffix),
    },
    Rule {
        name: "s-wave-peak",
        applies: |c| c.code_type == WAVC_SWAVE && c.component(WAVC_PEAK),
        label: |_, _, suffix| wave("S", suffix),
    },
    Rule {
        name: "st-junction-peak",
        applies: |c| c.code_type == WAVC_STJ && c.component(WAVC_PEAK),
        label: |_, _, _| Some("QOFF".to_string()),
    },
    Rule {
        name: "component-name",
        applies: |_| true,
        label: |c, _, suffix| {
            [c.wave_component, c.wave_component_secondary, c.code_type]
                .into_iter()
                .find(|code| !code.is_empty() && *code != WAVC_TYPE && *code != WAVC_GENERIC)
                .and_then(|code| code.split('_').nth(3))
                .filter(|name| !name.is_empty())
                .and_then(|name| wave(name, suffix))
        },
    },
];

/// Suffix for a boundary: a PEAK secondary component overrides the slot.
pub fn suffix_for(codes: &WaveCodes, slot: BoundarySlot) -> &'static str {
    if codes.wave_component_secondary == WAVC_PEAK {
        "PEAK"
    } else {
        slot.suffix()
    }
}

/// Classify a boundary of `record` read from `slot`.
pub fn classify(record: &AnnotationRecord, slot: BoundarySlot) -> Result<String> {
    classify_codes(&WaveCodes::of(record), slot)
}

pub fn classify_codes(codes: &WaveCodes, slot: BoundarySlot) -> Result<String> {
    let suffix = suffix_for(codes, slot);
    let rule = RULES
        .iter()
        .find(|rule| (rule.applies)(codes))
        .ok_or_else(|| ambiguous(codes, slot, "no rule matched".to_string()))?;
    (rule.label)(codes, slot, suffix)
        .ok_or_else(|| ambiguous(codes, slot, format!("rule '{}' has no label for this slot", rule.name)))
}

fn ambiguous(codes: &WaveCodes, slot: BoundarySlot, reason: String) -> AecgError {
    AecgError::AmbiguousClassification {
        codes: codes.describe(),
        slot: slot.as_str(),
        reason,
    }
}
