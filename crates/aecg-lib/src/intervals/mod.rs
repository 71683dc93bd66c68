pub mod engine;
pub mod summary;

use crate::annotation::{AnnotationRecord, WaveformDescriptor};
use crate::config::DerivationConfig;
use crate::leads::{display_name, GLOBAL_LEAD};
use crate::projection::{project_annotations, LeadFailure, ProjectedAnnotation, SkippedBoundary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use engine::derive_intervals;
pub use summary::{aggregate, IntervalSummary, StatType, SummaryTable};

/// Interval parameters derived per cardiac cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamCode {
    #[serde(rename = "RR")]
    Rr,
    #[serde(rename = "PR")]
    Pr,
    #[serde(rename = "QRS")]
    Qrs,
    #[serde(rename = "QT")]
    Qt,
    /// RR interval in effect when the beat's T wave closed.
    #[serde(rename = "QTRR")]
    QtRr,
    /// QT corrected with Fridericia's cube-root formula.
    #[serde(rename = "QTCF")]
    QtcF,
}

impl ParamCode {
    pub const ALL: [ParamCode; 6] = [
        ParamCode::Rr,
        ParamCode::Pr,
        ParamCode::Qrs,
        ParamCode::Qt,
        ParamCode::QtRr,
        ParamCode::QtcF,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamCode::Rr => "RR",
            ParamCode::Pr => "PR",
            ParamCode::Qrs => "QRS",
            ParamCode::Qt => "QT",
            ParamCode::QtRr => "QTRR",
            ParamCode::QtcF => "QTCF",
        }
    }
}

/// A lead as it appears in interval output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeadKey {
    pub lead_display_name: String,
    pub hl7_lead_name: String,
}

impl LeadKey {
    pub fn from_hl7(hl7_lead_name: &str) -> Self {
        Self {
            lead_display_name: display_name(hl7_lead_name),
            hl7_lead_name: hl7_lead_name.to_string(),
        }
    }

    pub fn global() -> Self {
        Self {
            lead_display_name: GLOBAL_LEAD.to_string(),
            hl7_lead_name: String::new(),
        }
    }

    pub fn of(ann: &ProjectedAnnotation) -> Self {
        Self {
            lead_display_name: ann.lead_display_name.clone(),
            hl7_lead_name: ann.hl7_lead_name.clone(),
        }
    }
}

/// One interval measurement, stamped with the boundary that closed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedInterval {
    pub lead_display_name: String,
    pub hl7_lead_name: String,
    pub time_ms: f64,
    pub param: ParamCode,
    pub value: f64,
}

impl DerivedInterval {
    pub fn lead_key(&self) -> LeadKey {
        LeadKey {
            lead_display_name: self.lead_display_name.clone(),
            hl7_lead_name: self.hl7_lead_name.clone(),
        }
    }
}

/// Derived intervals plus every lead the summary must report on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalTable {
    pub leads: BTreeSet<LeadKey>,
    pub intervals: Vec<DerivedInterval>,
}

impl IntervalTable {
    pub fn values(&self, lead_display_name: &str, param: ParamCode) -> Vec<f64> {
        self.intervals
            .iter()
            .filter(|i| i.lead_display_name == lead_display_name && i.param == param)
            .map(|i| i.value)
            .collect()
    }
}

/// Everything derived from one waveform's annotation set.
#[derive(Debug, Clone, Serialize)]
pub struct WaveformIntervals {
    /// Boundaries that made it onto the time axis.
    pub projected: usize,
    pub summary: SummaryTable,
    pub skipped: Vec<SkippedBoundary>,
    pub failed_leads: Vec<LeadFailure>,
}

/// Project, derive and aggregate the annotations of one waveform.
///
/// Every annotated lead that did not fail appears in the summary, with
/// `COUNT = 0` for parameters it has no intervals for. An annotation set with
/// no usable leads reports zero counts for the global pseudo-lead.
pub fn derive_waveform_intervals(
    waveform: &WaveformDescriptor,
    records: &[AnnotationRecord],
    cfg: &DerivationConfig,
    keep_raw: bool,
) -> WaveformIntervals {
    let projection = project_annotations(waveform, records);
    let failed: BTreeSet<&str> = projection
        .failed_leads
        .iter()
        .map(|f| f.hl7_lead_name.as_str())
        .collect();
    let expected: Vec<LeadKey> = records
        .iter()
        .filter(|r| r.has_wave_component() && !failed.contains(r.lead.as_str()))
        .map(|r| LeadKey::from_hl7(&r.lead))
        .collect();

    let projected = projection.annotations.len();
    let mut table = derive_intervals(projection.annotations, cfg);
    table.leads.extend(expected);
    if table.leads.is_empty() && projection.failed_leads.is_empty() {
        table.leads.insert(LeadKey::global());
    }

    WaveformIntervals {
        projected,
        summary: aggregate(&table, keep_raw),
        skipped: projection.skipped,
        failed_leads: projection.failed_leads,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Boundary, TimeCode};

    fn qrs_record(lead: &str, group_id: i64, on_ms: &str, off_ms: &str) -> AnnotationRecord {
        AnnotationRecord {
            group_id,
            beat_number: group_id,
            lead: lead.into(),
            code_type: "MDC_ECG_WAVC_TYPE".into(),
            wave_component: "MDC_ECG_WAVC_QRSWAVE".into(),
            time_code: TimeCode::Relative,
            low: Boundary::new(on_ms, "ms"),
            high: Boundary::new(off_ms, "ms"),
            ..Default::default()
        }
    }

    #[test]
    fn waveform_pipeline_reports_every_annotated_lead() {
        let waveform = WaveformDescriptor::new("20021122091000");
        let records = vec![
            qrs_record("MDC_ECG_LEAD_II", 1, "140", "230"),
            qrs_record("MDC_ECG_LEAD_V2", 2, "150", ""),
        ];
        let result = derive_waveform_intervals(&waveform, &records, &DerivationConfig::default(), false);
        assert_eq!(result.projected, 3);
        let qrs_ii = result.summary.get("II", ParamCode::Qrs, StatType::Average).unwrap();
        assert_eq!(qrs_ii.value, Some(90.0));
        let qrs_v2 = result.summary.get("V2", ParamCode::Qrs, StatType::Count).unwrap();
        assert_eq!(qrs_v2.value, Some(0.0));
        // 2 leads x 6 parameters x (COUNT, AVERAGE)
        assert_eq!(result.summary.rows.len(), 24);
    }

    #[test]
    fn empty_annotation_set_reports_zero_counts() {
        let waveform = WaveformDescriptor::new("20021122091000");
        let result = derive_waveform_intervals(&waveform, &[], &DerivationConfig::default(), true);
        assert_eq!(result.projected, 0);
        for param in ParamCode::ALL {
            let count = result.summary.get(GLOBAL_LEAD, param, StatType::Count).unwrap();
            assert_eq!(count.value, Some(0.0));
            let avg = result.summary.get(GLOBAL_LEAD, param, StatType::Average).unwrap();
            assert_eq!(avg.value, None);
        }
    }

    #[test]
    fn failed_lead_is_reported_not_summarized() {
        let waveform = WaveformDescriptor::new("20021122091000");
        let mut bad = qrs_record("MDC_ECG_LEAD_V1", 1, "140", "230");
        bad.low.unit = "ticks".into();
        let records = vec![bad, qrs_record("MDC_ECG_LEAD_I", 1, "140", "230")];
        let result = derive_waveform_intervals(&waveform, &records, &DerivationConfig::default(), false);
        assert_eq!(result.failed_leads.len(), 1);
        assert!(result.summary.get("V1", ParamCode::Qrs, StatType::Count).is_none());
        assert!(result.summary.get("I", ParamCode::Qrs, StatType::Count).is_some());
    }
}
