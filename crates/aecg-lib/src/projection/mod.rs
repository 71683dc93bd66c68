pub mod classify;

use crate::annotation::{AnnotationRecord, Boundary, BoundarySlot, TimeCode, WaveformDescriptor};
use crate::error::{AecgError, Result};
use crate::leads::display_name;
use crate::units::{hl7_offset_ms, parse_hl7_datetime, to_milliseconds};
use classify::{classify, WAVC_TYPE};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A classified boundary positioned on the waveform's millisecond time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedAnnotation {
    pub group_id: i64,
    pub beat_number: i64,
    pub lead_display_name: String,
    pub hl7_lead_name: String,
    /// Clinical label such as `RPEAK`, `QON` or `TOFF`.
    pub ann_type: String,
    /// The HL7 code the label was derived from.
    pub source_code: String,
    pub slot: BoundarySlot,
    pub time_ms: f64,
}

/// A boundary that was dropped without failing its lead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBoundary {
    pub group_id: i64,
    pub hl7_lead_name: String,
    pub slot: BoundarySlot,
    pub reason: String,
}

/// A lead whose annotations could not be projected at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadFailure {
    pub lead_display_name: String,
    pub hl7_lead_name: String,
    pub error: String,
}

/// Output of [`project_annotations`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Projection {
    pub annotations: Vec<ProjectedAnnotation>,
    pub skipped: Vec<SkippedBoundary>,
    pub failed_leads: Vec<LeadFailure>,
}

/// Classify every boundary of `records` and place it on the waveform time axis.
///
/// ABSOLUTE boundaries are measured from the lead's (or waveform's) start time.
/// When such a value is not an HL7 datetime it is retried as a RELATIVE number
/// with its declared unit, and dropped if that fails too. An unknown unit on a
/// RELATIVE boundary fails the whole lead; the other leads are unaffected.
pub fn project_annotations(
    waveform: &WaveformDescriptor,
    records: &[AnnotationRecord],
) -> Projection {
    let mut projection = Projection::default();
    let mut failed: BTreeSet<String> = BTreeSet::new();

    for record in records.iter().filter(|r| r.has_wave_component()) {
        if failed.contains(&record.lead) {
            continue;
        }
        let lead_display_name = display_name(&record.lead);
        for slot in BoundarySlot::ALL {
            let boundary = record.boundary(slot);
            if boundary.is_empty() {
                continue;
            }
            let ann_type = match classify(record, slot) {
                Ok(label) => label,
                Err(err) => {
                    warn!("dropping {} boundary of group {}: {}", slot.as_str(), record.group_id, err);
                    projection.skipped.push(skipped(record, slot, &err));
                    continue;
                }
            };
            let time_ms = match boundary_time(waveform, record, boundary) {
                Ok(time_ms) => time_ms,
                Err(err @ AecgError::UnknownUnit { .. }) if record.time_code == TimeCode::Relative => {
                    warn!("lead '{}' failed: {}", lead_display_name, err);
                    failed.insert(record.lead.clone());
                    projection.failed_leads.push(LeadFailure {
                        lead_display_name: lead_display_name.clone(),
                        hl7_lead_name: record.lead.clone(),
                        error: err.to_string(),
                    });
                    break;
                }
                Err(err) => {
                    warn!("dropping {} boundary of group {}: {}", slot.as_str(), record.group_id, err);
                    projection.skipped.push(skipped(record, slot, &err));
                    continue;
                }
            };
            projection.annotations.push(ProjectedAnnotation {
                group_id: record.group_id,
                beat_number: record.beat_number,
                lead_display_name: lead_display_name.clone(),
                hl7_lead_name: record.lead.clone(),
                ann_type,
                source_code: source_code(record).to_string(),
                slot,
                time_ms,
            });
        }
    }

    projection
        .annotations
        .retain(|ann| !failed.contains(&ann.hl7_lead_name));
    debug!(
        "projected {} boundaries ({} skipped, {} failed leads)",
        projection.annotations.len(),
        projection.skipped.len(),
        projection.failed_leads.len()
    );
    projection
}

fn source_code(record: &AnnotationRecord) -> &str {
    if record.wave_component != WAVC_TYPE {
        &record.wave_component
    } else {
        &record.code_type
    }
}

fn skipped(record: &AnnotationRecord, slot: BoundarySlot, err: &AecgError) -> SkippedBoundary {
    SkippedBoundary {
        group_id: record.group_id,
        hl7_lead_name: record.lead.clone(),
        slot,
        reason: err.to_string(),
    }
}

fn boundary_time(
    waveform: &WaveformDescriptor,
    record: &AnnotationRecord,
    boundary: &Boundary,
) -> Result<f64> {
    match record.time_code {
        TimeCode::Relative => relative_time(boundary),
        TimeCode::Absolute => {
            let absolute = parse_hl7_datetime(waveform.start_time_for(&record.lead))
                .and_then(|start| hl7_offset_ms(&boundary.value, &start));
            match absolute {
                Ok(time_ms) => Ok(time_ms),
                Err(err) => {
                    debug!("'{}' is not an absolute time, retrying as relative", boundary.value);
                    relative_time(boundary).map_err(|_| err)
                }
            }
        }
    }
}

fn relative_time(boundary: &Boundary) -> Result<f64> {
    let value = boundary
        .value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AecgError::InvalidNumber(boundary.value.clone()))?;
    to_milliseconds(value, &boundary.unit)
}
