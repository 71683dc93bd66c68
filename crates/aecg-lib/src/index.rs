//! Flattening of one aECG document into study index rows.
//!
//! Each waveform contributes its interval summary, a row per failed lead and
//! two waveform-level rows (`MISSINGSAMPLES` and `NUMANNOTATEDLEADS`). Every
//! row repeats the document's study, subject and device columns so the
//! index can be filtered without joins.

use crate::config::IndexConfig;
use crate::error::Result;
use crate::intervals::{derive_waveform_intervals, WaveformIntervals};
use crate::units::parse_hl7_datetime;
use crate::waveform::Waveform;
use chrono::Datelike;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const NO_WAVEFORMS: &str = "No waveforms found";
pub const INTERVAL_ERROR: &str = "Error extracting intervals from annotations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WaveformKind {
    Rhythm,
    Derived,
}

/// HL7 effective time as a (low, center, high) triple of timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeInterval {
    pub low: String,
    pub center: String,
    pub high: String,
}

impl TimeInterval {
    pub fn first_present(&self) -> Option<&str> {
        [&self.low, &self.center, &self.high]
            .into_iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timepoint {
    pub code: String,
    pub display_name: String,
}

/// Study, subject and device fields extracted from the aECG header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AecgMetadata {
    pub study_id: String,
    pub subject_id: String,
    pub uuid: String,
    /// Collection time of the whole ECG.
    pub egdtc: TimeInterval,
    pub rhythm_egdtc: TimeInterval,
    pub derived_egdtc: TimeInterval,
    pub birth_time: String,
    pub sex: String,
    pub device_manufacturer: String,
    pub device_model: String,
    pub device_software: String,
    pub absolute_timepoint: Timepoint,
    pub relative_timepoint: Timepoint,
    pub protocol_timepoint: Timepoint,
}

impl AecgMetadata {
    /// First non-empty timepoint label, absolute before relative before protocol.
    pub fn timepoint_reference(&self) -> String {
        [
            &self.absolute_timepoint,
            &self.relative_timepoint,
            &self.protocol_timepoint,
        ]
        .into_iter()
        .flat_map(|tp| [&tp.display_name, &tp.code])
        .find(|label| !label.is_empty())
        .cloned()
        .unwrap_or_default()
    }

    /// Completed years between birth and ECG collection.
    pub fn subject_age_years(&self) -> Option<i32> {
        let collected = self.egdtc.first_present()?;
        if self.birth_time.trim().is_empty() {
            return None;
        }
        let (born, collected) = match (
            parse_hl7_datetime(&self.birth_time),
            parse_hl7_datetime(collected),
        ) {
            (Ok(born), Ok(collected)) => (born, collected),
            (Err(err), _) | (_, Err(err)) => {
                debug!("cannot estimate subject age: {}", err);
                return None;
            }
        };
        let mut age = collected.year() - born.year();
        if (collected.month(), collected.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        Some(age)
    }

    fn egdtc_of(&self, kind: WaveformKind) -> &TimeInterval {
        match kind {
            WaveformKind::Rhythm => &self.rhythm_egdtc,
            WaveformKind::Derived => &self.derived_egdtc,
        }
    }
}

/// One parsed aECG file, ready to be indexed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AecgDocument {
    /// Path of the aECG file.
    #[serde(default)]
    pub source: String,
    /// Archive the file was read from, if any.
    #[serde(default)]
    pub zip_container: String,
    #[serde(default)]
    pub metadata: AecgMetadata,
    #[serde(default)]
    pub rhythm: Option<Waveform>,
    #[serde(default)]
    pub derived: Option<Waveform>,
}

/// One row of the study index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "AECGXML")]
    pub source: String,
    #[serde(rename = "ZIPFILE")]
    pub zip_container: String,
    #[serde(rename = "EGSTUDYID")]
    pub study_id: String,
    #[serde(rename = "USUBJID")]
    pub subject_id: String,
    #[serde(rename = "EGREFID")]
    pub ref_id: String,
    #[serde(rename = "EGDTC")]
    pub egdtc: String,
    #[serde(rename = "EGDTC_stop")]
    pub egdtc_stop: String,
    #[serde(rename = "EGTPTREF")]
    pub timepoint: String,
    #[serde(rename = "AGE")]
    pub age_years: Option<i32>,
    #[serde(rename = "SEX")]
    pub sex: String,
    #[serde(rename = "DEVMANUFACTURER")]
    pub device_manufacturer: String,
    #[serde(rename = "DEVMODEL")]
    pub device_model: String,
    #[serde(rename = "DEVSOFTWARE")]
    pub device_software: String,
    #[serde(rename = "WFTYPE")]
    pub waveform: Option<WaveformKind>,
    #[serde(rename = "EGERROR")]
    pub document_error: String,
    /// The waveform carries annotations.
    #[serde(rename = "EGANNSFL", with = "yes_no")]
    pub annotated: bool,
    /// At least one annotation was projected onto the time axis.
    #[serde(rename = "EGINTSFL", with = "yes_no")]
    pub intervals_found: bool,
    #[serde(rename = "PARAMCD")]
    pub param: String,
    #[serde(rename = "DTYPE")]
    pub dtype: String,
    #[serde(rename = "AVAL")]
    pub value: Option<f64>,
    #[serde(rename = "LEADNAM")]
    pub lead_display_name: String,
    #[serde(rename = "HL7LEADNAM")]
    pub hl7_lead_name: String,
    #[serde(rename = "TIME")]
    pub time_ms: Option<f64>,
    #[serde(rename = "ERROR")]
    pub error: String,
}

mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *flag { "Y" } else { "N" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(String::deserialize(d)? == "Y")
    }
}

impl IndexRecord {
    /// Columns shared by every row of `doc`.
    pub fn header(doc: &AecgDocument) -> Self {
        let meta = &doc.metadata;
        Self {
            source: doc.source.clone(),
            zip_container: doc.zip_container.clone(),
            study_id: meta.study_id.clone(),
            subject_id: meta.subject_id.clone(),
            ref_id: meta.uuid.clone(),
            egdtc: meta.rhythm_egdtc.low.clone(),
            egdtc_stop: meta.rhythm_egdtc.high.clone(),
            timepoint: meta.timepoint_reference(),
            age_years: meta.subject_age_years(),
            sex: meta.sex.clone(),
            device_manufacturer: meta.device_manufacturer.clone(),
            device_model: meta.device_model.clone(),
            device_software: meta.device_software.clone(),
            ..Self::default()
        }
    }

    /// Row standing in for a file that could not be read at all.
    pub fn file_error(source: &str, error: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            error: error.into(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Build the study index rows of one document, rhythm waveform first.
pub fn index_document(doc: &AecgDocument, cfg: &IndexConfig) -> Vec<IndexRecord> {
    let header = IndexRecord::header(doc);
    let waveforms = [
        (WaveformKind::Rhythm, doc.rhythm.as_ref()),
        (WaveformKind::Derived, doc.derived.as_ref()),
    ];
    if waveforms.iter().all(|(_, wf)| wf.is_none()) {
        info!("{}: {}", doc.source, NO_WAVEFORMS);
        return vec![IndexRecord {
            document_error: NO_WAVEFORMS.to_string(),
            ..header
        }];
    }

    let mut rows = Vec::new();
    for (kind, waveform) in waveforms {
        if let Some(waveform) = waveform {
            let egdtc = doc.metadata.egdtc_of(kind);
            rows.extend(index_waveform(&header, kind, egdtc, waveform, cfg));
        }
    }
    debug!("{}: {} index rows", doc.source, rows.len());
    rows
}

fn index_waveform(
    header: &IndexRecord,
    kind: WaveformKind,
    egdtc: &TimeInterval,
    waveform: &Waveform,
    cfg: &IndexConfig,
) -> Vec<IndexRecord> {
    let mut base = IndexRecord {
        waveform: Some(kind),
        annotated: !waveform.annotations.is_empty(),
        ..header.clone()
    };
    if !egdtc.low.is_empty() {
        base.egdtc = egdtc.low.clone();
    } else if base.egdtc.is_empty() {
        base.egdtc = waveform.descriptor.start_time.clone();
    }
    if !egdtc.high.is_empty() {
        base.egdtc_stop = egdtc.high.clone();
    } else if base.egdtc_stop.is_empty() && waveform.sample_count() > 0 {
        match waveform.stop_time() {
            Ok(stop) => base.egdtc_stop = stop,
            Err(err) => warn!("{}: cannot compute stop time: {}", header.source, err),
        }
    }

    let mut rows = Vec::new();
    if base.annotated {
        match waveform_intervals(waveform, cfg) {
            Ok(result) => {
                base.intervals_found = result.projected > 0;
                if base.intervals_found {
                    rows.extend(interval_rows(&base, &result));
                }
                rows.extend(result.failed_leads.iter().map(|failure| IndexRecord {
                    lead_display_name: failure.lead_display_name.clone(),
                    hl7_lead_name: failure.hl7_lead_name.clone(),
                    error: failure.error.clone(),
                    ..base.clone()
                }));
            }
            Err(err) => {
                warn!("{}: {}: {}", header.source, INTERVAL_ERROR, err);
                return vec![IndexRecord {
                    error: format!("{}: {}", INTERVAL_ERROR, err),
                    ..base
                }];
            }
        }
    }
    if rows.is_empty() {
        rows.push(base.clone());
    }

    rows.push(IndexRecord {
        param: "MISSINGSAMPLES".to_string(),
        dtype: "RATIO".to_string(),
        value: Some(waveform.missing_samples_ratio()),
        ..base.clone()
    });
    rows.push(IndexRecord {
        param: "NUMANNOTATEDLEADS".to_string(),
        dtype: "COUNT".to_string(),
        value: Some(waveform.annotated_lead_count() as f64),
        ..base
    });
    rows
}

fn waveform_intervals(waveform: &Waveform, cfg: &IndexConfig) -> Result<WaveformIntervals> {
    // ABSOLUTE annotations are meaningless without a valid anchor
    parse_hl7_datetime(&waveform.descriptor.start_time)?;
    Ok(derive_waveform_intervals(
        &waveform.descriptor,
        &waveform.annotations,
        &cfg.derivation,
        cfg.keep_raw_intervals,
    ))
}

fn interval_rows<'a>(
    base: &'a IndexRecord,
    result: &'a WaveformIntervals,
) -> impl Iterator<Item = IndexRecord> + 'a {
    result.summary.rows.iter().map(move |row| IndexRecord {
        param: row.param.as_str().to_string(),
        dtype: row.stat_type.as_str().to_string(),
        value: row.value,
        lead_display_name: row.lead_display_name.clone(),
        hl7_lead_name: row.hl7_lead_name.clone(),
        time_ms: row.time_ms,
        ..base.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationRecord, Boundary, TimeCode, WaveformDescriptor};
    use crate::waveform::LeadSamples;

    fn qrs(lead: &str, unit: &str) -> AnnotationRecord {
        AnnotationRecord {
            group_id: 1,
            beat_number: 1,
            lead: lead.into(),
            code_type: "MDC_ECG_WAVC_TYPE".into(),
            wave_component: "MDC_ECG_WAVC_QRSWAVE".into(),
            time_code: TimeCode::Relative,
            low: Boundary::new("140", unit),
            high: Boundary::new("236", unit),
            ..Default::default()
        }
    }

    fn rhythm(annotations: Vec<AnnotationRecord>) -> Waveform {
        let mut descriptor = WaveformDescriptor::new("20021122091000");
        descriptor.sample_increment = 0.002;
        Waveform {
            descriptor,
            leads: vec![
                LeadSamples::new("MDC_ECG_LEAD_I", vec![Some(0.1), Some(0.2), None, Some(0.3)]),
                LeadSamples::new("MDC_ECG_LEAD_II", vec![Some(0.1); 4]),
            ],
            annotations,
        }
    }

    fn document() -> AecgDocument {
        AecgDocument {
            source: "study/subj1.xml".into(),
            metadata: AecgMetadata {
                study_id: "STUDY01".into(),
                subject_id: "SUBJ1".into(),
                egdtc: TimeInterval {
                    low: "20021122091000".into(),
                    ..Default::default()
                },
                birth_time: "19601123".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn document_without_waveforms_gets_single_row() {
        let rows = index_document(&document(), &IndexConfig::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_error, NO_WAVEFORMS);
        assert_eq!(rows[0].study_id, "STUDY01");
        assert!(!rows[0].annotated);
    }

    #[test]
    fn rhythm_rows_carry_summary_and_waveform_stats() {
        let mut doc = document();
        doc.rhythm = Some(rhythm(vec![qrs("MDC_ECG_LEAD_II", "ms")]));
        let rows = index_document(&doc, &IndexConfig::default());
        // 6 params x (COUNT, AVERAGE) + MISSINGSAMPLES + NUMANNOTATEDLEADS
        assert_eq!(rows.len(), 14);
        assert!(rows.iter().all(|r| r.waveform == Some(WaveformKind::Rhythm)));
        assert!(rows.iter().all(|r| r.annotated && r.intervals_found));
        let qrs_avg = rows
            .iter()
            .find(|r| r.param == "QRS" && r.dtype == "AVERAGE")
            .unwrap();
        assert_eq!(qrs_avg.value, Some(96.0));
        assert_eq!(qrs_avg.lead_display_name, "II");
        let missing = &rows[12];
        assert_eq!((missing.param.as_str(), missing.dtype.as_str()), ("MISSINGSAMPLES", "RATIO"));
        assert_eq!(missing.value, Some(1.0 / 8.0));
        assert_eq!(rows[13].param, "NUMANNOTATEDLEADS");
        assert_eq!(rows[13].value, Some(1.0));
        assert_eq!(rows[0].egdtc, "20021122091000");
        assert_eq!(rows[0].egdtc_stop, "20021122091000.008000");
    }

    #[test]
    fn failed_lead_becomes_error_row() {
        let mut doc = document();
        doc.rhythm = Some(rhythm(vec![
            qrs("MDC_ECG_LEAD_II", "ms"),
            qrs("MDC_ECG_LEAD_V1", "ticks"),
        ]));
        let rows = index_document(&doc, &IndexConfig::default());
        let failed: Vec<&IndexRecord> = rows.iter().filter(|r| r.is_error()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].lead_display_name, "V1");
        assert!(failed[0].error.contains("ticks"));
        assert_eq!(rows.last().unwrap().value, Some(2.0));
    }

    #[test]
    fn malformed_start_time_fails_only_that_waveform() {
        let mut doc = document();
        let mut broken = rhythm(vec![qrs("MDC_ECG_LEAD_II", "ms")]);
        broken.descriptor.start_time = "not a date".into();
        doc.rhythm = Some(broken);
        doc.derived = Some(rhythm(vec![qrs("MDC_ECG_LEAD_II", "ms")]));
        let rows = index_document(&doc, &IndexConfig::default());
        assert!(rows[0].error.starts_with(INTERVAL_ERROR));
        assert_eq!(rows[0].waveform, Some(WaveformKind::Rhythm));
        assert!(rows[1..].iter().all(|r| r.waveform == Some(WaveformKind::Derived)));
        assert!(rows[1..].iter().all(|r| !r.is_error()));
    }

    #[test]
    fn unannotated_waveform_still_reports_samples() {
        let mut doc = document();
        doc.derived = Some(rhythm(vec![]));
        let rows = index_document(&doc, &IndexConfig::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].param, "");
        assert!(!rows[0].annotated);
        assert_eq!(rows[2].value, Some(0.0));
    }

    #[test]
    fn keep_raw_adds_individual_rows() {
        let mut doc = document();
        doc.rhythm = Some(rhythm(vec![qrs("MDC_ECG_LEAD_II", "ms")]));
        let cfg = IndexConfig {
            keep_raw_intervals: true,
            ..IndexConfig::default()
        };
        let rows = index_document(&doc, &cfg);
        assert_eq!(rows[0].param, "QRS");
        assert_eq!(rows[0].dtype, "");
        assert_eq!(rows[0].time_ms, Some(236.0));
    }

    #[test]
    fn age_counts_completed_years() {
        let meta = document().metadata;
        assert_eq!(meta.subject_age_years(), Some(41));
        let on_birthday = AecgMetadata {
            birth_time: "19601122".into(),
            ..meta.clone()
        };
        assert_eq!(on_birthday.subject_age_years(), Some(42));
        let unknown = AecgMetadata {
            birth_time: String::new(),
            ..meta
        };
        assert_eq!(unknown.subject_age_years(), None);
    }

    #[test]
    fn timepoint_prefers_absolute_display_name() {
        let mut meta = AecgMetadata::default();
        meta.protocol_timepoint.code = "PTPT1".into();
        assert_eq!(meta.timepoint_reference(), "PTPT1");
        meta.relative_timepoint.code = "RTPT1".into();
        assert_eq!(meta.timepoint_reference(), "RTPT1");
        meta.absolute_timepoint.display_name = "Day 1 pre-dose".into();
        assert_eq!(meta.timepoint_reference(), "Day 1 pre-dose");
    }

    #[test]
    fn flags_serialize_as_yes_no() {
        let row = IndexRecord {
            annotated: true,
            ..IndexRecord::default()
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["EGANNSFL"], "Y");
        assert_eq!(json["EGINTSFL"], "N");
        let back: IndexRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, row);
    }
}
