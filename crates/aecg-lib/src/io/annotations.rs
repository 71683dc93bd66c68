use crate::annotation::{AnnotationRecord, Boundary, TimeCode};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One row of the normalized annotation table.
#[derive(Debug, Deserialize)]
struct AnnotationRow {
    anngrpid: i64,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    beatnum: Option<i64>,
    #[serde(default)]
    lead: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    codetype: String,
    #[serde(default)]
    wavecomponent: String,
    #[serde(default)]
    wavecomponent2: String,
    #[serde(default)]
    timecode: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    value_unit: String,
    #[serde(default)]
    low: String,
    #[serde(default)]
    low_unit: String,
    #[serde(default)]
    high: String,
    #[serde(default)]
    high_unit: String,
}

impl From<AnnotationRow> for AnnotationRecord {
    fn from(row: AnnotationRow) -> Self {
        AnnotationRecord {
            group_id: row.anngrpid,
            beat_number: row.beatnum.unwrap_or(-1),
            lead: row.lead,
            code: row.code,
            code_type: row.codetype,
            wave_component: row.wavecomponent,
            wave_component_secondary: row.wavecomponent2,
            time_code: TimeCode::from(row.timecode),
            value: Boundary::new(row.value, row.value_unit),
            low: Boundary::new(row.low, row.low_unit),
            high: Boundary::new(row.high, row.high_unit),
        }
    }
}

pub fn read_annotation_csv(path: &Path) -> Result<Vec<AnnotationRecord>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_annotations(file).with_context(|| format!("reading annotations from {}", path.display()))
}

pub fn parse_annotations<R: Read>(reader: R) -> Result<Vec<AnnotationRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();
    for (line, row) in reader.deserialize::<AnnotationRow>().enumerate() {
        let row = row.with_context(|| format!("record {}", line + 1))?;
        records.push(row.into());
    }
    Ok(records)
}
