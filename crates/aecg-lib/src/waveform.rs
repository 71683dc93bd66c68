use crate::annotation::{AnnotationRecord, WaveformDescriptor};
use crate::error::Result;
use crate::units::{
    add_milliseconds, format_hl7_datetime, parse_hl7_datetime, to_millivolts, to_milliseconds,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw digits of one lead plus the calibration needed to read them in mV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadSamples {
    pub lead: String,
    #[serde(default)]
    pub origin: f64,
    #[serde(default = "millivolt")]
    pub origin_unit: String,
    #[serde(default = "unit_scale")]
    pub scale: f64,
    #[serde(default = "millivolt")]
    pub scale_unit: String,
    /// `None` marks a missing sample.
    #[serde(default)]
    pub digits: Vec<Option<f64>>,
}

fn millivolt() -> String {
    "mV".to_string()
}

fn unit_scale() -> f64 {
    1.0
}

impl LeadSamples {
    pub fn new(lead: impl Into<String>, digits: Vec<Option<f64>>) -> Self {
        Self {
            lead: lead.into(),
            origin: 0.0,
            origin_unit: millivolt(),
            scale: unit_scale(),
            scale_unit: millivolt(),
            digits,
        }
    }

    /// Samples in millivolts; missing samples stay missing.
    pub fn values_mv(&self) -> Result<Vec<Option<f64>>> {
        self.digits
            .iter()
            .map(|digit| match digit {
                Some(d) => to_millivolts(
                    *d,
                    self.origin,
                    &self.origin_unit,
                    self.scale,
                    &self.scale_unit,
                )
                .map(Some),
                None => Ok(None),
            })
            .collect()
    }
}

/// A rhythm or derived waveform together with its annotation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub descriptor: WaveformDescriptor,
    #[serde(default)]
    pub leads: Vec<LeadSamples>,
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
}

impl Waveform {
    pub fn new(descriptor: WaveformDescriptor) -> Self {
        Self {
            descriptor,
            leads: Vec::new(),
            annotations: Vec::new(),
        }
    }

    /// Length of the longest lead.
    pub fn sample_count(&self) -> usize {
        self.leads.iter().map(|l| l.digits.len()).max().unwrap_or(0)
    }

    /// Missing over total samples, with shorter leads padded to the longest.
    pub fn missing_samples_ratio(&self) -> f64 {
        let longest = self.sample_count();
        let total = longest * self.leads.len();
        if total == 0 {
            return 0.0;
        }
        let present: usize = self
            .leads
            .iter()
            .map(|l| l.digits.iter().filter(|d| d.is_some()).count())
            .sum();
        (total - present) as f64 / total as f64
    }

    /// Recording length in ms: sample count times the sample increment.
    ///
    /// This counts the full last sample period, so it is one increment longer
    /// than the span from the first to the last sample time.
    pub fn duration_ms(&self) -> Result<f64> {
        to_milliseconds(
            self.sample_count() as f64 * self.descriptor.sample_increment,
            &self.descriptor.sample_unit,
        )
    }

    /// HL7 timestamp one recording length past the waveform start.
    pub fn stop_time(&self) -> Result<String> {
        let start = parse_hl7_datetime(&self.descriptor.start_time)?;
        Ok(format_hl7_datetime(&add_milliseconds(&start, self.duration_ms()?)?))
    }

    /// Distinct leads with at least one annotation naming a wave component.
    pub fn annotated_lead_count(&self) -> usize {
        self.annotations
            .iter()
            .filter(|a| a.mentions_wave_code())
            .map(|a| a.lead.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}
