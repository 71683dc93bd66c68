use serde::{Deserialize, Serialize};

/// How the boundary slots of an annotation encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimeCode {
    /// HL7 datetime strings; also assumed when the code is missing.
    #[default]
    Absolute,
    /// Numeric offsets from the waveform start, with a time unit.
    Relative,
}

impl TimeCode {
    pub fn as_hl7(self) -> &'static str {
        match self {
            TimeCode::Absolute => "TIME_ABSOLUTE",
            TimeCode::Relative => "TIME_RELATIVE",
        }
    }
}

impl From<String> for TimeCode {
    fn from(code: String) -> Self {
        if code.trim() == "TIME_RELATIVE" {
            TimeCode::Relative
        } else {
            TimeCode::Absolute
        }
    }
}

impl From<TimeCode> for String {
    fn from(code: TimeCode) -> Self {
        code.as_hl7().to_string()
    }
}

/// Which boundary slot of an annotation a time was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundarySlot {
    Value,
    Low,
    High,
}

impl BoundarySlot {
    pub const ALL: [BoundarySlot; 3] = [BoundarySlot::Value, BoundarySlot::Low, BoundarySlot::High];

    /// Label suffix a boundary read from this slot carries by default.
    pub fn suffix(self) -> &'static str {
        match self {
            BoundarySlot::Value => "PEAK",
            BoundarySlot::Low => "ON",
            BoundarySlot::High => "OFF",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoundarySlot::Value => "value",
            BoundarySlot::Low => "low",
            BoundarySlot::High => "high",
        }
    }
}

/// Raw boundary text plus its declared unit (empty for HL7 datetimes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

impl Boundary {
    pub fn new(value: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            unit: unit.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// One wave-boundary annotation as extracted from the aECG annotation subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub group_id: i64,
    #[serde(default = "no_beat")]
    pub beat_number: i64,
    /// HL7 lead code; empty for annotations that apply to all leads.
    #[serde(default)]
    pub lead: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub code_type: String,
    #[serde(default)]
    pub wave_component: String,
    #[serde(default)]
    pub wave_component_secondary: String,
    #[serde(default)]
    pub time_code: TimeCode,
    #[serde(default)]
    pub value: Boundary,
    #[serde(default)]
    pub low: Boundary,
    #[serde(default)]
    pub high: Boundary,
}

fn no_beat() -> i64 {
    -1
}

impl AnnotationRecord {
    pub fn boundary(&self, slot: BoundarySlot) -> &Boundary {
        match slot {
            BoundarySlot::Value => &self.value,
            BoundarySlot::Low => &self.low,
            BoundarySlot::High => &self.high,
        }
    }

    /// Whether the wave component carries an HL7 wave-component code at all.
    pub fn has_wave_component(&self) -> bool {
        self.wave_component.contains("MDC_ECG_WAVC")
    }

    /// Whether any code field names a specific wave component.
    pub fn mentions_wave_code(&self) -> bool {
        [
            &self.code,
            &self.code_type,
            &self.wave_component,
            &self.wave_component_secondary,
        ]
        .iter()
        .any(|field| field.contains("MDC_ECG_WAVC_"))
    }
}

/// Start time of an individual lead, when it differs from the waveform's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTiming {
    pub lead: String,
    #[serde(default)]
    pub time_code: TimeCode,
    pub head: String,
}

/// Timing metadata of a rhythm or derived waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformDescriptor {
    /// HL7 datetime of the first sample.
    pub start_time: String,
    #[serde(default = "default_sample_unit")]
    pub sample_unit: String,
    #[serde(default)]
    pub sample_increment: f64,
    #[serde(default)]
    pub lead_timings: Vec<LeadTiming>,
}

fn default_sample_unit() -> String {
    "s".to_string()
}

impl WaveformDescriptor {
    pub fn new(start_time: impl Into<String>) -> Self {
        Self {
            start_time: start_time.into(),
            sample_unit: default_sample_unit(),
            sample_increment: 0.0,
            lead_timings: Vec::new(),
        }
    }

    /// Start time that ABSOLUTE annotations of `lead` are measured against.
    pub fn start_time_for(&self, lead: &str) -> &str {
        self.lead_timings
            .iter()
            .find(|timing| timing.lead == lead && timing.time_code == TimeCode::Absolute)
            .map(|timing| timing.head.as_str())
            .filter(|head| !head.trim().is_empty())
            .unwrap_or(&self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_code_defaults_to_absolute() {
        assert_eq!(TimeCode::from("TIME_RELATIVE".to_string()), TimeCode::Relative);
        assert_eq!(TimeCode::from(String::new()), TimeCode::Absolute);
        let record: AnnotationRecord = serde_json::from_str(r#"{"group_id": 3}"#).unwrap();
        assert_eq!(record.time_code, TimeCode::Absolute);
        assert_eq!(record.beat_number, -1);
    }

    #[test]
    fn lead_start_time_overrides_waveform_start() {
        let mut descriptor = WaveformDescriptor::new("20021122091000");
        descriptor.lead_timings.push(LeadTiming {
            lead: "MDC_ECG_LEAD_II".into(),
            time_code: TimeCode::Absolute,
            head: "20021122091001".into(),
        });
        descriptor.lead_timings.push(LeadTiming {
            lead: "MDC_ECG_LEAD_V1".into(),
            time_code: TimeCode::Relative,
            head: "0".into(),
        });
        assert_eq!(descriptor.start_time_for("MDC_ECG_LEAD_II"), "20021122091001");
        assert_eq!(descriptor.start_time_for("MDC_ECG_LEAD_V1"), "20021122091000");
        assert_eq!(descriptor.start_time_for(""), "20021122091000");
    }

    #[test]
    fn wave_code_detection() {
        let record = AnnotationRecord {
            code_type: "MDC_ECG_WAVC_TYPE".into(),
            wave_component: "MDC_ECG_WAVC_PWAVE".into(),
            ..Default::default()
        };
        assert!(record.has_wave_component());
        assert!(record.mentions_wave_code());
        let other = AnnotationRecord {
            code: "MDC_ECG_BEAT".into(),
            ..Default::default()
        };
        assert!(!other.has_wave_component());
        assert!(!other.mentions_wave_code());
    }
}
