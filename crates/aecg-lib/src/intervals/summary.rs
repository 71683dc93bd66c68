use super::{DerivedInterval, IntervalTable, LeadKey, ParamCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of value an output row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatType {
    /// A single interval, kept for per-beat audit.
    #[serde(rename = "")]
    Individual,
    #[serde(rename = "COUNT")]
    Count,
    #[serde(rename = "AVERAGE")]
    Average,
}

impl StatType {
    pub fn as_str(self) -> &'static str {
        match self {
            StatType::Individual => "",
            StatType::Count => "COUNT",
            StatType::Average => "AVERAGE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSummary {
    pub lead_display_name: String,
    pub hl7_lead_name: String,
    pub param: ParamCode,
    pub stat_type: StatType,
    /// Time of the closing boundary; only set on individual rows.
    pub time_ms: Option<f64>,
    pub value: Option<f64>,
}

impl IntervalSummary {
    fn individual(interval: &DerivedInterval) -> Self {
        Self {
            lead_display_name: interval.lead_display_name.clone(),
            hl7_lead_name: interval.hl7_lead_name.clone(),
            param: interval.param,
            stat_type: StatType::Individual,
            time_ms: Some(interval.time_ms),
            value: Some(interval.value),
        }
    }

    fn statistic(lead: &LeadKey, param: ParamCode, stat_type: StatType, value: Option<f64>) -> Self {
        Self {
            lead_display_name: lead.lead_display_name.clone(),
            hl7_lead_name: lead.hl7_lead_name.clone(),
            param,
            stat_type,
            time_ms: None,
            value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub rows: Vec<IntervalSummary>,
}

impl SummaryTable {
    pub fn get(
        &self,
        lead_display_name: &str,
        param: ParamCode,
        stat_type: StatType,
    ) -> Option<&IntervalSummary> {
        self.rows.iter().find(|row| {
            row.lead_display_name == lead_display_name
                && row.param == param
                && row.stat_type == stat_type
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Count and average every (lead, parameter) group of `table`.
///
/// Every lead listed in the table gets a COUNT and an AVERAGE row for each
/// parameter, even without intervals (COUNT 0, AVERAGE undefined). All COUNT
/// rows precede all AVERAGE rows. With `keep_raw`, the individual intervals
/// are emitted first.
pub fn aggregate(table: &IntervalTable, keep_raw: bool) -> SummaryTable {
    let mut groups: BTreeMap<(LeadKey, ParamCode), Vec<f64>> = BTreeMap::new();
    for lead in &table.leads {
        for param in ParamCode::ALL {
            groups.entry((lead.clone(), param)).or_default();
        }
    }
    for interval in &table.intervals {
        let values = groups
            .entry((interval.lead_key(), interval.param))
            .or_default();
        if !interval.value.is_nan() {
            values.push(interval.value);
        }
    }

    let mut rows = Vec::with_capacity(groups.len() * 2);
    if keep_raw {
        rows.extend(table.intervals.iter().map(IntervalSummary::individual));
    }
    for ((lead, param), values) in &groups {
        rows.push(IntervalSummary::statistic(
            lead,
            *param,
            StatType::Count,
            Some(values.len() as f64),
        ));
    }
    for ((lead, param), values) in &groups {
        let average = if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        };
        rows.push(IntervalSummary::statistic(lead, *param, StatType::Average, average));
    }
    SummaryTable { rows }
}
