//! Cardiac-cycle interval derivation from projected wave boundaries.
//!
//! Boundaries are sorted by lead and time and folded through a [`LeadState`]
//! that is reset whenever the lead changes. Each boundary may close one or
//! more intervals (RR on R peaks, PR on QRS onsets, QRS on QRS offsets and
//! QT/QTRR/QTCF on T offsets); the resulting wide rows are melted into one
//! [`DerivedInterval`] per defined value.

use super::{DerivedInterval, IntervalTable, LeadKey, ParamCode};
use crate::config::DerivationConfig;
use crate::leads::GLOBAL_LEAD;
use crate::projection::ProjectedAnnotation;
use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Last observed boundaries of the lead being scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeadState {
    pub current_r: Option<f64>,
    pub preceding_r: Option<f64>,
    pub last_rr: Option<f64>,
    pub last_pon: Option<f64>,
    pub last_qon: Option<f64>,
    pub last_qoff: Option<f64>,
    pub last_toff: Option<f64>,
    pub last_qt: Option<f64>,
}

/// Intervals closed by a single boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurements {
    pub rr: Option<f64>,
    pub pr: Option<f64>,
    pub qrs: Option<f64>,
    pub qt: Option<f64>,
    pub qt_rr: Option<f64>,
    pub qtc_f: Option<f64>,
}

impl Measurements {
    pub fn values(&self) -> [(ParamCode, Option<f64>); 6] {
        [
            (ParamCode::Rr, self.rr),
            (ParamCode::Pr, self.pr),
            (ParamCode::Qrs, self.qrs),
            (ParamCode::Qt, self.qt),
            (ParamCode::QtRr, self.qt_rr),
            (ParamCode::QtcF, self.qtc_f),
        ]
    }
}

/// Result of feeding one boundary to a [`LeadState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    pub measurements: Measurements,
    /// Lead the row is credited to when the QRS onset came from another lead.
    pub attributed_to: Option<LeadKey>,
}

/// QRS onsets available to T offsets that have no onset in their own lead.
pub struct QrsOnsets<'a> {
    global: Vec<f64>,
    by_group: HashMap<i64, Vec<&'a ProjectedAnnotation>>,
}

impl<'a> QrsOnsets<'a> {
    pub fn new(annotations: &'a [ProjectedAnnotation]) -> Self {
        let mut global = Vec::new();
        let mut by_group: HashMap<i64, Vec<&ProjectedAnnotation>> = HashMap::new();
        for ann in annotations.iter().filter(|a| a.ann_type == "QON") {
            if ann.lead_display_name == GLOBAL_LEAD {
                global.push(ann.time_ms);
            }
            by_group.entry(ann.group_id).or_default().push(ann);
        }
        Self { global, by_group }
    }

    /// Latest global-lead QRS onset strictly before `toff`.
    pub fn closest_global_before(&self, toff: f64) -> Option<f64> {
        self.global
            .iter()
            .copied()
            .filter(|&qon| toff - qon > 0.0)
            .max_by(|a, b| a.total_cmp(b))
    }

    /// The QRS onset of `group_id`, if the group has exactly one in any lead.
    pub fn single_in_group(&self, group_id: i64) -> Option<&'a ProjectedAnnotation> {
        match self.by_group.get(&group_id).map(Vec::as_slice) {
            Some([only]) => Some(*only),
            _ => None,
        }
    }
}

impl LeadState {
    /// Advance the state by one boundary of the same lead.
    pub fn step(
        mut self,
        ann: &ProjectedAnnotation,
        onsets: &QrsOnsets<'_>,
        cfg: &DerivationConfig,
    ) -> (Self, Step) {
        let t = ann.time_ms;
        let mut step = Step::default();
        match ann.ann_type.as_str() {
            "RPEAK" => {
                if self.current_r.map_or(true, |r| t > r) {
                    self.preceding_r = self.current_r;
                    self.current_r = Some(t);
                    self.last_rr = self.preceding_r.map(|r| t - r);
                    step.measurements.rr = self.last_rr;
                }
            }
            "PON" => self.last_pon = Some(t),
            "QON" => self.open_beat(t, &mut step.measurements),
            "RON" if self.last_qon.map_or(true, |q| t - q > cfg.ron_retrigger_ms) => {
                self.open_beat(t, &mut step.measurements)
            }
            "QOFF" | "STJPEAK" => {
                self.last_qoff = Some(t);
                step.measurements.qrs = self.last_qon.map(|q| t - q);
            }
            "TOFF" => {
                self.last_toff = Some(t);
                let (qt, attributed_to) = self.resolve_qt(ann, onsets);
                self.last_qt = qt;
                step.measurements.qt = qt;
                step.measurements.qt_rr = self.last_rr;
                step.measurements.qtc_f = fridericia(qt, self.last_rr);
                step.attributed_to = attributed_to;
                // end of beat
                self.last_pon = None;
                self.last_qon = None;
                self.last_qoff = None;
                self.last_toff = None;
            }
            _ => {}
        }
        (self, step)
    }

    fn open_beat(&mut self, t: f64, measurements: &mut Measurements) {
        self.last_qon = Some(t);
        measurements.pr = self.last_pon.map(|p| t - p);
        self.last_pon = None;
        self.last_qoff = None;
        self.last_toff = None;
        self.last_qt = None;
    }

    fn resolve_qt(
        &self,
        ann: &ProjectedAnnotation,
        onsets: &QrsOnsets<'_>,
    ) -> (Option<f64>, Option<LeadKey>) {
        let toff = ann.time_ms;
        if let Some(qon) = self.last_qon {
            return (Some(toff - qon), None);
        }
        if let Some(qon) = onsets.closest_global_before(toff) {
            return (Some(toff - qon), None);
        }
        if ann.lead_display_name == GLOBAL_LEAD {
            if let Some(qon) = onsets
                .single_in_group(ann.group_id)
                .filter(|qon| toff - qon.time_ms > 0.0)
            {
                return (Some(toff - qon.time_ms), Some(LeadKey::of(qon)));
            }
        }
        (None, None)
    }
}

/// Fridericia-corrected QT: `QT / (RR / 1000)^(1/3)`.
///
/// Undefined when either operand is missing or RR is not positive.
pub fn fridericia(qt: Option<f64>, rr: Option<f64>) -> Option<f64> {
    match (qt, rr) {
        (Some(qt), Some(rr)) if rr > 0.0 => {
            let qtc = qt / (rr / 1000.0).cbrt();
            qtc.is_finite().then_some(qtc)
        }
        _ => None,
    }
}

/// Derive RR, PR, QRS, QT, QTRR and QTCF intervals from one waveform's boundaries.
pub fn derive_intervals(
    mut annotations: Vec<ProjectedAnnotation>,
    cfg: &DerivationConfig,
) -> IntervalTable {
    annotations.sort_by(|a, b| {
        a.lead_display_name
            .cmp(&b.lead_display_name)
            .then_with(|| a.hl7_lead_name.cmp(&b.hl7_lead_name))
            .then_with(|| a.time_ms.total_cmp(&b.time_ms))
    });
    let onsets = QrsOnsets::new(&annotations);
    let mut leads: BTreeSet<LeadKey> = annotations.iter().map(LeadKey::of).collect();
    let mut intervals = Vec::new();

    annotations
        .iter()
        .fold(None::<(&str, LeadState)>, |scan, ann| {
            let state = match scan {
                Some((lead, state)) if lead == ann.lead_display_name => state,
                _ => LeadState::default(),
            };
            let (next, step) = state.step(ann, &onsets, cfg);
            let lead = step.attributed_to.unwrap_or_else(|| LeadKey::of(ann));
            for (param, value) in step.measurements.values() {
                if let Some(value) = value {
                    intervals.push(DerivedInterval {
                        lead_display_name: lead.lead_display_name.clone(),
                        hl7_lead_name: lead.hl7_lead_name.clone(),
                        time_ms: ann.time_ms,
                        param,
                        value,
                    });
                }
            }
            leads.insert(lead);
            Some((ann.lead_display_name.as_str(), next))
        });

    intervals.sort_by(|a, b| {
        a.lead_display_name
            .cmp(&b.lead_display_name)
            .then_with(|| a.time_ms.total_cmp(&b.time_ms))
    });
    debug!(
        "derived {} intervals over {} leads from {} boundaries",
        intervals.len(),
        leads.len(),
        annotations.len()
    );
    IntervalTable { leads, intervals }
}
