/// Display name of the pseudo-lead holding annotations that are not tied to one channel.
pub const GLOBAL_LEAD: &str = "GLOBAL";

/// Map an HL7 lead code to its display name.
///
/// Standard `MDC_ECG_LEAD_*` codes (and the augmented limb leads in either
/// case) get their conventional short names, other codes pass through and an
/// empty code is the global pseudo-lead.
pub fn display_name(hl7_lead: &str) -> String {
    if hl7_lead.is_empty() {
        return GLOBAL_LEAD.to_string();
    }
    standard_display_name(hl7_lead)
        .map(str::to_string)
        .unwrap_or_else(|| hl7_lead.to_string())
}

fn standard_display_name(hl7_lead: &str) -> Option<&'static str> {
    let suffix = hl7_lead.strip_prefix("MDC_ECG_LEAD_")?;
    let name = match suffix {
        "I" => "I",
        "II" => "II",
        "III" => "III",
        "AVR" | "aVR" => "aVR",
        "AVL" | "aVL" => "aVL",
        "AVF" | "aVF" => "aVF",
        "AVRneg" | "AVRNEG" => "-aVR",
        "V1" => "V1",
        "V2" => "V2",
        "V3" => "V3",
        "V4" => "V4",
        "V5" => "V5",
        "V6" => "V6",
        "X" => "X",
        "Y" => "Y",
        "Z" => "Z",
        _ => return None,
    };
    Some(name)
}
