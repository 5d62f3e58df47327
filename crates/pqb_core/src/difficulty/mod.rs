use crate::domain::DifficultyLabel;

/// A generation profile: what kind of question to ask and which label it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyProfile {
    pub label: &'static str,
    pub reference_type: ReferenceType,
    pub difficulty: DifficultyLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    SingleSingle,
    SingleMulti,
    Multiple,
    Comparison,
    Negative,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::SingleSingle => "single_single",
            ReferenceType::SingleMulti => "single_multi",
            ReferenceType::Multiple => "multiple",
            ReferenceType::Comparison => "comparison",
            ReferenceType::Negative => "negative",
        }
    }
}

pub const PROFILES: [DifficultyProfile; 5] = [
    DifficultyProfile {
        label: "Single document: single hop",
        reference_type: ReferenceType::SingleSingle,
        difficulty: DifficultyLabel::SingleHop,
    },
    DifficultyProfile {
        label: "Single document: multi hop",
        reference_type: ReferenceType::SingleMulti,
        difficulty: DifficultyLabel::MultiHop,
    },
    DifficultyProfile {
        label: "Multiple documents",
        reference_type: ReferenceType::Multiple,
        difficulty: DifficultyLabel::Definition,
    },
    DifficultyProfile {
        label: "Comparison",
        reference_type: ReferenceType::Comparison,
        difficulty: DifficultyLabel::Comparison,
    },
    DifficultyProfile {
        label: "Negative / Null",
        reference_type: ReferenceType::Negative,
        difficulty: DifficultyLabel::Negative,
    },
];

const LEGACY_LABELS: [(&str, &str); 5] = [
    ("direct reference: single hop", "Single document: single hop"),
    ("direct reference: multi hop", "Single document: multi hop"),
    ("single reference: single hop", "Single document: single hop"),
    ("single reference: multi hop", "Single document: multi hop"),
    ("multiple reference: multi hop", "Multiple documents"),
];

pub fn profile_labels() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.label).collect()
}

fn lookup_canonical(label: &str) -> Option<&'static DifficultyProfile> {
    let lowered = label.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    if let Some(p) = PROFILES.iter().find(|p| p.label.to_lowercase() == lowered) {
        return Some(p);
    }
    let current = LEGACY_LABELS
        .iter()
        .find(|(legacy, _)| *legacy == lowered)
        .map(|(_, current)| *current)?;
    PROFILES.iter().find(|p| p.label == current)
}

/// Normalize legacy and case-variant labels; unknown or empty input maps to the first profile.
pub fn canonical_profile(label: Option<&str>) -> &'static DifficultyProfile {
    label.and_then(lookup_canonical).unwrap_or(&PROFILES[0])
}

/// Profile for a generation slot; slots wrap around the profile list.
pub fn profile_for_slot(slot_index: usize) -> &'static DifficultyProfile {
    &PROFILES[slot_index % PROFILES.len()]
}

/// Strict variant used when decoding persisted rows: `None` for unrecognized labels.
pub fn difficulty_for_known_label(label: &str) -> Option<DifficultyLabel> {
    lookup_canonical(label).map(|p| p.difficulty)
}

/// Heuristic suggestion shown to the reviewer; always human-editable.
pub fn classify(question_text: &str, candidate_chunk_ids: &[String]) -> DifficultyLabel {
    let q = question_text.to_lowercase();
    let words: Vec<&str> = q
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |w: &str| words.iter().any(|x| *x == w);

    if q.contains("compare") || q.contains("difference") {
        return DifficultyLabel::Comparison;
    }
    if has_word("not") || has_word("except") {
        return DifficultyLabel::Negative;
    }
    if q.trim_start().starts_with("what is") || q.contains("define") {
        return DifficultyLabel::Definition;
    }
    if candidate_chunk_ids.len() >= 2 {
        return DifficultyLabel::MultiHop;
    }
    DifficultyLabel::SingleHop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_profile_handles_case_legacy_and_unknown() {
        assert_eq!(canonical_profile(Some("comparison")).label, "Comparison");
        assert_eq!(
            canonical_profile(Some("Direct reference: multi hop")).label,
            "Single document: multi hop"
        );
        assert_eq!(canonical_profile(Some("  ")).label, "Single document: single hop");
        assert_eq!(canonical_profile(None).difficulty, DifficultyLabel::SingleHop);
        assert_eq!(difficulty_for_known_label("mystery"), None);
    }

    #[test]
    fn slots_wrap_around_profiles() {
        assert_eq!(profile_for_slot(1).reference_type, ReferenceType::SingleMulti);
        assert_eq!(profile_for_slot(6).reference_type, ReferenceType::SingleMulti);
    }

    #[test]
    fn classify_prefers_lexical_cues_then_evidence_count() {
        let none: Vec<String> = Vec::new();
        let two = vec!["a_chunk_0000".to_string(), "a_chunk_0001".to_string()];
        assert_eq!(classify("Compare BERT and GPT", &none), DifficultyLabel::Comparison);
        assert_eq!(classify("Which claim is not supported?", &none), DifficultyLabel::Negative);
        assert_eq!(classify("What is attention?", &none), DifficultyLabel::Definition);
        assert_eq!(classify("How do the layers interact?", &two), DifficultyLabel::MultiHop);
        assert_eq!(classify("How many layers are used?", &none), DifficultyLabel::SingleHop);
        // "notation" must not trip the negative cue.
        assert_eq!(classify("Which notation is used?", &none), DifficultyLabel::SingleHop);
    }
}
