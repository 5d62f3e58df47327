use serde::{Deserialize, Serialize};

/// An ingested source document. `paper_id` is derived from the source file name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Paper {
    pub paper_id: String,
    pub source_path: String,
}

/// A contiguous token window `[start, end)` of a paper's cleaned text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_id: String,
    pub paper_id: String,
    pub index: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

pub fn chunk_id_for(paper_id: &str, index: u32) -> String {
    format!("{paper_id}_chunk_{index:04}")
}

/// Split a chunk id back into `(paper_id, index)`.
pub fn parse_chunk_id(chunk_id: &str) -> Option<(&str, u32)> {
    let (paper_id, idx) = chunk_id.rsplit_once("_chunk_")?;
    if paper_id.is_empty() || idx.len() < 4 || !idx.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((paper_id, idx.parse().ok()?))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum DifficultyLabel {
    SingleHop,
    MultiHop,
    Definition,
    Comparison,
    Negative,
}

impl DifficultyLabel {
    pub const ALL: [DifficultyLabel; 5] = [
        DifficultyLabel::SingleHop,
        DifficultyLabel::MultiHop,
        DifficultyLabel::Definition,
        DifficultyLabel::Comparison,
        DifficultyLabel::Negative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLabel::SingleHop => "single_hop",
            DifficultyLabel::MultiHop => "multi_hop",
            DifficultyLabel::Definition => "definition",
            DifficultyLabel::Comparison => "comparison",
            DifficultyLabel::Negative => "negative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "single_hop" => Some(Self::SingleHop),
            "multi_hop" => Some(Self::MultiHop),
            "definition" => Some(Self::Definition),
            "comparison" => Some(Self::Comparison),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl TryFrom<String> for DifficultyLabel {
    type Error = String;

    // Older collections stored the UI profile label instead of the enum value.
    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        Self::from_str(trimmed)
            .or_else(|| crate::difficulty::difficulty_for_known_label(trimmed))
            .ok_or_else(|| format!("unknown difficulty label: {value}"))
    }
}

impl From<DifficultyLabel> for String {
    fn from(value: DifficultyLabel) -> Self {
        value.as_str().to_string()
    }
}

/// Anything stored in a question collection.
pub trait QuestionRow {
    fn question_id(&self) -> &str;
}

/// Row shape of `unverified_questions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnverifiedQuestion {
    pub question_id: String,
    pub question_text: String,
    pub paper_id: String,
    pub default_difficulty: DifficultyLabel,
}

impl QuestionRow for UnverifiedQuestion {
    fn question_id(&self) -> &str {
        &self.question_id
    }
}

/// Row shape of `verified_questions.json`.
///
/// `golden_chunk_ids` is ordered most-important first, exactly as confirmed by the reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedQuestion {
    pub question_id: String,
    pub question_text: String,
    pub source_paper_id: String,
    pub ground_truth: String,
    pub golden_chunk_ids: Vec<String>,
    pub difficulty: DifficultyLabel,
    pub date_created: String, // RFC3339
    pub notes: String,
}

impl QuestionRow for VerifiedQuestion {
    fn question_id(&self) -> &str {
        &self.question_id
    }
}

/// Lifecycle state of a question.
///
/// `NeedsRevision` shares the persisted representation of `Unverified`; `Rejected` leaves no
/// persisted trace at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    Unverified,
    NeedsRevision,
    Verified,
    Rejected,
}

impl QuestionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionState::Unverified => "unverified",
            QuestionState::NeedsRevision => "needs_revision",
            QuestionState::Verified => "verified",
            QuestionState::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, next: QuestionState) -> bool {
        matches!(
            (self, next),
            (
                QuestionState::Unverified | QuestionState::NeedsRevision,
                QuestionState::Verified | QuestionState::Rejected | QuestionState::NeedsRevision
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_ids_round_trip_through_parse() {
        let id = chunk_id_for("attention_is_all_you_need", 7);
        assert_eq!(id, "attention_is_all_you_need_chunk_0007");
        assert_eq!(parse_chunk_id(&id), Some(("attention_is_all_you_need", 7)));
        assert_eq!(parse_chunk_id("paper_chunk_12345"), Some(("paper", 12345)));
        assert_eq!(parse_chunk_id("paper_0001"), None);
        assert_eq!(parse_chunk_id("paper_chunk_01"), None);
    }

    #[test]
    fn difficulty_accepts_enum_values_and_profile_labels() {
        let v: DifficultyLabel = serde_json::from_str("\"multi_hop\"").unwrap();
        assert_eq!(v, DifficultyLabel::MultiHop);
        let v: DifficultyLabel = serde_json::from_str("\"Comparison\"").unwrap();
        assert_eq!(v, DifficultyLabel::Comparison);
        assert!(serde_json::from_str::<DifficultyLabel>("\"bogus\"").is_err());
        assert_eq!(serde_json::to_string(&DifficultyLabel::Negative).unwrap(), "\"negative\"");
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(QuestionState::Unverified.can_transition_to(QuestionState::Verified));
        assert!(QuestionState::NeedsRevision.can_transition_to(QuestionState::Rejected));
        assert!(!QuestionState::Verified.can_transition_to(QuestionState::Rejected));
        assert!(!QuestionState::Rejected.can_transition_to(QuestionState::Verified));
        assert!(!QuestionState::Unverified.can_transition_to(QuestionState::Unverified));
    }
}
