use serde::{Deserialize, Serialize};

use crate::{Label, Outcome};

/// Substrings that signal a verdict in classifier text. Matching is
/// case-insensitive.
///
/// Unqualified markers usually contain a qualified marker ("不合格" contains
/// "合格", "not qualified" contains "qualified"), so a text is `Qualified` only
/// when it has a qualified marker and no unqualified marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictMarkers {
    pub qualified: Vec<String>,
    pub unqualified: Vec<String>,
}

impl Default for VerdictMarkers {
    fn default() -> Self {
        Self {
            qualified: vec!["合格".to_string(), "qualified".to_string()],
            unqualified: vec![
                "不合格".to_string(),
                "unqualified".to_string(),
                "disqualified".to_string(),
                "not qualified".to_string(),
                "non-qualified".to_string(),
                "non qualified".to_string(),
            ],
        }
    }
}

impl VerdictMarkers {
    pub fn classify_text(&self, text: &str) -> Label {
        let text = text.to_lowercase();
        let signals = |markers: &[String]| {
            markers
                .iter()
                .filter(|marker| !marker.is_empty())
                .any(|marker| text.contains(&marker.to_lowercase()))
        };
        if signals(self.qualified.as_slice()) && !signals(self.unqualified.as_slice()) {
            Label::Qualified
        } else {
            Label::Unqualified
        }
    }

    pub fn derive(&self, outcome: &Outcome) -> Label {
        self.classify_text(&outcome.verdict_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qualified_text_without_disqualifier() {
        let markers = VerdictMarkers::default();
        assert_eq!(markers.classify_text("审核结果：合格"), Label::Qualified);
        assert_eq!(markers.classify_text("Qualified"), Label::Qualified);
    }

    #[test]
    fn disqualifier_wins_over_embedded_qualifier() {
        let markers = VerdictMarkers::default();
        assert_eq!(markers.classify_text("不合格"), Label::Unqualified);
        assert_eq!(markers.classify_text("UNQUALIFIED image"), Label::Unqualified);
        assert_eq!(
            markers.classify_text("部分合格，部分不合格"),
            Label::Unqualified
        );
    }

    #[test]
    fn english_negations_are_unqualified() {
        let markers = VerdictMarkers::default();
        for text in [
            "not qualified",
            "Disqualified",
            "non-qualified image",
            "Non qualified: blurry",
            "Result: NOT QUALIFIED",
        ] {
            assert_eq!(markers.classify_text(text), Label::Unqualified, "{text}");
        }
        assert_eq!(markers.classify_text("qualified, not blurry"), Label::Qualified);
    }

    #[test]
    fn text_without_any_marker_is_unqualified() {
        let markers = VerdictMarkers::default();
        assert_eq!(markers.classify_text("unclear"), Label::Unqualified);
        assert_eq!(markers.classify_text(""), Label::Unqualified);
    }

    #[test]
    fn derive_reads_structured_verdict_field() {
        let markers = VerdictMarkers::default();
        let outcome = Outcome::from_payload(json!({ "lijie": "合格", "detail": "不合格项: 无" }));
        assert_eq!(markers.derive(&outcome), Label::Qualified);
    }

    #[test]
    fn empty_markers_are_ignored() {
        let markers = VerdictMarkers {
            qualified: vec!["pass".into()],
            unqualified: vec![String::new()],
        };
        assert_eq!(markers.classify_text("pass"), Label::Qualified);
    }
}
