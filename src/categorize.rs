use crate::models::GradeBreakdown;

/// Maps an assignment name onto a weight category.
pub trait Categorizer {
    fn categorize(&self, name: &str, breakdown: &GradeBreakdown) -> Option<String>;
}

/// Case-insensitive substring matching against breakdown keys, falling back
/// to keyword heuristics for the usual category names.
///
/// Substring containment is loose: a key such as `exam` also matches
/// "Example Essay". Swap in another [`Categorizer`] for stricter matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringCategorizer;

impl Categorizer for SubstringCategorizer {
    fn categorize(&self, name: &str, breakdown: &GradeBreakdown) -> Option<String> {
        let lowered = name.to_lowercase();

        // First key in syllabus order wins, not the most specific one.
        let direct = breakdown.iter().find(|(category, _)| {
            !category.trim().is_empty() && lowered.contains(&category.to_lowercase())
        });
        if let Some((category, _)) = direct {
            return Some(category.to_string());
        }

        fallback_category(&lowered).map(str::to_string)
    }
}

pub fn fallback_category(lowered: &str) -> Option<&'static str> {
    if lowered.contains("quiz") {
        Some("quizzes")
    } else if lowered.contains("homework") || lowered.contains("hw") {
        Some("homework")
    } else if lowered.contains("midterm") {
        if lowered.contains('1') {
            Some("midterm_1")
        } else if lowered.contains('2') {
            Some("midterm_2")
        } else {
            Some("midterm")
        }
    } else if lowered.contains("final") {
        Some("final")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(entries: &[(&str, &str)]) -> GradeBreakdown {
        entries.iter().copied().collect()
    }

    #[test]
    fn direct_match_beats_fallback() {
        let weights = breakdown(&[("Homework", "20%"), ("final", "80%")]);
        assert_eq!(
            SubstringCategorizer.categorize("Homework 3", &weights),
            Some("Homework".to_string())
        );
    }

    #[test]
    fn first_key_in_breakdown_order_wins() {
        let weights = breakdown(&[("project", "30%"), ("final project", "70%")]);
        assert_eq!(
            SubstringCategorizer.categorize("Final Project Report", &weights),
            Some("project".to_string())
        );
    }

    #[test]
    fn quiz_falls_back_to_quizzes() {
        let weights = breakdown(&[("homework", "20%")]);
        assert_eq!(
            SubstringCategorizer.categorize("Quiz 2", &weights),
            Some("quizzes".to_string())
        );
    }

    #[test]
    fn midterm_fallback_reads_the_number() {
        assert_eq!(fallback_category("midterm 1 review"), Some("midterm_1"));
        assert_eq!(fallback_category("midterm 2"), Some("midterm_2"));
        assert_eq!(fallback_category("midterm exam"), Some("midterm"));
        // "1" wins over "2" when both appear.
        assert_eq!(fallback_category("midterm 12"), Some("midterm_1"));
    }

    #[test]
    fn fallback_order_is_fixed() {
        assert_eq!(fallback_category("hw quiz"), Some("quizzes"));
        assert_eq!(fallback_category("hw5"), Some("homework"));
        assert_eq!(fallback_category("final midterm"), Some("midterm"));
        assert_eq!(fallback_category("final exam"), Some("final"));
    }

    #[test]
    fn unmatched_names_are_uncategorized() {
        let weights = breakdown(&[("homework", "20%")]);
        assert_eq!(SubstringCategorizer.categorize("Participation", &weights), None);
    }

    #[test]
    fn keys_match_with_their_surrounding_spaces() {
        let weights = breakdown(&[(" homework ", "20%")]);
        assert_eq!(
            SubstringCategorizer.categorize("Homework 3", &weights),
            Some("homework".to_string())
        );
        assert_eq!(
            SubstringCategorizer.categorize("Late homework submission", &weights),
            Some(" homework ".to_string())
        );
    }

    #[test]
    fn blank_keys_never_match() {
        let weights = breakdown(&[("  ", "10%")]);
        assert_eq!(SubstringCategorizer.categorize("Participation", &weights), None);
    }
}
