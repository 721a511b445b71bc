use std::collections::HashMap;

use crate::categorize::{Categorizer, SubstringCategorizer};
use crate::models::{
    AssignmentRecord, CoursePredictionRequest, GradeBreakdown, GradeStyle, PredictionResult,
};

/// Grade reported under the curved style.
///
/// Placeholder policy: assumes B-level standing instead of computing a curve
/// from class statistics.
pub const CURVED_GRADE: f64 = 85.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAverage {
    pub category: String,
    pub average: f64,
    pub assignment_count: usize,
    /// Parsed breakdown weight; `None` when the category has no usable weight.
    pub weight: Option<f64>,
}

/// Intermediate detail behind a prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeAnalysis {
    pub categories: Vec<CategoryAverage>,
    pub ungraded_count: usize,
    pub uncategorized: Vec<String>,
    pub used_weight: f64,
    pub raw_grade: Option<f64>,
}

pub fn predict(request: &CoursePredictionRequest) -> PredictionResult {
    predict_with(&SubstringCategorizer, request)
}

pub fn predict_with<C: Categorizer>(
    categorizer: &C,
    request: &CoursePredictionRequest,
) -> PredictionResult {
    let raw_grade = match &request.breakdown {
        Some(breakdown) => analyze_with(categorizer, breakdown, &request.assignments).raw_grade,
        None => None,
    };

    PredictionResult {
        predicted_grade: apply_style(raw_grade, request.style),
        style: request.style,
    }
}

pub fn apply_style(raw_grade: Option<f64>, style: GradeStyle) -> Option<f64> {
    match style {
        GradeStyle::Raw => raw_grade,
        GradeStyle::Curved => raw_grade.map(|_| CURVED_GRADE),
    }
}

pub fn analyze(breakdown: &GradeBreakdown, assignments: &[AssignmentRecord]) -> GradeAnalysis {
    analyze_with(&SubstringCategorizer, breakdown, assignments)
}

pub fn analyze_with<C: Categorizer>(
    categorizer: &C,
    breakdown: &GradeBreakdown,
    assignments: &[AssignmentRecord],
) -> GradeAnalysis {
    let mut analysis = GradeAnalysis::default();
    if breakdown.is_empty() || assignments.is_empty() {
        return analysis;
    }

    let mut scores: HashMap<String, Vec<f64>> = HashMap::new();
    for assignment in assignments {
        let Some(percent) = assignment.percent() else {
            analysis.ungraded_count += 1;
            continue;
        };

        match categorizer.categorize(&assignment.name, breakdown) {
            Some(category) => scores.entry(category).or_default().push(percent),
            None => analysis.uncategorized.push(assignment.name.clone()),
        }
    }

    for (category, percents) in scores {
        let average = percents.iter().sum::<f64>() / percents.len() as f64;
        let weight = breakdown.get(&category).and_then(parse_weight);
        analysis.categories.push(CategoryAverage {
            category,
            average,
            assignment_count: percents.len(),
            weight,
        });
    }

    analysis.categories.sort_by(|a, b| {
        let rank = |category: &str| {
            breakdown
                .iter()
                .position(|(key, _)| key == category)
                .unwrap_or(usize::MAX)
        };
        rank(&a.category)
            .cmp(&rank(&b.category))
            .then_with(|| a.category.cmp(&b.category))
    });

    // Summed in breakdown order so repeated calls round identically.
    let mut weighted_sum = 0.0;
    for category in &analysis.categories {
        if let Some(weight) = category.weight {
            weighted_sum += category.average * weight;
            analysis.used_weight += weight;
        }
    }

    if analysis.used_weight > 0.0 {
        analysis.raw_grade = Some(weighted_sum / analysis.used_weight);
    }

    analysis
}

/// Reads a weight such as `"20%"`. Anything that is not a finite,
/// non-negative number is rejected.
pub fn parse_weight(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|weight| weight.is_finite() && *weight >= 0.0)
}
