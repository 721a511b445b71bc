use std::fmt::Write;

use crate::models::{AssignmentRecord, AssignmentSource, CourseProfile, PredictionResult};
use crate::predict::GradeAnalysis;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub source: AssignmentSource,
    pub count: usize,
    pub graded: usize,
}

pub fn summarize_by_source(assignments: &[AssignmentRecord]) -> Vec<SourceSummary> {
    [AssignmentSource::Canvas, AssignmentSource::Gradescope]
        .into_iter()
        .map(|source| {
            let records = assignments.iter().filter(|record| record.source == source);
            let (count, graded) = records.fold((0, 0), |(count, graded), record| {
                (count + 1, graded + usize::from(record.percent().is_some()))
            });
            SourceSummary {
                source,
                count,
                graded,
            }
        })
        .collect()
}

pub fn build_report(
    profile: &CourseProfile,
    assignments: &[AssignmentRecord],
    analysis: &GradeAnalysis,
    result: &PredictionResult,
) -> String {
    let mut output = String::new();
    let title = if profile.course_name.is_empty() {
        "Untitled course"
    } else {
        profile.course_name.as_str()
    };

    let _ = writeln!(output, "# {title}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Breakdown");

    match &profile.grade_breakdown {
        Some(breakdown) if !breakdown.is_empty() => {
            for (category, weight) in breakdown.iter() {
                let _ = writeln!(output, "- {category}: {weight}");
            }
        }
        _ => {
            let _ = writeln!(output, "No grade breakdown found in the syllabus.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assignments");
    for summary in summarize_by_source(assignments) {
        let _ = writeln!(
            output,
            "- {}: {} assignments ({} graded)",
            summary.source.as_str(),
            summary.count,
            summary.graded
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Averages");

    if analysis.categories.is_empty() {
        let _ = writeln!(output, "No graded assignments matched a category.");
    } else {
        for category in &analysis.categories {
            let weight = match category.weight {
                Some(weight) => format!("weight {weight:.1}%"),
                None => "not weighted".to_string(),
            };
            let _ = writeln!(
                output,
                "- {}: {:.1}% across {} assignments ({})",
                category.category, category.average, category.assignment_count, weight
            );
        }
    }

    if !analysis.uncategorized.is_empty() || analysis.ungraded_count > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Counted");
        if analysis.ungraded_count > 0 {
            let _ = writeln!(output, "- {} not yet graded", analysis.ungraded_count);
        }
        for name in &analysis.uncategorized {
            let _ = writeln!(output, "- {name} (no matching category)");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Predicted Grade");
    match result.predicted_grade {
        Some(grade) => {
            let _ = writeln!(output, "{grade:.1}% ({} style)", result.style.as_str());
        }
        None => {
            let _ = writeln!(output, "Not enough graded work to predict a grade.");
        }
    }

    output
}
