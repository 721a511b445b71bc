use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifies one course profile belonging to one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CourseKey {
    pub user_id: String,
    pub course: String,
}

impl CourseKey {
    pub fn new(user_id: impl Into<String>, course: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            course: course.into(),
        }
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.course)
    }
}

/// Syllabus-declared weights, kept in the order the syllabus listed them.
///
/// Category matching walks the entries front to back, so order is part of
/// the contract and survives a JSON round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeBreakdown {
    entries: Vec<(String, String)>,
}

impl GradeBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the weight of an existing category in place, otherwise appends.
    pub fn insert(&mut self, category: impl Into<String>, weight: impl Into<String>) {
        let category = category.into();
        let weight = weight.into();
        match self.entries.iter_mut().find(|(key, _)| *key == category) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((category, weight)),
        }
    }

    pub fn get(&self, category: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == category)
            .map(|(_, weight)| weight.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, weight)| (key.as_str(), weight.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for GradeBreakdown
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut breakdown = GradeBreakdown::new();
        for (category, weight) in iter {
            breakdown.insert(category, weight);
        }
        breakdown
    }
}

impl Serialize for GradeBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (category, weight) in &self.entries {
            map.serialize_entry(category, weight)?;
        }
        map.end()
    }
}

// Syllabus parsers sometimes emit bare numbers instead of "20%" strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WeightValue {
    Text(String),
    Number(f64),
}

impl WeightValue {
    fn into_text(self) -> String {
        match self {
            WeightValue::Text(text) => text,
            WeightValue::Number(number) => number.to_string(),
        }
    }
}

struct BreakdownVisitor;

impl<'de> Visitor<'de> for BreakdownVisitor {
    type Value = GradeBreakdown;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of category names to weights")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut breakdown = GradeBreakdown::new();
        while let Some((category, weight)) = access.next_entry::<String, WeightValue>()? {
            breakdown.insert(category, weight.into_text());
        }
        Ok(breakdown)
    }
}

impl<'de> Deserialize<'de> for GradeBreakdown {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(BreakdownVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentSource {
    Canvas,
    Gradescope,
}

impl AssignmentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentSource::Canvas => "canvas",
            AssignmentSource::Gradescope => "gradescope",
        }
    }
}

impl FromStr for AssignmentSource {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "canvas" => Ok(Self::Canvas),
            "gradescope" => Ok(Self::Gradescope),
            other => Err(UnknownVariant::new("assignment source", other)),
        }
    }
}

/// One unit of coursework as reported by a grading platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub name: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    pub source: AssignmentSource,
}

impl AssignmentRecord {
    /// Percentage earned, or `None` when the record is ungraded or malformed.
    /// Bonus credit above 100% is kept.
    pub fn percent(&self) -> Option<f64> {
        let score = self.score.filter(|value| value.is_finite())?;
        let possible = self
            .points_possible
            .filter(|value| value.is_finite() && *value > 0.0)?;
        Some(score / possible * 100.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStyle {
    #[default]
    Raw,
    Curved,
}

impl GradeStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            GradeStyle::Raw => "raw",
            GradeStyle::Curved => "curved",
        }
    }
}

impl FromStr for GradeStyle {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "curved" => Ok(Self::Curved),
            other => Err(UnknownVariant::new("grade style", other)),
        }
    }
}

/// Which platform the student prefers to see. Aggregation ignores it and
/// always merges both sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradePlatform {
    Canvas,
    Gradescope,
    #[default]
    Both,
}

impl GradePlatform {
    pub fn as_str(self) -> &'static str {
        match self {
            GradePlatform::Canvas => "canvas",
            GradePlatform::Gradescope => "gradescope",
            GradePlatform::Both => "both",
        }
    }
}

impl FromStr for GradePlatform {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "canvas" => Ok(Self::Canvas),
            "gradescope" => Ok(Self::Gradescope),
            "both" => Ok(Self::Both),
            other => Err(UnknownVariant::new("grade platform", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Grading preferences the student picks on the course screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradePreferences {
    pub style: GradeStyle,
    pub platform: GradePlatform,
}

/// Everything the predictor needs for one course, passed by value.
#[derive(Debug, Clone, Default)]
pub struct CoursePredictionRequest {
    pub breakdown: Option<GradeBreakdown>,
    pub assignments: Vec<AssignmentRecord>,
    pub style: GradeStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub predicted_grade: Option<f64>,
    pub style: GradeStyle,
}

/// Parsed syllabus document plus the grading state stored alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseProfile {
    #[serde(default)]
    pub course_name: String,
    #[serde(default)]
    pub emails: serde_json::Value,
    #[serde(default)]
    pub grade_breakdown: Option<GradeBreakdown>,
    #[serde(default)]
    pub important_dates: serde_json::Value,
    #[serde(default)]
    pub office_hours: serde_json::Value,
    #[serde(default)]
    pub grade_style: GradeStyle,
    #[serde(default)]
    pub grade_platform: GradePlatform,
    #[serde(default)]
    pub predicted_grade: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One row of a student's course list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseSummary {
    pub course: String,
    pub course_name: String,
    pub grade_style: GradeStyle,
    pub predicted_grade: Option<f64>,
}
