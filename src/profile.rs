use serde::{Deserialize, Serialize};

pub const MIN_GRADUATION_YEAR: i32 = 2023;
pub const MAX_GRADUATION_YEAR: i32 = 3000;
pub const MAX_GPA: f64 = 4.0;

/// Personal and academic details collected during onboarding.
///
/// GPA and graduation year stay as entered; they are optional and only
/// checked when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub majors: Vec<String>,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub gpa: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<String>,
    #[serde(default)]
    pub bcourses_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileIssue {
    #[error("first name is required")]
    MissingFirstName,
    #[error("last name is required")]
    MissingLastName,
    #[error("profile picture is required")]
    MissingProfileImage,
    #[error("select at least one major")]
    NoMajors,
    #[error("graduation year must be between 2023 and 3000")]
    InvalidGraduationYear,
    #[error("GPA must be between 0 and 4.0")]
    InvalidGpa,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid profile: {}", describe(.0))]
pub struct ProfileError(pub Vec<ProfileIssue>);

fn describe(issues: &[ProfileIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StudentProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    pub fn graduation_year_value(&self) -> Option<i32> {
        present(&self.graduation_year).and_then(|value| value.parse().ok())
    }

    pub fn gpa_value(&self) -> Option<f64> {
        present(&self.gpa).and_then(|value| value.parse().ok())
    }

    /// Collects every failing field rather than stopping at the first.
    pub fn issues(&self) -> Vec<ProfileIssue> {
        let mut issues = Vec::new();

        if self.first_name.trim().is_empty() {
            issues.push(ProfileIssue::MissingFirstName);
        }
        if self.last_name.trim().is_empty() {
            issues.push(ProfileIssue::MissingLastName);
        }
        if present(&self.profile_image).is_none() {
            issues.push(ProfileIssue::MissingProfileImage);
        }
        if self.majors.iter().all(|major| major.trim().is_empty()) {
            issues.push(ProfileIssue::NoMajors);
        }
        if present(&self.graduation_year).is_some() {
            let valid = self
                .graduation_year_value()
                .is_some_and(|year| (MIN_GRADUATION_YEAR..=MAX_GRADUATION_YEAR).contains(&year));
            if !valid {
                issues.push(ProfileIssue::InvalidGraduationYear);
            }
        }
        if present(&self.gpa).is_some() {
            let valid = self
                .gpa_value()
                .is_some_and(|gpa| (0.0..=MAX_GPA).contains(&gpa));
            if !valid {
                issues.push(ProfileIssue::InvalidGpa);
            }
        }

        issues
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ProfileError(issues))
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> StudentProfile {
        StudentProfile {
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            profile_image: Some("file:///avatar.png".to_string()),
            majors: vec!["Computer Science".to_string()],
            departments: vec!["EECS".to_string()],
            gpa: Some("3.7".to_string()),
            graduation_year: Some("2027".to_string()),
            bcourses_token: None,
        }
    }

    #[test]
    fn complete_profile_is_valid() {
        assert!(complete().validate().is_ok());
        assert_eq!(complete().full_name(), "Avery Lee");
    }

    #[test]
    fn optional_fields_may_be_blank() {
        let profile = StudentProfile {
            gpa: Some(" ".to_string()),
            graduation_year: None,
            ..complete()
        };
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn reports_every_missing_field() {
        let profile = StudentProfile {
            first_name: "  ".to_string(),
            last_name: String::new(),
            profile_image: None,
            majors: Vec::new(),
            ..complete()
        };
        assert_eq!(
            profile.issues(),
            vec![
                ProfileIssue::MissingFirstName,
                ProfileIssue::MissingLastName,
                ProfileIssue::MissingProfileImage,
                ProfileIssue::NoMajors,
            ]
        );
    }

    #[test]
    fn graduation_year_range_is_enforced() {
        for year in ["2022", "3001", "soon"] {
            let profile = StudentProfile {
                graduation_year: Some(year.to_string()),
                ..complete()
            };
            assert_eq!(profile.issues(), vec![ProfileIssue::InvalidGraduationYear]);
        }
        let edge = StudentProfile {
            graduation_year: Some("2023".to_string()),
            ..complete()
        };
        assert!(edge.issues().is_empty());
    }

    #[test]
    fn gpa_range_is_enforced() {
        for gpa in ["4.1", "-0.5", "A"] {
            let profile = StudentProfile {
                gpa: Some(gpa.to_string()),
                ..complete()
            };
            assert_eq!(profile.issues(), vec![ProfileIssue::InvalidGpa]);
        }
    }

    #[test]
    fn error_message_lists_issues() {
        let profile = StudentProfile {
            majors: Vec::new(),
            gpa: Some("5".to_string()),
            ..complete()
        };
        let err = profile.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid profile: select at least one major; GPA must be between 0 and 4.0"
        );
    }
}
