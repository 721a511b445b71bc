use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::Utc;

use crate::models::{CourseKey, CourseProfile, GradePreferences};

/// Per-user, per-course storage for parsed syllabi and grading state.
pub trait CourseProfileStore: Send + Sync {
    fn fetch_course(
        &self,
        key: &CourseKey,
    ) -> impl Future<Output = Result<Option<CourseProfile>, StoreError>> + Send;

    /// Stores a freshly parsed syllabus, replacing whatever was there.
    fn save_course(
        &self,
        key: &CourseKey,
        profile: &CourseProfile,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_preferences(
        &self,
        key: &CourseKey,
        preferences: GradePreferences,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_predicted_grade(
        &self,
        key: &CourseKey,
        grade: Option<f64>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("course {0} not found")]
    NotFound(CourseKey),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

/// Process-local store, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    courses: Mutex<HashMap<CourseKey, CourseProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_courses<T>(
        &self,
        f: impl FnOnce(&mut HashMap<CourseKey, CourseProfile>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut courses = self
            .courses
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))?;
        f(&mut courses)
    }

    fn with_course(
        &self,
        key: &CourseKey,
        f: impl FnOnce(&mut CourseProfile),
    ) -> Result<(), StoreError> {
        self.with_courses(|courses| {
            let profile = courses
                .get_mut(key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;
            f(profile);
            profile.updated_at = Some(Utc::now());
            Ok(())
        })
    }
}

impl CourseProfileStore for MemoryStore {
    async fn fetch_course(&self, key: &CourseKey) -> Result<Option<CourseProfile>, StoreError> {
        self.with_courses(|courses| Ok(courses.get(key).cloned()))
    }

    async fn save_course(&self, key: &CourseKey, profile: &CourseProfile) -> Result<(), StoreError> {
        self.with_courses(|courses| {
            let mut stored = profile.clone();
            stored.updated_at = Some(Utc::now());
            courses.insert(key.clone(), stored);
            Ok(())
        })
    }

    async fn update_preferences(
        &self,
        key: &CourseKey,
        preferences: GradePreferences,
    ) -> Result<(), StoreError> {
        self.with_course(key, |profile| {
            profile.grade_style = preferences.style;
            profile.grade_platform = preferences.platform;
        })
    }

    async fn set_predicted_grade(&self, key: &CourseKey, grade: Option<f64>) -> Result<(), StoreError> {
        self.with_course(key, |profile| profile.predicted_grade = grade)
    }
}
