use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::aggregate::{self, AssignmentFeed, FeedError};
use crate::models::{
    CourseKey, CoursePredictionRequest, GradePlatform, GradePreferences, GradeStyle,
    PredictionResult,
};
use crate::predict;
use crate::store::{CourseProfileStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Preferences,
    PredictedGrade,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistStage::Preferences => f.write_str("grade preferences"),
            PersistStage::PredictedGrade => f.write_str("predicted grade"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no syllabus uploaded for {0}")]
    CourseNotFound(CourseKey),
    #[error("failed to load course: {0}")]
    Load(#[source] StoreError),
    #[error("failed to fetch assignments: {0}")]
    Fetch(#[from] FeedError),
    #[error("failed to save {stage}: {source}")]
    Persistence {
        stage: PersistStage,
        #[source]
        source: StoreError,
    },
}

/// Runs grade predictions for stored courses and writes the results back.
///
/// Requests for the same course run one at a time; different courses do not
/// block each other.
pub struct PredictionService<S, F> {
    store: S,
    feed: F,
    locks: Mutex<HashMap<CourseKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, F> PredictionService<S, F>
where
    S: CourseProfileStore,
    F: AssignmentFeed,
{
    pub fn new(store: S, feed: F) -> Self {
        Self {
            store,
            feed,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn course_lock(&self, key: &CourseKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the course's lock once no other request holds or awaits it.
    fn release_lock(&self, key: &CourseKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// Predicts a course grade and persists it.
    ///
    /// Preferences and grade are two separate writes. If the grade write
    /// fails the new preferences stay saved.
    pub async fn predict_course(
        &self,
        key: &CourseKey,
        style: GradeStyle,
        platform: GradePlatform,
    ) -> Result<PredictionResult, ServiceError> {
        let lock = self.course_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.predict_locked(key, style, platform).await
        };
        self.release_lock(key, lock);
        result
    }

    async fn predict_locked(
        &self,
        key: &CourseKey,
        style: GradeStyle,
        platform: GradePlatform,
    ) -> Result<PredictionResult, ServiceError> {
        let profile = self
            .store
            .fetch_course(key)
            .await
            .map_err(ServiceError::Load)?
            .ok_or_else(|| ServiceError::CourseNotFound(key.clone()))?;

        let assignments = aggregate::aggregate(&self.feed, key).await?;
        let request = CoursePredictionRequest {
            breakdown: profile.grade_breakdown,
            assignments,
            style,
        };
        let result = predict::predict(&request);

        info!(
            course = %key,
            style = style.as_str(),
            assignments = request.assignments.len(),
            grade = ?result.predicted_grade,
            "computed predicted grade"
        );

        self.store
            .update_preferences(key, GradePreferences { style, platform })
            .await
            .map_err(|source| persist_failure(key, PersistStage::Preferences, source))?;
        self.store
            .set_predicted_grade(key, result.predicted_grade)
            .await
            .map_err(|source| persist_failure(key, PersistStage::PredictedGrade, source))?;

        Ok(result)
    }
}

fn persist_failure(key: &CourseKey, stage: PersistStage, source: StoreError) -> ServiceError {
    warn!(course = %key, %stage, error = %source, "persisting prediction failed");
    ServiceError::Persistence { stage, source }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::aggregate::StaticFeed;
    use crate::models::{AssignmentRecord, AssignmentSource, CourseProfile, GradeBreakdown};
    use crate::store::MemoryStore;

    fn assignment(name: &str, score: f64, source: AssignmentSource) -> AssignmentRecord {
        AssignmentRecord {
            name: name.to_string(),
            score: Some(score),
            points_possible: Some(100.0),
            source,
        }
    }

    fn feed() -> StaticFeed {
        StaticFeed::new(vec![
            assignment("Homework 1", 90.0, AssignmentSource::Canvas),
            assignment("Final Exam", 70.0, AssignmentSource::Gradescope),
        ])
    }

    fn course() -> CourseProfile {
        let breakdown: GradeBreakdown = [("homework", "20%"), ("final", "80%")]
            .into_iter()
            .collect();
        CourseProfile {
            course_name: "CS 61A".to_string(),
            grade_breakdown: Some(breakdown),
            ..CourseProfile::default()
        }
    }

    async fn seeded_store(key: &CourseKey) -> MemoryStore {
        let store = MemoryStore::new();
        store.save_course(key, &course()).await.unwrap();
        store
    }

    /// Wraps the memory store and refuses grade writes on demand.
    struct FlakyGradeStore {
        inner: MemoryStore,
        fail_grade: AtomicBool,
    }

    impl CourseProfileStore for FlakyGradeStore {
        async fn fetch_course(&self, key: &CourseKey) -> Result<Option<CourseProfile>, StoreError> {
            self.inner.fetch_course(key).await
        }

        async fn save_course(
            &self,
            key: &CourseKey,
            profile: &CourseProfile,
        ) -> Result<(), StoreError> {
            self.inner.save_course(key, profile).await
        }

        async fn update_preferences(
            &self,
            key: &CourseKey,
            preferences: GradePreferences,
        ) -> Result<(), StoreError> {
            self.inner.update_preferences(key, preferences).await
        }

        async fn set_predicted_grade(
            &self,
            key: &CourseKey,
            grade: Option<f64>,
        ) -> Result<(), StoreError> {
            if self.fail_grade.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.set_predicted_grade(key, grade).await
        }
    }

    #[tokio::test]
    async fn predicts_and_persists_both_writes() {
        let key = CourseKey::new("user-1", "CS_61A");
        let service = PredictionService::new(seeded_store(&key).await, feed());

        let result = service
            .predict_course(&key, GradeStyle::Raw, GradePlatform::Canvas)
            .await
            .unwrap();
        let grade = result.predicted_grade.unwrap();
        assert!((grade - 74.0).abs() < 1e-9);

        let stored = service.store().fetch_course(&key).await.unwrap().unwrap();
        assert_eq!(stored.grade_style, GradeStyle::Raw);
        assert_eq!(stored.grade_platform, GradePlatform::Canvas);
        assert_eq!(stored.predicted_grade, Some(grade));
    }

    #[tokio::test]
    async fn curved_prediction_is_stored() {
        let key = CourseKey::new("user-1", "CS_61A");
        let service = PredictionService::new(seeded_store(&key).await, feed());

        let result = service
            .predict_course(&key, GradeStyle::Curved, GradePlatform::Both)
            .await
            .unwrap();
        assert_eq!(result.predicted_grade, Some(predict::CURVED_GRADE));
        let stored = service.store().fetch_course(&key).await.unwrap().unwrap();
        assert_eq!(stored.grade_style, GradeStyle::Curved);
    }

    #[tokio::test]
    async fn missing_course_is_reported() {
        let service = PredictionService::new(MemoryStore::new(), feed());
        let key = CourseKey::new("user-1", "CS_61A");
        let err = service
            .predict_course(&key, GradeStyle::Raw, GradePlatform::Both)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CourseNotFound(_)));
    }

    #[tokio::test]
    async fn grade_write_failure_keeps_saved_preferences() {
        let key = CourseKey::new("user-1", "CS_61A");
        let store = FlakyGradeStore {
            inner: seeded_store(&key).await,
            fail_grade: AtomicBool::new(true),
        };
        let service = PredictionService::new(store, feed());

        let err = service
            .predict_course(&key, GradeStyle::Curved, GradePlatform::Gradescope)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Persistence {
                stage: PersistStage::PredictedGrade,
                ..
            }
        ));

        let stored = service.store().fetch_course(&key).await.unwrap().unwrap();
        assert_eq!(stored.grade_style, GradeStyle::Curved);
        assert_eq!(stored.grade_platform, GradePlatform::Gradescope);
        assert_eq!(stored.predicted_grade, None);
    }

    /// Feed that records how many fetches overlap, per course and overall.
    #[derive(Default)]
    struct OverlapFeed {
        inner: StaticFeed,
        per_course: Mutex<HashMap<CourseKey, usize>>,
        max_per_course: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl AssignmentFeed for OverlapFeed {
        async fn fetch(
            &self,
            source: AssignmentSource,
            key: &CourseKey,
        ) -> Result<Vec<AssignmentRecord>, FeedError> {
            // Canvas and Gradescope are fetched together, so count one per request.
            let counted = source == AssignmentSource::Canvas;
            if counted {
                let now = {
                    let mut per_course = self.per_course.lock().unwrap();
                    let count = per_course.entry(key.clone()).or_default();
                    *count += 1;
                    *count
                };
                self.max_per_course.fetch_max(now, Ordering::SeqCst);
                let total = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(total, Ordering::SeqCst);
            }

            for _ in 0..5 {
                tokio::task::yield_now().await;
            }

            if counted {
                *self.per_course.lock().unwrap().get_mut(key).unwrap() -= 1;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            self.inner.fetch(source, key).await
        }
    }

    #[tokio::test]
    async fn same_course_requests_never_overlap() {
        let first = CourseKey::new("user-1", "CS_61A");
        let second = CourseKey::new("user-1", "MATH_54");
        let store = seeded_store(&first).await;
        store.save_course(&second, &course()).await.unwrap();
        let service = Arc::new(PredictionService::new(
            store,
            OverlapFeed {
                inner: feed(),
                ..OverlapFeed::default()
            },
        ));

        let mut handles = Vec::new();
        for round in 0..8 {
            let key = if round % 2 == 0 { first.clone() } else { second.clone() };
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .predict_course(&key, GradeStyle::Raw, GradePlatform::Both)
                    .await
                    .map(|result| result.predicted_grade)
            }));
        }
        for handle in handles {
            let grade = handle.await.unwrap().unwrap().unwrap();
            assert!((grade - 74.0).abs() < 1e-9);
        }

        assert_eq!(service.feed.max_per_course.load(Ordering::SeqCst), 1);
        assert_eq!(service.feed.max_in_flight.load(Ordering::SeqCst), 2);
        assert!(service.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finished_requests_release_their_course_lock() {
        let key = CourseKey::new("user-1", "CS_61A");
        let service = PredictionService::new(seeded_store(&key).await, feed());

        service
            .predict_course(&key, GradeStyle::Raw, GradePlatform::Both)
            .await
            .unwrap();
        let missing = CourseKey::new("user-1", "PHYS_7A");
        assert!(service
            .predict_course(&missing, GradeStyle::Raw, GradePlatform::Both)
            .await
            .is_err());

        assert!(service.locks.lock().unwrap().is_empty());
    }
}
