use std::future::Future;

use tracing::debug;

use crate::models::{AssignmentRecord, AssignmentSource, CourseKey};

/// Pulls one platform's assignment list for a course.
pub trait AssignmentFeed: Send + Sync {
    fn fetch(
        &self,
        source: AssignmentSource,
        key: &CourseKey,
    ) -> impl Future<Output = Result<Vec<AssignmentRecord>, FeedError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("{source_name} fetch failed: {message}")]
    Platform {
        source_name: &'static str,
        message: String,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fetches Canvas and Gradescope together and concatenates them, Canvas
/// first. Either failure fails the whole fetch.
pub async fn aggregate<F: AssignmentFeed>(
    feed: &F,
    key: &CourseKey,
) -> Result<Vec<AssignmentRecord>, FeedError> {
    let (mut canvas, gradescope) = tokio::try_join!(
        feed.fetch(AssignmentSource::Canvas, key),
        feed.fetch(AssignmentSource::Gradescope, key),
    )?;

    debug!(
        course = %key,
        canvas = canvas.len(),
        gradescope = gradescope.len(),
        "merged assignment feeds"
    );

    canvas.extend(gradescope);
    Ok(canvas)
}

/// Feed over records already held in memory, filtered by source.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    records: Vec<AssignmentRecord>,
}

impl StaticFeed {
    pub fn new(records: Vec<AssignmentRecord>) -> Self {
        Self { records }
    }
}

impl AssignmentFeed for StaticFeed {
    async fn fetch(
        &self,
        source: AssignmentSource,
        _key: &CourseKey,
    ) -> Result<Vec<AssignmentRecord>, FeedError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.source == source)
            .cloned()
            .collect())
    }
}
