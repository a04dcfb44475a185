use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::models::post::PostRow;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only access to published posts. The ranking engine never writes through this.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// `Ok(None)` when the post does not exist or is no longer published.
    async fn get_by_id(&self, post_id: i64) -> Result<Option<PostRow>, RepositoryError>;

    /// The `n` most recently created published posts, newest first.
    async fn list_latest(&self, n: usize) -> Result<Vec<PostRow>, RepositoryError>;
}

const POST_COLUMNS: &str = r#"
    SELECT p.post_id,
           p.user_id,
           p.title,
           c.name AS category_name,
           u.username,
           u.avatar,
           p.view_count::BIGINT AS view_count,
           p.like_count::BIGINT AS like_count,
           p.comment_count::BIGINT AS comment_count,
           p.share_count::BIGINT AS share_count,
           p.created_at
    FROM post p
    LEFT JOIN student_user u ON p.user_id = u.user_id
    LEFT JOIN category c ON p.category_id = c.category_id
    WHERE p.status = 'PUBLISHED'
"#;

#[derive(Clone)]
pub struct PgPostRepository {
    pool: PgPool,
}

impl PgPostRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn get_by_id(&self, post_id: i64) -> Result<Option<PostRow>, RepositoryError> {
        let row = sqlx::query_as::<_, PostRow>(&format!("{POST_COLUMNS} AND p.post_id = $1"))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_latest(&self, n: usize) -> Result<Vec<PostRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "{POST_COLUMNS} ORDER BY p.created_at DESC, p.post_id DESC LIMIT $1"
        ))
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
