use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use super::store::{EntityStore, Mutation};
use crate::{
    error::{AppError, AppResult},
    models::{
        Director, EdgeChange, EntityId, FeedEvent, Film, FriendshipState, FriendshipStatus, Genre,
        Mpa, NewFeedEvent, NewFilm, NewReview, NewUser, Review, User,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Acquiring a connection gives up after `acquire_timeout`, which callers see
/// as `AppError::StorageUnavailable`.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Relational entity store. Every batch runs in its own transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    login: String,
    name: String,
    birthday: Option<NaiveDate>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            login: row.login,
            name: row.name,
            birthday: row.birthday,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FilmRow {
    id: i64,
    name: String,
    description: String,
    release_date: NaiveDate,
    duration: i32,
    mpa_id: i32,
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    content: String,
    user_id: i64,
    film_id: i64,
    is_positive: bool,
    useful: i64,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            content: row.content,
            user_id: row.user_id,
            film_id: row.film_id,
            is_positive: row.is_positive,
            useful: row.useful,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FeedRow {
    event_id: i64,
    created_at: DateTime<Utc>,
    user_id: i64,
    entity_id: i64,
    event_type: String,
    operation: String,
}

impl TryFrom<FeedRow> for FeedEvent {
    type Error = AppError;

    fn try_from(row: FeedRow) -> Result<Self, Self::Error> {
        Ok(FeedEvent {
            event_id: row.event_id,
            timestamp: row.created_at,
            user_id: row.user_id,
            entity_id: row.entity_id,
            event_type: row.event_type.parse()?,
            operation: row.operation.parse()?,
        })
    }
}

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.content, r.user_id, r.film_id, r.is_positive,
           COALESCE(SUM(CASE WHEN v.is_useful THEN 1 ELSE -1 END), 0)::BIGINT AS useful
    FROM reviews r
    LEFT JOIN review_votes v ON v.review_id = r.id
"#;

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches genres and directors to bare film rows
    async fn assemble_films(&self, rows: Vec<FilmRow>) -> AppResult<Vec<Film>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();

        let genre_rows: Vec<(i64, i32)> = sqlx::query_as(
            "SELECT film_id, genre_id FROM film_genres WHERE film_id = ANY($1)",
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let director_rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT fd.film_id, d.id, d.name
            FROM film_directors fd
            JOIN directors d ON d.id = fd.director_id
            WHERE fd.film_id = ANY($1)
            ORDER BY d.id
            "#,
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut genres: HashMap<i64, BTreeSet<Genre>> = HashMap::new();
        for (film_id, genre_id) in genre_rows {
            let genre = Genre::from_id(genre_id)
                .ok_or_else(|| AppError::Internal(format!("unknown genre id {}", genre_id)))?;
            genres.entry(film_id).or_default().insert(genre);
        }

        let mut directors: HashMap<i64, Vec<Director>> = HashMap::new();
        for (film_id, id, name) in director_rows {
            directors
                .entry(film_id)
                .or_default()
                .push(Director { id, name });
        }

        rows.into_iter()
            .map(|row| {
                let mpa = Mpa::from_id(row.mpa_id)
                    .ok_or_else(|| AppError::Internal(format!("unknown mpa id {}", row.mpa_id)))?;
                let duration = u32::try_from(row.duration)
                    .map_err(|_| AppError::Internal(format!("negative duration for film {}", row.id)))?;
                Ok(Film {
                    id: row.id,
                    name: row.name,
                    description: row.description,
                    release_date: row.release_date,
                    duration,
                    mpa,
                    genres: genres.remove(&row.id).unwrap_or_default(),
                    directors: directors.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn edge_status(
        conn: &mut PgConnection,
        from: EntityId,
        to: EntityId,
    ) -> AppResult<Option<FriendshipStatus>> {
        let status: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM friendships WHERE requester_id = $1 AND target_id = $2",
        )
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *conn)
        .await?;

        status.map(|(status,)| status.parse()).transpose()
    }

    async fn write_edge(conn: &mut PgConnection, change: EdgeChange) -> AppResult<()> {
        match change {
            EdgeChange::Put { from, to, status } => {
                sqlx::query(
                    r#"
                    INSERT INTO friendships (requester_id, target_id, status)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (requester_id, target_id) DO UPDATE SET status = EXCLUDED.status
                    "#,
                )
                .bind(from)
                .bind(to)
                .bind(status.as_str())
                .execute(&mut *conn)
                .await?;
            }
            EdgeChange::Delete { from, to } => {
                sqlx::query("DELETE FROM friendships WHERE requester_id = $1 AND target_id = $2")
                    .bind(from)
                    .bind(to)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn write(conn: &mut PgConnection, mutation: Mutation) -> AppResult<()> {
        match mutation {
            Mutation::Edge(change) => Self::write_edge(conn, change).await?,
            Mutation::RequestFriend { from, to } => {
                // Held until commit; crossing requests for the pair queue here
                sqlx::query(
                    r#"
                    SELECT pg_advisory_xact_lock(
                        hashtextextended(LEAST($1, $2)::TEXT || ':' || GREATEST($1, $2)::TEXT, 0)
                    )
                    "#,
                )
                .bind(from)
                .bind(to)
                .execute(&mut *conn)
                .await?;

                let forward = Self::edge_status(conn, from, to).await?;
                let backward = Self::edge_status(conn, to, from).await?;
                for change in FriendshipState::from_edges(forward, backward).on_request(from, to) {
                    Self::write_edge(conn, change).await?;
                }
            }
            Mutation::PutLike(like) => {
                sqlx::query(
                    r#"
                    INSERT INTO likes (user_id, film_id, score)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (user_id, film_id) DO UPDATE SET score = EXCLUDED.score
                    "#,
                )
                .bind(like.user_id)
                .bind(like.film_id)
                .bind(like.score)
                .execute(&mut *conn)
                .await?;
            }
            Mutation::DeleteLike { user_id, film_id } => {
                sqlx::query("DELETE FROM likes WHERE user_id = $1 AND film_id = $2")
                    .bind(user_id)
                    .bind(film_id)
                    .execute(&mut *conn)
                    .await?;
            }
            Mutation::UpdateReview {
                review_id,
                content,
                is_positive,
            } => {
                let result =
                    sqlx::query("UPDATE reviews SET content = $2, is_positive = $3 WHERE id = $1")
                        .bind(review_id)
                        .bind(content)
                        .bind(is_positive)
                        .execute(&mut *conn)
                        .await?;
                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound(format!("review {} not found", review_id)));
                }
            }
            Mutation::DeleteReview { review_id } => {
                let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
                    .bind(review_id)
                    .execute(&mut *conn)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(AppError::NotFound(format!("review {} not found", review_id)));
                }
            }
            Mutation::PutReviewVote {
                review_id,
                user_id,
                vote,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO review_votes (review_id, user_id, is_useful)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (review_id, user_id) DO UPDATE SET is_useful = EXCLUDED.is_useful
                    "#,
                )
                .bind(review_id)
                .bind(user_id)
                .bind(vote.is_useful())
                .execute(&mut *conn)
                .await?;
            }
            Mutation::DeleteReviewVote {
                review_id,
                user_id,
                vote,
            } => {
                sqlx::query(
                    "DELETE FROM review_votes WHERE review_id = $1 AND user_id = $2 AND is_useful = $3",
                )
                .bind(review_id)
                .bind(user_id)
                .bind(vote.is_useful())
                .execute(&mut *conn)
                .await?;
            }
        }
        Ok(())
    }

    async fn append(conn: &mut PgConnection, event: NewFeedEvent) -> AppResult<FeedEvent> {
        let (event_id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO feed_events (user_id, entity_id, event_type, operation)
            VALUES ($1, $2, $3, $4)
            RETURNING event_id, created_at
            "#,
        )
        .bind(event.user_id)
        .bind(event.entity_id)
        .bind(event.event_type.as_str())
        .bind(event.operation.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(event.into_event(event_id, created_at))
    }
}

#[async_trait::async_trait]
impl EntityStore for PgStore {
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let name = user.display_name();
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (email, login, name, birthday)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, login, name, birthday
            "#,
        )
        .bind(&user.email)
        .bind(&user.login)
        .bind(&name)
        .bind(user.birthday)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_user(&self, id: EntityId) -> AppResult<User> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, login, name, birthday FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(User::from).ok_or_else(|| AppError::user_not_found(id))
    }

    async fn create_film(&self, film: NewFilm) -> AppResult<Film> {
        let duration = i32::try_from(film.duration)
            .map_err(|_| AppError::Validation("duration is too large".to_string()))?;
        let director_ids: Vec<i64> = film.director_ids.iter().copied().collect();

        let mut tx = self.pool.begin().await?;

        let known: Vec<(i64,)> = sqlx::query_as("SELECT id FROM directors WHERE id = ANY($1)")
            .bind(&director_ids[..])
            .fetch_all(&mut *tx)
            .await?;
        let known: BTreeSet<i64> = known.into_iter().map(|(id,)| id).collect();
        if let Some(missing) = director_ids.iter().find(|id| !known.contains(id)) {
            return Err(AppError::NotFound(format!("director {} not found", missing)));
        }

        let (film_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO films (name, description, release_date, duration, mpa_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&film.name)
        .bind(&film.description)
        .bind(film.release_date)
        .bind(duration)
        .bind(film.mpa.id())
        .fetch_one(&mut *tx)
        .await?;

        for genre in &film.genres {
            sqlx::query("INSERT INTO film_genres (film_id, genre_id) VALUES ($1, $2)")
                .bind(film_id)
                .bind(genre.id())
                .execute(&mut *tx)
                .await?;
        }

        for director_id in &director_ids {
            sqlx::query("INSERT INTO film_directors (film_id, director_id) VALUES ($1, $2)")
                .bind(film_id)
                .bind(director_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(film_id, "Film inserted");
        self.get_film(film_id).await
    }

    async fn get_film(&self, id: EntityId) -> AppResult<Film> {
        let rows: Vec<FilmRow> = sqlx::query_as(
            "SELECT id, name, description, release_date, duration, mpa_id FROM films WHERE id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        self.assemble_films(rows)
            .await?
            .pop()
            .ok_or_else(|| AppError::film_not_found(id))
    }

    async fn list_films(&self) -> AppResult<Vec<Film>> {
        let rows: Vec<FilmRow> = sqlx::query_as(
            "SELECT id, name, description, release_date, duration, mpa_id FROM films ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        self.assemble_films(rows).await
    }

    async fn create_director(&self, name: String) -> AppResult<Director> {
        let (id,): (i64,) = sqlx::query_as("INSERT INTO directors (name) VALUES ($1) RETURNING id")
            .bind(&name)
            .fetch_one(&self.pool)
            .await?;

        Ok(Director { id, name })
    }

    async fn delete_director(&self, id: EntityId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM directors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("director {} not found", id)));
        }
        Ok(())
    }

    async fn list_directors(&self) -> AppResult<Vec<Director>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM directors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Director { id, name })
            .collect())
    }

    async fn get_friend_edge(
        &self,
        from: EntityId,
        to: EntityId,
    ) -> AppResult<Option<FriendshipStatus>> {
        let mut conn = self.pool.acquire().await?;
        Self::edge_status(&mut conn, from, to).await
    }

    async fn list_outgoing_edges(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT target_id FROM friendships WHERE requester_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_like_counts(&self) -> AppResult<HashMap<EntityId, i64>> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT film_id, COUNT(*) FROM likes GROUP BY film_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn get_liked_film_ids(&self, user_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT film_id FROM likes WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn list_users_who_liked(&self, film_id: EntityId) -> AppResult<BTreeSet<EntityId>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT user_id FROM likes WHERE film_id = $1")
            .bind(film_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn get_review(&self, id: EntityId) -> AppResult<Review> {
        let query = format!("{} WHERE r.id = $1 GROUP BY r.id", REVIEW_SELECT);
        let row: Option<ReviewRow> = sqlx::query_as(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Review::from)
            .ok_or_else(|| AppError::NotFound(format!("review {} not found", id)))
    }

    async fn list_reviews(
        &self,
        film_id: Option<EntityId>,
        limit: usize,
    ) -> AppResult<Vec<Review>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = format!(
            "{} WHERE ($1::BIGINT IS NULL OR r.film_id = $1) GROUP BY r.id ORDER BY useful DESC, r.id ASC LIMIT $2",
            REVIEW_SELECT
        );
        let rows: Vec<ReviewRow> = sqlx::query_as(&query)
            .bind(film_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn insert_review(
        &self,
        review: NewReview,
        event: NewFeedEvent,
    ) -> AppResult<(Review, FeedEvent)> {
        let mut tx = self.pool.begin().await?;

        let (review_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO reviews (content, user_id, film_id, is_positive)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&review.content)
        .bind(review.user_id)
        .bind(review.film_id)
        .bind(review.is_positive)
        .fetch_one(&mut *tx)
        .await?;

        let event = Self::append(
            &mut tx,
            NewFeedEvent {
                entity_id: review_id,
                ..event
            },
        )
        .await?;

        tx.commit().await?;

        Ok((review.into_review(review_id), event))
    }

    async fn commit(
        &self,
        mutations: Vec<Mutation>,
        event: NewFeedEvent,
    ) -> AppResult<FeedEvent> {
        let mut tx = self.pool.begin().await?;
        for mutation in mutations {
            Self::write(&mut tx, mutation).await?;
        }
        let event = Self::append(&mut tx, event).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        for mutation in mutations {
            Self::write(&mut tx, mutation).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_feed_event(&self, event: NewFeedEvent) -> AppResult<FeedEvent> {
        let mut conn = self.pool.acquire().await?;
        Self::append(&mut conn, event).await
    }

    async fn query_feed_events(&self, user_id: EntityId) -> AppResult<Vec<FeedEvent>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
            SELECT event_id, created_at, user_id, entity_id, event_type, operation
            FROM feed_events
            WHERE user_id = $1
            ORDER BY created_at ASC, event_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FeedEvent::try_from).collect()
    }
}
