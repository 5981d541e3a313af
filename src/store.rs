use crate::analyzer::{self, Visit};
use crate::buckets::TimestampedEvent;
use crate::pagination::PageRange;
use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection, OptionalExt, Row};
use serde::Serialize;
use std::sync::{Arc, Mutex};

const POST_COLUMNS: &str = "id, title, slug, excerpt, content, published, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, post_id, author_name, content, approved, created_at";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub published: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Fields written on create and update. `slug` is already resolved.
#[derive(Clone, Debug)]
pub struct PostFields {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub published: bool,
}

#[derive(Debug)]
pub enum PostWrite {
    Saved(Post),
    NotFound,
    SlugTaken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_name: String,
    pub content: String,
    pub approved: bool,
    pub created_at: String,
}

pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self, anyhow::Error> {
        let conn = Connection::open(path).with_context(|| format!("open db {}", path))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, anyhow::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, anyhow::Error> {
        conn.execute_batch(
            "CREATE SEQUENCE IF NOT EXISTS posts_id_seq START 1;
             CREATE SEQUENCE IF NOT EXISTS comments_id_seq START 1;
             CREATE SEQUENCE IF NOT EXISTS visits_id_seq START 1;
             CREATE TABLE IF NOT EXISTS posts (
                 id         BIGINT NOT NULL,
                 title      VARCHAR NOT NULL,
                 slug       VARCHAR NOT NULL,
                 excerpt    VARCHAR,
                 content    VARCHAR NOT NULL,
                 published  BOOLEAN NOT NULL,
                 created_at VARCHAR NOT NULL,
                 updated_at VARCHAR
             );
             CREATE TABLE IF NOT EXISTS comments (
                 id          BIGINT NOT NULL,
                 post_id     BIGINT NOT NULL,
                 author_name VARCHAR NOT NULL,
                 content     VARCHAR NOT NULL,
                 approved    BOOLEAN NOT NULL,
                 created_at  VARCHAR NOT NULL
             );
             CREATE TABLE IF NOT EXISTS visits (
                 id          BIGINT NOT NULL,
                 created_at  VARCHAR NOT NULL,
                 path        VARCHAR,
                 country     VARCHAR,
                 device_type VARCHAR,
                 visitor     VARCHAR
             );",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn with_conn<T, F>(&self, func: F) -> Result<T, anyhow::Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, anyhow::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| anyhow!("db lock poisoned"))?;
            func(&mut *conn)
        })
        .await?
    }

    pub async fn create_post(
        &self,
        fields: PostFields,
        now: DateTime<Utc>,
    ) -> Result<PostWrite, anyhow::Error> {
        self.with_conn(move |conn| {
            if slug_owner(conn, &fields.slug)?.is_some() {
                return Ok(PostWrite::SlugTaken);
            }
            let id: i64 = conn.query_row("SELECT nextval('posts_id_seq')", [], |r| r.get(0))?;
            conn.execute(
                "INSERT INTO posts (id, title, slug, excerpt, content, published, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    fields.title,
                    fields.slug,
                    fields.excerpt,
                    fields.content,
                    fields.published,
                    timestamp(now),
                ],
            )?;
            let post = post_by(conn, "id = ?", id)?
                .ok_or_else(|| anyhow!("post {} vanished after insert", id))?;
            Ok(PostWrite::Saved(post))
        })
        .await
    }

    pub async fn update_post(
        &self,
        id: i64,
        fields: PostFields,
        now: DateTime<Utc>,
    ) -> Result<PostWrite, anyhow::Error> {
        self.with_conn(move |conn| {
            if post_by(conn, "id = ?", id)?.is_none() {
                return Ok(PostWrite::NotFound);
            }
            if slug_owner(conn, &fields.slug)?.is_some_and(|owner| owner != id) {
                return Ok(PostWrite::SlugTaken);
            }
            conn.execute(
                "UPDATE posts
                 SET title = ?, slug = ?, excerpt = ?, content = ?, published = ?, updated_at = ?
                 WHERE id = ?",
                params![
                    fields.title,
                    fields.slug,
                    fields.excerpt,
                    fields.content,
                    fields.published,
                    timestamp(now),
                    id,
                ],
            )?;
            match post_by(conn, "id = ?", id)? {
                Some(post) => Ok(PostWrite::Saved(post)),
                None => Ok(PostWrite::NotFound),
            }
        })
        .await
    }

    /// Deletes a post together with its comments.
    pub async fn delete_post(&self, id: i64) -> Result<bool, anyhow::Error> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM comments WHERE post_id = ?", params![id])?;
            let deleted = tx.execute("DELETE FROM posts WHERE id = ?", params![id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn list_posts(
        &self,
        range: PageRange,
        published_only: bool,
    ) -> Result<(Vec<Post>, i64), anyhow::Error> {
        let filter = if published_only { "WHERE published" } else { "" };
        let query = format!(
            "SELECT {} FROM posts {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS, filter
        );
        let count_query = format!("SELECT count(*) FROM posts {}", filter);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let posts = stmt
                .query_map(params![range.limit(), range.offset()], read_post)?
                .collect::<Result<Vec<_>, _>>()?;
            let total: i64 = conn.query_row(&count_query, [], |r| r.get(0))?;
            Ok((posts, total))
        })
        .await
    }

    pub async fn post_by_slug(
        &self,
        slug: &str,
        published_only: bool,
    ) -> Result<Option<Post>, anyhow::Error> {
        let slug = slug.to_string();
        let clause = if published_only {
            "slug = ? AND published"
        } else {
            "slug = ?"
        };
        self.with_conn(move |conn| post_by(conn, clause, slug)).await
    }

    pub async fn post_timestamps(&self) -> Result<Vec<TimestampedEvent>, anyhow::Error> {
        self.timestamps("SELECT created_at FROM posts").await
    }

    pub async fn create_comment(
        &self,
        post_id: i64,
        author_name: String,
        content: String,
        approved: bool,
        now: DateTime<Utc>,
    ) -> Result<Comment, anyhow::Error> {
        self.with_conn(move |conn| {
            let id: i64 =
                conn.query_row("SELECT nextval('comments_id_seq')", [], |r| r.get(0))?;
            let created_at = timestamp(now);
            conn.execute(
                "INSERT INTO comments (id, post_id, author_name, content, approved, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![id, post_id, author_name, content, approved, created_at],
            )?;
            Ok(Comment {
                id,
                post_id,
                author_name,
                content,
                approved,
                created_at,
            })
        })
        .await
    }

    pub async fn comments_for_post(
        &self,
        post_id: i64,
        approved_only: bool,
    ) -> Result<Vec<Comment>, anyhow::Error> {
        let query = format!(
            "SELECT {} FROM comments WHERE post_id = ? {} ORDER BY created_at, id",
            COMMENT_COLUMNS,
            if approved_only { "AND approved" } else { "" }
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let comments = stmt
                .query_map(params![post_id], read_comment)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(comments)
        })
        .await
    }

    /// Moderation queue, newest first.
    pub async fn list_comments(&self, range: PageRange) -> Result<(Vec<Comment>, i64), anyhow::Error> {
        let query = format!(
            "SELECT {} FROM comments ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            COMMENT_COLUMNS
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let comments = stmt
                .query_map(params![range.limit(), range.offset()], read_comment)?
                .collect::<Result<Vec<_>, _>>()?;
            let total: i64 = conn.query_row("SELECT count(*) FROM comments", [], |r| r.get(0))?;
            Ok((comments, total))
        })
        .await
    }

    pub async fn set_comment_approved(&self, id: i64, approved: bool) -> Result<bool, anyhow::Error> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE comments SET approved = ? WHERE id = ?",
                params![approved, id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn delete_comment(&self, id: i64) -> Result<bool, anyhow::Error> {
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn comment_timestamps(&self) -> Result<Vec<TimestampedEvent>, anyhow::Error> {
        self.timestamps("SELECT created_at FROM comments").await
    }

    pub async fn insert_visits(&self, visits: Vec<Visit>) -> Result<usize, anyhow::Error> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let count = visits.len();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO visits (id, created_at, path, country, device_type, visitor)
                     VALUES (nextval('visits_id_seq'), ?, ?, ?, ?, ?)",
                )?;
                for mut visit in visits {
                    analyzer::analyze(&mut visit);
                    stmt.execute(params![
                        visit.created_at,
                        null_str(&visit.path),
                        null_str(&visit.country),
                        null_str(&visit.device_type),
                        null_str(&visit.visitor),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(count)
        })
        .await
    }

    pub async fn visit_timestamps(&self) -> Result<Vec<TimestampedEvent>, anyhow::Error> {
        self.timestamps("SELECT created_at FROM visits").await
    }

    pub async fn visit_countries(&self) -> Result<Vec<Option<String>>, anyhow::Error> {
        self.column("SELECT country FROM visits ORDER BY id").await
    }

    pub async fn visit_devices(&self) -> Result<Vec<Option<String>>, anyhow::Error> {
        self.column("SELECT device_type FROM visits ORDER BY id").await
    }

    async fn timestamps(&self, query: &'static str) -> Result<Vec<TimestampedEvent>, anyhow::Error> {
        let rows = self.column(query).await?;
        Ok(rows
            .into_iter()
            .flatten()
            .map(TimestampedEvent::new)
            .collect())
    }

    async fn column(&self, query: &'static str) -> Result<Vec<Option<String>>, anyhow::Error> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(query)?;
            let values = stmt
                .query_map([], |row| row.get::<_, Option<String>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(values)
        })
        .await
    }
}

fn post_by<P: duckdb::ToSql>(
    conn: &Connection,
    clause: &str,
    param: P,
) -> Result<Option<Post>, anyhow::Error> {
    let query = format!("SELECT {} FROM posts WHERE {}", POST_COLUMNS, clause);
    let post = conn
        .query_row(&query, params![param], read_post)
        .optional()?;
    Ok(post)
}

fn slug_owner(conn: &Connection, slug: &str) -> Result<Option<i64>, anyhow::Error> {
    let id = conn
        .query_row("SELECT id FROM posts WHERE slug = ? LIMIT 1", params![slug], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(id)
}

fn read_post(row: &Row<'_>) -> duckdb::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        excerpt: row.get(3)?,
        content: row.get(4)?,
        published: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn read_comment(row: &Row<'_>) -> duckdb::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_name: row.get(2)?,
        content: row.get(3)?,
        approved: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn null_str(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
