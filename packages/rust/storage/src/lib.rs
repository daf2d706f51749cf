//! libSQL storage layer for paragraphs and their generated questions.
//!
//! The [`Storage`] struct wraps an embedded libSQL database. Content
//! management writes (insert, edit, delete) and generation writes (status
//! transitions, question-set swaps) both go through it.
//!
//! **Consistency rules:**
//! - `content_hash` always reflects the current sanitized content.
//! - Generation writes only land while the paragraph's `content_hash` and
//!   recorded `content_version` both equal the attempt's version.
//! - A question set is swapped inside one transaction, so readers see either
//!   the old set or the new one.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use studyqa_shared::{
    Answer, ContentVersion, FailureReason, GenerationStatus, MAX_NUM_QUESTIONS, Paragraph,
    ParagraphId, QaPair, Question, ReplaceOutcome, Result, StudyQaError,
};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PARAGRAPH_COLUMNS: &str = "id, content, num_questions, content_hash, content_version, \
     generation_status, failure_reason, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
    readonly: bool,
    /// Serializes multi-statement transactions opened on side connections.
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StudyQaError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StudyQaError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(StudyQaError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// A fresh connection for a transaction, isolated from readers on `conn`.
    fn side_connection(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(db_err)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Paragraph content operations
    // -----------------------------------------------------------------------

    /// Insert a new paragraph. Generation state starts at `none`.
    pub async fn insert_paragraph(&self, content: &str, num_questions: u8) -> Result<Paragraph> {
        self.check_writable()?;
        check_num_questions(num_questions)?;

        let id = ParagraphId::new();
        let hash = studyqa_sanitize::content_version(content);
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO paragraphs (id, content, num_questions, content_hash, generation_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.to_string(),
                    content,
                    i64::from(num_questions),
                    hash.as_str(),
                    GenerationStatus::None.as_str(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(db_err)?;

        debug!(paragraph_id = %id, content_hash = hash.short(), "inserted paragraph");
        self.require_paragraph(&id).await
    }

    /// Replace a paragraph's content and refresh its fingerprint.
    pub async fn update_content(&self, id: &ParagraphId, content: &str) -> Result<Paragraph> {
        self.check_writable()?;
        let hash = studyqa_sanitize::content_version(content);
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE paragraphs SET content = ?1, content_hash = ?2, updated_at = ?3 WHERE id = ?4",
                params![content, hash.as_str(), now.as_str(), id.to_string()],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(StudyQaError::not_found("paragraph", id));
        }
        debug!(paragraph_id = %id, content_hash = hash.short(), "updated paragraph content");
        self.require_paragraph(id).await
    }

    /// Change how many questions a paragraph asks for.
    pub async fn set_num_questions(&self, id: &ParagraphId, num_questions: u8) -> Result<Paragraph> {
        self.check_writable()?;
        check_num_questions(num_questions)?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE paragraphs SET num_questions = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(num_questions), now.as_str(), id.to_string()],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(StudyQaError::not_found("paragraph", id));
        }
        self.require_paragraph(id).await
    }

    /// Get a paragraph by ID.
    pub async fn get_paragraph(&self, id: &ParagraphId) -> Result<Option<Paragraph>> {
        let sql = format!("SELECT {PARAGRAPH_COLUMNS} FROM paragraphs WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_paragraph(&row)?)),
            None => Ok(None),
        }
    }

    async fn require_paragraph(&self, id: &ParagraphId) -> Result<Paragraph> {
        self.get_paragraph(id)
            .await?
            .ok_or_else(|| StudyQaError::not_found("paragraph", id))
    }

    /// List paragraphs, oldest first, optionally filtered by status.
    pub async fn list_paragraphs(&self, status: Option<GenerationStatus>) -> Result<Vec<Paragraph>> {
        let mut rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {PARAGRAPH_COLUMNS} FROM paragraphs WHERE generation_status = ?1 ORDER BY id"
                );
                self.conn.query(&sql, params![status.as_str()]).await
            }
            None => {
                let sql = format!("SELECT {PARAGRAPH_COLUMNS} FROM paragraphs ORDER BY id");
                self.conn.query(&sql, params![]).await
            }
        }
        .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_paragraph(&row)?);
        }
        Ok(results)
    }

    /// Delete a paragraph together with its questions and answers.
    /// Returns `false` if the paragraph did not exist.
    pub async fn delete_paragraph(&self, id: &ParagraphId) -> Result<bool> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let conn = self.side_connection()?;
        let tx = conn.transaction().await.map_err(db_err)?;
        let pid = id.to_string();

        let result = delete_paragraph_rows(&tx, &pid).await;

        match result {
            Ok(affected) => {
                tx.commit().await.map_err(db_err)?;
                Ok(affected > 0)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Generation state operations
    // -----------------------------------------------------------------------

    /// Record that an attempt for `version` has been scheduled.
    ///
    /// Applies only while `version` is the paragraph's current fingerprint,
    /// so a late call for older content cannot overwrite a newer attempt's
    /// version. Returns whether the row was updated.
    pub async fn mark_pending(&self, id: &ParagraphId, version: &ContentVersion) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE paragraphs
                 SET generation_status = ?1, content_version = ?2, failure_reason = NULL, updated_at = ?3
                 WHERE id = ?4 AND content_hash = ?2",
                params![
                    GenerationStatus::Pending.as_str(),
                    version.as_str(),
                    now.as_str(),
                    id.to_string()
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return match self.get_paragraph(id).await? {
                Some(_) => Ok(false),
                None => Err(StudyQaError::not_found("paragraph", id)),
            };
        }
        Ok(true)
    }

    /// Set the terminal status for an attempt, but only while `version` is
    /// still current. Returns whether the row was updated.
    pub async fn update_status(
        &self,
        id: &ParagraphId,
        status: GenerationStatus,
        version: &ContentVersion,
        reason: Option<FailureReason>,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE paragraphs
                 SET generation_status = ?1, failure_reason = ?2, updated_at = ?3
                 WHERE id = ?4 AND content_hash = ?5 AND content_version = ?5",
                params![
                    status.as_str(),
                    reason.map(|r| r.as_str()),
                    now.as_str(),
                    id.to_string(),
                    version.as_str()
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    /// Swap a paragraph's question set for `pairs` and set `status`, in one
    /// transaction guarded by the same currency check as [`Self::update_status`].
    ///
    /// On any error the transaction is rolled back and the previous set stays.
    pub async fn replace_questions(
        &self,
        id: &ParagraphId,
        pairs: &[QaPair],
        version: &ContentVersion,
        status: GenerationStatus,
    ) -> Result<ReplaceOutcome> {
        self.check_writable()?;
        let _guard = self.write_lock.lock().await;
        let conn = self.side_connection()?;
        let tx = conn.transaction().await.map_err(db_err)?;
        let pid = id.to_string();

        let result = write_question_set(&tx, &pid, pairs, version, status).await;

        match result {
            Ok(ReplaceOutcome::Replaced(n)) => {
                tx.commit().await.map_err(db_err)?;
                debug!(paragraph_id = %id, questions = n, %status, "question set replaced");
                Ok(ReplaceOutcome::Replaced(n))
            }
            Ok(ReplaceOutcome::Stale) => {
                rollback(tx).await;
                debug!(paragraph_id = %id, "question set not replaced, version is stale");
                Ok(ReplaceOutcome::Stale)
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Question operations
    // -----------------------------------------------------------------------

    /// List a paragraph's questions in ordinal order, each with its answers.
    pub async fn list_questions(&self, id: &ParagraphId) -> Result<Vec<Question>> {
        let mut rows = self
            .conn
            .query(
                "SELECT q.id, q.ordinal, q.text, q.created_at, a.id, a.text
                 FROM questions q
                 LEFT JOIN answers a ON a.question_id = q.id
                 WHERE q.paragraph_id = ?1
                 ORDER BY q.ordinal, a.rowid",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut questions: Vec<Question> = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let question_id: String = row.get(0).map_err(db_err)?;

            let is_new = questions.last().is_none_or(|q| q.id != question_id);
            if is_new {
                let ordinal: i64 = row.get(1).map_err(db_err)?;
                questions.push(Question {
                    id: question_id.clone(),
                    paragraph_id: *id,
                    ordinal: u32::try_from(ordinal).map_err(|_| {
                        StudyQaError::Storage(format!("invalid ordinal {ordinal}"))
                    })?,
                    text: row.get(2).map_err(db_err)?,
                    answers: Vec::new(),
                    created_at: parse_timestamp(&row.get::<String>(3).map_err(db_err)?)?,
                });
            }

            if let (Ok(answer_id), Ok(text)) = (row.get::<String>(4), row.get::<String>(5)) {
                if let Some(question) = questions.last_mut() {
                    question.answers.push(Answer {
                        id: answer_id,
                        question_id,
                        text,
                    });
                }
            }
        }
        Ok(questions)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> StudyQaError {
    StudyQaError::Storage(e.to_string())
}

fn check_num_questions(n: u8) -> Result<()> {
    if n > MAX_NUM_QUESTIONS {
        return Err(StudyQaError::validation(format!(
            "num_questions must be between 0 and {MAX_NUM_QUESTIONS}, got {n}"
        )));
    }
    Ok(())
}

async fn rollback(tx: libsql::Transaction) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "transaction rollback failed");
    }
}

/// Whether `version` is both the current content and the recorded attempt.
async fn is_current(conn: &Connection, pid: &str, version: &ContentVersion) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM paragraphs WHERE id = ?1 AND content_hash = ?2 AND content_version = ?2",
            params![pid, version.as_str()],
        )
        .await
        .map_err(db_err)?;
    Ok(rows.next().await.map_err(db_err)?.is_some())
}

async fn delete_paragraph_rows(conn: &Connection, pid: &str) -> Result<u64> {
    delete_question_set(conn, pid).await?;
    conn.execute("DELETE FROM paragraphs WHERE id = ?1", params![pid])
        .await
        .map_err(db_err)
}

/// Body of [`Storage::replace_questions`]; runs inside the caller's transaction.
async fn write_question_set(
    conn: &Connection,
    pid: &str,
    pairs: &[QaPair],
    version: &ContentVersion,
    status: GenerationStatus,
) -> Result<ReplaceOutcome> {
    if !is_current(conn, pid, version).await? {
        return Ok(ReplaceOutcome::Stale);
    }

    delete_question_set(conn, pid).await?;

    let now = Utc::now().to_rfc3339();
    for pair in pairs {
        let question_id = Uuid::now_v7().to_string();
        conn.execute(
            "INSERT INTO questions (id, paragraph_id, ordinal, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                question_id.as_str(),
                pid,
                i64::from(pair.ordinal),
                pair.question.as_str(),
                now.as_str()
            ],
        )
        .await
        .map_err(db_err)?;

        conn.execute(
            "INSERT INTO answers (id, question_id, text) VALUES (?1, ?2, ?3)",
            params![
                Uuid::now_v7().to_string(),
                question_id.as_str(),
                pair.answer.as_str()
            ],
        )
        .await
        .map_err(db_err)?;
    }

    conn.execute(
        "UPDATE paragraphs SET generation_status = ?1, failure_reason = NULL, updated_at = ?2
         WHERE id = ?3",
        params![status.as_str(), now.as_str(), pid],
    )
    .await
    .map_err(db_err)?;

    Ok(ReplaceOutcome::Replaced(pairs.len()))
}

async fn delete_question_set(conn: &Connection, pid: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM answers WHERE question_id IN (SELECT id FROM questions WHERE paragraph_id = ?1)",
        params![pid],
    )
    .await
    .map_err(db_err)?;
    conn.execute("DELETE FROM questions WHERE paragraph_id = ?1", params![pid])
        .await
        .map_err(db_err)?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StudyQaError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row (in [`PARAGRAPH_COLUMNS`] order) to a [`Paragraph`].
fn row_to_paragraph(row: &libsql::Row) -> Result<Paragraph> {
    let id: String = row.get(0).map_err(db_err)?;
    let num_questions: i64 = row.get(2).map_err(db_err)?;
    let status: String = row.get(5).map_err(db_err)?;

    Ok(Paragraph {
        id: id
            .parse()
            .map_err(|e| StudyQaError::Storage(format!("invalid paragraph id '{id}': {e}")))?,
        content: row.get(1).map_err(db_err)?,
        num_questions: u8::try_from(num_questions).map_err(|_| {
            StudyQaError::Storage(format!("invalid num_questions {num_questions}"))
        })?,
        content_hash: ContentVersion::from_hex(row.get::<String>(3).map_err(db_err)?),
        content_version: row.get::<String>(4).ok().map(ContentVersion::from_hex),
        generation_status: status.parse().map_err(StudyQaError::Storage)?,
        failure_reason: row
            .get::<String>(6)
            .ok()
            .map(|r| r.parse::<FailureReason>())
            .transpose()
            .map_err(StudyQaError::Storage)?,
        created_at: parse_timestamp(&row.get::<String>(7).map_err(db_err)?)?,
        updated_at: parse_timestamp(&row.get::<String>(8).map_err(db_err)?)?,
    })
}
