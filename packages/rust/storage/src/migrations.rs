//! SQL migration definitions for the StudyQA database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: paragraphs, questions, answers",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Source paragraphs and their generation state
CREATE TABLE IF NOT EXISTS paragraphs (
    id                TEXT PRIMARY KEY,
    content           TEXT NOT NULL,
    num_questions     INTEGER NOT NULL DEFAULT 5 CHECK (num_questions BETWEEN 0 AND 20),
    content_hash      TEXT NOT NULL,
    content_version   TEXT,
    generation_status TEXT NOT NULL DEFAULT 'none',
    failure_reason    TEXT,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

-- Generated questions, one batch per paragraph
CREATE TABLE IF NOT EXISTS questions (
    id           TEXT PRIMARY KEY,
    paragraph_id TEXT NOT NULL REFERENCES paragraphs(id) ON DELETE CASCADE,
    ordinal      INTEGER NOT NULL CHECK (ordinal >= 1),
    text         TEXT NOT NULL CHECK (length(trim(text)) > 0),
    created_at   TEXT NOT NULL,
    UNIQUE(paragraph_id, ordinal)
);

CREATE INDEX IF NOT EXISTS idx_questions_paragraph ON questions(paragraph_id);

-- Answers (1:1 today, schema allows 1:N)
CREATE TABLE IF NOT EXISTS answers (
    id          TEXT PRIMARY KEY,
    question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    text        TEXT NOT NULL CHECK (length(trim(text)) > 0)
);

CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index paragraphs by generation status",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_paragraphs_status ON paragraphs(generation_status);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_ascend_without_gaps() {
        let versions: Vec<u32> = all_migrations().iter().map(|m| m.version).collect();
        let expected: Vec<u32> = (1..=versions.len() as u32).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn each_migration_records_itself() {
        for m in all_migrations() {
            let marker = format!("INSERT INTO schema_migrations (version) VALUES ({});", m.version);
            assert!(m.sql.contains(&marker), "migration v{} missing marker", m.version);
        }
    }
}
