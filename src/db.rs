use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::error::Result;
use crate::models::{ChatMessage, ChatRole, LearningModule, ReviewRecord, ReviewStage};
use crate::store::ModuleStore;

pub struct Database {
    conn: Connection,
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS learning_modules (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                completion_percentage INTEGER NOT NULL DEFAULT 0,
                exercises_completed INTEGER NOT NULL DEFAULT 0,
                exercises_total INTEGER NOT NULL DEFAULT 0,
                pdf_summary_url TEXT,
                last_studied TEXT NOT NULL,
                review_stage INTEGER NOT NULL DEFAULT 0,
                next_review_date TEXT
            );

            CREATE TABLE IF NOT EXISTS review_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                module_id TEXT NOT NULL,
                reviewed_at TEXT NOT NULL,
                stage INTEGER NOT NULL,
                FOREIGN KEY (module_id) REFERENCES learning_modules(id) ON DELETE CASCADE
            );

            -- Conversation with the learning companion
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                role TEXT NOT NULL CHECK(role IN ('user', 'model')),
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_modules_position ON learning_modules(position);
            CREATE INDEX IF NOT EXISTS idx_modules_next_review ON learning_modules(next_review_date);
            CREATE INDEX IF NOT EXISTS idx_review_history_module ON review_history(module_id);
            "#,
        )?;

        Ok(())
    }

    fn load_history(&self, module_id: &str) -> rusqlite::Result<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT reviewed_at, stage FROM review_history WHERE module_id = ?1 ORDER BY id",
        )?;

        let rows = stmt.query_map(params![module_id], |row| {
            let raw: String = row.get(0)?;
            let stage: u8 = row.get(1)?;
            Ok(ReviewRecord {
                date: parse_timestamp(0, &raw)?,
                stage: ReviewStage::from_u8(stage),
            })
        })?;
        let history = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(history)
    }

    // Chat history
    pub fn append_chat_message(&self, message: &ChatMessage) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO chat_messages (role, text, created_at) VALUES (?1, ?2, ?3)",
            params![
                message.role.as_str(),
                message.text,
                message.timestamp.to_rfc3339()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The newest `limit` messages, oldest first.
    pub fn recent_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT role, text, created_at FROM (
                SELECT id, role, text, created_at FROM chat_messages
                ORDER BY id DESC
                LIMIT ?1
            ) ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let role: String = row.get(0)?;
            let created: String = row.get(2)?;
            Ok(ChatMessage {
                role: ChatRole::from_str(&role).unwrap_or(ChatRole::User),
                text: row.get(1)?,
                timestamp: parse_timestamp(2, &created)?,
            })
        })?;
        let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(messages)
    }

    pub fn clear_chat(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM chat_messages", [])?)
    }
}

impl ModuleStore for Database {
    fn load(&self) -> Result<Vec<LearningModule>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, description, completion_percentage, exercises_completed,
                   exercises_total, pdf_summary_url, last_studied, review_stage, next_review_date
            FROM learning_modules
            ORDER BY position
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let last_studied: String = row.get(7)?;
            let stage: u8 = row.get(8)?;
            let next_review: Option<String> = row.get(9)?;
            Ok(LearningModule {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                completion_percentage: row.get(3)?,
                exercises_completed: row.get(4)?,
                exercises_total: row.get(5)?,
                pdf_summary_url: row.get(6)?,
                last_studied: parse_timestamp(7, &last_studied)?,
                review_stage: ReviewStage::from_u8(stage),
                next_review_date: next_review
                    .as_deref()
                    .map(|raw| parse_timestamp(9, raw))
                    .transpose()?,
                review_history: vec![],
            })
        })?;
        let mut modules = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        for module in &mut modules {
            module.review_history = self.load_history(&module.id)?;
        }

        Ok(modules)
    }

    fn save(&mut self, modules: &[LearningModule]) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM review_history", [])?;
        tx.execute("DELETE FROM learning_modules", [])?;

        for (position, m) in modules.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO learning_modules (
                    id, position, name, description, completion_percentage,
                    exercises_completed, exercises_total, pdf_summary_url,
                    last_studied, review_stage, next_review_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
                params![
                    m.id,
                    position as i64,
                    m.name,
                    m.description,
                    m.completion_percentage,
                    m.exercises_completed,
                    m.exercises_total,
                    m.pdf_summary_url,
                    m.last_studied.to_rfc3339(),
                    m.review_stage.as_u8(),
                    m.next_review_date.map(|d| d.to_rfc3339()),
                ],
            )?;

            for record in &m.review_history {
                tx.execute(
                    "INSERT INTO review_history (module_id, reviewed_at, stage) VALUES (?1, ?2, ?3)",
                    params![m.id, record.date.to_rfc3339(), record.stage.as_u8()],
                )?;
            }
        }

        tx.commit()?;
        tracing::debug!(count = modules.len(), "saved learning modules");
        Ok(())
    }
}
