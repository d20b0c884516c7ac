//! SQLite-backed [`Database`]. One file, schema created on construction.
//!
//! Calls open a connection inside `spawn_blocking`; writes that touch more
//! than one table run in a transaction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{Context, Conversation, Database, DbError, OAuthToken, StoredMessage, ToolPermission};

pub struct SqliteDatabase {
    db_path: PathBuf,
}

fn open(path: &Path) -> Result<Connection, DbError> {
    Connection::open(path).map_err(|e| DbError::Sqlite(e.to_string()))
}

fn sql_err(e: rusqlite::Error) -> DbError {
    DbError::Sqlite(e.to_string())
}

fn parse_uuid(s: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(s).map_err(|e| DbError::Decode(format!("uuid '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DbError::Decode(format!("timestamp '{s}': {e}")))
}

fn parse_json(s: &str) -> Result<serde_json::Value, DbError> {
    serde_json::from_str(s).map_err(|e| DbError::Decode(format!("json: {e}")))
}

impl SqliteDatabase {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = open(&db_path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS contexts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                config TEXT NOT NULL,
                default_working_dir TEXT,
                pinned_files TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                platform TEXT NOT NULL,
                platform_id TEXT NOT NULL,
                context_id TEXT NOT NULL,
                working_dir TEXT,
                metadata TEXT NOT NULL,
                UNIQUE (platform, platform_id)
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                trace_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id);
            CREATE TABLE IF NOT EXISTS tool_permissions (
                context_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                allowed INTEGER NOT NULL,
                PRIMARY KEY (context_id, tool_name)
            );
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                context_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at TEXT,
                scope TEXT,
                PRIMARY KEY (context_id, provider)
            );
            "#,
        )
        .map_err(sql_err)?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DbError::Join(e.to_string()))?
    }
}

fn row_to_context(row: &rusqlite::Row<'_>) -> Result<Context, DbError> {
    let id: String = row.get(0).map_err(sql_err)?;
    let name: String = row.get(1).map_err(sql_err)?;
    let kind: String = row.get(2).map_err(sql_err)?;
    let config: String = row.get(3).map_err(sql_err)?;
    let default_working_dir: Option<String> = row.get(4).map_err(sql_err)?;
    let pinned: String = row.get(5).map_err(sql_err)?;
    let created_at: String = row.get(6).map_err(sql_err)?;
    Ok(Context {
        id: parse_uuid(&id)?,
        name,
        kind,
        config: parse_json(&config)?,
        default_working_dir,
        pinned_files: serde_json::from_str(&pinned)
            .map_err(|e| DbError::Decode(format!("pinned_files: {e}")))?,
        created_at: parse_time(&created_at)?,
    })
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, DbError> {
    let id: String = row.get(0).map_err(sql_err)?;
    let platform: String = row.get(1).map_err(sql_err)?;
    let platform_id: String = row.get(2).map_err(sql_err)?;
    let context_id: String = row.get(3).map_err(sql_err)?;
    let working_dir: Option<String> = row.get(4).map_err(sql_err)?;
    let metadata: String = row.get(5).map_err(sql_err)?;
    Ok(Conversation {
        id: parse_uuid(&id)?,
        platform,
        platform_id,
        context_id: parse_uuid(&context_id)?,
        working_dir,
        metadata: parse_json(&metadata)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, DbError> {
    let id: String = row.get(0).map_err(sql_err)?;
    let conversation_id: String = row.get(1).map_err(sql_err)?;
    let role: String = row.get(2).map_err(sql_err)?;
    let content: String = row.get(3).map_err(sql_err)?;
    let created_at: String = row.get(4).map_err(sql_err)?;
    let trace_id: Option<String> = row.get(5).map_err(sql_err)?;
    Ok(StoredMessage {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        role,
        content,
        created_at: parse_time(&created_at)?,
        trace_id,
    })
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn create_context(&self, context: &Context) -> Result<(), DbError> {
        let c = context.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO contexts (id, name, kind, config, default_working_dir, pinned_files, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.id.to_string(),
                    c.name,
                    c.kind,
                    c.config.to_string(),
                    c.default_working_dir,
                    serde_json::to_string(&c.pinned_files)
                        .map_err(|e| DbError::Decode(e.to_string()))?,
                    c.created_at.to_rfc3339(),
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn get_context(&self, id: Uuid) -> Result<Option<Context>, DbError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, kind, config, default_working_dir, pinned_files, created_at
                 FROM contexts WHERE id = ?1",
                params![id.to_string()],
                |row| Ok(row_to_context(row)),
            )
            .optional()
            .map_err(sql_err)?
            .transpose()
        })
        .await
    }

    async fn find_context_by_name(&self, name: &str) -> Result<Option<Context>, DbError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, kind, config, default_working_dir, pinned_files, created_at
                 FROM contexts WHERE name = ?1",
                params![name],
                |row| Ok(row_to_context(row)),
            )
            .optional()
            .map_err(sql_err)?
            .transpose()
        })
        .await
    }

    async fn delete_context(&self, id: Uuid) -> Result<(), DbError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(sql_err)?;
            let id = id.to_string();
            tx.execute(
                "DELETE FROM messages WHERE conversation_id IN
                 (SELECT id FROM conversations WHERE context_id = ?1)",
                params![id],
            )
            .map_err(sql_err)?;
            tx.execute(
                "DELETE FROM conversations WHERE context_id = ?1",
                params![id],
            )
            .map_err(sql_err)?;
            tx.execute(
                "DELETE FROM tool_permissions WHERE context_id = ?1",
                params![id],
            )
            .map_err(sql_err)?;
            tx.execute("DELETE FROM oauth_tokens WHERE context_id = ?1", params![id])
                .map_err(sql_err)?;
            tx.execute("DELETE FROM contexts WHERE id = ?1", params![id])
                .map_err(sql_err)?;
            tx.commit().map_err(sql_err)
        })
        .await
    }

    async fn upsert_conversation(
        &self,
        platform: &str,
        platform_id: &str,
        context_id: Uuid,
    ) -> Result<Conversation, DbError> {
        let platform = platform.to_string();
        let platform_id = platform_id.to_string();
        self.with_conn(move |conn| {
            let existing = conn
                .query_row(
                    "SELECT id, platform, platform_id, context_id, working_dir, metadata
                     FROM conversations WHERE platform = ?1 AND platform_id = ?2",
                    params![platform, platform_id],
                    |row| Ok(row_to_conversation(row)),
                )
                .optional()
                .map_err(sql_err)?
                .transpose()?;
            if let Some(conversation) = existing {
                return Ok(conversation);
            }

            let working_dir: Option<String> = conn
                .query_row(
                    "SELECT default_working_dir FROM contexts WHERE id = ?1",
                    params![context_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_err)?
                .flatten();

            let conversation = Conversation {
                id: Uuid::new_v4(),
                platform: platform.clone(),
                platform_id: platform_id.clone(),
                context_id,
                working_dir,
                metadata: serde_json::Value::Object(Default::default()),
            };
            conn.execute(
                "INSERT INTO conversations (id, platform, platform_id, context_id, working_dir, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    conversation.id.to_string(),
                    conversation.platform,
                    conversation.platform_id,
                    conversation.context_id.to_string(),
                    conversation.working_dir,
                    conversation.metadata.to_string(),
                ],
            )
            .map_err(sql_err)?;
            Ok(conversation)
        })
        .await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DbError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, platform, platform_id, context_id, working_dir, metadata
                 FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |row| Ok(row_to_conversation(row)),
            )
            .optional()
            .map_err(sql_err)?
            .transpose()
        })
        .await
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<(), DbError> {
        let m = message.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at, trace_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    m.id.to_string(),
                    m.conversation_id.to_string(),
                    m.role,
                    m.content,
                    m.created_at.to_rfc3339(),
                    m.trace_id,
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn fetch_recent_messages(
        &self,
        conversation_id: Uuid,
        n: usize,
    ) -> Result<Vec<StoredMessage>, DbError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, conversation_id, role, content, created_at, trace_id
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                )
                .map_err(sql_err)?;
            let mut rows = stmt
                .query(params![conversation_id.to_string(), n as i64])
                .map_err(sql_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(sql_err)? {
                out.push(row_to_message(row)?);
            }
            out.reverse();
            Ok(out)
        })
        .await
    }

    async fn tool_permissions(&self, context_id: Uuid) -> Result<Vec<ToolPermission>, DbError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT tool_name, allowed FROM tool_permissions WHERE context_id = ?1",
                )
                .map_err(sql_err)?;
            let mut rows = stmt
                .query(params![context_id.to_string()])
                .map_err(sql_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(sql_err)? {
                let tool_name: String = row.get(0).map_err(sql_err)?;
                let allowed: bool = row.get(1).map_err(sql_err)?;
                out.push(ToolPermission {
                    context_id,
                    tool_name,
                    allowed,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn set_tool_permission(&self, permission: &ToolPermission) -> Result<(), DbError> {
        let p = permission.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tool_permissions (context_id, tool_name, allowed)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (context_id, tool_name) DO UPDATE SET allowed = excluded.allowed",
                params![p.context_id.to_string(), p.tool_name, p.allowed],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }

    async fn oauth_tokens(&self, context_id: Uuid) -> Result<Vec<OAuthToken>, DbError> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT provider, access_token, refresh_token, expires_at, scope
                     FROM oauth_tokens WHERE context_id = ?1",
                )
                .map_err(sql_err)?;
            let mut rows = stmt
                .query(params![context_id.to_string()])
                .map_err(sql_err)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next().map_err(sql_err)? {
                let provider: String = row.get(0).map_err(sql_err)?;
                let access_token: String = row.get(1).map_err(sql_err)?;
                let refresh_token: Option<String> = row.get(2).map_err(sql_err)?;
                let expires_at: Option<String> = row.get(3).map_err(sql_err)?;
                let scope: Option<String> = row.get(4).map_err(sql_err)?;
                out.push(OAuthToken {
                    context_id,
                    provider,
                    access_token,
                    refresh_token,
                    expires_at: expires_at.as_deref().map(parse_time).transpose()?,
                    scope,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn oauth_token(
        &self,
        context_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthToken>, DbError> {
        let provider = provider.to_string();
        let all = self.oauth_tokens(context_id).await?;
        Ok(all.into_iter().find(|t| t.provider == provider))
    }

    async fn upsert_oauth_token(&self, token: &OAuthToken) -> Result<(), DbError> {
        let t = token.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO oauth_tokens (context_id, provider, access_token, refresh_token, expires_at, scope)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (context_id, provider) DO UPDATE SET
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    scope = excluded.scope",
                params![
                    t.context_id.to_string(),
                    t.provider,
                    t.access_token,
                    t.refresh_token,
                    t.expires_at.map(|e| e.to_rfc3339()),
                    t.scope,
                ],
            )
            .map_err(sql_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn db() -> (NamedTempFile, SqliteDatabase) {
        let file = NamedTempFile::new().unwrap();
        let db = SqliteDatabase::new(file.path()).unwrap();
        (file, db)
    }

    #[tokio::test]
    async fn context_round_trips() {
        let (_f, db) = db();
        let mut ctx = Context::new("personal", "default");
        ctx.pinned_files = vec!["notes.md".to_string()];
        db.create_context(&ctx).await.unwrap();
        let loaded = db.get_context(ctx.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "personal");
        assert_eq!(loaded.pinned_files, vec!["notes.md"]);
        assert!(db.find_context_by_name("personal").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_conversation_is_idempotent_per_platform_pair() {
        let (_f, db) = db();
        let ctx = Context::new("c", "default");
        db.create_context(&ctx).await.unwrap();
        let a = db.upsert_conversation("telegram", "42", ctx.id).await.unwrap();
        let b = db.upsert_conversation("telegram", "42", ctx.id).await.unwrap();
        assert_eq!(a.id, b.id);
        let c = db.upsert_conversation("webui", "42", ctx.id).await.unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn recent_messages_are_windowed_and_chronological() {
        let (_f, db) = db();
        let ctx = Context::new("c", "default");
        db.create_context(&ctx).await.unwrap();
        let conv = db.upsert_conversation("webui", "s1", ctx.id).await.unwrap();
        for i in 0..5 {
            db.append_message(&StoredMessage::new(conv.id, "user", format!("m{i}")))
                .await
                .unwrap();
        }
        let recent = db.fetch_recent_messages(conv.id, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn permission_upsert_replaces_per_tool_row() {
        let (_f, db) = db();
        let ctx = Context::new("c", "default");
        db.create_context(&ctx).await.unwrap();
        let mut perm = ToolPermission {
            context_id: ctx.id,
            tool_name: "shell".to_string(),
            allowed: false,
        };
        db.set_tool_permission(&perm).await.unwrap();
        perm.allowed = true;
        db.set_tool_permission(&perm).await.unwrap();
        let perms = db.tool_permissions(ctx.id).await.unwrap();
        assert_eq!(perms.len(), 1);
        assert!(perms[0].allowed);
    }

    #[tokio::test]
    async fn delete_context_cascades() {
        let (_f, db) = db();
        let ctx = Context::new("c", "default");
        db.create_context(&ctx).await.unwrap();
        let conv = db.upsert_conversation("webui", "s1", ctx.id).await.unwrap();
        db.append_message(&StoredMessage::new(conv.id, "user", "hi"))
            .await
            .unwrap();
        db.upsert_oauth_token(&OAuthToken {
            context_id: ctx.id,
            provider: "github".to_string(),
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        })
        .await
        .unwrap();

        db.delete_context(ctx.id).await.unwrap();
        assert!(db.get_context(ctx.id).await.unwrap().is_none());
        assert!(db.get_conversation(conv.id).await.unwrap().is_none());
        assert!(db.fetch_recent_messages(conv.id, 10).await.unwrap().is_empty());
        assert!(db.oauth_tokens(ctx.id).await.unwrap().is_empty());
    }
}
