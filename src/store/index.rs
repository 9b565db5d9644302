use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::errors::{PipelineError, Result};
use crate::core::types::PageMetadata;
use crate::store::artifacts::{ArtifactKind, StoredArtifact};

/// One URL's membership in a session, with sanitization provenance.
#[derive(Clone, Debug)]
pub struct SessionMember {
    pub url_id: i64,
    pub was_sanitized: bool,
    pub original_url: Option<String>,
}

/// Classification columns of a `urls` row, as surfaced by the query layer.
#[derive(Clone, Debug)]
pub struct UrlRow {
    pub id: i64,
    pub original_url: String,
    pub scheme: String,
    pub host: String,
    pub content_type: String,
    pub content_subtype: Option<String>,
    pub detection_confidence: f64,
    pub has_abstract: bool,
    pub has_infobox: bool,
    pub has_toc: bool,
    pub has_code_examples: bool,
    pub section_count: i64,
    pub citation_count: i64,
    pub code_block_count: i64,
    pub top_keywords: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SessionRow {
    pub id: i64,
    pub created_at: String,
    pub url_count: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub features: String,
    pub parse_mode: String,
    pub session_dir: String,
}

#[derive(Clone, Debug)]
pub struct SessionResultRow {
    pub url_id: i64,
    pub status: String,
    pub status_code: u16,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub file_size_bytes: u64,
    pub estimated_tokens: u64,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    original_url TEXT NOT NULL UNIQUE,
    scheme TEXT NOT NULL,
    host TEXT NOT NULL,
    path TEXT NOT NULL,
    fragment TEXT,
    canonical_url TEXT NOT NULL,
    content_type TEXT NOT NULL DEFAULT 'unknown',
    content_subtype TEXT,
    detection_confidence REAL NOT NULL DEFAULT 0,
    has_abstract INTEGER NOT NULL DEFAULT 0,
    has_infobox INTEGER NOT NULL DEFAULT 0,
    has_toc INTEGER NOT NULL DEFAULT 0,
    has_code_examples INTEGER NOT NULL DEFAULT 0,
    section_count INTEGER NOT NULL DEFAULT 0,
    citation_count INTEGER NOT NULL DEFAULT 0,
    code_block_count INTEGER NOT NULL DEFAULT 0,
    top_keywords TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS url_query_params (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    name TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS artifact_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS artifacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    type_id INTEGER NOT NULL REFERENCES artifact_types(id),
    content_hash TEXT NOT NULL,
    file_path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(url_id, type_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    url_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    features TEXT NOT NULL DEFAULT '',
    parse_mode TEXT NOT NULL,
    session_dir TEXT NOT NULL DEFAULT '',
    url_set_key TEXT NOT NULL,
    UNIQUE(url_set_key, created_at)
);

CREATE TABLE IF NOT EXISTS session_urls (
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    was_sanitized INTEGER NOT NULL DEFAULT 0,
    original_url TEXT,
    PRIMARY KEY (session_id, url_id)
);

CREATE TABLE IF NOT EXISTS session_results (
    session_id INTEGER NOT NULL REFERENCES sessions(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    status TEXT NOT NULL,
    status_code INTEGER NOT NULL DEFAULT 0,
    error_type TEXT,
    error_message TEXT,
    file_size_bytes INTEGER NOT NULL DEFAULT 0,
    estimated_tokens INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (session_id, url_id)
);

CREATE TABLE IF NOT EXISTS url_access_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    accessed_at TEXT NOT NULL,
    status_code INTEGER NOT NULL DEFAULT 0,
    outcome TEXT NOT NULL,
    from_cache INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);
CREATE INDEX IF NOT EXISTS idx_urls_content_type ON urls(content_type);
CREATE INDEX IF NOT EXISTS idx_query_params_url ON url_query_params(url_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_url ON artifacts(url_id);
CREATE INDEX IF NOT EXISTS idx_artifacts_hash ON artifacts(content_hash);
CREATE INDEX IF NOT EXISTS idx_session_urls_url ON session_urls(url_id);
CREATE INDEX IF NOT EXISTS idx_session_results_session ON session_results(session_id);
CREATE INDEX IF NOT EXISTS idx_access_log_url ON url_access_log(url_id);
"#;

/// The single source of truth for URL identity, artifacts, sessions, and
/// access history. One connection behind a mutex: SQLite is the sole piece
/// of process-wide mutable state, and every mutation is serialized here.
#[derive(Clone)]
pub struct RelationalIndex {
    conn: Arc<Mutex<Connection>>,
}

impl RelationalIndex {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let have_core: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'urls'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if have_core.is_none() {
            info!("initializing index schema");
            conn.execute_batch(SCHEMA)?;
        }
        for kind in ArtifactKind::ALL {
            conn.execute(
                "INSERT OR IGNORE INTO artifact_types (id, name) VALUES (?1, ?2)",
                params![kind.type_id(), kind.type_name()],
            )?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means another worker panicked mid-write; the
        // connection itself is still usable for the remaining workers.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Idempotent URL registration: returns the existing id when the
    /// original (post-sanitization) string is already known.
    pub fn insert_url(&self, sanitized: &str) -> Result<i64> {
        let conn = self.lock();
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM urls WHERE original_url = ?1",
                params![sanitized],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
        {
            return Ok(id);
        }

        let parsed = Url::parse(sanitized)
            .map_err(|_| PipelineError::InvalidUrl(sanitized.to_string()))?;
        let host = parsed.host_str().unwrap_or("").to_string();
        let canonical = crate::urlnorm::canonical_form(&parsed);

        conn.execute(
            "INSERT OR IGNORE INTO urls
                 (original_url, scheme, host, path, fragment, canonical_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sanitized,
                parsed.scheme(),
                host,
                parsed.path(),
                parsed.fragment(),
                canonical,
                now_stamp(),
            ],
        )?;
        // INSERT OR IGNORE collapses a concurrent duplicate to one row.
        let id: i64 = conn.query_row(
            "SELECT id FROM urls WHERE original_url = ?1",
            params![sanitized],
            |row| row.get(0),
        )?;

        for (name, value) in parsed.query_pairs() {
            conn.execute(
                "INSERT INTO url_query_params (url_id, name, value) VALUES (?1, ?2, ?3)",
                params![id, name.as_ref(), value.as_ref()],
            )?;
        }

        Ok(id)
    }

    pub fn url_id(&self, sanitized: &str) -> Result<Option<i64>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT id FROM urls WHERE original_url = ?1",
                params![sanitized],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Resolve a fresh session whose membership equals this URL-id set, or
    /// create one. Matching is set-exact: same fingerprint of sorted ids and
    /// the same cardinality. Ties break to the most recent session.
    pub fn find_or_create_session(
        &self,
        members: &[SessionMember],
        features: &str,
        parse_mode: &str,
        max_age: Duration,
    ) -> Result<(i64, bool)> {
        let mut ids: Vec<i64> = members.iter().map(|m| m.url_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let set_key = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-");
        let cutoff = cutoff_stamp(max_age);

        if !max_age.is_zero() {
            if let Some(id) = self.find_session(&set_key, ids.len() as i64, &cutoff)? {
                debug!("session cache hit: {}", id);
                return Ok((id, true));
            }
        }

        // Unique constraint + retry: a concurrent creator of the same set in
        // the same second loses the insert race and adopts the winner. When
        // freshness is disabled a new session is required, so the timestamp
        // is bumped forward instead.
        let mut bump = 0i64;
        loop {
            match self.create_session(&set_key, &ids, members, features, parse_mode, bump) {
                Ok(id) => return Ok((id, false)),
                Err(PipelineError::Database(e)) if is_constraint_violation(&e) => {
                    if !max_age.is_zero() {
                        warn!("session creation raced, retrying lookup");
                        if let Some(id) =
                            self.find_session(&set_key, ids.len() as i64, &cutoff)?
                        {
                            return Ok((id, true));
                        }
                    }
                    bump += 1;
                    if bump > 5 {
                        return Err(PipelineError::Database(e));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn find_session(&self, set_key: &str, url_count: i64, cutoff: &str) -> Result<Option<i64>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT id FROM sessions
                 WHERE url_set_key = ?1 AND url_count = ?2 AND created_at >= ?3
                 ORDER BY created_at DESC LIMIT 1",
                params![set_key, url_count, cutoff],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn create_session(
        &self,
        set_key: &str,
        ids: &[i64],
        members: &[SessionMember],
        features: &str,
        parse_mode: &str,
        bump_secs: i64,
    ) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let created_at = (Utc::now() + chrono::Duration::seconds(bump_secs))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        tx.execute(
            "INSERT INTO sessions (created_at, url_count, features, parse_mode, url_set_key)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![created_at, ids.len() as i64, features, parse_mode, set_key],
        )?;
        let session_id = tx.last_insert_rowid();

        let date = created_at.split('T').next().unwrap_or("1970-01-01");
        let session_dir = format!("sessions/{}-{}", date, session_id);
        tx.execute(
            "UPDATE sessions SET session_dir = ?1 WHERE id = ?2",
            params![session_dir, session_id],
        )?;

        for member in members {
            tx.execute(
                "INSERT OR IGNORE INTO session_urls
                     (session_id, url_id, was_sanitized, original_url)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    session_id,
                    member.url_id,
                    member.was_sanitized,
                    member.original_url,
                ],
            )?;
        }

        tx.commit()?;
        info!("created session {} ({} urls)", session_id, ids.len());
        Ok(session_id)
    }

    pub fn record_access(
        &self,
        url_id: i64,
        status_code: u16,
        outcome: &str,
        from_cache: bool,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO url_access_log (url_id, accessed_at, status_code, outcome, from_cache)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![url_id, now_stamp(), status_code, outcome, from_cache],
        )?;
        Ok(())
    }

    /// Upsert by (url_id, type): a reparse overwrites the row with the new
    /// hash so the on-file invariant holds at write time.
    pub fn insert_artifact(&self, url_id: i64, stored: &StoredArtifact) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO artifacts (url_id, type_id, content_hash, file_path, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(url_id, type_id) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 file_path = excluded.file_path,
                 size_bytes = excluded.size_bytes,
                 created_at = excluded.created_at",
            params![
                url_id,
                stored.kind.type_id(),
                stored.content_hash,
                stored.file_path.to_string_lossy(),
                stored.size_bytes as i64,
                now_stamp(),
            ],
        )?;
        Ok(())
    }

    pub fn artifact_hash(&self, url_id: i64, kind: ArtifactKind) -> Result<Option<String>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT content_hash FROM artifacts WHERE url_id = ?1 AND type_id = ?2",
                params![url_id, kind.type_id()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Mirror the post-parse classification into the URL row.
    pub fn update_url_content_type(
        &self,
        url_id: i64,
        meta: &PageMetadata,
        has_infobox: bool,
        has_toc: bool,
        citation_count: i64,
        code_block_count: i64,
        top_keywords_json: &str,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE urls SET
                 content_type = ?1,
                 content_subtype = ?2,
                 detection_confidence = ?3,
                 has_abstract = ?4,
                 has_infobox = ?5,
                 has_toc = ?6,
                 has_code_examples = ?7,
                 section_count = ?8,
                 citation_count = ?9,
                 code_block_count = ?10,
                 top_keywords = ?11
             WHERE id = ?12",
            params![
                meta.content_type.as_str(),
                meta.content_subtype,
                meta.detection_confidence,
                meta.academic.has_abstract,
                has_infobox,
                has_toc,
                code_block_count > 0,
                meta.section_count as i64,
                citation_count,
                code_block_count,
                top_keywords_json,
                url_id,
            ],
        )?;
        Ok(())
    }

    pub fn update_session_stats(&self, session_id: i64, success: i64, failed: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE sessions SET success_count = ?1, failed_count = ?2 WHERE id = ?3",
            params![success, failed, session_id],
        )?;
        Ok(())
    }

    pub fn insert_session_result(&self, session_id: i64, result: &SessionResultRow) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO session_results
                 (session_id, url_id, status, status_code, error_type, error_message,
                  file_size_bytes, estimated_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(session_id, url_id) DO UPDATE SET
                 status = excluded.status,
                 status_code = excluded.status_code,
                 error_type = excluded.error_type,
                 error_message = excluded.error_message,
                 file_size_bytes = excluded.file_size_bytes,
                 estimated_tokens = excluded.estimated_tokens",
            params![
                session_id,
                result.url_id,
                result.status,
                result.status_code,
                result.error_type,
                result.error_message,
                result.file_size_bytes as i64,
                result.estimated_tokens as i64,
            ],
        )?;
        Ok(())
    }

    pub fn session(&self, session_id: i64) -> Result<Option<SessionRow>> {
        let conn = self.lock();
        Ok(conn
            .query_row(
                "SELECT id, created_at, url_count, success_count, failed_count,
                        features, parse_mode, session_dir
                 FROM sessions WHERE id = ?1",
                params![session_id],
                session_row_from,
            )
            .optional()?)
    }

    pub fn session_url_ids(&self, session_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT url_id FROM session_urls WHERE session_id = ?1 ORDER BY url_id",
        )?;
        let ids = stmt
            .query_map(params![session_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    pub fn session_member_urls(&self, session_id: i64) -> Result<Vec<(i64, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.original_url
             FROM session_urls su JOIN urls u ON u.id = su.url_id
             WHERE su.session_id = ?1 ORDER BY u.id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_urls(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?)
    }

    /// Run a compiled filter against the URL table, optionally joined to a
    /// session's membership. The WHERE fragment and parameters come from the
    /// corpus filter compiler; fields are whitelisted upstream.
    pub fn url_rows_where(
        &self,
        where_sql: &str,
        params: &[rusqlite::types::Value],
        session_id: Option<i64>,
    ) -> Result<Vec<UrlRow>> {
        let base = "SELECT u.id, u.original_url, u.scheme, u.host, u.content_type,
                           u.content_subtype, u.detection_confidence, u.has_abstract,
                           u.has_infobox, u.has_toc, u.has_code_examples, u.section_count,
                           u.citation_count, u.code_block_count, u.top_keywords
                    FROM urls u";
        let (sql, owned_params): (String, Vec<rusqlite::types::Value>) = match session_id {
            Some(sid) => {
                let mut p: Vec<rusqlite::types::Value> =
                    vec![rusqlite::types::Value::Integer(sid)];
                p.extend(params.iter().cloned());
                (
                    format!(
                        "{} JOIN session_urls su ON su.url_id = u.id AND su.session_id = ?1 \
                         WHERE {}",
                        base,
                        shift_placeholders(where_sql, 1)
                    ),
                    p,
                )
            }
            None => (format!("{} WHERE {}", base, where_sql), params.to_vec()),
        };

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(owned_params.iter()), url_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn url_row(&self, url_id: i64) -> Result<Option<UrlRow>> {
        let rows = self.url_rows_where(
            "u.id = ?1",
            &[rusqlite::types::Value::Integer(url_id)],
            None,
        )?;
        Ok(rows.into_iter().next())
    }

    // --- inspection helpers for the `db` command surface -------------------

    pub fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        let names = self.table_names()?;
        let conn = self.lock();
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", name), [], |row| {
                    row.get(0)
                })?;
            out.push((name, count));
        }
        Ok(out)
    }

    pub fn recent_sessions(&self, limit: i64) -> Result<Vec<SessionRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, url_count, success_count, failed_count,
                    features, parse_mode, session_dir
             FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], session_row_from)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn session_results(&self, session_id: i64) -> Result<Vec<SessionResultRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT url_id, status, status_code, error_type, error_message,
                    file_size_bytes, estimated_tokens
             FROM session_results WHERE session_id = ?1 ORDER BY url_id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(SessionResultRow {
                    url_id: row.get(0)?,
                    status: row.get(1)?,
                    status_code: row.get::<_, i64>(2)? as u16,
                    error_type: row.get(3)?,
                    error_message: row.get(4)?,
                    file_size_bytes: row.get::<_, i64>(5)? as u64,
                    estimated_tokens: row.get::<_, i64>(6)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn session_row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        url_count: row.get(2)?,
        success_count: row.get(3)?,
        failed_count: row.get(4)?,
        features: row.get(5)?,
        parse_mode: row.get(6)?,
        session_dir: row.get(7)?,
    })
}

fn url_row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<UrlRow> {
    Ok(UrlRow {
        id: row.get(0)?,
        original_url: row.get(1)?,
        scheme: row.get(2)?,
        host: row.get(3)?,
        content_type: row.get(4)?,
        content_subtype: row.get(5)?,
        detection_confidence: row.get(6)?,
        has_abstract: row.get(7)?,
        has_infobox: row.get(8)?,
        has_toc: row.get(9)?,
        has_code_examples: row.get(10)?,
        section_count: row.get(11)?,
        citation_count: row.get(12)?,
        code_block_count: row.get(13)?,
        top_keywords: row.get(14)?,
    })
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn cutoff_stamp(max_age: Duration) -> String {
    // Clamp to a century so absurd windows cannot overflow the arithmetic.
    let secs = max_age.as_secs().min(3_153_600_000) as i64;
    let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::seconds(secs);
    cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Renumber `?N` placeholders in a compiled WHERE fragment after a leading
/// parameter has been prepended for the session join.
fn shift_placeholders(where_sql: &str, by: usize) -> String {
    let mut out = String::with_capacity(where_sql.len());
    let mut chars = where_sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '?' {
            let mut digits = String::new();
            while let Some(d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    chars.next();
                } else {
                    break;
                }
            }
            match digits.parse::<usize>() {
                Ok(n) => out.push_str(&format!("?{}", n + by)),
                Err(_) => out.push('?'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(url_id: i64) -> SessionMember {
        SessionMember {
            url_id,
            was_sanitized: false,
            original_url: None,
        }
    }

    #[test]
    fn insert_url_is_idempotent() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example/page?x=1").unwrap();
        let b = index.insert_url("https://a.example/page?x=1").unwrap();
        assert_eq!(a, b);
        assert_eq!(index.count_urls().unwrap(), 1);

        let c = index.insert_url("https://b.example").unwrap();
        assert_ne!(a, c);
        assert_eq!(index.count_urls().unwrap(), 2);
    }

    #[test]
    fn session_matching_is_order_independent() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example").unwrap();
        let b = index.insert_url("https://b.example").unwrap();

        let (first, hit) = index
            .find_or_create_session(
                &[member(a), member(b)],
                "",
                "cheap",
                Duration::from_secs(3600),
            )
            .unwrap();
        assert!(!hit);

        let (second, hit) = index
            .find_or_create_session(
                &[member(b), member(a)],
                "",
                "cheap",
                Duration::from_secs(3600),
            )
            .unwrap();
        assert!(hit);
        assert_eq!(first, second);
    }

    #[test]
    fn different_url_sets_get_different_sessions() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example").unwrap();
        let b = index.insert_url("https://b.example").unwrap();

        let (s1, _) = index
            .find_or_create_session(&[member(a)], "", "cheap", Duration::from_secs(3600))
            .unwrap();
        let (s2, hit) = index
            .find_or_create_session(
                &[member(a), member(b)],
                "",
                "cheap",
                Duration::from_secs(3600),
            )
            .unwrap();
        assert!(!hit);
        assert_ne!(s1, s2);
    }

    #[test]
    fn zero_max_age_never_hits_cache() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example").unwrap();
        let (s1, _) = index
            .find_or_create_session(&[member(a)], "", "cheap", Duration::ZERO)
            .unwrap();
        let (s2, hit) = index
            .find_or_create_session(&[member(a)], "", "cheap", Duration::ZERO)
            .unwrap();
        assert!(!hit);
        assert_ne!(s1, s2);
    }

    #[test]
    fn session_dir_uses_creation_date() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example").unwrap();
        let (sid, _) = index
            .find_or_create_session(&[member(a)], "", "full", Duration::from_secs(60))
            .unwrap();
        let row = index.session(sid).unwrap().unwrap();
        let date = row.created_at.split('T').next().unwrap();
        assert_eq!(row.session_dir, format!("sessions/{}-{}", date, sid));
    }

    #[test]
    fn artifact_upsert_replaces_hash() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let url_id = index.insert_url("https://a.example").unwrap();

        let stored = StoredArtifact {
            kind: ArtifactKind::RawHtml,
            file_path: "/tmp/1/raw.html".into(),
            content_hash: "aaa".into(),
            size_bytes: 10,
        };
        index.insert_artifact(url_id, &stored).unwrap();

        let replaced = StoredArtifact {
            content_hash: "bbb".into(),
            ..stored
        };
        index.insert_artifact(url_id, &replaced).unwrap();

        assert_eq!(
            index.artifact_hash(url_id, ArtifactKind::RawHtml).unwrap(),
            Some("bbb".to_string())
        );
    }

    #[test]
    fn url_rows_where_respects_session_join() {
        let index = RelationalIndex::open_in_memory().unwrap();
        let a = index.insert_url("https://a.example").unwrap();
        let _b = index.insert_url("https://b.example").unwrap();
        let (sid, _) = index
            .find_or_create_session(&[member(a)], "", "cheap", Duration::from_secs(60))
            .unwrap();

        let all = index.url_rows_where("1 = 1", &[], None).unwrap();
        assert_eq!(all.len(), 2);

        let in_session = index.url_rows_where("1 = 1", &[], Some(sid)).unwrap();
        assert_eq!(in_session.len(), 1);
        assert_eq!(in_session[0].id, a);
    }

    #[test]
    fn placeholder_shift() {
        assert_eq!(
            shift_placeholders("u.content_type = ?1 AND u.section_count > ?2", 1),
            "u.content_type = ?2 AND u.section_count > ?3"
        );
    }
}
