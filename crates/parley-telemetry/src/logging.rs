use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{span, Level};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const LOG_SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    CREATE TABLE IF NOT EXISTS job_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        logged_at TEXT NOT NULL,
        level TEXT NOT NULL,
        target TEXT NOT NULL,
        message TEXT NOT NULL,
        job_id TEXT,
        step TEXT,
        fields TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_job_logs_job ON job_logs(job_id, id);
    CREATE INDEX IF NOT EXISTS idx_job_logs_level ON job_logs(level);
";

/// A persisted warning or error, attributed to the job and pipeline step it came from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub logged_at: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub job_id: Option<String>,
    pub step: Option<String>,
    pub fields: Option<Value>,
}

/// Filters for [`SqliteLogSink::query`]. Results are newest first.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<Level>,
    pub job_id: Option<String>,
    pub step: Option<String>,
    /// Substring match on the event target (module path).
    pub target: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl LogQuery {
    fn to_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        let mut bind = |clause: &str, arg: Box<dyn ToSql>| {
            args.push(arg);
            clauses.push(format!("{clause} ?{}", args.len()));
        };

        if let Some(level) = self.level {
            bind("level =", Box::new(level.as_str().to_string()));
        }
        if let Some(job_id) = &self.job_id {
            bind("job_id =", Box::new(job_id.clone()));
        }
        if let Some(step) = &self.step {
            bind("step =", Box::new(step.clone()));
        }
        if let Some(target) = &self.target {
            bind("target LIKE", Box::new(format!("%{target}%")));
        }
        if let Some(since) = self.since {
            bind("logged_at >=", Box::new(since.to_rfc3339()));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT id, logged_at, level, target, message, job_id, step, fields
             FROM job_logs{filter} ORDER BY id DESC LIMIT {}",
            self.limit.unwrap_or(100)
        );
        (sql, args)
    }
}

/// SQLite store for WARN and ERROR events.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(LOG_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Best effort: a failed write is dropped rather than logged, which would recurse.
    fn append(&self, level: Level, target: &str, event: &EventFields) {
        let fields = (!event.extra.is_empty())
            .then(|| Value::Object(event.extra.clone()).to_string());
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO job_logs (logged_at, level, target, message, job_id, step, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Utc::now().to_rfc3339(),
                level.as_str(),
                target,
                event.message.as_deref().unwrap_or_default(),
                event.scope.job_id,
                event.scope.step,
                fields,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let (sql, args) = q.to_sql();
        let args: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), |row| {
            let fields: Option<String> = row.get(7)?;
            Ok(LogRecord {
                id: row.get(0)?,
                logged_at: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                job_id: row.get(5)?,
                step: row.get(6)?,
                fields: fields.and_then(|f| serde_json::from_str(&f).ok()),
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM job_logs", [], |row| row.get(0))
    }
}

/// Job attribution carried by spans and events.
#[derive(Clone, Debug, Default)]
struct JobScope {
    job_id: Option<String>,
    step: Option<String>,
}

impl JobScope {
    fn is_empty(&self) -> bool {
        self.job_id.is_none() && self.step.is_none()
    }

    /// Fill whatever is still missing from an enclosing scope.
    fn inherit(&mut self, outer: &JobScope) {
        if self.job_id.is_none() {
            self.job_id.clone_from(&outer.job_id);
        }
        if self.step.is_none() {
            self.step.clone_from(&outer.step);
        }
    }
}

#[derive(Default)]
struct EventFields {
    message: Option<String>,
    scope: JobScope,
    extra: Map<String, Value>,
}

impl EventFields {
    fn set(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(text_of(value)),
            "job_id" => self.scope.job_id = Some(text_of(value)),
            "step" => self.scope.step = Some(text_of(value)),
            name => {
                self.extra.insert(name.to_string(), value);
            }
        }
    }
}

fn text_of(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        let text = if field.name() == "message" {
            text
        } else {
            text.trim_matches('"').to_string()
        };
        self.set(field, Value::String(text));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.set(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.set(field, value.into());
    }
}

/// `tracing` layer persisting WARN+ events, attributed through the span stack.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = EventFields::default();
        attrs.record(&mut fields);
        if fields.scope.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(fields.scope);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);

        // Innermost span wins.
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(outer) = span.extensions().get::<JobScope>() {
                    fields.scope.inherit(outer);
                }
            }
        }

        self.sink.append(level, event.metadata().target(), &fields);
    }
}
