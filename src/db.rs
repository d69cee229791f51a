use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql, Transaction};
use thiserror::Error;

use crate::models::{self, Event, EventPatch, EventQuery, NewEvent};
use crate::normalize::{self, ValidationError};
use crate::utils;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("an event titled {title:?} from {source_url} already exists")]
    Duplicate { source_url: String, title: String },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unable to prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

const COLUMNS: &str = "id, title, description, date, location, image_url, price, category, \
                       ticket_url, popular, is_new, source_url, last_updated";

/// SQLite-backed event store. Every call holds the connection lock for one statement or
/// transaction, so writers exclude each other and readers never see a half-applied upsert.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        utils::ensure_parent(path)?;
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS events(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                location TEXT NOT NULL,
                image_url TEXT NOT NULL,
                price TEXT NOT NULL,
                category TEXT NOT NULL,
                ticket_url TEXT NOT NULL,
                popular INTEGER NOT NULL DEFAULT 0,
                is_new INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                category_key TEXT NOT NULL,
                search_text TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS events_identity ON events(source_url, title);
            CREATE INDEX IF NOT EXISTS events_category ON events(category_key);",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn create(&self, fields: NewEvent) -> Result<Event> {
        normalize::validate(&fields)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if find_identity(&tx, &fields.source_url, &fields.title)?.is_some() {
            return Err(StoreError::Duplicate {
                source_url: fields.source_url,
                title: fields.title,
            });
        }
        let event = insert(&tx, fields)?;
        tx.commit()?;
        Ok(event)
    }

    pub fn get(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.conn()?;
        select_by_id(&conn, id)
    }

    pub fn get_all(&self) -> Result<Vec<Event>> {
        self.query(&EventQuery::default())
    }

    pub fn get_by_category(&self, category: &str) -> Result<Vec<Event>> {
        self.query(&EventQuery::default().category(category))
    }

    pub fn search(&self, query: &str) -> Result<Vec<Event>> {
        self.query(&EventQuery::default().search(query))
    }

    /// Conjunction of the query's search and category filters; no filters selects everything.
    pub fn query(&self, query: &EventQuery) -> Result<Vec<Event>> {
        let search = query.search_term();
        let category = query.category_key();

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();
        if let Some(ref term) = search {
            clauses.push("instr(search_text, ?) > 0");
            values.push(term);
        }
        if let Some(ref key) = category {
            clauses.push("category_key = ?");
            values.push(key);
        }

        let mut sql = format!("SELECT {COLUMNS} FROM events");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(values.as_slice(), event_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Merges `patch` over the stored row. Returns `None` for an unknown id.
    pub fn update(&self, id: i64, patch: EventPatch) -> Result<Option<Event>> {
        let supplied = patch.supplied_text_fields();
        let empty: Vec<&'static str> = supplied
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !empty.is_empty() {
            return Err(ValidationError { fields: empty }.into());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let event = match apply_patch(&tx, id, patch)? {
            Some(event) => event,
            None => return Ok(None),
        };
        tx.commit()?;
        Ok(Some(event))
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn find_by_identity(&self, source_url: &str, title: &str) -> Result<Option<Event>> {
        let conn = self.conn()?;
        find_identity(&conn, source_url, title)
    }

    /// Updates the row sharing `fields`' (source_url, title) identity, or creates one.
    pub fn upsert(&self, fields: NewEvent) -> Result<(Event, UpsertOutcome)> {
        normalize::validate(&fields)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let result = match find_identity(&tx, &fields.source_url, &fields.title)? {
            Some(existing) => {
                let event = apply_patch(&tx, existing.id, fields.into())?
                    .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                (event, UpsertOutcome::Updated)
            }
            None => (insert(&tx, fields)?, UpsertOutcome::Created),
        };
        tx.commit()?;
        Ok(result)
    }
}

fn insert(tx: &Transaction<'_>, fields: NewEvent) -> Result<Event> {
    let now = Utc::now();
    tx.execute(
        "INSERT INTO events (title, description, date, location, image_url, price, category,
                             ticket_url, popular, is_new, source_url, last_updated,
                             category_key, search_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            fields.title,
            fields.description,
            fields.date,
            fields.location,
            fields.image_url,
            fields.price,
            fields.category,
            fields.ticket_url,
            fields.popular,
            fields.is_new,
            fields.source_url,
            now,
            models::category_key(&fields.category),
            models::search_text(&fields.title, &fields.description, &fields.location),
        ],
    )?;
    Ok(Event {
        id: tx.last_insert_rowid(),
        title: fields.title,
        description: fields.description,
        date: fields.date,
        location: fields.location,
        image_url: fields.image_url,
        price: fields.price,
        category: fields.category,
        ticket_url: fields.ticket_url,
        popular: fields.popular,
        is_new: fields.is_new,
        source_url: fields.source_url,
        last_updated: now,
    })
}

fn apply_patch(tx: &Transaction<'_>, id: i64, patch: EventPatch) -> Result<Option<Event>> {
    let mut event = match select_by_id(tx, id)? {
        Some(event) => event,
        None => return Ok(None),
    };
    patch.apply(&mut event);

    if let Some(other) = find_identity(tx, &event.source_url, &event.title)? {
        if other.id != id {
            return Err(StoreError::Duplicate {
                source_url: event.source_url,
                title: event.title,
            });
        }
    }

    event.last_updated = refreshed(event.last_updated);
    tx.execute(
        "UPDATE events SET title = ?2, description = ?3, date = ?4, location = ?5,
                image_url = ?6, price = ?7, category = ?8, ticket_url = ?9, popular = ?10,
                is_new = ?11, source_url = ?12, last_updated = ?13, category_key = ?14,
                search_text = ?15
         WHERE id = ?1",
        params![
            id,
            event.title,
            event.description,
            event.date,
            event.location,
            event.image_url,
            event.price,
            event.category,
            event.ticket_url,
            event.popular,
            event.is_new,
            event.source_url,
            event.last_updated,
            models::category_key(&event.category),
            models::search_text(&event.title, &event.description, &event.location),
        ],
    )?;
    Ok(Some(event))
}

/// `last_updated` must move forward on every write, even within one clock tick.
fn refreshed(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

fn select_by_id(conn: &Connection, id: i64) -> Result<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM events WHERE id = ?1"),
            params![id],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

fn find_identity(conn: &Connection, source_url: &str, title: &str) -> Result<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM events WHERE source_url = ?1 AND title = ?2"),
            params![source_url, title],
            event_from_row,
        )
        .optional()?;
    Ok(event)
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: row.get(3)?,
        location: row.get(4)?,
        image_url: row.get(5)?,
        price: row.get(6)?,
        category: row.get(7)?,
        ticket_url: row.get(8)?,
        popular: row.get(9)?,
        is_new: row.get(10)?,
        source_url: row.get(11)?,
        last_updated: row.get(12)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;

    pub(crate) fn sample(title: &str, category: &str, location: &str) -> NewEvent {
        NewEvent {
            title: title.to_string(),
            description: format!("{title} description"),
            date: "Dec 3, 2023 • 8:00 PM".to_string(),
            location: location.to_string(),
            image_url: "https://images.example.com/event.jpg".to_string(),
            price: "$35.00".to_string(),
            category: category.to_string(),
            ticket_url: "https://tickets.example.com/event".to_string(),
            popular: false,
            is_new: false,
            source_url: "https://whatson.example.com".to_string(),
        }
    }

    fn store() -> Store {
        Store::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let store = store();
        let a = store
            .create(sample("Vivid Sydney", "Festival", "Sydney Opera House, Sydney"))
            .expect("create a");
        let b = store
            .create(sample("Comedy Night", "Comedy", "Enmore Theatre, Newtown"))
            .expect("create b");
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.get(1).expect("get").as_ref(), Some(&a));
    }

    #[test]
    fn create_without_title_leaves_store_unchanged() {
        let store = store();
        let mut fields = sample("", "Music", "Sydney");
        fields.title = "  ".to_string();

        match store.create(fields) {
            Err(StoreError::Validation(err)) => assert_eq!(err.fields, vec!["title"]),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn create_rejects_existing_identity() {
        let store = store();
        store
            .create(sample("Vivid Sydney", "Festival", "Sydney"))
            .expect("first create");
        let err = store
            .create(sample("Vivid Sydney", "Festival", "Sydney"))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn category_filter_ignores_case() {
        let store = store();
        store
            .create(sample("Sydney Music Festival", "Music", "Olympic Park"))
            .expect("create");
        store
            .create(sample("Film Festival", "Film", "State Theatre"))
            .expect("create");

        let music = store.get_by_category("music").expect("by category");
        assert_eq!(music.len(), 1);
        assert_eq!(music[0].category, "Music");
        assert!(store.get_by_category("mus").expect("partial").is_empty());
    }

    #[test]
    fn search_matches_location_substring() {
        let store = store();
        store
            .create(sample("Vivid Sydney", "Festival", "Sydney Opera House, Sydney"))
            .expect("create");
        store
            .create(sample("Bondi Beach Festival", "Festival", "Bondi Beach, Sydney"))
            .expect("create");

        let hits = store.search("opera").expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].location, "Sydney Opera House, Sydney");

        let hits = store.search("FESTIVAL").expect("search title");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Bondi Beach Festival");
    }

    #[test]
    fn query_combines_search_and_category() {
        let store = store();
        store
            .create(sample("Bondi Beach Festival", "Festival", "Bondi Beach"))
            .expect("create");
        store
            .create(sample("Bondi Food Markets", "Food", "Bondi Junction"))
            .expect("create");

        let both = store
            .query(&EventQuery::default().search("bondi").category("FOOD"))
            .expect("query");
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].title, "Bondi Food Markets");

        let blank = store
            .query(&EventQuery::default().search("  ").category(""))
            .expect("blank query");
        assert_eq!(blank.len(), 2);
    }

    #[test]
    fn partial_update_preserves_other_fields() {
        let store = store();
        let created = store
            .create(sample("Film Festival", "Film", "State Theatre"))
            .expect("create");
        std::thread::sleep(std::time::Duration::from_millis(5));

        let patch = EventPatch {
            price: Some("$10".to_string()),
            ..Default::default()
        };
        let updated = store
            .update(created.id, patch)
            .expect("update")
            .expect("row exists");

        assert_eq!(updated.price, "$10");
        assert_eq!(updated.title, created.title);
        assert_eq!(updated.description, created.description);
        assert_eq!(updated.location, created.location);
        assert!(updated.last_updated > created.last_updated);
        assert_eq!(store.get(created.id).expect("get"), Some(updated));
    }

    #[test]
    fn update_unknown_id_is_none() {
        let store = store();
        let patch = EventPatch {
            price: Some("$10".to_string()),
            ..Default::default()
        };
        assert!(store.update(42, patch).expect("update").is_none());
    }

    #[test]
    fn update_rejects_blank_fields() {
        let store = store();
        let created = store
            .create(sample("Film Festival", "Film", "State Theatre"))
            .expect("create");
        let patch = EventPatch {
            location: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(created.id, patch),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn delete_then_get_is_not_found_and_ids_are_not_reused() {
        let store = store();
        let first = store
            .create(sample("Film Festival", "Film", "State Theatre"))
            .expect("create");
        assert!(store.delete(first.id).expect("delete"));
        assert!(store.get(first.id).expect("get").is_none());
        assert!(!store.delete(first.id).expect("second delete"));

        let next = store
            .create(sample("Comedy Night", "Comedy", "Enmore"))
            .expect("create");
        assert_eq!(next.id, 2);
    }

    #[test]
    fn upsert_collapses_on_identity() {
        let store = store();
        let (first, outcome) = store
            .upsert(sample("Vivid Sydney", "Festival", "Sydney"))
            .expect("first upsert");
        assert_eq!(outcome, UpsertOutcome::Created);

        let mut changed = sample("Vivid Sydney", "Festival", "Sydney");
        changed.price = "$99".to_string();
        let (second, outcome) = store.upsert(changed).expect("second upsert");

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.price, "$99");
        assert!(second.last_updated > first.last_updated);
        assert_eq!(store.count().expect("count"), 1);

        let found = store
            .find_by_identity("https://whatson.example.com", "Vivid Sydney")
            .expect("lookup");
        assert_eq!(found.map(|e| e.id), Some(first.id));
    }

    #[test]
    fn file_backed_store_keeps_rows_across_reopen() {
        let dir = std::env::temp_dir().join(format!("event-catalog-test-{}", std::process::id()));
        let path = dir.join("events.sqlite");
        let _ = std::fs::remove_file(&path);

        let id = {
            let store = Store::open(&path).expect("open");
            store
                .create(sample("Film Festival", "Film", "State Theatre"))
                .expect("create")
                .id
        };
        let reopened = Store::open(&path).expect("reopen");
        assert_eq!(
            reopened.get(id).expect("get").map(|e| e.title),
            Some("Film Festival".to_string())
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn concurrent_upserts_keep_one_row() {
        let store = Arc::new(store());
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for round in 0..50 {
                        let mut fields = sample("Vivid Sydney", "Festival", "Sydney Opera House");
                        fields.description = format!("worker {worker} round {round}");
                        store.upsert(fields).expect("upsert");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker thread");
        }

        assert_eq!(store.count().expect("count"), 1);
        let ids: Vec<i64> = store.get_all().expect("all").iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1]);
    }
}
