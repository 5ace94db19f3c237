use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};

use rusqlite::Connection;

use crate::error::MergeError;

/// Per-source mapping from source-local ids to target ids for one entity
/// type. Sources are keyed by connection name.
pub type IdsMap = BTreeMap<String, HashMap<i64, i64>>;

/// A fresh map with one empty entry per source connection.
pub fn new_ids_map<'a>(sources: impl IntoIterator<Item = &'a str>) -> IdsMap {
    sources
        .into_iter()
        .map(|name| (name.to_string(), HashMap::new()))
        .collect()
}

pub fn record(map: &mut IdsMap, connection: &str, foreign_id: i64, local_id: i64) {
    map.entry(connection.to_string())
        .or_default()
        .insert(foreign_id, local_id);
}

pub fn lookup(map: &IdsMap, connection: &str, foreign_id: i64) -> Option<i64> {
    map.get(connection)
        .and_then(|m| m.get(&foreign_id))
        .copied()
}

/// Resolve a mandatory foreign key. A miss means the referenced entity's
/// phase has not run, which is fatal for the run.
pub fn require(
    map: &IdsMap,
    model: &'static str,
    connection: &str,
    foreign_id: i64,
) -> Result<i64, MergeError> {
    lookup(map, connection, foreign_id).ok_or_else(|| MergeError::MissingMapping {
        model,
        connection: connection.to_string(),
        foreign_id,
    })
}

/// Resolve a nullable foreign key: NULL stays NULL, a non-NULL value must
/// resolve.
pub fn resolve_opt(
    map: &IdsMap,
    model: &'static str,
    connection: &str,
    foreign_id: Option<i64>,
) -> Result<Option<i64>, MergeError> {
    match foreign_id {
        Some(id) => Ok(Some(require(map, model, connection, id)?)),
        None => Ok(None),
    }
}

/// Identity map backed by the `imported_ids_map` table in the target
/// database. Entries are append-only: `save` uses insert-or-ignore on the
/// unique `(connection, model_name, foreign_id)` triple, so an entry is
/// either fully readable afterwards or not present.
#[derive(Debug, Default)]
pub struct PersistentIdsMap {
    model_name: String,
    map: IdsMap,
}

impl PersistentIdsMap {
    pub fn load(conn: &Connection, model_name: &str, sources: &[String]) -> anyhow::Result<Self> {
        let mut map = IdsMap::new();
        let mut stmt = conn.prepare(
            "SELECT foreign_id, local_id FROM imported_ids_map
             WHERE model_name = ? AND connection = ?",
        )?;
        for source in sources {
            let entries = stmt
                .query_map((model_name, source), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<HashMap<_, _>, _>>()?;
            map.insert(source.clone(), entries);
        }
        Ok(Self {
            model_name: model_name.to_string(),
            map,
        })
    }

    pub fn contains(&self, connection: &str, foreign_id: i64) -> bool {
        lookup(&self.map, connection, foreign_id).is_some()
    }

    pub fn record(&mut self, connection: &str, foreign_id: i64, local_id: i64) {
        record(&mut self.map, connection, foreign_id, local_id);
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO imported_ids_map(model_name, connection, foreign_id, local_id)
             VALUES(?, ?, ?, ?)",
        )?;
        for (connection_name, entries) in &self.map {
            for (foreign_id, local_id) in entries {
                stmt.execute((&self.model_name, connection_name, foreign_id, local_id))?;
            }
        }
        Ok(())
    }
}

impl Deref for PersistentIdsMap {
    type Target = IdsMap;

    fn deref(&self) -> &IdsMap {
        &self.map
    }
}

impl DerefMut for PersistentIdsMap {
    fn deref_mut(&mut self) -> &mut IdsMap {
        &mut self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute(
            "CREATE TABLE imported_ids_map(
                id INTEGER PRIMARY KEY,
                model_name TEXT NOT NULL,
                connection TEXT NOT NULL,
                foreign_id INTEGER NOT NULL,
                local_id INTEGER NOT NULL,
                UNIQUE(connection, model_name, foreign_id)
            )",
            [],
        )
        .expect("create imported_ids_map");
        conn
    }

    #[test]
    fn require_reports_missing_mapping() {
        let map = new_ids_map(["alfa"]);
        let err = require(&map, "user", "alfa", 7).unwrap_err();
        assert!(err.to_string().contains("user id 7"));
        assert!(err.to_string().contains("alfa"));
    }

    #[test]
    fn persistent_map_roundtrip_is_append_only() {
        let conn = map_conn();
        let sources = vec!["alfa".to_string()];

        let mut ids = PersistentIdsMap::load(&conn, "activities", &sources).unwrap();
        ids.record("alfa", 1, 10);
        ids.record("alfa", 2, 20);
        ids.save(&conn).unwrap();

        // A second save with a conflicting value must not overwrite.
        let mut again = PersistentIdsMap::load(&conn, "activities", &sources).unwrap();
        assert_eq!(lookup(&again, "alfa", 1), Some(10));
        again.record("alfa", 1, 99);
        again.save(&conn).unwrap();

        let reloaded = PersistentIdsMap::load(&conn, "activities", &sources).unwrap();
        assert_eq!(lookup(&reloaded, "alfa", 1), Some(10));
        assert_eq!(lookup(&reloaded, "alfa", 2), Some(20));
    }
}
