#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use actimerge::config::{MergeConfig, SiteConfig};
use actimerge::context::MergeContext;

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// Create a database file carrying the full schema. Used for sources (seeded
/// and then reopened read-only by the merge) and for pre-creating targets.
pub fn create_database(path: &Path) -> Connection {
    let conn = Connection::open(path).expect("open database");
    // The bundled SQLite enforces foreign keys by default; seeding must be
    // able to write dangling references, matching a read-only source.
    conn.execute("PRAGMA foreign_keys = OFF", [])
        .expect("disable foreign keys for seeding");
    actimerge::db::ensure_schema(&conn).expect("apply schema");
    conn
}

pub fn merge_config(dir: &Path, source_names: &[&str]) -> MergeConfig {
    MergeConfig {
        target: dir.join("target.sqlite3"),
        sources: source_names
            .iter()
            .map(|name| (name.to_string(), dir.join(format!("{name}.sqlite3"))))
            .collect(),
        site: SiteConfig {
            domain: "example.org".to_string(),
            name: "Example".to_string(),
        },
        migrate_command: None,
    }
}

pub fn run_merge(config: MergeConfig) -> MergeContext {
    let mut ctx = MergeContext::open(config).expect("open merge context");
    actimerge::merge::run(&mut ctx, false).expect("merge run");
    ctx
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).expect("count query")
}

pub fn seed_user(conn: &Connection, username: &str, email: &str) -> i64 {
    conn.execute(
        "INSERT INTO users(username, email, password, first_name, last_name, is_active, is_staff,
                           is_superuser, date_joined)
         VALUES(?, ?, 'pbkdf2$x', '', '', 1, 0, 0, '2020-01-01 00:00:00')",
        (username, email),
    )
    .expect("insert user");
    conn.last_insert_rowid()
}

pub fn seed_school_year(conn: &Connection, year: i64) -> i64 {
    conn.execute("INSERT INTO school_years(year, active) VALUES(?, 1)", [year])
        .expect("insert school year");
    conn.last_insert_rowid()
}

pub fn seed_activity_type(conn: &Connection, slug: &str, model: &str) -> i64 {
    conn.execute(
        "INSERT INTO activity_types(slug, name, plural, model) VALUES(?, ?, ?, ?)",
        (slug, slug, format!("{slug}s"), model),
    )
    .expect("insert activity type");
    conn.last_insert_rowid()
}

pub fn seed_course_activity(
    conn: &Connection,
    type_id: i64,
    school_year_id: i64,
    name: &str,
) -> i64 {
    conn.execute(
        "INSERT INTO activities(activity_type_id, school_year_id, name) VALUES(?, ?, ?)",
        (type_id, school_year_id, name),
    )
    .expect("insert activity");
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO courses(activity_id, allow_period_selection) VALUES(?, 1)",
        [id],
    )
    .expect("insert course row");
    id
}

pub fn seed_variant(conn: &Connection, activity_id: i64, name: &str, price: i64) -> i64 {
    conn.execute(
        "INSERT INTO activity_variants(activity_id, name, price) VALUES(?, ?, ?)",
        (activity_id, name, price),
    )
    .expect("insert variant");
    conn.last_insert_rowid()
}

pub fn seed_registration(
    conn: &Connection,
    activity_id: i64,
    variant_id: i64,
    user_id: i64,
    created: &str,
) -> i64 {
    conn.execute(
        "INSERT INTO registrations(activity_id, activity_variant_id, user_id, price, created)
         VALUES(?, ?, ?, 100, ?)",
        (activity_id, variant_id, user_id, created),
    )
    .expect("insert registration");
    let id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO course_registrations(registration_id) VALUES(?)",
        [id],
    )
    .expect("insert course registration row");
    id
}
