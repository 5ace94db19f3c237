use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map};

/// Permissions are never created in the target: source permissions map onto
/// existing target permissions by their `(codename, model)` natural key, and
/// unmatched ones are silently dropped.
pub fn load_permissions(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let names = ctx.source_names();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut local_ids: HashMap<(String, String), i64> = HashMap::new();
    let mut stmt = ctx
        .target
        .prepare("SELECT id, codename, model FROM auth_permissions")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, codename, model) = row?;
        local_ids.insert((codename, model), id);
    }
    drop(stmt);

    for (name, source) in &ctx.sources {
        let mut stmt = source.prepare("SELECT id, codename, model FROM auth_permissions")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (foreign_id, codename, model) = row?;
            if let Some(local_id) = local_ids.get(&(codename, model)) {
                idmap::record(&mut map, name, foreign_id, *local_id);
            }
        }
    }

    ctx.maps.permissions = map;
    Ok(())
}

pub fn merge_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let names = ctx.source_names();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = ctx.target.prepare("SELECT id, name FROM auth_groups")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in &ctx.sources {
        let mut stmt = source.prepare("SELECT id, name FROM auth_groups")?;
        let groups = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, group_name) in groups {
            let local_id = match existing.get(&group_name) {
                Some(id) => *id,
                None => {
                    ctx.target
                        .execute("INSERT INTO auth_groups(name) VALUES(?)", [&group_name])?;
                    let local_id = ctx.target.last_insert_rowid();
                    existing.insert(group_name.clone(), local_id);
                    local_id
                }
            };
            // Union the group's permissions; unmapped ones were dropped by
            // the permissions phase.
            let mut perm_stmt = source
                .prepare("SELECT permission_id FROM auth_group_permissions WHERE group_id = ?")?;
            let perm_ids = perm_stmt
                .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for perm_id in perm_ids {
                if let Some(local_perm) = idmap::lookup(&ctx.maps.permissions, name, perm_id) {
                    ctx.target.execute(
                        "INSERT OR IGNORE INTO auth_group_permissions(group_id, permission_id)
                         VALUES(?, ?)",
                        (local_id, local_perm),
                    )?;
                }
            }
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    ctx.maps.groups = map;
    Ok(())
}

#[derive(Debug, Clone)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
    date_joined: String,
}

fn read_users(conn: &Connection) -> anyhow::Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, password, first_name, last_name,
                is_active, is_staff, is_superuser, date_joined
         FROM users",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get::<_, String>(2)?.to_lowercase(),
                password: row.get(3)?,
                first_name: row.get(4)?,
                last_name: row.get(5)?,
                is_active: row.get(6)?,
                is_staff: row.get(7)?,
                is_superuser: row.get(8)?,
                date_joined: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Users deduplicate by lower-cased email. A match never loses data on the
/// target side: empty name fields are filled in, boolean flags are promoted
/// to true, and the earliest join date wins.
pub fn merge_users(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let names = ctx.source_names();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let all_users = read_users(&ctx.target)?;
    let mut usernames: HashSet<String> = all_users.iter().map(|u| u.username.clone()).collect();
    let mut users_by_email: HashMap<String, UserRow> = all_users
        .into_iter()
        .map(|u| (u.email.clone(), u))
        .collect();

    for (name, source) in &ctx.sources {
        for foreign_user in read_users(source)? {
            let local_user = match users_by_email.entry(foreign_user.email.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let username = ensure_unique_username(
                        &foreign_user.username,
                        &foreign_user.email,
                        &usernames,
                    );
                    ctx.target.execute(
                        "INSERT INTO users(username, email, password, first_name, last_name,
                                           is_active, is_staff, is_superuser, date_joined)
                         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        (
                            &username,
                            &foreign_user.email,
                            &foreign_user.password,
                            &foreign_user.first_name,
                            &foreign_user.last_name,
                            foreign_user.is_active,
                            foreign_user.is_staff,
                            foreign_user.is_superuser,
                            &foreign_user.date_joined,
                        ),
                    )?;
                    let local = UserRow {
                        id: ctx.target.last_insert_rowid(),
                        username: username.clone(),
                        ..foreign_user.clone()
                    };
                    usernames.insert(username);
                    entry.insert(local)
                }
            };

            let mut updated = false;
            if !foreign_user.first_name.is_empty() && local_user.first_name.is_empty() {
                local_user.first_name = foreign_user.first_name.clone();
                updated = true;
            }
            if !foreign_user.last_name.is_empty() && local_user.last_name.is_empty() {
                local_user.last_name = foreign_user.last_name.clone();
                updated = true;
            }
            if foreign_user.is_active && !local_user.is_active {
                local_user.is_active = true;
                updated = true;
            }
            if foreign_user.is_staff && !local_user.is_staff {
                local_user.is_staff = true;
                updated = true;
            }
            if foreign_user.is_superuser && !local_user.is_superuser {
                local_user.is_superuser = true;
                updated = true;
            }
            if is_earlier(&foreign_user.date_joined, &local_user.date_joined) {
                local_user.date_joined = foreign_user.date_joined.clone();
                updated = true;
            }
            if updated {
                debug!(email = %local_user.email, "promoted user fields");
                ctx.target.execute(
                    "UPDATE users SET first_name = ?, last_name = ?, is_active = ?,
                                      is_staff = ?, is_superuser = ?, date_joined = ?
                     WHERE id = ?",
                    (
                        &local_user.first_name,
                        &local_user.last_name,
                        local_user.is_active,
                        local_user.is_staff,
                        local_user.is_superuser,
                        &local_user.date_joined,
                        local_user.id,
                    ),
                )?;
            }

            let local_user_id = local_user.id;

            let mut group_stmt =
                source.prepare("SELECT group_id FROM user_groups WHERE user_id = ?")?;
            let group_ids = group_stmt
                .query_map([foreign_user.id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for group_id in group_ids {
                let local_group = idmap::require(&ctx.maps.groups, "group", name, group_id)?;
                ctx.target.execute(
                    "INSERT OR IGNORE INTO user_groups(user_id, group_id) VALUES(?, ?)",
                    (local_user_id, local_group),
                )?;
            }

            let mut perm_stmt =
                source.prepare("SELECT permission_id FROM user_permissions WHERE user_id = ?")?;
            let perm_ids = perm_stmt
                .query_map([foreign_user.id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for perm_id in perm_ids {
                if let Some(local_perm) = idmap::lookup(&ctx.maps.permissions, name, perm_id) {
                    ctx.target.execute(
                        "INSERT OR IGNORE INTO user_permissions(user_id, permission_id)
                         VALUES(?, ?)",
                        (local_user_id, local_perm),
                    )?;
                }
            }

            idmap::record(&mut map, name, foreign_user.id, local_user_id);
        }
    }

    ctx.maps.users = map;
    Ok(())
}

/// Username collision fallback: requested name, then the email's local part,
/// then the full email, then a random suffix. Only the last tier is worth a
/// warning; everything before is deterministic.
fn ensure_unique_username(username: &str, email: &str, usernames: &HashSet<String>) -> String {
    if !usernames.contains(username) {
        return username.to_string();
    }
    let local_part = email.split('@').next().unwrap_or(email);
    if !usernames.contains(local_part) {
        return local_part.to_string();
    }
    if !usernames.contains(email) {
        return email.to_string();
    }
    let stem: String = username.chars().take(100).collect();
    let mut candidate = random_suffixed(&stem);
    while usernames.contains(&candidate) {
        candidate = random_suffixed(&stem);
    }
    warn!(username = %candidate, %email, "created random username");
    candidate
}

fn random_suffixed(stem: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", stem, &suffix[..3])
}

fn is_earlier(a: &str, b: &str) -> bool {
    match (parse_datetime(a), parse_datetime(b)) {
        (Some(a), Some(b)) => a < b,
        _ => a < b,
    }
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn username_free_is_kept() {
        let usernames = taken(&["bob"]);
        assert_eq!(
            ensure_unique_username("alice", "alice@example.com", &usernames),
            "alice"
        );
    }

    #[test]
    fn username_falls_back_to_email_local_part() {
        let usernames = taken(&["alice"]);
        assert_eq!(
            ensure_unique_username("alice", "a.smith@example.com", &usernames),
            "a.smith"
        );
    }

    #[test]
    fn username_falls_back_to_full_email() {
        let usernames = taken(&["alice"]);
        assert_eq!(
            ensure_unique_username("alice", "alice@example.com", &usernames),
            "alice@example.com"
        );
    }

    #[test]
    fn username_falls_back_to_random_suffix() {
        let usernames = taken(&["alice", "alice@example.com"]);
        let resolved = ensure_unique_username("alice", "alice@example.com", &usernames);
        assert!(resolved.starts_with("alice-"));
        assert_eq!(resolved.len(), "alice-".len() + 3);
    }

    #[test]
    fn earlier_date_comparison() {
        assert!(is_earlier("2019-09-01 08:00:00", "2020-01-01 00:00:00"));
        assert!(!is_earlier("2020-01-01 00:00:00", "2019-09-01 08:00:00"));
    }
}
