use std::collections::HashMap;

use rusqlite::OptionalExtension;

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map};

/// Leaders deduplicate through their user: once users have merged, two
/// leader rows pointing at the same person collapse into one. School-year
/// assignments and contacts are unioned onto the surviving row.
pub fn merge_leaders(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut by_user: HashMap<i64, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, user_id FROM leaders")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(1)?, row.get(0)?)))?;
    for row in rows {
        let (user_id, id) = row?;
        by_user.insert(user_id, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt =
            source.prepare("SELECT id, user_id, description, photo_file_id FROM leaders")?;
        let leaders = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, user_id, description, photo) in leaders {
            let local_user = idmap::require(&maps.users, "user", name, user_id)?;
            let local_id = match by_user.get(&local_user) {
                Some(id) => *id,
                None => {
                    let photo = idmap::resolve_opt(&maps.files, "file", name, photo)?;
                    target.execute(
                        "INSERT INTO leaders(user_id, description, photo_file_id)
                         VALUES(?, ?, ?)",
                        (local_user, &description, photo),
                    )?;
                    let local_id = target.last_insert_rowid();
                    by_user.insert(local_user, local_id);
                    local_id
                }
            };

            let mut year_stmt = source.prepare(
                "SELECT school_year_id FROM leader_school_years WHERE leader_id = ?",
            )?;
            let year_ids = year_stmt
                .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for year_id in year_ids {
                let local_year =
                    idmap::require(&maps.school_years, "school year", name, year_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO leader_school_years(leader_id, school_year_id)
                     VALUES(?, ?)",
                    (local_id, local_year),
                )?;
            }

            let mut contact_stmt = source.prepare(
                "SELECT contact_type, contact FROM leader_contacts WHERE leader_id = ?",
            )?;
            let contacts = contact_stmt
                .query_map([foreign_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (contact_type, contact) in contacts {
                let present: Option<i64> = target
                    .query_row(
                        "SELECT id FROM leader_contacts
                         WHERE leader_id = ? AND contact_type = ? AND contact = ?",
                        (local_id, &contact_type, &contact),
                        |row| row.get(0),
                    )
                    .optional()?;
                if present.is_none() {
                    target.execute(
                        "INSERT INTO leader_contacts(leader_id, contact_type, contact)
                         VALUES(?, ?, ?)",
                        (local_id, &contact_type, &contact),
                    )?;
                }
            }

            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.leaders = map;
    Ok(())
}

pub fn merge_parents(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    let mut existing: HashMap<(i64, String, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, user_id, first_name, last_name FROM parents")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    for row in rows {
        let (id, user_id, first, last) = row?;
        existing.insert((user_id, first, last), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT user_id, first_name, last_name, street, city, postal_code, phone, email
             FROM parents",
        )?;
        let parents = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (user_id, first, last, street, city, postal_code, phone, email) in parents {
            let local_user = idmap::require(&maps.users, "user", name, user_id)?;
            let key = (local_user, first.clone(), last.clone());
            if existing.contains_key(&key) {
                continue;
            }
            target.execute(
                "INSERT INTO parents(user_id, first_name, last_name, street, city, postal_code,
                                     phone, email)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    local_user,
                    &first,
                    &last,
                    &street,
                    &city,
                    &postal_code,
                    &phone,
                    &email,
                ),
            )?;
            existing.insert(key, target.last_insert_rowid());
        }
    }
    Ok(())
}

pub fn merge_participants(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    let mut existing: HashMap<(i64, String, String, Option<String>), i64> = HashMap::new();
    let mut stmt =
        target.prepare("SELECT id, user_id, first_name, last_name, birth_date FROM participants")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;
    for row in rows {
        let (id, user_id, first, last, birth) = row?;
        existing.insert((user_id, first, last, birth), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT user_id, first_name, last_name, birth_date, age_group_id, citizenship_id,
                    school_id, street, city, postal_code
             FROM participants",
        )?;
        let participants = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (user_id, first, last, birth, age_group, citizenship, school, street, city, postal)
            in participants
        {
            let local_user = idmap::require(&maps.users, "user", name, user_id)?;
            let key = (local_user, first.clone(), last.clone(), birth.clone());
            if existing.contains_key(&key) {
                continue;
            }
            let local_age = idmap::require(&maps.age_groups, "age group", name, age_group)?;
            let local_citizenship =
                idmap::require(&maps.citizenships, "citizenship", name, citizenship)?;
            let local_school = idmap::resolve_opt(&maps.schools, "school", name, school)?;
            target.execute(
                "INSERT INTO participants(user_id, first_name, last_name, birth_date,
                                          age_group_id, citizenship_id, school_id, street, city,
                                          postal_code)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    local_user,
                    &first,
                    &last,
                    &birth,
                    local_age,
                    local_citizenship,
                    local_school,
                    &street,
                    &city,
                    &postal,
                ),
            )?;
            existing.insert(key, target.last_insert_rowid());
        }
    }
    Ok(())
}

pub fn merge_group_contacts(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, user_id, name FROM group_contacts")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, user_id, contact_name) = row?;
        existing.insert((user_id, contact_name), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT user_id, name, target_group_id, school_id, phone, email FROM group_contacts",
        )?;
        let contacts = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (user_id, contact_name, target_group, school, phone, email) in contacts {
            let local_user = idmap::require(&maps.users, "user", name, user_id)?;
            let key = (local_user, contact_name.clone());
            if existing.contains_key(&key) {
                continue;
            }
            let local_target_group =
                idmap::require(&maps.target_groups, "target group", name, target_group)?;
            let local_school = idmap::resolve_opt(&maps.schools, "school", name, school)?;
            target.execute(
                "INSERT INTO group_contacts(user_id, name, target_group_id, school_id, phone,
                                            email)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    local_user,
                    &contact_name,
                    local_target_group,
                    local_school,
                    &phone,
                    &email,
                ),
            )?;
            existing.insert(key, target.last_insert_rowid());
        }
    }
    Ok(())
}

pub fn merge_billing_infos(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, user_id, name FROM billing_infos")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, user_id, billing_name) = row?;
        existing.insert((user_id, billing_name), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT user_id, name, street, city, postal_code, company_num FROM billing_infos",
        )?;
        let infos = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (user_id, billing_name, street, city, postal_code, company_num) in infos {
            let local_user = idmap::require(&maps.users, "user", name, user_id)?;
            let key = (local_user, billing_name.clone());
            if existing.contains_key(&key) {
                continue;
            }
            target.execute(
                "INSERT INTO billing_infos(user_id, name, street, city, postal_code, company_num)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    local_user,
                    &billing_name,
                    &street,
                    &city,
                    &postal_code,
                    &company_num,
                ),
            )?;
            existing.insert(key, target.last_insert_rowid());
        }
    }
    Ok(())
}

pub fn merge_agreements(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM agreements")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, active FROM agreements")?;
        let agreements = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, agreement_name, active) in agreements {
            let local_id = match existing.get(&agreement_name) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO agreements(name, active) VALUES(?, ?)",
                        (&agreement_name, active),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(agreement_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.agreements = map;
    Ok(())
}

pub fn merge_agreement_options(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, agreement_id, name FROM agreement_options")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, agreement_id, option_name) = row?;
        existing.insert((agreement_id, option_name), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt =
            source.prepare("SELECT id, agreement_id, name, required FROM agreement_options")?;
        let options = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, agreement_id, option_name, required) in options {
            let local_agreement =
                idmap::require(&maps.agreements, "agreement", name, agreement_id)?;
            let key = (local_agreement, option_name.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO agreement_options(agreement_id, name, required)
                         VALUES(?, ?, ?)",
                        (local_agreement, &option_name, required),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.agreement_options = map;
    Ok(())
}
