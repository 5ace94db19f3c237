use std::collections::{BTreeSet, HashMap};

use rusqlite::Connection;

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map, IdsMap};

/// Shared shape of the simple lookup tables: a name is the whole identity.
fn merge_named_table(
    target: &Connection,
    sources: &[(String, Connection)],
    table: &str,
) -> anyhow::Result<IdsMap> {
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare(&format!("SELECT id, name FROM {table}"))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources {
        let mut stmt = source.prepare(&format!("SELECT id, name FROM {table}"))?;
        let entries = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, entry_name) in entries {
            let local_id = match existing.get(&entry_name) {
                Some(id) => *id,
                None => {
                    target.execute(&format!("INSERT INTO {table}(name) VALUES(?)"), [&entry_name])?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(entry_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    Ok(map)
}

pub fn merge_print_setups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM print_setups")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, background_file_id FROM print_setups")?;
        let setups = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, setup_name, background) in setups {
            let local_id = match existing.get(&setup_name) {
                Some(id) => *id,
                None => {
                    let background =
                        idmap::resolve_opt(&maps.files, "file", name, background)?;
                    target.execute(
                        "INSERT INTO print_setups(name, background_file_id) VALUES(?, ?)",
                        (&setup_name, background),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(setup_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.print_setups = map;
    Ok(())
}

/// Organizations are legal entities; the IBAN is the identity, not the
/// display name, which drifts between tenants as entities get renamed.
pub fn merge_organizations(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, iban FROM organizations")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (iban, id) = row?;
        existing.insert(iban, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source
            .prepare("SELECT id, name, iban, donation_print_setup_id FROM organizations")?;
        let organizations = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, org_name, iban, print_setup) in organizations {
            let local_id = match existing.get(&iban) {
                Some(id) => *id,
                None => {
                    let print_setup = idmap::resolve_opt(
                        &maps.print_setups,
                        "print setup",
                        name,
                        print_setup,
                    )?;
                    target.execute(
                        "INSERT INTO organizations(name, iban, donation_print_setup_id)
                         VALUES(?, ?, ?)",
                        (&org_name, &iban, print_setup),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(iban, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.organizations = map;
    Ok(())
}

pub fn merge_departments(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.departments = merge_named_table(&ctx.target, &ctx.sources, "departments")?;
    Ok(())
}

pub fn merge_places(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.places = merge_named_table(&ctx.target, &ctx.sources, "places")?;
    Ok(())
}

/// Questions carry a slug used in registration forms; the slug is the
/// identity, not the display name.
pub fn merge_questions(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, slug FROM questions")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (slug, id) = row?;
        existing.insert(slug, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, slug, name, question FROM questions")?;
        let questions = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, slug, question_name, question) in questions {
            let local_id = match existing.get(&slug) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO questions(slug, name, question) VALUES(?, ?, ?)",
                        (&slug, &question_name, &question),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(slug, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.questions = map;
    Ok(())
}

/// School years are identified by their calendar year. Missing years are
/// created in ascending order so the target's ids stay chronological, and a
/// year marked active in any source stays active in the target.
pub fn merge_school_years(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut per_source: Vec<(String, Vec<(i64, i64, bool)>)> = Vec::new();
    let mut all_years: BTreeSet<i64> = BTreeSet::new();
    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, year, active FROM school_years")?;
        let years = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        all_years.extend(years.iter().map(|(_, year, _)| *year));
        per_source.push((name.clone(), years));
    }

    let mut by_year: HashMap<i64, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, year FROM school_years")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(1)?, row.get(0)?)))?;
    for row in rows {
        let (year, id) = row?;
        by_year.insert(year, id);
    }
    drop(stmt);

    for year in all_years {
        if !by_year.contains_key(&year) {
            target.execute("INSERT INTO school_years(year) VALUES(?)", [year])?;
            by_year.insert(year, target.last_insert_rowid());
        }
    }

    for (name, years) in per_source {
        for (foreign_id, year, active) in years {
            let local_id = by_year[&year];
            if active {
                target.execute("UPDATE school_years SET active = 1 WHERE id = ?", [local_id])?;
            }
            idmap::record(&mut map, &name, foreign_id, local_id);
        }
    }

    maps.school_years = map;
    Ok(())
}

pub fn merge_school_year_divisions(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt =
        target.prepare("SELECT id, school_year_id, name FROM school_year_divisions")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, school_year_id, name) = row?;
        existing.insert((school_year_id, name), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt =
            source.prepare("SELECT id, school_year_id, name FROM school_year_divisions")?;
        let divisions = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, school_year_id, division_name) in divisions {
            let local_year =
                idmap::require(&maps.school_years, "school year", name, school_year_id)?;
            let key = (local_year, division_name.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO school_year_divisions(school_year_id, name) VALUES(?, ?)",
                        (local_year, &division_name),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.school_year_divisions = map;
    Ok(())
}

pub fn merge_school_year_periods(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, division_id, name FROM school_year_periods")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, division_id, name) = row?;
        existing.insert((division_id, name), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, division_id, name, start_date, end_date FROM school_year_periods",
        )?;
        let periods = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, division_id, period_name, start_date, end_date) in periods {
            let local_division = idmap::require(
                &maps.school_year_divisions,
                "school year division",
                name,
                division_id,
            )?;
            let key = (local_division, period_name.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO school_year_periods(division_id, name, start_date, end_date)
                         VALUES(?, ?, ?, ?)",
                        (local_division, &period_name, &start_date, &end_date),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.school_year_periods = map;
    Ok(())
}

pub fn merge_stat_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.stat_groups = merge_named_table(&ctx.target, &ctx.sources, "stat_groups")?;
    Ok(())
}

fn merge_stat_grouped_table(
    ctx: &mut MergeContext,
    table: &'static str,
) -> anyhow::Result<IdsMap> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare(&format!("SELECT id, name FROM {table}"))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(&format!("SELECT id, name, stat_group_id FROM {table}"))?;
        let groups = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, group_name, stat_group_id) in groups {
            let local_id = match existing.get(&group_name) {
                Some(id) => *id,
                None => {
                    let local_stat =
                        idmap::require(&maps.stat_groups, "stat group", name, stat_group_id)?;
                    target.execute(
                        &format!("INSERT INTO {table}(name, stat_group_id) VALUES(?, ?)"),
                        (&group_name, local_stat),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(group_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    Ok(map)
}

pub fn merge_age_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.age_groups = merge_stat_grouped_table(ctx, "age_groups")?;
    Ok(())
}

pub fn merge_target_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.target_groups = merge_stat_grouped_table(ctx, "target_groups")?;
    Ok(())
}

pub fn merge_citizenships(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.maps.citizenships = merge_named_table(&ctx.target, &ctx.sources, "citizenships")?;
    Ok(())
}

pub fn merge_schools(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM schools")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, address FROM schools")?;
        let schools = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, school_name, address) in schools {
            let local_id = match existing.get(&school_name) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO schools(name, address) VALUES(?, ?)",
                        (&school_name, &address),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(school_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.schools = map;
    Ok(())
}
