use std::collections::{BTreeSet, HashMap};

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map};

/// Timesheet periods are global pay periods identified by their date range.
/// The union of all sources' periods is created up front, then the sheets
/// themselves follow.
pub fn merge_timesheets(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    let mut all_periods: BTreeSet<(String, String)> = BTreeSet::new();
    for (_, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT start_date, end_date FROM timesheet_periods")?;
        let periods = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        all_periods.extend(periods);
    }
    for (start_date, end_date) in &all_periods {
        target.execute(
            "INSERT OR IGNORE INTO timesheet_periods(start_date, end_date) VALUES(?, ?)",
            (start_date, end_date),
        )?;
    }

    let mut period_by_range: HashMap<(String, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, start_date, end_date FROM timesheet_periods")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, start_date, end_date) = row?;
        period_by_range.insert((start_date, end_date), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT t.id, t.leader_id, t.submitted, t.paid, p.start_date, p.end_date
             FROM timesheets t JOIN timesheet_periods p ON p.id = t.period_id",
        )?;
        let timesheets = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, leader_id, submitted, paid, start_date, end_date) in timesheets {
            if maps.timesheets.contains(name, foreign_id) {
                continue;
            }
            let local_leader = idmap::require(&maps.leaders, "leader", name, leader_id)?;
            let local_period = period_by_range[&(start_date, end_date)];
            target.execute(
                "INSERT INTO timesheets(period_id, leader_id, submitted, paid) VALUES(?, ?, ?, ?)",
                (local_period, local_leader, submitted, paid),
            )?;
            maps.timesheets.record(name, foreign_id, target.last_insert_rowid());
        }
    }

    maps.timesheets.save(target)?;
    Ok(())
}

pub fn merge_timesheet_entries(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();

    // Entry types dedup by name, local to this phase; nothing later refers
    // to them by id.
    let mut type_map = new_ids_map(names.iter().map(String::as_str));
    let mut types_by_name: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM timesheet_entry_types")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        types_by_name.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name FROM timesheet_entry_types")?;
        let types = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, type_name) in types {
            let local_id = match types_by_name.get(&type_name) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO timesheet_entry_types(name) VALUES(?)",
                        [&type_name],
                    )?;
                    let local_id = target.last_insert_rowid();
                    types_by_name.insert(type_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut type_map, name, foreign_id, local_id);
        }
    }

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, timesheet_id, entry_type_id, date, start_time, end_time, description
             FROM timesheet_entries",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, timesheet_id, entry_type_id, date, start_time, end_time, description)
            in entries
        {
            if maps.timesheet_entries.contains(name, foreign_id) {
                continue;
            }
            let local_timesheet =
                idmap::require(&maps.timesheets, "timesheet", name, timesheet_id)?;
            let local_type =
                idmap::require(&type_map, "timesheet entry type", name, entry_type_id)?;
            target.execute(
                "INSERT INTO timesheet_entries(timesheet_id, entry_type_id, date, start_time,
                                               end_time, description)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    local_timesheet,
                    local_type,
                    &date,
                    &start_time,
                    &end_time,
                    &description,
                ),
            )?;
            maps.timesheet_entries.record(name, foreign_id, target.last_insert_rowid());
        }
    }

    maps.timesheet_entries.save(target)?;
    Ok(())
}

pub fn merge_journals(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, activity_id, name, school_year_division_id, risks, plan, evaluation
             FROM journals",
        )?;
        let journals = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, activity_id, journal_name, division, risks, plan, evaluation) in journals {
            if maps.journals.contains(name, foreign_id) {
                continue;
            }
            let local_activity =
                idmap::require(&maps.activities, "activity", name, activity_id)?;
            let division = idmap::resolve_opt(
                &maps.school_year_divisions,
                "school year division",
                name,
                division,
            )?;
            target.execute(
                "INSERT INTO journals(activity_id, name, school_year_division_id, risks, plan,
                                      evaluation)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    local_activity,
                    &journal_name,
                    division,
                    &risks,
                    &plan,
                    &evaluation,
                ),
            )?;
            let local_id = target.last_insert_rowid();

            let mut leader_stmt =
                source.prepare("SELECT leader_id FROM journal_leaders WHERE journal_id = ?")?;
            let leader_ids = leader_stmt
                .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for leader_id in leader_ids {
                let local_leader = idmap::require(&maps.leaders, "leader", name, leader_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO journal_leaders(journal_id, leader_id) VALUES(?, ?)",
                    (local_id, local_leader),
                )?;
            }

            let mut part_stmt = source
                .prepare("SELECT participant_id FROM journal_participants WHERE journal_id = ?")?;
            let participant_ids = part_stmt
                .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for participant_id in participant_ids {
                let local_participant = idmap::require(
                    &maps.registration_participants,
                    "registration participant",
                    name,
                    participant_id,
                )?;
                target.execute(
                    "INSERT OR IGNORE INTO journal_participants(journal_id, participant_id)
                     VALUES(?, ?)",
                    (local_id, local_participant),
                )?;
            }

            let mut time_stmt = source.prepare(
                "SELECT day_of_week, start_time, end_time FROM journal_times WHERE journal_id = ?",
            )?;
            let times = time_stmt
                .query_map([foreign_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (day_of_week, start_time, end_time) in times {
                target.execute(
                    "INSERT INTO journal_times(journal_id, day_of_week, start_time, end_time)
                     VALUES(?, ?, ?, ?)",
                    (local_id, day_of_week, &start_time, &end_time),
                )?;
            }

            maps.journals.record(name, foreign_id, local_id);
        }
    }

    maps.journals.save(target)?;
    Ok(())
}

pub fn merge_journal_entries(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source
            .prepare("SELECT id, journal_id, date, period_id, agenda FROM journal_entries")?;
        let entries = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, journal_id, date, period, agenda) in entries {
            if maps.journal_entries.contains(name, foreign_id) {
                continue;
            }
            let local_journal = idmap::require(&maps.journals, "journal", name, journal_id)?;
            let period = idmap::resolve_opt(
                &maps.school_year_periods,
                "school year period",
                name,
                period,
            )?;
            target.execute(
                "INSERT INTO journal_entries(journal_id, date, period_id, agenda)
                 VALUES(?, ?, ?, ?)",
                (local_journal, &date, period, &agenda),
            )?;
            let local_id = target.last_insert_rowid();

            for (table, column) in [
                ("journal_entry_participants", "participant_id"),
                ("journal_entry_instructed", "participant_id"),
            ] {
                let mut part_stmt = source.prepare(&format!(
                    "SELECT {column} FROM {table} WHERE journal_entry_id = ?"
                ))?;
                let participant_ids = part_stmt
                    .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                for participant_id in participant_ids {
                    let local_participant = idmap::require(
                        &maps.registration_participants,
                        "registration participant",
                        name,
                        participant_id,
                    )?;
                    target.execute(
                        &format!(
                            "INSERT OR IGNORE INTO {table}(journal_entry_id, {column})
                             VALUES(?, ?)"
                        ),
                        (local_id, local_participant),
                    )?;
                }
            }

            let mut leader_stmt = source.prepare(
                "SELECT timesheet_id, start_time, end_time FROM journal_leader_entries
                 WHERE journal_entry_id = ?",
            )?;
            let leader_entries = leader_stmt
                .query_map([foreign_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (timesheet_id, start_time, end_time) in leader_entries {
                let local_timesheet =
                    idmap::require(&maps.timesheets, "timesheet", name, timesheet_id)?;
                target.execute(
                    "INSERT INTO journal_leader_entries(journal_entry_id, timesheet_id,
                                                        start_time, end_time)
                     VALUES(?, ?, ?, ?)",
                    (local_id, local_timesheet, &start_time, &end_time),
                )?;
            }

            maps.journal_entries.record(name, foreign_id, local_id);
        }
    }

    maps.journal_entries.save(target)?;
    Ok(())
}
