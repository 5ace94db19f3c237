use std::collections::{BTreeMap, HashMap};

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::context::MergeContext;
use crate::error::MergeError;
use crate::idmap::{self, new_ids_map};

/// The concrete kind behind an activity row, read back from the
/// specialization tables rather than trusted from the type discriminator.
#[derive(Debug)]
enum ActivityDetail {
    Course {
        allow_period_selection: bool,
    },
    Event {
        start_date: Option<String>,
        end_date: Option<String>,
    },
    Orderable {
        duration_days: i64,
        due_from_days: i64,
    },
}

impl ActivityDetail {
    fn model(&self) -> &'static str {
        match self {
            ActivityDetail::Course { .. } => "course",
            ActivityDetail::Event { .. } => "event",
            ActivityDetail::Orderable { .. } => "orderable",
        }
    }
}

fn read_detail(conn: &Connection, activity_id: i64) -> anyhow::Result<Option<ActivityDetail>> {
    let course: Option<bool> = conn
        .query_row(
            "SELECT allow_period_selection FROM courses WHERE activity_id = ?",
            [activity_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(allow_period_selection) = course {
        return Ok(Some(ActivityDetail::Course {
            allow_period_selection,
        }));
    }

    let event: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT start_date, end_date FROM events WHERE activity_id = ?",
            [activity_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((start_date, end_date)) = event {
        return Ok(Some(ActivityDetail::Event {
            start_date,
            end_date,
        }));
    }

    let orderable: Option<(i64, i64)> = conn
        .query_row(
            "SELECT duration_days, due_from_days FROM orderables WHERE activity_id = ?",
            [activity_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((duration_days, due_from_days)) = orderable {
        return Ok(Some(ActivityDetail::Orderable {
            duration_days,
            due_from_days,
        }));
    }

    Ok(None)
}

pub fn merge_activity_types(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, slug FROM activity_types")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (slug, id) = row?;
        existing.insert(slug, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, slug, name, plural, model, organization_id, reg_print_setup_id,
                    decision_print_setup_id, pr_print_setup_id, bill_print_setup_id
             FROM activity_types",
        )?;
        let types = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<i64>>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, slug, type_name, plural, model, organization, reg_ps, decision_ps, pr_ps, bill_ps)
            in types
        {
            let local_id = match existing.get(&slug) {
                Some(id) => *id,
                None => {
                    let organization = idmap::resolve_opt(
                        &maps.organizations,
                        "organization",
                        name,
                        organization,
                    )?;
                    let reg_ps =
                        idmap::resolve_opt(&maps.print_setups, "print setup", name, reg_ps)?;
                    let decision_ps =
                        idmap::resolve_opt(&maps.print_setups, "print setup", name, decision_ps)?;
                    let pr_ps =
                        idmap::resolve_opt(&maps.print_setups, "print setup", name, pr_ps)?;
                    let bill_ps =
                        idmap::resolve_opt(&maps.print_setups, "print setup", name, bill_ps)?;
                    target.execute(
                        "INSERT INTO activity_types(slug, name, plural, model, organization_id,
                                                    reg_print_setup_id, decision_print_setup_id,
                                                    pr_print_setup_id, bill_print_setup_id)
                         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        (
                            &slug,
                            &type_name,
                            &plural,
                            &model,
                            organization,
                            reg_ps,
                            decision_ps,
                            pr_ps,
                            bill_ps,
                        ),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(slug, local_id);
                    local_id
                }
            };

            for question_id in
                linked_ids(source, "SELECT question_id FROM activity_type_questions
                                     WHERE activity_type_id = ?", foreign_id)?
            {
                let local_question =
                    idmap::require(&maps.questions, "question", name, question_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_type_questions(activity_type_id, question_id)
                     VALUES(?, ?)",
                    (local_id, local_question),
                )?;
            }
            for agreement_id in
                linked_ids(source, "SELECT agreement_id FROM activity_type_agreements
                                     WHERE activity_type_id = ?", foreign_id)?
            {
                let local_agreement =
                    idmap::require(&maps.agreements, "agreement", name, agreement_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_type_agreements(activity_type_id, agreement_id)
                     VALUES(?, ?)",
                    (local_id, local_agreement),
                )?;
            }
            for file_id in
                linked_ids(source, "SELECT file_id FROM activity_type_attachments
                                     WHERE activity_type_id = ?", foreign_id)?
            {
                let local_file = idmap::require(&maps.files, "file", name, file_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_type_attachments(activity_type_id, file_id)
                     VALUES(?, ?)",
                    (local_id, local_file),
                )?;
            }

            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.activity_types = map;
    Ok(())
}

pub fn merge_activity_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM activity_groups")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, color FROM activity_groups")?;
        let groups = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, group_name, color) in groups {
            let local_id = match existing.get(&group_name) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO activity_groups(name, color) VALUES(?, ?)",
                        (&group_name, &color),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(group_name, local_id);
                    local_id
                }
            };
            for type_id in
                linked_ids(source, "SELECT activity_type_id FROM activity_group_types
                                     WHERE activity_group_id = ?", foreign_id)?
            {
                let local_type =
                    idmap::require(&maps.activity_types, "activity type", name, type_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_group_types(activity_group_id, activity_type_id)
                     VALUES(?, ?)",
                    (local_id, local_type),
                )?;
            }
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.activity_groups = map;
    Ok(())
}

pub fn merge_resources(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM resources")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, leader_id FROM resources")?;
        let resources = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, resource_name, leader) in resources {
            let local_id = match existing.get(&resource_name) {
                Some(id) => *id,
                None => {
                    let leader = idmap::resolve_opt(&maps.leaders, "leader", name, leader)?;
                    target.execute(
                        "INSERT INTO resources(name, leader_id) VALUES(?, ?)",
                        (&resource_name, leader),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(resource_name, local_id);
                    local_id
                }
            };

            let mut avail_stmt = source.prepare(
                "SELECT day_of_week, start_time, end_time FROM resource_availabilities
                 WHERE resource_id = ?",
            )?;
            let availabilities = avail_stmt
                .query_map([foreign_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (day_of_week, start_time, end_time) in availabilities {
                let present: Option<i64> = target
                    .query_row(
                        "SELECT id FROM resource_availabilities
                         WHERE resource_id = ? AND day_of_week = ? AND start_time = ?
                           AND end_time = ?",
                        (local_id, day_of_week, &start_time, &end_time),
                        |row| row.get(0),
                    )
                    .optional()?;
                if present.is_none() {
                    target.execute(
                        "INSERT INTO resource_availabilities(resource_id, day_of_week, start_time,
                                                             end_time)
                         VALUES(?, ?, ?, ?)",
                        (local_id, day_of_week, &start_time, &end_time),
                    )?;
                }
            }

            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.resources = map;
    Ok(())
}

pub fn merge_resource_groups(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM resource_groups")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name FROM resource_groups")?;
        let groups = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, group_name) in groups {
            let local_id = match existing.get(&group_name) {
                Some(id) => *id,
                None => {
                    target.execute("INSERT INTO resource_groups(name) VALUES(?)", [&group_name])?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(group_name, local_id);
                    local_id
                }
            };
            for resource_id in
                linked_ids(source, "SELECT resource_id FROM resource_group_resources
                                     WHERE resource_group_id = ?", foreign_id)?
            {
                let local_resource =
                    idmap::require(&maps.resources, "resource", name, resource_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO resource_group_resources(resource_group_id, resource_id)
                     VALUES(?, ?)",
                    (local_id, local_resource),
                )?;
            }
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.resource_groups = map;
    Ok(())
}

/// Reconcile each activity's type discriminator with the specialization
/// table its row actually lives in. Sources are read-only, so disagreements
/// are recorded as in-memory overrides that the activity merge applies,
/// pointing the activity at a type of the correct kind.
pub fn fix_activities(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        sources,
        activity_type_overrides,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut fallback_by_model: HashMap<String, i64> = HashMap::new();
        let mut stmt =
            source.prepare("SELECT model, MIN(id) FROM activity_types GROUP BY model")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (model, id) = row?;
            fallback_by_model.insert(model, id);
        }
        drop(stmt);

        let mut stmt = source.prepare(
            "SELECT a.id, t.model
             FROM activities a JOIN activity_types t ON t.id = a.activity_type_id",
        )?;
        let activities = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut overrides = BTreeMap::new();
        for (activity_id, declared_model) in activities {
            let Some(detail) = read_detail(source, activity_id)? else {
                continue;
            };
            if detail.model() == declared_model {
                continue;
            }
            let Some(forced_type) = fallback_by_model.get(detail.model()) else {
                return Err(MergeError::UnknownActivityModel(format!(
                    "no activity type of kind {} exists in source {} for activity {}",
                    detail.model(),
                    name,
                    activity_id
                ))
                .into());
            };
            warn!(
                source = %name,
                activity_id,
                declared = %declared_model,
                actual = %detail.model(),
                "overriding mismatched activity type"
            );
            overrides.insert(activity_id, *forced_type);
        }
        activity_type_overrides.insert(name.clone(), overrides);
    }
    Ok(())
}

struct ActivityRow {
    id: i64,
    activity_type_id: i64,
    school_year_id: i64,
    name: String,
    description: String,
    registration_type: String,
    department_id: Option<i64>,
    place_id: Option<i64>,
    photo_file_id: Option<i64>,
    organization_id: Option<i64>,
    reg_print_setup_id: Option<i64>,
    decision_print_setup_id: Option<i64>,
    pr_print_setup_id: Option<i64>,
    bill_print_setup_id: Option<i64>,
}

pub fn merge_activities(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        activity_type_overrides,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let overrides = activity_type_overrides.get(name);
        let mut stmt = source.prepare(
            "SELECT id, activity_type_id, school_year_id, name, description, registration_type,
                    department_id, place_id, photo_file_id, organization_id, reg_print_setup_id,
                    decision_print_setup_id, pr_print_setup_id, bill_print_setup_id
             FROM activities",
        )?;
        let activities = stmt
            .query_map([], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    activity_type_id: row.get(1)?,
                    school_year_id: row.get(2)?,
                    name: row.get(3)?,
                    description: row.get(4)?,
                    registration_type: row.get(5)?,
                    department_id: row.get(6)?,
                    place_id: row.get(7)?,
                    photo_file_id: row.get(8)?,
                    organization_id: row.get(9)?,
                    reg_print_setup_id: row.get(10)?,
                    decision_print_setup_id: row.get(11)?,
                    pr_print_setup_id: row.get(12)?,
                    bill_print_setup_id: row.get(13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for activity in activities {
            if maps.activities.contains(name, activity.id) {
                continue;
            }
            let detail = read_detail(source, activity.id)?.ok_or_else(|| {
                MergeError::UnknownActivityModel(format!(
                    "activity {} ({}) from source {} has no concrete kind",
                    activity.id, activity.name, name
                ))
            })?;

            let type_id = overrides
                .and_then(|o| o.get(&activity.id))
                .copied()
                .unwrap_or(activity.activity_type_id);
            let local_type =
                idmap::require(&maps.activity_types, "activity type", name, type_id)?;
            let local_year = idmap::require(
                &maps.school_years,
                "school year",
                name,
                activity.school_year_id,
            )?;
            let department = idmap::resolve_opt(
                &maps.departments,
                "department",
                name,
                activity.department_id,
            )?;
            let place = idmap::resolve_opt(&maps.places, "place", name, activity.place_id)?;
            let photo = idmap::resolve_opt(&maps.files, "file", name, activity.photo_file_id)?;
            let organization = idmap::resolve_opt(
                &maps.organizations,
                "organization",
                name,
                activity.organization_id,
            )?;
            let reg_ps = idmap::resolve_opt(
                &maps.print_setups,
                "print setup",
                name,
                activity.reg_print_setup_id,
            )?;
            let decision_ps = idmap::resolve_opt(
                &maps.print_setups,
                "print setup",
                name,
                activity.decision_print_setup_id,
            )?;
            let pr_ps = idmap::resolve_opt(
                &maps.print_setups,
                "print setup",
                name,
                activity.pr_print_setup_id,
            )?;
            let bill_ps = idmap::resolve_opt(
                &maps.print_setups,
                "print setup",
                name,
                activity.bill_print_setup_id,
            )?;

            target.execute(
                "INSERT INTO activities(activity_type_id, school_year_id, name, description,
                                        registration_type, department_id, place_id,
                                        photo_file_id, organization_id, reg_print_setup_id,
                                        decision_print_setup_id, pr_print_setup_id,
                                        bill_print_setup_id)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    local_type,
                    local_year,
                    &activity.name,
                    &activity.description,
                    &activity.registration_type,
                    department,
                    place,
                    photo,
                    organization,
                    reg_ps,
                    decision_ps,
                    pr_ps,
                    bill_ps,
                ),
            )?;
            let local_id = target.last_insert_rowid();

            match detail {
                ActivityDetail::Course {
                    allow_period_selection,
                } => {
                    target.execute(
                        "INSERT INTO courses(activity_id, allow_period_selection) VALUES(?, ?)",
                        (local_id, allow_period_selection),
                    )?;
                }
                ActivityDetail::Event {
                    start_date,
                    end_date,
                } => {
                    target.execute(
                        "INSERT INTO events(activity_id, start_date, end_date) VALUES(?, ?, ?)",
                        (local_id, start_date, end_date),
                    )?;
                }
                ActivityDetail::Orderable {
                    duration_days,
                    due_from_days,
                } => {
                    target.execute(
                        "INSERT INTO orderables(activity_id, duration_days, due_from_days)
                         VALUES(?, ?, ?)",
                        (local_id, duration_days, due_from_days),
                    )?;
                }
            }

            for group_id in
                linked_ids(source, "SELECT activity_group_id FROM activity_activity_groups
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_group =
                    idmap::require(&maps.activity_groups, "activity group", name, group_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_activity_groups(activity_id, activity_group_id)
                     VALUES(?, ?)",
                    (local_id, local_group),
                )?;
            }
            for age_group_id in
                linked_ids(source, "SELECT age_group_id FROM activity_age_groups
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_age =
                    idmap::require(&maps.age_groups, "age group", name, age_group_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_age_groups(activity_id, age_group_id)
                     VALUES(?, ?)",
                    (local_id, local_age),
                )?;
            }
            for target_group_id in
                linked_ids(source, "SELECT target_group_id FROM activity_target_groups
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_target_group = idmap::require(
                    &maps.target_groups,
                    "target group",
                    name,
                    target_group_id,
                )?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_target_groups(activity_id, target_group_id)
                     VALUES(?, ?)",
                    (local_id, local_target_group),
                )?;
            }
            for leader_id in
                linked_ids(source, "SELECT leader_id FROM activity_leaders
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_leader = idmap::require(&maps.leaders, "leader", name, leader_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_leaders(activity_id, leader_id) VALUES(?, ?)",
                    (local_id, local_leader),
                )?;
            }
            for question_id in
                linked_ids(source, "SELECT question_id FROM activity_questions
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_question =
                    idmap::require(&maps.questions, "question", name, question_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_questions(activity_id, question_id)
                     VALUES(?, ?)",
                    (local_id, local_question),
                )?;
            }
            for agreement_id in
                linked_ids(source, "SELECT agreement_id FROM activity_agreements
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_agreement =
                    idmap::require(&maps.agreements, "agreement", name, agreement_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_agreements(activity_id, agreement_id)
                     VALUES(?, ?)",
                    (local_id, local_agreement),
                )?;
            }

            let mut time_stmt = source.prepare(
                "SELECT day_of_week, start_time, end_time FROM activity_times
                 WHERE activity_id = ?",
            )?;
            let times = time_stmt
                .query_map([activity.id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (day_of_week, start_time, end_time) in times {
                target.execute(
                    "INSERT INTO activity_times(activity_id, day_of_week, start_time, end_time)
                     VALUES(?, ?, ?, ?)",
                    (local_id, day_of_week, &start_time, &end_time),
                )?;
            }

            for file_id in
                linked_ids(source, "SELECT file_id FROM activity_attachments
                                     WHERE activity_id = ?", activity.id)?
            {
                let local_file = idmap::require(&maps.files, "file", name, file_id)?;
                target.execute(
                    "INSERT INTO activity_attachments(activity_id, file_id) VALUES(?, ?)",
                    (local_id, local_file),
                )?;
            }

            maps.activities.record(name, activity.id, local_id);
        }
    }

    maps.activities.save(target)?;
    Ok(())
}

pub fn merge_activity_variants(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, activity_id, name, school_year_division_id, price FROM activity_variants",
        )?;
        let variants = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, activity_id, variant_name, division, price) in variants {
            if maps.activity_variants.contains(name, foreign_id) {
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
                "INSERT INTO activity_variants(activity_id, name, school_year_division_id, price)
                 VALUES(?, ?, ?, ?)",
                (local_activity, &variant_name, division, price),
            )?;
            let local_id = target.last_insert_rowid();

            for age_group_id in
                linked_ids(source, "SELECT age_group_id FROM activity_variant_age_groups
                                     WHERE variant_id = ?", foreign_id)?
            {
                let local_age =
                    idmap::require(&maps.age_groups, "age group", name, age_group_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_variant_age_groups(variant_id, age_group_id)
                     VALUES(?, ?)",
                    (local_id, local_age),
                )?;
            }
            for target_group_id in
                linked_ids(source, "SELECT target_group_id FROM activity_variant_target_groups
                                     WHERE variant_id = ?", foreign_id)?
            {
                let local_target_group = idmap::require(
                    &maps.target_groups,
                    "target group",
                    name,
                    target_group_id,
                )?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_variant_target_groups(variant_id,
                                                                          target_group_id)
                     VALUES(?, ?)",
                    (local_id, local_target_group),
                )?;
            }
            for resource_id in
                linked_ids(source, "SELECT resource_id FROM activity_variant_resources
                                     WHERE variant_id = ?", foreign_id)?
            {
                let local_resource =
                    idmap::require(&maps.resources, "resource", name, resource_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_variant_resources(variant_id, resource_id)
                     VALUES(?, ?)",
                    (local_id, local_resource),
                )?;
            }
            for group_id in
                linked_ids(source, "SELECT resource_group_id FROM activity_variant_resource_groups
                                     WHERE variant_id = ?", foreign_id)?
            {
                let local_group =
                    idmap::require(&maps.resource_groups, "resource group", name, group_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO activity_variant_resource_groups(variant_id,
                                                                            resource_group_id)
                     VALUES(?, ?)",
                    (local_id, local_group),
                )?;
            }

            maps.activity_variants.record(name, foreign_id, local_id);
        }
    }

    maps.activity_variants.save(target)?;
    Ok(())
}

pub fn merge_calendar_events(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source
            .prepare("SELECT id, activity_id, name, start_at, end_at FROM calendar_events")?;
        let events = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, activity_id, event_name, start_at, end_at) in events {
            if maps.calendar_events.contains(name, foreign_id) {
                continue;
            }
            let local_activity =
                idmap::require(&maps.activities, "activity", name, activity_id)?;
            target.execute(
                "INSERT INTO calendar_events(activity_id, name, start_at, end_at)
                 VALUES(?, ?, ?, ?)",
                (local_activity, &event_name, &start_at, &end_at),
            )?;
            let local_id = target.last_insert_rowid();

            for resource_id in
                linked_ids(source, "SELECT resource_id FROM calendar_event_resources
                                     WHERE calendar_event_id = ?", foreign_id)?
            {
                let local_resource =
                    idmap::require(&maps.resources, "resource", name, resource_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO calendar_event_resources(calendar_event_id, resource_id)
                     VALUES(?, ?)",
                    (local_id, local_resource),
                )?;
            }
            for group_id in
                linked_ids(source, "SELECT resource_group_id FROM calendar_event_resource_groups
                                     WHERE calendar_event_id = ?", foreign_id)?
            {
                let local_group =
                    idmap::require(&maps.resource_groups, "resource group", name, group_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO calendar_event_resource_groups(calendar_event_id,
                                                                          resource_group_id)
                     VALUES(?, ?)",
                    (local_id, local_group),
                )?;
            }

            maps.calendar_events.record(name, foreign_id, local_id);
        }
    }

    maps.calendar_events.save(target)?;
    Ok(())
}

/// Calendar export ids are already globally unique tokens handed out to
/// subscribers, so they are copied verbatim instead of remapped. Keeping the
/// id keeps every existing subscription URL working after the merge.
pub fn merge_calendar_exports(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name FROM calendar_exports")?;
        let exports = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (export_id, export_name) in exports {
            // First writer wins; a token already present keeps its resource
            // set untouched on re-runs and across sources.
            let present: Option<i64> = target
                .query_row(
                    "SELECT 1 FROM calendar_exports WHERE id = ?",
                    [&export_id],
                    |row| row.get(0),
                )
                .optional()?;
            if present.is_some() {
                continue;
            }
            target.execute(
                "INSERT INTO calendar_exports(id, name) VALUES(?, ?)",
                (&export_id, &export_name),
            )?;
            let mut res_stmt = source.prepare(
                "SELECT resource_id FROM calendar_export_resources WHERE calendar_export_id = ?",
            )?;
            let resource_ids = res_stmt
                .query_map([&export_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for resource_id in resource_ids {
                let local_resource =
                    idmap::require(&maps.resources, "resource", name, resource_id)?;
                target.execute(
                    "INSERT OR IGNORE INTO calendar_export_resources(calendar_export_id,
                                                                     resource_id)
                     VALUES(?, ?)",
                    (&export_id, local_resource),
                )?;
            }
        }
    }
    Ok(())
}

pub fn merge_registration_links(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, slug FROM registration_links")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (slug, id) = row?;
        existing.insert(slug, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, slug, school_year_id, activity_type_id, expires_at
             FROM registration_links",
        )?;
        let links = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, slug, school_year_id, type_id, expires_at) in links {
            let local_id = match existing.get(&slug) {
                Some(id) => *id,
                None => {
                    let local_year =
                        idmap::require(&maps.school_years, "school year", name, school_year_id)?;
                    let local_type =
                        idmap::require(&maps.activity_types, "activity type", name, type_id)?;
                    target.execute(
                        "INSERT INTO registration_links(slug, school_year_id, activity_type_id,
                                                        expires_at)
                         VALUES(?, ?, ?, ?)",
                        (&slug, local_year, local_type, &expires_at),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(slug, local_id);
                    local_id
                }
            };
            for variant_id in
                linked_ids(source, "SELECT variant_id FROM registration_link_variants
                                     WHERE registration_link_id = ?", foreign_id)?
            {
                let local_variant = idmap::require(
                    &maps.activity_variants,
                    "activity variant",
                    name,
                    variant_id,
                )?;
                target.execute(
                    "INSERT OR IGNORE INTO registration_link_variants(registration_link_id,
                                                                      variant_id)
                     VALUES(?, ?)",
                    (local_id, local_variant),
                )?;
            }
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.registration_links = map;
    Ok(())
}

fn linked_ids(conn: &Connection, sql: &str, id: i64) -> anyhow::Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
