use rusqlite::{Connection, OptionalExtension};

use crate::context::MergeContext;
use crate::error::MergeError;
use crate::idmap::{self, IdsMap};

/// The concrete registration kind, mirroring the activity it belongs to.
#[derive(Debug)]
enum RegistrationDetail {
    Course {
        attends_from: Option<String>,
        attends_until: Option<String>,
    },
    Event {
        attended: bool,
    },
    Orderable {
        event_date: Option<String>,
        event_duration_days: i64,
    },
}

fn read_detail(conn: &Connection, registration_id: i64) -> anyhow::Result<Option<RegistrationDetail>> {
    let course: Option<(Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT attends_from, attends_until FROM course_registrations
             WHERE registration_id = ?",
            [registration_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((attends_from, attends_until)) = course {
        return Ok(Some(RegistrationDetail::Course {
            attends_from,
            attends_until,
        }));
    }

    let event: Option<bool> = conn
        .query_row(
            "SELECT attended FROM event_registrations WHERE registration_id = ?",
            [registration_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(attended) = event {
        return Ok(Some(RegistrationDetail::Event { attended }));
    }

    let orderable: Option<(Option<String>, i64)> = conn
        .query_row(
            "SELECT event_date, event_duration_days FROM orderable_registrations
             WHERE registration_id = ?",
            [registration_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((event_date, event_duration_days)) = orderable {
        return Ok(Some(RegistrationDetail::Orderable {
            event_date,
            event_duration_days,
        }));
    }

    Ok(None)
}

struct RegistrationRow {
    id: i64,
    activity_id: i64,
    activity_variant_id: i64,
    calendar_event_id: Option<i64>,
    user_id: i64,
    price: i64,
    note: String,
    created: String,
    created_by_id: Option<i64>,
    approved: Option<String>,
    approved_by_id: Option<i64>,
    payment_requested_by_id: Option<i64>,
    refund_offered_by_id: Option<i64>,
    cancelation_requested_by_id: Option<i64>,
    canceled: Option<String>,
    canceled_by_id: Option<i64>,
    registration_link_id: Option<i64>,
}

pub fn merge_registrations(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, activity_id, activity_variant_id, calendar_event_id, user_id, price,
                    note, created, created_by_id, approved, approved_by_id,
                    payment_requested_by_id, refund_offered_by_id, cancelation_requested_by_id,
                    canceled, canceled_by_id, registration_link_id
             FROM registrations",
        )?;
        let registrations = stmt
            .query_map([], |row| {
                Ok(RegistrationRow {
                    id: row.get(0)?,
                    activity_id: row.get(1)?,
                    activity_variant_id: row.get(2)?,
                    calendar_event_id: row.get(3)?,
                    user_id: row.get(4)?,
                    price: row.get(5)?,
                    note: row.get(6)?,
                    created: row.get(7)?,
                    created_by_id: row.get(8)?,
                    approved: row.get(9)?,
                    approved_by_id: row.get(10)?,
                    payment_requested_by_id: row.get(11)?,
                    refund_offered_by_id: row.get(12)?,
                    cancelation_requested_by_id: row.get(13)?,
                    canceled: row.get(14)?,
                    canceled_by_id: row.get(15)?,
                    registration_link_id: row.get(16)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for reg in registrations {
            if maps.registrations.contains(name, reg.id) {
                continue;
            }
            let detail = read_detail(source, reg.id)?.ok_or_else(|| {
                MergeError::UnknownActivityModel(format!(
                    "registration {} from source {} has no concrete kind",
                    reg.id, name
                ))
            })?;

            let local_activity =
                idmap::require(&maps.activities, "activity", name, reg.activity_id)?;
            let local_variant = idmap::require(
                &maps.activity_variants,
                "activity variant",
                name,
                reg.activity_variant_id,
            )?;
            let calendar_event = idmap::resolve_opt(
                &maps.calendar_events,
                "calendar event",
                name,
                reg.calendar_event_id,
            )?;
            let local_user = idmap::require(&maps.users, "user", name, reg.user_id)?;
            let created_by = resolve_user(&maps.users, name, reg.created_by_id)?;
            let approved_by = resolve_user(&maps.users, name, reg.approved_by_id)?;
            let payment_requested_by = resolve_user(&maps.users, name, reg.payment_requested_by_id)?;
            let refund_offered_by = resolve_user(&maps.users, name, reg.refund_offered_by_id)?;
            let cancelation_requested_by =
                resolve_user(&maps.users, name, reg.cancelation_requested_by_id)?;
            let canceled_by = resolve_user(&maps.users, name, reg.canceled_by_id)?;
            let registration_link = idmap::resolve_opt(
                &maps.registration_links,
                "registration link",
                name,
                reg.registration_link_id,
            )?;

            target.execute(
                "INSERT INTO registrations(activity_id, activity_variant_id, calendar_event_id,
                                           user_id, price, note, created_by_id, approved,
                                           approved_by_id, payment_requested_by_id,
                                           refund_offered_by_id, cancelation_requested_by_id,
                                           canceled, canceled_by_id, registration_link_id)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    local_activity,
                    local_variant,
                    calendar_event,
                    local_user,
                    reg.price,
                    &reg.note,
                    created_by,
                    &reg.approved,
                    approved_by,
                    payment_requested_by,
                    refund_offered_by,
                    cancelation_requested_by,
                    &reg.canceled,
                    canceled_by,
                    registration_link,
                ],
            )?;
            let local_id = target.last_insert_rowid();
            // The insert stamps "now"; restore the original creation time.
            target.execute(
                "UPDATE registrations SET created = ? WHERE id = ?",
                (&reg.created, local_id),
            )?;

            match detail {
                RegistrationDetail::Course {
                    attends_from,
                    attends_until,
                } => {
                    target.execute(
                        "INSERT INTO course_registrations(registration_id, attends_from,
                                                          attends_until)
                         VALUES(?, ?, ?)",
                        (local_id, attends_from, attends_until),
                    )?;
                }
                RegistrationDetail::Event { attended } => {
                    target.execute(
                        "INSERT INTO event_registrations(registration_id, attended) VALUES(?, ?)",
                        (local_id, attended),
                    )?;
                }
                RegistrationDetail::Orderable {
                    event_date,
                    event_duration_days,
                } => {
                    target.execute(
                        "INSERT INTO orderable_registrations(registration_id, event_date,
                                                             event_duration_days)
                         VALUES(?, ?, ?)",
                        (local_id, event_date, event_duration_days),
                    )?;
                }
            }

            copy_registration_links(source, target, maps, name, reg.id, local_id)?;
            copy_registration_children(source, target, maps, name, reg.id, local_id)?;

            maps.registrations.record(name, reg.id, local_id);
        }
    }

    maps.registrations.save(target)?;
    maps.registration_participants.save(target)?;
    Ok(())
}

fn resolve_user(
    users: &IdsMap,
    connection: &str,
    id: Option<i64>,
) -> Result<Option<i64>, MergeError> {
    idmap::resolve_opt(users, "user", connection, id)
}

fn copy_registration_links(
    source: &Connection,
    target: &Connection,
    maps: &crate::context::MergeMaps,
    name: &str,
    foreign_id: i64,
    local_id: i64,
) -> anyhow::Result<()> {
    let mut stmt =
        source.prepare("SELECT question_id FROM registration_questions WHERE registration_id = ?")?;
    let question_ids = stmt
        .query_map([foreign_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for question_id in question_ids {
        let local_question = idmap::require(&maps.questions, "question", name, question_id)?;
        target.execute(
            "INSERT OR IGNORE INTO registration_questions(registration_id, question_id)
             VALUES(?, ?)",
            (local_id, local_question),
        )?;
    }

    let mut stmt = source
        .prepare("SELECT agreement_id FROM registration_agreements WHERE registration_id = ?")?;
    let agreement_ids = stmt
        .query_map([foreign_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for agreement_id in agreement_ids {
        let local_agreement = idmap::require(&maps.agreements, "agreement", name, agreement_id)?;
        target.execute(
            "INSERT OR IGNORE INTO registration_agreements(registration_id, agreement_id)
             VALUES(?, ?)",
            (local_id, local_agreement),
        )?;
    }

    let mut stmt = source.prepare(
        "SELECT agreement_option_id FROM registration_agreement_options
         WHERE registration_id = ?",
    )?;
    let option_ids = stmt
        .query_map([foreign_id], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for option_id in option_ids {
        let local_option =
            idmap::require(&maps.agreement_options, "agreement option", name, option_id)?;
        target.execute(
            "INSERT OR IGNORE INTO registration_agreement_options(registration_id,
                                                                  agreement_option_id)
             VALUES(?, ?)",
            (local_id, local_option),
        )?;
    }
    Ok(())
}

fn copy_registration_children(
    source: &Connection,
    target: &Connection,
    maps: &mut crate::context::MergeMaps,
    name: &str,
    foreign_id: i64,
    local_id: i64,
) -> anyhow::Result<()> {
    let mut stmt = source.prepare(
        "SELECT id, first_name, last_name, birth_date, age_group_id, citizenship_id, school_id
         FROM registration_participants WHERE registration_id = ?",
    )?;
    let participants = stmt
        .query_map([foreign_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<i64>>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);
    for (participant_id, first, last, birth, age_group, citizenship, school) in participants {
        if maps.registration_participants.contains(name, participant_id) {
            continue;
        }
        let local_age = idmap::require(&maps.age_groups, "age group", name, age_group)?;
        let local_citizenship =
            idmap::require(&maps.citizenships, "citizenship", name, citizenship)?;
        let local_school = idmap::resolve_opt(&maps.schools, "school", name, school)?;
        target.execute(
            "INSERT INTO registration_participants(registration_id, first_name, last_name,
                                                   birth_date, age_group_id, citizenship_id,
                                                   school_id)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                local_id,
                &first,
                &last,
                &birth,
                local_age,
                local_citizenship,
                local_school,
            ),
        )?;
        maps.registration_participants
            .record(name, participant_id, target.last_insert_rowid());
    }

    let group: Option<(String, i64, Option<i64>)> = source
        .query_row(
            "SELECT name, target_group_id, school_id FROM registration_groups
             WHERE registration_id = ?",
            [foreign_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    if let Some((group_name, target_group, school)) = group {
        let local_target_group =
            idmap::require(&maps.target_groups, "target group", name, target_group)?;
        let local_school = idmap::resolve_opt(&maps.schools, "school", name, school)?;
        target.execute(
            "INSERT OR IGNORE INTO registration_groups(registration_id, name, target_group_id,
                                                       school_id)
             VALUES(?, ?, ?, ?)",
            (local_id, &group_name, local_target_group, local_school),
        )?;

        let mut member_stmt = source.prepare(
            "SELECT first_name, last_name FROM registration_group_members
             WHERE registration_id = ?",
        )?;
        let members = member_stmt
            .query_map([foreign_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (first, last) in members {
            target.execute(
                "INSERT INTO registration_group_members(registration_id, first_name, last_name)
                 VALUES(?, ?, ?)",
                (local_id, &first, &last),
            )?;
        }
    }

    let billing: Option<(String, String, String, String, String)> = source
        .query_row(
            "SELECT name, street, city, postal_code, company_num FROM registration_billing_infos
             WHERE registration_id = ?",
            [foreign_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;
    if let Some((billing_name, street, city, postal_code, company_num)) = billing {
        target.execute(
            "INSERT OR IGNORE INTO registration_billing_infos(registration_id, name, street, city,
                                                              postal_code, company_num)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                local_id,
                &billing_name,
                &street,
                &city,
                &postal_code,
                &company_num,
            ),
        )?;
    }
    Ok(())
}

/// Course registrations carry the set of periods the participant attends.
/// The pair `(registration, period)` is unique, so re-runs fall through the
/// insert-or-ignore.
pub fn merge_course_registration_periods(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source
            .prepare("SELECT registration_id, period_id FROM course_registration_periods")?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (registration_id, period_id) in pairs {
            let local_registration =
                idmap::require(&maps.registrations, "registration", name, registration_id)?;
            let local_period = idmap::require(
                &maps.school_year_periods,
                "school year period",
                name,
                period_id,
            )?;
            target.execute(
                "INSERT OR IGNORE INTO course_registration_periods(registration_id, period_id)
                 VALUES(?, ?)",
                (local_registration, local_period),
            )?;
        }
    }
    Ok(())
}

pub fn merge_refund_requests(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT registration_id, requested_by_id, iban, requested_on FROM refund_requests",
        )?;
        let requests = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (registration_id, requested_by, iban, requested_on) in requests {
            let local_registration =
                idmap::require(&maps.registrations, "registration", name, registration_id)?;
            let local_requester = idmap::require(&maps.users, "user", name, requested_by)?;
            target.execute(
                "INSERT OR IGNORE INTO refund_requests(registration_id, requested_by_id, iban,
                                                       requested_on)
                 VALUES(?, ?, ?, ?)",
                (local_registration, local_requester, &iban, &requested_on),
            )?;
        }
    }
    Ok(())
}
