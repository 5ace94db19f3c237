use tracing::debug;

use crate::context::MergeContext;
use crate::idmap::{self, PersistentIdsMap};

const DISCOUNT_TABLES: &[(&str, &str)] = &[
    ("course_discounts", "course-discounts"),
    ("event_discounts", "event-discounts"),
    ("orderable_discounts", "orderable-discounts"),
];

/// Discounts exist per registration kind but share one shape; each table
/// keeps its own persistent map. Zero-amount discounts are bookkeeping noise
/// and are skipped without a mapping, so a re-run skips them again.
pub fn merge_discounts(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();

    for (table, model_name) in DISCOUNT_TABLES {
        let mut map = PersistentIdsMap::load(target, model_name, &names)?;

        for (name, source) in sources.iter() {
            let mut stmt = source.prepare(&format!(
                "SELECT id, registration_id, amount, explanation, accounted_on, accounted_by_id,
                        last_updated_by_id
                 FROM {table}"
            ))?;
            let discounts = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (foreign_id, registration_id, amount, explanation, accounted_on, accounted_by, updated_by)
                in discounts
            {
                if map.contains(name, foreign_id) {
                    continue;
                }
                if amount == 0 {
                    debug!(source = %name, table, foreign_id, "skipping zero-amount discount");
                    continue;
                }
                let local_registration =
                    idmap::require(&maps.registrations, "registration", name, registration_id)?;
                let accounted_by = idmap::resolve_opt(&maps.users, "user", name, accounted_by)?;
                let updated_by = idmap::resolve_opt(&maps.users, "user", name, updated_by)?;
                target.execute(
                    &format!(
                        "INSERT INTO {table}(registration_id, amount, explanation, accounted_on,
                                             accounted_by_id, last_updated_by_id)
                         VALUES(?, ?, ?, ?, ?, ?)"
                    ),
                    (
                        local_registration,
                        amount,
                        &explanation,
                        &accounted_on,
                        accounted_by,
                        updated_by,
                    ),
                )?;
                map.record(name, foreign_id, target.last_insert_rowid());
            }
        }

        map.save(target)?;
    }
    Ok(())
}

struct TransactionRow {
    id: i64,
    transaction_type: String,
    amount: i64,
    accounted_on: Option<String>,
    accounted_by_id: Option<i64>,
    last_updated_by_id: Option<i64>,
    source_registration_id: Option<i64>,
    target_registration_id: Option<i64>,
    donor_id: Option<i64>,
    organization_id: Option<i64>,
    bank_transaction_id: Option<i64>,
    note: String,
}

pub fn merge_transactions(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, transaction_type, amount, accounted_on, accounted_by_id,
                    last_updated_by_id, source_registration_id, target_registration_id, donor_id,
                    organization_id, bank_transaction_id, note
             FROM transactions",
        )?;
        let transactions = stmt
            .query_map([], |row| {
                Ok(TransactionRow {
                    id: row.get(0)?,
                    transaction_type: row.get(1)?,
                    amount: row.get(2)?,
                    accounted_on: row.get(3)?,
                    accounted_by_id: row.get(4)?,
                    last_updated_by_id: row.get(5)?,
                    source_registration_id: row.get(6)?,
                    target_registration_id: row.get(7)?,
                    donor_id: row.get(8)?,
                    organization_id: row.get(9)?,
                    bank_transaction_id: row.get(10)?,
                    note: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for tx in transactions {
            if maps.transactions.contains(name, tx.id) {
                continue;
            }
            let accounted_by =
                idmap::resolve_opt(&maps.users, "user", name, tx.accounted_by_id)?;
            let updated_by =
                idmap::resolve_opt(&maps.users, "user", name, tx.last_updated_by_id)?;
            let source_registration = idmap::resolve_opt(
                &maps.registrations,
                "registration",
                name,
                tx.source_registration_id,
            )?;
            let target_registration = idmap::resolve_opt(
                &maps.registrations,
                "registration",
                name,
                tx.target_registration_id,
            )?;
            let donor = idmap::resolve_opt(&maps.users, "user", name, tx.donor_id)?;
            let organization = idmap::resolve_opt(
                &maps.organizations,
                "organization",
                name,
                tx.organization_id,
            )?;
            let bank_transaction = idmap::resolve_opt(
                &maps.bank_transactions,
                "bank transaction",
                name,
                tx.bank_transaction_id,
            )?;

            target.execute(
                "INSERT INTO transactions(transaction_type, amount, accounted_on, accounted_by_id,
                                          last_updated_by_id, source_registration_id,
                                          target_registration_id, donor_id, organization_id,
                                          bank_transaction_id, note)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    &tx.transaction_type,
                    tx.amount,
                    &tx.accounted_on,
                    accounted_by,
                    updated_by,
                    source_registration,
                    target_registration,
                    donor,
                    organization,
                    bank_transaction,
                    &tx.note,
                ],
            )?;
            maps.transactions.record(name, tx.id, target.last_insert_rowid());
        }
    }

    maps.transactions.save(target)?;
    Ok(())
}
