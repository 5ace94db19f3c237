use std::collections::HashMap;

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map};

/// Bank accounts deduplicate by name; the same real-world account configured
/// in several tenants must become one row.
pub fn merge_bank_accounts(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<String, i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, name FROM bank_accounts")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get(0)?)))?;
    for row in rows {
        let (name, id) = row?;
        existing.insert(name, id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare("SELECT id, name, iban, bic FROM bank_accounts")?;
        let accounts = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, account_name, iban, bic) in accounts {
            let local_id = match existing.get(&account_name) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO bank_accounts(name, iban, bic) VALUES(?, ?, ?)",
                        (&account_name, &iban, &bic),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(account_name, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.bank_accounts = map;
    Ok(())
}

/// Statements deduplicate on `(account, statement number)`.
pub fn merge_bank_statements(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<(i64, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, account_id, statement FROM bank_statements")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, account_id, statement) = row?;
        existing.insert((account_id, statement), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, account_id, statement, from_date, to_date FROM bank_statements",
        )?;
        let statements = stmt
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
        for (foreign_id, account_id, statement, from_date, to_date) in statements {
            let local_account =
                idmap::require(&maps.bank_accounts, "bank account", name, account_id)?;
            let key = (local_account, statement.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO bank_statements(account_id, statement, from_date, to_date)
                         VALUES(?, ?, ?, ?)",
                        (local_account, &statement, &from_date, &to_date),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.bank_statements = map;
    Ok(())
}

/// Transactions deduplicate on `(account, transaction code)`; the bank's own
/// code is the stable identifier across exports.
pub fn merge_bank_transactions(ctx: &mut MergeContext) -> anyhow::Result<()> {
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
        target.prepare("SELECT id, account_id, transaction_code FROM bank_transactions")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, account_id, code) = row?;
        existing.insert((account_id, code), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let mut stmt = source.prepare(
            "SELECT id, account_id, statement_id, transaction_code, amount, accounted_on
             FROM bank_transactions",
        )?;
        let transactions = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (foreign_id, account_id, statement_id, code, amount, accounted_on) in transactions {
            let local_account =
                idmap::require(&maps.bank_accounts, "bank account", name, account_id)?;
            let local_statement = idmap::resolve_opt(
                &maps.bank_statements,
                "bank statement",
                name,
                statement_id,
            )?;
            let key = (local_account, code.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO bank_transactions(account_id, statement_id, transaction_code,
                                                       amount, accounted_on)
                         VALUES(?, ?, ?, ?, ?)",
                        (local_account, local_statement, &code, amount, &accounted_on),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, foreign_id, local_id);
        }
    }

    maps.bank_transactions = map;
    Ok(())
}
