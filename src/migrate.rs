use std::path::Path;
use std::process::Command;

use anyhow::Context;

use crate::context::MergeContext;
use crate::db;
use crate::error::MergeError;

/// Bring the target schema up to date: run the configured migration command,
/// or apply the built-in schema when none is configured.
pub fn perform_local_migrations(ctx: &mut MergeContext) -> anyhow::Result<()> {
    match &ctx.config.migrate_command {
        Some(cmd) => run_migration(cmd, &ctx.config.target),
        None => db::ensure_schema(&ctx.target),
    }
}

/// Migrate every source schema. Sources are opened read-only here, so
/// without an external command we can only verify they carry the expected
/// tables; a missing table is as fatal as a failed migration.
pub fn perform_foreign_migrations(ctx: &mut MergeContext) -> anyhow::Result<()> {
    match &ctx.config.migrate_command {
        Some(cmd) => {
            for (name, path) in &ctx.config.sources {
                run_migration(cmd, path)
                    .with_context(|| format!("failed to migrate database {name}"))?;
            }
        }
        None => {
            for (name, conn) in &ctx.sources {
                db::verify_schema(conn)
                    .with_context(|| format!("source database {name} has an unexpected schema"))?;
            }
        }
    }
    Ok(())
}

fn run_migration(cmd: &[String], database: &Path) -> anyhow::Result<()> {
    let status = Command::new(&cmd[0])
        .args(&cmd[1..])
        .arg(database)
        .status()
        .with_context(|| format!("failed to spawn migration command {}", cmd[0]))?;
    if !status.success() {
        return Err(MergeError::MigrationFailed {
            database: database.to_string_lossy().into_owned(),
            status: status.to_string(),
        }
        .into());
    }
    Ok(())
}
