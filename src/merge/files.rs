use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::context::MergeContext;
use crate::idmap::{self, new_ids_map};

const PLACEHOLDER_IMAGE: &str = "filer_dummy/placeholder.png";
const PLACEHOLDER_FILE: &str = "filer_dummy/placeholder.txt";

/// Sources are read-only, so files with a missing storage path cannot be
/// repaired in place. Record their ids here and substitute a placeholder
/// when the file rows are copied over.
pub fn fix_broken_files(ctx: &mut MergeContext) -> anyhow::Result<()> {
    for (name, source) in &ctx.sources {
        let mut stmt = source.prepare(
            "SELECT id FROM files WHERE storage_path IS NULL OR storage_path = ''",
        )?;
        let broken = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        if !broken.is_empty() {
            warn!(source = %name, count = broken.len(), "found files without stored content");
        }
        ctx.broken_files.insert(name.clone(), broken);
    }
    Ok(())
}

/// Each source's folder tree lands under a synthetic root folder named after
/// the connection, so merged trees from different databases never collide.
/// Within a parent, folders deduplicate by name.
pub fn merge_folders(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    for (name, source) in sources.iter() {
        let root_id = ensure_folder(target, None, &capitalize(name), None, None)?;

        let mut stmt =
            source.prepare("SELECT id, parent_id, name, owner_id, created_at FROM folders")?;
        let folders = stmt
            .query_map([], |row| {
                Ok(FolderRow {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    name: row.get(2)?,
                    owner_id: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut children: HashMap<Option<i64>, Vec<&FolderRow>> = HashMap::new();
        for folder in &folders {
            children.entry(folder.parent_id).or_default().push(folder);
        }

        // Walk the tree top-down; a folder is only visited once its parent
        // has a target id.
        let mut queue: Vec<(Option<i64>, i64)> = vec![(None, root_id)];
        while let Some((source_parent, local_parent)) = queue.pop() {
            for folder in children.get(&source_parent).into_iter().flatten() {
                let owner = folder
                    .owner_id
                    .and_then(|id| idmap::lookup(&maps.users, name, id));
                let local_id = ensure_folder(
                    target,
                    Some(local_parent),
                    &folder.name,
                    owner,
                    folder.created_at.as_deref(),
                )?;
                idmap::record(&mut map, name, folder.id, local_id);
                queue.push((Some(folder.id), local_id));
            }
        }
    }

    maps.folders = map;
    Ok(())
}

struct FolderRow {
    id: i64,
    parent_id: Option<i64>,
    name: String,
    owner_id: Option<i64>,
    created_at: Option<String>,
}

fn ensure_folder(
    conn: &Connection,
    parent_id: Option<i64>,
    name: &str,
    owner_id: Option<i64>,
    created_at: Option<&str>,
) -> anyhow::Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM folders WHERE parent_id IS ? AND name = ?",
            (parent_id, name),
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO folders(parent_id, name, owner_id, created_at) VALUES(?, ?, ?, ?)",
        (parent_id, name, owner_id, created_at),
    )?;
    Ok(conn.last_insert_rowid())
}

struct FileRow {
    id: i64,
    folder_id: Option<i64>,
    kind: String,
    name: String,
    storage_path: String,
    sha1: String,
    owner_id: Option<i64>,
    modified_at: Option<String>,
}

/// Files deduplicate on `(folder, sha1)`. Newest first, so when a source
/// carries several copies of the same content in one folder, the most
/// recently modified row becomes the canonical one.
pub fn merge_files(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        broken_files,
        ..
    } = ctx;
    let names: Vec<String> = sources.iter().map(|(n, _)| n.clone()).collect();
    let mut map = new_ids_map(names.iter().map(String::as_str));

    let mut existing: HashMap<(Option<i64>, String), i64> = HashMap::new();
    let mut stmt = target.prepare("SELECT id, folder_id, sha1 FROM files")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
    })?;
    for row in rows {
        let (id, folder_id, sha1) = row?;
        existing.insert((folder_id, sha1), id);
    }
    drop(stmt);

    for (name, source) in sources.iter() {
        let broken = broken_files.get(name);
        let mut stmt = source.prepare(
            "SELECT id, folder_id, kind, name, COALESCE(storage_path, ''), sha1, owner_id,
                    modified_at
             FROM files ORDER BY modified_at DESC",
        )?;
        let files = stmt
            .query_map([], |row| {
                Ok(FileRow {
                    id: row.get(0)?,
                    folder_id: row.get(1)?,
                    kind: row.get(2)?,
                    name: row.get(3)?,
                    storage_path: row.get(4)?,
                    sha1: row.get(5)?,
                    owner_id: row.get(6)?,
                    modified_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for mut file in files {
            if broken.is_some_and(|ids| ids.contains(&file.id)) {
                let placeholder = if file.kind == "image" {
                    PLACEHOLDER_IMAGE
                } else {
                    PLACEHOLDER_FILE
                };
                debug!(source = %name, file_id = file.id, placeholder, "patching broken file");
                file.storage_path = placeholder.to_string();
            }

            let folder = file
                .folder_id
                .and_then(|id| idmap::lookup(&maps.folders, name, id));
            let owner = file
                .owner_id
                .and_then(|id| idmap::lookup(&maps.users, name, id));

            let key = (folder, file.sha1.clone());
            let local_id = match existing.get(&key) {
                Some(id) => *id,
                None => {
                    target.execute(
                        "INSERT INTO files(folder_id, kind, name, storage_path, sha1, owner_id,
                                           modified_at)
                         VALUES(?, ?, ?, ?, ?, ?, ?)",
                        (
                            folder,
                            &file.kind,
                            &file.name,
                            &file.storage_path,
                            &file.sha1,
                            owner,
                            &file.modified_at,
                        ),
                    )?;
                    let local_id = target.last_insert_rowid();
                    existing.insert(key, local_id);
                    local_id
                }
            };
            idmap::record(&mut map, name, file.id, local_id);
        }

        // Image dimensions ride along with their file row.
        let mut stmt = source.prepare("SELECT file_id, width, height FROM images")?;
        let images = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        for (file_id, width, height) in images {
            if let Some(local_file) = idmap::lookup(&map, name, file_id) {
                target.execute(
                    "INSERT OR IGNORE INTO images(file_id, width, height) VALUES(?, ?, ?)",
                    (local_file, width, height),
                )?;
            }
        }
    }

    maps.files = map;
    Ok(())
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalize_first_letter_only() {
        assert_eq!(capitalize("alfa"), "Alfa");
        assert_eq!(capitalize("Beta"), "Beta");
        assert_eq!(capitalize(""), "");
    }
}
