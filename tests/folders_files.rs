mod support;

use rusqlite::Connection;
use support::*;

fn seed_tree(conn: &Connection) {
    conn.execute("INSERT INTO folders(parent_id, name) VALUES(NULL, 'photos')", [])
        .unwrap();
    let photos = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO folders(parent_id, name) VALUES(?, '2023')",
        [photos],
    )
    .unwrap();
}

#[test]
fn folder_trees_land_under_per_source_roots() {
    let dir = temp_dir("actimerge-folders");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let bravo = create_database(&dir.join("bravo.sqlite3"));
    seed_tree(&alfa);
    seed_tree(&bravo);
    drop(alfa);
    drop(bravo);

    let ctx = run_merge(merge_config(&dir, &["alfa", "bravo"]));

    // Two roots named after the sources, each carrying its own copy of the
    // identically named tree.
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM folders WHERE parent_id IS NULL AND name IN ('Alfa', 'Bravo')"
        ),
        2
    );
    assert_eq!(
        count(&ctx.target, "SELECT COUNT(*) FROM folders WHERE name = 'photos'"),
        2
    );
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM folders"), 6);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn files_dedup_by_content_within_folder() {
    let dir = temp_dir("actimerge-files");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let bravo = create_database(&dir.join("bravo.sqlite3"));

    // Same content at top level in both sources: one canonical row.
    for conn in [&alfa, &bravo] {
        conn.execute(
            "INSERT INTO files(folder_id, kind, name, storage_path, sha1, modified_at)
             VALUES(NULL, 'file', 'terms.pdf', 'uploads/terms.pdf', 'aaa111', '2023-01-01')",
            [],
        )
        .unwrap();
    }
    // A duplicate inside one source, older than the canonical copy.
    alfa.execute(
        "INSERT INTO files(folder_id, kind, name, storage_path, sha1, modified_at)
         VALUES(NULL, 'file', 'terms-old.pdf', 'uploads/terms-old.pdf', 'aaa111', '2022-01-01')",
        [],
    )
    .unwrap();
    drop(alfa);
    drop(bravo);

    let ctx = run_merge(merge_config(&dir, &["alfa", "bravo"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM files"), 1);
    // Newest-first order makes the 2023 copy win.
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM files WHERE name = 'terms.pdf' AND modified_at = '2023-01-01'"
        ),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn broken_files_get_placeholders() {
    let dir = temp_dir("actimerge-broken");
    let alfa = create_database(&dir.join("alfa.sqlite3"));

    alfa.execute(
        "INSERT INTO files(folder_id, kind, name, storage_path, sha1) \
         VALUES(NULL, 'file', 'lost.doc', '', 'bbb222')",
        [],
    )
    .unwrap();
    alfa.execute(
        "INSERT INTO files(folder_id, kind, name, storage_path, sha1) \
         VALUES(NULL, 'image', 'lost.jpg', '', 'ccc333')",
        [],
    )
    .unwrap();
    drop(alfa);

    let ctx = run_merge(merge_config(&dir, &["alfa"]));

    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM files WHERE name = 'lost.doc'
             AND storage_path = 'filer_dummy/placeholder.txt'"
        ),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM files WHERE name = 'lost.jpg'
             AND storage_path = 'filer_dummy/placeholder.png'"
        ),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}
