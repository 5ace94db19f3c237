mod support;

use actimerge::context::MergeContext;
use actimerge::merge::{catalog, people};
use support::*;

/// Phases depend on the maps their predecessors build. Running a dependent
/// phase against empty maps must fail loudly, not silently drop references.
#[test]
fn leader_merge_without_user_map_reports_missing_mapping() {
    let dir = temp_dir("actimerge-ordering");
    let conn = create_database(&dir.join("alfa.sqlite3"));
    let user_id = seed_user(&conn, "mirek", "mirek@example.org");
    conn.execute(
        "INSERT INTO leaders(user_id, description) VALUES(?, 'climbing')",
        [user_id],
    )
    .unwrap();
    drop(conn);

    // Pre-create the target schema; the migration phase normally does this.
    drop(create_database(&dir.join("target.sqlite3")));

    let mut ctx = MergeContext::open(merge_config(&dir, &["alfa"])).unwrap();
    let err = people::merge_leaders(&mut ctx).unwrap_err();
    assert!(err
        .to_string()
        .contains("no identity mapping for user id 1 from source alfa"));

    let _ = std::fs::remove_dir_all(dir);
}

/// File references are no exception: an unresolvable attachment or background
/// means the file phase has not run, not that the reference may be dropped.
#[test]
fn print_setup_merge_without_file_map_reports_missing_mapping() {
    let dir = temp_dir("actimerge-ordering-files");
    let conn = create_database(&dir.join("alfa.sqlite3"));
    conn.execute(
        "INSERT INTO print_setups(name, background_file_id) VALUES('Diplom', 5)",
        [],
    )
    .unwrap();
    drop(conn);

    drop(create_database(&dir.join("target.sqlite3")));

    let mut ctx = MergeContext::open(merge_config(&dir, &["alfa"])).unwrap();
    let err = catalog::merge_print_setups(&mut ctx).unwrap_err();
    assert!(err
        .to_string()
        .contains("no identity mapping for file id 5 from source alfa"));

    let _ = std::fs::remove_dir_all(dir);
}
