mod support;

use actimerge::context::MergeContext;
use support::*;

#[test]
fn mismatched_discriminator_is_repaired_to_matching_type() {
    let dir = temp_dir("actimerge-repair");
    let conn = create_database(&dir.join("alfa.sqlite3"));

    let year_id = seed_school_year(&conn, 2023);
    let course_type = seed_activity_type(&conn, "course", "course");
    let event_type = seed_activity_type(&conn, "event", "event");

    // Declared as a course, but its concrete row lives in the events table.
    conn.execute(
        "INSERT INTO activities(activity_type_id, school_year_id, name) VALUES(?, ?, 'Trip')",
        (course_type, year_id),
    )
    .unwrap();
    let activity_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO events(activity_id, start_date, end_date)
         VALUES(?, '2023-10-01', '2023-10-03')",
        [activity_id],
    )
    .unwrap();
    let _ = event_type;
    drop(conn);

    let ctx = run_merge(merge_config(&dir, &["alfa"]));

    let model: String = ctx
        .target
        .query_row(
            "SELECT t.model FROM activities a JOIN activity_types t ON t.id = a.activity_type_id
             WHERE a.name = 'Trip'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(model, "event");
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM events"), 1);
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM courses"), 0);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn activity_without_concrete_kind_fails_the_run() {
    let dir = temp_dir("actimerge-no-kind");
    let conn = create_database(&dir.join("alfa.sqlite3"));

    let year_id = seed_school_year(&conn, 2023);
    let type_id = seed_activity_type(&conn, "course", "course");
    conn.execute(
        "INSERT INTO activities(activity_type_id, school_year_id, name) VALUES(?, ?, 'Ghost')",
        (type_id, year_id),
    )
    .unwrap();
    drop(conn);

    let mut ctx = MergeContext::open(merge_config(&dir, &["alfa"])).unwrap();
    let err = actimerge::merge::run(&mut ctx, false).unwrap_err();
    assert!(format!("{err:#}").contains("no concrete kind"));

    let _ = std::fs::remove_dir_all(dir);
}
