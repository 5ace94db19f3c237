mod support;

use rusqlite::Connection;
use support::*;

fn seed_print_setup(conn: &Connection, name: &str) -> i64 {
    conn.execute("INSERT INTO print_setups(name) VALUES(?)", [name])
        .unwrap();
    conn.last_insert_rowid()
}

#[test]
fn activities_keep_their_print_setups() {
    let dir = temp_dir("actimerge-print-setups");
    let alfa = create_database(&dir.join("alfa.sqlite3"));

    let reg_ps = seed_print_setup(&alfa, "Přihláška");
    let bill_ps = seed_print_setup(&alfa, "Faktura");
    let year = seed_school_year(&alfa, 2023);
    let course_type = seed_activity_type(&alfa, "course", "course");
    alfa.execute(
        "INSERT INTO activities(activity_type_id, school_year_id, name, reg_print_setup_id,
                                bill_print_setup_id)
         VALUES(?, ?, 'Keramika', ?, ?)",
        (course_type, year, reg_ps, bill_ps),
    )
    .unwrap();
    let activity = alfa.last_insert_rowid();
    alfa.execute("INSERT INTO courses(activity_id) VALUES(?)", [activity])
        .unwrap();
    drop(alfa);

    let ctx = run_merge(merge_config(&dir, &["alfa"]));

    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM activities a
             JOIN print_setups p ON p.id = a.reg_print_setup_id
             WHERE p.name = 'Přihláška'"
        ),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM activities a
             JOIN print_setups p ON p.id = a.bill_print_setup_id
             WHERE p.name = 'Faktura'"
        ),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM activities
             WHERE decision_print_setup_id IS NOT NULL OR pr_print_setup_id IS NOT NULL"
        ),
        0
    );

    let _ = std::fs::remove_dir_all(dir);
}

/// A subscription token already present in the target keeps both its row and
/// its resource set; a later source carrying the same token is skipped whole.
#[test]
fn calendar_exports_keep_the_first_writer() {
    let dir = temp_dir("actimerge-exports");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let beta = create_database(&dir.join("beta.sqlite3"));

    let token = "3f2a77f0-7e01-4bb5-9e6a-1d70a1a1c0de";
    alfa.execute(
        "INSERT INTO calendar_exports(id, name) VALUES(?, 'Vše')",
        [token],
    )
    .unwrap();

    beta.execute(
        "INSERT INTO calendar_exports(id, name) VALUES(?, 'Tělocvična')",
        [token],
    )
    .unwrap();
    beta.execute("INSERT INTO resources(name) VALUES('Tělocvična')", [])
        .unwrap();
    let resource = beta.last_insert_rowid();
    beta.execute(
        "INSERT INTO calendar_export_resources(calendar_export_id, resource_id) VALUES(?, ?)",
        (token, resource),
    )
    .unwrap();
    drop(alfa);
    drop(beta);

    let ctx = run_merge(merge_config(&dir, &["alfa", "beta"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM calendar_exports"), 1);
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM calendar_exports WHERE name = 'Vše'"
        ),
        1
    );
    // Beta's links ride along with its export row, so they were skipped too.
    assert_eq!(
        count(&ctx.target, "SELECT COUNT(*) FROM calendar_export_resources"),
        0
    );

    let _ = std::fs::remove_dir_all(dir);
}
