mod support;

use rusqlite::Connection;
use support::*;

struct Seeded {
    registration_id: i64,
}

fn seed_full_chain(conn: &Connection) -> Seeded {
    let user_id = seed_user(conn, "tereza", "tereza@example.org");
    let year_id = seed_school_year(conn, 2023);
    conn.execute(
        "INSERT INTO school_year_divisions(school_year_id, name) VALUES(?, 'Semesters')",
        [year_id],
    )
    .unwrap();
    let division_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO school_year_periods(division_id, name, start_date, end_date)
         VALUES(?, 'Autumn', '2023-09-01', '2024-01-31')",
        [division_id],
    )
    .unwrap();
    let period_id = conn.last_insert_rowid();

    conn.execute("INSERT INTO stat_groups(name) VALUES('children')", [])
        .unwrap();
    let stat_id = conn.last_insert_rowid();
    conn.execute(
        "INSERT INTO age_groups(name, stat_group_id) VALUES('6-10', ?)",
        [stat_id],
    )
    .unwrap();
    let age_group_id = conn.last_insert_rowid();
    conn.execute("INSERT INTO citizenships(name) VALUES('CZ')", [])
        .unwrap();
    let citizenship_id = conn.last_insert_rowid();

    let type_id = seed_activity_type(conn, "course", "course");
    let activity_id = seed_course_activity(conn, type_id, year_id, "Chess");
    let variant_id = seed_variant(conn, activity_id, "Beginners", 900);
    let registration_id = seed_registration(
        conn,
        activity_id,
        variant_id,
        user_id,
        "2023-08-20 18:00:00",
    );

    conn.execute(
        "INSERT INTO course_registration_periods(registration_id, period_id) VALUES(?, ?)",
        (registration_id, period_id),
    )
    .unwrap();
    conn.execute(
        "INSERT INTO registration_participants(registration_id, first_name, last_name,
                                               birth_date, age_group_id, citizenship_id)
         VALUES(?, 'Ema', 'Mala', '2016-03-14', ?, ?)",
        (registration_id, age_group_id, citizenship_id),
    )
    .unwrap();
    conn.execute(
        "INSERT INTO registration_billing_infos(registration_id, name, street)
         VALUES(?, 'Mala s.r.o.', 'Dlouha 7')",
        [registration_id],
    )
    .unwrap();

    conn.execute(
        "INSERT INTO course_discounts(registration_id, amount, explanation)
         VALUES(?, 150, 'early bird')",
        [registration_id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO course_discounts(registration_id, amount, explanation)
         VALUES(?, 0, 'placeholder row')",
        [registration_id],
    )
    .unwrap();

    Seeded { registration_id }
}

#[test]
fn course_registration_merges_with_children() {
    let dir = temp_dir("actimerge-registrations");
    let conn = create_database(&dir.join("alfa.sqlite3"));
    let _ = seed_full_chain(&conn);
    drop(conn);

    let ctx = run_merge(merge_config(&dir, &["alfa"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM registrations"), 1);
    assert_eq!(
        count(&ctx.target, "SELECT COUNT(*) FROM course_registrations"),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM course_registration_periods"
        ),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM registration_participants WHERE first_name = 'Ema'"
        ),
        1
    );
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM registration_billing_infos WHERE name = 'Mala s.r.o.'"
        ),
        1
    );
    // The insert-time default gets overwritten with the source timestamp.
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM registrations WHERE created = '2023-08-20 18:00:00'"
        ),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn zero_amount_discounts_are_skipped_every_run() {
    let dir = temp_dir("actimerge-discounts");
    let conn = create_database(&dir.join("alfa.sqlite3"));
    let _ = seed_full_chain(&conn);
    drop(conn);

    let first = run_merge(merge_config(&dir, &["alfa"]));
    assert_eq!(
        count(&first.target, "SELECT COUNT(*) FROM course_discounts"),
        1
    );
    assert_eq!(
        count(
            &first.target,
            "SELECT COUNT(*) FROM course_discounts WHERE amount = 150"
        ),
        1
    );
    drop(first);

    let second = run_merge(merge_config(&dir, &["alfa"]));
    assert_eq!(
        count(&second.target, "SELECT COUNT(*) FROM course_discounts"),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn refund_requests_follow_their_registration() {
    let dir = temp_dir("actimerge-refunds");
    let conn = create_database(&dir.join("alfa.sqlite3"));
    let seeded = seed_full_chain(&conn);
    let requester: i64 = conn
        .query_row("SELECT id FROM users LIMIT 1", [], |row| row.get(0))
        .unwrap();
    conn.execute(
        "INSERT INTO refund_requests(registration_id, requested_by_id, iban, requested_on)
         VALUES(?, ?, 'CZ6508000000192000145399', '2023-11-02')",
        (seeded.registration_id, requester),
    )
    .unwrap();
    drop(conn);

    let ctx = run_merge(merge_config(&dir, &["alfa"]));
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM refund_requests"), 1);

    let _ = std::fs::remove_dir_all(dir);
}
