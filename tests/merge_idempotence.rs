mod support;

use actimerge::context::MergeContext;
use support::*;

/// Seed one source with a representative slice of the data model: identity,
/// catalog, an activity with a variant, a registration with a discount, a
/// calendar export and a message.
fn seed_source(dir: &std::path::Path, name: &str) {
    let conn = create_database(&dir.join(format!("{name}.sqlite3")));

    let user_id = seed_user(&conn, "lena", &format!("lena@{name}.org"));
    let year_id = seed_school_year(&conn, 2023);
    let type_id = seed_activity_type(&conn, "course", "course");
    let activity_id = seed_course_activity(&conn, type_id, year_id, "Pottery");
    let variant_id = seed_variant(&conn, activity_id, "Monday", 1200);
    let registration_id = seed_registration(
        &conn,
        activity_id,
        variant_id,
        user_id,
        "2023-09-05 09:30:00",
    );

    conn.execute(
        "INSERT INTO course_discounts(registration_id, amount, explanation) VALUES(?, 200, 'sibling')",
        [registration_id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO calendar_exports(id, name) VALUES('3f2a77f0-7e01-4bb5-9e6a-1d70a1a1c0de', ?)",
        [name],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO messages(subject, text, sender_id, created)
         VALUES('Welcome', 'Hi', ?, '2023-09-01 12:00:00')",
        [user_id],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO message_recipients(message_id, recipient_id, sent)
         VALUES(?, ?, '2023-09-01 12:00:05')",
        (conn.last_insert_rowid(), user_id),
    )
    .unwrap();
}

fn snapshot(ctx: &MergeContext) -> Vec<i64> {
    [
        "users",
        "school_years",
        "activity_types",
        "pages",
        "activities",
        "courses",
        "activity_variants",
        "registrations",
        "course_registrations",
        "course_discounts",
        "calendar_exports",
        "messages",
        "message_recipients",
        "imported_ids_map",
    ]
    .iter()
    .map(|table| count(&ctx.target, &format!("SELECT COUNT(*) FROM {table}")))
    .collect()
}

#[test]
fn second_run_changes_nothing() {
    let dir = temp_dir("actimerge-idempotence");
    seed_source(&dir, "alfa");
    seed_source(&dir, "bravo");

    let first = run_merge(merge_config(&dir, &["alfa", "bravo"]));
    let after_first = snapshot(&first);
    drop(first);

    let second = run_merge(merge_config(&dir, &["alfa", "bravo"]));
    let after_second = snapshot(&second);

    assert_eq!(after_first, after_second);

    // Two tenants, one catalog: the course type and the shared export
    // collapse, while per-tenant users and registrations stay separate.
    assert_eq!(count(&second.target, "SELECT COUNT(*) FROM users"), 2);
    assert_eq!(count(&second.target, "SELECT COUNT(*) FROM activity_types"), 1);
    assert_eq!(count(&second.target, "SELECT COUNT(*) FROM activities"), 2);
    assert_eq!(count(&second.target, "SELECT COUNT(*) FROM registrations"), 2);
    assert_eq!(
        count(&second.target, "SELECT COUNT(*) FROM calendar_exports"),
        1
    );
    assert_eq!(
        count(
            &second.target,
            "SELECT COUNT(*) FROM calendar_exports
             WHERE id = '3f2a77f0-7e01-4bb5-9e6a-1d70a1a1c0de'"
        ),
        1
    );

    // The activity type got a published page keyed by its slug.
    assert_eq!(
        count(
            &second.target,
            "SELECT COUNT(*) FROM pages WHERE slug = 'course' AND published = 1"
        ),
        1
    );
    assert_eq!(
        count(
            &second.target,
            "SELECT COUNT(*) FROM activity_types WHERE page_id IS NULL"
        ),
        0
    );

    // Original timestamps survive the copy.
    assert_eq!(
        count(
            &second.target,
            "SELECT COUNT(*) FROM messages WHERE created = '2023-09-01 12:00:00'"
        ),
        2
    );
    assert_eq!(
        count(
            &second.target,
            "SELECT COUNT(*) FROM registrations WHERE created = '2023-09-05 09:30:00'"
        ),
        2
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn site_settings_are_stamped() {
    let dir = temp_dir("actimerge-site");
    seed_source(&dir, "alfa");

    let ctx = run_merge(merge_config(&dir, &["alfa"]));
    let (domain, name): (String, String) = ctx
        .target
        .query_row("SELECT domain, name FROM site_settings WHERE id = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(domain, "example.org");
    assert_eq!(name, "Example");

    let _ = std::fs::remove_dir_all(dir);
}
