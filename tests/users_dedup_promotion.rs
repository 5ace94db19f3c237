mod support;

use rusqlite::Connection;
use support::*;

#[test]
fn users_with_same_email_collapse_and_promote() {
    let dir = temp_dir("actimerge-users");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let bravo = create_database(&dir.join("bravo.sqlite3"));

    alfa.execute(
        "INSERT INTO users(username, email, password, first_name, last_name, is_active, is_staff,
                           is_superuser, date_joined)
         VALUES('jana', 'Jana@Example.org', 'x', '', 'Novak', 0, 0, 0, '2021-06-01 10:00:00')",
        [],
    )
    .unwrap();
    bravo.execute(
        "INSERT INTO users(username, email, password, first_name, last_name, is_active, is_staff,
                           is_superuser, date_joined)
         VALUES('jana.n', 'jana@example.org', 'y', 'Jana', '', 1, 1, 0, '2019-09-01 08:00:00')",
        [],
    )
    .unwrap();
    drop(alfa);
    drop(bravo);

    let ctx = run_merge(merge_config(&dir, &["alfa", "bravo"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM users"), 1);
    let (first, last, active, staff, joined): (String, String, bool, bool, String) = ctx
        .target
        .query_row(
            "SELECT first_name, last_name, is_active, is_staff, date_joined FROM users",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .unwrap();
    assert_eq!(first, "Jana");
    assert_eq!(last, "Novak");
    assert!(active);
    assert!(staff);
    assert_eq!(joined, "2019-09-01 08:00:00");

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn username_collisions_fall_back_through_email() {
    let dir = temp_dir("actimerge-usernames");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let bravo = create_database(&dir.join("bravo.sqlite3"));

    seed_user(&alfa, "petr", "petr@one.org");
    // Same requested username, different person.
    seed_user(&bravo, "petr", "petr@two.org");
    drop(alfa);
    drop(bravo);

    let ctx = run_merge(merge_config(&dir, &["alfa", "bravo"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM users"), 2);
    // "petr" is taken, its local part equals the taken name, so the full
    // email is next in line.
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM users WHERE username = 'petr@two.org'"
        ),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn group_memberships_union_across_sources() {
    let dir = temp_dir("actimerge-groups");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let bravo = create_database(&dir.join("bravo.sqlite3"));

    for conn in [&alfa, &bravo] {
        conn.execute("INSERT INTO auth_groups(name) VALUES('Leaders')", [])
            .unwrap();
    }
    alfa.execute("INSERT INTO auth_groups(name) VALUES('Office')", [])
        .unwrap();

    let seed_membership = |conn: &Connection, group_ids: &[i64]| {
        let user_id = seed_user(conn, "eva", "eva@example.org");
        for group_id in group_ids {
            conn.execute(
                "INSERT INTO user_groups(user_id, group_id) VALUES(?, ?)",
                (user_id, group_id),
            )
            .unwrap();
        }
    };
    seed_membership(&alfa, &[1, 2]);
    seed_membership(&bravo, &[1]);
    drop(alfa);
    drop(bravo);

    let ctx = run_merge(merge_config(&dir, &["alfa", "bravo"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM auth_groups"), 2);
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM users"), 1);
    // One membership per distinct group even though "Leaders" came twice.
    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM user_groups"), 2);

    let _ = std::fs::remove_dir_all(dir);
}
