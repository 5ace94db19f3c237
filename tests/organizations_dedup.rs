mod support;

use rusqlite::Connection;
use support::*;

fn seed_org(conn: &Connection, name: &str, iban: &str) {
    conn.execute(
        "INSERT INTO organizations(name, iban) VALUES(?, ?)",
        (name, iban),
    )
    .unwrap();
}

/// The same legal entity shows up under slightly different names across
/// tenants; the IBAN is what identifies it. Two entities sharing a display
/// name must stay separate.
#[test]
fn organizations_dedup_by_iban_not_by_name() {
    let dir = temp_dir("actimerge-organizations");
    let alfa = create_database(&dir.join("alfa.sqlite3"));
    let beta = create_database(&dir.join("beta.sqlite3"));

    seed_org(&alfa, "Spolek Sova", "CZ6508000000192000145399");
    // Same entity, renamed after re-registration.
    seed_org(&beta, "Spolek Sova z.s.", "CZ6508000000192000145399");
    // Different entity that happens to reuse the old name.
    seed_org(&beta, "Spolek Sova", "CZ9455000000001011038930");
    drop(alfa);
    drop(beta);

    let ctx = run_merge(merge_config(&dir, &["alfa", "beta"]));

    assert_eq!(count(&ctx.target, "SELECT COUNT(*) FROM organizations"), 2);
    assert_eq!(
        count(&ctx.target, "SELECT COUNT(DISTINCT iban) FROM organizations"),
        2
    );
    // First writer wins: the renamed copy collapsed onto alfa's row.
    assert_eq!(
        count(
            &ctx.target,
            "SELECT COUNT(*) FROM organizations
             WHERE iban = 'CZ6508000000192000145399' AND name = 'Spolek Sova'"
        ),
        1
    );

    let _ = std::fs::remove_dir_all(dir);
}
