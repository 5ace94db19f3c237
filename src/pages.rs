use rusqlite::{Connection, OptionalExtension};

/// Content-page publishing collaborator. The merge only needs an opaque page
/// id back; how the page is rendered is somebody else's problem.
pub trait PagePublisher {
    fn publish(&mut self, conn: &Connection, title: &str, slug: &str) -> anyhow::Result<i64>;
}

/// Default publisher writing into the `pages` table of the target database.
pub struct SitePagePublisher;

impl PagePublisher for SitePagePublisher {
    fn publish(&mut self, conn: &Connection, title: &str, slug: &str) -> anyhow::Result<i64> {
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM pages WHERE slug = ?", [slug], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO pages(title, slug, published, in_navigation) VALUES(?, ?, 1, 1)",
            (title, slug),
        )?;
        Ok(conn.last_insert_rowid())
    }
}
