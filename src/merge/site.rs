use tracing::info;

use crate::context::MergeContext;

/// Stamp the configured domain and display name onto the singleton settings
/// row. Runs before anything else touches the target so later phases (page
/// slugs, exports) see the final site identity.
pub fn configure_site(ctx: &mut MergeContext) -> anyhow::Result<()> {
    ctx.target.execute(
        "UPDATE site_settings SET domain = ?, name = ? WHERE id = 1",
        (&ctx.config.site.domain, &ctx.config.site.name),
    )?;
    Ok(())
}

/// Give every activity type without a content page one, published and in the
/// navigation. Page slugs reuse the type's slug, so re-runs find the page
/// again instead of duplicating it.
pub fn create_activity_type_pages(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target, publisher, ..
    } = ctx;

    let mut stmt =
        target.prepare("SELECT id, plural, slug FROM activity_types WHERE page_id IS NULL")?;
    let types = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    for (type_id, plural, slug) in types {
        let page_id = publisher.publish(target, &plural, &slug)?;
        target.execute(
            "UPDATE activity_types SET page_id = ? WHERE id = ?",
            (page_id, type_id),
        )?;
        info!(slug, page_id, "published activity type page");
    }
    Ok(())
}
