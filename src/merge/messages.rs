use crate::context::MergeContext;
use crate::idmap;

pub fn merge_messages(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let MergeContext {
        target,
        sources,
        maps,
        ..
    } = ctx;

    for (name, source) in sources.iter() {
        let mut stmt =
            source.prepare("SELECT id, subject, text, sender_id, created FROM messages")?;
        let messages = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        for (foreign_id, subject, text, sender, created) in messages {
            if maps.messages.contains(name, foreign_id) {
                continue;
            }
            let sender = idmap::resolve_opt(&maps.users, "user", name, sender)?;
            target.execute(
                "INSERT INTO messages(subject, text, sender_id) VALUES(?, ?, ?)",
                (&subject, &text, sender),
            )?;
            let local_id = target.last_insert_rowid();
            // The insert stamps "now"; restore the original creation time.
            target.execute(
                "UPDATE messages SET created = ? WHERE id = ?",
                (&created, local_id),
            )?;

            let mut rec_stmt = source.prepare(
                "SELECT recipient_id, sent, viewed FROM message_recipients WHERE message_id = ?",
            )?;
            let recipients = rec_stmt
                .query_map([foreign_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            for (recipient_id, sent, viewed) in recipients {
                let local_recipient = idmap::require(&maps.users, "user", name, recipient_id)?;
                target.execute(
                    "INSERT INTO message_recipients(message_id, recipient_id, viewed)
                     VALUES(?, ?, ?)",
                    (local_id, local_recipient, &viewed),
                )?;
                let recipient_row = target.last_insert_rowid();
                target.execute(
                    "UPDATE message_recipients SET sent = ? WHERE id = ?",
                    (&sent, recipient_row),
                )?;
            }

            let mut att_stmt =
                source.prepare("SELECT file_id FROM message_attachments WHERE message_id = ?")?;
            let file_ids = att_stmt
                .query_map([foreign_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            for file_id in file_ids {
                let local_file = idmap::require(&maps.files, "file", name, file_id)?;
                target.execute(
                    "INSERT INTO message_attachments(message_id, file_id) VALUES(?, ?)",
                    (local_id, local_file),
                )?;
            }

            maps.messages.record(name, foreign_id, local_id);
        }
    }

    maps.messages.save(target)?;
    Ok(())
}
