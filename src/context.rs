use std::collections::{BTreeMap, HashSet};

use rusqlite::Connection;

use crate::config::MergeConfig;
use crate::db;
use crate::idmap::{IdsMap, PersistentIdsMap};
use crate::pages::{PagePublisher, SitePagePublisher};

/// Explicit run state threaded through every phase. Each phase reads the
/// maps produced by earlier phases and fills in its own; nothing is ambient.
pub struct MergeContext {
    pub config: MergeConfig,
    pub target: Connection,
    /// Source connections in fixed sorted order, opened read-only.
    pub sources: Vec<(String, Connection)>,
    pub publisher: Box<dyn PagePublisher>,
    /// Per source, file ids whose storage path is empty; recorded by the
    /// sanity-fix phase and patched to a placeholder when files merge.
    pub broken_files: BTreeMap<String, HashSet<i64>>,
    /// Per source, activity id -> forced activity type id, recorded by the
    /// repair phase for rows whose discriminator disagrees with their
    /// specialization table.
    pub activity_type_overrides: BTreeMap<String, BTreeMap<i64, i64>>,
    pub maps: MergeMaps,
}

/// One identity map per entity type. Persistent maps survive in the target's
/// `imported_ids_map` table; the rest are rebuilt from natural keys each run.
#[derive(Default)]
pub struct MergeMaps {
    pub permissions: IdsMap,
    pub groups: IdsMap,
    pub users: IdsMap,
    pub folders: IdsMap,
    pub files: IdsMap,
    pub bank_accounts: IdsMap,
    pub bank_statements: IdsMap,
    pub bank_transactions: IdsMap,
    pub print_setups: IdsMap,
    pub organizations: IdsMap,
    pub departments: IdsMap,
    pub places: IdsMap,
    pub questions: IdsMap,
    pub school_years: IdsMap,
    pub school_year_divisions: IdsMap,
    pub school_year_periods: IdsMap,
    pub stat_groups: IdsMap,
    pub age_groups: IdsMap,
    pub target_groups: IdsMap,
    pub citizenships: IdsMap,
    pub schools: IdsMap,
    pub leaders: IdsMap,
    pub agreements: IdsMap,
    pub agreement_options: IdsMap,
    pub activity_types: IdsMap,
    pub activity_groups: IdsMap,
    pub resources: IdsMap,
    pub resource_groups: IdsMap,
    pub registration_links: IdsMap,
    pub activities: PersistentIdsMap,
    pub activity_variants: PersistentIdsMap,
    pub calendar_events: PersistentIdsMap,
    pub registrations: PersistentIdsMap,
    pub registration_participants: PersistentIdsMap,
    pub transactions: PersistentIdsMap,
    pub timesheets: PersistentIdsMap,
    pub timesheet_entries: PersistentIdsMap,
    pub journals: PersistentIdsMap,
    pub journal_entries: PersistentIdsMap,
    pub messages: PersistentIdsMap,
}

impl MergeContext {
    /// Open the target and every configured source. Sources must already
    /// exist; the target file is created if missing.
    pub fn open(config: MergeConfig) -> anyhow::Result<Self> {
        let target = db::open_target(&config.target)?;
        let mut sources = Vec::with_capacity(config.sources.len());
        for (name, path) in &config.sources {
            sources.push((name.clone(), db::open_source(path)?));
        }
        Ok(Self {
            config,
            target,
            sources,
            publisher: Box::new(SitePagePublisher),
            broken_files: BTreeMap::new(),
            activity_type_overrides: BTreeMap::new(),
            maps: MergeMaps::default(),
        })
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Pull the persistent identity maps out of the target. Runs as its own
/// phase once migrations have guaranteed the table exists; everything merged
/// on a previous run is visible to the phases that follow.
pub fn load_imported_ids(ctx: &mut MergeContext) -> anyhow::Result<()> {
    let names = ctx.source_names();
    let maps = &mut ctx.maps;
    maps.activities = PersistentIdsMap::load(&ctx.target, "activities", &names)?;
    maps.activity_variants = PersistentIdsMap::load(&ctx.target, "activity-variants", &names)?;
    maps.calendar_events = PersistentIdsMap::load(&ctx.target, "calendar-events", &names)?;
    maps.registrations = PersistentIdsMap::load(&ctx.target, "registrations", &names)?;
    maps.registration_participants =
        PersistentIdsMap::load(&ctx.target, "registration-participants", &names)?;
    maps.transactions = PersistentIdsMap::load(&ctx.target, "transactions", &names)?;
    maps.timesheets = PersistentIdsMap::load(&ctx.target, "timesheets", &names)?;
    maps.timesheet_entries = PersistentIdsMap::load(&ctx.target, "timesheet-entries", &names)?;
    maps.journals = PersistentIdsMap::load(&ctx.target, "journals", &names)?;
    maps.journal_entries = PersistentIdsMap::load(&ctx.target, "journal-entries", &names)?;
    maps.messages = PersistentIdsMap::load(&ctx.target, "messages", &names)?;
    Ok(())
}
