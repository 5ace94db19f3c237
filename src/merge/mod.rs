use std::io::Write;

use anyhow::Context;

use crate::context::MergeContext;
use crate::migrate;

pub mod access;
pub mod accounting;
pub mod activities;
pub mod banking;
pub mod catalog;
pub mod files;
pub mod journals;
pub mod messages;
pub mod people;
pub mod registrations;
pub mod site;

pub type PhaseFn = fn(&mut MergeContext) -> anyhow::Result<()>;

pub struct Phase {
    pub label: &'static str,
    /// Migration phases delegate to an external command that opens the
    /// target itself, so they must not run under our transaction.
    pub migration: bool,
    pub run: PhaseFn,
}

impl Phase {
    const fn new(label: &'static str, run: PhaseFn) -> Self {
        Self {
            label,
            migration: false,
            run,
        }
    }

    const fn migration(label: &'static str, run: PhaseFn) -> Self {
        Self {
            label,
            migration: true,
            run,
        }
    }
}

/// The fixed, dependency-respecting phase order. This is a pre-computed
/// topological sort of the entity graph; reordering entries breaks the
/// foreign-key resolution of every later phase.
pub fn phases() -> Vec<Phase> {
    vec![
        Phase::migration("Performing local migrations", migrate::perform_local_migrations),
        Phase::new("Configuring site", site::configure_site),
        Phase::new("Fixing broken files", files::fix_broken_files),
        Phase::migration("Performing foreign migrations", migrate::perform_foreign_migrations),
        Phase::new("Loading imported ids", crate::context::load_imported_ids),
        Phase::new("Loading permissions", access::load_permissions),
        Phase::new("Merging groups", access::merge_groups),
        Phase::new("Merging users", access::merge_users),
        Phase::new("Merging folders", files::merge_folders),
        Phase::new("Merging files", files::merge_files),
        Phase::new("Merging bank accounts", banking::merge_bank_accounts),
        Phase::new("Merging bank account statements", banking::merge_bank_statements),
        Phase::new("Merging bank account transactions", banking::merge_bank_transactions),
        Phase::new("Merging print setups", catalog::merge_print_setups),
        Phase::new("Merging organizations", catalog::merge_organizations),
        Phase::new("Merging departments", catalog::merge_departments),
        Phase::new("Merging places", catalog::merge_places),
        Phase::new("Merging questions", catalog::merge_questions),
        Phase::new("Merging school years", catalog::merge_school_years),
        Phase::new("Merging school year divisions", catalog::merge_school_year_divisions),
        Phase::new("Merging school year periods", catalog::merge_school_year_periods),
        Phase::new("Merging stat groups", catalog::merge_stat_groups),
        Phase::new("Merging age groups", catalog::merge_age_groups),
        Phase::new("Merging target groups", catalog::merge_target_groups),
        Phase::new("Merging citizenships", catalog::merge_citizenships),
        Phase::new("Merging schools", catalog::merge_schools),
        Phase::new("Merging leaders", people::merge_leaders),
        Phase::new("Merging parents", people::merge_parents),
        Phase::new("Merging participants", people::merge_participants),
        Phase::new("Merging group contacts", people::merge_group_contacts),
        Phase::new("Merging billing infos", people::merge_billing_infos),
        Phase::new("Merging agreements", people::merge_agreements),
        Phase::new("Merging agreement options", people::merge_agreement_options),
        Phase::new("Merging activity types", activities::merge_activity_types),
        Phase::new("Creating activity type pages", site::create_activity_type_pages),
        Phase::new("Merging activity groups", activities::merge_activity_groups),
        Phase::new("Merging resources", activities::merge_resources),
        Phase::new("Merging resource groups", activities::merge_resource_groups),
        Phase::new("Fixing activities", activities::fix_activities),
        Phase::new("Merging activities", activities::merge_activities),
        Phase::new("Merging activity variants", activities::merge_activity_variants),
        Phase::new("Merging calendar events", activities::merge_calendar_events),
        Phase::new("Merging calendar exports", activities::merge_calendar_exports),
        Phase::new("Merging registration links", activities::merge_registration_links),
        Phase::new("Merging registrations", registrations::merge_registrations),
        Phase::new("Merging course registration periods", registrations::merge_course_registration_periods),
        Phase::new("Merging refund requests", registrations::merge_refund_requests),
        Phase::new("Merging discounts", accounting::merge_discounts),
        Phase::new("Merging transactions", accounting::merge_transactions),
        Phase::new("Merging timesheets", journals::merge_timesheets),
        Phase::new("Merging timesheet entries", journals::merge_timesheet_entries),
        Phase::new("Merging journals", journals::merge_journals),
        Phase::new("Merging journal entries", journals::merge_journal_entries),
        Phase::new("Merging messages", messages::merge_messages),
    ]
}

/// Run every phase in order, each inside its own transaction on the target.
/// The first failure rolls the current phase back and aborts the run;
/// already committed phases stay committed and a re-run resumes through the
/// identity maps.
pub fn run(ctx: &mut MergeContext, skip_migrations: bool) -> anyhow::Result<()> {
    for phase in phases() {
        if skip_migrations && phase.migration {
            continue;
        }
        run_phase(ctx, &phase)?;
    }
    println!("Successfully merged all data");
    Ok(())
}

fn run_phase(ctx: &mut MergeContext, phase: &Phase) -> anyhow::Result<()> {
    print!("{} ... ", phase.label);
    let _ = std::io::stdout().flush();

    let result = if phase.migration {
        (phase.run)(ctx)
    } else {
        run_in_transaction(ctx, phase.run)
    };

    match result {
        Ok(()) => {
            println!("\u{2705}");
            Ok(())
        }
        Err(e) => {
            println!("\u{274c}");
            Err(e).with_context(|| format!("phase failed: {}", phase.label))
        }
    }
}

fn run_in_transaction(ctx: &mut MergeContext, run: PhaseFn) -> anyhow::Result<()> {
    ctx.target.execute_batch("BEGIN IMMEDIATE")?;
    match run(ctx) {
        Ok(()) => {
            ctx.target.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            // Roll back best-effort; the original error is the one to keep.
            let _ = ctx.target.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
