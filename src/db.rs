use std::path::Path;

use anyhow::Context;
use rusqlite::{Connection, OpenFlags};

/// Tables every source database must carry. Used as a probe when no external
/// migration command is configured (sources are opened read-only, so the
/// built-in schema cannot be applied to them).
const REQUIRED_TABLES: &[&str] = &["users", "activities", "registrations", "journals"];

pub fn open_target(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open target database {}", path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

pub fn open_source(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open source database {}", path.to_string_lossy()))?;
    Ok(conn)
}

pub fn verify_schema(conn: &Connection) -> anyhow::Result<()> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?")?;
    for table in REQUIRED_TABLES {
        let present = stmt.exists([table])?;
        if !present {
            anyhow::bail!("database is missing table {}", table);
        }
    }
    Ok(())
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("failed to apply schema")?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS imported_ids_map(
    id INTEGER PRIMARY KEY,
    model_name TEXT NOT NULL,
    connection TEXT NOT NULL,
    foreign_id INTEGER NOT NULL,
    local_id INTEGER NOT NULL,
    UNIQUE(connection, model_name, foreign_id)
);

CREATE TABLE IF NOT EXISTS site_settings(
    id INTEGER PRIMARY KEY CHECK (id = 1),
    domain TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT ''
);
INSERT OR IGNORE INTO site_settings(id) VALUES(1);

CREATE TABLE IF NOT EXISTS pages(
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    published INTEGER NOT NULL DEFAULT 0,
    in_navigation INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS auth_permissions(
    id INTEGER PRIMARY KEY,
    codename TEXT NOT NULL,
    model TEXT NOT NULL,
    UNIQUE(codename, model)
);
CREATE TABLE IF NOT EXISTS auth_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS auth_group_permissions(
    group_id INTEGER NOT NULL REFERENCES auth_groups(id),
    permission_id INTEGER NOT NULL REFERENCES auth_permissions(id),
    UNIQUE(group_id, permission_id)
);

CREATE TABLE IF NOT EXISTS users(
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL,
    password TEXT NOT NULL DEFAULT '',
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    is_staff INTEGER NOT NULL DEFAULT 0,
    is_superuser INTEGER NOT NULL DEFAULT 0,
    date_joined TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS user_groups(
    user_id INTEGER NOT NULL REFERENCES users(id),
    group_id INTEGER NOT NULL REFERENCES auth_groups(id),
    UNIQUE(user_id, group_id)
);
CREATE TABLE IF NOT EXISTS user_permissions(
    user_id INTEGER NOT NULL REFERENCES users(id),
    permission_id INTEGER NOT NULL REFERENCES auth_permissions(id),
    UNIQUE(user_id, permission_id)
);

CREATE TABLE IF NOT EXISTS folders(
    id INTEGER PRIMARY KEY,
    parent_id INTEGER REFERENCES folders(id),
    name TEXT NOT NULL,
    owner_id INTEGER REFERENCES users(id),
    created_at TEXT,
    UNIQUE(parent_id, name)
);
CREATE TABLE IF NOT EXISTS files(
    id INTEGER PRIMARY KEY,
    folder_id INTEGER REFERENCES folders(id),
    kind TEXT NOT NULL CHECK (kind IN ('file', 'image')),
    name TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    sha1 TEXT NOT NULL,
    owner_id INTEGER REFERENCES users(id),
    modified_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_files_folder ON files(folder_id);
CREATE TABLE IF NOT EXISTS images(
    file_id INTEGER PRIMARY KEY REFERENCES files(id),
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bank_accounts(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    iban TEXT NOT NULL DEFAULT '',
    bic TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS bank_statements(
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES bank_accounts(id),
    statement TEXT NOT NULL,
    from_date TEXT,
    to_date TEXT,
    UNIQUE(account_id, statement)
);
CREATE TABLE IF NOT EXISTS bank_transactions(
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES bank_accounts(id),
    statement_id INTEGER REFERENCES bank_statements(id),
    transaction_code TEXT NOT NULL,
    amount INTEGER NOT NULL DEFAULT 0,
    accounted_on TEXT,
    UNIQUE(account_id, transaction_code)
);

CREATE TABLE IF NOT EXISTS print_setups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    background_file_id INTEGER REFERENCES files(id)
);
CREATE TABLE IF NOT EXISTS organizations(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    iban TEXT NOT NULL DEFAULT '',
    donation_print_setup_id INTEGER REFERENCES print_setups(id)
);
CREATE TABLE IF NOT EXISTS departments(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS places(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS questions(
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    question TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS school_years(
    id INTEGER PRIMARY KEY,
    year INTEGER NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS school_year_divisions(
    id INTEGER PRIMARY KEY,
    school_year_id INTEGER NOT NULL REFERENCES school_years(id),
    name TEXT NOT NULL,
    UNIQUE(school_year_id, name)
);
CREATE TABLE IF NOT EXISTS school_year_periods(
    id INTEGER PRIMARY KEY,
    division_id INTEGER NOT NULL REFERENCES school_year_divisions(id),
    name TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    UNIQUE(division_id, name)
);

CREATE TABLE IF NOT EXISTS stat_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS age_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    stat_group_id INTEGER NOT NULL REFERENCES stat_groups(id)
);
CREATE TABLE IF NOT EXISTS target_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    stat_group_id INTEGER NOT NULL REFERENCES stat_groups(id)
);
CREATE TABLE IF NOT EXISTS citizenships(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS schools(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS leaders(
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
    description TEXT NOT NULL DEFAULT '',
    photo_file_id INTEGER REFERENCES files(id),
    page_id INTEGER REFERENCES pages(id)
);
CREATE TABLE IF NOT EXISTS leader_school_years(
    leader_id INTEGER NOT NULL REFERENCES leaders(id),
    school_year_id INTEGER NOT NULL REFERENCES school_years(id),
    UNIQUE(leader_id, school_year_id)
);
CREATE TABLE IF NOT EXISTS leader_contacts(
    id INTEGER PRIMARY KEY,
    leader_id INTEGER NOT NULL REFERENCES leaders(id),
    contact_type TEXT NOT NULL,
    contact TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS parents(
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    street TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    phone TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS participants(
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    birth_date TEXT,
    age_group_id INTEGER NOT NULL REFERENCES age_groups(id),
    citizenship_id INTEGER NOT NULL REFERENCES citizenships(id),
    school_id INTEGER REFERENCES schools(id),
    street TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS group_contacts(
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    target_group_id INTEGER NOT NULL REFERENCES target_groups(id),
    school_id INTEGER REFERENCES schools(id),
    phone TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS billing_infos(
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    street TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    company_num TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS agreements(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS agreement_options(
    id INTEGER PRIMARY KEY,
    agreement_id INTEGER NOT NULL REFERENCES agreements(id),
    name TEXT NOT NULL,
    required INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS activity_types(
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    plural TEXT NOT NULL,
    model TEXT NOT NULL CHECK (model IN ('course', 'event', 'orderable')),
    page_id INTEGER REFERENCES pages(id),
    organization_id INTEGER REFERENCES organizations(id),
    reg_print_setup_id INTEGER REFERENCES print_setups(id),
    decision_print_setup_id INTEGER REFERENCES print_setups(id),
    pr_print_setup_id INTEGER REFERENCES print_setups(id),
    bill_print_setup_id INTEGER REFERENCES print_setups(id)
);
CREATE TABLE IF NOT EXISTS activity_type_questions(
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    question_id INTEGER NOT NULL REFERENCES questions(id),
    UNIQUE(activity_type_id, question_id)
);
CREATE TABLE IF NOT EXISTS activity_type_agreements(
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    agreement_id INTEGER NOT NULL REFERENCES agreements(id),
    UNIQUE(activity_type_id, agreement_id)
);
CREATE TABLE IF NOT EXISTS activity_type_attachments(
    id INTEGER PRIMARY KEY,
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    file_id INTEGER NOT NULL REFERENCES files(id),
    UNIQUE(activity_type_id, file_id)
);
CREATE TABLE IF NOT EXISTS activity_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS activity_group_types(
    activity_group_id INTEGER NOT NULL REFERENCES activity_groups(id),
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    UNIQUE(activity_group_id, activity_type_id)
);

CREATE TABLE IF NOT EXISTS resources(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    leader_id INTEGER REFERENCES leaders(id)
);
CREATE TABLE IF NOT EXISTS resource_availabilities(
    id INTEGER PRIMARY KEY,
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    day_of_week INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS resource_groups(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS resource_group_resources(
    resource_group_id INTEGER NOT NULL REFERENCES resource_groups(id),
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    UNIQUE(resource_group_id, resource_id)
);

CREATE TABLE IF NOT EXISTS activities(
    id INTEGER PRIMARY KEY,
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    school_year_id INTEGER NOT NULL REFERENCES school_years(id),
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    registration_type TEXT NOT NULL DEFAULT 'participants'
        CHECK (registration_type IN ('participants', 'groups')),
    department_id INTEGER REFERENCES departments(id),
    place_id INTEGER REFERENCES places(id),
    photo_file_id INTEGER REFERENCES files(id),
    page_id INTEGER REFERENCES pages(id),
    reg_print_setup_id INTEGER REFERENCES print_setups(id),
    decision_print_setup_id INTEGER REFERENCES print_setups(id),
    pr_print_setup_id INTEGER REFERENCES print_setups(id),
    bill_print_setup_id INTEGER REFERENCES print_setups(id),
    organization_id INTEGER REFERENCES organizations(id)
);
CREATE TABLE IF NOT EXISTS courses(
    activity_id INTEGER PRIMARY KEY REFERENCES activities(id),
    allow_period_selection INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS events(
    activity_id INTEGER PRIMARY KEY REFERENCES activities(id),
    start_date TEXT,
    end_date TEXT
);
CREATE TABLE IF NOT EXISTS orderables(
    activity_id INTEGER PRIMARY KEY REFERENCES activities(id),
    duration_days INTEGER NOT NULL DEFAULT 1,
    due_from_days INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS activity_activity_groups(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    activity_group_id INTEGER NOT NULL REFERENCES activity_groups(id),
    UNIQUE(activity_id, activity_group_id)
);
CREATE TABLE IF NOT EXISTS activity_age_groups(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    age_group_id INTEGER NOT NULL REFERENCES age_groups(id),
    UNIQUE(activity_id, age_group_id)
);
CREATE TABLE IF NOT EXISTS activity_target_groups(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    target_group_id INTEGER NOT NULL REFERENCES target_groups(id),
    UNIQUE(activity_id, target_group_id)
);
CREATE TABLE IF NOT EXISTS activity_leaders(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    leader_id INTEGER NOT NULL REFERENCES leaders(id),
    UNIQUE(activity_id, leader_id)
);
CREATE TABLE IF NOT EXISTS activity_questions(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    question_id INTEGER NOT NULL REFERENCES questions(id),
    UNIQUE(activity_id, question_id)
);
CREATE TABLE IF NOT EXISTS activity_agreements(
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    agreement_id INTEGER NOT NULL REFERENCES agreements(id),
    UNIQUE(activity_id, agreement_id)
);
CREATE TABLE IF NOT EXISTS activity_times(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    day_of_week INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS activity_attachments(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    file_id INTEGER NOT NULL REFERENCES files(id)
);

CREATE TABLE IF NOT EXISTS activity_variants(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    name TEXT NOT NULL,
    school_year_division_id INTEGER REFERENCES school_year_divisions(id),
    price INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS activity_variant_age_groups(
    variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    age_group_id INTEGER NOT NULL REFERENCES age_groups(id),
    UNIQUE(variant_id, age_group_id)
);
CREATE TABLE IF NOT EXISTS activity_variant_target_groups(
    variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    target_group_id INTEGER NOT NULL REFERENCES target_groups(id),
    UNIQUE(variant_id, target_group_id)
);
CREATE TABLE IF NOT EXISTS activity_variant_resources(
    variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    UNIQUE(variant_id, resource_id)
);
CREATE TABLE IF NOT EXISTS activity_variant_resource_groups(
    variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    resource_group_id INTEGER NOT NULL REFERENCES resource_groups(id),
    UNIQUE(variant_id, resource_group_id)
);

CREATE TABLE IF NOT EXISTS calendar_events(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    name TEXT NOT NULL DEFAULT '',
    start_at TEXT NOT NULL,
    end_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS calendar_event_resources(
    calendar_event_id INTEGER NOT NULL REFERENCES calendar_events(id),
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    UNIQUE(calendar_event_id, resource_id)
);
CREATE TABLE IF NOT EXISTS calendar_event_resource_groups(
    calendar_event_id INTEGER NOT NULL REFERENCES calendar_events(id),
    resource_group_id INTEGER NOT NULL REFERENCES resource_groups(id),
    UNIQUE(calendar_event_id, resource_group_id)
);
CREATE TABLE IF NOT EXISTS calendar_exports(
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS calendar_export_resources(
    calendar_export_id TEXT NOT NULL REFERENCES calendar_exports(id),
    resource_id INTEGER NOT NULL REFERENCES resources(id),
    UNIQUE(calendar_export_id, resource_id)
);

CREATE TABLE IF NOT EXISTS registration_links(
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    school_year_id INTEGER NOT NULL REFERENCES school_years(id),
    activity_type_id INTEGER NOT NULL REFERENCES activity_types(id),
    expires_at TEXT
);
CREATE TABLE IF NOT EXISTS registration_link_variants(
    registration_link_id INTEGER NOT NULL REFERENCES registration_links(id),
    variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    UNIQUE(registration_link_id, variant_id)
);

CREATE TABLE IF NOT EXISTS registrations(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    activity_variant_id INTEGER NOT NULL REFERENCES activity_variants(id),
    calendar_event_id INTEGER REFERENCES calendar_events(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    price INTEGER NOT NULL DEFAULT 0,
    note TEXT NOT NULL DEFAULT '',
    created TEXT NOT NULL DEFAULT (datetime('now')),
    created_by_id INTEGER REFERENCES users(id),
    approved TEXT,
    approved_by_id INTEGER REFERENCES users(id),
    payment_requested_by_id INTEGER REFERENCES users(id),
    refund_offered_by_id INTEGER REFERENCES users(id),
    cancelation_requested_by_id INTEGER REFERENCES users(id),
    canceled TEXT,
    canceled_by_id INTEGER REFERENCES users(id),
    registration_link_id INTEGER REFERENCES registration_links(id)
);
CREATE TABLE IF NOT EXISTS course_registrations(
    registration_id INTEGER PRIMARY KEY REFERENCES registrations(id),
    attends_from TEXT,
    attends_until TEXT
);
CREATE TABLE IF NOT EXISTS event_registrations(
    registration_id INTEGER PRIMARY KEY REFERENCES registrations(id),
    attended INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS orderable_registrations(
    registration_id INTEGER PRIMARY KEY REFERENCES registrations(id),
    event_date TEXT,
    event_duration_days INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS registration_questions(
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    question_id INTEGER NOT NULL REFERENCES questions(id),
    UNIQUE(registration_id, question_id)
);
CREATE TABLE IF NOT EXISTS registration_agreements(
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    agreement_id INTEGER NOT NULL REFERENCES agreements(id),
    UNIQUE(registration_id, agreement_id)
);
CREATE TABLE IF NOT EXISTS registration_agreement_options(
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    agreement_option_id INTEGER NOT NULL REFERENCES agreement_options(id),
    UNIQUE(registration_id, agreement_option_id)
);
CREATE TABLE IF NOT EXISTS registration_participants(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    birth_date TEXT,
    age_group_id INTEGER NOT NULL REFERENCES age_groups(id),
    citizenship_id INTEGER NOT NULL REFERENCES citizenships(id),
    school_id INTEGER REFERENCES schools(id)
);
CREATE TABLE IF NOT EXISTS registration_groups(
    registration_id INTEGER PRIMARY KEY REFERENCES registrations(id),
    name TEXT NOT NULL,
    target_group_id INTEGER NOT NULL REFERENCES target_groups(id),
    school_id INTEGER REFERENCES schools(id)
);
CREATE TABLE IF NOT EXISTS registration_group_members(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS registration_billing_infos(
    registration_id INTEGER PRIMARY KEY REFERENCES registrations(id),
    name TEXT NOT NULL,
    street TEXT NOT NULL DEFAULT '',
    city TEXT NOT NULL DEFAULT '',
    postal_code TEXT NOT NULL DEFAULT '',
    company_num TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS course_registration_periods(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    period_id INTEGER NOT NULL REFERENCES school_year_periods(id),
    UNIQUE(registration_id, period_id)
);
CREATE TABLE IF NOT EXISTS refund_requests(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL UNIQUE REFERENCES registrations(id),
    requested_by_id INTEGER NOT NULL REFERENCES users(id),
    iban TEXT NOT NULL DEFAULT '',
    requested_on TEXT
);

CREATE TABLE IF NOT EXISTS course_discounts(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    amount INTEGER NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    accounted_on TEXT,
    accounted_by_id INTEGER REFERENCES users(id),
    last_updated_by_id INTEGER REFERENCES users(id)
);
CREATE TABLE IF NOT EXISTS event_discounts(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    amount INTEGER NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    accounted_on TEXT,
    accounted_by_id INTEGER REFERENCES users(id),
    last_updated_by_id INTEGER REFERENCES users(id)
);
CREATE TABLE IF NOT EXISTS orderable_discounts(
    id INTEGER PRIMARY KEY,
    registration_id INTEGER NOT NULL REFERENCES registrations(id),
    amount INTEGER NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    accounted_on TEXT,
    accounted_by_id INTEGER REFERENCES users(id),
    last_updated_by_id INTEGER REFERENCES users(id)
);
CREATE TABLE IF NOT EXISTS transactions(
    id INTEGER PRIMARY KEY,
    transaction_type TEXT NOT NULL,
    amount INTEGER NOT NULL,
    accounted_on TEXT,
    accounted_by_id INTEGER REFERENCES users(id),
    last_updated_by_id INTEGER REFERENCES users(id),
    source_registration_id INTEGER REFERENCES registrations(id),
    target_registration_id INTEGER REFERENCES registrations(id),
    donor_id INTEGER REFERENCES users(id),
    organization_id INTEGER REFERENCES organizations(id),
    bank_transaction_id INTEGER REFERENCES bank_transactions(id),
    note TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS timesheet_periods(
    id INTEGER PRIMARY KEY,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    UNIQUE(start_date, end_date)
);
CREATE TABLE IF NOT EXISTS timesheets(
    id INTEGER PRIMARY KEY,
    period_id INTEGER NOT NULL REFERENCES timesheet_periods(id),
    leader_id INTEGER NOT NULL REFERENCES leaders(id),
    submitted INTEGER NOT NULL DEFAULT 0,
    paid INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS timesheet_entry_types(
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS timesheet_entries(
    id INTEGER PRIMARY KEY,
    timesheet_id INTEGER NOT NULL REFERENCES timesheets(id),
    entry_type_id INTEGER NOT NULL REFERENCES timesheet_entry_types(id),
    date TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS journals(
    id INTEGER PRIMARY KEY,
    activity_id INTEGER NOT NULL REFERENCES activities(id),
    name TEXT NOT NULL DEFAULT '',
    school_year_division_id INTEGER REFERENCES school_year_divisions(id),
    risks TEXT NOT NULL DEFAULT '',
    plan TEXT NOT NULL DEFAULT '',
    evaluation TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS journal_leaders(
    journal_id INTEGER NOT NULL REFERENCES journals(id),
    leader_id INTEGER NOT NULL REFERENCES leaders(id),
    UNIQUE(journal_id, leader_id)
);
CREATE TABLE IF NOT EXISTS journal_participants(
    journal_id INTEGER NOT NULL REFERENCES journals(id),
    participant_id INTEGER NOT NULL REFERENCES registration_participants(id),
    UNIQUE(journal_id, participant_id)
);
CREATE TABLE IF NOT EXISTS journal_times(
    id INTEGER PRIMARY KEY,
    journal_id INTEGER NOT NULL REFERENCES journals(id),
    day_of_week INTEGER NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS journal_entries(
    id INTEGER PRIMARY KEY,
    journal_id INTEGER NOT NULL REFERENCES journals(id),
    date TEXT NOT NULL,
    period_id INTEGER REFERENCES school_year_periods(id),
    agenda TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS journal_entry_participants(
    journal_entry_id INTEGER NOT NULL REFERENCES journal_entries(id),
    participant_id INTEGER NOT NULL REFERENCES registration_participants(id),
    UNIQUE(journal_entry_id, participant_id)
);
CREATE TABLE IF NOT EXISTS journal_entry_instructed(
    journal_entry_id INTEGER NOT NULL REFERENCES journal_entries(id),
    participant_id INTEGER NOT NULL REFERENCES registration_participants(id),
    UNIQUE(journal_entry_id, participant_id)
);
CREATE TABLE IF NOT EXISTS journal_leader_entries(
    id INTEGER PRIMARY KEY,
    journal_entry_id INTEGER NOT NULL REFERENCES journal_entries(id),
    timesheet_id INTEGER NOT NULL REFERENCES timesheets(id),
    start_time TEXT,
    end_time TEXT
);

CREATE TABLE IF NOT EXISTS messages(
    id INTEGER PRIMARY KEY,
    subject TEXT NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    sender_id INTEGER REFERENCES users(id),
    created TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE TABLE IF NOT EXISTS message_recipients(
    id INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL REFERENCES messages(id),
    recipient_id INTEGER NOT NULL REFERENCES users(id),
    sent TEXT NOT NULL DEFAULT (datetime('now')),
    viewed TEXT
);
CREATE TABLE IF NOT EXISTS message_attachments(
    id INTEGER PRIMARY KEY,
    message_id INTEGER NOT NULL REFERENCES messages(id),
    file_id INTEGER NOT NULL REFERENCES files(id)
);
"#;
