//! SQL schema for the enrolment SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
///
/// Rows are soft-deleted through `is_deleted`; the uniqueness invariants are
/// partial indexes over the non-deleted rows.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS persons (
    id              INTEGER PRIMARY KEY,
    external_id     TEXT    NOT NULL UNIQUE,
    first_name      TEXT    NOT NULL,
    last_name       TEXT    NOT NULL,
    email           TEXT    NOT NULL,
    telephone       TEXT,
    user_id         TEXT,            -- external login identity
    created_on      TEXT    NOT NULL,
    last_updated_on TEXT    NOT NULL,
    is_deleted      INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS persons_user_idx
    ON persons(user_id) WHERE user_id IS NOT NULL AND is_deleted = 0;

CREATE TABLE IF NOT EXISTS organisations (
    id                 INTEGER PRIMARY KEY,
    external_id        TEXT    NOT NULL UNIQUE,
    name               TEXT    NOT NULL,
    nation_id          INTEGER,
    transfer_nation_id INTEGER,      -- set while a nation transfer is pending
    created_on         TEXT    NOT NULL,
    last_updated_on    TEXT    NOT NULL,
    is_deleted         INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS connections (
    id                   INTEGER PRIMARY KEY,
    external_id          TEXT    NOT NULL UNIQUE,
    person_id            INTEGER NOT NULL REFERENCES persons(id),
    organisation_id      INTEGER NOT NULL REFERENCES organisations(id),
    person_role_id       INTEGER NOT NULL,
    organisation_role_id INTEGER NOT NULL,
    job_title            TEXT,
    created_on           TEXT    NOT NULL,
    last_updated_on      TEXT    NOT NULL,
    is_deleted           INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS connections_member_idx
    ON connections(person_id, organisation_id) WHERE is_deleted = 0;

CREATE TABLE IF NOT EXISTS enrolments (
    id              INTEGER PRIMARY KEY,
    external_id     TEXT    NOT NULL UNIQUE,
    connection_id   INTEGER NOT NULL REFERENCES connections(id),
    service_role_id INTEGER NOT NULL,
    status          INTEGER NOT NULL,
    valid_from      TEXT,
    valid_to        TEXT,
    created_on      TEXT    NOT NULL,
    last_updated_on TEXT    NOT NULL,
    is_deleted      INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS enrolments_role_idx
    ON enrolments(connection_id, service_role_id) WHERE is_deleted = 0;

CREATE TABLE IF NOT EXISTS delegated_person_nominations (
    id                       INTEGER PRIMARY KEY,
    enrolment_id             INTEGER NOT NULL REFERENCES enrolments(id),
    nominator_enrolment_id   INTEGER NOT NULL REFERENCES enrolments(id),
    relationship_type        INTEGER NOT NULL,
    consultancy_name         TEXT,
    compliance_scheme_name   TEXT,
    other_organisation_name  TEXT,
    other_description        TEXT,
    nominator_declaration    TEXT    NOT NULL,
    nominator_declaration_at TEXT    NOT NULL,
    nominee_declaration      TEXT,   -- NULL until accepted
    nominee_declaration_at   TEXT,
    created_on               TEXT    NOT NULL,
    last_updated_on          TEXT    NOT NULL,
    is_deleted               INTEGER NOT NULL DEFAULT 0
);

-- One approved person enrolment backs at most one delegate.
CREATE UNIQUE INDEX IF NOT EXISTS delegated_nominator_idx
    ON delegated_person_nominations(nominator_enrolment_id) WHERE is_deleted = 0;
CREATE UNIQUE INDEX IF NOT EXISTS delegated_enrolment_idx
    ON delegated_person_nominations(enrolment_id) WHERE is_deleted = 0;

CREATE TABLE IF NOT EXISTS approved_person_nominations (
    id                     INTEGER PRIMARY KEY,
    enrolment_id           INTEGER NOT NULL REFERENCES enrolments(id),
    nominee_declaration    TEXT,
    nominee_declaration_at TEXT,
    created_on             TEXT    NOT NULL,
    last_updated_on        TEXT    NOT NULL,
    is_deleted             INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS approved_enrolment_idx
    ON approved_person_nominations(enrolment_id) WHERE is_deleted = 0;

-- Append-only.
CREATE TABLE IF NOT EXISTS regulator_comments (
    id                  INTEGER PRIMARY KEY,
    enrolment_id        INTEGER NOT NULL REFERENCES enrolments(id),
    regulator_person_id INTEGER NOT NULL REFERENCES persons(id),
    kind_id             INTEGER NOT NULL,
    text                TEXT    NOT NULL,
    created_on          TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS connections_org_idx   ON connections(organisation_id);
CREATE INDEX IF NOT EXISTS enrolments_conn_idx   ON enrolments(connection_id);
CREATE INDEX IF NOT EXISTS comments_enrolment_idx ON regulator_comments(enrolment_id);

PRAGMA user_version = 1;
";
