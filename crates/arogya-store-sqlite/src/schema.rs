//! SQL schema for the Arogya SQLite ledger.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! the `user_version` pragma.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per claimed payment attempt. Rows are financial records:
-- status is written at most once past 'pending', and no DELETE is ever
-- issued against this table.
CREATE TABLE IF NOT EXISTS payments (
    payment_id          TEXT PRIMARY KEY,
    plan                TEXT NOT NULL,      -- 'free' | 'basic' | 'premium'
    amount              INTEGER NOT NULL,   -- canonical rupees, server-computed
    phone               TEXT NOT NULL,
    user_email          TEXT NOT NULL,
    merchant_txn_id     TEXT NOT NULL UNIQUE,
    transaction_note    TEXT,
    proof_path          TEXT,               -- blob-store reference; NULL for gateway rows
    status              TEXT NOT NULL DEFAULT 'pending',
    created_at          TEXT NOT NULL,      -- ISO 8601 UTC; server-assigned
    verified_at         TEXT,
    verified_by         TEXT,               -- 'admin' | 'gateway'
    notes               TEXT,
    entitlement_applied INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS accounts (
    email      TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    phone      TEXT,
    plan       TEXT NOT NULL DEFAULT 'free',
    status     TEXT NOT NULL DEFAULT 'free',
    credits    INTEGER NOT NULL DEFAULT 5,  -- -1 means unlimited
    expires_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Audit rows are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS payment_audit (
    audit_id    TEXT PRIMARY KEY,
    payment_id  TEXT,                       -- NULL for events with no ledger row
    event       TEXT NOT NULL,              -- discriminant of AuditKind
    old_status  TEXT,
    new_status  TEXT,
    actor       TEXT,
    event_data  TEXT NOT NULL DEFAULT 'null',
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS payments_status_idx ON payments(status, created_at);
CREATE INDEX IF NOT EXISTS payments_email_idx  ON payments(user_email);
CREATE INDEX IF NOT EXISTS audit_payment_idx   ON payment_audit(payment_id);

PRAGMA user_version = 1;
";
