//! DDL for the lifecycle tables.
//!
//! Every statement is `IF NOT EXISTS`, so applying a set twice is a no-op.
//! `gen_random_uuid()` is built into PostgreSQL 13 and later.

/// Serializes concurrent schema initialization (`pg_advisory_xact_lock` key).
pub const SCHEMA_LOCK_KEY: i64 = 0x6f70_656e_636c_6177;

pub const RUNS_TABLE: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS runs (
        id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
        type text CHECK (type IN ('text', 'image')),
        project text,
        status text DEFAULT 'queued'
            CHECK (status IN ('queued', 'running', 'succeeded', 'failed')),
        params jsonb DEFAULT '{}'::jsonb,
        b2_prefix text,
        result jsonb DEFAULT '{}'::jsonb,
        error text,
        created_at timestamptz DEFAULT now(),
        updated_at timestamptz DEFAULT now()
    )
    ",
    "CREATE INDEX IF NOT EXISTS runs_project_idx ON runs (project)",
    "CREATE INDEX IF NOT EXISTS runs_type_idx ON runs (type)",
    "CREATE INDEX IF NOT EXISTS runs_status_idx ON runs (status)",
];

pub const ARTIFACTS_TABLE: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS artifacts (
        id uuid PRIMARY KEY DEFAULT gen_random_uuid(),
        run_id uuid REFERENCES runs (id) ON DELETE CASCADE,
        kind text CHECK (kind IN ('image', 'text', 'model', 'other')),
        path text,
        metadata jsonb DEFAULT '{}'::jsonb,
        created_at timestamptz DEFAULT now()
    )
    ",
    "CREATE INDEX IF NOT EXISTS artifacts_run_id_idx ON artifacts (run_id)",
    "CREATE INDEX IF NOT EXISTS artifacts_kind_idx ON artifacts (kind)",
];
