pub const SCHEMA: &str = r#"
-- Groups form a tree; a group with no parent is a root group (tenant)
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    parent_id TEXT REFERENCES groups(id) ON DELETE CASCADE,
    full_path TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS service_accounts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    resource_path TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials bound to exactly one user or service account
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- lookup segment of the raw token
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    service_account_id TEXT REFERENCES service_accounts(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT,
    CHECK ((user_id IS NULL) != (service_account_id IS NULL))
);

-- Grants are inherited by every group below group_id
CREATE TABLE IF NOT EXISTS group_grants (
    subject_id TEXT NOT NULL,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    allow_bits INTEGER NOT NULL DEFAULT 0,
    deny_bits INTEGER NOT NULL DEFAULT 0,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (subject_id, group_id)
);

CREATE TABLE IF NOT EXISTS providers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    root_group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    private INTEGER NOT NULL DEFAULT 1,
    repository_url TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(root_group_id, name)
);

CREATE TABLE IF NOT EXISTS provider_versions (
    id TEXT PRIMARY KEY,
    provider_id TEXT NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    semantic_version TEXT NOT NULL,
    protocols TEXT NOT NULL DEFAULT '[]',    -- JSON array
    latest INTEGER NOT NULL DEFAULT 0,
    readme_uploaded INTEGER NOT NULL DEFAULT 0,
    sha_sums_uploaded INTEGER NOT NULL DEFAULT 0,
    sha_sums_sig_uploaded INTEGER NOT NULL DEFAULT 0,

    -- Snapshot of the signing key, not a reference to gpg_keys
    gpg_key_id INTEGER,
    gpg_ascii_armor TEXT,

    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(provider_id, semantic_version)
);

CREATE TABLE IF NOT EXISTS provider_platforms (
    id TEXT PRIMARY KEY,
    provider_version_id TEXT NOT NULL REFERENCES provider_versions(id) ON DELETE CASCADE,
    os TEXT NOT NULL,
    architecture TEXT NOT NULL,
    sha_sum TEXT NOT NULL,
    filename TEXT NOT NULL,
    binary_uploaded INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(provider_version_id, os, architecture)
);

CREATE TABLE IF NOT EXISTS provider_version_mirrors (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    registry_hostname TEXT NOT NULL,
    registry_namespace TEXT NOT NULL,
    provider_type TEXT NOT NULL,
    semantic_version TEXT NOT NULL,
    digests TEXT NOT NULL,                   -- JSON object, filename -> hex sha256
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(group_id, registry_hostname, registry_namespace, provider_type, semantic_version)
);

CREATE TABLE IF NOT EXISTS provider_platform_mirrors (
    id TEXT PRIMARY KEY,
    version_mirror_id TEXT NOT NULL REFERENCES provider_version_mirrors(id) ON DELETE CASCADE,
    os TEXT NOT NULL,
    architecture TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(version_mirror_id, os, architecture)
);

CREATE TABLE IF NOT EXISTS gpg_keys (
    id TEXT PRIMARY KEY,
    group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    gpg_key_id INTEGER NOT NULL,             -- 64-bit key id, stored as its i64 bit pattern
    fingerprint TEXT NOT NULL,
    ascii_armor TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(group_id, fingerprint)
);

CREATE TABLE IF NOT EXISTS resource_limits (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS activity_events (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    group_id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    payload TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_groups_parent ON groups(parent_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_tokens_service_account ON tokens(service_account_id);
CREATE INDEX IF NOT EXISTS idx_group_grants_subject ON group_grants(subject_id);
CREATE INDEX IF NOT EXISTS idx_providers_group ON providers(group_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_provider_versions_latest
    ON provider_versions(provider_id) WHERE latest = 1;
CREATE INDEX IF NOT EXISTS idx_provider_platforms_version ON provider_platforms(provider_version_id);
CREATE INDEX IF NOT EXISTS idx_version_mirrors_group ON provider_version_mirrors(group_id);
CREATE INDEX IF NOT EXISTS idx_platform_mirrors_version ON provider_platform_mirrors(version_mirror_id);
CREATE INDEX IF NOT EXISTS idx_gpg_keys_group_key ON gpg_keys(group_id, gpg_key_id);
CREATE INDEX IF NOT EXISTS idx_activity_events_group ON activity_events(group_id, created_at);
"#;
