use rusqlite::Connection;

use crate::StoreError;

/// Create every table and index if absent. Safe to run on every open.
pub(crate) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS repos (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL UNIQUE,
          external_service_type TEXT NOT NULL,
          private INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS repo_permissions (
          repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
          user_id INTEGER NOT NULL,
          PRIMARY KEY(repo_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS campaign_specs (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          rand_id TEXT NOT NULL UNIQUE,
          namespace_user_id INTEGER,
          namespace_org_id INTEGER,
          user_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          description TEXT NOT NULL,
          created_at TEXT NOT NULL,
          CHECK((namespace_user_id IS NULL) <> (namespace_org_id IS NULL))
        );

        CREATE TABLE IF NOT EXISTS changeset_specs (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          rand_id TEXT NOT NULL UNIQUE,
          campaign_spec_id INTEGER NOT NULL REFERENCES campaign_specs(id) ON DELETE CASCADE,
          repo_id INTEGER NOT NULL REFERENCES repos(id),
          user_id INTEGER NOT NULL,
          external_id TEXT,
          head_ref TEXT,
          spec TEXT NOT NULL,
          diff_stat_added INTEGER NOT NULL DEFAULT 0,
          diff_stat_changed INTEGER NOT NULL DEFAULT 0,
          diff_stat_deleted INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          CHECK((external_id IS NULL) <> (head_ref IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_changeset_specs_campaign_spec
          ON changeset_specs(campaign_spec_id);

        CREATE TABLE IF NOT EXISTS campaigns (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          name TEXT NOT NULL,
          description TEXT NOT NULL,
          namespace_user_id INTEGER,
          namespace_org_id INTEGER,
          campaign_spec_id INTEGER NOT NULL REFERENCES campaign_specs(id),
          initial_applier_id INTEGER,
          last_applier_id INTEGER,
          last_applied_at TEXT,
          closed_at TEXT,
          changeset_ids TEXT NOT NULL DEFAULT '[]',
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          CHECK((namespace_user_id IS NULL) <> (namespace_org_id IS NULL))
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_campaigns_namespace_name
          ON campaigns(COALESCE(namespace_user_id, 0), COALESCE(namespace_org_id, 0), name);

        CREATE TABLE IF NOT EXISTS changesets (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          repo_id INTEGER NOT NULL REFERENCES repos(id),
          external_service_type TEXT NOT NULL,
          external_id TEXT,
          external_state TEXT,
          current_spec_id INTEGER REFERENCES changeset_specs(id),
          previous_spec_id INTEGER REFERENCES changeset_specs(id),
          owned_by_campaign_id INTEGER REFERENCES campaigns(id),
          campaign_ids TEXT NOT NULL DEFAULT '[]',
          publication_state TEXT NOT NULL,
          reconciler_state TEXT NOT NULL,
          closing INTEGER NOT NULL DEFAULT 0,
          unsynced INTEGER NOT NULL DEFAULT 0,
          added_to_campaign INTEGER NOT NULL DEFAULT 0,
          diff_stat_added INTEGER,
          diff_stat_changed INTEGER,
          diff_stat_deleted INTEGER,
          failure_message TEXT,
          num_failures INTEGER NOT NULL DEFAULT 0,
          num_resets INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_changesets_repo_external
          ON changesets(repo_id, external_id) WHERE external_id IS NOT NULL;

        CREATE INDEX IF NOT EXISTS idx_changesets_owner
          ON changesets(owned_by_campaign_id);

        CREATE INDEX IF NOT EXISTS idx_changesets_reconciler_state
          ON changesets(reconciler_state, updated_at, id);
        "#,
    )?;
    Ok(())
}
