use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use fleet_core::{Actor, CodeHost, Repo, RepoId, UserId};

use crate::rows::{id_list, repo_from_row, REPO_COLUMNS};
use crate::{StoreError, StoreTx};

impl StoreTx<'_> {
    /// Register a repository. Names are unique.
    pub fn create_repo(
        &self,
        name: &str,
        host: CodeHost,
        private: bool,
    ) -> Result<Repo, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::InvalidInput("repository name is empty".into()));
        }
        self.execute(
            "INSERT INTO repos(name, external_service_type, private, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, host.as_str(), private, Utc::now()],
        )?;
        Ok(Repo {
            id: RepoId(self.last_insert_rowid()),
            name: name.to_owned(),
            external_service_type: host,
            private,
        })
    }

    /// Let `user` see the private repository `repo`.
    pub fn grant_repo_access(&self, repo: RepoId, user: UserId) -> Result<(), StoreError> {
        self.execute(
            "INSERT OR IGNORE INTO repo_permissions(repo_id, user_id) VALUES (?1, ?2)",
            params![repo.0, user.0],
        )?;
        Ok(())
    }

    pub fn repo_by_name(&self, name: &str) -> Result<Repo, StoreError> {
        self.query_row(
            &format!("SELECT {REPO_COLUMNS} FROM repos WHERE name = ?1"),
            params![name],
            repo_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("repository", name))
    }

    pub fn list_repos(&self) -> Result<Vec<Repo>, StoreError> {
        let mut stmt = self.prepare(&format!("SELECT {REPO_COLUMNS} FROM repos ORDER BY id"))?;
        let repos = stmt
            .query_map([], repo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(repos)
    }

    /// Look up repositories regardless of who is asking.
    pub fn repos_by_ids(&self, ids: &[RepoId]) -> Result<HashMap<RepoId, Repo>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE id IN (SELECT value FROM json_each(?1))"
        ))?;
        let rows = stmt.query_map(params![id_list(ids.iter().map(|id| id.0))], repo_from_row)?;
        let mut out = HashMap::with_capacity(ids.len());
        for repo in rows {
            let repo = repo?;
            out.insert(repo.id, repo);
        }
        Ok(out)
    }

    /// The subset of `ids` that `actor` may see. Site admins see everything;
    /// other users see public repositories and private ones they were
    /// granted.
    pub fn resolve_accessible(
        &self,
        actor: &Actor,
        ids: &[RepoId],
    ) -> Result<HashMap<RepoId, Repo>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repos r
             WHERE r.id IN (SELECT value FROM json_each(?1))
               AND (?2 OR r.private = 0 OR EXISTS (
                     SELECT 1 FROM repo_permissions p WHERE p.repo_id = r.id AND p.user_id = ?3))"
        ))?;
        let rows = stmt.query_map(
            params![
                id_list(ids.iter().map(|id| id.0)),
                actor.site_admin,
                actor.user_id.0
            ],
            repo_from_row,
        )?;
        let mut out = HashMap::with_capacity(ids.len());
        for repo in rows {
            let repo = repo?;
            out.insert(repo.id, repo);
        }
        Ok(out)
    }
}
