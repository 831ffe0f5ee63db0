use super::Store;
use crate::error::{AnalyzerError, Result};
use crate::model::{
    Committer, CommitFact, CommitterStats, FactKind, NewCommitFact, Repo, Status, SCHEMA_VERSION,
};
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const REPO_COLUMNS: &str = "id, repo_url, status, loc_facts_status, commit_freq_facts_status";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS repos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_url TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'todo',
                loc_facts_status TEXT NOT NULL DEFAULT 'todo',
                commit_freq_facts_status TEXT NOT NULL DEFAULT 'todo'
            );
            CREATE TABLE IF NOT EXISTS committers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS committer_stats (
                repo_id INTEGER NOT NULL,
                committer_id INTEGER NOT NULL,
                loc INTEGER NOT NULL DEFAULT 0,
                loc_percentile REAL NOT NULL DEFAULT 0.0,
                loc_percentage REAL NOT NULL DEFAULT 0.0,
                consistency_score REAL NOT NULL DEFAULT 0.0,
                PRIMARY KEY (repo_id, committer_id),
                FOREIGN KEY (repo_id) REFERENCES repos(id),
                FOREIGN KEY (committer_id) REFERENCES committers(id)
            );
            CREATE TABLE IF NOT EXISTS commit_facts (
                repo_id INTEGER NOT NULL,
                committer_id INTEGER NOT NULL,
                commit_id TEXT NOT NULL,
                commit_date INTEGER NOT NULL,
                hours_since_last_commit INTEGER,
                commit_size INTEGER NOT NULL,
                PRIMARY KEY (repo_id, committer_id, commit_id),
                FOREIGN KEY (repo_id) REFERENCES repos(id),
                FOREIGN KEY (committer_id) REFERENCES committers(id)
            );
            CREATE TABLE IF NOT EXISTS requests (
                request_id TEXT PRIMARY KEY,
                repo_id INTEGER NOT NULL,
                FOREIGN KEY (repo_id) REFERENCES repos(id)
            );
            CREATE INDEX IF NOT EXISTS idx_commit_facts_date
                ON commit_facts(repo_id, committer_id, commit_date);
            ",
        )?;

        let user_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if user_version == 0 {
            conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        } else if user_version != SCHEMA_VERSION as i64 {
            return Err(AnalyzerError::Schema(format!(
                "Schema version mismatch: expected {}, found {}",
                SCHEMA_VERSION, user_version
            )));
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalyzerError::Other("database connection lock poisoned".to_string()))
    }
}

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: row.get(0)?,
        repo_url: row.get(1)?,
        status: row.get(2)?,
        loc_facts_status: row.get(3)?,
        commit_freq_facts_status: row.get(4)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn upsert_repo(&self, repo_url: &str) -> Result<Repo> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO repos (repo_url) VALUES (?1) ON CONFLICT(repo_url) DO NOTHING",
            params![repo_url],
        )?;
        let repo = conn.query_row(
            &format!("SELECT {REPO_COLUMNS} FROM repos WHERE repo_url = ?1"),
            params![repo_url],
            repo_from_row,
        )?;
        Ok(repo)
    }

    fn repo_by_url(&self, repo_url: &str) -> Result<Option<Repo>> {
        let conn = self.conn()?;
        let repo = conn
            .query_row(
                &format!("SELECT {REPO_COLUMNS} FROM repos WHERE repo_url = ?1"),
                params![repo_url],
                repo_from_row,
            )
            .optional()?;
        Ok(repo)
    }

    fn repo_by_id(&self, repo_id: i64) -> Result<Option<Repo>> {
        let conn = self.conn()?;
        let repo = conn
            .query_row(
                &format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1"),
                params![repo_id],
                repo_from_row,
            )
            .optional()?;
        Ok(repo)
    }

    fn repo_by_request_id(&self, request_id: &str) -> Result<Option<Repo>> {
        let conn = self.conn()?;
        let repo = conn
            .query_row(
                "SELECT r.id, r.repo_url, r.status, r.loc_facts_status, r.commit_freq_facts_status
                 FROM requests q
                 JOIN repos r ON r.id = q.repo_id
                 WHERE q.request_id = ?1",
                params![request_id],
                repo_from_row,
            )
            .optional()?;
        Ok(repo)
    }

    fn save_request(&self, request_id: &str, repo_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO requests (request_id, repo_id) VALUES (?1, ?2)",
            params![request_id, repo_id],
        )?;
        if inserted == 0 {
            log::debug!("Request {request_id} already recorded");
        }
        Ok(())
    }

    fn upsert_committer(&self, email: &str) -> Result<Committer> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO committers (email) VALUES (?1) ON CONFLICT(email) DO NOTHING",
            params![email],
        )?;
        let committer = conn.query_row(
            "SELECT id, email FROM committers WHERE email = ?1",
            params![email],
            |row| {
                Ok(Committer {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )?;
        Ok(committer)
    }

    fn committer(&self, email: &str) -> Result<Option<Committer>> {
        let conn = self.conn()?;
        let committer = conn
            .query_row(
                "SELECT id, email FROM committers WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Committer {
                        id: row.get(0)?,
                        email: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(committer)
    }

    fn committers_for_repo(&self, repo_id: i64) -> Result<Vec<Committer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.email
             FROM committer_stats s
             JOIN committers c ON c.id = s.committer_id
             WHERE s.repo_id = ?1
             ORDER BY c.email",
        )?;
        let committers = stmt
            .query_map(params![repo_id], |row| {
                Ok(Committer {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(committers)
    }

    fn update_sub_status(&self, repo_id: i64, kind: FactKind, status: Status) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("UPDATE repos SET {} = ?1 WHERE id = ?2", kind.column()),
            params![status, repo_id],
        )?;
        Ok(())
    }

    fn update_repo_status(&self, repo_id: i64, status: Status) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE repos SET status = ?1 WHERE id = ?2",
            params![status, repo_id],
        )?;
        Ok(())
    }

    fn upsert_stats(
        &self,
        repo_id: i64,
        committer_id: i64,
        loc: u64,
        loc_percentile: f64,
        loc_percentage: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO committer_stats (repo_id, committer_id, loc, loc_percentile, loc_percentage)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(repo_id, committer_id) DO UPDATE SET
                loc = excluded.loc,
                loc_percentile = excluded.loc_percentile,
                loc_percentage = excluded.loc_percentage",
            params![repo_id, committer_id, loc as i64, loc_percentile, loc_percentage],
        )?;
        Ok(())
    }

    fn update_consistency_score(&self, repo_id: i64, committer_id: i64, score: f64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE committer_stats SET consistency_score = ?1
             WHERE repo_id = ?2 AND committer_id = ?3",
            params![score, repo_id, committer_id],
        )?;
        Ok(updated > 0)
    }

    fn insert_commit_fact(&self, fact: &NewCommitFact) -> Result<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO commit_facts (repo_id, committer_id, commit_id, commit_date, commit_size)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fact.repo_id,
                fact.committer_id,
                fact.commit_id,
                fact.commit_date.timestamp(),
                fact.commit_size as i64
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(AnalyzerError::DuplicateKey(fact.commit_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_commit_fact_gap(
        &self,
        repo_id: i64,
        committer_id: i64,
        commit_id: &str,
        hours: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE commit_facts SET hours_since_last_commit = ?1
             WHERE repo_id = ?2 AND committer_id = ?3 AND commit_id = ?4",
            params![hours, repo_id, committer_id, commit_id],
        )?;
        Ok(updated > 0)
    }

    fn commit_facts_desc(&self, repo_id: i64, committer_id: i64) -> Result<Vec<CommitFact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT commit_id, commit_date, hours_since_last_commit, commit_size
             FROM commit_facts
             WHERE repo_id = ?1 AND committer_id = ?2
             ORDER BY commit_date DESC, commit_id",
        )?;
        let facts = stmt
            .query_map(params![repo_id, committer_id], |row| {
                let ts: i64 = row.get(1)?;
                let commit_date = Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(
                        1,
                        "commit_date".to_string(),
                        rusqlite::types::Type::Integer,
                    )
                })?;
                let size: i64 = row.get(3)?;
                Ok(CommitFact {
                    commit_id: row.get(0)?,
                    commit_date,
                    hours_since_last_commit: row.get(2)?,
                    commit_size: size.max(0) as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(facts)
    }

    fn stats_for_repo(&self, repo_id: i64) -> Result<Vec<CommitterStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.committer_id, c.email, s.loc, s.loc_percentile, s.loc_percentage, s.consistency_score
             FROM committer_stats s
             JOIN committers c ON c.id = s.committer_id
             WHERE s.repo_id = ?1
             ORDER BY s.loc_percentile DESC, c.email",
        )?;
        let stats = stmt
            .query_map(params![repo_id], |row| {
                let loc: i64 = row.get(2)?;
                Ok(CommitterStats {
                    committer_id: row.get(0)?,
                    email: row.get(1)?,
                    loc: loc.max(0) as u64,
                    loc_percentile: row.get(3)?,
                    loc_percentage: row.get(4)?,
                    consistency_score: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    fn consistency_for_repo(&self, repo_id: i64) -> Result<BTreeMap<String, f64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.email, s.consistency_score
             FROM committer_stats s
             JOIN committers c ON c.id = s.committer_id
             WHERE s.repo_id = ?1",
        )?;
        let scores = stmt
            .query_map(params![repo_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, f64>>>()?;
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fact(repo_id: i64, committer_id: i64, commit_id: &str, hours_ago: i64) -> NewCommitFact {
        NewCommitFact {
            repo_id,
            committer_id,
            commit_id: commit_id.to_string(),
            commit_date: Utc.timestamp_opt(1_700_000_000, 0).unwrap() - Duration::hours(hours_ago),
            commit_size: 250,
        }
    }

    #[test]
    fn upserts_are_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store.upsert_repo("https://github.com/a/b").unwrap();
        let second = store.upsert_repo("https://github.com/a/b").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, Status::Todo);

        let c1 = store.upsert_committer("dev@example.com").unwrap();
        let c2 = store.upsert_committer("dev@example.com").unwrap();
        assert_eq!(c1, c2);

        store.upsert_stats(first.id, c1.id, 10, 1.0, 1.0).unwrap();
        store.upsert_stats(first.id, c1.id, 12, 1.0, 1.0).unwrap();
        let stats = store.stats_for_repo(first.id).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].loc, 12);
    }

    #[test]
    fn request_correlation_resolves_repo() {
        let store = SqliteStore::in_memory().unwrap();
        let repo = store.upsert_repo("https://github.com/a/b").unwrap();
        store.save_request("req-1", repo.id).unwrap();
        store.save_request("req-1", repo.id).unwrap();
        assert_eq!(store.repo_by_request_id("req-1").unwrap(), Some(repo));
        assert_eq!(store.repo_by_request_id("req-2").unwrap(), None);
    }

    #[test]
    fn duplicate_commit_fact_is_reported() {
        let store = SqliteStore::in_memory().unwrap();
        let repo = store.upsert_repo("https://github.com/a/b").unwrap();
        let committer = store.upsert_committer("dev@example.com").unwrap();

        store.insert_commit_fact(&fact(repo.id, committer.id, "abc", 0)).unwrap();
        let err = store
            .insert_commit_fact(&fact(repo.id, committer.id, "abc", 0))
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::DuplicateKey(id) if id == "abc"));
    }

    #[test]
    fn commit_facts_come_back_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let repo = store.upsert_repo("https://github.com/a/b").unwrap();
        let committer = store.upsert_committer("dev@example.com").unwrap();
        for (id, hours_ago) in [("old", 48), ("new", 1), ("mid", 10)] {
            store
                .insert_commit_fact(&fact(repo.id, committer.id, id, hours_ago))
                .unwrap();
        }
        assert!(store.update_commit_fact_gap(repo.id, committer.id, "new", 9).unwrap());
        assert!(!store.update_commit_fact_gap(repo.id, committer.id, "missing", 9).unwrap());

        let facts = store.commit_facts_desc(repo.id, committer.id).unwrap();
        let ids: Vec<_> = facts.iter().map(|f| f.commit_id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
        assert_eq!(facts[0].hours_since_last_commit, Some(9));
        assert_eq!(facts[1].hours_since_last_commit, None);
    }

    #[test]
    fn status_round_trips_through_text_columns() {
        let store = SqliteStore::in_memory().unwrap();
        let repo = store.upsert_repo("https://github.com/a/b").unwrap();
        store
            .update_sub_status(repo.id, FactKind::CommitFreq, Status::InProgress)
            .unwrap();
        store.update_repo_status(repo.id, Status::InProgress).unwrap();
        let repo = store.repo_by_url("https://github.com/a/b").unwrap().unwrap();
        assert_eq!(repo.commit_freq_facts_status, Status::InProgress);
        assert_eq!(repo.loc_facts_status, Status::Todo);
        assert_eq!(repo.status, Status::InProgress);
    }
}
