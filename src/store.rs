//! Snapshot store and audit log.
//!
//! One snapshot row per (advertiser, ad, run); append-only, purged
//! past a retention window. Snapshots make runs idempotent: the first
//! run of the day is detected by their absence, and subsequent rounds
//! compare against the last recorded conversion count. The audit log
//! records every applied mutation with before/after values.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub advertiser_id: String,
    pub ad_id: String,
    pub conversions: u32,
    pub spend: i64,
    pub cpa: Option<f64>,
    pub budget: i64,
    pub action: String,
    pub reason: String,
    /// Unix seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub advertiser_id: String,
    pub ad_id: String,
    pub action: String,
    pub before_value: String,
    pub after_value: String,
    pub reason: String,
    pub source: String,
    pub created_at: i64,
}

pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             PRAGMA busy_timeout=5000;",
        )?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               advertiser_id TEXT NOT NULL,\
               ad_id TEXT NOT NULL,\
               conversions INTEGER NOT NULL,\
               spend INTEGER NOT NULL,\
               cpa REAL,\
               budget INTEGER NOT NULL,\
               action TEXT NOT NULL,\
               reason TEXT NOT NULL,\
               created_at INTEGER NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS audit_log (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               advertiser_id TEXT NOT NULL,\
               ad_id TEXT NOT NULL,\
               action TEXT NOT NULL,\
               before_value TEXT NOT NULL,\
               after_value TEXT NOT NULL,\
               reason TEXT NOT NULL,\
               source TEXT NOT NULL,\
               created_at INTEGER NOT NULL\
             );\
             CREATE INDEX IF NOT EXISTS idx_snapshots_adv_ad \
               ON snapshots(advertiser_id, ad_id, created_at);\
             CREATE INDEX IF NOT EXISTS idx_snapshots_created \
               ON snapshots(created_at);",
        )?;
        Ok(())
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut guard = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// True iff no snapshot rows exist for this advertiser since the
    /// start of the local day.
    pub fn is_first_round_today(&self, advertiser_id: &str, day_start: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM snapshots WHERE advertiser_id = ?1 AND created_at >= ?2",
                params![advertiser_id, day_start],
                |row| row.get(0),
            )?;
            Ok(count == 0)
        })
    }

    /// The most recent snapshot for an ad today, if any.
    pub fn last_snapshot(
        &self,
        advertiser_id: &str,
        ad_id: &str,
        day_start: i64,
    ) -> Result<Option<SnapshotRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT advertiser_id, ad_id, conversions, spend, cpa, budget, action, \
                     reason, created_at FROM snapshots \
                     WHERE advertiser_id = ?1 AND ad_id = ?2 AND created_at >= ?3 \
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    params![advertiser_id, ad_id, day_start],
                    |row| {
                        Ok(SnapshotRow {
                            advertiser_id: row.get(0)?,
                            ad_id: row.get(1)?,
                            conversions: row.get(2)?,
                            spend: row.get(3)?,
                            cpa: row.get(4)?,
                            budget: row.get(5)?,
                            action: row.get(6)?,
                            reason: row.get(7)?,
                            created_at: row.get(8)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Append one row per evaluated ad, skipped ones included, so the
    /// next round's delta check has a baseline for every ad.
    pub fn save(&self, batch: &[SnapshotRow]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for row in batch {
                tx.execute(
                    "INSERT INTO snapshots (advertiser_id, ad_id, conversions, spend, cpa, \
                     budget, action, reason, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.advertiser_id,
                        row.ad_id,
                        row.conversions,
                        row.spend,
                        row.cpa,
                        row.budget,
                        row.action,
                        row.reason,
                        row.created_at
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete snapshots created before `cutoff`. Safe to run after
    /// every cycle.
    pub fn purge_older_than(&self, cutoff: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted =
                conn.execute("DELETE FROM snapshots WHERE created_at < ?1", params![cutoff])?;
            Ok(deleted)
        })
    }

    /// Record an applied mutation. Written only after the platform
    /// call succeeded, so a failed mutation leaves no dangling entry.
    pub fn record_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log (advertiser_id, ad_id, action, before_value, \
                 after_value, reason, source, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.advertiser_id,
                    entry.ad_id,
                    entry.action,
                    entry.before_value,
                    entry.after_value,
                    entry.reason,
                    entry.source,
                    entry.created_at
                ],
            )?;
            Ok(())
        })
    }

    #[cfg(test)]
    fn audit_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
            Ok(n)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ad: &str, conversions: u32, created_at: i64) -> SnapshotRow {
        SnapshotRow {
            advertiser_id: "adv-1".into(),
            ad_id: ad.into(),
            conversions,
            spend: 4_000,
            cpa: Some(4_000.0 / conversions.max(1) as f64),
            budget: 10_000,
            action: "CONTINUE".into(),
            reason: "test".into(),
            created_at,
        }
    }

    #[test]
    fn test_first_round_flips_after_first_save() {
        let store = SnapshotStore::in_memory().unwrap();
        let day_start = 1_700_000_000;
        assert!(store.is_first_round_today("adv-1", day_start).unwrap());

        store.save(&[snapshot("ad-1", 1, day_start + 3600)]).unwrap();
        assert!(!store.is_first_round_today("adv-1", day_start).unwrap());
        // Other advertisers are unaffected.
        assert!(store.is_first_round_today("adv-2", day_start).unwrap());
    }

    #[test]
    fn test_yesterdays_rows_do_not_count() {
        let store = SnapshotStore::in_memory().unwrap();
        let day_start = 1_700_000_000;
        store.save(&[snapshot("ad-1", 1, day_start - 10)]).unwrap();
        assert!(store.is_first_round_today("adv-1", day_start).unwrap());
    }

    #[test]
    fn test_last_snapshot_returns_most_recent() {
        let store = SnapshotStore::in_memory().unwrap();
        let day_start = 1_700_000_000;
        store
            .save(&[
                snapshot("ad-1", 1, day_start + 100),
                snapshot("ad-1", 3, day_start + 200),
                snapshot("ad-2", 9, day_start + 300),
            ])
            .unwrap();
        let last = store
            .last_snapshot("adv-1", "ad-1", day_start)
            .unwrap()
            .unwrap();
        assert_eq!(last.conversions, 3);
        assert!(store
            .last_snapshot("adv-1", "ad-3", day_start)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_purge_drops_only_old_rows() {
        let store = SnapshotStore::in_memory().unwrap();
        store
            .save(&[snapshot("ad-1", 1, 100), snapshot("ad-1", 2, 200)])
            .unwrap();
        let deleted = store.purge_older_than(150).unwrap();
        assert_eq!(deleted, 1);
        let last = store.last_snapshot("adv-1", "ad-1", 0).unwrap().unwrap();
        assert_eq!(last.conversions, 2);
    }

    #[test]
    fn test_audit_append() {
        let store = SnapshotStore::in_memory().unwrap();
        store
            .record_audit(&AuditEntry {
                advertiser_id: "adv-1".into(),
                ad_id: "ad-1".into(),
                action: "INCREASE".into(),
                before_value: "10000".into(),
                after_value: "12000".into(),
                reason: "test".into(),
                source: "stage1".into(),
                created_at: 1_700_000_000,
            })
            .unwrap();
        assert_eq!(store.audit_count().unwrap(), 1);
    }
}
