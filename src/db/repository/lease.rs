//! Run-scoped execution leases.
//!
//! A lease grants one holder the exclusive right to drive a run's stages.
//! Expiry makes leases recoverable after a crash: a holder that stopped
//! renewing loses the lease once `expires_at` passes.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;

use super::{now_utc, utc_after_secs};

/// A lease row as stored.
#[derive(Debug, Clone)]
pub struct Lease {
    pub run_id: Uuid,
    pub holder: String,
    pub acquired_at: String,
    pub expires_at: String,
}

impl Lease {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_utc()
    }
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquire {
    Acquired,
    /// A different holder owns a live lease on this run.
    Held { holder: String },
}

/// Acquire or renew the lease on a run. A lease held by another holder is
/// only taken over once expired.
pub fn acquire(
    conn: &Connection,
    run_id: Uuid,
    holder: &str,
    ttl_secs: i64,
) -> Result<LeaseAcquire, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let existing = get_inner(&tx, run_id)?;

    if let Some(lease) = existing {
        if lease.holder != holder && !lease.is_expired() {
            return Ok(LeaseAcquire::Held {
                holder: lease.holder,
            });
        }
    }

    tx.execute(
        "INSERT INTO run_leases (run_id, holder, acquired_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(run_id) DO UPDATE SET
             holder = excluded.holder,
             acquired_at = excluded.acquired_at,
             expires_at = excluded.expires_at",
        params![
            run_id.to_string(),
            holder,
            now_utc(),
            utc_after_secs(ttl_secs)
        ],
    )?;
    tx.commit()?;
    Ok(LeaseAcquire::Acquired)
}

/// Extend a held lease. No-op if the caller no longer holds it.
pub fn renew(
    conn: &Connection,
    run_id: Uuid,
    holder: &str,
    ttl_secs: i64,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE run_leases SET expires_at = ?1 WHERE run_id = ?2 AND holder = ?3",
        params![utc_after_secs(ttl_secs), run_id.to_string(), holder],
    )?;
    Ok(())
}

/// Release a lease if still held by the caller.
pub fn release(conn: &Connection, run_id: Uuid, holder: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM run_leases WHERE run_id = ?1 AND holder = ?2",
        params![run_id.to_string(), holder],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, run_id: Uuid) -> Result<Option<Lease>, DatabaseError> {
    get_inner(conn, run_id)
}

fn get_inner(conn: &Connection, run_id: Uuid) -> Result<Option<Lease>, DatabaseError> {
    let lease = conn
        .query_row(
            "SELECT run_id, holder, acquired_at, expires_at FROM run_leases WHERE run_id = ?1",
            params![run_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match lease {
        Some((run_id, holder, acquired_at, expires_at)) => Ok(Some(Lease {
            run_id: super::run::parse_uuid(&run_id, "run")?,
            holder,
            acquired_at,
            expires_at,
        })),
        None => Ok(None),
    }
}
