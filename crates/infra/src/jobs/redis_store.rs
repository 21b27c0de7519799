//! Redis-backed result store (optional).
//!
//! Records are stored as JSON strings under `async:result:<id>` with a Redis
//! TTL equal to the remaining retention window, so Redis does the eviction.
//! Terminal writes and expiry extensions run inside WATCH/MULTI transactions
//! so a concurrent writer can never overwrite a terminal record.

use std::time::Duration;

use chrono::Utc;
use redis::{Commands, ErrorKind, RedisError};
use tracing::{debug, warn};

use deferred_core::{JobId, JobResult, Outcome};

use super::store::{CompleteOutcome, ResultStore, ResultStoreError, ResultStoreStats};

pub const RESULT_KEY_PREFIX: &str = "async:result:";

/// Redis result store.
#[derive(Debug, Clone)]
pub struct RedisResultStore {
    client: redis::Client,
    prefix: String,
}

impl RedisResultStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, ResultStoreError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(storage)?;
        Ok(Self {
            client,
            prefix: RESULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, job_id: JobId) -> String {
        format!("{}{}", self.prefix, job_id)
    }

    fn conn(&self) -> Result<redis::Connection, ResultStoreError> {
        self.client.get_connection().map_err(storage)
    }
}

fn storage(e: RedisError) -> ResultStoreError {
    ResultStoreError::Storage(e.to_string())
}

fn decode(raw: &str) -> Result<JobResult, RedisError> {
    serde_json::from_str(raw).map_err(|e| {
        RedisError::from((ErrorKind::TypeError, "invalid job result", e.to_string()))
    })
}

fn encode(record: &JobResult) -> Result<String, RedisError> {
    serde_json::to_string(record).map_err(|e| {
        RedisError::from((ErrorKind::TypeError, "unserializable job result", e.to_string()))
    })
}

/// Remaining time until `record` expires, at least one millisecond.
fn remaining_ttl_ms(record: &JobResult) -> i64 {
    (record.expires_at - Utc::now()).num_milliseconds().max(1)
}

impl ResultStore for RedisResultStore {
    fn create(&self, record: JobResult) -> Result<(), ResultStoreError> {
        let mut conn = self.conn()?;
        let payload =
            serde_json::to_string(&record).map_err(|e| ResultStoreError::Serialization(e.to_string()))?;

        let set: Option<String> = redis::cmd("SET")
            .arg(self.key(record.request_id))
            .arg(payload)
            .arg("NX")
            .arg("PX")
            .arg(remaining_ttl_ms(&record))
            .query(&mut conn)
            .map_err(storage)?;

        match set {
            Some(_) => Ok(()),
            None => Err(ResultStoreError::AlreadyExists(record.request_id)),
        }
    }

    fn complete(&self, job_id: JobId, outcome: Outcome) -> Result<CompleteOutcome, ResultStoreError> {
        let mut conn = self.conn()?;
        let key = self.key(job_id);

        let written: CompleteOutcome = redis::transaction(&mut conn, &[&key], |conn, pipe| {
            let raw: Option<String> = conn.get(&key)?;
            let Some(raw) = raw else {
                return Ok(Some(CompleteOutcome::Missing));
            };

            let mut record = decode(&raw)?;
            if record.is_terminal() {
                return Ok(Some(CompleteOutcome::AlreadyTerminal));
            }
            if record.complete(outcome.clone(), Utc::now()).is_err() {
                return Ok(Some(CompleteOutcome::AlreadyTerminal));
            }

            let updated: Option<()> = pipe
                .cmd("SET")
                .arg(&key)
                .arg(encode(&record)?)
                .arg("KEEPTTL")
                .ignore()
                .query(conn)?;
            Ok(updated.map(|()| CompleteOutcome::Completed))
        })
        .map_err(storage)?;

        if written == CompleteOutcome::AlreadyTerminal {
            warn!(job_id = %job_id, "terminal result already written; ignoring second write");
        }
        Ok(written)
    }

    fn get(&self, job_id: JobId) -> Result<Option<JobResult>, ResultStoreError> {
        let mut conn = self.conn()?;
        let raw: Option<String> = conn.get(self.key(job_id)).map_err(storage)?;
        raw.map(|r| decode(&r).map_err(|e| ResultStoreError::Serialization(e.to_string())))
            .transpose()
    }

    fn exists(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        let mut conn = self.conn()?;
        conn.exists(self.key(job_id)).map_err(storage)
    }

    fn delete(&self, job_id: JobId) -> Result<bool, ResultStoreError> {
        let mut conn = self.conn()?;
        let removed: i64 = conn.del(self.key(job_id)).map_err(storage)?;
        debug!(job_id = %job_id, removed, "deleted result key");
        Ok(removed > 0)
    }

    fn extend_expiration(&self, job_id: JobId, by: Duration) -> Result<bool, ResultStoreError> {
        let mut conn = self.conn()?;
        let key = self.key(job_id);

        redis::transaction(&mut conn, &[&key], |conn, pipe| {
            let raw: Option<String> = conn.get(&key)?;
            let Some(raw) = raw else {
                return Ok(Some(false));
            };

            let mut record = decode(&raw)?;
            record.extend_expiration(by);

            let updated: Option<()> = pipe
                .cmd("SET")
                .arg(&key)
                .arg(encode(&record)?)
                .arg("PX")
                .arg(remaining_ttl_ms(&record))
                .arg("XX")
                .ignore()
                .query(conn)?;
            Ok(updated.map(|()| true))
        })
        .map_err(storage)
    }

    fn evict_expired(&self) -> Result<usize, ResultStoreError> {
        // Redis expires keys on its own.
        Ok(0)
    }

    fn stats(&self) -> Result<ResultStoreStats, ResultStoreError> {
        let mut conn = self.conn()?;
        let keys: Vec<String> = conn
            .scan_match::<_, String>(format!("{}*", self.prefix))
            .map_err(storage)?
            .collect();

        let mut stats = ResultStoreStats::default();
        for key in keys {
            let raw: Option<String> = conn.get(&key).map_err(storage)?;
            let Some(record) = raw.and_then(|r| decode(&r).ok()) else {
                continue;
            };
            stats.count(record.status);
        }
        Ok(stats)
    }
}
