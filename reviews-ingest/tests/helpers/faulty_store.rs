//! Failure-injecting store wrapper
//!
//! Delegates to an inner store but fails chosen calls. Call indices are
//! 1-based and count every attempt, retries included. A "lost ack" insert
//! writes the rows and then reports a timeout, like a response that never
//! reached the client.

use async_trait::async_trait;
use reviews_common::{Dialect, Error, NaturalKey, Result, Review};
use reviews_ingest::store::{QueryRows, ReviewStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct FaultyStore<S> {
    inner: S,
    failing_inserts: HashSet<usize>,
    failing_lookups: HashSet<usize>,
    lost_acks: HashSet<usize>,
    insert_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl<S: ReviewStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_inserts: HashSet::new(),
            failing_lookups: HashSet::new(),
            lost_acks: HashSet::new(),
            insert_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
        }
    }

    /// Fail these `bulk_insert` calls
    pub fn fail_inserts(mut self, calls: &[usize]) -> Self {
        self.failing_inserts.extend(calls);
        self
    }

    /// Fail these `existing_keys` calls
    pub fn fail_lookups(mut self, calls: &[usize]) -> Self {
        self.failing_lookups.extend(calls);
        self
    }

    /// Write, then report failure on these `bulk_insert` calls
    pub fn lose_insert_acks(mut self, calls: &[usize]) -> Self {
        self.lost_acks.extend(calls);
        self
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ReviewStore> ReviewStore for FaultyStore<S> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn execute_command(&self, sql: &str) -> Result<()> {
        self.inner.execute_command(sql).await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        self.inner.execute_query(sql).await
    }

    async fn bulk_insert(&self, table: &str, rows: &[Review], columns: &[&str]) -> Result<u64> {
        let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_inserts.contains(&call) {
            return Err(Error::Http(format!("injected insert failure on call {}", call)));
        }
        let written = self.inner.bulk_insert(table, rows, columns).await?;
        if self.lost_acks.contains(&call) {
            return Err(Error::Http(format!("operation timed out after writing {} rows", written)));
        }
        Ok(written)
    }

    async fn existing_keys(&self, table: &str, keys: &[NaturalKey]) -> Result<HashSet<NaturalKey>> {
        let call = self.lookup_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_lookups.contains(&call) {
            return Err(Error::Http(format!("injected lookup failure on call {}", call)));
        }
        self.inner.existing_keys(table, keys).await
    }

    async fn ensure_schema(&self, table: &str) -> Result<()> {
        self.inner.ensure_schema(table).await
    }

    async fn reset_schema(&self, table: &str) -> Result<()> {
        self.inner.reset_schema(table).await
    }
}
