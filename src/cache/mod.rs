//! Per-cgroup cache of rendered file contents and derived host data.
//!
//! Records are partitioned by [`CgroupKey`]; each cgroup owns one record per
//! [`EntryKind`]. A record is fresh for the freshness window after it was
//! written. A whole cgroup group is dropped once it has not been looked at
//! for longer than the retention window; eviction runs after every write.

mod error;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;

use crate::cgroup::CgroupKey;
use crate::mounts::ControllerTable;

pub use error::{Error, Result};

/// The kinds of record a cgroup group can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Cpuinfo,
    Meminfo,
    Stat,
    Controllers,
    OldestTask,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Cpuinfo => "cpuinfo",
            EntryKind::Meminfo => "meminfo",
            EntryKind::Stat => "stat",
            EntryKind::Controllers => "controller table",
            EntryKind::OldestTask => "oldest task time",
        };
        write!(f, "{name}")
    }
}

/// A cached value. Cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub enum Payload {
    Text(Arc<str>),
    Controllers(Arc<ControllerTable>),
    Timestamp(SystemTime),
}

impl Payload {
    fn variant_name(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Controllers(_) => "controller table",
            Payload::Timestamp(_) => "timestamp",
        }
    }

    fn into_text(self) -> std::result::Result<Arc<str>, Self> {
        match self {
            Payload::Text(text) => Ok(text),
            other => Err(other),
        }
    }

    fn into_controllers(self) -> std::result::Result<Arc<ControllerTable>, Self> {
        match self {
            Payload::Controllers(table) => Ok(table),
            other => Err(other),
        }
    }

    fn into_timestamp(self) -> std::result::Result<SystemTime, Self> {
        match self {
            Payload::Timestamp(time) => Ok(time),
            other => Err(other),
        }
    }
}

#[derive(Debug)]
struct Entry {
    written_at: Instant,
    payload: Payload,
}

#[derive(Debug)]
struct Group {
    last_seen: Instant,
    entries: HashMap<EntryKind, Entry>,
}

impl Group {
    fn new(now: Instant) -> Self {
        Self {
            last_seen: now,
            entries: HashMap::new(),
        }
    }
}

type RecomputeLock = Arc<Mutex<()>>;

/// Thread-safe content cache shared by all request threads.
///
/// Groups live in a sharded map, so every change to one group happens under
/// its shard lock and requests for different cgroups rarely contend.
#[derive(Debug)]
pub struct ContentCache {
    groups: DashMap<CgroupKey, Group>,
    recompute: DashMap<(CgroupKey, EntryKind), RecomputeLock>,
    freshness: Duration,
    retention: Duration,
}

impl ContentCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    ///
    /// * `freshness` - How long a written record counts as fresh.
    /// * `retention` - How long a group may go unseen before it is evicted.
    pub fn new(freshness: Duration, retention: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            recompute: DashMap::new(),
            freshness,
            retention,
        }
    }

    /// Number of cgroup groups currently held.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns whether `kind` is cached and fresh for `cgroup`.
    ///
    /// Marks the group as seen, creating an empty one if needed.
    pub fn is_fresh(&self, cgroup: &CgroupKey, kind: EntryKind) -> bool {
        self.is_fresh_at(cgroup, kind, Instant::now())
    }

    pub fn is_fresh_at(&self, cgroup: &CgroupKey, kind: EntryKind, now: Instant) -> bool {
        let mut group = self
            .groups
            .entry(cgroup.clone())
            .or_insert_with(|| Group::new(now));
        group.last_seen = now;
        group
            .entries
            .get(&kind)
            .is_some_and(|entry| now.saturating_duration_since(entry.written_at) < self.freshness)
    }

    /// Returns the payload cached for `kind` under `cgroup`, fresh or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Miss`] if no record exists.
    pub fn get(&self, cgroup: &CgroupKey, kind: EntryKind) -> Result<Payload> {
        self.groups
            .get(cgroup)
            .and_then(|group| group.entries.get(&kind).map(|entry| entry.payload.clone()))
            .ok_or_else(|| Error::Miss {
                cgroup: cgroup.clone(),
                kind,
            })
    }

    /// Like [`ContentCache::get`], for text records.
    ///
    /// # Errors
    ///
    /// [`Error::Miss`] or [`Error::PayloadMismatch`].
    pub fn get_text(&self, cgroup: &CgroupKey, kind: EntryKind) -> Result<Arc<str>> {
        self.get_typed(cgroup, kind, Payload::into_text)
    }

    /// Like [`ContentCache::get`], for controller table records.
    ///
    /// # Errors
    ///
    /// [`Error::Miss`] or [`Error::PayloadMismatch`].
    pub fn get_controllers(
        &self,
        cgroup: &CgroupKey,
        kind: EntryKind,
    ) -> Result<Arc<ControllerTable>> {
        self.get_typed(cgroup, kind, Payload::into_controllers)
    }

    /// Like [`ContentCache::get`], for timestamp records.
    ///
    /// # Errors
    ///
    /// [`Error::Miss`] or [`Error::PayloadMismatch`].
    pub fn get_timestamp(&self, cgroup: &CgroupKey, kind: EntryKind) -> Result<SystemTime> {
        self.get_typed(cgroup, kind, Payload::into_timestamp)
    }

    fn get_typed<T>(
        &self,
        cgroup: &CgroupKey,
        kind: EntryKind,
        extract: fn(Payload) -> std::result::Result<T, Payload>,
    ) -> Result<T> {
        extract(self.get(cgroup, kind)?).map_err(|payload| Error::PayloadMismatch {
            cgroup: cgroup.clone(),
            kind,
            found: payload.variant_name(),
        })
    }

    /// Stores `payload` for `kind` under `cgroup`, then evicts idle groups.
    pub fn put(&self, cgroup: &CgroupKey, kind: EntryKind, payload: Payload) {
        self.put_at(cgroup, kind, payload, Instant::now());
    }

    pub fn put_at(&self, cgroup: &CgroupKey, kind: EntryKind, payload: Payload, now: Instant) {
        {
            let mut group = self
                .groups
                .entry(cgroup.clone())
                .or_insert_with(|| Group::new(now));
            group.last_seen = now;
            group.entries.insert(
                kind,
                Entry {
                    written_at: now,
                    payload,
                },
            );
        }
        self.sweep_at(now);
    }

    /// Returns the lock serializing regeneration of `kind` for `cgroup`.
    pub fn recompute_lock(&self, cgroup: &CgroupKey, kind: EntryKind) -> RecomputeLock {
        self.recompute
            .entry((cgroup.clone(), kind))
            .or_default()
            .clone()
    }

    fn sweep_at(&self, now: Instant) {
        let retention = self.retention;
        self.groups.retain(|cgroup, group| {
            let keep = now.saturating_duration_since(group.last_seen) <= retention;
            if !keep {
                log::debug!("evicting idle cgroup `{cgroup}` from the content cache");
            }
            keep
        });
        // Locks still held by a request survive until the next sweep.
        self.recompute.retain(|(cgroup, _), lock| {
            self.groups.contains_key(cgroup) || Arc::strong_count(lock) > 1
        });
    }
}
