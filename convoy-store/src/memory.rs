//! In-memory coordination store
//!
//! Behaves like the Redis store for the commands Convoy uses, including key
//! expiry, glob `KEYS`, blocking pops woken by pushes and a broadcast
//! channel standing in for pub/sub. Used by tests and single-process setups.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::time::Instant;

use crate::CoordinationStore;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Published message as seen by a [`MemoryStore::subscribe`] receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub channel: String,
    pub message: String,
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    pushed: Notify,
    events: broadcast::Sender<Published>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: Mutex::new(HashMap::new()),
            pushed: Notify::new(),
            events,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every message passed to `publish` from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.events.subscribe()
    }

    /// Remaining time to live, if the key exists and has one
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Command(format!(
            "WRONGTYPE operation against key '{}' holding the wrong kind of value",
            key
        ))
    }

    async fn try_rpop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let popped = match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list.pop_back(),
            Some(_) => return Err(Self::wrong_type(key)),
            None => None,
        };
        if matches!(entries.get(key), Some(Entry { value: Value::List(l), .. }) if l.is_empty()) {
            entries.remove(key);
        }
        Ok(popped)
    }
}

/// Redis list index normalisation: negative counts from the end, result clamped
fn list_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), Entry::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let mut entry = Entry::new(Value::Str(value.to_string()));
        entry.expires_at = Some(Instant::now() + ttl);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| StoreError::Command(format!("invalid pattern '{}': {}", pattern, e)))?;
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && pattern.matches(k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;
        if Self::live(&mut entries, key).is_none() {
            entries.insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
        }
        match entries.get_mut(key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.insert(member.to_string())),
            _ => Err(Self::wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        {
            let mut entries = self.entries.lock().await;
            if Self::live(&mut entries, key).is_none() {
                entries.insert(key.to_string(), Entry::new(Value::List(VecDeque::new())));
            }
            match entries.get_mut(key) {
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => list.push_front(value.to_string()),
                _ => return Err(Self::wrong_type(key)),
            }
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn rpop(&self, key: &str) -> StoreResult<Option<String>> {
        self.try_rpop(key).await
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_rpop(key).await? {
                return Ok(Some(value));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock().await;
        match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(match list_range(list.len(), start, stop) {
                Some((s, e)) => list.range(s..=e).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        let empty = match Self::live(&mut entries, key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => {
                match list_range(list.len(), start, stop) {
                    Some((s, e)) => {
                        list.truncate(e + 1);
                        list.drain(..s);
                    }
                    None => list.clear(),
                }
                list.is_empty()
            }
            Some(_) => return Err(Self::wrong_type(key)),
            None => false,
        };
        if empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        // No subscribers is not an error, same as Redis
        let _ = self.events.send(Published {
            channel: channel.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}
