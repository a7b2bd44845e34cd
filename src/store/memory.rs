//! In-process store with Redis semantics
//!
//! Used wherever a live server is unnecessary: tests, dry runs, and
//! embedding. Scan cursors are positions in the sorted keyspace, so a scan
//! started past the end terminates immediately, just as an out-of-range
//! cursor does on a small Redis database.
//!
//! Two switches simulate failures: [`MemoryStore::set_offline`] turns every
//! call into a connection failure, and [`MemoryStore::fail_commits_after`]
//! rejects commits once a number of them have succeeded.

use crate::error::{StoreError, StoreResult};
use crate::store::{FieldMap, KeyValueStore, ScanPage, WriteOp, SCAN_COMPLETE};

use parking_lot::Mutex;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Hash(FieldMap),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Default)]
struct State {
    keys: BTreeMap<String, Value>,
    offline: bool,
    commits_allowed: Option<usize>,
    commit_sizes: Vec<usize>,
}

impl State {
    fn check_online(&self) -> StoreResult<()> {
        if self.offline {
            Err(StoreError::ConnectionFailed {
                url: "memory://".to_string(),
                reason: "store is offline".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn hash(&self, key: &str) -> StoreResult<Option<&FieldMap>> {
        match self.keys.get(key) {
            None => Ok(None),
            Some(Value::Hash(map)) => Ok(Some(map)),
            Some(Value::SortedSet(_)) => Err(StoreError::OperationFailed(WRONGTYPE.into())),
        }
    }

    fn apply(&mut self, op: &WriteOp) {
        match op {
            WriteOp::HashSet { key, fields } => {
                if let Value::Hash(map) = self
                    .keys
                    .entry(key.clone())
                    .or_insert_with(|| Value::Hash(FieldMap::new()))
                {
                    for (field, value) in fields {
                        map.insert(field.clone(), value.clone());
                    }
                }
            }
            WriteOp::SortedSetAdd { key, member, score } => {
                if let Value::SortedSet(set) = self
                    .keys
                    .entry(key.clone())
                    .or_insert_with(|| Value::SortedSet(HashMap::new()))
                {
                    set.insert(member.clone(), *score);
                }
            }
        }
    }

    /// Reject the batch up front so a failed commit changes nothing
    fn validate(&self, batch: &[WriteOp]) -> StoreResult<()> {
        // Kinds of keys created earlier in the same batch
        let mut created: HashMap<&str, bool> = HashMap::new();

        for op in batch {
            let wants_hash = matches!(op, WriteOp::HashSet { .. });
            let existing = created.get(op.key()).copied().or_else(|| {
                self.keys
                    .get(op.key())
                    .map(|v| matches!(v, Value::Hash(_)))
            });
            let well_formed = match op {
                WriteOp::HashSet { fields, .. } => !fields.is_empty(),
                WriteOp::SortedSetAdd { score, .. } => !score.is_nan(),
            };

            if !well_formed || existing.is_some_and(|is_hash| is_hash != wants_hash) {
                return Err(StoreError::OperationFailed(format!(
                    "EXECABORT Transaction discarded because of an invalid write to '{}'",
                    op.key()
                )));
            }
            created.insert(op.key(), wants_hash);
        }
        Ok(())
    }
}

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing (or regaining) the connection
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Let `n` more commits succeed, then fail every later one
    pub fn fail_commits_after(&self, n: usize) {
        self.state.lock().commits_allowed = Some(n);
    }

    /// Number of operations in each successful commit, oldest first
    pub fn commit_sizes(&self) -> Vec<usize> {
        self.state.lock().commit_sizes.clone()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Translate a Redis glob into an anchored regex
fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' || c == '[' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push(']');
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    Regex::new(&out)
        .map_err(|e| StoreError::OperationFailed(format!("invalid pattern '{}': {}", pattern, e)))
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state.lock().check_online()
    }

    async fn commit(&self, batch: &[WriteOp]) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.check_online()?;

        if let Some(remaining) = state.commits_allowed {
            if remaining == 0 {
                return Err(StoreError::OperationFailed(
                    "EXECABORT Transaction discarded".to_string(),
                ));
            }
            state.commits_allowed = Some(remaining - 1);
        }

        state.validate(batch)?;
        for op in batch {
            state.apply(op);
        }
        state.commit_sizes.push(batch.len());
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<FieldMap> {
        let state = self.state.lock();
        state.check_online()?;
        Ok(state.hash(key)?.cloned().unwrap_or_default())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let state = self.state.lock();
        state.check_online()?;
        Ok(state.hash(key)?.and_then(|map| map.get(field).cloned()))
    }

    async fn hash_get_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Option<String>>> {
        let state = self.state.lock();
        state.check_online()?;
        let map = state.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| map.and_then(|m| m.get(*f).cloned()))
            .collect())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let matcher = glob_to_regex(pattern)?;
        let state = self.state.lock();
        state.check_online()?;

        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let total = state.keys.len();
        if start >= total {
            return Ok(ScanPage {
                cursor: SCAN_COMPLETE,
                keys: Vec::new(),
            });
        }

        let end = start.saturating_add(count.max(1)).min(total);
        let keys = state
            .keys
            .keys()
            .skip(start)
            .take(end - start)
            .filter(|k| matcher.is_match(k))
            .cloned()
            .collect();

        let next = if end >= total { SCAN_COMPLETE } else { end as u64 };
        Ok(ScanPage { cursor: next, keys })
    }

    async fn top_members(&self, key: &str, n: usize) -> StoreResult<Vec<(String, f64)>> {
        let state = self.state.lock();
        state.check_online()?;

        let set = match state.keys.get(key) {
            None => return Ok(Vec::new()),
            Some(Value::SortedSet(set)) => set,
            Some(Value::Hash(_)) => return Err(StoreError::OperationFailed(WRONGTYPE.into())),
        };

        let mut members: Vec<(String, f64)> =
            set.iter().map(|(m, s)| (m.clone(), *s)).collect();
        // Descending score; equal scores in reverse lexicographic order
        members.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        members.truncate(n);
        Ok(members)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<Vec<bool>> {
        let mut state = self.state.lock();
        state.check_online()?;
        Ok(keys.iter().map(|k| state.keys.remove(k).is_some()).collect())
    }

    async fn flush_all(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.check_online()?;
        state.keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hset(key: &str, pairs: &[(&str, &str)]) -> WriteOp {
        WriteOp::HashSet {
            key: key.to_string(),
            fields: pairs
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn zadd(key: &str, member: &str, score: f64) -> WriteOp {
        WriteOp::SortedSetAdd {
            key: key.to_string(),
            member: member.to_string(),
            score,
        }
    }

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("user:*").unwrap();
        assert!(re.is_match("user:1"));
        assert!(re.is_match("user:"));
        assert!(!re.is_match("leaderboard:1"));
        assert!(!re.is_match("xuser:1"));

        let re = glob_to_regex("user:?").unwrap();
        assert!(re.is_match("user:7"));
        assert!(!re.is_match("user:77"));

        let re = glob_to_regex("user:[02468]*").unwrap();
        assert!(re.is_match("user:42"));
        assert!(!re.is_match("user:13"));

        let re = glob_to_regex("a.b").unwrap();
        assert!(!re.is_match("axb"));
    }

    #[tokio::test]
    async fn test_hash_merge_and_fetch() {
        let store = MemoryStore::new();
        store.commit(&[hset("user:1", &[("a", "1"), ("b", "2")])]).await.unwrap();
        store.commit(&[hset("user:1", &[("b", "3")])]).await.unwrap();

        let map = store.hash_get_all("user:1").await.unwrap();
        assert_eq!(map.get("a").map(String::as_str), Some("1"));
        assert_eq!(map.get("b").map(String::as_str), Some("3"));
        assert!(store.hash_get_all("user:2").await.unwrap().is_empty());

        let values = store.hash_get_fields("user:1", &["b", "zz", "a"]).await.unwrap();
        assert_eq!(values, vec![Some("3".into()), None, Some("1".into())]);
    }

    #[tokio::test]
    async fn test_failed_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.commit(&[zadd("leaderboard:1", "5", 1.0)]).await.unwrap();

        let result = store
            .commit(&[hset("user:9", &[("a", "1")]), hset("leaderboard:1", &[("x", "y")])])
            .await;
        assert!(result.is_err());
        assert!(store.hash_get_all("user:9").await.unwrap().is_empty());
        assert_eq!(store.commit_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_top_members_ordering() {
        let store = MemoryStore::new();
        store
            .commit(&[
                zadd("lb", "a", 10.0),
                zadd("lb", "b", 30.0),
                zadd("lb", "c", 20.0),
                zadd("lb", "d", 30.0),
                zadd("lb", "b", 5.0),
            ])
            .await
            .unwrap();

        let top = store.top_members("lb", 3).await.unwrap();
        let members: Vec<&str> = top.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["d", "c", "a"]);
        assert!(store.top_members("missing", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_pages_until_zero() {
        let store = MemoryStore::new();
        let ops: Vec<WriteOp> = (0..25)
            .map(|i| hset(&format!("user:{}", i), &[("n", "x")]))
            .chain(std::iter::once(zadd("leaderboard:2", "1", 1.0)))
            .collect();
        store.commit(&ops).await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        let mut calls = 0;
        loop {
            let page = store.scan(cursor, "user:*", 10).await.unwrap();
            calls += 1;
            seen.extend(page.keys);
            cursor = page.cursor;
            if cursor == SCAN_COMPLETE {
                break;
            }
        }
        assert_eq!(calls, 3);
        assert_eq!(seen.len(), 25);

        let page = store.scan(1280, "user:*", 10).await.unwrap();
        assert_eq!(page, ScanPage::default());
    }

    #[tokio::test]
    async fn test_offline_and_commit_budget() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.ping().await.unwrap_err();
        assert!(err.is_connection_failure());
        store.set_offline(false);
        store.ping().await.unwrap();

        store.fail_commits_after(1);
        store.commit(&[hset("user:1", &[("a", "1")])]).await.unwrap();
        assert!(store.commit(&[hset("user:2", &[("a", "1")])]).await.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_flush() {
        let store = MemoryStore::new();
        store
            .commit(&[hset("user:1", &[("a", "1")]), hset("user:2", &[("a", "1")])])
            .await
            .unwrap();

        let removed = store
            .delete(&["user:1".to_string(), "user:3".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec![true, false]);

        store.flush_all().await.unwrap();
        assert!(store.is_empty());
    }
}
