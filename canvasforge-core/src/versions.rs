//! Named, timestamped snapshots of the whole document.
//!
//! History lives under [`VERSIONS_KEY`] as a JSON array, most recent first.
//! Reads never fail: an unreadable history is logged and treated as empty.
//! Writes that fail surface as [`VersionError::Unavailable`] and leave the
//! caller's in-memory document untouched.

use crate::error::VersionError;
use crate::storage::{load_list, store_list, KeyValueStore};
use canvasforge_tree::ComponentNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const VERSIONS_KEY: &str = "canvasforge.versions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub components: Vec<ComponentNode>,
}

impl Version {
    pub fn node_count(&self) -> usize {
        self.components.iter().map(ComponentNode::count).sum()
    }

    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            id: self.id,
            timestamp: self.timestamp,
            name: self.name.clone(),
            node_count: self.node_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub node_count: usize,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct VersionStore {
    backend: Arc<dyn KeyValueStore>,
    /// Serializes read-modify-write cycles.
    write: Mutex<()>,
    clock: Clock,
}

impl VersionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(backend, Box::new(Utc::now))
    }

    pub fn with_clock(backend: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        Self {
            backend,
            write: Mutex::new(()),
            clock,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Snapshot `components` under `name` and persist it as the newest entry.
    ///
    /// The timestamp never goes backwards relative to the newest saved
    /// version, even if the wall clock does.
    pub fn save(&self, name: &str, components: &[ComponentNode]) -> Result<Version, VersionError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut versions: Vec<Version> = load_list(self.backend.as_ref(), VERSIONS_KEY)?;

        let now = (self.clock)();
        let timestamp = match versions.first() {
            Some(newest) if newest.timestamp > now => newest.timestamp,
            _ => now,
        };
        let version = Version {
            id: Uuid::new_v4(),
            timestamp,
            name: name.to_string(),
            components: components.to_vec(),
        };
        versions.insert(0, version.clone());

        if let Err(e) = store_list(self.backend.as_ref(), VERSIONS_KEY, &versions) {
            tracing::warn!(error = %e, backend = self.backend.name(), "failed to persist version");
            return Err(e.into());
        }
        tracing::info!(id = %version.id, name, "saved version");
        Ok(version)
    }

    /// All versions, most recent first. Degrades to empty on read failure.
    pub fn versions(&self) -> Vec<Version> {
        match load_list(self.backend.as_ref(), VERSIONS_KEY) {
            Ok(versions) => versions,
            Err(e) => {
                tracing::warn!(error = %e, backend = self.backend.name(), "version history unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn list(&self) -> Vec<VersionSummary> {
        self.versions().iter().map(Version::summary).collect()
    }

    pub fn get(&self, id: Uuid) -> Result<Version, VersionError> {
        self.versions()
            .into_iter()
            .find(|v| v.id == id)
            .ok_or(VersionError::NotFound { id })
    }

    /// The forest saved in `id`. Does not modify history.
    pub fn restore(&self, id: Uuid) -> Result<Vec<ComponentNode>, VersionError> {
        self.get(id).map(|v| v.components)
    }

    pub fn delete(&self, id: Uuid) -> Result<(), VersionError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut versions: Vec<Version> = load_list(self.backend.as_ref(), VERSIONS_KEY)?;
        let before = versions.len();
        versions.retain(|v| v.id != id);
        if versions.len() == before {
            return Err(VersionError::NotFound { id });
        }
        store_list(self.backend.as_ref(), VERSIONS_KEY, &versions)?;
        tracing::info!(%id, "deleted version");
        Ok(())
    }

    /// Drop all history. Irreversible.
    pub fn clear(&self) -> Result<(), VersionError> {
        let _write = self.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.backend.remove(VERSIONS_KEY)?;
        tracing::info!("cleared version history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use canvasforge_tree::{Value, ValueMap, MAX_NESTING_DEPTH, MAX_VALUE_DEPTH};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn forest() -> Vec<ComponentNode> {
        vec![ComponentNode::new("a", "container").with_child(ComponentNode::new("b", "text"))]
    }

    #[test]
    fn test_save_list_restore() {
        let store = VersionStore::new(Arc::new(MemoryStore::new()));
        let first = store.save("first", &forest()).unwrap();
        let second = store.save("", &[]).unwrap();

        let list = store.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[1].id, first.id);
        assert_eq!(list[1].node_count, 2);

        assert_eq!(store.restore(first.id).unwrap(), forest());
        // Restore is a pure read.
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_duplicate_names_are_distinct_versions() {
        let store = VersionStore::new(Arc::new(MemoryStore::new()));
        let a = store.save("draft", &forest()).unwrap();
        let b = store.save("draft", &forest()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let times = Mutex::new(vec![
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap(),
        ]);
        let clock: Clock = Box::new(move || times.lock().unwrap().remove(0));
        let store = VersionStore::with_clock(Arc::new(MemoryStore::new()), clock);
        let a = store.save("a", &[]).unwrap();
        let b = store.save("b", &[]).unwrap();
        assert!(b.timestamp >= a.timestamp);
        assert_eq!(b.timestamp - a.timestamp, Duration::zero());
    }

    #[test]
    fn test_missing_and_delete() {
        let store = VersionStore::new(Arc::new(MemoryStore::new()));
        let ghost = Uuid::new_v4();
        assert_eq!(store.restore(ghost), Err(VersionError::NotFound { id: ghost }));

        let v = store.save("x", &forest()).unwrap();
        store.delete(v.id).unwrap();
        assert_eq!(store.delete(v.id), Err(VersionError::NotFound { id: v.id }));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_clear() {
        let store = VersionStore::new(Arc::new(MemoryStore::new()));
        store.save("x", &forest()).unwrap();
        store.clear().unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_corrupt_history_degrades_to_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(VERSIONS_KEY, "{{{").unwrap();
        let store = VersionStore::new(backend);
        assert!(store.list().is_empty());
        // Saving over unreadable history is refused rather than silently discarding it.
        assert!(matches!(store.save("x", &[]), Err(VersionError::Unavailable(_))));
    }

    #[test]
    fn test_quota_failure_is_unavailable() {
        let store = VersionStore::new(Arc::new(MemoryStore::with_quota(64)));
        let big = vec![ComponentNode::new("a", "text").with_prop("text", "x".repeat(500))];
        assert!(matches!(store.save("big", &big), Err(VersionError::Unavailable(_))));
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_order_survives_round_trip_through_backend() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ids: Vec<Uuid> = {
            let store = VersionStore::new(backend.clone());
            (0..3).map(|i| store.save(&i.to_string(), &[]).unwrap().id).collect()
        };
        let reopened = VersionStore::new(backend);
        let listed: Vec<Uuid> = reopened.list().iter().map(|s| s.id).collect();
        assert_eq!(listed, ids.into_iter().rev().collect::<Vec<_>>());
    }

    /// The deepest forest the tree accepts, with the deepest value at the bottom.
    fn deepest_forest() -> Vec<ComponentNode> {
        let mut value = Value::from(1.0);
        for i in 0..MAX_VALUE_DEPTH {
            value = if i % 2 == 0 {
                Value::List(vec![value])
            } else {
                let mut map = ValueMap::new();
                map.insert("inner".into(), value);
                Value::Map(map)
            };
        }
        let mut node = ComponentNode::new("leaf", "text").with_prop("render", value);
        for i in 1..MAX_NESTING_DEPTH {
            node = ComponentNode::new(format!("level-{}", i), "container").with_child(node);
        }
        canvasforge_tree::ComponentTree::from_roots(vec![node.clone()]).unwrap();
        vec![node]
    }

    #[test]
    fn test_deepest_forest_keeps_history_readable() {
        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = VersionStore::new(backend.clone());
        let older = store.save("older", &forest()).unwrap();
        let deep = store.save("deep", &deepest_forest()).unwrap();

        let reopened = VersionStore::new(backend);
        let listed: Vec<Uuid> = reopened.list().iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![deep.id, older.id]);
        assert_eq!(reopened.restore(deep.id).unwrap(), deepest_forest());
        assert_eq!(reopened.restore(older.id).unwrap(), forest());
        assert!(reopened.save("after", &[]).is_ok());
    }
}
