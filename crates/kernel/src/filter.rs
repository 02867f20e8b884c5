use glint_ecs::{ComponentKind, EntityId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Canonical descriptor of a filter. Order-sensitive: `[A, B]` and `[B, A]`
/// are cached separately even though they select the same entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterKey {
    Components(Vec<ComponentKind>),
    Tags(Vec<String>),
}

/// Memoized filter results.
///
/// Global filters run over every active entity. Source-scoped filters run
/// over a caller-supplied subset and are keyed by the caller's filter id as
/// well, so they never collide with global entries.
#[derive(Debug, Default)]
pub struct FilterCache {
    global: BTreeMap<FilterKey, Arc<[EntityId]>>,
    scoped: BTreeMap<(String, FilterKey), Arc<[EntityId]>>,
    hits: u64,
    misses: u64,
}

impl FilterCache {
    pub fn get_or_insert_with(
        &mut self,
        key: FilterKey,
        compute: impl FnOnce() -> Vec<EntityId>,
    ) -> Arc<[EntityId]> {
        if let Some(hit) = self.global.get(&key) {
            self.hits += 1;
            return Arc::clone(hit);
        }
        self.misses += 1;
        let result: Arc<[EntityId]> = compute().into();
        self.global.insert(key, Arc::clone(&result));
        result
    }

    pub fn get_or_insert_scoped_with(
        &mut self,
        filter_id: &str,
        key: FilterKey,
        compute: impl FnOnce() -> Vec<EntityId>,
    ) -> Arc<[EntityId]> {
        let key = (filter_id.to_string(), key);
        if let Some(hit) = self.scoped.get(&key) {
            self.hits += 1;
            return Arc::clone(hit);
        }
        self.misses += 1;
        let result: Arc<[EntityId]> = compute().into();
        self.scoped.insert(key, Arc::clone(&result));
        result
    }

    pub fn invalidate(&mut self) {
        self.global.clear();
        self.scoped.clear();
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_hits() {
        let mut cache = FilterCache::default();
        let id = EntityId::new();
        let key = FilterKey::Tags(vec!["enemy".into()]);
        let a = cache.get_or_insert_with(key.clone(), || vec![id]);
        let b = cache.get_or_insert_with(key, || panic!("should be cached"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn scoped_namespace_is_separate() {
        let mut cache = FilterCache::default();
        let key = FilterKey::Components(vec![ComponentKind::Motion]);
        let global = cache.get_or_insert_with(key.clone(), Vec::new);
        let scoped = cache.get_or_insert_scoped_with("bullets", key.clone(), || vec![EntityId::new()]);
        let other = cache.get_or_insert_scoped_with("walls", key, Vec::new);
        assert!(global.is_empty());
        assert_eq!(scoped.len(), 1);
        assert!(other.is_empty());
        assert_eq!(cache.len(), 3);

        cache.invalidate();
        assert!(cache.is_empty());
    }
}
