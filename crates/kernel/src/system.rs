use crate::error::EngineError;
use crate::manager::EntityManager;
use std::any::Any;
use std::collections::BTreeMap;

/// Per-frame logic that operates on entity managers by name.
pub trait System: Any {
    fn name(&self) -> &str;

    fn tick(&mut self, managers: &mut ManagerSet, delta_ms: f32) -> Result<(), EngineError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Entity managers in the order they were added, looked up by name.
///
/// Insertion order is the draw order: later managers render on top.
#[derive(Default)]
pub struct ManagerSet {
    managers: Vec<EntityManager>,
    index: BTreeMap<String, usize>,
}

impl ManagerSet {
    pub fn insert(&mut self, manager: EntityManager) -> Result<(), EngineError> {
        let name = manager.name().to_string();
        if self.index.contains_key(&name) {
            return Err(EngineError::DuplicateManager(name));
        }
        self.index.insert(name, self.managers.len());
        self.managers.push(manager);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&EntityManager, EngineError> {
        self.index
            .get(name)
            .map(|&i| &self.managers[i])
            .ok_or_else(|| EngineError::UnknownManager {
                context: "ManagerSet::get",
                name: name.to_string(),
            })
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut EntityManager, EngineError> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.managers[i]),
            None => Err(EngineError::UnknownManager {
                context: "ManagerSet::get_mut",
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.managers.iter().map(EntityManager::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityManager> {
        self.managers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut EntityManager> {
        self.managers.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_keeps_insertion_order() {
        let mut set = ManagerSet::default();
        set.insert(EntityManager::new("world")).unwrap();
        set.insert(EntityManager::new("ui")).unwrap();
        set.insert(EntityManager::new("text")).unwrap();
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["world", "ui", "text"]);
        assert_eq!(set.get("ui").unwrap().name(), "ui");
        assert_eq!(set.get("world").unwrap().name(), "world");
        assert!(matches!(
            set.get_mut("text"),
            Err(EngineError::UnknownManager { .. })
        ));
        assert!(matches!(
            set.insert(EntityManager::new("ui")),
            Err(EngineError::DuplicateManager(_))
        ));
    }
}
