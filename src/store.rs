use crate::error::Result;
use crate::models::LearningModule;

/// Whole-collection persistence for learning modules. Callers always read,
/// compute the next collection, then write it back in full.
pub trait ModuleStore {
    fn load(&self) -> Result<Vec<LearningModule>>;
    fn save(&mut self, modules: &[LearningModule]) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    modules: Vec<LearningModule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modules(modules: Vec<LearningModule>) -> Self {
        Self { modules }
    }
}

impl ModuleStore for MemoryStore {
    fn load(&self) -> Result<Vec<LearningModule>> {
        Ok(self.modules.clone())
    }

    fn save(&mut self, modules: &[LearningModule]) -> Result<()> {
        self.modules = modules.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_store_loads_nothing() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_replaces_whole_collection() {
        let now = Utc::now();
        let mut store = MemoryStore::with_modules(vec![LearningModule::new("Old", "", 5, now)]);

        let fresh = vec![
            LearningModule::new("A", "", 5, now),
            LearningModule::new("B", "", 5, now),
        ];
        store.save(&fresh).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, fresh);
    }

    #[test]
    fn loaded_copy_is_detached() {
        let now = Utc::now();
        let store = MemoryStore::with_modules(vec![LearningModule::new("A", "", 5, now)]);
        let mut loaded = store.load().unwrap();
        loaded[0].name = "Changed".to_string();
        assert_eq!(store.load().unwrap()[0].name, "A");
    }
}
