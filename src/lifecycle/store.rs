//! Persistence boundary for models and inspection runs.

use super::model::{InspectionRun, Model};
use crate::util::{AlignError, AlignResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Record store the lifecycle reads and writes through.
///
/// Implementations only need per-call atomicity; transitions of one model
/// are serialized by the lifecycle itself.
pub trait ModelStore: Send + Sync {
    /// Stores a new model, assigning and returning its id.
    fn insert_model(&self, model: Model) -> AlignResult<Model>;
    fn get_model(&self, id: u64) -> AlignResult<Model>;
    /// Replaces an existing model record.
    fn update_model(&self, model: &Model) -> AlignResult<()>;
    fn list_models(&self) -> AlignResult<Vec<Model>>;
    /// Removes a model together with its runs.
    fn delete_model(&self, id: u64) -> AlignResult<()>;
    /// Stores a new run, assigning and returning its id.
    fn insert_run(&self, run: InspectionRun) -> AlignResult<InspectionRun>;
    fn get_run(&self, id: u64) -> AlignResult<InspectionRun>;
    /// Runs of one model, oldest first.
    fn list_runs(&self, model_id: u64) -> AlignResult<Vec<InspectionRun>>;
}

#[derive(Default)]
struct Tables {
    next_model: u64,
    next_run: u64,
    models: BTreeMap<u64, Model>,
    runs: BTreeMap<u64, InspectionRun>,
}

/// In-process [`ModelStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryStore {
    fn insert_model(&self, mut model: Model) -> AlignResult<Model> {
        let mut tables = self.tables.write();
        tables.next_model += 1;
        model.id = tables.next_model;
        tables.models.insert(model.id, model.clone());
        Ok(model)
    }

    fn get_model(&self, id: u64) -> AlignResult<Model> {
        self.tables
            .read()
            .models
            .get(&id)
            .cloned()
            .ok_or(AlignError::UnknownModel(id))
    }

    fn update_model(&self, model: &Model) -> AlignResult<()> {
        let mut tables = self.tables.write();
        match tables.models.get_mut(&model.id) {
            Some(slot) => {
                *slot = model.clone();
                Ok(())
            }
            None => Err(AlignError::UnknownModel(model.id)),
        }
    }

    fn list_models(&self) -> AlignResult<Vec<Model>> {
        Ok(self.tables.read().models.values().cloned().collect())
    }

    fn delete_model(&self, id: u64) -> AlignResult<()> {
        let mut tables = self.tables.write();
        tables
            .models
            .remove(&id)
            .ok_or(AlignError::UnknownModel(id))?;
        tables.runs.retain(|_, run| run.model_id != id);
        Ok(())
    }

    fn insert_run(&self, mut run: InspectionRun) -> AlignResult<InspectionRun> {
        let mut tables = self.tables.write();
        if !tables.models.contains_key(&run.model_id) {
            return Err(AlignError::UnknownModel(run.model_id));
        }
        tables.next_run += 1;
        run.id = tables.next_run;
        tables.runs.insert(run.id, run.clone());
        Ok(run)
    }

    fn get_run(&self, id: u64) -> AlignResult<InspectionRun> {
        self.tables
            .read()
            .runs
            .get(&id)
            .cloned()
            .ok_or(AlignError::UnknownRun(id))
    }

    fn list_runs(&self, model_id: u64) -> AlignResult<Vec<InspectionRun>> {
        Ok(self
            .tables
            .read()
            .runs
            .values()
            .filter(|run| run.model_id == model_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, ModelStore};
    use crate::lifecycle::model::{InspectionRun, Model};
    use crate::util::AlignError;
    use std::time::SystemTime;

    fn run(model_id: u64) -> InspectionRun {
        InspectionRun {
            id: 0,
            model_id,
            created_at: SystemTime::now(),
            records: Vec::new(),
        }
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let store = MemoryStore::new();
        let a = store.insert_model(Model::draft("a", "")).unwrap();
        let b = store.insert_model(Model::draft("b", "")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.get_model(2).unwrap().name, "b");
        assert_eq!(store.list_models().unwrap().len(), 2);
    }

    #[test]
    fn deleting_a_model_drops_its_runs() {
        let store = MemoryStore::new();
        let keep = store.insert_model(Model::draft("keep", "")).unwrap();
        let gone = store.insert_model(Model::draft("gone", "")).unwrap();
        store.insert_run(run(keep.id)).unwrap();
        let doomed = store.insert_run(run(gone.id)).unwrap();
        store.delete_model(gone.id).unwrap();
        assert_eq!(store.get_model(gone.id).unwrap_err(), AlignError::UnknownModel(gone.id));
        assert_eq!(store.get_run(doomed.id).unwrap_err(), AlignError::UnknownRun(doomed.id));
        assert_eq!(store.list_runs(keep.id).unwrap().len(), 1);
    }

    #[test]
    fn run_for_unknown_model_is_refused() {
        let store = MemoryStore::new();
        assert!(store.insert_run(run(9)).is_err());
    }
}
