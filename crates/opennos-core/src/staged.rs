//! Two-phase add/remove/commit/undo manager shared by every entity type.
//!
//! Staging only touches in-memory sets. Hardware work happens in `commit`,
//! through the [`EntityFactory`] supplied by the controller, and every
//! commit records mementos so the most recent one can be undone.

use crate::command::{report_result, ResultCallback};
use crate::error::{CoreError, CoreResult};
use crate::ordering::CommitOrder;
use crate::registry::Registry;
use log::{debug, error, info};
use std::collections::BTreeSet;
use std::fmt;

/// Creates and destroys the hardware-backed record of one entity type.
pub trait EntityFactory {
    type Id: Copy + Ord + fmt::Display + fmt::Debug;
    type Entity;

    /// Entity name used in logs and errors.
    const KIND: &'static str;

    /// Ordering key of the addition phase inside a mixed batch.
    const CREATE_ORDER: CommitOrder = CommitOrder::Unordered;

    /// Ordering key of the removal phase inside a mixed batch.
    const DELETE_ORDER: CommitOrder = CommitOrder::Unordered;

    fn create(&mut self, id: Self::Id) -> CoreResult<Self::Entity>;

    fn destroy(&mut self, id: Self::Id, entity: &Self::Entity) -> CoreResult<()>;
}

/// Staged entity manager.
///
/// Invariants: `to_add` and `to_remove` are disjoint, `to_add` never holds
/// a committed id, and `to_remove` only holds committed ids.
pub struct StagedManager<F: EntityFactory> {
    factory: F,
    committed: Registry<F::Id, F::Entity>,
    to_add: BTreeSet<F::Id>,
    to_remove: BTreeSet<F::Id>,
    memento_added: BTreeSet<F::Id>,
    memento_removed: BTreeSet<F::Id>,
    undoable: bool,
}

impl<F: EntityFactory> StagedManager<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            committed: Registry::new(F::KIND),
            to_add: BTreeSet::new(),
            to_remove: BTreeSet::new(),
            memento_added: BTreeSet::new(),
            memento_removed: BTreeSet::new(),
            undoable: false,
        }
    }

    /// Stages `id` for creation, cancelling a staged removal of it.
    pub fn add(&mut self, id: F::Id) -> CoreResult<()> {
        let cancelled = self.to_remove.remove(&id);
        if self.committed.contains(&id) {
            if cancelled {
                debug!("cancelled staged removal of {} {}", F::KIND, id);
            }
            return Err(CoreError::already_exists(F::KIND, id));
        }
        self.to_add.insert(id);
        debug!("staged {} {} for creation", F::KIND, id);
        Ok(())
    }

    /// Stages `id` for removal, cancelling a staged creation of it.
    pub fn remove(&mut self, id: F::Id) -> CoreResult<()> {
        if self.to_add.remove(&id) {
            debug!("cancelled staged creation of {} {}", F::KIND, id);
        }
        if !self.committed.contains(&id) {
            return Err(CoreError::not_exists(F::KIND, id));
        }
        self.to_remove.insert(id);
        debug!("staged {} {} for removal", F::KIND, id);
        Ok(())
    }

    /// True if `id` is committed.
    pub fn exists(&self, id: F::Id) -> bool {
        self.committed.contains(&id)
    }

    /// The committed record of `id`, failing with `NotExists`.
    pub fn get(&self, id: F::Id) -> CoreResult<&F::Entity> {
        self.committed.lookup(&id)
    }

    pub fn get_mut(&mut self, id: F::Id) -> CoreResult<&mut F::Entity> {
        self.committed.lookup_mut(&id)
    }

    pub fn committed(&self) -> &Registry<F::Id, F::Entity> {
        &self.committed
    }

    pub fn committed_mut(&mut self) -> &mut Registry<F::Id, F::Entity> {
        &mut self.committed
    }

    pub fn committed_ids(&self) -> BTreeSet<F::Id> {
        self.committed.ids().collect()
    }

    pub fn to_add(&self) -> &BTreeSet<F::Id> {
        &self.to_add
    }

    pub fn to_remove(&self) -> &BTreeSet<F::Id> {
        &self.to_remove
    }

    pub fn memento_added(&self) -> &BTreeSet<F::Id> {
        &self.memento_added
    }

    pub fn memento_removed(&self) -> &BTreeSet<F::Id> {
        &self.memento_removed
    }

    /// True if `id` is committed or staged for creation.
    pub fn is_known(&self, id: F::Id) -> bool {
        self.to_add.contains(&id) || self.committed.contains(&id)
    }

    pub fn has_pending(&self) -> bool {
        !self.to_add.is_empty() || !self.to_remove.is_empty()
    }

    pub fn is_undoable(&self) -> bool {
        self.undoable
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// Drops everything staged but not yet committed.
    pub fn discard_pending(&mut self) {
        self.to_add.clear();
        self.to_remove.clear();
    }

    /// Applies staged removals then staged additions.
    ///
    /// Any failure reverts the work done so far and reports `Fail`. The
    /// staged sets are cleared whatever the outcome.
    pub fn commit(&mut self, callback: &dyn ResultCallback) -> CoreResult<()> {
        self.undoable = false;
        self.memento_added.clear();
        self.memento_removed.clear();

        let result = match self.commit_removals() {
            Ok(()) => self.commit_additions().map_err(|err| {
                if let Err(revert_err) = self.revert_removals() {
                    error!("failed to restore removed {} entities: {}", F::KIND, revert_err);
                }
                err
            }),
            Err(err) => Err(err),
        };
        self.discard_pending();

        let result = match result {
            Ok(()) => {
                self.undoable = true;
                info!(
                    "committed {} changes: +{:?} -{:?}",
                    F::KIND,
                    self.memento_added,
                    self.memento_removed
                );
                Ok(())
            }
            Err(err) => {
                self.undoable = false;
                Err(CoreError::fail(format!("{} commit failed: {}", F::KIND, err)))
            }
        };
        report_result(callback, &result);
        result
    }

    /// Reverts the most recent commit.
    pub fn undo(&mut self, callback: &dyn ResultCallback) -> CoreResult<()> {
        if !self.undoable {
            let result = Err(CoreError::command_not_undoable(format!(
                "no committed {} changes to undo",
                F::KIND
            )));
            report_result(callback, &result);
            return result;
        }

        let additions = self.revert_additions();
        let removals = self.revert_removals();
        self.discard_pending();
        self.undoable = false;

        let result = additions
            .and(removals)
            .map_err(|err| CoreError::fail(format!("{} undo incomplete: {}", F::KIND, err)));
        if result.is_ok() {
            info!("undid last {} commit", F::KIND);
        }
        report_result(callback, &result);
        result
    }

    /// Removal phase: destroys every staged removal.
    ///
    /// On failure the entities destroyed by this phase are recreated before
    /// the error is returned.
    pub fn commit_removals(&mut self) -> CoreResult<()> {
        self.memento_removed.clear();
        let pending = std::mem::take(&mut self.to_remove);
        for id in pending {
            if let Err(err) = self.destroy_entity(id) {
                error!("failed to destroy {} {}: {}", F::KIND, id, err);
                if let Err(revert_err) = self.revert_removals() {
                    error!("failed to restore removed {} entities: {}", F::KIND, revert_err);
                }
                return Err(err);
            }
            self.memento_removed.insert(id);
        }
        self.undoable = true;
        Ok(())
    }

    /// Addition phase: creates every staged addition.
    ///
    /// On failure the entities created by this phase are destroyed before
    /// the error is returned.
    pub fn commit_additions(&mut self) -> CoreResult<()> {
        self.memento_added.clear();
        let pending = std::mem::take(&mut self.to_add);
        for id in pending {
            if let Err(err) = self.create_entity(id) {
                error!("failed to create {} {}: {}", F::KIND, id, err);
                if let Err(revert_err) = self.revert_additions() {
                    error!("failed to destroy added {} entities: {}", F::KIND, revert_err);
                }
                return Err(err);
            }
            self.memento_added.insert(id);
        }
        self.undoable = true;
        Ok(())
    }

    /// Destroys every entity recorded in `memento_added`, newest first.
    pub fn revert_additions(&mut self) -> CoreResult<()> {
        let added = std::mem::take(&mut self.memento_added);
        let mut first_error = None;
        for id in added.into_iter().rev() {
            if let Err(err) = self.destroy_entity(id) {
                error!("failed to destroy {} {} during undo: {}", F::KIND, id, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Recreates every entity recorded in `memento_removed`.
    pub fn revert_removals(&mut self) -> CoreResult<()> {
        let removed = std::mem::take(&mut self.memento_removed);
        let mut first_error = None;
        for id in removed {
            if let Err(err) = self.create_entity(id) {
                error!("failed to recreate {} {} during undo: {}", F::KIND, id, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn create_entity(&mut self, id: F::Id) -> CoreResult<()> {
        let entity = self.factory.create(id)?;
        self.committed.insert(id, entity);
        debug!("created {} {}", F::KIND, id);
        Ok(())
    }

    fn destroy_entity(&mut self, id: F::Id) -> CoreResult<()> {
        let entity = self.committed.lookup(&id)?;
        self.factory.destroy(id, entity)?;
        self.committed.remove(&id);
        debug!("destroyed {} {}", F::KIND, id);
        Ok(())
    }
}

impl<F: EntityFactory> fmt::Debug for StagedManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedManager")
            .field("kind", &F::KIND)
            .field("committed", &self.committed_ids())
            .field("to_add", &self.to_add)
            .field("to_remove", &self.to_remove)
            .field("memento_added", &self.memento_added)
            .field("memento_removed", &self.memento_removed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::NullResultCallback;
    use crate::error::ResultCode;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Factory that hands out counters as handles and can refuse ids.
    #[derive(Default)]
    struct CountingFactory {
        next_handle: u32,
        live: BTreeSet<u16>,
        refuse_create: Option<u16>,
        refuse_destroy: Option<u16>,
    }

    impl EntityFactory for CountingFactory {
        type Id = u16;
        type Entity = u32;

        const KIND: &'static str = "widget";

        fn create(&mut self, id: u16) -> CoreResult<u32> {
            if self.refuse_create == Some(id) {
                return Err(CoreError::fail(format!("cannot create {}", id)));
            }
            self.next_handle += 1;
            self.live.insert(id);
            Ok(self.next_handle)
        }

        fn destroy(&mut self, id: u16, _entity: &u32) -> CoreResult<()> {
            if self.refuse_destroy == Some(id) {
                return Err(CoreError::fail(format!("cannot destroy {}", id)));
            }
            self.live.remove(&id);
            Ok(())
        }
    }

    fn set(ids: &[u16]) -> BTreeSet<u16> {
        ids.iter().copied().collect()
    }

    fn manager_with(ids: &[u16]) -> StagedManager<CountingFactory> {
        let mut manager = StagedManager::new(CountingFactory::default());
        for id in ids {
            manager.add(*id).unwrap();
        }
        manager.commit(&NullResultCallback).unwrap();
        manager
    }

    #[test]
    fn test_add_then_remove_before_commit() {
        let mut manager = manager_with(&[1]);

        manager.add(5).unwrap();
        assert!(manager.remove(5).is_err());

        assert!(!manager.has_pending());
        assert_eq!(manager.committed_ids(), set(&[1]));
    }

    #[test]
    fn test_staging_validation() {
        let mut manager = manager_with(&[1, 2]);

        let err = manager.remove(9).unwrap_err();
        assert_eq!(err.code(), ResultCode::NotExists);

        let err = manager.add(2).unwrap_err();
        assert_eq!(err.code(), ResultCode::AlreadyExists);

        manager.add(3).unwrap();
        manager.add(3).unwrap();
        assert_eq!(manager.to_add(), &set(&[3]));
    }

    #[test]
    fn test_staged_sets_stay_disjoint() {
        let mut manager = manager_with(&[1]);

        manager.remove(1).unwrap();
        assert_eq!(manager.to_remove(), &set(&[1]));

        assert!(manager.add(1).is_err());
        assert!(manager.to_remove().is_empty());
        assert!(manager.to_add().is_empty());
    }

    #[test]
    fn test_commit_and_undo_scenario() {
        let mut manager = manager_with(&[1, 2]);

        manager.add(3).unwrap();
        manager.remove(1).unwrap();
        manager.commit(&NullResultCallback).unwrap();

        assert_eq!(manager.committed_ids(), set(&[2, 3]));
        assert_eq!(manager.memento_added(), &set(&[3]));
        assert_eq!(manager.memento_removed(), &set(&[1]));
        assert_eq!(manager.factory().live, set(&[2, 3]));

        manager.undo(&NullResultCallback).unwrap();
        assert_eq!(manager.committed_ids(), set(&[1, 2]));
        assert_eq!(manager.factory().live, set(&[1, 2]));
        assert!(manager.memento_added().is_empty());
        assert!(manager.memento_removed().is_empty());
    }

    #[test]
    fn test_failed_commit_restores_previous_state() {
        let mut manager = manager_with(&[1, 2]);
        manager.factory_mut().refuse_create = Some(4);

        manager.remove(1).unwrap();
        manager.add(3).unwrap();
        manager.add(4).unwrap();

        let codes = RefCell::new(Vec::new());
        let callback = |code: ResultCode, msg: &str| codes.borrow_mut().push((code, msg.to_string()));
        let err = manager.commit(&callback).unwrap_err();

        assert_eq!(err.code(), ResultCode::Fail);
        assert_eq!(manager.committed_ids(), set(&[1, 2]));
        assert_eq!(manager.factory().live, set(&[1, 2]));
        assert!(!manager.has_pending());
        assert!(!manager.is_undoable());

        let codes = codes.into_inner();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].0, ResultCode::Fail);
        assert!(codes[0].1.contains("cannot create 4"));
    }

    #[test]
    fn test_failed_removal_phase_restores_removed() {
        let mut manager = manager_with(&[1, 2, 3]);
        manager.factory_mut().refuse_destroy = Some(3);

        manager.remove(1).unwrap();
        manager.remove(3).unwrap();
        assert!(manager.commit(&NullResultCallback).is_err());

        assert_eq!(manager.committed_ids(), set(&[1, 2, 3]));
    }

    #[test]
    fn test_undo_without_commit() {
        let mut manager = StagedManager::new(CountingFactory::default());
        let err = manager.undo(&NullResultCallback).unwrap_err();
        assert_eq!(err.code(), ResultCode::CommandNotUndoable);
    }

    #[test]
    fn test_undo_only_once() {
        let mut manager = manager_with(&[1]);
        manager.undo(&NullResultCallback).unwrap();
        assert!(manager.committed_ids().is_empty());
        assert!(manager.undo(&NullResultCallback).is_err());
    }

    #[test]
    fn test_get_missing_entity() {
        let manager = manager_with(&[1]);
        assert_eq!(manager.get(1).unwrap(), &1);
        assert!(manager.exists(1));
        let err = manager.get(2).unwrap_err();
        assert_eq!(err.to_string(), "widget 2 does not exist");
    }

    #[test]
    fn test_phase_api() {
        let mut manager = manager_with(&[1]);
        manager.add(2).unwrap();
        manager.remove(1).unwrap();

        manager.commit_additions().unwrap();
        assert_eq!(manager.committed_ids(), set(&[1, 2]));
        manager.commit_removals().unwrap();
        assert_eq!(manager.committed_ids(), set(&[2]));

        manager.revert_removals().unwrap();
        manager.revert_additions().unwrap();
        assert_eq!(manager.committed_ids(), set(&[1]));
    }
}
