//! Staged commit engine and event plumbing for the OpenNOS switching core.
//!
//! - [`StagedManager`]: two-phase add/remove/commit/undo for one entity type
//! - [`CommitBatch`]: mixed command batch executed in [`CommitOrder`] order
//! - [`ObserverBus`]: subject/observer notifications keyed by [`UpdateReason`]
//! - [`LinkEventBridge`]: coalesces driver link-scan callbacks into batches
//! - [`CommandDispatcher`]: per-resource FIFOs drained round-robin
//!
//! # Example
//!
//! ```
//! use opennos_core::{CoreResult, EntityFactory, NullResultCallback, StagedManager};
//!
//! struct Widgets;
//!
//! impl EntityFactory for Widgets {
//!     type Id = u16;
//!     type Entity = ();
//!     const KIND: &'static str = "widget";
//!
//!     fn create(&mut self, _id: u16) -> CoreResult<()> {
//!         Ok(())
//!     }
//!
//!     fn destroy(&mut self, _id: u16, _entity: &()) -> CoreResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut widgets = StagedManager::new(Widgets);
//! widgets.add(1).unwrap();
//! widgets.commit(&NullResultCallback).unwrap();
//! assert!(widgets.exists(1));
//!
//! widgets.undo(&NullResultCallback).unwrap();
//! assert!(!widgets.exists(1));
//! ```

mod command;
mod dispatch;
mod error;
mod link_bridge;
mod observer;
mod ordering;
mod registry;
mod staged;

pub use command::{report_result, BatchState, Command, CommitBatch, NullResultCallback, ResultCallback};
pub use dispatch::{CommandDispatcher, DispatchOutcome, DispatchReport, DispatchTask, ResourceClass};
pub use error::{CoreError, CoreResult, CoreResultExt, ResultCode};
pub use link_bridge::{LinkEventBridge, LinkEventSink, LinkStatusBatch};
pub use observer::{
    Notification, NotifyReport, Observer, ObserverBus, ObserverHandle, ObserverKind, Payload, Subject,
    UpdateReason,
};
pub use ordering::CommitOrder;
pub use registry::Registry;
pub use staged::{EntityFactory, StagedManager};
