//! Link aggregation groups.
//!
//! LAG creation and deletion are staged. Member additions contend for the
//! trunk member table and are queued on the dispatch scheduler; removals
//! are applied directly, or staged in the commit batch when the member port
//! is being deleted. The LAG follows the operability of its members
//! and publishes `LagUp`/`LagDown` when the aggregate state flips.

mod manager;
mod types;

pub use manager::{LagFactory, LagManager, LagMemberAddTask, LagMemberRemoveCommand, LagStats};
pub use types::Lag;
