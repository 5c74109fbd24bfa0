//! VLAN lifecycle and membership.
//!
//! VLAN creation and deletion are staged like every other entity. Member
//! changes are staged separately and committed after VLAN creation and
//! before VLAN deletion, so a batch never programs a member into a VLAN
//! that does not exist yet.

mod manager;
mod members;
mod types;

pub use manager::{VlanFactory, VlanManager};
pub use members::{VlanMemberAddCommand, VlanMemberAddTask, VlanMemberRemoveCommand};
pub use types::Vlan;
