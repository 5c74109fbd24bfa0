//! Commit ordering table.
//!
//! Every command in a mixed batch carries one of these keys. The batch
//! executes in non-decreasing key order, so a VLAN is always created before
//! ports are added to it, and member ports leave their VLANs and LAGs before
//! either the group or the port is deleted.

use std::fmt;

/// Ordering key of a commit-time command. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum CommitOrder {
    VlanCreate,
    PortCreate,
    PortInit,
    PortSet,
    LagCreate,
    StpCreate,
    FdbFlush,
    VlanAddMemberPorts,
    VlanRemoveMemberPorts,
    LagRemoveMemberPorts,
    StpDelete,
    LagDelete,
    PortDeinit,
    PortDelete,
    VlanDelete,
    #[default]
    Unordered,
}

impl CommitOrder {
    /// All keys, in execution order.
    pub const ALL: [CommitOrder; 16] = [
        CommitOrder::VlanCreate,
        CommitOrder::PortCreate,
        CommitOrder::PortInit,
        CommitOrder::PortSet,
        CommitOrder::LagCreate,
        CommitOrder::StpCreate,
        CommitOrder::FdbFlush,
        CommitOrder::VlanAddMemberPorts,
        CommitOrder::VlanRemoveMemberPorts,
        CommitOrder::LagRemoveMemberPorts,
        CommitOrder::StpDelete,
        CommitOrder::LagDelete,
        CommitOrder::PortDeinit,
        CommitOrder::PortDelete,
        CommitOrder::VlanDelete,
        CommitOrder::Unordered,
    ];

    /// Numeric priority; lower runs first.
    pub const fn priority(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitOrder::VlanCreate => "vlan-create",
            CommitOrder::PortCreate => "port-create",
            CommitOrder::PortInit => "port-init",
            CommitOrder::PortSet => "port-set",
            CommitOrder::LagCreate => "lag-create",
            CommitOrder::StpCreate => "stp-create",
            CommitOrder::FdbFlush => "fdb-flush",
            CommitOrder::VlanAddMemberPorts => "vlan-add-member-ports",
            CommitOrder::VlanRemoveMemberPorts => "vlan-remove-member-ports",
            CommitOrder::LagRemoveMemberPorts => "lag-remove-member-ports",
            CommitOrder::StpDelete => "stp-delete",
            CommitOrder::LagDelete => "lag-delete",
            CommitOrder::PortDeinit => "port-deinit",
            CommitOrder::PortDelete => "port-delete",
            CommitOrder::VlanDelete => "vlan-delete",
            CommitOrder::Unordered => "unordered",
        }
    }
}

impl fmt::Display for CommitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_is_strictly_increasing() {
        for pair in CommitOrder::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} must run before {}", pair[0], pair[1]);
            assert!(pair[0].priority() < pair[1].priority());
        }
    }

    #[test]
    fn test_dependencies() {
        assert!(CommitOrder::VlanCreate < CommitOrder::VlanAddMemberPorts);
        assert!(CommitOrder::PortCreate < CommitOrder::PortInit);
        assert!(CommitOrder::PortInit < CommitOrder::PortSet);
        assert!(CommitOrder::VlanRemoveMemberPorts < CommitOrder::VlanDelete);
        assert!(CommitOrder::VlanRemoveMemberPorts < CommitOrder::PortDelete);
        assert!(CommitOrder::LagRemoveMemberPorts < CommitOrder::LagDelete);
        assert!(CommitOrder::LagRemoveMemberPorts < CommitOrder::PortDelete);
        assert!(CommitOrder::PortDeinit < CommitOrder::PortDelete);
        assert!(CommitOrder::StpDelete < CommitOrder::VlanDelete);
    }

    #[test]
    fn test_default_is_last() {
        assert_eq!(CommitOrder::default(), CommitOrder::Unordered);
        assert_eq!(CommitOrder::ALL.iter().max(), Some(&CommitOrder::Unordered));
        assert_eq!(CommitOrder::VlanCreate.to_string(), "vlan-create");
    }
}
