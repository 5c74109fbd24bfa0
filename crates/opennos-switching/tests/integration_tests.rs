//! End-to-end tests of the switching core on the simulated ASIC.
//!
//! Each test drives the public [`Switching`] facade the way the daemon does:
//! stage, commit, fire driver link events, run loop turns.

use opennos_core::{
    CoreError, CoreResult, Notification, NullResultCallback, Observer, ObserverKind, Payload,
    ResultCode, Subject, UpdateReason,
};
use opennos_hal::{EntityKind, HwCall, HwOp, HwStatus, PortMapping, SimulatedAsic};
use opennos_switching::ports::PortSettingExecutor;
use opennos_switching::{Switching, SwitchingConfig};
use opennos_types::{
    HwPortId, LagId, PortId, PortSpeed, StpId, StpPortState, TaggingMode, VlanId,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(5);

fn switching(ports: u16) -> (Arc<SimulatedAsic>, Switching) {
    let asic = Arc::new(SimulatedAsic::new(PortMapping::identity(ports)));
    let mut config = SwitchingConfig::default();
    config.asic.max_ports = ports;
    let mut sw = Switching::new(asic.clone(), config);
    sw.init(&NullResultCallback).expect("init");
    (asic, sw)
}

fn p(id: u16) -> PortId {
    PortId::new(id)
}

fn vid(id: u16) -> VlanId {
    VlanId::new(id).unwrap()
}

fn ids(sw: &Switching) -> BTreeSet<PortId> {
    sw.ports().staged().committed_ids()
}

/// Records every notification it is handed.
struct Recorder {
    kind: ObserverKind,
    interests: Vec<UpdateReason>,
    seen: Vec<Notification>,
}

impl Recorder {
    fn shared(kind: u16, interests: &[UpdateReason]) -> Rc<RefCell<Recorder>> {
        Rc::new(RefCell::new(Recorder {
            kind: ObserverKind::new(kind),
            interests: interests.to_vec(),
            seen: Vec::new(),
        }))
    }

    fn reasons(&self) -> Vec<UpdateReason> {
        self.seen.iter().map(|n| n.reason).collect()
    }
}

impl Observer for Recorder {
    fn kind(&self) -> ObserverKind {
        self.kind
    }

    fn interests(&self) -> &[UpdateReason] {
        &self.interests
    }

    fn update(&mut self, notification: &Notification) -> CoreResult<()> {
        self.seen.push(notification.clone());
        Ok(())
    }
}

#[test]
fn test_add_remove_and_undo_scenario() {
    let (_asic, mut sw) = switching(8);
    sw.add_port(p(1)).unwrap();
    sw.add_port(p(2)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.add_port(p(3)).unwrap();
    sw.remove_port(p(1)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    assert_eq!(ids(&sw), BTreeSet::from([p(2), p(3)]));
    {
        let ports = sw.ports();
        assert_eq!(*ports.staged().memento_added(), BTreeSet::from([p(3)]));
        assert_eq!(*ports.staged().memento_removed(), BTreeSet::from([p(1)]));
    }

    sw.undo(&NullResultCallback).unwrap();
    assert_eq!(ids(&sw), BTreeSet::from([p(1), p(2)]));
    assert!(sw.ports().port(p(1)).unwrap().is_created());
}

#[test]
fn test_staging_errors() {
    let (_asic, mut sw) = switching(8);
    assert_eq!(sw.remove_port(p(4)).unwrap_err(), CoreError::PortNotExists(p(4)));

    // the removal cancels the staged creation, then finds nothing committed
    sw.add_port(p(4)).unwrap();
    assert_eq!(sw.remove_port(p(4)).unwrap_err(), CoreError::PortNotExists(p(4)));
    assert!(!sw.has_pending());
    sw.commit(&NullResultCallback).unwrap();
    assert!(ids(&sw).is_empty());

    sw.add_port(p(4)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert_eq!(sw.add_port(p(4)).unwrap_err().code(), ResultCode::AlreadyExists);
}

#[test]
fn test_vlan_created_before_members_are_added() {
    let (asic, mut sw) = switching(8);
    sw.add_port(p(1)).unwrap();
    sw.add_port(p(2)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    asic.clear_calls();

    sw.add_vlan_member(vid(10), p(1), TaggingMode::Untagged)
        .unwrap_err();
    sw.add_vlan(vid(10)).unwrap();
    sw.add_vlan_member(vid(10), p(1), TaggingMode::Untagged)
        .unwrap();
    sw.add_vlan_member(vid(10), p(2), TaggingMode::Tagged)
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();

    let calls = asic.calls();
    let created = calls
        .iter()
        .position(|call| matches!(call, HwCall::CreateHandle { kind: EntityKind::Vlan, .. }))
        .expect("vlan created");
    let first_member = calls
        .iter()
        .position(|call| matches!(call, HwCall::AddVlanMember { .. }))
        .expect("member added");
    assert!(created < first_member);

    let vlans = sw.vlans();
    let vlan = vlans.vlan(vid(10)).unwrap();
    assert_eq!(vlan.untagged_ports(), vec![p(1)]);
    assert_eq!(vlan.tagged_ports(), vec![p(2)]);
    assert_eq!(
        asic.vlan_members(vlan.handle()),
        BTreeMap::from([
            (HwPortId::new(1), TaggingMode::Untagged),
            (HwPortId::new(2), TaggingMode::Tagged),
        ])
    );
}

#[test]
fn test_failed_batch_rolls_back_everything() {
    let (asic, mut sw) = switching(8);
    sw.add_vlan(vid(20)).unwrap();
    sw.add_port(p(1)).unwrap();
    sw.add_vlan_member(vid(20), p(1), TaggingMode::Tagged)
        .unwrap();
    asic.fail_next(HwOp::AddVlanMember, HwStatus::Full);

    let codes = RefCell::new(Vec::new());
    let callback = |code: ResultCode, _: &str| codes.borrow_mut().push(code);
    let err = sw.commit(&callback).unwrap_err();

    assert_eq!(err.code(), ResultCode::Fail);
    assert_eq!(*codes.borrow(), vec![ResultCode::Fail]);
    assert!(!sw.vlans().exists(vid(20)));
    assert!(ids(&sw).is_empty());
    assert!(asic.live_ids(EntityKind::Vlan).is_empty());
    assert!(asic.live_ids(EntityKind::Port).is_empty());
    assert!(!sw.has_pending());
    assert!(!sw.can_undo());
}

#[test]
fn test_setting_undo_restores_parameters() {
    let (asic, mut sw) = switching(8);
    sw.add_port(p(5)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.set_port(PortSettingExecutor::speed(p(5), PortSpeed::Gb25))
        .unwrap();
    sw.set_port(PortSettingExecutor::shutdown(p(5), false))
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert_eq!(
        sw.ports().port(p(5)).unwrap().parameters().speed,
        PortSpeed::Gb25
    );

    sw.undo(&NullResultCallback).unwrap();
    let params = *sw.ports().port(p(5)).unwrap().parameters();
    assert_eq!(params.speed, PortSpeed::Auto);
    assert!(params.shutdown);
    assert_eq!(asic.port_attributes(HwPortId::new(5)), Some(params));
}

#[test]
fn test_link_events_coalesce_into_one_batch() {
    let (asic, mut sw) = switching(8);
    let recorder = Recorder::shared(100, &[UpdateReason::LinkStatusUpdate]);
    sw.context().bus.register(Subject::LinkScan, recorder.clone());

    asic.fire_link_event(HwPortId::new(1), true);
    asic.fire_link_event(HwPortId::new(1), false);
    asic.fire_link_event(HwPortId::new(1), true);

    let report = sw.run_once(TICK);
    assert!(report.link.is_some());
    assert!(sw.run_once(TICK).link.is_none());

    let recorded = recorder.borrow();
    let seen = &recorded.seen;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload, Payload::LinkStatus(BTreeMap::from([(p(1), true)])));
    // retained until the port exists
    assert_eq!(sw.ports().link_status(p(1)), Some(true));
}

#[test]
fn test_observer_only_gets_its_interests() {
    let (_asic, mut sw) = switching(8);
    let recorder = Recorder::shared(101, &[UpdateReason::LinkStatusUpdate]);
    sw.context().bus.register(Subject::Vlans, recorder.clone());

    sw.add_vlan(vid(30)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    sw.remove_vlan(vid(30)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    assert!(recorder.borrow().seen.is_empty());
}

#[test]
fn test_port_operability_follows_link_and_shutdown() {
    let (asic, mut sw) = switching(8);
    let recorder = Recorder::shared(102, &[UpdateReason::PortUp, UpdateReason::PortDown]);
    sw.context().bus.register(Subject::Ports, recorder.clone());

    // link reported before the port exists is applied on creation
    asic.fire_link_event(HwPortId::new(2), true);
    sw.run_once(TICK);
    sw.add_port(p(2)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert!(sw.ports().port(p(2)).unwrap().is_link_up());
    assert!(!sw.ports().port(p(2)).unwrap().is_operable());

    sw.set_port(PortSettingExecutor::shutdown(p(2), false))
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert!(sw.ports().port(p(2)).unwrap().is_operable());

    asic.fire_link_event(HwPortId::new(2), false);
    sw.run_once(TICK);
    assert!(!sw.ports().port(p(2)).unwrap().is_operable());

    assert_eq!(
        recorder.borrow().reasons(),
        vec![UpdateReason::PortUp, UpdateReason::PortDown]
    );
}

#[test]
fn test_link_down_flushes_fdb() {
    let (asic, mut sw) = switching(8);
    sw.add_port(p(3)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    asic.fire_link_event(HwPortId::new(3), false);
    let report = sw.run_once(TICK);

    assert_eq!(report.dispatch.executed(), 1);
    assert_eq!(asic.fdb_flushes(), vec![HwPortId::new(3)]);
    assert!(sw.context().dispatcher.is_idle());
}

#[test]
fn test_lag_follows_member_operability() {
    let (asic, mut sw) = switching(8);
    let recorder = Recorder::shared(103, &[UpdateReason::LagUp, UpdateReason::LagDown]);
    sw.context().bus.register(Subject::Lags, recorder.clone());

    let lag = LagId::new(1);
    sw.add_lag(lag).unwrap();
    sw.add_port(p(1)).unwrap();
    sw.add_port(p(2)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.enqueue_lag_member(lag, p(1)).unwrap();
    sw.enqueue_lag_member(lag, p(2)).unwrap();
    // one task per class and pass
    assert_eq!(sw.dispatch_pass().executed(), 1);
    assert_eq!(sw.dispatch_pass().executed(), 1);
    assert_eq!(sw.lags().lag(lag).unwrap().member_count(), 2);

    sw.set_port(PortSettingExecutor::shutdown(p(1), false))
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();
    asic.fire_link_event(HwPortId::new(1), true);
    sw.run_once(TICK);
    assert!(sw.lags().lag(lag).unwrap().is_up());

    asic.fire_link_event(HwPortId::new(1), false);
    sw.run_once(TICK);
    assert!(!sw.lags().lag(lag).unwrap().is_up());

    assert_eq!(
        recorder.borrow().reasons(),
        vec![UpdateReason::LagUp, UpdateReason::LagDown]
    );
    assert_eq!(
        sw.enqueue_lag_member(lag, p(1)).unwrap_err().code(),
        ResultCode::AlreadyExists
    );

    sw.remove_lag_member(lag, p(2)).unwrap();
    let lags = sw.lags();
    let members: Vec<PortId> = lags.lag(lag).unwrap().members().collect();
    assert_eq!(members, vec![p(1)]);
}

#[test]
fn test_dispatch_round_robin_across_classes() {
    let (_asic, mut sw) = switching(8);
    sw.add_lag(LagId::new(1)).unwrap();
    sw.add_vlan(vid(40)).unwrap();
    for port in 1..=3 {
        sw.add_port(p(port)).unwrap();
    }
    sw.commit(&NullResultCallback).unwrap();

    sw.enqueue_lag_member(LagId::new(1), p(1)).unwrap();
    sw.enqueue_lag_member(LagId::new(1), p(2)).unwrap();
    sw.enqueue_vlan_member(vid(40), p(3), TaggingMode::Untagged)
        .unwrap();

    let first = sw.dispatch_pass();
    assert_eq!(first.executed(), 2);
    let mut classes = first.classes();
    classes.sort();
    assert_eq!(
        classes,
        vec![
            opennos_core::ResourceClass::LagMemberAdd,
            opennos_core::ResourceClass::VlanMemberAdd,
        ]
    );
    assert_eq!(sw.dispatch_pass().executed(), 1);
    assert!(sw.context().dispatcher.is_idle());
    assert!(sw.vlans().vlan(vid(40)).unwrap().is_member(p(3)));
}

#[test]
fn test_vlan_destroy_unmaps_stp() {
    let (asic, mut sw) = switching(8);
    sw.add_vlan(vid(50)).unwrap();
    sw.add_stp(StpId::new(1)).unwrap();
    sw.add_port(p(6)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.map_stp_vlan(StpId::new(1), vid(50)).unwrap();
    assert_eq!(sw.stps().instance_of(vid(50)), Some(StpId::new(1)));
    assert_eq!(
        sw.map_stp_vlan(StpId::new(1), vid(51)).unwrap_err(),
        CoreError::VlanNotExists(vid(51))
    );

    let previous = sw
        .set_stp_port_state(StpId::new(1), p(6), StpPortState::Forwarding)
        .unwrap();
    assert_eq!(previous, StpPortState::Blocking);
    let handle = sw.stps().instance(StpId::new(1)).unwrap().handle();
    assert_eq!(
        asic.stp_port_state(handle, HwPortId::new(6)),
        Some(StpPortState::Forwarding)
    );

    sw.remove_vlan(vid(50)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert_eq!(sw.stps().instance_of(vid(50)), None);
}

#[test]
fn test_member_removal_before_vlan_delete_is_undoable() {
    let (asic, mut sw) = switching(8);
    sw.add_vlan(vid(60)).unwrap();
    sw.add_port(p(1)).unwrap();
    sw.add_vlan_member(vid(60), p(1), TaggingMode::Tagged)
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.remove_vlan_member(vid(60), p(1)).unwrap();
    sw.remove_vlan(vid(60)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    assert!(!sw.vlans().exists(vid(60)));

    sw.undo(&NullResultCallback).unwrap();
    let vlans = sw.vlans();
    let vlan = vlans.vlan(vid(60)).unwrap();
    assert_eq!(vlan.member_mode(p(1)), Some(TaggingMode::Tagged));
    assert_eq!(
        asic.vlan_members(vlan.handle()),
        BTreeMap::from([(HwPortId::new(1), TaggingMode::Tagged)])
    );
}

#[test]
fn test_port_delete_detaches_memberships() {
    let (asic, mut sw) = switching(8);
    let lag = LagId::new(1);
    sw.add_vlan(vid(10)).unwrap();
    sw.add_lag(lag).unwrap();
    sw.add_port(p(1)).unwrap();
    sw.add_port(p(2)).unwrap();
    sw.add_vlan_member(vid(10), p(1), TaggingMode::Tagged)
        .unwrap();
    sw.add_vlan_member(vid(10), p(2), TaggingMode::Untagged)
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();
    sw.enqueue_lag_member(lag, p(1)).unwrap();
    sw.dispatch_pass();
    let vlan_handle = sw.vlans().vlan(vid(10)).unwrap().handle();
    let lag_handle = sw.lags().lag(lag).unwrap().handle();
    asic.clear_calls();

    sw.remove_port(p(1)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    assert!(!sw.ports().exists(p(1)));
    assert!(!sw.vlans().vlan(vid(10)).unwrap().is_member(p(1)));
    assert_eq!(
        asic.vlan_members(vlan_handle),
        BTreeMap::from([(HwPortId::new(2), TaggingMode::Untagged)])
    );
    assert_eq!(sw.lags().lag_of(p(1)), None);
    assert!(asic.lag_members(lag_handle).is_empty());

    // memberships go before the port does
    let calls = asic.calls();
    let step = |wanted: fn(&HwCall) -> bool| calls.iter().position(wanted).expect("call made");
    let port_gone = step(|call| matches!(call, HwCall::DestroyHandle { kind: EntityKind::Port, .. }));
    assert!(step(|call| matches!(call, HwCall::RemoveVlanMember { .. })) < port_gone);
    assert!(step(|call| matches!(call, HwCall::RemoveLagMember { .. })) < port_gone);

    sw.undo(&NullResultCallback).unwrap();
    assert!(sw.ports().exists(p(1)));
    assert_eq!(
        sw.vlans().vlan(vid(10)).unwrap().member_mode(p(1)),
        Some(TaggingMode::Tagged)
    );
    assert_eq!(sw.lags().lag_of(p(1)), Some(lag));
    assert_eq!(
        asic.lag_members(lag_handle),
        BTreeSet::from([HwPortId::new(1)])
    );

    // delete again, then bring the port back as a fresh member
    sw.remove_port(p(1)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    sw.add_port(p(1)).unwrap();
    sw.commit(&NullResultCallback).unwrap();
    sw.add_vlan_member(vid(10), p(1), TaggingMode::Tagged)
        .unwrap();
    sw.commit(&NullResultCallback).unwrap();
    sw.enqueue_lag_member(lag, p(1)).unwrap();
    assert_eq!(sw.dispatch_pass().failures().count(), 0);
    assert_eq!(
        asic.vlan_members(vlan_handle),
        BTreeMap::from([
            (HwPortId::new(1), TaggingMode::Tagged),
            (HwPortId::new(2), TaggingMode::Untagged),
        ])
    );
    assert_eq!(sw.lags().lag_of(p(1)), Some(lag));
}

#[test]
fn test_port_delete_drops_its_staged_vlan_members() {
    let (asic, mut sw) = switching(8);
    sw.add_vlan(vid(30)).unwrap();
    sw.add_port(p(3)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.add_vlan_member(vid(30), p(3), TaggingMode::Untagged)
        .unwrap();
    sw.remove_port(p(3)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    assert!(!sw.ports().exists(p(3)));
    let vlans = sw.vlans();
    let vlan = vlans.vlan(vid(30)).unwrap();
    assert!(!vlan.is_member(p(3)));
    assert!(asic.vlan_members(vlan.handle()).is_empty());
}

#[test]
fn test_cancelled_vlan_keeps_other_staged_work() {
    let (_asic, mut sw) = switching(8);
    sw.add_port(p(1)).unwrap();
    sw.commit(&NullResultCallback).unwrap();

    sw.add_port(p(2)).unwrap();
    sw.add_vlan(vid(10)).unwrap();
    sw.add_vlan_member(vid(10), p(1), TaggingMode::Tagged)
        .unwrap();
    assert_eq!(
        sw.remove_vlan(vid(10)).unwrap_err(),
        CoreError::VlanNotExists(vid(10))
    );

    assert!(sw.has_pending());
    sw.commit(&NullResultCallback).unwrap();
    assert!(sw.ports().exists(p(2)));
    assert!(!sw.vlans().exists(vid(10)));
    assert!(sw.vlans().vlans_of(p(1)).is_empty());
}
