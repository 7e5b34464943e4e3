//! Host assignment inside online groups and failover between proxies.

use super::helpers::{GROUP, Harness, seeded_store};
use proxy_groups::proxy_group::domain::{GroupStatus, HostId, MapRevision, ProxyId, ProxyStatus};
use rstest::rstest;

#[rstest]
fn hosts_are_spread_once_the_group_is_online() -> eyre::Result<()> {
    let mut harness = Harness::start(seeded_store("1", &[1, 2], 101..=104)?)?;
    harness.manager.tick();

    harness.run(13, &[1, 2])?;

    assert_eq!(harness.store.group_status(GROUP)?, Some(GroupStatus::Online));
    assert_eq!(harness.stored_hosts_of(1)?, 2);
    assert_eq!(harness.stored_hosts_of(2)?, 2);
    assert_eq!(harness.store.stored_revision()?, MapRevision::new(1));

    let state = harness.manager.cache().lock();
    assert_eq!(state.group(GROUP).map(|group| group.hostmap_revision()), Some(MapRevision::new(1)));
    assert!(state.group(GROUP).is_some_and(|group| group.unassigned().is_empty()));
    assert!((101..=104).all(|host| state.mapping(HostId::new(host)).is_some()));
    drop(state);
    harness.shutdown()
}

#[rstest]
fn hosts_of_a_failed_proxy_move_to_the_survivor() -> eyre::Result<()> {
    let mut harness = Harness::start(seeded_store("1", &[1, 2], 101..=104)?)?;
    harness.manager.tick();
    harness.run(13, &[1, 2])?;

    harness.run(11, &[1])?;
    assert_eq!(harness.stored_hosts_of(2)?, 2);

    harness.run(1, &[1])?;

    assert_eq!(harness.store.proxy_status(ProxyId::new(2))?, Some(ProxyStatus::Offline));
    assert_eq!(harness.store.group_status(GROUP)?, Some(GroupStatus::Online));
    assert_eq!(harness.stored_hosts_of(1)?, 4);
    assert_eq!(harness.store.stored_revision()?, MapRevision::new(2));
    harness.shutdown()
}

#[rstest]
fn hosts_stay_unassigned_while_the_group_lacks_quorum() -> eyre::Result<()> {
    let mut harness = Harness::start(seeded_store("2", &[1, 2], 101..=102)?)?;
    harness.manager.tick();

    harness.run(13, &[1])?;

    assert_eq!(harness.store.proxy_status(ProxyId::new(1))?, Some(ProxyStatus::Online));
    assert_eq!(harness.store.group_status(GROUP)?, Some(GroupStatus::Offline));
    assert!(harness.store.mappings()?.is_empty());
    harness.shutdown()
}
