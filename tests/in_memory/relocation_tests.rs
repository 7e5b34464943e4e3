//! Relocations delivered to the running update service.

use super::helpers::{GROUP, Harness, seeded_store, wait_until};
use crate::test_helpers::group_record;
use proxy_groups::ipc::IpcMessage;
use proxy_groups::proxy_group::domain::{HostId, ObjectMove, ProxyGroupId, ProxyId};
use rstest::rstest;
use std::time::Duration;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const OTHER_GROUP: ProxyGroupId = ProxyGroupId::new(2);

fn two_group_harness() -> eyre::Result<Harness> {
    let store = seeded_store("1", &[1, 2], [101])?;
    store.upsert_group(group_record(OTHER_GROUP.value(), "60", "1"))?;
    Ok(Harness::start(store)?)
}

#[rstest]
fn host_moves_reach_the_cache() -> eyre::Result<()> {
    let harness = two_group_harness()?;

    harness.notifier.notify(IpcMessage::host_group_update(&[ObjectMove {
        object_id: HostId::new(101),
        source: Some(GROUP),
        destination: Some(OTHER_GROUP),
    }]))?;

    let cache = harness.manager.cache();
    assert!(wait_until(DELIVERY_TIMEOUT, || {
        cache.lock().host_group(HostId::new(101)) == Some(OTHER_GROUP)
    }));
    let state = cache.lock();
    assert!(state.group(GROUP).is_some_and(|group| group.hosts().is_empty()));
    assert!(state.queued_groups().contains(&OTHER_GROUP));
    drop(state);
    harness.shutdown()
}

#[rstest]
fn proxy_moves_reach_the_cache() -> eyre::Result<()> {
    let harness = two_group_harness()?;

    harness.notifier.notify(IpcMessage::proxy_group_update(&[ObjectMove {
        object_id: ProxyId::new(2),
        source: Some(GROUP),
        destination: Some(OTHER_GROUP),
    }]))?;

    let cache = harness.manager.cache();
    assert!(wait_until(DELIVERY_TIMEOUT, || {
        cache
            .lock()
            .proxy(ProxyId::new(2))
            .and_then(|proxy| proxy.group())
            == Some(OTHER_GROUP)
    }));
    let state = cache.lock();
    assert_eq!(
        state.group(GROUP).map(|group| group.proxies().to_vec()),
        Some(vec![ProxyId::new(1)])
    );
    drop(state);
    harness.shutdown()
}

#[rstest]
fn removing_a_host_from_every_group_forgets_it() -> eyre::Result<()> {
    let harness = two_group_harness()?;

    harness.notifier.notify(IpcMessage::host_group_update(&[ObjectMove {
        object_id: HostId::new(101),
        source: Some(GROUP),
        destination: None,
    }]))?;

    let cache = harness.manager.cache();
    assert!(wait_until(DELIVERY_TIMEOUT, || {
        cache.lock().host_group(HostId::new(101)).is_none()
    }));
    harness.shutdown()
}
