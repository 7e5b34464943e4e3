//! Proxy and group status transitions driven by contact times.

use super::helpers::{GROUP, Harness, seeded_store};
use proxy_groups::proxy_group::{
    adapters::macros::UserMacroTable,
    domain::{GroupStatus, ProxyId, ProxyStatus},
};
use rstest::rstest;

#[rstest]
fn silent_proxies_take_the_group_offline_after_startup_grace() -> eyre::Result<()> {
    let mut harness = Harness::start(seeded_store("2", &[1, 2, 3], [])?)?;
    harness.manager.tick();
    harness.run(11, &[])?;

    {
        let state = harness.manager.cache().lock();
        assert_eq!(
            state.group(GROUP).map(|group| group.status()),
            Some(GroupStatus::Recovery)
        );
        assert_eq!(
            state.proxy(ProxyId::new(1)).map(|proxy| proxy.status()),
            Some(ProxyStatus::Unknown)
        );
    }

    harness.run(1, &[])?;

    assert_eq!(harness.store.group_status(GROUP)?, Some(GroupStatus::Offline));
    for proxy_id in 1..=3 {
        assert_eq!(
            harness.store.proxy_status(ProxyId::new(proxy_id))?,
            Some(ProxyStatus::Offline)
        );
    }
    harness.shutdown()
}

#[rstest]
fn proxies_come_online_after_a_full_window_of_contact() -> eyre::Result<()> {
    let mut harness = Harness::start(seeded_store("1", &[1, 2], [])?)?;
    harness.manager.tick();

    harness.run(12, &[1, 2])?;
    assert_eq!(harness.store.proxy_status(ProxyId::new(1))?, Some(ProxyStatus::Unknown));

    harness.run(1, &[1, 2])?;
    assert_eq!(harness.store.proxy_status(ProxyId::new(1))?, Some(ProxyStatus::Online));
    assert_eq!(harness.store.proxy_status(ProxyId::new(2))?, Some(ProxyStatus::Online));
    assert_eq!(harness.store.group_status(GROUP)?, Some(GroupStatus::Online));
    harness.shutdown()
}

#[rstest]
#[case::macro_defined(UserMacroTable::new([("{$MIN_ONLINE}", "3")]), GroupStatus::Offline)]
#[case::macro_missing(UserMacroTable::default(), GroupStatus::Recovery)]
fn minimum_online_expands_user_macros(
    #[case] macros: UserMacroTable,
    #[case] expected: GroupStatus,
) -> eyre::Result<()> {
    let store = seeded_store("{$MIN_ONLINE}", &[1, 2, 3], [])?;
    let mut harness = Harness::start_with_macros(store, macros)?;
    harness.manager.tick();

    harness.run(12, &[1, 2])?;

    assert_eq!(
        harness.manager.cache().lock().group(GROUP).map(|group| group.status()),
        Some(expected)
    );
    harness.shutdown()
}
