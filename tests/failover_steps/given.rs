//! Given steps for proxy group failover scenarios.

use super::world::{FailoverWorld, GROUP, parse_ids};
use crate::test_helpers::{group_record, proxy_record};
use proxy_groups::proxy_group::domain::HostId;
use rstest_bdd_macros::given;

#[given(r#"a proxy group with failover delay "{delay}" and minimum online "{min_online}""#)]
fn proxy_group(
    world: &mut FailoverWorld,
    delay: String,
    min_online: String,
) -> Result<(), eyre::Report> {
    world
        .store
        .upsert_group(group_record(GROUP.value(), &delay, &min_online))?;
    Ok(())
}

#[given("proxies {ids} in the group")]
fn proxies_in_group(world: &mut FailoverWorld, ids: String) -> Result<(), eyre::Report> {
    for proxy_id in parse_ids(&ids) {
        world
            .store
            .upsert_proxy(proxy_record(proxy_id, Some(GROUP.value())))?;
    }
    Ok(())
}

#[given("hosts {first:u64} to {last:u64} configured into the group")]
fn hosts_in_group(world: &mut FailoverWorld, first: u64, last: u64) -> Result<(), eyre::Report> {
    for host_id in first..=last {
        world.store.set_host_group(HostId::new(host_id), Some(GROUP))?;
    }
    Ok(())
}

#[given("the manager has started")]
fn manager_started(world: &mut FailoverWorld) -> Result<(), eyre::Report> {
    world.start()
}
