//! Then steps for proxy group failover scenarios.

use super::world::{FailoverWorld, GROUP, parse_ids};
use proxy_groups::proxy_group::domain::{GroupStatus, MapRevision, ProxyId, ProxyStatus};
use rstest_bdd_macros::then;

fn stored_hosts_of(world: &FailoverWorld, proxy_id: u64) -> Result<usize, eyre::Report> {
    let mappings = world.store.mappings()?;
    Ok(mappings
        .iter()
        .filter(|mapping| mapping.proxy_id == ProxyId::new(proxy_id))
        .count())
}

#[then(r#"the group status is "{status}""#)]
fn group_status_is(world: &FailoverWorld, status: String) -> Result<(), eyre::Report> {
    let expected = GroupStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;

    let cached = world
        .manager()?
        .cache()
        .lock()
        .group(GROUP)
        .map(|group| group.status());
    let stored = world.store.group_status(GROUP)?;

    if cached != Some(expected) || stored != Some(expected) {
        return Err(eyre::eyre!(
            "expected group status {expected} at {}s, cached {cached:?}, stored {stored:?}",
            world.clock.elapsed_secs()
        ));
    }
    Ok(())
}

#[then(r#"proxy {proxy:u64} status is "{status}""#)]
fn proxy_status_is(world: &FailoverWorld, proxy: u64, status: String) -> Result<(), eyre::Report> {
    let expected = ProxyStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let proxy_id = ProxyId::new(proxy);

    let cached = world
        .manager()?
        .cache()
        .lock()
        .proxy(proxy_id)
        .map(|cached_proxy| cached_proxy.status());
    let stored = world.store.proxy_status(proxy_id)?;

    if cached != Some(expected) || stored != Some(expected) {
        return Err(eyre::eyre!(
            "expected proxy {proxy} status {expected} at {}s, cached {cached:?}, stored {stored:?}",
            world.clock.elapsed_secs()
        ));
    }
    Ok(())
}

#[then("proxies {ids} serve {count:usize} hosts each")]
fn proxies_serve_hosts_each(
    world: &FailoverWorld,
    ids: String,
    count: usize,
) -> Result<(), eyre::Report> {
    for proxy_id in parse_ids(&ids) {
        let served = stored_hosts_of(world, proxy_id)?;
        if served != count {
            return Err(eyre::eyre!(
                "expected proxy {proxy_id} to serve {count} hosts, found {served}"
            ));
        }
    }
    Ok(())
}

#[then("proxy {proxy:u64} serves {count:usize} hosts")]
fn proxy_serves_hosts(world: &FailoverWorld, proxy: u64, count: usize) -> Result<(), eyre::Report> {
    let served = stored_hosts_of(world, proxy)?;
    if served != count {
        return Err(eyre::eyre!(
            "expected proxy {proxy} to serve {count} hosts, found {served}"
        ));
    }
    Ok(())
}

#[then("the stored mapping revision is {revision:u64}")]
fn stored_revision_is(world: &FailoverWorld, revision: u64) -> Result<(), eyre::Report> {
    let stored = world.store.stored_revision()?;
    if stored != MapRevision::new(revision) {
        return Err(eyre::eyre!("expected mapping revision {revision}, found {stored}"));
    }
    Ok(())
}
