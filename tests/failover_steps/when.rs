//! When steps for proxy group failover scenarios.

use super::world::{FailoverWorld, parse_ids};
use proxy_groups::proxy_group::domain::ProxyId;
use rstest_bdd_macros::when;

#[when("{seconds:usize} seconds pass")]
fn seconds_pass(world: &mut FailoverWorld, seconds: usize) -> Result<(), eyre::Report> {
    world.pass(seconds, &[])
}

#[when("{seconds:usize} seconds pass while proxies {ids} report")]
fn seconds_pass_with_reports(
    world: &mut FailoverWorld,
    seconds: usize,
    ids: String,
) -> Result<(), eyre::Report> {
    let reporting: Vec<ProxyId> = parse_ids(&ids).into_iter().map(ProxyId::new).collect();
    world.pass(seconds, &reporting)
}

#[when("{seconds:usize} seconds pass while proxy {proxy:u64} reports")]
fn seconds_pass_with_one_report(
    world: &mut FailoverWorld,
    seconds: usize,
    proxy: u64,
) -> Result<(), eyre::Report> {
    world.pass(seconds, &[ProxyId::new(proxy)])
}
