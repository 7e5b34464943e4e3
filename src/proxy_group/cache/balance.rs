//! Host assignment and rebalancing inside online groups.
//!
//! Assignments are recorded as pending host-map updates; proxy host lists
//! only change when the updates are drained and persisted.

use super::{CacheState, ResolvedSettings};
use crate::proxy_group::domain::{GroupStatus, HostId, ProxyGroupId, ProxyId, ProxyStatus};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Minimum host-count distance from the average that marks a proxy as skewed.
const UNBALANCE_LIMIT: usize = 10;

/// Minimum ratio to the average that marks a proxy as skewed.
const UNBALANCE_FACTOR: usize = 2;

/// Working view of one online proxy during a reassignment.
#[derive(Debug)]
struct ProxySlot {
    proxy_id: ProxyId,
    hosts_num: usize,
    /// Hosts ordered by mapping revision, oldest first.
    movable: Vec<HostId>,
}

impl CacheState {
    /// Unmaps every host served by a proxy of the group that is not online.
    pub fn clear_offline_proxies(&mut self, group_id: ProxyGroupId) {
        let Some(group) = self.groups.get(&group_id) else {
            return;
        };
        let members = group.proxies().to_vec();

        let mut released = Vec::new();
        for proxy_id in members {
            let Some(proxy) = self.proxies.get_mut(&proxy_id) else {
                continue;
            };
            if proxy.status() == ProxyStatus::Online || proxy.hosts().is_empty() {
                continue;
            }
            debug!(%proxy_id, %group_id, hosts = proxy.hosts().len(), "releasing hosts of offline proxy");
            released.extend(proxy.take_hosts());
        }

        for host_id in released {
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.push_unassigned(host_id);
            }
            self.set_host_proxy(host_id, None);
        }
    }

    /// Checks queued online groups for balance and assigns or moves hosts.
    ///
    /// Unassigned hosts are placed immediately. A group that is merely
    /// skewed waits for its rebalance delay before hosts are moved.
    pub fn rebalance_groups(&mut self, now: DateTime<Utc>, settings: &ResolvedSettings) {
        for group_id in self.group_updates.clone() {
            let Some(group) = self.groups.get(&group_id) else {
                continue;
            };
            if group.status() != GroupStatus::Online {
                continue;
            }
            let group_settings = settings.for_group(group);

            if self.is_group_balanced(group_id, group_settings.min_online) {
                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.set_balance_deadline(None);
                    group.set_unbalanced(false);
                }
                continue;
            }

            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };
            group.set_unbalanced(true);
            if !group.unassigned().is_empty() {
                group.set_balance_deadline(Some(now));
            }

            match group.balance_deadline() {
                None => {
                    let deadline = now + group_settings.rebalance_delay();
                    debug!(%group_id, %deadline, "proxy group is unbalanced, scheduling rebalance");
                    group.set_balance_deadline(Some(deadline));
                }
                Some(deadline) if now >= deadline => {
                    if self.reassign_hosts(group_id) {
                        if let Some(group) = self.groups.get_mut(&group_id) {
                            group.set_balance_deadline(None);
                            group.set_unbalanced(false);
                        }
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn online_members(&self, group_id: ProxyGroupId) -> Vec<ProxyId> {
        self.groups.get(&group_id).map_or_else(Vec::new, |group| {
            group
                .proxies()
                .iter()
                .copied()
                .filter(|proxy_id| {
                    self.proxies
                        .get(proxy_id)
                        .is_some_and(|proxy| proxy.status() == ProxyStatus::Online)
                })
                .collect()
        })
    }

    fn host_count(&self, proxy_id: ProxyId) -> usize {
        self.proxies.get(&proxy_id).map_or(0, |proxy| proxy.hosts().len())
    }

    fn is_group_balanced(&self, group_id: ProxyGroupId, min_online: usize) -> bool {
        let Some(group) = self.groups.get(&group_id) else {
            return true;
        };
        if !group.unassigned().is_empty() {
            return false;
        }

        let online = self.online_members(group_id);
        let counts: Vec<usize> = online.iter().map(|proxy_id| self.host_count(*proxy_id)).collect();
        let crowded = group
            .proxies()
            .iter()
            .any(|proxy_id| self.host_count(*proxy_id) > 1);
        if crowded && counts.contains(&0) {
            return false;
        }

        if online.is_empty() || online.len() < min_online {
            return true;
        }
        let Some(average) = counts.iter().sum::<usize>().checked_div(online.len()) else {
            return true;
        };

        !counts.iter().any(|count| is_skewed(*count, average))
    }

    /// Moves hosts between online proxies of a group.
    ///
    /// Returns `true` when the group was fully rebalanced. Distributing
    /// unassigned hosts alone returns `false` so the balance is re-checked
    /// once the assignments land.
    fn reassign_hosts(&mut self, group_id: ProxyGroupId) -> bool {
        let mut slots: Vec<ProxySlot> = self
            .online_members(group_id)
            .into_iter()
            .map(|proxy_id| ProxySlot {
                proxy_id,
                hosts_num: self.host_count(proxy_id),
                movable: Vec::new(),
            })
            .collect();
        if slots.is_empty() {
            return false;
        }

        if self.distribute_hosts(group_id, &mut slots) {
            return false;
        }

        let hosts_num: usize = slots.iter().map(|slot| slot.hosts_num).sum();
        let hosts_min = if hosts_num > slots.len() {
            hosts_num.checked_div(slots.len()).unwrap_or(1)
        } else {
            1
        };

        let mut required = 0;
        for slot in &mut slots {
            if slot.hosts_num < hosts_min {
                required += hosts_min - slot.hosts_num;
            } else {
                slot.movable = self.hosts_by_revision(slot.proxy_id);
            }
        }

        self.unassign_excess_hosts(group_id, &mut slots, hosts_min, required);
        self.distribute_hosts(group_id, &mut slots);
        true
    }

    fn hosts_by_revision(&self, proxy_id: ProxyId) -> Vec<HostId> {
        let Some(proxy) = self.proxies.get(&proxy_id) else {
            return Vec::new();
        };
        let mut hosts: Vec<HostId> = proxy.hosts().iter().copied().collect();
        hosts.sort_by_key(|host_id| {
            self.hostmap
                .get(host_id)
                .map(|mapping| mapping.revision)
                .unwrap_or_default()
        });
        hosts
    }

    /// Unassigns the most recently mapped hosts from the most loaded
    /// proxies until `required` hosts are free or no proxy exceeds `limit`.
    fn unassign_excess_hosts(
        &mut self,
        group_id: ProxyGroupId,
        slots: &mut [ProxySlot],
        limit: usize,
        required: usize,
    ) {
        slots.sort_by(|left, right| right.hosts_num.cmp(&left.hosts_num));

        while self.unassigned_count(group_id) < required {
            let Some(level) = slots
                .first()
                .and_then(|busiest| busiest.hosts_num.checked_sub(1))
            else {
                return;
            };
            if limit > level {
                return;
            }

            let mut progressed = false;
            for slot in slots.iter_mut() {
                if self.unassigned_count(group_id) >= required || level >= slot.hosts_num {
                    break;
                }
                let Some(host_id) = slot.movable.pop() else {
                    break;
                };
                if let Some(proxy) = self.proxies.get_mut(&slot.proxy_id) {
                    proxy.detach_host(host_id);
                }
                if let Some(group) = self.groups.get_mut(&group_id) {
                    group.push_unassigned(host_id);
                }
                self.set_host_proxy(host_id, None);
                slot.hosts_num -= 1;
                progressed = true;
            }
            if !progressed {
                return;
            }
        }
    }

    /// Assigns unassigned hosts to the least loaded proxies first.
    ///
    /// Returns `false` when there was nothing to assign.
    fn distribute_hosts(&mut self, group_id: ProxyGroupId, slots: &mut [ProxySlot]) -> bool {
        if self.unassigned_count(group_id) == 0 || slots.is_empty() {
            return false;
        }
        slots.sort_by_key(|slot| slot.hosts_num);

        while self.unassigned_count(group_id) > 0 {
            let Some(level) = slots.first().map(|lightest| lightest.hosts_num + 1) else {
                break;
            };
            for slot in slots.iter_mut() {
                if level <= slot.hosts_num {
                    break;
                }
                let Some(host_id) = self
                    .groups
                    .get_mut(&group_id)
                    .and_then(|group| group.pop_unassigned())
                else {
                    break;
                };
                slot.hosts_num += 1;
                self.set_host_proxy(host_id, Some(slot.proxy_id));
            }
        }
        true
    }

    fn unassigned_count(&self, group_id: ProxyGroupId) -> usize {
        self.groups
            .get(&group_id)
            .map_or(0, |group| group.unassigned().len())
    }
}

/// Returns whether a host count strays from the average by at least
/// [`UNBALANCE_LIMIT`] hosts and a factor of [`UNBALANCE_FACTOR`].
fn is_skewed(count: usize, average: usize) -> bool {
    let above = count.saturating_sub(average) >= UNBALANCE_LIMIT
        && count
            .checked_div(average)
            .is_some_and(|ratio| ratio >= UNBALANCE_FACTOR);
    let below = average.saturating_sub(count) >= UNBALANCE_LIMIT
        && average
            .checked_div(count)
            .is_some_and(|ratio| ratio >= UNBALANCE_FACTOR);
    above || below
}
