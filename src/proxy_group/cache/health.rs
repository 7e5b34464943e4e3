//! Health evaluation pass over all groups and their proxies.

use super::CacheState;
use crate::proxy_group::domain::{
    GroupSettings, GroupStatus, Proxy, ProxyCounts, ProxyGroup, ProxyGroupId, ProxyId,
    ProxyStatus, StatusChange,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Group settings resolved from their macro expressions for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    by_group: HashMap<ProxyGroupId, GroupSettings>,
}

impl ResolvedSettings {
    /// Records the resolved settings of a group.
    pub fn insert(&mut self, group_id: ProxyGroupId, settings: GroupSettings) {
        self.by_group.insert(group_id, settings);
    }

    /// Returns the settings of a group.
    ///
    /// Groups added after resolution use their unexpanded expressions.
    #[must_use]
    pub fn for_group(&self, group: &ProxyGroup) -> GroupSettings {
        self.by_group
            .get(&group.id())
            .copied()
            .unwrap_or_else(|| GroupSettings::parse(group.failover_delay(), group.min_online()))
    }
}

impl FromIterator<(ProxyGroupId, GroupSettings)> for ResolvedSettings {
    fn from_iter<T: IntoIterator<Item = (ProxyGroupId, GroupSettings)>>(iter: T) -> Self {
        Self {
            by_group: iter.into_iter().collect(),
        }
    }
}

/// Status transitions applied by one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Proxy transitions, in evaluation order.
    pub proxy_changes: Vec<(ProxyId, StatusChange<ProxyStatus>)>,
    /// Group transitions, in evaluation order.
    pub group_changes: Vec<(ProxyGroupId, StatusChange<GroupStatus>)>,
}

impl CacheState {
    /// Returns the raw failover delay and minimum-online expressions of
    /// every group, for macro resolution outside the lock.
    #[must_use]
    pub fn group_expressions(&self) -> Vec<(ProxyGroupId, String, String)> {
        self.groups
            .values()
            .map(|group| {
                (
                    group.id(),
                    group.failover_delay().to_owned(),
                    group.min_online().to_owned(),
                )
            })
            .collect()
    }

    /// Runs the proxy and group state machines, then host assignment.
    ///
    /// `check_interval` is the evaluation cadence; a proxy counts as healthy
    /// only if it would still be inside the failover window one interval
    /// from now.
    pub fn evaluate(
        &mut self,
        now: DateTime<Utc>,
        settings: &ResolvedSettings,
        check_interval: TimeDelta,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        self.update_proxy_statuses(now, settings, &mut report);
        self.update_group_statuses(now, settings, check_interval, &mut report);
        self.rebalance_groups(now, settings);
        report
    }

    fn sorted_group_ids(&self) -> Vec<ProxyGroupId> {
        let mut group_ids: Vec<ProxyGroupId> = self.groups.keys().copied().collect();
        group_ids.sort_unstable();
        group_ids
    }

    fn update_proxy_statuses(
        &mut self,
        now: DateTime<Utc>,
        settings: &ResolvedSettings,
        report: &mut EvaluationReport,
    ) {
        let startup = self.startup_time;
        for group_id in self.sorted_group_ids() {
            let Some(group) = self.groups.get(&group_id) else {
                continue;
            };
            let delay = settings.for_group(group).failover_delay;
            let members = group.proxies().to_vec();

            let mut changed = Vec::new();
            for proxy_id in members {
                let Some(proxy) = self.proxies.get_mut(&proxy_id) else {
                    continue;
                };
                if let Some(change) = proxy.evaluate_status(now, startup, delay) {
                    warn!(
                        %proxy_id,
                        %group_id,
                        "proxy \"{}\" changed status from {} to {}",
                        proxy.name(),
                        change.from,
                        change.to
                    );
                    changed.push((proxy_id, change));
                }
            }

            if changed.is_empty() {
                continue;
            }
            for (proxy_id, _) in &changed {
                self.queue_proxy_update(*proxy_id);
            }
            self.queue_group_update(group_id);
            report.proxy_changes.extend(changed);
        }
    }

    fn update_group_statuses(
        &mut self,
        now: DateTime<Utc>,
        settings: &ResolvedSettings,
        check_interval: TimeDelta,
        report: &mut EvaluationReport,
    ) {
        for group_id in self.sorted_group_ids() {
            let Some(group) = self.groups.get(&group_id) else {
                continue;
            };
            let group_settings = settings.for_group(group);
            let counts = count_proxies(
                group.proxies(),
                &self.proxies,
                now,
                group_settings.failover_delay,
                check_interval,
            );

            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };
            if let Some(change) = group.evaluate_status(counts, now, group_settings) {
                warn!(
                    %group_id,
                    "proxy group \"{}\" changed status from {} to {}",
                    group.name(),
                    change.from,
                    change.to
                );
                report.group_changes.push((group_id, change));
                self.queue_group_update(group_id);
            }

            let online = self
                .groups
                .get(&group_id)
                .is_some_and(|evaluated| evaluated.status() == GroupStatus::Online);
            if online {
                self.clear_offline_proxies(group_id);
            }
        }
    }
}

fn count_proxies(
    members: &[ProxyId],
    proxies: &HashMap<ProxyId, Proxy>,
    now: DateTime<Utc>,
    delay: TimeDelta,
    check_interval: TimeDelta,
) -> ProxyCounts {
    let mut counts = ProxyCounts {
        total: members.len(),
        ..ProxyCounts::default()
    };
    for proxy in members.iter().filter_map(|proxy_id| proxies.get(proxy_id)) {
        match proxy.status() {
            ProxyStatus::Online => {
                counts.online += 1;
                let fresh = proxy
                    .last_access()
                    .is_some_and(|last_access| now - last_access + check_interval < delay);
                if fresh {
                    counts.healthy += 1;
                }
            }
            ProxyStatus::Offline => counts.offline += 1,
            ProxyStatus::Unknown => {}
        }
    }
    counts
}
