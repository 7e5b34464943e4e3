//! Store behaviour against a real `PostgreSQL` schema.

use super::helpers::{BoxError, PostgresCluster, StoreContext, postgres_cluster};
use chrono::{TimeZone, Utc};
use proxy_groups::proxy_group::domain::{
    FlushBatch, GroupStatus, HostId, HostProxyMapping, MapRevision, ProxyGroupId, ProxyId,
    ProxyStatus, StatusUpdate,
};
use proxy_groups::proxy_group::ports::{ProxyGroupStore, TopologySource};
use rstest::rstest;

fn mapping_batch(mappings: &[(u64, u64)], revision: u64) -> FlushBatch {
    FlushBatch {
        new_mappings: mappings
            .iter()
            .map(|&(host, proxy)| {
                HostProxyMapping::pending(
                    HostId::new(host),
                    ProxyId::new(proxy),
                    MapRevision::new(revision),
                )
            })
            .collect(),
        touched_groups: vec![ProxyGroupId::new(1)],
        revision: MapRevision::new(revision),
        ..FlushBatch::default()
    }
}

#[rstest]
fn empty_schema_reports_revision_zero(postgres_cluster: PostgresCluster) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::create(cluster)?;

    assert_eq!(context.store.load_hostmap_revision()?, MapRevision::ZERO);
    assert!(context.store.load_mappings()?.is_empty());
    assert!(context.store.fetch_groups()?.is_empty());
    Ok(())
}

#[rstest]
fn topology_reads_groups_proxies_and_last_access(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;

    let groups = context.store.fetch_groups()?;
    assert_eq!(groups.len(), 1);
    let group = groups.first().ok_or("group missing")?;
    assert_eq!(group.id, ProxyGroupId::new(1));
    assert_eq!(group.failover_delay, "60");
    assert_eq!(group.min_online, "{$MIN_ONLINE}");

    let proxies = context.store.fetch_proxies()?;
    let summary: Vec<_> = proxies
        .iter()
        .map(|proxy| (proxy.id.value(), proxy.group.map(ProxyGroupId::value), proxy.last_access))
        .collect();
    let contacted = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).single();
    assert_eq!(
        summary,
        vec![(10, Some(1), contacted), (11, Some(1), None), (12, None, None)]
    );
    Ok(())
}

#[rstest]
fn host_groups_skip_unassigned_hosts(postgres_cluster: PostgresCluster) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;

    let hosts: Vec<_> = context
        .store
        .load_host_groups()?
        .into_iter()
        .map(|record| (record.host_id.value(), record.group_id.value()))
        .collect();

    assert_eq!(hosts, vec![(100, 1), (101, 1)]);
    Ok(())
}

#[rstest]
fn flush_persists_statuses_mappings_and_revision(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    let batch = FlushBatch {
        group_updates: vec![StatusUpdate {
            id: ProxyGroupId::new(1),
            status: GroupStatus::Online,
        }],
        proxy_updates: vec![
            StatusUpdate {
                id: ProxyId::new(10),
                status: ProxyStatus::Online,
            },
            StatusUpdate {
                id: ProxyId::new(11),
                status: ProxyStatus::Offline,
            },
        ],
        ..mapping_batch(&[(100, 10), (101, 10)], 1)
    };

    let outcome = context.store.flush(&batch)?;

    assert_eq!(outcome.inserted.len(), 2);
    assert_eq!(outcome.skipped(), 0);
    assert!(outcome.inserted.iter().all(|mapping| mapping.row_id.is_some()));
    assert_eq!(context.store.load_mappings()?, outcome.inserted);
    assert_eq!(context.store.load_hostmap_revision()?, MapRevision::new(1));
    assert_eq!(
        context.state_of("proxy_group", "proxy_groupid", 1)?,
        GroupStatus::Online.code()
    );
    assert_eq!(context.state_of("proxy", "proxyid", 10)?, ProxyStatus::Online.code());
    assert_eq!(context.state_of("proxy", "proxyid", 11)?, ProxyStatus::Offline.code());
    Ok(())
}

#[rstest]
fn mappings_for_vanished_referents_are_skipped(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;

    let outcome = context
        .store
        .flush(&mapping_batch(&[(100, 10), (999, 10), (101, 77)], 1))?;

    let host_ids = |mappings: &[HostProxyMapping]| -> Vec<u64> {
        mappings.iter().map(|mapping| mapping.host_id.value()).collect()
    };
    assert_eq!(host_ids(&outcome.inserted), vec![100]);
    assert_eq!(host_ids(&outcome.vanished_hosts), vec![999]);
    assert_eq!(host_ids(&outcome.vanished_proxies), vec![101]);
    assert_eq!(context.store.load_mappings()?.len(), 1);
    Ok(())
}

#[rstest]
fn batches_writing_no_rows_keep_the_stored_revision(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    context.store.flush(&mapping_batch(&[(100, 10)], 2))?;

    let outcome = context.store.flush(&mapping_batch(&[(999, 10)], 3))?;

    assert!(!outcome.wrote_mappings());
    assert_eq!(context.store.load_hostmap_revision()?, MapRevision::new(2));
    Ok(())
}

#[rstest]
fn conflicting_inserts_return_the_stored_row(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    let first = context.store.flush(&mapping_batch(&[(100, 10)], 1))?;

    let second = context.store.flush(&mapping_batch(&[(100, 11), (101, 11)], 2))?;

    assert_eq!(second.conflicting, first.inserted);
    assert_eq!(second.inserted.len(), 1);
    assert_eq!(context.store.load_mappings()?.len(), 2);
    Ok(())
}

#[rstest]
fn mappings_are_moved_and_deleted_in_place(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    let first = context.store.flush(&mapping_batch(&[(100, 10), (101, 10)], 1))?;
    let [moved, removed] = first.inserted.as_slice() else {
        return Err("expected two inserted mappings".into());
    };

    let second = FlushBatch {
        modified_mappings: vec![HostProxyMapping {
            proxy_id: ProxyId::new(11),
            revision: MapRevision::new(2),
            ..*moved
        }],
        deleted_mappings: vec![*removed],
        touched_groups: vec![ProxyGroupId::new(1)],
        revision: MapRevision::new(2),
        ..FlushBatch::default()
    };
    context.store.flush(&second)?;

    let stored = context.store.load_mappings()?;
    assert_eq!(
        stored,
        vec![HostProxyMapping {
            proxy_id: ProxyId::new(11),
            revision: MapRevision::new(2),
            ..*moved
        }]
    );
    assert_eq!(context.store.load_hostmap_revision()?, MapRevision::new(2));
    Ok(())
}

#[rstest]
fn status_only_flush_leaves_revision_untouched(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    context.store.flush(&mapping_batch(&[(100, 10)], 4))?;

    context.store.flush(&FlushBatch {
        group_updates: vec![StatusUpdate {
            id: ProxyGroupId::new(1),
            status: GroupStatus::Decay,
        }],
        revision: MapRevision::new(5),
        ..FlushBatch::default()
    })?;

    assert_eq!(context.store.load_hostmap_revision()?, MapRevision::new(4));
    assert_eq!(
        context.state_of("proxy_group", "proxy_groupid", 1)?,
        GroupStatus::Decay.code()
    );
    Ok(())
}

#[rstest]
fn deleting_a_host_cascades_to_its_mapping(
    postgres_cluster: PostgresCluster,
) -> Result<(), BoxError> {
    let Some(cluster) = postgres_cluster else {
        return Ok(());
    };
    let context = StoreContext::seeded(cluster)?;
    context.store.flush(&mapping_batch(&[(100, 10), (101, 11)], 1))?;

    context.execute("DELETE FROM hosts WHERE hostid = 100;")?;

    let remaining: Vec<_> = context
        .store
        .load_mappings()?
        .into_iter()
        .map(|mapping| (mapping.host_id.value(), mapping.proxy_id.value()))
        .collect();
    assert_eq!(remaining, vec![(101, 11)]);
    Ok(())
}
