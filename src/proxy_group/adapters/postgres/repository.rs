//! `PostgreSQL` store implementation for proxy group state and mappings.

use super::{
    models::{GroupRow, HostProxyRow, NewHostProxyRow, ProxyAccessRow, ProxyRow},
    schema::{host_proxy, hosts, ids, proxy, proxy_group, proxy_rtdata},
};
use crate::proxy_group::{
    domain::{
        FlushBatch, FlushOutcome, GroupRecord, GroupStatus, HostGroupRecord, HostId,
        HostProxyId, HostProxyMapping, MapRevision, ProxyGroupDomainError, ProxyGroupId, ProxyId,
        ProxyRecord, ProxyStatus, StatusUpdate,
    },
    ports::{ProxyGroupStore, StoreError, StoreResult, TopologySource},
};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::upsert::excluded;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// `PostgreSQL` connection pool type used by proxy group adapters.
pub type ProxyGroupPgPool = Pool<ConnectionManager<PgConnection>>;

const REVISION_TABLE: &str = "host_proxy";
const REVISION_FIELD: &str = "revision";

/// `PostgreSQL`-backed proxy group store and topology source.
#[derive(Debug, Clone)]
pub struct PostgresProxyGroupStore {
    pool: ProxyGroupPgPool,
}

impl PostgresProxyGroupStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: ProxyGroupPgPool) -> Self {
        Self { pool }
    }

    fn connection(&self) -> StoreResult<PooledConnection<ConnectionManager<PgConnection>>> {
        self.pool.get().map_err(StoreError::unavailable)
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        let connection_lost = matches!(
            err,
            DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
                | DieselError::BrokenTransactionManager
        );
        if connection_lost {
            Self::unavailable(err)
        } else {
            Self::persistence(err)
        }
    }
}

impl ProxyGroupStore for PostgresProxyGroupStore {
    fn load_hostmap_revision(&self) -> StoreResult<MapRevision> {
        let mut connection = self.connection()?;
        let stored = ids::table
            .filter(ids::table_name.eq(REVISION_TABLE))
            .filter(ids::field_name.eq(REVISION_FIELD))
            .select(ids::nextid)
            .first::<i64>(&mut connection)
            .optional()?;
        stored.map_or(Ok(MapRevision::ZERO), decode_revision)
    }

    fn load_host_groups(&self) -> StoreResult<Vec<HostGroupRecord>> {
        let mut connection = self.connection()?;
        let rows = hosts::table
            .filter(hosts::proxy_groupid.is_not_null())
            .select((hosts::hostid, hosts::proxy_groupid))
            .order(hosts::hostid)
            .load::<(i64, Option<i64>)>(&mut connection)?;

        rows.into_iter()
            .filter_map(|(host, group)| group.map(|group_id| (host, group_id)))
            .map(|(host, group)| {
                Ok(HostGroupRecord {
                    host_id: decode_id("hosts.hostid", host, HostId::from_raw)?,
                    group_id: decode_id("hosts.proxy_groupid", group, ProxyGroupId::from_raw)?,
                })
            })
            .collect()
    }

    fn load_mappings(&self) -> StoreResult<Vec<HostProxyMapping>> {
        let mut connection = self.connection()?;
        host_proxy::table
            .select(HostProxyRow::as_select())
            .order(host_proxy::hostproxyid)
            .load::<HostProxyRow>(&mut connection)?
            .into_iter()
            .map(row_to_mapping)
            .collect()
    }

    fn flush(&self, batch: &FlushBatch) -> StoreResult<FlushOutcome> {
        let mut connection = self.connection()?;
        connection.transaction::<_, StoreError, _>(|transaction| {
            write_group_statuses(transaction, &batch.group_updates)?;
            write_proxy_statuses(transaction, &batch.proxy_updates)?;
            let rewritten = write_modified_mappings(transaction, &batch.modified_mappings)?
                + delete_mappings(transaction, &batch.deleted_mappings)?;
            let outcome = FlushOutcome {
                rewritten_rows: rewritten,
                ..insert_new_mappings(transaction, &batch.new_mappings)?
            };
            if outcome.wrote_mappings() {
                write_revision(transaction, batch.revision)?;
            }
            debug!(
                inserted = outcome.inserted.len(),
                rewritten = outcome.rewritten_rows,
                skipped = outcome.skipped(),
                revision = %batch.revision,
                "flushed proxy group batch"
            );
            Ok(outcome)
        })
    }
}

impl TopologySource for PostgresProxyGroupStore {
    fn fetch_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        let mut connection = self.connection()?;
        proxy_group::table
            .select(GroupRow::as_select())
            .order(proxy_group::proxy_groupid)
            .load::<GroupRow>(&mut connection)?
            .into_iter()
            .map(|row| {
                Ok(GroupRecord {
                    id: decode_id("proxy_group.proxy_groupid", row.proxy_groupid, ProxyGroupId::from_raw)?,
                    name: row.name,
                    failover_delay: row.failover_delay,
                    min_online: row.min_online,
                })
            })
            .collect()
    }

    fn fetch_proxies(&self) -> StoreResult<Vec<ProxyRecord>> {
        let mut connection = self.connection()?;
        let rows = proxy::table
            .select(ProxyRow::as_select())
            .order(proxy::proxyid)
            .load::<ProxyRow>(&mut connection)?;
        let last_access: HashMap<i64, _> = proxy_rtdata::table
            .select(ProxyAccessRow::as_select())
            .load::<ProxyAccessRow>(&mut connection)?
            .into_iter()
            .map(|row| (row.proxyid, row.lastaccess))
            .collect();

        rows.into_iter()
            .map(|row| {
                let group = row
                    .proxy_groupid
                    .map(|raw| decode_id("proxy.proxy_groupid", raw, ProxyGroupId::from_raw))
                    .transpose()?;
                Ok(ProxyRecord {
                    id: decode_id("proxy.proxyid", row.proxyid, ProxyId::from_raw)?,
                    last_access: last_access.get(&row.proxyid).copied().flatten(),
                    name: row.name,
                    group,
                })
            })
            .collect()
    }
}

fn decode_id<I>(column: &'static str, value: i64, build: fn(u64) -> Option<I>) -> StoreResult<I> {
    u64::try_from(value).ok().and_then(build).ok_or_else(|| {
        StoreError::invalid_persisted_data(
            ProxyGroupDomainError::InvalidIdentifier { column, value }.to_string(),
        )
    })
}

fn encode_id(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(StoreError::persistence)
}

fn decode_revision(value: i64) -> StoreResult<MapRevision> {
    u64::try_from(value)
        .map(MapRevision::new)
        .map_err(|_| StoreError::invalid_persisted_data(format!("negative mapping revision {value}")))
}

fn encode_revision(revision: MapRevision) -> StoreResult<i64> {
    encode_id(revision.value())
}

fn row_to_mapping(row: HostProxyRow) -> StoreResult<HostProxyMapping> {
    Ok(HostProxyMapping {
        host_id: decode_id("host_proxy.hostid", row.hostid, HostId::from_raw)?,
        proxy_id: decode_id("host_proxy.proxyid", row.proxyid, ProxyId::from_raw)?,
        revision: decode_revision(row.revision)?,
        row_id: Some(decode_id("host_proxy.hostproxyid", row.hostproxyid, HostProxyId::from_raw)?),
    })
}

/// Groups identifiers by status code so each code needs one statement.
fn ids_by_code(pairs: impl Iterator<Item = (i32, u64)>) -> StoreResult<BTreeMap<i32, Vec<i64>>> {
    let mut grouped = BTreeMap::<i32, Vec<i64>>::new();
    for (code, id) in pairs {
        grouped.entry(code).or_default().push(encode_id(id)?);
    }
    Ok(grouped)
}

fn write_group_statuses(
    connection: &mut PgConnection,
    updates: &[StatusUpdate<ProxyGroupId, GroupStatus>],
) -> StoreResult<()> {
    let grouped = ids_by_code(updates.iter().map(|update| (update.status.code(), update.id.value())))?;
    for (code, group_ids) in grouped {
        diesel::update(proxy_group::table.filter(proxy_group::proxy_groupid.eq_any(group_ids)))
            .set(proxy_group::state.eq(code))
            .execute(connection)?;
    }
    Ok(())
}

fn write_proxy_statuses(
    connection: &mut PgConnection,
    updates: &[StatusUpdate<ProxyId, ProxyStatus>],
) -> StoreResult<()> {
    let grouped = ids_by_code(updates.iter().map(|update| (update.status.code(), update.id.value())))?;
    for (code, proxy_ids) in grouped {
        diesel::update(proxy::table.filter(proxy::proxyid.eq_any(proxy_ids)))
            .set(proxy::state.eq(code))
            .execute(connection)?;
    }
    Ok(())
}

fn write_modified_mappings(
    connection: &mut PgConnection,
    mappings: &[HostProxyMapping],
) -> StoreResult<usize> {
    let mut written = 0;
    for mapping in mappings {
        let Some(row_id) = mapping.row_id else {
            continue;
        };
        written += diesel::update(host_proxy::table.find(encode_id(row_id.value())?))
            .set((
                host_proxy::proxyid.eq(encode_id(mapping.proxy_id.value())?),
                host_proxy::revision.eq(encode_revision(mapping.revision)?),
            ))
            .execute(connection)?;
    }
    Ok(written)
}

fn delete_mappings(
    connection: &mut PgConnection,
    mappings: &[HostProxyMapping],
) -> StoreResult<usize> {
    let row_ids = mappings
        .iter()
        .filter_map(|mapping| mapping.row_id)
        .map(|row_id| encode_id(row_id.value()))
        .collect::<StoreResult<Vec<_>>>()?;
    if row_ids.is_empty() {
        return Ok(0);
    }
    let deleted = diesel::delete(host_proxy::table.filter(host_proxy::hostproxyid.eq_any(row_ids)))
        .execute(connection)?;
    Ok(deleted)
}

fn insert_new_mappings(
    connection: &mut PgConnection,
    mappings: &[HostProxyMapping],
) -> StoreResult<FlushOutcome> {
    let mut outcome = FlushOutcome::default();
    if mappings.is_empty() {
        return Ok(outcome);
    }

    let rows = mappings
        .iter()
        .map(|mapping| {
            Ok(NewHostProxyRow {
                hostid: encode_id(mapping.host_id.value())?,
                proxyid: encode_id(mapping.proxy_id.value())?,
                revision: encode_revision(mapping.revision)?,
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;

    // Lock the referenced rows so they cannot vanish before the insert.
    let live_hosts: HashSet<i64> = hosts::table
        .filter(hosts::hostid.eq_any(rows.iter().map(|row| row.hostid).collect::<Vec<_>>()))
        .select(hosts::hostid)
        .for_update()
        .load::<i64>(connection)?
        .into_iter()
        .collect();
    let live_proxies: HashSet<i64> = proxy::table
        .filter(proxy::proxyid.eq_any(rows.iter().map(|row| row.proxyid).collect::<Vec<_>>()))
        .select(proxy::proxyid)
        .for_update()
        .load::<i64>(connection)?
        .into_iter()
        .collect();

    let mut accepted = Vec::with_capacity(rows.len());
    for (mapping, row) in mappings.iter().zip(rows) {
        if !live_hosts.contains(&row.hostid) {
            outcome.vanished_hosts.push(*mapping);
        } else if !live_proxies.contains(&row.proxyid) {
            outcome.vanished_proxies.push(*mapping);
        } else {
            accepted.push((mapping, row));
        }
    }
    if accepted.is_empty() {
        return Ok(outcome);
    }

    let insert_rows: Vec<NewHostProxyRow> = accepted.iter().map(|(_, row)| row.clone()).collect();
    let row_ids: HashMap<i64, i64> = diesel::insert_into(host_proxy::table)
        .values(&insert_rows)
        .on_conflict(host_proxy::hostid)
        .do_nothing()
        .returning((host_proxy::hostid, host_proxy::hostproxyid))
        .get_results::<(i64, i64)>(connection)?
        .into_iter()
        .collect();

    let mut conflicting_hosts = Vec::new();
    for (mapping, row) in accepted {
        match row_ids.get(&row.hostid) {
            Some(&row_id) => outcome.inserted.push(HostProxyMapping {
                row_id: Some(decode_id("host_proxy.hostproxyid", row_id, HostProxyId::from_raw)?),
                ..*mapping
            }),
            None => conflicting_hosts.push(row.hostid),
        }
    }
    if !conflicting_hosts.is_empty() {
        outcome.conflicting = host_proxy::table
            .filter(host_proxy::hostid.eq_any(conflicting_hosts))
            .select(HostProxyRow::as_select())
            .order(host_proxy::hostproxyid)
            .load::<HostProxyRow>(connection)?
            .into_iter()
            .map(row_to_mapping)
            .collect::<StoreResult<_>>()?;
    }
    Ok(outcome)
}

fn write_revision(connection: &mut PgConnection, revision: MapRevision) -> StoreResult<()> {
    diesel::insert_into(ids::table)
        .values((
            ids::table_name.eq(REVISION_TABLE),
            ids::field_name.eq(REVISION_FIELD),
            ids::nextid.eq(encode_revision(revision)?),
        ))
        .on_conflict((ids::table_name, ids::field_name))
        .do_update()
        .set(ids::nextid.eq(excluded(ids::nextid)))
        .execute(connection)?;
    Ok(())
}
