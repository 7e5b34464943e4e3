//! Diesel row models for proxy group persistence.

use super::schema::{host_proxy, proxy, proxy_group, proxy_rtdata};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for proxy group definitions.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = proxy_group)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupRow {
    /// Group identifier.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub proxy_groupid: i64,
    /// Group name.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub name: String,
    /// Failover delay expression.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub failover_delay: String,
    /// Minimum-online expression.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub min_online: String,
}

/// Query result row for proxy definitions.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = proxy)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProxyRow {
    /// Proxy identifier.
    #[diesel(sql_type = diesel::sql_types::Int8)]
    pub proxyid: i64,
    /// Proxy name.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub name: String,
    /// Owning proxy group.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Int8>)]
    pub proxy_groupid: Option<i64>,
}

/// Query result row for proxy runtime data.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = proxy_rtdata)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProxyAccessRow {
    /// Proxy identifier.
    pub proxyid: i64,
    /// Last contact time.
    pub lastaccess: Option<DateTime<Utc>>,
}

/// Query result row for host mappings.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = host_proxy)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HostProxyRow {
    /// Row identifier.
    pub hostproxyid: i64,
    /// Mapped host.
    pub hostid: i64,
    /// Serving proxy.
    pub proxyid: i64,
    /// Revision stamp.
    pub revision: i64,
}

/// Insert model for host mappings; the row identifier is generated.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = host_proxy)]
pub struct NewHostProxyRow {
    /// Mapped host.
    pub hostid: i64,
    /// Serving proxy.
    pub proxyid: i64,
    /// Revision stamp.
    pub revision: i64,
}
