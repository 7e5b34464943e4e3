//! Diesel schema for proxy group persistence.

diesel::table! {
    /// Proxy group definitions and their persisted status.
    proxy_group (proxy_groupid) {
        /// Group identifier.
        proxy_groupid -> Int8,
        /// Group name.
        #[max_length = 255]
        name -> Varchar,
        /// Failover delay expression, possibly containing user macros.
        #[max_length = 255]
        failover_delay -> Varchar,
        /// Minimum-online expression, possibly containing user macros.
        #[max_length = 255]
        min_online -> Varchar,
        /// Persisted group status code.
        state -> Int4,
    }
}

diesel::table! {
    /// Proxy definitions and their persisted status.
    proxy (proxyid) {
        /// Proxy identifier.
        proxyid -> Int8,
        /// Proxy name.
        #[max_length = 128]
        name -> Varchar,
        /// Owning proxy group.
        proxy_groupid -> Nullable<Int8>,
        /// Persisted proxy status code.
        state -> Int4,
    }
}

diesel::table! {
    /// Runtime data reported by proxies.
    proxy_rtdata (proxyid) {
        /// Proxy identifier.
        proxyid -> Int8,
        /// Last contact time.
        lastaccess -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Monitored hosts.
    hosts (hostid) {
        /// Host identifier.
        hostid -> Int8,
        /// Proxy group the host is configured into.
        proxy_groupid -> Nullable<Int8>,
    }
}

diesel::table! {
    /// Durable host to proxy assignments.
    host_proxy (hostproxyid) {
        /// Row identifier.
        hostproxyid -> Int8,
        /// Mapped host.
        hostid -> Int8,
        /// Serving proxy.
        proxyid -> Int8,
        /// Revision stamped when the row was last written.
        revision -> Int8,
    }
}

diesel::table! {
    /// Named counters, including the host mapping revision watermark.
    ids (table_name, field_name) {
        /// Owning table.
        #[max_length = 64]
        table_name -> Varchar,
        /// Counter name within the table.
        #[max_length = 64]
        field_name -> Varchar,
        /// Counter value.
        nextid -> Int8,
    }
}
