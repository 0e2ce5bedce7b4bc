//! Collection layout and startup schema binding.

use backon::Retryable;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::{GraphStore, Result, StoreError};
use crate::model::RecordType;
use crate::utils::retry::schema_backoff;

/// Names of every collection the engine reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Collections {
    // Source collections, one per record type.
    pub ls_node: String,
    pub ls_link: String,
    pub ls_prefix: String,
    pub ls_srv6_sid: String,
    pub peer: String,
    pub unicast_prefix_v4: String,
    pub unicast_prefix_v6: String,

    // IGP topology.
    pub igp_node: String,
    pub igp_domain: String,
    pub igpv4_graph: String,
    pub igpv6_graph: String,

    // Unified IP topology.
    pub bgp_node: String,
    pub bgp_prefix_v4: String,
    pub bgp_prefix_v6: String,
    pub ipv4_graph: String,
    pub ipv6_graph: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            ls_node: "ls_node".to_string(),
            ls_link: "ls_link".to_string(),
            ls_prefix: "ls_prefix".to_string(),
            ls_srv6_sid: "ls_srv6_sid".to_string(),
            peer: "peer".to_string(),
            unicast_prefix_v4: "unicast_prefix_v4".to_string(),
            unicast_prefix_v6: "unicast_prefix_v6".to_string(),
            igp_node: "igp_node".to_string(),
            igp_domain: "igp_domain".to_string(),
            igpv4_graph: "igpv4_graph".to_string(),
            igpv6_graph: "igpv6_graph".to_string(),
            bgp_node: "bgp_node".to_string(),
            bgp_prefix_v4: "bgp_prefix_v4".to_string(),
            bgp_prefix_v6: "bgp_prefix_v6".to_string(),
            ipv4_graph: "ipv4_graph".to_string(),
            ipv6_graph: "ipv6_graph".to_string(),
        }
    }
}

impl Collections {
    /// Source collection receiving the raw documents of a record type.
    pub fn source_for(&self, record_type: RecordType) -> &str {
        match record_type {
            RecordType::LsNode => &self.ls_node,
            RecordType::LsLink => &self.ls_link,
            RecordType::LsPrefix => &self.ls_prefix,
            RecordType::LsSrv6Sid => &self.ls_srv6_sid,
            RecordType::Peer => &self.peer,
            RecordType::UnicastPrefixV4 => &self.unicast_prefix_v4,
            RecordType::UnicastPrefixV6 => &self.unicast_prefix_v6,
        }
    }

    pub fn igp_graph(&self, ipv6: bool) -> &str {
        if ipv6 {
            &self.igpv6_graph
        } else {
            &self.igpv4_graph
        }
    }

    pub fn ip_graph(&self, ipv4: bool) -> &str {
        if ipv4 {
            &self.ipv4_graph
        } else {
            &self.ipv6_graph
        }
    }

    pub fn bgp_prefix(&self, ipv4: bool) -> &str {
        if ipv4 {
            &self.bgp_prefix_v4
        } else {
            &self.bgp_prefix_v6
        }
    }

    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.ls_node,
            &self.ls_link,
            &self.ls_prefix,
            &self.ls_srv6_sid,
            &self.peer,
            &self.unicast_prefix_v4,
            &self.unicast_prefix_v6,
            &self.igp_node,
            &self.igp_domain,
            &self.igpv4_graph,
            &self.igpv6_graph,
            &self.bgp_node,
            &self.bgp_prefix_v4,
            &self.bgp_prefix_v6,
            &self.ipv4_graph,
            &self.ipv6_graph,
        ]
    }
}

/// Verify every configured collection exists.
///
/// Transient store errors are retried with backoff; a missing collection is
/// returned immediately and must abort startup.
pub async fn bind_schema(store: &dyn GraphStore, collections: &Collections) -> Result<()> {
    for name in collections.all() {
        let exists = (|| async { store.collection_exists(name).await })
            .retry(schema_backoff())
            .when(|e| matches!(e, StoreError::Unavailable(_)))
            .notify(|e, delay| {
                warn!(collection = name, error = %e, ?delay, "Store not ready, retrying");
            })
            .await?;

        if !exists {
            error!(collection = name, "Required collection missing");
            return Err(StoreError::MissingCollection(name.to_string()));
        }
    }

    info!(
        collections = collections.all().len(),
        "Bound to existing graph schema"
    );
    Ok(())
}
