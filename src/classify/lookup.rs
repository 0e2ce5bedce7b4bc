//! Node resolution against the canonical IGP node set.

use crate::model::{doc_key, doc_u64, protocol, Document};
use crate::storage::Filter;

use super::{Result, TopologyProcessor};

/// Key of the preferred node among candidates: Level-2 first, then the first match.
pub(super) fn preferred_key(docs: &[Document]) -> Option<String> {
    docs.iter()
        .find(|doc| doc_u64(doc, "protocol_id") == Some(u64::from(protocol::ISIS_L2)))
        .or_else(|| docs.first())
        .and_then(doc_key)
        .map(str::to_string)
}

impl TopologyProcessor {
    pub(super) async fn igp_nodes(
        &self,
        igp_router_id: &str,
        domain_id: u64,
        protocol_id: Option<u8>,
        area_id: Option<&str>,
    ) -> Result<Vec<Document>> {
        let mut filter = Filter::all()
            .eq("igp_router_id", igp_router_id)
            .eq("domain_id", domain_id);
        if let Some(protocol_id) = protocol_id {
            filter = filter.eq("protocol_id", protocol_id);
        }
        if let Some(area_id) = area_id {
            filter = filter.eq("area_id", area_id);
        }
        Ok(self
            .store
            .query(&self.collections.igp_node, &filter)
            .await?)
    }

    /// Resolve the canonical node key for a router seen by a protocol.
    ///
    /// Strategies, in order: exact protocol (and area for OSPF), Level-1 to
    /// Level-2 fallback, any protocol.
    pub(super) async fn resolve_node(
        &self,
        igp_router_id: &str,
        domain_id: u64,
        protocol_id: u8,
        area_id: &str,
    ) -> Result<Option<String>> {
        let area = protocol::is_area_scoped(protocol_id).then_some(area_id);
        let exact = self
            .igp_nodes(igp_router_id, domain_id, Some(protocol_id), area)
            .await?;
        if let Some(key) = preferred_key(&exact) {
            return Ok(Some(key));
        }

        if protocol_id == protocol::ISIS_L1 {
            let level2 = self
                .igp_nodes(igp_router_id, domain_id, Some(protocol::ISIS_L2), None)
                .await?;
            if let Some(key) = preferred_key(&level2) {
                return Ok(Some(key));
            }
        }

        let any = self.igp_nodes(igp_router_id, domain_id, None, None).await?;
        Ok(preferred_key(&any))
    }

    /// IGP node carrying a BGP router id inside an AS.
    pub(super) async fn igp_node_by_router_id(
        &self,
        router_id: &str,
        asn: u32,
    ) -> Result<Option<String>> {
        let filter = Filter::all().eq("router_id", router_id).eq("asn", asn);
        let nodes = self
            .store
            .query(&self.collections.igp_node, &filter)
            .await?;
        Ok(preferred_key(&nodes))
    }

    /// Whether any IGP node belongs to the AS.
    pub(super) async fn is_igp_asn(&self, asn: u32) -> Result<bool> {
        let filter = Filter::all().eq("asn", asn).limit(1);
        Ok(!self
            .store
            .query(&self.collections.igp_node, &filter)
            .await?
            .is_empty())
    }
}
