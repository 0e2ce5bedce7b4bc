//! IGP link edges.

use tracing::debug;

use crate::model::{protocol, to_document, Action, IgpEdge, LsLink, Processable};
use crate::storage::{remove_if_exists, upsert};

use super::{Decision, ProcessError, Result, SkipReason, TopologyProcessor};

impl TopologyProcessor {
    pub(super) async fn process_link(&self, link: &LsLink, action: Action) -> Result<Decision> {
        if link.protocol_id == protocol::BGP {
            return Ok(Decision::Skipped(SkipReason::BgpProtocol));
        }

        let key = link.key();
        if action.is_removal() {
            for graph in [&self.collections.igpv4_graph, &self.collections.igpv6_graph] {
                remove_if_exists(self.store(), graph, &key).await?;
            }
            return Ok(Decision::Applied);
        }

        let local = self.link_endpoint(&link.igp_router_id, link).await?;
        let remote = self.link_endpoint(&link.remote_igp_router_id, link).await?;

        let edge = IgpEdge {
            key: key.clone(),
            from: self.igp_node_id(&local),
            to: self.igp_node_id(&remote),
            link: key.clone(),
            protocol_id: link.protocol_id,
            domain_id: link.domain_id,
            mt_id: link.mt_id,
            area_id: link.area_id.clone(),
            protocol: protocol::label(link.protocol_id).to_string(),
            local_link_ip: link.local_link_ip.clone(),
            remote_link_ip: link.remote_link_ip.clone(),
            local_link_id: link.local_link_id,
            remote_link_id: link.remote_link_id,
            igp_metric: link.igp_metric,
            max_link_bw: link.max_link_bw,
            unidir_link_delay: link.unidir_link_delay,
            local_node_asn: link.local_node_asn,
            remote_node_asn: link.remote_node_asn,
        };
        let graph = self.collections.igp_graph(link.is_ipv6());
        upsert(self.store(), graph, to_document(&edge)?).await?;
        debug!(key = %key, graph, "Wrote link edge");
        Ok(Decision::Applied)
    }

    async fn link_endpoint(&self, igp_router_id: &str, link: &LsLink) -> Result<String> {
        self.resolve_node(igp_router_id, link.domain_id, link.protocol_id, &link.area_id)
            .await?
            .ok_or_else(|| {
                ProcessError::Unresolved(format!(
                    "link endpoint {} in domain {}",
                    igp_router_id, link.domain_id
                ))
            })
    }
}
