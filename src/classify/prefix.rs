//! Link-state prefix handling.
//!
//! Host-length prefixes become metadata on their node; point-to-point
//! subnets are dropped; everything else is a vertex in `ls_prefix` joined to
//! its node by a pair of edges.

use std::net::Ipv6Addr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{
    doc_key, host_length, protocol, to_document, Action, Document, HostPrefix, LsPrefix,
    LsSrv6Sid, PrefixEdge, Processable, SidStructure,
};
use crate::storage::{document_id, upsert, Filter};

use super::{Decision, ProcessError, Result, SkipReason, TopologyProcessor};

/// Structural class of a prefix by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixShape {
    /// Single address: folded into the origin node.
    Host,
    /// /30, /31, /126, /127 link subnets.
    PointToPoint,
    /// Materialized as a vertex.
    Transit,
}

impl PrefixShape {
    pub fn of(prefix_len: u8, ipv6: bool) -> Self {
        if prefix_len == host_length(ipv6) {
            return PrefixShape::Host;
        }
        let p2p = if ipv6 { [126, 127] } else { [30, 31] };
        if p2p.contains(&prefix_len) {
            PrefixShape::PointToPoint
        } else {
            PrefixShape::Transit
        }
    }
}

/// Whether a prefix is exactly the locator of an SRv6 SID.
///
/// The locator length is block plus node length and must equal the prefix
/// length; the prefix must then equal the SID masked to that length.
pub fn matches_locator(prefix: &str, prefix_len: u8, sid: &str, structure: &SidStructure) -> bool {
    if structure.locator_length() != u16::from(prefix_len) || prefix_len > 128 {
        return false;
    }
    let (Ok(prefix), Ok(sid)) = (prefix.parse::<Ipv6Addr>(), sid.parse::<Ipv6Addr>()) else {
        return false;
    };
    let mask = match prefix_len {
        0 => 0,
        len => u128::MAX << (128 - u32::from(len)),
    };
    u128::from(prefix) & mask == u128::from(sid) & mask
}

fn parse_prefixes(docs: Vec<Document>) -> Vec<LsPrefix> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value(Value::Object(doc)) {
            Ok(prefix) => Some(prefix),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable prefix document");
                None
            }
        })
        .collect()
}

impl TopologyProcessor {
    pub(super) async fn process_prefix(
        &self,
        prefix: &LsPrefix,
        action: Action,
    ) -> Result<Decision> {
        if prefix.protocol_id == protocol::BGP {
            return Ok(Decision::Skipped(SkipReason::BgpProtocol));
        }
        if action.is_removal() {
            self.retract_prefix(prefix).await?;
            return Ok(Decision::Applied);
        }

        let ipv6 = prefix.is_ipv6();
        let shape = PrefixShape::of(prefix.prefix_len, ipv6);
        if shape == PrefixShape::PointToPoint {
            return Ok(Decision::Skipped(SkipReason::PointToPoint));
        }
        if ipv6 && self.is_locator(prefix).await? {
            return Ok(Decision::Skipped(SkipReason::Locator));
        }

        let key = prefix.key();
        let siblings = self.sibling_announcements(prefix, &key).await?;
        if prefix.is_readvertised() {
            if siblings.iter().any(|p| !p.is_readvertised()) {
                return Ok(Decision::Skipped(SkipReason::Readvertised));
            }
        } else {
            for duplicate in siblings.iter().filter(|p| p.is_readvertised()) {
                debug!(key = %duplicate.key(), "Retracting re-advertised duplicate");
                self.retract_prefix(duplicate).await?;
            }
        }

        let node_key = self
            .resolve_node(
                &prefix.igp_router_id,
                prefix.domain_id,
                prefix.protocol_id,
                &prefix.area_id,
            )
            .await?
            .ok_or_else(|| {
                ProcessError::Unresolved(format!(
                    "prefix origin {} in domain {}",
                    prefix.igp_router_id, prefix.domain_id
                ))
            })?;

        match shape {
            PrefixShape::Host => self.fold_into_node(prefix, &key, &node_key).await,
            _ => {
                self.write_prefix_edges(prefix, &key, &node_key).await?;
                Ok(Decision::Applied)
            }
        }
    }

    async fn is_locator(&self, prefix: &LsPrefix) -> Result<bool> {
        let filter = Filter::all()
            .eq("igp_router_id", prefix.igp_router_id.as_str())
            .eq("domain_id", prefix.domain_id);
        let docs = self
            .store
            .query(&self.collections.ls_srv6_sid, &filter)
            .await?;
        Ok(docs.into_iter().any(|doc| {
            serde_json::from_value::<LsSrv6Sid>(Value::Object(doc))
                .ok()
                .and_then(|sid| {
                    sid.structure.map(|structure| {
                        matches_locator(&prefix.prefix, prefix.prefix_len, &sid.srv6_sid, &structure)
                    })
                })
                .unwrap_or(false)
        }))
    }

    /// Other announcements of the same prefix in the same domain.
    async fn sibling_announcements(&self, prefix: &LsPrefix, key: &str) -> Result<Vec<LsPrefix>> {
        let filter = Filter::all()
            .eq("prefix", prefix.prefix.as_str())
            .eq("prefix_len", prefix.prefix_len)
            .eq("domain_id", prefix.domain_id);
        let docs = self
            .store
            .query(&self.collections.ls_prefix, &filter)
            .await?;
        let others = docs
            .into_iter()
            .filter(|doc| doc_key(doc) != Some(key))
            .collect();
        Ok(parse_prefixes(others))
    }

    async fn fold_into_node(
        &self,
        prefix: &LsPrefix,
        key: &str,
        node_key: &str,
    ) -> Result<Decision> {
        let entry = HostPrefix {
            key: key.to_string(),
            prefix: prefix.prefix.clone(),
            prefix_len: prefix.prefix_len,
            prefix_metric: prefix.prefix_metric,
            origin_as: None,
        };
        let changed = self
            .modify_list(
                &self.collections.igp_node,
                node_key,
                "prefixes",
                |prefixes: &mut Vec<HostPrefix>| {
                    if prefixes.iter().any(|p| p.key == entry.key) {
                        return false;
                    }
                    prefixes.push(entry.clone());
                    true
                },
            )
            .await?;
        match changed {
            Some(true) => Ok(Decision::Applied),
            Some(false) => Ok(Decision::Skipped(SkipReason::AlreadyPresent)),
            None => Err(ProcessError::Unresolved(format!("node {}", node_key))),
        }
    }

    async fn write_prefix_edges(&self, prefix: &LsPrefix, key: &str, node_key: &str) -> Result<()> {
        let node_id = self.igp_node_id(node_key);
        let prefix_id = document_id(&self.collections.ls_prefix, key);
        let graph = self.collections.igp_graph(prefix.is_ipv6());

        let edge = |edge_key: String, from: &str, to: &str| PrefixEdge {
            key: edge_key,
            from: from.to_string(),
            to: to.to_string(),
            link: key.to_string(),
            protocol_id: prefix.protocol_id,
            domain_id: prefix.domain_id,
            mt_id: prefix.mt_id,
            area_id: prefix.area_id.clone(),
            protocol: protocol::label(prefix.protocol_id).to_string(),
            local_node_asn: 0,
            prefix: prefix.prefix.clone(),
            prefix_len: prefix.prefix_len,
            prefix_metric: prefix.prefix_metric,
        };

        let outbound = edge(format!("{}_to_{}", node_key, key), &node_id, &prefix_id);
        let inbound = edge(format!("{}_to_{}", key, node_key), &prefix_id, &node_id);
        upsert(self.store(), graph, to_document(&outbound)?).await?;
        upsert(self.store(), graph, to_document(&inbound)?).await?;
        Ok(())
    }

    /// Remove everything derived from one prefix announcement.
    async fn retract_prefix(&self, prefix: &LsPrefix) -> Result<()> {
        let key = prefix.key();
        let graph = self.collections.igp_graph(prefix.is_ipv6());
        let edges = self
            .remove_edges(graph, &Filter::all().eq("link", key.as_str()))
            .await?;

        let mut folded = 0;
        if PrefixShape::of(prefix.prefix_len, prefix.is_ipv6()) == PrefixShape::Host {
            let owners = self
                .igp_nodes(&prefix.igp_router_id, prefix.domain_id, None, None)
                .await?;
            for owner in owners.iter().filter_map(doc_key) {
                let removed = self
                    .modify_list(
                        &self.collections.igp_node,
                        owner,
                        "prefixes",
                        |prefixes: &mut Vec<HostPrefix>| {
                            let before = prefixes.len();
                            prefixes.retain(|p| p.key != key);
                            prefixes.len() != before
                        },
                    )
                    .await?;
                if removed == Some(true) {
                    folded += 1;
                }
            }
        }
        debug!(key = %key, edges, folded, "Retracted prefix");
        Ok(())
    }
}
