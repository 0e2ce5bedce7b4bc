//! BGP sessions and prefixes in the unified IP graphs.

use serde_json::Value;
use tracing::{debug, info};

use crate::model::{
    doc_key, host_length, to_document, Action, BgpNodeDoc, BgpPrefix, BgpPrefixDoc,
    BgpPrefixEdge, HostPrefix, PeerSession, Processable, SessionEdge, FROM, TO,
};
use crate::storage::{document_id, ensure, key_of_id, remove_if_exists, upsert, Filter};

use super::asn::{classify_session, SessionType};
use super::lookup::preferred_key;
use super::{Decision, ProcessError, Result, SkipReason, TopologyProcessor};

/// Whether `candidate` should replace the path currently stored on a prefix
/// vertex: eBGP beats iBGP, then the shorter AS path wins. On a tie the
/// existing path stays unless it came from the same peer.
pub(super) fn accepts_path(existing: &BgpPrefixDoc, candidate: &BgpPrefix) -> bool {
    if existing.is_ibgp != candidate.is_ibgp() {
        return existing.is_ibgp;
    }
    let candidate_len = candidate.as_path.len();
    if candidate_len != existing.as_path_len {
        return candidate_len < existing.as_path_len;
    }
    existing.peer_ip == candidate.peer_ip
}

impl TopologyProcessor {
    pub(super) async fn process_peer(&self, peer: &PeerSession, action: Action) -> Result<Decision> {
        let key = peer.key();
        if action.is_removal() {
            for graph in [&self.collections.ipv4_graph, &self.collections.ipv6_graph] {
                for edge_key in [format!("{}_fwd", key), format!("{}_rev", key)] {
                    remove_if_exists(self.store(), graph, &edge_key).await?;
                }
            }
            return Ok(Decision::Applied);
        }

        if peer.local_bgp_id.is_empty()
            || peer.remote_bgp_id.is_empty()
            || peer.local_asn == 0
            || peer.remote_asn == 0
        {
            return Err(ProcessError::Invalid(format!(
                "peer session {} lacks router ids or AS numbers",
                key
            )));
        }

        let session = classify_session(peer.local_asn, peer.remote_asn);
        if session == SessionType::Internal {
            return Ok(Decision::Skipped(SkipReason::InternalSession));
        }

        let local = self
            .bgp_router_vertex(&peer.local_bgp_id, peer.local_asn)
            .await?;
        let remote = self
            .bgp_router_vertex(&peer.remote_bgp_id, peer.remote_asn)
            .await?;

        let forward = SessionEdge {
            key: format!("{}_fwd", key),
            from: local.clone(),
            to: remote.clone(),
            local_ip: peer.local_ip.clone(),
            remote_ip: peer.remote_ip.clone(),
            local_node_asn: peer.local_asn,
            remote_node_asn: peer.remote_asn,
            protocol: session.edge_protocol(),
        };
        let reverse = SessionEdge {
            key: format!("{}_rev", key),
            from: remote,
            to: local,
            local_ip: peer.remote_ip.clone(),
            remote_ip: peer.local_ip.clone(),
            local_node_asn: peer.remote_asn,
            remote_node_asn: peer.local_asn,
            protocol: forward.protocol.clone(),
        };

        let graph = self.collections.ip_graph(peer.is_ipv4());
        upsert(self.store(), graph, to_document(&forward)?).await?;
        upsert(self.store(), graph, to_document(&reverse)?).await?;
        debug!(key = %key, session = %session, graph, "Wrote session edges");
        Ok(Decision::Applied)
    }

    /// Vertex id of a BGP speaker: its IGP node when known, else a `bgp_node`.
    ///
    /// A `bgp_node` is only created for routers outside every IGP AS; a router
    /// inside one is unresolved until its IGP node arrives.
    async fn bgp_router_vertex(&self, router_id: &str, asn: u32) -> Result<String> {
        if let Some(id) = self.find_bgp_router(router_id, asn).await? {
            return Ok(id);
        }
        if self.is_igp_asn(asn).await? {
            return Err(ProcessError::Unresolved(format!(
                "router {} in IGP AS {}",
                router_id, asn
            )));
        }

        let node = BgpNodeDoc {
            key: BgpNodeDoc::key_for(router_id, asn),
            router_id: router_id.to_string(),
            asn,
            origin: false,
            prefixes: Vec::new(),
        };
        if ensure(self.store(), &self.collections.bgp_node, to_document(&node)?).await? {
            info!(node = %node.key, "Created BGP node");
        }
        Ok(document_id(&self.collections.bgp_node, &node.key))
    }

    async fn find_bgp_router(&self, router_id: &str, asn: u32) -> Result<Option<String>> {
        if let Some(key) = self.igp_node_by_router_id(router_id, asn).await? {
            return Ok(Some(self.igp_node_id(&key)));
        }
        let key = BgpNodeDoc::key_for(router_id, asn);
        if self
            .store
            .document_exists(&self.collections.bgp_node, &key)
            .await?
        {
            return Ok(Some(document_id(&self.collections.bgp_node, &key)));
        }
        Ok(None)
    }

    pub(super) async fn process_bgp_prefix(
        &self,
        prefix: &BgpPrefix,
        action: Action,
    ) -> Result<Decision> {
        if prefix.prefix.is_empty() {
            return Err(ProcessError::Invalid("BGP prefix without address".to_string()));
        }
        if action.is_removal() {
            return self.withdraw_bgp_prefix(prefix).await;
        }

        let origin = prefix.origin().ok_or_else(|| {
            ProcessError::Invalid(format!("BGP prefix {} has no origin AS", prefix.key()))
        })?;

        if prefix.prefix_len == host_length(!prefix.is_ipv4()) {
            return self.fold_into_origin(prefix, origin).await;
        }

        if prefix.peer_router_id().is_empty() || prefix.peer_asn == 0 {
            return Err(ProcessError::Invalid(format!(
                "BGP prefix {} has no advertising peer",
                prefix.key()
            )));
        }

        let key = prefix.key();
        let vertices = self.collections.bgp_prefix(prefix.is_ipv4());
        let existing = match self.store.read_document(vertices, &key).await? {
            Some(doc) => Some(serde_json::from_value::<BgpPrefixDoc>(Value::Object(doc))?),
            None => None,
        };

        if existing.as_ref().map_or(true, |e| accepts_path(e, prefix)) {
            let vertex = BgpPrefixDoc {
                key: key.clone(),
                prefix: prefix.prefix.clone(),
                prefix_len: prefix.prefix_len,
                origin_as: origin,
                peer_asn: prefix.peer_asn,
                peer_ip: prefix.peer_ip.clone(),
                prefix_type: classify_session(prefix.peer_asn, origin).as_str().to_string(),
                nexthop: prefix.nexthop.clone(),
                as_path_len: prefix.as_path.len(),
                is_ibgp: prefix.is_ibgp(),
            };
            upsert(self.store(), vertices, to_document(&vertex)?).await?;
        } else {
            debug!(key = %key, peer = %prefix.peer_ip, "Keeping existing best path");
        }

        let peer_id = self
            .bgp_router_vertex(prefix.peer_router_id(), prefix.peer_asn)
            .await?;
        let peer_key = key_of_id(&peer_id);
        let prefix_id = document_id(vertices, &key);

        let edge = |edge_key: String, from: &str, to: &str| BgpPrefixEdge {
            key: edge_key,
            from: from.to_string(),
            to: to.to_string(),
            prefix: prefix.prefix.clone(),
            prefix_len: prefix.prefix_len,
            origin_as: origin,
            peer_asn: prefix.peer_asn,
            protocol: "BGP".to_string(),
        };
        let graph = self.collections.ip_graph(prefix.is_ipv4());
        let outbound = edge(format!("{}_to_{}", peer_key, key), &peer_id, &prefix_id);
        let inbound = edge(format!("{}_to_{}", key, peer_key), &prefix_id, &peer_id);
        upsert(self.store(), graph, to_document(&outbound)?).await?;
        upsert(self.store(), graph, to_document(&inbound)?).await?;
        Ok(Decision::Applied)
    }

    /// Fold a host route into the node originating it.
    ///
    /// Preference: an IGP node of the origin AS, then a BGP router of that
    /// AS, then a synthetic origin node created for the AS.
    async fn fold_into_origin(&self, prefix: &BgpPrefix, origin: u32) -> Result<Decision> {
        let (collection, node_key) = self.origin_node(origin).await?;
        let entry = HostPrefix {
            key: prefix.key(),
            prefix: prefix.prefix.clone(),
            prefix_len: prefix.prefix_len,
            prefix_metric: 0,
            origin_as: Some(origin),
        };
        let changed = self
            .modify_list(&collection, &node_key, "prefixes", |prefixes: &mut Vec<HostPrefix>| {
                if prefixes.iter().any(|p| p.key == entry.key) {
                    return false;
                }
                prefixes.push(entry.clone());
                true
            })
            .await?;
        match changed {
            Some(true) => Ok(Decision::Applied),
            Some(false) => Ok(Decision::Skipped(SkipReason::AlreadyPresent)),
            None => Err(ProcessError::Unresolved(format!("origin node {}", node_key))),
        }
    }

    async fn origin_node(&self, origin: u32) -> Result<(String, String)> {
        let by_asn = Filter::all().eq("asn", origin);
        let igp = self
            .store
            .query(&self.collections.igp_node, &by_asn)
            .await?;
        if let Some(key) = preferred_key(&igp) {
            return Ok((self.collections.igp_node.clone(), key));
        }

        let routers = self
            .store
            .query(
                &self.collections.bgp_node,
                &by_asn.clone().eq("origin", false).limit(1),
            )
            .await?;
        if let Some(key) = routers.first().and_then(doc_key) {
            return Ok((self.collections.bgp_node.clone(), key.to_string()));
        }

        let node = BgpNodeDoc {
            key: BgpNodeDoc::origin_key_for(origin),
            router_id: String::new(),
            asn: origin,
            origin: true,
            prefixes: Vec::new(),
        };
        if ensure(self.store(), &self.collections.bgp_node, to_document(&node)?).await? {
            info!(node = %node.key, "Created origin node");
        }
        Ok((self.collections.bgp_node.clone(), node.key))
    }

    async fn withdraw_bgp_prefix(&self, prefix: &BgpPrefix) -> Result<Decision> {
        let key = prefix.key();

        if prefix.prefix_len == host_length(!prefix.is_ipv4()) {
            let Some(origin) = prefix.origin() else {
                debug!(key = %key, "Host withdrawal without origin AS");
                return Ok(Decision::Applied);
            };
            let by_asn = Filter::all().eq("asn", origin);
            for collection in [&self.collections.igp_node, &self.collections.bgp_node] {
                for node in self.store.query(collection, &by_asn).await? {
                    let Some(node_key) = doc_key(&node) else {
                        continue;
                    };
                    self.modify_list(
                        collection,
                        node_key,
                        "prefixes",
                        |prefixes: &mut Vec<HostPrefix>| {
                            let before = prefixes.len();
                            prefixes.retain(|p| p.key != key);
                            prefixes.len() != before
                        },
                    )
                    .await?;
                }
            }
            return Ok(Decision::Applied);
        }

        let vertices = self.collections.bgp_prefix(prefix.is_ipv4());
        let graph = self.collections.ip_graph(prefix.is_ipv4());
        let prefix_id = document_id(vertices, &key);

        if let Some(peer_id) = self
            .find_bgp_router(prefix.peer_router_id(), prefix.peer_asn)
            .await?
        {
            let peer_key = key_of_id(&peer_id);
            for edge_key in [
                format!("{}_to_{}", peer_key, key),
                format!("{}_to_{}", key, peer_key),
            ] {
                remove_if_exists(self.store(), graph, &edge_key).await?;
            }
        }

        let remaining = self
            .store
            .query(graph, &Filter::all().any_eq([FROM, TO], prefix_id.as_str()).limit(1))
            .await?;
        if remaining.is_empty() {
            remove_if_exists(self.store(), vertices, &key).await?;
            debug!(key = %key, "Removed withdrawn prefix vertex");
        }
        Ok(Decision::Applied)
    }
}
