//! IGP node materialization and duplicate collapse.
//!
//! A router running IS-IS at both levels is announced twice, once per level.
//! Only the Level-2 node survives in `igp_node`; it is relabeled as spanning
//! both levels and the Level-1 node's edges, SIDs and host prefixes are moved
//! onto it.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::model::{
    doc_key, doc_str, doc_u64, protocol, to_document, Action, Document, DomainDoc, HostPrefix,
    IgpNodeDoc, LsNode, LsSrv6Sid, Processable, SidEntry,
};
use crate::storage::{ensure, remove_if_exists, upsert, Filter};

use super::{Decision, Result, SkipReason, TopologyProcessor};

/// Source-collection variants of one router, split by IS-IS level.
#[derive(Debug, Default)]
struct Variants {
    level1: Vec<String>,
    level2: Vec<String>,
}

impl Variants {
    fn is_dual(&self) -> bool {
        !self.level1.is_empty() && !self.level2.is_empty()
    }
}

impl TopologyProcessor {
    pub(super) async fn process_node(&self, node: &LsNode, action: Action) -> Result<Decision> {
        if node.protocol_id == protocol::BGP {
            return Ok(Decision::Skipped(SkipReason::BgpProtocol));
        }
        if action.is_removal() {
            return self.remove_node(node).await;
        }

        let key = node.key();
        let variants = self.source_variants(&node.igp_router_id, node.domain_id).await?;

        if variants.is_dual() && node.protocol_id == protocol::ISIS_L1 {
            for level2 in &variants.level2 {
                self.collapse_into(&key, level2).await?;
            }
            return Ok(Decision::Collapsed);
        }

        let label = if variants.is_dual() && node.protocol_id == protocol::ISIS_L2 {
            protocol::ISIS_L1_L2_LABEL.to_string()
        } else {
            node.protocol_label()
        };
        let doc = IgpNodeDoc {
            key: key.clone(),
            igp_router_id: node.igp_router_id.clone(),
            router_id: node.router_id.clone(),
            domain_id: node.domain_id,
            protocol_id: node.protocol_id,
            area_id: node.area_id.clone(),
            asn: node.asn,
            name: node.name.clone(),
            protocol: label,
            sids: Vec::new(),
            prefixes: Vec::new(),
        };
        upsert(self.store(), &self.collections.igp_node, to_document(&doc)?).await?;
        self.ensure_domain(node).await?;

        if variants.is_dual() && node.protocol_id == protocol::ISIS_L2 {
            for level1 in &variants.level1 {
                self.collapse_into(level1, &key).await?;
            }
        }

        self.attach_known_sids(node, &key).await?;
        Ok(Decision::Applied)
    }

    async fn remove_node(&self, node: &LsNode) -> Result<Decision> {
        let key = node.key();
        remove_if_exists(self.store(), &self.collections.igp_node, &key).await?;
        let edges = self.remove_igp_edges_touching(&self.igp_node_id(&key)).await?;
        debug!(key = %key, edges, "Removed node");

        // A surviving Level-2 node no longer spans both levels.
        if node.protocol_id == protocol::ISIS_L1 {
            let variants = self.source_variants(&node.igp_router_id, node.domain_id).await?;
            if variants.level1.is_empty() {
                for level2 in &variants.level2 {
                    self.set_label(level2, protocol::label(protocol::ISIS_L2)).await?;
                }
            }
        }
        Ok(Decision::Applied)
    }

    async fn source_variants(&self, igp_router_id: &str, domain_id: u64) -> Result<Variants> {
        let filter = Filter::all()
            .eq("igp_router_id", igp_router_id)
            .eq("domain_id", domain_id);
        let docs = self
            .store
            .query(&self.collections.ls_node, &filter)
            .await?;

        let mut variants = Variants::default();
        for doc in &docs {
            let Some(key) = doc_key(doc) else {
                continue;
            };
            match doc_u64(doc, "protocol_id").and_then(|p| u8::try_from(p).ok()) {
                Some(protocol::ISIS_L1) => variants.level1.push(key.to_string()),
                Some(protocol::ISIS_L2) => variants.level2.push(key.to_string()),
                _ => {}
            }
        }
        Ok(variants)
    }

    /// Merge a Level-1 node into its Level-2 counterpart.
    async fn collapse_into(&self, level1_key: &str, level2_key: &str) -> Result<()> {
        let level2_present = self
            .store
            .document_exists(&self.collections.igp_node, level2_key)
            .await?;
        if level2_present {
            let moved = self
                .repoint_igp_edges(&self.igp_node_id(level1_key), &self.igp_node_id(level2_key))
                .await?;
            self.set_label(level2_key, protocol::ISIS_L1_L2_LABEL).await?;
            self.merge_node_lists(level1_key, level2_key).await?;
            debug!(level1 = %level1_key, level2 = %level2_key, moved, "Moved Level-1 edges");
        }
        let removed =
            remove_if_exists(self.store(), &self.collections.igp_node, level1_key).await?;
        if removed {
            info!(level1 = %level1_key, level2 = %level2_key, "Collapsed duplicate node");
        }
        Ok(())
    }

    /// Carry the SIDs and host prefixes folded into `from` over to `into`.
    async fn merge_node_lists(&self, from: &str, into: &str) -> Result<()> {
        let Some(doc) = self
            .store
            .read_document(&self.collections.igp_node, from)
            .await?
        else {
            return Ok(());
        };
        let folded: IgpNodeDoc = serde_json::from_value(Value::Object(doc))?;

        if !folded.prefixes.is_empty() {
            self.modify_list(
                &self.collections.igp_node,
                into,
                "prefixes",
                |prefixes: &mut Vec<HostPrefix>| {
                    let before = prefixes.len();
                    for entry in &folded.prefixes {
                        if !prefixes.iter().any(|p| p.key == entry.key) {
                            prefixes.push(entry.clone());
                        }
                    }
                    prefixes.len() != before
                },
            )
            .await?;
        }
        if !folded.sids.is_empty() {
            self.modify_list(&self.collections.igp_node, into, "sids", |sids: &mut Vec<SidEntry>| {
                let before = sids.len();
                for entry in &folded.sids {
                    if !sids.iter().any(|s| s.srv6_sid == entry.srv6_sid) {
                        sids.push(entry.clone());
                    }
                }
                sids.len() != before
            })
            .await?;
        }
        Ok(())
    }

    async fn set_label(&self, key: &str, label: &str) -> Result<()> {
        let mut patch = Document::new();
        patch.insert("protocol".to_string(), Value::String(label.to_string()));
        match self
            .store
            .update_document(&self.collections.igp_node, key, patch)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_domain(&self, node: &LsNode) -> Result<()> {
        let domain = DomainDoc {
            key: DomainDoc::key_for(node.protocol_id, node.domain_id, node.asn),
            protocol_id: node.protocol_id,
            domain_id: node.domain_id,
            asn: node.asn,
            protocol: protocol::label(node.protocol_id).to_string(),
        };
        if ensure(self.store(), &self.collections.igp_domain, to_document(&domain)?).await? {
            info!(domain = %domain.key, "Created domain");
        }
        Ok(())
    }

    /// Attach SIDs that arrived before their node.
    async fn attach_known_sids(&self, node: &LsNode, key: &str) -> Result<()> {
        let filter = Filter::all()
            .eq("igp_router_id", node.igp_router_id.as_str())
            .eq("domain_id", node.domain_id);
        let docs = self
            .store
            .query(&self.collections.ls_srv6_sid, &filter)
            .await?;
        if docs.is_empty() {
            return Ok(());
        }

        let mut entries = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<LsSrv6Sid>(Value::Object(doc)) {
                Ok(sid) => entries.push(SidEntry {
                    srv6_sid: sid.srv6_sid,
                    endpoint_behavior: sid.endpoint_behavior,
                    structure: sid.structure,
                }),
                Err(e) => warn!(error = %e, "Skipping unreadable SID document"),
            }
        }

        self.modify_list(&self.collections.igp_node, key, "sids", |sids: &mut Vec<SidEntry>| {
            let before = sids.len();
            for entry in &entries {
                if !sids.iter().any(|s| s.srv6_sid == entry.srv6_sid) {
                    sids.push(entry.clone());
                }
            }
            sids.len() != before
        })
        .await?;
        Ok(())
    }

    /// Collapse every dual-level node pair already in `igp_node`.
    ///
    /// Run once at startup; returns the number of nodes removed.
    pub async fn run_deduplication(&self) -> Result<usize> {
        let nodes = self
            .store
            .query(&self.collections.igp_node, &Filter::all())
            .await?;

        let mut groups: HashMap<(String, u64), (Vec<String>, Vec<String>)> = HashMap::new();
        for doc in &nodes {
            let (Some(key), Some(router)) = (doc_key(doc), doc_str(doc, "igp_router_id")) else {
                continue;
            };
            let domain = doc_u64(doc, "domain_id").unwrap_or(0);
            let entry = groups.entry((router.to_string(), domain)).or_default();
            match doc_u64(doc, "protocol_id").and_then(|p| u8::try_from(p).ok()) {
                Some(protocol::ISIS_L1) => entry.0.push(key.to_string()),
                Some(protocol::ISIS_L2) => entry.1.push(key.to_string()),
                _ => {}
            }
        }

        let mut collapsed = 0;
        for (level1, level2) in groups.values() {
            let Some(survivor) = level2.first() else {
                continue;
            };
            for duplicate in level1 {
                self.collapse_into(duplicate, survivor).await?;
                collapsed += 1;
            }
        }
        info!(collapsed, "Node deduplication sweep complete");
        Ok(collapsed)
    }
}
