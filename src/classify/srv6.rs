//! SRv6 SIDs kept on their canonical node.

use tracing::debug;

use crate::model::{Action, LsSrv6Sid, SidEntry};

use super::lookup::preferred_key;
use super::{Decision, Result, SkipReason, TopologyProcessor};

impl TopologyProcessor {
    pub(super) async fn process_srv6_sid(
        &self,
        sid: &LsSrv6Sid,
        action: Action,
    ) -> Result<Decision> {
        let nodes = self
            .igp_nodes(&sid.igp_router_id, sid.domain_id, None, None)
            .await?;
        let Some(node_key) = preferred_key(&nodes) else {
            // Attached when the node itself is processed.
            debug!(router = %sid.igp_router_id, sid = %sid.srv6_sid, "SID for unknown node");
            return Ok(Decision::Skipped(SkipReason::NodeAbsent));
        };

        let changed = if action.is_removal() {
            self.modify_list(
                &self.collections.igp_node,
                &node_key,
                "sids",
                |sids: &mut Vec<SidEntry>| {
                    let before = sids.len();
                    sids.retain(|s| s.srv6_sid != sid.srv6_sid);
                    sids.len() != before
                },
            )
            .await?
        } else {
            let entry = SidEntry {
                srv6_sid: sid.srv6_sid.clone(),
                endpoint_behavior: sid.endpoint_behavior,
                structure: sid.structure,
            };
            self.modify_list(
                &self.collections.igp_node,
                &node_key,
                "sids",
                |sids: &mut Vec<SidEntry>| {
                    if sids.iter().any(|s| s.srv6_sid == entry.srv6_sid) {
                        return false;
                    }
                    sids.push(entry.clone());
                    true
                },
            )
            .await?
        };

        Ok(match changed {
            Some(true) => Decision::Applied,
            Some(false) if action.is_removal() => Decision::Applied,
            Some(false) => Decision::Skipped(SkipReason::AlreadyPresent),
            None => Decision::Skipped(SkipReason::NodeAbsent),
        })
    }
}
