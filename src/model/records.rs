//! Record variants received from the telemetry stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::documents::{to_document, Document, KEY};

/// BGP-LS protocol identifiers.
pub mod protocol {
    pub const ISIS_L1: u8 = 1;
    pub const ISIS_L2: u8 = 2;
    pub const OSPF_V2: u8 = 3;
    pub const DIRECT: u8 = 4;
    pub const STATIC: u8 = 5;
    pub const OSPF_V3: u8 = 6;
    pub const BGP: u8 = 7;

    /// Label written on a Level-2 node that also originates at Level-1.
    pub const ISIS_L1_L2_LABEL: &str = "ISIS Level 1-2";

    /// OSPF topologies are area-scoped; node lookups must also match the area.
    pub fn is_area_scoped(id: u8) -> bool {
        id == OSPF_V2 || id == OSPF_V3
    }

    pub fn label(id: u8) -> &'static str {
        match id {
            ISIS_L1 => "ISIS Level 1",
            ISIS_L2 => "ISIS Level 2",
            OSPF_V2 => "OSPFv2",
            DIRECT => "Direct",
            STATIC => "Static",
            OSPF_V3 => "OSPFv3",
            BGP => "BGP",
            _ => "Unknown",
        }
    }
}

/// Multi-topology identifier used for IPv6 unicast.
const MT_IPV6: u16 = 2;

fn is_ipv6_literal(addr: &str) -> bool {
    addr.contains(':')
}

/// Mutation requested by an upstream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Del,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Update => "update",
            Action::Del => "del",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Action::Del)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Action::Add),
            "update" => Ok(Action::Update),
            "del" => Ok(Action::Del),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Record-type discriminator carried by the transport (topic suffix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    LsNode,
    LsLink,
    LsPrefix,
    LsSrv6Sid,
    Peer,
    UnicastPrefixV4,
    UnicastPrefixV6,
}

impl RecordType {
    pub const ALL: [RecordType; 7] = [
        RecordType::LsNode,
        RecordType::LsLink,
        RecordType::LsPrefix,
        RecordType::LsSrv6Sid,
        RecordType::Peer,
        RecordType::UnicastPrefixV4,
        RecordType::UnicastPrefixV6,
    ];

    pub fn topic_suffix(&self) -> &'static str {
        match self {
            RecordType::LsNode => "ls_node",
            RecordType::LsLink => "ls_link",
            RecordType::LsPrefix => "ls_prefix",
            RecordType::LsSrv6Sid => "ls_srv6_sid",
            RecordType::Peer => "peer",
            RecordType::UnicastPrefixV4 => "unicast_prefix_v4",
            RecordType::UnicastPrefixV6 => "unicast_prefix_v6",
        }
    }

    /// Resolve a topic such as `gobmp.parsed.ls_node` by its last segment.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let suffix = topic.rsplit('.').next().unwrap_or(topic);
        Self::ALL
            .into_iter()
            .find(|rt| rt.topic_suffix() == suffix)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_suffix())
    }
}

/// Identity of a record.
///
/// Two events describing the same real-world object must produce the same
/// key, and distinct objects must never collide. An upstream `_key` always
/// wins; otherwise the key is derived from the record's identity fields.
pub trait Processable {
    fn upstream_key(&self) -> Option<&str>;

    fn derive_key(&self) -> String;

    fn key(&self) -> String {
        match self.upstream_key() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => self.derive_key(),
        }
    }

    /// Key of the raw document in the source collection.
    fn source_key(&self) -> String {
        self.key()
    }
}

/// Link-state node (router).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsNode {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub igp_router_id: String,
    #[serde(default)]
    pub router_id: String,
    pub domain_id: u64,
    pub protocol_id: u8,
    #[serde(default)]
    pub area_id: String,
    #[serde(default)]
    pub asn: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
}

impl LsNode {
    pub fn protocol_label(&self) -> String {
        if self.protocol.is_empty() {
            protocol::label(self.protocol_id).to_string()
        } else {
            self.protocol.clone()
        }
    }
}

impl Processable for LsNode {
    fn upstream_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn derive_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.protocol_id, self.domain_id, self.area_id, self.igp_router_id
        )
    }
}

/// Link-state link between two routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsLink {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub igp_router_id: String,
    pub remote_igp_router_id: String,
    pub domain_id: u64,
    pub protocol_id: u8,
    #[serde(default)]
    pub area_id: String,
    #[serde(default)]
    pub mt_id: u16,
    #[serde(default)]
    pub local_link_ip: String,
    #[serde(default)]
    pub remote_link_ip: String,
    #[serde(default)]
    pub local_link_id: u32,
    #[serde(default)]
    pub remote_link_id: u32,
    #[serde(default)]
    pub igp_metric: u32,
    #[serde(default)]
    pub max_link_bw: u64,
    #[serde(default)]
    pub unidir_link_delay: u32,
    #[serde(default)]
    pub local_node_asn: u32,
    #[serde(default)]
    pub remote_node_asn: u32,
}

impl LsLink {
    pub fn is_ipv6(&self) -> bool {
        self.mt_id == MT_IPV6 || is_ipv6_literal(&self.local_link_ip)
    }
}

impl Processable for LsLink {
    fn upstream_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn derive_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.protocol_id,
            self.domain_id,
            self.mt_id,
            self.igp_router_id,
            self.local_link_ip,
            self.remote_igp_router_id,
            self.remote_link_ip
        )
    }
}

/// Link-state prefix announced by a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsPrefix {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub igp_router_id: String,
    pub domain_id: u64,
    pub protocol_id: u8,
    #[serde(default)]
    pub area_id: String,
    #[serde(default)]
    pub mt_id: u16,
    pub prefix: String,
    pub prefix_len: u8,
    #[serde(default)]
    pub prefix_metric: u32,
    /// Re-advertisement flag from the prefix attribute TLV.
    #[serde(default)]
    pub r_flag: bool,
    #[serde(default)]
    pub protocol: String,
}

impl LsPrefix {
    pub fn is_ipv6(&self) -> bool {
        self.mt_id == MT_IPV6 || is_ipv6_literal(&self.prefix)
    }

    /// Leaked or re-advertised copy of a prefix originated elsewhere.
    pub fn is_readvertised(&self) -> bool {
        self.r_flag || self.protocol_id == protocol::ISIS_L2
    }
}

impl Processable for LsPrefix {
    fn upstream_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn derive_key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}",
            self.protocol_id,
            self.domain_id,
            self.mt_id,
            self.prefix,
            self.prefix_len,
            self.igp_router_id
        )
    }
}

/// Layout of an SRv6 SID, in bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidStructure {
    #[serde(default)]
    pub locator_block_length: u8,
    #[serde(default)]
    pub locator_node_length: u8,
    #[serde(default)]
    pub function_length: u8,
    #[serde(default)]
    pub argument_length: u8,
}

impl SidStructure {
    pub fn locator_length(&self) -> u16 {
        u16::from(self.locator_block_length) + u16::from(self.locator_node_length)
    }
}

/// SRv6 SID advertised by a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsSrv6Sid {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub igp_router_id: String,
    pub domain_id: u64,
    #[serde(default)]
    pub protocol_id: u8,
    pub srv6_sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_behavior: Option<u16>,
    #[serde(
        rename = "srv6_sid_structure",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structure: Option<SidStructure>,
}

impl Processable for LsSrv6Sid {
    fn upstream_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn derive_key(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.protocol_id, self.domain_id, self.igp_router_id, self.srv6_sid
        )
    }
}

/// BGP peer session state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSession {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub local_bgp_id: String,
    pub remote_bgp_id: String,
    pub local_asn: u32,
    pub remote_asn: u32,
    #[serde(default)]
    pub local_ip: String,
    #[serde(default)]
    pub remote_ip: String,
}

impl PeerSession {
    pub fn is_ipv4(&self) -> bool {
        !is_ipv6_literal(&self.remote_ip) && !is_ipv6_literal(&self.local_ip)
    }
}

impl Processable for PeerSession {
    fn upstream_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn derive_key(&self) -> String {
        format!("{}_{}", self.local_ip, self.remote_ip)
    }
}

/// BGP unicast prefix learned from a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPrefix {
    #[serde(rename = "_key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub prefix: String,
    pub prefix_len: u8,
    #[serde(default)]
    pub origin_as: u32,
    #[serde(default)]
    pub peer_asn: u32,
    #[serde(default)]
    pub peer_ip: String,
    #[serde(default)]
    pub peer_bgp_id: String,
    #[serde(default)]
    pub nexthop: String,
    #[serde(default)]
    pub as_path: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,
}

impl BgpPrefix {
    pub fn is_ipv4(&self) -> bool {
        !is_ipv6_literal(&self.prefix)
    }

    /// Origin AS from the record, falling back to the last AS of the path.
    pub fn origin(&self) -> Option<u32> {
        if self.origin_as != 0 {
            return Some(self.origin_as);
        }
        self.as_path.last().copied().filter(|asn| *asn != 0)
    }

    /// Learned over iBGP (local preference is only carried inside an AS).
    pub fn is_ibgp(&self) -> bool {
        self.local_pref.is_some()
    }

    /// Router id of the advertising peer; BMP peers without one use their address.
    pub fn peer_router_id(&self) -> &str {
        if self.peer_bgp_id.is_empty() {
            &self.peer_ip
        } else {
            &self.peer_bgp_id
        }
    }
}

impl Processable for BgpPrefix {
    // Prefixes merge across peers; the upstream per-peer key is ignored.
    fn upstream_key(&self) -> Option<&str> {
        None
    }

    fn derive_key(&self) -> String {
        format!("{}_{}", self.prefix, self.prefix_len)
    }

    // Each peer's advertisement is its own raw document.
    fn source_key(&self) -> String {
        match self.key.as_deref() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => format!("{}_{}_{}", self.prefix, self.prefix_len, self.peer_ip),
        }
    }
}

/// One record of any category.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphRecord {
    Node(LsNode),
    Link(LsLink),
    Prefix(LsPrefix),
    Srv6Sid(LsSrv6Sid),
    Peer(PeerSession),
    BgpPrefix(BgpPrefix),
}

impl GraphRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            GraphRecord::Node(_) => RecordType::LsNode,
            GraphRecord::Link(_) => RecordType::LsLink,
            GraphRecord::Prefix(_) => RecordType::LsPrefix,
            GraphRecord::Srv6Sid(_) => RecordType::LsSrv6Sid,
            GraphRecord::Peer(_) => RecordType::Peer,
            GraphRecord::BgpPrefix(p) if p.is_ipv4() => RecordType::UnicastPrefixV4,
            GraphRecord::BgpPrefix(_) => RecordType::UnicastPrefixV6,
        }
    }

    fn processable(&self) -> &dyn Processable {
        match self {
            GraphRecord::Node(r) => r,
            GraphRecord::Link(r) => r,
            GraphRecord::Prefix(r) => r,
            GraphRecord::Srv6Sid(r) => r,
            GraphRecord::Peer(r) => r,
            GraphRecord::BgpPrefix(r) => r,
        }
    }

    pub fn key(&self) -> String {
        self.processable().key()
    }

    pub fn source_key(&self) -> String {
        self.processable().source_key()
    }

    /// Raw store document for the record's source collection.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        let mut doc = match self {
            GraphRecord::Node(r) => to_document(r)?,
            GraphRecord::Link(r) => to_document(r)?,
            GraphRecord::Prefix(r) => to_document(r)?,
            GraphRecord::Srv6Sid(r) => to_document(r)?,
            GraphRecord::Peer(r) => to_document(r)?,
            GraphRecord::BgpPrefix(r) => to_document(r)?,
        };
        doc.insert(KEY.to_string(), self.source_key().into());
        Ok(doc)
    }
}

/// A record together with the action requested for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphUpdate {
    pub action: Action,
    pub record: GraphRecord,
}

impl GraphUpdate {
    pub fn new(action: Action, record: GraphRecord) -> Self {
        Self { action, record }
    }

    /// Serialization key: vertex identity shared by every record that
    /// derives the same vertex.
    pub fn key(&self) -> String {
        self.record.key()
    }

    pub fn source_key(&self) -> String {
        self.record.source_key()
    }

    pub fn record_type(&self) -> RecordType {
        self.record.record_type()
    }
}
