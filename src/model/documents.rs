//! Document shapes written to the derived collections.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::records::SidStructure;

/// Store document: a JSON object with a `_key`.
pub type Document = serde_json::Map<String, Value>;

pub const KEY: &str = "_key";
pub const ID: &str = "_id";
pub const REV: &str = "_rev";
pub const FROM: &str = "_from";
pub const TO: &str = "_to";

/// Serialize a value that must be a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

pub fn doc_key(doc: &Document) -> Option<&str> {
    doc_str(doc, KEY)
}

pub fn doc_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

pub fn doc_u64(doc: &Document, field: &str) -> Option<u64> {
    doc.get(field).and_then(Value::as_u64)
}

/// Drop store-assigned identity fields so a document can be copied elsewhere.
pub fn strip_internal(mut doc: Document) -> Document {
    doc.remove(ID);
    doc.remove(REV);
    doc
}

/// SRv6 SID entry kept on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidEntry {
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

/// Host-length prefix folded into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPrefix {
    #[serde(rename = "_key")]
    pub key: String,
    pub prefix: String,
    pub prefix_len: u8,
    #[serde(default)]
    pub prefix_metric: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_as: Option<u32>,
}

/// Canonical IGP node.
///
/// `sids` and `prefixes` are append-only metadata maintained by their own
/// processors; they are omitted when empty so node updates never clobber them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgpNodeDoc {
    #[serde(rename = "_key")]
    pub key: String,
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sids: Vec<SidEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<HostPrefix>,
}

/// Protocol instance grouping nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDoc {
    #[serde(rename = "_key")]
    pub key: String,
    pub protocol_id: u8,
    pub domain_id: u64,
    pub asn: u32,
    pub protocol: String,
}

impl DomainDoc {
    pub fn key_for(protocol_id: u8, domain_id: u64, asn: u32) -> String {
        format!("{}_{}_{}", protocol_id, domain_id, asn)
    }
}

/// IGP edge between two nodes.
///
/// `protocol_id` marks the edge as IGP-derived; reconciliation relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgpEdge {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub link: String,
    pub protocol_id: u8,
    pub domain_id: u64,
    pub mt_id: u16,
    pub area_id: String,
    pub protocol: String,
    pub local_link_ip: String,
    pub remote_link_ip: String,
    pub local_link_id: u32,
    pub remote_link_id: u32,
    pub igp_metric: u32,
    pub max_link_bw: u64,
    pub unidir_link_delay: u32,
    pub local_node_asn: u32,
    pub remote_node_asn: u32,
}

/// IGP edge between a node and a transit prefix vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixEdge {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub link: String,
    pub protocol_id: u8,
    pub domain_id: u64,
    pub mt_id: u16,
    pub area_id: String,
    pub protocol: String,
    pub local_node_asn: u32,
    pub prefix: String,
    pub prefix_len: u8,
    pub prefix_metric: u32,
}

/// Directed BGP session edge. Carries no `protocol_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEdge {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub local_ip: String,
    pub remote_ip: String,
    pub local_node_asn: u32,
    pub remote_node_asn: u32,
    pub protocol: String,
}

/// BGP router outside the IGP, or a synthetic origin for an AS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpNodeDoc {
    #[serde(rename = "_key")]
    pub key: String,
    pub router_id: String,
    pub asn: u32,
    #[serde(default)]
    pub origin: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<HostPrefix>,
}

impl BgpNodeDoc {
    pub fn key_for(router_id: &str, asn: u32) -> String {
        format!("{}_{}", router_id, asn)
    }

    pub fn origin_key_for(asn: u32) -> String {
        format!("bgp_{}_origin", asn)
    }
}

/// BGP prefix vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPrefixDoc {
    #[serde(rename = "_key")]
    pub key: String,
    pub prefix: String,
    pub prefix_len: u8,
    pub origin_as: u32,
    pub peer_asn: u32,
    #[serde(default)]
    pub peer_ip: String,
    pub prefix_type: String,
    #[serde(default)]
    pub nexthop: String,
    #[serde(default)]
    pub as_path_len: usize,
    #[serde(default)]
    pub is_ibgp: bool,
}

/// Edge between an advertising BGP peer and a prefix vertex. Carries no `protocol_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPrefixEdge {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_from")]
    pub from: String,
    #[serde(rename = "_to")]
    pub to: String,
    pub prefix: String,
    pub prefix_len: u8,
    pub origin_as: u32,
    pub peer_asn: u32,
    pub protocol: String,
}
