//! Typed topology records and the store documents derived from them.
//!
//! Records arrive from the bus already decoded into one [`GraphRecord`]
//! variant per category. Everything past the decode boundary works with these
//! types; untyped JSON only appears when a document is handed to the store.

mod documents;
mod records;

pub use documents::{
    doc_key, doc_str, doc_u64, strip_internal, to_document, BgpNodeDoc, BgpPrefixDoc,
    BgpPrefixEdge, Document, DomainDoc, HostPrefix, IgpEdge, IgpNodeDoc, PrefixEdge, SessionEdge,
    SidEntry, FROM, ID, KEY, REV, TO,
};
pub use records::{
    protocol, Action, BgpPrefix, GraphRecord, GraphUpdate, LsLink, LsNode, LsPrefix, LsSrv6Sid,
    PeerSession, Processable, RecordType, SidStructure, UnknownAction,
};

/// Host length for an address family: 32 for IPv4, 128 for IPv6.
pub fn host_length(ipv6: bool) -> u8 {
    if ipv6 {
        128
    } else {
        32
    }
}
