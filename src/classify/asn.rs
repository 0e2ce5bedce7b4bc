//! BGP session classification by AS number.

use std::fmt;

/// 16-bit private range, including the reserved 65535.
const PRIVATE_16: std::ops::RangeInclusive<u32> = 64512..=65535;
/// 32-bit private range (RFC 6996).
const PRIVATE_32: std::ops::RangeInclusive<u32> = 4_200_000_000..=4_294_967_294;

pub fn is_private_asn(asn: u32) -> bool {
    PRIVATE_16.contains(&asn) || PRIVATE_32.contains(&asn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    Internal,
    ExternalPrivate,
    ExternalPublic,
    Hybrid,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Internal => "ibgp",
            SessionType::ExternalPrivate => "ebgp_private",
            SessionType::ExternalPublic => "ebgp_public",
            SessionType::Hybrid => "ebgp_hybrid",
        }
    }

    /// Protocol label written on session edges.
    pub fn edge_protocol(&self) -> String {
        format!("BGP_{}", self.as_str())
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the relationship between two autonomous systems.
///
/// Private matches are checked before public ones so a mixed pair is always
/// `Hybrid`.
pub fn classify_session(local_asn: u32, remote_asn: u32) -> SessionType {
    if local_asn == remote_asn {
        return SessionType::Internal;
    }
    match (is_private_asn(local_asn), is_private_asn(remote_asn)) {
        (true, true) => SessionType::ExternalPrivate,
        (false, false) => SessionType::ExternalPublic,
        _ => SessionType::Hybrid,
    }
}
