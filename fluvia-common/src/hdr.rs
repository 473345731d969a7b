//! Wire layouts of the headers the probe looks at.
//!
//! All fields are bytes or byte arrays in network order, so any bit pattern
//! read out of a packet is a valid value.

use core::mem;

pub const ETH_P_IPV6: u16 = 0x86dd;

pub const IPPROTO_HOPOPTS: u8 = 0;
pub const IPPROTO_IPV6ROUTE: u8 = 43;

pub const IPV6_TLV_PAD1: u8 = 0;
pub const IPV6_TLV_PADN: u8 = 1;
pub const IPV6_TLV_IOAM: u8 = 49;

pub const IOAM6_TYPE_PREALLOC: u8 = 0;

/// Routing type of the Segment Routing Header (RFC 8754).
pub const IPV6_SRCRT_TYPE_4: u8 = 4;

///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     destination mac address                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  destination (con't)          |        source mac address     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       source (con't)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           ether type          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct EthHdr {
    pub dst_addr: [u8; 6],
    pub src_addr: [u8; 6],
    pub ether_type: [u8; 2],
}

impl EthHdr {
    pub const LEN: usize = mem::size_of::<EthHdr>();

    #[inline(always)]
    pub fn ether_type(&self) -> u16 {
        u16::from_be_bytes(self.ether_type)
    }
}

/// Fixed IPv6 header (RFC 8200). Only `next_hdr` and the addresses are used.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ipv6Hdr {
    pub vtc_flow: [u8; 4],
    pub payload_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Ipv6Hdr {
    pub const LEN: usize = mem::size_of::<Ipv6Hdr>();
}

/// Leading two bytes of a Hop-by-Hop Options header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HopOptHdr {
    pub next_hdr: u8,
    /// Length in 8-octet units, not counting the first 8 octets.
    pub hdr_len: u8,
}

impl HopOptHdr {
    pub const LEN: usize = mem::size_of::<HopOptHdr>();

    /// Total size of the header including all options.
    #[inline(always)]
    pub fn total_len(&self) -> usize {
        (self.hdr_len as usize + 1) << 3
    }
}

/// IOAM option header inside Hop-by-Hop Options (RFC 9486).
///
/// `opt_len` counts every byte after itself: `reserved`, `ioam_type`, the
/// trace header and the trace data.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ioam6Hdr {
    pub opt_type: u8,
    pub opt_len: u8,
    pub reserved: u8,
    pub ioam_type: u8,
}

impl Ioam6Hdr {
    pub const LEN: usize = mem::size_of::<Ioam6Hdr>();
}

/// Pre-allocated / incremental trace option header (RFC 9197 section 4.4).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        Namespace-ID           |NodeLen  | Flags | RemainingLen|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |               IOAM-Trace-Type                 |  Reserved     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Ioam6TraceHdr {
    pub namespace_id: [u8; 2],
    pub nodelen_flags_remlen: [u8; 2],
    pub trace_type: [u8; 3],
    pub reserved: u8,
}

impl Ioam6TraceHdr {
    pub const LEN: usize = mem::size_of::<Ioam6TraceHdr>();

    /// Trace type bit 2: timestamp seconds.
    pub const TYPE_TS_SECS: u8 = 0x20;
    /// Trace type bit 3: timestamp fraction.
    pub const TYPE_TS_FRAC: u8 = 0x10;

    /// Size of one node record in 4-octet units.
    #[inline(always)]
    pub fn node_len(&self) -> u8 {
        self.nodelen_flags_remlen[0] >> 3
    }

    #[inline(always)]
    pub fn remaining_len(&self) -> u8 {
        self.nodelen_flags_remlen[1] & 0x7f
    }

    #[inline(always)]
    pub fn has_ts_secs(&self) -> bool {
        self.trace_type[0] & Self::TYPE_TS_SECS != 0
    }

    #[inline(always)]
    pub fn has_ts_frac(&self) -> bool {
        self.trace_type[0] & Self::TYPE_TS_FRAC != 0
    }
}

/// Segment Routing Header without its segment list.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SrHdr {
    pub next_hdr: u8,
    pub hdr_ext_len: u8,
    pub routing_type: u8,
    pub segments_left: u8,
    pub last_entry: u8,
    pub flags: u8,
    pub tag: [u8; 2],
}

impl SrHdr {
    pub const LEN: usize = mem::size_of::<SrHdr>();
    pub const SEGMENT_LEN: usize = 16;
}
