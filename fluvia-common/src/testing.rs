//! Frame builder for tests: Ethernet + IPv6 + Hop-by-Hop(IOAM) + SRH + UDP.

extern crate alloc;

use alloc::vec::Vec;

use crate::{FlowKey, MAX_SEGMENTS};
use crate::hdr::{
    ETH_P_IPV6, IOAM6_TYPE_PREALLOC, IPPROTO_HOPOPTS, IPPROTO_IPV6ROUTE, IPV6_SRCRT_TYPE_4,
    IPV6_TLV_IOAM, IPV6_TLV_PAD1, IPV6_TLV_PADN,
};

pub const DST_MAC: [u8; 6] = [0x02, 0x42, 0xac, 0x11, 0x00, 0x03];
pub const SRC_MAC: [u8; 6] = [0x02, 0x42, 0xac, 0x11, 0x00, 0x02];
/// 2001:db8::1
pub const SRC_ADDR: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01];
/// 2001:db8::2
pub const DST_ADDR: [u8; 16] = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02];

const IPPROTO_UDP: u8 = 17;

/// 2001:db8:dead:beef::`n`
pub fn segment(n: u8) -> [u8; 16] {
    [
        0x20, 0x01, 0x0d, 0xb8, 0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0, 0, 0, 0, n,
    ]
}

/// Leading non-zero segment slots of `key`. Test frames never carry `::`
/// as a segment, so this is the number of segments the extractor copied.
pub fn copied_segments(key: &FlowKey) -> usize {
    key.segments
        .iter()
        .take(MAX_SEGMENTS)
        .take_while(|seg| **seg != [0; 16])
        .count()
}

/// One 16-byte IOAM node record of trace type 0xf00000.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeData {
    pub hop_limit_node_id: [u8; 4],
    pub ingress_egress_ids: [u8; 4],
    pub second: u32,
    pub subsecond: u32,
}

/// Describes a probe frame. `Default` matches a two-hop SRv6 path with a
/// pre-allocated trace whose last node carries 0x6538d5f6.0x3b533d00.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    pub ether_type: u16,
    pub ipv6_next_hdr: u8,
    /// Pad1 bytes placed before the IOAM option.
    pub leading_pad1: usize,
    /// Place a PadN option of this many data bytes before the IOAM option.
    pub leading_padn: Option<u8>,
    pub with_ioam: bool,
    pub ioam_type: u8,
    pub trace_type: [u8; 3],
    pub nodes: Vec<NodeData>,
    pub hbh_next_hdr: u8,
    pub routing_type: u8,
    pub segments: Vec<[u8; 16]>,
    pub last_entry: Option<u8>,
    pub segments_left: Option<u8>,
    pub flags: u8,
    pub tag: u16,
    pub payload: Vec<u8>,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self {
            ether_type: ETH_P_IPV6,
            ipv6_next_hdr: IPPROTO_HOPOPTS,
            leading_pad1: 2,
            leading_padn: None,
            with_ioam: true,
            ioam_type: IOAM6_TYPE_PREALLOC,
            trace_type: [0xf0, 0x00, 0x00],
            nodes: alloc::vec![
                NodeData::default(),
                NodeData {
                    hop_limit_node_id: [0x40, 0x00, 0x00, 0x01],
                    ingress_egress_ids: [0x00, 0x05, 0x00, 0x04],
                    second: 0x6538_d5f6,
                    subsecond: 0x3b53_3d00,
                },
            ],
            hbh_next_hdr: IPPROTO_IPV6ROUTE,
            routing_type: IPV6_SRCRT_TYPE_4,
            segments: alloc::vec![segment(1), segment(2)],
            last_entry: None,
            segments_left: None,
            flags: 0,
            tag: 0,
            payload: b"Hello, SRv6!".to_vec(),
        }
    }
}

/// Offsets of interesting fields in a built frame.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub hbh: usize,
    pub ioam: Option<usize>,
    pub srh: usize,
    pub segments: usize,
    pub end_of_segments: usize,
}

impl FrameBuilder {
    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let mut out = Vec::new();

        // Ethernet
        out.extend_from_slice(&DST_MAC);
        out.extend_from_slice(&SRC_MAC);
        out.extend_from_slice(&self.ether_type.to_be_bytes());

        // IPv6; payload length is patched at the end.
        let ip_start = out.len();
        out.extend_from_slice(&[0x60, 0, 0, 0]);
        out.extend_from_slice(&[0, 0]);
        out.push(self.ipv6_next_hdr);
        out.push(64);
        out.extend_from_slice(&SRC_ADDR);
        out.extend_from_slice(&DST_ADDR);

        // Hop-by-Hop options
        let hbh = out.len();
        out.push(self.hbh_next_hdr);
        out.push(0);
        for _ in 0..self.leading_pad1 {
            out.push(IPV6_TLV_PAD1);
        }
        if let Some(n) = self.leading_padn {
            out.push(IPV6_TLV_PADN);
            out.push(n);
            out.extend(core::iter::repeat(0).take(n as usize));
        }
        let mut ioam = None;
        if self.with_ioam {
            ioam = Some(out.len());
            let opt_len = 2 + 8 + 16 * self.nodes.len();
            out.push(IPV6_TLV_IOAM);
            out.push(opt_len as u8);
            out.push(0);
            out.push(self.ioam_type);
            // trace header: namespace 1, nodelen 4, remaining 1
            out.extend_from_slice(&[0x00, 0x01]);
            out.push(4 << 3);
            out.push(0x01);
            out.extend_from_slice(&self.trace_type);
            out.push(0);
            for node in &self.nodes {
                out.extend_from_slice(&node.hop_limit_node_id);
                out.extend_from_slice(&node.ingress_egress_ids);
                out.extend_from_slice(&node.second.to_be_bytes());
                out.extend_from_slice(&node.subsecond.to_be_bytes());
            }
        }
        let hbh_len = out.len() - hbh;
        let padded = (hbh_len + 7) & !7;
        let pad = padded - hbh_len;
        match pad {
            0 => {}
            1 => out.push(IPV6_TLV_PAD1),
            n => {
                out.push(IPV6_TLV_PADN);
                out.push((n - 2) as u8);
                out.extend(core::iter::repeat(0).take(n - 2));
            }
        }
        out[hbh + 1] = (padded / 8 - 1) as u8;

        // Segment Routing Header
        let srh = out.len();
        let n = self.segments.len();
        out.push(IPPROTO_UDP);
        out.push(((8 + 16 * n) / 8 - 1) as u8);
        out.push(self.routing_type);
        out.push(self.segments_left.unwrap_or(n as u8));
        out.push(self.last_entry.unwrap_or((n as u8).wrapping_sub(1)));
        out.push(self.flags);
        out.extend_from_slice(&self.tag.to_be_bytes());
        let segments = out.len();
        for seg in &self.segments {
            out.extend_from_slice(seg);
        }
        let end_of_segments = out.len();

        // UDP 12345 -> 54321, checksum left zero
        let udp_len = 8 + self.payload.len();
        out.extend_from_slice(&12345u16.to_be_bytes());
        out.extend_from_slice(&54321u16.to_be_bytes());
        out.extend_from_slice(&(udp_len as u16).to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.payload);

        let payload_len = (out.len() - ip_start - 40) as u16;
        out[ip_start + 4..ip_start + 6].copy_from_slice(&payload_len.to_be_bytes());

        (
            out,
            Layout {
                hbh,
                ioam,
                srh,
                segments,
                end_of_segments,
            },
        )
    }
}
