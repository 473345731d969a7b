#![no_std]

//! Packet classification shared by the XDP probe and the userspace agent.
//!
//! The parser only touches packet bytes through [`cursor::PacketView`], and
//! every loop has a fixed trip count, so the same code runs inside the eBPF
//! verifier and on the host.

pub mod cursor;
pub mod exthdr;
pub mod hdr;
pub mod ioam;
pub mod probe;
pub mod sink;
pub mod srh;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// Capacity of the `FLOWS` table and the `EVENTS` perf array.
pub const MAX_MAP_ENTRIES: u32 = 1024;
/// Number of segment slots carried in a [`FlowKey`].
pub const MAX_SEGMENTS: usize = 10;
/// Upper bound on IPv6 extension headers visited per packet.
pub const MAX_PROCESSED_EXTHDR: usize = 4;
/// Upper bound on TLVs scanned inside one Hop-by-Hop Options header.
pub const MAX_HOPOPT_TLVS: usize = 3;

/// Key of the per-flow counter table.
///
/// The layout has no padding, and the key always starts out zeroed, so two
/// packets with the same headers produce byte-identical keys.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowKey {
    pub h_dest: [u8; 6],
    pub h_source: [u8; 6],
    /// Ethertype in host byte order.
    pub h_proto: u16,
    pub v6_srcaddr: [u8; 16],
    pub v6_dstaddr: [u8; 16],
    pub next_hdr: u8,
    pub hdr_ext_len: u8,
    pub routing_type: u8,
    pub segments_left: u8,
    pub last_entry: u8,
    pub flags: u8,
    /// SRH tag in host byte order.
    pub tag: u16,
    pub segments: [[u8; 16]; MAX_SEGMENTS],
}

impl FlowKey {
    pub const fn zeroed() -> Self {
        Self {
            h_dest: [0; 6],
            h_source: [0; 6],
            h_proto: 0,
            v6_srcaddr: [0; 16],
            v6_dstaddr: [0; 16],
            next_hdr: 0,
            hdr_ext_len: 0,
            routing_type: 0,
            segments_left: 0,
            last_entry: 0,
            flags: 0,
            tag: 0,
            segments: [[0; 16]; MAX_SEGMENTS],
        }
    }

}

impl Default for FlowKey {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Per-packet record pushed to the `EVENTS` perf array.
///
/// In the perf sample it is followed by the first `packet_len` bytes of the
/// frame, so userspace can rebuild the flow key with the same parser.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    /// `bpf_ktime_get_ns()` at program entry.
    pub received_time: u64,
    /// IOAM timestamp seconds of the sending node, 0 if not captured.
    pub sent_sec: u32,
    /// IOAM timestamp fraction (nanoseconds), 0 if not captured.
    pub sent_subsec: u32,
}

impl Metadata {
    pub const LEN: usize = core::mem::size_of::<Metadata>();
}

#[cfg(feature = "user")]
mod user_impls {
    use super::{FlowKey, Metadata};

    unsafe impl aya::Pod for FlowKey {}
    unsafe impl aya::Pod for Metadata {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_has_no_padding() {
        assert_eq!(core::mem::size_of::<FlowKey>(), 214);
        assert_eq!(core::mem::size_of::<Metadata>(), 16);
    }
}
