//! IPv6 extension header chain walk.

use crate::{
    cursor::{Cursor, PacketBuf, PacketView},
    hdr::{HopOptHdr, IPPROTO_HOPOPTS, IPPROTO_IPV6ROUTE, IPV6_TLV_IOAM, IPV6_TLV_PAD1},
    ioam::{extract_trace, is_prealloc_trace, TraceStamp},
    srh::extract_srh,
    FlowKey, MAX_HOPOPT_TLVS, MAX_PROCESSED_EXTHDR,
};

/// What the walk found after the fixed IPv6 header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chain {
    /// Send timestamp of the first pre-allocated IOAM trace, if any.
    pub trace: Option<TraceStamp>,
    /// A type 4 routing header was copied into the key.
    pub srh: bool,
}

/// Walks at most [`MAX_PROCESSED_EXTHDR`] extension headers starting at
/// `offset`, the first byte after the fixed IPv6 header.
///
/// Only Hop-by-Hop Options and the Segment Routing Header are understood;
/// the walk ends at the first other header, after the SRH, or when the
/// bound is reached. The first pre-allocated IOAM option is handed to the
/// trace extractor and a malformed trace abandons the packet.
///
/// `None` means the packet must be left alone: a header did not fit in the
/// buffer, a routing header was not SRv6, or the IOAM trace was unreadable.
#[inline(always)]
pub fn walk<B: PacketBuf + ?Sized>(
    view: &PacketView<'_, B>,
    mut offset: usize,
    mut next_hdr: u8,
    key: &mut FlowKey,
) -> Option<Chain> {
    let mut chain = Chain::default();

    for _ in 0..MAX_PROCESSED_EXTHDR {
        match next_hdr {
            IPPROTO_HOPOPTS => {
                let hbh: HopOptHdr = view.load(offset)?;
                let hop_end = offset + hbh.total_len();

                if chain.trace.is_none() {
                    let start = offset + HopOptHdr::LEN;
                    chain.trace = scan_options(view, start, hop_end)?;
                }

                next_hdr = hbh.next_hdr;
                offset = hop_end;
            }
            IPPROTO_IPV6ROUTE => {
                extract_srh(view, offset, key)?;
                chain.srh = true;
                break;
            }
            _ => break,
        }
    }

    Some(chain)
}

/// Scans the TLVs of one Hop-by-Hop header for a pre-allocated IOAM trace.
#[inline(always)]
fn scan_options<B: PacketBuf + ?Sized>(
    view: &PacketView<'_, B>,
    start: usize,
    end: usize,
) -> Option<Option<TraceStamp>> {
    let mut cursor = Cursor::at(view, start)?;

    for _ in 0..MAX_HOPOPT_TLVS {
        let opt = cursor.offset();
        if opt >= end {
            break;
        }

        let opt_type = view.load_u8(opt)?;
        if opt_type == IPV6_TLV_PAD1 {
            cursor.advance(1)?;
            continue;
        }

        if opt_type == IPV6_TLV_IOAM && is_prealloc_trace(view, opt)? {
            return extract_trace(view, opt).map(Some);
        }

        let opt_len = view.load_u8(opt + 1)?;
        cursor.advance(opt_len as usize + 2)?;
    }

    Some(None)
}
