//! Segment Routing Header extraction.

use crate::{
    cursor::{PacketBuf, PacketView},
    hdr::{SrHdr, IPV6_SRCRT_TYPE_4},
    FlowKey, MAX_SEGMENTS,
};

/// Copies the SRH at `offset` into `key`.
///
/// Returns `None` if the header itself is out of bounds or is not a type 4
/// routing header. The segment list is copied for
/// `min(last_entry + 1, MAX_SEGMENTS)` entries; each entry is bounds checked
/// on its own and copying stops at the first one that does not fit, so a
/// frame captured shorter than its declared list still yields a key.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Header   |  Hdr Ext Len  | Routing Type  | Segments Left |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Last Entry   |     Flags     |              Tag              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            Segment List[0] (128-bit IPv6 address)             |
/// /                              ...                              /
#[inline(always)]
pub fn extract_srh<B: PacketBuf + ?Sized>(
    view: &PacketView<'_, B>,
    offset: usize,
    key: &mut FlowKey,
) -> Option<()> {
    let srh: SrHdr = view.load(offset)?;
    if srh.routing_type != IPV6_SRCRT_TYPE_4 {
        return None;
    }

    key.next_hdr = srh.next_hdr;
    key.hdr_ext_len = srh.hdr_ext_len;
    key.routing_type = srh.routing_type;
    key.segments_left = srh.segments_left;
    key.last_entry = srh.last_entry;
    key.flags = srh.flags;
    key.tag = u16::from_be_bytes(srh.tag);

    let declared = srh.last_entry as usize + 1;
    let base = offset + SrHdr::LEN;
    for i in 0..MAX_SEGMENTS {
        if i >= declared {
            break;
        }
        match view.load::<[u8; 16]>(base + i * SrHdr::SEGMENT_LEN) {
            Some(seg) => key.segments[i] = seg,
            None => break,
        }
    }

    Some(())
}
