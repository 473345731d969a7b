//! IOAM6 pre-allocated trace: send timestamp extraction and rewrite.
//!
//! The node records of a pre-allocated trace are filled from the end of the
//! data area backwards, so the trailing record belongs to the first node on
//! the path. Its last two 4-byte fields are the timestamp seconds and
//! fraction for trace type 0xf00000.

use crate::{
    cursor::{PacketBuf, PacketBufMut, PacketView, PacketViewMut},
    hdr::{Ioam6Hdr, Ioam6TraceHdr, IOAM6_TYPE_PREALLOC},
};

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Bytes of `opt_len` that precede the trace data: `reserved`, `ioam_type`
/// and the trace header.
const TRACE_DATA_SKIP: usize = 2 + Ioam6TraceHdr::LEN;

/// A located trace together with the send timestamp it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStamp {
    /// Absolute offset of the seconds field.
    pub sec_offset: usize,
    /// Absolute offset of the fraction field.
    pub subsec_offset: usize,
    pub sent_sec: u32,
    pub sent_subsec: u32,
    pub rewrite_secs: bool,
    pub rewrite_frac: bool,
}

/// Monotonic time source.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Returns `true` when the IOAM option at `offset` is a pre-allocated trace.
/// Out of bounds reads answer `None`.
#[inline(always)]
pub fn is_prealloc_trace<B: PacketBuf + ?Sized>(
    view: &PacketView<'_, B>,
    offset: usize,
) -> Option<bool> {
    let ioam: Ioam6Hdr = view.load(offset)?;
    Some(ioam.ioam_type == IOAM6_TYPE_PREALLOC)
}

/// Reads the trailing send timestamp of the IOAM option at `offset`.
///
/// Both the seconds and the fraction offset are checked against the end of
/// the buffer separately. A trace whose data area cannot hold the two
/// fields fails as well.
#[inline(always)]
pub fn extract_trace<B: PacketBuf + ?Sized>(
    view: &PacketView<'_, B>,
    offset: usize,
) -> Option<TraceStamp> {
    let ioam: Ioam6Hdr = view.load(offset)?;
    let trace_start = offset + Ioam6Hdr::LEN;
    let trace: Ioam6TraceHdr = view.load(trace_start)?;

    let data_len = (ioam.opt_len as usize).checked_sub(TRACE_DATA_SKIP)?;
    if data_len < 8 {
        return None;
    }

    // Relative to the trace header: header (8) + data_len - 8 and - 4.
    let sec_offset = trace_start + data_len;
    let subsec_offset = trace_start + data_len + 4;

    let sent_sec = view.load_be32(sec_offset)?;
    let sent_subsec = view.load_be32(subsec_offset)?;

    Some(TraceStamp {
        sec_offset,
        subsec_offset,
        sent_sec,
        sent_subsec,
        rewrite_secs: trace.has_ts_secs(),
        rewrite_frac: trace.has_ts_frac(),
    })
}

/// Splits monotonic nanoseconds into IOAM seconds and fraction.
#[inline(always)]
pub fn split_ns(ns: u64) -> (u32, u32) {
    ((ns / NSEC_PER_SEC) as u32, (ns % NSEC_PER_SEC) as u32)
}

/// Overwrites the trailing timestamp fields with the current clock.
///
/// Only the fields the trace type announces are written. Returns the values
/// written; fields that were not written keep the packet's original value.
// TODO: add the boot-to-epoch offset once the agent publishes it to the
// probe; until then the written seconds count from boot.
#[inline(always)]
pub fn rewrite_trace<B: PacketBufMut + ?Sized, C: Clock>(
    buf: &mut B,
    stamp: &TraceStamp,
    clock: &C,
) -> Option<(u32, u32)> {
    let (sec, subsec) = split_ns(clock.now_ns());
    let mut view = PacketViewMut::new(buf);
    let mut written = (stamp.sent_sec, stamp.sent_subsec);

    if stamp.rewrite_secs {
        view.store_be32(stamp.sec_offset, sec)?;
        written.0 = sec;
    }
    if stamp.rewrite_frac {
        view.store_be32(stamp.subsec_offset, subsec)?;
        written.1 = subsec;
    }

    Some(written)
}
