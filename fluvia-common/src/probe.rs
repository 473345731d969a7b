//! Per-packet pipeline: classify a frame, then count it or export it.
//!
//! Every path ends in a pass verdict. Anything the parser does not like is
//! reported as [`Classified::Skip`] and leaves the table, the channel and
//! the packet untouched.

use crate::{
    cursor::{PacketBuf, PacketBufMut, PacketView},
    exthdr,
    hdr::{EthHdr, Ipv6Hdr, ETH_P_IPV6},
    ioam::{rewrite_trace, Clock, TraceStamp},
    sink::{self, AggregationTable, CountOutcome, CpuHint, EventChannel},
    FlowKey, Metadata,
};

/// A frame that made it through the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub key: FlowKey,
    pub trace: Option<TraceStamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    Parsed(Observation),
    Skip,
}

/// What a pipeline run did besides passing the packet on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Counted(CountOutcome),
    /// `rewritten` is set when the trace timestamp was overwritten.
    Emitted { rewritten: bool },
}

/// Parses Ethernet, IPv6 and the extension header chain into a flow key.
///
/// A frame is accepted only when it carries a Segment Routing Header. A
/// pre-allocated IOAM trace, when present, must be readable; with
/// `require_trace` the frame must also carry one.
#[inline(always)]
pub fn classify<B: PacketBuf + ?Sized>(view: &PacketView<'_, B>, require_trace: bool) -> Classified {
    match parse(view, require_trace) {
        Some(obs) => Classified::Parsed(obs),
        None => Classified::Skip,
    }
}

#[inline(always)]
fn parse<B: PacketBuf + ?Sized>(view: &PacketView<'_, B>, require_trace: bool) -> Option<Observation> {
    let eth: EthHdr = view.load(0)?;
    if eth.ether_type() != ETH_P_IPV6 {
        return None;
    }
    let ip: Ipv6Hdr = view.load(EthHdr::LEN)?;

    let mut key = FlowKey::zeroed();
    let chain = exthdr::walk(view, EthHdr::LEN + Ipv6Hdr::LEN, ip.next_hdr, &mut key)?;
    if !chain.srh || (require_trace && chain.trace.is_none()) {
        return None;
    }

    key.h_dest = eth.dst_addr;
    key.h_source = eth.src_addr;
    key.h_proto = eth.ether_type();
    key.v6_srcaddr = ip.src_addr;
    key.v6_dstaddr = ip.dst_addr;

    Some(Observation {
        key,
        trace: chain.trace,
    })
}

/// Counting variant: one increment per SRv6 frame in `table`.
#[inline(always)]
pub fn count<B, T>(buf: &B, table: &T) -> Outcome
where
    B: PacketBuf + ?Sized,
    T: AggregationTable + ?Sized,
{
    let view = PacketView::new(buf);
    match classify(&view, false) {
        Classified::Parsed(obs) => Outcome::Counted(sink::count(table, &obs.key)),
        Classified::Skip => Outcome::Passed,
    }
}

/// Export variant: one [`Metadata`] record plus the frame per IOAM + SRv6
/// frame. With `rewrite` set the trailing trace timestamp is overwritten
/// with the local clock; the record keeps the value the packet arrived with.
#[inline(always)]
pub fn export<B, E, C>(buf: &mut B, channel: &E, clock: &C, rewrite: bool) -> Outcome
where
    B: PacketBufMut + ?Sized,
    E: EventChannel + ?Sized,
    C: Clock,
{
    let received_time = clock.now_ns();

    let view = PacketView::new(&*buf);
    let packet_len = view.len() as u32;
    let stamp = match classify(&view, true) {
        Classified::Parsed(Observation {
            trace: Some(stamp), ..
        }) => stamp,
        _ => return Outcome::Passed,
    };

    let md = Metadata {
        received_time,
        sent_sec: stamp.sent_sec,
        sent_subsec: stamp.sent_subsec,
    };

    // `extract_trace` bounds-checked both timestamp offsets against this
    // buffer, so the stores only fail if the buffer shrank in between; the
    // packet is then left as it arrived and the record is still sent.
    let rewritten = rewrite && rewrite_trace(buf, &stamp, clock).is_some();

    channel.try_send(&md, packet_len, CpuHint::Current);
    Outcome::Emitted { rewritten }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::cell::Cell;
    use std::vec::Vec;

    use super::*;
    use crate::{
        sink::tests::{TestChannel, TestTable},
        testing::{copied_segments, segment, FrameBuilder, NodeData, DST_ADDR, DST_MAC, SRC_ADDR, SRC_MAC},
        MAX_MAP_ENTRIES, MAX_SEGMENTS,
    };

    /// Advances by one second per reading.
    struct StepClock(Cell<u64>);

    impl Clock for StepClock {
        fn now_ns(&self) -> u64 {
            let now = self.0.get();
            self.0.set(now + 1_000_000_000);
            now
        }
    }

    fn table() -> TestTable {
        TestTable::new(MAX_MAP_ENTRIES as usize)
    }

    fn key_of(frame: &[u8]) -> FlowKey {
        match classify(&PacketView::new(frame), false) {
            Classified::Parsed(obs) => obs.key,
            Classified::Skip => panic!("frame was skipped"),
        }
    }

    #[test]
    fn test_short_frames_pass_untouched() {
        let table = table();
        let frame = FrameBuilder::default().build();

        for len in [0, 1, 13] {
            assert_eq!(count(&frame[..len], &table), Outcome::Passed);
        }
        // Ethernet only, IPv6 header cut short.
        assert_eq!(count(&frame[..14 + 39], &table), Outcome::Passed);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_ipv4_passes_untouched() {
        let table = table();
        let channel = TestChannel::default();
        let mut frame = FrameBuilder {
            ether_type: 0x0800,
            ..Default::default()
        }
        .build();

        assert_eq!(count(&frame[..], &table), Outcome::Passed);
        let clock = StepClock(Cell::new(0));
        assert_eq!(
            export(&mut frame[..], &channel, &clock, true),
            Outcome::Passed
        );
        assert_eq!(table.len(), 0);
        assert!(channel.sent.borrow().is_empty());
    }

    #[test]
    fn test_key_fields_match_input() {
        let frame = FrameBuilder {
            flags: 0x80,
            tag: 0x0102,
            ..Default::default()
        }
        .build();
        let key = key_of(&frame);

        assert_eq!(key.h_dest, DST_MAC);
        assert_eq!(key.h_source, SRC_MAC);
        assert_eq!(key.h_proto, 0x86dd);
        assert_eq!(key.v6_srcaddr, SRC_ADDR);
        assert_eq!(key.v6_dstaddr, DST_ADDR);
        assert_eq!(key.next_hdr, 17);
        assert_eq!(key.routing_type, 4);
        assert_eq!(key.segments_left, 2);
        assert_eq!(key.last_entry, 1);
        assert_eq!(key.flags, 0x80);
        assert_eq!(key.tag, 0x0102);
        assert_eq!(key.segments[0], segment(1));
        assert_eq!(key.segments[1], segment(2));
        assert_eq!(copied_segments(&key), 2);
    }

    #[test]
    fn test_without_srh_is_skipped() {
        let frame = FrameBuilder {
            hbh_next_hdr: 17,
            ..Default::default()
        }
        .build();

        assert_eq!(
            classify(&PacketView::new(&frame[..]), false),
            Classified::Skip
        );
    }

    #[test]
    fn test_same_frame_three_times() {
        let table = table();
        let frame = FrameBuilder::default().build();

        for _ in 0..3 {
            assert_eq!(
                count(&frame[..], &table),
                Outcome::Counted(CountOutcome::Incremented)
            );
        }
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&key_of(&frame)), Some(3));
    }

    #[test]
    fn test_same_frame_twice_on_fresh_table() {
        let table = table();
        let frame = FrameBuilder::default().build();

        count(&frame[..], &table);
        count(&frame[..], &table);
        assert_eq!(table.get(&key_of(&frame)), Some(2));
    }

    #[test]
    fn test_timestamps_do_not_split_flows() {
        let table = table();
        let early = FrameBuilder::default().build();
        let late = FrameBuilder {
            nodes: std::vec![
                NodeData::default(),
                NodeData {
                    second: 0x7000_0000,
                    subsecond: 12,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
        .build();
        assert_ne!(early, late);

        count(&early[..], &table);
        count(&late[..], &table);
        assert_eq!(table.len(), 1);
        assert_eq!(key_of(&early), key_of(&late));
        assert_eq!(table.get(&key_of(&early)), Some(2));
    }

    #[test]
    fn test_truncated_in_last_segment_still_counts() {
        let table = table();
        let (frame, layout) = FrameBuilder::default().build_with_layout();
        let truncated = &frame[..layout.end_of_segments - 1];

        assert_eq!(
            count(truncated, &table),
            Outcome::Counted(CountOutcome::Incremented)
        );
        let key = key_of(truncated);
        assert_eq!(key.segments[0], segment(1));
        assert_eq!(key.segments[1], [0; 16]);
        assert_eq!(table.get(&key), Some(1));
    }

    #[test]
    fn test_segment_list_clamped() {
        let segments: Vec<[u8; 16]> = (1..=12).map(segment).collect();
        let frame = FrameBuilder {
            segments,
            ..Default::default()
        }
        .build();

        let key = key_of(&frame);
        assert_eq!(copied_segments(&key), MAX_SEGMENTS);
    }

    #[test]
    fn test_full_table_drops_new_flows() {
        let table = TestTable::new(1);
        let first = FrameBuilder::default().build();
        let second = FrameBuilder {
            tag: 7,
            ..Default::default()
        }
        .build();

        count(&first[..], &table);
        assert_eq!(
            count(&second[..], &table),
            Outcome::Counted(CountOutcome::Dropped(sink::InsertError::Full))
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_export_emits_metadata() {
        let channel = TestChannel::default();
        let clock = StepClock(Cell::new(42));
        let mut frame = FrameBuilder::default().build();
        let len = frame.len() as u32;

        assert_eq!(
            export(&mut frame[..], &channel, &clock, false),
            Outcome::Emitted { rewritten: false }
        );

        let sent = channel.sent.borrow();
        assert_eq!(sent.len(), 1);
        let (md, packet_len, hint) = sent[0];
        assert_eq!(md.received_time, 42);
        assert_eq!(md.sent_sec, 0x6538_d5f6);
        assert_eq!(md.sent_subsec, 0x3b53_3d00);
        assert_eq!(packet_len, len);
        assert_eq!(hint, CpuHint::Current);
        assert_eq!(frame, FrameBuilder::default().build());
    }

    #[test]
    fn test_malformed_trace_is_not_counted() {
        let table = table();
        let channel = TestChannel::default();
        let clock = StepClock(Cell::new(0));
        // Pre-allocated trace with no node data: the timestamp is out of reach.
        let mut frame = FrameBuilder {
            nodes: Vec::new(),
            ..Default::default()
        }
        .build();

        assert_eq!(count(&frame[..], &table), Outcome::Passed);
        assert_eq!(table.len(), 0);
        assert_eq!(
            export(&mut frame[..], &channel, &clock, false),
            Outcome::Passed
        );
        assert!(channel.sent.borrow().is_empty());
    }

    #[test]
    fn test_count_without_trace() {
        let table = table();
        for frame in [
            FrameBuilder {
                with_ioam: false,
                ..Default::default()
            }
            .build(),
            FrameBuilder {
                ioam_type: 1,
                ..Default::default()
            }
            .build(),
        ] {
            assert_eq!(
                count(&frame[..], &table),
                Outcome::Counted(CountOutcome::Incremented)
            );
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_export_requires_trace() {
        let channel = TestChannel::default();
        let clock = StepClock(Cell::new(0));
        let mut frame = FrameBuilder {
            with_ioam: false,
            ..Default::default()
        }
        .build();

        assert_eq!(
            export(&mut frame[..], &channel, &clock, false),
            Outcome::Passed
        );
        assert!(channel.sent.borrow().is_empty());
    }

    #[test]
    fn test_export_rewrite_keeps_received_stamp() {
        let channel = TestChannel::default();
        let clock = StepClock(Cell::new(5_000_000_007));
        let (mut frame, layout) = FrameBuilder::default().build_with_layout();

        assert_eq!(
            export(&mut frame[..], &channel, &clock, true),
            Outcome::Emitted { rewritten: true }
        );

        let (md, _, _) = channel.sent.borrow()[0];
        assert_eq!(md.received_time, 5_000_000_007);
        assert_eq!(md.sent_sec, 0x6538_d5f6);

        // The rewrite reads the clock a second time.
        let sec = layout.ioam.unwrap() + 36;
        assert_eq!(frame[sec..sec + 4], 6u32.to_be_bytes());
        assert_eq!(frame[sec + 4..sec + 8], 7u32.to_be_bytes());
    }
}
