#![no_std]
#![no_main]

use core::sync::atomic::AtomicU64;

use aya_ebpf::{
    bindings::{xdp_action, BPF_NOEXIST},
    cty::c_long,
    helpers::bpf_ktime_get_ns,
    macros::{map, xdp},
    maps::{HashMap, PerfEventArray},
    programs::XdpContext,
};
use fluvia_common::{
    cursor::{PacketBuf, PacketBufMut},
    ioam::Clock,
    probe,
    sink::{AggregationTable, CpuHint, EventChannel, InsertError},
    FlowKey, Metadata, MAX_MAP_ENTRIES,
};

const EEXIST: c_long = 17;

#[no_mangle]
#[link_section = "license"]
pub static _license: [u8; 4] = *b"GPL\0";

#[map]
static FLOWS: HashMap<FlowKey, u64> = HashMap::with_max_entries(MAX_MAP_ENTRIES, 0);

#[map]
static EVENTS: PerfEventArray<Metadata> = PerfEventArray::with_max_entries(MAX_MAP_ENTRIES, 0);

/// Set to 1 by the loader to rewrite the trace timestamp in `fluvia_export`.
#[no_mangle]
static FLUVIA_REWRITE_TS: u8 = 0;

/// Counts SRv6 flows into `FLOWS`.
#[xdp]
pub fn fluvia_count(ctx: XdpContext) -> u32 {
    let packet = XdpPacket(&ctx);
    let _ = probe::count(&packet, &Flows);
    xdp_action::XDP_PASS
}

/// Emits one `Metadata` record plus the frame per IOAM-traced SRv6 packet.
///
/// The receive time is taken before any parsing so that the recorded delay
/// does not include the probe itself.
#[xdp]
pub fn fluvia_export(ctx: XdpContext) -> u32 {
    let rewrite = unsafe { core::ptr::read_volatile(&FLUVIA_REWRITE_TS) } != 0;
    let channel = PerfChannel {
        ctx: &ctx,
        events: &EVENTS,
    };
    let mut packet = XdpPacket(&ctx);
    let _ = probe::export(&mut packet, &channel, &KtimeClock, rewrite);
    xdp_action::XDP_PASS
}

/// Kernel packet buffer as seen by the shared parser.
struct XdpPacket<'a>(&'a XdpContext);

// SAFETY: the kernel keeps `data..data_end` of the current frame mapped and
// writable for the whole program invocation.
unsafe impl PacketBuf for XdpPacket<'_> {
    #[inline(always)]
    fn data(&self) -> usize {
        self.0.data()
    }

    #[inline(always)]
    fn data_end(&self) -> usize {
        self.0.data_end()
    }
}

unsafe impl PacketBufMut for XdpPacket<'_> {
    #[inline(always)]
    fn data_mut(&mut self) -> usize {
        self.0.data()
    }
}

struct KtimeClock;

impl Clock for KtimeClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        unsafe { bpf_ktime_get_ns() }
    }
}

/// `FLOWS` behind the shared counting logic.
struct Flows;

impl AggregationTable for Flows {
    type Counter = &'static AtomicU64;

    #[inline(always)]
    fn lookup(&self, key: &FlowKey) -> Option<Self::Counter> {
        let value = FLOWS.get_ptr_mut(key)?;
        // SAFETY: hash map values are 8-byte aligned and stay valid while the
        // entry exists; the probe never deletes entries.
        Some(unsafe { AtomicU64::from_ptr(value) })
    }

    #[inline(always)]
    fn insert_if_absent(&self, key: &FlowKey, initial: u64) -> Result<(), InsertError> {
        FLOWS
            .insert(key, &initial, BPF_NOEXIST as u64)
            .map_err(|e| match e {
                e if e == -EEXIST => InsertError::Exists,
                _ => InsertError::Full,
            })
    }
}

struct PerfChannel<'a> {
    ctx: &'a XdpContext,
    events: &'static PerfEventArray<Metadata>,
}

impl EventChannel for PerfChannel<'_> {
    /// The upper half of the perf flags tells the kernel how many frame
    /// bytes to append after the record.
    #[inline(always)]
    fn try_send(&self, record: &Metadata, packet_len: u32, hint: CpuHint) {
        match hint {
            CpuHint::Current => self.events.output(self.ctx, record, packet_len),
            CpuHint::Index(cpu) => self
                .events
                .output_at_index(self.ctx, cpu, record, packet_len),
        }
    }
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
