//! Bounds-checked access to packet bytes.
//!
//! Every read goes through [`PacketView::checked_view`], which proves that
//! `offset + length` lies within the buffer before any pointer is formed.
//! The comparison is written as `start + offset + length > end`, the shape
//! the eBPF verifier understands for packet pointers.

use core::mem;

/// A contiguous byte buffer with a validated end.
///
/// # Safety
///
/// Implementors guarantee that the addresses `data()..data_end()` are
/// readable for as long as `self` is borrowed, and that `data() <=
/// data_end()`.
pub unsafe trait PacketBuf {
    /// Address of the first byte.
    fn data(&self) -> usize;
    /// Address one past the last readable byte.
    fn data_end(&self) -> usize;
}

/// A packet buffer that may be written through an exclusive borrow.
///
/// # Safety
///
/// Implementors guarantee that `data_mut()..data_end()` is writable for as
/// long as `self` is mutably borrowed.
pub unsafe trait PacketBufMut: PacketBuf {
    fn data_mut(&mut self) -> usize;
}

unsafe impl PacketBuf for [u8] {
    #[inline(always)]
    fn data(&self) -> usize {
        self.as_ptr() as usize
    }

    #[inline(always)]
    fn data_end(&self) -> usize {
        self.as_ptr() as usize + self.len()
    }
}

unsafe impl PacketBufMut for [u8] {
    #[inline(always)]
    fn data_mut(&mut self) -> usize {
        self.as_mut_ptr() as usize
    }
}

/// A byte range that has been proven to lie inside a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: usize,
    end: usize,
}

impl ByteRange {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Read-only view over a packet. Offsets are relative to the first byte.
pub struct PacketView<'a, B: PacketBuf + ?Sized> {
    buf: &'a B,
}

impl<'a, B: PacketBuf + ?Sized> PacketView<'a, B> {
    #[inline(always)]
    pub fn new(buf: &'a B) -> Self {
        Self { buf }
    }

    /// Number of bytes between the start and the validated end.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.buf.data_end() - self.buf.data()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the range `offset..offset + length` if it fits in the buffer.
    #[inline(always)]
    pub fn checked_view(&self, offset: usize, length: usize) -> Option<ByteRange> {
        checked_range(self.buf.data(), self.buf.data_end(), offset, length)
    }

    /// Copies a `T` out of the packet at `offset`.
    ///
    /// `T` must be a plain byte overlay: every bit pattern has to be valid.
    /// The header types in [`crate::hdr`] only contain byte arrays and `u8`s.
    #[inline(always)]
    pub fn load<T: Copy>(&self, offset: usize) -> Option<T> {
        let range = self.checked_view(offset, mem::size_of::<T>())?;
        let ptr = (self.buf.data() + range.start) as *const T;
        // SAFETY: `range` lies inside `data..data_end`, which the
        // `PacketBuf` contract makes readable for the borrow of `buf`.
        Some(unsafe { core::ptr::read_unaligned(ptr) })
    }

    #[inline(always)]
    pub fn load_u8(&self, offset: usize) -> Option<u8> {
        self.load::<u8>(offset)
    }

    #[inline(always)]
    pub fn load_be32(&self, offset: usize) -> Option<u32> {
        self.load::<[u8; 4]>(offset).map(u32::from_be_bytes)
    }
}

/// Exclusive view used by the timestamp rewrite.
pub struct PacketViewMut<'a, B: PacketBufMut + ?Sized> {
    buf: &'a mut B,
}

impl<'a, B: PacketBufMut + ?Sized> PacketViewMut<'a, B> {
    #[inline(always)]
    pub fn new(buf: &'a mut B) -> Self {
        Self { buf }
    }

    #[inline(always)]
    pub fn checked_view(&self, offset: usize, length: usize) -> Option<ByteRange> {
        checked_range(self.buf.data(), self.buf.data_end(), offset, length)
    }

    /// Writes `value` at `offset`, or does nothing and returns `None` when
    /// the write would cross the end of the buffer.
    #[inline(always)]
    pub fn store<T: Copy>(&mut self, offset: usize, value: T) -> Option<()> {
        let range = self.checked_view(offset, mem::size_of::<T>())?;
        let ptr = (self.buf.data_mut() + range.start) as *mut T;
        // SAFETY: bounds proven above; `PacketBufMut` makes the range
        // writable while `buf` is mutably borrowed.
        unsafe { core::ptr::write_unaligned(ptr, value) };
        Some(())
    }

    #[inline(always)]
    pub fn store_be32(&mut self, offset: usize, value: u32) -> Option<()> {
        self.store::<[u8; 4]>(offset, value.to_be_bytes())
    }
}

#[inline(always)]
fn checked_range(start: usize, end: usize, offset: usize, length: usize) -> Option<ByteRange> {
    let last = offset.checked_add(length)?;
    if start.checked_add(last)? > end {
        return None;
    }
    Some(ByteRange {
        start: offset,
        end: last,
    })
}

/// A forward-only position inside a [`PacketView`].
///
/// `advance` refuses to move past the end, so an offset held by a cursor is
/// always `<= len`. It does not make the bytes at that offset readable; reads
/// still go through `checked_view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    offset: usize,
    len: usize,
}

impl Cursor {
    pub fn new<B: PacketBuf + ?Sized>(view: &PacketView<'_, B>) -> Self {
        Self {
            offset: 0,
            len: view.len(),
        }
    }

    /// A cursor placed at `offset`, if that offset is within the buffer.
    pub fn at<B: PacketBuf + ?Sized>(view: &PacketView<'_, B>, offset: usize) -> Option<Self> {
        let mut cursor = Self::new(view);
        cursor.advance(offset)?;
        Some(cursor)
    }

    #[inline(always)]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.len - self.offset
    }

    #[inline(always)]
    pub fn advance(&mut self, n: usize) -> Option<()> {
        let next = self.offset.checked_add(n)?;
        if next > self.len {
            return None;
        }
        self.offset = next;
        Some(())
    }
}
