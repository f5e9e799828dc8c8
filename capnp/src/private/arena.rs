// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! The segment collections backing [crate::message::Reader] and [crate::message::Builder].
//!
//! A `ReaderArena` answers "give me segment N" and enforces the traversal limit.
//! A `BuilderArena` additionally knows how to grow: it asks its `Allocator` for
//! more segments and bump-allocates words out of them.

use alloc::vec::Vec;
use core::cell::Cell;

#[cfg(feature = "sync_reader")]
use core::sync::atomic::{AtomicU64, Ordering};

use crate::message::{Allocator, ReaderOptions, ReaderSegments};
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, OutputSegments, Result};

/// Tracks how many more words a reader is permitted to traverse, as a defense
/// against amplification attacks (many pointers aliasing the same small region).
pub struct ReadLimiter {
    #[cfg(not(feature = "sync_reader"))]
    remaining: Cell<u64>,
    #[cfg(feature = "sync_reader")]
    remaining: AtomicU64,
}

const UNLIMITED: u64 = u64::MAX;

impl ReadLimiter {
    pub fn new(limit_words: Option<usize>) -> Self {
        let value = match limit_words {
            None => UNLIMITED,
            Some(w) => w as u64,
        };
        #[cfg(not(feature = "sync_reader"))]
        {
            Self {
                remaining: Cell::new(value),
            }
        }
        #[cfg(feature = "sync_reader")]
        {
            Self {
                remaining: AtomicU64::new(value),
            }
        }
    }

    pub const fn unlimited() -> Self {
        #[cfg(not(feature = "sync_reader"))]
        {
            Self {
                remaining: Cell::new(UNLIMITED),
            }
        }
        #[cfg(feature = "sync_reader")]
        {
            Self {
                remaining: AtomicU64::new(UNLIMITED),
            }
        }
    }

    fn get(&self) -> u64 {
        #[cfg(not(feature = "sync_reader"))]
        {
            self.remaining.get()
        }
        #[cfg(feature = "sync_reader")]
        {
            self.remaining.load(Ordering::Relaxed)
        }
    }

    fn set(&self, value: u64) {
        #[cfg(not(feature = "sync_reader"))]
        {
            self.remaining.set(value);
        }
        #[cfg(feature = "sync_reader")]
        {
            self.remaining.store(value, Ordering::Relaxed);
        }
    }

    /// Charges `words` against the remaining budget. Every `get_xxx()` call on a
    /// reader that resolves a new pointer must go through here exactly once.
    pub fn can_read(&self, words: u64) -> Result<()> {
        let remaining = self.get();
        if remaining == UNLIMITED {
            return Ok(());
        }
        if words > remaining {
            return Err(Error::from_kind(ErrorKind::TraversalLimitExceeded));
        }
        self.set(remaining - words);
        Ok(())
    }
}

/// Object-safe view over the segments backing a message reader.
pub trait ReaderArena {
    /// Returns a pointer to the start of segment `id` and its length in words.
    fn get_segment(&self, id: u32) -> Result<(*const u8, u32)>;
    fn nesting_limit(&self) -> i32;
    fn read_limiter(&self) -> &ReadLimiter;
}

pub struct ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    segments: S,
    limiter: ReadLimiter,
    nesting_limit: i32,
}

impl<S> ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        Self {
            segments,
            limiter: ReadLimiter::new(options.traversal_limit_in_words),
            nesting_limit: options.nesting_limit,
        }
    }

    pub fn into_segments(self) -> S {
        self.segments
    }
}

impl<S> ReaderArena for ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    fn get_segment(&self, id: u32) -> Result<(*const u8, u32)> {
        match self.segments.get_segment(id) {
            None => Err(Error::from_kind(ErrorKind::InvalidPointer)),
            Some(slice) => {
                if slice.as_ptr() as usize % BYTES_PER_WORD != 0 && cfg!(not(feature = "unaligned"))
                {
                    return Err(Error::from_kind(ErrorKind::InvalidMessageSize));
                }
                Ok((slice.as_ptr(), (slice.len() / BYTES_PER_WORD) as u32))
            }
        }
    }

    fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }

    fn read_limiter(&self) -> &ReadLimiter {
        &self.limiter
    }
}

/// A bare word slice, usable as a one-segment, unlimited-budget arena. This is how
/// baked-in default values (pointer constants embedded in generated code, and the
/// empty message used by `Builder::get_root_as_reader` before any segment exists)
/// get resolved through the same `PointerReader` machinery as a real message,
/// without needing a real `Message` to own them.
static UNLIMITED_LIMITER: ReadLimiter = ReadLimiter::unlimited();

impl ReaderArena for [crate::Word] {
    fn get_segment(&self, id: u32) -> Result<(*const u8, u32)> {
        if id == 0 {
            Ok((crate::Word::words_to_bytes(self).as_ptr(), self.len() as u32))
        } else {
            Err(Error::from_kind(ErrorKind::InvalidPointer))
        }
    }

    fn nesting_limit(&self) -> i32 {
        i32::MAX
    }

    fn read_limiter(&self) -> &ReadLimiter {
        &UNLIMITED_LIMITER
    }
}

struct SegmentBuilder {
    ptr: *mut u8,
    word_size: u32,
    allocated: Cell<u32>,
}

impl SegmentBuilder {
    fn new(ptr: *mut u8, word_size: u32) -> Self {
        Self {
            ptr,
            word_size,
            allocated: Cell::new(0),
        }
    }

    fn try_allocate(&self, amount: u32) -> Option<*mut u8> {
        let cur = self.allocated.get();
        if amount <= self.word_size.saturating_sub(cur) {
            let ptr = unsafe { self.ptr.add(cur as usize * BYTES_PER_WORD) };
            self.allocated.set(cur + amount);
            Some(ptr)
        } else {
            None
        }
    }
}

/// Object-safe view over the segments backing a message builder, plus
/// allocation.
pub trait BuilderArena: ReaderArena {
    fn allocate(&mut self, segment_id: u32, amount: u32) -> Result<(u32, *mut u8)>;
    /// Allocates `amount` words specifically in `segment_id`, never
    /// redirecting to a different segment. Fails if that segment doesn't
    /// have room.
    fn allocate_in_segment(&mut self, segment_id: u32, amount: u32) -> Result<*mut u8>;
    /// Creates a new, empty segment of at least `minimum_size` words and
    /// returns its id.
    fn allocate_segment(&mut self, minimum_size: u32) -> Result<u32>;
    fn get_segment_mut(&mut self, id: u32) -> (*mut u8, u32);
    fn is_empty(&self) -> bool;
    fn as_reader(&self) -> &dyn ReaderArena;
    fn get_segments_for_output(&self) -> OutputSegments<'_>;
}

pub struct BuilderArenaImpl<A>
where
    A: Allocator,
{
    allocator: A,
    segments: Vec<SegmentBuilder>,
    limiter: ReadLimiter,
}

impl<A> BuilderArenaImpl<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            segments: Vec::new(),
            limiter: ReadLimiter::new(None),
        }
    }

    pub fn into_allocator(mut self) -> A {
        for seg in self.segments.drain(..) {
            self.allocator
                .deallocate_segment(seg.ptr, seg.word_size, seg.allocated.get());
        }
        self.allocator
    }
}

impl<A> ReaderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn get_segment(&self, id: u32) -> Result<(*const u8, u32)> {
        match self.segments.get(id as usize) {
            None => Err(Error::from_kind(ErrorKind::InvalidPointer)),
            Some(seg) => Ok((seg.ptr as *const u8, seg.allocated.get())),
        }
    }

    fn nesting_limit(&self) -> i32 {
        i32::MAX
    }

    fn read_limiter(&self) -> &ReadLimiter {
        // A builder reading back its own freshly written data is never
        // adversarial input, so it never pays the traversal tax.
        &self.limiter
    }
}

impl<A> BuilderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn allocate(&mut self, segment_id: u32, amount: u32) -> Result<(u32, *mut u8)> {
        if let Some(seg) = self.segments.get(segment_id as usize) {
            if let Some(ptr) = seg.try_allocate(amount) {
                return Ok((segment_id, ptr));
            }
        }
        let (ptr, size) = self.allocator.allocate_segment(amount);
        let seg = SegmentBuilder::new(ptr, size);
        let out_ptr = seg
            .try_allocate(amount)
            .ok_or_else(|| Error::from_kind(ErrorKind::OutOfMemory))?;
        let new_id = self.segments.len() as u32;
        self.segments.push(seg);
        Ok((new_id, out_ptr))
    }

    fn allocate_in_segment(&mut self, segment_id: u32, amount: u32) -> Result<*mut u8> {
        self.segments
            .get(segment_id as usize)
            .and_then(|seg| seg.try_allocate(amount))
            .ok_or_else(|| Error::from_kind(ErrorKind::OutOfMemory))
    }

    fn allocate_segment(&mut self, minimum_size: u32) -> Result<u32> {
        let (ptr, size) = self.allocator.allocate_segment(minimum_size);
        let new_id = self.segments.len() as u32;
        self.segments.push(SegmentBuilder::new(ptr, size));
        Ok(new_id)
    }

    fn get_segment_mut(&mut self, id: u32) -> (*mut u8, u32) {
        let seg = &self.segments[id as usize];
        (seg.ptr, seg.word_size)
    }

    fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn as_reader(&self) -> &dyn ReaderArena {
        self
    }

    fn get_segments_for_output(&self) -> OutputSegments<'_> {
        if self.segments.len() == 1 {
            let seg = &self.segments[0];
            let bytes = unsafe {
                core::slice::from_raw_parts(seg.ptr as *const u8, seg.allocated.get() as usize * BYTES_PER_WORD)
            };
            OutputSegments::SingleSegment([bytes])
        } else {
            let mut v = Vec::with_capacity(self.segments.len());
            for seg in &self.segments {
                let bytes = unsafe {
                    core::slice::from_raw_parts(
                        seg.ptr as *const u8,
                        seg.allocated.get() as usize * BYTES_PER_WORD,
                    )
                };
                v.push(bytes);
            }
            OutputSegments::MultiSegment(v)
        }
    }
}
