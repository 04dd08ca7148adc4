#![allow(dead_code)]
//! Lock-free SPSC render-command ring buffer and per-frame render pipeline
//! (spec C6), grounded on `LockFreeStructures.hpp`'s `SPSCRingBuffer<T,N>`
//! and `CacheAligned<T>`.
//!
//! The event loop thread is the sole producer; a future renderer/compositor
//! thread would be the sole consumer. Capacity must be a power of two so
//! the index mask replaces a modulo.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Pads an atomic counter out to a full cache line so producer and consumer
/// indices never false-share, matching `CacheAligned<T>`.
#[repr(align(64))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    fn new(value: T) -> Self {
        CacheAligned { value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderCommand {
    MapWindow { window: u64 },
    UnmapWindow { window: u64 },
    MoveResize { window: u64, x: i32, y: i32, w: u32, h: u32 },
    Raise { window: u64 },
    Lower { window: u64 },
    SetBorderColor { window: u64, pixel: u64 },
    DirtyRect { x: i32, y: i32, w: u32, h: u32 },
}

/// Fixed-capacity single-producer/single-consumer ring buffer of render
/// commands. `capacity` must be a power of two.
pub struct SpscRingBuffer {
    buffer: Vec<std::cell::UnsafeCell<Option<RenderCommand>>>,
    mask: usize,
    head: CacheAligned<AtomicUsize>,
    tail: CacheAligned<AtomicUsize>,
    dropped: AtomicU64,
}

// Safety: exactly one producer calls `push`, exactly one consumer calls
// `pop`/`drain`; the head/tail atomics establish the happens-before edges
// needed for each side to see the other's writes to `buffer`.
unsafe impl Sync for SpscRingBuffer {}
unsafe impl Send for SpscRingBuffer {}

impl SpscRingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring buffer capacity must be a power of two");
        let mut buffer = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buffer.push(std::cell::UnsafeCell::new(None));
        }
        SpscRingBuffer {
            buffer,
            mask: capacity - 1,
            head: CacheAligned::new(AtomicUsize::new(0)),
            tail: CacheAligned::new(AtomicUsize::new(0)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pushes a command. When the buffer is full, the oldest unconsumed
    /// command is dropped (the policy SPEC_FULL.md's overflow note calls
    /// for) rather than blocking the single-threaded event loop.
    ///
    /// `head`/`tail` are monotonically increasing counters, not wrapped
    /// indices — only the slot index (`pos & mask`) wraps. This is what
    /// lets every one of `capacity`'s slots hold a live command; the more
    /// common head==tail-means-either-empty-or-full pointer scheme wastes
    /// one slot to keep "empty" and "full" distinguishable.
    pub fn push(&self, cmd: RenderCommand) {
        let tail = self.tail.value.load(Ordering::Relaxed);
        let head = self.head.value.load(Ordering::Acquire);

        if tail.wrapping_sub(head) == self.buffer.len() {
            self.head.value.store(head.wrapping_add(1), Ordering::Release);
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }

        unsafe {
            *self.buffer[tail & self.mask].get() = Some(cmd);
        }
        self.tail.value.store(tail.wrapping_add(1), Ordering::Release);
    }

    pub fn pop(&self) -> Option<RenderCommand> {
        let head = self.head.value.load(Ordering::Relaxed);
        let tail = self.tail.value.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let cmd = unsafe { (*self.buffer[head & self.mask].get()).take() };
        self.head.value.store(head.wrapping_add(1), Ordering::Release);
        cmd
    }

    pub fn len(&self) -> usize {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const MAX_COMMANDS_PER_FRAME: usize = 256;
pub const MAX_DIRTY_RECTS_PER_FRAME: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub commands_processed: u64,
    pub commands_dropped: u64,
    pub dirty_rects_coalesced: u64,
}

/// Drives one frame's worth of command draining out of the ring buffer,
/// bounding both the command batch and the coalesced dirty-rect count so a
/// pathological burst cannot stall the event loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

pub struct RenderPipeline {
    ring: SpscRingBuffer,
    stats: RenderStats,
}

impl RenderPipeline {
    pub fn new(capacity: usize) -> Self {
        RenderPipeline {
            ring: SpscRingBuffer::new(capacity),
            stats: RenderStats::default(),
        }
    }

    pub fn submit(&self, cmd: RenderCommand) {
        self.ring.push(cmd);
    }

    /// Drains up to `MAX_COMMANDS_PER_FRAME` commands, coalescing
    /// `DirtyRect` commands into a bounded, overlap-merged set, and returns
    /// the non-dirty-rect commands to apply plus the coalesced rects.
    pub fn begin_frame(&mut self) -> (Vec<RenderCommand>, Vec<DirtyRect>) {
        let mut commands = Vec::new();
        let mut rects: Vec<DirtyRect> = Vec::new();

        for _ in 0..MAX_COMMANDS_PER_FRAME {
            match self.ring.pop() {
                Some(RenderCommand::DirtyRect { x, y, w, h }) => {
                    let incoming = DirtyRect { x, y, w, h };
                    if let Some(merged) = rects.iter_mut().find(|r| Self::overlaps(r, &incoming)) {
                        *merged = Self::union(merged, &incoming);
                        self.stats.dirty_rects_coalesced += 1;
                    } else if rects.len() < MAX_DIRTY_RECTS_PER_FRAME {
                        rects.push(incoming);
                    } else {
                        // bounded: merge into the last rect rather than grow unbounded.
                        if let Some(last) = rects.last_mut() {
                            *last = Self::union(last, &incoming);
                        }
                        self.stats.dirty_rects_coalesced += 1;
                    }
                }
                Some(cmd) => commands.push(cmd),
                None => break,
            }
        }

        self.stats.frames_rendered += 1;
        self.stats.commands_processed += commands.len() as u64;
        self.stats.commands_dropped = self.ring.dropped_count();
        (commands, rects)
    }

    fn overlaps(a: &DirtyRect, b: &DirtyRect) -> bool {
        a.x < b.x + b.w as i32 && a.x + a.w as i32 > b.x && a.y < b.y + b.h as i32 && a.y + a.h as i32 > b.y
    }

    fn union(a: &DirtyRect, b: &DirtyRect) -> DirtyRect {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        let x1 = (a.x + a.w as i32).max(b.x + b.w as i32);
        let y1 = (a.y + a.h as i32).max(b.y + b.h as i32);
        DirtyRect { x: x0, y: y0, w: (x1 - x0) as u32, h: (y1 - y0) as u32 }
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_fifo_order() {
        let ring = SpscRingBuffer::new(4);
        ring.push(RenderCommand::Raise { window: 1 });
        ring.push(RenderCommand::Raise { window: 2 });
        assert_eq!(ring.pop(), Some(RenderCommand::Raise { window: 1 }));
        assert_eq!(ring.pop(), Some(RenderCommand::Raise { window: 2 }));
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn ring_buffer_drops_oldest_on_overflow() {
        let ring = SpscRingBuffer::new(2);
        ring.push(RenderCommand::Raise { window: 1 });
        ring.push(RenderCommand::Raise { window: 2 });
        ring.push(RenderCommand::Raise { window: 3 });
        assert_eq!(ring.dropped_count(), 1);
        assert_eq!(ring.pop(), Some(RenderCommand::Raise { window: 2 }));
    }

    #[test]
    fn begin_frame_coalesces_overlapping_dirty_rects() {
        let mut pipeline = RenderPipeline::new(16);
        pipeline.submit(RenderCommand::DirtyRect { x: 0, y: 0, w: 100, h: 100 });
        pipeline.submit(RenderCommand::DirtyRect { x: 50, y: 50, w: 100, h: 100 });
        let (_, rects) = pipeline.begin_frame();
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0], DirtyRect { x: 0, y: 0, w: 150, h: 150 });
    }

    #[test]
    fn begin_frame_bounds_command_batch_size() {
        let mut pipeline = RenderPipeline::new(1024);
        for i in 0..500u64 {
            pipeline.submit(RenderCommand::Raise { window: i });
        }
        let (commands, _) = pipeline.begin_frame();
        assert_eq!(commands.len(), MAX_COMMANDS_PER_FRAME);
    }
}
