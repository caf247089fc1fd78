//! Process-wide run state: the loaded chunk and literal pool, the shared
//! memory subsystem, and the bounded pool of interpreter threads.
//!
//! Each shared resource sits behind its own mutex, and no operation holds
//! two of them at once.

use std::io::Write;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use tracing::debug;

use crate::chunk::{Chunk, ChunkImage, ChunkPos};
use crate::heap::{Heap, HeapAddress, StaticMemory};
use crate::thread::{RunThread, ThreadSlot};

/// Hard cap on pool slots; a `DESYNC` past this is an error.
pub const THREAD_POOL_MAX: usize = 64;

/// Where `OUT` lines go. The binary writes through the locked stdout handle
/// so lines from concurrent threads never interleave; tests capture.
#[derive(Debug)]
pub enum OutSink {
    Stdout,
    Capture(Mutex<Vec<String>>),
}

pub struct RunState {
    chunk: Arc<Chunk>,
    literals: Vec<u64>,
    heap: Mutex<Heap>,
    static_memory: Mutex<StaticMemory>,
    pool: Mutex<Vec<Arc<ThreadSlot>>>,
    out: OutSink,
}

impl RunState {
    pub fn new(image: ChunkImage) -> Self {
        Self::with_sink(image, OutSink::Stdout)
    }

    /// A state whose `OUT` lines are buffered for inspection.
    pub fn with_capture(image: ChunkImage) -> Self {
        Self::with_sink(image, OutSink::Capture(Mutex::new(Vec::new())))
    }

    fn with_sink(image: ChunkImage, out: OutSink) -> Self {
        Self {
            chunk: image.chunk,
            literals: image.literals,
            heap: Mutex::new(Heap::new()),
            static_memory: Mutex::new(StaticMemory::with_size(image.static_size)),
            pool: Mutex::new(Vec::new()),
            out,
        }
    }

    #[inline]
    pub fn chunk(&self) -> &Arc<Chunk> {
        &self.chunk
    }

    #[inline]
    pub fn literal(&self, id: u16) -> u64 {
        self.literals[id as usize]
    }

    /// Hand out an execution-ready thread positioned at `start_pos`,
    /// recycling the first inactive pool slot before growing the pool.
    pub fn spawn_thread(&self, start_pos: ChunkPos) -> Result<RunThread> {
        let mut pool = self.pool.lock().unwrap();

        let slot = match pool.iter().find(|slot| !slot.is_active()) {
            Some(slot) => Arc::clone(slot),
            None => {
                if pool.len() >= THREAD_POOL_MAX {
                    bail!("thread pool exhausted: all {THREAD_POOL_MAX} slots active");
                }
                let slot = Arc::new(ThreadSlot::default());
                pool.push(Arc::clone(&slot));
                slot
            }
        };

        debug!(target: "lican::vm::pool", start_pos, slots = pool.len(), "thread spawned");

        let mut thread = RunThread::new(Arc::clone(&self.chunk), slot);
        thread.init(start_pos);
        Ok(thread)
    }

    /// True once every pool slot is inactive. The top-level driver polls
    /// this to wait out detached threads.
    pub fn are_threads_depleted(&self) -> bool {
        let pool = self.pool.lock().unwrap();
        pool.iter().all(|slot| !slot.is_active())
    }

    /// Number of slots the pool has ever grown to.
    pub fn pool_size(&self) -> usize {
        self.pool.lock().unwrap().len()
    }

    pub fn malloc(&self, size: u32) -> HeapAddress {
        self.heap.lock().unwrap().alloc(size)
    }

    pub fn mfree(&self, addr: HeapAddress, size: u32) {
        self.heap.lock().unwrap().free(addr, size);
    }

    pub fn mwrite(&self, addr: HeapAddress, value: u64, bytes: u8) {
        self.heap.lock().unwrap().write(addr, value, bytes);
    }

    pub fn mread(&self, addr: HeapAddress, size: u8) -> u64 {
        self.heap.lock().unwrap().read(addr, size)
    }

    pub fn swrite(&self, addr: HeapAddress, value: u64, bytes: u8) {
        self.static_memory.lock().unwrap().write(addr, value, bytes);
    }

    pub fn sread(&self, addr: HeapAddress, size: u8) -> u64 {
        self.static_memory.lock().unwrap().read(addr, size)
    }

    /// Run `f` against the heap under its lock, for invariant checks.
    pub fn with_heap<R>(&self, f: impl FnOnce(&Heap) -> R) -> R {
        f(&self.heap.lock().unwrap())
    }

    /// Emit one output line. The stdout handle stays locked for the whole
    /// line.
    pub fn emit(&self, line: &str) {
        match &self.out {
            OutSink::Stdout => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{line}");
            }
            OutSink::Capture(lines) => lines.lock().unwrap().push(line.to_string()),
        }
    }

    /// Lines captured so far; empty for a stdout-backed state.
    pub fn captured_output(&self) -> Vec<String> {
        match &self.out {
            OutSink::Stdout => Vec::new(),
            OutSink::Capture(lines) => lines.lock().unwrap().clone(),
        }
    }
}
