//! A single interpreter thread: instruction pointer, call stack, and the
//! shared activity slot the pool uses to recycle finished threads.

use std::sync::{Arc, Mutex};

use crate::chunk::{Chunk, ChunkPos};
use crate::frame::{CallFrame, ReturnReg};

/// Pool-visible activity token. The flag carries its own mutex because the
/// pool consults `is_active` from other OS threads while the owner runs.
#[derive(Debug, Default)]
pub struct ThreadSlot {
    active: Mutex<bool>,
}

impl ThreadSlot {
    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap()
    }

    pub(crate) fn activate(&self) {
        *self.active.lock().unwrap() = true;
    }

    /// Mark the slot inactive, reporting whether it was active before.
    pub(crate) fn deactivate(&self) -> bool {
        let mut active = self.active.lock().unwrap();
        std::mem::replace(&mut *active, false)
    }
}

/// An interpreter instance. The instruction pointer, call stack, and every
/// frame inside it are exclusively owned by the OS thread driving this
/// value; only the activity slot is shared.
#[derive(Debug)]
pub struct RunThread {
    chunk: Arc<Chunk>,
    pub ip: ChunkPos,
    call_stack: Vec<CallFrame>,
    slot: Arc<ThreadSlot>,
}

impl RunThread {
    pub(crate) fn new(chunk: Arc<Chunk>, slot: Arc<ThreadSlot>) -> Self {
        Self {
            chunk,
            ip: 0,
            call_stack: Vec::new(),
            slot,
        }
    }

    /// Make the thread execution-ready: position the instruction pointer,
    /// push the bottom frame (return address 0, no return register), and
    /// mark the slot active.
    pub fn init(&mut self, start_pos: ChunkPos) {
        self.ip = start_pos;
        self.call_stack.push(CallFrame::new(0, ReturnReg::NONE));
        self.slot.activate();
    }

    /// Release the thread's memory and mark its slot reusable. Idempotent;
    /// runs once per `init` no matter how often it is called.
    pub fn clean_up(&mut self) {
        if !self.slot.deactivate() {
            return;
        }
        self.ip = 0;
        self.call_stack.clear();
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    /// Peek the byte under the instruction pointer; 0 at or past the end.
    #[inline]
    pub fn now(&self) -> u8 {
        if self.at_eof() { 0 } else { self.chunk.byte(self.ip) }
    }

    /// Read the byte under the instruction pointer and advance; 0 past the
    /// end.
    #[inline]
    pub fn next(&mut self) -> u8 {
        if self.at_eof() {
            return 0;
        }
        let byte = self.chunk.byte(self.ip);
        self.ip += 1;
        byte
    }

    #[inline]
    pub fn at_eof(&self) -> bool {
        self.ip >= self.chunk.len()
    }

    #[inline]
    pub fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes([self.next(), self.next()])
    }

    #[inline]
    pub fn read_i16(&mut self) -> i16 {
        self.read_u16() as i16
    }

    #[inline]
    pub fn read_i32(&mut self) -> i32 {
        i32::from_le_bytes([self.next(), self.next(), self.next(), self.next()])
    }

    #[inline]
    pub fn top_frame(&mut self) -> &mut CallFrame {
        self.call_stack.last_mut().expect("active thread has a bottom frame")
    }

    #[inline]
    pub fn has_frames(&self) -> bool {
        !self.call_stack.is_empty()
    }

    pub fn push_frame(&mut self, frame: CallFrame) {
        self.call_stack.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<CallFrame> {
        self.call_stack.pop()
    }
}
