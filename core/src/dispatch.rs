//! Opcode decoding and the instruction handlers driven by the per-thread
//! dispatch loop.
//!
//! Operand bytes follow their opcode inline, little-endian for multi-byte
//! values. Jump displacements are not measured uniformly: `CALL` and
//! `DESYNC` measure from the opcode's own byte position, `JUMP_I8` and
//! `JUMP_I16` correct back to that convention by subtracting their encoded
//! width, and `JUMP_IF_FALSE` measures from the byte after its operands.
//! Encoders depend on the distinction.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error};

use crate::bits::{self, BinaryOp};
use crate::chunk::ChunkPos;
use crate::frame::{CallFrame, ReturnReg};
use crate::state::RunState;
use crate::thread::RunThread;
use crate::value::{self, ValueType};

/// Single-byte instruction tags, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Out = 0,
    Load,
    BAdd,
    BSub,
    BMul,
    BDiv,
    BMore,
    BLess,
    BEqual,
    Malloc,
    MFree,
    MWrite,
    MRead,
    PushLocal,
    CopyLocal,
    Call,
    Desync,
    Return,
    JumpI8,
    JumpI16,
    JumpIfFalse,
    UNot,
    UNeg,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        let op = match byte {
            0 => Out,
            1 => Load,
            2 => BAdd,
            3 => BSub,
            4 => BMul,
            5 => BDiv,
            6 => BMore,
            7 => BLess,
            8 => BEqual,
            9 => Malloc,
            10 => MFree,
            11 => MWrite,
            12 => MRead,
            13 => PushLocal,
            14 => CopyLocal,
            15 => Call,
            16 => Desync,
            17 => Return,
            18 => JumpI8,
            19 => JumpI16,
            20 => JumpIfFalse,
            21 => UNot,
            22 => UNeg,
            _ => return None,
        };
        Some(op)
    }
}

type Handler = fn(&Arc<RunState>, &mut RunThread) -> Result<()>;

/// Jump table indexed by the opcode byte; order mirrors [`Opcode`].
const HANDLERS: [Handler; 23] = [
    instr_out,
    instr_load,
    instr_binary_add,
    instr_binary_sub,
    instr_binary_mul,
    instr_binary_div,
    instr_binary_more,
    instr_binary_less,
    instr_binary_equal,
    instr_malloc,
    instr_mfree,
    instr_mwrite,
    instr_mread,
    instr_push_local,
    instr_copy_local,
    instr_call,
    instr_desync,
    instr_return,
    instr_jump_i8,
    instr_jump_i16,
    instr_jump_if_false,
    instr_unary_not,
    instr_unary_neg,
];

#[inline]
fn handler_for(byte: u8) -> Handler {
    // bytes past the table come from a malformed chunk; skip them rather
    // than abort, per the trusted-compiler contract
    HANDLERS.get(byte as usize).copied().unwrap_or(instr_nop)
}

fn instr_nop(_state: &Arc<RunState>, _thread: &mut RunThread) -> Result<()> {
    Ok(())
}

/// Apply a signed displacement to a chunk position.
#[inline]
fn offset(pos: ChunkPos, delta: i32) -> ChunkPos {
    (pos as i64 + delta as i64) as ChunkPos
}

fn instr_out(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let ty = ValueType::from_byte(thread.next());
    let reg = thread.next();

    let cell = thread.top_frame().read_reg(reg);
    state.emit(&value::out_line(ty, cell));
    Ok(())
}

fn instr_load(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let reg = thread.next();
    let literal = thread.read_u16();

    let cell = state.literal(literal);
    thread.top_frame().write_reg(reg, cell);
    Ok(())
}

/// Shared decode for the six typed binary instructions: type tag, target
/// register, then the two operand registers.
fn typed_binary_instr(thread: &mut RunThread, op: BinaryOp) -> Result<()> {
    let ty = ValueType::from_byte(thread.next());
    let target = thread.next();
    let lhs = thread.next();
    let rhs = thread.next();

    let frame = thread.top_frame();
    let result = typed_binary_cell(ty, op, frame.read_reg(lhs), frame.read_reg(rhs));
    frame.write_reg(target, result);
    Ok(())
}

fn typed_binary_cell(ty: ValueType, op: BinaryOp, lhs: u64, rhs: u64) -> u64 {
    match ty {
        ValueType::U8 => bits::apply::<u8>(op, lhs, rhs),
        ValueType::U16 => bits::apply::<u16>(op, lhs, rhs),
        ValueType::U32 => bits::apply::<u32>(op, lhs, rhs),
        ValueType::U64 => bits::apply::<u64>(op, lhs, rhs),
        ValueType::I8 => bits::apply::<i8>(op, lhs, rhs),
        ValueType::I16 => bits::apply::<i16>(op, lhs, rhs),
        ValueType::I32 => bits::apply::<i32>(op, lhs, rhs),
        ValueType::I64 => bits::apply::<i64>(op, lhs, rhs),
        ValueType::F32 => bits::apply::<f32>(op, lhs, rhs),
        ValueType::F64 => bits::apply::<f64>(op, lhs, rhs),
        // no arithmetic is defined for these tags; a well-formed chunk
        // never asks
        ValueType::Nil | ValueType::Ptr | ValueType::Bool => 0,
    }
}

fn instr_binary_add(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::Add)
}

fn instr_binary_sub(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::Sub)
}

fn instr_binary_mul(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::Mul)
}

fn instr_binary_div(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::Div)
}

fn instr_binary_more(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::More)
}

fn instr_binary_less(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    typed_binary_instr(thread, BinaryOp::Less)
}

fn instr_binary_equal(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let target = thread.next();
    let lhs = thread.next();
    let rhs = thread.next();

    let frame = thread.top_frame();
    let equal = (frame.read_reg(lhs) == frame.read_reg(rhs)) as u64;
    frame.write_reg(target, equal);
    Ok(())
}

fn instr_malloc(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let target = thread.next();
    let size_reg = thread.next();

    let size = thread.top_frame().read_reg(size_reg) as u32;
    let addr = state.malloc(size);
    thread.top_frame().write_reg(target, addr as u64);
    Ok(())
}

fn instr_mfree(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let pointer_reg = thread.next();
    let size_reg = thread.next();

    let frame = thread.top_frame();
    state.mfree(frame.read_reg(pointer_reg) as u32, frame.read_reg(size_reg) as u32);
    Ok(())
}

fn instr_mwrite(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let pointer_reg = thread.next();
    let source_reg = thread.next();
    let size_reg = thread.next();

    let frame = thread.top_frame();
    state.mwrite(
        frame.read_reg(pointer_reg) as u32,
        frame.read_reg(source_reg),
        frame.read_reg(size_reg) as u8,
    );
    Ok(())
}

fn instr_mread(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let pointer_reg = thread.next();
    let target = thread.next();
    let size_reg = thread.next();

    let frame = thread.top_frame();
    let cell = state.mread(frame.read_reg(pointer_reg) as u32, frame.read_reg(size_reg) as u8);
    frame.write_reg(target, cell);
    Ok(())
}

fn instr_push_local(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let reg = thread.next();

    let frame = thread.top_frame();
    let cell = frame.read_reg(reg);
    frame.push_local(cell);
    Ok(())
}

fn instr_copy_local(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let reg = thread.next();
    let index = thread.read_u16();

    let frame = thread.top_frame();
    let cell = frame.local_at(index);
    frame.write_reg(reg, cell);
    Ok(())
}

fn instr_call(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let opcode_pos = thread.ip - 1;
    let delta = thread.read_i32();
    let return_reg = ReturnReg::from_operand(thread.next());
    let arg_count = thread.next();

    // the frame resumes past the argument bytes still to be read
    let mut frame = CallFrame::new(thread.ip + arg_count as ChunkPos, return_reg);
    for _ in 0..arg_count {
        let arg = thread.next();
        frame.push_local(thread.top_frame().read_reg(arg));
    }
    thread.push_frame(frame);

    thread.ip = offset(opcode_pos, delta);
    Ok(())
}

fn instr_desync(state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let opcode_pos = thread.ip - 1;
    let delta = thread.read_i32();
    let arg_count = thread.next();

    let mut spawned = state.spawn_thread(offset(opcode_pos, delta))?;
    for _ in 0..arg_count {
        let arg = thread.next();
        let cell = thread.top_frame().read_reg(arg);
        spawned.top_frame().push_local(cell);
    }

    let state = Arc::clone(state);
    std::thread::spawn(move || {
        execute_thread(&state, &mut spawned);
    });
    Ok(())
}

fn instr_return(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    // the value operand exists only when the caller asked for a value
    let mut cell = 0;
    if thread.top_frame().return_reg().target().is_some() {
        let reg = thread.next();
        cell = thread.top_frame().read_reg(reg);
    }

    let Some(frame) = thread.pop_frame() else {
        return Ok(());
    };
    thread.ip = frame.return_address();
    if let Some(target) = frame.return_reg().target() {
        thread.top_frame().write_reg(target, cell);
    }
    Ok(())
}

fn instr_jump_i8(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let delta = thread.next() as i8 as i32;
    thread.ip = offset(thread.ip, delta - 2);
    Ok(())
}

fn instr_jump_i16(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let delta = thread.read_i16() as i32;
    thread.ip = offset(thread.ip, delta - 3);
    Ok(())
}

fn instr_jump_if_false(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let delta = thread.read_i16() as i32;
    let reg = thread.next();

    if thread.top_frame().read_reg(reg) == 0 {
        thread.ip = offset(thread.ip, delta);
    }
    Ok(())
}

fn instr_unary_not(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let target = thread.next();
    let source = thread.next();

    let frame = thread.top_frame();
    let cell = frame.read_reg(source) ^ 1;
    frame.write_reg(target, cell);
    Ok(())
}

fn instr_unary_neg(_state: &Arc<RunState>, thread: &mut RunThread) -> Result<()> {
    let target = thread.next();
    let source = thread.next();

    let frame = thread.top_frame();
    let cell = frame.read_reg(source) ^ (1 << 63);
    frame.write_reg(target, cell);
    Ok(())
}

/// Drive one thread until its call stack empties or the instruction pointer
/// crosses the chunk end, then release it. Returns the number of dispatched
/// instructions so benches can observe the loop.
pub fn execute_thread(state: &Arc<RunState>, thread: &mut RunThread) -> u64 {
    let mut dispatched: u64 = 0;

    while !thread.at_eof() && thread.has_frames() {
        let byte = thread.next();
        if let Err(err) = handler_for(byte)(state, thread) {
            error!(target: "lican::vm::dispatch", opcode = byte, error = %err, "instruction failed, aborting thread");
            break;
        }
        // keep one observable effect per iteration so the loop cannot be
        // fused away under optimization
        dispatched = black_box(dispatched + 1);
    }

    thread.clean_up();
    dispatched
}

/// Run thread 0 inline from `start`, then wait out every detached thread.
pub fn run_to_depletion(state: &Arc<RunState>, start: ChunkPos) -> Result<()> {
    let mut main = state.spawn_thread(start)?;
    let dispatched = execute_thread(state, &mut main);
    debug!(target: "lican::vm::dispatch", dispatched, "main thread finished");

    while !state.are_threads_depleted() {
        std::thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}
