use std::fmt::{Display, Write};
use std::io;

use thiserror::Error;

// Both operands must be numbers; the divisor was already checked by the
// Divide arm before this runs.
macro_rules! numeric_binary {
    ($self:ident, $at:ident, $op:tt) => {{
        let b = $self.pop()?;
        let a = $self.pop()?;
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                // Lox is lax about NaN comparisons, so no special casing.
                #[allow(clippy::float_cmp)]
                $self.stack.push((a $op b).into());
            }
            _ => return Err($self.runtime_error($at, "Operands must be numbers.")),
        }
    }};
}

/// A single instruction, in a parsed/type-safe format.
///
/// The chunk stores raw bytes; this type is the typed view used on both
/// sides of the wire. The compiler serializes through [`Instruction::write_to`]
/// and the VM decodes through [`Instruction::from_bytes`] at each dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Load a constant by its index into the constant table.
    Constant(u8),
    /// Put nil on the stack.
    Nil,
    /// Put true on the stack.
    True,
    /// Put false on the stack.
    False,
    /// Discard the top of the stack (a no-op when the stack is empty; see
    /// the jump emission notes in the compiler).
    Pop,
    /// Push the value of the global named by the constant at the index.
    GetGlobal(u8),
    /// Pop a value and bind it to the global named by the constant.
    DefineGlobal(u8),
    /// Rebind an existing global; the assigned value stays on the stack.
    SetGlobal(u8),
    /// Pop two and push whether they are equal.
    Equal,
    /// If stack is TOP: b, a, ..., push the bool a>b. Numbers only.
    Greater,
    /// If stack is TOP: b, a, ..., push the bool a<b. Numbers only.
    Less,
    /// If stack is TOP: b, a, ..., pop two and push (a+b).
    Add,
    /// If stack is TOP: b, a, ..., pop two and push (a-b).
    Subtract,
    /// If stack is TOP: b, a, ..., pop two and push (a*b).
    Multiply,
    /// If stack is TOP: b, a, ..., pop two and push (a/b).
    Divide,
    /// Logical negation of the top stack item.
    Not,
    /// Negate the top value on the stack. Numbers only.
    Negate,
    /// Pop and print the top value, with a trailing newline.
    Print,
    /// Skip forward by the operand (relative to the next instruction).
    Jump(u16),
    /// If the top is falsy, pop it and skip forward by the operand;
    /// otherwise leave it for the fall-through Pop.
    JumpIfFalse(u16),
    /// Skip backward by the operand (relative to the next instruction).
    Loop(u16),
    /// Halt execution of the chunk.
    Return,
}

impl Instruction {
    const OP_CONSTANT: u8 = 0;
    const OP_NIL: u8 = 1;
    const OP_TRUE: u8 = 2;
    const OP_FALSE: u8 = 3;
    const OP_POP: u8 = 4;
    const OP_GET_GLOBAL: u8 = 5;
    const OP_DEFINE_GLOBAL: u8 = 6;
    const OP_SET_GLOBAL: u8 = 7;
    const OP_EQUAL: u8 = 8;
    const OP_GREATER: u8 = 9;
    const OP_LESS: u8 = 10;
    const OP_ADD: u8 = 11;
    const OP_SUBTRACT: u8 = 12;
    const OP_MULTIPLY: u8 = 13;
    const OP_DIVIDE: u8 = 14;
    const OP_NOT: u8 = 15;
    const OP_NEGATE: u8 = 16;
    const OP_PRINT: u8 = 17;
    const OP_JUMP: u8 = 18;
    const OP_JUMP_IF_FALSE: u8 = 19;
    const OP_LOOP: u8 = 20;
    const OP_RETURN: u8 = 21;

    /// Try to decode an instruction from the start of `bytes`, returning it
    /// with its encoded width. `None` means an unknown opcode or operands
    /// truncated by the end of the chunk.
    pub fn from_bytes(bytes: &[u8]) -> Option<(Instruction, usize)> {
        let byte_operand = |bytes: &[u8]| bytes.get(1).copied();
        let short_operand =
            |bytes: &[u8]| Some(u16::from_be_bytes([*bytes.get(1)?, *bytes.get(2)?]));
        let instruction = match *bytes.first()? {
            Self::OP_CONSTANT => Instruction::Constant(byte_operand(bytes)?),
            Self::OP_NIL => Instruction::Nil,
            Self::OP_TRUE => Instruction::True,
            Self::OP_FALSE => Instruction::False,
            Self::OP_POP => Instruction::Pop,
            Self::OP_GET_GLOBAL => Instruction::GetGlobal(byte_operand(bytes)?),
            Self::OP_DEFINE_GLOBAL => Instruction::DefineGlobal(byte_operand(bytes)?),
            Self::OP_SET_GLOBAL => Instruction::SetGlobal(byte_operand(bytes)?),
            Self::OP_EQUAL => Instruction::Equal,
            Self::OP_GREATER => Instruction::Greater,
            Self::OP_LESS => Instruction::Less,
            Self::OP_ADD => Instruction::Add,
            Self::OP_SUBTRACT => Instruction::Subtract,
            Self::OP_MULTIPLY => Instruction::Multiply,
            Self::OP_DIVIDE => Instruction::Divide,
            Self::OP_NOT => Instruction::Not,
            Self::OP_NEGATE => Instruction::Negate,
            Self::OP_PRINT => Instruction::Print,
            Self::OP_JUMP => Instruction::Jump(short_operand(bytes)?),
            Self::OP_JUMP_IF_FALSE => Instruction::JumpIfFalse(short_operand(bytes)?),
            Self::OP_LOOP => Instruction::Loop(short_operand(bytes)?),
            Self::OP_RETURN => Instruction::Return,
            _ => return None,
        };
        Some((instruction, instruction.num_bytes()))
    }

    /// Serialize the instruction into `writer`, returning the number of
    /// bytes written. Jump operands are big-endian.
    pub fn write_to<W>(&self, writer: &mut W) -> io::Result<usize>
    where
        W: io::Write,
    {
        match self {
            Self::Constant(idx) => writer.write(&[Self::OP_CONSTANT, *idx]),
            Self::Nil => writer.write(&[Self::OP_NIL]),
            Self::True => writer.write(&[Self::OP_TRUE]),
            Self::False => writer.write(&[Self::OP_FALSE]),
            Self::Pop => writer.write(&[Self::OP_POP]),
            Self::GetGlobal(idx) => writer.write(&[Self::OP_GET_GLOBAL, *idx]),
            Self::DefineGlobal(idx) => writer.write(&[Self::OP_DEFINE_GLOBAL, *idx]),
            Self::SetGlobal(idx) => writer.write(&[Self::OP_SET_GLOBAL, *idx]),
            Self::Equal => writer.write(&[Self::OP_EQUAL]),
            Self::Greater => writer.write(&[Self::OP_GREATER]),
            Self::Less => writer.write(&[Self::OP_LESS]),
            Self::Add => writer.write(&[Self::OP_ADD]),
            Self::Subtract => writer.write(&[Self::OP_SUBTRACT]),
            Self::Multiply => writer.write(&[Self::OP_MULTIPLY]),
            Self::Divide => writer.write(&[Self::OP_DIVIDE]),
            Self::Not => writer.write(&[Self::OP_NOT]),
            Self::Negate => writer.write(&[Self::OP_NEGATE]),
            Self::Print => writer.write(&[Self::OP_PRINT]),
            Self::Jump(offset) => {
                let [hi, lo] = offset.to_be_bytes();
                writer.write(&[Self::OP_JUMP, hi, lo])
            }
            Self::JumpIfFalse(offset) => {
                let [hi, lo] = offset.to_be_bytes();
                writer.write(&[Self::OP_JUMP_IF_FALSE, hi, lo])
            }
            Self::Loop(offset) => {
                let [hi, lo] = offset.to_be_bytes();
                writer.write(&[Self::OP_LOOP, hi, lo])
            }
            Self::Return => writer.write(&[Self::OP_RETURN]),
        }
    }

    /// Number of bytes in the encoded form of this instruction.
    pub fn num_bytes(&self) -> usize {
        match self {
            Self::Constant(_)
            | Self::GetGlobal(_)
            | Self::DefineGlobal(_)
            | Self::SetGlobal(_) => 2,
            Self::Jump(_) | Self::JumpIfFalse(_) | Self::Loop(_) => 3,
            _ => 1,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Constant(idx) => write!(f, "OP_CONSTANT {:4}", idx),
            Instruction::Nil => write!(f, "OP_NIL"),
            Instruction::True => write!(f, "OP_TRUE"),
            Instruction::False => write!(f, "OP_FALSE"),
            Instruction::Pop => write!(f, "OP_POP"),
            Instruction::GetGlobal(idx) => write!(f, "OP_GET_GLOBAL {:4}", idx),
            Instruction::DefineGlobal(idx) => write!(f, "OP_DEFINE_GLOBAL {:4}", idx),
            Instruction::SetGlobal(idx) => write!(f, "OP_SET_GLOBAL {:4}", idx),
            Instruction::Equal => write!(f, "OP_EQUAL"),
            Instruction::Greater => write!(f, "OP_GREATER"),
            Instruction::Less => write!(f, "OP_LESS"),
            Instruction::Add => write!(f, "OP_ADD"),
            Instruction::Subtract => write!(f, "OP_SUBTRACT"),
            Instruction::Multiply => write!(f, "OP_MULTIPLY"),
            Instruction::Divide => write!(f, "OP_DIVIDE"),
            Instruction::Not => write!(f, "OP_NOT"),
            Instruction::Negate => write!(f, "OP_NEGATE"),
            Instruction::Print => write!(f, "OP_PRINT"),
            Instruction::Jump(offset) => write!(f, "OP_JUMP {:4}", offset),
            Instruction::JumpIfFalse(offset) => write!(f, "OP_JUMP_IF_FALSE {:4}", offset),
            Instruction::Loop(offset) => write!(f, "OP_LOOP {:4}", offset),
            Instruction::Return => write!(f, "OP_RETURN"),
        }
    }
}

/// A chunk is the unit of execution for the VM: a byte-coded instruction
/// stream, a source line per byte, and a constant table.
#[derive(Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    lines: Vec<usize>,
    constants: Vec<Value>,
}

impl Chunk {
    /// A new chunk is empty.
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Number of code bytes written so far. Jump targets are expressed in
    /// terms of this.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether any code has been written.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Serialize an instruction into the code stream, recording `line` for
    /// each of its bytes.
    pub fn write_instruction(&mut self, instruction: Instruction, line: usize) {
        instruction
            .write_to(&mut self.code)
            .expect("writing bytecode to a Vec");
        self.lines.resize(self.code.len(), line);
    }

    /// Overwrite a two-byte operand at `offset` with `value`, big-endian.
    /// Used to patch jump placeholders once the target is known.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Add a constant to the chunk's constant table, returning its index.
    /// Indices must fit the single operand byte, so a chunk holds at most
    /// 256 constants.
    pub fn add_constant(&mut self, constant: Value) -> Result<u8, LoxError> {
        let idx = u8::try_from(self.constants.len())
            .map_err(|_| LoxError::InternalError(InternalError::TooManyConstants))?;
        self.constants.push(constant);
        Ok(idx)
    }

    /// The constant at `idx`, if there is one.
    pub fn constant(&self, idx: u8) -> Option<&Value> {
        self.constants.get(usize::from(idx))
    }

    /// The source line recorded for the byte at `offset`.
    pub fn line(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or_default()
    }

    /// Decode the instruction starting at byte `offset`, with its width.
    pub fn instruction_at(&self, offset: usize) -> Option<(Instruction, usize)> {
        Instruction::from_bytes(self.code.get(offset..)?)
    }

    /// Walk the code stream, decoding each instruction with its byte
    /// offset. Stops at the first undecodable byte.
    pub fn instructions(&self) -> impl Iterator<Item = (usize, Instruction)> + '_ {
        let mut offset = 0;
        std::iter::from_fn(move || {
            let (instruction, width) = self.instruction_at(offset)?;
            let at = offset;
            offset += width;
            Some((at, instruction))
        })
    }

    fn disassemble_instruction(&self, instruction: &Instruction, offset: usize) -> String {
        let mut text = format!("{:04} {:4} {}", offset, self.line(offset), instruction);
        match instruction {
            Instruction::Constant(idx)
            | Instruction::GetGlobal(idx)
            | Instruction::DefineGlobal(idx)
            | Instruction::SetGlobal(idx) => {
                if let Some(value) = self.constant(*idx) {
                    write!(&mut text, " '{}'", value).expect("writing to string");
                }
            }
            _ => {}
        }
        text
    }

    /// Return a human-readable listing of the chunk.
    pub fn disassemble(&self, title: &str) -> String {
        let mut text = format!("== {} ==\n", title);
        let mut offset = 0;
        while offset < self.code.len() {
            match self.instruction_at(offset) {
                Some((instruction, width)) => {
                    text.push_str(&self.disassemble_instruction(&instruction, offset));
                    text.push('\n');
                    offset += width;
                }
                None => {
                    writeln!(&mut text, "{:04} (bad byte {:#04x})", offset, self.code[offset])
                        .expect("writing to string");
                    break;
                }
            }
        }
        text
    }
}

/// VM-internal representation of a Lox value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Lox's single numeric type, backed by f64. Infinities and NaN exist
    /// but equality and ordering on them follow IEEE-754, not Lox lore.
    Number(f64),
    /// Boolean backed by a Rust bool.
    Boolean(bool),
    /// Nil is both a type and a value in Lox.
    Nil,
    /// A heap-allocated object; only strings in this core.
    Object(HeapRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Nil, Self::Nil) => true,
            // Strings compare by their bytes, not by identity.
            (Self::Object(a), Self::Object(b)) => {
                match (&*a.as_obj().borrow(), &*b.as_obj().borrow()) {
                    (Object::String(x), Object::String(y)) => x == y,
                }
            }
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Nil => write!(f, "nil"),
            Self::Object(o) => match &*o.as_obj().borrow() {
                Object::String(s) => write!(f, "{}", s),
            },
        }
    }
}

impl Value {
    /// Lox truthiness: nil and false are falsy, everything else is truthy,
    /// zero and the empty string included.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

pub use heap::{Heap, HeapRef, Object, SharedObject};

/// Upper bound on distinct global bindings; definitions past it are
/// silently dropped. A known limit of this core.
const MAX_GLOBALS: usize = 256;

// Global bindings: a linear list of (name, value) pairs. Names are
// compared by their string bytes so that the same spelling in different
// chunks finds the same binding.
#[derive(Debug, Default)]
struct Globals {
    entries: Vec<(HeapRef, Value)>,
}

impl Globals {
    fn position(&self, name: &HeapRef) -> Option<usize> {
        name.with_string(|wanted| {
            self.entries
                .iter()
                .position(|(bound, _)| bound.with_string(|s| s == wanted))
        })
    }

    fn get(&self, name: &HeapRef) -> Option<Value> {
        self.position(name).map(|i| self.entries[i].1.clone())
    }

    // Rebind an existing name; false if the name is unbound.
    fn assign(&mut self, name: &HeapRef, value: Value) -> bool {
        match self.position(name) {
            Some(i) => {
                self.entries[i].1 = value;
                true
            }
            None => false,
        }
    }

    // Bind a name, replacing any existing binding of the same spelling.
    fn define(&mut self, name: HeapRef, value: Value) {
        if let Some(i) = self.position(&name) {
            self.entries[i].1 = value;
        } else if self.entries.len() < MAX_GLOBALS {
            self.entries.push((name, value));
        }
    }
}

/// Starting capacity for the operand stack; it grows past this on demand.
const STACK_RESERVE: usize = 256;

/// Errors surfaced by the interpreter pipeline.
#[derive(Debug, Error)]
pub enum LoxError {
    /// Scanning or parsing failed. Details were already reported to stderr
    /// with their source location.
    #[error("compile error")]
    CompileError,
    /// Execution halted. `line` is the source line of the failing
    /// instruction; the message was already reported to stderr.
    #[error("[line {line}] {message}")]
    RuntimeError {
        /// Source line of the instruction that failed.
        line: usize,
        /// The runtime error message, e.g. `Operands must be numbers.`.
        message: String,
    },
    /// The print sink failed.
    #[error("output error: {0}")]
    Io(#[from] io::Error),
    /// Internal errors should not occur for code that compiled
    /// successfully, but just in case.
    #[error("lox internal error: {0}")]
    InternalError(#[from] InternalError),
}

/// VM faults that indicate malformed bytecode rather than a user error.
#[derive(Debug, Clone, Error)]
pub enum InternalError {
    /// A chunk has a limited number of slots for constants.
    #[error("tried to store more than 256 constants in a chunk")]
    TooManyConstants,
    /// An operand was needed from an empty stack.
    #[error("popped from an empty stack")]
    EmptyStack,
    /// An operand byte referenced a constant that does not exist or has
    /// the wrong type.
    #[error("bad constant reference {0}")]
    BadConstant(u8),
    /// The instruction stream ended mid-instruction or hit an unknown
    /// opcode.
    #[error("undecodable instruction at byte offset {0}")]
    BadInstruction(usize),
    /// A jump would leave the chunk.
    #[error("jump target outside the chunk")]
    BadJump,
}

// Whether the dispatch loop keeps going after an instruction.
enum Flow {
    Continue,
    Halt,
}

/// A Vm is a stateful executor of chunks: a fetch-decode-dispatch loop over
/// an operand stack and a table of global bindings.
#[derive(Debug)]
pub struct Vm<W = io::Stdout> {
    chunk: Chunk,
    ip: usize,
    stack: Vec<Value>,
    globals: Globals,
    // Owns every object the chunk's constants reference.
    heap: Heap,
    out: W,
}

impl Vm<io::Stdout> {
    /// A VM printing to stdout, owning the heap its chunk's constants
    /// live in.
    pub fn new_with_heap(chunk: Chunk, heap: Heap) -> Self {
        Vm::with_output(chunk, heap, io::stdout())
    }
}

impl<W: io::Write> Vm<W> {
    /// A VM with an explicit print sink. Tests capture program output by
    /// passing a `Vec<u8>` here.
    pub fn with_output(chunk: Chunk, heap: Heap, out: W) -> Self {
        Vm {
            chunk,
            ip: 0,
            stack: Vec::with_capacity(STACK_RESERVE),
            globals: Globals::default(),
            heap,
            out,
        }
    }

    /// Run the chunk until `OP_RETURN` or an error.
    pub fn interpret(&mut self) -> Result<(), LoxError> {
        loop {
            let at = self.ip;
            let (instruction, width) = self
                .chunk
                .instruction_at(at)
                .ok_or(InternalError::BadInstruction(at))?;
            #[cfg(feature = "trace")]
            {
                print!("[ ");
                for value in &self.stack {
                    print!("{} ", value);
                }
                println!("]");
                println!("{}", self.chunk.disassemble_instruction(&instruction, at));
            }
            // Advance past the operands first: jumps are relative to the
            // following instruction.
            self.ip = at + width;
            match self.execute(instruction, at)? {
                Flow::Continue => {}
                Flow::Halt => return Ok(()),
            }
        }
    }

    fn execute(&mut self, instruction: Instruction, at: usize) -> Result<Flow, LoxError> {
        match instruction {
            Instruction::Constant(idx) => {
                let value = self
                    .chunk
                    .constant(idx)
                    .cloned()
                    .ok_or(InternalError::BadConstant(idx))?;
                self.stack.push(value);
            }
            Instruction::Nil => self.stack.push(Value::Nil),
            Instruction::True => self.stack.push(Value::Boolean(true)),
            Instruction::False => self.stack.push(Value::Boolean(false)),
            Instruction::Pop => {
                // The false arm of a conditional jumps to a landing-site
                // Pop with the condition already consumed, so an empty
                // stack is allowed here.
                self.stack.pop();
            }
            Instruction::GetGlobal(idx) => {
                let name = self.constant_name(idx)?;
                match self.globals.get(&name) {
                    Some(value) => self.stack.push(value),
                    None => return Err(self.undefined_variable(at, &name)),
                }
            }
            Instruction::DefineGlobal(idx) => {
                let name = self.constant_name(idx)?;
                let value = self.pop()?;
                self.globals.define(name, value);
            }
            Instruction::SetGlobal(idx) => {
                let name = self.constant_name(idx)?;
                // Assignment is an expression: the value stays on the stack.
                let value = self.peek(0).cloned().ok_or(InternalError::EmptyStack)?;
                if !self.globals.assign(&name, value) {
                    return Err(self.undefined_variable(at, &name));
                }
            }
            Instruction::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.stack.push(Value::Boolean(a == b));
            }
            Instruction::Greater => numeric_binary!(self, at, >),
            Instruction::Less => numeric_binary!(self, at, <),
            Instruction::Add => numeric_binary!(self, at, +),
            Instruction::Subtract => numeric_binary!(self, at, -),
            Instruction::Multiply => numeric_binary!(self, at, *),
            Instruction::Divide => {
                if let Some(Value::Number(divisor)) = self.peek(0) {
                    if *divisor == 0.0 {
                        return Err(self.runtime_error(at, "Division by zero."));
                    }
                }
                numeric_binary!(self, at, /)
            }
            Instruction::Not => {
                let value = self.pop()?;
                self.stack.push(Value::Boolean(!value.is_truthy()));
            }
            Instruction::Negate => match self.pop()?.as_number() {
                Some(n) => self.stack.push(Value::Number(-n)),
                None => return Err(self.runtime_error(at, "Operand must be a number.")),
            },
            Instruction::Print => {
                let value = self.pop()?;
                writeln!(self.out, "{}", value)?;
            }
            Instruction::Jump(offset) => {
                self.ip = self
                    .ip
                    .checked_add(usize::from(offset))
                    .filter(|target| *target <= self.chunk.len())
                    .ok_or(InternalError::BadJump)?;
            }
            Instruction::JumpIfFalse(offset) => {
                let condition = self.peek(0).ok_or(InternalError::EmptyStack)?;
                if !condition.is_truthy() {
                    self.stack.pop();
                    self.ip = self
                        .ip
                        .checked_add(usize::from(offset))
                        .filter(|target| *target <= self.chunk.len())
                        .ok_or(InternalError::BadJump)?;
                }
            }
            Instruction::Loop(offset) => {
                self.ip = self
                    .ip
                    .checked_sub(usize::from(offset))
                    .ok_or(InternalError::BadJump)?;
            }
            Instruction::Return => return Ok(Flow::Halt),
        }
        Ok(Flow::Continue)
    }

    fn peek(&self, distance: usize) -> Option<&Value> {
        self.stack
            .len()
            .checked_sub(1 + distance)
            .map(|i| &self.stack[i])
    }

    fn pop(&mut self) -> Result<Value, LoxError> {
        self.stack
            .pop()
            .ok_or_else(|| InternalError::EmptyStack.into())
    }

    // The constant at `idx` must be a string object (a variable name).
    fn constant_name(&self, idx: u8) -> Result<HeapRef, LoxError> {
        match self.chunk.constant(idx) {
            Some(Value::Object(name)) => Ok(name.clone()),
            _ => Err(InternalError::BadConstant(idx).into()),
        }
    }

    // Report a runtime error to stderr and build the matching error value.
    fn runtime_error(&self, at: usize, message: impl Into<String>) -> LoxError {
        let message = message.into();
        eprintln!("Runtime error: {}", message);
        LoxError::RuntimeError {
            line: self.chunk.line(at),
            message,
        }
    }

    fn undefined_variable(&self, at: usize, name: &HeapRef) -> LoxError {
        let message = name.with_string(|s| format!("Undefined variable '{}'.", s));
        self.runtime_error(at, message)
    }
}

/// heap is the internal interface for allocating Lox objects whose
/// lifetime is tied to a compile+run cycle rather than to the stack.
///
/// The entry point is [`Heap::alloc_string`], which copies a string into a
/// heap node and returns a [`HeapRef`] handle. The underlying objects are
/// owned by the `Heap`; a `HeapRef` is only usable while the owning heap is
/// alive (using a stale one panics rather than being undefined behavior).
/// The specified language core allocates no cycles, so dropping the heap at
/// the end of a run reclaims everything and no collector is needed.
mod heap {
    use std::cell::RefCell;
    use std::ops::Deref;
    use std::rc::{Rc, Weak};

    /// A heap-resident Lox object. Strings are the only kind in this core.
    #[derive(Debug)]
    pub enum Object {
        /// An immutable string, used for variable names and string
        /// literal constants.
        String(String),
    }

    impl Object {
        /// The string contents of the object.
        pub fn as_string(&self) -> &str {
            let Object::String(s) = self;
            s
        }
    }

    // Nodes form a linked list so the heap owns every allocation, with the
    // head node owned by the Heap itself.
    #[derive(Debug)]
    struct HeapNode {
        next: Option<Box<HeapNode>>,
        object: Rc<RefCell<Object>>,
    }

    /// A strong, borrowable handle to a heap object, obtained from
    /// [`HeapRef::as_obj`].
    #[derive(Debug)]
    pub struct SharedObject(Rc<RefCell<Object>>);

    impl SharedObject {
        /// Borrow the object. Runtime borrow checking applies.
        pub fn borrow(&self) -> impl Deref<Target = Object> + '_ {
            self.0.borrow()
        }
    }

    /// A reference into the heap, valid while the owning [`Heap`] lives.
    #[derive(Debug, Clone)]
    pub struct HeapRef {
        value: Weak<RefCell<Object>>,
    }

    impl HeapRef {
        /// Upgrade to a usable handle. Panics if the owning heap has been
        /// dropped.
        pub fn as_obj(&self) -> SharedObject {
            SharedObject(self.value.upgrade().expect("heap ref outlived its heap"))
        }

        /// Apply `f` to the string contents of the referenced object.
        pub fn with_string<F, R>(&self, f: F) -> R
        where
            F: FnOnce(&str) -> R,
        {
            f(self.as_obj().borrow().as_string())
        }
    }

    /// Owns every Lox object allocated during one compile+run cycle.
    #[derive(Debug, Default)]
    pub struct Heap {
        head: Option<Box<HeapNode>>,
    }

    impl Heap {
        /// A new, empty heap.
        pub fn new() -> Heap {
            Heap { head: None }
        }

        /// Allocate a string object holding a copy of `value`.
        pub fn alloc_string(&mut self, value: &str) -> HeapRef {
            let object = Rc::new(RefCell::new(Object::String(value.to_string())));
            self.head = Some(Box::new(HeapNode {
                object: Rc::clone(&object),
                next: self.head.take(),
            }));
            HeapRef {
                value: Rc::downgrade(&object),
            }
        }
    }

}
