//! LIR (Low-level Intermediate Representation): the linear bytecode format
//! produced by `noct-compiler`'s HIR→LIR lowering (spec §4.4) and consumed
//! by the interpreter (§4.5), the bytecode container (§4.7), and the
//! C translation back end (§4.8).
//!
//! Instructions are variable-length: one opcode byte followed by an
//! operand layout fixed per opcode (spec §3's opcode table). Temporary
//! indices are 16-bit, jump targets are 32-bit absolute byte offsets, and
//! inline string operands are length-prefixed with a precomputed 32-bit
//! FNV hash so the interpreter never rehashes a symbol name at call time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::fnv1a_32;

/// Opcodes for the NoctLang register VM (spec §3 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0x00,
    Assign = 0x01,
    IConst = 0x02,
    FConst = 0x03,
    SConst = 0x04,
    AConst = 0x05,
    DConst = 0x06,
    Inc = 0x07,
    Neg = 0x08,
    Not = 0x09,
    Add = 0x0A,
    Sub = 0x0B,
    Mul = 0x0C,
    Div = 0x0D,
    Mod = 0x0E,
    And = 0x0F,
    Or = 0x10,
    Xor = 0x11,
    Shl = 0x12,
    Shr = 0x13,
    Lt = 0x14,
    Lte = 0x15,
    Gt = 0x16,
    Gte = 0x17,
    Eq = 0x18,
    Neq = 0x19,
    Eqi = 0x1A,
    LoadArray = 0x1B,
    StoreArray = 0x1C,
    Len = 0x1D,
    GetDictKeyByIndex = 0x1E,
    GetDictValByIndex = 0x1F,
    StoreDot = 0x20,
    LoadDot = 0x21,
    StoreSymbol = 0x22,
    LoadSymbol = 0x23,
    Call = 0x24,
    ThisCall = 0x25,
    Jmp = 0x26,
    JmpIfTrue = 0x27,
    JmpIfFalse = 0x28,
    JmpIfEq = 0x29,
    LineInfo = 0x2A,
}

/// A decoded inline string operand: its bytes plus the hash the compiler
/// precomputed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedString {
    pub text: String,
    pub hash: u32,
}

impl HashedString {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = fnv1a_32(text.as_bytes());
        Self { text, hash }
    }
}

/// A single decoded LIR instruction. Storage remains the flat byte string
/// (`LirFunction::bytecode`); this is the in-memory shape `Instruction::decode`
/// produces one step at a time, shared by the interpreter and the C back end
/// so both walk the identical bounds-checked format.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    Assign { dst: u16, src: u16 },
    IConst { dst: u16, value: i32 },
    FConst { dst: u16, value: f32 },
    SConst { dst: u16, value: HashedString },
    AConst { dst: u16 },
    DConst { dst: u16 },
    Inc { dst: u16 },
    Neg { dst: u16, src: u16 },
    Not { dst: u16, src: u16 },
    Binary { op: OpCode, dst: u16, lhs: u16, rhs: u16 },
    LoadArray { dst: u16, arr: u16, key: u16 },
    StoreArray { arr: u16, key: u16, value: u16 },
    Len { dst: u16, src: u16 },
    GetDictKeyByIndex { dst: u16, dict: u16, index: u16 },
    GetDictValByIndex { dst: u16, dict: u16, index: u16 },
    StoreDot { obj: u16, field: HashedString, value: u16 },
    LoadDot { dst: u16, obj: u16, field: HashedString },
    StoreSymbol { name: HashedString, src: u16 },
    LoadSymbol { dst: u16, name: HashedString },
    Call { dst: u16, func: u16, args: Vec<u16> },
    ThisCall { dst: u16, recv: u16, name: HashedString, args: Vec<u16> },
    Jmp { addr: u32 },
    JmpIfTrue { cond: u16, addr: u32 },
    JmpIfFalse { cond: u16, addr: u32 },
    JmpIfEq { cond: u16, addr: u32 },
    LineInfo { line: u32 },
}

/// The opcodes that take the `Binary { op, dst, lhs, rhs }` shape.
pub const BINARY_OPS: &[OpCode] = &[
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::Mod,
    OpCode::And,
    OpCode::Or,
    OpCode::Xor,
    OpCode::Shl,
    OpCode::Shr,
    OpCode::Lt,
    OpCode::Lte,
    OpCode::Gt,
    OpCode::Gte,
    OpCode::Eq,
    OpCode::Neq,
    OpCode::Eqi,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("Broken bytecode.")]
    Broken,
    #[error("Broken bytecode. (invalid UTF-8 in string operand)")]
    InvalidUtf8,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pc: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, BytecodeError> {
        let b = *self.bytes.get(self.pc).ok_or(BytecodeError::Broken)?;
        self.pc += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16, BytecodeError> {
        let hi = self.u8()? as u16;
        let lo = self.u8()? as u16;
        Ok((hi << 8) | lo)
    }

    fn u32(&mut self) -> Result<u32, BytecodeError> {
        let mut v: u32 = 0;
        for _ in 0..4 {
            v = (v << 8) | self.u8()? as u32;
        }
        Ok(v)
    }

    fn string(&mut self) -> Result<HashedString, BytecodeError> {
        let len = self.u32()? as usize;
        let hash = self.u32()?;
        if self.pc + len > self.bytes.len() {
            return Err(BytecodeError::Broken);
        }
        let raw = &self.bytes[self.pc..self.pc + len];
        self.pc += len;
        let text = std::str::from_utf8(raw)
            .map_err(|_| BytecodeError::InvalidUtf8)?
            .to_string();
        Ok(HashedString { text, hash })
    }
}

impl Instruction {
    /// Decode one instruction starting at `*pc`, advancing `*pc` past it.
    /// Every read is bounds-checked against `bytecode.len()` (spec invariant
    /// (a)); any violation returns `BytecodeError::Broken` ("Broken
    /// bytecode.").
    pub fn decode(bytecode: &[u8], pc: &mut usize) -> Result<Instruction, BytecodeError> {
        let mut r = Reader { bytes: bytecode, pc: *pc };
        let op_byte = r.u8()?;
        let op = opcode_from_u8(op_byte).ok_or(BytecodeError::Broken)?;
        let instr = match op {
            OpCode::Nop => Instruction::Nop,
            OpCode::Assign => Instruction::Assign { dst: r.u16()?, src: r.u16()? },
            OpCode::IConst => {
                let dst = r.u16()?;
                let value = r.u32()? as i32;
                Instruction::IConst { dst, value }
            }
            OpCode::FConst => {
                let dst = r.u16()?;
                let bits = r.u32()?;
                Instruction::FConst { dst, value: f32::from_bits(bits) }
            }
            OpCode::SConst => {
                let dst = r.u16()?;
                Instruction::SConst { dst, value: r.string()? }
            }
            OpCode::AConst => Instruction::AConst { dst: r.u16()? },
            OpCode::DConst => Instruction::DConst { dst: r.u16()? },
            OpCode::Inc => Instruction::Inc { dst: r.u16()? },
            OpCode::Neg => Instruction::Neg { dst: r.u16()?, src: r.u16()? },
            OpCode::Not => Instruction::Not { dst: r.u16()?, src: r.u16()? },
            op if BINARY_OPS.contains(&op) => {
                let dst = r.u16()?;
                let lhs = r.u16()?;
                let rhs = r.u16()?;
                Instruction::Binary { op, dst, lhs, rhs }
            }
            OpCode::LoadArray => Instruction::LoadArray { dst: r.u16()?, arr: r.u16()?, key: r.u16()? },
            OpCode::StoreArray => Instruction::StoreArray { arr: r.u16()?, key: r.u16()?, value: r.u16()? },
            OpCode::Len => Instruction::Len { dst: r.u16()?, src: r.u16()? },
            OpCode::GetDictKeyByIndex => {
                Instruction::GetDictKeyByIndex { dst: r.u16()?, dict: r.u16()?, index: r.u16()? }
            }
            OpCode::GetDictValByIndex => {
                Instruction::GetDictValByIndex { dst: r.u16()?, dict: r.u16()?, index: r.u16()? }
            }
            OpCode::StoreDot => {
                let obj = r.u16()?;
                let field = r.string()?;
                let value = r.u16()?;
                Instruction::StoreDot { obj, field, value }
            }
            OpCode::LoadDot => {
                let dst = r.u16()?;
                let obj = r.u16()?;
                let field = r.string()?;
                Instruction::LoadDot { dst, obj, field }
            }
            OpCode::StoreSymbol => {
                let name = r.string()?;
                let src = r.u16()?;
                Instruction::StoreSymbol { name, src }
            }
            OpCode::LoadSymbol => {
                let dst = r.u16()?;
                let name = r.string()?;
                Instruction::LoadSymbol { dst, name }
            }
            OpCode::Call => {
                let dst = r.u16()?;
                let func = r.u16()?;
                let n = r.u8()? as usize;
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    args.push(r.u16()?);
                }
                Instruction::Call { dst, func, args }
            }
            OpCode::ThisCall => {
                let dst = r.u16()?;
                let recv = r.u16()?;
                let name = r.string()?;
                let n = r.u8()? as usize;
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    args.push(r.u16()?);
                }
                Instruction::ThisCall { dst, recv, name, args }
            }
            OpCode::Jmp => Instruction::Jmp { addr: r.u32()? },
            OpCode::JmpIfTrue => Instruction::JmpIfTrue { cond: r.u16()?, addr: r.u32()? },
            OpCode::JmpIfFalse => Instruction::JmpIfFalse { cond: r.u16()?, addr: r.u32()? },
            OpCode::JmpIfEq => Instruction::JmpIfEq { cond: r.u16()?, addr: r.u32()? },
            OpCode::LineInfo => Instruction::LineInfo { line: r.u32()? },
        };
        *pc = r.pc;
        Ok(instr)
    }

    /// Append this instruction's encoded bytes to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Instruction::Nop => out.push(OpCode::Nop as u8),
            Instruction::Assign { dst, src } => {
                out.push(OpCode::Assign as u8);
                put_u16(out, *dst);
                put_u16(out, *src);
            }
            Instruction::IConst { dst, value } => {
                out.push(OpCode::IConst as u8);
                put_u16(out, *dst);
                put_u32(out, *value as u32);
            }
            Instruction::FConst { dst, value } => {
                out.push(OpCode::FConst as u8);
                put_u16(out, *dst);
                put_u32(out, value.to_bits());
            }
            Instruction::SConst { dst, value } => {
                out.push(OpCode::SConst as u8);
                put_u16(out, *dst);
                put_string(out, value);
            }
            Instruction::AConst { dst } => {
                out.push(OpCode::AConst as u8);
                put_u16(out, *dst);
            }
            Instruction::DConst { dst } => {
                out.push(OpCode::DConst as u8);
                put_u16(out, *dst);
            }
            Instruction::Inc { dst } => {
                out.push(OpCode::Inc as u8);
                put_u16(out, *dst);
            }
            Instruction::Neg { dst, src } => {
                out.push(OpCode::Neg as u8);
                put_u16(out, *dst);
                put_u16(out, *src);
            }
            Instruction::Not { dst, src } => {
                out.push(OpCode::Not as u8);
                put_u16(out, *dst);
                put_u16(out, *src);
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                out.push(*op as u8);
                put_u16(out, *dst);
                put_u16(out, *lhs);
                put_u16(out, *rhs);
            }
            Instruction::LoadArray { dst, arr, key } => {
                out.push(OpCode::LoadArray as u8);
                put_u16(out, *dst);
                put_u16(out, *arr);
                put_u16(out, *key);
            }
            Instruction::StoreArray { arr, key, value } => {
                out.push(OpCode::StoreArray as u8);
                put_u16(out, *arr);
                put_u16(out, *key);
                put_u16(out, *value);
            }
            Instruction::Len { dst, src } => {
                out.push(OpCode::Len as u8);
                put_u16(out, *dst);
                put_u16(out, *src);
            }
            Instruction::GetDictKeyByIndex { dst, dict, index } => {
                out.push(OpCode::GetDictKeyByIndex as u8);
                put_u16(out, *dst);
                put_u16(out, *dict);
                put_u16(out, *index);
            }
            Instruction::GetDictValByIndex { dst, dict, index } => {
                out.push(OpCode::GetDictValByIndex as u8);
                put_u16(out, *dst);
                put_u16(out, *dict);
                put_u16(out, *index);
            }
            Instruction::StoreDot { obj, field, value } => {
                out.push(OpCode::StoreDot as u8);
                put_u16(out, *obj);
                put_string(out, field);
                put_u16(out, *value);
            }
            Instruction::LoadDot { dst, obj, field } => {
                out.push(OpCode::LoadDot as u8);
                put_u16(out, *dst);
                put_u16(out, *obj);
                put_string(out, field);
            }
            Instruction::StoreSymbol { name, src } => {
                out.push(OpCode::StoreSymbol as u8);
                put_string(out, name);
                put_u16(out, *src);
            }
            Instruction::LoadSymbol { dst, name } => {
                out.push(OpCode::LoadSymbol as u8);
                put_u16(out, *dst);
                put_string(out, name);
            }
            Instruction::Call { dst, func, args } => {
                out.push(OpCode::Call as u8);
                put_u16(out, *dst);
                put_u16(out, *func);
                out.push(args.len() as u8);
                for a in args {
                    put_u16(out, *a);
                }
            }
            Instruction::ThisCall { dst, recv, name, args } => {
                out.push(OpCode::ThisCall as u8);
                put_u16(out, *dst);
                put_u16(out, *recv);
                put_string(out, name);
                out.push(args.len() as u8);
                for a in args {
                    put_u16(out, *a);
                }
            }
            Instruction::Jmp { addr } => {
                out.push(OpCode::Jmp as u8);
                put_u32(out, *addr);
            }
            Instruction::JmpIfTrue { cond, addr } => {
                out.push(OpCode::JmpIfTrue as u8);
                put_u16(out, *cond);
                put_u32(out, *addr);
            }
            Instruction::JmpIfFalse { cond, addr } => {
                out.push(OpCode::JmpIfFalse as u8);
                put_u16(out, *cond);
                put_u32(out, *addr);
            }
            Instruction::JmpIfEq { cond, addr } => {
                out.push(OpCode::JmpIfEq as u8);
                put_u16(out, *cond);
                put_u32(out, *addr);
            }
            Instruction::LineInfo { line } => {
                out.push(OpCode::LineInfo as u8);
                put_u32(out, *line);
            }
        }
    }
}

fn opcode_from_u8(b: u8) -> Option<OpCode> {
    use OpCode::*;
    let all = [
        Nop, Assign, IConst, FConst, SConst, AConst, DConst, Inc, Neg, Not, Add, Sub, Mul, Div,
        Mod, And, Or, Xor, Shl, Shr, Lt, Lte, Gt, Gte, Eq, Neq, Eqi, LoadArray, StoreArray, Len,
        GetDictKeyByIndex, GetDictValByIndex, StoreDot, LoadDot, StoreSymbol, LoadSymbol, Call,
        ThisCall, Jmp, JmpIfTrue, JmpIfFalse, JmpIfEq, LineInfo,
    ];
    all.into_iter().find(|op| *op as u8 == b)
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.push((v >> 8) as u8);
    out.push((v & 0xFF) as u8);
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.push((v >> 24) as u8);
    out.push((v >> 16) as u8);
    out.push((v >> 8) as u8);
    out.push((v & 0xFF) as u8);
}

fn put_string(out: &mut Vec<u8>, s: &HashedString) {
    put_u32(out, s.text.len() as u32);
    put_u32(out, s.hash);
    out.extend_from_slice(s.text.as_bytes());
}

/// A compiled function: header plus its bytecode blob (spec §3 "LIR").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LirFunction {
    pub name: String,
    pub params: Vec<String>,
    pub tmpvar_size: u16,
    pub bytecode: Vec<u8>,
}

impl LirFunction {
    pub fn bytecode_size(&self) -> u32 {
        self.bytecode.len() as u32
    }

    /// Validate that every jump target in this function's bytecode lands on
    /// an instruction boundary within bounds (spec invariant (c)). Also
    /// checks every temporary index operand against `tmpvar_size`
    /// (invariant (b)).
    pub fn verify(&self) -> Result<(), BytecodeError> {
        let mut boundaries = std::collections::HashSet::new();
        let mut pc = 0usize;
        while pc < self.bytecode.len() {
            boundaries.insert(pc);
            let before = pc;
            let instr = Instruction::decode(&self.bytecode, &mut pc)?;
            check_tmpvars(&instr, self.tmpvar_size)?;
            let _ = before;
        }
        boundaries.insert(self.bytecode.len());

        let mut pc = 0usize;
        while pc < self.bytecode.len() {
            let instr = Instruction::decode(&self.bytecode, &mut pc)?;
            for addr in jump_targets(&instr) {
                if !boundaries.contains(&(addr as usize)) {
                    return Err(BytecodeError::Broken);
                }
            }
        }
        Ok(())
    }
}

fn check_tmpvars(instr: &Instruction, tmpvar_size: u16) -> Result<(), BytecodeError> {
    let mut indices = Vec::new();
    match instr {
        Instruction::Assign { dst, src } => indices.extend([*dst, *src]),
        Instruction::IConst { dst, .. }
        | Instruction::FConst { dst, .. }
        | Instruction::SConst { dst, .. }
        | Instruction::AConst { dst }
        | Instruction::DConst { dst }
        | Instruction::Inc { dst } => indices.push(*dst),
        Instruction::Neg { dst, src } | Instruction::Not { dst, src } | Instruction::Len { dst, src } => {
            indices.extend([*dst, *src])
        }
        Instruction::Binary { dst, lhs, rhs, .. } => indices.extend([*dst, *lhs, *rhs]),
        Instruction::LoadArray { dst, arr, key } => indices.extend([*dst, *arr, *key]),
        Instruction::StoreArray { arr, key, value } => indices.extend([*arr, *key, *value]),
        Instruction::GetDictKeyByIndex { dst, dict, index }
        | Instruction::GetDictValByIndex { dst, dict, index } => indices.extend([*dst, *dict, *index]),
        Instruction::StoreDot { obj, value, .. } => indices.extend([*obj, *value]),
        Instruction::LoadDot { dst, obj, .. } => indices.extend([*dst, *obj]),
        Instruction::StoreSymbol { src, .. } => indices.push(*src),
        Instruction::LoadSymbol { dst, .. } => indices.push(*dst),
        Instruction::Call { dst, func, args } => {
            indices.push(*dst);
            indices.push(*func);
            indices.extend(args.iter().copied());
        }
        Instruction::ThisCall { dst, recv, args, .. } => {
            indices.push(*dst);
            indices.push(*recv);
            indices.extend(args.iter().copied());
        }
        Instruction::JmpIfTrue { cond, .. }
        | Instruction::JmpIfFalse { cond, .. }
        | Instruction::JmpIfEq { cond, .. } => indices.push(*cond),
        Instruction::Nop | Instruction::Jmp { .. } | Instruction::LineInfo { .. } => {}
    }
    if indices.iter().any(|i| *i >= tmpvar_size) {
        return Err(BytecodeError::Broken);
    }
    Ok(())
}

fn jump_targets(instr: &Instruction) -> Vec<u32> {
    match instr {
        Instruction::Jmp { addr }
        | Instruction::JmpIfTrue { addr, .. }
        | Instruction::JmpIfFalse { addr, .. }
        | Instruction::JmpIfEq { addr, .. } => vec![*addr],
        _ => vec![],
    }
}

/// A compiled module: every top-level function from one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LirModule {
    pub source_name: String,
    pub functions: Vec<LirFunction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(instr: Instruction) {
        let mut buf = Vec::new();
        instr.encode(&mut buf);
        let mut pc = 0;
        let decoded = Instruction::decode(&buf, &mut pc).unwrap();
        assert_eq!(pc, buf.len());
        assert_eq!(decoded, instr);
    }

    #[test]
    fn encodes_and_decodes_every_shape() {
        roundtrip(Instruction::Nop);
        roundtrip(Instruction::IConst { dst: 1, value: -7 });
        roundtrip(Instruction::FConst { dst: 2, value: 3.5 });
        roundtrip(Instruction::SConst { dst: 3, value: HashedString::new("hello") });
        roundtrip(Instruction::Binary { op: OpCode::Add, dst: 0, lhs: 1, rhs: 2 });
        roundtrip(Instruction::Call { dst: 0, func: 1, args: vec![2, 3, 4] });
        roundtrip(Instruction::Jmp { addr: 42 });
        roundtrip(Instruction::LineInfo { line: 10 });
    }

    #[test]
    fn truncated_stream_is_broken_bytecode() {
        let bytes = [OpCode::IConst as u8, 0, 1];
        let mut pc = 0;
        assert_eq!(Instruction::decode(&bytes, &mut pc), Err(BytecodeError::Broken));
    }

    #[test]
    fn jmp_past_end_fails_verify() {
        let mut bytecode = Vec::new();
        Instruction::Jmp { addr: 1000 }.encode(&mut bytecode);
        let f = LirFunction {
            name: "f".into(),
            params: vec![],
            tmpvar_size: 1,
            bytecode,
        };
        assert_eq!(f.verify(), Err(BytecodeError::Broken));
    }

    #[test]
    fn tmpvar_out_of_range_fails_verify() {
        let mut bytecode = Vec::new();
        Instruction::IConst { dst: 5, value: 1 }.encode(&mut bytecode);
        let f = LirFunction {
            name: "f".into(),
            params: vec![],
            tmpvar_size: 1,
            bytecode,
        };
        assert_eq!(f.verify(), Err(BytecodeError::Broken));
    }
}
