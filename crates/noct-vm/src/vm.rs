//! The register VM: globals, heap, frame stack, and opcode dispatch loop
//! (spec §3 "Environment (runtime)", §4.5 "Interpreter").

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use noct_core::error::ErrorChannel;
use noct_core::lir::{Instruction, LirFunction, LirModule, OpCode};
use tracing::trace;

use crate::config::VmConfig;
use crate::error::VmError;
use crate::frame::Frame;
use crate::heap::{Heap, HeapObject};
use crate::native::{NativeFn, PinGuard};
use crate::strings::StringTable;
use crate::value::{FuncValue, HeapRef, Value};

pub struct Vm {
    pub(crate) heap: Heap,
    strings: StringTable,
    globals: HashMap<String, Value>,
    /// Names each global-defining module declared local to some function;
    /// carried only for diagnostics, resolution itself happens at compile
    /// time (see SPEC_FULL.md's LOADSYMBOL/STORESYMBOL resolution note).
    source_name: String,
    frames: Vec<Frame>,
    pub(crate) pins: Vec<Value>,
    config: VmConfig,
    last_error: Option<ErrorChannel>,
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            heap: Heap::new(),
            strings: StringTable::new(),
            globals: HashMap::new(),
            source_name: String::new(),
            frames: Vec::new(),
            pins: Vec::new(),
            config,
            last_error: None,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<&ErrorChannel> {
        self.last_error.as_ref()
    }

    /// Registers every top-level function in `module` as a global
    /// (spec §6 "Register a named source file... install top-level
    /// functions as globals").
    pub fn register_module(&mut self, module: LirModule) {
        self.source_name = module.source_name.clone();
        for func in module.functions {
            let name = func.name.clone();
            self.globals.insert(name, Value::Func(FuncValue::Source(Rc::new(func))));
        }
    }

    /// Deserializes a bytecode container and installs it the same way
    /// `register_module` does (spec §6 "Register a bytecode file:
    /// deserialize, install").
    pub fn register_bytecode(&mut self, data: &[u8]) -> Result<(), noct_core::bytecode::ContainerError> {
        let module = noct_core::bytecode::deserialize(data)?;
        self.register_module(module);
        Ok(())
    }

    pub fn register_native(&mut self, name: impl Into<String>, f: impl Fn(&mut Vm, &[Value]) -> Result<Value, VmError> + 'static) {
        self.globals.insert(name.into(), Value::Func(FuncValue::Native(Rc::new(f))));
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn intern(&mut self, s: &str) -> Value {
        Value::Str(self.strings.intern(s))
    }

    pub fn make_array(&mut self, items: Vec<Value>) -> Value {
        Value::Array(self.heap.allocate(HeapObject::Array(items)))
    }

    pub fn make_dict(&mut self) -> Value {
        Value::Dict(self.heap.allocate(HeapObject::Dict(IndexMap::new())))
    }

    /// Pins `value` as a GC root for the lifetime of the returned guard
    /// (spec §3 "pinning mechanism").
    pub fn pin(&mut self, value: Value) -> PinGuard<'_> {
        PinGuard::new(self, value)
    }

    /// Host-facing array/dict element read (spec §6 "get/set array element,
    /// get/set dict key"), identical to the LOADARRAY/LOADDOT opcodes.
    pub fn get_element(&mut self, base: Value, key: Value) -> Result<Value, VmError> {
        let line = self.current_line();
        self.load_subscript(base, key, line)
    }

    /// Host-facing array/dict element write, identical to
    /// STOREARRAY/STOREDOT.
    pub fn set_element(&mut self, base: Value, key: Value, value: Value) -> Result<(), VmError> {
        let line = self.current_line();
        self.store_subscript(base, key, value, line)
    }

    /// Forces a collection now (spec §4.6 "may also be forced at VM
    /// shutdown for leak checks").
    pub fn collect_garbage(&mut self) {
        let roots = self
            .globals
            .values()
            .cloned()
            .chain(self.pins.iter().cloned())
            .chain(self.frames.iter().flat_map(|f| f.tmpvars.iter().cloned()))
            .collect::<Vec<_>>();
        self.heap.collect(roots.into_iter());
    }

    fn maybe_collect(&mut self) {
        if self.heap.allocs_since_gc() >= self.config.gc_soft_threshold {
            self.collect_garbage();
        }
    }

    /// Calls a named global function with `args`, matching the spec §6
    /// "Enter VM" operation.
    pub fn enter(&mut self, name: &str, args: &[Value]) -> Result<Value, VmError> {
        let func = self
            .globals
            .get(name)
            .cloned()
            .ok_or_else(|| self.fail(0, VmError::UnknownSymbol(name.to_string())))?;
        self.call_value(&func, args)
    }

    fn call_value(&mut self, callee: &Value, args: &[Value]) -> Result<Value, VmError> {
        match callee {
            Value::Func(FuncValue::Source(lir)) => self.call_source(lir.clone(), args),
            Value::Func(FuncValue::Native(native)) => {
                let native = native.clone();
                native(self, args)
            }
            other => Err(self.fail(self.current_line(), VmError::NotCallable(other.type_name().to_string()))),
        }
    }

    fn call_source(&mut self, func: Rc<LirFunction>, args: &[Value]) -> Result<Value, VmError> {
        if self.frames.len() as u32 >= self.config.call_depth_limit {
            return Err(self.fail(self.current_line(), VmError::CallDepthExceeded(self.config.call_depth_limit)));
        }
        if args.len() != func.params.len() {
            return Err(self.fail(
                self.current_line(),
                VmError::ArgCountMismatch { expected: func.params.len(), got: args.len() },
            ));
        }

        let mut frame = Frame::new(func);
        for (i, arg) in args.iter().enumerate() {
            frame.tmpvars[i] = arg.clone();
        }
        self.frames.push(frame);
        let result = self.run_frame();
        self.frames.pop();
        self.maybe_collect();
        result
    }

    /// The debug line of the topmost active frame, or 0 outside any call
    /// (e.g. a native function formatting an error before anything has
    /// run). Exposed so native functions registered via `register_native`
    /// can attribute their own errors to the caller's current line.
    pub fn current_line(&self) -> u32 {
        self.frames.last().map(|f| f.line).unwrap_or(0)
    }

    fn fail(&mut self, line: u32, err: VmError) -> VmError {
        self.last_error = Some(ErrorChannel::new(self.source_name.clone(), line, err.to_string()));
        err
    }

    /// Drives the top frame's bytecode to completion (either a `$return`
    /// store followed by falling off the end, or the function's natural
    /// end of bytecode with no explicit return).
    fn run_frame(&mut self) -> Result<Value, VmError> {
        loop {
            let frame_len = self.frames.last().unwrap().function.bytecode.len();
            let pc = self.frames.last().unwrap().pc;
            if pc >= frame_len {
                return Ok(self.return_slot_value());
            }

            let instr = {
                let frame = self.frames.last().unwrap();
                let mut cursor = frame.pc;
                let decoded = Instruction::decode(&frame.function.bytecode, &mut cursor)
                    .map_err(|_| ())
                    .map_err(|_| VmError::BrokenBytecode);
                match decoded {
                    Ok(instr) => {
                        self.frames.last_mut().unwrap().pc = cursor;
                        instr
                    }
                    Err(e) => return Err(self.fail(self.current_line(), e)),
                }
            };

            trace!(?instr, "dispatch");

            if let Some(result) = self.exec(instr)? {
                return Ok(result);
            }
        }
    }

    fn tmp(&self, i: u16) -> Value {
        self.frames.last().unwrap().tmpvars[i as usize].clone()
    }

    fn set_tmp(&mut self, i: u16, v: Value) {
        self.frames.last_mut().unwrap().tmpvars[i as usize] = v;
    }

    /// Executes one decoded instruction. Returns `Some(value)` when the
    /// frame should return (bytecode fell off the end of the function, the
    /// only terminator NoctLang bytecode has — `return` is an assignment to
    /// `$return` followed by a jump to the end, per HIR lowering).
    fn exec(&mut self, instr: Instruction) -> Result<Option<Value>, VmError> {
        match instr {
            Instruction::Nop => {}
            Instruction::Assign { dst, src } => self.set_tmp(dst, self.tmp(src)),
            Instruction::IConst { dst, value } => self.set_tmp(dst, Value::Int(value)),
            Instruction::FConst { dst, value } => self.set_tmp(dst, Value::Float(value)),
            Instruction::SConst { dst, value } => {
                let s = self.strings.intern_hashed(&value.text, value.hash);
                self.set_tmp(dst, Value::Str(s));
            }
            Instruction::AConst { dst } => {
                let v = self.make_array(Vec::new());
                self.set_tmp(dst, v);
            }
            Instruction::DConst { dst } => {
                let v = self.make_dict();
                self.set_tmp(dst, v);
            }
            Instruction::Inc { dst } => {
                let v = match self.tmp(dst) {
                    Value::Int(i) => Value::Int(i.wrapping_add(1)),
                    Value::Float(f) => Value::Float(f + 1.0),
                    other => return Err(self.fail(self.current_line(), VmError::TypeMismatch(other.type_name().to_string()))),
                };
                self.set_tmp(dst, v);
            }
            Instruction::Neg { dst, src } => {
                let v = match self.tmp(src) {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    other => return Err(self.fail(self.current_line(), VmError::TypeMismatch(other.type_name().to_string()))),
                };
                self.set_tmp(dst, v);
            }
            Instruction::Not { dst, src } => {
                let truthy = self.tmp(src).is_truthy();
                self.set_tmp(dst, Value::Int(if truthy { 0 } else { 1 }));
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                let line = self.current_line();
                let result = self.eval_binary(op, self.tmp(lhs), self.tmp(rhs), line)?;
                self.set_tmp(dst, result);
            }
            Instruction::LoadArray { dst, arr, key } => {
                let line = self.current_line();
                let v = self.load_subscript(self.tmp(arr), self.tmp(key), line)?;
                self.set_tmp(dst, v);
            }
            Instruction::StoreArray { arr, key, value } => {
                let line = self.current_line();
                self.store_subscript(self.tmp(arr), self.tmp(key), self.tmp(value), line)?;
            }
            Instruction::Len { dst, src } => {
                let line = self.current_line();
                let n = self.value_len(self.tmp(src), line)?;
                self.set_tmp(dst, Value::Int(n));
            }
            Instruction::GetDictKeyByIndex { dst, dict, index } => {
                let line = self.current_line();
                let v = self.dict_entry_by_index(self.tmp(dict), self.tmp(index), true, line)?;
                self.set_tmp(dst, v);
            }
            Instruction::GetDictValByIndex { dst, dict, index } => {
                let line = self.current_line();
                let v = self.dict_entry_by_index(self.tmp(dict), self.tmp(index), false, line)?;
                self.set_tmp(dst, v);
            }
            Instruction::StoreDot { obj, field, value } => {
                let key = self.strings.intern_hashed(&field.text, field.hash);
                let line = self.current_line();
                self.store_subscript(self.tmp(obj), Value::Str(key), self.tmp(value), line)?;
            }
            Instruction::LoadDot { dst, obj, field } => {
                let key = self.strings.intern_hashed(&field.text, field.hash);
                let line = self.current_line();
                let v = self.load_subscript(self.tmp(obj), Value::Str(key), line)?;
                self.set_tmp(dst, v);
            }
            Instruction::StoreSymbol { name, src } => {
                self.globals.insert(name.text, self.tmp(src));
            }
            Instruction::LoadSymbol { dst, name } => {
                let v = self.globals.get(&name.text).cloned().unwrap_or(Value::Null);
                self.set_tmp(dst, v);
            }
            Instruction::Call { dst, func, args } => {
                let callee = self.tmp(func);
                let arg_values: Vec<Value> = args.iter().map(|a| self.tmp(*a)).collect();
                let result = self.call_value(&callee, &arg_values)?;
                self.set_tmp(dst, result);
            }
            Instruction::ThisCall { dst, recv, name, args } => {
                let recv_value = self.tmp(recv);
                let line = self.current_line();
                let key = self.strings.intern_hashed(&name.text, name.hash);
                let callee = self.load_subscript(recv_value.clone(), Value::Str(key), line)?;
                let mut arg_values = Vec::with_capacity(args.len() + 1);
                arg_values.push(recv_value);
                arg_values.extend(args.iter().map(|a| self.tmp(*a)));
                let result = self.call_value(&callee, &arg_values)?;
                self.set_tmp(dst, result);
            }
            Instruction::Jmp { addr } => self.frames.last_mut().unwrap().pc = addr as usize,
            Instruction::JmpIfTrue { cond, addr } => {
                if self.tmp(cond).is_truthy() {
                    self.frames.last_mut().unwrap().pc = addr as usize;
                }
            }
            Instruction::JmpIfFalse { cond, addr } => {
                if !self.tmp(cond).is_truthy() {
                    self.frames.last_mut().unwrap().pc = addr as usize;
                }
            }
            Instruction::JmpIfEq { cond, addr } => {
                // JIT hint (spec §9): pure interpreter treats it as JMPIFTRUE.
                if self.tmp(cond).is_truthy() {
                    self.frames.last_mut().unwrap().pc = addr as usize;
                }
            }
            Instruction::LineInfo { line } => self.frames.last_mut().unwrap().line = line,
        }

        let frame = self.frames.last().unwrap();
        if frame.pc >= frame.function.bytecode.len() {
            return Ok(Some(self.return_slot_value()));
        }
        Ok(None)
    }

    /// `$return` always occupies the temporary slot immediately after the
    /// function's parameters: HIR seeds a function's local-symbol set with
    /// its parameters and then `$return` before any other local is
    /// collected, and temporary indices are assigned in that set's
    /// iteration order (see `noct-compiler`'s HIR builder).
    fn return_slot_value(&self) -> Value {
        let frame = self.frames.last().unwrap();
        let slot = frame.function.params.len();
        frame.tmpvars.get(slot).cloned().unwrap_or(Value::Null)
    }

    fn eval_binary(&mut self, op: OpCode, lhs: Value, rhs: Value, line: u32) -> Result<Value, VmError> {
        use OpCode::*;
        if matches!(op, Add) && (matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_))) {
            let l = self.stringify(&lhs, line)?;
            let r = self.stringify(&rhs, line)?;
            return Ok(self.intern(&format!("{l}{r}")));
        }

        match op {
            Eq | Eqi => return Ok(Value::Int(self.values_equal(&lhs, &rhs) as i32)),
            Neq => return Ok(Value::Int(!self.values_equal(&lhs, &rhs) as i32)),
            _ => {}
        }

        if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
            return self.eval_string_compare(op, a, b, line);
        }

        let (a, b) = self.coerce_numeric(lhs, rhs, line)?;
        match (a, b) {
            (Value::Int(a), Value::Int(b)) => self.eval_int_binary(op, a, b, line),
            (Value::Float(a), Value::Float(b)) => self.eval_float_binary(op, a, b, line),
            _ => unreachable!("coerce_numeric only returns matching Int/Float pairs"),
        }
    }

    fn eval_string_compare(&mut self, op: OpCode, a: &str, b: &str, line: u32) -> Result<Value, VmError> {
        use OpCode::*;
        match op {
            Lt => Ok(Value::Int((a < b) as i32)),
            Lte => Ok(Value::Int((a <= b) as i32)),
            Gt => Ok(Value::Int((a > b) as i32)),
            Gte => Ok(Value::Int((a >= b) as i32)),
            _ => Err(self.fail(line, VmError::TypeMismatch("string".to_string()))),
        }
    }

    fn eval_int_binary(&mut self, op: OpCode, a: i32, b: i32, line: u32) -> Result<Value, VmError> {
        use OpCode::*;
        Ok(match op {
            Add => Value::Int(a.wrapping_add(b)),
            Sub => Value::Int(a.wrapping_sub(b)),
            Mul => Value::Int(a.wrapping_mul(b)),
            Div => {
                if b == 0 {
                    return Err(self.fail(line, VmError::DivisionByZero));
                }
                Value::Int(a.wrapping_div(b))
            }
            Mod => {
                if b == 0 {
                    return Err(self.fail(line, VmError::DivisionByZero));
                }
                Value::Int(a.wrapping_rem(b))
            }
            And => Value::Int(a & b),
            Or => Value::Int(a | b),
            Xor => Value::Int(a ^ b),
            Shl => Value::Int(a.wrapping_shl(b as u32)),
            Shr => Value::Int(a.wrapping_shr(b as u32)),
            Lt => Value::Int((a < b) as i32),
            Lte => Value::Int((a <= b) as i32),
            Gt => Value::Int((a > b) as i32),
            Gte => Value::Int((a >= b) as i32),
            Eq | Eqi => Value::Int((a == b) as i32),
            Neq => Value::Int((a != b) as i32),
            _ => return Err(self.fail(line, VmError::TypeMismatch("int".to_string()))),
        })
    }

    fn eval_float_binary(&mut self, op: OpCode, a: f32, b: f32, line: u32) -> Result<Value, VmError> {
        use OpCode::*;
        Ok(match op {
            Add => Value::Float(a + b),
            Sub => Value::Float(a - b),
            Mul => Value::Float(a * b),
            Div => {
                if b == 0.0 {
                    return Err(self.fail(line, VmError::DivisionByZero));
                }
                Value::Float(a / b)
            }
            Mod => {
                if b == 0.0 {
                    return Err(self.fail(line, VmError::DivisionByZero));
                }
                Value::Float(a % b)
            }
            Lt => Value::Int((a < b) as i32),
            Lte => Value::Int((a <= b) as i32),
            Gt => Value::Int((a > b) as i32),
            Gte => Value::Int((a >= b) as i32),
            Eq | Eqi => Value::Int((a == b) as i32),
            Neq => Value::Int((a != b) as i32),
            And | Or | Xor | Shl | Shr => {
                return Err(self.fail(line, VmError::TypeMismatch("float does not support bitwise ops".to_string())))
            }
            _ => return Err(self.fail(line, VmError::TypeMismatch("float".to_string()))),
        })
    }

    fn coerce_numeric(&mut self, lhs: Value, rhs: Value, line: u32) -> Result<(Value, Value), VmError> {
        match (&lhs, &rhs) {
            (Value::Int(_), Value::Int(_)) => Ok((lhs, rhs)),
            (Value::Float(_), Value::Float(_)) => Ok((lhs, rhs)),
            (Value::Int(a), Value::Float(b)) => Ok((Value::Float(*a as f32), Value::Float(*b))),
            (Value::Float(a), Value::Int(b)) => Ok((Value::Float(*a), Value::Float(*b as f32))),
            _ => Err(self.fail(
                line,
                VmError::TypeMismatch(format!("incompatible operands: {} and {}", lhs.type_name(), rhs.type_name())),
            )),
        }
    }

    /// `==`/`!=` are defined across all kinds (spec §4.5): incompatible
    /// kinds simply compare unequal rather than erroring.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f32 == *y,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Array(x), Value::Array(y)) => x.0 == y.0,
            (Value::Dict(x), Value::Dict(y)) => x.0 == y.0,
            _ => false,
        }
    }

    /// Canonical rendering for `+` string concatenation (spec §4.5).
    pub fn stringify(&mut self, v: &Value, line: u32) -> Result<String, VmError> {
        if let Some(s) = v.stringify_scalar() {
            return Ok(s);
        }
        match v {
            Value::Array(r) => {
                let items = match self.heap.get(*r) {
                    HeapObject::Array(items) => items.clone(),
                    _ => return Err(self.fail(line, VmError::TypeMismatch("array".to_string()))),
                };
                let mut parts = Vec::with_capacity(items.len());
                for item in &items {
                    parts.push(self.stringify(item, line)?);
                }
                Ok(format!("[{}]", parts.join(", ")))
            }
            Value::Dict(r) => {
                let entries: Vec<(String, Value)> = match self.heap.get(*r) {
                    HeapObject::Dict(map) => map.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                    _ => return Err(self.fail(line, VmError::TypeMismatch("dict".to_string()))),
                };
                let mut parts = Vec::with_capacity(entries.len());
                for (k, v) in &entries {
                    parts.push(format!("{}: {}", k, self.stringify(v, line)?));
                }
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Value::Func(_) => Ok("<function>".to_string()),
            _ => unreachable!("scalar case handled above"),
        }
    }

    fn value_len(&mut self, v: Value, line: u32) -> Result<i32, VmError> {
        match v {
            Value::Str(s) => Ok(s.len() as i32),
            Value::Array(r) => match self.heap.get(r) {
                HeapObject::Array(items) => Ok(items.len() as i32),
                _ => Err(self.fail(line, VmError::TypeMismatch("array".to_string()))),
            },
            Value::Dict(r) => match self.heap.get(r) {
                HeapObject::Dict(map) => Ok(map.len() as i32),
                _ => Err(self.fail(line, VmError::TypeMismatch("dict".to_string()))),
            },
            other => Err(self.fail(line, VmError::TypeMismatch(other.type_name().to_string()))),
        }
    }

    /// On array: integer key; out-of-range write extends by one with `Null`
    /// fill if `key == length`, else fails. On dict: any key is
    /// stringified; missing-key read yields `Null` (spec §4.5 "Subscript").
    fn load_subscript(&mut self, base: Value, key: Value, line: u32) -> Result<Value, VmError> {
        match base {
            Value::Array(r) => {
                let idx = self.require_int(key, line)?;
                match self.heap.get(r) {
                    HeapObject::Array(items) => {
                        if idx < 0 || idx as usize >= items.len() {
                            Err(self.fail(line, VmError::IndexOutOfRange))
                        } else {
                            Ok(items[idx as usize].clone())
                        }
                    }
                    _ => Err(self.fail(line, VmError::TypeMismatch("array".to_string()))),
                }
            }
            Value::Dict(r) => {
                let key_str = self.stringify(&key, line)?;
                let key_interned = self.strings.intern(&key_str);
                match self.heap.get(r) {
                    HeapObject::Dict(map) => Ok(map.get(&key_interned).cloned().unwrap_or(Value::Null)),
                    _ => Err(self.fail(line, VmError::TypeMismatch("dict".to_string()))),
                }
            }
            other => Err(self.fail(line, VmError::TypeMismatch(other.type_name().to_string()))),
        }
    }

    fn store_subscript(&mut self, base: Value, key: Value, value: Value, line: u32) -> Result<(), VmError> {
        match base {
            Value::Array(r) => {
                let idx = self.require_int(key, line)?;
                match self.heap.get_mut(r) {
                    HeapObject::Array(items) => {
                        if idx < 0 || idx as usize > items.len() {
                            return Err(self.fail(line, VmError::IndexOutOfRange));
                        }
                        if idx as usize == items.len() {
                            items.push(value);
                        } else {
                            items[idx as usize] = value;
                        }
                        Ok(())
                    }
                    _ => Err(self.fail(line, VmError::TypeMismatch("array".to_string()))),
                }
            }
            Value::Dict(r) => {
                let key_str = self.stringify(&key, line)?;
                let key_interned = self.strings.intern(&key_str);
                match self.heap.get_mut(r) {
                    HeapObject::Dict(map) => {
                        map.insert(key_interned, value);
                        Ok(())
                    }
                    _ => Err(self.fail(line, VmError::TypeMismatch("dict".to_string()))),
                }
            }
            other => Err(self.fail(line, VmError::TypeMismatch(other.type_name().to_string()))),
        }
    }

    fn dict_entry_by_index(&mut self, dict: Value, index: Value, want_key: bool, line: u32) -> Result<Value, VmError> {
        let idx = self.require_int(index, line)?;
        match dict {
            Value::Dict(r) => match self.heap.get(r) {
                HeapObject::Dict(map) => {
                    if idx < 0 || idx as usize >= map.len() {
                        return Err(self.fail(line, VmError::IndexOutOfRange));
                    }
                    let (k, v) = map.get_index(idx as usize).expect("bounds checked above");
                    Ok(if want_key { Value::Str(k.clone()) } else { v.clone() })
                }
                _ => Err(self.fail(line, VmError::TypeMismatch("dict".to_string()))),
            },
            other => Err(self.fail(line, VmError::TypeMismatch(other.type_name().to_string()))),
        }
    }

    fn require_int(&mut self, v: Value, line: u32) -> Result<i32, VmError> {
        match v {
            Value::Int(i) => Ok(i),
            other => Err(self.fail(line, VmError::TypeMismatch(format!("expected int index, got {}", other.type_name())))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noct_compiler::compile;

    fn run(src: &str, func: &str, args: &[Value]) -> Result<Value, VmError> {
        let module = compile("test.noct", src).expect("compiles");
        let mut vm = Vm::new(VmConfig::default());
        vm.register_module(module);
        vm.enter(func, args)
    }

    #[test]
    fn arithmetic_boundary_scenario() {
        let v = run("func main(){ var a = 1 + 2 * 3; return a; }", "main", &[]).unwrap();
        assert!(matches!(v, Value::Int(7)));
    }

    #[test]
    fn array_mutate_boundary_scenario() {
        let v = run(
            "func main(){ var a = []; a[0] = 10; a[1] = 20; return a[0] + a[1]; }",
            "main",
            &[],
        )
        .unwrap();
        assert!(matches!(v, Value::Int(30)));
    }

    #[test]
    fn control_flow_boundary_scenario() {
        let v = run("func main(){ var s = 0; for (i in 0..5) s += i; return s; }", "main", &[]).unwrap();
        assert!(matches!(v, Value::Int(10)));
    }

    #[test]
    fn out_of_range_read_is_an_error() {
        let err = run("func main(){ var a = [1,2]; return a[10]; }", "main", &[]).unwrap_err();
        assert_eq!(err, VmError::IndexOutOfRange);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = run("func main(){ return 1 / 0; }", "main", &[]).unwrap_err();
        assert_eq!(err, VmError::DivisionByZero);
    }
}
