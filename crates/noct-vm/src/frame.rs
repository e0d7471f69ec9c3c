//! Per-call activation record (spec §3 "Frame").

use std::rc::Rc;

use noct_core::lir::LirFunction;

use crate::value::Value;

pub struct Frame {
    pub function: Rc<LirFunction>,
    pub tmpvars: Vec<Value>,
    pub pc: usize,
    pub line: u32,
}

impl Frame {
    pub fn new(function: Rc<LirFunction>) -> Self {
        let size = function.tmpvar_size as usize;
        Self { function, tmpvars: vec![Value::Null; size], pc: 0, line: 0 }
    }
}
