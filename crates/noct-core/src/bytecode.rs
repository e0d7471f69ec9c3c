//! The bytecode container format (spec §4.7): a textual envelope with
//! embedded binary payloads, used by `--compile` and by `noct <file>` to
//! disambiguate a bytecode file from a source file by its magic string.

use thiserror::Error;

use crate::lir::{BytecodeError, LirFunction, LirModule};

pub const MAGIC: &str = "Noct Bytecode 1.0\n";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("bad magic header")]
    BadMagic,
    #[error("truncated container in section {section}")]
    Truncated { section: &'static str },
    #[error("Broken bytecode. (function {function}: {source})")]
    Broken { function: String, source: BytecodeError },
    #[error("inconsistent function count: header says {declared}, found {actual}")]
    InconsistentCount { declared: usize, actual: usize },
    #[error("declared bytecode size {declared} does not match section for function {function}")]
    SizeMismatch { function: String, declared: u32 },
}

/// Does `data` begin with the bytecode magic string? Used by the CLI (and
/// the REPL's file loader) to tell a compiled `.nb` file from source text
/// (spec §6 CLI surface).
pub fn has_bytecode_magic(data: &[u8]) -> bool {
    data.starts_with(MAGIC.as_bytes())
}

/// Write a `LirModule` to the textual container format.
pub fn serialize(module: &LirModule) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC.as_bytes());
    out.extend_from_slice(b"Source\n");
    out.extend_from_slice(module.source_name.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(b"Number Of Functions\n");
    out.extend_from_slice(module.functions.len().to_string().as_bytes());
    out.push(b'\n');

    for func in &module.functions {
        out.extend_from_slice(b"Begin Function\n");
        out.extend_from_slice(b"Name\n");
        out.extend_from_slice(func.name.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Parameters\n");
        out.extend_from_slice(func.params.len().to_string().as_bytes());
        out.push(b'\n');
        for p in &func.params {
            out.extend_from_slice(p.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"Temporary Size\n");
        out.extend_from_slice(func.tmpvar_size.to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Bytecode Size\n");
        out.extend_from_slice(func.bytecode_size().to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&func.bytecode);
        out.push(b'\n');
        out.extend_from_slice(b"End Function\n");
    }
    out
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn line(&mut self, section: &'static str) -> Result<&'a str, ContainerError> {
        let rest = &self.data[self.pos..];
        let nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ContainerError::Truncated { section })?;
        let line = std::str::from_utf8(&rest[..nl]).map_err(|_| ContainerError::Truncated { section })?;
        self.pos += nl + 1;
        Ok(line)
    }

    fn expect_line(&mut self, expected: &str, section: &'static str) -> Result<(), ContainerError> {
        let line = self.line(section)?;
        if line != expected {
            return Err(ContainerError::Truncated { section });
        }
        Ok(())
    }

    fn usize_line(&mut self, section: &'static str) -> Result<usize, ContainerError> {
        self.line(section)?
            .parse()
            .map_err(|_| ContainerError::Truncated { section })
    }

    fn bytes(&mut self, n: usize, section: &'static str) -> Result<&'a [u8], ContainerError> {
        if self.pos + n > self.data.len() {
            return Err(ContainerError::Truncated { section });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}

/// Read a `LirModule` back from the textual container format, verifying
/// the magic, the declared function count, and every function's declared
/// bytecode size and jump/temporary-index invariants (spec §4.7, §8).
pub fn deserialize(data: &[u8]) -> Result<LirModule, ContainerError> {
    if !has_bytecode_magic(data) {
        return Err(ContainerError::BadMagic);
    }
    let mut cur = Cursor { data, pos: MAGIC.len() };

    cur.expect_line("Source", "Source")?;
    let source_name = cur.line("Source")?.to_string();

    cur.expect_line("Number Of Functions", "Number Of Functions")?;
    let declared_count = cur.usize_line("Number Of Functions")?;

    let mut functions = Vec::with_capacity(declared_count);
    for index in 0..declared_count {
        cur.expect_line("Begin Function", "Begin Function")?;
        cur.expect_line("Name", "Name")?;
        let name = cur.line("Name")?.to_string();

        cur.expect_line("Parameters", "Parameters")?;
        let param_count = cur.usize_line("Parameters")?;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            params.push(cur.line("Parameters")?.to_string());
        }

        cur.expect_line("Temporary Size", "Temporary Size")?;
        let tmpvar_size: u16 = cur
            .usize_line("Temporary Size")?
            .try_into()
            .map_err(|_| ContainerError::Truncated { section: "Temporary Size" })?;

        cur.expect_line("Bytecode Size", "Bytecode Size")?;
        let declared_size = cur.usize_line("Bytecode Size")?;

        let bytecode = cur.bytes(declared_size, "Bytecode Size")?.to_vec();
        if bytecode.len() != declared_size {
            return Err(ContainerError::SizeMismatch {
                function: name.clone(),
                declared: declared_size as u32,
            });
        }

        cur.expect_line("", "End Function")?; // the blank line after raw bytes
        cur.expect_line("End Function", "End Function")?;

        let func = LirFunction { name: name.clone(), params, tmpvar_size, bytecode };
        func.verify().map_err(|e| ContainerError::Broken {
            function: format!("{name} (index {index})"),
            source: e,
        })?;
        functions.push(func);
    }

    if functions.len() != declared_count {
        return Err(ContainerError::InconsistentCount {
            declared: declared_count,
            actual: functions.len(),
        });
    }

    Ok(LirModule { source_name, functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{Instruction, OpCode};

    fn sample_module() -> LirModule {
        let mut bytecode = Vec::new();
        Instruction::IConst { dst: 0, value: 7 }.encode(&mut bytecode);
        Instruction::Binary { op: OpCode::Add, dst: 0, lhs: 0, rhs: 0 }.encode(&mut bytecode);
        LirModule {
            source_name: "main.noct".into(),
            functions: vec![LirFunction {
                name: "main".into(),
                params: vec![],
                tmpvar_size: 1,
                bytecode,
            }],
        }
    }

    #[test]
    fn round_trips_byte_for_byte() {
        let module = sample_module();
        let bytes = serialize(&module);
        assert!(has_bytecode_magic(&bytes));
        let back = deserialize(&bytes).unwrap();
        assert_eq!(back.source_name, module.source_name);
        assert_eq!(back.functions[0].bytecode, module.functions[0].bytecode);
        assert_eq!(back.functions[0].tmpvar_size, module.functions[0].tmpvar_size);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = deserialize(b"not a noct file").unwrap_err();
        assert_eq!(err, ContainerError::BadMagic);
    }

    #[test]
    fn rejects_broken_jump_target() {
        let mut bytecode = Vec::new();
        Instruction::Jmp { addr: 999 }.encode(&mut bytecode);
        let module = LirModule {
            source_name: "x.noct".into(),
            functions: vec![LirFunction {
                name: "main".into(),
                params: vec![],
                tmpvar_size: 0,
                bytecode,
            }],
        };
        let bytes = serialize(&module);
        let err = deserialize(&bytes).unwrap_err();
        match err {
            ContainerError::Broken { function, .. } => assert!(function.contains("main")),
            other => panic!("expected Broken, got {other:?}"),
        }
    }
}
