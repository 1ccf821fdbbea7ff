//! A loaded (or about-to-be-written) bytecode program: the symbol table,
//! function-PC table, global-function table, and code section described in
//! §4.C, plus the serializer/deserializer pair that turns one into bytes and
//! back. Hand-rolled byte-buffer manipulation, matching the wire format's
//! bit-packed, length-prefixed sections -- not a natural fit for a generic
//! serialization crate.

use std::fmt;

use super::{decode_version, encode_version, version_is_too_new, MAGIC, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalFunc {
    pub sym_id: u32,
    pub pc_id: u32,
    pub arg_count: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub symbols: Vec<String>,
    pub pc_table: Vec<u32>,
    pub globals: Vec<GlobalFunc>,
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    Truncated,
    BadMagic,
    VersionTooNew { major: u32, minor: u32, patch: u32 },
    InvalidSymbolId(u32),
    InvalidPcId(u32),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::Truncated => write!(f, "error(bytecode): truncated file"),
            FormatError::BadMagic => write!(f, "error(bytecode): bad magic number"),
            FormatError::VersionTooNew { major, minor, patch } => {
                write!(f, "error(bytecode): file version {}.{}.{} is newer than this tool", major, minor, patch)
            }
            FormatError::InvalidSymbolId(id) => write!(f, "error(bytecode): symbol id {} out of range", id),
            FormatError::InvalidPcId(id) => write!(f, "error(bytecode): pc id {} out of range", id),
        }
    }
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32, FormatError> {
    let bytes = buf.get(pos..pos + 4).ok_or(FormatError::Truncated)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

impl Program {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&encode_version(VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH).to_le_bytes());

        let mut sym_bytes = Vec::new();
        for sym in &self.symbols {
            sym_bytes.extend_from_slice(sym.as_bytes());
            sym_bytes.push(0);
        }
        out.extend_from_slice(&(sym_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&sym_bytes);

        out.extend_from_slice(&((self.pc_table.len() * 4) as u32).to_le_bytes());
        for pc in &self.pc_table {
            out.extend_from_slice(&pc.to_le_bytes());
        }

        out.extend_from_slice(&((self.globals.len() * 9) as u32).to_le_bytes());
        for g in &self.globals {
            out.extend_from_slice(&g.sym_id.to_le_bytes());
            out.extend_from_slice(&g.pc_id.to_le_bytes());
            out.push(g.arg_count);
        }

        out.extend_from_slice(&self.code);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Program, FormatError> {
        let mut pos = 0usize;
        if buf.len() < 12 {
            return Err(FormatError::Truncated);
        }

        let magic = read_u32(buf, pos)?;
        if magic != MAGIC {
            return Err(FormatError::BadMagic);
        }
        pos += 4;

        let version_word = read_u32(buf, pos)?;
        pos += 4;
        let (major, minor, patch) = decode_version(version_word);
        if version_is_too_new(major, minor, patch) {
            return Err(FormatError::VersionTooNew { major, minor, patch });
        }

        let sym_len = read_u32(buf, pos)? as usize;
        pos += 4;
        let sym_bytes = buf.get(pos..pos + sym_len).ok_or(FormatError::Truncated)?;
        let mut symbols = Vec::new();
        let mut current = Vec::new();
        for &b in sym_bytes {
            if b == 0 {
                symbols.push(String::from_utf8_lossy(&current).into_owned());
                current.clear();
            } else {
                current.push(b);
            }
        }
        pos += sym_len;

        let pct_len = read_u32(buf, pos)? as usize;
        pos += 4;
        let pct_bytes = buf.get(pos..pos + pct_len).ok_or(FormatError::Truncated)?;
        let mut pc_table = Vec::new();
        for chunk in pct_bytes.chunks_exact(4) {
            pc_table.push(u32::from_le_bytes(chunk.try_into().unwrap()));
        }
        pos += pct_len;

        let gft_len = read_u32(buf, pos)? as usize;
        pos += 4;
        let gft_bytes = buf.get(pos..pos + gft_len).ok_or(FormatError::Truncated)?;
        let mut globals = Vec::new();
        for chunk in gft_bytes.chunks_exact(9) {
            let sym_id = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let pc_id = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            let arg_count = chunk[8];
            if sym_id as usize >= symbols.len() {
                return Err(FormatError::InvalidSymbolId(sym_id));
            }
            if pc_id as usize >= pc_table.len() {
                return Err(FormatError::InvalidPcId(pc_id));
            }
            globals.push(GlobalFunc { sym_id, pc_id, arg_count });
        }
        pos += gft_len;

        let code = buf[pos..].to_vec();
        Ok(Program { symbols, pc_table, globals, code })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::{encode, Opcode};

    #[test]
    fn roundtrip_empty_program() {
        let program = Program::default();
        let bytes = program.to_bytes();
        let back = Program::from_bytes(&bytes).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn roundtrip_with_tables_and_code() {
        let mut code = Vec::new();
        encode(&mut code, Opcode::Ret, 0);
        let program = Program {
            symbols: vec!["x".to_string(), "$fact".to_string()],
            pc_table: vec![0, 5],
            globals: vec![GlobalFunc { sym_id: 1, pc_id: 1, arg_count: 2 }],
            code,
        };
        let bytes = program.to_bytes();
        let back = Program::from_bytes(&bytes).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Program::default().to_bytes();
        bytes[0] = 0;
        assert_eq!(Program::from_bytes(&bytes), Err(FormatError::BadMagic));
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert_eq!(Program::from_bytes(&[1, 2, 3]), Err(FormatError::Truncated));
    }

    #[test]
    fn rejects_out_of_range_symbol_id() {
        let mut program = Program::default();
        program.symbols.push("x".to_string());
        program.pc_table.push(0);
        program.globals.push(GlobalFunc { sym_id: 99, pc_id: 0, arg_count: 0 });
        let bytes = program.to_bytes();
        assert_eq!(Program::from_bytes(&bytes), Err(FormatError::InvalidSymbolId(99)));
    }
}
