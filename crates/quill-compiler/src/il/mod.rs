//! Stack-based intermediate language.
//!
//! Lowering turns each method's statements into a flat list of
//! [`IntermediateInstruction`]s. Values flow through an implicit operand
//! stack; locals are addressed by index (negative for parameters).
//!
//! ```text
//! i32 x = 5; return x;
//!
//!     ldConst.i32 5
//!     setLocal.0
//!     getLocal.0
//!     ret
//! ```
//!
//! Conditionals are structured: every `If` is closed by exactly one `EndIf`,
//! with at most one `Else` in between. `elif` chains nest an `If` inside
//! the `Else` of the previous one.
//!
//! Besides the text form ([`std::fmt::Display`]) the IL has a compact byte
//! encoding, see [`encode`] and [`decode`].

mod instruction;

pub use instruction::{ConditionKind, IlError, Instruction, IntermediateInstruction};

/// Constructors for well-formed instructions.
pub mod op {
    use quill_core::PrimitiveType;

    use super::{ConditionKind, Instruction, IntermediateInstruction};
    use crate::program::GlobalReference;

    fn with(instruction: Instruction, parameters: Vec<String>) -> IntermediateInstruction {
        IntermediateInstruction::new(instruction, parameters)
    }

    pub fn nop() -> IntermediateInstruction {
        with(Instruction::Nop, Vec::new())
    }

    pub fn ld_const(ty: PrimitiveType, value: impl Into<String>) -> IntermediateInstruction {
        with(Instruction::LdConst, vec![ty.tag().to_string(), value.into()])
    }

    pub fn get_local(index: i32) -> IntermediateInstruction {
        with(Instruction::GetLocal, vec![index.to_string()])
    }

    pub fn set_local(index: i32) -> IntermediateInstruction {
        with(Instruction::SetLocal, vec![index.to_string()])
    }

    /// An arithmetic or equality opcode tagged with its operand type.
    pub fn binary(instruction: Instruction, ty: PrimitiveType) -> IntermediateInstruction {
        debug_assert!(instruction.is_binary());
        with(instruction, vec![ty.tag().to_string()])
    }

    pub fn conv(target: PrimitiveType) -> IntermediateInstruction {
        with(Instruction::Conv, vec![target.tag().to_string()])
    }

    pub fn call_static(return_type: PrimitiveType, target: &GlobalReference) -> IntermediateInstruction {
        with(
            Instruction::CallStatic,
            vec![return_type.tag().to_string(), target.to_string()],
        )
    }

    pub fn jump(offset: i64) -> IntermediateInstruction {
        with(Instruction::Jump, vec![offset.to_string()])
    }

    pub fn if_(condition: ConditionKind, value: Option<i128>) -> IntermediateInstruction {
        let mut parameters = vec![condition.name().to_string()];
        if let Some(v) = value {
            parameters.push(v.to_string());
        }
        with(Instruction::If, parameters)
    }

    pub fn else_() -> IntermediateInstruction {
        with(Instruction::Else, Vec::new())
    }

    pub fn end_if() -> IntermediateInstruction {
        with(Instruction::EndIf, Vec::new())
    }

    pub fn ret() -> IntermediateInstruction {
        with(Instruction::Ret, Vec::new())
    }

    pub fn pop() -> IntermediateInstruction {
        with(Instruction::Pop, Vec::new())
    }
}

// ============================================================================
// Byte encoding
// ============================================================================
//
// Each instruction is `opcode: u8`, `count: u8`, then `count` operands as
// `len: u32 LE` followed by UTF-8 bytes.

/// Encode instructions into bytes.
///
/// Fails when an instruction has more than 255 operands or an operand
/// longer than `u32::MAX` bytes.
pub fn encode(instructions: &[IntermediateInstruction]) -> Result<Vec<u8>, IlError> {
    let mut out = Vec::new();
    for instr in instructions {
        let oversized = |size| IlError::Oversized {
            instruction: instr.instruction,
            size,
        };
        let count = u8::try_from(instr.parameters.len()).map_err(|_| oversized(instr.parameters.len()))?;
        out.push(u8::from(instr.instruction));
        out.push(count);
        for p in &instr.parameters {
            let len = u32::try_from(p.len()).map_err(|_| oversized(p.len()))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(p.as_bytes());
        }
    }
    Ok(out)
}

/// Decode bytes produced by [`encode`].
pub fn decode(mut bytes: &[u8]) -> Result<Vec<IntermediateInstruction>, IlError> {
    fn take<'a>(bytes: &mut &'a [u8], n: usize) -> Result<&'a [u8], IlError> {
        if bytes.len() < n {
            return Err(IlError::Truncated);
        }
        let (head, tail) = bytes.split_at(n);
        *bytes = tail;
        Ok(head)
    }

    let mut instructions = Vec::new();
    while !bytes.is_empty() {
        let header = take(&mut bytes, 2)?;
        let instruction =
            Instruction::try_from(header[0]).map_err(|_| IlError::UnknownOpcode(header[0]))?;
        let mut parameters = Vec::with_capacity(header[1] as usize);
        for _ in 0..header[1] {
            let len = take(&mut bytes, 4)?;
            let len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
            let raw = take(&mut bytes, len)?;
            let text = std::str::from_utf8(raw).map_err(|_| IlError::InvalidOperand {
                instruction,
                operand: String::from_utf8_lossy(raw).into_owned(),
                expected: "UTF-8 string",
            })?;
            parameters.push(text.to_string());
        }
        instructions.push(IntermediateInstruction::new(instruction, parameters));
    }
    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::PrimitiveType;

    #[test]
    fn encoded_method_decodes_identically() {
        let body = vec![
            op::ld_const(PrimitiveType::Str, "héllo"),
            op::if_(ConditionKind::Equal, Some(-3)),
            op::end_if(),
            op::ret(),
        ];
        assert_eq!(decode(&encode(&body).unwrap()), Ok(body));
    }

    #[test]
    fn decode_rejects_bad_streams() {
        assert_eq!(decode(&[0xff, 0]), Err(IlError::UnknownOpcode(0xff)));
        assert_eq!(decode(&[1, 1, 5, 0, 0, 0, b'a']), Err(IlError::Truncated));
        assert_eq!(decode(&[1, 1, 5, 0]), Err(IlError::Truncated));
    }

    #[test]
    fn long_string_constants_survive_encoding() {
        let text = "x".repeat(70_000);
        let body = vec![op::ld_const(PrimitiveType::Str, text.clone()), op::ret()];
        let decoded = decode(&encode(&body).unwrap()).unwrap();
        assert_eq!(decoded[0].constant(), Ok((PrimitiveType::Str, text.as_str())));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn too_many_operands_do_not_encode() {
        let wide = IntermediateInstruction::new(Instruction::Nop, vec![String::new(); 256]);
        assert_eq!(
            encode(&[wide]),
            Err(IlError::Oversized {
                instruction: Instruction::Nop,
                size: 256,
            })
        );
    }
}
