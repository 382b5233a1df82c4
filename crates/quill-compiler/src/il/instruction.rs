//! IL opcodes and instructions.

use std::fmt;
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use quill_core::{CompilingError, PrimitiveType};

use crate::program::GlobalReference;

/// IL opcodes.
///
/// Operands travel as strings in [`IntermediateInstruction::parameters`].
/// The typed accessors on the instruction decode them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    Nop = 0,
    /// `[type, value]`
    LdConst = 1,
    /// `[index]`
    GetLocal = 2,
    /// `[index]`
    SetLocal = 3,
    /// `[type]`
    Add = 4,
    Sub = 5,
    Mul = 6,
    Div = 7,
    Rem = 8,
    Equals = 9,
    Unequals = 10,
    /// `[target type]`
    Conv = 11,
    /// `[return type, global reference]`
    CallStatic = 12,
    /// `[relative offset]`
    Jump = 13,
    /// `[condition]` or `[condition, value]`
    If = 14,
    Else = 15,
    EndIf = 16,
    Ret = 17,
    /// Discard the value on top of the stack.
    Pop = 18,
}

impl Instruction {
    /// Opcode name as it appears in IL text.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::LdConst => "ldConst",
            Instruction::GetLocal => "getLocal",
            Instruction::SetLocal => "setLocal",
            Instruction::Add => "add",
            Instruction::Sub => "sub",
            Instruction::Mul => "mul",
            Instruction::Div => "div",
            Instruction::Rem => "rem",
            Instruction::Equals => "equals",
            Instruction::Unequals => "unequals",
            Instruction::Conv => "conv",
            Instruction::CallStatic => "call.static",
            Instruction::Jump => "jump",
            Instruction::If => "if",
            Instruction::Else => "else",
            Instruction::EndIf => "endif",
            Instruction::Ret => "ret",
            Instruction::Pop => "pop",
        }
    }

    /// Binary operators that pop two operands and push one result.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Instruction::Add
                | Instruction::Sub
                | Instruction::Mul
                | Instruction::Div
                | Instruction::Rem
                | Instruction::Equals
                | Instruction::Unequals
        )
    }
}

/// How an `If` decides whether to enter its then-branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ConditionKind {
    /// Always taken; consumes nothing.
    Forced = 0,
    Greater = 1,
    Lesser = 2,
    GreaterEqual = 3,
    LesserEqual = 4,
    Equal = 5,
    Unequal = 6,
    True = 7,
    False = 8,
    Zero = 9,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 10] = [
        ConditionKind::Forced,
        ConditionKind::Greater,
        ConditionKind::Lesser,
        ConditionKind::GreaterEqual,
        ConditionKind::LesserEqual,
        ConditionKind::Equal,
        ConditionKind::Unequal,
        ConditionKind::True,
        ConditionKind::False,
        ConditionKind::Zero,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ConditionKind::Forced => "Forced",
            ConditionKind::Greater => "Greater",
            ConditionKind::Lesser => "Lesser",
            ConditionKind::GreaterEqual => "GreaterEqual",
            ConditionKind::LesserEqual => "LesserEqual",
            ConditionKind::Equal => "Equal",
            ConditionKind::Unequal => "Unequal",
            ConditionKind::True => "True",
            ConditionKind::False => "False",
            ConditionKind::Zero => "Zero",
        }
    }

    /// Whether the condition compares the popped value with a literal.
    pub fn takes_value(self) -> bool {
        matches!(
            self,
            ConditionKind::Greater
                | ConditionKind::Lesser
                | ConditionKind::GreaterEqual
                | ConditionKind::LesserEqual
                | ConditionKind::Equal
                | ConditionKind::Unequal
        )
    }
}

impl FromStr for ConditionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|c| c.name() == s).ok_or(())
    }
}

// ============================================================================
// Instructions
// ============================================================================

/// Malformed IL operands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IlError {
    #[error("{instruction}: missing operand {position}")]
    MissingOperand {
        instruction: Instruction,
        position: usize,
    },

    #[error("{instruction}: '{operand}' is not a valid {expected}")]
    InvalidOperand {
        instruction: Instruction,
        operand: String,
        expected: &'static str,
    },

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("truncated IL stream")]
    Truncated,

    #[error("{instruction}: {size} does not fit the byte encoding")]
    Oversized { instruction: Instruction, size: usize },
}

impl From<IlError> for CompilingError {
    fn from(err: IlError) -> Self {
        let instruction = match &err {
            IlError::MissingOperand { instruction, .. }
            | IlError::InvalidOperand { instruction, .. }
            | IlError::Oversized { instruction, .. } => {
                instruction.mnemonic().to_string()
            }
            IlError::UnknownOpcode(_) | IlError::Truncated => "<stream>".to_string(),
        };
        CompilingError::MalformedInstruction {
            instruction,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One IL instruction: an opcode and its string operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateInstruction {
    pub instruction: Instruction,
    pub parameters: Vec<String>,
}

impl IntermediateInstruction {
    pub fn new(instruction: Instruction, parameters: Vec<String>) -> Self {
        Self {
            instruction,
            parameters,
        }
    }

    fn operand(&self, position: usize) -> Result<&str, IlError> {
        self.parameters
            .get(position)
            .map(String::as_str)
            .ok_or(IlError::MissingOperand {
                instruction: self.instruction,
                position,
            })
    }

    fn invalid(&self, operand: &str, expected: &'static str) -> IlError {
        IlError::InvalidOperand {
            instruction: self.instruction,
            operand: operand.to_string(),
            expected,
        }
    }

    /// First operand read as a type tag.
    pub fn operand_type(&self) -> Result<PrimitiveType, IlError> {
        let tag = self.operand(0)?;
        tag.parse().map_err(|_| self.invalid(tag, "type tag"))
    }

    /// Local index of `GetLocal` / `SetLocal`.
    pub fn local_index(&self) -> Result<i32, IlError> {
        let raw = self.operand(0)?;
        raw.parse().map_err(|_| self.invalid(raw, "local index"))
    }

    /// Type and raw text of a `LdConst`.
    pub fn constant(&self) -> Result<(PrimitiveType, &str), IlError> {
        Ok((self.operand_type()?, self.operand(1)?))
    }

    /// Return type and target of a `CallStatic`.
    pub fn call_target(&self) -> Result<(PrimitiveType, GlobalReference), IlError> {
        let ret = self.operand_type()?;
        let raw = self.operand(1)?;
        let target = raw.parse().map_err(|_| self.invalid(raw, "global reference"))?;
        Ok((ret, target))
    }

    /// Condition and optional comparison value of an `If`.
    pub fn condition(&self) -> Result<(ConditionKind, Option<i128>), IlError> {
        let raw = self.operand(0)?;
        let kind: ConditionKind = raw.parse().map_err(|_| self.invalid(raw, "condition"))?;
        let value = match self.parameters.get(1) {
            Some(v) => Some(v.parse().map_err(|_| self.invalid(v, "integer"))?),
            None if kind.takes_value() => {
                return Err(IlError::MissingOperand {
                    instruction: self.instruction,
                    position: 1,
                });
            }
            None => None,
        };
        Ok((kind, value))
    }

    /// Relative offset of a `Jump`.
    pub fn jump_offset(&self) -> Result<i64, IlError> {
        let raw = self.operand(0)?;
        raw.parse().map_err(|_| self.invalid(raw, "offset"))
    }
}

impl fmt::Display for IntermediateInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = &self.parameters;
        match self.instruction {
            Instruction::LdConst if params.first().map(String::as_str) == Some("str") => {
                write!(f, "ldConst.str {:?}", params.get(1).map(String::as_str).unwrap_or(""))
            }
            Instruction::GetLocal
            | Instruction::SetLocal
            | Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Rem
            | Instruction::Equals
            | Instruction::Unequals
            | Instruction::Conv
            | Instruction::LdConst
            | Instruction::If => {
                write!(f, "{}", self.instruction.mnemonic())?;
                if let Some((first, rest)) = params.split_first() {
                    write!(f, ".{first}")?;
                    for p in rest {
                        write!(f, " {p}")?;
                    }
                }
                Ok(())
            }
            _ => {
                write!(f, "{}", self.instruction.mnemonic())?;
                for p in params {
                    write!(f, " {p}")?;
                }
                Ok(())
            }
        }
    }
}
