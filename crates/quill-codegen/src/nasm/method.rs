//! IL to x86 translation for one method.
//!
//! Values are tracked on a virtual stack and only materialised when an
//! instruction consumes them. At most one entry is ever an `Operation`
//! (held in `EAX`); before `EAX` is reused that entry is spilled to a
//! scratch slot of the frame.

use quill_compiler::il::{ConditionKind, Instruction, IntermediateInstruction};
use quill_compiler::{CompilationRoot, MethodItem};
use quill_core::{CompilingError, PrimitiveType};
use rustc_hash::FxHashSet;

use super::BACKEND;
use super::asm::{AsmLine, AsmMethod, Bridge};
use super::data::DataTable;
use super::frame::{Frame, StackValue, accumulator, size_specifier};

/// Shared state of one assembly output.
pub struct Unit<'a> {
    pub data: &'a mut DataTable,
    /// Labels of every method called, in first-call order.
    pub calls: &'a mut Vec<String>,
    pub seen_calls: &'a mut FxHashSet<String>,
}

impl Unit<'_> {
    fn record_call(&mut self, label: &str) {
        if self.seen_calls.insert(label.to_string()) {
            self.calls.push(label.to_string());
        }
    }
}

pub fn compile_method(
    root: &CompilationRoot,
    method: &MethodItem,
    unit: &mut Unit<'_>,
) -> Result<AsmMethod, CompilingError> {
    let reference = root.global_reference(method.id);
    let mut compiler = MethodCompiler {
        root,
        method,
        unit,
        name: reference.to_string(),
        frame: Frame::new(method.parameter_types(), method.local_data.clone()),
        stack: Vec::new(),
        out: AsmMethod::new(reference.asm_label()),
        conditionals: Vec::new(),
        il_starts: Vec::with_capacity(method.inter_lang.len() + 1),
        jumps: Vec::new(),
    };
    compiler.compile()?;
    Ok(compiler.out)
}

struct MethodCompiler<'a, 'u> {
    root: &'a CompilationRoot,
    method: &'a MethodItem,
    unit: &'a mut Unit<'u>,
    name: String,
    frame: Frame,
    stack: Vec<StackValue>,
    out: AsmMethod,
    conditionals: Vec<Bridge>,
    il_starts: Vec<usize>,
    jumps: Vec<(Bridge, i64)>,
}

impl MethodCompiler<'_, '_> {
    fn compile(&mut self) -> Result<(), CompilingError> {
        self.check_type(self.method.return_type)?;
        for ty in self.method.parameter_types().into_iter().chain(self.method.local_data.iter().copied()) {
            self.check_type(ty)?;
        }

        // Patched with the frame size once every scratch slot is known.
        self.out.op("ENTER", &["0", "0"]);
        let method = self.method;
        for (index, instruction) in method.inter_lang.iter().enumerate() {
            self.il_starts.push(self.out.len());
            self.instruction(index, instruction)?;
        }
        self.il_starts.push(self.out.len());

        let ends_with_ret = method
            .inter_lang
            .last()
            .is_some_and(|i| i.instruction == Instruction::Ret);
        if !ends_with_ret {
            self.epilogue();
        }

        if !self.conditionals.is_empty() {
            return Err(CompilingError::UnbalancedConditional {
                method: self.name.clone(),
            });
        }
        for (bridge, target) in std::mem::take(&mut self.jumps) {
            let start = usize::try_from(target)
                .ok()
                .and_then(|t| self.il_starts.get(t).copied())
                .ok_or_else(|| CompilingError::UnresolvedJump {
                    method: self.name.clone(),
                    target,
                })?;
            self.out.patch(bridge, start);
        }
        self.out.seal();

        let size = self.frame.size().to_string();
        self.out.lines[0] = AsmLine::op("ENTER", &[&size, "0"]);
        Ok(())
    }

    fn instruction(&mut self, index: usize, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        match ins.instruction {
            Instruction::Nop => {}
            Instruction::LdConst => self.load_constant(ins)?,
            Instruction::GetLocal => {
                let index = ins.local_index()?;
                let ty = self.frame.local_type(index).ok_or_else(|| malformed(ins, "unknown local"))?;
                self.stack.push(StackValue::Local { ty, index });
            }
            Instruction::SetLocal => self.set_local(ins)?,
            Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Rem
            | Instruction::Equals
            | Instruction::Unequals => self.binary(ins)?,
            Instruction::Conv => self.convert(ins)?,
            Instruction::CallStatic => self.call_static(ins)?,
            Instruction::Jump => {
                let offset = ins.jump_offset()?;
                let bridge = self.out.new_bridge();
                self.out.jump("JMP", bridge);
                self.jumps.push((bridge, index as i64 + offset));
            }
            Instruction::If => self.open_if(ins)?,
            Instruction::Else => {
                let open = self.conditionals.pop().ok_or_else(|| self.unbalanced())?;
                let end = self.out.new_bridge();
                self.out.jump("JMP", end);
                self.out.patch_here(open);
                self.conditionals.push(end);
            }
            Instruction::EndIf => {
                let open = self.conditionals.pop().ok_or_else(|| self.unbalanced())?;
                self.out.patch_here(open);
            }
            Instruction::Ret => {
                if self.method.return_type != PrimitiveType::Void {
                    let value = self.pop(ins)?;
                    self.load(value, "EAX")?;
                }
                self.epilogue();
            }
            Instruction::Pop => {
                let value = self.pop(ins)?;
                self.release(&value);
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: PrimitiveType) -> Result<(), CompilingError> {
        if ty.is_floating() || ty.size() > 4 {
            return Err(CompilingError::UnsupportedType {
                backend: BACKEND,
                ty,
                method: self.name.clone(),
            });
        }
        Ok(())
    }

    fn unbalanced(&self) -> CompilingError {
        CompilingError::UnbalancedConditional {
            method: self.name.clone(),
        }
    }

    fn pop(&mut self, ins: &IntermediateInstruction) -> Result<StackValue, CompilingError> {
        self.stack.pop().ok_or_else(|| CompilingError::StackUnderflow {
            method: self.name.clone(),
            instruction: ins.to_string(),
        })
    }

    fn release(&mut self, value: &StackValue) {
        if let StackValue::Temp { slot, .. } = value {
            self.frame.free_temp(*slot);
        }
    }

    /// Move the live `EAX` entry, if any, to a scratch slot.
    fn spill(&mut self) {
        let Some(position) = self.stack.iter().position(StackValue::is_operation) else {
            return;
        };
        let ty = self.stack[position].ty();
        let slot = self.frame.alloc_temp();
        let target = self.frame.temp_operand(slot);
        self.out.op("MOV", &[&target, "EAX"]);
        self.stack[position] = StackValue::Temp { ty, slot };
    }

    /// Copy pending reads of `index` out of the slot before it is written.
    fn detach_local(&mut self, index: i32) -> Result<(), CompilingError> {
        for position in 0..self.stack.len() {
            if let StackValue::Local { ty, index: i } = self.stack[position]
                && i == index
            {
                self.load(self.stack[position].clone(), "ECX")?;
                let slot = self.frame.alloc_temp();
                let target = self.frame.temp_operand(slot);
                self.out.op("MOV", &[&target, "ECX"]);
                self.stack[position] = StackValue::Temp { ty, slot };
            }
        }
        Ok(())
    }

    fn local_operand(&self, index: i32) -> Result<String, CompilingError> {
        self.frame
            .local_operand(index)
            .ok_or_else(|| CompilingError::MalformedInstruction {
                instruction: format!("local {index}"),
                detail: format!("no such local in '{}'", self.name),
            })
    }

    /// Materialise `value` in the 32-bit register `reg`, extended by its type.
    fn load(&mut self, value: StackValue, reg: &'static str) -> Result<(), CompilingError> {
        match value {
            StackValue::Constant { value, .. } => self.out.op("MOV", &[reg, &value]),
            StackValue::Operation { .. } => {
                if reg != "EAX" {
                    self.out.op("MOV", &[reg, "EAX"]);
                }
            }
            StackValue::Temp { slot, .. } => {
                let source = self.frame.temp_operand(slot);
                self.out.op("MOV", &[reg, &source]);
                self.frame.free_temp(slot);
            }
            StackValue::Local { ty, index } => {
                let source = self.local_operand(index)?;
                if ty.size() >= 4 {
                    self.out.op("MOV", &[reg, &source]);
                } else if ty.is_signed() {
                    self.out.op("MOVSX", &[reg, &source]);
                } else {
                    self.out.op("MOVZX", &[reg, &source]);
                }
            }
        }
        Ok(())
    }

    /// Re-extend `EAX` after an operation on a narrow type.
    fn normalize(&mut self, ty: PrimitiveType) {
        let low = match ty.size() {
            1 => "AL",
            2 => "AX",
            _ => return,
        };
        let op = if ty.is_signed() { "MOVSX" } else { "MOVZX" };
        self.out.op(op, &["EAX", low]);
    }

    fn load_constant(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let (ty, raw) = ins.constant()?;
        self.check_type(ty)?;
        let value = match ty {
            PrimitiveType::Str => self.unit.data.string(raw),
            PrimitiveType::Bool => match raw {
                "true" => "1".to_string(),
                "false" => "0".to_string(),
                _ => return Err(malformed(ins, "boolean constant")),
            },
            _ => raw
                .parse::<i128>()
                .map_err(|_| malformed(ins, "integer constant"))?
                .to_string(),
        };
        self.stack.push(StackValue::Constant { ty, value });
        Ok(())
    }

    fn set_local(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let index = ins.local_index()?;
        let target = self.local_operand(index)?;
        let size = self.frame.local_type(index).map_or(4, |t| t.size());
        let value = self.pop(ins)?;
        self.detach_local(index)?;
        match value {
            StackValue::Constant { value, .. } => self.out.op("MOV", &[&target, &value]),
            other => {
                if !other.is_operation() {
                    self.spill();
                }
                self.load(other, "EAX")?;
                self.out.op("MOV", &[&target, accumulator(size)]);
            }
        }
        Ok(())
    }

    fn binary(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let ty = ins.operand_type()?;
        self.check_type(ty)?;
        let left = self.pop(ins)?;
        let right = self.pop(ins)?;
        self.spill();
        if right.is_operation() {
            self.out.op("MOV", &["ECX", "EAX"]);
            self.load(left, "EAX")?;
        } else {
            self.load(right, "ECX")?;
            self.load(left, "EAX")?;
        }

        let result = match ins.instruction {
            Instruction::Add => {
                self.out.op("ADD", &["EAX", "ECX"]);
                ty
            }
            Instruction::Sub => {
                self.out.op("SUB", &["EAX", "ECX"]);
                ty
            }
            Instruction::Mul => {
                self.out.op("IMUL", &["EAX", "ECX"]);
                ty
            }
            Instruction::Div | Instruction::Rem => {
                if ty.is_signed() {
                    self.out.op("CDQ", &[]);
                    self.out.op("IDIV", &["ECX"]);
                } else {
                    self.out.op("XOR", &["EDX", "EDX"]);
                    self.out.op("DIV", &["ECX"]);
                }
                if ins.instruction == Instruction::Rem {
                    self.out.op("MOV", &["EAX", "EDX"]);
                }
                ty
            }
            _ => {
                let set = if ins.instruction == Instruction::Equals { "SETE" } else { "SETNE" };
                self.out.op("CMP", &["EAX", "ECX"]);
                self.out.op(set, &["AL"]);
                self.out.op("MOVZX", &["EAX", "AL"]);
                PrimitiveType::Bool
            }
        };
        if result == ty {
            self.normalize(ty);
        }
        self.stack.push(StackValue::Operation { ty: result });
        Ok(())
    }

    fn convert(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let target = ins.operand_type()?;
        let value = self.pop(ins)?;
        let from = value.ty();
        if from == target {
            self.stack.push(value);
            return Ok(());
        }

        if from == PrimitiveType::Str || target == PrimitiveType::Str {
            let label = format!("Std.Type.Casting@Cast_{}?{}", target.tag(), from.tag());
            return self.emit_call(&label, &[from], vec![value], target);
        }

        if self.check_type(from).is_err() || self.check_type(target).is_err() {
            return Err(CompilingError::UnsupportedConversion {
                backend: BACKEND,
                from,
                to: target,
            });
        }

        if let StackValue::Constant { value, .. } = &value
            && let Ok(n) = value.parse::<i128>()
        {
            self.stack.push(StackValue::Constant {
                ty: target,
                value: wrap(n, target).to_string(),
            });
            return Ok(());
        }

        if !value.is_operation() {
            self.spill();
        }
        self.load(value, "EAX")?;
        if target == PrimitiveType::Bool {
            self.out.op("TEST", &["EAX", "EAX"]);
            self.out.op("SETNE", &["AL"]);
            self.out.op("MOVZX", &["EAX", "AL"]);
        } else {
            self.normalize(target);
        }
        self.stack.push(StackValue::Operation { ty: target });
        Ok(())
    }

    fn call_static(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let (ret, target) = ins.call_target()?;
        let id = self
            .root
            .find_method(&target)
            .ok_or_else(|| CompilingError::UnknownCallTarget {
                reference: target.to_string(),
            })?;
        let parameters = self.root.method(id).parameter_types();
        self.check_type(ret)?;
        for ty in &parameters {
            self.check_type(*ty)?;
        }

        let mut arguments = Vec::with_capacity(parameters.len());
        for _ in &parameters {
            arguments.push(self.pop(ins)?);
        }
        arguments.reverse();
        self.emit_call(&target.asm_label(), &parameters, arguments, ret)
    }

    /// Store `arguments` into a fresh argument area and call `label`.
    fn emit_call(
        &mut self,
        label: &str,
        parameters: &[PrimitiveType],
        arguments: Vec<StackValue>,
        ret: PrimitiveType,
    ) -> Result<(), CompilingError> {
        self.spill();
        let total: u32 = parameters.iter().map(|t| t.size()).sum();
        if total > 0 {
            self.out.op("SUB", &["ESP", &total.to_string()]);
        }

        let mut offsets = Vec::with_capacity(parameters.len());
        let mut offset = 0;
        for ty in parameters {
            offsets.push(offset);
            offset += ty.size();
        }
        // The EAX-held argument goes first, before EAX is reused.
        let mut order: Vec<usize> = (0..arguments.len()).collect();
        order.sort_by_key(|&i| !arguments[i].is_operation());

        let mut arguments: Vec<Option<StackValue>> = arguments.into_iter().map(Some).collect();
        for i in order {
            let Some(argument) = arguments[i].take() else {
                continue;
            };
            let size = parameters[i].size();
            let slot = format!("{} [ESP + {}]", size_specifier(size), offsets[i]);
            match argument {
                StackValue::Constant { value, .. } => self.out.op("MOV", &[&slot, &value]),
                other => {
                    self.load(other, "EAX")?;
                    self.out.op("MOV", &[&slot, accumulator(size)]);
                }
            }
        }

        self.out.op("CALL", &[label]);
        self.unit.record_call(label);
        if ret != PrimitiveType::Void {
            self.stack.push(StackValue::Operation { ty: ret });
        }
        Ok(())
    }

    fn open_if(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let (kind, compare) = ins.condition()?;
        let skip = self.out.new_bridge();
        if kind != ConditionKind::Forced {
            let value = self.pop(ins)?;
            let signed = value.ty().is_signed();
            self.spill();
            self.load(value, "EAX")?;
            let jump = match kind {
                ConditionKind::True => {
                    self.out.op("TEST", &["EAX", "EAX"]);
                    "JZ"
                }
                ConditionKind::False | ConditionKind::Zero => {
                    self.out.op("TEST", &["EAX", "EAX"]);
                    "JNZ"
                }
                _ => {
                    let compare = compare.ok_or_else(|| malformed(ins, "comparison value"))?;
                    self.out.op("CMP", &["EAX", &compare.to_string()]);
                    skip_jump(kind, signed)
                }
            };
            self.out.jump(jump, skip);
        }
        self.conditionals.push(skip);
        Ok(())
    }

    fn epilogue(&mut self) {
        self.out.op("LEAVE", &[]);
        let parameters = self.frame.parameters_size();
        if parameters > 0 {
            self.out.op("POP", &["ECX"]);
            self.out.op("ADD", &["ESP", &parameters.to_string()]);
            self.out.op("PUSH", &["ECX"]);
        }
        self.out.op("RET", &[]);
    }
}

/// Jump taken when the condition does *not* hold.
fn skip_jump(kind: ConditionKind, signed: bool) -> &'static str {
    match (kind, signed) {
        (ConditionKind::Equal, _) => "JNE",
        (ConditionKind::Unequal, _) => "JE",
        (ConditionKind::Greater, true) => "JLE",
        (ConditionKind::Greater, false) => "JBE",
        (ConditionKind::Lesser, true) => "JGE",
        (ConditionKind::Lesser, false) => "JAE",
        (ConditionKind::GreaterEqual, true) => "JL",
        (ConditionKind::GreaterEqual, false) => "JB",
        (ConditionKind::LesserEqual, true) => "JG",
        (ConditionKind::LesserEqual, false) => "JA",
        _ => "JMP",
    }
}

/// Two's-complement wrap of a constant into `ty`.
fn wrap(value: i128, ty: PrimitiveType) -> i128 {
    if ty == PrimitiveType::Bool {
        return i128::from(value != 0);
    }
    let bits = ty.size() * 8;
    let masked = value & ((1i128 << bits) - 1);
    if ty.is_signed() && (masked >> (bits - 1)) & 1 == 1 {
        masked - (1i128 << bits)
    } else {
        masked
    }
}

fn malformed(ins: &IntermediateInstruction, detail: &str) -> CompilingError {
    CompilingError::MalformedInstruction {
        instruction: ins.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_wrap_to_the_target_width() {
        assert_eq!(wrap(300, PrimitiveType::U8), 44);
        assert_eq!(wrap(200, PrimitiveType::I8), -56);
        assert_eq!(wrap(-1, PrimitiveType::U16), 65535);
        assert_eq!(wrap(7, PrimitiveType::Bool), 1);
        assert_eq!(wrap(-5, PrimitiveType::I32), -5);
    }

    #[test]
    fn skip_jumps_negate_the_condition() {
        assert_eq!(skip_jump(ConditionKind::Equal, true), "JNE");
        assert_eq!(skip_jump(ConditionKind::Greater, true), "JLE");
        assert_eq!(skip_jump(ConditionKind::Greater, false), "JBE");
        assert_eq!(skip_jump(ConditionKind::LesserEqual, false), "JA");
    }
}
