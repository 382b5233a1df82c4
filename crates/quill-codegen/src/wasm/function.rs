//! IL to WASM instructions for one method.
//!
//! The IL operand stack maps onto the WASM operand stack directly; only
//! the types are shadowed here so conversions and operators can pick the
//! right instruction. `If`/`Else`/`EndIf` fill a stack of [`WasmBlock`]s
//! that render as structured `if ... else ... end`.

use quill_compiler::il::{ConditionKind, Instruction, IntermediateInstruction};
use quill_compiler::{CompilationRoot, GlobalReference, MethodItem};
use quill_core::{CompilingError, PrimitiveType};

use super::data::DataSegment;
use super::emitter::WatEmitter;
use super::{BACKEND, wasm_type};

/// One line of a function body, or a nested `if`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WasmLine {
    Op(String),
    If {
        then: Vec<WasmLine>,
        otherwise: Option<Vec<WasmLine>>,
    },
}

/// An `if` that has been opened but not yet closed.
#[derive(Debug, Default)]
pub struct WasmBlock {
    then: Vec<WasmLine>,
    otherwise: Option<Vec<WasmLine>>,
}

impl WasmBlock {
    fn current(&mut self) -> &mut Vec<WasmLine> {
        match &mut self.otherwise {
            Some(lines) => lines,
            None => &mut self.then,
        }
    }

    fn close(self) -> WasmLine {
        WasmLine::If {
            then: self.then,
            otherwise: self.otherwise,
        }
    }
}

pub fn render_lines(emitter: &mut WatEmitter, lines: &[WasmLine]) {
    for line in lines {
        match line {
            WasmLine::Op(op) => emitter.push_line(op),
            WasmLine::If { then, otherwise } => {
                emitter.push_line("if");
                emitter.indent();
                render_lines(emitter, then);
                emitter.dedent();
                if let Some(otherwise) = otherwise {
                    emitter.push_line("else");
                    emitter.indent();
                    render_lines(emitter, otherwise);
                    emitter.dedent();
                }
                emitter.push_line("end");
            }
        }
    }
}

/// Compiled body of one method.
#[derive(Debug)]
pub struct WasmFunction {
    pub name: String,
    pub parameters: Vec<(String, &'static str)>,
    pub result: Option<&'static str>,
    pub locals: Vec<&'static str>,
    pub body: Vec<WasmLine>,
}

impl WasmFunction {
    pub fn render(&self, emitter: &mut WatEmitter) {
        let mut header = format!("(func ${0} (export {1})", self.name, super::emitter::quote(&self.name));
        for (name, ty) in &self.parameters {
            header.push_str(&format!(" (param ${name} {ty})"));
        }
        if let Some(result) = self.result {
            header.push_str(&format!(" (result {result})"));
        }
        emitter.push_line(header);
        emitter.indent();
        if !self.locals.is_empty() {
            emitter.push_line(format!("(local {})", self.locals.join(" ")));
        }
        render_lines(emitter, &self.body);
        emitter.dedent();
        emitter.push_line(")");
    }
}

pub struct FunctionContext<'a> {
    pub root: &'a CompilationRoot,
    pub data: &'a mut DataSegment,
    /// Flat name of `Std.Memory:LoadString?str` when it is imported.
    pub load_string: Option<String>,
}

pub fn compile_function(
    method: &MethodItem,
    context: &mut FunctionContext<'_>,
) -> Result<WasmFunction, CompilingError> {
    let reference = context.root.global_reference(method.id);
    let name = reference.flat_name();
    let unsupported = |ty| CompilingError::UnsupportedType {
        backend: BACKEND,
        ty,
        method: reference.to_string(),
    };

    let mut parameters = Vec::with_capacity(method.parameters.len());
    for p in &method.parameters {
        parameters.push((p.name.clone(), wasm_type(p.ty).ok_or_else(|| unsupported(p.ty))?));
    }
    let mut locals = Vec::with_capacity(method.local_data.len());
    for ty in &method.local_data {
        locals.push(wasm_type(*ty).ok_or_else(|| unsupported(*ty))?);
    }
    let result = match method.return_type {
        PrimitiveType::Void => None,
        ty => Some(wasm_type(ty).ok_or_else(|| unsupported(ty))?),
    };

    let mut compiler = FunctionCompiler {
        method,
        context,
        name: reference.to_string(),
        parameter_count: parameters.len() as u32,
        locals,
        scratch: Vec::new(),
        types: Vec::new(),
        body: Vec::new(),
        blocks: Vec::new(),
    };
    for instruction in &method.inter_lang {
        compiler.instruction(instruction)?;
    }
    if !compiler.blocks.is_empty() {
        return Err(CompilingError::UnbalancedConditional { method: compiler.name });
    }
    if result.is_some() && compiler.body.last() != Some(&WasmLine::Op("return".to_string())) {
        compiler.body.push(WasmLine::Op("unreachable".to_string()));
    }

    let mut all_locals = compiler.locals;
    all_locals.extend(compiler.scratch.iter().flat_map(|(ty, _)| [*ty, *ty]));
    Ok(WasmFunction {
        name,
        parameters,
        result,
        locals: all_locals,
        body: compiler.body,
    })
}

struct FunctionCompiler<'a, 'c> {
    method: &'a MethodItem,
    context: &'a mut FunctionContext<'c>,
    name: String,
    parameter_count: u32,
    locals: Vec<&'static str>,
    /// Two scratch locals per WASM type, as `(type, first index)`.
    scratch: Vec<(&'static str, u32)>,
    types: Vec<PrimitiveType>,
    body: Vec<WasmLine>,
    blocks: Vec<WasmBlock>,
}

impl FunctionCompiler<'_, '_> {
    fn emit(&mut self, op: impl Into<String>) {
        let line = WasmLine::Op(op.into());
        match self.blocks.last_mut() {
            Some(block) => block.current().push(line),
            None => self.body.push(line),
        }
    }

    fn pop(&mut self, ins: &IntermediateInstruction) -> Result<PrimitiveType, CompilingError> {
        self.types.pop().ok_or_else(|| CompilingError::StackUnderflow {
            method: self.name.clone(),
            instruction: ins.to_string(),
        })
    }

    fn unsupported(&self, ty: PrimitiveType) -> CompilingError {
        CompilingError::UnsupportedType {
            backend: BACKEND,
            ty,
            method: self.name.clone(),
        }
    }

    fn value_type(&self, ty: PrimitiveType) -> Result<&'static str, CompilingError> {
        wasm_type(ty).ok_or_else(|| self.unsupported(ty))
    }

    /// WASM index of an IL local index.
    fn local(&self, ins: &IntermediateInstruction) -> Result<(u32, PrimitiveType), CompilingError> {
        let index = ins.local_index()?;
        let ty = self
            .method
            .local_type(index)
            .ok_or_else(|| malformed(ins, "unknown local"))?;
        let mapped = if index < 0 {
            (-index - 1) as u32
        } else {
            self.parameter_count + index as u32
        };
        Ok((mapped, ty))
    }

    /// Two scratch locals of `ty`, allocated after the declared locals.
    fn scratch(&mut self, ty: &'static str) -> (u32, u32) {
        if let Some((_, first)) = self.scratch.iter().find(|(t, _)| *t == ty) {
            return (*first, first + 1);
        }
        let first = self.parameter_count + self.locals.len() as u32 + 2 * self.scratch.len() as u32;
        self.scratch.push((ty, first));
        (first, first + 1)
    }

    fn instruction(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        match ins.instruction {
            Instruction::Nop => self.emit("nop"),
            Instruction::LdConst => self.load_constant(ins)?,
            Instruction::GetLocal => {
                let (index, ty) = self.local(ins)?;
                self.emit(format!("local.get {index}"));
                self.types.push(ty);
            }
            Instruction::SetLocal => {
                let (index, _) = self.local(ins)?;
                self.pop(ins)?;
                self.emit(format!("local.set {index}"));
            }
            Instruction::Add
            | Instruction::Sub
            | Instruction::Mul
            | Instruction::Div
            | Instruction::Rem
            | Instruction::Equals
            | Instruction::Unequals => self.binary(ins)?,
            Instruction::Conv => {
                let target = ins.operand_type()?;
                let from = self.pop(ins)?;
                self.convert(from, target)?;
                self.types.push(target);
            }
            Instruction::CallStatic => {
                let (ret, target) = ins.call_target()?;
                let id = self
                    .context
                    .root
                    .find_method(&target)
                    .ok_or_else(|| CompilingError::UnknownCallTarget {
                        reference: target.to_string(),
                    })?;
                let arguments = self.context.root.method(id).parameters.len();
                for _ in 0..arguments {
                    self.pop(ins)?;
                }
                self.emit(format!("call ${}", target.flat_name()));
                if ret != PrimitiveType::Void {
                    self.types.push(ret);
                }
            }
            Instruction::Jump => {
                return Err(CompilingError::UnstructuredJump {
                    backend: BACKEND,
                    method: self.name.clone(),
                });
            }
            Instruction::If => {
                let (kind, compare) = ins.condition()?;
                self.condition(ins, kind, compare)?;
                self.blocks.push(WasmBlock::default());
            }
            Instruction::Else => {
                let unbalanced = CompilingError::UnbalancedConditional {
                    method: self.name.clone(),
                };
                let block = self.blocks.last_mut().ok_or_else(|| unbalanced.clone())?;
                if block.otherwise.is_some() {
                    return Err(unbalanced);
                }
                block.otherwise = Some(Vec::new());
            }
            Instruction::EndIf => {
                let block = self.blocks.pop().ok_or_else(|| CompilingError::UnbalancedConditional {
                    method: self.name.clone(),
                })?;
                let line = block.close();
                match self.blocks.last_mut() {
                    Some(parent) => parent.current().push(line),
                    None => self.body.push(line),
                }
            }
            Instruction::Ret => {
                if self.method.return_type != PrimitiveType::Void {
                    self.pop(ins)?;
                }
                self.emit("return");
            }
            Instruction::Pop => {
                self.pop(ins)?;
                self.emit("drop");
            }
        }
        Ok(())
    }

    fn load_constant(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let (ty, raw) = ins.constant()?;
        match ty {
            PrimitiveType::Str => {
                let address = self.context.data.string(raw);
                self.emit(format!("i64.const {address}"));
                if let Some(load) = self.context.load_string.clone() {
                    self.emit(format!("call ${load}"));
                }
            }
            PrimitiveType::Bool => {
                let value = match raw {
                    "true" => 1,
                    "false" => 0,
                    _ => return Err(malformed(ins, "boolean constant")),
                };
                self.emit(format!("i32.const {value}"));
            }
            PrimitiveType::F32 | PrimitiveType::F64 => {
                let value: f64 = raw.parse().map_err(|_| malformed(ins, "floating constant"))?;
                let wt = self.value_type(ty)?;
                self.emit(format!("{wt}.const {value}"));
            }
            _ => {
                let value: i128 = raw.parse().map_err(|_| malformed(ins, "integer constant"))?;
                let wt = self.value_type(ty)?;
                let value = match ty {
                    PrimitiveType::U64 => value.to_string(),
                    _ if wt == "i64" => (value as i64).to_string(),
                    _ => (value as i32).to_string(),
                };
                self.emit(format!("{wt}.const {value}"));
            }
        }
        self.types.push(ty);
        Ok(())
    }

    fn binary(&mut self, ins: &IntermediateInstruction) -> Result<(), CompilingError> {
        let ty = ins.operand_type()?;
        self.pop(ins)?;
        self.pop(ins)?;
        let wt = self.value_type(ty)?;
        let float = ty.is_floating();
        let sign = if ty.is_signed() { "_s" } else { "_u" };

        // The IL pushes the right operand first, so the left one is on top.
        if matches!(ins.instruction, Instruction::Sub | Instruction::Div | Instruction::Rem) {
            let (left, right) = self.scratch(wt);
            self.emit(format!("local.set {left}"));
            self.emit(format!("local.set {right}"));
            if float && ins.instruction == Instruction::Rem {
                // left - trunc(left / right) * right
                self.emit(format!("local.get {left}"));
                self.emit(format!("local.get {left}"));
                self.emit(format!("local.get {right}"));
                self.emit(format!("{wt}.div"));
                self.emit(format!("{wt}.trunc"));
                self.emit(format!("local.get {right}"));
                self.emit(format!("{wt}.mul"));
                self.emit(format!("{wt}.sub"));
                self.types.push(ty);
                return Ok(());
            }
            self.emit(format!("local.get {left}"));
            self.emit(format!("local.get {right}"));
        }

        let (op, result) = match ins.instruction {
            Instruction::Add => ("add".to_string(), ty),
            Instruction::Sub => ("sub".to_string(), ty),
            Instruction::Mul => ("mul".to_string(), ty),
            Instruction::Div if float => ("div".to_string(), ty),
            Instruction::Div => (format!("div{sign}"), ty),
            Instruction::Rem => (format!("rem{sign}"), ty),
            Instruction::Equals => ("eq".to_string(), PrimitiveType::Bool),
            _ => ("ne".to_string(), PrimitiveType::Bool),
        };
        self.emit(format!("{wt}.{op}"));
        if result == ty {
            self.narrow(ty);
        }
        self.types.push(result);
        Ok(())
    }

    /// Wrap an `i32` holding an 8- or 16-bit value back into range.
    fn narrow(&mut self, ty: PrimitiveType) {
        match ty {
            PrimitiveType::I8 => self.emit("i32.extend8_s"),
            PrimitiveType::I16 => self.emit("i32.extend16_s"),
            PrimitiveType::U8 => {
                self.emit("i32.const 255");
                self.emit("i32.and");
            }
            PrimitiveType::U16 => {
                self.emit("i32.const 65535");
                self.emit("i32.and");
            }
            _ => {}
        }
    }

    fn convert(&mut self, from: PrimitiveType, to: PrimitiveType) -> Result<(), CompilingError> {
        if from == to {
            return Ok(());
        }
        if from == PrimitiveType::Str || to == PrimitiveType::Str {
            let reference = GlobalReference {
                namespace: vec!["Std".into(), "Type".into(), "Casting".into()],
                method: vec![format!("Cast_{}", to.tag())],
                parameters: vec![from],
            };
            if self.context.root.find_method(&reference).is_none() {
                return Err(CompilingError::MissingImport {
                    reference: reference.to_string(),
                });
            }
            self.emit(format!("call ${}", reference.flat_name()));
            return Ok(());
        }

        let unsupported = || CompilingError::UnsupportedConversion {
            backend: BACKEND,
            from,
            to,
        };
        let source = wasm_type(from).ok_or_else(unsupported)?;
        let target = wasm_type(to).ok_or_else(unsupported)?;
        let sign = if from.is_signed() { "s" } else { "u" };

        if to == PrimitiveType::Bool && !from.is_floating() {
            self.emit(format!("{source}.const 0"));
            self.emit(format!("{source}.ne"));
            return Ok(());
        }
        match (source, target) {
            ("i32", "i64") => self.emit(format!("i64.extend_i32_{sign}")),
            ("i64", "i32") => self.emit("i32.wrap_i64"),
            ("i32" | "i64", "f32" | "f64") => self.emit(format!("{target}.convert_{source}_{sign}")),
            ("f32" | "f64", "i32" | "i64") => {
                let sign = if to.is_signed() { "s" } else { "u" };
                self.emit(format!("{target}.trunc_{source}_{sign}"));
            }
            ("f32", "f64") => self.emit("f64.promote_f32"),
            ("f64", "f32") => self.emit("f32.demote_f64"),
            _ => {}
        }
        self.narrow(to);
        Ok(())
    }

    fn condition(
        &mut self,
        ins: &IntermediateInstruction,
        kind: ConditionKind,
        compare: Option<i128>,
    ) -> Result<(), CompilingError> {
        if kind == ConditionKind::Forced {
            self.emit("i32.const 1");
            return Ok(());
        }
        let ty = self.pop(ins)?;
        let wt = self.value_type(ty)?;
        match kind {
            ConditionKind::True => {
                if wt != "i32" {
                    self.emit(format!("{wt}.const 0"));
                    self.emit(format!("{wt}.ne"));
                }
            }
            ConditionKind::False | ConditionKind::Zero => {
                if ty.is_floating() {
                    self.emit(format!("{wt}.const 0"));
                    self.emit(format!("{wt}.eq"));
                } else {
                    self.emit(format!("{wt}.eqz"));
                }
            }
            _ => {
                let compare = compare.ok_or_else(|| malformed(ins, "comparison value"))?;
                let suffix = if ty.is_floating() {
                    ""
                } else if ty.is_signed() {
                    "_s"
                } else {
                    "_u"
                };
                let op = match kind {
                    ConditionKind::Equal => "eq".to_string(),
                    ConditionKind::Unequal => "ne".to_string(),
                    ConditionKind::Greater => format!("gt{suffix}"),
                    ConditionKind::Lesser => format!("lt{suffix}"),
                    ConditionKind::GreaterEqual => format!("ge{suffix}"),
                    _ => format!("le{suffix}"),
                };
                self.emit(format!("{wt}.const {compare}"));
                self.emit(format!("{wt}.{op}"));
            }
        }
        Ok(())
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
    fn blocks_render_as_structured_if() {
        let body = vec![
            WasmLine::Op("local.get 0".into()),
            WasmLine::If {
                then: vec![WasmLine::Op("i32.const 1".into()), WasmLine::Op("return".into())],
                otherwise: Some(vec![WasmLine::Op("nop".into())]),
            },
        ];
        let mut emitter = WatEmitter::new();
        render_lines(&mut emitter, &body);
        assert_eq!(
            emitter.finish(),
            "local.get 0\nif\n  i32.const 1\n  return\nelse\n  nop\nend\n"
        );
    }

    #[test]
    fn else_redirects_into_its_own_branch() {
        let mut block = WasmBlock::default();
        block.current().push(WasmLine::Op("a".into()));
        block.otherwise = Some(Vec::new());
        block.current().push(WasmLine::Op("b".into()));
        assert_eq!(
            block.close(),
            WasmLine::If {
                then: vec![WasmLine::Op("a".into())],
                otherwise: Some(vec![WasmLine::Op("b".into())]),
            }
        );
    }
}
