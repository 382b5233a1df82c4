//! Stack frame layout and the virtual operand stack.
//!
//! ```text
//! [EBP + 8 + prefix(i)]   parameter i
//! [EBP + 4]               return address
//! [EBP]                   saved EBP
//! [EBP - prefix(k)]       local k (prefix includes k itself)
//! [EBP - locals - 4(s+1)] scratch slot s
//! ```

use quill_core::PrimitiveType;

/// A value the IL has pushed but the emitter has not materialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    /// Immediate: a number or a data label.
    Constant { ty: PrimitiveType, value: String },
    /// A parameter or local, still in its frame slot.
    Local { ty: PrimitiveType, index: i32 },
    /// The result of the last operation, held in `EAX`.
    Operation { ty: PrimitiveType },
    /// An operation result spilled to a scratch slot.
    Temp { ty: PrimitiveType, slot: u32 },
}

impl StackValue {
    pub fn ty(&self) -> PrimitiveType {
        match self {
            StackValue::Constant { ty, .. }
            | StackValue::Local { ty, .. }
            | StackValue::Operation { ty }
            | StackValue::Temp { ty, .. } => *ty,
        }
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, StackValue::Operation { .. })
    }
}

pub fn size_specifier(size: u32) -> &'static str {
    match size {
        1 => "BYTE",
        2 => "WORD",
        _ => "DWORD",
    }
}

/// Low part of `EAX` holding a value of `size` bytes.
pub fn accumulator(size: u32) -> &'static str {
    match size {
        1 => "AL",
        2 => "AX",
        _ => "EAX",
    }
}

pub fn align4(value: u32) -> u32 {
    (value + 3) & !3
}

/// Frame offsets of one method.
#[derive(Debug, Clone)]
pub struct Frame {
    parameters: Vec<PrimitiveType>,
    locals: Vec<PrimitiveType>,
    temps: u32,
    free_temps: Vec<u32>,
}

impl Frame {
    pub fn new(parameters: Vec<PrimitiveType>, locals: Vec<PrimitiveType>) -> Self {
        Self {
            parameters,
            locals,
            temps: 0,
            free_temps: Vec::new(),
        }
    }

    pub fn parameters_size(&self) -> u32 {
        self.parameters.iter().map(|t| t.size()).sum()
    }

    pub fn locals_size(&self) -> u32 {
        self.locals.iter().map(|t| t.size()).sum()
    }

    /// Bytes reserved by `ENTER`.
    pub fn size(&self) -> u32 {
        align4(self.locals_size() + 4 * self.temps)
    }

    pub fn local_type(&self, index: i32) -> Option<PrimitiveType> {
        if index < 0 {
            self.parameters.get((-index - 1) as usize).copied()
        } else {
            self.locals.get(index as usize).copied()
        }
    }

    /// Memory operand of an IL local index, with its size specifier.
    pub fn local_operand(&self, index: i32) -> Option<String> {
        let ty = self.local_type(index)?;
        let spec = size_specifier(ty.size());
        if index < 0 {
            let position = (-index - 1) as usize;
            let offset: u32 = 8 + self.parameters[..position].iter().map(|t| t.size()).sum::<u32>();
            Some(format!("{spec} [EBP + {offset}]"))
        } else {
            let offset: u32 = self.locals[..=index as usize].iter().map(|t| t.size()).sum();
            Some(format!("{spec} [EBP - {offset}]"))
        }
    }

    pub fn alloc_temp(&mut self) -> u32 {
        if let Some(slot) = self.free_temps.pop() {
            return slot;
        }
        self.temps += 1;
        self.temps - 1
    }

    pub fn free_temp(&mut self, slot: u32) {
        self.free_temps.push(slot);
    }

    pub fn temp_operand(&self, slot: u32) -> String {
        format!("DWORD [EBP - {}]", self.locals_size() + 4 * (slot + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_grow_down_and_parameters_up() {
        let frame = Frame::new(
            vec![PrimitiveType::I32, PrimitiveType::U8],
            vec![PrimitiveType::I32, PrimitiveType::I16],
        );
        assert_eq!(frame.local_operand(0).as_deref(), Some("DWORD [EBP - 4]"));
        assert_eq!(frame.local_operand(1).as_deref(), Some("WORD [EBP - 6]"));
        assert_eq!(frame.local_operand(-1).as_deref(), Some("DWORD [EBP + 8]"));
        assert_eq!(frame.local_operand(-2).as_deref(), Some("BYTE [EBP + 12]"));
        assert_eq!(frame.local_operand(2), None);
    }

    #[test]
    fn temps_follow_locals_and_are_reused() {
        let mut frame = Frame::new(vec![], vec![PrimitiveType::U8]);
        let a = frame.alloc_temp();
        assert_eq!(frame.temp_operand(a), "DWORD [EBP - 5]");
        frame.free_temp(a);
        assert_eq!(frame.alloc_temp(), a);
        assert_eq!(frame.size(), 8);
    }
}
