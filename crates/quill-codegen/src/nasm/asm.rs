//! Assembly lines and per-method instruction buffers.

use std::fmt::Write as _;

/// Index of a jump bridge inside one [`AsmMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bridge(pub usize);

/// One line of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmLine {
    /// `MNEMONIC op1, op2`
    Instruction {
        mnemonic: &'static str,
        operands: Vec<String>,
    },
    /// A jump whose target is patched once the method is complete.
    Jump { mnemonic: String, bridge: Bridge },
    /// Copied from a header library as written.
    Raw(String),
}

impl AsmLine {
    pub fn op(mnemonic: &'static str, operands: &[&str]) -> Self {
        AsmLine::Instruction {
            mnemonic,
            operands: operands.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Instructions of one method plus the jump bridges inside it.
///
/// A bridge is created unpatched and later bound to the index of the
/// instruction it lands on; rendering turns it into a `.LXXXX` label.
#[derive(Debug, Clone, Default)]
pub struct AsmMethod {
    pub label: String,
    pub lines: Vec<AsmLine>,
    bridges: Vec<Option<usize>>,
}

impl AsmMethod {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lines: Vec::new(),
            bridges: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn push(&mut self, line: AsmLine) {
        self.lines.push(line);
    }

    pub fn op(&mut self, mnemonic: &'static str, operands: &[&str]) {
        self.lines.push(AsmLine::op(mnemonic, operands));
    }

    pub fn new_bridge(&mut self) -> Bridge {
        self.bridges.push(None);
        Bridge(self.bridges.len() - 1)
    }

    pub fn jump(&mut self, mnemonic: impl Into<String>, bridge: Bridge) {
        self.lines.push(AsmLine::Jump {
            mnemonic: mnemonic.into(),
            bridge,
        });
    }

    /// Bind `bridge` to the next instruction emitted.
    pub fn patch_here(&mut self, bridge: Bridge) {
        self.patch(bridge, self.lines.len());
    }

    pub fn patch(&mut self, bridge: Bridge, target: usize) {
        if let Some(slot) = self.bridges.get_mut(bridge.0) {
            *slot = Some(target);
        }
    }

    /// Bridges that never got a target.
    pub fn has_unpatched(&self) -> bool {
        self.bridges.iter().any(Option::is_none)
    }

    /// Make sure every bridge lands on an existing instruction.
    pub fn seal(&mut self) {
        let len = self.lines.len();
        if self.bridges.iter().any(|t| *t == Some(len)) {
            self.op("NOP", &[]);
        }
    }

    fn target_label(&self, bridge: Bridge) -> String {
        match self.bridges.get(bridge.0).copied().flatten() {
            Some(index) => instruction_label(index),
            None => String::from(".Lunpatched"),
        }
    }

    pub fn render(&self, out: &mut String) {
        let _ = writeln!(out, "{}:", self.label);
        for (index, line) in self.lines.iter().enumerate() {
            let label = format!("{}:", instruction_label(index));
            let text = match line {
                AsmLine::Instruction { mnemonic, operands } => {
                    format!("{mnemonic:<8}{}", operands.join(", "))
                }
                AsmLine::Jump { mnemonic, bridge } => {
                    format!("{mnemonic:<8}{}", self.target_label(*bridge))
                }
                AsmLine::Raw(text) => text.clone(),
            };
            let _ = writeln!(out, "{label:<12}{}", text.trim_end());
        }
    }
}

pub fn instruction_label(index: usize) -> String {
    format!(".L{index:04X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_labels_and_padding() {
        let mut method = AsmMethod::new("App@Main?");
        method.op("MOV", &["EAX", "5"]);
        method.op("RET", &[]);
        let mut out = String::new();
        method.render(&mut out);
        assert_eq!(out, "App@Main?:\n.L0000:     MOV     EAX, 5\n.L0001:     RET\n");
    }

    #[test]
    fn bridges_render_as_target_labels() {
        let mut method = AsmMethod::new("f");
        let skip = method.new_bridge();
        method.jump("JZ", skip);
        method.op("INC", &["EAX"]);
        method.patch_here(skip);
        method.op("RET", &[]);
        let mut out = String::new();
        method.render(&mut out);
        assert!(out.contains(".L0000:     JZ      .L0002"));
    }

    #[test]
    fn seal_adds_landing_instruction() {
        let mut method = AsmMethod::new("f");
        let end = method.new_bridge();
        method.jump("JMP", end);
        method.patch_here(end);
        method.seal();
        assert_eq!(method.len(), 2);
        assert!(!method.has_unpatched());
    }
}
