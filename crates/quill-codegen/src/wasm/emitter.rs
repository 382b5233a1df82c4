//! Indented WAT text output.

pub struct WatEmitter {
    lines: Vec<String>,
    indent: usize,
}

impl WatEmitter {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            indent: 0,
        }
    }

    pub fn push_line(&mut self, line: impl AsRef<str>) {
        let prefix = "  ".repeat(self.indent);
        self.lines.push(format!("{prefix}{}", line.as_ref()));
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

impl Default for WatEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes as a WAT string literal body (`\0a\ff...`).
pub fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        out.push_str(&format!("\\{byte:02x}"));
    }
    out
}

pub fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    let mask = align - 1;
    (value + mask) & !mask
}

/// A WAT string literal, quotes included.
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lines_are_indented() {
        let mut emitter = WatEmitter::new();
        emitter.push_line("(module");
        emitter.indent();
        emitter.push_line("(memory 1)");
        emitter.dedent();
        emitter.push_line(")");
        assert_eq!(emitter.finish(), "(module\n  (memory 1)\n)\n");
    }

    #[test]
    fn bytes_are_hex_escaped() {
        assert_eq!(encode_bytes(&[0x0a, 0xff, 0x00]), "\\0a\\ff\\00");
    }

    #[test]
    fn align_rounds_up_to_power_of_two() {
        assert_eq!(align_up(13, 8), 16);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_up(5, 0), 5);
    }
}
