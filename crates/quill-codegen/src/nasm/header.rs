//! Merging hand-written library assembly from header scripts.
//!
//! A header's assembly is split by section:
//!
//! - `extern` / `global` lines are collected once for the whole output;
//! - `.data` and `.rodata` entries get fresh `rod_` labels in the shared
//!   data table, and references to them in `.text` are rewritten;
//! - in `.text`, every global label starts a new method; local `.labels`
//!   and jumps to them become jump bridges so they cannot clash with the
//!   `.LXXXX` labels of the output;
//! - `.bss` lines and all other instructions are copied verbatim.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use super::asm::{AsmLine, AsmMethod, Bridge};
use super::data::DataTable;

const DATA_DIRECTIVES: &[&str] = &["db", "dw", "dd", "dq", "dt", "times", "equ"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Text,
    Data,
    Rodata,
    Bss,
}

/// Everything taken from header assembly.
#[derive(Debug, Default)]
pub struct Library {
    pub directives: Vec<String>,
    pub methods: Vec<AsmMethod>,
    pub bss: Vec<String>,
    pub defined: FxHashSet<String>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    fn directive(&mut self, line: &str) {
        if !self.directives.iter().any(|d| d == line) {
            self.directives.push(line.to_string());
        }
    }

    /// Merge one header's assembly text.
    pub fn merge(&mut self, assembly: &str, data: &mut DataTable) {
        let mut section = Section::Text;
        let mut renames: FxHashMap<String, String> = FxHashMap::default();
        let mut current: Option<MethodBuilder> = None;

        // Data labels are collected first so `.text` can refer to them in
        // any order.
        let lines: Vec<&str> = assembly.lines().map(strip_comment).map(str::trim).collect();
        for line in lines.iter().filter(|l| !l.is_empty()) {
            if let Some(name) = section_name(line) {
                section = name;
                continue;
            }
            if matches!(section, Section::Data | Section::Rodata) && !is_directive(line) {
                match split_data_label(line) {
                    Some((label, body)) => {
                        let fresh = data.next_label();
                        renames.insert(label.to_string(), fresh.clone());
                        if section == Section::Rodata {
                            data.push_rodata(fresh, body.to_string());
                        } else {
                            data.push_data(fresh, body.to_string());
                        }
                    }
                    None => data.extend_last(section == Section::Rodata, line),
                }
            }
        }

        section = Section::Text;
        for line in lines.into_iter().filter(|l| !l.is_empty()) {
            if let Some(name) = section_name(line) {
                section = name;
                continue;
            }
            if is_directive(line) {
                self.directive(line);
                continue;
            }
            match section {
                Section::Data | Section::Rodata => {}
                Section::Bss => self.bss.push(line.to_string()),
                Section::Text => {
                    if let Some(label) = line.strip_suffix(':').filter(|l| !l.contains(char::is_whitespace)) {
                        if label.starts_with('.') {
                            match current.as_mut() {
                                Some(method) => {
                                    let bridge = method.bridge(label);
                                    method.asm.patch_here(bridge);
                                }
                                None => warn!(label, "local label outside of a method is ignored"),
                            }
                        } else {
                            if let Some(done) = current.take() {
                                self.finish(done);
                            }
                            self.defined.insert(label.to_string());
                            current = Some(MethodBuilder::new(label));
                        }
                        continue;
                    }
                    let Some(method) = current.as_mut() else {
                        warn!(line, "instruction outside of a method is ignored");
                        continue;
                    };
                    method.line(line, &renames);
                }
            }
        }
        if let Some(done) = current.take() {
            self.finish(done);
        }
    }

    fn finish(&mut self, mut method: MethodBuilder) {
        method.asm.seal();
        if method.asm.has_unpatched() {
            warn!(method = %method.asm.label, "jump to an undefined local label");
        }
        self.methods.push(method.asm);
    }
}

struct MethodBuilder {
    asm: AsmMethod,
    locals: FxHashMap<String, Bridge>,
}

impl MethodBuilder {
    fn new(label: &str) -> Self {
        Self {
            asm: AsmMethod::new(label),
            locals: FxHashMap::default(),
        }
    }

    fn bridge(&mut self, label: &str) -> Bridge {
        if let Some(bridge) = self.locals.get(label) {
            return *bridge;
        }
        let bridge = self.asm.new_bridge();
        self.locals.insert(label.to_string(), bridge);
        bridge
    }

    fn line(&mut self, line: &str, renames: &FxHashMap<String, String>) {
        let mut parts = line.splitn(2, char::is_whitespace);
        let mnemonic = parts.next().unwrap_or_default();
        let operand = parts.next().map(str::trim).unwrap_or_default();
        if mnemonic.to_ascii_uppercase().starts_with('J') && operand.starts_with('.') {
            let bridge = self.bridge(operand);
            self.asm.jump(mnemonic.to_ascii_uppercase(), bridge);
            return;
        }
        self.asm.push(AsmLine::Raw(rename_labels(line, renames)));
    }
}

fn section_name(line: &str) -> Option<Section> {
    let lower = line.to_ascii_lowercase();
    let name = lower
        .strip_prefix("section ")
        .or_else(|| lower.strip_prefix("segment "))?
        .trim();
    Some(match name.split_whitespace().next().unwrap_or_default() {
        ".data" => Section::Data,
        ".rodata" => Section::Rodata,
        ".bss" => Section::Bss,
        _ => Section::Text,
    })
}

fn is_directive(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("extern ") || lower.starts_with("global ")
}

/// `label: db ...` or `label db ...`.
fn split_data_label(line: &str) -> Option<(&str, &str)> {
    let (first, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if let Some(label) = first.strip_suffix(':') {
        return Some((label, rest.trim()));
    }
    let next = rest.split_whitespace().next()?;
    if DATA_DIRECTIVES.contains(&next.to_ascii_lowercase().as_str()) {
        return Some((first, rest.trim()));
    }
    None
}

/// Drop a `;` comment that is not inside a quoted string.
fn strip_comment(line: &str) -> &str {
    let mut quote = None;
    for (i, c) in line.char_indices() {
        match (quote, c) {
            (None, '"' | '\'' | '`') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '?' | '@' | '#' | '~')
}

fn rename_labels(line: &str, renames: &FxHashMap<String, String>) -> String {
    if renames.is_empty() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut token = String::new();
    for c in line.chars() {
        if is_label_char(c) {
            token.push(c);
            continue;
        }
        out.push_str(renames.get(&token).map_or(&token, |r| r));
        token.clear();
        out.push(c);
    }
    out.push_str(renames.get(&token).map_or(&token, |r| r));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSOLE: &str = r#"
extern _write
global Std.Console@Write?str

section .rodata
newline: db 0x0A, 0   ; trailing newline

section .text
Std.Console@Write?str:
    mov eax, [esp + 4]
    test eax, eax
    jz .done
    push newline
    call _write
.done:
    ret 4
"#;

    #[test]
    fn methods_and_directives_are_collected() {
        let mut data = DataTable::new();
        let mut library = Library::new();
        library.merge(CONSOLE, &mut data);
        library.merge(CONSOLE, &mut data);

        assert_eq!(library.directives, ["extern _write", "global Std.Console@Write?str"]);
        assert!(library.defined.contains("Std.Console@Write?str"));
        assert_eq!(library.methods[0].label, "Std.Console@Write?str");
    }

    #[test]
    fn data_labels_are_relabelled() {
        let mut data = DataTable::new();
        let mut library = Library::new();
        library.merge(CONSOLE, &mut data);

        assert_eq!(data.rodata(), [("rod_00000000".to_string(), "db 0x0A, 0".to_string())]);
        let mut out = String::new();
        library.methods[0].render(&mut out);
        assert!(out.contains("push rod_00000000"));
        assert!(!out.contains("newline"));
    }

    #[test]
    fn local_labels_become_bridges() {
        let mut data = DataTable::new();
        let mut library = Library::new();
        library.merge(CONSOLE, &mut data);

        let mut out = String::new();
        library.methods[0].render(&mut out);
        assert!(out.contains("JZ      .L0005"), "{out}");
        assert!(out.contains(".L0005:     ret 4"), "{out}");
        assert!(!out.contains(".done"));
    }

    #[test]
    fn comments_inside_strings_survive() {
        assert_eq!(strip_comment("db \"a;b\", 0 ; note"), "db \"a;b\", 0 ");
    }
}
