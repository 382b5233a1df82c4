//! Read-only data table: string constants and relabelled library data.

use rustc_hash::FxHashMap;

/// Entries of the `.data` and `.rodata` sections, labelled `rod_XXXXXXXX`.
#[derive(Debug, Default)]
pub struct DataTable {
    next: u32,
    strings: FxHashMap<String, String>,
    rodata: Vec<(String, String)>,
    data: Vec<(String, String)>,
}

impl DataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_label(&mut self) -> String {
        let label = format!("rod_{:08X}", self.next);
        self.next += 1;
        label
    }

    /// Label of a string constant, interning identical strings.
    pub fn string(&mut self, value: &str) -> String {
        if let Some(label) = self.strings.get(value) {
            return label.clone();
        }
        let label = self.next_label();
        self.rodata.push((label.clone(), encode_string(value)));
        self.strings.insert(value.to_string(), label.clone());
        label
    }

    pub fn push_rodata(&mut self, label: String, body: String) {
        self.rodata.push((label, body));
    }

    pub fn push_data(&mut self, label: String, body: String) {
        self.data.push((label, body));
    }

    /// Continue the last entry of a section with another line.
    pub fn extend_last(&mut self, read_only: bool, line: &str) {
        let section = if read_only { &mut self.rodata } else { &mut self.data };
        if let Some((_, body)) = section.last_mut() {
            body.push('\n');
            body.push_str("            ");
            body.push_str(line);
        }
    }

    pub fn rodata(&self) -> &[(String, String)] {
        &self.rodata
    }

    pub fn data(&self) -> &[(String, String)] {
        &self.data
    }
}

/// `db` body of a string: 4-byte little-endian length (bytes + 1), the
/// bytes with printable ASCII quoted, then a terminating zero.
pub fn encode_string(value: &str) -> String {
    let bytes = value.as_bytes();
    let length = (bytes.len() as u32 + 1).to_le_bytes();
    let mut parts: Vec<String> = length.iter().map(|b| format!("0x{b:02X}")).collect();

    let mut run = String::new();
    for &byte in bytes {
        if (0x20..=0x7E).contains(&byte) && byte != b'"' {
            run.push(byte as char);
            continue;
        }
        if !run.is_empty() {
            parts.push(format!("\"{run}\""));
            run.clear();
        }
        parts.push(format!("0x{byte:02X}"));
    }
    if !run.is_empty() {
        parts.push(format!("\"{run}\""));
    }
    parts.push("0".to_string());
    format!("db {}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_string_is_quoted() {
        assert_eq!(encode_string("hi"), "db 0x03, 0x00, 0x00, 0x00, \"hi\", 0");
    }

    #[test]
    fn non_ascii_bytes_are_escaped() {
        assert_eq!(
            encode_string("a\u{e9}\n"),
            "db 0x05, 0x00, 0x00, 0x00, \"a\", 0xC3, 0xA9, 0x0A, 0"
        );
    }

    #[test]
    fn empty_string_has_only_length_and_terminator() {
        assert_eq!(encode_string(""), "db 0x01, 0x00, 0x00, 0x00, 0");
    }

    #[test]
    fn identical_strings_share_a_label() {
        let mut table = DataTable::new();
        let a = table.string("hello");
        let b = table.string("hello");
        let c = table.string("world");
        assert_eq!(a, "rod_00000000");
        assert_eq!(a, b);
        assert_eq!(c, "rod_00000001");
        assert_eq!(table.rodata().len(), 2);
    }
}
