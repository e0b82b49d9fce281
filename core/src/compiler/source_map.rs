//! Source Map v3 encoding

use serde::{Deserialize, Serialize};

use super::lua::Mapping;

const BASE64_DIGITS: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const VLQ_SHIFT: u32 = 5;
const VLQ_CONTINUATION: u64 = 1 << VLQ_SHIFT;
const VLQ_MASK: u64 = VLQ_CONTINUATION - 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    pub file: String,
    pub source_root: String,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Build a map for one generated file with a single source
    pub fn new(
        file: impl Into<String>,
        source_root: impl Into<String>,
        source: impl Into<String>,
        mappings: &[Mapping],
    ) -> Self {
        SourceMap {
            version: 3,
            file: file.into(),
            source_root: source_root.into(),
            sources: vec![source.into()],
            sources_content: Vec::new(),
            names: Vec::new(),
            mappings: encode_mappings(mappings),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.sources_content = vec![content.into()];
        self
    }

    pub fn to_json(&self) -> String {
        // Every field is a string or a list of strings
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Encode mappings into the `;`/`,` separated VLQ segment string
pub fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut sorted = mappings.to_vec();
    sorted.sort_by_key(|m| (m.generated_line, m.generated_column));

    let mut out = String::new();
    let mut line = 0;
    let mut previous_column = 0i64;
    let mut previous_source_line = 0i64;
    let mut previous_source_column = 0i64;
    let mut first_in_line = true;

    for mapping in &sorted {
        while line < mapping.generated_line {
            out.push(';');
            line += 1;
            previous_column = 0;
            first_in_line = true;
        }
        if !first_in_line {
            out.push(',');
        }
        first_in_line = false;

        let column = mapping.generated_column as i64;
        let source_line = mapping.source_line as i64;
        let source_column = mapping.source_column as i64;

        encode_vlq(column - previous_column, &mut out);
        // single source, index delta is always zero
        encode_vlq(0, &mut out);
        encode_vlq(source_line - previous_source_line, &mut out);
        encode_vlq(source_column - previous_source_column, &mut out);

        previous_column = column;
        previous_source_line = source_line;
        previous_source_column = source_column;
    }

    out
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = vlq & VLQ_MASK;
        vlq >>= VLQ_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION;
        }
        out.push(BASE64_DIGITS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    fn mapping(generated_line: usize, generated_column: usize, source_line: usize) -> Mapping {
        Mapping {
            generated_line,
            generated_column,
            source_line,
            source_column: 0,
        }
    }

    #[test]
    fn test_vlq_digits() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_mappings_skip_unmapped_lines() {
        let encoded = encode_mappings(&[mapping(1, 0, 0), mapping(3, 4, 2)]);
        assert_eq!(encoded, ";AAAA;;IAEA");
    }

    #[test]
    fn test_source_map_json_shape() {
        let map = SourceMap::new("main.lua", "inmemory://model/", "main.flow", &[mapping(0, 0, 0)]);
        let json: serde_json::Value = serde_json::from_str(&map.to_json()).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["sources"][0], "main.flow");
        assert_eq!(json["sourceRoot"], "inmemory://model/");
        assert_eq!(json["mappings"], "AAAA");
    }
}
