//! Import and export dictionaries attached to program resources.
//!
//! Layout: a 6-byte header, then alternating length-prefixed tag and
//! definition strings, closed by a zero length. Tags look like `C:name`
//! (native code), `B:`/`W:`/`L:name` (byte, word, long variables) or
//! `M:<message>` (message handler).

use super::format::c_string;
use super::writer::push_c_string;
use crate::LoadError;

const DICTIONARY_HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub tag: String,
    pub def: String,
}

impl DictionaryEntry {
    /// The tag letter before the colon.
    pub fn kind(&self) -> Option<char> {
        self.tag.chars().next()
    }

    /// The tag text after the `X:` prefix.
    pub fn name(&self) -> &str {
        self.tag.get(2..).unwrap_or("")
    }
}

pub fn parse_dictionary(resource: u32, data: &[u8]) -> Result<Vec<DictionaryEntry>, LoadError> {
    let bad = |reason| LoadError::BadDictionary { resource, reason };

    let mut pos = DICTIONARY_HEADER_SIZE;
    let mut entries = Vec::new();
    let mut tag: Option<String> = None;
    loop {
        let len = data
            .get(pos..pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| bad("truncated"))?;
        pos += 2;
        if len == 0 {
            break;
        }
        let text = data.get(pos..pos + len).ok_or_else(|| bad("truncated"))?;
        pos += len;
        let text = c_string(text);
        match tag.take() {
            None => tag = Some(text),
            Some(tag) => entries.push(DictionaryEntry { tag, def: text }),
        }
    }
    if tag.is_some() {
        return Err(bad("tag without definition"));
    }
    Ok(entries)
}

/// Serialize `(tag, def)` pairs.
pub fn build_dictionary<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut out = vec![0u8; DICTIONARY_HEADER_SIZE];
    for (tag, def) in entries {
        push_c_string(&mut out, tag.as_bytes());
        push_c_string(&mut out, def.as_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_in_order() {
        let bytes = build_dictionary([("C:rnd", ""), ("M:0", "14"), ("W:hp", "4,301")]);
        let entries = parse_dictionary(9, &bytes).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind(), Some('C'));
        assert_eq!(entries[0].name(), "rnd");
        assert_eq!(entries[1].def, "14");
        assert_eq!(entries[2].name(), "hp");
        assert_eq!(entries[2].def, "4,301");
    }

    #[test]
    fn empty_dictionary() {
        let bytes = build_dictionary([]);
        assert!(parse_dictionary(1, &bytes).unwrap().is_empty());
    }

    #[test]
    fn malformed_dictionaries_are_rejected() {
        let mut bytes = build_dictionary([("M:1", "20")]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            parse_dictionary(3, &bytes),
            Err(LoadError::BadDictionary { resource: 3, .. })
        ));

        let mut unpaired = vec![0u8; 6];
        push_c_string(&mut unpaired, b"M:1");
        unpaired.extend_from_slice(&[0, 0]);
        assert!(matches!(
            parse_dictionary(4, &unpaired),
            Err(LoadError::BadDictionary { reason: "tag without definition", .. })
        ));
    }
}
