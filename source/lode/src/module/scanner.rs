//! A single-pass import scanner for `.proto` sources.
//!
//! Dependency resolution only needs the import paths, so this walks the
//! raw bytes once, skipping comments and string literals, instead of
//! parsing the file. The grammar accepted is
//! `import [public|weak] "<path>";` anywhere a statement can start.

use std::collections::BTreeSet;

/// Extracts the set of imported paths from proto source bytes.
///
/// Malformed input never fails the scan; statements that do not match the
/// import shape are skipped, matching what a full parse would later reject
/// elsewhere.
pub fn scan_imports(data: &[u8]) -> BTreeSet<String> {
    let mut imports = BTreeSet::new();
    let mut tokens = Tokenizer::new(data);
    while let Some(token) = tokens.next_token() {
        if token != Token::Ident("import") {
            continue;
        }
        let mut token = tokens.next_token();
        if matches!(token, Some(Token::Ident("public")) | Some(Token::Ident("weak"))) {
            token = tokens.next_token();
        }
        if let Some(Token::Str(path)) = token {
            if tokens.next_token() == Some(Token::Punct(b';')) {
                imports.insert(path);
            }
        }
    }
    imports
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Ident(&'a str),
    Str(String),
    Punct(u8),
}

struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            self.skip_whitespace_and_comments();
            let byte = *self.data.get(self.pos)?;
            match byte {
                b'"' | b'\'' => return self.string_literal(byte),
                b if b.is_ascii_alphabetic() || b == b'_' => {
                    let start = self.pos;
                    while self
                        .data
                        .get(self.pos)
                        .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'.')
                    {
                        self.pos += 1;
                    }
                    let ident = std::str::from_utf8(&self.data[start..self.pos]).ok()?;
                    return Some(Token::Ident(ident));
                }
                _ => {
                    self.pos += 1;
                    return Some(Token::Punct(byte));
                }
            }
        }
    }

    /// Reads a quoted literal, handling `\"` escapes. Unterminated strings
    /// consume to end of input and yield nothing.
    fn string_literal(&mut self, quote: u8) -> Option<Token<'a>> {
        self.pos += 1;
        let mut value = String::new();
        while let Some(&byte) = self.data.get(self.pos) {
            self.pos += 1;
            match byte {
                b'\\' => {
                    if let Some(&escaped) = self.data.get(self.pos) {
                        self.pos += 1;
                        value.push(escaped as char);
                    }
                }
                b if b == quote => return Some(Token::Str(value)),
                _ => value.push(byte as char),
            }
        }
        None
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.data.get(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            match (self.data.get(self.pos), self.data.get(self.pos + 1)) {
                (Some(b'/'), Some(b'/')) => {
                    while self.data.get(self.pos).is_some_and(|b| *b != b'\n') {
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos += 2;
                    while self.pos < self.data.len() {
                        if self.data[self.pos] == b'*' && self.data.get(self.pos + 1) == Some(&b'/')
                        {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_plain_imports() {
        let imports = scan_imports(
            b"syntax = \"proto3\";\npackage acme.bond.v1;\nimport \"acme/date/v1/date.proto\";\nimport \"acme/geo/v1/geo.proto\";\n",
        );
        assert_eq!(
            imports.into_iter().collect::<Vec<_>>(),
            ["acme/date/v1/date.proto", "acme/geo/v1/geo.proto"]
        );
    }

    #[test]
    fn handles_public_and_weak() {
        let imports =
            scan_imports(b"import public \"a.proto\";\nimport weak \"b.proto\";\nimport \"c.proto\";");
        assert_eq!(imports.len(), 3);
    }

    #[test]
    fn ignores_commented_out_imports() {
        let imports = scan_imports(
            b"// import \"dead.proto\";\n/* import \"also_dead.proto\"; */\nimport \"live.proto\";\n",
        );
        assert_eq!(imports.into_iter().collect::<Vec<_>>(), ["live.proto"]);
    }

    #[test]
    fn ignores_import_inside_strings() {
        let imports =
            scan_imports(b"option note = \"import \\\"fake.proto\\\";\";\nimport \"real.proto\";");
        assert_eq!(imports.into_iter().collect::<Vec<_>>(), ["real.proto"]);
    }

    #[test]
    fn skips_malformed_statements() {
        let imports = scan_imports(b"import ;\nimport 42;\nimport \"ok.proto\";");
        assert_eq!(imports.into_iter().collect::<Vec<_>>(), ["ok.proto"]);
    }

    #[test]
    fn deduplicates() {
        let imports = scan_imports(b"import \"a.proto\";\nimport \"a.proto\";");
        assert_eq!(imports.len(), 1);
    }
}
