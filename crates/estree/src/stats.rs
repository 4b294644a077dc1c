//! Identifier-name statistics reported per analyzed file.
//!
//! Minified or obfuscated extension code shows up clearly in these numbers,
//! which is why they are part of the per-extension report.

use serde::Serialize;

use crate::tree::{NodeKind, Role, SyntaxTree};

/// Average identifier name lengths by kind plus the share of one-character
/// identifiers. Every field is `-1.0` (or `-1` for the percentage) when the
/// file has no matching identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CodeStats {
    pub avg_identifier_length: f64,
    pub avg_declared_variable_name_length: f64,
    pub avg_function_declaration_name_length: f64,
    pub avg_class_name_length: f64,
    pub one_character_identifier_percentage: i64,
}

impl CodeStats {
    pub const UNAVAILABLE: CodeStats = CodeStats {
        avg_identifier_length: -1.0,
        avg_declared_variable_name_length: -1.0,
        avg_function_declaration_name_length: -1.0,
        avg_class_name_length: -1.0,
        one_character_identifier_percentage: -1,
    };

    pub fn of(tree: &SyntaxTree) -> CodeStats {
        let mut all = Lengths::default();
        let mut declared = Lengths::default();
        let mut functions = Lengths::default();
        let mut classes = Lengths::default();
        let mut one_char = 0usize;

        for node in tree.iter() {
            if node.kind != NodeKind::Identifier {
                continue;
            }
            let Some(name) = node.name() else { continue };
            all.push(name.len());
            if name.chars().count() == 1 {
                one_char += 1;
            }
            let Some(parent) = node.parent else { continue };
            match tree.kind(parent) {
                NodeKind::VariableDeclarator if node.role == Role::Id => declared.push(name.len()),
                NodeKind::FunctionDeclaration if node.role == Role::Id => {
                    functions.push(name.len())
                }
                NodeKind::ClassDeclaration | NodeKind::ClassExpression
                    if node.role == Role::Id =>
                {
                    classes.push(name.len())
                }
                _ => {}
            }
        }

        CodeStats {
            avg_identifier_length: all.average(),
            avg_declared_variable_name_length: declared.average(),
            avg_function_declaration_name_length: functions.average(),
            avg_class_name_length: classes.average(),
            one_character_identifier_percentage: if all.count == 0 {
                -1
            } else {
                (one_char as f64 / all.count as f64 * 100.0).round() as i64
            },
        }
    }
}

#[derive(Default)]
struct Lengths {
    total: usize,
    count: usize,
}

impl Lengths {
    fn push(&mut self, len: usize) {
        self.total += len;
        self.count += 1;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            -1.0
        } else {
            self.total as f64 / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parse_document;
    use serde_json::json;

    #[test]
    fn empty_file_reports_sentinels() {
        let doc = json!({"type": "Program", "body": []});
        let tree = parse_document(&doc, "a.js", "").unwrap();
        assert_eq!(CodeStats::of(&tree), CodeStats::UNAVAILABLE);
    }

    #[test]
    fn averages_and_percentage() {
        // let ab = x;  => identifiers "ab" (declared) and "x"
        let doc = json!({
            "type": "Program",
            "body": [{
                "type": "VariableDeclaration",
                "kind": "let",
                "declarations": [{
                    "type": "VariableDeclarator",
                    "id": {"type": "Identifier", "name": "ab", "range": [4, 6]},
                    "init": {"type": "Identifier", "name": "x", "range": [9, 10]},
                    "range": [4, 10],
                }],
                "range": [0, 11],
            }]
        });
        let tree = parse_document(&doc, "a.js", "let ab = x;").unwrap();
        let stats = CodeStats::of(&tree);
        assert_eq!(stats.avg_identifier_length, 1.5);
        assert_eq!(stats.avg_declared_variable_name_length, 2.0);
        assert_eq!(stats.avg_function_declaration_name_length, -1.0);
        assert_eq!(stats.one_character_identifier_percentage, 50);
    }
}
