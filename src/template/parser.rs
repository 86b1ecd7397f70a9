//! Template parser module.
//!
//! Turns template source into a tree of [`Node`]s.

use super::{Result, TemplateError};

/// A node in the template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted as-is.
    Text(String),

    /// `{{name}}` or `{{entry.path}}`, HTML-escaped on output.
    Variable(String),

    /// `{{{name}}}`, emitted without escaping.
    RawVariable(String),

    /// `{{#if cond}}...{{else}}...{{/if}}`
    If {
        condition: String,
        then_branch: Vec<Node>,
        else_branch: Vec<Node>,
    },

    /// `{{#unless cond}}...{{/unless}}`
    Unless { condition: String, body: Vec<Node> },

    /// `{{#each list as item}}...{{else}}...{{/each}}`
    ///
    /// The `else` branch renders when the list is empty or missing.
    Each {
        variable: String,
        item_name: Option<String>,
        body: Vec<Node>,
        empty: Vec<Node>,
    },
}

/// Template parser.
pub struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given input.
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Parse the whole input.
    pub fn parse(mut self) -> Result<Vec<Node>> {
        let nodes = self.parse_nodes(None)?;
        if self.pos < self.input.len() {
            return Err(self.error("unexpected closing tag"));
        }
        Ok(nodes)
    }

    /// Parse nodes until the closing tag of `block` (or `{{else}}`) or end of input.
    fn parse_nodes(&mut self, block: Option<&str>) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();

        while self.pos < self.input.len() {
            if block.is_some() && (self.peek_str("{{/") || self.peek_str("{{else}}")) {
                break;
            }
            if block.is_none() && self.peek_str("{{/") {
                break;
            }

            if self.peek_str("\\{{") {
                self.pos += 3;
                nodes.push(Node::Text("{{".to_string()));
            } else if self.peek_str("{{{") {
                nodes.push(self.parse_raw_variable()?);
            } else if self.peek_str("{{") {
                nodes.push(self.parse_tag()?);
            } else {
                let text = self.collect_text();
                if !text.is_empty() {
                    nodes.push(Node::Text(text));
                }
            }
        }

        if let Some(tag) = block {
            if self.pos >= self.input.len() {
                return Err(self.error(&format!("unclosed {{{{#{tag}}}}} block")));
            }
        }

        Ok(nodes)
    }

    fn parse_raw_variable(&mut self) -> Result<Node> {
        self.expect("{{{")?;
        self.skip_whitespace();
        let name = self.parse_identifier()?;
        self.skip_whitespace();
        self.expect("}}}")?;
        Ok(Node::RawVariable(name))
    }

    fn parse_tag(&mut self) -> Result<Node> {
        self.expect("{{")?;
        self.skip_whitespace();

        if self.peek_str("#") {
            self.pos += 1;
            self.skip_whitespace();
            return self.parse_block();
        }

        let name = self.parse_identifier()?;
        self.skip_whitespace();
        self.expect("}}")?;
        Ok(Node::Variable(name))
    }

    fn parse_block(&mut self) -> Result<Node> {
        let tag = self.parse_identifier()?;
        self.skip_whitespace();
        let variable = self.parse_identifier()?;
        self.skip_whitespace();

        match tag.as_str() {
            "if" => {
                self.expect("}}")?;
                let then_branch = self.parse_nodes(Some("if"))?;
                let else_branch = self.parse_else("if")?;
                self.expect("{{/if}}")?;
                Ok(Node::If {
                    condition: variable,
                    then_branch,
                    else_branch,
                })
            }
            "unless" => {
                self.expect("}}")?;
                let body = self.parse_nodes(Some("unless"))?;
                self.expect("{{/unless}}")?;
                Ok(Node::Unless {
                    condition: variable,
                    body,
                })
            }
            "each" => {
                let item_name = if self.peek_str("as ") {
                    self.pos += 3;
                    self.skip_whitespace();
                    Some(self.parse_identifier()?)
                } else {
                    None
                };
                self.skip_whitespace();
                self.expect("}}")?;
                let body = self.parse_nodes(Some("each"))?;
                let empty = self.parse_else("each")?;
                self.expect("{{/each}}")?;
                Ok(Node::Each {
                    variable,
                    item_name,
                    body,
                    empty,
                })
            }
            other => Err(self.error(&format!("unknown block tag: {other}"))),
        }
    }

    /// Parse an optional `{{else}}` branch of `block`.
    fn parse_else(&mut self, block: &str) -> Result<Vec<Node>> {
        if self.peek_str("{{else}}") {
            self.pos += "{{else}}".len();
            self.parse_nodes(Some(block))
        } else {
            Ok(Vec::new())
        }
    }

    /// Variable names: letters, digits, `_`, `-` and `.` for nested access.
    /// A leading `@` marks loop data such as `@index`.
    fn parse_identifier(&mut self) -> Result<String> {
        let rest = &self.input[self.pos..];
        let prefix = usize::from(rest.starts_with('@'));
        let len = rest[prefix..]
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '-'))
            .unwrap_or(rest.len() - prefix);

        if len == 0 {
            return Err(self.error("expected identifier"));
        }

        let end = prefix + len;
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn collect_text(&mut self) -> String {
        let start = self.pos;
        let rest = &self.input[start..];
        let len = match (rest.find("{{"), rest.find("\\{{")) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => rest.len(),
        };
        self.pos += len;
        rest[..len].to_string()
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek_str(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if self.peek_str(s) {
            self.pos += s.len();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{s}'")))
        }
    }

    /// A parse error annotated with the current line number.
    fn error(&self, message: &str) -> TemplateError {
        let line = self.input[..self.pos].matches('\n').count() + 1;
        let found: String = self.input[self.pos..].chars().take(10).collect();
        TemplateError::Parse(format!("line {line}: {message} near '{found}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<Vec<Node>> {
        Parser::new(input).parse()
    }

    #[test]
    fn test_parse_text_only() {
        assert_eq!(
            parse("Hello, World!").unwrap(),
            vec![Node::Text("Hello, World!".to_string())]
        );
    }

    #[test]
    fn test_parse_variables() {
        assert_eq!(
            parse("{{ name }} is {{entry.size}}").unwrap(),
            vec![
                Node::Variable("name".to_string()),
                Node::Text(" is ".to_string()),
                Node::Variable("entry.size".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_raw_variable() {
        assert_eq!(
            parse("<p>{{{html}}}</p>").unwrap(),
            vec![
                Node::Text("<p>".to_string()),
                Node::RawVariable("html".to_string()),
                Node::Text("</p>".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_if_else() {
        assert_eq!(
            parse("{{#if ok}}yes{{else}}no{{/if}}").unwrap(),
            vec![Node::If {
                condition: "ok".to_string(),
                then_branch: vec![Node::Text("yes".to_string())],
                else_branch: vec![Node::Text("no".to_string())],
            }]
        );
    }

    #[test]
    fn test_parse_unless() {
        assert_eq!(
            parse("{{#unless hidden}}shown{{/unless}}").unwrap(),
            vec![Node::Unless {
                condition: "hidden".to_string(),
                body: vec![Node::Text("shown".to_string())],
            }]
        );
    }

    #[test]
    fn test_parse_each_with_alias_and_else() {
        assert_eq!(
            parse("{{#each files as f}}{{f.name}}{{else}}none{{/each}}").unwrap(),
            vec![Node::Each {
                variable: "files".to_string(),
                item_name: Some("f".to_string()),
                body: vec![Node::Variable("f.name".to_string())],
                empty: vec![Node::Text("none".to_string())],
            }]
        );
    }

    #[test]
    fn test_parse_nested_blocks() {
        let nodes = parse("{{#each files}}{{#if is_dir}}D{{else}}F{{/if}}{{/each}}").unwrap();
        let Node::Each { body, empty, .. } = &nodes[0] else {
            panic!("expected each block");
        };
        assert!(empty.is_empty());
        assert!(matches!(&body[0], Node::If { else_branch, .. } if else_branch.len() == 1));
    }

    #[test]
    fn test_parse_escaped_braces() {
        assert_eq!(
            parse("Use \\{{name}}").unwrap(),
            vec![
                Node::Text("Use ".to_string()),
                Node::Text("{{".to_string()),
                Node::Text("name}}".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_loop_data_variables() {
        let nodes = parse("{{#each items}}{{@index}}{{#if @first}}*{{/if}}{{/each}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Each {
                variable: "items".to_string(),
                item_name: None,
                body: vec![
                    Node::Variable("@index".to_string()),
                    Node::If {
                        condition: "@first".to_string(),
                        then_branch: vec![Node::Text("*".to_string())],
                        else_branch: vec![],
                    },
                ],
                empty: vec![],
            }]
        );

        assert!(matches!(parse("{{@}}"), Err(TemplateError::Parse(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("{{name"), Err(TemplateError::Parse(_))));
        assert!(matches!(parse("{{#if x}}open"), Err(TemplateError::Parse(_))));
        assert!(matches!(parse("{{#with x}}{{/with}}"), Err(TemplateError::Parse(_))));
        assert!(matches!(parse("stray {{/if}}"), Err(TemplateError::Parse(_))));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let Err(TemplateError::Parse(msg)) = parse("line one\nline two {{#bogus x}}") else {
            panic!("expected parse error");
        };
        assert!(msg.starts_with("line 2:"), "{msg}");
    }
}
