//! Template renderer module.
//!
//! Renders parsed template nodes with the given context.

use super::parser::Node;
use super::{Result, TemplateContext, TemplateError, Value};

/// Escape text for inclusion in HTML element content or quoted attributes.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Template renderer.
pub struct Renderer<'a> {
    context: &'a TemplateContext,
}

impl<'a> Renderer<'a> {
    /// Create a new renderer with the given context.
    pub fn new(context: &'a TemplateContext) -> Self {
        Self { context }
    }

    /// Render a list of nodes to a string.
    pub fn render(&self, nodes: &[Node]) -> Result<String> {
        let mut output = String::new();
        self.render_into(nodes, &mut output)?;
        Ok(output)
    }

    fn render_into(&self, nodes: &[Node], out: &mut String) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Variable(name) => out.push_str(&escape_html(&self.lookup(name))),
                Node::RawVariable(name) => out.push_str(&self.lookup(name)),
                Node::If {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    let branch = if self.is_truthy(condition) {
                        then_branch
                    } else {
                        else_branch
                    };
                    self.render_into(branch, out)?;
                }
                Node::Unless { condition, body } => {
                    if !self.is_truthy(condition) {
                        self.render_into(body, out)?;
                    }
                }
                Node::Each {
                    variable,
                    item_name,
                    body,
                    empty,
                } => self.render_each(variable, item_name.as_deref(), body, empty, out)?,
            }
        }
        Ok(())
    }

    /// Display string for a variable; missing variables render as nothing.
    fn lookup(&self, name: &str) -> String {
        self.context
            .get(name)
            .map(Value::to_display_string)
            .unwrap_or_default()
    }

    fn is_truthy(&self, name: &str) -> bool {
        self.context.get(name).is_some_and(Value::is_truthy)
    }

    fn render_each(
        &self,
        variable: &str,
        item_name: Option<&str>,
        body: &[Node],
        empty: &[Node],
        out: &mut String,
    ) -> Result<()> {
        let items = match self.context.get(variable) {
            Some(Value::List(items)) => items,
            Some(Value::Null) | None => return self.render_into(empty, out),
            Some(_) => {
                return Err(TemplateError::Render(format!("'{variable}' is not a list")));
            }
        };

        if items.is_empty() {
            return self.render_into(empty, out);
        }

        let item_var = item_name.unwrap_or("this");
        for (index, item) in items.iter().enumerate() {
            let mut child = self.context.child();
            child.set(item_var, item.clone());
            child.set("@index", Value::Number(index as i64));
            child.set("@first", Value::Bool(index == 0));
            child.set("@last", Value::Bool(index + 1 == items.len()));

            // Object fields are also reachable without the item prefix.
            if let Value::Object(fields) = item {
                for (key, value) in fields {
                    child.set(key.clone(), value.clone());
                }
            }

            Renderer::new(&child).render_into(body, out)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Parser;
    use std::collections::HashMap;

    fn render(template: &str, context: &TemplateContext) -> Result<String> {
        let nodes = Parser::new(template).parse()?;
        Renderer::new(context).render(&nodes)
    }

    fn file(name: &str, is_dir: bool) -> Value {
        let mut map = HashMap::new();
        map.insert("name".to_string(), Value::from(name));
        map.insert("is_dir".to_string(), Value::from(is_dir));
        Value::Object(map)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_variable_is_escaped() {
        let mut context = TemplateContext::new();
        context.set("name", Value::from("<script>alert(1)</script>"));

        let result = render("<td>{{name}}</td>", &context).unwrap();
        assert_eq!(result, "<td>&lt;script&gt;alert(1)&lt;/script&gt;</td>");
    }

    #[test]
    fn test_raw_variable_is_not_escaped() {
        let mut context = TemplateContext::new();
        context.set("html", Value::from("<b>bold</b>"));

        assert_eq!(render("{{{html}}}", &context).unwrap(), "<b>bold</b>");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let context = TemplateContext::new();
        assert_eq!(render("[{{missing}}]", &context).unwrap(), "[]");
    }

    #[test]
    fn test_if_and_unless() {
        let mut context = TemplateContext::new();
        context.set("ok", Value::Bool(true));
        context.set("empty", Value::from(""));

        assert_eq!(render("{{#if ok}}Y{{else}}N{{/if}}", &context).unwrap(), "Y");
        assert_eq!(render("{{#if empty}}Y{{else}}N{{/if}}", &context).unwrap(), "N");
        assert_eq!(render("{{#unless empty}}shown{{/unless}}", &context).unwrap(), "shown");
        assert_eq!(render("{{#unless ok}}hidden{{/unless}}", &context).unwrap(), "");
    }

    #[test]
    fn test_each_with_alias_and_fields() {
        let mut context = TemplateContext::new();
        context.set("files", Value::List(vec![file("a.txt", false), file("docs", true)]));

        let template = "{{#each files as f}}{{@index}}:{{f.name}}{{#if is_dir}}/{{/if}};{{/each}}";
        assert_eq!(render(template, &context).unwrap(), "0:a.txt;1:docs/;");
    }

    #[test]
    fn test_each_first_and_last() {
        let mut context = TemplateContext::new();
        context.set("items", Value::from(vec!["a", "b", "c"]));

        let template = "{{#each items}}{{#unless @first}}, {{/unless}}{{this}}{{/each}}";
        assert_eq!(render(template, &context).unwrap(), "a, b, c");
    }

    #[test]
    fn test_each_else_on_empty_or_missing() {
        let mut context = TemplateContext::new();
        context.set("files", Value::List(vec![]));

        let template = "{{#each files}}x{{else}}No files yet{{/each}}";
        assert_eq!(render(template, &context).unwrap(), "No files yet");

        let template = "{{#each nothing}}x{{else}}none{{/each}}";
        assert_eq!(render(template, &context).unwrap(), "none");
    }

    #[test]
    fn test_each_on_non_list_is_error() {
        let mut context = TemplateContext::new();
        context.set("files", Value::from("oops"));

        let result = render("{{#each files}}x{{/each}}", &context);
        assert!(matches!(result, Err(TemplateError::Render(_))));
    }
}
