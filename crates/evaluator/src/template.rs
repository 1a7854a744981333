//! Mustache-style templates.
//!
//! Supported: variables (`{{name}}`, `{{{name}}}`, `{{&name}}`), dotted names,
//! the implicit iterator `{{.}}`, sections, inverted sections, comments and
//! partials. Output is never HTML-escaped. Custom delimiters are not
//! supported.

use serde_json::{Map, Value};

use crate::EvalError;

const MAX_PARTIAL_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    Section {
        name: String,
        inverted: bool,
        children: Vec<Node>,
    },
    Partial(String),
}

/// Render `template` against `view`, resolving `{{> name}}` from `partials`.
///
/// # Errors
/// [`EvalError::Template`] for unclosed tags, unbalanced sections and
/// runaway partial recursion.
pub fn render(template: &str, view: &Value, partials: &Map<String, Value>) -> Result<String, EvalError> {
    let nodes = parse(template)?;
    let mut out = String::new();
    let mut stack = vec![view.clone()];
    render_nodes(&nodes, &mut stack, partials, 0, &mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse(template: &str) -> Result<Vec<Node>, EvalError> {
    // (section name, inverted, nodes collected so far)
    let mut open: Vec<(String, bool, Vec<Node>)> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            current.push(Node::Text(rest[..start].to_owned()));
        }
        let after = &rest[start + 2..];

        let (tag, consumed) = if let Some(inner) = after.strip_prefix('{') {
            let end = inner
                .find("}}}")
                .ok_or_else(|| EvalError::Template("unclosed '{{{' tag".into()))?;
            (format!("&{}", &inner[..end]), end + 4)
        } else {
            let end = after
                .find("}}")
                .ok_or_else(|| EvalError::Template("unclosed '{{' tag".into()))?;
            (after[..end].to_owned(), end + 2)
        };
        rest = &after[consumed..];

        let tag = tag.trim();
        let (sigil, name) = match tag.chars().next() {
            Some(c @ ('!' | '#' | '^' | '/' | '>' | '&' | '=')) => (Some(c), tag[1..].trim()),
            _ => (None, tag),
        };

        match sigil {
            Some('!') => {}
            Some('=') => {
                return Err(EvalError::Template("custom delimiters are not supported".into()))
            }
            Some(c @ ('#' | '^')) => {
                open.push((name.to_owned(), c == '^', std::mem::take(&mut current)));
            }
            Some('/') => {
                let (section, inverted, parent) = open
                    .pop()
                    .ok_or_else(|| EvalError::Template(format!("unexpected closing tag '{name}'")))?;
                if section != name {
                    return Err(EvalError::Template(format!(
                        "section '{section}' closed by '{name}'"
                    )));
                }
                let children = std::mem::replace(&mut current, parent);
                current.push(Node::Section {
                    name: section,
                    inverted,
                    children,
                });
            }
            Some('>') => current.push(Node::Partial(name.to_owned())),
            _ => {
                if name.is_empty() {
                    return Err(EvalError::Template("empty tag".into()));
                }
                current.push(Node::Var(name.to_owned()));
            }
        }
    }

    if let Some((section, _, _)) = open.last() {
        return Err(EvalError::Template(format!("unclosed section '{section}'")));
    }
    if !rest.is_empty() {
        current.push(Node::Text(rest.to_owned()));
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_nodes(
    nodes: &[Node],
    stack: &mut Vec<Value>,
    partials: &Map<String, Value>,
    depth: usize,
    out: &mut String,
) -> Result<(), EvalError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var(name) => match lookup(stack, name) {
                Value::Null => {}
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            },
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(stack, name);
                if *inverted {
                    if is_falsy(&value) {
                        render_nodes(children, stack, partials, depth, out)?;
                    }
                    continue;
                }
                match value {
                    Value::Array(items) => {
                        for item in items {
                            stack.push(item);
                            render_nodes(children, stack, partials, depth, out)?;
                            stack.pop();
                        }
                    }
                    value if is_falsy(&value) => {}
                    value => {
                        stack.push(value);
                        render_nodes(children, stack, partials, depth, out)?;
                        stack.pop();
                    }
                }
            }
            Node::Partial(name) => {
                let Some(source) = partials.get(name).and_then(Value::as_str) else {
                    continue;
                };
                if depth >= MAX_PARTIAL_DEPTH {
                    return Err(EvalError::Template(format!(
                        "partial '{name}' nested too deeply"
                    )));
                }
                let nodes = parse(source)?;
                render_nodes(&nodes, stack, partials, depth + 1, out)?;
            }
        }
    }
    Ok(())
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Resolve a (dotted) name against the context stack, innermost first.
fn lookup(stack: &[Value], name: &str) -> Value {
    if name == "." {
        return stack.last().cloned().unwrap_or(Value::Null);
    }
    let mut parts = name.split('.');
    let Some(first) = parts.next() else {
        return Value::Null;
    };
    let Some(mut value) = stack.iter().rev().find_map(|frame| frame.get(first)) else {
        return Value::Null;
    };
    for part in parts {
        match value.get(part) {
            Some(next) => value = next,
            None => return Value::Null,
        }
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_view(template: &str, view: Value) -> String {
        render(template, &view, &Map::new()).unwrap()
    }

    #[test]
    fn variables_are_not_escaped() {
        let view = json!({ "name": "<b>Jane</b>", "n": 3, "ok": true });
        assert_eq!(render_view("Hi {{name}}!", view.clone()), "Hi <b>Jane</b>!");
        assert_eq!(render_view("{{{name}}} {{& name}}", view.clone()), "<b>Jane</b> <b>Jane</b>");
        assert_eq!(render_view("{{n}} {{ok}} [{{missing}}]", view), "3 true []");
    }

    #[test]
    fn dotted_names_and_context_stack() {
        let view = json!({ "vars": { "amount": 10 }, "currency": "EUR", "items": [{ "q": 1 }, { "q": 2 }] });
        assert_eq!(render_view("{{vars.amount}}", view.clone()), "10");
        assert_eq!(
            render_view("{{#items}}{{q}} {{currency}};{{/items}}", view),
            "1 EUR;2 EUR;"
        );
    }

    #[test]
    fn sections() {
        let view = json!({ "list": ["a", "b"], "none": [], "flag": false, "obj": { "x": 1 } });
        assert_eq!(render_view("{{#list}}{{.}},{{/list}}", view.clone()), "a,b,");
        assert_eq!(render_view("{{#none}}x{{/none}}{{^none}}empty{{/none}}", view.clone()), "empty");
        assert_eq!(render_view("{{#flag}}yes{{/flag}}{{^flag}}no{{/flag}}", view.clone()), "no");
        assert_eq!(render_view("{{#obj}}{{x}}{{/obj}}", view), "1");
    }

    #[test]
    fn comments_and_partials() {
        let mut partials = Map::new();
        partials.insert("greet".into(), json!("Hello {{name}}"));
        let out = render("{{! hidden }}{{> greet}}!", &json!({ "name": "Bob" }), &partials).unwrap();
        assert_eq!(out, "Hello Bob!");

        partials.insert("loop".into(), json!("{{> loop}}"));
        assert!(render("{{> loop}}", &json!({}), &partials).is_err());
    }

    #[test]
    fn malformed_templates_are_errors() {
        for template in ["{{name", "{{#a}}x", "{{/a}}", "{{#a}}{{/b}}", "{{=<% %>=}}"] {
            assert!(
                matches!(render(template, &json!({}), &Map::new()), Err(EvalError::Template(_))),
                "{template} should fail"
            );
        }
    }
}
