// src/core/interpolator.rs

//! # Template Interpolator
//!
//! A deliberately small tokenizer for `{{variable}}` placeholders. There are no
//! loops, conditionals or filters: a template is literal text interleaved with
//! variable references, and nothing more.

use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One piece of a tokenized template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateToken<'a> {
    Literal(&'a str),
    Variable(&'a str),
}

/// Splits a template into literal and variable tokens.
///
/// An opening `{{` without a matching `}}` is kept as literal text. Variable
/// names are trimmed, so `{{ name }}` and `{{name}}` are the same reference.
pub fn tokenize(template: &str) -> Vec<TemplateToken<'_>> {
    let mut tokens = Vec::new();
    let mut rest = template;

    while let Some((literal, after_open)) = rest.split_once(OPEN) {
        let Some((name, after_close)) = after_open.split_once(CLOSE) else {
            break;
        };

        if !literal.is_empty() {
            tokens.push(TemplateToken::Literal(literal));
        }
        tokens.push(TemplateToken::Variable(name.trim()));
        rest = after_close;
    }

    if !rest.is_empty() {
        tokens.push(TemplateToken::Literal(rest));
    }
    tokens
}

/// Renders a template against a set of variables.
///
/// Undefined variables render as an empty string.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    for token in tokenize(template) {
        match token {
            TemplateToken::Literal(text) => output.push_str(text),
            TemplateToken::Variable(name) => {
                if let Some(value) = variables.get(name) {
                    output.push_str(value);
                } else {
                    log::trace!("Template variable '{}' is undefined; substituting ''.", name);
                }
            }
        }
    }
    output
}

/// Returns the names of all variables referenced by a template.
pub fn referenced_variables(template: &str) -> Vec<&str> {
    tokenize(template)
        .into_iter()
        .filter_map(|token| match token {
            TemplateToken::Variable(name) => Some(name),
            TemplateToken::Literal(_) => None,
        })
        .collect()
}
