//! Typed PVL values and the literalizer that produces them.
//!
//! The tokenizer in [`label`](crate::label) leaves every assignment value as a
//! raw string. This module converts those strings into typed [`Value`]s with an
//! ordered sequence of fallible parse attempts, first success wins:
//!
//! 1. nested blocks recurse (a block is never a quantity),
//! 2. the PEST grammar in `pvl.pest` (numbers, quoted strings, sequences,
//!    sets, radix integers, quantities),
//! 3. a quantity-statement fallback for strings containing `<` and `>` that
//!    the grammar rejected (mismatched brackets, junk between elements),
//! 4. the raw string unchanged.

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use regex::Regex;
use std::sync::OnceLock;

use crate::label::LabelBlock;

#[derive(PestParser)]
#[grammar = "pvl.pest"]
struct PvlValueParser;

/// A literalized PVL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Sequence(Vec<Value>),
    Quantity(Quantity),
    Block(LabelBlock),
}

/// A number (or NULL-ish word) with units, e.g. `1000 <BYTES>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Box<Value>,
    pub units: String,
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&LabelBlock> {
        match self {
            Value::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    /// Numeric view that unwraps quantity objects to their value, as label
    /// parameters like `OFFSET = 0.5 <DN>` are routinely nested this way.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Value::Quantity(q) => q.value.numeric(),
            other => other.as_f64(),
        }
    }

    /// True when the value was written as an integer literal (possibly inside
    /// a quantity). Used to decide whether a scale/offset operation forces a
    /// cast to float.
    pub fn is_integer_literal(&self) -> bool {
        match self {
            Value::Integer(_) => true,
            Value::Quantity(q) => q.value.is_integer_literal(),
            _ => false,
        }
    }
}

/// Interpret a raw PVL value string as a typed [`Value`]. Permissive: if no
/// parse strategy succeeds, returns the string unchanged as [`Value::Text`].
pub fn literalize(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Text(String::new());
    }
    match PvlValueParser::parse(Rule::value, trimmed) {
        Ok(mut pairs) => match pairs.next() {
            Some(pair) => build_value(pair),
            None => Value::Text(trimmed.to_string()),
        },
        Err(_) => {
            if trimmed.contains('<') && trimmed.contains('>') {
                if let Some(v) = parse_quantity_statement(trimmed) {
                    return v;
                }
            }
            Value::Text(trimmed.to_string())
        }
    }
}

/// Literalize every value in a block, recursing into nested blocks. Values
/// that are already blocks are never reinterpreted as scalars.
pub fn literalize_block(block: &LabelBlock) -> LabelBlock {
    let mut out = LabelBlock::new();
    for (key, value) in block.iter() {
        let literal = match value {
            Value::Block(inner) => Value::Block(literalize_block(inner)),
            Value::Text(raw) => literalize(raw),
            other => other.clone(),
        };
        out.add(key.clone(), literal);
    }
    out
}

fn build_value(pair: Pair<Rule>) -> Value {
    match pair.as_rule() {
        Rule::sequence | Rule::set => {
            let items: Vec<Value> = pair.into_inner().map(build_value).collect();
            Value::Sequence(items)
        }
        Rule::quantity => build_quantity(pair),
        Rule::radix => {
            parse_radix(pair.as_str()).unwrap_or_else(|| Value::Text(pair.as_str().to_string()))
        }
        Rule::real => match pair.as_str().parse::<f64>() {
            Ok(f) => Value::Real(f),
            Err(_) => Value::Text(pair.as_str().to_string()),
        },
        Rule::integer => match pair.as_str().parse::<i64>() {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Text(pair.as_str().to_string()),
        },
        Rule::quoted => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Value::Text(collapse_whitespace(inner))
        }
        Rule::null_word => Value::Text(pair.as_str().to_string()),
        Rule::bare => Value::Text(pair.as_str().trim().to_string()),
        _ => Value::Text(pair.as_str().trim().to_string()),
    }
}

fn build_quantity(pair: Pair<Rule>) -> Value {
    let mut value = Value::Text(String::new());
    let mut units = String::new();
    for inner in pair.into_inner() {
        if inner.as_rule() == Rule::units {
            units = inner
                .into_inner()
                .next()
                .map(|p| p.as_str().trim().to_string())
                .unwrap_or_default();
        } else {
            value = build_value(inner);
        }
    }
    Value::Quantity(Quantity {
        value: Box::new(value),
        units,
    })
}

/// Parse a PVL `base#digits#` non-base-10 integer.
fn parse_radix(text: &str) -> Option<Value> {
    let body = text.strip_suffix('#')?;
    let (base, digits) = body.split_once('#')?;
    let base: u32 = base.parse().ok()?;
    if !(2..=36).contains(&base) {
        return None;
    }
    i64::from_str_radix(digits, base).ok().map(Value::Integer)
}

fn quantity_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"((\d|\.|-)+([eE]-?\d+)?)|NULL|UNK|N/A").unwrap())
}

fn quantity_units_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(.*?)>").unwrap())
}

/// Fallback parse for statements including quantities that the grammar
/// rejected. Also handles mixed tuples like `("A5.DAT", 1000 <BYTES>)`.
/// Single-element results unwrap; anything unsalvageable stays a string.
fn parse_quantity_statement(statement: &str) -> Option<Value> {
    let stripped = statement.trim_matches(|c| c == '(' || c == ')');
    let mut out = Vec::new();
    for obj in stripped.split(',') {
        let obj = obj.trim();
        if obj.contains('<') && obj.contains('>') {
            match parse_quantity_object(obj) {
                Some(q) => out.push(q),
                None => out.push(Value::Text(obj.to_string())),
            }
        } else {
            out.push(literalize(obj));
        }
    }
    match out.len() {
        0 => None,
        1 => Some(out.remove(0)),
        _ => Some(Value::Sequence(out)),
    }
}

fn parse_quantity_object(obj: &str) -> Option<Value> {
    let value = quantity_value_re().find(obj)?;
    let units = quantity_units_re().captures(obj)?;
    Some(Value::Quantity(Quantity {
        value: Box::new(literalize(value.as_str())),
        units: units.get(1)?.as_str().trim().to_string(),
    }))
}

/// Multi-line quoted strings arrive with their line breaks already joined by
/// spaces; collapse any remaining runs for predictable comparisons.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space && !out.is_empty() {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out.trim_end().to_string()
}
