//! PVL label tokenizer and block parser.
//!
//! PDS3 labels are PVL-texts: `PARAMETER = VALUE` statements, possibly spread
//! over several lines, grouped into OBJECT/GROUP aggregations. Real labels
//! are frequently malformed, so parsing is line-based and permissive rather
//! than grammar-driven: a line starts a statement if it contains `=` and its
//! first ten characters contain no lowercase letters. That heuristic survives
//! `=` inside freeform text blocks, which strict PVL grammars do not.

use regex::bytes::Regex as BytesRegex;
use regex::Regex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::stream;
use crate::value::{literalize_block, Value};

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("no PVL text found in {0}")]
    NoLabel(String),
}

/// Heuristic cap on label size. Not a real rule, just generous.
pub const DEFAULT_PVL_LIMIT: usize = 1000 * 1024;

const BLOCK_INITIALS: [&str; 4] = ["OBJECT", "GROUP", "BEGIN_OBJECT", "BEGIN_GROUP"];

/// Pointer names that legitimately repeat and should not be deduplicated.
const REPEATABLE_POINTERS: [&str; 3] = ["^STRUCTURE", "^DESCRIPTION", "^PDS_OBJECT"];

/// An ordered multimap of label parameters. PDS3 technically forbids
/// duplicate keys at one level but real products have them, so lookups come
/// in `first` and `all` flavors. Immutable once parsed; corrections are
/// applied functionally with [`LabelBlock::with_patches`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelBlock {
    entries: Vec<(String, Value)>,
}

impl LabelBlock {
    pub fn new() -> LabelBlock {
        LabelBlock::default()
    }

    pub fn add(&mut self, key: String, value: Value) {
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// First value for `key` at this level.
    pub fn first(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Every value for `key` at this level, in document order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Value> {
        self.entries.iter().filter(move |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Breadth-first search for `key` through nested blocks: the shallowest
    /// occurrence wins, matching how label-wide parameters like RECORD_BYTES
    /// are conventionally looked up.
    pub fn find(&self, key: &str) -> Option<&Value> {
        let mut queue: VecDeque<&LabelBlock> = VecDeque::new();
        queue.push_back(self);
        while let Some(block) = queue.pop_front() {
            if let Some(v) = block.first(key) {
                return Some(v);
            }
            for (_, v) in block.iter() {
                if let Value::Block(inner) = v {
                    queue.push_back(inner);
                }
            }
        }
        None
    }

    pub fn block(&self, key: &str) -> Option<&LabelBlock> {
        self.first(key).and_then(Value::as_block)
    }

    pub fn find_block(&self, key: &str) -> Option<&LabelBlock> {
        self.find(key).and_then(Value::as_block)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.first(key).and_then(int_of)
    }

    pub fn find_int(&self, key: &str) -> Option<i64> {
        self.find(key).and_then(int_of)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.first(key).and_then(Value::numeric)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.first(key).and_then(Value::as_str)
    }

    pub fn find_str(&self, key: &str) -> Option<&str> {
        self.find(key).and_then(Value::as_str)
    }

    /// Copy of this block with each patch applied at the top level: an
    /// existing key has its first occurrence replaced, a new key is appended.
    pub fn with_patches(&self, patches: &[LabelPatch]) -> LabelBlock {
        let mut out = self.clone();
        for patch in patches {
            match out.entries.iter_mut().find(|(k, _)| *k == patch.key) {
                Some(entry) => entry.1 = patch.value.clone(),
                None => out.entries.push((patch.key.clone(), patch.value.clone())),
            }
        }
        out
    }
}

/// A functional correction to a parsed label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPatch {
    pub key: String,
    pub value: Value,
}

impl LabelPatch {
    pub fn set(key: &str, value: Value) -> LabelPatch {
        LabelPatch {
            key: key.to_string(),
            value,
        }
    }
}

fn int_of(v: &Value) -> Option<i64> {
    match v {
        Value::Quantity(q) => int_of(&q.value),
        other => other.as_int(),
    }
}

/// A fully parsed label: the literalized root block plus a flattened list of
/// every parameter name at every level, in document order.
#[derive(Debug, Clone)]
pub struct ParsedLabel {
    pub block: LabelBlock,
    pub params: Vec<String>,
}

impl ParsedLabel {
    pub fn contains_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

/// Cut a file head down to just its PVL text, looking for a conventional
/// label ending (an END line or a run of NUL bytes). If none is found the
/// whole head is returned and the block parser sorts it out.
pub fn trim_label(head: &[u8]) -> &[u8] {
    static ENDINGS: OnceLock<Vec<BytesRegex>> = OnceLock::new();
    let endings = ENDINGS.get_or_init(|| {
        vec![
            BytesRegex::new(r"\nEND {0,2}(\r| {8})").unwrap(),
            BytesRegex::new(r"\x00{3}").unwrap(),
        ]
    });
    for ending in endings {
        if let Some(m) = ending.find(head) {
            return &head[..m.end()];
        }
    }
    head
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // comments run to end of line (or to the start of the next comment)
    RE.get_or_init(|| Regex::new(r"/\*.*?(\r|\n|/\*)").unwrap())
}

fn terminal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^END(_OBJECT|$)").unwrap())
}

fn block_terminal(line: &str) -> Option<&str> {
    terminal_re().find(line).map(|m| m.as_str())
}

/// Lines that begin assignment statements. Labels never seem to put two
/// assignments on one line, but they do put `=` inside freeform text, so an
/// all-uppercase lead-in is required.
fn is_assignment_line(line: &str) -> bool {
    if !line.contains('=') {
        return block_terminal(line).is_some();
    }
    let start: String = line.chars().take(10).collect();
    start == start.to_uppercase()
}

/// Chunk trimmed label lines into `(parameter, value)` statements. Statements
/// whose head holds more than one `=` are dropped: they are invariably
/// freeform text that slipped past the heuristic, never semantic parameters.
fn chunk_statements(lines: &[&str]) -> Vec<(String, String)> {
    let mut groups: Vec<Vec<&str>> = Vec::new();
    for &line in lines {
        if is_assignment_line(line) || groups.is_empty() {
            groups.push(vec![line]);
        } else if let Some(last) = groups.last_mut() {
            last.push(line);
        }
    }
    let mut statements = Vec::new();
    for group in groups {
        let head = group[0];
        if let Some(terminal) = block_terminal(head) {
            statements.push((terminal.to_string(), String::new()));
            continue;
        }
        if head.matches('=').count() != 1 {
            continue;
        }
        let Some((parameter, value_head)) = head.split_once('=') else {
            continue;
        };
        let mut value = value_head.trim().to_string();
        for continuation in &group[1..] {
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(continuation.trim());
        }
        statements.push((parameter.trim().to_string(), value));
    }
    statements
}

struct BlockParser {
    names: Vec<String>,
    stack: Vec<LabelBlock>,
    params: Vec<String>,
}

impl BlockParser {
    fn new() -> BlockParser {
        BlockParser {
            names: Vec::new(),
            stack: vec![LabelBlock::new()],
            params: Vec::new(),
        }
    }

    fn add_statement(&mut self, parameter: String, value: Value) {
        self.params.push(parameter.clone());
        if let Some(top) = self.stack.last_mut() {
            top.add(parameter, value);
        }
    }

    fn parse(mut self, statements: Vec<(String, String)>) -> (LabelBlock, Vec<String>) {
        for (parameter, value) in statements {
            if BLOCK_INITIALS.contains(&parameter.as_str()) {
                self.names.push(value);
                self.stack.push(LabelBlock::new());
            } else if parameter.starts_with("END") {
                // no aggregation name verification; stray ends at top level
                // (including the label-terminating END) are ignored
                if !self.names.is_empty() {
                    if let (Some(name), Some(block)) = (self.names.pop(), self.stack.pop()) {
                        self.add_statement(name, Value::Block(block));
                    }
                }
            } else {
                self.add_statement(parameter, Value::Text(value));
            }
        }
        if self.stack.len() > 1 {
            log::warn!(
                "leftover aggregations after parsing; the label may be \
                 malformatted or truncated by the size limit"
            );
        }
        (self.stack.swap_remove(0), self.params)
    }
}

/// Parse a PVL-text into a literalized [`ParsedLabel`].
pub fn parse_pvl(text: &str, deduplicate_pointers: bool) -> ParsedLabel {
    let uncommented = comment_re().replace_all(text, "\n");
    let lines: Vec<&str> = uncommented
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let statements = chunk_statements(&lines);
    let (block, params) = BlockParser::new().parse(statements);
    let (block, params) = if deduplicate_pointers {
        index_duplicate_pointers(block, params)
    } else {
        (block, params)
    };
    ParsedLabel {
        block: literalize_block(&block),
        params,
    }
}

/// Read, trim, and parse the label at the head of `path` (transparently
/// decompressing). `max_size` bounds how much of the file is considered.
pub fn read_label(path: &Path, max_size: usize) -> Result<ParsedLabel, LabelError> {
    let head = stream::head_file(path, max_size)?;
    let text = String::from_utf8_lossy(trim_label(&head));
    if text.trim().is_empty() {
        return Err(LabelError::NoLabel(path.display().to_string()));
    }
    Ok(parse_pvl(&text, true))
}

/// All pointer parameters (keys starting with `^`) at any level, in document
/// order. These typically name physical data locations and usually correspond
/// to object definitions elsewhere in the label.
pub fn get_pointers(block: &LabelBlock) -> Vec<String> {
    let mut out = Vec::new();
    collect_pointers(block, &mut out);
    out
}

fn collect_pointers(block: &LabelBlock, out: &mut Vec<String>) {
    for (key, value) in block.iter() {
        if key.starts_with('^') {
            out.push(key.clone());
        }
        if let Value::Block(inner) = value {
            collect_pointers(inner, out);
        }
    }
}

pub fn pointerize(name: &str) -> String {
    if name.starts_with('^') {
        name.to_string()
    } else {
        format!("^{name}")
    }
}

pub fn depointerize(name: &str) -> &str {
    name.strip_prefix('^').unwrap_or(name)
}

/// Rename duplicated pointers (and their depointerized object blocks) with
/// ascending integer suffixes so same-named data objects stay distinct.
/// Technically duplicate object names are illegal, but they occur in the
/// wild. Fails only if pointers and definitions appear in different orders,
/// which has not been observed.
fn index_duplicate_pointers(
    block: LabelBlock,
    params: Vec<String>,
) -> (LabelBlock, Vec<String>) {
    let pointers = get_pointers(&block);
    let mut seen: Vec<(&String, usize)> = Vec::new();
    for p in &pointers {
        match seen.iter_mut().find(|(name, _)| *name == p) {
            Some((_, n)) => *n += 1,
            None => seen.push((p, 1)),
        }
    }
    let duplicated: Vec<String> = seen
        .iter()
        .filter(|(name, n)| *n > 1 && !REPEATABLE_POINTERS.contains(&name.as_str()))
        .map(|(name, _)| (*name).clone())
        .collect();
    if duplicated.is_empty() {
        return (block, params);
    }
    let mut block = block;
    for pointer in &duplicated {
        log::warn!("duplicated {pointer}, indexing entries with ascending integers");
        let mut counter = 0usize;
        block = rename_keys(&block, pointer, &mut counter);
        let mut counter = 0usize;
        block = rename_keys(&block, depointerize(pointer), &mut counter);
    }
    let mut params = Vec::new();
    flatten_keys(&block, &mut params);
    (block, params)
}

fn rename_keys(block: &LabelBlock, target: &str, counter: &mut usize) -> LabelBlock {
    let mut out = LabelBlock::new();
    for (key, value) in block.iter() {
        let value = match value {
            Value::Block(inner) => Value::Block(rename_keys(inner, target, counter)),
            other => other.clone(),
        };
        let key = if key == target {
            let indexed = format!("{key}_{}", *counter);
            *counter += 1;
            indexed
        } else {
            key.clone()
        };
        out.add(key, value);
    }
    out
}

fn flatten_keys(block: &LabelBlock, out: &mut Vec<String>) {
    for (key, value) in block.iter() {
        if let Value::Block(inner) = value {
            flatten_keys(inner, out);
        }
        out.push(key.clone());
    }
}
