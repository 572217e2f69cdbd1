//! Confusion trie (spec section 4.4): a compiled store of declarative
//! rewrite rules keyed by source-side context pattern, feeding candidate
//! output patterns priced in bits to the search driver.
//!
//! Children of a node are kept sorted so that non-literal atoms precede
//! literal atoms, and literal atoms appear in ascending symbol order —
//! this lets matching stop scanning the literal run as soon as it passes
//! the source symbol (spec section 4.4 and scenario 6).

use std::collections::HashMap;

use crate::model::ModelId;
use crate::symbol::Symbol;
use crate::text::TextStore;
use crate::error::RuleError;

pub type PredicateId = u32;

/// A boolean predicate over a bare symbol, registered by name at
/// rule-compile time (spec section 9 design note: "store the registry
/// index, not an opaque pointer").
pub type BooleanPredicate = fn(Symbol) -> bool;

/// A context-aware predicate, used by FUNCTION atoms.
pub type FunctionPredicate =
    fn(model: ModelId, source_symbol: Symbol, previous_symbol: Symbol, text: &TextStore, pos: usize) -> bool;

/// A function that generates a symbol set at match time, used by RANGE
/// atoms whose members aren't fixed at compile time.
pub type RangeGenerator = fn(model: ModelId, source_symbol: Symbol) -> Vec<Symbol>;

#[derive(Default)]
pub struct PredicateRegistry {
    booleans: Vec<(String, BooleanPredicate)>,
    functions: Vec<(String, FunctionPredicate)>,
    range_fns: Vec<(String, RangeGenerator)>,
}

impl PredicateRegistry {
    pub fn new() -> PredicateRegistry {
        PredicateRegistry::default()
    }

    pub fn register_boolean(&mut self, name: &str, f: BooleanPredicate) -> PredicateId {
        self.booleans.push((name.to_string(), f));
        (self.booleans.len() - 1) as PredicateId
    }

    pub fn register_function(&mut self, name: &str, f: FunctionPredicate) -> PredicateId {
        self.functions.push((name.to_string(), f));
        (self.functions.len() - 1) as PredicateId
    }

    pub fn register_range_fn(&mut self, name: &str, f: RangeGenerator) -> PredicateId {
        self.range_fns.push((name.to_string(), f));
        (self.range_fns.len() - 1) as PredicateId
    }

    fn boolean(&self, id: PredicateId) -> BooleanPredicate {
        self.booleans[id as usize].1
    }

    fn function(&self, id: PredicateId) -> FunctionPredicate {
        self.functions[id as usize].1
    }

    fn range_fn(&self, id: PredicateId) -> RangeGenerator {
        self.range_fns[id as usize].1
    }

    fn find_boolean(&self, name: &str) -> Option<PredicateId> {
        self.booleans.iter().position(|(n, _)| n == name).map(|i| i as PredicateId)
    }

    fn find_function(&self, name: &str) -> Option<PredicateId> {
        self.functions.iter().position(|(n, _)| n == name).map(|i| i as PredicateId)
    }

    fn find_range_fn(&self, name: &str) -> Option<PredicateId> {
        self.range_fns.iter().position(|(n, _)| n == name).map(|i| i as PredicateId)
    }
}

/// A pattern atom (spec section 4.4 / "Rewrite-rule grammar" section 6).
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Symbol(Symbol),
    Model(ModelId),
    Boolean(PredicateId),
    Function(PredicateId),
    Wildcard,
    Range(Vec<Symbol>),
    RangeFn(PredicateId),
    Sentinel,
    Ghost,
    Suspend,
}

impl Atom {
    /// Literal atoms sort by symbol value; all others are "non-literal"
    /// and precede every literal in a node's child list.
    fn literal_symbol(&self) -> Option<Symbol> {
        match self {
            Atom::Symbol(s) => Some(*s),
            _ => None,
        }
    }
}

/// A compiled rewrite: the output pattern and its prior cost in bits.
#[derive(Debug, Clone)]
pub struct ConfusionEntry {
    pub output: Vec<Atom>,
    pub cost_bits: f64,
}

struct Node {
    children: Vec<(Atom, Node)>,
    entries: Vec<ConfusionEntry>,
}

impl Node {
    fn new() -> Node {
        Node { children: Vec::new(), entries: Vec::new() }
    }

    /// Re-sort so non-literal atoms precede literals, and literals are
    /// ascending (spec section 4.4).
    fn resort(&mut self) {
        self.children.sort_by(|(a, _), (b, _)| {
            match (a.literal_symbol(), b.literal_symbol()) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(x), Some(y)) => x.cmp(&y),
            }
        });
    }

    fn child_mut(&mut self, atom: &Atom) -> &mut Node {
        if let Some(idx) = self.children.iter().position(|(a, _)| a == atom) {
            return &mut self.children[idx].1;
        }
        self.children.push((atom.clone(), Node::new()));
        self.resort();
        let idx = self.children.iter().position(|(a, _)| a == atom).unwrap();
        &mut self.children[idx].1
    }
}

/// One matched candidate: how many source atoms the match consumed
/// (always 1 for a single-symbol edge; tracked by the caller stepping
/// position by position) and the output pattern plus its prior cost.
#[derive(Debug, Clone)]
pub struct ConfusionMatch {
    pub output: Vec<Atom>,
    pub cost_bits: f64,
}

pub struct ConfusionTrie {
    root: Node,
}

impl Default for ConfusionTrie {
    fn default() -> ConfusionTrie {
        ConfusionTrie { root: Node::new() }
    }
}

impl ConfusionTrie {
    pub fn new() -> ConfusionTrie {
        ConfusionTrie::default()
    }

    pub fn insert(&mut self, source_pattern: &[Atom], output: Vec<Atom>, cost_bits: f64) {
        let mut node = &mut self.root;
        for atom in source_pattern {
            node = node.child_mut(atom);
        }
        node.entries.push(ConfusionEntry { output, cost_bits });
    }

    /// Match a single source position against the trie's top level,
    /// expanding RANGE atoms on the matched path into one candidate per
    /// set member (spec section 4.4).
    pub fn match_at(
        &self,
        registry: &PredicateRegistry,
        text: &TextStore,
        pos: usize,
        source_symbol: Symbol,
        previous_symbol: Symbol,
        model: ModelId,
    ) -> Vec<ConfusionMatch> {
        let mut out = Vec::new();
        self.match_node(&self.root, registry, text, pos, source_symbol, previous_symbol, model, &mut out);
        out
    }

    fn match_node(
        &self,
        node: &Node,
        registry: &PredicateRegistry,
        text: &TextStore,
        pos: usize,
        source_symbol: Symbol,
        previous_symbol: Symbol,
        model: ModelId,
        out: &mut Vec<ConfusionMatch>,
    ) {
        for (atom, child) in &node.children {
            let matched = match atom {
                Atom::Symbol(s) => {
                    if *s > source_symbol {
                        // Children are sorted ascending among literals, and
                        // literals come after every non-literal; once a
                        // literal exceeds the source symbol, every later
                        // literal does too — stop scanning (scenario 6).
                        break;
                    }
                    *s == source_symbol
                }
                Atom::Model(m) => *m == model,
                Atom::Boolean(id) => (registry.boolean(*id))(source_symbol),
                Atom::Function(id) => (registry.function(*id))(model, source_symbol, previous_symbol, text, pos),
                Atom::Wildcard => true,
                Atom::Range(set) => set.contains(&source_symbol),
                Atom::RangeFn(id) => (registry.range_fn(*id))(model, source_symbol).contains(&source_symbol),
                Atom::Sentinel | Atom::Ghost | Atom::Suspend => false,
            };
            if !matched {
                continue;
            }
            for entry in &child.entries {
                out.extend(self.expand_ranges(entry));
            }
            self.match_node(child, registry, text, pos, source_symbol, previous_symbol, model, out);
        }
    }

    /// A RANGE atom in an output pattern spawns one candidate rewrite per
    /// set member, each tried separately (spec section 4.4).
    fn expand_ranges(&self, entry: &ConfusionEntry) -> Vec<ConfusionMatch> {
        let range_at = entry.output.iter().position(|a| matches!(a, Atom::Range(set) if set.len() > 1));
        match range_at {
            None => vec![ConfusionMatch { output: entry.output.clone(), cost_bits: entry.cost_bits }],
            Some(idx) => {
                let members = match &entry.output[idx] {
                    Atom::Range(set) => set.clone(),
                    _ => unreachable!(),
                };
                members
                    .into_iter()
                    .map(|m| {
                        let mut output = entry.output.clone();
                        output[idx] = Atom::Symbol(m);
                        ConfusionMatch { output, cost_bits: entry.cost_bits }
                    })
                    .collect()
            }
        }
    }
}

/// Parse one atom from its textual grammar prefix (spec section 6):
/// `%s` symbol, `%m` model, `%b` boolean, `%f` function, `%w` wildcard,
/// `%[abc]` range, `%r` function-generated range, `%$` sentinel, `%_`
/// ghost, `%.` suspend, `%%` literal `%`.
pub fn parse_pattern(src: &str, registry: &PredicateRegistry) -> Result<Vec<Atom>, RuleError> {
    let mut atoms = Vec::new();
    let mut chars = src.split_whitespace().peekable();
    while let Some(tok) = chars.next() {
        atoms.push(parse_atom(tok, registry)?);
    }
    Ok(atoms)
}

fn parse_atom(tok: &str, registry: &PredicateRegistry) -> Result<Atom, RuleError> {
    if !tok.starts_with('%') {
        return Err(RuleError::Malformed(format!("atom '{tok}' missing '%' prefix")));
    }
    let rest = &tok[1..];
    if let Some(inner) = rest.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let symbols = inner
            .split(',')
            .map(|p| p.trim().parse::<Symbol>().map_err(|_| RuleError::Malformed(format!("bad range member '{p}'"))))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Atom::Range(symbols));
    }
    let (prefix, arg) = rest.split_at(rest.chars().next().map(|c| c.len_utf8()).unwrap_or(0));
    match prefix {
        "%" => Ok(Atom::Symbol('%' as Symbol)),
        "s" => arg.parse::<Symbol>().map(Atom::Symbol).map_err(|_| RuleError::Malformed(format!("bad symbol '{arg}'"))),
        "m" => arg.parse::<ModelId>().map(Atom::Model).map_err(|_| RuleError::Malformed(format!("bad model id '{arg}'"))),
        "b" => registry.find_boolean(arg).map(Atom::Boolean).ok_or_else(|| RuleError::UnknownPredicate(arg.to_string())),
        "f" => registry.find_function(arg).map(Atom::Function).ok_or_else(|| RuleError::UnknownPredicate(arg.to_string())),
        "w" => Ok(Atom::Wildcard),
        "r" => registry.find_range_fn(arg).map(Atom::RangeFn).ok_or_else(|| RuleError::UnknownPredicate(arg.to_string())),
        "$" => Ok(Atom::Sentinel),
        "_" => Ok(Atom::Ghost),
        "." => Ok(Atom::Suspend),
        other => Err(RuleError::UnknownAtom(other.to_string())),
    }
}
