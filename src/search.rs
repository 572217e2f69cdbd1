//! Search driver (spec section 4.7): steps the leaf frontier one source
//! position at a time, invoking the confusion trie, extending paths,
//! deduplicating via the position hash, and reporting the best path.

use crate::confusion::{Atom, ConfusionTrie, PredicateRegistry};
use crate::constant::SENTINEL;
use crate::hash_table::{AddResult, ModelStateHash, PositionHash, PositionKey};
use crate::model::{Context, ModelId, ModelRegistry, UpdateMode};
use crate::paths::{Frontier, FrontierMode, Leaf, LeafId, PathArena, PathNodeId};
use crate::symbol::Symbol;
use crate::text::{TextId, TextStore};

/// Per spec section 6's "Configuration surface": which search algorithm
/// drives the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Viterbi,
    Stack { stack_depth: u32, stack_extension: u32 },
}

/// `single`: all leaves for a model share one model-state-hash rolling
/// context. `multi`: each leaf keeps its own context exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextScope {
    Single,
    Multi,
}

pub struct SearchDriver {
    frontier: Frontier,
    paths: PathArena,
    position_hash: PositionHash,
    model_state: ModelStateHash,
    scope: ContextScope,
}

impl SearchDriver {
    pub fn new(algorithm: Algorithm, scope: ContextScope) -> SearchDriver {
        let mode = match algorithm {
            Algorithm::Viterbi => FrontierMode::Viterbi,
            Algorithm::Stack { stack_depth, stack_extension } => FrontierMode::Stack { stack_depth, stack_extension },
        };
        SearchDriver {
            frontier: Frontier::new(mode),
            paths: PathArena::new(),
            position_hash: PositionHash::new(),
            model_state: ModelStateHash::new(),
            scope,
        }
    }

    /// Seed one path with `(SENTINEL, model-marker, model)` (spec
    /// section 3's transform-run lifecycle).
    pub fn seed(&mut self, model: ModelId) -> LeafId {
        let sentinel_node = self.paths.append(self.paths.root(), SENTINEL, model);
        let marker_node = self.paths.append(sentinel_node, model, model);
        self.frontier.insert(Leaf {
            path_node: marker_node,
            input_pos: 0,
            model,
            context: Context::new(),
            codelength: 0.0,
        })
    }

    fn depth_of(paths: &PathArena, node: PathNodeId) -> u32 {
        paths.walk_to_root(node).len() as u32
    }

    /// Step the frontier by one source position (spec section 4.7).
    pub fn update_paths(
        &mut self,
        registry: &mut ModelRegistry,
        predicates: &PredicateRegistry,
        confusion: &ConfusionTrie,
        source_text: &TextStore,
        source_id: TextId,
        source_pos: usize,
    ) {
        if source_pos % 4096 == 0 {
            log::info!("search: source_pos={source_pos} frontier_len={}", self.frontier.len());
        }
        self.position_hash.reinit();
        match self.frontier.mode_is_viterbi() {
            true => self.step_viterbi(registry, predicates, confusion, source_text, source_id, source_pos),
            false => self.step_stack(registry, predicates, confusion, source_text, source_id, source_pos),
        }
    }

    fn step_viterbi(
        &mut self,
        registry: &mut ModelRegistry,
        predicates: &PredicateRegistry,
        confusion: &ConfusionTrie,
        source_text: &TextStore,
        source_id: TextId,
        source_pos: usize,
    ) {
        for leaf_id in self.frontier.snapshot() {
            self.try_extend(registry, predicates, confusion, source_text, source_id, source_pos, leaf_id);
            self.prune_leaf(leaf_id);
        }
    }

    fn step_stack(
        &mut self,
        registry: &mut ModelRegistry,
        predicates: &PredicateRegistry,
        confusion: &ConfusionTrie,
        source_text: &TextStore,
        source_id: TextId,
        source_pos: usize,
    ) {
        self.frontier.prune_stack_bounds(&self.paths, source_pos as u32, Self::depth_of);
        loop {
            let Some(head) = self.frontier.head() else { break };
            if self.frontier.get(head).input_pos as usize >= source_pos {
                break;
            }
            self.try_extend(registry, predicates, confusion, source_text, source_id, source_pos, head);
            self.prune_leaf(head);
        }
    }

    fn prune_leaf(&mut self, leaf_id: LeafId) {
        if self.frontier.contains(leaf_id) {
            let leaf = self.frontier.prune(leaf_id);
            self.paths.release(leaf.path_node);
        }
    }

    fn try_extend(
        &mut self,
        registry: &mut ModelRegistry,
        predicates: &PredicateRegistry,
        confusion: &ConfusionTrie,
        source_text: &TextStore,
        source_id: TextId,
        source_pos: usize,
        leaf_id: LeafId,
    ) {
        let (model, input_pos) = {
            let leaf = self.frontier.get(leaf_id);
            (leaf.model, leaf.input_pos as usize)
        };
        if input_pos >= source_text.len(source_id) {
            return;
        }
        let source_symbol = source_text.get(source_id, input_pos);
        let previous_symbol = if input_pos == 0 { SENTINEL } else { source_text.get(source_id, input_pos - 1) };
        let matches = confusion.match_at(predicates, source_text, input_pos, source_symbol, previous_symbol, model);
        log::trace!("confusion match at pos={input_pos} model={model} candidates={}", matches.len());
        for candidate in matches {
            self.extend_path(registry, leaf_id, input_pos, &candidate.output, candidate.cost_bits, model);
        }
        let _ = source_pos;
    }

    /// Extend `leaf` by the atoms of one confusion-trie output pattern
    /// (spec section 4.7).
    fn extend_path(
        &mut self,
        registry: &mut ModelRegistry,
        leaf_id: LeafId,
        source_pos: usize,
        output: &[Atom],
        confusion_cl: f64,
        initial_model: ModelId,
    ) {
        let (path_node, mut context, base_cl, leaf_input_pos) = {
            let leaf = self.frontier.get(leaf_id);
            (leaf.path_node, leaf.context.clone(), leaf.codelength, leaf.input_pos)
        };
        let mut model = initial_model;
        let mut node = path_node;
        let mut total_cl = base_cl + confusion_cl;
        let mut consumed_atoms = 0u32;
        let mut i = 0;
        while i < output.len() {
            match &output[i] {
                Atom::Model(new_model) => {
                    let sentinel_cl = registry.get_mut(model).find_symbol(&context, SENTINEL);
                    total_cl += sentinel_cl;
                    model = *new_model;
                    context = Context::new();
                }
                Atom::Ghost => {
                    i += 1;
                    if let Some(Atom::Symbol(sym)) = output.get(i) {
                        node = self.paths.append(node, *sym, model);
                        consumed_atoms += 1;
                    }
                }
                Atom::Suspend => {
                    i += 1;
                    if let Some(Atom::Symbol(sym)) = output.get(i) {
                        let m = registry.get_mut(model);
                        let mut guard = m.suspend_update();
                        let cl = encode_through(&mut guard, &mut context, *sym);
                        drop(guard);
                        total_cl += cl;
                        node = self.paths.append(node, *sym, model);
                        consumed_atoms += 1;
                    }
                }
                Atom::Symbol(sym) => {
                    let m = registry.get_mut(model);
                    let cl = encode_through(m, &mut context, *sym);
                    total_cl += cl;
                    node = self.paths.append(node, *sym, model);
                    consumed_atoms += 1;
                }
                Atom::Sentinel => {
                    let m = registry.get_mut(model);
                    let cl = encode_through(m, &mut context, SENTINEL);
                    total_cl += cl;
                    node = self.paths.append(node, SENTINEL, model);
                    consumed_atoms += 1;
                }
                Atom::Wildcard | Atom::Boolean(_) | Atom::Function(_) | Atom::Range(_) | Atom::RangeFn(_) => {
                    // Structural-only at this stage; matching already
                    // consumed these on the source side.
                }
            }
            i += 1;
        }
        let _ = consumed_atoms;
        let new_input_pos = leaf_input_pos + 1; // one source symbol consumed per extension step
        let context_pos = context.position(registry.get_mut(model));
        let key = PositionKey { model, input_pos: new_input_pos, context_pos };
        let placeholder = LeafId::from_raw(u32::MAX);
        match self.position_hash.add(key, total_cl, placeholder) {
            AddResult::Rejected => {
                log::debug!("leaf at ({model}, {new_input_pos}, {}) dominated, dropped (cl={total_cl:.3})", key.context_pos);
                self.paths.release(node);
            }
            AddResult::Added => {
                let new_leaf = self.frontier.insert(Leaf {
                    path_node: node,
                    input_pos: new_input_pos,
                    model,
                    context,
                    codelength: total_cl,
                });
                log::debug!("leaf created at ({model}, {new_input_pos}, {}) cl={total_cl:.3}", key.context_pos);
                self.position_hash.set_leaf(key, new_leaf);
            }
            AddResult::Updated { old_leaf } => {
                log::debug!("leaf at ({model}, {new_input_pos}, {}) recombined, old cl beaten by {total_cl:.3}", key.context_pos);
                self.prune_leaf(old_leaf);
                let new_leaf = self.frontier.insert(Leaf {
                    path_node: node,
                    input_pos: new_input_pos,
                    model,
                    context,
                    codelength: total_cl,
                });
                self.position_hash.set_leaf(key, new_leaf);
            }
        }
        let _ = source_pos;
    }

    /// Scan leaves for the minimum codelength and walk its path node to
    /// the root, reconstructing output order. The first two entries
    /// (sentinel, model marker) are metadata and are dropped.
    pub fn best_output(&self) -> Vec<Symbol> {
        let Some(best) = self.frontier.best() else { return Vec::new() };
        let leaf = self.frontier.get(best);
        let mut symbols = self.paths.walk_to_root(leaf.path_node);
        if symbols.len() >= 2 {
            symbols.drain(0..2);
        }
        symbols
    }

    pub fn advance_model_state(&mut self, registry: &mut ModelRegistry, model: ModelId, pos: u64, symbol: Symbol) -> (f64, f64) {
        self.model_state.advance(model, registry.get_mut(model), pos, symbol)
    }

    pub fn scope(&self) -> ContextScope {
        self.scope
    }
}

/// Drive a model's context through `symbol` without touching a coder —
/// used by the search path, which scores candidates before any bits are
/// actually emitted. Returns the codelength.
fn encode_through(model: &mut crate::model::Model, context: &mut Context, symbol: Symbol) -> f64 {
    let cl = model.find_symbol(context, symbol);
    let mut coder = crate::coder::Coder::new();
    let mut bw = crate::bitio::BitWriter::new();
    coder.start_encode();
    let _ = model.encode_symbol(context, symbol, &mut coder, &mut bw, UpdateMode::GetNothing);
    cl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confusion::{parse_pattern, ConfusionTrie, PredicateRegistry};
    use crate::model::ModelConfig;

    fn build_text(store: &mut TextStore, s: &str) -> TextId {
        let symbols: Vec<Symbol> = s.bytes().map(|b| b as Symbol).collect();
        store.intern(&symbols)
    }

    #[test]
    fn identity_rewrite_reproduces_the_source() {
        let mut registry = ModelRegistry::new();
        let model = registry.create_model(ModelConfig::default());
        let predicates = PredicateRegistry::new();
        let mut confusion = ConfusionTrie::new();
        confusion.insert(&[Atom::Wildcard], vec![Atom::Wildcard], 0.0);
        // Wildcard output needs a concrete symbol; use a function-free
        // identity by special-casing %w -> %w via direct symbol copy at
        // match time is out of scope here, so seed with literal atoms
        // per observed byte instead.
        let mut store = TextStore::new();
        let text = build_text(&mut store, "ab");
        for b in [b'a' as Symbol, b'b' as Symbol] {
            confusion.insert(&[Atom::Symbol(b)], vec![Atom::Symbol(b)], 0.0);
        }
        let mut driver = SearchDriver::new(Algorithm::Viterbi, ContextScope::Multi);
        let leaf = driver.seed(model);
        assert!(driver.frontier.contains(leaf));
        for pos in 0..store.len(text) {
            driver.update_paths(&mut registry, &predicates, &confusion, &store, text, pos);
        }
        let out = driver.best_output();
        assert_eq!(out, vec![b'a' as Symbol, b'b' as Symbol]);
    }

    #[test]
    fn unknown_atom_rejected_at_compile_time() {
        let registry = PredicateRegistry::new();
        assert!(parse_pattern("%q", &registry).is_err());
    }
}
