//! Position and model-state hash tables (spec section 4.6): dedupe
//! leaves by `(model, context-position, input-position)` and cache
//! per-model rolling state at an input position, so single-context
//! transforms don't duplicate model work across leaves.
//!
//! Both tables are arena-backed with an explicit free list, reinitialised
//! between transform steps by splicing used slots back onto the free
//! list rather than dropping and reallocating (spec section 5).

use std::collections::HashMap;

use crate::bitio::BitWriter;
use crate::coder::Coder;
use crate::constant::SENTINEL;
use crate::model::{Context, Model, ModelId, UpdateMode};
use crate::paths::LeafId;
use crate::symbol::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub model: ModelId,
    pub input_pos: u32,
    pub context_pos: u32,
}

struct PositionSlot {
    total_cl: f64,
    leaf: LeafId,
}

/// Result of `PositionHash::add` (spec section 4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddResult {
    /// No entry existed for this key; the candidate is now registered.
    Added,
    /// An entry existed and the candidate strictly improved it. The
    /// caller must prune `old_leaf` from the frontier — this is the
    /// Viterbi recombine.
    Updated { old_leaf: LeafId },
    /// An entry existed and was at least as good; the candidate is
    /// discarded without allocation.
    Rejected,
}

#[derive(Default)]
pub struct PositionHash {
    map: HashMap<PositionKey, u32>,
    slots: Vec<Option<PositionSlot>>,
    used: Vec<u32>,
    free: Vec<u32>,
}

impl PositionHash {
    pub fn new() -> PositionHash {
        PositionHash::default()
    }

    /// Reinitialise between transform steps: used slots are spliced onto
    /// the free list instead of freed, and the key map is cleared.
    pub fn reinit(&mut self) {
        for idx in self.used.drain(..) {
            self.slots[idx as usize] = None;
            self.free.push(idx);
        }
        self.map.clear();
    }

    pub fn add(&mut self, key: PositionKey, total_cl: f64, leaf: LeafId) -> AddResult {
        if let Some(&idx) = self.map.get(&key) {
            let slot = self.slots[idx as usize].as_mut().expect("registered slot is live");
            if slot.total_cl <= total_cl {
                return AddResult::Rejected;
            }
            let old_leaf = slot.leaf;
            slot.total_cl = total_cl;
            slot.leaf = leaf;
            return AddResult::Updated { old_leaf };
        }
        let idx = if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(PositionSlot { total_cl, leaf });
            idx
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Some(PositionSlot { total_cl, leaf }));
            idx
        };
        self.used.push(idx);
        self.map.insert(key, idx);
        AddResult::Added
    }

    /// Point an already-registered key at the leaf actually inserted
    /// into the frontier, without re-running the cost comparison (the
    /// caller already made that decision via `add`'s return value).
    pub fn set_leaf(&mut self, key: PositionKey, leaf: LeafId) {
        if let Some(&idx) = self.map.get(&key) {
            self.slots[idx as usize].as_mut().expect("registered slot is live").leaf = leaf;
        }
    }
}

struct ModelStateEntry {
    last_pos: Option<u64>,
    context: Context,
}

/// Per-model rolling context shared across all leaves using the same
/// model at the same input position (spec section 4.6). Advancing
/// requires strictly monotonic input positions; an out-of-order update
/// is a contract violation.
#[derive(Default)]
pub struct ModelStateHash {
    entries: HashMap<ModelId, ModelStateEntry>,
}

impl ModelStateHash {
    pub fn new() -> ModelStateHash {
        ModelStateHash::default()
    }

    pub fn reinit(&mut self) {
        self.entries.clear();
    }

    /// Advance the rolling context for `model` by `symbol` at `pos`,
    /// returning `(symbol_codelength, sentinel_codelength)` — the cost
    /// of the source symbol and of switching models at this position
    /// (spec section 4.6).
    pub fn advance(&mut self, model_id: ModelId, model: &mut Model, pos: u64, symbol: Symbol) -> (f64, f64) {
        let entry = self
            .entries
            .entry(model_id)
            .or_insert_with(|| ModelStateEntry { last_pos: None, context: Context::new() });
        if let Some(last) = entry.last_pos {
            assert_eq!(pos, last + 1, "model-state hash requires monotonic position advance");
        }
        entry.last_pos = Some(pos);
        let symbol_cl = model.find_symbol(&entry.context, symbol);
        let sentinel_cl = model.find_symbol(&entry.context, SENTINEL);
        let mut coder = Coder::new();
        let mut bw = BitWriter::new();
        coder.start_encode();
        let _ = model.encode_symbol(&mut entry.context, symbol, &mut coder, &mut bw, UpdateMode::GetNothing);
        (symbol_cl, sentinel_cl)
    }

    pub fn context(&self, model_id: ModelId) -> Option<&Context> {
        self.entries.get(&model_id).map(|e| &e.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, ModelRegistry};

    #[test]
    fn add_reports_added_then_rejects_worse_candidates() {
        let mut hash = PositionHash::new();
        let key = PositionKey { model: 0, input_pos: 1, context_pos: 2 };
        assert_eq!(hash.add(key, 10.0, LeafId::from_raw(1)), AddResult::Added);
        assert_eq!(hash.add(key, 12.0, LeafId::from_raw(2)), AddResult::Rejected);
    }

    #[test]
    fn add_recombines_on_strict_improvement() {
        let mut hash = PositionHash::new();
        let key = PositionKey { model: 0, input_pos: 1, context_pos: 2 };
        hash.add(key, 10.0, LeafId::from_raw(1));
        let result = hash.add(key, 5.0, LeafId::from_raw(2));
        assert_eq!(result, AddResult::Updated { old_leaf: LeafId::from_raw(1) });
    }

    #[test]
    fn reinit_splices_used_slots_onto_the_free_list() {
        let mut hash = PositionHash::new();
        let key = PositionKey { model: 0, input_pos: 1, context_pos: 2 };
        hash.add(key, 10.0, LeafId::from_raw(1));
        hash.reinit();
        assert_eq!(hash.add(key, 1.0, LeafId::from_raw(3)), AddResult::Added);
    }

    #[test]
    #[should_panic(expected = "monotonic")]
    fn out_of_order_advance_is_a_contract_violation() {
        let mut registry = ModelRegistry::new();
        let id = registry.create_model(ModelConfig::default());
        let mut hash = ModelStateHash::new();
        hash.advance(id, registry.get_mut(id), 5, 65);
        hash.advance(id, registry.get_mut(id), 7, 66);
    }
}
