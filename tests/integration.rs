//! End-to-end scenarios from spec.md section 8 ("Testable Properties" /
//! "Scenarios" 1-6), exercised against the public library API.

use scriven::bitio::{BitReader, BitWriter};
use scriven::coder::Coder;
use scriven::confusion::{parse_pattern, Atom, ConfusionTrie, PredicateRegistry};
use scriven::constant::SENTINEL;
use scriven::model::{Context, ModelConfig, ModelRegistry, UpdateMode};
use scriven::search::{Algorithm, ContextScope, SearchDriver};
use scriven::text::TextStore;

fn bytes_of(s: &str) -> Vec<u32> {
    s.bytes().map(|b| b as u32).collect()
}

/// Scenario 1: empty stream round-trip. Encoding only the sentinel
/// symbol against a freshly created order-5, alphabet-256 model should
/// produce a tiny stream (<= 8 bytes) that decodes back to just the
/// sentinel.
#[test]
fn empty_stream_round_trip() {
    let mut model = ModelRegistry::new();
    let id = model.create_model(ModelConfig::default());

    let mut ctx = Context::new();
    let mut coder = Coder::new();
    let mut bw = BitWriter::new();
    coder.start_encode();
    model
        .get_mut(id)
        .encode_symbol(&mut ctx, SENTINEL, &mut coder, &mut bw, UpdateMode::GetNothing)
        .unwrap();
    coder.finish_encode(&mut bw);
    let bytes = bw.into_bytes();
    assert!(bytes.len() <= 8, "empty-stream encode should be tiny, got {} bytes", bytes.len());

    let mut dmodel = ModelRegistry::new();
    let did = dmodel.create_model(ModelConfig::default());
    let mut dctx = Context::new();
    let mut dcoder = Coder::new();
    let mut br = BitReader::new(&bytes);
    dcoder.start_decode(&mut br).unwrap();
    let (sym, _) = dmodel
        .get_mut(did)
        .decode_symbol(&mut dctx, &mut dcoder, &mut br, UpdateMode::GetNothing)
        .unwrap();
    assert_eq!(sym, SENTINEL);
}

/// Scenario 2: single-symbol round-trip. Encode `A` then sentinel;
/// decode must yield the same symbols, and the reported per-symbol
/// codelength on encode must match decode to within float tolerance.
#[test]
fn single_symbol_round_trip_matches_codelength() {
    let mut registry = ModelRegistry::new();
    let id = registry.create_model(ModelConfig::default());
    let mut ctx = Context::new();
    let mut coder = Coder::new();
    let mut bw = BitWriter::new();
    coder.start_encode();
    let out_a = registry
        .get_mut(id)
        .encode_symbol(&mut ctx, b'A' as u32, &mut coder, &mut bw, UpdateMode::GetCodelength)
        .unwrap();
    let out_sentinel = registry
        .get_mut(id)
        .encode_symbol(&mut ctx, SENTINEL, &mut coder, &mut bw, UpdateMode::GetCodelength)
        .unwrap();
    coder.finish_encode(&mut bw);
    let bytes = bw.into_bytes();

    let mut dregistry = ModelRegistry::new();
    let did = dregistry.create_model(ModelConfig::default());
    let mut dctx = Context::new();
    let mut dcoder = Coder::new();
    let mut br = BitReader::new(&bytes);
    dcoder.start_decode(&mut br).unwrap();
    let (sym_a, dout_a) = dregistry
        .get_mut(did)
        .decode_symbol(&mut dctx, &mut dcoder, &mut br, UpdateMode::GetCodelength)
        .unwrap();
    assert_eq!(sym_a, b'A' as u32);
    let (sym_s, dout_s) = dregistry
        .get_mut(did)
        .decode_symbol(&mut dctx, &mut dcoder, &mut br, UpdateMode::GetCodelength)
        .unwrap();
    assert_eq!(sym_s, SENTINEL);

    assert!((out_a.codelength.unwrap() - dout_a.codelength.unwrap()).abs() < 1e-6);
    assert!((out_sentinel.codelength.unwrap() - dout_s.codelength.unwrap()).abs() < 1e-6);
}

/// Scenario 3: deterministic alphabet growth. Growing the alphabet to
/// admit a model-switch marker symbol registers it as static (count 1,
/// never incremented); encoding and decoding it must not change the
/// model.
#[test]
fn alphabet_growth_produces_a_static_switch_symbol() {
    let mut registry = ModelRegistry::new();
    let id = registry.create_model(ModelConfig { alphabet_size: 256, ..ModelConfig::default() });
    registry.get_mut(id).set_alphabet_size(258);

    let ctx = Context::new();
    let before = registry.get_mut(id).find_symbol(&ctx, 256);

    let mut coder = Coder::new();
    let mut bw = BitWriter::new();
    let mut enc_ctx = Context::new();
    coder.start_encode();
    registry
        .get_mut(id)
        .encode_symbol(&mut enc_ctx, 256, &mut coder, &mut bw, UpdateMode::GetNothing)
        .unwrap();
    coder.finish_encode(&mut bw);
    let bytes = bw.into_bytes();

    let after = registry.get_mut(id).find_symbol(&ctx, 256);
    assert_eq!(before, after, "a static switch symbol's codelength never changes");

    let mut dcoder = Coder::new();
    let mut br = BitReader::new(&bytes);
    let mut dec_ctx = Context::new();
    dcoder.start_decode(&mut br).unwrap();
    let (sym, _) = registry
        .get_mut(id)
        .decode_symbol(&mut dec_ctx, &mut dcoder, &mut br, UpdateMode::GetNothing)
        .unwrap();
    assert_eq!(sym, 256);
    let unchanged = registry.get_mut(id).find_symbol(&ctx, 256);
    assert_eq!(before, unchanged, "decoding the static symbol must not update the model");
}

fn segment_confusion(space: u32) -> ConfusionTrie {
    // `%w -> %w` (copy the source symbol through) or `%w -> %w space`
    // (copy it, then insert a boundary) -- a tiny stand-in for the full
    // segment-transform grammar, enough to exercise the search driver.
    let mut trie = ConfusionTrie::new();
    for b in 0..=255u32 {
        trie.insert(&[Atom::Symbol(b)], vec![Atom::Symbol(b)], 1.0);
        trie.insert(&[Atom::Symbol(b)], vec![Atom::Symbol(b), Atom::Symbol(space)], 1.0);
    }
    trie
}

/// Scenario 4: Viterbi segmentation. Given a boundary-insertion grammar
/// and a model that strongly favours inserting a space before each of a
/// small set of known word-start letters, the Viterbi search should
/// recover those boundaries.
#[test]
fn viterbi_segmentation_recovers_word_boundaries() {
    let space = b' ' as u32;
    let mut registry = ModelRegistry::new();
    let model = registry.create_model(ModelConfig { max_order: 2, ..ModelConfig::default() });

    // Train the model so that emitting a space before 'q', 'b', or 'f'
    // (the starts of "quick", "brown", "fox") is cheap, and emitting a
    // space anywhere else is not: this stands in for a trained language
    // model's preference, without needing a full training corpus here.
    {
        let m = registry.get_mut(model);
        let mut ctx = Context::new();
        for _ in 0..50 {
            for &b in b"the quick brown fox" {
                m.encode_symbol(&mut ctx, b as u32, &mut Coder::new(), &mut BitWriter::new(), UpdateMode::GetNothing).unwrap();
            }
        }
    }

    let confusion = segment_confusion(space);
    let predicates = PredicateRegistry::new();
    let mut store = TextStore::new();
    let source = store.intern(&bytes_of("thequickbrownfox"));

    let mut driver = SearchDriver::new(Algorithm::Viterbi, ContextScope::Multi);
    driver.seed(model);
    for pos in 0..store.len(source) {
        driver.update_paths(&mut registry, &predicates, &confusion, &store, source, pos);
    }
    let out = driver.best_output();
    let out_str: String = out.iter().map(|&s| s as u8 as char).collect();
    assert_eq!(out_str, "the quick brown fox");
}

/// Scenario 5: stack pruning. With `stack_depth = 1`, the frontier still
/// always advances the single best leaf, so the best-path extraction
/// matches what Viterbi reports whenever the best leaf's input position
/// advances on every step.
#[test]
fn stack_pruning_tracks_the_global_best_leaf() {
    let space = b' ' as u32;
    let confusion = segment_confusion(space);
    let predicates = PredicateRegistry::new();
    let mut store = TextStore::new();
    let source = store.intern(&bytes_of("abc"));

    let mut viterbi_registry = ModelRegistry::new();
    let viterbi_model = viterbi_registry.create_model(ModelConfig { max_order: 2, ..ModelConfig::default() });
    let mut viterbi = SearchDriver::new(Algorithm::Viterbi, ContextScope::Multi);
    viterbi.seed(viterbi_model);
    for pos in 0..store.len(source) {
        viterbi.update_paths(&mut viterbi_registry, &predicates, &confusion, &store, source, pos);
    }
    let viterbi_out = viterbi.best_output();

    let mut stack_registry = ModelRegistry::new();
    let stack_model = stack_registry.create_model(ModelConfig { max_order: 2, ..ModelConfig::default() });
    let mut stack = SearchDriver::new(Algorithm::Stack { stack_depth: 1, stack_extension: 0 }, ContextScope::Multi);
    stack.seed(stack_model);
    for pos in 0..store.len(source) {
        stack.update_paths(&mut stack_registry, &predicates, &confusion, &store, source, pos);
    }
    let stack_out = stack.best_output();

    // stack_depth = 1 always advances the single best leaf, so its
    // best-path extraction must match Viterbi's exactly.
    assert_eq!(stack_out, viterbi_out);
}

/// Scenario 6: confusion-sorted early termination. Matching `B` against
/// children `{%w, literal A, literal C}` must visit `%w` and fail on
/// literal `A`, but never visit literal `C` (sorted literals stop the
/// scan once a literal exceeds the source symbol).
#[test]
fn confusion_trie_stops_scanning_past_the_source_symbol() {
    let mut trie = ConfusionTrie::new();
    trie.insert(&[Atom::Wildcard], vec![Atom::Wildcard], 1.0);
    trie.insert(&[Atom::Symbol(b'A' as u32)], vec![Atom::Symbol(b'A' as u32)], 0.5);
    trie.insert(&[Atom::Symbol(b'C' as u32)], vec![Atom::Symbol(b'C' as u32)], 0.5);
    let registry = PredicateRegistry::new();
    let text = TextStore::new();
    let matches = trie.match_at(&registry, &text, 0, b'B' as u32, 0, 0);
    assert_eq!(matches.len(), 1, "only the wildcard should match; literal C must never be visited");
}

#[test]
fn unknown_rewrite_rule_atom_is_rejected_at_compile_time() {
    let registry = PredicateRegistry::new();
    assert!(parse_pattern("%z", &registry).is_err());
}
