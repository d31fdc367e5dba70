//! Property-based tests (fuzzing) for the expression language, key layout,
//! and message envelope.
//!
//! Uses proptest to generate random/malformed inputs and verify nothing
//! panics, only returns clean errors.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::{json, Value};

use cachewire::expr::{EvalContext, Evaluator};
use cachewire::ExprError;
use cachewire::storage::memory::glob_match;
use cachewire::{Envelope, JsonCodec, KeyBuilder};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Arbitrary JSON values, nested a few levels deep
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,6}", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// Expression-shaped strings built from real tokens, so the parser gets
/// past the lexer often
fn expression_like_strategy() -> impl Strategy<Value = String> {
    let token = prop_oneof![
        Just("#id".to_string()),
        Just("#p0".to_string()),
        Just("#result".to_string()),
        Just("#payload".to_string()),
        Just(".name".to_string()),
        Just("?.".to_string()),
        Just("[0]".to_string()),
        Just("'x'".to_string()),
        Just("42".to_string()),
        Just("null".to_string()),
        Just("true".to_string()),
        Just(" + ".to_string()),
        Just(" == ".to_string()),
        Just(" and ".to_string()),
        Just(" or ".to_string()),
        Just("!".to_string()),
        Just(" ? ".to_string()),
        Just(" : ".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just(" / 0".to_string()),
    ];
    prop::collection::vec(token, 0..12).prop_map(|parts| parts.concat())
}

fn bound_context(id: Value, result: Value) -> EvalContext {
    EvalContext::bind(&["id".to_string()], &[id]).with_result(result)
}

// =============================================================================
// Expression Fuzz Tests
// =============================================================================

proptest! {
    /// Arbitrary text never panics the parser or evaluator
    #[test]
    fn fuzz_eval_random_text(source in ".{0,200}") {
        let evaluator = Evaluator::new();
        let ctx = bound_context(json!(1), Value::Null);
        let _ = evaluator.eval(&source, &ctx);
        let _ = evaluator.eval_bool(&source, &ctx, true);
        let _ = evaluator.eval_key(&source, &ctx);
    }

    /// Token soup against arbitrary bindings never panics
    #[test]
    fn fuzz_eval_token_soup(
        source in expression_like_strategy(),
        id in arbitrary_json_strategy(),
        result in arbitrary_json_strategy(),
    ) {
        let evaluator = Evaluator::new();
        let ctx = bound_context(id, result);
        let _ = evaluator.eval(&source, &ctx);
        let _ = evaluator.eval_string(&source, &ctx);
    }

    /// Nesting far past the parser's limit is a parse error, not a stack overflow
    #[test]
    fn fuzz_deep_nesting_rejected(
        depth in 200usize..20_000,
        (open, close) in prop::sample::select(vec![("(", ")"), ("!", ""), ("-", ""), ("#a[", "]")]),
    ) {
        let source = format!("{}1{}", open.repeat(depth), close.repeat(depth));
        let evaluator = Evaluator::new();
        let result = evaluator.eval(&source, &bound_context(json!(1), Value::Null));
        prop_assert!(matches!(result, Err(ExprError::Parse { .. })), "depth {} accepted", depth);
    }

    /// A compiled expression gives the same answer from the cache
    #[test]
    fn fuzz_eval_is_deterministic(source in expression_like_strategy(), id in arbitrary_json_strategy()) {
        let evaluator = Evaluator::new();
        let ctx = bound_context(id, json!({"name": "n"}));
        let first = evaluator.eval(&source, &ctx);
        let second = evaluator.eval(&source, &ctx);
        prop_assert_eq!(first, second);
    }

    /// `#p0` and the declared name always resolve to the same value
    #[test]
    fn fuzz_positional_alias_matches_name(id in arbitrary_json_strategy()) {
        let evaluator = Evaluator::new();
        let ctx = bound_context(id, Value::Null);
        prop_assert_eq!(evaluator.eval("#p0", &ctx), evaluator.eval("#id", &ctx));
    }

    /// String concatenation renders keys verbatim
    #[test]
    fn fuzz_concat_key(id in "[a-zA-Z0-9_-]{1,20}") {
        let evaluator = Evaluator::new();
        let ctx = bound_context(json!(id.clone()), Value::Null);
        let key = evaluator.eval_key("'u-' + #id", &ctx).unwrap();
        prop_assert_eq!(key, format!("u-{}", id));
    }

    /// Integer keys render without quotes or decimals
    #[test]
    fn fuzz_integer_key(id in any::<i64>()) {
        let evaluator = Evaluator::new();
        let ctx = bound_context(json!(id), Value::Null);
        prop_assert_eq!(evaluator.eval_key("#id", &ctx).unwrap(), id.to_string());
    }
}

// =============================================================================
// Key Layout Properties
// =============================================================================

proptest! {
    /// Flat keys are `<prefix>:<group>:<key>` and start with the group key
    #[test]
    fn fuzz_key_layout(prefix in "[a-z]{0,8}", group in "[a-z]{1,8}", key in "[a-z0-9:]{0,16}") {
        let keys = KeyBuilder::new(prefix.clone());
        let flat = keys.key(&group, &key);
        let group_key = keys.group_key(&group);

        prop_assert!(flat.starts_with(&group_key));
        prop_assert_eq!(&flat, &format!("{}:{}", group_key, key));
        if prefix.is_empty() {
            prop_assert_eq!(group_key, group);
        } else {
            prop_assert_eq!(group_key, format!("{}:{}", prefix, group));
        }
    }

    /// Every flat key of a group matches the group's scan pattern, and keys
    /// of a sibling group do not
    #[test]
    fn fuzz_group_pattern_matches_own_keys(
        prefix in "[a-z]{0,8}",
        group in "[a-z]{1,8}",
        key in "[a-z0-9]{0,16}",
    ) {
        let keys = KeyBuilder::new(prefix);
        let pattern = keys.group_pattern(&group);
        prop_assert!(glob_match(&pattern, &keys.key(&group, &key)));
        let sibling = format!("{}x", group);
        prop_assert!(!glob_match(&pattern, &keys.key(&sibling, &key)));
    }

    /// A physical topic has the same shape as a flat key of group `pub`
    #[test]
    fn fuzz_topic_layout(prefix in "[a-z]{0,8}", topic in "[a-z-]{1,16}") {
        let keys = KeyBuilder::new(prefix);
        let physical = keys.topic(&topic);
        let suffix = format!("pub:{}", topic);
        prop_assert!(physical.ends_with(&suffix), "{} does not end with {}", physical, suffix);
        prop_assert_eq!(physical, keys.key("pub", &topic));
    }

    /// Glob patterns without metacharacters match exactly themselves
    #[test]
    fn fuzz_glob_literal(text in "[a-z0-9:]{0,24}", other in "[a-z0-9:]{0,24}") {
        prop_assert!(glob_match(&text, &text));
        prop_assert_eq!(glob_match(&text, &other), text == other);
    }
}

// =============================================================================
// Envelope Fuzz Tests
// =============================================================================

proptest! {
    /// Decoding arbitrary text never panics
    #[test]
    fn fuzz_envelope_from_random_text(raw in ".{0,500}") {
        let _ = Envelope::decode(&JsonCodec, &raw);
    }

    /// Any JSON value decodes or fails cleanly; objects with unrelated
    /// fields decode to an empty envelope
    #[test]
    fn fuzz_envelope_from_arbitrary_json(value in arbitrary_json_strategy()) {
        let raw = serde_json::to_string(&value).unwrap();
        let decoded = Envelope::decode(&JsonCodec, &raw);
        if let Value::Object(map) = &value {
            if !["event", "source", "payload"].iter().any(|f| map.contains_key(*f)) {
                let env = decoded.unwrap();
                prop_assert_eq!(env.event, "");
                prop_assert_eq!(env.payload, Value::Null);
            }
        }
    }

    /// Payloads survive an encode/decode cycle
    #[test]
    fn fuzz_envelope_payload_preserved(event in "[A-Z_]{0,12}", payload in arbitrary_json_strategy()) {
        let envelope = Envelope::new(event.clone(), "svc", payload.clone());
        let raw = envelope.encode(&JsonCodec).unwrap();
        let decoded = Envelope::decode(&JsonCodec, &raw).unwrap();
        prop_assert_eq!(decoded.event, event);
        prop_assert_eq!(decoded.payload, payload);
    }
}
