//! Property-based tests for the relay state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::transition::TransitionError;
use super::*;
use crate::llm::{StreamChunk, ToolCallRequest};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tool_call() -> impl Strategy<Value = ToolCallRequest> {
    ("call_[a-z0-9]{6}", "[a-z_]{3,12}", "[A-Za-z ]{0,12}").prop_map(|(id, name, location)| {
        ToolCallRequest::new(id, name, json!({ "location": location }))
    })
}

fn arb_chunk() -> impl Strategy<Value = StreamChunk> {
    prop_oneof![
        6 => "[a-zA-Z ,.!?]{0,16}".prop_map(StreamChunk::Content),
        2 => proptest::collection::vec(arb_tool_call(), 1..3).prop_map(StreamChunk::ToolCalls),
        1 => Just(StreamChunk::Terminal),
    ]
}

fn arb_event() -> impl Strategy<Value = RelayEvent> {
    prop_oneof![
        8 => arb_chunk().prop_map(RelayEvent::Chunk),
        1 => "[a-z ]{1,20}".prop_map(|message| RelayEvent::ProviderFailed { message }),
        1 => Just(RelayEvent::ClientDisconnected),
        2 => Just(RelayEvent::Persisted),
        1 => "[a-z ]{1,20}".prop_map(|message| RelayEvent::PersistFailed { message }),
    ]
}

/// Run events through the machine, skipping rejected ones
fn drive(events: Vec<RelayEvent>) -> (RelayState, Vec<RelayEffect>) {
    let mut state = RelayState::Open;
    let mut effects = Vec::new();
    for event in events {
        if let Ok(result) = transition(&state, event) {
            state = result.new_state;
            effects.extend(result.effects);
        }
    }
    (state, effects)
}

fn emitted(effects: &[RelayEffect]) -> Vec<ClientEvent> {
    effects
        .iter()
        .filter_map(|e| match e {
            RelayEffect::Emit(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Content chunks then terminal: one content event per chunk, then done(concat)
    #[test]
    fn prop_content_relayed_in_order(fragments in proptest::collection::vec("[a-zA-Z ,.]{0,10}", 0..12)) {
        let mut events: Vec<RelayEvent> = fragments
            .iter()
            .map(|f| RelayEvent::Chunk(StreamChunk::Content(f.clone())))
            .collect();
        events.push(RelayEvent::Chunk(StreamChunk::Terminal));
        events.push(RelayEvent::Persisted);

        let (state, effects) = drive(events);
        prop_assert_eq!(state, RelayState::Closed);

        let mut expected: Vec<ClientEvent> = fragments
            .iter()
            .map(|f| ClientEvent::Content(f.clone()))
            .collect();
        expected.push(ClientEvent::Done(fragments.concat()));
        prop_assert_eq!(emitted(&effects), expected);

        let persists: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, RelayEffect::PersistTurn { .. }))
            .collect();
        prop_assert_eq!(persists.len(), 1);
        prop_assert_eq!(
            persists[0],
            &RelayEffect::PersistTurn { text: fragments.concat(), tool_calls: vec![] }
        );
    }

    // Any event sequence: at most one persist, at most one final event, nothing after it
    #[test]
    fn prop_single_persist_and_final_event(events in proptest::collection::vec(arb_event(), 0..30)) {
        let (_, effects) = drive(events);

        let persists = effects
            .iter()
            .filter(|e| matches!(e, RelayEffect::PersistTurn { .. }))
            .count();
        prop_assert!(persists <= 1);

        let client = emitted(&effects);
        let finals = client.iter().filter(|e| e.is_final()).count();
        prop_assert!(finals <= 1);
        if let Some(pos) = client.iter().position(ClientEvent::is_final) {
            prop_assert_eq!(pos, client.len() - 1, "event after final: {:?}", client);
        }
    }

    // done is only ever emitted after a persist effect
    #[test]
    fn prop_done_only_after_persist(events in proptest::collection::vec(arb_event(), 0..30)) {
        let (_, effects) = drive(events);
        let done = effects
            .iter()
            .position(|e| matches!(e, RelayEffect::Emit(ClientEvent::Done(_))));
        if let Some(done) = done {
            let persist = effects
                .iter()
                .position(|e| matches!(e, RelayEffect::PersistTurn { .. }));
            prop_assert!(persist.is_some_and(|p| p < done));
        }
    }

    // A provider failure before terminal means nothing is persisted
    #[test]
    fn prop_provider_failure_persists_nothing(
        chunks in proptest::collection::vec(
            "[a-z ]{0,8}".prop_map(|t| RelayEvent::Chunk(StreamChunk::Content(t))),
            0..10,
        ),
        message in "[a-z ]{1,20}",
    ) {
        let mut events = chunks;
        events.push(RelayEvent::ProviderFailed { message: message.clone() });
        events.push(RelayEvent::Chunk(StreamChunk::Terminal));
        events.push(RelayEvent::Persisted);

        let (state, effects) = drive(events);
        prop_assert_eq!(state, RelayState::Failed { message: message.clone() });
        let persisted = effects
            .iter()
            .any(|e| matches!(e, RelayEffect::PersistTurn { .. }));
        prop_assert!(!persisted, "persisted after provider failure: {:?}", effects);

        let client = emitted(&effects);
        let expected = ClientEvent::Error(message);
        prop_assert_eq!(client.last(), Some(&expected));
    }

    // Terminal states absorb every event
    #[test]
    fn prop_terminal_states_absorb(event in arb_event(), failed in any::<bool>()) {
        let state = if failed {
            RelayState::Failed { message: "x".to_string() }
        } else {
            RelayState::Closed
        };
        prop_assert!(matches!(
            transition(&state, event),
            Err(TransitionError::AlreadyTerminated(_))
        ));
    }

    // Tool calls are relayed as-is and recorded for persistence
    #[test]
    fn prop_tool_calls_recorded(batches in proptest::collection::vec(
        proptest::collection::vec(arb_tool_call(), 1..3),
        1..4,
    )) {
        let mut events: Vec<RelayEvent> = batches
            .iter()
            .map(|b| RelayEvent::Chunk(StreamChunk::ToolCalls(b.clone())))
            .collect();
        events.push(RelayEvent::Chunk(StreamChunk::Terminal));

        let (state, effects) = drive(events);
        prop_assert_eq!(state, RelayState::Closing { text: String::new() });

        let all: Vec<ToolCallRequest> = batches.concat();
        let relayed: Vec<ToolCallRequest> = emitted(&effects)
            .into_iter()
            .flat_map(|e| match e {
                ClientEvent::ToolCalls(calls) => calls,
                _ => vec![],
            })
            .collect();
        prop_assert_eq!(&relayed, &all);
        let expected = RelayEffect::PersistTurn { text: String::new(), tool_calls: all };
        prop_assert_eq!(effects.last(), Some(&expected));
    }
}
