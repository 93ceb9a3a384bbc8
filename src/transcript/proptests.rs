//! Property-based tests for the transcript operations.
//!
//! These verify the tail-trimming invariants hold across arbitrary inputs,
//! replies, and both wire formats.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_format() -> impl Strategy<Value = WireFormat> {
    prop_oneof![Just(WireFormat::Tuples), Just(WireFormat::Messages)]
}

fn arb_file() -> impl Strategy<Value = FileRef> {
    "[a-z]{1,8}".prop_map(|name| FileRef::new(format!("{name}.png")))
}

fn arb_input() -> impl Strategy<Value = TurnInput> {
    prop_oneof![
        "[a-zA-Z ]{1,16}".prop_map(TurnInput::Text),
        (
            proptest::option::of("[a-zA-Z ]{0,16}"),
            proptest::collection::vec(arb_file(), 0..3),
        )
            .prop_map(|(text, files)| TurnInput::multimodal(text, files)),
    ]
    .prop_filter("degenerate inputs are rejected before the ops", |input| {
        !input.is_empty()
    })
}

fn arb_reply() -> impl Strategy<Value = Option<Record>> {
    proptest::option::of(prop_oneof![
        "[a-zA-Z ]{1,16}".prop_map(Record::assistant),
        arb_file().prop_map(|file| Record::assistant(Content::File(file))),
    ])
}

fn arb_turns() -> impl Strategy<Value = Vec<(TurnInput, Option<Record>)>> {
    proptest::collection::vec((arb_input(), arb_reply()), 0..4)
}

fn build(format: WireFormat, turns: Vec<(TurnInput, Option<Record>)>) -> Transcript {
    turns
        .into_iter()
        .fold(Transcript::new(format), |transcript, (input, reply)| {
            transcript.append_turn(&input, reply)
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn undo_inverts_a_settled_turn(
        format in arb_format(),
        turns in arb_turns(),
        input in arb_input(),
        reply in arb_reply(),
    ) {
        let base = build(format, turns);
        let settled = base.clone().append_turn(&input, reply);
        let (restored, returned) = undo_last(settled, input.clone());
        prop_assert_eq!(restored, base);
        prop_assert_eq!(returned, input);
    }

    #[test]
    fn append_input_adds_entry_count_entries(
        format in arb_format(),
        turns in arb_turns(),
        input in arb_input(),
    ) {
        let base = build(format, turns);
        let before = base.len();
        let pending = base.append_input(&input);
        prop_assert_eq!(pending.len(), before + input.entry_count());
    }

    #[test]
    fn span_is_positive_and_formats_differ_by_text(input in arb_input()) {
        let tuples = turn_span(WireFormat::Tuples, &input);
        let messages = turn_span(WireFormat::Messages, &input);
        prop_assert!(tuples >= 1);
        prop_assert_eq!(messages, tuples + usize::from(input.has_text()));
    }

    #[test]
    fn wire_round_trip(format in arb_format(), turns in arb_turns()) {
        let transcript = build(format, turns);
        let json = serde_json::to_string(&transcript).unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(
            serde_json::to_value(&back).unwrap(),
            serde_json::to_value(&transcript).unwrap()
        );
        // An empty transcript loses its format tag (both serialize as []);
        // everything else round-trips exactly.
        if !transcript.is_empty() {
            prop_assert_eq!(back, transcript);
        }
    }

    #[test]
    fn undo_clamps_on_short_transcripts(
        format in arb_format(),
        input in arb_input(),
    ) {
        let short = Transcript::new(format).append_input(&TurnInput::from("x"));
        let before = short.len();
        let (restored, _) = undo_last(short, input);
        prop_assert!(restored.len() <= before);
    }
}
