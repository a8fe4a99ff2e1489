use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proofline_engine::{
    AnnotationCache, AnnotationSession, AnnotatorClient, CacheConfig, CheckOutcome,
    EditableSurface, Span, TextTree, extract, parse_check_response,
};
use serde_json::{Value, json};
use std::sync::Arc;

struct Recorded(Value);

#[async_trait]
impl AnnotatorClient for Recorded {
    async fn check(&self, _text: &str) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

fn pateint_response() -> Value {
    json!({
        "errors": [{
            "id": "e1",
            "kind": "spelling",
            "start": 4,
            "end": 11,
            "original": "pateint",
            "suggestions": ["patient"],
            "explanation": "Possible spelling mistake.",
            "confidence": 0.97
        }]
    })
}

fn new_session() -> AnnotationSession {
    AnnotationSession::new(AnnotationCache::shared(CacheConfig::default()))
}

fn marked_texts(tree: &TextTree) -> Vec<String> {
    tree.marker_nodes()
        .into_iter()
        .map(|marker| tree.text_content(marker))
        .collect()
}

/// Text leaf holding flat offset `at`, and the offset inside it
fn leaf_at(tree: &TextTree, at: usize) -> (proofline_engine::surface::NodeId, usize) {
    let flat = extract(tree);
    let entry = flat.map.lookup(at).expect("offset inside text");
    (entry.node, entry.node_offset)
}

#[tokio::test]
async fn misspelling_survives_typing_after_it() {
    let mut tree = TextTree::from_plain_text("The pateint has a headache.");
    let mut session = new_session();
    session.on_input(&mut tree);

    session
        .check_now(&mut tree, &Recorded(pateint_response()))
        .await
        .unwrap();
    assert_eq!(marked_texts(&tree), vec!["pateint"]);

    // User types "severe " before "headache"
    let (leaf, offset) = leaf_at(&tree, 18);
    assert!(tree.insert_text(leaf, offset, "severe "));
    let outcome = session.on_input(&mut tree);

    assert_eq!(outcome.change.start, 18);
    assert_eq!(outcome.change.new_substring, "severe ");
    assert_eq!(extract(&tree).text, "The pateint has a severe headache.");
    assert_eq!(session.annotations()[0].current_range, Span::new(4, 11));
    assert_eq!(marked_texts(&tree), vec!["pateint"]);
    insta::assert_snapshot!(
        tree.to_html(),
        @r#"<p>The <mark class="annotation" data-annotation-id="e1" data-kind="spelling" title="Possible spelling mistake. Suggestion: patient">pateint</mark> has a severe headache.</p>"#
    );
}

#[tokio::test]
async fn response_for_an_older_snapshot_is_repaired() {
    let mut tree = TextTree::from_plain_text("The pateint has a headache.");
    let mut session = new_session();
    session.on_input(&mut tree);

    let ticket = session.begin_check(&tree).unwrap();

    // The user keeps typing while the request is in flight
    let (leaf, offset) = leaf_at(&tree, 0);
    tree.insert_text(leaf, offset, "Sadly, ");
    session.on_input(&mut tree);

    let response = parse_check_response(&pateint_response(), ticket.text.chars().count()).unwrap();
    let outcome = session.complete_check(&mut tree, ticket, Ok(response));

    match outcome {
        CheckOutcome::Applied {
            repaired, dropped, ..
        } => assert_eq!((repaired, dropped), (1, 0)),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(session.annotations()[0].current_range, Span::new(11, 18));
    assert_eq!(session.annotations()[0].original_range, Span::new(4, 11));
    assert_eq!(marked_texts(&tree), vec!["pateint"]);
}

#[tokio::test]
async fn correcting_the_word_invalidates_the_annotation() {
    let mut tree = TextTree::from_plain_text("The pateint has a headache.");
    let mut session = new_session();
    session.on_input(&mut tree);
    session
        .check_now(&mut tree, &Recorded(pateint_response()))
        .await
        .unwrap();

    // Replace "ei" with "ie" inside the marked word
    let (leaf, offset) = leaf_at(&tree, 7);
    tree.delete_text(leaf, offset..offset + 2);
    tree.insert_text(leaf, offset, "ie");
    let outcome = session.on_input(&mut tree);

    assert!(outcome.repainted);
    assert!(session.annotations().is_empty());
    assert!(tree.marker_nodes().is_empty());
    assert_eq!(extract(&tree).text, "The patient has a headache.");
}

#[tokio::test]
async fn annotation_spanning_paragraphs_is_painted_per_leaf() {
    let mut tree = TextTree::from_plain_text("It was\nover there");
    let mut session = new_session();
    session.on_input(&mut tree);
    let client = Recorded(json!({
        "errors": [{
            "kind": "style",
            "start": 3,
            "end": 11,
            "original": "was\nover",
            "suggestions": ["was over"]
        }]
    }));

    session.check_now(&mut tree, &client).await.unwrap();

    assert_eq!(marked_texts(&tree), vec!["was", "over"]);
    assert_eq!(tree.root().map(|root| tree.children(root).len()), Some(2));
}

#[tokio::test]
async fn reported_range_one_past_the_word_is_tightened() {
    let mut tree = TextTree::from_plain_text("The pateint has a headache.");
    let mut session = new_session();
    session.on_input(&mut tree);
    let mut body = pateint_response();
    body["errors"][0]["end"] = json!(12);

    let outcome = session.check_now(&mut tree, &Recorded(body)).await.unwrap();

    assert!(matches!(outcome, CheckOutcome::Applied { repaired: 1, .. }));
    assert_eq!(session.annotations()[0].current_range, Span::new(4, 11));
    assert_eq!(marked_texts(&tree), vec!["pateint"]);
}

#[tokio::test]
async fn correcting_one_of_two_identical_misspellings_drops_only_that_one() {
    let mut tree = TextTree::from_plain_text("Teh cat. Teh dog.");
    let mut session = new_session();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    session.on_annotations_changed(move |set| {
        *sink.lock() = set.iter().map(|a| a.id.clone()).collect();
    });
    session.on_input(&mut tree);
    let client = Recorded(json!({
        "errors": [
            {"id": "a", "kind": "spelling", "start": 0, "end": 3, "original": "Teh", "suggestions": ["The"]},
            {"id": "b", "kind": "spelling", "start": 9, "end": 12, "original": "Teh", "suggestions": ["The"]}
        ]
    }));
    session.check_now(&mut tree, &client).await.unwrap();
    assert_eq!(marked_texts(&tree), vec!["Teh", "Teh"]);

    // Fix the first "Teh" in place
    let (leaf, offset) = leaf_at(&tree, 1);
    tree.delete_text(leaf, offset..offset + 2);
    tree.insert_text(leaf, offset, "he");
    let outcome = session.on_input(&mut tree);

    let tracked: Vec<(&str, Span)> = session
        .annotations()
        .iter()
        .map(|a| (a.id.as_str(), a.current_range))
        .collect();
    assert!(outcome.repainted);
    assert_eq!(tracked, vec![("b", Span::new(9, 12))]);
    assert_eq!(*reported.lock(), vec!["b".to_string()]);
    assert_eq!(marked_texts(&tree), vec!["Teh"]);
    assert_eq!(extract(&tree).text, "The cat. Teh dog.");
}

#[tokio::test]
async fn typing_at_the_end_of_a_marker_keeps_it_on_the_word() {
    let mut tree = TextTree::from_plain_text("Teh cat sat on the mat");
    let mut session = new_session();
    session.on_input(&mut tree);
    let client = Recorded(json!({
        "errors": [{"id": "e1", "kind": "spelling", "start": 0, "end": 3, "original": "Teh", "suggestions": ["The"]}]
    }));
    session.check_now(&mut tree, &client).await.unwrap();

    // The host appends to the leaf inside the marker, growing the marker
    let (leaf, offset) = leaf_at(&tree, 2);
    assert!(tree.insert_text(leaf, offset + 1, "xx"));
    assert_eq!(marked_texts(&tree), vec!["Tehxx"]);
    let outcome = session.on_input(&mut tree);

    assert!(outcome.repainted);
    assert_eq!(session.annotations()[0].current_range, Span::new(0, 3));
    assert_eq!(marked_texts(&tree), vec!["Teh"]);
    assert_eq!(extract(&tree).text, "Tehxx cat sat on the mat");
}
