//! End-to-end stream reconciliation
//!
//! Drives `StreamEngine` with scripted byte sources and checks the resulting
//! messages.

use std::collections::VecDeque;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use ragchat_core::{
    Channel, ChatStore, FinalizedStream, Sequence, SourceError, StreamEngine, StreamPhase,
    StreamSource, TokenOutcome, TokenRecord,
};

/// Replays a fixed list of chunks, then signals completion
struct ScriptedSource {
    chunks: VecDeque<Result<Vec<u8>, SourceError>>,
}

impl ScriptedSource {
    fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| Ok(c.as_ref().to_vec())).collect(),
        }
    }

    fn then_fail(mut self, message: &str) -> Self {
        self.chunks
            .push_back(Err(SourceError::Transport(message.to_string())));
        self
    }
}

#[async_trait]
impl StreamSource for ScriptedSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        match self.chunks.pop_front() {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

fn thinking_text(store: &ChatStore, done: &FinalizedStream) -> String {
    store
        .message(&done.thinking_message_id)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

fn response_text(store: &ChatStore, done: &FinalizedStream) -> Option<String> {
    done.response_message_id
        .as_ref()
        .and_then(|id| store.message(id))
        .map(|m| m.content.clone())
}

async fn run_chunks<C: AsRef<[u8]>>(chunks: Vec<C>) -> (ChatStore, FinalizedStream) {
    let mut store = ChatStore::new();
    let mut engine = StreamEngine::begin(&mut store, None);
    let mut source = ScriptedSource::new(chunks);
    let done = engine
        .run(&mut store, &mut source)
        .await
        .expect("session should finalize");
    (store, done)
}

const THREE_FRAMES: [&str; 3] = [
    "event: thinking\ndata: {\"token\":\"Let\",\"seq\":0}\n\n",
    "data: {\"token\":\" me\",\"seq\":1}\n\n",
    "data: {\"token\":\" think.\",\"source\":\"response\",\"seq\":0}\n\n",
];

#[tokio::test]
async fn three_chunk_scenario() {
    let (store, done) = run_chunks(THREE_FRAMES.to_vec()).await;

    assert_eq!(thinking_text(&store, &done), "Let me");
    assert_eq!(response_text(&store, &done).as_deref(), Some("think."));
    assert!(done.error.is_none());
}

#[test]
fn response_message_absent_until_first_response_token() {
    let mut store = ChatStore::new();
    let mut engine = StreamEngine::begin(&mut store, None);

    engine.feed(&mut store, THREE_FRAMES[0].as_bytes());
    engine.feed(&mut store, THREE_FRAMES[1].as_bytes());
    assert_eq!(store.messages().len(), 1);
    assert_eq!(store.phase(), StreamPhase::ThinkingActive);

    engine.feed(&mut store, THREE_FRAMES[2].as_bytes());
    assert_eq!(store.messages().len(), 2);
    assert_eq!(store.phase(), StreamPhase::ResponseMaterializing);

    let done = engine.complete(&mut store).unwrap();
    assert_eq!(thinking_text(&store, &done), "Let me");
    assert_eq!(response_text(&store, &done).as_deref(), Some("think."));
    assert!(store.message(&done.thinking_message_id).unwrap().thinking_completed());
}

#[tokio::test]
async fn control_frame_attaches_metadata_without_touching_text() {
    let (store, done) = run_chunks(vec![
        "data: {\"token\":\"Answer\",\"seq\":0}\n\n",
        "data: {\"sources\":4,\"conversation_id\":\"c-1\"}\n\n",
        "data: {\"token\":\" here\",\"seq\":1}\n\n",
    ])
    .await;

    assert_eq!(response_text(&store, &done).as_deref(), Some("Answer here"));
    assert_eq!(thinking_text(&store, &done), "");
    assert_eq!(store.conversation_id().map(|c| c.as_str()), Some("c-1"));

    let response = store.message(done.response_message_id.as_ref().unwrap()).unwrap();
    assert_eq!(response.metrics().unwrap().sources, Some(4));
}

#[tokio::test]
async fn network_error_mid_stream() {
    let mut store = ChatStore::new();
    let mut engine = StreamEngine::begin(&mut store, None);
    let mut source = ScriptedSource::new(vec![
        "event: thinking\ndata: {\"token\":\"Checking\",\"seq\":0}\n\n",
        "event: response\ndata: {\"token\":\"Partial answer\",\"seq\":0}\n\n",
    ])
    .then_fail("connection reset by peer");

    let done = engine.run(&mut store, &mut source).await.unwrap();

    assert_eq!(done.error.as_deref(), Some("connection reset by peer"));
    let response = response_text(&store, &done).unwrap();
    assert!(response.starts_with("Partial answer"));
    assert!(response.ends_with("Error: connection reset by peer"));
    assert_eq!(store.phase(), StreamPhase::Idle);
    assert!(store.message(&done.thinking_message_id).unwrap().thinking_completed());

    // Force-deliver more data after finalization
    let before: Vec<String> = store.messages().iter().map(|m| m.content.clone()).collect();
    engine.feed(&mut store, b"data: {\"token\":\" more\",\"seq\":1}\n\n");
    let outcome = store.accept_token(
        done.ticket,
        &TokenRecord {
            channel: Channel::Response,
            seq: Sequence::Numbered(5),
            text: "late".into(),
        },
    );
    assert_eq!(outcome, TokenOutcome::Stale);
    let after: Vec<String> = store.messages().iter().map(|m| m.content.clone()).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn error_before_any_token_still_shows_notice() {
    let mut store = ChatStore::new();
    let mut engine = StreamEngine::begin(&mut store, None);
    let mut source = ScriptedSource::new(Vec::<&[u8]>::new()).then_fail("timed out");

    let done = engine.run(&mut store, &mut source).await.unwrap();
    assert_eq!(response_text(&store, &done).as_deref(), Some("Error: timed out"));
    assert_eq!(done.time_to_first_token_ms, None);
}

#[tokio::test]
async fn stream_without_response_tokens_is_valid() {
    let (store, done) = run_chunks(vec![
        "event: thinking\ndata: {\"token\":\"nothing to say\",\"seq\":0}\n\n",
    ])
    .await;

    assert!(done.response_message_id.is_none());
    assert!(done.error.is_none());
    assert_eq!(store.messages().len(), 1);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn sequence_policy_over_the_wire() {
    let (store, done) = run_chunks(vec![
        // seq 0 first on its channel is accepted
        "data: {\"token\":\"a\",\"seq\":0}\n\n",
        // equal seq is accepted again
        "data: {\"token\":\"b\",\"seq\":0}\n\n",
        "data: {\"token\":\"c\",\"seq\":2}\n\n",
        // below watermark is dropped
        "data: {\"token\":\"X\",\"seq\":1}\n\n",
        // channels are tracked independently
        "event: thinking\ndata: {\"token\":\"t\",\"seq\":0}\n\n",
    ])
    .await;

    assert_eq!(response_text(&store, &done).as_deref(), Some("abc"));
    assert_eq!(thinking_text(&store, &done), "t");
}

#[tokio::test]
async fn finalization_trims_response_but_not_thinking() {
    let (store, done) = run_chunks(vec![
        "event: thinking\ndata: {\"token\":\"  step one \\n\",\"seq\":0}\n\n",
        "event: response\ndata: {\"token\":\"\\n  The answer\",\"seq\":0}\n\n",
        "data: {\"token\":\" is 42.  \\n\",\"seq\":1}\n\n",
    ])
    .await;

    assert_eq!(thinking_text(&store, &done), "  step one \n");
    assert_eq!(response_text(&store, &done).as_deref(), Some("The answer is 42."));
}

#[tokio::test]
async fn plain_text_and_combined_lines() {
    let (store, done) = run_chunks(vec![
        "thinking:data:{\"token\":\"hmm\",\"seq\":0}\n\n",
        "event: response\ndata: Plain text answer\n\n",
    ])
    .await;

    assert_eq!(thinking_text(&store, &done), "hmm");
    assert_eq!(response_text(&store, &done).as_deref(), Some("Plain text answer"));
}

#[tokio::test]
async fn malformed_objects_are_skipped() {
    let (store, done) = run_chunks(vec![
        "data: {\"token\":\"ok\",\"seq\":0} {broken {\"token\":\"!\",\"seq\":1}\n\n",
        "data: {\"unrelated\":true}\n\n",
    ])
    .await;

    assert_eq!(response_text(&store, &done).as_deref(), Some("ok!"));
}

// =============================================================================
// Chunk-boundary insensitivity
// =============================================================================

fn mixed_stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(
        "event: thinking\ndata: {\"token\":\"Überlege: 数据\",\"seq\":0}\n\n".as_bytes(),
    );
    bytes.extend_from_slice("event: thinking\ndata: {\"token\":\" 🦀\",\"seq\":1}\n\n".as_bytes());
    bytes.extend_from_slice("data: {\"sources\":2}\n\n".as_bytes());
    bytes.extend_from_slice(
        "event: response\ndata: {\"token\":\"Réponse\",\"seq\":0} {\"token\":\" ✓\",\"seq\":1}\n\n"
            .as_bytes(),
    );
    bytes.extend_from_slice("event: response\ndata: tail — fin\n\n".as_bytes());
    bytes
}

async fn reconstruct(chunks: Vec<Vec<u8>>) -> (String, Option<String>) {
    let (store, done) = run_chunks(chunks).await;
    (thinking_text(&store, &done), response_text(&store, &done))
}

#[tokio::test]
async fn every_two_way_split_matches_single_chunk() {
    let bytes = mixed_stream();
    let reference = reconstruct(vec![bytes.clone()]).await;
    assert_eq!(reference.0, "Überlege: 数据 🦀");
    assert_eq!(reference.1.as_deref(), Some("Réponse ✓tail — fin"));

    for cut in 0..=bytes.len() {
        let chunks = vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()];
        assert_eq!(reconstruct(chunks).await, reference, "split at byte {cut}");
    }
}

#[tokio::test]
async fn byte_at_a_time_matches_single_chunk() {
    let bytes = mixed_stream();
    let reference = reconstruct(vec![bytes.clone()]).await;
    let chunks: Vec<Vec<u8>> = bytes.iter().map(|b| vec![*b]).collect();
    assert_eq!(reconstruct(chunks).await, reference);
}

#[tokio::test]
async fn three_way_splits_match_single_chunk() {
    let bytes = mixed_stream();
    let reference = reconstruct(vec![bytes.clone()]).await;

    for first in (0..bytes.len()).step_by(7) {
        for second in (first..=bytes.len()).step_by(11) {
            let chunks = vec![
                bytes[..first].to_vec(),
                bytes[first..second].to_vec(),
                bytes[second..].to_vec(),
            ];
            assert_eq!(
                reconstruct(chunks).await,
                reference,
                "splits at {first} and {second}"
            );
        }
    }
}

// =============================================================================
// Session handling
// =============================================================================

#[test]
fn superseded_session_ignores_late_chunks() {
    let mut store = ChatStore::new();
    let mut old = StreamEngine::begin(&mut store, None);
    old.feed(&mut store, b"data: {\"token\":\"first\",\"seq\":0}\n\n");

    let mut new = StreamEngine::begin(&mut store, None);
    old.feed(&mut store, b"data: {\"token\":\" stale\",\"seq\":1}\n\n");
    new.feed(&mut store, b"data: {\"token\":\"second\",\"seq\":0}\n\n");

    assert!(old.complete(&mut store).is_none());
    let done = new.complete(&mut store).unwrap();
    assert_eq!(response_text(&store, &done).as_deref(), Some("second"));
    assert_eq!(old.stats().stale, 1);
}

#[tokio::test]
async fn conversation_id_carries_into_next_send() {
    let mut store = ChatStore::new();

    let mut engine = StreamEngine::begin(&mut store, None);
    let mut source = ScriptedSource::new(vec!["data: {\"conversation_id\":\"conv-9\"}\n\n"]);
    engine.run(&mut store, &mut source).await.unwrap();

    let mut engine = StreamEngine::begin(&mut store, None);
    let mut source = ScriptedSource::new(vec!["data: {\"token\":\"again\"}\n\n"]);
    engine.run(&mut store, &mut source).await.unwrap();

    assert_eq!(store.conversation_id().map(|c| c.as_str()), Some("conv-9"));
}
