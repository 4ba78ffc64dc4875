//! Conversational assistant: prompt loading, grounding, bounded history.

mod common;

use std::sync::Arc;

use common::ScriptedChatClient;
use pretty_assertions::assert_eq;
use stagewright_engine::assistant::Assistant;
use stagewright_llm::{PromptCatalog, Role};
use stagewright_retrieval::{CorpusId, CorpusStore};

fn catalog_with_prompt(dir: &std::path::Path) -> PromptCatalog {
    let catalog = PromptCatalog::new(dir.join("prompts"));
    catalog
        .save(
            "assist",
            "current",
            "You answer questions about the generated PLC code.",
        )
        .expect("save prompt");
    catalog
}

#[tokio::test]
async fn replies_carry_the_prompt_and_record_history() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::default());
    let corpus = Arc::new(CorpusStore::new(tmp.path().join("corpora")));
    let catalog = catalog_with_prompt(tmp.path());

    let mut assistant = Assistant::new(chat.clone(), corpus, catalog, "assist");

    chat.push_response("The timer debounces the start button.");
    let reply = assistant
        .reply("What does the timer do?", None, None)
        .await
        .expect("reply");
    assert_eq!(reply.answer, "The timer debounces the start button.");
    // No manuals were ingested, so the answer is ungrounded.
    assert!(!reply.manual_grounded);

    chat.push_response("It is 100 milliseconds.");
    assistant
        .reply("How long is the delay?", None, None)
        .await
        .expect("reply");

    // The second request replays the first turn as history.
    let requests = chat.requests();
    let second = &requests[1];
    assert_eq!(second[0].role, Role::System);
    assert!(second[0].content.contains("You answer questions"));
    assert_eq!(second[1].content, "What does the timer do?");
    assert_eq!(second[2].content, "The timer debounces the start button.");
    assert_eq!(second[3].content, "How long is the delay?");
}

#[tokio::test]
async fn history_is_bounded_to_the_last_six_messages() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::default());
    let corpus = Arc::new(CorpusStore::new(tmp.path().join("corpora")));
    let catalog = catalog_with_prompt(tmp.path());

    let mut assistant = Assistant::new(chat.clone(), corpus, catalog, "assist");

    for i in 0..6 {
        chat.push_response(format!("answer {i}"));
        assistant
            .reply(&format!("question {i}"), None, None)
            .await
            .expect("reply");
    }

    // system + 6 history messages + current question.
    let requests = chat.requests();
    let last = requests.last().expect("last request");
    assert_eq!(last.len(), 8);
    // The oldest turns fell out of the window.
    assert!(!last.iter().any(|m| m.content == "question 0"));
    assert!(last.iter().any(|m| m.content == "question 4"));
}

#[tokio::test]
async fn manual_context_grounds_the_reply() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let chat = Arc::new(ScriptedChatClient::default());
    let corpus = Arc::new(CorpusStore::new(tmp.path().join("corpora")));
    let catalog = catalog_with_prompt(tmp.path());

    let manual = tmp.path().join("manual.txt");
    let body = "Timers T0 to T511 tick in 100 millisecond units. ".repeat(30);
    std::fs::write(&manual, body).expect("write manual");
    corpus
        .build(&CorpusId::Primary, &[manual])
        .await
        .expect("build");

    let mut assistant = Assistant::new(chat.clone(), corpus, catalog, "assist");

    chat.push_response("Timers tick every 100 ms.");
    let reply = assistant
        .reply("How fast do timers tick?", None, Some("Stage 2 - Operation"))
        .await
        .expect("reply");
    assert!(reply.manual_grounded);

    let requests = chat.requests();
    let system = &requests[0][0];
    assert!(system.content.contains("MANUAL REFERENCE"));
    assert!(system.content.contains("100 millisecond units"));
    assert!(system.content.contains("STAGE CONTEXT"));
}
