//! End-to-end tests against the live Mistral API.
//!
//! These tests require a valid MISTRAL_API_KEY environment variable.
//!
//! # Running the tests
//!
//! ```bash
//! export MISTRAL_API_KEY=your-api-key
//! cargo test --test e2e_mistral
//! cargo test --test e2e_mistral test_mistral_basic_chat
//! ```
//!
//! # Test coverage
//!
//! - Basic chat completion
//! - Streaming
//! - Native tool calling (`mistral-small`)
//! - Emulated tool calling (`mistral-medium`)
//! - Blocking client

use futures::StreamExt;
use serde_json::json;
use unichat_llm::{
    BlockingChatClient, ChatClient, ChatMessage, ClientDefaults, CompletionRequest,
    ProviderKind, Settings, ToolDefinition,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn has_mistral_key() -> bool {
    std::env::var("MISTRAL_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
}

fn create_client() -> ChatClient {
    ChatClient::from_settings(
        ProviderKind::Mistral,
        &Settings::default(),
        ClientDefaults::default().with_temperature(0.0),
    )
    .expect("MISTRAL_API_KEY must be set")
}

fn weather_tool() -> ToolDefinition {
    ToolDefinition::function(
        "get_weather",
        "Get the current weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mistral_basic_chat() {
    if !has_mistral_key() {
        eprintln!("Skipping test_mistral_basic_chat: MISTRAL_API_KEY not set");
        return;
    }

    let client = create_client();
    let request = CompletionRequest::new(vec![
        ChatMessage::system("You are a concise math tutor."),
        ChatMessage::user("What is 2 + 2? Reply with just the number."),
    ])
    .with_stream(false);

    let response = client
        .completion(request)
        .await
        .expect("completion failed")
        .into_response()
        .expect("expected a single response");
    println!("Response: {}", response.content);
    assert!(response.content.contains('4'));
    assert!(response.usage.total_tokens > 0);
    client.shutdown().await;
}

#[tokio::test]
async fn test_mistral_streaming() {
    if !has_mistral_key() {
        eprintln!("Skipping test_mistral_streaming: MISTRAL_API_KEY not set");
        return;
    }

    let client = create_client();
    let request = CompletionRequest::new(vec![ChatMessage::user("Count from 1 to 5.")]);
    let mut events = client
        .completion(request)
        .await
        .expect("completion failed")
        .into_stream()
        .expect("expected a stream");

    let mut text = String::new();
    while let Some(event) = events.next().await {
        text.push_str(event.expect("stream error").text());
    }
    println!("Streamed: {}", text);
    assert!(text.contains('3'));
}

// ---------------------------------------------------------------------------
// Tool calling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_mistral_native_tool_call() {
    if !has_mistral_key() {
        eprintln!("Skipping test_mistral_native_tool_call: MISTRAL_API_KEY not set");
        return;
    }

    let client = create_client();
    let request = CompletionRequest::new(vec![ChatMessage::user("What's the weather in Paris?")])
        .with_stream(false)
        .with_tools(vec![weather_tool()]);

    let response = client
        .completion(request)
        .await
        .expect("completion failed")
        .into_response()
        .expect("expected a single response");
    println!("Tool calls: {:?}", response.tool_calls);
    if response.has_tool_calls() {
        assert_eq!(response.tool_calls[0].name(), "get_weather");
    }
}

#[tokio::test]
async fn test_mistral_emulated_tool_call_stream() {
    if !has_mistral_key() {
        eprintln!("Skipping test_mistral_emulated_tool_call_stream: MISTRAL_API_KEY not set");
        return;
    }

    let client = create_client();
    let request = CompletionRequest::new(vec![ChatMessage::user("What's the weather in Paris?")])
        .with_model("mistral-medium")
        .with_tools(vec![weather_tool()]);
    let mut events = client
        .completion(request)
        .await
        .expect("completion failed")
        .into_stream()
        .expect("expected a stream");

    let mut announcements = 0;
    while let Some(event) = events.next().await {
        let event = event.expect("stream error");
        assert!(!event.text().contains("<|"));
        if event.has_tool_calls() {
            announcements += 1;
            println!("Tool calls: {:?}", event.tool_calls);
        }
    }
    assert!(announcements <= 1);
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[test]
fn test_mistral_blocking_chat() {
    if !has_mistral_key() {
        eprintln!("Skipping test_mistral_blocking_chat: MISTRAL_API_KEY not set");
        return;
    }

    let client = BlockingChatClient::from_settings(
        ProviderKind::Mistral,
        &Settings::default(),
        ClientDefaults::default().with_stream(false),
    )
    .expect("MISTRAL_API_KEY must be set");
    let response = client
        .completion(CompletionRequest::new(vec![ChatMessage::user("Say hello.")]))
        .expect("completion failed")
        .into_response()
        .expect("expected a single response");
    assert!(!response.content.is_empty());
    client.shutdown();
}
