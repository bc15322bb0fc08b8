use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ac_domain::capability::{CapabilityState, ExecutionStrategy, ProviderStatus};
use ac_domain::config::{ExtractionConfig, StrategyConfig};
use ac_domain::payload::PayloadSource;
use ac_domain::tool::{Role, ToolDefinition};
use ac_payload::PayloadExtractor;
use ac_providers::mock::{ScriptedModel, StaticToolProvider, Step};
use ac_providers::ProviderRegistry;
use ac_runtime::ExecutionStrategySelector;
use ac_sessions::{ConversationTurn, Session, SessionKey};

struct Fixture {
    model: Arc<ScriptedModel>,
    provider: Arc<StaticToolProvider>,
    selector: ExecutionStrategySelector,
    state: CapabilityState,
}

fn fixture(model: ScriptedModel, provider: StaticToolProvider, config: StrategyConfig) -> Fixture {
    let model = Arc::new(model);
    let provider = Arc::new(provider);
    let registry = ProviderRegistry::new().with(provider.clone());

    let tools = ["search", "pay", "offers"]
        .iter()
        .map(|t| ToolDefinition::new(*t, ""))
        .collect();
    let state = CapabilityState::selected(
        "shop",
        vec![ProviderStatus::reachable("shop", true, tools)],
        1,
    );

    let selector = ExecutionStrategySelector::new(
        model.clone(),
        registry,
        PayloadExtractor::new(&ExtractionConfig::default()),
        config,
    );
    Fixture {
        model,
        provider,
        selector,
        state,
    }
}

fn shop() -> StaticToolProvider {
    StaticToolProvider::new("shop")
        .with_tool("search", "3 pairs of wool socks")
        .with_failing_tool("pay", "card declined")
        .with_tool(
            "offers",
            r#"{"offers": [{"id": "o1", "amount": 12}], "payment_context_token": "ctx-1"}"#,
        )
}

fn empty_session() -> Session {
    Session::new(&SessionKey::of("alice", "s1"), 10)
}

#[tokio::test]
async fn tool_augmented_answer_records_invoked_tools() {
    let model = ScriptedModel::new("m")
        .with_tools(Step::tool_call("search", json!({ "q": "socks" })))
        .with_tools(Step::reply("I found 3 pairs of wool socks."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("find socks", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolAugmented);
    assert_eq!(turn.response, "I found 3 pairs of wool socks.");
    assert_eq!(turn.tools_used, ["search"]);
    assert_eq!(f.provider.calls(), vec![("search".to_owned(), json!({ "q": "socks" }))]);

    // The tool result was fed back before the final answer.
    let second = &f.model.requests()[1];
    let last = second.messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.content, "3 pairs of wool socks");
}

#[tokio::test]
async fn failing_tool_mode_falls_through_to_tool_free() {
    let model = ScriptedModel::new("m")
        .always_with_tools(Step::fail("provider crashed"))
        .without_tools(Step::reply("Plain answer."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
    assert_eq!(turn.response, "Plain answer.");
    assert!(turn.tools_used.is_empty());
}

#[tokio::test]
async fn blank_output_is_treated_like_an_error() {
    let model = ScriptedModel::new("m")
        .with_tools(Step::reply("   \n"))
        .without_tools(Step::reply("Second try."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
}

#[tokio::test]
async fn everything_failing_yields_deterministic_static_text() {
    let model = ScriptedModel::new("m").always(Step::fail("quota exceeded"));
    let f = fixture(model, shop(), StrategyConfig::default());

    let first = f.selector.respond("hi", &f.state, &empty_session()).await;
    let second = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(first.strategy, ExecutionStrategy::StaticFallback);
    assert_eq!(first.response, second.response);
    assert!(first.response.contains("tool_augmented: model: quota exceeded"));
    assert!(first.response.contains("tool_free: model: quota exceeded"));
}

#[tokio::test]
async fn blank_fallback_template_still_produces_text() {
    let model = ScriptedModel::new("m").always(Step::fail("down"));
    let config = StrategyConfig {
        fallback_message: "  ".into(),
        ..Default::default()
    };
    let f = fixture(model, shop(), config);

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert!(!turn.response.trim().is_empty());
}

#[tokio::test]
async fn no_reachable_provider_skips_tool_mode() {
    let model = ScriptedModel::new("m").without_tools(Step::reply("No tools needed."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f
        .selector
        .respond("hi", &CapabilityState::exhausted(1), &empty_session())
        .await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
    assert!(f.model.requests().iter().all(|r| r.tools.is_empty()));
}

#[tokio::test]
async fn empty_request_runs_the_same_chain() {
    let model = ScriptedModel::new("m")
        .always_with_tools(Step::fail("no"))
        .without_tools(Step::reply("Did you mean to say something?"));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("", &f.state, &empty_session()).await;
    assert_eq!(turn.request, "");
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
    assert_eq!(f.model.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_strategy_times_out_and_falls_through() {
    let model = ScriptedModel::new("m")
        .with_tools(Step::Stall(Duration::from_secs(3600)))
        .without_tools(Step::reply("Recovered."));
    let config = StrategyConfig {
        tool_augmented_timeout_secs: 5,
        ..Default::default()
    };
    let f = fixture(model, shop(), config);

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
    assert_eq!(turn.response, "Recovered.");
}

#[tokio::test]
async fn endless_tool_calls_exhaust_the_round_limit() {
    let model = ScriptedModel::new("m")
        .always_with_tools(Step::tool_call("search", json!({})))
        .without_tools(Step::reply("Gave up on tools."));
    let config = StrategyConfig {
        max_tool_rounds: 2,
        ..Default::default()
    };
    let f = fixture(model, shop(), config);

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
    assert_eq!(f.provider.calls().len(), 2);
}

#[tokio::test]
async fn tool_errors_are_fed_back_not_fatal() {
    let model = ScriptedModel::new("m")
        .with_tools(Step::tool_call("pay", json!({ "amount": 12 })))
        .with_tools(Step::tool_call("ghost", json!({})))
        .with_tools(Step::reply("The payment was declined."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("pay", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolAugmented);
    assert_eq!(turn.tools_used, ["pay", "ghost"]);

    let requests = f.model.requests();
    let declined = requests[1].messages.last().unwrap();
    assert!(declined.is_error);
    assert_eq!(declined.content, "card declined");
    let unknown = requests[2].messages.last().unwrap();
    assert!(unknown.is_error);
    assert!(unknown.content.contains("unknown tool: ghost"));
}

#[tokio::test]
async fn payload_is_extracted_from_answer_text() {
    let model = ScriptedModel::new("m").with_tools(Step::reply(
        "Here are your offers: {\"offers\": [{\"id\": \"x1\"}], \"payment_context_token\": \"tok123\"}\nThanks.",
    ));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("buy", &f.state, &empty_session()).await;
    let payload = turn.payload.unwrap();
    assert_eq!(payload.source, PayloadSource::Embedded);
    assert_eq!(payload.get_str("payment_context_token"), Some("tok123"));
}

#[tokio::test]
async fn payload_falls_back_to_tool_output() {
    let model = ScriptedModel::new("m")
        .with_tools(Step::tool_call("offers", json!({})))
        .with_tools(Step::reply("One offer is available for 12 USDC."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("buy", &f.state, &empty_session()).await;
    let payload = turn.payload.unwrap();
    assert_eq!(payload.get_str("payment_context_token"), Some("ctx-1"));
    assert_eq!(payload.get("offers").unwrap()[0]["id"], "o1");
}

#[tokio::test]
async fn prose_only_answer_has_no_payload() {
    let model = ScriptedModel::new("m").with_tools(Step::reply("Nothing to buy today."));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("buy", &f.state, &empty_session()).await;
    assert!(turn.payload.is_none());
}

#[tokio::test]
async fn prompt_and_recent_history_precede_the_request() {
    let model = ScriptedModel::new("m").with_tools(Step::reply("Sure."));
    let config = StrategyConfig {
        system_prompt: Some("You are a shopping assistant.".into()),
        history_turns: 1,
        ..Default::default()
    };
    let f = fixture(model, shop(), config);

    let mut session = empty_session();
    session.push(ConversationTurn::new("old question", "old answer", ExecutionStrategy::ToolFree));
    session.push(ConversationTurn::new("last question", "last answer", ExecutionStrategy::ToolFree));

    f.selector.respond("new question", &f.state, &session).await;
    let messages = &f.model.requests()[0].messages;
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        ["You are a shopping assistant.", "last question", "last answer", "new question"]
    );
    assert_eq!(messages[0].role, Role::System);
}

#[tokio::test]
async fn thinking_is_kept_on_the_turn() {
    let model = ScriptedModel::new("m").with_tools(Step::Reply(ac_providers::Generation {
        text: "Done.".into(),
        thinking: Some("compare prices first".into()),
        ..Default::default()
    }));
    let f = fixture(model, shop(), StrategyConfig::default());

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.thinking.as_deref(), Some("compare prices first"));
}

#[tokio::test]
async fn configured_order_can_skip_tool_mode() {
    let model = ScriptedModel::new("m").without_tools(Step::reply("Tool-free by config."));
    let config = StrategyConfig {
        order: vec![ExecutionStrategy::ToolFree],
        ..Default::default()
    };
    let f = fixture(model, shop(), config);
    assert_eq!(
        f.selector.order(),
        [ExecutionStrategy::ToolFree, ExecutionStrategy::StaticFallback]
    );

    let turn = f.selector.respond("hi", &f.state, &empty_session()).await;
    assert_eq!(turn.strategy, ExecutionStrategy::ToolFree);
}
