use std::sync::Arc;
use std::time::Duration;

use ac_domain::capability::{BundleMember, CapabilityBundle};
use ac_providers::mock::StaticToolProvider;
use ac_providers::ProviderRegistry;
use ac_runtime::CapabilityNegotiator;

fn negotiator(providers: &[Arc<StaticToolProvider>], bundles: Vec<CapabilityBundle>) -> CapabilityNegotiator {
    let mut registry = ProviderRegistry::new();
    for p in providers {
        registry.register(p.clone());
    }
    CapabilityNegotiator::new(registry, bundles, Duration::from_secs(180), Duration::from_secs(60))
}

fn standard_bundles() -> Vec<CapabilityBundle> {
    vec![
        CapabilityBundle::new("a+b", vec![BundleMember::required("a"), BundleMember::optional("b")]),
        CapabilityBundle::new("a", vec![BundleMember::required("a")]),
        CapabilityBundle::new("none", Vec::new()),
    ]
}

#[tokio::test]
async fn optional_member_failure_keeps_the_bundle() {
    let a = Arc::new(StaticToolProvider::new("a").with_tool("search", "ok"));
    let b = Arc::new(StaticToolProvider::new("b").failing("connection refused"));
    let n = negotiator(&[a.clone(), b.clone()], standard_bundles());

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("a+b"));
    assert!(state.is_reachable("a"));
    assert!(!state.is_reachable("b"));
    assert!(state.providers[1].error.as_deref().unwrap().contains("connection refused"));
    assert_eq!(state.generation, 1);
    assert_eq!(a.init_calls(), 1);
}

#[tokio::test]
async fn required_member_failure_moves_to_next_bundle() {
    let a = Arc::new(StaticToolProvider::new("a").with_tool("search", "ok"));
    let b = Arc::new(StaticToolProvider::new("b").failing("down"));
    let bundles = vec![
        CapabilityBundle::new("all", vec![BundleMember::required("a"), BundleMember::required("b")]),
        CapabilityBundle::new("a", vec![BundleMember::required("a")]),
    ];
    let n = negotiator(&[a.clone(), b.clone()], bundles);

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("a"));
    assert_eq!(state.providers.len(), 1);
    // `a` came up in the failed bundle, was released, then probed again.
    assert_eq!(a.init_calls(), 2);
    assert_eq!(a.teardown_calls(), 1);
    assert_eq!(b.teardown_calls(), 0);
}

#[tokio::test]
async fn every_bundle_failing_is_a_valid_empty_state() {
    let a = Arc::new(StaticToolProvider::new("a").failing("down"));
    let n = negotiator(&[a.clone()], standard_bundles());

    let state = n.negotiate().await;
    assert!(state.bundle.is_none());
    assert!(!state.has_reachable_provider());
    assert!(state.is_negotiated());
    assert!(state.tool_definitions().is_empty());
}

#[tokio::test]
async fn first_succeeding_bundle_in_declared_order_wins() {
    let a = Arc::new(StaticToolProvider::new("a"));
    let b = Arc::new(StaticToolProvider::new("b"));
    let bundles = vec![
        CapabilityBundle::new("only:b", vec![BundleMember::required("b")]),
        CapabilityBundle::new("only:a", vec![BundleMember::required("a")]),
    ];
    let n = negotiator(&[a.clone(), b.clone()], bundles);

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("only:b"));
    assert_eq!(a.init_calls(), 0);
}

#[tokio::test]
async fn not_ready_and_unregistered_members_are_unreachable() {
    let a = Arc::new(StaticToolProvider::new("a").not_ready());
    let b = Arc::new(StaticToolProvider::new("b"));
    let bundles = vec![CapabilityBundle::new(
        "mixed",
        vec![
            BundleMember::optional("a"),
            BundleMember::optional("ghost"),
            BundleMember::required("b"),
        ],
    )];
    let n = negotiator(&[a, b], bundles);

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("mixed"));
    let reachable: Vec<&str> = state.reachable_providers().map(|p| p.name.as_str()).collect();
    assert_eq!(reachable, ["b"]);
    assert!(state.providers[1].error.as_deref().unwrap().contains("not registered"));
}

#[tokio::test]
async fn bundle_with_only_optional_failures_fails() {
    let a = Arc::new(StaticToolProvider::new("a").failing("down"));
    let bundles = vec![CapabilityBundle::new("opt", vec![BundleMember::optional("a")])];
    let state = negotiator(&[a], bundles).negotiate().await;
    assert!(state.bundle.is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out_and_is_released() {
    let slow = Arc::new(StaticToolProvider::new("slow").stalling(Duration::from_secs(120)));
    let fast = Arc::new(StaticToolProvider::new("fast"));
    let bundles = vec![
        CapabilityBundle::new("slow", vec![BundleMember::required("slow")]),
        CapabilityBundle::new("fast", vec![BundleMember::required("fast")]),
    ];
    let n = negotiator(&[slow.clone(), fast], bundles);

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("fast"));
    assert_eq!(slow.teardown_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn bundle_timeout_bounds_the_whole_attempt() {
    let slow = Arc::new(StaticToolProvider::new("slow").stalling(Duration::from_secs(30)));
    let fast = Arc::new(StaticToolProvider::new("fast"));
    let mut registry = ProviderRegistry::new();
    registry.register(slow.clone());
    registry.register(fast);
    let bundles = vec![
        CapabilityBundle::new("slow", vec![BundleMember::required("slow")]),
        CapabilityBundle::new("fast", vec![BundleMember::required("fast")]),
    ];
    let n = CapabilityNegotiator::new(registry, bundles, Duration::from_secs(10), Duration::from_secs(60));

    let state = n.negotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("fast"));
    assert_eq!(slow.teardown_calls(), 1);
}

#[tokio::test]
async fn renegotiation_replaces_state_without_touching_old_snapshots() {
    let a = Arc::new(StaticToolProvider::new("a"));
    let n = negotiator(&[a.clone()], standard_bundles());

    let first = n.ensure_negotiated().await;
    let again = n.ensure_negotiated().await;
    assert_eq!(a.init_calls(), 1);
    assert!(Arc::ptr_eq(&first, &again));

    let second = n.renegotiate().await;
    assert_eq!(second.generation, 2);
    assert_eq!(first.generation, 1);
    assert_eq!(n.snapshot().generation, 2);
    assert_eq!(a.init_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_negotiation() {
    let a = Arc::new(StaticToolProvider::new("a").stalling(Duration::from_secs(5)));
    let n = Arc::new(negotiator(&[a.clone()], standard_bundles()));

    let (x, y) = tokio::join!(n.ensure_negotiated(), n.ensure_negotiated());
    assert_eq!(x.generation, 1);
    assert_eq!(y.generation, 1);
    assert_eq!(a.init_calls(), 1);
}

#[tokio::test]
async fn shutdown_releases_every_provider() {
    let a = Arc::new(StaticToolProvider::new("a"));
    let b = Arc::new(StaticToolProvider::new("b"));
    let n = negotiator(&[a.clone(), b.clone()], standard_bundles());
    n.negotiate().await;
    n.shutdown().await;
    assert_eq!(a.teardown_calls(), 1);
    assert_eq!(b.teardown_calls(), 1);
}

#[tokio::test]
async fn failed_renegotiation_keeps_providers_an_old_state_still_uses() {
    let a = Arc::new(StaticToolProvider::new("a").with_tool("search", "ok"));
    let b = Arc::new(StaticToolProvider::new("b"));
    let bundles = vec![CapabilityBundle::new(
        "all",
        vec![BundleMember::required("a"), BundleMember::required("b")],
    )];
    let n = negotiator(&[a.clone(), b.clone()], bundles);

    let old = n.negotiate().await;
    assert_eq!(old.bundle.as_deref(), Some("all"));

    b.set_down(true);
    let new = n.renegotiate().await;
    assert!(new.bundle.is_none());
    assert!(old.is_reachable("a"));
    assert_eq!(a.teardown_calls(), 0);
    assert_eq!(b.teardown_calls(), 0);

    // Still held, so nothing is released yet.
    n.release_retired().await;
    assert_eq!(a.teardown_calls(), 0);

    drop(old);
    n.release_retired().await;
    assert_eq!(a.teardown_calls(), 1);
    assert_eq!(b.teardown_calls(), 1);
}

#[tokio::test]
async fn provider_dropped_by_renegotiation_is_torn_down() {
    let a = Arc::new(StaticToolProvider::new("a"));
    let b = Arc::new(StaticToolProvider::new("b"));
    let bundles = vec![
        CapabilityBundle::new("all", vec![BundleMember::required("a"), BundleMember::required("b")]),
        CapabilityBundle::new("a", vec![BundleMember::required("a")]),
    ];
    let n = negotiator(&[a.clone(), b.clone()], bundles);
    n.negotiate().await;

    b.set_down(true);
    let state = n.renegotiate().await;
    assert_eq!(state.bundle.as_deref(), Some("a"));
    assert_eq!(a.teardown_calls(), 0);
    assert_eq!(b.teardown_calls(), 1);
}
