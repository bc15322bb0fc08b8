//! Capability negotiation.
//!
//! Bundles are tried in preference order. Every member of a bundle is probed
//! concurrently, each probe under its own timeout and the whole bundle under
//! another. The first bundle whose required members all answer, and which
//! has at least one reachable member, becomes the [`CapabilityState`].
//!
//! Re-negotiation never closes a provider that a live state still lists as
//! reachable. Providers dropped by the new state are torn down once the last
//! reader of the old state lets go of it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};

use ac_domain::capability::{BundleMember, CapabilityBundle, CapabilityState, ProviderStatus};
use ac_domain::config::AgentConfig;
use ac_domain::trace::TraceEvent;
use ac_providers::ProviderRegistry;

pub struct CapabilityNegotiator {
    registry: ProviderRegistry,
    bundles: Vec<CapabilityBundle>,
    bundle_timeout: Duration,
    probe_timeout: Duration,
    /// Last completed negotiation. Readers clone the `Arc` and keep using it
    /// even if a re-negotiation swaps in a new state meanwhile.
    current: RwLock<Arc<CapabilityState>>,
    /// Replaced states whose providers may still be in use by readers.
    retired: Mutex<Vec<Arc<CapabilityState>>>,
    /// Held for the duration of a negotiation.
    negotiating: tokio::sync::Mutex<()>,
}

impl CapabilityNegotiator {
    pub fn new(
        registry: ProviderRegistry,
        bundles: Vec<CapabilityBundle>,
        bundle_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            bundles,
            bundle_timeout,
            probe_timeout,
            current: RwLock::new(Arc::new(CapabilityState::unnegotiated())),
            retired: Mutex::new(Vec::new()),
            negotiating: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(registry: ProviderRegistry, config: &AgentConfig) -> Self {
        Self::new(
            registry,
            config.bundles(),
            config.negotiation.bundle_timeout(),
            config.negotiation.probe_timeout(),
        )
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn bundles(&self) -> &[CapabilityBundle] {
        &self.bundles
    }

    /// The last completed state. Never blocks on a running negotiation.
    pub fn snapshot(&self) -> Arc<CapabilityState> {
        self.current.read().clone()
    }

    /// Negotiate over the configured bundles.
    pub async fn negotiate(&self) -> Arc<CapabilityState> {
        self.negotiate_bundles(&self.bundles).await
    }

    /// Negotiate only if no negotiation has completed yet. Callers arriving
    /// while one is running wait for its result instead of starting another.
    pub async fn ensure_negotiated(&self) -> Arc<CapabilityState> {
        let current = self.snapshot();
        if current.is_negotiated() {
            return current;
        }

        let _guard = self.negotiating.lock().await;
        let current = self.snapshot();
        if current.is_negotiated() {
            return current;
        }
        self.run(&self.bundles).await
    }

    /// Discard the current state and negotiate again.
    pub async fn renegotiate(&self) -> Arc<CapabilityState> {
        tracing::info!(generation = self.snapshot().generation, "re-negotiating capabilities");
        self.negotiate().await
    }

    /// Try `bundles` in order and install the result. Never fails: when no
    /// bundle succeeds the result has zero reachable providers.
    pub async fn negotiate_bundles(&self, bundles: &[CapabilityBundle]) -> Arc<CapabilityState> {
        let _guard = self.negotiating.lock().await;
        self.run(bundles).await
    }

    /// Caller holds `negotiating`.
    async fn run(&self, bundles: &[CapabilityBundle]) -> Arc<CapabilityState> {
        let generation = self.snapshot().generation + 1;

        let mut selected = None;
        for bundle in bundles {
            if let Some(providers) = self.attempt(bundle).await {
                selected = Some(CapabilityState::selected(&bundle.name, providers, generation));
                break;
            }
        }
        let state = Arc::new(selected.unwrap_or_else(|| CapabilityState::exhausted(generation)));

        TraceEvent::NegotiationCompleted {
            bundle: state.bundle.clone(),
            reachable: state.reachable_providers().map(|p| p.name.clone()).collect(),
            generation,
        }
        .emit();
        if state.bundle.is_none() {
            tracing::warn!(bundles = bundles.len(), "no capability bundle succeeded, running without tools");
        }

        let previous = std::mem::replace(&mut *self.current.write(), state.clone());
        if previous.has_reachable_provider() {
            self.retired.lock().push(previous);
        }
        self.reap_retired().await;
        state
    }

    /// Tear down providers that only a replaced state referenced, once no
    /// reader holds that state any more. Skipped while a negotiation runs,
    /// which reaps when it completes.
    pub async fn release_retired(&self) {
        let Ok(_guard) = self.negotiating.try_lock() else {
            return;
        };
        self.reap_retired().await;
    }

    /// Caller holds `negotiating`.
    async fn reap_retired(&self) {
        // Retired states are no longer reachable through `snapshot`, so a
        // count of one cannot grow again.
        let released: Vec<Arc<CapabilityState>> = {
            let mut retired = self.retired.lock();
            let (held, released): (Vec<_>, Vec<_>) = std::mem::take(&mut *retired)
                .into_iter()
                .partition(|s| Arc::strong_count(s) > 1);
            *retired = held;
            released
        };
        if released.is_empty() {
            return;
        }

        let in_use = self.in_use();
        let mut stale: Vec<&str> = released
            .iter()
            .flat_map(|s| s.reachable_providers())
            .map(|p| p.name.as_str())
            .filter(|name| !in_use.contains(*name))
            .collect();
        stale.sort_unstable();
        stale.dedup();
        if !stale.is_empty() {
            tracing::info!(providers = ?stale, "tearing down providers no longer in use");
            self.teardown_members(stale.into_iter()).await;
        }
    }

    /// Providers reachable in the installed state or in a replaced state
    /// that a reader still holds.
    fn in_use(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self
            .snapshot()
            .reachable_providers()
            .map(|p| p.name.clone())
            .collect();
        for state in self.retired.lock().iter() {
            names.extend(state.reachable_providers().map(|p| p.name.clone()));
        }
        names
    }

    /// Probe every member of `bundle`. Returns the member statuses when the
    /// bundle succeeds. Members that came up in a failed attempt are torn
    /// down again unless a live state still serves them.
    async fn attempt(&self, bundle: &CapabilityBundle) -> Option<Vec<ProviderStatus>> {
        let started = Instant::now();

        let outcome = if bundle.members.is_empty() {
            Err("bundle has no providers".to_owned())
        } else {
            match tokio::time::timeout(self.bundle_timeout, self.probe_all(&bundle.members)).await {
                Ok(statuses) => match judge(&statuses) {
                    Ok(()) => Ok(statuses),
                    Err(reason) => {
                        let up = statuses.iter().filter(|s| s.reachable).map(|s| s.name.as_str());
                        self.teardown_unused(up).await;
                        Err(reason)
                    }
                },
                Err(_) => {
                    // Probes were dropped mid-flight; any of them may have started.
                    self.teardown_unused(bundle.members.iter().map(|m| m.provider.as_str()))
                        .await;
                    Err(format!("bundle timed out after {:?}", self.bundle_timeout))
                }
            }
        };

        let (result, reachable, reason) = match outcome {
            Ok(statuses) => {
                let reachable = reachable_names(&statuses);
                (Some(statuses), reachable, None)
            }
            Err(reason) => (None, Vec::new(), Some(reason)),
        };

        TraceEvent::BundleAttempted {
            bundle: bundle.name.clone(),
            succeeded: result.is_some(),
            reachable,
            reason,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();
        result
    }

    async fn probe_all(&self, members: &[BundleMember]) -> Vec<ProviderStatus> {
        join_all(members.iter().map(|m| self.probe(m))).await
    }

    async fn probe(&self, member: &BundleMember) -> ProviderStatus {
        let name = member.provider.as_str();
        let Some(provider) = self.registry.get(name) else {
            return ProviderStatus::unreachable(name, member.required, "provider is not registered");
        };

        match tokio::time::timeout(self.probe_timeout, provider.initialize()).await {
            Ok(Ok(init)) if init.ready => {
                tracing::debug!(provider = %name, tools = init.tools.len(), "provider probe succeeded");
                ProviderStatus::reachable(name, member.required, init.tools)
            }
            Ok(Ok(_)) => ProviderStatus::unreachable(name, member.required, "provider reported not ready"),
            Ok(Err(e)) => {
                tracing::warn!(provider = %name, error = %e, "provider probe failed");
                ProviderStatus::unreachable(name, member.required, e.to_string())
            }
            Err(_) => {
                tracing::warn!(provider = %name, timeout = ?self.probe_timeout, "provider probe timed out");
                // The probe may have spawned something before it was dropped.
                if !self.in_use().contains(name) {
                    provider.teardown().await;
                }
                ProviderStatus::unreachable(
                    name,
                    member.required,
                    format!("probe timed out after {:?}", self.probe_timeout),
                )
            }
        }
    }

    /// Tear down `names` except those a live state still serves. Caller
    /// holds `negotiating`, so the installed state cannot change underneath.
    async fn teardown_unused<'a>(&self, names: impl Iterator<Item = &'a str>) {
        let in_use = self.in_use();
        self.teardown_members(names.filter(|n| !in_use.contains(*n))).await;
    }

    async fn teardown_members<'a>(&self, names: impl Iterator<Item = &'a str>) {
        let providers: Vec<_> = names.filter_map(|n| self.registry.get(n)).collect();
        join_all(providers.iter().map(|p| p.teardown())).await;
    }

    /// Tear down every registered provider.
    pub async fn shutdown(&self) {
        let _guard = self.negotiating.lock().await;
        self.retired.lock().clear();
        let names: Vec<String> = self.registry.names().map(str::to_owned).collect();
        self.teardown_members(names.iter().map(String::as_str)).await;
        tracing::info!(providers = names.len(), "tool providers shut down");
    }
}

/// A bundle succeeds when every required member is reachable and at least
/// one member is.
fn judge(statuses: &[ProviderStatus]) -> Result<(), String> {
    if let Some(down) = statuses.iter().find(|s| s.required && !s.reachable) {
        return Err(format!(
            "required provider {} unreachable: {}",
            down.name,
            down.error.as_deref().unwrap_or("unknown error")
        ));
    }
    if !statuses.iter().any(|s| s.reachable) {
        return Err("no provider in bundle is reachable".to_owned());
    }
    Ok(())
}

fn reachable_names(statuses: &[ProviderStatus]) -> Vec<String> {
    statuses
        .iter()
        .filter(|s| s.reachable)
        .map(|s| s.name.clone())
        .collect()
}
