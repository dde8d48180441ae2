//! Analytics events and the hooks they are dispatched to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::events::SessionStartDetail;
use super::isolation::call_isolated;
use super::types::{FallbackReason, SourceKind};

/// Payload handed to analytics hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AnalyticsEvent {
    #[serde(rename = "session-start")]
    SessionStart(SessionStartDetail),
    #[serde(rename = "fallback")]
    Fallback { reason: FallbackReason },
    #[serde(rename = "sourcechange")]
    SourceChange { source: Option<SourceKind> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl AnalyticsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyticsEvent::SessionStart(_) => "session-start",
            AnalyticsEvent::Fallback { .. } => "fallback",
            AnalyticsEvent::SourceChange { .. } => "sourcechange",
            AnalyticsEvent::Error { .. } => "error",
        }
    }
}

type GenericHook = Arc<dyn Fn(&str, &AnalyticsEvent) + Send + Sync>;
type NamedHook = Arc<dyn Fn(&AnalyticsEvent) + Send + Sync>;

/// Consumer callbacks for analytics: one generic hook plus optional per-name hooks.
#[derive(Clone, Default)]
pub struct AnalyticsHooks {
    on_event: Option<GenericHook>,
    named: HashMap<String, NamedHook>,
}

impl AnalyticsHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_event<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &AnalyticsEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(hook));
        self
    }

    pub fn on<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&AnalyticsEvent) + Send + Sync + 'static,
    {
        self.named.insert(name.into(), Arc::new(hook));
        self
    }

    /// Invokes the generic hook, then the hook registered for the event's name.
    pub fn dispatch(&self, event: &AnalyticsEvent) {
        let name = event.name();
        if let Some(hook) = &self.on_event {
            call_isolated("analytics.on_event", || hook(name, event));
        }
        if let Some(hook) = self.named.get(name) {
            call_isolated(name, || hook(event));
        }
    }
}

impl fmt::Debug for AnalyticsHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut named: Vec<&String> = self.named.keys().collect();
        named.sort();
        f.debug_struct("AnalyticsHooks")
            .field("on_event", &self.on_event.is_some())
            .field("named", &named)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_dispatch_calls_generic_and_named_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let generic = Arc::clone(&calls);
        let named = Arc::clone(&calls);
        let hooks = AnalyticsHooks::new()
            .on_event(move |name, _| generic.lock().push(format!("generic:{name}")))
            .on("fallback", move |_| named.lock().push("named:fallback".to_string()));

        hooks.dispatch(&AnalyticsEvent::Fallback {
            reason: FallbackReason::Timeout,
        });
        hooks.dispatch(&AnalyticsEvent::Error {
            message: "x".to_string(),
        });

        assert_eq!(
            *calls.lock(),
            vec!["generic:fallback", "named:fallback", "generic:error"]
        );
    }

    #[test]
    fn test_panicking_hook_does_not_propagate() {
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);
        let hooks = AnalyticsHooks::new()
            .on_event(|_, _| panic!("analytics backend down"))
            .on("sourcechange", move |_| *flag.lock() = true);

        hooks.dispatch(&AnalyticsEvent::SourceChange { source: None });

        assert!(*reached.lock());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(AnalyticsEvent::Fallback {
            reason: FallbackReason::PlayError,
        })
        .unwrap();

        assert_eq!(json["type"], "fallback");
        assert_eq!(json["reason"], "play-error");
    }
}
