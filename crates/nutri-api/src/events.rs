//! Process-wide push-event channel.
//!
//! The API publishes agent events for *every* in-flight generation task on a
//! single WebSocket endpoint. [`EventBus`] owns at most one upstream
//! connection and fans frames out to any number of [`Subscription`]s; each
//! subscriber filters for the task it cares about.
//!
//! ```text
//! ws://.../ws/agents --pump--> broadcast::Sender<EventFrame>
//!                                   |            |
//!                              Subscription  Subscription  (filter by task id)
//! ```
//!
//! The upstream connection is opened when the first subscriber arrives and
//! closed when the last one is released.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::models::{ClinicalReport, WeeklyPlan};

const CHANNEL_CAPACITY: usize = 256;

/// Delay before the pump retries a dropped upstream connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// A single frame received on the push channel.
///
/// Frames are parsed as JSON when possible and otherwise kept as the raw
/// text. Only JSON objects can carry an [`AgentEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame {
    Json(Value),
    Raw(String),
}

impl EventFrame {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(text.to_owned()),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Json(Value::Object(_)))
    }

    /// Interpret the frame as an agent event.
    ///
    /// Returns `None` for raw text, non-object JSON, and objects that do not
    /// have the event shape.
    pub fn agent_event(&self) -> Option<AgentEvent> {
        match self {
            Self::Json(value @ Value::Object(_)) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// Structured event published by the generation worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

/// Result carried by a `completed` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<WeeklyPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_report: Option<ClinicalReport>,
}

impl AgentEvent {
    pub const STARTED: &str = "started";
    pub const COMPLETED: &str = "completed";

    /// Build a `completed` plan event.
    pub fn completed(
        task_id: impl Into<String>,
        correlation_id: Option<String>,
        plan: Option<WeeklyPlan>,
        clinical_report: Option<ClinicalReport>,
    ) -> Self {
        Self {
            kind: Some("plan".to_owned()),
            event: Self::COMPLETED.to_owned(),
            correlation_id,
            profile_id: None,
            payload: Some(EventPayload {
                task_id: task_id.into(),
                plan,
                clinical_report,
            }),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.event == Self::COMPLETED
    }

    /// Task id carried in the payload, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .map(|p| p.task_id.as_str())
            .filter(|id| !id.is_empty())
    }

    pub fn to_frame(&self) -> EventFrame {
        match serde_json::to_value(self) {
            Ok(value) => EventFrame::Json(value),
            Err(e) => EventFrame::Raw(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Fan-out hub for push events. Cheap to clone; clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    tx: broadcast::Sender<EventFrame>,
    upstream: Option<Upstream>,
    state: Mutex<BusState>,
}

struct Upstream {
    url: String,
    reconnect_delay: Duration,
}

#[derive(Default)]
struct BusState {
    subscribers: usize,
    pump: Option<CancellationToken>,
}

impl EventBus {
    /// A bus with no upstream connection. Frames arrive only through
    /// [`EventBus::publish`].
    pub fn detached() -> Self {
        Self::build(None)
    }

    /// A bus fed by the WebSocket endpoint at `url`.
    pub fn websocket(url: impl Into<String>) -> Self {
        Self::websocket_with_reconnect(url, DEFAULT_RECONNECT_DELAY)
    }

    pub fn websocket_with_reconnect(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self::build(Some(Upstream {
            url: url.into(),
            reconnect_delay,
        }))
    }

    fn build(upstream: Option<Upstream>) -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                tx,
                upstream,
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Deliver a frame to every current subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, frame: EventFrame) -> usize {
        self.inner.tx.send(frame).unwrap_or(0)
    }

    /// Register a new subscriber.
    ///
    /// The first subscriber starts the upstream pump (when the bus has an
    /// upstream and a Tokio runtime is available).
    pub fn subscribe(&self) -> Subscription {
        let rx = self.inner.tx.subscribe();
        {
            let mut state = self.inner.lock_state();
            state.subscribers += 1;
            if state.pump.is_none() {
                if let Some(upstream) = &self.inner.upstream {
                    state.pump = start_pump(&self.inner.tx, upstream);
                }
            }
        }

        Subscription {
            stream: BroadcastStream::new(rx),
            bus: Arc::clone(&self.inner),
            released: false,
        }
    }

    /// Number of subscriptions that have not been released.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers
    }

    /// Whether an upstream pump is currently running.
    pub fn is_pumping(&self) -> bool {
        self.inner.lock_state().pump.is_some()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("EventBus")
            .field("upstream", &self.inner.upstream.as_ref().map(|u| u.url.as_str()))
            .field("subscribers", &state.subscribers)
            .field("pumping", &state.pump.is_some())
            .finish()
    }
}

impl BusInner {
    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut state = self.lock_state();
        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers == 0 {
            if let Some(pump) = state.pump.take() {
                tracing::debug!("last subscriber released, closing event channel");
                pump.cancel();
            }
        }
    }
}

fn start_pump(
    tx: &broadcast::Sender<EventFrame>,
    upstream: &Upstream,
) -> Option<CancellationToken> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(url = %upstream.url, "no async runtime, push events disabled");
        return None;
    };

    let cancel = CancellationToken::new();
    runtime.spawn(pump_websocket(
        upstream.url.clone(),
        tx.clone(),
        cancel.clone(),
        upstream.reconnect_delay,
    ));
    Some(cancel)
}

/// Read frames from the upstream WebSocket until cancelled, reconnecting
/// after `reconnect_delay` whenever the connection drops.
async fn pump_websocket(
    url: String,
    tx: broadcast::Sender<EventFrame>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((mut ws, _response)) => {
                tracing::info!(url = %url, "event channel connected");
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = ws.close(None).await;
                            return;
                        }
                        msg = ws.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = tx.send(EventFrame::parse(&text));
                            }
                            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                Ok(text) => {
                                    let _ = tx.send(EventFrame::parse(&text));
                                }
                                Err(_) => tracing::debug!("dropping non-UTF-8 binary frame"),
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!(url = %url, "event channel closed by server");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(url = %url, error = %e, "event channel error");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "failed to connect event channel");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A handle on the shared event stream.
///
/// Releasing is guarded: [`Subscription::unsubscribe`] takes effect once and
/// later calls are no-ops. Dropping an unreleased subscription releases it.
pub struct Subscription {
    stream: BroadcastStream<EventFrame>,
    bus: Arc<BusInner>,
    released: bool,
}

impl Subscription {
    /// Wait for the next frame. Returns `None` once released or when the
    /// bus has shut down.
    pub async fn next(&mut self) -> Option<EventFrame> {
        if self.released {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(frame)) => return Some(frame),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "event subscriber lagged, frames dropped");
                }
                None => return None,
            }
        }
    }

    /// Release this subscription. Returns `true` only for the call that
    /// actually released it.
    pub fn unsubscribe(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.bus.release();
        true
    }

    pub fn is_active(&self) -> bool {
        !self.released
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_to_raw_text() {
        assert_eq!(EventFrame::parse("not json"), EventFrame::Raw("not json".into()));
        let frame = EventFrame::parse(r#"{"event":"started"}"#);
        assert!(frame.is_object());
    }

    #[test]
    fn non_object_json_is_not_an_event() {
        let frame = EventFrame::parse(r#""completed""#);
        assert!(!frame.is_object());
        assert!(frame.agent_event().is_none());

        let frame = EventFrame::parse("[1,2,3]");
        assert!(frame.agent_event().is_none());
    }

    #[test]
    fn object_without_event_field_is_ignored() {
        let frame = EventFrame::parse(r#"{"hello":"world"}"#);
        assert!(frame.is_object());
        assert!(frame.agent_event().is_none());
    }

    #[test]
    fn completed_event_parses_payload() {
        let frame = EventFrame::parse(
            r#"{"type":"plan","event":"completed","correlation_id":"c1","profile_id":"u1",
                "has_plan":true,"payload":{"task_id":"T1","status":"success"},"timestamp":1.5}"#,
        );
        let event = frame.agent_event().expect("event shape");
        assert!(event.is_completed());
        assert_eq!(event.task_id(), Some("T1"));
        assert_eq!(event.correlation_id.as_deref(), Some("c1"));
        assert!(event.payload.unwrap().plan.is_none());
    }

    #[test]
    fn event_to_frame_roundtrip() {
        let event = AgentEvent::completed("T9", Some("c9".into()), None, None);
        let back = event.to_frame().agent_event().unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = EventBus::detached();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.publish(EventFrame::Raw("ping".into()));
        assert_eq!(delivered, 2);
        assert_eq!(a.next().await, Some(EventFrame::Raw("ping".into())));
        assert_eq!(b.next().await, Some(EventFrame::Raw("ping".into())));
    }

    #[tokio::test]
    async fn unsubscribe_is_guarded() {
        let bus = EventBus::detached();
        let mut sub = bus.subscribe();
        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(sub.next().await, None);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0, "drop after unsubscribe must not release twice");
    }

    #[tokio::test]
    async fn drop_releases_subscription() {
        let bus = EventBus::detached();
        let first = bus.subscribe();
        let _second = bus.subscribe();
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn detached_bus_never_pumps() {
        let bus = EventBus::detached();
        let _sub = bus.subscribe();
        assert!(!bus.is_pumping());
    }

    #[test]
    fn subscribe_outside_runtime_does_not_panic() {
        let bus = EventBus::websocket("ws://127.0.0.1:9/ws/agents");
        let mut sub = bus.subscribe();
        assert!(!bus.is_pumping());
        assert!(sub.unsubscribe());
    }
}
