use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{ChatEnvelope, EventContext, EventDispatcher, TransportError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Pull-based source of updates. `next_envelope` returning `None` means the stream ended.
#[async_trait]
pub trait UpdateTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError>;
    async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct PollingRunner {
    transport: Arc<dyn UpdateTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl PollingRunner {
    pub fn new(
        transport: Arc<dyn UpdateTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Pumps updates until the stream ends or reconnects are exhausted. Consecutive failures
    /// are counted; a session that delivered at least one update resets the count.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let mut delivered = false;
            match self.connect_and_pump(attempt, &mut delivered).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    if delivered {
                        attempt = 0;
                    }
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "chat transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "chat transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn connect_and_pump(&self, attempt: u32, delivered: &mut bool) -> Result<(), TransportError> {
        info!(attempt, "opening chat transport");
        self.transport.connect().await?;
        info!(attempt, "chat transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "chat transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            *delivered = true;
            let correlation_id = format!("upd-{}", envelope.update_id);
            let user_id = envelope.event.user().map(|user| user.id);

            info!(
                event_name = "ingress.chat.update_received",
                update_id = envelope.update_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %correlation_id,
                user_id = ?user_id,
                "received chat update"
            );

            if let Err(error) = self.transport.acknowledge(envelope.update_id).await {
                warn!(
                    event_name = "ingress.chat.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    error = %error,
                    "failed to acknowledge chat update"
                );
            } else {
                debug!(
                    event_name = "ingress.chat.ack_sent",
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    "acknowledged chat update"
                );
            }

            let context = EventContext { correlation_id: correlation_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    update_id = envelope.update_id,
                    correlation_id = %correlation_id,
                    user_id = ?user_id,
                    error = %error,
                    "event dispatch failed; continuing polling loop"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{PollingRunner, ReconnectPolicy, UpdateTransport};
    use crate::events::{
        ChatEnvelope, ChatEvent, ChatEventType, ChatUser, EventContext, EventDispatcher,
        EventHandler, EventHandlerError, HandlerResult, TextMessage, TransportError,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<ChatEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<i64>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<ChatEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<i64> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait]
    impl UpdateTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<ChatEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, update_id: i64) -> Result<(), TransportError> {
            self.state.lock().await.acknowledgements.push(update_id);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.state.lock().await.disconnect_calls += 1;
            Ok(())
        }
    }

    struct Collecting(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl EventHandler for Collecting {
        fn event_type(&self) -> ChatEventType {
            ChatEventType::Text
        }

        async fn handle(
            &self,
            envelope: &ChatEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let ChatEvent::Text(message) = &envelope.event else {
                return Ok(HandlerResult::Ignored);
            };
            if message.text == "falla" {
                return Err(EventHandlerError::Message("boom".to_owned()));
            }
            self.0.lock().await.push(message.text.clone());
            Ok(HandlerResult::Accepted)
        }
    }

    fn text(update_id: i64, body: &str) -> Result<Option<ChatEnvelope>, TransportError> {
        Ok(Some(ChatEnvelope {
            update_id,
            event: ChatEvent::Text(TextMessage {
                chat_id: 10,
                user: ChatUser { id: 42, display_name: None },
                text: body.to_owned(),
            }),
        }))
    }

    fn quick(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![text(1, "hola"), Ok(None)],
        ));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), quick(2));
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec![1]);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_end_without_error() {
        let failures = (0..4).map(|_| Err(TransportError::Connect("refused".to_owned()))).collect();
        let transport = Arc::new(ScriptedTransport::with_script(failures, Vec::new()));

        let runner = PollingRunner::new(transport.clone(), EventDispatcher::default(), quick(2));
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_loop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Collecting(seen.clone()));
        let transport = Arc::new(ScriptedTransport::with_script(
            Vec::new(),
            vec![text(1, "hola"), text(2, "falla"), text(3, "para 6 metros"), Ok(None)],
        ));

        PollingRunner::new(transport.clone(), dispatcher, quick(0)).start().await.expect("runner");

        assert_eq!(*seen.lock().await, vec!["hola".to_owned(), "para 6 metros".to_owned()]);
        assert_eq!(transport.acknowledgements().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn delivered_updates_reset_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::with_script(
            Vec::new(),
            vec![
                text(1, "hola"),
                Err(TransportError::Receive("timeout".to_owned())),
                text(2, "sigo aquí"),
                Err(TransportError::Receive("timeout".to_owned())),
                Ok(None),
            ],
        ));

        PollingRunner::new(transport.clone(), EventDispatcher::default(), quick(1)).start().await.expect("runner");

        assert_eq!(transport.connect_attempts().await, 3);
        assert_eq!(transport.acknowledgements().await, vec![1, 2]);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(10).as_millis(), 5_000);
    }
}
