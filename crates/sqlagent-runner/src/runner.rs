use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use sqlagent_core::{Agent, Content, Error, Event, InvocationContext, Result};
use sqlagent_session::{CreateRequest, GetRequest, SessionService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error code carried by the event emitted when a run is cancelled
pub const CANCELLED_ERROR_CODE: &str = "CANCELLED";

/// One user message being answered inside a stored session
struct SessionTurn {
    invocation_id: String,
    session_id: String,
    message: Content,
}

impl InvocationContext for SessionTurn {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn user_content(&self) -> Option<&Content> {
        Some(&self.message)
    }
}

pub struct Runner {
    app_name: String,
    agent: Arc<dyn Agent>,
    session_service: Arc<dyn SessionService>,
}

impl Runner {
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    pub async fn run(
        &self,
        user_id: String,
        session_id: String,
        message: Content,
    ) -> Result<Box<dyn Stream<Item = Result<Event>> + Send + Unpin>> {
        self.run_with_cancellation(user_id, session_id, message, None)
            .await
    }

    /// Run the agent on `message` within the session, persisting the user
    /// message and every non-partial agent event
    pub async fn run_with_cancellation(
        &self,
        user_id: String,
        session_id: String,
        message: Content,
        cancel_token: Option<CancellationToken>,
    ) -> Result<Box<dyn Stream<Item = Result<Event>> + Send + Unpin>> {
        let existing = self
            .session_service
            .get(&GetRequest {
                app_name: self.app_name.clone(),
                user_id: user_id.clone(),
                session_id: session_id.clone(),
            })
            .await;
        if existing.is_err() {
            self.session_service
                .create(&CreateRequest {
                    app_name: self.app_name.clone(),
                    user_id,
                    session_id: Some(session_id.clone()),
                    ..Default::default()
                })
                .await?;
        }

        let invocation_id = Uuid::new_v4().to_string();
        let ctx = Arc::new(SessionTurn {
            invocation_id: invocation_id.clone(),
            session_id: session_id.clone(),
            message: message.clone(),
        });

        let mut user_event = Event::new(invocation_id.clone(), "user".to_string());
        user_event.content = Some(message);
        user_event.turn_complete = true;
        self.session_service
            .append_event(&session_id, user_event)
            .await?;

        tracing::info!(
            invocation_id = %invocation_id,
            session_id = %session_id,
            agent = %self.agent.name(),
            "Running agent"
        );

        let agent = self.agent.clone();
        let session_service = self.session_service.clone();
        let cancel_token = cancel_token.unwrap_or_default();

        Ok(Box::new(Box::pin(stream! {
            let mut event_stream = agent.run(ctx).await;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => None,
                    next = event_stream.next() => Some(next),
                };

                let Some(next) = next else {
                    tracing::info!(
                        invocation_id = %invocation_id,
                        session_id = %session_id,
                        "Invocation cancelled"
                    );
                    let mut cancel_event = Event::new(invocation_id.clone(), "system".to_string());
                    cancel_event.error_code = CANCELLED_ERROR_CODE.to_string();
                    cancel_event.error_message = "Invocation cancelled".to_string();
                    cancel_event.interrupted = true;
                    cancel_event.turn_complete = true;
                    yield Ok(cancel_event);
                    return;
                };

                match next {
                    Some(Ok(event)) => {
                        if !event.partial {
                            if let Err(e) = session_service.append_event(&session_id, event.clone()).await {
                                yield Err(e);
                                return;
                            }
                        }
                        yield Ok(event);
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        return;
                    }
                    None => return,
                }
            }
        })))
    }
}

pub struct RunnerBuilder {
    app_name: Option<String>,
    agent: Option<Arc<dyn Agent>>,
    session_service: Option<Arc<dyn SessionService>>,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            app_name: None,
            agent: None,
            session_service: None,
        }
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.session_service = Some(service);
        self
    }

    pub fn build(self) -> Result<Runner> {
        let app_name = self
            .app_name
            .ok_or_else(|| Error::Other(anyhow::anyhow!("App name is required")))?;
        let agent = self
            .agent
            .ok_or_else(|| Error::Other(anyhow::anyhow!("Agent is required")))?;
        let session_service = self
            .session_service
            .ok_or_else(|| Error::Other(anyhow::anyhow!("Session service is required")))?;

        Ok(Runner {
            app_name,
            agent,
            session_service,
        })
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
