//! Runner for executing agents inside sessions

pub mod runner;

pub use runner::{Runner, RunnerBuilder, CANCELLED_ERROR_CODE};

#[cfg(test)]
mod tests {
    use super::*;
    use async_stream::stream;
    use async_trait::async_trait;
    use futures::stream::{Stream, StreamExt};
    use sqlagent_agent::testing::{MockLLM, ScriptedLLM};
    use sqlagent_agent::LLMAgent;
    use sqlagent_core::{Agent, Content, Event, InvocationContext, Result};
    use sqlagent_session::{
        ChatMessage, GetRequest, InMemorySessionService, SessionService, GREETING,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn runner_with(agent: Arc<dyn Agent>, service: Arc<InMemorySessionService>) -> Runner {
        Runner::builder()
            .app_name("sqlagent")
            .agent(agent)
            .session_service(service)
            .build()
            .unwrap()
    }

    fn get_request() -> GetRequest {
        GetRequest {
            app_name: "sqlagent".to_string(),
            user_id: "user1".to_string(),
            session_id: "session1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_runner_persists_conversation() {
        let agent = LLMAgent::builder()
            .name("sql_agent")
            .model(Arc::new(MockLLM::with_response("There are 8 tables.")))
            .build()
            .unwrap();
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner_with(Arc::new(agent), service.clone());

        let events: Vec<Event> = runner
            .run(
                "user1".to_string(),
                "session1".to_string(),
                Content::new_user_text("How many tables?"),
            )
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 1);

        let session = service.get(&get_request()).await.unwrap();
        assert_eq!(
            session.messages(),
            vec![
                ChatMessage::assistant(GREETING),
                ChatMessage::user("How many tables?"),
                ChatMessage::assistant("There are 8 tables."),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_events_are_not_persisted() {
        let agent = LLMAgent::builder()
            .name("sql_agent")
            .model(Arc::new(
                ScriptedLLM::new(vec![ScriptedLLM::text("streamed answer text")]).streaming(),
            ))
            .build()
            .unwrap();
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner_with(Arc::new(agent), service.clone());

        let events: Vec<Event> = runner
            .run("user1".to_string(), "session1".to_string(), Content::new_user_text("go"))
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert!(events.iter().filter(|e| e.partial).count() >= 3);
        let session = service.get(&get_request()).await.unwrap();
        assert_eq!(session.events().len(), 2);
    }

    struct SlowAgent;

    #[async_trait]
    impl Agent for SlowAgent {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes"
        }

        async fn run(
            &self,
            ctx: Arc<dyn InvocationContext>,
        ) -> Box<dyn Stream<Item = Result<Event>> + Send + Unpin> {
            let invocation_id = ctx.invocation_id().to_string();
            Box::new(Box::pin(stream! {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                yield Ok(Event::new(invocation_id, "slow".to_string()));
            }))
        }
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_run() {
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner_with(Arc::new(SlowAgent), service);
        let token = CancellationToken::new();

        let mut stream = runner
            .run_with_cancellation(
                "user1".to_string(),
                "session1".to_string(),
                Content::new_user_text("wait"),
                Some(token.clone()),
            )
            .await
            .unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.error_code, CANCELLED_ERROR_CODE);
        assert!(event.interrupted);
        assert!(stream.next().await.is_none());
    }

    struct EchoTurnAgent;

    #[async_trait]
    impl Agent for EchoTurnAgent {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Repeats what its context holds"
        }

        async fn run(
            &self,
            ctx: Arc<dyn InvocationContext>,
        ) -> Box<dyn Stream<Item = Result<Event>> + Send + Unpin> {
            let prompt = ctx.user_content().and_then(|c| c.text()).unwrap_or_default();
            let mut event = Event::new(ctx.invocation_id().to_string(), "echo".to_string());
            event.content = Some(Content::new_model_text(format!(
                "{}: {}",
                ctx.session_id(),
                prompt
            )));
            Box::new(futures::stream::iter(vec![Ok(event)]))
        }
    }

    #[tokio::test]
    async fn test_agent_sees_session_and_prompt() {
        let service = Arc::new(InMemorySessionService::new());
        let runner = runner_with(Arc::new(EchoTurnAgent), service);

        let events: Vec<Event> = runner
            .run("user1".to_string(), "session1".to_string(), Content::new_user_text("list tables"))
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].model_text().as_deref(), Some("session1: list tables"));
        assert!(!events[0].invocation_id.is_empty());
    }

    #[test]
    fn test_builder_requires_agent() {
        let result = Runner::builder()
            .app_name("sqlagent")
            .session_service(Arc::new(InMemorySessionService::new()))
            .build();
        assert!(result.is_err());
    }
}
