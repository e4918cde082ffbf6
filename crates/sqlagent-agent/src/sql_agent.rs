//! The SQL agent: fixed prompt, fixed tool set, single-turn invocation

use crate::llm_agent::LLMAgent;
use futures::stream::{Stream, StreamExt};
use sqlagent_core::{
    Agent, AgentConfig, Content, Error, Event, InvocationContext, LLM, Result, Tool,
};
use sqlagent_database_tools::{create_sql_tools, DatabaseToolConfig, SqlDatabase};
use sqlagent_telemetry::safe_serialize;
use std::sync::Arc;

/// System prompt for the SQL agent; `{tools}` is replaced by the tool list
pub const SQL_AGENT_PROMPT: &str = "\
You are an agent designed to interact with a SQL database.
Analyze the input and provide answers appropriately.
If the input is regarding the SQLite database, create a syntactically correct SQLite query to run,
then look at the results of the query and return the answer using appropriate tools.

Guidelines:
- Unless the user specifies a specific number of examples, always limit your query to at most 10 results.
- Order the results by a relevant column to return the most interesting examples in the database.
- Never query for all the columns from a specific table; only ask for the relevant columns given the question.
- Use only the tools provided below to interact with the database.
- Double-check your query before executing it. If you encounter an error, rewrite the query and try again.
- Do NOT make any DML statements (INSERT, UPDATE, DELETE, DROP, etc.) to the database.

Steps:
1. Always start by looking at the tables in the database to see what you can query. Do NOT skip this step.
2. Query the schema of the most relevant tables.
3. Show the output in Markdown tables.

Tools to be used:
{tools}
";

/// Fill the tool list into `SQL_AGENT_PROMPT`
pub fn render_system_prompt(tools: &[Arc<dyn Tool>]) -> String {
    let listing: Vec<String> = tools
        .iter()
        .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
        .collect();
    SQL_AGENT_PROMPT.replace("{tools}", &listing.join("\n"))
}

/// Build the SQL agent over `db` with the three database tools
pub fn init_agent(db: Arc<SqlDatabase>, llm: Arc<dyn LLM>, config: &AgentConfig) -> Result<LLMAgent> {
    let tools = create_sql_tools(db.clone(), &DatabaseToolConfig::from(config))?;
    for tool in &tools {
        tracing::info!(tool = tool.name(), "Tool Loaded: {}", tool.name());
    }

    LLMAgent::builder()
        .name("sql_agent")
        .description(format!("Answers questions about the {} database", db.name()))
        .system_instruction(render_system_prompt(&tools))
        .model(llm)
        .tools(tools)
        .max_iterations(config.max_iterations)
        .build()
}

/// Context for a one-off invocation outside any session
pub struct SingleTurnContext {
    invocation_id: String,
    session_id: String,
    user_content: Content,
}

impl SingleTurnContext {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4().to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
            user_content: Content::new_user_text(prompt),
        }
    }
}

impl InvocationContext for SingleTurnContext {
    fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn user_content(&self) -> Option<&Content> {
        Some(&self.user_content)
    }
}

/// Run `agent` on `prompt` alone and return the text of its last message
pub async fn get_agent_response(agent: &dyn Agent, prompt: &str) -> Result<String> {
    let ctx: Arc<dyn InvocationContext> = Arc::new(SingleTurnContext::new(prompt));
    final_answer(agent.run(ctx).await).await
}

/// Drain an agent event stream and return the text of the last model message
/// that made no tool calls
///
/// Partial events are skipped. An event carrying an error message (such as
/// a cancelled run) fails the answer.
pub async fn final_answer<S>(mut events: S) -> Result<String>
where
    S: Stream<Item = Result<Event>> + Unpin,
{
    let mut answer: Option<String> = None;

    while let Some(event) = events.next().await {
        let event = event?;
        if event.partial {
            continue;
        }
        tracing::debug!(event = %safe_serialize(&event), "Agent event");
        if !event.error_message.is_empty() {
            return Err(Error::LLMError(event.error_message));
        }
        if let Some(content) = &event.content {
            answer = if content.role == Content::ROLE_MODEL && content.function_calls().is_empty() {
                content.text()
            } else {
                None
            };
        }
    }

    answer
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::LLMError("Agent returned an empty response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLM;
    use sqlagent_database_tools::{csv_to_sqlite, LIST_TABLES_TOOL, QUERY_TOOL, SCHEMA_TOOL};
    use tempfile::TempDir;

    async fn database(dir: &TempDir) -> Arc<SqlDatabase> {
        let path = dir.path().join("employees.db");
        csv_to_sqlite(
            b"name,department,salary\nAda,Engineering,120\nGrace,Engineering,130\nLinus,Support,90\n",
            &path,
            "data",
        )
        .await
        .unwrap();
        Arc::new(SqlDatabase::open(&path).await.unwrap())
    }

    #[test]
    fn test_prompt_lists_tools() {
        let prompt = render_system_prompt(&[]);
        assert!(prompt.contains("always limit your query to at most 10 results"));
        assert!(prompt.contains("Do NOT make any DML statements"));
        assert!(prompt.contains("Show the output in Markdown tables."));
        assert!(!prompt.contains("{tools}"));
    }

    #[tokio::test]
    async fn test_init_agent_has_exactly_three_tools() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![]));

        let agent = init_agent(database(&dir).await, llm, &AgentConfig::default()).unwrap();

        assert_eq!(agent.tool_names(), vec![LIST_TABLES_TOOL, SCHEMA_TOOL, QUERY_TOOL]);
        let prompt = agent.system_instruction().unwrap();
        assert!(prompt.contains("- sql_db_list_tables: "));
        assert!(prompt.contains("- sql_db_query: "));
        assert_eq!(agent.max_iterations(), 10);
    }

    #[tokio::test]
    async fn test_get_agent_response_runs_tools() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![
            ScriptedLLM::call(LIST_TABLES_TOOL, serde_json::json!({})),
            ScriptedLLM::call(
                QUERY_TOOL,
                serde_json::json!({"query": "SELECT department, AVG(salary) AS avg_salary FROM data GROUP BY department ORDER BY avg_salary DESC LIMIT 10"}),
            ),
            ScriptedLLM::text("| department | avg_salary |\n|---|---|\n| Engineering | 125.0 |\n| Support | 90.0 |"),
        ]));

        let agent = init_agent(database(&dir).await, llm.clone(), &AgentConfig::default()).unwrap();
        let answer = get_agent_response(&agent, "Average salary per department?")
            .await
            .unwrap();

        assert!(answer.contains("| Engineering | 125.0 |"));

        let requests = llm.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].contents.len(), 1);
        let tables_reply = &requests[1].contents[2];
        assert_eq!(tables_reply.role, "function");
        let query_reply = serde_json::to_value(&requests[2].contents[4]).unwrap();
        assert_eq!(
            query_reply["parts"][0]["functionResponse"]["response"]["rows"][0],
            serde_json::json!(["Engineering", 125.0])
        );
    }

    #[tokio::test]
    async fn test_get_agent_response_surfaces_model_errors() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![]));
        let agent = init_agent(database(&dir).await, llm, &AgentConfig::default()).unwrap();

        let err = get_agent_response(&agent, "anything").await.unwrap_err();
        assert!(err.to_string().contains("script exhausted"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_an_error() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedLLM::text("   ")]));
        let agent = init_agent(database(&dir).await, llm, &AgentConfig::default()).unwrap();

        assert!(get_agent_response(&agent, "hello").await.is_err());
    }

    #[tokio::test]
    async fn test_sampling_is_left_to_the_model() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(vec![ScriptedLLM::text("Three tables.")]));
        let agent = init_agent(database(&dir).await, llm.clone(), &AgentConfig::default()).unwrap();

        get_agent_response(&agent, "How many tables?").await.unwrap();

        let requests = llm.requests();
        let temperature = requests[0].config.as_ref().and_then(|c| c.temperature);
        assert_eq!(temperature, None);
    }

    fn model_event(text: &str) -> Event {
        let mut event = Event::new("inv".to_string(), "sql_agent".to_string());
        event.content = Some(Content::new_model_text(text));
        event.turn_complete = true;
        event
    }

    #[tokio::test]
    async fn test_final_answer_takes_last_model_text() {
        let mut partial = model_event("Ther");
        partial.partial = true;
        let events = futures::stream::iter(vec![
            Ok(partial),
            Ok(model_event("There are 3 employees.")),
        ]);

        assert_eq!(final_answer(events).await.unwrap(), "There are 3 employees.");
    }

    #[tokio::test]
    async fn test_final_answer_fails_on_error_event() {
        let mut cancelled = Event::new("inv".to_string(), "system".to_string());
        cancelled.error_code = "CANCELLED".to_string();
        cancelled.error_message = "Invocation cancelled".to_string();
        let events = futures::stream::iter(vec![Ok(model_event("partial answer")), Ok(cancelled)]);

        let err = final_answer(events).await.unwrap_err();
        assert!(err.to_string().contains("Invocation cancelled"));
    }
}
