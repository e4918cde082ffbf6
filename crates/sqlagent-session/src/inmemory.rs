use super::*;
use sqlagent_core::Error;
use std::sync::RwLock;
use uuid::Uuid;

/// Session service keeping everything in process memory
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<String, Arc<InMemorySession>>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn not_found(session_id: &str) -> Error {
        Error::SessionError(format!("Session {} not found", session_id))
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn get(&self, req: &GetRequest) -> Result<Arc<dyn Session>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(&req.session_id)
            .filter(|s| s.app_name == req.app_name && s.user_id == req.user_id)
            .cloned()
            .map(|s| s as Arc<dyn Session>)
            .ok_or_else(|| Self::not_found(&req.session_id))
    }

    async fn create(&self, req: &CreateRequest) -> Result<Arc<dyn Session>> {
        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let session = Arc::new(InMemorySession {
            id: session_id.clone(),
            app_name: req.app_name.clone(),
            user_id: req.user_id.clone(),
            events: RwLock::new(Vec::new()),
            state: RwLock::new(req.state.clone()),
        });

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.contains_key(&session_id) {
            return Err(Error::SessionError(format!(
                "Session {} already exists",
                session_id
            )));
        }
        sessions.insert(session_id.clone(), session.clone());

        tracing::debug!(session_id = %session_id, user_id = %req.user_id, "Created session");
        Ok(session as Arc<dyn Session>)
    }

    async fn append_event(&self, session_id: &str, event: Event) -> Result<()> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let session = sessions
            .get(session_id)
            .ok_or_else(|| Self::not_found(session_id))?;

        if !event.actions.state_delta.is_empty() {
            let mut state = session.state.write().unwrap_or_else(|e| e.into_inner());
            for (key, value) in &event.actions.state_delta {
                state.insert(key.clone(), value.clone());
            }
        }
        session
            .events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(session_id))
    }
}

pub struct InMemorySession {
    id: String,
    app_name: String,
    user_id: String,
    events: RwLock<Vec<Event>>,
    state: RwLock<HashMap<String, serde_json::Value>>,
}

impl Session for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn app_name(&self) -> &str {
        &self.app_name
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn events(&self) -> Vec<Event> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn state(&self) -> HashMap<String, serde_json::Value> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
