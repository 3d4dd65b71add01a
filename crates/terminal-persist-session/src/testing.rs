//! Test doubles for the persistence service.
//!
//! [`ScriptedTerminalManager`] is an in-memory terminal manager whose
//! failures can be scripted and whose calls are recorded.
//! [`LoopbackSurface`] wires a surface cache to a serialization channel
//! in-process.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use terminal_persist_core::{CompanionKind, Error, Result, SurfaceSettings, TerminalId};
use terminal_persist_storage::{optimize_scrollback, split_lines, SessionCodec};
use terminal_persist_surface::{
    CacheManager, ScrollbackBuffer, SerializationChannel, SurfaceEndpoint, SurfaceLink,
};

use crate::manager::{
    CreateTerminalOptions, DeleteOptions, DeleteOutcome, ScrollbackOptions, TerminalInfo,
    TerminalManager,
};

/// A recorded `create_terminal` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    /// When the call was made
    pub at: Instant,
    /// Options passed
    pub options: CreateTerminalOptions,
}

#[derive(Debug, Default)]
struct ScriptState {
    terminals: Vec<TerminalInfo>,
    active: Option<TerminalId>,
    next_id: u64,
    scrollback: HashMap<TerminalId, String>,
    fail_names: HashSet<String>,
    fail_deletes: HashSet<TerminalId>,
    create_calls: Vec<CreateCall>,
    active_calls: Vec<TerminalId>,
    inputs: Vec<(TerminalId, String)>,
    deleted: Vec<TerminalId>,
    create_delay: Option<Duration>,
}

impl ScriptState {
    fn allocate(&mut self, name: &str, ordinal_number: u32, working_directory: String) -> TerminalId {
        self.next_id += 1;
        let id = TerminalId::new(format!("term-{}", self.next_id));
        self.terminals.push(TerminalInfo {
            id: id.clone(),
            name: name.to_string(),
            ordinal_number,
            working_directory,
            is_active: false,
            companion_process_type: None,
            last_activity: Utc::now(),
        });
        id
    }
}

/// In-memory terminal manager with scripted failures.
#[derive(Debug, Default)]
pub struct ScriptedTerminalManager {
    state: Mutex<ScriptState>,
    surface: Option<Arc<CacheManager>>,
}

impl ScriptedTerminalManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager that registers a surface buffer for every terminal
    /// it creates.
    pub fn with_surface(cache: Arc<CacheManager>) -> Self {
        Self {
            state: Mutex::default(),
            surface: Some(cache),
        }
    }

    /// Open a live terminal with some scrollback.
    pub async fn open(&self, name: &str, scrollback: &str) -> TerminalId {
        let id = {
            let mut state = self.lock();
            let ordinal = state.terminals.len() as u32 + 1;
            let id = state.allocate(name, ordinal, String::new());
            state.scrollback.insert(id.clone(), scrollback.to_string());
            id
        };
        if let Some(cache) = &self.surface {
            let buffer = ScrollbackBuffer::new();
            buffer.append(scrollback);
            cache.register(id.clone(), Arc::new(buffer)).await;
        }
        id
    }

    /// Tag a live terminal with a companion process.
    pub fn set_companion(&self, id: &TerminalId, kind: CompanionKind) {
        let mut state = self.lock();
        if let Some(t) = state.terminals.iter_mut().find(|t| &t.id == id) {
            t.companion_process_type = Some(kind);
        }
    }

    /// Set the working directory of a live terminal.
    pub fn set_working_directory(&self, id: &TerminalId, dir: &str) {
        let mut state = self.lock();
        if let Some(t) = state.terminals.iter_mut().find(|t| &t.id == id) {
            t.working_directory = dir.to_string();
        }
    }

    /// Refuse to create terminals with this name.
    pub fn fail_creation_for(&self, name: &str) {
        self.lock().fail_names.insert(name.to_string());
    }

    /// Refuse to delete this terminal.
    pub fn fail_delete_for(&self, id: &TerminalId) {
        self.lock().fail_deletes.insert(id.clone());
    }

    /// Make every creation take this long.
    pub fn set_create_delay(&self, delay: Duration) {
        self.lock().create_delay = Some(delay);
    }

    /// Recorded creation calls.
    pub fn create_calls(&self) -> Vec<CreateCall> {
        self.lock().create_calls.clone()
    }

    /// Recorded `set_active_terminal` calls.
    pub fn active_calls(&self) -> Vec<TerminalId> {
        self.lock().active_calls.clone()
    }

    /// Recorded input.
    pub fn inputs(&self) -> Vec<(TerminalId, String)> {
        self.lock().inputs.clone()
    }

    /// Terminals deleted so far.
    pub fn deleted(&self) -> Vec<TerminalId> {
        self.lock().deleted.clone()
    }

    /// Number of live terminals.
    pub fn terminal_count(&self) -> usize {
        self.lock().terminals.len()
    }

    /// Live terminal by ID.
    pub fn terminal(&self, id: &TerminalId) -> Option<TerminalInfo> {
        self.lock().terminals.iter().find(|t| &t.id == id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TerminalManager for ScriptedTerminalManager {
    async fn create_terminal(&self, options: CreateTerminalOptions) -> Option<TerminalId> {
        let delay = {
            let mut state = self.lock();
            state.create_calls.push(CreateCall {
                at: Instant::now(),
                options: options.clone(),
            });
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let id = {
            let mut state = self.lock();
            if state.fail_names.contains(&options.name) {
                return None;
            }
            state.allocate(
                &options.name,
                options.ordinal_number,
                options.working_directory.unwrap_or_default(),
            )
        };
        if let Some(cache) = &self.surface {
            cache
                .register(id.clone(), Arc::new(ScrollbackBuffer::new()))
                .await;
        }
        Some(id)
    }

    async fn delete_terminal(&self, id: &TerminalId, _options: DeleteOptions) -> DeleteOutcome {
        {
            let mut state = self.lock();
            if state.fail_deletes.contains(id) {
                return DeleteOutcome::refused("process refused to exit");
            }
            let before = state.terminals.len();
            state.terminals.retain(|t| &t.id != id);
            if state.terminals.len() == before {
                return DeleteOutcome::refused("no such terminal");
            }
            state.scrollback.remove(id);
            state.deleted.push(id.clone());
            if state.active.as_ref() == Some(id) {
                state.active = None;
            }
        }
        if let Some(cache) = &self.surface {
            cache.remove(id).await;
        }
        DeleteOutcome::deleted()
    }

    async fn set_active_terminal(&self, id: &TerminalId) {
        let mut state = self.lock();
        state.active_calls.push(id.clone());
        if state.terminals.iter().any(|t| &t.id == id) {
            state.active = Some(id.clone());
        }
    }

    async fn terminals(&self) -> Vec<TerminalInfo> {
        let state = self.lock();
        state
            .terminals
            .iter()
            .cloned()
            .map(|mut t| {
                t.is_active = state.active.as_ref() == Some(&t.id);
                t
            })
            .collect()
    }

    async fn active_terminal_id(&self) -> Option<TerminalId> {
        self.lock().active.clone()
    }

    async fn send_input(&self, id: &TerminalId, text: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.terminals.iter().any(|t| &t.id == id) {
            return Err(Error::TerminalNotFound(id.to_string()));
        }
        state.inputs.push((id.clone(), text.to_string()));
        Ok(())
    }

    async fn scrollback_data(&self, id: &TerminalId, options: ScrollbackOptions) -> Option<String> {
        let state = self.lock();
        let text = state.scrollback.get(id)?;
        Some(match options.scrollback {
            Some(limit) => optimize_scrollback(split_lines(text), limit).join("\n"),
            None => text.clone(),
        })
    }
}

/// A surface cache connected to a serialization channel in-process.
#[derive(Debug)]
pub struct LoopbackSurface {
    cache: Arc<CacheManager>,
    endpoint: SurfaceEndpoint,
    link: SurfaceLink,
}

impl LoopbackSurface {
    /// Create a surface with default settings and attach it to `channel`.
    pub fn connect(channel: Arc<SerializationChannel>) -> Self {
        let cache = Arc::new(CacheManager::new(
            SurfaceSettings::default(),
            SessionCodec::gzip(),
        ));
        let endpoint = SurfaceEndpoint::new(Arc::clone(&cache));
        let link = SurfaceLink::connect(channel, endpoint.clone());
        Self {
            cache,
            endpoint,
            link,
        }
    }

    /// The surface cache.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// The endpoint serving the channel.
    pub fn endpoint(&self) -> &SurfaceEndpoint {
        &self.endpoint
    }

    /// Detach from the channel.
    pub async fn disconnect(self) {
        self.link.disconnect().await;
    }
}
