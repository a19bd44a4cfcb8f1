//! Scripted backend and recording notifier for agent tests

#![allow(dead_code)]

use async_trait::async_trait;
use codex_acp::backend::{Backend, EventStream, Thread, ThreadEvent, ThreadItem, ThreadOptions};
use codex_acp::error::{BackendError, Result};
use agent_client_protocol::{SessionNotification, SessionUpdate};
use codex_acp::render::block_text;
use codex_acp::SessionNotifier;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// One scripted step of a turn
#[derive(Debug)]
pub enum Step {
    Event(ThreadEvent),
    Raw(&'static str),
    Fail(BackendError),
    /// Never yields; only cancellation ends the turn
    Hang,
}

pub fn event(json: &str) -> Step {
    Step::Event(serde_json::from_str(json).expect("valid event"))
}

pub fn item_started(item: ThreadItem) -> Step {
    Step::Event(ThreadEvent::ItemStarted { item })
}

pub fn item_updated(item: ThreadItem) -> Step {
    Step::Event(ThreadEvent::ItemUpdated { item })
}

pub fn item_completed(item: ThreadItem) -> Step {
    Step::Event(ThreadEvent::ItemCompleted { item })
}

pub fn turn_completed() -> Step {
    Step::Event(ThreadEvent::TurnCompleted { usage: None })
}

pub fn message(id: &str, text: &str) -> ThreadItem {
    ThreadItem::AgentMessage {
        id: id.to_string(),
        text: text.to_string(),
    }
}

/// Shared view of everything the scripted backend saw
#[derive(Default)]
pub struct Script {
    turns: Mutex<VecDeque<Vec<Step>>>,
    pub prompts: Mutex<Vec<String>>,
    pub thread_options: Mutex<Vec<ThreadOptions>>,
    closes: AtomicUsize,
    exhausted: AtomicUsize,
    pub turn_started: Notify,
}

impl Script {
    pub fn push_turn(&self, steps: Vec<Step>) {
        self.turns.lock().push_back(steps);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn exhausted_count(&self) -> usize {
        self.exhausted.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub script: Arc<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for ScriptedBackend {
    fn start_thread(&self, options: ThreadOptions) -> Arc<dyn Thread> {
        self.script.thread_options.lock().push(options);
        Arc::new(ScriptedThread {
            script: Arc::clone(&self.script),
        })
    }
}

struct ScriptedThread {
    script: Arc<Script>,
}

#[async_trait]
impl Thread for ScriptedThread {
    fn id(&self) -> Option<String> {
        None
    }

    async fn run_streamed(
        &self,
        input: &str,
    ) -> std::result::Result<Box<dyn EventStream>, BackendError> {
        self.script.prompts.lock().push(input.to_string());
        let steps = self.script.turns.lock().pop_front().unwrap_or_default();
        self.script.turn_started.notify_one();
        Ok(Box::new(ScriptedStream {
            script: Arc::clone(&self.script),
            steps: steps.into(),
            closed: false,
        }))
    }
}

struct ScriptedStream {
    script: Arc<Script>,
    steps: VecDeque<Step>,
    closed: bool,
}

#[async_trait]
impl EventStream for ScriptedStream {
    async fn next_event(&mut self) -> Option<std::result::Result<ThreadEvent, BackendError>> {
        if self.closed {
            return None;
        }
        match self.steps.pop_front() {
            Some(Step::Event(event)) => Some(Ok(event)),
            Some(Step::Raw(line)) => Some(serde_json::from_str(line).map_err(BackendError::from)),
            Some(Step::Fail(error)) => Some(Err(error)),
            Some(Step::Hang) => std::future::pending().await,
            None => {
                self.script.exhausted.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    async fn close(&mut self) -> std::result::Result<(), BackendError> {
        self.closed = true;
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects every session update the agent emits
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<SessionNotification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<SessionNotification> {
        self.notifications.lock().clone()
    }

    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.notifications().into_iter().map(|n| n.update).collect()
    }

    /// Text of every agent message chunk, in order
    pub fn messages(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|update| match update {
                SessionUpdate::AgentMessageChunk(chunk) => {
                    block_text(&chunk.content).map(str::to_string)
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionNotifier for RecordingNotifier {
    async fn session_update(&self, notification: SessionNotification) -> Result<()> {
        self.notifications.lock().push(notification);
        Ok(())
    }
}
