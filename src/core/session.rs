//! Async driver for [`WorkflowState`].
//!
//! The session owns the state and is the only thing that mutates it. Commands
//! that need I/O run as tokio tasks and report back through a channel; their
//! results are applied one at a time by [`CaptionSession::next_completion`].

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::core::caption::{CaptionClient, CaptionError};
use crate::core::data_url::{self, EncodeError};
use crate::core::workflow::{Command, Event, Notification, WorkflowState};
use crate::store::HistoryStore;

/// Presentation side of the workflow.
pub trait WorkflowObserver: Send {
    fn notify(&mut self, notification: &Notification);

    fn open_file_chooser(&mut self) {}
}

pub struct CaptionSession<O: WorkflowObserver> {
    state: WorkflowState,
    captioner: Arc<dyn CaptionClient>,
    history: Option<Arc<dyn HistoryStore>>,
    observer: O,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    in_flight: usize,
}

impl<O: WorkflowObserver> CaptionSession<O> {
    pub fn new(captioner: Arc<dyn CaptionClient>, observer: O) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: WorkflowState::new(),
            captioner,
            history: None,
            observer,
            tx,
            rx,
            in_flight: 0,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Applies a user event and starts whatever work it asks for.
    pub fn dispatch(&mut self, event: Event) {
        let commands = self.state.apply(event);
        for command in commands {
            self.execute(command);
        }
    }

    /// Waits for the next background result and applies it. Returns `false`
    /// when nothing is pending.
    pub async fn next_completion(&mut self) -> bool {
        if self.in_flight == 0 {
            return false;
        }
        match self.rx.recv().await {
            Some(event) => {
                self.in_flight -= 1;
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Drains background work until the session is idle.
    pub async fn settle(&mut self) {
        while self.next_completion().await {}
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Notify(notification) => self.observer.notify(&notification),
            Command::OpenFileChooser => self.observer.open_file_chooser(),
            Command::Encode { attempt, file } => {
                let source_name = file.display_name();
                self.spawn(
                    async move {
                        match data_url::encode(&file).await {
                            Ok(data_url) => Event::Encoded { attempt, data_url },
                            Err(error) => Event::EncodeFailed { attempt, error },
                        }
                    },
                    move |message| Event::EncodeFailed {
                        attempt,
                        error: EncodeError::ReadError {
                            source_name,
                            message,
                        },
                    },
                );
            }
            Command::RequestCaption { attempt, request } => {
                let captioner = self.captioner.clone();
                self.spawn(
                    async move {
                        let result = captioner.generate_caption(request).await;
                        Event::CaptionResolved { attempt, result }
                    },
                    move |message| Event::CaptionResolved {
                        attempt,
                        result: Err(CaptionError::Generation(message)),
                    },
                );
            }
            Command::SaveHistory { attempt, record } => {
                let failed = move |message| Event::SaveResolved {
                    attempt,
                    result: Err(message),
                };
                let Some(history) = self.history.clone() else {
                    warn!("save requested but no history store is configured");
                    self.spawn(
                        async move { failed("no history store configured".to_string()) },
                        failed,
                    );
                    return;
                };
                self.spawn(
                    async move {
                        let result = history.save(record).await.map_err(|e| e.to_string());
                        Event::SaveResolved { attempt, result }
                    },
                    failed,
                );
            }
        }
    }

    /// Runs `work` in the background. If it panics or is cancelled, the event
    /// built by `on_abort` is delivered in its place so the attempt still
    /// resolves.
    fn spawn<F, A>(&mut self, work: F, on_abort: A)
    where
        F: Future<Output = Event> + Send + 'static,
        A: FnOnce(String) -> Event + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match tokio::spawn(work).await {
                Ok(event) => event,
                Err(err) => {
                    error!(error = %err, "background task aborted");
                    on_abort(format!("Background task failed: {}", err))
                }
            };
            if tx.send(event).is_err() {
                debug!("session dropped before background work finished");
            }
        });
    }
}
