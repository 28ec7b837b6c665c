//! Upload → preview → generate → display state machine.
//!
//! The machine is a plain value. `WorkflowState::apply` takes one [`Event`],
//! mutates the state and returns the [`Command`]s the caller must execute:
//! encoding a file, calling the caption service, saving to history, opening
//! a file chooser or showing a notification. Nothing in here performs I/O.
//!
//! Every async result is tagged with the [`AttemptId`] that was current when
//! the work was started. Results for any other attempt are dropped, so a slow
//! response for a replaced image can never overwrite the newer attempt.

use tracing::debug;

use crate::core::caption::{CaptionError, CaptionParams, CaptionRequest, CaptionResult};
use crate::core::data_url::{EncodeError, SelectedFile};
use crate::core::validation::{ValidationError, validate};
use crate::store::NewHistoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Previewing,
    Ready,
    Generating,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid file type. Please upload an image.")]
    UnsupportedType { mime_type: String },

    #[error("Image is too large ({size} bytes). The maximum is {max} bytes.")]
    TooLarge { size: u64, max: u64 },

    #[error("Failed to read image: {0}")]
    ReadError(String),

    #[error("{0}")]
    GenerationError(String),

    #[error("Caption service returned an invalid response: {0}")]
    InvalidResponseShape(String),

    #[error("Failed to save image: {0}")]
    PersistenceError(String),
}

impl From<ValidationError> for WorkflowError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnsupportedType { mime_type } => {
                WorkflowError::UnsupportedType { mime_type }
            }
            ValidationError::TooLarge { size, max } => WorkflowError::TooLarge { size, max },
        }
    }
}

impl From<EncodeError> for WorkflowError {
    fn from(err: EncodeError) -> Self {
        WorkflowError::ReadError(err.to_string())
    }
}

impl From<CaptionError> for WorkflowError {
    fn from(err: CaptionError) -> Self {
        match err {
            CaptionError::Generation(message) => WorkflowError::GenerationError(message),
            CaptionError::InvalidResponseShape(message) => {
                WorkflowError::InvalidResponseShape(message)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A toast-style message for whoever presents the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    fn success(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.to_string(),
            message: message.into(),
        }
    }

    fn error(title: &str, err: &WorkflowError) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum Event {
    /// A file was chosen or dropped. Always starts a new attempt.
    FileSelected(SelectedFile),
    Encoded {
        attempt: AttemptId,
        data_url: String,
    },
    EncodeFailed {
        attempt: AttemptId,
        error: EncodeError,
    },
    ParamsChanged(CaptionParams),
    GenerateRequested,
    CaptionResolved {
        attempt: AttemptId,
        result: Result<CaptionResult, CaptionError>,
    },
    ChangeImageRequested,
    ChooserDismissed,
    SaveRequested,
    SaveResolved {
        attempt: AttemptId,
        result: Result<String, String>,
    },
}

#[derive(Debug)]
pub enum Command {
    Encode {
        attempt: AttemptId,
        file: SelectedFile,
    },
    RequestCaption {
        attempt: AttemptId,
        request: CaptionRequest,
    },
    SaveHistory {
        attempt: AttemptId,
        record: NewHistoryRecord,
    },
    OpenFileChooser,
    Notify(Notification),
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    phase: Phase,
    current: Option<AttemptId>,
    issued: u64,
    mime_type: Option<String>,
    preview: Option<String>,
    caption: Option<CaptionResult>,
    error: Option<WorkflowError>,
    params: CaptionParams,
    generated_with: Option<CaptionParams>,
    awaiting_chooser: bool,
    saving: bool,
    saved_id: Option<String>,
}

/// Pure form of [`WorkflowState::apply`].
pub fn transition(mut state: WorkflowState, event: Event) -> (WorkflowState, Vec<Command>) {
    let commands = state.apply(event);
    (state, commands)
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_attempt(&self) -> Option<AttemptId> {
        self.current
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// The encoded data URL of the current image, once encoding finished.
    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_ref().map(|c| c.caption.as_str())
    }

    pub fn hashtags(&self) -> Option<&[String]> {
        self.caption.as_ref().and_then(|c| c.hashtags.as_deref())
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub fn params(&self) -> &CaptionParams {
        &self.params
    }

    pub fn saved_id(&self) -> Option<&str> {
        self.saved_id.as_deref()
    }

    fn is_current(&self, attempt: AttemptId) -> bool {
        self.current == Some(attempt)
    }

    fn begin_attempt(&mut self) -> AttemptId {
        self.issued += 1;
        let attempt = AttemptId(self.issued);
        self.current = Some(attempt);
        attempt
    }

    fn clear_outcome(&mut self) {
        self.caption = None;
        self.error = None;
        self.saved_id = None;
        self.saving = false;
        self.generated_with = None;
    }

    fn fail(&mut self, title: &str, err: WorkflowError) -> Vec<Command> {
        let notification = Notification::error(title, &err);
        self.phase = Phase::Failed;
        self.error = Some(err);
        vec![Command::Notify(notification)]
    }

    /// The phase implied by what is currently held.
    fn settled_phase(&self) -> Phase {
        if self.error.is_some() {
            Phase::Failed
        } else if self.caption.is_some() {
            Phase::Succeeded
        } else if self.preview.is_some() {
            Phase::Ready
        } else {
            Phase::Idle
        }
    }

    pub fn apply(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::FileSelected(file) => self.on_file_selected(file),
            Event::Encoded { attempt, data_url } => {
                if !self.is_current(attempt) || self.phase != Phase::Previewing {
                    debug!(attempt = attempt.value(), "dropping stale encode result");
                    return Vec::new();
                }
                self.preview = Some(data_url);
                self.phase = Phase::Ready;
                Vec::new()
            }
            Event::EncodeFailed { attempt, error } => {
                if !self.is_current(attempt) || self.phase != Phase::Previewing {
                    debug!(attempt = attempt.value(), "dropping stale encode failure");
                    return Vec::new();
                }
                self.preview = None;
                self.fail("Read Error", error.into())
            }
            Event::ParamsChanged(params) => {
                self.params = params;
                Vec::new()
            }
            Event::GenerateRequested => self.on_generate_requested(),
            Event::CaptionResolved { attempt, result } => {
                if !self.is_current(attempt) || self.phase != Phase::Generating {
                    debug!(attempt = attempt.value(), "dropping stale caption result");
                    return Vec::new();
                }
                match result {
                    Ok(result) if result.is_valid() => {
                        self.phase = Phase::Succeeded;
                        self.error = None;
                        let message = result.caption.clone();
                        self.caption = Some(result);
                        vec![Command::Notify(Notification::success("Caption Ready", message))]
                    }
                    Ok(_) => self.fail(
                        "Generation Error",
                        WorkflowError::InvalidResponseShape("caption is empty".to_string()),
                    ),
                    Err(err) => self.fail("Generation Error", err.into()),
                }
            }
            Event::ChangeImageRequested => {
                if matches!(self.phase, Phase::Previewing | Phase::Generating) {
                    return Vec::new();
                }
                self.phase = Phase::Previewing;
                self.awaiting_chooser = true;
                vec![Command::OpenFileChooser]
            }
            Event::ChooserDismissed => {
                if self.awaiting_chooser {
                    self.awaiting_chooser = false;
                    self.phase = self.settled_phase();
                }
                Vec::new()
            }
            Event::SaveRequested => self.on_save_requested(),
            Event::SaveResolved { attempt, result } => {
                if !self.is_current(attempt) || !self.saving {
                    debug!(attempt = attempt.value(), "dropping stale save result");
                    return Vec::new();
                }
                self.saving = false;
                match result {
                    Ok(id) => {
                        self.saved_id = Some(id.clone());
                        vec![Command::Notify(Notification::success(
                            "Saved",
                            format!("Image saved to history ({})", id),
                        ))]
                    }
                    Err(message) => {
                        let err = WorkflowError::PersistenceError(message);
                        vec![Command::Notify(Notification::error("Save Error", &err))]
                    }
                }
            }
        }
    }

    fn on_file_selected(&mut self, file: SelectedFile) -> Vec<Command> {
        let attempt = self.begin_attempt();
        self.awaiting_chooser = false;
        self.clear_outcome();
        self.preview = None;
        self.mime_type = None;

        if let Err(err) = validate(&file.mime_type, file.size_bytes) {
            return self.fail("Upload Error", err.into());
        }

        debug!(attempt = attempt.value(), mime = %file.mime_type, size = file.size_bytes, "file accepted");
        self.phase = Phase::Previewing;
        self.mime_type = Some(file.mime_type.clone());
        vec![Command::Encode { attempt, file }]
    }

    fn on_generate_requested(&mut self) -> Vec<Command> {
        let ready = matches!(self.phase, Phase::Ready | Phase::Succeeded | Phase::Failed);
        let (Some(attempt), Some(preview), true) = (self.current, self.preview.clone(), ready)
        else {
            return Vec::new();
        };

        self.clear_outcome();
        self.phase = Phase::Generating;
        self.generated_with = Some(self.params.clone());
        vec![Command::RequestCaption {
            attempt,
            request: CaptionRequest::new(preview, &self.params),
        }]
    }

    fn on_save_requested(&mut self) -> Vec<Command> {
        if self.phase != Phase::Succeeded || self.saving || self.saved_id.is_some() {
            return Vec::new();
        }
        let (Some(attempt), Some(preview), Some(caption)) =
            (self.current, self.preview.clone(), self.caption.as_ref())
        else {
            return Vec::new();
        };

        let params = self.generated_with.as_ref().unwrap_or(&self.params);
        let record = NewHistoryRecord {
            image_data: preview,
            caption: Some(caption.caption.clone()),
            style: Some(params.style.as_str().to_string()),
            context: params.context.clone(),
        };
        self.saving = true;
        vec![Command::SaveHistory { attempt, record }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::caption::CaptionStyle;
    use crate::utils::constants::MAX_IMAGE_BYTES;
    use bytes::Bytes;

    fn png(size: usize) -> SelectedFile {
        SelectedFile::from_bytes(Bytes::from(vec![0u8; size]), "image/png")
    }

    fn select(state: &mut WorkflowState, file: SelectedFile) -> (AttemptId, Vec<Command>) {
        let commands = state.apply(Event::FileSelected(file));
        (state.current_attempt().unwrap(), commands)
    }

    /// Selects a file and feeds back a successful encode.
    fn ready(state: &mut WorkflowState) -> AttemptId {
        let (attempt, _) = select(state, png(2048));
        state.apply(Event::Encoded {
            attempt,
            data_url: "data:image/png;base64,AAAA".to_string(),
        });
        attempt
    }

    fn notifications(commands: &[Command]) -> Vec<&Notification> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_non_image_rejected_without_encoding() {
        let mut state = WorkflowState::new();
        let file = SelectedFile::from_bytes(Bytes::from_static(b"hello"), "text/plain");
        let (_, commands) = select(&mut state, file);

        assert_eq!(state.phase(), Phase::Failed);
        assert!(matches!(
            state.error(),
            Some(WorkflowError::UnsupportedType { .. })
        ));
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], Command::Notify(_)));
        assert_eq!(state.preview(), None);
    }

    #[test]
    fn test_oversized_file_rejected() {
        let mut state = WorkflowState::new();
        let mut file = png(1);
        file.size_bytes = MAX_IMAGE_BYTES + 1;
        let (_, commands) = select(&mut state, file);

        assert_eq!(state.phase(), Phase::Failed);
        assert!(matches!(state.error(), Some(WorkflowError::TooLarge { .. })));
        assert!(!commands.iter().any(|c| matches!(c, Command::Encode { .. })));
    }

    #[test]
    fn test_file_at_limit_is_encoded() {
        let mut state = WorkflowState::new();
        let mut file = png(1);
        file.size_bytes = MAX_IMAGE_BYTES;
        let (attempt, commands) = select(&mut state, file);

        assert_eq!(state.phase(), Phase::Previewing);
        assert!(matches!(
            commands.as_slice(),
            [Command::Encode { attempt: a, .. }] if *a == attempt
        ));
    }

    #[test]
    fn test_round_trip_to_succeeded() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        assert_eq!(state.phase(), Phase::Ready);
        assert!(!state.preview().unwrap().is_empty());

        let commands = state.apply(Event::GenerateRequested);
        assert_eq!(state.phase(), Phase::Generating);
        let request = match commands.as_slice() {
            [Command::RequestCaption { attempt: a, request }] if *a == attempt => request,
            other => panic!("unexpected commands: {other:?}"),
        };
        assert_eq!(request.photo_data_uri, "data:image/png;base64,AAAA");

        let commands = state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("A cat on a windowsill.")),
        });
        assert_eq!(state.phase(), Phase::Succeeded);
        assert_eq!(state.caption(), Some("A cat on a windowsill."));
        assert_eq!(state.error(), None);
        assert_eq!(notifications(&commands)[0].level, NotificationLevel::Success);
    }

    #[test]
    fn test_generation_failure_keeps_preview() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::GenerateRequested);

        let message = "Caption generation failed: No output received from AI model.";
        let commands = state.apply(Event::CaptionResolved {
            attempt,
            result: Err(CaptionError::Generation(message.to_string())),
        });

        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.error().unwrap().to_string(), message);
        assert_eq!(state.preview(), Some("data:image/png;base64,AAAA"));
        assert_eq!(notifications(&commands)[0].message, message);

        // retry without re-uploading
        let commands = state.apply(Event::GenerateRequested);
        assert_eq!(state.phase(), Phase::Generating);
        assert_eq!(state.error(), None);
        assert!(matches!(commands.as_slice(), [Command::RequestCaption { .. }]));
    }

    #[test]
    fn test_empty_caption_is_invalid_shape() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::GenerateRequested);
        state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("   ")),
        });

        assert_eq!(state.phase(), Phase::Failed);
        assert!(matches!(
            state.error(),
            Some(WorkflowError::InvalidResponseShape(_))
        ));
    }

    #[test]
    fn test_stale_results_are_ignored() {
        for stale in [
            Ok(CaptionResult::new("stale caption")),
            Err(CaptionError::Generation("stale failure".to_string())),
        ] {
            let mut state = WorkflowState::new();
            let first = ready(&mut state);
            state.apply(Event::GenerateRequested);

            let (second, _) = select(&mut state, png(4096));
            assert_ne!(first, second);

            let commands = state.apply(Event::CaptionResolved {
                attempt: first,
                result: stale,
            });
            assert!(commands.is_empty());
            assert_eq!(state.phase(), Phase::Previewing);
            assert_eq!(state.caption(), None);
            assert_eq!(state.error(), None);

            state.apply(Event::Encoded {
                attempt: first,
                data_url: "data:image/png;base64,OLD".to_string(),
            });
            assert_eq!(state.preview(), None);
        }
    }

    #[test]
    fn test_new_file_clears_outcome_before_validation() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::GenerateRequested);
        state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("A cat on a windowsill.")),
        });
        assert_eq!(state.phase(), Phase::Succeeded);

        // rejected file: the old caption must not survive alongside the new error
        select(
            &mut state,
            SelectedFile::from_bytes(Bytes::from_static(b"%PDF"), "application/pdf"),
        );
        assert_eq!(state.caption(), None);
        assert!(matches!(
            state.error(),
            Some(WorkflowError::UnsupportedType { .. })
        ));

        // accepted file: the previous error is gone too
        select(&mut state, png(10));
        assert_eq!(state.error(), None);
        assert_eq!(state.caption(), None);
        assert_eq!(state.phase(), Phase::Previewing);
    }

    #[test]
    fn test_encode_failure() {
        let mut state = WorkflowState::new();
        let (attempt, _) = select(&mut state, png(10));
        let commands = state.apply(Event::EncodeFailed {
            attempt,
            error: EncodeError::ReadError {
                source_name: "cat.png".to_string(),
                message: "permission denied".to_string(),
            },
        });

        assert_eq!(state.phase(), Phase::Failed);
        assert!(matches!(state.error(), Some(WorkflowError::ReadError(_))));
        assert_eq!(notifications(&commands)[0].title, "Read Error");

        // nothing to generate from
        assert!(state.apply(Event::GenerateRequested).is_empty());
    }

    #[test]
    fn test_change_image_keeps_preview_until_new_file() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::GenerateRequested);
        state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("A cat on a windowsill.")),
        });

        let commands = state.apply(Event::ChangeImageRequested);
        assert!(matches!(commands.as_slice(), [Command::OpenFileChooser]));
        assert_eq!(state.phase(), Phase::Previewing);
        assert!(state.preview().is_some());
        assert_eq!(state.caption(), Some("A cat on a windowsill."));

        state.apply(Event::ChooserDismissed);
        assert_eq!(state.phase(), Phase::Succeeded);

        state.apply(Event::ChangeImageRequested);
        select(&mut state, png(10));
        assert_eq!(state.preview(), None);
        assert_eq!(state.caption(), None);
    }

    #[test]
    fn test_generate_ignored_while_generating() {
        let mut state = WorkflowState::new();
        ready(&mut state);
        assert_eq!(state.apply(Event::GenerateRequested).len(), 1);
        assert!(state.apply(Event::GenerateRequested).is_empty());
        assert!(state.apply(Event::ChangeImageRequested).is_empty());
    }

    #[test]
    fn test_params_flow_into_request_and_record() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::ParamsChanged(CaptionParams {
            style: CaptionStyle::Creative,
            context: Some("rainy morning".to_string()),
            ..Default::default()
        }));

        let commands = state.apply(Event::GenerateRequested);
        match commands.as_slice() {
            [Command::RequestCaption { request, .. }] => {
                assert_eq!(request.style, Some(CaptionStyle::Creative));
                assert_eq!(request.context.as_deref(), Some("rainy morning"));
            }
            other => panic!("unexpected commands: {other:?}"),
        }

        state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("Rain taps the glass.")),
        });
        // later edits do not rewrite what the caption was made with
        state.apply(Event::ParamsChanged(CaptionParams::default()));

        let commands = state.apply(Event::SaveRequested);
        match commands.as_slice() {
            [Command::SaveHistory { record, .. }] => {
                assert_eq!(record.style.as_deref(), Some("creative"));
                assert_eq!(record.context.as_deref(), Some("rainy morning"));
                assert_eq!(record.caption.as_deref(), Some("Rain taps the glass."));
            }
            other => panic!("unexpected commands: {other:?}"),
        }
        assert!(state.saving);
        assert!(state.apply(Event::SaveRequested).is_empty());

        state.apply(Event::SaveResolved {
            attempt,
            result: Ok("0xabc".to_string()),
        });
        assert_eq!(state.saved_id(), Some("0xabc"));
        assert!(!state.saving);
    }

    #[test]
    fn test_save_failure_is_notified_not_fatal() {
        let mut state = WorkflowState::new();
        let attempt = ready(&mut state);
        state.apply(Event::GenerateRequested);
        state.apply(Event::CaptionResolved {
            attempt,
            result: Ok(CaptionResult::new("A cat.")),
        });
        state.apply(Event::SaveRequested);
        let commands = state.apply(Event::SaveResolved {
            attempt,
            result: Err("connection refused".to_string()),
        });

        assert_eq!(state.phase(), Phase::Succeeded);
        let n = notifications(&commands);
        assert_eq!(n[0].level, NotificationLevel::Error);
        assert_eq!(n[0].message, "Failed to save image: connection refused");
    }

    #[test]
    fn test_pure_transition() {
        let (state, commands) = transition(
            WorkflowState::new(),
            Event::FileSelected(png(10)),
        );
        assert_eq!(state.phase(), Phase::Previewing);
        assert_eq!(state.current_attempt().map(|a| a.value()), Some(1));
        assert_eq!(commands.len(), 1);
    }
}
