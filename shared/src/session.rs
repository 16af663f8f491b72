use crate::cancel::CancelToken;
use crate::error::ApiError;
use crate::upload::TaskId;

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Uploading(CancelToken),
    Tracking { task: TaskId, token: CancelToken },
}

/// The one upload cycle a page tracks at a time.
///
/// Owned by the upload component. A cycle starts with [`begin_upload`],
/// gets its task id from [`begin`] once the server answers, and ends with
/// [`finish`], [`abort_upload`] or [`cancel`].
///
/// [`begin_upload`]: UploadSession::begin_upload
/// [`begin`]: UploadSession::begin
/// [`finish`]: UploadSession::finish
/// [`abort_upload`]: UploadSession::abort_upload
/// [`cancel`]: UploadSession::cancel
#[derive(Debug, Default)]
pub struct UploadSession {
    phase: Phase,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_upload(&mut self) -> Result<CancelToken, ApiError> {
        if self.is_active() {
            return Err(ApiError::Validation(
                "A task is already in progress. Cancel it or wait for it to finish.".into(),
            ));
        }
        let token = CancelToken::new();
        self.phase = Phase::Uploading(token.clone());
        Ok(token)
    }

    /// Records the task id the upload returned. Fails with `Cancelled` if the
    /// cycle was cancelled while the upload was in flight.
    pub fn begin(&mut self, task: TaskId) -> Result<CancelToken, ApiError> {
        match std::mem::take(&mut self.phase) {
            Phase::Uploading(token) if !token.is_cancelled() => {
                log::info!("Tracking task {}", task);
                self.phase = Phase::Tracking {
                    task,
                    token: token.clone(),
                };
                Ok(token)
            }
            Phase::Tracking { task: current, token } => {
                self.phase = Phase::Tracking {
                    task: current,
                    token,
                };
                Err(ApiError::Validation(
                    "A task is already in progress. Cancel it or wait for it to finish.".into(),
                ))
            }
            _ => Err(ApiError::Cancelled),
        }
    }

    pub fn current(&self) -> Option<&TaskId> {
        match &self.phase {
            Phase::Tracking { task, .. } => Some(task),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<&CancelToken> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Uploading(token) | Phase::Tracking { token, .. } => Some(token),
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn can_submit(&self) -> bool {
        !self.is_active()
    }

    pub fn is_uploading(&self) -> bool {
        matches!(self.phase, Phase::Uploading(_))
    }

    pub fn is_current(&self, task: &TaskId) -> bool {
        self.current() == Some(task)
    }

    /// Fires the cycle's token and clears the tracked task. Returns the task
    /// id so the caller can tell the server to stop.
    pub fn cancel(&mut self) -> Option<TaskId> {
        match std::mem::take(&mut self.phase) {
            Phase::Idle => None,
            Phase::Uploading(token) => {
                log::info!("Cancelling upload before a task id was assigned");
                token.cancel();
                None
            }
            Phase::Tracking { task, token } => {
                log::info!("Cancelling task {}", task);
                token.cancel();
                Some(task)
            }
        }
    }

    /// Ends the cycle for `task`. A stale id from an earlier cycle is ignored.
    pub fn finish(&mut self, task: &TaskId) -> bool {
        if self.is_current(task) {
            self.phase = Phase::Idle;
            true
        } else {
            false
        }
    }

    /// Ends a cycle whose upload request failed.
    pub fn abort_upload(&mut self) {
        if self.is_uploading() {
            self.phase = Phase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut session = UploadSession::new();
        assert!(session.can_submit());

        session.begin_upload().unwrap();
        assert!(!session.can_submit());
        assert!(session.current().is_none());

        let task = TaskId::from("task-1");
        let token = session.begin(task.clone()).unwrap();
        assert!(session.is_current(&task));
        assert!(!token.is_cancelled());

        assert!(session.finish(&task));
        assert!(session.can_submit());
        assert!(session.current().is_none());
    }

    #[test]
    fn test_second_submit_rejected_while_active() {
        let mut session = UploadSession::new();
        session.begin_upload().unwrap();
        assert!(matches!(session.begin_upload(), Err(ApiError::Validation(_))));

        session.begin(TaskId::from("a")).unwrap();
        assert!(session.begin_upload().is_err());
        assert!(session.begin(TaskId::from("b")).is_err());
        assert!(session.is_current(&TaskId::from("a")));
    }

    #[test]
    fn test_cancel_clears_task_and_reenables_submit() {
        let mut session = UploadSession::new();
        session.begin_upload().unwrap();
        let token = session.begin(TaskId::from("task-2")).unwrap();

        assert_eq!(session.cancel(), Some(TaskId::from("task-2")));
        assert!(token.is_cancelled());
        assert!(session.current().is_none());
        assert!(session.can_submit());
        assert_eq!(session.cancel(), None);
    }

    #[test]
    fn test_cancel_during_upload() {
        let mut session = UploadSession::new();
        let token = session.begin_upload().unwrap();

        assert_eq!(session.cancel(), None);
        assert!(token.is_cancelled());
        assert!(session.can_submit());

        // the upload answer arrives after the cancel
        assert!(matches!(
            session.begin(TaskId::from("late")),
            Err(ApiError::Cancelled)
        ));
        assert!(session.can_submit());
    }

    #[test]
    fn test_stale_finish_is_ignored() {
        let mut session = UploadSession::new();
        session.begin_upload().unwrap();
        session.begin(TaskId::from("old")).unwrap();
        session.cancel();

        session.begin_upload().unwrap();
        session.begin(TaskId::from("new")).unwrap();
        assert!(!session.finish(&TaskId::from("old")));
        assert!(session.is_current(&TaskId::from("new")));
    }

    #[test]
    fn test_abort_upload() {
        let mut session = UploadSession::new();
        session.begin_upload().unwrap();
        session.abort_upload();
        assert!(session.can_submit());
        assert!(session.token().is_none());
    }
}
