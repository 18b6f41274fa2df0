//! Capture gating: freeze a stable reading for operator confirmation.
//!
//! The coordinator owns the at-most-one-pending invariant. The surrounding
//! UI may also disable its button, but the guard here is what actually
//! enforces it.

use crate::error::{AcquireError, CommitError};
use crate::{LinkState, Reading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Pending,
    Confirmed,
    Cancelled,
}

/// A frozen reading awaiting operator confirmation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSession {
    pub subject_id: i64,
    pub frozen: Reading,
    pub state: CaptureState,
}

#[derive(Debug, Default)]
pub struct CaptureCoordinator {
    pending: Option<CaptureSession>,
}

impl CaptureCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze `latest` into a new pending session.
    ///
    /// Guard order: subject selected, link streaming, reading stable, no
    /// other capture pending.
    pub fn capture(
        &mut self,
        subject_id: Option<i64>,
        link: LinkState,
        stable: bool,
        latest: Option<Reading>,
    ) -> Result<CaptureSession, AcquireError> {
        let subject_id = subject_id.ok_or(AcquireError::NoSubjectSelected)?;
        if link != LinkState::Streaming {
            return Err(AcquireError::NotConnected);
        }
        if !stable {
            return Err(AcquireError::NotStable);
        }
        if self.pending.is_some() {
            return Err(AcquireError::CaptureInProgress);
        }
        // Stability implies at least two readings were seen.
        let frozen = latest.ok_or(AcquireError::NotStable)?;
        let session = CaptureSession {
            subject_id,
            frozen,
            state: CaptureState::Pending,
        };
        self.pending = Some(session);
        Ok(session)
    }

    pub fn pending(&self) -> Option<&CaptureSession> {
        self.pending.as_ref()
    }

    /// Hand the pending session to `commit`; on success the session is
    /// confirmed and cleared, on failure it stays pending for retry/cancel.
    pub fn confirm_with<T>(
        &mut self,
        commit: impl FnOnce(&CaptureSession) -> Result<T, CommitError>,
    ) -> Result<Result<T, CommitError>, AcquireError> {
        let Some(session) = self.pending else {
            return Err(AcquireError::State("no pending capture"));
        };
        match commit(&session) {
            Ok(value) => {
                self.pending = None;
                Ok(Ok(value))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    /// Discard the pending session without persisting. Always succeeds.
    pub fn cancel(&mut self) -> Option<CaptureSession> {
        self.pending.take().map(|mut s| {
            s.state = CaptureState::Cancelled;
            s
        })
    }

    /// Fail the pending session because the connection went away.
    pub fn fail_on_disconnect(&mut self) -> Option<CaptureSession> {
        let lost = self.cancel();
        if let Some(s) = &lost {
            tracing::warn!(
                subject_id = s.subject_id,
                "pending capture cancelled: connection lost"
            );
        }
        lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest() -> Option<Reading> {
        Some(Reading {
            weight_kg: 8.5,
            height_cm: 70.0,
            at_ms: 1500,
        })
    }

    #[test]
    fn guard_order_matches_operator_feedback() {
        let mut coord = CaptureCoordinator::new();
        // Subject missing wins over everything else.
        assert_eq!(
            coord.capture(None, LinkState::Disconnected, false, None),
            Err(AcquireError::NoSubjectSelected)
        );
        assert_eq!(
            coord.capture(Some(1), LinkState::Disconnected, true, latest()),
            Err(AcquireError::NotConnected)
        );
        assert_eq!(
            coord.capture(Some(1), LinkState::Streaming, false, latest()),
            Err(AcquireError::NotStable)
        );
    }

    #[test]
    fn second_capture_is_rejected_while_pending() {
        let mut coord = CaptureCoordinator::new();
        coord
            .capture(Some(1), LinkState::Streaming, true, latest())
            .expect("first capture");
        assert_eq!(
            coord.capture(Some(2), LinkState::Streaming, true, latest()),
            Err(AcquireError::CaptureInProgress)
        );
    }

    #[test]
    fn failed_commit_keeps_session_pending() {
        let mut coord = CaptureCoordinator::new();
        coord
            .capture(Some(1), LinkState::Streaming, true, latest())
            .expect("capture");
        let res = coord
            .confirm_with(|_| Err::<(), _>(CommitError::Storage("disk full".into())))
            .expect("session exists");
        assert!(res.is_err());
        assert!(coord.pending().is_some(), "session must survive the failure");

        let res = coord.confirm_with(|_| Ok(42)).expect("session exists");
        assert_eq!(res.ok(), Some(42));
        assert!(coord.pending().is_none(), "confirm clears the session");
    }

    #[test]
    fn confirm_without_pending_session_fails() {
        let mut coord = CaptureCoordinator::new();
        let err = coord.confirm_with(|_| Ok(())).expect_err("nothing pending");
        assert!(matches!(err, AcquireError::State(_)));
    }

    #[test]
    fn disconnect_failure_reports_cancelled_session() {
        let mut coord = CaptureCoordinator::new();
        coord
            .capture(Some(9), LinkState::Streaming, true, latest())
            .expect("capture");
        let lost = coord.fail_on_disconnect().expect("session was pending");
        assert_eq!(lost.state, CaptureState::Cancelled);
        assert_eq!(lost.subject_id, 9);
        assert!(coord.pending().is_none());
    }
}
