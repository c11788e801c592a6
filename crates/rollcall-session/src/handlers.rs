//! Intent handlers.
//!
//! Each handler is a self-contained future over an `Arc` of the store, so
//! the session can poll it inside its own loop without borrowing session
//! state. Storage errors are mapped to [`Failure`]s here and never escape.

use std::sync::Arc;

use rollcall_core::{
    AttendanceMode, OperationalDay, ReadEvent, SelectedBy, StudentNumber, SubscribedBy,
};
use rollcall_storage::{AttendanceStore, NewUser, StorageError, User};
use tracing::{debug, warn};

use crate::outcome::{AttendanceRecorded, EnrolledUser, Failure, FailureKind, Identity, LogPage};
use crate::window::ArmedCheckIn;

/// What a CheckIn lookup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInLookup {
    /// No active user carries this student number.
    Unknown,
    /// The transition to commit once the window closes.
    Known(ArmedCheckIn),
}

fn service_failure(err: &StorageError, read: &ReadEvent) -> Failure {
    warn!(student = %read.student_number, error = %err, "Data collaborator call failed");
    let mut failure = Failure::from_storage(err, &read.student_number, read.display_name());
    failure.kind = FailureKind::ServiceError;
    failure
}

async fn find_user<S: AttendanceStore>(store: &S, read: &ReadEvent) -> Result<Option<User>, Failure> {
    store
        .find_user_by_student_number(&read.student_number)
        .await
        .map_err(|e| service_failure(&e, read))
}

/// Look the card up and derive the next transition for the current
/// operational day.
pub async fn check_in<S: AttendanceStore>(
    store: Arc<S>,
    read: ReadEvent,
) -> Result<CheckInLookup, Failure> {
    let Some(user) = find_user(store.as_ref(), &read).await? else {
        return Ok(CheckInLookup::Unknown);
    };

    let day = OperationalDay::current().map_err(|e| {
        Failure::new(FailureKind::ServiceError, e.to_string())
            .about(&read.student_number, read.display_name())
    })?;
    let latest = store
        .find_latest_attendance_log(user.id, day.start(), day.end())
        .await
        .map_err(|e| service_failure(&e, &read))?;

    let previous = latest.map(|log| log.mode);
    let next = AttendanceMode::toggled_from(previous);
    debug!(
        student = %read.student_number,
        previous = ?previous,
        next = %next,
        "Check-in transition derived"
    );

    Ok(CheckInLookup::Known(ArmedCheckIn {
        student_number: user.student_number.clone(),
        name_full: read.name_full.clone(),
        name_short: read.name_short.clone(),
        display_name: user.display_name().to_string(),
        previous,
        next,
    }))
}

/// Persist an armed check-in.
pub async fn commit_check_in<S: AttendanceStore>(
    store: Arc<S>,
    armed: ArmedCheckIn,
    mode: AttendanceMode,
    selected_by: SelectedBy,
) -> Result<AttendanceRecorded, Failure> {
    let log = store
        .append_attendance_log(&armed.student_number, mode, SubscribedBy::Card, selected_by)
        .await
        .map_err(|e| {
            warn!(student = %armed.student_number, error = %e, "Failed to record attendance");
            Failure::from_storage(&e, &armed.student_number, &armed.display_name)
        })?;

    Ok(AttendanceRecorded {
        student_number: armed.student_number,
        display_name: armed.display_name,
        mode: log.mode,
        selected_by: log.selected_by,
        log_id: log.id,
        timestamp: log.timestamp,
    })
}

/// Resolve an Authenticate read to an identity.
pub async fn authenticate<S: AttendanceStore>(
    store: Arc<S>,
    read: ReadEvent,
) -> Result<Identity, Failure> {
    match find_user(store.as_ref(), &read).await? {
        Some(user) => Ok(Identity {
            student_number: user.student_number.clone(),
            display_name: user.display_name().to_string(),
        }),
        None => Err(Failure::user_not_found(&read.student_number, read.display_name())),
    }
}

/// Register the card holder.
pub async fn enroll<S: AttendanceStore>(
    store: Arc<S>,
    read: ReadEvent,
    enrolled_by: Option<StudentNumber>,
    touch_again: bool,
) -> Result<EnrolledUser, Failure> {
    let user = store
        .create_user(&NewUser::from(&read))
        .await
        .map_err(|e| {
            if e.is_conflict() {
                debug!(student = %read.student_number, "Enrollment conflict");
                Failure::from_storage(&e, &read.student_number, read.display_name())
            } else {
                service_failure(&e, &read)
            }
        })?;

    Ok(EnrolledUser {
        user_id: user.id,
        display_name: user.display_name().to_string(),
        student_number: user.student_number,
        enrolled_by,
        touch_again,
    })
}

/// First page of the card holder's attendance history.
pub async fn log_lookup<S: AttendanceStore>(
    store: Arc<S>,
    read: ReadEvent,
) -> Result<LogPage, Failure> {
    let Some(user) = find_user(store.as_ref(), &read).await? else {
        return Err(Failure::user_not_found(&read.student_number, read.display_name()));
    };

    let entries = store
        .list_attendance_logs_for_student(&user.student_number, 0)
        .await
        .map_err(|e| service_failure(&e, &read))?;

    Ok(LogPage {
        display_name: user.display_name().to_string(),
        student_number: user.student_number,
        page: 0,
        entries,
    })
}
