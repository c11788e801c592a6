//! End-to-end session flows against the in-memory store.
//!
//! Every test runs on a paused clock, so window and re-arm deadlines are
//! crossed by sleeping rather than by waiting.

use std::sync::Arc;
use std::time::Duration;

use rollcall_core::{
    AttendanceMode, ConnectionStatus, ReadEvent, SelectedBy, SessionMode, StudentNumber,
    SubscribedBy,
};
use rollcall_reader::TransportEvent;
use rollcall_session::{
    AppendCall, FailureKind, MemoryStore, Outcome, Session, SessionConfig, SessionHandle,
};
use rollcall_storage::StorageError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

struct Harness {
    handle: SessionHandle,
    reads: mpsc::Sender<TransportEvent>,
    outcomes: broadcast::Receiver<Outcome>,
    store: Arc<MemoryStore>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        let (reads_tx, reads_rx) = mpsc::channel(16);
        let (session, handle) = Session::new(store.clone(), SessionConfig::default(), reads_rx);
        let outcomes = handle.subscribe();
        let task = session.spawn();

        Self {
            handle,
            reads: reads_tx,
            outcomes,
            store,
            task,
        }
    }

    async fn enter(&self, mode: SessionMode) {
        self.handle.enter_mode(mode).await.unwrap();
        settle().await;
    }

    async fn touch(&self, student: &str) {
        self.reads
            .send(TransportEvent::Read(read(student)))
            .await
            .unwrap();
        settle().await;
    }

    async fn next(&mut self) -> Outcome {
        tokio::time::timeout(Duration::from_secs(60), self.outcomes.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("outcome bus closed")
    }

    fn assert_quiet(&mut self) {
        match self.outcomes.try_recv() {
            Err(broadcast::error::TryRecvError::Empty) => {}
            other => panic!("expected no outcome, got {other:?}"),
        }
    }

    /// Authenticate with a registered admin card.
    async fn authorize(&mut self, admin: &str) {
        self.enter(SessionMode::Authenticate).await;
        self.touch(admin).await;
        match self.next().await {
            Outcome::Auth(Ok(identity)) => assert_eq!(identity.student_number.as_str(), admin),
            other => panic!("expected successful auth, got {other:?}"),
        }
    }
}

fn read(student: &str) -> ReadEvent {
    ReadEvent::new(StudentNumber::new(student).unwrap(), "山田太郎", "ヤマダタロウ")
}

fn sn(student: &str) -> StudentNumber {
    StudentNumber::new(student).unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_reads_while_idle_are_discarded() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    assert_eq!(h.handle.mode(), SessionMode::Idle);
    assert!(!h.handle.awaiting_read());

    h.touch("S001").await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    h.assert_quiet();
    assert!(h.store.appended().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_check_in_commits_toggled_mode_when_window_closes() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    assert!(h.handle.awaiting_read());
    h.touch("S001").await;

    match h.next().await {
        Outcome::CardDetected(preview) => {
            assert_eq!(preview.student_number, sn("S001"));
            assert_eq!(preview.previous, None);
            assert_eq!(preview.next, AttendanceMode::In);
            assert_eq!(preview.window_timeout_ms, 5000);
        }
        other => panic!("expected card-detected, got {other:?}"),
    }
    assert!(!h.handle.awaiting_read());

    tokio::time::sleep(Duration::from_secs(4)).await;
    h.assert_quiet();
    assert!(h.store.appended().is_empty());

    match h.next().await {
        Outcome::CheckIn(Ok(recorded)) => {
            assert_eq!(recorded.student_number, sn("S001"));
            assert_eq!(recorded.mode, AttendanceMode::In);
            assert_eq!(recorded.selected_by, SelectedBy::System);
        }
        other => panic!("expected checkin-result, got {other:?}"),
    }
    assert_eq!(
        h.store.appended(),
        vec![AppendCall {
            student_number: sn("S001"),
            mode: AttendanceMode::In,
            subscribed_by: SubscribedBy::Card,
            selected_by: SelectedBy::System,
        }]
    );
    assert!(h.handle.awaiting_read());
    assert_eq!(h.handle.mode(), SessionMode::CheckIn);
}

#[tokio::test(start_paused = true)]
async fn test_check_in_toggles_from_todays_latest_log() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();
    h.store.seed_log_today("S001", AttendanceMode::In).unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;

    match h.next().await {
        Outcome::CardDetected(preview) => {
            assert_eq!(preview.previous, Some(AttendanceMode::In));
            assert_eq!(preview.next, AttendanceMode::Out);
        }
        other => panic!("expected card-detected, got {other:?}"),
    }
    match h.next().await {
        Outcome::CheckIn(Ok(recorded)) => assert_eq!(recorded.mode, AttendanceMode::Out),
        other => panic!("expected checkin-result, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_confirm_overrides_mode_and_closes_window() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::CardDetected(_)));

    h.handle
        .confirm_transition(AttendanceMode::Rest, sn("S001"))
        .await
        .unwrap();
    match h.next().await {
        Outcome::CheckIn(Ok(recorded)) => {
            assert_eq!(recorded.mode, AttendanceMode::Rest);
            assert_eq!(recorded.selected_by, SelectedBy::Manual);
        }
        other => panic!("expected checkin-result, got {other:?}"),
    }

    // Neither the deadline nor a repeated confirm commits again.
    h.handle
        .confirm_transition(AttendanceMode::Out, sn("S001"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    h.assert_quiet();
    assert_eq!(h.store.appended().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_for_other_student_is_ignored() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::CardDetected(_)));

    h.handle
        .confirm_transition(AttendanceMode::Out, sn("S999"))
        .await
        .unwrap();
    settle().await;
    h.assert_quiet();

    match h.next().await {
        Outcome::CheckIn(Ok(recorded)) => {
            assert_eq!(recorded.mode, AttendanceMode::In);
            assert_eq!(recorded.selected_by, SelectedBy::System);
        }
        other => panic!("expected checkin-result, got {other:?}"),
    }
    assert_eq!(h.store.appended().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_discards_pending_check_in() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::CardDetected(_)));

    h.handle.cancel().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    h.assert_quiet();
    assert!(h.store.appended().is_empty());
    assert!(!h.handle.awaiting_read());
    assert_eq!(h.handle.mode(), SessionMode::CheckIn);
}

#[tokio::test(start_paused = true)]
async fn test_reads_during_open_window_are_dropped() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();
    h.store.add_user("S002", "佐藤花子", "サトウハナコ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::CardDetected(_)));

    h.touch("S002").await;
    h.assert_quiet();

    match h.next().await {
        Outcome::CheckIn(Ok(recorded)) => assert_eq!(recorded.student_number, sn("S001")),
        other => panic!("expected checkin-result, got {other:?}"),
    }
    assert_eq!(h.store.appended().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_mode_abandons_check_in_window() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::CardDetected(_)));

    h.enter(SessionMode::LogLookup).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    h.assert_quiet();
    assert!(h.store.appended().is_empty());
    assert!(h.handle.awaiting_read());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_card_can_be_assigned() {
    let mut h = Harness::start();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S404").await;

    match h.next().await {
        Outcome::CheckIn(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::UserNotFound);
            assert_eq!(failure.student_number, Some(sn("S404")));
            assert_eq!(failure.display_name.as_deref(), Some("山田太郎"));
        }
        other => panic!("expected user-not-found, got {other:?}"),
    }
    assert!(!h.handle.awaiting_read());

    h.handle.assign_new_user().await.unwrap();
    match h.next().await {
        Outcome::Enroll(Ok(user)) => {
            assert_eq!(user.student_number, sn("S404"));
            assert_eq!(user.enrolled_by, None);
            assert!(user.touch_again);
        }
        other => panic!("expected enroll-result, got {other:?}"),
    }
    assert!(h.store.has_user("S404"));
    assert!(h.handle.awaiting_read());
    assert_eq!(h.handle.mode(), SessionMode::CheckIn);
    assert!(h.store.appended().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_assignment_offer_expires_and_rearms() {
    let mut h = Harness::start();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S404").await;
    assert!(matches!(h.next().await, Outcome::CheckIn(Err(_))));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(h.handle.awaiting_read());

    h.handle.assign_new_user().await.unwrap();
    settle().await;
    h.assert_quiet();
    assert!(!h.store.has_user("S404"));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_assign_rearms_immediately() {
    let mut h = Harness::start();

    h.enter(SessionMode::CheckIn).await;
    h.touch("S404").await;
    assert!(matches!(h.next().await, Outcome::CheckIn(Err(_))));
    assert!(!h.handle.awaiting_read());

    h.handle.cancel_assign().await.unwrap();
    settle().await;
    assert!(h.handle.awaiting_read());

    h.handle.assign_new_user().await.unwrap();
    settle().await;
    h.assert_quiet();
    assert!(!h.store.has_user("S404"));
}

#[tokio::test(start_paused = true)]
async fn test_authenticated_admin_enrolls_new_card() {
    let mut h = Harness::start();
    h.store.add_user("A001", "管理者", "カンリシャ").unwrap();

    h.authorize("A001").await;
    assert_eq!(h.handle.mode(), SessionMode::Idle);
    assert!(!h.handle.awaiting_read());

    h.enter(SessionMode::Enroll).await;
    assert!(h.handle.awaiting_read());
    h.touch("S777").await;

    match h.next().await {
        Outcome::Enroll(Ok(user)) => {
            assert_eq!(user.student_number, sn("S777"));
            assert_eq!(user.enrolled_by, Some(sn("A001")));
            assert!(!user.touch_again);
        }
        other => panic!("expected enroll-result, got {other:?}"),
    }
    assert!(h.store.has_user("S777"));
    assert_eq!(h.handle.mode(), SessionMode::Idle);

    // Authorization is spent by the enrollment.
    h.enter(SessionMode::Enroll).await;
    match h.next().await {
        Outcome::Enroll(Err(failure)) => assert_eq!(failure.kind, FailureKind::Unauthorized),
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_enroll_without_authorization_is_refused() {
    let mut h = Harness::start();

    h.enter(SessionMode::Enroll).await;
    match h.next().await {
        Outcome::Enroll(Err(failure)) => assert_eq!(failure.kind, FailureKind::Unauthorized),
        other => panic!("expected unauthorized, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);
    assert!(!h.handle.awaiting_read());
}

#[tokio::test(start_paused = true)]
async fn test_enroll_existing_card_conflicts() {
    let mut h = Harness::start();
    h.store.add_user("A001", "管理者", "カンリシャ").unwrap();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.authorize("A001").await;
    h.enter(SessionMode::Enroll).await;
    h.touch("S001").await;

    match h.next().await {
        Outcome::Enroll(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::Conflict);
            assert_eq!(failure.student_number, Some(sn("S001")));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_enroll_window_times_out() {
    let mut h = Harness::start();
    h.store.add_user("A001", "管理者", "カンリシャ").unwrap();

    h.authorize("A001").await;
    h.enter(SessionMode::Enroll).await;

    match h.next().await {
        Outcome::Enroll(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert_eq!(failure.student_number, None);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_auth_times_out_without_card() {
    let mut h = Harness::start();

    h.enter(SessionMode::Authenticate).await;
    assert!(h.handle.awaiting_read());

    tokio::time::sleep(Duration::from_secs(4)).await;
    h.assert_quiet();

    match h.next().await {
        Outcome::Auth(Err(failure)) => assert_eq!(failure.kind, FailureKind::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);
    assert!(!h.handle.awaiting_read());

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.assert_quiet();
}

#[tokio::test(start_paused = true)]
async fn test_auth_deadline_beats_slow_lookup() {
    let mut h = Harness::start();
    h.store.add_user("A001", "管理者", "カンリシャ").unwrap();
    h.store.set_latency(Duration::from_secs(7));

    h.enter(SessionMode::Authenticate).await;
    h.touch("A001").await;

    match h.next().await {
        Outcome::Auth(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert_eq!(failure.student_number, Some(sn("A001")));
            assert_eq!(failure.display_name.as_deref(), Some("山田太郎"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);

    // The lookup lands after the deadline and must not authorize.
    tokio::time::sleep(Duration::from_secs(10)).await;
    h.assert_quiet();

    h.store.set_latency(Duration::ZERO);
    h.enter(SessionMode::Enroll).await;
    match h.next().await {
        Outcome::Enroll(Err(failure)) => assert_eq!(failure.kind, FailureKind::Unauthorized),
        other => panic!("expected unauthorized, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_timeout_ignores_reads_from_previous_mode() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::LogLookup).await;
    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::LogLookup(Ok(_))));

    h.enter(SessionMode::Authenticate).await;
    match h.next().await {
        Outcome::Auth(Err(failure)) => {
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert_eq!(failure.student_number, None);
            assert_eq!(failure.display_name, None);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_with_unknown_card_fails() {
    let mut h = Harness::start();

    h.enter(SessionMode::Authenticate).await;
    h.touch("X999").await;

    match h.next().await {
        Outcome::Auth(Err(failure)) => assert_eq!(failure.kind, FailureKind::UserNotFound),
        other => panic!("expected user-not-found, got {other:?}"),
    }
    assert_eq!(h.handle.mode(), SessionMode::Idle);

    // The failed attempt never times out later.
    tokio::time::sleep(Duration::from_secs(10)).await;
    h.assert_quiet();
}

#[tokio::test(start_paused = true)]
async fn test_new_auth_attempt_replaces_previous_timer() {
    let mut h = Harness::start();

    h.enter(SessionMode::Authenticate).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    h.enter(SessionMode::Authenticate).await;

    // Past the first attempt's deadline.
    tokio::time::sleep(Duration::from_secs(3)).await;
    h.assert_quiet();

    match h.next().await {
        Outcome::Auth(Err(failure)) => assert_eq!(failure.kind, FailureKind::Timeout),
        other => panic!("expected timeout, got {other:?}"),
    }
    settle().await;
    h.assert_quiet();
}

#[tokio::test(start_paused = true)]
async fn test_log_lookup_returns_first_page_and_rearms() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();
    h.store.seed_log_today("S001", AttendanceMode::In).unwrap();

    h.enter(SessionMode::LogLookup).await;
    h.touch("S001").await;

    match h.next().await {
        Outcome::LogLookup(Ok(page)) => {
            assert_eq!(page.student_number, sn("S001"));
            assert_eq!(page.page, 0);
            assert_eq!(page.entries.len(), 1);
            assert_eq!(page.entries[0].mode, AttendanceMode::In);
        }
        other => panic!("expected log-result, got {other:?}"),
    }
    assert!(h.handle.awaiting_read());
    assert_eq!(h.handle.mode(), SessionMode::LogLookup);
}

#[tokio::test(start_paused = true)]
async fn test_store_failure_reports_and_rearms() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();

    h.enter(SessionMode::LogLookup).await;
    h.store
        .fail_next(StorageError::Configuration("disk unavailable".into()));
    h.touch("S001").await;

    match h.next().await {
        Outcome::LogLookup(Err(failure)) => assert_eq!(failure.kind, FailureKind::ServiceError),
        other => panic!("expected service error, got {other:?}"),
    }
    assert!(h.handle.awaiting_read());

    h.touch("S001").await;
    assert!(matches!(h.next().await, Outcome::LogLookup(Ok(_))));
}

#[tokio::test(start_paused = true)]
async fn test_late_result_after_mode_change_is_ignored() {
    let mut h = Harness::start();
    h.store.add_user("S001", "山田太郎", "ヤマダタロウ").unwrap();
    h.store.set_latency(Duration::from_secs(2));

    h.enter(SessionMode::LogLookup).await;
    h.touch("S001").await;
    h.enter(SessionMode::CheckIn).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.assert_quiet();
    assert!(h.handle.awaiting_read());
    assert_eq!(h.handle.mode(), SessionMode::CheckIn);
}

#[tokio::test(start_paused = true)]
async fn test_connection_status_is_forwarded() {
    let mut h = Harness::start();

    h.reads
        .send(TransportEvent::Status(ConnectionStatus::Active))
        .await
        .unwrap();

    assert_eq!(
        h.next().await,
        Outcome::ConnectionStatus(ConnectionStatus::Active)
    );
}

#[tokio::test(start_paused = true)]
async fn test_session_stops_when_handles_dropped() {
    let h = Harness::start();
    let Harness { handle, task, .. } = h;

    drop(handle);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("session did not stop")
        .unwrap();
}
