//! The recognition pipeline.
//!
//! Runs on a dedicated OS thread that owns the frame feed, the identity
//! store, the match engine, the attendance machine, and the ledger.
//! D-Bus handlers talk to it through a clone-safe [`PipelineHandle`];
//! control requests are drained between frames, so registration runs
//! concurrently with recognition without sharing mutable state across
//! threads.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{
    AttendanceEvent, AttendanceStateMachine, EnrollError, IdentityStore, Match, MatchEngine,
    Observation, ObservedFace,
};
use rollcall_io::{CsvLedger, FrameSource, LedgerError, SourceError, TIMESTAMP_FORMAT};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("frame feed error: {0}")]
    Source(#[from] SourceError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
    #[error("pipeline thread exited")]
    ChannelClosed,
}

/// Receives the one human-readable status line produced per processed
/// frame. Purely observational; nothing feeds back into the pipeline.
pub trait Notifier: Send {
    fn notify(&mut self, line: &str);
}

/// Default notification sink: the daemon log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, line: &str) {
        tracing::info!(target: "rollcall::notify", "{line}");
    }
}

/// Counts and the latest notification line, for `Status` requests.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enrolled: usize,
    pub frames_processed: u64,
    pub events_recorded: u64,
    pub ledger_path: String,
    pub last_notification: String,
}

/// Messages sent from D-Bus handlers to the pipeline thread.
enum PipelineRequest {
    Register {
        name: String,
        tag: u32,
        reply: oneshot::Sender<Result<(), PipelineError>>,
    },
    Status {
        reply: oneshot::Sender<StatusReport>,
    },
}

/// Clone-safe handle to the pipeline thread.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<PipelineRequest>,
}

impl PipelineHandle {
    /// Request registration: capture the next observed face from the live
    /// feed and enroll it under `name` / `tag`.
    pub async fn register(&self, name: &str, tag: u32) -> Result<(), PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::Register {
                name: name.to_string(),
                tag,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<StatusReport, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PipelineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| PipelineError::ChannelClosed)
    }
}

fn notification_line(event: &AttendanceEvent) -> String {
    format!(
        "Attendance marked for {} ({}) - Status: {} - Time: {}",
        event.name,
        event.tag,
        event.status,
        event.timestamp.format(TIMESTAMP_FORMAT)
    )
}

const NO_MATCH_LINE: &str = "No match";

struct Pipeline<S> {
    source: S,
    store: Arc<IdentityStore>,
    engine: MatchEngine,
    machine: AttendanceStateMachine,
    ledger: CsvLedger,
    notifier: Box<dyn Notifier>,
    register_frame_budget: usize,
    frames_processed: u64,
    events_recorded: u64,
    last_notification: String,
}

impl<S: FrameSource> Pipeline<S> {
    fn run(mut self, mut rx: mpsc::Receiver<PipelineRequest>) {
        tracing::info!("pipeline thread started");
        loop {
            // Drain control requests that arrived during the last frame.
            loop {
                match rx.try_recv() {
                    Ok(request) => self.handle_request(request),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        tracing::info!("all handles dropped; pipeline thread exiting");
                        return;
                    }
                }
            }

            match self.source.next_frame() {
                Ok(Some(faces)) => self.process_frame(&faces),
                Ok(None) => {
                    tracing::info!(
                        frames = self.frames_processed,
                        "frame feed ended; serving control requests only"
                    );
                    break;
                }
                Err(err) => {
                    tracing::error!(error = %err, "frame feed failed");
                    break;
                }
            }
        }

        // Recorded feeds end; keep answering Status/Register so the
        // control surface stays up until the daemon shuts down.
        while let Some(request) = rx.blocking_recv() {
            self.handle_request(request);
        }
        tracing::info!("pipeline thread exiting");
    }

    fn handle_request(&mut self, request: PipelineRequest) {
        match request {
            PipelineRequest::Register { name, tag, reply } => {
                let result = self.register(&name, tag);
                if let Err(err) = &result {
                    tracing::warn!(name, tag, error = %err, "registration rejected");
                }
                let _ = reply.send(result);
            }
            PipelineRequest::Status { reply } => {
                let _ = reply.send(StatusReport {
                    enrolled: self.store.len(),
                    frames_processed: self.frames_processed,
                    events_recorded: self.events_recorded,
                    ledger_path: self.ledger.path().display().to_string(),
                    last_notification: self.last_notification.clone(),
                });
            }
        }
    }

    /// Capture the next observed face from the feed and enroll it.
    ///
    /// Conflicts are checked before capture so the caller is told about a
    /// taken name or tag without waiting on the camera. Frames consumed
    /// here are capture frames; they do not mark attendance.
    fn register(&mut self, name: &str, tag: u32) -> Result<(), PipelineError> {
        if name.is_empty() {
            return Err(PipelineError::InvalidRegistration(
                "name must not be empty".into(),
            ));
        }
        if tag == 0 {
            return Err(PipelineError::InvalidRegistration(
                "tag must be a positive integer".into(),
            ));
        }
        let roster = self.store.snapshot();
        if let Some(existing) = roster.iter().find(|i| i.name == name) {
            return Err(EnrollError::DuplicateName(existing.name.clone()).into());
        }
        if roster.iter().any(|i| i.tag == tag) {
            return Err(EnrollError::DuplicateTag(tag).into());
        }

        for _ in 0..self.register_frame_budget {
            let Some(faces) = self.source.next_frame()? else {
                break;
            };
            if let Some(face) = faces.first() {
                self.store.enroll(name, tag, face.embedding.clone())?;
                tracing::info!(name, tag, "registered from live feed");
                return Ok(());
            }
        }
        Err(PipelineError::NoFaceDetected)
    }

    fn process_frame(&mut self, faces: &[ObservedFace]) {
        self.frames_processed += 1;
        let mut line = NO_MATCH_LINE.to_string();

        for face in faces {
            match self.engine.classify(&face.embedding) {
                Match::Matched { identity, distance } => {
                    tracing::debug!(name = %identity.name, distance, "face recognized");
                    match self.machine.observe(&identity, Utc::now()) {
                        Observation::Accepted(event) => {
                            match self.ledger.append(&event) {
                                Ok(()) => self.events_recorded += 1,
                                // The sink is an external collaborator; a
                                // failed write must not poison core state.
                                Err(err) => {
                                    tracing::error!(error = %err, "attendance event not persisted")
                                }
                            }
                            line = notification_line(&event);
                        }
                        Observation::Suppressed => {
                            line = format!(
                                "Recognized {} ({}) - attendance already marked",
                                identity.name, identity.tag
                            );
                        }
                    }
                }
                Match::Unknown => {}
            }
        }

        self.notifier.notify(&line);
        self.last_notification = line;
    }
}

/// Spawn the pipeline on a dedicated OS thread and return its handle.
#[allow(clippy::too_many_arguments)]
pub fn spawn_pipeline<S>(
    source: S,
    store: Arc<IdentityStore>,
    engine: MatchEngine,
    machine: AttendanceStateMachine,
    ledger: CsvLedger,
    notifier: Box<dyn Notifier>,
    register_frame_budget: usize,
) -> PipelineHandle
where
    S: FrameSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<PipelineRequest>(16);

    let pipeline = Pipeline {
        source,
        store,
        engine,
        machine,
        ledger,
        notifier,
        register_frame_budget,
        frames_processed: 0,
        events_recorded: 0,
        last_notification: String::new(),
    };

    std::thread::Builder::new()
        .name("rollcall-pipeline".into())
        .spawn(move || pipeline.run(rx))
        .expect("failed to spawn pipeline thread");

    PipelineHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rollcall_core::{BoundingBox, Embedding, Status};
    use std::collections::VecDeque;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct VecSource(VecDeque<Vec<ObservedFace>>);

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Vec<ObservedFace>>, SourceError> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier(Arc<Mutex<Vec<String>>>);

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    fn face(values: Vec<f32>) -> ObservedFace {
        ObservedFace {
            embedding: Embedding::new(values),
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        }
    }

    fn scratch_ledger(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "rollcall-pipeline-{tag}-{}.csv",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        path
    }

    fn spawn(
        frames: Vec<Vec<ObservedFace>>,
        store: Arc<IdentityStore>,
        cooldown: Duration,
        ledger_path: &PathBuf,
    ) -> (PipelineHandle, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let handle = spawn_pipeline(
            VecSource(frames.into()),
            Arc::clone(&store),
            MatchEngine::new(Arc::clone(&store), MatchEngine::DEFAULT_THRESHOLD),
            AttendanceStateMachine::new(cooldown),
            CsvLedger::new(ledger_path),
            Box::new(notifier.clone()),
            4,
        );
        (handle, notifier)
    }

    async fn wait_for_frames(handle: &PipelineHandle, frames: u64) -> StatusReport {
        loop {
            let report = handle.status().await.unwrap();
            if report.frames_processed >= frames {
                return report;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_recognized_faces_toggle_through_the_ledger() {
        let store = Arc::new(IdentityStore::new());
        store
            .enroll("Alice", 7, Embedding::new(vec![0.1, 0.1]))
            .unwrap();

        let ledger_path = scratch_ledger("toggle");
        // Zero cooldown: every sighting is at or past the boundary.
        let frames = vec![
            vec![face(vec![0.1, 0.1])],
            vec![face(vec![0.1, 0.1])],
            vec![face(vec![5.0, 5.0])], // unknown
        ];
        let (handle, notifier) = spawn(frames, store, Duration::zero(), &ledger_path);

        let report = wait_for_frames(&handle, 3).await;
        assert_eq!(report.events_recorded, 2);
        assert_eq!(report.last_notification, NO_MATCH_LINE);

        let contents = fs::read_to_string(&ledger_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Name,Face ID,Status,Date-Time");
        assert!(lines[1].starts_with("Alice,7,IN,"));
        assert!(lines[2].starts_with("Alice,7,OUT,"));

        let notified = notifier.0.lock().unwrap();
        assert!(notified[0].starts_with("Attendance marked for Alice (7) - Status: IN"));
        assert!(notified[1].starts_with("Attendance marked for Alice (7) - Status: OUT"));
        assert_eq!(notified[2], NO_MATCH_LINE);

        fs::remove_file(&ledger_path).unwrap();
    }

    #[tokio::test]
    async fn test_repeat_sighting_inside_cooldown_is_suppressed() {
        let store = Arc::new(IdentityStore::new());
        store
            .enroll("Alice", 7, Embedding::new(vec![0.1, 0.1]))
            .unwrap();

        let ledger_path = scratch_ledger("cooldown");
        let frames = vec![vec![face(vec![0.1, 0.1])], vec![face(vec![0.1, 0.1])]];
        let (handle, notifier) =
            spawn(frames, store, Duration::seconds(300), &ledger_path);

        let report = wait_for_frames(&handle, 2).await;
        assert_eq!(report.events_recorded, 1);

        let notified = notifier.0.lock().unwrap();
        assert_eq!(
            notified[1],
            "Recognized Alice (7) - attendance already marked"
        );

        fs::remove_file(&ledger_path).unwrap();
    }

    #[tokio::test]
    async fn test_register_validates_before_touching_the_feed() {
        let store = Arc::new(IdentityStore::new());
        store
            .enroll("Alice", 7, Embedding::new(vec![0.1, 0.1]))
            .unwrap();

        let ledger_path = scratch_ledger("register-validate");
        let (handle, _) = spawn(Vec::new(), Arc::clone(&store), Duration::zero(), &ledger_path);

        assert!(matches!(
            handle.register("", 9).await,
            Err(PipelineError::InvalidRegistration(_))
        ));
        assert!(matches!(
            handle.register("Bob", 0).await,
            Err(PipelineError::InvalidRegistration(_))
        ));
        assert!(matches!(
            handle.register("Alice", 9).await,
            Err(PipelineError::Enroll(EnrollError::DuplicateName(_)))
        ));
        assert!(matches!(
            handle.register("Bob", 7).await,
            Err(PipelineError::Enroll(EnrollError::DuplicateTag(7)))
        ));
        assert_eq!(store.len(), 1);

        let _ = fs::remove_file(&ledger_path);
    }

    #[tokio::test]
    async fn test_register_with_no_face_in_budget_is_rejected() {
        let store = Arc::new(IdentityStore::new());
        let ledger_path = scratch_ledger("register-noface");
        let (handle, _) = spawn(Vec::new(), Arc::clone(&store), Duration::zero(), &ledger_path);

        assert!(matches!(
            handle.register("Bob", 8).await,
            Err(PipelineError::NoFaceDetected)
        ));
        assert!(store.is_empty());

        let _ = fs::remove_file(&ledger_path);
    }

    fn pipeline_with(
        frames: Vec<Vec<ObservedFace>>,
        store: Arc<IdentityStore>,
        ledger_path: &PathBuf,
    ) -> Pipeline<VecSource> {
        Pipeline {
            source: VecSource(frames.into()),
            store: Arc::clone(&store),
            engine: MatchEngine::new(Arc::clone(&store), MatchEngine::DEFAULT_THRESHOLD),
            machine: AttendanceStateMachine::new(Duration::zero()),
            ledger: CsvLedger::new(ledger_path),
            notifier: Box::new(RecordingNotifier::default()),
            register_frame_budget: 4,
            frames_processed: 0,
            events_recorded: 0,
            last_notification: String::new(),
        }
    }

    #[test]
    fn test_register_captures_the_first_face_from_the_feed() {
        let store = Arc::new(IdentityStore::new());
        let ledger_path = scratch_ledger("register-ok");
        // One faceless frame, then the capture frame.
        let frames = vec![Vec::new(), vec![face(vec![0.4, 0.4])]];
        let mut pipeline = pipeline_with(frames, Arc::clone(&store), &ledger_path);

        pipeline.register("Bob", 8).unwrap();

        let roster = store.snapshot();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].name, "Bob");
        assert_eq!(roster[0].tag, 8);
        assert_eq!(roster[0].embedding.values, vec![0.4, 0.4]);
        // Capture frames do not mark attendance.
        assert_eq!(pipeline.frames_processed, 0);

        let _ = fs::remove_file(&ledger_path);
    }

    #[test]
    fn test_register_gives_up_after_the_frame_budget() {
        let store = Arc::new(IdentityStore::new());
        let ledger_path = scratch_ledger("register-budget");
        // More faceless frames than the budget of 4.
        let frames = vec![Vec::new(); 6];
        let mut pipeline = pipeline_with(frames, Arc::clone(&store), &ledger_path);

        assert!(matches!(
            pipeline.register("Bob", 8),
            Err(PipelineError::NoFaceDetected)
        ));
        assert!(store.is_empty());

        let _ = fs::remove_file(&ledger_path);
    }

    #[test]
    fn test_notification_line_format() {
        use chrono::TimeZone;
        let event = AttendanceEvent {
            name: "Alice".into(),
            tag: 7,
            status: Status::In,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        assert_eq!(
            notification_line(&event),
            "Attendance marked for Alice (7) - Status: IN - Time: 2023-11-14 22:13:20"
        );
    }
}
