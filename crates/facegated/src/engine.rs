use chrono::Utc;
use facegate_core::{
    has_face, Embedding, FaceAnalyzer, MatchOutcome, Matcher, MeanDistanceMatcher, PairVerification,
    PairVerifier, SuspicionPolicy,
};
use facegate_store::{
    AccessLogEntry, Database, Registered, Registration, Statistics, StoreError, UserSummary,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Candidates reported back on a denial.
const DIAGNOSTIC_CANDIDATES: usize = 3;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to start engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Closest identity to a rejected probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub distance: f32,
}

/// Outcome of presenting a capture at the door.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Nothing face-like in the capture; nothing is logged.
    NoFace,
    Granted {
        identity: String,
        confidence: f32,
        emotion: String,
        suspicion_score: f32,
        suspicious: bool,
        department: Option<String>,
    },
    Denied { closest: Vec<Candidate> },
}

/// Everything the engine thread owns. All store reads and writes happen
/// here, one request at a time.
pub struct Engine {
    database: Database,
    analyzer: Box<dyn FaceAnalyzer + Send>,
    matcher: MeanDistanceMatcher,
    verifier: PairVerifier,
    suspicion: SuspicionPolicy,
}

impl Engine {
    pub fn new(
        database: Database,
        analyzer: Box<dyn FaceAnalyzer + Send>,
        matcher: MeanDistanceMatcher,
        verifier: PairVerifier,
        suspicion: SuspicionPolicy,
    ) -> Self {
        Self {
            database,
            analyzer,
            matcher,
            verifier,
            suspicion,
        }
    }

    /// Presence check, match, emotion scoring and logging for one capture.
    pub fn authenticate(&mut self, image: &Path) -> Result<AccessDecision, EngineError> {
        if !has_face(&*self.analyzer, image) {
            tracing::info!(image = %image.display(), "no face in capture");
            return Ok(AccessDecision::NoFace);
        }

        let outcome = match self.analyzer.embed(image) {
            Ok(probe) => self.match_probe(&probe).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "embedding database unavailable; denying");
                MatchOutcome::no_match()
            }),
            Err(e) => {
                tracing::warn!(image = %image.display(), error = %e, "probe embedding failed");
                MatchOutcome::no_match()
            }
        };

        let now = Utc::now();
        let Some(identity) = outcome.identity.clone() else {
            self.database.record_deny(0.0, now)?;
            let closest = outcome
                .closest(DIAGNOSTIC_CANDIDATES)
                .into_iter()
                .map(|(name, distance)| Candidate { name, distance })
                .collect();
            return Ok(AccessDecision::Denied { closest });
        };

        let assessment = self.suspicion.evaluate(&*self.analyzer, image);
        if assessment.suspicious {
            tracing::warn!(identity = %identity, score = assessment.score, "suspicious behaviour flagged");
        }
        self.database.record_grant(
            &identity,
            outcome.confidence,
            &assessment.dominant_emotion,
            assessment.suspicious,
            now,
        )?;
        let department = self
            .database
            .user(&identity)
            .and_then(|u| u.record)
            .map(|r| r.department)
            .filter(|d| !d.is_empty());

        Ok(AccessDecision::Granted {
            identity,
            confidence: outcome.confidence,
            emotion: assessment.dominant_emotion,
            suspicion_score: assessment.score,
            suspicious: assessment.suspicious,
            department,
        })
    }

    /// Match a probe, rebuilding the database once when its embeddings were
    /// produced by a model with a different output size.
    fn match_probe(&mut self, probe: &Embedding) -> Result<MatchOutcome, StoreError> {
        let stale = self
            .database
            .embeddings(&*self.analyzer)?
            .values()
            .flatten()
            .any(|e| !e.same_dimensions(probe));
        if stale {
            tracing::warn!(
                probe = probe.dimensions(),
                "stored embeddings have different dimensions; rebuilding"
            );
            self.database.rebuild(&*self.analyzer)?;
        }
        let database = self.database.embeddings(&*self.analyzer)?;
        Ok(self.matcher.compare(probe, database))
    }

    pub fn register(&mut self, request: Registration) -> Result<Registered, EngineError> {
        Ok(self.database.register(request, &*self.analyzer, Utc::now())?)
    }

    pub fn delete(&mut self, name: &str) -> Result<bool, EngineError> {
        Ok(self.database.delete(name, &*self.analyzer)?)
    }

    /// Rebuild the embedding database. Returns the number of matchable
    /// identities.
    pub fn rebuild(&mut self) -> Result<usize, EngineError> {
        Ok(self.database.rebuild(&*self.analyzer)?.len())
    }

    pub fn compare(&self, a: &Path, b: &Path) -> PairVerification {
        self.verifier.verify(&*self.analyzer, a, b)
    }

    fn handle(&mut self, request: EngineRequest) {
        // Send failures mean the caller went away; nothing to do.
        match request {
            EngineRequest::Authenticate { image, reply } => {
                let _ = reply.send(self.authenticate(&image));
            }
            EngineRequest::Register { request, reply } => {
                let _ = reply.send(self.register(request));
            }
            EngineRequest::Delete { name, reply } => {
                let _ = reply.send(self.delete(&name));
            }
            EngineRequest::Rebuild { reply } => {
                let _ = reply.send(self.rebuild());
            }
            EngineRequest::Users { search, reply } => {
                let _ = reply.send(self.database.users(search.as_deref()));
            }
            EngineRequest::Logs { limit, reply } => {
                let _ = reply.send(self.database.recent(limit));
            }
            EngineRequest::Statistics { reply } => {
                let _ = reply.send(self.database.statistics());
            }
            EngineRequest::Compare { a, b, reply } => {
                let _ = reply.send(self.compare(&a, &b));
            }
        }
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Authenticate {
        image: PathBuf,
        reply: oneshot::Sender<Result<AccessDecision, EngineError>>,
    },
    Register {
        request: Registration,
        reply: oneshot::Sender<Result<Registered, EngineError>>,
    },
    Delete {
        name: String,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    Rebuild {
        reply: oneshot::Sender<Result<usize, EngineError>>,
    },
    Users {
        search: Option<String>,
        reply: oneshot::Sender<Vec<UserSummary>>,
    },
    Logs {
        limit: usize,
        reply: oneshot::Sender<Vec<AccessLogEntry>>,
    },
    Statistics {
        reply: oneshot::Sender<Statistics>,
    },
    Compare {
        a: PathBuf,
        b: PathBuf,
        reply: oneshot::Sender<PairVerification>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(request(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn authenticate(&self, image: PathBuf) -> Result<AccessDecision, EngineError> {
        self.call(|reply| EngineRequest::Authenticate { image, reply })
            .await?
    }

    pub async fn register(&self, request: Registration) -> Result<Registered, EngineError> {
        self.call(|reply| EngineRequest::Register { request, reply })
            .await?
    }

    pub async fn delete(&self, name: String) -> Result<bool, EngineError> {
        self.call(|reply| EngineRequest::Delete { name, reply }).await?
    }

    pub async fn rebuild(&self) -> Result<usize, EngineError> {
        self.call(|reply| EngineRequest::Rebuild { reply }).await?
    }

    pub async fn users(&self, search: Option<String>) -> Result<Vec<UserSummary>, EngineError> {
        self.call(|reply| EngineRequest::Users { search, reply }).await
    }

    pub async fn logs(&self, limit: usize) -> Result<Vec<AccessLogEntry>, EngineError> {
        self.call(|reply| EngineRequest::Logs { limit, reply }).await
    }

    pub async fn statistics(&self) -> Result<Statistics, EngineError> {
        self.call(|reply| EngineRequest::Statistics { reply }).await
    }

    pub async fn compare(&self, a: PathBuf, b: PathBuf) -> Result<PairVerification, EngineError> {
        self.call(|reply| EngineRequest::Compare { a, b, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Every request runs to completion before the next is taken off the
/// channel, so the store has exactly one writer.
pub fn spawn_engine(mut engine: Engine) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_core::testing::{solid_image, ColorAnalyzer};
    use facegate_core::{AnalyzerError, DistanceMetric, EmotionAnalysis, FaceRegion};
    use facegate_store::{AccessStatus, Profile, RegistrationLimits, StoreLayout};
    use std::collections::BTreeMap;

    fn engine(root: &Path, suspicion: SuspicionPolicy) -> Engine {
        let database =
            Database::open(&StoreLayout::new(root.join("data")), RegistrationLimits::default())
                .unwrap();
        Engine::new(
            database,
            Box::new(ColorAnalyzer),
            MeanDistanceMatcher::new(DistanceMetric::Cosine, 0.05),
            PairVerifier::new(DistanceMetric::Cosine, 0.05),
            suspicion,
        )
    }

    fn register(engine: &mut Engine, root: &Path, name: &str, rgb: [u8; 3]) {
        let photos = (0..3)
            .map(|i| solid_image(root, &format!("{name}_{i}.png"), rgb))
            .collect();
        engine
            .register(Registration {
                name: name.to_string(),
                profile: Profile {
                    department: "Security".to_string(),
                    ..Profile::default()
                },
                photos,
            })
            .unwrap();
    }

    #[test]
    fn test_grant_logs_and_stamps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);

        let probe = solid_image(dir.path(), "probe.png", [32, 198, 31]);
        let decision = engine.authenticate(&probe).unwrap();
        match decision {
            AccessDecision::Granted {
                identity,
                emotion,
                suspicious,
                department,
                confidence,
                ..
            } => {
                assert_eq!(identity, "alice");
                assert_eq!(emotion, "happy");
                assert!(!suspicious);
                assert_eq!(department.as_deref(), Some("Security"));
                assert!(confidence > 0.95);
            }
            other => panic!("expected grant, got {other:?}"),
        }

        let log = engine.database.recent(10);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, AccessStatus::Granted);
        let record = engine.database.user("alice").unwrap().record.unwrap();
        assert_eq!(record.total_access_count, 1);
    }

    #[test]
    fn test_stranger_denied_with_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);
        register(&mut engine, dir.path(), "bob", [200, 30, 30]);

        let probe = solid_image(dir.path(), "stranger.png", [30, 30, 200]);
        let decision = engine.authenticate(&probe).unwrap();
        let AccessDecision::Denied { closest } = decision else {
            panic!("expected denial, got {decision:?}");
        };
        assert_eq!(closest.len(), 2);
        assert!(closest[0].distance <= closest[1].distance);

        let log = engine.database.recent(1);
        assert_eq!(log[0].status, AccessStatus::Denied);
        assert_eq!(log[0].user_name, "Unknown");
        assert_eq!(log[0].confidence, 0.0);
    }

    #[test]
    fn test_no_face_short_circuits_without_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);

        let dark = solid_image(dir.path(), "dark.png", [0, 0, 0]);
        assert_eq!(engine.authenticate(&dark).unwrap(), AccessDecision::NoFace);
        assert!(engine.database.recent(10).is_empty());
    }

    #[test]
    fn test_empty_database_denies() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        let probe = solid_image(dir.path(), "p.png", [100, 100, 100]);
        assert_eq!(
            engine.authenticate(&probe).unwrap(),
            AccessDecision::Denied { closest: vec![] }
        );
        assert_eq!(engine.database.statistics().total_denials, 1);
    }

    #[test]
    fn test_suspicious_grant_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let mut weights = BTreeMap::new();
        weights.insert("angry".to_string(), 0.8);
        let mut engine = engine(
            dir.path(),
            SuspicionPolicy {
                weights,
                threshold: 0.5,
            },
        );
        register(&mut engine, dir.path(), "mallory", [210, 40, 40]);

        let probe = solid_image(dir.path(), "probe.png", [212, 41, 39]);
        let AccessDecision::Granted {
            suspicious,
            suspicion_score,
            ..
        } = engine.authenticate(&probe).unwrap()
        else {
            panic!("expected grant");
        };
        assert!(suspicious);
        assert!((suspicion_score - 0.8).abs() < 1e-6);
        assert_eq!(engine.database.statistics().suspicious_count, 1);
    }

    #[test]
    fn test_delete_then_unmatchable() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);
        assert!(engine.delete("alice").unwrap());
        assert_eq!(engine.rebuild().unwrap(), 0);

        let probe = solid_image(dir.path(), "probe.png", [30, 200, 30]);
        assert!(matches!(
            engine.authenticate(&probe).unwrap(),
            AccessDecision::Denied { .. }
        ));
    }

    /// Keeps only the first `n` values of every colour embedding, standing in
    /// for a model with a smaller output.
    struct Truncated(usize);

    impl FaceAnalyzer for Truncated {
        fn detect(&self, image: &Path) -> Result<Vec<FaceRegion>, AnalyzerError> {
            ColorAnalyzer.detect(image)
        }

        fn embed(&self, image: &Path) -> Result<Embedding, AnalyzerError> {
            let mut e = ColorAnalyzer.embed(image)?;
            e.values.truncate(self.0);
            Ok(e)
        }

        fn analyze_emotion(&self, image: &Path) -> Result<EmotionAnalysis, AnalyzerError> {
            ColorAnalyzer.analyze_emotion(image)
        }
    }

    #[test]
    fn test_model_change_rebuilds_instead_of_comparing_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let mut old = engine(dir.path(), SuspicionPolicy::default());
        register(&mut old, dir.path(), "alice", [30, 200, 30]);
        drop(old);

        let database =
            Database::open(&StoreLayout::new(dir.path().join("data")), RegistrationLimits::default())
                .unwrap();
        let mut engine = Engine::new(
            database,
            Box::new(Truncated(2)),
            MeanDistanceMatcher::new(DistanceMetric::Cosine, 0.05),
            PairVerifier::new(DistanceMetric::Cosine, 0.05),
            SuspicionPolicy::default(),
        );
        let probe = solid_image(dir.path(), "probe.png", [30, 200, 30]);
        assert!(matches!(
            engine.authenticate(&probe).unwrap(),
            AccessDecision::Granted { .. }
        ));
        let stored = engine.database.embeddings(&Truncated(2)).unwrap();
        assert!(stored["alice"].iter().all(|e| e.dimensions() == 2));
    }

    #[test]
    fn test_unreadable_embedding_store_degrades_to_denial() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);

        // Force a reload from disk that cannot be read or rewritten.
        let blob = dir.path().join("data/embeddings.bin");
        std::fs::remove_file(&blob).unwrap();
        std::fs::create_dir(&blob).unwrap();
        std::fs::create_dir(dir.path().join("data/embeddings.bin.tmp")).unwrap();
        engine.database = Database::open(
            &StoreLayout::new(dir.path().join("data")),
            RegistrationLimits::default(),
        )
        .unwrap();

        let probe = solid_image(dir.path(), "probe.png", [30, 200, 30]);
        assert_eq!(
            engine.authenticate(&probe).unwrap(),
            AccessDecision::Denied { closest: vec![] }
        );
        assert_eq!(engine.database.statistics().total_denials, 1);
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(dir.path(), SuspicionPolicy::default());
        register(&mut engine, dir.path(), "alice", [30, 200, 30]);
        let handle = spawn_engine(engine).unwrap();

        let users = handle.users(None).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].photo_count, 3);

        let probe = solid_image(dir.path(), "probe.png", [30, 200, 30]);
        let decision = handle.authenticate(probe.clone()).await.unwrap();
        assert!(matches!(decision, AccessDecision::Granted { .. }));

        let stats = handle.statistics().await.unwrap();
        assert_eq!(stats.total_accesses, 1);
        assert_eq!(handle.logs(5).await.unwrap().len(), 1);

        let pair = handle.compare(probe.clone(), probe).await.unwrap();
        assert!(pair.verified);
    }
}
