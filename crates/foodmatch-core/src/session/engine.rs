//! Session engine: creation, parameter refresh, swiping, votes and consensus.
//!
//! Every operation validates its input before touching a session, and a
//! failed or cancelled places search leaves the session exactly as it was.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::consensus;
use crate::error::{Error, ProviderError, Result};
use crate::location::LocationProvider;
use crate::places::{PlacesProvider, SearchRequest};
use crate::types::{
    Advance, AgreementScore, Location, ParameterUpdate, Place, SearchParameters, Session,
};

use super::SessionStore;

/// Group swipe sessions over a places provider.
pub struct SessionEngine {
    store: SessionStore,
    places: Arc<dyn PlacesProvider>,
    config: EngineConfig,
}

impl SessionEngine {
    /// Create an engine with an empty store.
    ///
    /// Fails with [`Error::Config`] when `config` does not validate.
    pub fn new(places: Arc<dyn PlacesProvider>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: SessionStore::new(),
            places,
            config,
        })
    }

    /// Create with default configuration.
    pub fn with_defaults(places: Arc<dyn PlacesProvider>) -> Self {
        Self {
            store: SessionStore::new(),
            places,
            config: EngineConfig::default(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Search places, bounded by the configured timeout.
    async fn search(
        &self,
        location: Location,
        parameters: &SearchParameters,
    ) -> std::result::Result<Vec<Place>, ProviderError> {
        let request = SearchRequest::new(location, parameters);
        let timeout = self.config.provider_timeout();

        match tokio::time::timeout(timeout, self.places.search(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::unavailable(format!(
                "search timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Create a session and return its id.
    ///
    /// Nothing is stored unless the search yields at least one candidate;
    /// provider failures and empty results both surface as `NoCandidates`.
    pub async fn create_session(
        &self,
        parameters: SearchParameters,
        location: Location,
    ) -> Result<String> {
        parameters.validate()?;
        location.validate()?;

        let candidates = match self.search(location, &parameters).await {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                warn!("No places found near {:?}", location);
                return Err(Error::NoCandidates { source: None });
            }
            Err(e) => {
                warn!("Failed to fetch places: {}", e);
                return Err(Error::NoCandidates { source: Some(e) });
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let session = self
            .store
            .create(session_id.clone(), parameters, location, candidates)
            .await?;

        info!(
            "Session {} created with {} candidates",
            session_id,
            session.candidates.len()
        );
        Ok(session_id)
    }

    /// Create a session at the device's current location.
    pub async fn create_session_here(
        &self,
        parameters: SearchParameters,
        locator: &dyn LocationProvider,
    ) -> Result<String> {
        parameters.validate()?;
        let location = locator
            .current_location()
            .ok_or(Error::LocationUnavailable)?;
        self.create_session(parameters, location).await
    }

    /// Add a member to a session. Re-joining is a no-op.
    pub async fn join(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.store.join(session_id, user_id).await
    }

    /// Snapshot of a session.
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.store.get(session_id).await
    }

    /// Merge `update` into the parameters and refresh the candidates.
    ///
    /// On success the cursor returns to 0 and, when configured, recorded
    /// likes are dropped. On failure the session is left untouched.
    pub async fn update_parameters(&self, session_id: &str, update: ParameterUpdate) -> Result<()> {
        let handle = self.store.handle(session_id).await?;
        // Held across the search: updates and votes on this session wait.
        let mut session = handle.lock().await;

        let parameters = session.parameters.merge(&update);
        parameters.validate()?;

        let candidates = self
            .search(session.location, &parameters)
            .await
            .inspect_err(|e| warn!("Refresh of session {} failed: {}", session_id, e))?;
        if candidates.is_empty() {
            warn!("Refresh of session {} found no places", session_id);
            return Err(Error::NoCandidates { source: None });
        }

        session.refresh(
            parameters,
            candidates,
            self.config.clear_agreements_on_update,
        );
        info!(
            "Session {} parameters updated: {:?}, {} candidates",
            session_id,
            session.parameters,
            session.candidates.len()
        );
        Ok(())
    }

    /// Candidate currently presented, `None` once exhausted.
    pub async fn current_candidate(&self, session_id: &str) -> Result<Option<Place>> {
        let handle = self.store.handle(session_id).await?;
        let session = handle.lock().await;
        Ok(session.current().cloned())
    }

    /// Move to the next candidate. Exhaustion is terminal until the next
    /// parameter update.
    pub async fn advance(&self, session_id: &str) -> Result<Advance> {
        let handle = self.store.handle(session_id).await?;
        let mut session = handle.lock().await;
        let result = session.advance();
        debug!("Session {} advance: {:?}", session_id, result);
        Ok(result)
    }

    /// Record a member's swipe on a place.
    ///
    /// A like requires the place to be a current candidate; withdrawing a
    /// like works for any place.
    pub async fn vote(
        &self,
        session_id: &str,
        user_id: &str,
        place_id: &str,
        liked: bool,
    ) -> Result<()> {
        let handle = self.store.handle(session_id).await?;
        let mut session = handle.lock().await;

        if !session.is_member(user_id) {
            return Err(Error::unknown_member(session_id, user_id));
        }

        if liked {
            let place = session
                .candidate(place_id)
                .cloned()
                .ok_or_else(|| Error::unknown_place(session_id, place_id))?;
            session.like(&place, user_id);
        } else {
            session.unlike(place_id, user_id);
        }

        debug!(
            "Session {}: {} {} {}",
            session_id,
            user_id,
            if liked { "liked" } else { "passed on" },
            place_id
        );
        Ok(())
    }

    /// Places liked by every current member.
    pub async fn consensus(&self, session_id: &str) -> Result<Vec<Place>> {
        let session = self.store.get(session_id).await?;
        Ok(consensus::unanimous(&session))
    }

    /// Every liked place ranked by share of members.
    pub async fn agreement_scores(&self, session_id: &str) -> Result<Vec<AgreementScore>> {
        let session = self.store.get(session_id).await?;
        Ok(consensus::scores(&session))
    }

    /// Write the ranked list to `path`, replacing any existing file.
    pub async fn export_consensus(&self, session_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let scores = self.agreement_scores(session_id).await?;
        tokio::fs::write(path.as_ref(), consensus::render_scores(&scores)).await?;
        info!(
            "Consensus list for session {} saved to {:?}",
            session_id,
            path.as_ref()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::assert_ok;

    type Reply = std::result::Result<Vec<Place>, ProviderError>;

    /// Provider replaying canned replies in order.
    struct ScriptedPlaces {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl ScriptedPlaces {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<SearchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlacesProvider for ScriptedPlaces {
        async fn search(&self, request: &SearchRequest) -> Reply {
            self.requests.lock().unwrap().push(*request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected places search")
        }
    }

    /// Provider that never answers in time.
    struct StalledPlaces {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlacesProvider for StalledPlaces {
        async fn search(&self, _request: &SearchRequest) -> Reply {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![Place::new("late", "Too Late")])
        }
    }

    fn params() -> SearchParameters {
        SearchParameters::new(1000, 2, 4.0)
    }

    fn here() -> Location {
        Location::new(37.7749, -122.4194)
    }

    fn sample(ids: &[&str]) -> Vec<Place> {
        ids.iter().map(|id| Place::new(*id, format!("Place {}", id))).collect()
    }

    fn ids(places: &[Place]) -> Vec<&str> {
        places.iter().map(|p| p.place_id.as_str()).collect()
    }

    async fn engine_with_session(
        candidates: &[&str],
        more: Vec<Reply>,
    ) -> (SessionEngine, Arc<ScriptedPlaces>, String) {
        let mut replies = vec![Ok(sample(candidates))];
        replies.extend(more);
        let places = ScriptedPlaces::new(replies);
        let engine = SessionEngine::with_defaults(places.clone());
        let id = engine.create_session(params(), here()).await.unwrap();
        (engine, places, id)
    }

    #[tokio::test]
    async fn test_create_session() {
        let (engine, places, id) = engine_with_session(&["p1", "p2", "p3"], vec![]).await;

        let session = engine.session(&id).await.unwrap();
        assert_eq!(session.cursor, 0);
        assert_eq!(session.candidates, sample(&["p1", "p2", "p3"]));
        assert_eq!(session.parameters, params());
        assert!(session.members.is_empty());
        assert!(session.agreements.is_empty());

        let requests = places.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], SearchRequest::new(here(), &params()));
    }

    #[tokio::test]
    async fn test_create_session_ids_are_unique() {
        let places = ScriptedPlaces::new(vec![Ok(sample(&["p1"])), Ok(sample(&["p1"]))]);
        let engine = SessionEngine::with_defaults(places);
        let a = engine.create_session(params(), here()).await.unwrap();
        let b = engine.create_session(params(), here()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.store().len().await, 2);
    }

    #[tokio::test]
    async fn test_create_session_empty_result() {
        let engine = SessionEngine::with_defaults(ScriptedPlaces::new(vec![Ok(vec![])]));
        let err = engine.create_session(params(), here()).await.unwrap_err();
        assert!(matches!(err, Error::NoCandidates { source: None }));
        assert!(engine.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_session_provider_failure() {
        let engine = SessionEngine::with_defaults(ScriptedPlaces::new(vec![Err(
            ProviderError::unavailable("status 500"),
        )]));
        let err = engine.create_session(params(), here()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NoCandidates { source: Some(ProviderError::Unavailable(_)) }
        ));
        assert!(err.is_retryable());
        assert!(engine.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_session_rejects_bad_input_before_search() {
        let places = ScriptedPlaces::new(vec![]);
        let engine = SessionEngine::with_defaults(places.clone());

        let err = engine
            .create_session(SearchParameters::new(0, 2, 4.0), here())
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        let err = engine
            .create_session(params(), Location::new(95.0, 0.0))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        assert!(places.requests().is_empty());
        assert!(engine.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_session_here() {
        let places = ScriptedPlaces::new(vec![Ok(sample(&["p1"]))]);
        let engine = SessionEngine::with_defaults(places.clone());
        let gps = crate::location::LatestLocation::new();

        let err = engine.create_session_here(params(), &gps).await.unwrap_err();
        assert!(matches!(err, Error::LocationUnavailable));

        gps.update(40.4237, -86.9212).unwrap();
        let id = engine.create_session_here(params(), &gps).await.unwrap();
        let session = engine.session(&id).await.unwrap();
        assert_eq!(session.location, Location::new(40.4237, -86.9212));
        assert_eq!(places.requests()[0].location, Location::new(40.4237, -86.9212));
    }

    #[tokio::test]
    async fn test_create_session_timeout() {
        let places = Arc::new(StalledPlaces {
            calls: AtomicUsize::new(0),
        });
        let config = EngineConfig {
            provider_timeout_secs: 1,
            ..Default::default()
        };
        let engine = SessionEngine::new(places.clone(), config).unwrap();

        let err = engine.create_session(params(), here()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NoCandidates { source: Some(ProviderError::Unavailable(_)) }
        ));
        assert_eq!(places.calls.load(Ordering::SeqCst), 1);
        assert!(engine.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_advance_without_wraparound() {
        let (engine, _, id) = engine_with_session(&["p1", "p2", "p3"], vec![]).await;

        assert_eq!(engine.advance(&id).await.unwrap(), Advance::Advanced(1));
        assert_eq!(engine.advance(&id).await.unwrap(), Advance::Advanced(2));
        assert_eq!(engine.advance(&id).await.unwrap(), Advance::Exhausted);
        assert_eq!(engine.session(&id).await.unwrap().cursor, 3);
        assert!(engine.current_candidate(&id).await.unwrap().is_none());

        assert_eq!(engine.advance(&id).await.unwrap(), Advance::Exhausted);
        assert_eq!(engine.session(&id).await.unwrap().cursor, 3);
    }

    #[tokio::test]
    async fn test_current_candidate_follows_cursor() {
        let (engine, _, id) = engine_with_session(&["p1", "p2"], vec![]).await;
        assert_eq!(engine.current_candidate(&id).await.unwrap().unwrap().place_id, "p1");
        engine.advance(&id).await.unwrap();
        assert_eq!(engine.current_candidate(&id).await.unwrap().unwrap().place_id, "p2");
    }

    #[tokio::test]
    async fn test_update_parameters_refreshes() {
        let (engine, places, id) =
            engine_with_session(&["p1", "p2"], vec![Ok(sample(&["p7", "p8", "p9"]))]).await;
        engine.join(&id, "u1").await.unwrap();
        engine.vote(&id, "u1", "p1", true).await.unwrap();
        engine.advance(&id).await.unwrap();
        engine.advance(&id).await.unwrap();

        engine
            .update_parameters(&id, ParameterUpdate::default().distance(2000))
            .await
            .unwrap();

        let session = engine.session(&id).await.unwrap();
        assert_eq!(session.parameters, SearchParameters::new(2000, 2, 4.0));
        assert_eq!(session.candidates, sample(&["p7", "p8", "p9"]));
        assert_eq!(session.cursor, 0);
        // Likes are dropped by default
        assert!(session.agreements.is_empty());
        assert!(session.is_member("u1"));

        assert_eq!(places.requests()[1].radius_m, 2000);
        assert_eq!(places.requests()[1].location, here());
    }

    #[tokio::test]
    async fn test_update_parameters_can_keep_votes() {
        let places = ScriptedPlaces::new(vec![Ok(sample(&["p1", "p2"])), Ok(sample(&["p2", "p3"]))]);
        let config = EngineConfig {
            clear_agreements_on_update: false,
            ..Default::default()
        };
        let engine = SessionEngine::new(places, config).unwrap();
        let id = engine.create_session(params(), here()).await.unwrap();
        engine.join(&id, "u1").await.unwrap();
        engine.vote(&id, "u1", "p1", true).await.unwrap();

        engine
            .update_parameters(&id, ParameterUpdate::default().price_level(3))
            .await
            .unwrap();
        engine.vote(&id, "u1", "p3", true).await.unwrap();

        // p1 left the candidate list but keeps its vote
        let agreed = engine.consensus(&id).await.unwrap();
        assert_eq!(ids(&agreed), vec!["p3", "p1"]);
    }

    #[tokio::test]
    async fn test_update_parameters_provider_failure_leaves_session() {
        let (engine, _, id) = engine_with_session(
            &["p1", "p2"],
            vec![Err(ProviderError::rate_limited("quota")), Ok(vec![])],
        )
        .await;
        engine.advance(&id).await.unwrap();
        let before = engine.session(&id).await.unwrap();

        let err = engine
            .update_parameters(&id, ParameterUpdate::default().min_rating(3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::RateLimited(_))));
        assert_eq!(engine.session(&id).await.unwrap(), before);

        let err = engine
            .update_parameters(&id, ParameterUpdate::default().min_rating(3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoCandidates { source: None }));
        assert_eq!(engine.session(&id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_parameters_validates_merged_values() {
        let (engine, places, id) = engine_with_session(&["p1"], vec![]).await;
        let before = engine.session(&id).await.unwrap();

        let err = engine
            .update_parameters(&id, ParameterUpdate::default().price_level(7))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
        assert_eq!(engine.session(&id).await.unwrap(), before);
        assert_eq!(places.requests().len(), 1);

        let err = engine
            .update_parameters("missing", ParameterUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_cancelled_update_leaves_session() {
        let places = Arc::new(StalledPlaces {
            calls: AtomicUsize::new(0),
        });
        let engine = SessionEngine::with_defaults(places.clone());
        let id = engine
            .store()
            .create("s-1", params(), here(), sample(&["p1", "p2"]))
            .await
            .unwrap()
            .id;
        engine.advance(&id).await.unwrap();
        let before = engine.session(&id).await.unwrap();

        let update = engine.update_parameters(&id, ParameterUpdate::default().distance(50));
        let outcome = tokio::time::timeout(Duration::from_millis(50), update).await;
        assert!(outcome.is_err());
        assert_eq!(places.calls.load(Ordering::SeqCst), 1);

        // Lock released and nothing changed
        assert_eq!(engine.session(&id).await.unwrap(), before);
        assert_ok!(engine.advance(&id).await);
    }

    #[tokio::test]
    async fn test_update_parameters_timeout() {
        let places = Arc::new(StalledPlaces {
            calls: AtomicUsize::new(0),
        });
        let config = EngineConfig {
            provider_timeout_secs: 1,
            ..Default::default()
        };
        let engine = SessionEngine::new(places.clone(), config).unwrap();
        let id = engine
            .store()
            .create("s-1", params(), here(), sample(&["p1", "p2"]))
            .await
            .unwrap()
            .id;
        engine.advance(&id).await.unwrap();
        let before = engine.session(&id).await.unwrap();

        let err = engine
            .update_parameters(&id, ParameterUpdate::default().distance(50))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Provider(ProviderError::Unavailable(ref message))
                if message == "search timed out after 1s"
        ));
        assert!(err.is_retryable());
        assert_eq!(places.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.session(&id).await.unwrap(), before);
    }

    #[test]
    fn test_new_rejects_zero_timeout() {
        let config = EngineConfig {
            provider_timeout_secs: 0,
            ..Default::default()
        };
        let result = SessionEngine::new(ScriptedPlaces::new(vec![]), config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_vote_requires_membership() {
        let (engine, _, id) = engine_with_session(&["p1", "p2"], vec![]).await;
        engine.join(&id, "u1").await.unwrap();

        let err = engine.vote(&id, "stranger", "p1", true).await.unwrap_err();
        assert!(matches!(err, Error::UnknownMember { ref user_id, .. } if user_id == "stranger"));
        assert!(engine.session(&id).await.unwrap().agreements.is_empty());

        let err = engine.vote(&id, "u1", "nowhere", true).await.unwrap_err();
        assert!(matches!(err, Error::UnknownPlace { .. }));
        assert!(engine.session(&id).await.unwrap().agreements.is_empty());

        let err = engine.vote("missing", "u1", "p1", true).await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_vote_can_be_withdrawn() {
        let (engine, _, id) = engine_with_session(&["p1"], vec![]).await;
        engine.join(&id, "u1").await.unwrap();

        engine.vote(&id, "u1", "p1", true).await.unwrap();
        assert_eq!(ids(&engine.consensus(&id).await.unwrap()), vec!["p1"]);

        engine.vote(&id, "u1", "p1", false).await.unwrap();
        assert!(engine.consensus(&id).await.unwrap().is_empty());
        assert!(engine.session(&id).await.unwrap().voters("p1").is_none());
    }

    #[tokio::test]
    async fn test_consensus() {
        let (engine, _, id) = engine_with_session(&["p1", "p2", "p3"], vec![]).await;
        engine.join(&id, "u1").await.unwrap();
        engine.join(&id, "u2").await.unwrap();

        engine.vote(&id, "u1", "p1", true).await.unwrap();
        engine.vote(&id, "u2", "p1", true).await.unwrap();
        engine.vote(&id, "u1", "p2", true).await.unwrap();
        engine.vote(&id, "u2", "p3", false).await.unwrap();

        let first = engine.consensus(&id).await.unwrap();
        assert_eq!(ids(&first), vec!["p1"]);

        let second = engine.consensus(&id).await.unwrap();
        assert_eq!(first, second);

        let err = engine.consensus("missing").await.unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_votes_are_not_lost() {
        let (engine, _, id) = engine_with_session(&["p1"], vec![]).await;
        let engine = Arc::new(engine);
        let users: Vec<String> = (0..16).map(|i| format!("u{}", i)).collect();
        for u in &users {
            engine.join(&id, u).await.unwrap();
        }

        let mut tasks = Vec::new();
        for u in users.clone() {
            let engine = engine.clone();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                engine.vote(&id, &u, "p1", true).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let session = engine.session(&id).await.unwrap();
        assert_eq!(session.voters("p1").unwrap().len(), users.len());
        assert_eq!(ids(&engine.consensus(&id).await.unwrap()), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_agreement_scores_and_export() {
        let (engine, _, id) = engine_with_session(&["p1", "p2"], vec![]).await;
        engine.join(&id, "u1").await.unwrap();
        engine.join(&id, "u2").await.unwrap();
        engine.vote(&id, "u1", "p2", true).await.unwrap();
        engine.vote(&id, "u1", "p1", true).await.unwrap();
        engine.vote(&id, "u2", "p1", true).await.unwrap();

        let scores = engine.agreement_scores(&id).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].place.place_id, "p1");
        assert_eq!(scores[0].percent, 100.0);
        assert_eq!(scores[1].percent, 50.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus_list.txt");
        std::fs::write(&path, "stale").unwrap();

        engine.export_consensus(&id, &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Place p1 - 100% agreed\nPlace p2 - 50% agreed\n");
    }
}
