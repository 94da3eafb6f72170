//! Batch onboarding.
//!
//! Each submitted address goes through fetch, parse, layout resolution,
//! event resolution and persistence on its own. A failure rejects that
//! address only; the rest of the batch carries on. Once the batch is done,
//! the ids of every accepted contract are handed to the backfill launcher in
//! a single dispatch, without waiting for it to finish.

pub mod errors;

pub use errors::{OnboardError, RejectReason, Stage};

use crate::backfill::{BackfillHandle, BackfillLauncher};
use crate::events::EventCatalogBuilder;
use crate::layout::resolve_layout;
use crate::metadata::MetadataSource;
use crate::source::{SolidityParser, SourceParser};
use crate::store::{ContractId, ContractStore, ResolvedContract};
use alloy_primitives::Address;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings for an [`Onboarder`].
#[derive(Debug, Clone, Default)]
pub struct OnboardConfig {
    /// When set, callers must present this value as their credential.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedContract {
    /// Address as submitted
    pub address: String,
    pub contract_id: ContractId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedAddress {
    /// Address as submitted
    pub address: String,
    pub stage: Stage,
    pub reason: RejectReason,
}

/// Result for a single address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnboardingOutcome {
    Accepted(AcceptedContract),
    Rejected(RejectedAddress),
}

/// Result of a batch. Outcomes are in submission order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<OnboardingOutcome>,
    /// Present when at least one contract was accepted and a launcher is set
    pub backfill: Option<BackfillHandle>,
}

impl BatchReport {
    pub fn success(&self) -> impl Iterator<Item = &AcceptedContract> {
        self.outcomes.iter().filter_map(|o| match o {
            OnboardingOutcome::Accepted(a) => Some(a),
            OnboardingOutcome::Rejected(_) => None,
        })
    }

    pub fn fail(&self) -> impl Iterator<Item = &RejectedAddress> {
        self.outcomes.iter().filter_map(|o| match o {
            OnboardingOutcome::Rejected(r) => Some(r),
            OnboardingOutcome::Accepted(_) => None,
        })
    }

    pub fn contract_ids(&self) -> Vec<ContractId> {
        self.success().map(|a| a.contract_id).collect()
    }

    /// Rejected addresses worth resubmitting.
    pub fn retryable(&self) -> Vec<String> {
        self.fail().filter(|r| r.reason.is_retryable()).map(|r| r.address.clone()).collect()
    }

    /// Wire form: `{ success: [address], fail: [{address, stage, reason}] }`.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            success: self.success().map(|a| a.address.clone()).collect(),
            fail: self
                .fail()
                .map(|r| FailedEntry {
                    address: r.address.clone(),
                    stage: r.stage,
                    reason: r.reason.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: Vec<String>,
    pub fail: Vec<FailedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub address: String,
    pub stage: Stage,
    pub reason: String,
}

/// Runs onboarding batches against a metadata source and a store.
pub struct Onboarder {
    metadata: Arc<dyn MetadataSource>,
    store: Arc<dyn ContractStore>,
    parser: Arc<dyn SourceParser>,
    launcher: Option<Arc<dyn BackfillLauncher>>,
    config: OnboardConfig,
}

impl Onboarder {
    pub fn new(metadata: Arc<dyn MetadataSource>, store: Arc<dyn ContractStore>) -> Self {
        Self {
            metadata,
            store,
            parser: Arc::new(SolidityParser),
            launcher: None,
            config: OnboardConfig::default(),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn SourceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BackfillLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_config(mut self, config: OnboardConfig) -> Self {
        self.config = config;
        self
    }

    fn authorize(&self, credential: Option<&str>) -> Result<(), OnboardError> {
        match &self.config.api_key {
            Some(key) if credential != Some(key.as_str()) => Err(OnboardError::Unauthorized),
            _ => Ok(()),
        }
    }

    /// Onboard every address in `addresses`.
    ///
    /// Only an authorization failure fails the call; per-address problems are
    /// reported in the returned [`BatchReport`].
    pub async fn onboard_batch(
        &self,
        credential: Option<&str>,
        addresses: &[String],
    ) -> Result<BatchReport, OnboardError> {
        self.authorize(credential)?;
        info!(count = addresses.len(), "onboarding batch");

        let mut outcomes = Vec::with_capacity(addresses.len());
        for address in addresses {
            outcomes.push(self.onboard(address).await);
        }

        let mut report = BatchReport { outcomes, backfill: None };
        let ids = report.contract_ids();
        info!(accepted = ids.len(), rejected = report.fail().count(), "batch complete");

        if !ids.is_empty() {
            report.backfill = self.launcher.as_ref().map(|launcher| launcher.launch(ids));
        }
        Ok(report)
    }

    /// Onboard a single address.
    pub async fn onboard(&self, address: &str) -> OnboardingOutcome {
        match self.process(address).await {
            Ok((contract_id, name)) => {
                info!(address, contract_id, %name, "contract onboarded");
                OnboardingOutcome::Accepted(AcceptedContract {
                    address: address.to_string(),
                    contract_id,
                    name,
                })
            }
            Err(reason) => {
                let stage = reason.stage();
                warn!(address, %stage, %reason, "contract rejected");
                OnboardingOutcome::Rejected(RejectedAddress {
                    address: address.to_string(),
                    stage,
                    reason,
                })
            }
        }
    }

    async fn process(&self, input: &str) -> Result<(ContractId, String), RejectReason> {
        let address: Address = input
            .trim()
            .parse()
            .map_err(|_| RejectReason::InvalidAddress(input.to_string()))?;

        debug!(%address, stage = %Stage::Fetching, "fetching metadata");
        let metadata = self.metadata.fetch(address).await?;

        debug!(%address, stage = %Stage::Parsing, "parsing source");
        let selector = Some(metadata.name.as_str()).filter(|name| !name.is_empty());
        let parsed = self.parser.parse(&metadata.source_code, selector)?;

        let contract = &parsed.contract;
        debug!(%address, stage = %Stage::Resolving, %contract, "resolving layout");
        let layout = resolve_layout(&parsed.variables, &parsed.catalog)?;

        debug!(%address, stage = %Stage::Persisting, slots = layout.slots_used, "persisting");
        let event_ids = EventCatalogBuilder::new(self.store.as_ref()).build(&metadata.abi).await?;
        let name = if metadata.name.is_empty() { parsed.contract } else { metadata.name };
        let contract = ResolvedContract {
            address,
            name: name.clone(),
            abi: metadata.abi,
            layout,
            event_ids,
        };
        let id = self.store.insert_contract(contract).await?;
        Ok((id, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::BackfillSummary;
    use crate::metadata::{ContractMetadata, MetadataFetchError};
    use crate::store::{InMemoryStore, PersistenceError};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const TOKEN_SOURCE: &str = r#"
        contract Token {
            address owner;
            bool paused;
            mapping(address => uint256) balances;
        }
    "#;

    fn addr(n: u8) -> String {
        format!("0x{:040x}", n)
    }

    fn token(name: &str) -> ContractMetadata {
        ContractMetadata {
            name: name.to_string(),
            abi: json!([
                {"type": "event", "name": "Transfer"},
                {"type": "event", "name": "Approval"}
            ]),
            source_code: TOKEN_SOURCE.replace("Token", name),
        }
    }

    #[derive(Default)]
    struct MapSource {
        entries: HashMap<Address, Result<ContractMetadata, MetadataFetchError>>,
        calls: Mutex<usize>,
    }

    impl MapSource {
        fn with(
            mut self,
            address: &str,
            entry: Result<ContractMetadata, MetadataFetchError>,
        ) -> Self {
            self.entries.insert(address.parse().unwrap(), entry);
            self
        }
    }

    fn single_token() -> MapSource {
        MapSource::default().with(&addr(1), Ok(token("Token")))
    }

    #[async_trait::async_trait]
    impl MetadataSource for MapSource {
        async fn fetch(&self, address: Address) -> Result<ContractMetadata, MetadataFetchError> {
            *self.calls.lock().unwrap() += 1;
            self.entries
                .get(&address)
                .cloned()
                .unwrap_or(Err(MetadataFetchError::NotFound(address)))
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        dispatched: Mutex<Vec<Vec<ContractId>>>,
    }

    impl BackfillLauncher for RecordingLauncher {
        fn launch(&self, ids: Vec<ContractId>) -> BackfillHandle {
            self.dispatched.lock().unwrap().push(ids.clone());
            let summary = BackfillSummary { ids: ids.clone(), stdout_lines: 0, stderr_lines: 0 };
            BackfillHandle::spawn(ids, async move { Ok(summary) })
        }
    }

    fn onboarder(source: MapSource) -> (Onboarder, Arc<InMemoryStore>, Arc<RecordingLauncher>) {
        let store = Arc::new(InMemoryStore::new());
        let launcher = Arc::new(RecordingLauncher::default());
        let onboarder =
            Onboarder::new(Arc::new(source), store.clone()).with_launcher(launcher.clone());
        (onboarder, store, launcher)
    }

    // ── Happy path ──

    #[tokio::test]
    async fn test_single_contract_onboarded() {
        let (onboarder, store, launcher) = onboarder(single_token());
        let report = onboarder.onboard_batch(None, &[addr(1)]).await.unwrap();

        assert_eq!(report.contract_ids(), vec![1]);
        let stored = store.contract(1).await.unwrap().unwrap();
        assert_eq!(stored.name, "Token");
        assert_eq!(stored.layout.get("balances").unwrap().slot, 1);
        assert_eq!(stored.event_ids, vec![1, 2]);

        let backfill = report.backfill.expect("backfill dispatched");
        assert_eq!(backfill.await.unwrap().ids, vec![1]);
        assert_eq!(*launcher.dispatched.lock().unwrap(), vec![vec![1]]);
    }

    // ── Batch resilience ──

    #[tokio::test]
    async fn test_one_failure_does_not_sink_the_batch() {
        let source = MapSource::default()
            .with(&addr(1), Ok(token("A")))
            .with(&addr(2), Err(MetadataFetchError::Transient("timeout".into())))
            .with(&addr(3), Ok(token("C")));
        let (onboarder, _store, launcher) = onboarder(source);

        let report = onboarder.onboard_batch(None, &[addr(1), addr(2), addr(3)]).await.unwrap();
        let summary = report.summary();
        assert_eq!(summary.success, vec![addr(1), addr(3)]);
        assert_eq!(summary.fail.len(), 1);
        assert_eq!(summary.fail[0].address, addr(2));
        assert_eq!(summary.fail[0].stage, Stage::Fetching);
        assert_eq!(report.retryable(), vec![addr(2)]);
        assert_eq!(*launcher.dispatched.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_stage_of_each_rejection() {
        let unparsable = ContractMetadata {
            name: "Bad".into(),
            abi: json!([]),
            source_code: "contract Bad { uint256 x }".into(),
        };
        let unresolvable = ContractMetadata {
            name: "Empty".into(),
            abi: json!([]),
            source_code: "struct E {} contract Empty { E e; }".into(),
        };
        let source = MapSource::default()
            .with(&addr(1), Ok(unparsable))
            .with(&addr(2), Ok(unresolvable));
        let (onboarder, _store, launcher) = onboarder(source);

        let report = onboarder
            .onboard_batch(None, &["not-an-address".to_string(), addr(1), addr(2), addr(9)])
            .await
            .unwrap();
        let stages: Vec<Stage> = report.fail().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Fetching, Stage::Parsing, Stage::Resolving, Stage::Fetching]
        );
        assert!(report.retryable().is_empty());
        assert!(report.backfill.is_none());
        assert!(launcher.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_address_never_fetches() {
        let source = MapSource::default();
        let store = Arc::new(InMemoryStore::new());
        let source = Arc::new(source);
        let onboarder = Onboarder::new(source.clone(), store);

        let outcome = onboarder.onboard("0x1234").await;
        let OnboardingOutcome::Rejected(rejected) = outcome else {
            panic!("expected rejection");
        };
        assert!(matches!(rejected.reason, RejectReason::InvalidAddress(_)));
        assert_eq!(*source.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resubmitted_address_is_duplicate() {
        let (onboarder, _store, _launcher) = onboarder(single_token());
        onboarder.onboard_batch(None, &[addr(1)]).await.unwrap();

        let report = onboarder.onboard_batch(None, &[addr(1)]).await.unwrap();
        let rejected: Vec<&RejectedAddress> = report.fail().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].stage, Stage::Persisting);
        assert!(matches!(
            rejected[0].reason,
            RejectReason::Persist(PersistenceError::DuplicateContract(_))
        ));
        assert!(report.backfill.is_none());
    }

    #[tokio::test]
    async fn test_shared_events_reuse_ids() {
        let source = MapSource::default()
            .with(&addr(1), Ok(token("A")))
            .with(&addr(2), Ok(token("B")));
        let (onboarder, store, _launcher) = onboarder(source);
        onboarder.onboard_batch(None, &[addr(1), addr(2)]).await.unwrap();

        let a = store.contract(1).await.unwrap().unwrap();
        let b = store.contract(2).await.unwrap().unwrap();
        assert_eq!(a.event_ids, b.event_ids);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (onboarder, _store, launcher) = onboarder(MapSource::default());
        let report = onboarder.onboard_batch(None, &[]).await.unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.backfill.is_none());
        assert!(launcher.dispatched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_parser_errors_reject_at_parsing() {
        struct NoContracts;

        impl SourceParser for NoContracts {
            fn parse(
                &self,
                _source: &str,
                _contract: Option<&str>,
            ) -> Result<crate::source::ParsedSource, crate::source::ParseError> {
                Err(crate::source::ParseError::NoContract)
            }
        }

        let (onboarder, store, _launcher) = onboarder(single_token());
        let onboarder = onboarder.with_parser(Arc::new(NoContracts));
        let report = onboarder.onboard_batch(None, &[addr(1)]).await.unwrap();

        let rejected: Vec<&RejectedAddress> = report.fail().collect();
        assert_eq!(rejected[0].stage, Stage::Parsing);
        assert_eq!(store.contract_count().await, 0);
    }

    // ── Authorization ──

    #[tokio::test]
    async fn test_credential_checked_when_key_configured() {
        let (onboarder, _store, _launcher) = onboarder(single_token());
        let onboarder = onboarder.with_config(OnboardConfig { api_key: Some("secret".into()) });

        let err = onboarder.onboard_batch(Some("wrong"), &[addr(1)]).await.unwrap_err();
        assert_eq!(err, OnboardError::Unauthorized);
        let err = onboarder.onboard_batch(None, &[addr(1)]).await.unwrap_err();
        assert_eq!(err, OnboardError::Unauthorized);

        let report = onboarder.onboard_batch(Some("secret"), &[addr(1)]).await.unwrap();
        assert_eq!(report.contract_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_no_key_accepts_any_credential() {
        let (onboarder, _store, _launcher) = onboarder(MapSource::default());
        assert!(onboarder.onboard_batch(Some("anything"), &[]).await.is_ok());
    }

    #[test]
    fn test_summary_serializes() {
        let report = BatchReport {
            outcomes: vec![OnboardingOutcome::Rejected(RejectedAddress {
                address: "0xabc".into(),
                stage: Stage::Fetching,
                reason: RejectReason::InvalidAddress("0xabc".into()),
            })],
            backfill: None,
        };
        let value = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(value["success"], json!([]));
        assert_eq!(value["fail"][0]["stage"], "fetching");
    }
}
