//! Client façade (C11): owns the signer, MLS credential key, stores, and
//! network collaborator, and routes calls to the per-group runtime.

use std::collections::HashMap;
use std::sync::Arc;

use openmls::prelude::Ciphersuite;
use openmls_basic_credential::SignatureKeyPair;
use tokio::sync::{Mutex, RwLock};

use glade_codec::event::{EventId, PubKey, Rumor};
use glade_codec::welcome::parse_welcome_rumor;
use glade_core::network::Network;
use glade_core::runtime::generate_key_package;
use glade_core::{Environment, GroupRuntime, GroupRuntimeConfig, RuntimeError};
use glade_store::{GroupStateStore, HistoryStore, InMemoryHistoryStore, KeyPackageRecord, KeyPackageStore};

use crate::error::ClientError;
use crate::signer::Signer;

type HistoryFactory = dyn Fn() -> Arc<dyn HistoryStore> + Send + Sync;

/// Owns one identity's worth of groups. Each group's state-advancing
/// operations are serialized through the `Arc<Mutex<GroupRuntime<E>>>`
/// handle returned by [`Client::get_group`] (§5's per-group logical lock);
/// the client itself only ever holds its caches under short-lived locks.
pub struct Client<E: Environment> {
    env: E,
    signer: Arc<dyn Signer>,
    mls_signer: SignatureKeyPair,
    ciphersuite: Ciphersuite,
    state_store: Arc<dyn GroupStateStore>,
    key_package_store: Arc<dyn KeyPackageStore>,
    network: Arc<dyn Network>,
    config: GroupRuntimeConfig,
    history_factory: Arc<HistoryFactory>,
    groups: RwLock<HashMap<[u8; 32], Arc<Mutex<GroupRuntime<E>>>>>,
    histories: RwLock<HashMap<[u8; 32], Arc<dyn HistoryStore>>>,
}

impl<E: Environment> Client<E> {
    /// Construct a client. `history_factory` is optional (§4.11); when
    /// absent, each group gets a fresh in-memory history store that does not
    /// survive a process restart.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        env: E,
        signer: Arc<dyn Signer>,
        mls_signer: SignatureKeyPair,
        ciphersuite: Ciphersuite,
        state_store: Arc<dyn GroupStateStore>,
        key_package_store: Arc<dyn KeyPackageStore>,
        network: Arc<dyn Network>,
        config: GroupRuntimeConfig,
        history_factory: Option<Arc<HistoryFactory>>,
    ) -> Self {
        Client {
            env,
            signer,
            mls_signer,
            ciphersuite,
            state_store,
            key_package_store,
            network,
            config,
            history_factory: history_factory
                .unwrap_or_else(|| Arc::new(|| Arc::new(InMemoryHistoryStore::new()) as Arc<dyn HistoryStore>)),
            groups: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a fresh key package for this identity, construct an MLS
    /// group with the caller as sole member, and force the caller into the
    /// admin set.
    pub async fn create_group(
        &self,
        name: String,
        description: String,
        admin_pubkeys: Vec<PubKey>,
        relays: Vec<String>,
    ) -> Result<[u8; 32], ClientError> {
        let (reference, public_tls_bytes, private_snapshot) = generate_key_package(
            self.env.clone(),
            self.signer.public_key(),
            &self.mls_signer,
            self.ciphersuite,
        )?;
        self.key_package_store
            .put(
                reference,
                KeyPackageRecord {
                    public_tls_bytes,
                    private_bytes: private_snapshot,
                    last_resort: false,
                },
            )
            .await?;

        let history_store = (self.history_factory)();
        let runtime = GroupRuntime::create(
            self.env.clone(),
            self.signer.public_key(),
            self.mls_signer.clone(),
            self.ciphersuite,
            name,
            description,
            admin_pubkeys,
            relays,
            self.config.clone(),
            self.state_store.clone(),
            history_store.clone(),
            self.network.clone(),
        )
        .await?;

        let group_id = runtime.nostr_group_id();
        self.groups.write().await.insert(group_id, Arc::new(Mutex::new(runtime)));
        self.histories.write().await.insert(group_id, history_store);
        Ok(group_id)
    }

    /// Cache-first load of a group's runtime handle.
    pub async fn get_group(&self, group_id: [u8; 32]) -> Result<Arc<Mutex<GroupRuntime<E>>>, ClientError> {
        if let Some(existing) = self.groups.read().await.get(&group_id) {
            return Ok(existing.clone());
        }

        let snapshot = self
            .state_store
            .get(&group_id)
            .await?
            .ok_or(RuntimeError::GroupNotFound)?;
        let history_store = self.history_store_for(group_id).await;
        let runtime = GroupRuntime::from_snapshot(
            self.env.clone(),
            &snapshot,
            group_id,
            self.mls_signer.clone(),
            self.signer.public_key(),
            self.config.clone(),
            self.state_store.clone(),
            history_store,
            self.network.clone(),
        )?;

        let handle = Arc::new(Mutex::new(runtime));
        let mut groups = self.groups.write().await;
        let handle = groups.entry(group_id).or_insert(handle).clone();
        Ok(handle)
    }

    /// Match local key packages against a decoded Welcome rumor and join the
    /// group, trying every candidate in priority order (ordinary key
    /// packages before last-resort ones) until one succeeds.
    ///
    /// `key_package_event_id_hint` is accepted for callers that already know
    /// which `kind=443` event the Welcome targets; the welcome rumor's own
    /// `e` tag (C6) carries the same reference, so the hint is informational
    /// rather than load-bearing for this implementation's matching strategy.
    pub async fn join_group_from_welcome(
        &self,
        welcome_rumor: Rumor,
        key_package_event_id_hint: Option<EventId>,
    ) -> Result<[u8; 32], ClientError> {
        let (welcome_bytes, kp_event_id, _relays) =
            parse_welcome_rumor(&welcome_rumor).map_err(|e| ClientError::Runtime(RuntimeError::Codec(e)))?;
        let _ = key_package_event_id_hint.unwrap_or(kp_event_id);

        let summaries = self.key_package_store.list().await?;
        let mut candidates = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Some(record) = self.key_package_store.get(&summary.reference).await? {
                candidates.push((summary.reference, record));
            }
        }
        candidates.sort_by_key(|(_, record)| record.last_resort);

        let mut last_error = None;
        for (reference, record) in candidates {
            let history_store = (self.history_factory)();
            match GroupRuntime::join(
                self.env.clone(),
                &welcome_bytes,
                &record.private_bytes,
                self.mls_signer.clone(),
                self.signer.public_key(),
                self.config.clone(),
                self.state_store.clone(),
                history_store.clone(),
                self.network.clone(),
            )
            .await
            {
                Ok(runtime) => {
                    if !record.last_resort {
                        self.key_package_store.remove(&reference).await?;
                    }
                    let group_id = runtime.nostr_group_id();
                    self.groups.write().await.insert(group_id, Arc::new(Mutex::new(runtime)));
                    self.histories.write().await.insert(group_id, history_store);
                    return Ok(group_id);
                }
                Err(err) => last_error = Some(err),
            }
        }

        Err(ClientError::WelcomeUnmatched { source: last_error.map(Box::new) })
    }

    /// Enumerate every persisted group and warm the cache.
    pub async fn load_all_groups(&self) -> Result<Vec<[u8; 32]>, ClientError> {
        let ids = self.state_store.list().await?;
        let mut group_ids = Vec::with_capacity(ids.len());
        for id_bytes in ids {
            let group_id: [u8; 32] = id_bytes
                .as_slice()
                .try_into()
                .map_err(|_| ClientError::StoreFailure("group id is not 32 bytes".to_string()))?;
            self.get_group(group_id).await?;
            group_ids.push(group_id);
        }
        Ok(group_ids)
    }

    /// Remove a group's MLS state and history.
    pub async fn destroy_group(&self, group_id: [u8; 32]) -> Result<(), ClientError> {
        self.state_store.remove(&group_id).await?;
        self.groups.write().await.remove(&group_id);
        self.histories.write().await.remove(&group_id);
        Ok(())
    }

    async fn history_store_for(&self, group_id: [u8; 32]) -> Arc<dyn HistoryStore> {
        if let Some(existing) = self.histories.read().await.get(&group_id) {
            return existing.clone();
        }
        let store = (self.history_factory)();
        let mut histories = self.histories.write().await;
        histories.entry(group_id).or_insert(store).clone()
    }
}
