//! Group runtime (C10): ingest, send, propose, commit.
//!
//! The heart of the library. `GroupRuntime` owns one MLS group's live state
//! plus the stores it is persisted through; the client façade (`glade-client`)
//! owns the map of `group id -> GroupRuntime` and routes calls to it. A
//! `GroupRuntime` holds no pointer back to its client (§9).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use openmls::prelude::*;
use openmls_basic_credential::SignatureKeyPair;
use tls_codec::{Deserialize as TlsDeserialize, Serialize as TlsSerialize};

use glade_codec::envelope;
use glade_codec::event::{Event, EventId, PubKey, Rumor, deserialize_rumor, serialize_rumor};
use glade_codec::group_data::{EXTENSION_TYPE, MarmotGroupData};
use glade_codec::welcome;
use glade_codec::OuterCursor;
use glade_store::{GroupStateStore, HistoryEntry, HistoryStore};

use crate::admin::{self, ValidationResult};
use crate::env::Environment;
use crate::error::RuntimeError;
use crate::network::{Network, any_acked};
use crate::provider::GroupsProvider;
use crate::snapshot::{deserialize_snapshot, serialize_snapshot};

/// Tunables for the group runtime (§0 ambient config, §9 Open Question b).
#[derive(Debug, Clone)]
pub struct GroupRuntimeConfig {
    /// How many past epochs' exporter secrets (and derived conversation keys)
    /// are retained to decrypt late-arriving envelopes.
    pub past_epoch_retention: usize,
    /// How many times a permanently-unreadable event is retried against
    /// newly installed epochs within a single `ingest` call before being
    /// recorded processed with no rumor.
    pub max_unreadable_retries: u32,
    /// Events older than this many seconds (relative to the environment's
    /// clock) are still processed, but a very old event arriving far outside
    /// this window is a signal worth logging at warn level.
    pub max_event_age_secs: i64,
    /// Events timestamped more than this many seconds in the future are
    /// logged at warn level (clock skew), but still processed — the spec
    /// does not make this a hard rejection.
    pub max_future_skew_secs: i64,
}

impl Default for GroupRuntimeConfig {
    fn default() -> Self {
        GroupRuntimeConfig {
            past_epoch_retention: 5,
            max_unreadable_retries: 3,
            max_event_age_secs: 60 * 60 * 24 * 7,
            max_future_skew_secs: 300,
        }
    }
}

impl GroupRuntimeConfig {
    /// Start a builder seeded with the defaults above.
    pub fn builder() -> GroupRuntimeConfigBuilder {
        GroupRuntimeConfigBuilder(GroupRuntimeConfig::default())
    }
}

/// Builder for [`GroupRuntimeConfig`], mirroring the teacher's own
/// `MlsGroupCreateConfig::builder()` usage.
#[derive(Debug, Clone)]
pub struct GroupRuntimeConfigBuilder(GroupRuntimeConfig);

impl GroupRuntimeConfigBuilder {
    /// Set `past_epoch_retention`.
    pub fn past_epoch_retention(mut self, n: usize) -> Self {
        self.0.past_epoch_retention = n;
        self
    }

    /// Set `max_unreadable_retries`.
    pub fn max_unreadable_retries(mut self, n: u32) -> Self {
        self.0.max_unreadable_retries = n;
        self
    }

    /// Set `max_event_age_secs`.
    pub fn max_event_age_secs(mut self, secs: i64) -> Self {
        self.0.max_event_age_secs = secs;
        self
    }

    /// Set `max_future_skew_secs`.
    pub fn max_future_skew_secs(mut self, secs: i64) -> Self {
        self.0.max_future_skew_secs = secs;
        self
    }

    /// Finish building.
    pub fn build(self) -> GroupRuntimeConfig {
        self.0
    }
}

/// Per-event classification produced by `ingest` (§7 propagation policy:
/// these never propagate as exceptions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A decrypted application rumor, newly persisted to history.
    Applied(Rumor),
    /// A commit was accepted and merged; the group is now at this epoch.
    CommitApplied {
        /// The epoch the group advanced to.
        epoch: u64,
    },
    /// A commit was rejected (non-admin author, or lost a same-epoch race).
    CommitRejected {
        /// Human-readable reason.
        reason: String,
    },
    /// A proposal was validated and cached by the MLS provider pending a commit.
    ProposalCached,
    /// An event could not be decrypted or parsed against any known epoch.
    Unreadable {
        /// Human-readable reason.
        reason: String,
    },
}

/// Result of a successful `commit` call (§4.10).
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The epoch the group advanced to.
    pub epoch: u64,
    /// `kind=1059` gift-wrap event ids published for each invitee, in invite order.
    pub welcomes_published: Vec<EventId>,
}

enum Classified {
    Application { event: Event, outer: OuterCursor, mls_bytes: Vec<u8> },
    Proposal { event: Event, outer: OuterCursor, mls_bytes: Vec<u8> },
    Commit { event: Event, outer: OuterCursor, mls_bytes: Vec<u8> },
    Unreadable { outer: OuterCursor, reason: String },
}

fn peek_content_type(mls_bytes: &[u8]) -> Result<ContentType, String> {
    let msg_in = MlsMessageIn::tls_deserialize_exact(&mut &mls_bytes[..])
        .map_err(|e| format!("malformed mls message: {e}"))?;
    match msg_in.extract() {
        MlsMessageBodyIn::PrivateMessage(pm) => Ok(pm.content_type()),
        MlsMessageBodyIn::PublicMessage(pm) => Ok(pm.content_type()),
        _ => Err("unsupported mls message body".to_string()),
    }
}

fn message_epoch(mls_bytes: &[u8]) -> Result<u64, String> {
    let msg_in = MlsMessageIn::tls_deserialize_exact(&mut &mls_bytes[..])
        .map_err(|e| format!("malformed mls message: {e}"))?;
    match msg_in.extract() {
        MlsMessageBodyIn::PrivateMessage(pm) => Ok(pm.epoch().as_u64()),
        MlsMessageBodyIn::PublicMessage(pm) => Ok(pm.epoch().as_u64()),
        _ => Err("unsupported mls message body".to_string()),
    }
}

fn protocol_message(mls_bytes: &[u8]) -> Result<ProtocolMessage, RuntimeError> {
    let msg_in = MlsMessageIn::tls_deserialize_exact(&mut &mls_bytes[..])
        .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
    msg_in
        .try_into_protocol_message()
        .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))
}

fn basic_credential_identity(credential: &Credential) -> Option<Vec<u8>> {
    BasicCredential::try_from(credential.clone())
        .ok()
        .map(|basic| basic.identity().to_vec())
}

/// Generate a fresh key package for `nostr_identity`, for the client façade
/// (C11) to publish as a `kind=443` event and register in its key-package
/// store.
///
/// Returns `(reference, public_tls_bytes, private_snapshot)`: `reference` is
/// a content hash of the public bytes (not openmls's own `KeyPackageRef`
/// framing, since the only thing this library needs from it is a stable
/// local lookup key); `private_snapshot` is an opaque provider snapshot the
/// key-package store holds until the package is consumed by [`GroupRuntime::join`].
pub fn generate_key_package<E: Environment>(
    env: E,
    nostr_identity: PubKey,
    mls_signer: &SignatureKeyPair,
    ciphersuite: Ciphersuite,
) -> Result<([u8; 32], Vec<u8>, Vec<u8>), RuntimeError> {
    let provider = GroupsProvider::new(env);
    let credential = BasicCredential::new(nostr_identity.0.to_vec());
    let credential_with_key = CredentialWithKey {
        credential: credential.into(),
        signature_key: SignaturePublicKey::from(mls_signer.public().to_vec()),
    };
    let bundle = KeyPackage::builder()
        .build(ciphersuite, &provider, mls_signer, credential_with_key)
        .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
    let public_tls_bytes = bundle
        .key_package()
        .tls_serialize_detached()
        .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
    let reference = glade_crypto::signing::event_id_digest(&public_tls_bytes);
    let private_snapshot = serialize_snapshot(provider.storage_ref())?;
    Ok((reference, public_tls_bytes, private_snapshot))
}

/// Live state for a single MLS group plus the stores it is persisted through.
pub struct GroupRuntime<E: Environment> {
    env: E,
    provider: GroupsProvider<E>,
    mls_group: MlsGroup,
    mls_signer: SignatureKeyPair,
    nostr_identity: PubKey,
    nostr_group_id: [u8; 32],
    group_data: MarmotGroupData,
    config: GroupRuntimeConfig,
    exporter_window: VecDeque<[u8; 32]>,
    state_store: Arc<dyn GroupStateStore>,
    history_store: Arc<dyn HistoryStore>,
    network: Arc<dyn Network>,
    seen_outer_ids: HashSet<EventId>,
    unreadable_retry_counts: HashMap<EventId, u32>,
}

impl<E: Environment> GroupRuntime<E> {
    /// Create a brand-new group, forcing the creator into the admin set.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        env: E,
        nostr_identity: PubKey,
        mls_signer: SignatureKeyPair,
        ciphersuite: Ciphersuite,
        name: String,
        description: String,
        mut admin_pubkeys: Vec<PubKey>,
        relays: Vec<String>,
        config: GroupRuntimeConfig,
        state_store: Arc<dyn GroupStateStore>,
        history_store: Arc<dyn HistoryStore>,
        network: Arc<dyn Network>,
    ) -> Result<Self, RuntimeError> {
        if !admin_pubkeys.contains(&nostr_identity) {
            admin_pubkeys.push(nostr_identity);
        }

        let mut nostr_group_id = [0u8; 32];
        env.random_bytes(&mut nostr_group_id);

        // The MLS group id and the routing id share the same bytes: there is
        // no rotation scheme in this design that would need them to diverge,
        // and keeping them equal lets the client façade address a group by
        // one id end to end (§9 Open Question).

        let group_data = MarmotGroupData {
            version: 1,
            nostr_group_id,
            name,
            description,
            admin_pubkeys,
            relays,
            image: None,
        };

        let extensions = Extensions::single(Extension::Unknown(
            EXTENSION_TYPE,
            UnknownExtension(group_data.encode()),
        ));

        let create_config = MlsGroupCreateConfig::builder()
            .ciphersuite(ciphersuite)
            .with_group_context_extensions(extensions)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?
            .build();

        let credential = BasicCredential::new(nostr_identity.0.to_vec());
        let credential_with_key = CredentialWithKey {
            credential: credential.into(),
            signature_key: SignaturePublicKey::from(mls_signer.public().to_vec()),
        };

        let provider = GroupsProvider::new(env.clone());
        let mls_group = MlsGroup::new_with_group_id(
            &provider,
            &mls_signer,
            &create_config,
            GroupId::from_slice(&nostr_group_id),
            credential_with_key,
        )
        .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;

        let mut runtime = GroupRuntime {
            env,
            provider,
            mls_group,
            mls_signer,
            nostr_identity,
            nostr_group_id,
            group_data,
            config,
            exporter_window: VecDeque::new(),
            state_store,
            history_store,
            network,
            seen_outer_ids: HashSet::new(),
            unreadable_retry_counts: HashMap::new(),
        };
        runtime.push_exporter_secret()?;
        runtime.persist_snapshot().await?;
        Ok(runtime)
    }

    /// Rehydrate a runtime from a previously persisted snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot(
        env: E,
        snapshot_bytes: &[u8],
        group_id: [u8; 32],
        mls_signer: SignatureKeyPair,
        nostr_identity: PubKey,
        config: GroupRuntimeConfig,
        state_store: Arc<dyn GroupStateStore>,
        history_store: Arc<dyn HistoryStore>,
        network: Arc<dyn Network>,
    ) -> Result<Self, RuntimeError> {
        let storage = deserialize_snapshot(snapshot_bytes)?;
        let provider = GroupsProvider::from_storage(env.clone(), storage);
        let mls_group = MlsGroup::load(provider.storage(), &GroupId::from_slice(&group_id))
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?
            .ok_or(RuntimeError::GroupNotFound)?;

        let mut runtime = GroupRuntime {
            env,
            provider,
            mls_group,
            mls_signer,
            nostr_identity,
            nostr_group_id: [0u8; 32],
            group_data: MarmotGroupData {
                version: 1,
                nostr_group_id: [0u8; 32],
                name: String::new(),
                description: String::new(),
                admin_pubkeys: vec![],
                relays: vec![],
                image: None,
            },
            config,
            exporter_window: VecDeque::new(),
            state_store,
            history_store,
            network,
            seen_outer_ids: HashSet::new(),
            unreadable_retry_counts: HashMap::new(),
        };
        runtime.refresh_group_data()?;
        runtime.nostr_group_id = runtime.group_data.nostr_group_id;
        runtime.push_exporter_secret()?;
        Ok(runtime)
    }

    /// Join a group from a decoded Welcome message (C6/C11), using the
    /// private key-package material `generate_key_package` snapshotted.
    #[allow(clippy::too_many_arguments)]
    pub async fn join(
        env: E,
        welcome_tls_bytes: &[u8],
        key_package_private_snapshot: &[u8],
        mls_signer: SignatureKeyPair,
        nostr_identity: PubKey,
        config: GroupRuntimeConfig,
        state_store: Arc<dyn GroupStateStore>,
        history_store: Arc<dyn HistoryStore>,
        network: Arc<dyn Network>,
    ) -> Result<Self, RuntimeError> {
        let span = tracing::debug_span!("join", welcome_len = welcome_tls_bytes.len());
        let _enter = span.enter();

        let storage = deserialize_snapshot(key_package_private_snapshot)?;
        let provider = GroupsProvider::from_storage(env.clone(), storage);

        let mls_message = MlsMessageIn::tls_deserialize_exact(&mut &welcome_tls_bytes[..])
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        let welcome = match mls_message.extract() {
            MlsMessageBodyIn::Welcome(welcome) => welcome,
            _ => {
                return Err(RuntimeError::MlsProcessingFailed(
                    "expected a welcome message".to_string(),
                ));
            }
        };

        let join_config = MlsGroupJoinConfig::default();
        let staged = StagedWelcome::new_from_welcome(&provider, &join_config, welcome, None)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        let mls_group = staged
            .into_group(&provider)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;

        let mut runtime = GroupRuntime {
            env,
            provider,
            mls_group,
            mls_signer,
            nostr_identity,
            nostr_group_id: [0u8; 32],
            group_data: MarmotGroupData {
                version: 1,
                nostr_group_id: [0u8; 32],
                name: String::new(),
                description: String::new(),
                admin_pubkeys: vec![],
                relays: vec![],
                image: None,
            },
            config,
            exporter_window: VecDeque::new(),
            state_store,
            history_store,
            network,
            seen_outer_ids: HashSet::new(),
            unreadable_retry_counts: HashMap::new(),
        };
        runtime.refresh_group_data()?;
        runtime.nostr_group_id = runtime.group_data.nostr_group_id;
        runtime.push_exporter_secret()?;
        runtime.persist_snapshot().await?;
        Ok(runtime)
    }

    /// The group's routing id (`h` tag value).
    pub fn nostr_group_id(&self) -> [u8; 32] {
        self.nostr_group_id
    }

    /// The current epoch.
    pub fn epoch(&self) -> u64 {
        self.mls_group.epoch().as_u64()
    }

    /// A read-only view of the cached group metadata extension.
    pub fn group_data(&self) -> &MarmotGroupData {
        &self.group_data
    }

    /// Deserialize and validate the raw `kind=443` key-package bytes a
    /// future invitee published, against this group's own crypto provider.
    /// The result is ready to pass to [`GroupRuntime::commit`]'s invite list.
    pub fn validate_invite_key_package(&self, key_package_bytes: &[u8]) -> Result<KeyPackage, RuntimeError> {
        let kp_in = KeyPackageIn::tls_deserialize(&mut key_package_bytes.to_vec().as_slice())
            .map_err(|e| RuntimeError::MlsProcessingFailed(format!("invalid key package encoding: {e}")))?;
        kp_in
            .validate(self.provider.crypto(), ProtocolVersion::Mls10)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))
    }

    fn refresh_group_data(&mut self) -> Result<(), RuntimeError> {
        let extensions = self.mls_group.extensions();
        let bytes = extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Unknown(EXTENSION_TYPE, UnknownExtension(bytes)) => Some(bytes.clone()),
                _ => None,
            })
            .ok_or_else(|| RuntimeError::MlsProcessingFailed("group metadata extension missing".to_string()))?;
        self.group_data = MarmotGroupData::decode(&bytes)?;
        Ok(())
    }

    fn push_exporter_secret(&mut self) -> Result<(), RuntimeError> {
        let secret = self
            .mls_group
            .export_secret(&self.provider, "nostr", b"nostr", 32)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&secret);
        self.exporter_window.push_front(key);
        while self.exporter_window.len() > self.config.past_epoch_retention {
            self.exporter_window.pop_back();
        }
        Ok(())
    }

    fn current_conversation_key(&self) -> Result<[u8; 32], RuntimeError> {
        let key = self
            .exporter_window
            .front()
            .ok_or_else(|| RuntimeError::MlsProcessingFailed("no exporter secret derived yet".to_string()))?;
        glade_crypto::kdf::derive_conversation_key(key, &self.nostr_group_id)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))
    }

    /// Every retained epoch's conversation key, derived from its raw
    /// exporter secret (the same derivation `current_conversation_key` uses
    /// for the newest one), for trying an incoming envelope against each
    /// retained epoch in turn.
    fn conversation_key_candidates(&self) -> impl Iterator<Item = [u8; 32]> + '_ {
        self.exporter_window
            .iter()
            .filter_map(|secret| glade_crypto::kdf::derive_conversation_key(secret, &self.nostr_group_id).ok())
    }

    async fn persist_snapshot(&self) -> Result<(), RuntimeError> {
        let bytes = serialize_snapshot(self.provider.storage_ref())?;
        self.state_store
            .set(self.mls_group.group_id().as_slice(), bytes)
            .await?;
        Ok(())
    }

    fn fresh_nonce(&self) -> [u8; glade_crypto::aead::NONCE_SIZE] {
        let mut nonce = [0u8; glade_crypto::aead::NONCE_SIZE];
        self.env.random_bytes(&mut nonce);
        nonce
    }

    fn fresh_ephemeral(&self) -> Result<glade_crypto::signing::EphemeralKeypair, RuntimeError> {
        let mut seed = [0u8; 32];
        self.env.random_bytes(&mut seed);
        glade_crypto::signing::EphemeralKeypair::from_random_bytes(&seed)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))
    }

    /// Ingest a batch of outer `kind=445` events, all tagged with this
    /// group's `nostr_group_id` (§4.9).
    pub async fn ingest(&mut self, events: Vec<Event>) -> Result<Vec<IngestOutcome>, RuntimeError> {
        let span = tracing::debug_span!("ingest", group = %hex::encode(self.nostr_group_id), batch_len = events.len());
        let _enter = span.enter();

        // Step 1: dedupe against the in-memory seen set.
        let mut batch = Vec::with_capacity(events.len());
        for event in events {
            if self.seen_outer_ids.insert(event.id) {
                batch.push(event);
            }
        }

        // Step 2: decrypt + classify.
        let mut classified = Vec::with_capacity(batch.len());
        for event in &batch {
            let outer = OuterCursor::new(event.created_at, event.id);
            let mls_bytes = match envelope::open_with_candidates(
                event,
                &self.nostr_group_id,
                self.conversation_key_candidates(),
            ) {
                Ok(bytes) => bytes,
                Err(_) => {
                    classified.push(Classified::Unreadable {
                        outer,
                        reason: "epoch mismatch: no candidate key decrypted this event".to_string(),
                    });
                    continue;
                }
            };
            match peek_content_type(&mls_bytes) {
                Ok(ContentType::Application) => classified.push(Classified::Application {
                    event: event.clone(),
                    outer,
                    mls_bytes,
                }),
                Ok(ContentType::Proposal) => classified.push(Classified::Proposal {
                    event: event.clone(),
                    outer,
                    mls_bytes,
                }),
                Ok(ContentType::Commit) => classified.push(Classified::Commit {
                    event: event.clone(),
                    outer,
                    mls_bytes,
                }),
                Ok(_) => classified.push(Classified::Unreadable {
                    outer,
                    reason: "unsupported mls content type".to_string(),
                }),
                Err(reason) => classified.push(Classified::Unreadable { outer, reason }),
            }
        }

        let mut outcomes_by_outer: HashMap<EventId, IngestOutcome> = HashMap::new();
        let mut unreadable_events: Vec<Event> = Vec::new();

        // Step 3: apply non-commits first, in cursor order.
        let mut non_commits: Vec<&Classified> = classified
            .iter()
            .filter(|c| matches!(c, Classified::Application { .. } | Classified::Proposal { .. }))
            .collect();
        non_commits.sort_by_key(|c| match c {
            Classified::Application { outer, .. } | Classified::Proposal { outer, .. } => *outer,
            _ => unreachable!(),
        });
        for item in non_commits {
            match item {
                Classified::Application { event, outer, mls_bytes } => {
                    match self.apply_application(mls_bytes) {
                        Ok(rumor) => {
                            let entry = HistoryEntry {
                                rumor: rumor.clone(),
                                outer: *outer,
                            };
                            if let Err(e) = self.history_store.add_rumor(entry).await {
                                tracing::warn!(error = %e, "history store write failed; mls state unaffected");
                            }
                            outcomes_by_outer.insert(event.id, IngestOutcome::Applied(rumor));
                        }
                        Err(e) => {
                            outcomes_by_outer.insert(
                                event.id,
                                IngestOutcome::Unreadable { reason: e.to_string() },
                            );
                        }
                    }
                }
                Classified::Proposal { event, mls_bytes, .. } => match self.apply_proposal(mls_bytes) {
                    Ok(()) => {
                        outcomes_by_outer.insert(event.id, IngestOutcome::ProposalCached);
                    }
                    Err(e) => {
                        outcomes_by_outer.insert(
                            event.id,
                            IngestOutcome::Unreadable { reason: e.to_string() },
                        );
                    }
                },
                _ => unreachable!(),
            }
        }

        // Step 4: order commits by (epoch, created_at, id).
        let mut commits: Vec<(u64, &Event, OuterCursor, &Vec<u8>)> = Vec::new();
        for item in &classified {
            if let Classified::Commit { event, outer, mls_bytes } = item {
                match message_epoch(mls_bytes) {
                    Ok(epoch) => commits.push((epoch, event, *outer, mls_bytes)),
                    Err(reason) => {
                        outcomes_by_outer.insert(event.id, IngestOutcome::Unreadable { reason });
                    }
                }
            }
        }
        commits.sort_by_key(|(epoch, _, outer, _)| (*epoch, *outer));

        // Step 5: apply each commit sequentially.
        let mut any_commit_applied = false;
        for (_, event, _, mls_bytes) in commits {
            match self.apply_commit(mls_bytes).await {
                Ok(ApplyCommitResult::Applied { epoch }) => {
                    any_commit_applied = true;
                    outcomes_by_outer.insert(event.id, IngestOutcome::CommitApplied { epoch });
                }
                Ok(ApplyCommitResult::Rejected { reason }) => {
                    outcomes_by_outer.insert(event.id, IngestOutcome::CommitRejected { reason });
                }
                Err(e) => {
                    outcomes_by_outer.insert(
                        event.id,
                        IngestOutcome::CommitRejected { reason: e.to_string() },
                    );
                }
            }
        }

        // Collect permanently-unreadable events for step 6.
        for item in &classified {
            if let Classified::Unreadable { outer, reason } = item {
                if let Some(event) = batch.iter().find(|e| e.id == outer.id) {
                    outcomes_by_outer
                        .entry(event.id)
                        .or_insert_with(|| IngestOutcome::Unreadable { reason: reason.clone() });
                    unreadable_events.push(event.clone());
                }
            }
        }

        // Step 6: retry unreadables bounded by max_unreadable_retries, once per
        // commit applied this batch (the newly installed epoch may now decrypt them).
        if any_commit_applied {
            for event in unreadable_events {
                let attempts = self.unreadable_retry_counts.entry(event.id).or_insert(0);
                if *attempts >= self.config.max_unreadable_retries {
                    continue;
                }
                *attempts += 1;
                if let Ok(mls_bytes) = envelope::open_with_candidates(
                    &event,
                    &self.nostr_group_id,
                    self.conversation_key_candidates(),
                ) {
                    if let Ok(ContentType::Application) = peek_content_type(&mls_bytes) {
                        if let Ok(rumor) = self.apply_application(&mls_bytes) {
                            let outer = OuterCursor::new(event.created_at, event.id);
                            let entry = HistoryEntry { rumor: rumor.clone(), outer };
                            let _ = self.history_store.add_rumor(entry).await;
                            outcomes_by_outer.insert(event.id, IngestOutcome::Applied(rumor));
                        }
                    }
                }
            }
        }

        // Step 7: advance resume cursor for every event in the deduped batch,
        // even those with no rumor, then persist MLS state once.
        for event in &batch {
            let outer = OuterCursor::new(event.created_at, event.id);
            if let Err(e) = self.history_store.mark_outer_event_processed(outer).await {
                tracing::warn!(error = %e, "failed to advance resume cursor");
            }
        }
        self.persist_snapshot().await?;

        let mut outcomes = Vec::with_capacity(batch.len());
        for event in &batch {
            if let Some(outcome) = outcomes_by_outer.remove(&event.id) {
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    fn apply_application(&mut self, mls_bytes: &[u8]) -> Result<Rumor, RuntimeError> {
        let message = protocol_message(mls_bytes)?;
        let processed = self
            .mls_group
            .process_message(&self.provider, message)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        match processed.into_content() {
            ProcessedMessageContent::ApplicationMessage(app) => {
                deserialize_rumor(&app.into_bytes()).map_err(RuntimeError::Codec)
            }
            _ => Err(RuntimeError::MlsProcessingFailed(
                "expected application message".to_string(),
            )),
        }
    }

    fn apply_proposal(&mut self, mls_bytes: &[u8]) -> Result<(), RuntimeError> {
        let message = protocol_message(mls_bytes)?;
        let processed = self
            .mls_group
            .process_message(&self.provider, message)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        match processed.into_content() {
            ProcessedMessageContent::ProposalMessage(queued) => {
                self.mls_group
                    .store_pending_proposal(self.provider.storage(), *queued)
                    .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
                Ok(())
            }
            _ => Err(RuntimeError::MlsProcessingFailed(
                "expected proposal message".to_string(),
            )),
        }
    }

    async fn apply_commit(&mut self, mls_bytes: &[u8]) -> Result<ApplyCommitResult, RuntimeError> {
        let message = match protocol_message(mls_bytes) {
            Ok(m) => m,
            Err(e) => return Ok(ApplyCommitResult::Rejected { reason: e.to_string() }),
        };
        let processed = match self.mls_group.process_message(&self.provider, message) {
            Ok(p) => p,
            Err(e) => {
                // A stale-epoch error here is exactly how a commit race's
                // loser manifests: its staged commit was computed against an
                // epoch a sibling commit already advanced past.
                return Ok(ApplyCommitResult::Rejected { reason: e.to_string() });
            }
        };
        let credential = processed.credential().clone();
        let staged_commit = match processed.into_content() {
            ProcessedMessageContent::StagedCommitMessage(staged) => *staged,
            _ => {
                return Ok(ApplyCommitResult::Rejected {
                    reason: "expected commit message".to_string(),
                });
            }
        };

        let identity = basic_credential_identity(&credential).ok_or_else(|| {
            RuntimeError::MlsProcessingFailed("commit author has no basic credential".to_string())
        })?;
        match admin::check_commit_author(&identity, &self.group_data) {
            ValidationResult::Reject { reason } => Ok(ApplyCommitResult::Rejected { reason }),
            ValidationResult::Accept => {
                self.mls_group
                    .merge_staged_commit(&self.provider, staged_commit)
                    .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
                self.refresh_group_data()?;
                self.push_exporter_secret()?;
                Ok(ApplyCommitResult::Applied { epoch: self.epoch() })
            }
        }
    }

    /// Send an application rumor under the current epoch (§4.10).
    pub async fn send_application_rumor(&mut self, rumor: Rumor) -> Result<Event, RuntimeError> {
        let rumor_bytes = serialize_rumor(&rumor)?;
        let mls_message = self
            .mls_group
            .create_message(&self.provider, &self.mls_signer, &rumor_bytes)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        let mls_bytes = mls_message
            .tls_serialize_detached()
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;

        let key = self.current_conversation_key()?;
        let nonce = self.fresh_nonce();
        let ephemeral = self.fresh_ephemeral()?;
        let created_at = self.env.unix_timestamp();
        let event = envelope::seal_envelope(&ephemeral, &self.nostr_group_id, &key, &nonce, &mls_bytes, created_at)?;

        let receipts = self.network.publish(&self.group_data.relays, event.clone()).await?;
        if !any_acked(&receipts) {
            return Err(RuntimeError::NoRelayAck);
        }
        self.persist_snapshot().await?;
        Ok(event)
    }

    /// Author a commit adding `invites` (key package + the event id it came
    /// from), publish it, wait for acknowledgement, and only then dispatch
    /// Welcomes (§4.10's commit-ack-before-Welcome ordering).
    pub async fn commit(&mut self, invites: Vec<(KeyPackage, EventId, PubKey)>) -> Result<CommitOutcome, RuntimeError> {
        let span = tracing::debug_span!(
            "commit",
            group = %hex::encode(self.nostr_group_id),
            epoch = self.mls_group.epoch().as_u64(),
            invite_count = invites.len()
        );
        let _enter = span.enter();

        if !self.group_data.admin_pubkeys.contains(&self.nostr_identity) {
            return Err(RuntimeError::NotAdmin);
        }

        let key_packages: Vec<KeyPackage> = invites.iter().map(|(kp, _, _)| kp.clone()).collect();
        let (commit_message, welcome_message, _group_info) = self
            .mls_group
            .add_members(&self.provider, &self.mls_signer, &key_packages)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;

        let commit_bytes = commit_message
            .tls_serialize_detached()
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        let key = self.current_conversation_key()?;
        let nonce = self.fresh_nonce();
        let ephemeral = self.fresh_ephemeral()?;
        let created_at = self.env.unix_timestamp();
        let commit_event = envelope::seal_envelope(
            &ephemeral,
            &self.nostr_group_id,
            &key,
            &nonce,
            &commit_bytes,
            created_at,
        )?;

        let receipts = self.network.publish(&self.group_data.relays, commit_event).await?;
        if !any_acked(&receipts) {
            self.mls_group
                .clear_pending_commit(self.provider.storage())
                .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
            return Err(RuntimeError::NoRelayAck);
        }

        self.mls_group
            .merge_pending_commit(&self.provider)
            .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
        self.refresh_group_data()?;
        self.push_exporter_secret()?;
        self.persist_snapshot().await?;

        let mut welcomes_published = Vec::with_capacity(invites.len());
        if let Some(welcome_out) = welcome_message {
            let welcome_bytes = welcome_out
                .tls_serialize_detached()
                .map_err(|e| RuntimeError::MlsProcessingFailed(e.to_string()))?;
            for (_, kp_event_id, invitee_pubkey) in &invites {
                let welcome_rumor = welcome::build_welcome_rumor(
                    self.nostr_identity,
                    self.env.unix_timestamp(),
                    &welcome_bytes,
                    *kp_event_id,
                    self.group_data.relays.clone(),
                );
                let inbox_relays = self.network.get_user_inbox_relays(*invitee_pubkey).await?;
                let gift_ephemeral = self.fresh_ephemeral()?;
                let mut gift_secret = [0u8; 32];
                self.env.random_bytes(&mut gift_secret);
                let gift_nonce = self.fresh_nonce();
                let gift_wrap_event = welcome::gift_wrap(
                    &gift_ephemeral,
                    &gift_secret,
                    *invitee_pubkey,
                    &gift_nonce,
                    self.env.unix_timestamp(),
                    &welcome_rumor,
                )?;
                let relays = if inbox_relays.is_empty() {
                    self.group_data.relays.clone()
                } else {
                    inbox_relays
                };
                self.network.publish(&relays, gift_wrap_event.clone()).await?;
                welcomes_published.push(gift_wrap_event.id);
            }
        }

        Ok(CommitOutcome {
            epoch: self.epoch(),
            welcomes_published,
        })
    }
}

enum ApplyCommitResult {
    Applied { epoch: u64 },
    Rejected { reason: String },
}
