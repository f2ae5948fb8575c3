//! Client-façade end-to-end tests (§8 S1, S6).
//!
//! These exercise two independent `Client`s wired to a shared in-memory
//! network, going through the public façade (`create_group`,
//! `join_group_from_welcome`) rather than `GroupRuntime` directly. S2-S5
//! need private `GroupRuntime` fields to construct their scenarios and live
//! in `glade-core::runtime`'s own `#[cfg(test)]` module instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use openmls::prelude::Ciphersuite;
use openmls_basic_credential::SignatureKeyPair;

use glade_client::{Client, ClientError, LocalSigner, Signer};
use glade_codec::event::{Event, EventId, PubKey, Rumor};
use glade_codec::welcome;
use glade_core::network::{Filter, Network, PublishReceipt};
use glade_core::runtime::generate_key_package;
use glade_core::{Environment, GroupRuntimeConfig, IngestOutcome, RuntimeError};
use glade_store::{GroupStateStore, InMemoryGroupStateStore, InMemoryKeyPackageStore, KeyPackageRecord, KeyPackageStore};

const CIPHERSUITE: Ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;

/// Deterministic environment: settable Unix clock, real randomness (these
/// tests don't depend on reproducible entropy).
#[derive(Clone)]
struct TestEnv {
    clock: Arc<AtomicI64>,
}

impl TestEnv {
    fn new(start_unix: i64) -> Self {
        TestEnv { clock: Arc::new(AtomicI64::new(start_unix)) }
    }
}

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: std::time::Duration) -> impl std::future::Future<Output = ()> + Send {
        async move {
            tokio::time::sleep(duration).await;
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }

    fn unix_timestamp(&self) -> i64 {
        self.clock.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

#[derive(Default)]
struct MockNetwork {
    published: StdMutex<Vec<Event>>,
    inboxes: StdMutex<HashMap<PubKey, Vec<String>>>,
}

impl MockNetwork {
    fn new() -> Self {
        Self::default()
    }

    fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn request(&self, _relays: &[String], _filter: Filter) -> Result<Vec<Event>, RuntimeError> {
        Ok(vec![])
    }

    async fn publish(&self, _relays: &[String], event: Event) -> Result<Vec<PublishReceipt>, RuntimeError> {
        self.published.lock().unwrap().push(event);
        Ok(vec![PublishReceipt {
            relay_url: "wss://mock.example".to_string(),
            ok: true,
            message: None,
        }])
    }

    async fn get_user_inbox_relays(&self, pubkey: PubKey) -> Result<Vec<String>, RuntimeError> {
        Ok(self.inboxes.lock().unwrap().get(&pubkey).cloned().unwrap_or_default())
    }
}

fn identity_from_secret(secret: &[u8; 32]) -> PubKey {
    PubKey(glade_crypto::signing::EphemeralKeypair::from_random_bytes(secret).expect("keypair").public_key())
}

fn mls_signer() -> SignatureKeyPair {
    SignatureKeyPair::new(CIPHERSUITE.signature_algorithm()).expect("signature keypair")
}

/// Generate a key package for `identity` and stash it in `store`, as an
/// embedding application would before advertising a `kind=443` event.
async fn stash_key_package(
    env: TestEnv,
    identity: PubKey,
    mls_signer: &SignatureKeyPair,
    store: &dyn KeyPackageStore,
) {
    let (reference, public_tls_bytes, private_snapshot) =
        generate_key_package(env, identity, mls_signer, CIPHERSUITE).expect("generate key package");
    store
        .put(
            reference,
            KeyPackageRecord { public_tls_bytes, private_bytes: private_snapshot, last_resort: false },
        )
        .await
        .expect("stash key package");
}

#[allow(clippy::too_many_arguments)]
fn new_client(
    env: TestEnv,
    secret: &[u8; 32],
    mls_signer: SignatureKeyPair,
    key_package_store: Arc<dyn KeyPackageStore>,
    network: Arc<dyn Network>,
) -> Client<TestEnv> {
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::from_secret_bytes(secret).expect("signer"));
    Client::new(
        env,
        signer,
        mls_signer,
        CIPHERSUITE,
        Arc::new(InMemoryGroupStateStore::new()),
        key_package_store,
        network,
        GroupRuntimeConfig::default(),
        None,
    )
}

#[tokio::test]
async fn s1_end_to_end_invite_and_application_message() {
    let network = Arc::new(MockNetwork::new());
    let net_dyn: Arc<dyn Network> = network.clone();

    let alice_secret = [1u8; 32];
    let alice_identity = identity_from_secret(&alice_secret);
    let alice = new_client(
        TestEnv::new(1_000),
        &alice_secret,
        mls_signer(),
        Arc::new(InMemoryKeyPackageStore::new()),
        net_dyn.clone(),
    );

    let bob_secret = [2u8; 32];
    let bob_identity = identity_from_secret(&bob_secret);
    let bob_mls_signer = mls_signer();
    let bob_key_package_store = InMemoryKeyPackageStore::new();
    stash_key_package(TestEnv::new(5_000), bob_identity, &bob_mls_signer, &bob_key_package_store).await;
    let bob_kp_bytes = bob_key_package_store
        .list()
        .await
        .expect("list")
        .pop()
        .expect("one key package")
        .public_tls_bytes;
    let bob = new_client(
        TestEnv::new(5_000),
        &bob_secret,
        bob_mls_signer,
        Arc::new(bob_key_package_store),
        net_dyn,
    );

    let group_id = alice
        .create_group(
            "s1 group".to_string(),
            "end to end invite".to_string(),
            vec![alice_identity],
            vec!["wss://relay.example".to_string()],
        )
        .await
        .expect("alice creates group");

    let alice_handle = alice.get_group(group_id).await.expect("alice's runtime handle");
    let welcome_event_id = {
        let mut runtime = alice_handle.lock().await;
        let bob_key_package = runtime.validate_invite_key_package(&bob_kp_bytes).expect("validate bob's key package");
        let outcome = runtime
            .commit(vec![(bob_key_package, EventId([9u8; 32]), bob_identity)])
            .await
            .expect("alice invites bob");
        assert_eq!(outcome.epoch, 1);
        outcome.welcomes_published[0]
    };

    let gift_wrap_event = network
        .published()
        .into_iter()
        .find(|event| event.id == welcome_event_id)
        .expect("gift wrap event was published");
    let welcome_rumor = welcome::open_gift_wrap(&gift_wrap_event, &bob_secret).expect("bob opens gift wrap");

    let bob_group_id = bob
        .join_group_from_welcome(welcome_rumor, None)
        .await
        .expect("bob joins from welcome");
    assert_eq!(bob_group_id, group_id, "both parties agree on the group id");

    let bob_handle = bob.get_group(bob_group_id).await.expect("bob's runtime handle");
    assert_eq!(bob_handle.lock().await.epoch(), 1);

    let application_event = {
        let mut runtime = alice_handle.lock().await;
        let rumor = Rumor::new(alice_identity, 6_000, 9, vec![], "hello bob".to_string());
        runtime.send_application_rumor(rumor).await.expect("alice sends")
    };

    let outcomes = {
        let mut runtime = bob_handle.lock().await;
        runtime.ingest(vec![application_event]).await.expect("bob ingests")
    };
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], IngestOutcome::Applied(_)));
}

#[tokio::test]
async fn s6_welcome_unmatched_leaves_no_group_state() {
    let network = Arc::new(MockNetwork::new());
    let net_dyn: Arc<dyn Network> = network.clone();

    let alice_secret = [3u8; 32];
    let alice_identity = identity_from_secret(&alice_secret);
    let alice = new_client(
        TestEnv::new(1_000),
        &alice_secret,
        mls_signer(),
        Arc::new(InMemoryKeyPackageStore::new()),
        net_dyn.clone(),
    );

    let carol_secret = [4u8; 32];
    let carol_identity = identity_from_secret(&carol_secret);
    let carol_store = InMemoryKeyPackageStore::new();
    stash_key_package(TestEnv::new(9_000), carol_identity, &mls_signer(), &carol_store).await;
    let carol_kp_bytes = carol_store.list().await.expect("list").pop().expect("one key package").public_tls_bytes;

    let group_id = alice
        .create_group(
            "s6 group".to_string(),
            "welcome unmatched".to_string(),
            vec![alice_identity],
            vec!["wss://relay.example".to_string()],
        )
        .await
        .expect("alice creates group");

    let alice_handle = alice.get_group(group_id).await.expect("alice's runtime handle");
    let welcome_event_id = {
        let mut runtime = alice_handle.lock().await;
        let carol_key_package =
            runtime.validate_invite_key_package(&carol_kp_bytes).expect("validate carol's key package");
        let outcome = runtime
            .commit(vec![(carol_key_package, EventId([11u8; 32]), carol_identity)])
            .await
            .expect("alice invites carol");
        outcome.welcomes_published[0]
    };
    let gift_wrap_event = network
        .published()
        .into_iter()
        .find(|event| event.id == welcome_event_id)
        .expect("gift wrap event was published");
    let welcome_rumor = welcome::open_gift_wrap(&gift_wrap_event, &carol_secret).expect("carol opens gift wrap");

    // Bob has no key package at all: the candidate list is empty, so
    // `WelcomeUnmatched` carries no source.
    let bob_secret = [5u8; 32];
    let bob_state_store = Arc::new(InMemoryGroupStateStore::new());
    let bob_signer: Arc<dyn Signer> = Arc::new(LocalSigner::from_secret_bytes(&bob_secret).expect("bob signer"));
    let bob = Client::new(
        TestEnv::new(10_000),
        bob_signer,
        mls_signer(),
        CIPHERSUITE,
        bob_state_store.clone(),
        Arc::new(InMemoryKeyPackageStore::new()),
        net_dyn.clone(),
        GroupRuntimeConfig::default(),
        None,
    );

    let result = bob.join_group_from_welcome(welcome_rumor.clone(), None).await;
    assert!(matches!(result, Err(ClientError::WelcomeUnmatched { source: None })));
    assert!(bob_state_store.list().await.expect("list").is_empty(), "no group state was persisted");

    // Dave has a key package, but it isn't the one this Welcome targets:
    // every candidate is tried and fails, and `WelcomeUnmatched` carries the
    // last attempt's underlying error instead of leaking it bare.
    let dave_secret = [6u8; 32];
    let dave_state_store = Arc::new(InMemoryGroupStateStore::new());
    let dave_signer: Arc<dyn Signer> = Arc::new(LocalSigner::from_secret_bytes(&dave_secret).expect("dave signer"));
    let dave_key_package_store = InMemoryKeyPackageStore::new();
    let dave_identity = identity_from_secret(&dave_secret);
    stash_key_package(TestEnv::new(11_000), dave_identity, &mls_signer(), &dave_key_package_store).await;
    let dave = Client::new(
        TestEnv::new(11_000),
        dave_signer,
        mls_signer(),
        CIPHERSUITE,
        dave_state_store.clone(),
        Arc::new(dave_key_package_store),
        net_dyn,
        GroupRuntimeConfig::default(),
        None,
    );

    let result = dave.join_group_from_welcome(welcome_rumor, None).await;
    assert!(
        matches!(result, Err(ClientError::WelcomeUnmatched { source: Some(_) })),
        "a present-but-wrong candidate must still surface as WelcomeUnmatched, with its failure attached"
    );
    assert!(dave_state_store.list().await.expect("list").is_empty(), "no group state was persisted");
}
