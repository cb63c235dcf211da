use std::sync::Arc;

use reqwest::Client;
use serde_json::{Value, json};
use server::{
    app,
    config::{Config, ResetScope},
    models::{Choice, VoterRecord},
    session::Phase,
    state::AppState,
    store::{Batch, CounterStore, MemoryStore},
    view::View,
};
use tokio::net::TcpListener;

async fn spawn(config: Config) -> (String, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::with_store(config, store.clone())
        .await
        .expect("build state");

    (serve(state).await, store)
}

async fn serve(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app(state)).await.expect("serve app") });

    format!("http://{addr}")
}

/// One cookie jar per client, so one client is one browser session.
fn browser() -> Client {
    Client::builder()
        .cookie_store(true)
        .build()
        .expect("build client")
}

async fn get(client: &Client, base: &str) -> (u16, View) {
    let response = client
        .get(format!("{base}/state"))
        .send()
        .await
        .expect("send");
    let status = response.status().as_u16();

    (status, response.json().await.expect("view json"))
}

async fn post(client: &Client, base: &str, path: &str, body: Value) -> (u16, View) {
    let response = client
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .expect("send");
    let status = response.status().as_u16();

    (status, response.json().await.expect("view json"))
}

async fn vote(client: &Client, base: &str, choice: &str) -> (u16, View) {
    post(client, base, "/vote", json!({ "choice": choice })).await
}

async fn voters(base: &str) -> Vec<VoterRecord> {
    browser()
        .get(format!("{base}/voters"))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("voters json")
}

#[tokio::test]
async fn two_sessions_one_yes_one_no() {
    let (base, _) = spawn(Config::default()).await;
    let (alice, bob) = (browser(), browser());

    let (status, _) = vote(&alice, &base, "yes").await;
    assert_eq!(status, 200);
    let (status, view) = vote(&bob, &base, "no").await;
    assert_eq!(status, 200);

    assert_eq!((view.counts.yes, view.counts.no, view.counts.total), (1, 1, 2));
    assert_eq!(view.headline, "Total votes: 2");
}

#[tokio::test]
async fn voted_session_is_locked_out() {
    let (base, _) = spawn(Config::default()).await;
    let alice = browser();

    let (_, view) = vote(&alice, &base, "yes").await;
    assert!(!view.session.can_vote);
    assert_eq!(view.session.phase, Phase::Voted);

    let (status, view) = vote(&alice, &base, "no").await;
    assert_eq!(status, 409);
    assert_eq!(view.warning.as_deref(), Some("You already voted"));
    assert_eq!((view.counts.yes, view.counts.no), (1, 0));
    assert_eq!(view.session.choice, Choice::Yes);
}

#[tokio::test]
async fn named_voter_switches() {
    let (base, _) = spawn(Config::default()).await;
    let (laptop, phone) = (browser(), browser());

    let (status, view) = post(&laptop, &base, "/name", json!({ "name": "  ada " })).await;
    assert_eq!(status, 200);
    assert_eq!(view.session.name.as_deref(), Some("ada"));
    assert_eq!(view.session.phase, Phase::Named);
    vote(&laptop, &base, "yes").await;

    post(&phone, &base, "/name", json!({ "name": "ada" })).await;
    let (status, view) = vote(&phone, &base, "no").await;
    assert_eq!(status, 200);

    assert_eq!((view.counts.yes, view.counts.no), (0, 1));
    assert_eq!(
        voters(&base).await,
        vec![VoterRecord {
            name: "ada".to_string(),
            choice: Choice::No
        }]
    );
}

#[tokio::test]
async fn whitespace_name_rejected() {
    let (base, _) = spawn(Config::default()).await;
    let alice = browser();

    let (status, view) = post(&alice, &base, "/name", json!({ "name": "   \t" })).await;

    assert_eq!(status, 422);
    assert!(view.warning.is_some());
    assert_eq!(view.session.name, None);
    assert_eq!(view.session.phase, Phase::Anonymous);
    assert!(voters(&base).await.is_empty());
}

#[tokio::test]
async fn name_listed_before_voting() {
    let (base, _) = spawn(Config::default()).await;

    let (_, view) = post(&browser(), &base, "/name", json!({ "name": "bob" })).await;

    assert_eq!(
        view.voters,
        Some(vec![VoterRecord {
            name: "bob".to_string(),
            choice: Choice::None
        }])
    );
}

#[tokio::test]
async fn global_reset_unlocks_idle_session() {
    let (base, _) = spawn(Config::default()).await;
    let (idle, admin) = (browser(), browser());

    vote(&idle, &base, "yes").await;
    let (_, view) = get(&idle, &base).await;
    assert!(!view.session.can_vote);

    let (status, view) = post(&admin, &base, "/reset/counts", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(view.counts.total, 0);

    let (_, view) = get(&idle, &base).await;
    assert!(view.session.can_vote);
    assert_eq!(view.session.choice, Choice::None);

    let (status, view) = vote(&idle, &base, "no").await;
    assert_eq!(status, 200);
    assert_eq!((view.counts.yes, view.counts.no), (0, 1));
}

#[tokio::test]
async fn reset_counts_keeps_names() {
    let (base, _) = spawn(Config::default()).await;
    let (alice, bob) = (browser(), browser());

    post(&alice, &base, "/name", json!({ "name": "alice" })).await;
    vote(&alice, &base, "yes").await;
    post(&bob, &base, "/name", json!({ "name": "bob" })).await;
    vote(&bob, &base, "no").await;

    post(&bob, &base, "/reset/counts", json!({})).await;

    let records = voters(&base).await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.choice == Choice::None));

    let (_, view) = get(&alice, &base).await;
    assert_eq!(view.session.phase, Phase::Named);
    assert_eq!((view.counts.yes, view.counts.no), (0, 0));
}

#[tokio::test]
async fn reset_all_forgets_everyone() {
    let (base, _) = spawn(Config::default()).await;
    let (alice, admin) = (browser(), browser());

    post(&alice, &base, "/name", json!({ "name": "alice" })).await;
    vote(&alice, &base, "yes").await;

    let (status, view) = post(&admin, &base, "/reset/all", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(view.voters, Some(Vec::new()));

    let (_, view) = get(&alice, &base).await;
    assert_eq!(view.session.phase, Phase::Anonymous);
    assert_eq!(view.session.name, None);
    assert!(view.session.can_vote);
}

#[tokio::test]
async fn session_scoped_reset_only_unlocks_caller() {
    let config = Config {
        reset_scope: ResetScope::Session,
        ..Config::default()
    };
    let (base, _) = spawn(config).await;
    let (alice, bob) = (browser(), browser());

    vote(&alice, &base, "yes").await;
    vote(&bob, &base, "no").await;

    let (_, view) = post(&bob, &base, "/reset/counts", json!({})).await;
    assert!(view.session.can_vote);
    assert_eq!(view.counts.total, 0);

    let (_, view) = get(&alice, &base).await;
    assert!(!view.session.can_vote);
}

#[tokio::test]
async fn unreachable_store_rolls_back() {
    let (base, store) = spawn(Config::default()).await;
    let (alice, bob) = (browser(), browser());
    vote(&bob, &base, "yes").await;

    store.set_offline(true);

    let (status, view) = get(&alice, &base).await;
    assert_eq!(status, 200);
    assert!(view.warning.is_some());
    assert_eq!(view.counts.yes, 1);

    let (status, view) = vote(&alice, &base, "no").await;
    assert_eq!(status, 503);
    assert!(view.session.can_vote);
    assert_eq!((view.counts.yes, view.counts.no), (1, 0));

    store.set_offline(false);

    let (status, view) = vote(&alice, &base, "no").await;
    assert_eq!(status, 200);
    assert!(view.warning.is_none());
    assert_eq!((view.counts.yes, view.counts.no), (1, 1));
}

#[tokio::test]
async fn malformed_votes_rejected() {
    let (base, _) = spawn(Config::default()).await;
    let alice = browser();

    let (status, _) = vote(&alice, &base, "maybe").await;
    assert_eq!(status, 422);
    let (status, view) = vote(&alice, &base, "none").await;
    assert_eq!(status, 422);

    assert!(view.session.can_vote);
    assert_eq!(view.counts.total, 0);
}

#[tokio::test]
async fn concurrent_sessions_conserve_total() {
    let (base, _) = spawn(Config::default()).await;

    let mut handles = Vec::new();
    for i in 0..24 {
        let base = base.clone();
        handles.push(tokio::spawn(async move {
            let choice = if i % 3 == 0 { "no" } else { "yes" };
            vote(&browser(), &base, choice).await.0
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.expect("join"), 200);
    }

    let (_, view) = get(&browser(), &base).await;
    assert_eq!(view.counts.total, 24);
    assert_eq!((view.counts.yes, view.counts.no), (16, 8));
}

#[tokio::test]
async fn health_is_ok() {
    let (base, _) = spawn(Config::default()).await;

    let body = browser()
        .get(format!("{base}/health"))
        .send()
        .await
        .expect("send")
        .text()
        .await
        .expect("body");

    assert_eq!(body, "ok");
}

#[tokio::test]
async fn cookieless_polling_registers_no_gates() {
    let state = AppState::with_store(Config::default(), Arc::new(MemoryStore::new()))
        .await
        .expect("build state");
    let base = serve(state.clone()).await;
    let poller = Client::new();

    for _ in 0..50 {
        let (status, view) = get(&poller, &base).await;
        assert_eq!(status, 200);
        assert!(view.session.can_vote);
    }
    assert!(state.sessions.is_empty());

    let alice = browser();
    get(&alice, &base).await;
    assert!(state.sessions.is_empty());

    vote(&alice, &base, "yes").await;
    let (_, view) = get(&alice, &base).await;
    assert!(!view.session.can_vote);
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn corrupt_voter_record_is_reported() {
    let (base, store) = spawn(Config::default()).await;
    let alice = browser();
    post(&alice, &base, "/name", json!({ "name": "ada" })).await;

    store
        .apply(Batch::new().set_field("votes:voters", "ada", "maybe"))
        .await
        .expect("corrupt record");

    let (status, view) = get(&alice, &base).await;
    assert_eq!(status, 200);
    assert_eq!(view.voters, None);
    assert!(view.warning.expect("warning").contains("corrupt"));

    let (status, view) = vote(&alice, &base, "yes").await;
    assert_eq!(status, 500);
    assert!(view.session.can_vote);
    assert_eq!(view.counts.total, 0);
}
