//! End-to-end scenarios over the full component set, with the ledger
//! replaced by the in-memory mock. Connections are channel-backed; the
//! gateway dispatch and auth flow are the real ones.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use signals_core::types::{Address, Choice, ClientEvent, B256, U256};
use signals_env::{Config, TimingConfig, TournamentDefaults};
use signals_orchestrator::component::ClientKind;
use signals_orchestrator::context::ApplicationContext;
use signals_orchestrator::gateway;
use signals_signing::SigningContext;
use signals_test::{MockLedger, TestAgent};

const GAME_CONTRACT: Address = Address::repeat_byte(0x99);
const CHAIN_ID: u64 = 31337;

fn test_config() -> Config {
    Config {
        operator_key: "test".into(),
        rpc_url: "http://127.0.0.1:0".into(),
        rpc_url_fallback: None,
        chain_id: CHAIN_ID,
        game_contract: GAME_CONTRACT,
        token_contract: Address::repeat_byte(0x88),
        registry_contract: Address::repeat_byte(0x77),
        multicall_contract: Address::repeat_byte(0x66),
        port: 0,
        timing: TimingConfig {
            negotiation_ms: 120,
            choice_ms: 300,
            settle_grace_ms: 500,
            settle_flush_ms: 20,
            batch_cap: 30,
            auth_challenge_ttl_ms: 60_000,
            pairing_debounce_ms: 30,
            match_retention_ms: 60_000,
        },
        tournament: TournamentDefaults {
            min_players: 4,
            max_players: 8,
            total_rounds: 3,
            registration_secs: 120,
            trigger_delay_ms: 50,
            join_timeout_ms: 300,
            choice_window_secs: 1,
            entry_stake: U256::from(1),
        },
    }
}

struct TestEnv {
    ctx: Arc<ApplicationContext>,
    ledger: Arc<MockLedger>,
    signing: SigningContext,
}

fn env() -> TestEnv {
    let ledger: Arc<MockLedger> = Arc::new(MockLedger::default());
    let (ctx, _signal_loop) = ApplicationContext::start(test_config(), ledger.clone());
    TestEnv {
        ctx,
        ledger,
        signing: SigningContext::new(CHAIN_ID, GAME_CONTRACT),
    }
}

/// Open a channel-backed agent connection and run the real auth flow.
async fn connect_agent(env: &TestEnv, agent: &TestAgent) -> (u64, mpsc::UnboundedReceiver<String>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn_id = env.ctx.broadcaster.add_client(ClientKind::Agent, tx).await;
    let challenge = env.ctx.auth.generate_challenge();
    let signature = agent.sign_message(&challenge.challenge);
    gateway::handle_client_event(
        &env.ctx,
        conn_id,
        ClientEvent::AuthResponse {
            address: agent.address(),
            signature,
            challenge_id: challenge.challenge_id,
        },
    )
    .await;

    let frame = rx.recv().await.expect("auth reply");
    assert!(frame.contains("AUTH_SUCCESS"), "unexpected: {frame}");
    (conn_id, rx)
}

async fn connect_spectator(env: &TestEnv) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    env.ctx.broadcaster.add_client(ClientKind::Spectator, tx).await;
    rx
}

fn drain_types(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut types = vec![];
    while let Ok(frame) = rx.try_recv() {
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        types.push(value["type"].as_str().unwrap().to_string());
    }
    types
}

/// Submit a signed choice, retrying until the match reaches its choice
/// phase.
async fn submit_until_ok(env: &TestEnv, match_id: u64, agent: &TestAgent, choice: Choice) {
    for _ in 0..100 {
        let sig = agent.sign_choice(&env.signing, match_id, choice, U256::ZERO);
        match env
            .ctx
            .manager
            .submit_choice(match_id, agent.address(), choice, sig)
            .await
        {
            Ok(()) => return,
            Err(_) => sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("choice for match {match_id} never accepted");
}

#[tokio::test]
async fn test_quick_match_both_split() {
    let env = env();
    let alice = TestAgent::new("alice");
    let bob = TestAgent::new("bob");
    let (alice_conn, mut alice_rx) = connect_agent(&env, &alice).await;
    let (bob_conn, _bob_rx) = connect_agent(&env, &bob).await;
    let mut spectator = connect_spectator(&env).await;

    gateway::handle_client_event(&env.ctx, alice_conn, ClientEvent::JoinQueue {}).await;
    gateway::handle_client_event(&env.ctx, bob_conn, ClientEvent::JoinQueue {}).await;
    sleep(Duration::from_millis(80)).await;

    let created = env.ledger.created_matches();
    assert_eq!(created.len(), 1);
    let match_id = created[0].match_id;

    gateway::handle_client_event(
        &env.ctx,
        alice_conn,
        ClientEvent::MatchMessage {
            match_id,
            message: "cooperate".into(),
        },
    )
    .await;

    submit_until_ok(&env, match_id, &alice, Choice::Split).await;
    submit_until_ok(&env, match_id, &bob, Choice::Split).await;
    sleep(Duration::from_millis(150)).await;

    // One settlement batch with one entry.
    let settles = env.ledger.settle_calls();
    assert_eq!(settles.len(), 1);
    assert_eq!(settles[0].len(), 1);
    assert_eq!(settles[0][0].choice_a, Choice::Split);
    assert_eq!(settles[0][0].choice_b, Choice::Split);

    let types = drain_types(&mut spectator);
    for expected in [
        "QUEUE_UPDATE",
        "MATCH_STARTED",
        "NEGOTIATION_MESSAGE",
        "CHOICE_PHASE_STARTED",
        "CHOICE_LOCKED",
        "CHOICES_REVEALED",
        "MATCH_CONFIRMED",
    ] {
        assert!(types.contains(&expected.to_string()), "missing {expected} in {types:?}");
    }

    // The winner-side view: alice saw her match start and confirm.
    let alice_types = drain_types(&mut alice_rx);
    assert!(alice_types.contains(&"MATCH_STARTED".to_string()));
    assert!(alice_types.contains(&"CHOICE_ACCEPTED".to_string()));
    assert!(alice_types.contains(&"MATCH_CONFIRMED".to_string()));
}

#[tokio::test]
async fn test_quick_match_a_steals() {
    let env = env();
    let alice = TestAgent::new("alice");
    let bob = TestAgent::new("bob");
    let (alice_conn, _a_rx) = connect_agent(&env, &alice).await;
    let (bob_conn, _b_rx) = connect_agent(&env, &bob).await;
    let mut spectator = connect_spectator(&env).await;

    gateway::handle_client_event(&env.ctx, alice_conn, ClientEvent::JoinQueue {}).await;
    gateway::handle_client_event(&env.ctx, bob_conn, ClientEvent::JoinQueue {}).await;
    sleep(Duration::from_millis(80)).await;
    let created = env.ledger.created_matches();
    let match_id = created[0].match_id;

    // Queue pairing keeps arrival order: alice is agentA.
    assert_eq!(created[0].agent_a, alice.address());
    submit_until_ok(&env, match_id, &alice, Choice::Steal).await;
    submit_until_ok(&env, match_id, &bob, Choice::Split).await;
    sleep(Duration::from_millis(150)).await;

    let settles = env.ledger.settle_calls();
    assert_eq!(settles[0][0].choice_a, Choice::Steal);
    assert_eq!(settles[0][0].choice_b, Choice::Split);

    // AGENT_A_STEALS on the wire.
    let revealed = {
        let mut found = None;
        while let Ok(frame) = spectator.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == "CHOICES_REVEALED" {
                found = Some(value);
            }
        }
        found.expect("no CHOICES_REVEALED")
    };
    assert_eq!(revealed["payload"]["result"], 1);
    assert_eq!(revealed["payload"]["resultName"], "AGENT_A_STEALS");
}

#[tokio::test]
async fn test_duplicate_queue_join_is_an_error() {
    let env = env();
    let alice = TestAgent::new("alice");
    let (conn, mut rx) = connect_agent(&env, &alice).await;

    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinQueue {}).await;
    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinQueue {}).await;
    sleep(Duration::from_millis(10)).await;

    let types = drain_types(&mut rx);
    assert!(types.contains(&"QUEUE_JOINED".to_string()));
    assert!(types.contains(&"ERROR".to_string()));
}

#[tokio::test]
async fn test_queues_are_mutually_exclusive() {
    let env = env();
    let alice = TestAgent::new("alice");
    let (conn, mut rx) = connect_agent(&env, &alice).await;

    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinQueue {}).await;
    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinTournamentQueue {}).await;
    sleep(Duration::from_millis(10)).await;

    let types = drain_types(&mut rx);
    assert!(types.contains(&"ERROR".to_string()));
}

#[tokio::test]
async fn test_unauthenticated_command_rejected() {
    let env = env();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = env.ctx.broadcaster.add_client(ClientKind::Agent, tx).await;

    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinQueue {}).await;
    let frame = rx.recv().await.unwrap();
    assert!(frame.contains("ERROR"));
    assert!(frame.contains("Not authenticated"));
}

#[tokio::test]
async fn test_unregistered_agent_auth_fails() {
    let env = env();
    let mallory = TestAgent::new("mallory");
    env.ledger.set_unregistered(mallory.address());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let conn = env.ctx.broadcaster.add_client(ClientKind::Agent, tx).await;
    let challenge = env.ctx.auth.generate_challenge();
    let signature = mallory.sign_message(&challenge.challenge);
    gateway::handle_client_event(
        &env.ctx,
        conn,
        ClientEvent::AuthResponse {
            address: mallory.address(),
            signature,
            challenge_id: challenge.challenge_id,
        },
    )
    .await;

    let frame = rx.recv().await.unwrap();
    assert!(frame.contains("AUTH_FAILED"));
}

async fn join_lobby(env: &TestEnv, conn: u64) {
    gateway::handle_client_event(&env.ctx, conn, ClientEvent::JoinTournamentQueue {}).await;
}

async fn sign_tournament_join(env: &TestEnv, conn: u64, agent: &TestAgent, tournament_id: u64) {
    let join_signature = agent.sign_join(&env.signing, tournament_id, U256::ZERO);
    gateway::handle_client_event(
        &env.ctx,
        conn,
        ClientEvent::TournamentJoinSigned {
            tournament_id,
            join_signature,
            permit_deadline: U256::from(u64::MAX),
            v: 27,
            r: B256::ZERO,
            s: B256::ZERO,
        },
    )
    .await;
}

#[tokio::test]
async fn test_tournament_happy_path() {
    let env = env();
    let agents: Vec<TestAgent> = (0..4)
        .map(|i| TestAgent::new(&format!("agent{i}")))
        .collect();
    let mut conns = vec![];
    for agent in &agents {
        let (conn, rx) = connect_agent(&env, agent).await;
        conns.push((conn, rx));
    }
    let mut spectator = connect_spectator(&env).await;

    for (conn, _) in &conns {
        join_lobby(&env, *conn).await;
    }
    // Trigger delay, then tournament creation and join requests.
    sleep(Duration::from_millis(120)).await;
    let tournament_id = 1;
    for ((conn, _), agent) in conns.iter().zip(&agents) {
        sign_tournament_join(&env, *conn, agent, tournament_id).await;
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(env.ledger.join_calls().len(), 4);

    // All four joined: the tournament starts early and round 1 launches.
    // Drive every created match to BOTH_SPLIT until rankings land.
    let mut driven: HashSet<u64> = HashSet::new();
    let deadline = Instant::now() + Duration::from_secs(15);
    while env.ledger.ranking_calls().is_empty() {
        assert!(Instant::now() < deadline, "tournament never finished");
        for m in env.ledger.created_matches() {
            if m.tournament_id != tournament_id || !driven.insert(m.match_id) {
                continue;
            }
            let a = agents.iter().find(|x| x.address() == m.agent_a).unwrap();
            let b = agents.iter().find(|x| x.address() == m.agent_b).unwrap();
            submit_until_ok(&env, m.match_id, a, Choice::Split).await;
            submit_until_ok(&env, m.match_id, b, Choice::Split).await;
        }
        sleep(Duration::from_millis(20)).await;
    }

    // 3 rounds of 2 matches over 4 players.
    assert_eq!(driven.len(), 6);

    let rankings = env.ledger.ranking_calls();
    assert_eq!(rankings.len(), 1);
    assert_eq!(rankings[0].0, tournament_id);
    assert_eq!(rankings[0].1.len(), 4);

    // Ledger finalization order.
    let ops = env.ledger.ops();
    let pos = |needle: &str| ops.iter().position(|op| op.contains(needle)).unwrap();
    assert!(pos("advanceToFinal") < pos("completeTournament"));
    assert!(pos("completeTournament") < pos("setFinalRankings"));

    let types = drain_types(&mut spectator);
    for expected in [
        "TOURNAMENT_CREATED",
        "TOURNAMENT_STARTED",
        "TOURNAMENT_ROUND_STARTED",
        "TOURNAMENT_UPDATE",
        "TOURNAMENT_ROUND_COMPLETE",
        "TOURNAMENT_COMPLETE",
    ] {
        assert!(types.contains(&expected.to_string()), "missing {expected}");
    }
}

#[tokio::test]
async fn test_tournament_under_subscription_cancels_and_requeues() {
    let env = env();
    let agents: Vec<TestAgent> = (0..4)
        .map(|i| TestAgent::new(&format!("agent{i}")))
        .collect();
    let mut conns = vec![];
    for agent in &agents {
        let (conn, rx) = connect_agent(&env, agent).await;
        conns.push((conn, rx));
    }

    for (conn, _) in &conns {
        join_lobby(&env, *conn).await;
    }
    sleep(Duration::from_millis(120)).await;

    // Only three respond; the fourth disconnects.
    let tournament_id = 1;
    for ((conn, _), agent) in conns.iter().zip(&agents).take(3) {
        sign_tournament_join(&env, *conn, agent, tournament_id).await;
    }
    env.ctx.broadcaster.remove_client(conns[3].0).await;

    // Past the join deadline.
    sleep(Duration::from_millis(500)).await;

    let ops = env.ledger.ops();
    assert!(
        ops.iter().any(|op| op.contains("cancelTournament(1)")),
        "no cancellation in {ops:?}"
    );

    // The three connected agents are back in the lobby; the fourth is gone.
    let (resp, rx) = tokio::sync::oneshot::channel();
    env.ctx
        .lobby_tx
        .send(signals_orchestrator::frame::LobbyFrame::Size { resp })
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap(), 3);
}
