use quizroom::config::Config;
use quizroom::error::GameError;
use quizroom::loader::QuizDefinition;
use quizroom::protocol::ServerMessage;
use quizroom::room::registry::RoomRegistry;
use quizroom::store::{CachedStore, FileStore, MemoryStore, RoomStore};
use quizroom::types::*;
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        time_limit_ms: 30_000,
        question_count: 2,
        grading_delay_ms: 50,
        round_grace_ms: 200,
        ..Config::default()
    })
}

fn question_bank() -> Vec<Question> {
    vec![
        Question {
            text: "Who shot first?".to_string(),
            help: None,
            options: vec!["Han".into(), "Greedo".into(), "Luke".into(), "Chewie".into()],
            correct_answer: 0,
        },
        Question {
            text: "Home of the Ewoks?".to_string(),
            help: Some("Forest moon".to_string()),
            options: vec!["Hoth".into(), "Endor".into(), "Naboo".into(), "Dagobah".into()],
            correct_answer: 1,
        },
    ]
}

fn default_quiz() -> QuizDefinition {
    QuizDefinition {
        room_id: "Cantina".to_string(),
        questions: question_bank(),
    }
}

/// End-to-end flow for one quiz session: create, join, start, answer,
/// grade, advance, finish.
#[tokio::test]
async fn test_full_game_flow() {
    let store: Arc<dyn RoomStore> = Arc::new(MemoryStore::new());
    let registry = Arc::new(RoomRegistry::new(store.clone(), test_config()));

    // 1. Host creates a room
    let host = "host-conn".to_string();
    let game_id = registry
        .create_room(question_bank(), Some("Mos-Eisley".to_string()), Some(host.clone()))
        .await
        .expect("room creation should succeed");
    assert_eq!(game_id, "mos-eisley");

    let handle = registry.handle(&game_id).await.unwrap();
    let mut events = handle.subscribe();

    // 2. Players join (the host plays too)
    handle.join(host.clone(), "Han".to_string()).await.unwrap();
    handle.join("p2".to_string(), "Leia".to_string()).await.unwrap();

    match events.recv().await.unwrap() {
        ServerMessage::PlayerJoined {
            players,
            host_id,
            scores,
            ..
        } => {
            assert_eq!(players.len(), 1);
            assert_eq!(host_id, Some(host.clone()));
            assert_eq!(scores.get(&host), Some(&0));
        }
        other => panic!("expected playerJoined, got {:?}", other),
    }
    // Second join broadcast
    match events.recv().await.unwrap() {
        ServerMessage::PlayerJoined { players, .. } => assert_eq!(players.len(), 2),
        other => panic!("expected playerJoined, got {:?}", other),
    }

    // 3. A non-host start is rejected and nothing is broadcast
    let err = handle.start(Some("p2".to_string())).await.unwrap_err();
    assert!(matches!(err, GameError::Authorization(_)));

    // 4. Host starts; the first question goes out
    handle.start(Some(host.clone())).await.unwrap();
    match events.recv().await.unwrap() {
        ServerMessage::GameStarted {
            question,
            time_limit,
        } => {
            assert_eq!(time_limit, 30_000);
            assert_eq!(question.options.len(), 4);
        }
        other => panic!("expected gameStarted, got {:?}", other),
    }

    // 5. Both answer the first question correctly
    let first_correct = {
        let room = store.get(&room_key(&game_id)).await.unwrap().unwrap();
        room.selected_questions[0].correct_answer
    };
    handle
        .submit_answer(host.clone(), first_correct, 20_000)
        .await
        .unwrap();
    handle
        .submit_answer("p2".to_string(), first_correct, 10_000)
        .await
        .unwrap();

    let room = store.get(&room_key(&game_id)).await.unwrap().unwrap();
    assert_eq!(room.scores.get(&host), Some(&2000));
    assert_eq!(room.scores.get("p2"), Some(&1000));
    assert_eq!(room.status, RoomStatus::Grading);

    // 6. After the grading delay the second question is broadcast
    tokio::time::sleep(Duration::from_millis(150)).await;
    let room = store.get(&room_key(&game_id)).await.unwrap().unwrap();
    assert_eq!(room.current_question_index, 1);
    assert_eq!(room.status, RoomStatus::Active);

    // 7. Finish the game; rankings come out best first
    let second_correct = room.selected_questions[1].correct_answer;
    handle
        .submit_answer(host.clone(), second_correct, 15_000)
        .await
        .unwrap();
    handle
        .submit_answer("p2".to_string(), second_correct, 10_000)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let room = store.get(&room_key(&game_id)).await.unwrap().unwrap();
    assert_eq!(room.status, RoomStatus::Ended);

    let mut game_ended = None;
    while let Ok(msg) = events.try_recv() {
        if let ServerMessage::GameEnded { rankings, scores, .. } = msg {
            game_ended = Some((rankings, scores));
        }
    }
    let (rankings, scores) = game_ended.expect("gameEnded should have been broadcast");
    assert_eq!(scores.get(&host), Some(&3500));
    assert_eq!(scores.get("p2"), Some(&2000));
    assert_eq!(rankings, vec![host.clone(), "p2".to_string()]);
}

/// Rooms survive a process restart via the file store.
#[tokio::test]
async fn test_room_survives_registry_restart() {
    let dir = tempfile::tempdir().unwrap();

    let game_id = {
        let backing: Arc<dyn RoomStore> =
            Arc::new(FileStore::new(dir.path()).await.unwrap());
        let store: Arc<dyn RoomStore> = Arc::new(CachedStore::new(backing));
        let registry = RoomRegistry::new(store, test_config());

        let id = registry
            .create_room(question_bank(), Some("endor".to_string()), Some("h1".to_string()))
            .await
            .unwrap();
        let handle = registry.handle(&id).await.unwrap();
        handle.join("h1".to_string(), "Han".to_string()).await.unwrap();
        handle.join("p2".to_string(), "Leia".to_string()).await.unwrap();
        handle.start(Some("h1".to_string())).await.unwrap();
        id
    };

    // Fresh registry over the same data dir: the actor is revived from
    // the persisted snapshot with all state intact.
    let backing: Arc<dyn RoomStore> = Arc::new(FileStore::new(dir.path()).await.unwrap());
    let store: Arc<dyn RoomStore> = Arc::new(CachedStore::new(backing));
    let registry = RoomRegistry::new(store, test_config());

    let handle = registry.handle(&game_id).await.unwrap();
    match handle.snapshot().await.unwrap() {
        ServerMessage::Snapshot {
            status,
            players,
            scores,
            current_question,
            ..
        } => {
            assert_eq!(status, RoomStatus::Active);
            assert_eq!(players.len(), 2);
            assert_eq!(scores.len(), 2);
            assert!(current_question.is_some());
        }
        other => panic!("expected snapshot, got {:?}", other),
    }
}

/// An admin reset mid-round supersedes the game: everyone gets the global
/// reset signal and the default room comes back empty and Waiting.
#[tokio::test]
async fn test_admin_reset_mid_round() {
    let registry = Arc::new(RoomRegistry::new(
        Arc::new(MemoryStore::new()),
        test_config(),
    ));
    let mut global = registry.subscribe_global();

    let game_id = registry.load_default(&default_quiz()).await.unwrap();
    assert_eq!(game_id, "cantina");
    assert_eq!(registry.current_game_id().await, Some(game_id.clone()));

    let handle = registry.handle(&game_id).await.unwrap();
    handle.join("p1".to_string(), "Han".to_string()).await.unwrap();
    handle.start(None).await.unwrap(); // admin start, no host set
    handle.submit_answer("p1".to_string(), 0, 20_000).await.unwrap();

    registry.admin_reset(&default_quiz()).await.unwrap();
    assert!(matches!(global.recv().await, Ok(ServerMessage::GameReset)));

    // requestGameId equivalent: the current id points at a fresh room
    let current = registry.current_game_id().await.unwrap();
    let handle = registry.handle(&current).await.unwrap();
    match handle.snapshot().await.unwrap() {
        ServerMessage::Snapshot {
            status,
            players,
            scores,
            ..
        } => {
            assert_eq!(status, RoomStatus::Waiting);
            assert!(players.is_empty());
            assert!(scores.is_empty());
        }
        other => panic!("expected snapshot, got {:?}", other),
    }
}

/// Late joiner during an active game observes without missed-round credit.
#[tokio::test]
async fn test_late_join_mid_game() {
    let registry = RoomRegistry::new(Arc::new(MemoryStore::new()), test_config());
    let id = registry
        .create_room(question_bank(), Some("hoth".to_string()), Some("h1".to_string()))
        .await
        .unwrap();
    let handle = registry.handle(&id).await.unwrap();

    handle.join("h1".to_string(), "Han".to_string()).await.unwrap();
    handle.start(Some("h1".to_string())).await.unwrap();

    let direct = handle.join("late".to_string(), "Lando".to_string()).await.unwrap();
    // The latecomer is brought up to speed directly
    assert!(direct
        .iter()
        .any(|m| matches!(m, ServerMessage::GameStarted { .. })));
    assert!(direct
        .iter()
        .any(|m| matches!(m, ServerMessage::ScoresUpdated { .. })));

    match handle.snapshot().await.unwrap() {
        ServerMessage::Snapshot { scores, .. } => {
            assert_eq!(scores.get("late"), Some(&0));
        }
        other => panic!("expected snapshot, got {:?}", other),
    }
}
