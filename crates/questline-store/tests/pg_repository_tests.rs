//! Integration tests for `PgQuestRepository`.

use chrono::{Duration, TimeZone, Utc};
use questline_core::chapter::Chapter;
use questline_core::collaborators::GeneratedChapter;
use questline_core::error::EngineError;
use questline_core::execution::Execution;
use questline_core::quest::{Quest, QuestStatus};
use questline_core::repository::QuestRepository;
use questline_core::vote::{ChapterVote, QuestVote, VoteInterpretation};
use questline_store::PgQuestRepository;
use sqlx::PgPool;
use uuid::Uuid;

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn make_quest(short_id: &str) -> Quest {
    Quest::new(Uuid::new_v4(), short_id, fixed_now())
}

fn make_chapter(quest_id: Uuid, chapter_number: i32) -> Chapter {
    Chapter::draft(
        quest_id,
        chapter_number,
        GeneratedChapter {
            content: format!("chapter {chapter_number}"),
            options: vec!["left".to_owned(), "right".to_owned()],
            sources: vec!["https://example.org/lore".to_owned()],
            is_final: false,
        },
        fixed_now(),
    )
}

fn make_vote(chapter: &Chapter, user: &str, selected: i32, offset_secs: i64) -> ChapterVote {
    ChapterVote {
        id: Uuid::new_v4(),
        chapter_id: chapter.id,
        quest_id: chapter.quest_id,
        user_id: user.to_owned(),
        selected_option: selected,
        reply_text: format!("going {selected}"),
        interpretation: VoteInterpretation {
            label: format!("option {selected}"),
            confidence: 0.85,
        },
        voted_at: fixed_now() + Duration::seconds(offset_secs),
    }
}

// --- quests ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_quest_round_trip(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-roundtrip");

    repo.create_quest(&quest).await.unwrap();
    let loaded = repo.load_quest(quest.id).await.unwrap();

    assert_eq!(loaded.id, quest.id);
    assert_eq!(loaded.short_id, "q-roundtrip");
    assert_eq!(loaded.status, QuestStatus::Active);
    assert_eq!(loaded.current_chapter, 0);
    assert!(loaded.chapter_deadline.is_none());
    assert_eq!(loaded.current_state, serde_json::json!({}));
    assert_eq!(loaded.timeline_data, serde_json::json!([]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_quest_by_short_id(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-slug");
    repo.create_quest(&quest).await.unwrap();

    let loaded = repo.load_quest_by_short_id("q-slug").await.unwrap();
    assert_eq!(loaded.id, quest.id);

    let missing = repo.load_quest_by_short_id("q-unknown").await;
    assert!(matches!(missing, Err(EngineError::QuestNotFound(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_quest_persists_engine_fields(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let mut quest = make_quest("q-update");
    repo.create_quest(&quest).await.unwrap();

    quest.status = QuestStatus::Completed;
    quest.current_chapter = 3;
    quest.chapter_deadline = None;
    quest.last_posted_tweet_id = Some("tweet-3".to_owned());
    quest.current_state = serde_json::json!({ "idle_rounds": 1 });
    repo.update_quest(&quest).await.unwrap();

    let loaded = repo.load_quest(quest.id).await.unwrap();
    assert_eq!(loaded.status, QuestStatus::Completed);
    assert_eq!(loaded.current_chapter, 3);
    assert_eq!(loaded.last_posted_tweet_id.as_deref(), Some("tweet-3"));
    assert_eq!(loaded.current_state["idle_rounds"], 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_due_quests_filters_by_status_and_deadline(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);

    let mut due = make_quest("q-due");
    due.chapter_deadline = Some(fixed_now() - Duration::hours(1));
    repo.create_quest(&due).await.unwrap();

    let mut future = make_quest("q-future");
    future.chapter_deadline = Some(fixed_now() + Duration::hours(1));
    repo.create_quest(&future).await.unwrap();

    let mut archived = make_quest("q-archived");
    archived.status = QuestStatus::Archived;
    archived.chapter_deadline = Some(fixed_now() - Duration::hours(1));
    repo.create_quest(&archived).await.unwrap();

    let no_window = make_quest("q-no-window");
    repo.create_quest(&no_window).await.unwrap();

    let due_ids = repo.list_due_quests(fixed_now()).await.unwrap();

    assert_eq!(due_ids, vec![due.id]);
}

// --- chapters ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_chapter_round_trip(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-chapters");
    repo.create_quest(&quest).await.unwrap();
    let chapter = make_chapter(quest.id, 0);

    repo.create_chapter(&chapter).await.unwrap();
    let loaded = repo.load_chapter(quest.id, 0).await.unwrap().unwrap();

    assert_eq!(loaded.id, chapter.id);
    assert_eq!(loaded.options, vec!["left", "right"]);
    assert_eq!(loaded.sources, vec!["https://example.org/lore"]);
    assert!(!loaded.is_final);
    assert!(loaded.posted_tweet_id.is_none());

    assert!(repo.load_chapter(quest.id, 1).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_duplicate_chapter_number_is_rejected(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-dup");
    repo.create_quest(&quest).await.unwrap();

    repo.create_chapter(&make_chapter(quest.id, 1)).await.unwrap();
    let duplicate = repo.create_chapter(&make_chapter(quest.id, 1)).await;

    assert!(matches!(duplicate, Err(EngineError::Storage(_))));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_chapters_orders_by_number(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-order");
    repo.create_quest(&quest).await.unwrap();
    repo.create_chapter(&make_chapter(quest.id, 1)).await.unwrap();
    repo.create_chapter(&make_chapter(quest.id, 0)).await.unwrap();
    repo.create_chapter(&make_chapter(quest.id, 2)).await.unwrap();

    let chapters = repo.list_chapters(quest.id).await.unwrap();

    let numbers: Vec<i32> = chapters.iter().map(|c| c.chapter_number).collect();
    assert_eq!(numbers, vec![0, 1, 2]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_commit_advancement_writes_both_rows(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let mut quest = make_quest("q-advance");
    repo.create_quest(&quest).await.unwrap();
    let mut chapter = make_chapter(quest.id, 1);
    repo.create_chapter(&chapter).await.unwrap();

    chapter.posted_tweet_id = Some("tweet-1".to_owned());
    quest.current_chapter = 1;
    quest.last_posted_tweet_id = Some("tweet-1".to_owned());
    quest.chapter_deadline = Some(fixed_now() + Duration::hours(24));
    repo.commit_advancement(&quest, &chapter).await.unwrap();

    let stored_chapter = repo.load_chapter(quest.id, 1).await.unwrap().unwrap();
    assert_eq!(stored_chapter.posted_tweet_id.as_deref(), Some("tweet-1"));

    let stored_quest = repo.load_quest(quest.id).await.unwrap();
    assert_eq!(stored_quest.current_chapter, 1);
    assert_eq!(stored_quest.last_posted_tweet_id.as_deref(), Some("tweet-1"));
    assert!(stored_quest.chapter_deadline.is_some());
}

// --- votes ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_votes_round_trip_in_cast_order(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-votes");
    repo.create_quest(&quest).await.unwrap();
    let chapter = make_chapter(quest.id, 0);
    repo.create_chapter(&chapter).await.unwrap();

    repo.record_vote(&make_vote(&chapter, "b", 1, 10)).await.unwrap();
    repo.record_vote(&make_vote(&chapter, "a", 0, 5)).await.unwrap();

    let votes = repo.list_votes(chapter.id).await.unwrap();

    assert_eq!(votes.len(), 2);
    assert_eq!(votes[0].user_id, "a");
    assert_eq!(votes[1].user_id, "b");
    assert_eq!(votes[0].interpretation.label, "option 0");
    assert!((votes[0].interpretation.confidence - 0.85).abs() < f64::EPSILON);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_quest_vote_upserts_per_user(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-signal");
    repo.create_quest(&quest).await.unwrap();

    let mut signal = QuestVote {
        quest_id: quest.id,
        user_id: "a".to_owned(),
        vote: "continue".to_owned(),
        voted_at: fixed_now(),
    };
    repo.record_quest_vote(&signal).await.unwrap();
    assert_eq!(repo.count_quest_votes(quest.id, "stop").await.unwrap(), 0);

    signal.vote = "stop".to_owned();
    signal.voted_at = fixed_now() + Duration::minutes(5);
    repo.record_quest_vote(&signal).await.unwrap();

    assert_eq!(repo.count_quest_votes(quest.id, "stop").await.unwrap(), 1);
    assert_eq!(repo.count_quest_votes(quest.id, "continue").await.unwrap(), 0);
}

// --- executions ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_executions_round_trip(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-duel");
    repo.create_quest(&quest).await.unwrap();

    let execution = Execution {
        id: Uuid::new_v4(),
        quest_id: quest.id,
        user_id: "challenger".to_owned(),
        side: "red".to_owned(),
        roast_text: "outvoted and outwritten".to_owned(),
        tombstone_url: Some("https://example.org/rip".to_owned()),
        created_at: fixed_now(),
    };
    repo.record_execution(&execution).await.unwrap();

    let executions = repo.list_executions(quest.id).await.unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].user_id, "challenger");
    assert_eq!(executions[0].side, "red");
    assert_eq!(
        executions[0].tombstone_url.as_deref(),
        Some("https://example.org/rip")
    );
}

// --- leases ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_lease_excludes_other_workers_until_expiry(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-lease");
    repo.create_quest(&quest).await.unwrap();
    let expires = fixed_now() + Duration::seconds(60);

    assert!(repo
        .acquire_lease(quest.id, "worker-a", expires, fixed_now())
        .await
        .unwrap());
    // A live lease blocks other workers but stays re-entrant for its owner.
    assert!(!repo
        .acquire_lease(quest.id, "worker-b", expires, fixed_now())
        .await
        .unwrap());
    assert!(repo
        .acquire_lease(quest.id, "worker-a", expires, fixed_now())
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_expired_lease_can_be_reclaimed(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-lease-expiry");
    repo.create_quest(&quest).await.unwrap();

    assert!(repo
        .acquire_lease(
            quest.id,
            "worker-crashed",
            fixed_now() - Duration::seconds(5),
            fixed_now() - Duration::seconds(65),
        )
        .await
        .unwrap());

    assert!(repo
        .acquire_lease(
            quest.id,
            "worker-b",
            fixed_now() + Duration::seconds(60),
            fixed_now(),
        )
        .await
        .unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_release_lease_frees_slot_only_for_owner(pool: PgPool) {
    let repo = PgQuestRepository::new(pool);
    let quest = make_quest("q-release");
    repo.create_quest(&quest).await.unwrap();
    let expires = fixed_now() + Duration::seconds(60);

    repo.acquire_lease(quest.id, "worker-a", expires, fixed_now())
        .await
        .unwrap();

    // A non-owner release is a no-op.
    repo.release_lease(quest.id, "worker-b").await.unwrap();
    assert!(!repo
        .acquire_lease(quest.id, "worker-b", expires, fixed_now())
        .await
        .unwrap());

    repo.release_lease(quest.id, "worker-a").await.unwrap();
    assert!(repo
        .acquire_lease(quest.id, "worker-b", expires, fixed_now())
        .await
        .unwrap());
}
