//! Integration tests for the weekly check flow.
//!
//! These tests run declaration, allocation, check rounds and streak updates
//! together against an in-memory database and the local gateway.

use std::sync::Arc;

use habitroom_core::{
    CheckSession, Database, DeclarationService, HabitDraft, HabitStore, LocalGateway, Member,
    PromptResponse, ResponseOutcome, SessionPhase, UserId, WeekKey, GROUP_CAPACITY,
};

struct World {
    store: Arc<Database>,
    gateway: Arc<LocalGateway>,
    declarations: DeclarationService,
    session: CheckSession,
}

fn world() -> World {
    let store = Arc::new(Database::open_memory().unwrap());
    let gateway = Arc::new(LocalGateway::new());
    World {
        declarations: DeclarationService::new(store.clone(), gateway.clone(), "habit-tracking"),
        session: CheckSession::new(store.clone(), gateway.clone()),
        store,
        gateway,
    }
}

fn member(id: u64) -> Member {
    Member {
        id: UserId(id),
        display_name: format!("user{id}"),
    }
}

/// Answer every open prompt as completed, except those of `silent`.
async fn answer_all_but(world: &World, silent: UserId) -> usize {
    let mut answered = 0;
    for sent in world.gateway.open_prompts() {
        if sent.member.id == silent {
            continue;
        }
        let outcome = world
            .session
            .handle_response(&PromptResponse {
                habit_id: sent.prompt.habit_id,
                week_key: sent.prompt.week_key,
                responder: sent.member.id,
                completed: true,
                message: Some(sent.handle.clone()),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, ResponseOutcome::Recorded { .. }));
        answered += 1;
    }
    answered
}

#[tokio::test]
async fn nine_users_over_three_weeks() {
    let world = world();
    let mut habits = Vec::new();
    for id in 1..=9 {
        let habit = world
            .declarations
            .declare(&member(id), &HabitDraft::new("Stretch", "desk, 9am", ""))
            .await
            .unwrap();
        habits.push(habit);
    }

    let groups = world.store.list_groups().unwrap();
    let sizes: Vec<usize> = groups
        .iter()
        .map(|g| world.store.count_habits_in_group(g.id).unwrap())
        .collect();
    assert_eq!(sizes, vec![GROUP_CAPACITY, 1]);
    assert_eq!(groups[0].occupied(), 8);
    assert_eq!(groups[1].slot_of(UserId(9)), Some(0));

    let silent = UserId(9);
    let mut week: WeekKey = "2024-W40".parse().unwrap();
    for _ in 0..3 {
        let report = world.session.begin_round(week).await.unwrap();
        assert_eq!(report.dispatched, 9);
        assert_eq!(answer_all_but(&world, silent).await, 8);

        let resolution = world.session.end_round().await.unwrap();
        assert_eq!(resolution.forced, vec![habits[8].id]);
        assert_eq!(world.session.phase(), SessionPhase::Idle);
        week = week.next();
    }

    for habit in &habits[..8] {
        assert_eq!(world.store.current_streak(habit.id).unwrap(), 3);
    }
    assert_eq!(world.store.current_streak(habits[8].id).unwrap(), 0);

    let overview = world.declarations.overview(UserId(1)).unwrap();
    assert_eq!(overview[0].streak, 3);
}

#[tokio::test]
async fn skipped_week_restarts_streak() {
    let world = world();
    let habit = world
        .declarations
        .declare(&member(1), &HabitDraft::new("Journal", "", ""))
        .await
        .unwrap();

    for week in ["2024-W50", "2024-W51"] {
        world.session.begin_round(week.parse().unwrap()).await.unwrap();
        answer_all_but(&world, UserId(0)).await;
        world.session.end_round().await.unwrap();
    }
    assert_eq!(world.store.current_streak(habit.id).unwrap(), 2);

    // No round in 2024-W52; the next answered week starts over.
    world.session.begin_round("2025-W01".parse().unwrap()).await.unwrap();
    answer_all_but(&world, UserId(0)).await;
    world.session.end_round().await.unwrap();
    assert_eq!(world.store.current_streak(habit.id).unwrap(), 1);
}

#[tokio::test]
async fn year_boundary_keeps_streak() {
    let world = world();
    let habit = world
        .declarations
        .declare(&member(1), &HabitDraft::new("Journal", "", ""))
        .await
        .unwrap();

    for week in ["2020-W53", "2021-W01"] {
        world.session.begin_round(week.parse().unwrap()).await.unwrap();
        answer_all_but(&world, UserId(0)).await;
        world.session.end_round().await.unwrap();
    }
    assert_eq!(world.store.current_streak(habit.id).unwrap(), 2);
}

#[tokio::test]
async fn removed_habit_frees_its_place() {
    let world = world();
    let mut habits = Vec::new();
    for id in 1..=8 {
        habits.push(
            world
                .declarations
                .declare(&member(id), &HabitDraft::new("Walk", "", ""))
                .await
                .unwrap(),
        );
    }
    world.declarations.remove(habits[2].id).unwrap();

    let newcomer = world
        .declarations
        .declare(&member(20), &HabitDraft::new("Swim", "", ""))
        .await
        .unwrap();
    assert_eq!(newcomer.group_id, habits[0].group_id);
    assert_eq!(world.store.list_groups().unwrap().len(), 1);
    assert_eq!(world.gateway.containers().len(), 1);
}
