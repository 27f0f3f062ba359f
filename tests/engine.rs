//! Progress cascade scenarios driven through the public engine API.

use goaltrack::access::RecordKind;
use goaltrack::models::{GoalPatch, Inconsistency, ItemPatch, NewGoal, NewItem};
use goaltrack::{Database, Engine, EngineError, GoalCategory, GoalSnapshot, OwnerId};

const ME: OwnerId = OwnerId(1);
const SOMEONE_ELSE: OwnerId = OwnerId(2);

fn test_engine() -> Engine {
    Engine::new(Database::open_in_memory().unwrap())
}

fn goal(engine: &Engine, title: &str) -> i64 {
    engine
        .create_goal(ME, NewGoal::titled(title))
        .unwrap()
        .id
        .unwrap()
}

fn milestone(engine: &Engine, goal_id: i64, title: &str) -> i64 {
    let (milestone, _) = engine
        .create_milestone(ME, goal_id, NewItem::titled(title))
        .unwrap();
    milestone.id.unwrap()
}

fn task(engine: &Engine, milestone_id: i64, title: &str) -> i64 {
    let (task, _) = engine
        .create_task(ME, milestone_id, NewItem::titled(title))
        .unwrap();
    task.id.unwrap()
}

fn assert_invariants(snapshot: &GoalSnapshot) {
    for entry in &snapshot.milestones {
        if entry.milestone.completed {
            assert!(!entry.tasks.is_empty());
            assert!(entry.tasks.iter().all(|t| t.completed));
        }
    }
    assert!(snapshot.goal.progress <= 100);
    if snapshot.milestones.is_empty() {
        assert_eq!(snapshot.goal.progress, 0);
    }
}

#[test]
fn completing_every_task_completes_the_goal() {
    let engine = test_engine();
    let g = goal(&engine, "Run a marathon");
    let m = milestone(&engine, g, "Run 10k");
    let t1 = task(&engine, m, "Buy shoes");
    let t2 = task(&engine, m, "Train three times a week");

    assert_eq!(engine.get_goal(ME, g).unwrap().goal.progress, 0);

    let outcome = engine.toggle_task_completion(ME, t1).unwrap();
    assert!(outcome.task.completed);
    assert!(!outcome.goal.milestone(m).unwrap().milestone.completed);
    assert_eq!(outcome.goal.goal.progress, 0);
    assert_invariants(&outcome.goal);

    let outcome = engine.toggle_task_completion(ME, t2).unwrap();
    assert!(outcome.goal.milestone(m).unwrap().milestone.completed);
    assert_eq!(outcome.goal.goal.progress, 100);
    assert_invariants(&outcome.goal);
}

#[test]
fn empty_milestone_counts_as_not_completed() {
    let engine = test_engine();
    let g = goal(&engine, "Learn Rust");
    let done = milestone(&engine, g, "Read the book");
    milestone(&engine, g, "Write a crate");
    let t1 = task(&engine, done, "Chapters 1-10");
    let t2 = task(&engine, done, "Chapters 11-20");
    engine.toggle_task_completion(ME, t1).unwrap();
    let outcome = engine.toggle_task_completion(ME, t2).unwrap();

    assert_eq!(outcome.goal.completed_milestones(), 1);
    assert_eq!(outcome.goal.goal.progress, 50);
}

#[test]
fn deleting_last_task_reopens_milestone() {
    let engine = test_engine();
    let g = goal(&engine, "Tidy house");
    let m1 = milestone(&engine, g, "Kitchen");
    let m2 = milestone(&engine, g, "Garage");
    let t1 = task(&engine, m1, "Dishes");
    let t2 = task(&engine, m2, "Sort tools");
    engine.toggle_task_completion(ME, t1).unwrap();
    let before = engine.toggle_task_completion(ME, t2).unwrap();
    assert_eq!(before.goal.goal.progress, 100);

    let after = engine.delete_task(ME, t2).unwrap();
    let garage = after.milestone(m2).unwrap();
    assert!(garage.tasks.is_empty());
    assert!(!garage.milestone.completed);
    assert_eq!(after.goal.progress, 50);
    assert_invariants(&after);
}

#[test]
fn deleting_open_task_can_complete_milestone() {
    let engine = test_engine();
    let g = goal(&engine, "Write thesis");
    let m = milestone(&engine, g, "Draft");
    let t1 = task(&engine, m, "Introduction");
    let t2 = task(&engine, m, "Conclusion");
    engine.toggle_task_completion(ME, t1).unwrap();

    let after = engine.delete_task(ME, t2).unwrap();
    assert!(after.milestone(m).unwrap().milestone.completed);
    assert_eq!(after.goal.progress, 100);
}

fn three_milestones_two_done(engine: &Engine) -> (i64, [i64; 3]) {
    let g = goal(engine, "Get fit");
    let a = milestone(engine, g, "Cardio");
    let b = milestone(engine, g, "Strength");
    let c = milestone(engine, g, "Flexibility");
    let ta = task(engine, a, "Run 5k");
    let tb = task(engine, b, "Deadlift");
    task(engine, c, "Yoga");
    engine.toggle_task_completion(ME, ta).unwrap();
    let outcome = engine.toggle_task_completion(ME, tb).unwrap();
    assert_eq!(outcome.goal.goal.progress, 67);
    (g, [a, b, c])
}

#[test]
fn deleting_incomplete_milestone_raises_progress() {
    let engine = test_engine();
    let (g, [_, _, open]) = three_milestones_two_done(&engine);
    let after = engine.delete_milestone(ME, open).unwrap();
    assert_eq!(after.goal.id, Some(g));
    assert_eq!(after.milestones.len(), 2);
    assert_eq!(after.goal.progress, 100);
}

#[test]
fn deleting_completed_milestone_lowers_progress() {
    let engine = test_engine();
    let (_, [done, _, _]) = three_milestones_two_done(&engine);
    let after = engine.delete_milestone(ME, done).unwrap();
    assert_eq!(after.goal.progress, 50);
}

#[test]
fn deleting_every_milestone_resets_progress() {
    let engine = test_engine();
    let g = goal(&engine, "Travel");
    let m = milestone(&engine, g, "Book flights");
    let t = task(&engine, m, "Compare prices");
    assert_eq!(engine.toggle_task_completion(ME, t).unwrap().goal.goal.progress, 100);

    let after = engine.delete_milestone(ME, m).unwrap();
    assert!(after.milestones.is_empty());
    assert_eq!(after.goal.progress, 0);

    // The milestone's tasks went with it
    assert!(matches!(
        engine.toggle_task_completion(ME, t),
        Err(EngineError::NotFound { kind: RecordKind::Task, .. })
    ));
}

#[test]
fn toggling_twice_restores_everything() {
    let engine = test_engine();
    let g = goal(&engine, "Read more");
    let m = milestone(&engine, g, "January");
    let t = task(&engine, m, "Finish novel");
    let before = engine.get_goal(ME, g).unwrap();

    engine.toggle_task_completion(ME, t).unwrap();
    let after = engine.toggle_task_completion(ME, t).unwrap();

    assert!(!after.task.completed);
    assert_eq!(after.goal.goal.progress, before.goal.progress);
    assert_eq!(
        after.goal.milestone(m).unwrap().milestone.completed,
        before.milestone(m).unwrap().milestone.completed
    );
}

#[test]
fn foreign_or_missing_task_is_not_found_and_changes_nothing() {
    let engine = test_engine();
    let g = goal(&engine, "Private goal");
    let m = milestone(&engine, g, "Step one");
    let t = task(&engine, m, "Do it");
    let before = engine.get_goal(ME, g).unwrap();

    let foreign = engine.toggle_task_completion(SOMEONE_ELSE, t).unwrap_err();
    let missing = engine.toggle_task_completion(ME, 9999).unwrap_err();
    assert!(matches!(foreign, EngineError::NotFound { kind: RecordKind::Task, .. }));
    assert!(matches!(missing, EngineError::NotFound { kind: RecordKind::Task, .. }));

    assert_eq!(engine.get_goal(ME, g).unwrap(), before);
}

#[test]
fn every_operation_checks_ownership() {
    let engine = test_engine();
    let g = goal(&engine, "Mine");
    let m = milestone(&engine, g, "Milestone");
    let t = task(&engine, m, "Task");

    assert!(matches!(
        engine.delete_task(SOMEONE_ELSE, t),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.delete_milestone(SOMEONE_ELSE, m),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.delete_goal(SOMEONE_ELSE, g),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.get_goal(SOMEONE_ELSE, g),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.create_milestone(SOMEONE_ELSE, g, NewItem::titled("Sneaky")),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.create_task(SOMEONE_ELSE, m, NewItem::titled("Sneaky")),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.update_task(SOMEONE_ELSE, t, ItemPatch::default()),
        Err(EngineError::NotFound { .. })
    ));
    assert!(engine.list_goals(SOMEONE_ELSE).unwrap().is_empty());

    // Still intact for the owner
    let snapshot = engine.get_goal(ME, g).unwrap();
    assert_eq!(snapshot.milestones.len(), 1);
    assert_eq!(snapshot.milestones[0].tasks.len(), 1);
}

#[test]
fn deleting_goal_removes_the_whole_tree() {
    let engine = test_engine();
    let g = goal(&engine, "Short lived");
    let m = milestone(&engine, g, "Milestone");
    let t = task(&engine, m, "Task");

    engine.delete_goal(ME, g).unwrap();

    assert!(matches!(engine.get_goal(ME, g), Err(EngineError::NotFound { .. })));
    assert!(matches!(
        engine.delete_milestone(ME, m),
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(engine.delete_task(ME, t), Err(EngineError::NotFound { .. })));
}

#[test]
fn new_task_reopens_completed_milestone() {
    let engine = test_engine();
    let g = goal(&engine, "Garden");
    let m = milestone(&engine, g, "Plant");
    let t = task(&engine, m, "Tomatoes");
    assert_eq!(engine.toggle_task_completion(ME, t).unwrap().goal.goal.progress, 100);

    let (created, snapshot) = engine
        .create_task(ME, m, NewItem::titled("Basil"))
        .unwrap();
    assert!(!created.completed);
    assert!(!snapshot.milestone(m).unwrap().milestone.completed);
    assert_eq!(snapshot.goal.progress, 0);
}

#[test]
fn new_milestone_dilutes_progress() {
    let engine = test_engine();
    let g = goal(&engine, "Language");
    let m = milestone(&engine, g, "Basics");
    let t = task(&engine, m, "Alphabet");
    engine.toggle_task_completion(ME, t).unwrap();

    let (_, snapshot) = engine
        .create_milestone(ME, g, NewItem::titled("Grammar"))
        .unwrap();
    assert_eq!(snapshot.goal.progress, 50);
    milestone(&engine, g, "Conversation");
    assert_eq!(engine.get_goal(ME, g).unwrap().goal.progress, 33);
}

#[test]
fn goal_creation_validates_and_defaults() {
    let engine = test_engine();

    assert!(matches!(
        engine.create_goal(ME, NewGoal::titled("   ")),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.create_goal(
            ME,
            NewGoal {
                title: "Dated".to_string(),
                target_date: Some("someday".to_string()),
                ..Default::default()
            }
        ),
        Err(EngineError::Validation(_))
    ));

    let created = engine.create_goal(ME, NewGoal::titled("  Save  ")).unwrap();
    assert_eq!(created.title, "Save");
    assert_eq!(created.category, GoalCategory::Personal);
    assert_eq!(created.progress, 0);
    assert!(engine.get_goal(ME, created.id.unwrap()).unwrap().milestones.is_empty());
}

#[test]
fn edits_never_touch_derived_fields() {
    let engine = test_engine();
    let g = goal(&engine, "Old title");
    let m = milestone(&engine, g, "Milestone");
    let t = task(&engine, m, "Task");
    engine.toggle_task_completion(ME, t).unwrap();

    let updated = engine
        .update_goal(
            ME,
            g,
            GoalPatch {
                title: Some("New title".to_string()),
                category: Some(GoalCategory::Career),
                target_date: Some("2027-01-31".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.title, "New title");
    assert_eq!(updated.progress, 100);

    let renamed = engine
        .update_task(
            ME,
            t,
            ItemPatch {
                title: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(renamed.completed);

    let milestone = engine
        .update_milestone(
            ME,
            m,
            ItemPatch {
                due_date: Some("2026-11-01".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(milestone.completed);
    assert_eq!(milestone.due_date.as_deref(), Some("2026-11-01"));

    assert!(matches!(
        engine.update_task(
            ME,
            t,
            ItemPatch {
                title: Some(String::new()),
                ..Default::default()
            }
        ),
        Err(EngineError::Validation(_))
    ));

    let snapshot = engine.get_goal(ME, g).unwrap();
    assert_eq!(snapshot.goal.category, GoalCategory::Career);
    assert_eq!(snapshot.goal.progress, 100);
    assert_eq!(snapshot.milestones[0].tasks[0].title, "Renamed");
}

#[test]
fn list_goals_summarizes_milestones() {
    let engine = test_engine();
    let first = goal(&engine, "First");
    let second = goal(&engine, "Second");
    let m = milestone(&engine, second, "Only");
    let t = task(&engine, m, "Do");
    engine.toggle_task_completion(ME, t).unwrap();
    milestone(&engine, second, "Another");

    let goals = engine.list_goals(ME).unwrap();
    assert_eq!(goals.len(), 2);
    // Newest first
    assert_eq!(goals[0].goal.id, Some(second));
    assert_eq!(goals[0].milestone_count, 2);
    assert_eq!(goals[0].completed_milestones, 1);
    assert_eq!(goals[1].goal.id, Some(first));
    assert_eq!(goals[1].milestone_count, 0);
}

#[test]
fn repair_fixes_drifted_records() {
    let engine = test_engine();
    let g = goal(&engine, "Drifted");
    let m = milestone(&engine, g, "Milestone");
    let t = task(&engine, m, "Task");
    engine.toggle_task_completion(ME, t).unwrap();
    assert!(engine.verify(ME).unwrap().is_empty());

    // Simulate a write that bypassed the engine
    engine
        .database()
        .conn()
        .execute("UPDATE goals SET progress = 10 WHERE id = ?1", [g])
        .unwrap();
    engine
        .database()
        .conn()
        .execute("UPDATE milestones SET completed = 0 WHERE id = ?1", [m])
        .unwrap();

    let found = engine.verify(ME).unwrap();
    assert_eq!(
        found,
        vec![
            Inconsistency::Milestone {
                id: m,
                stored: false,
                derived: true
            },
            Inconsistency::Goal {
                id: g,
                stored: 10,
                derived: 100
            },
        ]
    );

    assert_eq!(engine.repair(ME).unwrap(), 2);
    assert!(engine.verify(ME).unwrap().is_empty());
    assert_eq!(engine.get_goal(ME, g).unwrap().goal.progress, 100);
    assert_eq!(engine.repair(ME).unwrap(), 0);
}

#[test]
fn invariants_hold_across_a_mixed_sequence() {
    let engine = test_engine();
    let g = goal(&engine, "Mixed");
    let milestones: Vec<i64> = (0..4)
        .map(|i| milestone(&engine, g, &format!("M{}", i)))
        .collect();
    let mut tasks = Vec::new();
    for (i, m) in milestones.iter().enumerate() {
        for j in 0..=i {
            tasks.push(task(&engine, *m, &format!("T{}-{}", i, j)));
        }
    }

    for (step, t) in tasks.iter().enumerate() {
        let outcome = engine.toggle_task_completion(ME, *t).unwrap();
        assert_invariants(&outcome.goal);
        if step % 3 == 0 {
            let outcome = engine.toggle_task_completion(ME, *t).unwrap();
            assert_invariants(&outcome.goal);
        }
    }
    let snapshot = engine.delete_task(ME, tasks[0]).unwrap();
    assert_invariants(&snapshot);
    let snapshot = engine.delete_milestone(ME, milestones[3]).unwrap();
    assert_invariants(&snapshot);
    assert!(engine.verify(ME).unwrap().is_empty());
}

#[test]
fn dates_are_stored_zero_padded() {
    let engine = test_engine();
    let created = engine
        .create_goal(
            ME,
            NewGoal {
                title: "Padded".to_string(),
                target_date: Some("2026-1-5".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(created.target_date.as_deref(), Some("2026-01-05"));
    let g = created.id.unwrap();

    let (milestone, _) = engine
        .create_milestone(
            ME,
            g,
            NewItem {
                title: "Step".to_string(),
                due_date: Some("2026-2-3".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(milestone.due_date.as_deref(), Some("2026-02-03"));

    let stored = engine.get_goal(ME, g).unwrap();
    assert_eq!(stored.goal.target_date.as_deref(), Some("2026-01-05"));
    assert_eq!(stored.milestones[0].milestone.due_date.as_deref(), Some("2026-02-03"));
}
