//! Derivation rules for the values the engine keeps in sync.
//!
//! Both rules treat an empty set of children as "nothing done": a milestone
//! without tasks is not completed and a goal without milestones sits at 0%.

/// A milestone is completed when it has at least one task and every task is
/// completed.
pub fn milestone_completed<I>(task_completion: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    let mut any = false;
    for completed in task_completion {
        if !completed {
            return false;
        }
        any = true;
    }
    any
}

/// Percentage of completed milestones, rounded half-up. 0 when `total` is 0.
pub fn goal_progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    // floor(100 * c / t + 1/2) without floats
    let percent = (200 * completed + total) / (2 * total);
    percent as u8
}

/// Progress implied by a list of milestone completion flags.
pub fn progress_of(milestone_completion: &[bool]) -> u8 {
    let completed = milestone_completion.iter().filter(|c| **c).count();
    goal_progress(completed, milestone_completion.len())
}
