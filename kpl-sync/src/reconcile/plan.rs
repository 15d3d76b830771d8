//! Command planning: the mode state machine
//!
//! Pure function from (mode, live queue, resolved manifest URLs) to the
//! ordered command list. Every destructive command comes before the first
//! additive one.

use super::QueueMode;
use kpl_common::bus::QueueCommand;
use kpl_common::gateway::LiveQueueProjection;

/// Plan the commands that move the live queue to the target state
pub fn plan_commands(mode: QueueMode, live: &LiveQueueProjection, manifest_urls: &[String]) -> Vec<QueueCommand> {
    let mut commands = destructive_commands(mode, live);
    commands.extend(
        manifest_urls
            .iter()
            .map(|url| QueueCommand::AddVideo { id: url.clone() }),
    );
    commands
}

fn destructive_commands(mode: QueueMode, live: &LiveQueueProjection) -> Vec<QueueCommand> {
    match mode {
        QueueMode::Append => Vec::new(),
        QueueMode::HardReplace => vec![QueueCommand::Clear],
        QueueMode::PreserveCurrent => match live.current {
            Some(current) => {
                let mut removed: Vec<i64> = Vec::new();
                for &uid in &live.items {
                    if uid != current && !removed.contains(&uid) {
                        removed.push(uid);
                    }
                }
                removed
                    .into_iter()
                    .map(|uid| QueueCommand::RemoveVideo { uid })
                    .collect()
            }
            // Nothing playing to keep
            None => vec![QueueCommand::Clear],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| format!("https://m/{}.json", id)).collect()
    }

    fn live(current: Option<i64>, items: &[i64]) -> LiveQueueProjection {
        LiveQueueProjection {
            current,
            items: items.to_vec(),
        }
    }

    #[test]
    fn test_append_is_additive_only() {
        let commands = plan_commands(QueueMode::Append, &live(Some(1), &[1, 2, 3]), &urls(&["a", "b"]));
        assert_eq!(
            commands,
            vec![
                QueueCommand::AddVideo { id: "https://m/a.json".into() },
                QueueCommand::AddVideo { id: "https://m/b.json".into() },
            ]
        );
    }

    #[test]
    fn test_hard_replace_clears_first() {
        let commands = plan_commands(QueueMode::HardReplace, &live(Some(1), &[1, 2]), &urls(&["a"]));
        assert_eq!(commands[0], QueueCommand::Clear);
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn test_preserve_current_removes_all_but_current() {
        let commands = plan_commands(QueueMode::PreserveCurrent, &live(Some(123), &[123, 456]), &urls(&["a"]));
        assert_eq!(
            commands,
            vec![
                QueueCommand::RemoveVideo { uid: 456 },
                QueueCommand::AddVideo { id: "https://m/a.json".into() },
            ]
        );
    }

    #[test]
    fn test_preserve_current_without_current_matches_hard_replace() {
        let queue = live(None, &[5, 6]);
        assert_eq!(
            plan_commands(QueueMode::PreserveCurrent, &queue, &urls(&["a", "b"])),
            plan_commands(QueueMode::HardReplace, &queue, &urls(&["a", "b"]))
        );
    }

    #[test]
    fn test_preserve_current_dedups_uids() {
        let commands = plan_commands(QueueMode::PreserveCurrent, &live(Some(1), &[2, 1, 2, 3]), &[]);
        assert_eq!(
            commands,
            vec![QueueCommand::RemoveVideo { uid: 2 }, QueueCommand::RemoveVideo { uid: 3 }]
        );
    }

    #[test]
    fn test_destructive_always_precede_additive() {
        for mode in [QueueMode::Append, QueueMode::HardReplace, QueueMode::PreserveCurrent] {
            for queue in [live(None, &[]), live(Some(1), &[1, 2, 3]), live(Some(9), &[4])] {
                let commands = plan_commands(mode, &queue, &urls(&["a", "b", "c"]));
                let first_add = commands.iter().position(|c| !c.is_destructive()).unwrap();
                assert!(commands[first_add..].iter().all(|c| !c.is_destructive()), "{mode}");
                assert_eq!(commands.len() - first_add, 3);
            }
        }
    }
}
