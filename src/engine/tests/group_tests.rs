//! `and`/`or` group semantics

use super::helpers::*;
use crate::engine::types::{AwaitMember, AwaitPolicy, StartTarget, Stmt};

fn action_member(name: &str, arg: (&str, &str)) -> AwaitMember {
    AwaitMember {
        target: StartTarget::Action {
            name: name.to_string(),
            arguments: vec![(arg.0.to_string(), lit(arg.1))],
        },
        capture: None,
    }
}

#[test]
fn test_or_group_first_wins_and_loser_is_stopped() {
    let main = def(
        "main",
        vec![
            Stmt::Await {
                policy: AwaitPolicy::Any,
                members: vec![
                    action_member("UtteranceBotAction", ("script", "long story")),
                    action_member("TimerBotAction", ("duration", "5s")),
                ],
            },
            say("after"),
            wait_forever(),
        ],
    );
    let (mut runtime, initial) = boot(vec![main]);

    // Both members start; different channels, so both starts go out.
    assert_eq!(named(&initial, "StartUtteranceBotAction").len(), 1);
    assert_eq!(named(&initial, "StartTimerBotAction").len(), 1);
    let timer_uid = named(&initial, "StartTimerBotAction")[0]
        .action_uid
        .clone()
        .unwrap();
    let utterance_uid = named(&initial, "StartUtteranceBotAction")[0]
        .action_uid
        .clone()
        .unwrap();

    let out = runtime
        .advance(action_finished("TimerBotAction", &timer_uid, "u-1"))
        .unwrap();

    // The losing member is cancelled exactly once, then the head resumes.
    let stops = named(&out, "StopUtteranceBotAction");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].action_uid.as_deref(), Some(utterance_uid.as_str()));
    assert_eq!(scripts(&out), vec!["after"]);
}

#[test]
fn test_cancelled_member_record_reads_stopped() {
    let main = def(
        "main",
        vec![
            Stmt::Await {
                policy: AwaitPolicy::Any,
                members: vec![
                    action_member("UtteranceBotAction", ("script", "long story")),
                    action_member("TimerBotAction", ("duration", "5s")),
                ],
            },
            wait_forever(),
        ],
    );
    let (mut runtime, initial) = boot(vec![main]);
    let timer_uid = named(&initial, "StartTimerBotAction")[0]
        .action_uid
        .clone()
        .unwrap();
    let utterance_uid = named(&initial, "StartUtteranceBotAction")[0]
        .action_uid
        .clone()
        .unwrap();

    runtime
        .advance(action_finished("TimerBotAction", &timer_uid, "u-1"))
        .unwrap();

    // The owner is still live, so the record survives; its status reflects
    // the cancellation instead of reading as a live start forever.
    let loser = runtime.state().actions.get(&utterance_uid).unwrap();
    assert_eq!(loser.status, crate::types::ActionStatus::Stopped);
    assert!(!loser.status.is_live());
}

#[test]
fn test_and_group_requires_every_member() {
    let main = def(
        "main",
        vec![
            Stmt::Await {
                policy: AwaitPolicy::All,
                members: vec![
                    action_member("GestureBotAction", ("gesture", "wave")),
                    action_member("TimerBotAction", ("duration", "2s")),
                ],
            },
            say("both done"),
            wait_forever(),
        ],
    );
    let (mut runtime, initial) = boot(vec![main]);
    let gesture_uid = named(&initial, "StartGestureBotAction")[0]
        .action_uid
        .clone()
        .unwrap();
    let timer_uid = named(&initial, "StartTimerBotAction")[0]
        .action_uid
        .clone()
        .unwrap();

    // One of two: still blocked, nothing emitted.
    let out = runtime
        .advance(action_finished("GestureBotAction", &gesture_uid, "u-1"))
        .unwrap();
    assert!(scripts(&out).is_empty());

    // Second completion resolves the group.
    let out = runtime
        .advance(action_finished("TimerBotAction", &timer_uid, "u-2"))
        .unwrap();
    assert_eq!(scripts(&out), vec!["both done"]);
}

#[test]
fn test_awaited_action_failure_fails_the_flow() {
    let main = def(
        "main",
        vec![
            Stmt::Await {
                policy: AwaitPolicy::All,
                members: vec![action_member("TimerBotAction", ("duration", "2s"))],
            },
            say("never"),
            wait_forever(),
        ],
    );
    let (mut runtime, initial) = boot(vec![main]);
    let timer_uid = named(&initial, "StartTimerBotAction")[0]
        .action_uid
        .clone()
        .unwrap();

    let failed = external("TimerBotActionFailed", "u-1")
        .with_action_uid(&timer_uid)
        .with_arg("error", crate::engine::types::Val::Str("hardware".into()));
    let out = runtime.advance(failed).unwrap();

    assert!(scripts(&out).is_empty());
    assert!(runtime.state().live_instances().is_empty());
}
