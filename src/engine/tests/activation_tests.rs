//! Activation: restart cycle, idempotence, deactivation

use super::helpers::*;
use crate::engine::types::{Stmt, Val};

fn greeter() -> crate::flows::FlowDefinition {
    // No trailing wait: the body completes after answering, which is what
    // makes the restart cycle observable.
    activatable("greeter", vec![match_user("hi"), say("Hello")])
}

fn activate(flow_id: &str) -> Stmt {
    Stmt::Activate {
        flow_id: flow_id.to_string(),
        arguments: vec![],
    }
}

#[test]
fn test_activated_flow_restarts_after_finishing() {
    let flows = vec![
        def("main", vec![activate("greeter"), wait_forever()]),
        greeter(),
    ];
    let (mut runtime, _) = boot(flows);

    let out = runtime.advance(user_said("hi", "u-1")).unwrap();
    assert_eq!(scripts(&out), vec!["Hello"]);

    // Same instance answers again after restarting in place.
    let out = runtime.advance(user_said("hi", "u-2")).unwrap();
    assert_eq!(scripts(&out), vec!["Hello"]);
}

#[test]
fn test_plain_start_does_not_restart() {
    let flows = vec![
        def("main", vec![start_flow_stmt("greeter"), wait_forever()]),
        activatable("greeter", vec![match_user("hi"), say("Hello")]),
    ];
    let (mut runtime, _) = boot(flows);

    let out = runtime.advance(user_said("hi", "u-1")).unwrap();
    assert_eq!(scripts(&out), vec!["Hello"]);

    let out = runtime.advance(user_said("hi", "u-2")).unwrap();
    assert!(scripts(&out).is_empty());
}

#[test]
fn test_duplicate_activation_is_idempotent() {
    let flows = vec![
        def(
            "main",
            vec![activate("greeter"), activate("greeter"), wait_forever()],
        ),
        greeter(),
    ];
    let (runtime, _) = boot(flows);

    let greeters = runtime
        .state()
        .live_instances()
        .iter()
        .filter(|uid| runtime.state().instances[*uid].flow_id == "greeter")
        .count();
    assert_eq!(greeters, 1);
}

#[test]
fn test_deactivation_ends_the_restart_cycle() {
    let flows = vec![
        def("main", vec![activate("greeter"), wait_forever()]),
        greeter(),
    ];
    let (mut runtime, _) = boot(flows);

    let out = runtime.advance(user_said("hi", "u-1")).unwrap();
    assert_eq!(scripts(&out), vec!["Hello"]);

    let stop = external("StopFlow", "u-2")
        .with_arg("flow_id", Val::Str("greeter".into()))
        .with_arg("deactivate", Val::Bool(true));
    runtime.advance(stop).unwrap();

    let out = runtime.advance(user_said("hi", "u-3")).unwrap();
    assert!(scripts(&out).is_empty());
}
