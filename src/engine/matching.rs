//! Pattern matcher
//!
//! Decides whether a concrete event satisfies a match expression. Matching is
//! stable and side-effect-free: the scheduler probes prospective matches and
//! only commits bindings once it picks one.

use crate::events::Event;

use super::errors::EvalError;
use super::expressions::{eval, EvalCtx};
use super::types::{EventPattern, FieldPattern, Val};

/// Test an event against a match expression.
///
/// Field expressions are evaluated in the owning instance's scope at match
/// time. Missing fields never match; evaluation errors propagate so the
/// scheduler can fail the owning flow.
pub fn match_event(
    pattern: &EventPattern,
    event: &Event,
    ctx: &EvalCtx,
) -> Result<bool, EvalError> {
    if pattern.event != event.name {
        return Ok(false);
    }

    for (field, expected) in &pattern.fields {
        let Some(actual) = event_field(event, field) else {
            return Ok(false);
        };
        if !match_field(expected, &actual, ctx)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Look up a pattern field: envelope fields first, then named arguments.
fn event_field(event: &Event, field: &str) -> Option<Val> {
    match field {
        "action_uid" => event.action_uid.clone().map(Val::Str),
        "uid" => Some(Val::Str(event.uid.clone())),
        "source_uid" => Some(Val::Str(event.source_uid.clone())),
        _ => event.arguments.get(field).cloned(),
    }
}

/// Test one field pattern against a concrete value.
pub fn match_field(pattern: &FieldPattern, actual: &Val, ctx: &EvalCtx) -> Result<bool, EvalError> {
    match pattern {
        FieldPattern::Value { expr } => Ok(eval(expr, ctx)? == *actual),

        FieldPattern::Regex { pattern } => {
            let Val::Str(text) = actual else {
                return Ok(false);
            };
            let re = regex::Regex::new(pattern).map_err(|e| EvalError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            // Substring search, not a full match
            Ok(re.is_match(text))
        }

        FieldPattern::LessThan { expr } => compare(expr, actual, ctx, |o| {
            o == std::cmp::Ordering::Less
        }),
        FieldPattern::GreaterThan { expr } => compare(expr, actual, ctx, |o| {
            o == std::cmp::Ordering::Greater
        }),
        FieldPattern::EqualLessThan { expr } => compare(expr, actual, ctx, |o| {
            o != std::cmp::Ordering::Greater
        }),
        FieldPattern::EqualGreaterThan { expr } => compare(expr, actual, ctx, |o| {
            o != std::cmp::Ordering::Less
        }),
        FieldPattern::NotEqualTo { expr } => Ok(eval(expr, ctx)? != *actual),

        FieldPattern::Set { items } => {
            let Val::List(elements) = actual else {
                return Ok(false);
            };
            // Unordered subset: each pattern item must claim a distinct element
            let mut used = vec![false; elements.len()];
            'items: for item in items {
                for (i, element) in elements.iter().enumerate() {
                    if !used[i] && match_field(item, element, ctx)? {
                        used[i] = true;
                        continue 'items;
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }

        FieldPattern::Seq { items } => {
            let Val::List(elements) = actual else {
                return Ok(false);
            };
            // Ordered subsequence with gaps
            let mut pos = 0;
            'seq: for item in items {
                while pos < elements.len() {
                    let matched = match_field(item, &elements[pos], ctx)?;
                    pos += 1;
                    if matched {
                        continue 'seq;
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }

        FieldPattern::Dict { fields } => {
            let Val::Obj(map) = actual else {
                return Ok(false);
            };
            // Only listed keys are checked
            for (key, expected) in fields {
                let Some(value) = map.get(key) else {
                    return Ok(false);
                };
                if !match_field(expected, value, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

fn compare(
    expr: &super::types::Expr,
    actual: &Val,
    ctx: &EvalCtx,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<bool, EvalError> {
    let expected = eval(expr, ctx)?;
    let ordering = match (actual, &expected) {
        (Val::Num(a), Val::Num(b)) => a.partial_cmp(b),
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    // A non-comparable pair is a failed match, not an error: the event may
    // legitimately carry a different type than the pattern expects.
    Ok(ordering.map(accept).unwrap_or(false))
}
