//! Built-in functions available to flow expressions
//!
//! Each built-in validates its own argument count and types and returns a
//! typed error instead of a default value.

use regex::Regex;

use super::errors::EvalError;
use super::expressions::{flow_status_str, EvalCtx};
use super::types::Val;

/// Dispatch a built-in function call.
pub fn call(function: &str, args: &[Val], ctx: &EvalCtx) -> Result<Val, EvalError> {
    match function {
        "len" => len(function, args),
        "str" => to_str(function, args),
        "search" => search(function, args),
        "flow" => flow(function, args, ctx),
        "flow_states" => flow_states(function, args, ctx),
        _ => Err(EvalError::UnknownFunction(function.to_string())),
    }
}

fn expect_args(function: &str, args: &[Val], expected: usize) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::WrongArgCount {
            function: function.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn expect_str<'a>(function: &str, args: &'a [Val], idx: usize) -> Result<&'a str, EvalError> {
    args[idx].as_str().ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "{}() argument {} must be a string, got {}",
            function,
            idx + 1,
            args[idx].type_name()
        ))
    })
}

fn len(function: &str, args: &[Val]) -> Result<Val, EvalError> {
    expect_args(function, args, 1)?;
    let n = match &args[0] {
        Val::Str(s) => s.chars().count(),
        Val::List(items) => items.len(),
        Val::Obj(map) => map.len(),
        other => {
            return Err(EvalError::TypeMismatch(format!(
                "len() does not apply to {}",
                other.type_name()
            )))
        }
    };
    Ok(Val::Num(n as f64))
}

fn to_str(function: &str, args: &[Val]) -> Result<Val, EvalError> {
    expect_args(function, args, 1)?;
    Ok(Val::Str(args[0].to_string()))
}

/// `search(pattern, text)` - regex substring search, not a full match.
fn search(function: &str, args: &[Val]) -> Result<Val, EvalError> {
    expect_args(function, args, 2)?;
    let pattern = expect_str(function, args, 0)?;
    let text = expect_str(function, args, 1)?;
    let re = Regex::new(pattern).map_err(|e| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    Ok(Val::Bool(re.is_match(text)))
}

/// `flow(id)` - reference to the oldest live instance of a flow, or null.
fn flow(function: &str, args: &[Val], ctx: &EvalCtx) -> Result<Val, EvalError> {
    expect_args(function, args, 1)?;
    let flow_id = expect_str(function, args, 0)?;
    for uid in ctx.instance_order {
        if let Some(instance) = ctx.instances.get(uid) {
            if instance.flow_id == flow_id && instance.is_live() {
                return Ok(Val::Flow(uid.clone()));
            }
        }
    }
    Ok(Val::Null)
}

/// `flow_states(id)` - statuses of every known instance of a flow, in
/// creation order.
fn flow_states(function: &str, args: &[Val], ctx: &EvalCtx) -> Result<Val, EvalError> {
    expect_args(function, args, 1)?;
    let flow_id = expect_str(function, args, 0)?;
    let mut states = Vec::new();
    for uid in ctx.instance_order {
        if let Some(instance) = ctx.instances.get(uid) {
            if instance.flow_id == flow_id {
                states.push(Val::Str(flow_status_str(instance.status).to_string()));
            }
        }
    }
    Ok(Val::List(states))
}
