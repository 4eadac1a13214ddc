//! Expression evaluator
//!
//! Evaluates expression nodes against a flow instance's variable scope plus
//! the process-wide globals. Every failure is a typed `EvalError`; the
//! scheduler treats any of them as a flow-level abort, so there are no silent
//! defaults here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::flows::FlowRegistry;
use crate::types::FlowStatus;

use super::errors::EvalError;
use super::state::{ActionState, FlowInstance};
use super::stdlib;
use super::types::{BinOp, Expr, InterpPart, UnaryOp, Val};

/// Read-only view the evaluator resolves names and references against.
pub struct EvalCtx<'a> {
    pub scope: &'a BTreeMap<String, Val>,
    pub global_names: &'a BTreeSet<String>,
    pub globals: &'a BTreeMap<String, Val>,
    pub actions: &'a HashMap<String, ActionState>,
    /// Actions created earlier in the current head run, not yet registered
    pub pending_actions: &'a [ActionState],
    pub instances: &'a HashMap<String, FlowInstance>,
    /// Instance uids in creation order, for stable lookups
    pub instance_order: &'a [String],
    pub registry: &'a FlowRegistry,
}

impl<'a> EvalCtx<'a> {
    pub fn read_var(&self, name: &str) -> Result<Val, EvalError> {
        if self.global_names.contains(name) {
            // A declared global that was never written reads as null
            return Ok(self.globals.get(name).cloned().unwrap_or(Val::Null));
        }
        self.scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))
    }

    pub fn action_state(&self, uid: &str) -> Option<&ActionState> {
        self.actions
            .get(uid)
            .or_else(|| self.pending_actions.iter().find(|a| a.action_uid == uid))
    }
}

/// Write a variable into the scope that owns it.
pub fn write_var(
    name: &str,
    value: Val,
    scope: &mut BTreeMap<String, Val>,
    global_names: &BTreeSet<String>,
    globals: &mut BTreeMap<String, Val>,
) {
    if global_names.contains(name) {
        globals.insert(name.to_string(), value);
    } else {
        scope.insert(name.to_string(), value);
    }
}

/// Evaluate an expression to a value.
pub fn eval(expr: &Expr, ctx: &EvalCtx) -> Result<Val, EvalError> {
    match expr {
        Expr::LitNull => Ok(Val::Null),
        Expr::LitBool { v } => Ok(Val::Bool(*v)),
        Expr::LitNum { v } => Ok(Val::Num(*v)),
        Expr::LitStr { v } => Ok(Val::Str(v.clone())),

        Expr::Interp { parts } => {
            let mut out = String::new();
            for part in parts {
                match part {
                    InterpPart::Lit { v } => out.push_str(v),
                    InterpPart::Expr { expr } => out.push_str(&eval(expr, ctx)?.to_string()),
                }
            }
            Ok(Val::Str(out))
        }

        Expr::LitList { elements } => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval(element, ctx)?);
            }
            Ok(Val::List(items))
        }

        Expr::LitObj { properties } => {
            let mut map = BTreeMap::new();
            for (key, value) in properties {
                map.insert(key.clone(), eval(value, ctx)?);
            }
            Ok(Val::Obj(map))
        }

        Expr::Var { name } => ctx.read_var(name),

        Expr::Member { object, property } => {
            let object = eval(object, ctx)?;
            resolve_member(&object, property, ctx)
        }

        Expr::Index { object, index } => {
            let object = eval(object, ctx)?;
            let index = eval(index, ctx)?;
            resolve_index(&object, &index)
        }

        Expr::Unary { op, operand } => {
            let operand = eval(operand, ctx)?;
            match op {
                UnaryOp::Not => Ok(Val::Bool(!operand.is_truthy())),
                UnaryOp::Neg => match operand.as_num() {
                    Some(n) => Ok(Val::Num(-n)),
                    None => Err(EvalError::TypeMismatch(format!(
                        "cannot negate {}",
                        operand.type_name()
                    ))),
                },
            }
        }

        Expr::Binary { op, left, right } => eval_binary(*op, left, right, ctx),

        Expr::Call { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, ctx)?);
            }
            stdlib::call(function, &values, ctx)
        }
    }
}

fn eval_binary(op: BinOp, left: &Expr, right: &Expr, ctx: &EvalCtx) -> Result<Val, EvalError> {
    // Short-circuit forms first
    match op {
        BinOp::And => {
            let l = eval(left, ctx)?;
            if !l.is_truthy() {
                return Ok(Val::Bool(false));
            }
            return Ok(Val::Bool(eval(right, ctx)?.is_truthy()));
        }
        BinOp::Or => {
            let l = eval(left, ctx)?;
            if l.is_truthy() {
                return Ok(Val::Bool(true));
            }
            return Ok(Val::Bool(eval(right, ctx)?.is_truthy()));
        }
        _ => {}
    }

    let l = eval(left, ctx)?;
    let r = eval(right, ctx)?;

    match op {
        BinOp::Eq => Ok(Val::Bool(l == r)),
        BinOp::Ne => Ok(Val::Bool(l != r)),

        BinOp::Add => match (&l, &r) {
            (Val::Num(a), Val::Num(b)) => Ok(Val::Num(a + b)),
            (Val::Str(a), Val::Str(b)) => Ok(Val::Str(format!("{}{}", a, b))),
            (Val::List(a), Val::List(b)) => {
                let mut out = a.clone();
                out.extend(b.clone());
                Ok(Val::List(out))
            }
            _ => Err(EvalError::TypeMismatch(format!(
                "cannot add {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        },

        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let (a, b) = match (l.as_num(), r.as_num()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(EvalError::TypeMismatch(format!(
                        "arithmetic on {} and {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            match op {
                BinOp::Sub => Ok(Val::Num(a - b)),
                BinOp::Mul => Ok(Val::Num(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(Val::Num(a / b))
                    }
                }
                BinOp::Mod => {
                    if b == 0.0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(Val::Num(a % b))
                    }
                }
                _ => unreachable!(),
            }
        }

        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
            let ordering = match (&l, &r) {
                (Val::Num(a), Val::Num(b)) => a.partial_cmp(b),
                (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return Err(EvalError::TypeMismatch(format!(
                    "cannot compare {} and {}",
                    l.type_name(),
                    r.type_name()
                )));
            };
            let result = match op {
                BinOp::Lt => ordering == std::cmp::Ordering::Less,
                BinOp::Gt => ordering == std::cmp::Ordering::Greater,
                BinOp::Le => ordering != std::cmp::Ordering::Greater,
                BinOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Val::Bool(result))
        }

        // Short-circuited above
        BinOp::And | BinOp::Or => unreachable!(),
    }
}

/// Resolve `$ref.property` across the closed set of reference kinds.
///
/// Duck typing from the source language becomes an explicit dispatch here:
/// objects and event snapshots resolve locally, action and flow references
/// resolve against the engine state, everything else is a typed error.
pub fn resolve_member(object: &Val, property: &str, ctx: &EvalCtx) -> Result<Val, EvalError> {
    match object {
        Val::Obj(map) => map
            .get(property)
            .cloned()
            .ok_or_else(|| EvalError::UnknownAttribute {
                kind: "object".to_string(),
                attribute: property.to_string(),
            }),

        Val::Event { name, arguments } => {
            if property == "name" {
                return Ok(Val::Str(name.clone()));
            }
            arguments
                .get(property)
                .cloned()
                .ok_or_else(|| EvalError::UnknownAttribute {
                    kind: format!("event {}", name),
                    attribute: property.to_string(),
                })
        }

        Val::Action(uid) => {
            let action = ctx
                .action_state(uid)
                .ok_or_else(|| EvalError::UnknownReference(uid.clone()))?;
            action
                .attribute(property)
                .ok_or_else(|| EvalError::UnknownAttribute {
                    kind: format!("action {}", action.name),
                    attribute: property.to_string(),
                })
        }

        Val::Flow(uid) => {
            let instance = ctx
                .instances
                .get(uid)
                .ok_or_else(|| EvalError::UnknownReference(uid.clone()))?;
            flow_attribute(instance, property).ok_or_else(|| EvalError::UnknownAttribute {
                kind: format!("flow {}", instance.flow_id),
                attribute: property.to_string(),
            })
        }

        other => Err(EvalError::TypeMismatch(format!(
            "cannot access `{}` on {}",
            property,
            other.type_name()
        ))),
    }
}

fn flow_attribute(instance: &FlowInstance, property: &str) -> Option<Val> {
    match property {
        "uid" => Some(Val::Str(instance.uid.clone())),
        "flow_id" => Some(Val::Str(instance.flow_id.clone())),
        "status" => Some(Val::Str(flow_status_str(instance.status).to_string())),
        "context" => Some(Val::Obj(instance.scope.clone())),
        _ => instance
            .results
            .get(property)
            .or_else(|| instance.scope.get(property))
            .cloned(),
    }
}

pub(crate) fn flow_status_str(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::Starting => "starting",
        FlowStatus::Active => "active",
        FlowStatus::Waiting => "waiting",
        FlowStatus::Finished => "finished",
        FlowStatus::Failed => "failed",
        FlowStatus::Stopped => "stopped",
    }
}

fn resolve_index(object: &Val, index: &Val) -> Result<Val, EvalError> {
    match (object, index) {
        (Val::List(items), Val::Num(n)) => {
            let i = *n as i64;
            if i < 0 || i as usize >= items.len() {
                return Err(EvalError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                });
            }
            Ok(items[i as usize].clone())
        }
        (Val::Obj(map), Val::Str(key)) => {
            map.get(key)
                .cloned()
                .ok_or_else(|| EvalError::UnknownAttribute {
                    kind: "object".to_string(),
                    attribute: key.clone(),
                })
        }
        (Val::Str(s), Val::Num(n)) => {
            let i = *n as i64;
            let chars: Vec<char> = s.chars().collect();
            if i < 0 || i as usize >= chars.len() {
                return Err(EvalError::IndexOutOfRange {
                    index: i,
                    len: chars.len(),
                });
            }
            Ok(Val::Str(chars[i as usize].to_string()))
        }
        _ => Err(EvalError::TypeMismatch(format!(
            "cannot index {} with {}",
            object.type_name(),
            index.type_name()
        ))),
    }
}
