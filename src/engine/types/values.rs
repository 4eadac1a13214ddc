//! Runtime value types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime value type.
///
/// `Action`, `Flow` and `Event` are the closed set of reference kinds a flow
/// variable can hold across instance boundaries; member access on them is
/// resolved against the engine state (see `expressions::resolve_member`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Val {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Val>),
    Obj(BTreeMap<String, Val>),
    /// Reference to an action instance by action uid
    Action(String),
    /// Reference to a flow instance by instance uid
    Flow(String),
    /// Snapshot of a matched event
    Event {
        name: String,
        arguments: BTreeMap<String, Val>,
    },
}

impl Val {
    /// Check if value is truthy (for conditionals)
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(l) => !l.is_empty(),
            Val::Obj(o) => !o.is_empty(),
            _ => true,
        }
    }

    /// Human-readable kind name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Bool(_) => "bool",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::List(_) => "list",
            Val::Obj(_) => "object",
            Val::Action(_) => "action reference",
            Val::Flow(_) => "flow reference",
            Val::Event { .. } => "event reference",
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Null => write!(f, "null"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Num(n) => write!(f, "{}", format_num(*n)),
            Val::Str(s) => write!(f, "{}", s),
            Val::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Val::Obj(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Val::Action(uid) => write!(f, "<action {}>", uid),
            Val::Flow(uid) => write!(f, "<flow {}>", uid),
            Val::Event { name, .. } => write!(f, "<event {}>", name),
        }
    }
}

/// Render a number without a trailing `.0` when it is integral.
fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn test_truthiness() {
        assert!(!Val::Null.is_truthy());
        assert!(!Val::Bool(false).is_truthy());
        assert!(!Val::Num(0.0).is_truthy());
        assert!(!Val::Str(String::new()).is_truthy());
        assert!(Val::Num(0.5).is_truthy());
        assert!(Val::Str("x".into()).is_truthy());
        assert!(Val::Action("action-1".into()).is_truthy());
    }

    #[test]
    fn test_display_trims_integral_numbers() {
        assert_eq!(Val::Num(3.0).to_string(), "3");
        assert_eq!(Val::Num(3.5).to_string(), "3.5");
        assert_eq!(
            Val::List(vec![Val::Num(1.0), Val::Str("a".into())]).to_string(),
            "[1, a]"
        );
        assert_eq!(
            Val::Obj(btreemap! {"k".to_string() => Val::Bool(true)}).to_string(),
            "{k: true}"
        );
    }
}
