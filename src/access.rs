// src/access.rs
use std::fmt;

/// What the current actor is trying to do with a route's topo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoAction {
    View,
    Edit,
}

impl fmt::Display for TopoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopoAction::View => f.write_str("view this topo"),
            TopoAction::Edit => f.write_str("edit this topo"),
        }
    }
}

/// The single yes/no question the annotation core asks its host.
///
/// Users and roles live outside this crate; the host answers per action.
pub trait AccessPolicy {
    fn allows(&self, action: TopoAction) -> bool;
}

impl<F> AccessPolicy for F
where
    F: Fn(TopoAction) -> bool,
{
    fn allows(&self, action: TopoAction) -> bool {
        self(action)
    }
}
