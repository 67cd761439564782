//! Graph change notifications.

use crate::graph::{Edge, Export, Group, Initial, Node};

/// Emitted after a mutation has been applied to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    AddNode(Node),
    RemoveNode(Node),
    RenameNode { from: String, to: String },
    AddEdge(Edge),
    RemoveEdge(Edge),
    AddInitial(Initial),
    RemoveInitial(Initial),
    AddExport(Export),
    RemoveExport(Export),
    AddGroup(Group),
    RemoveGroup(Group),
}

impl GraphEvent {
    /// Lowercase topic name used on the wire (`addnode`, `removeedge`, ...).
    pub fn topic(&self) -> &'static str {
        match self {
            GraphEvent::AddNode(_) => "addnode",
            GraphEvent::RemoveNode(_) => "removenode",
            GraphEvent::RenameNode { .. } => "renamenode",
            GraphEvent::AddEdge(_) => "addedge",
            GraphEvent::RemoveEdge(_) => "removeedge",
            GraphEvent::AddInitial(_) => "addinitial",
            GraphEvent::RemoveInitial(_) => "removeinitial",
            GraphEvent::AddExport(_) => "addexport",
            GraphEvent::RemoveExport(_) => "removeexport",
            GraphEvent::AddGroup(_) => "addgroup",
            GraphEvent::RemoveGroup(_) => "removegroup",
        }
    }
}
