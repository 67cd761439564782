//! Events a running network reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use wf_ports::{Endpoint, SocketEvent};

/// Traffic observed on one socket.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketActivity {
    pub id: String,
    pub from: Option<Endpoint>,
    pub to: Option<Endpoint>,
    /// Subgraph node ids from the outermost network inwards; empty for own sockets.
    pub subgraph: Vec<String>,
    pub event: SocketEvent,
}

impl SocketActivity {
    /// `outer:inner` form of the subgraph path, if any.
    pub fn subgraph_path(&self) -> Option<String> {
        if self.subgraph.is_empty() {
            None
        } else {
            Some(self.subgraph.join(":"))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    /// The first connection of a run opened.
    Start { start: DateTime<Utc> },
    Socket(SocketActivity),
    /// Every connection closed and stayed closed for the debounce window.
    End {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        uptime: Duration,
    },
}

impl NetworkEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            NetworkEvent::Start { .. } => "start",
            NetworkEvent::Socket(activity) => activity.event.name(),
            NetworkEvent::End { .. } => "end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subgraph_path_joins_with_colon() {
        let mut activity = SocketActivity {
            id: "DATA -> IN Foo()".into(),
            from: None,
            to: Some(Endpoint::new("Foo", "in")),
            subgraph: Vec::new(),
            event: SocketEvent::Connect,
        };
        assert_eq!(activity.subgraph_path(), None);
        activity.subgraph = vec!["Outer".into(), "Inner".into()];
        assert_eq!(activity.subgraph_path().as_deref(), Some("Outer:Inner"));
        assert_eq!(NetworkEvent::Socket(activity).topic(), "connect");
    }
}
