//! Fan-out of one text message to a group's snapshot.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::group::Group;
use crate::handle::ConnState;

/// What one fan-out did. Kept internal; callers of `broadcast` get nothing back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FanOut {
    pub attempted: usize,
    pub delivered: usize,
    pub removed: usize,
}

/// Send `message` to every member of `group` present at the time of the call.
///
/// Members are visited in join order, one at a time. A member that is not
/// Open, or whose send fails or misses `deadline`, is removed and released;
/// the remaining members are still visited.
pub(crate) async fn fan_out(group: &Group, message: &str, deadline: Duration) -> FanOut {
    let snapshot = group.snapshot();
    let mut report = FanOut {
        attempted: snapshot.len(),
        ..FanOut::default()
    };

    for handle in snapshot {
        if handle.state() != ConnState::Open {
            group.remove(&handle);
            handle.release().await;
            report.removed += 1;
            continue;
        }

        match handle.send_text(message, deadline).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                if e == TransportError::Closed {
                    debug!(conn_id = %handle.id(), "WS already closed, dropping connection");
                } else {
                    warn!(conn_id = %handle.id(), error = %e, "WS send failed, dropping connection");
                }
                group.remove(&handle);
                handle.release().await;
                report.removed += 1;
            }
        }
    }

    debug!(
        attempted = report.attempted,
        delivered = report.delivered,
        removed = report.removed,
        "broadcast fan-out complete"
    );
    report
}
