//! Application state shared by every handler

use std::sync::Arc;

use muxdeck_bridge::SessionBridge;

use crate::activity_log::ActivityStore;
use crate::approvals::ApprovalInbox;

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<SessionBridge>,
    pub approvals: Arc<ApprovalInbox>,
    /// `None` when the activity log is disabled
    pub activity: Option<ActivityStore>,
    pub live_log_capacity: usize,
}

impl AppState {
    pub fn new(
        bridge: Arc<SessionBridge>,
        approvals: Arc<ApprovalInbox>,
        activity: Option<ActivityStore>,
        live_log_capacity: usize,
    ) -> Self {
        Self {
            bridge,
            approvals,
            activity,
            live_log_capacity,
        }
    }

    /// Bridge plus inbox, no persistence. For tests.
    #[cfg(test)]
    pub fn in_memory() -> (Self, muxdeck_bridge::Subscription) {
        let bridge = Arc::new(SessionBridge::new());
        let approvals = Arc::new(ApprovalInbox::new());
        let subscription = approvals.attach(&bridge);
        (
            Self::new(
                bridge,
                approvals,
                None,
                muxdeck_bridge::live_log::DEFAULT_CAPACITY,
            ),
            subscription,
        )
    }
}
