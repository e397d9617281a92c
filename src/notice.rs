use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient message shown at the top of the window.
#[derive(Debug, Clone)]
pub struct Notice {
    pub text: String,
    pub kind: NoticeKind,
    pub posted_at: Instant,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: NoticeKind::Success,
            posted_at: Instant::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: NoticeKind::Error,
            posted_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        now.saturating_duration_since(self.posted_at) >= lifetime
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_expiry() {
        let notice = Notice::success("Picture taken!");
        let lifetime = Duration::from_secs(3);
        assert!(!notice.is_expired(notice.posted_at, lifetime));
        assert!(!notice.is_expired(notice.posted_at + Duration::from_millis(2999), lifetime));
        assert!(notice.is_expired(notice.posted_at + lifetime, lifetime));
    }

    #[test]
    fn test_notice_kinds() {
        assert_eq!(Notice::error("boom").kind, NoticeKind::Error);
        assert_eq!(Notice::success("ok").kind, NoticeKind::Success);
    }
}
