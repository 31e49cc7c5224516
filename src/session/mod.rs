//! Browser session lifecycle.
//!
//! A [`Session`] owns one launched browser and its page for the duration of a
//! single attempt. [`SessionManager::release`] is the only way a session ends,
//! and it never fails.

use crate::browser::{BrowserDriver, PageSession};
use crate::config::LaunchProfile;
use crate::errors::{ScrapeError, ScrapeResult};
use log::{debug, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Session {
    id: u64,
    page: Option<Box<dyn PageSession>>,
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> ScrapeResult<&dyn PageSession> {
        self.page
            .as_deref()
            .ok_or_else(|| ScrapeError::Browser(format!("session {} already released", self.id)))
    }

    pub fn is_released(&self) -> bool {
        self.page.is_none()
    }
}

#[derive(Clone)]
pub struct SessionManager {
    driver: Arc<dyn BrowserDriver>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    pub async fn acquire(&self, profile: &LaunchProfile) -> ScrapeResult<Session> {
        let page = self.driver.launch(profile).await?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Session {} opened ({:?} posture)", id, profile.posture);
        Ok(Session {
            id,
            page: Some(page),
        })
    }

    /// Close the session. Errors while closing are logged and swallowed;
    /// releasing twice is a no-op.
    pub async fn release(&self, session: &mut Session) {
        let Some(page) = session.page.take() else {
            return;
        };
        match page.close().await {
            Ok(()) => debug!("Session {} closed", session.id),
            Err(e) => warn!("Error closing session {}: {}", session.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Operation};
    use crate::testing::{FakeDriver, FakePage};

    #[tokio::test]
    async fn test_release_is_idempotent_and_never_fails() {
        let driver = Arc::new(FakeDriver::new(vec![FakePage::new().failing_close()]));
        let manager = SessionManager::new(driver.clone());
        let profile = AppConfig::new().profile_for(Operation::MatchListing);

        let mut session = manager.acquire(&profile).await.unwrap();
        assert!(session.page().is_ok());

        manager.release(&mut session).await;
        manager.release(&mut session).await;

        assert!(session.is_released());
        assert!(session.page().is_err());
        assert_eq!(driver.close_count(), 1);
    }

    #[tokio::test]
    async fn test_each_acquire_launches_a_fresh_browser() {
        let driver = Arc::new(FakeDriver::new(vec![FakePage::new(), FakePage::new()]));
        let manager = SessionManager::new(driver.clone());
        let profile = AppConfig::new().profile_for(Operation::PlayerResults);

        let mut first = manager.acquire(&profile).await.unwrap();
        let mut second = manager.acquire(&profile).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(driver.launch_count(), 2);

        manager.release(&mut first).await;
        manager.release(&mut second).await;
        assert_eq!(driver.close_count(), 2);
    }
}
