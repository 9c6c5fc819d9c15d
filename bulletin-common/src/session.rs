//! The acting user and interface language.
//!
//! Rendering personalised content for a recipient runs "as" that recipient:
//! token providers and translation lookups read the current [`Actor`]. The
//! switch is only available through [`Session::impersonate`], whose guard puts
//! the previous actor back when it is dropped, including on early return or
//! unwinding.

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::{AccountId, Language};

/// Who content is being rendered for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    /// Linked account, `None` for anonymous
    pub account: Option<AccountId>,
    pub language: Language,
}

impl Actor {
    #[must_use]
    pub const fn anonymous(language: Language) -> Self {
        Self {
            account: None,
            language,
        }
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.account.is_none()
    }
}

/// Holder of the current actor
#[derive(Debug, Default)]
pub struct Session {
    actor: RwLock<Actor>,
    /// Serialises impersonation so overlapping renders cannot interleave
    switch: Mutex<()>,
}

impl Session {
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor: RwLock::new(actor),
            switch: Mutex::new(()),
        }
    }

    /// Snapshot of the current actor
    #[must_use]
    pub fn current(&self) -> Actor {
        self.actor.read().clone()
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.actor.read().is_anonymous()
    }

    /// Switch to `actor` until the returned guard is dropped
    pub fn impersonate(&self, actor: Actor) -> SessionGuard<'_> {
        let exclusive = self.switch.lock();
        let previous = std::mem::replace(&mut *self.actor.write(), actor);

        SessionGuard {
            session: self,
            previous: Some(previous),
            _exclusive: exclusive,
        }
    }
}

/// Restores the previous actor on drop
#[derive(Debug)]
pub struct SessionGuard<'a> {
    session: &'a Session,
    previous: Option<Actor>,
    _exclusive: MutexGuard<'a, ()>,
}

impl SessionGuard<'_> {
    /// The actor being impersonated
    #[must_use]
    pub fn actor(&self) -> Actor {
        self.session.current()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.session.actor.write() = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_actor() {
        let session = Session::new(Actor::anonymous(Language::new("en")));

        {
            let guard = session.impersonate(Actor {
                account: Some(AccountId(9)),
                language: Language::new("de"),
            });
            assert_eq!(guard.actor().account, Some(AccountId(9)));
            assert!(!session.is_anonymous());
            assert_eq!(session.current().language.as_str(), "de");
        }

        assert!(session.is_anonymous());
        assert_eq!(session.current().language.as_str(), "en");
    }

    #[test]
    fn test_guard_restores_on_error_path() {
        fn render(session: &Session) -> Result<String, String> {
            let _guard = session.impersonate(Actor {
                account: Some(AccountId(1)),
                language: Language::new("fr"),
            });
            Err("render failed".to_string())
        }

        let session = Session::default();
        assert!(render(&session).is_err());
        assert_eq!(session.current(), Actor::default());
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let session = Session::default();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = session.impersonate(Actor {
                account: Some(AccountId(2)),
                language: Language::new("nl"),
            });
            panic!("render panicked");
        }));

        assert!(result.is_err());
        assert_eq!(session.current(), Actor::default());
    }
}
