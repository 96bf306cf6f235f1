use parking_lot::Mutex;
use std::sync::Arc;

use super::types::Credential;

/// Places a session context can be sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Login,
    OperatorRoot,
    DelegateArea,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::Login => "/login",
            Destination::OperatorRoot => "/admin",
            Destination::DelegateArea => "/client/dashboard",
        }
    }
}

/// Navigation side effects requested by the session layer.
pub trait Navigator: Send + Sync {
    /// Move the current context somewhere else.
    fn navigate(&self, destination: Destination);

    /// Open a separate context that starts out holding `credential`. The
    /// current context is left where it is.
    fn open_context(&self, destination: Destination, credential: &Credential);
}

/// Navigator that only logs. Suitable for headless embedders.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, destination: Destination) {
        tracing::info!("Navigating to {}", destination.path());
    }

    fn open_context(&self, destination: Destination, credential: &Credential) {
        tracing::info!(
            "Opening {} context at {} for subject {}",
            credential.scope,
            destination.path(),
            credential.subject_id
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Navigate(Destination),
    OpenContext(Destination, Credential),
}

/// Keeps every request so the caller can act on it later.
#[derive(Debug, Default, Clone)]
pub struct RecordingNavigator {
    events: Arc<Mutex<Vec<NavigationEvent>>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<NavigationEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: Destination) {
        self.events.lock().push(NavigationEvent::Navigate(destination));
    }

    fn open_context(&self, destination: Destination, credential: &Credential) {
        self.events
            .lock()
            .push(NavigationEvent::OpenContext(destination, credential.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Scope;

    #[test]
    fn destinations_map_to_routes() {
        assert_eq!(Destination::Login.path(), "/login");
        assert_eq!(Destination::OperatorRoot.path(), "/admin");
        assert_eq!(Destination::DelegateArea.path(), "/client/dashboard");
    }

    #[test]
    fn recording_navigator_drains_on_take() {
        let navigator = RecordingNavigator::new();
        let handle: Arc<dyn Navigator> = Arc::new(navigator.clone());
        let credential = Credential::new(Scope::Delegate, "t", "client-1");

        handle.navigate(Destination::Login);
        handle.open_context(Destination::DelegateArea, &credential);
        assert_eq!(navigator.events().len(), 2);

        assert_eq!(
            navigator.take(),
            vec![
                NavigationEvent::Navigate(Destination::Login),
                NavigationEvent::OpenContext(Destination::DelegateArea, credential),
            ]
        );
        assert!(navigator.events().is_empty());
    }

    #[test]
    fn tracing_navigator_is_side_effect_free() {
        let navigator = TracingNavigator;
        navigator.navigate(Destination::OperatorRoot);
        navigator.open_context(
            Destination::DelegateArea,
            &Credential::new(Scope::Delegate, "t", "client-1"),
        );
    }
}
