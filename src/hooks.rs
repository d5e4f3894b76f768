use std::sync::Arc;

use crate::models::Settings;

/// UserEvent
///
/// Fired once per user after a bulk action has been applied to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEvent {
    Authenticated(i64),
    Blocked(i64),
    Deleted(i64),
}

impl UserEvent {
    pub fn user_id(&self) -> i64 {
        match *self {
            UserEvent::Authenticated(id) | UserEvent::Blocked(id) | UserEvent::Deleted(id) => id,
        }
    }
}

pub type EventListener = Arc<dyn Fn(&UserEvent) + Send + Sync>;
pub type Filter<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Hooks
///
/// Listener list for user events plus value-transforming filter pipelines. Everything is
/// registered up front through [`HooksBuilder`]; the registry is read-only afterwards.
#[derive(Clone, Default)]
pub struct Hooks {
    listeners: Vec<EventListener>,
    settings_filters: Vec<Filter<Settings>>,
    header_filters: Vec<Filter<String>>,
    subject_filters: Vec<Filter<String>>,
    message_filters: Vec<Filter<String>>,
    error_filters: Vec<Filter<String>>,
}

fn run<T>(filters: &[Filter<T>], value: T) -> T {
    filters.iter().fold(value, |acc, f| f(acc))
}

impl Hooks {
    pub fn builder() -> HooksBuilder {
        HooksBuilder::default()
    }

    /// Fire-and-forget: listeners run in registration order, nothing is returned.
    pub fn emit(&self, event: UserEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    pub fn filter_settings(&self, settings: Settings) -> Settings {
        run(&self.settings_filters, settings)
    }

    pub fn filter_mail_header(&self, header: String) -> String {
        run(&self.header_filters, header)
    }

    pub fn filter_mail_subject(&self, subject: String) -> String {
        run(&self.subject_filters, subject)
    }

    pub fn filter_mail_message(&self, message: String) -> String {
        run(&self.message_filters, message)
    }

    pub fn filter_error_message(&self, message: String) -> String {
        run(&self.error_filters, message)
    }
}

#[derive(Default)]
pub struct HooksBuilder {
    hooks: Hooks,
}

impl HooksBuilder {
    pub fn on_event(mut self, listener: impl Fn(&UserEvent) + Send + Sync + 'static) -> Self {
        self.hooks.listeners.push(Arc::new(listener));
        self
    }

    pub fn filter_settings(
        mut self,
        filter: impl Fn(Settings) -> Settings + Send + Sync + 'static,
    ) -> Self {
        self.hooks.settings_filters.push(Arc::new(filter));
        self
    }

    pub fn filter_mail_header(
        mut self,
        filter: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.hooks.header_filters.push(Arc::new(filter));
        self
    }

    pub fn filter_mail_subject(
        mut self,
        filter: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.hooks.subject_filters.push(Arc::new(filter));
        self
    }

    pub fn filter_mail_message(
        mut self,
        filter: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.hooks.message_filters.push(Arc::new(filter));
        self
    }

    pub fn filter_error_message(
        mut self,
        filter: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.hooks.error_filters.push(Arc::new(filter));
        self
    }

    /// Registers the audit listener that writes every user event to the log.
    pub fn with_audit_log(self) -> Self {
        self.on_event(|event| match event {
            UserEvent::Authenticated(id) => tracing::info!(user_id = id, "user authenticated"),
            UserEvent::Blocked(id) => tracing::info!(user_id = id, "user blocked"),
            UserEvent::Deleted(id) => tracing::info!(user_id = id, "user deleted"),
        })
    }

    pub fn build(self) -> Hooks {
        self.hooks
    }
}

/// HooksState
///
/// The concrete type used to share the hook registry across the application state.
pub type HooksState = Arc<Hooks>;
