//! App foreground/background transitions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Active,
    Inactive,
    Background,
}

impl AppLifecycle {
    /// True for a background/inactive → active transition
    pub fn is_resume(previous: AppLifecycle, next: AppLifecycle) -> bool {
        matches!(previous, AppLifecycle::Inactive | AppLifecycle::Background)
            && next == AppLifecycle::Active
    }
}
