//! Client-side feed helpers: swap progress and provider search

pub mod provider;
pub mod swap;

pub use provider::{ProviderFilter, ServiceProvider, SkillLevel, SkillWithLevel};
pub use swap::{SwapProgress, SwapStage};
