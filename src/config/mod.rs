pub mod settings;

pub use settings::{
    AppConfig, BlockingRules, ExecutionPosture, LaunchProfile, Operation, RetrySettings,
    ScraperSettings, ViewportSize,
};
