//! mmsa-fusion - Multimodal Sentiment Fusion Decision Engine
//!
//! Combines per-modality sentiment predictions (text, audio, video) into a
//! single label and confidence under a fusion policy that can be replaced at
//! runtime, either by editing the policy file (hot reload) or through the
//! control operations.
//!
//! ```text
//! predictions ──► FusionEngine ──► compute_weights ──► fuse ──► FusionResult
//!                      │
//!                 PolicyStore ◄── ReloadSupervisor ◄── fusion.toml
//!                      ▲
//!                 RuntimeControl
//! ```

pub mod control;
pub mod error;
pub mod events;
pub mod fusion;
pub mod performance;
pub mod policy;
pub mod reload;
pub mod service;
pub mod types;

pub use control::{PolicyView, RuntimeControl};
pub use error::{ConfigError, FusionError, Result};
pub use events::{PolicyEvent, PolicyEventBus, ReloadTrigger};
pub use fusion::{fuse_with_policy, Contribution, FusionEngine, FusionResult};
pub use performance::PerformanceWindow;
pub use policy::{FusionPolicy, LoadedPolicy, PolicyLoader, PolicyStore};
pub use reload::{ReloadOutcome, ReloadSupervisor};
pub use service::RequestHandler;
pub use types::{
    FusionMethod, Modality, ModalityPrediction, ModalityWeights, SentimentLabel,
};
