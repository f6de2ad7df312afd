//! Line-oriented JSON request handling for the `mmsa-fusion` binary
//!
//! Each request line is either an array of predictions (fused and answered
//! with a `FusionResult`) or a control command object tagged by `command`.
//! Every response is a single JSON value; failures use
//! `{"error": {"code", "message"}}`.

use crate::control::RuntimeControl;
use crate::error::{ConfigError, FusionError};
use crate::fusion::FusionEngine;
use crate::reload::ReloadOutcome;
use crate::types::ModalityPrediction;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Control command accepted on the request stream
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    GetPolicy,
    UpdateWeights { weights: BTreeMap<String, f64> },
    SetMethod { method: String },
    ApplyPreset { name: String },
    SetAdaptiveWeights { weights: BTreeMap<String, f64> },
    ForceReload,
    Persist { path: PathBuf },
}

/// One request line
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Request {
    Fuse(Vec<ModalityPrediction>),
    FuseObject { predictions: Vec<ModalityPrediction> },
    Control(ControlCommand),
}

/// Request dispatcher shared by the binary and tests
#[derive(Debug, Clone)]
pub struct RequestHandler {
    engine: FusionEngine,
    control: RuntimeControl,
}

impl RequestHandler {
    pub fn new(engine: FusionEngine, control: RuntimeControl) -> Self {
        Self { engine, control }
    }

    /// Parse and answer one request line
    pub async fn handle_line(&self, line: &str) -> Value {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => error_body("BAD_REQUEST", &e.to_string()),
        }
    }

    pub async fn handle(&self, request: Request) -> Value {
        match request {
            Request::Fuse(predictions) | Request::FuseObject { predictions } => {
                debug!("Fusion request with {} predictions", predictions.len());
                match self.engine.fuse(&predictions) {
                    Ok(result) => to_value(&result),
                    Err(e) => fusion_error_body(&e),
                }
            }
            Request::Control(command) => self.handle_command(command).await,
        }
    }

    async fn handle_command(&self, command: ControlCommand) -> Value {
        let revision = match command {
            ControlCommand::GetPolicy => return to_value(&self.control.describe()),
            ControlCommand::ForceReload => return reload_body(self.control.force_reload().await),
            ControlCommand::Persist { path } => {
                return match self.control.persist(&path) {
                    Ok(()) => json!({ "persisted": path }),
                    Err(e) => fusion_error_body(&e),
                }
            }
            ControlCommand::UpdateWeights { weights } => self.control.update_weights(&weights),
            ControlCommand::SetMethod { method } => self.control.set_method(&method),
            ControlCommand::ApplyPreset { name } => self.control.apply_preset(&name),
            ControlCommand::SetAdaptiveWeights { weights } => {
                self.control.set_adaptive_weights(&weights)
            }
        };

        match revision {
            Ok(_) => to_value(&self.control.describe()),
            Err(e) => fusion_error_body(&e),
        }
    }
}

fn reload_body(outcome: ReloadOutcome) -> Value {
    match outcome {
        ReloadOutcome::Unchanged => json!({ "reload": "unchanged" }),
        ReloadOutcome::Reloaded { revision, warnings } => json!({
            "reload": "reloaded",
            "revision": revision,
            "warnings": warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
        }),
        ReloadOutcome::Failed(e) => config_error_body(&e),
    }
}

fn fusion_error_body(err: &FusionError) -> Value {
    match err {
        FusionError::InsufficientInput => error_body("INSUFFICIENT_INPUT", &err.to_string()),
        FusionError::DuplicateModality(_) => error_body("DUPLICATE_MODALITY", &err.to_string()),
        FusionError::UnknownPreset(_) => error_body("UNKNOWN_PRESET", &err.to_string()),
        FusionError::Config(e) => config_error_body(e),
    }
}

fn config_error_body(err: &ConfigError) -> Value {
    error_body("CONFIG_ERROR", &err.to_string())
}

fn error_body(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| error_body("INTERNAL_ERROR", &e.to_string()))
}
