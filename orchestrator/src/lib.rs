//! Orchestrator (§4.3): interprets a [`card::ProcessCard`], turning declarative
//! steps into Bus RPCs (or in-process calls) and variable updates.
//!
//! [`engine::Engine`] is the step machine. It is generic over [`dispatch::Dispatcher`]
//! so the same step logic runs against [`dispatch::BusDispatcher`] in production and
//! [`dispatch::InProcessDispatcher`] in tests (§4.3.2: "the step machine must not
//! observe the difference beyond timing").

pub mod card;
pub mod condition;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod instance;
pub mod template;

pub use card::{OnFailure, ProcessCard, RetryPolicy, Step, StepKind};
pub use config::OrchestratorConfig;
pub use dispatch::{BusDispatcher, DispatchOutcome, Dispatcher, InProcessDispatcher, LocalHandler};
pub use engine::Engine;
pub use error::{OrchestratorError, OrchestratorResult};
pub use instance::{ProcessInstance, ProcessStatus, StepResult, StepStatus};
