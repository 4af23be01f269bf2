//! Cognitive steps - one model call turning a working memory into a new
//! working memory plus a typed result.
//!
//! ## Module Structure
//!
//! - `step` - `StepSpec`, `CognitiveStep` and the streaming handles
//! - `registry` - `ProviderRegistry` and the `StepRuntime` every call needs
//! - `steps` - The concrete steps used by the dialogue and the chat soul
//! - `errors` - `StepError`

mod errors;
mod registry;
mod step;
pub mod steps;

pub use errors::StepError;
pub use registry::{ProviderRegistry, ResolvedProvider, StepRuntime};
pub use step::{
    create_cognitive_step, verbatim, CognitiveStep, CommandFn, PostProcessFn, StepOptions,
    StepOutput, StepResult, StepSpec, StreamOutcome, StreamedStep, TextStream,
};
