//! Transformation stages and their composition.
//!
//! A [`Filter`] turns one batch of [`Signals`] into another. Filters are
//! wrapped in a [`Stage`] together with their construction-time
//! [`Arguments`]; the stage implements the dispatch protocol every chain
//! relies on:
//!
//! - `can_handle == false`: the stage is transparent and its output is its input.
//! - `can_handle == true`: the output of `handle` replaces the input.
//! - configuration errors fail the whole invocation.
//! - a failure on one signal only drops that signal (see [`each_isolated`]).

mod arguments;
mod arpeggiate;
mod chain;
mod chorder;
mod monitor;
mod out;
mod scale_enforcer;

use std::sync::Arc;

use crate::context::Context;
use crate::signal::{Signal, Signals};
use crate::theory::TheoryError;

pub use arguments::{ArgValue, Arguments};
pub use arpeggiate::Arpeggiate;
pub use chain::{ChainError, FilterChain, SignalEventListener};
pub use chorder::{ChordMode, Chorder};
pub use monitor::Monitor;
pub use out::Out;
pub use scale_enforcer::{CorrectionMode, ScaleEnforcer};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("{filter}: unknown option '{option}'")]
    UnknownOption { filter: String, option: String },
    #[error("{filter}: invalid value for '{option}': {reason}")]
    InvalidOption {
        filter: String,
        option: String,
        reason: String,
    },
    #[error("{filter}: invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        filter: String,
        pattern: String,
        reason: String,
    },
}

impl FilterError {
    pub(crate) fn invalid(filter: &str, option: &str, reason: impl Into<String>) -> Self {
        FilterError::InvalidOption {
            filter: filter.to_string(),
            option: option.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    /// Option names this filter accepts.
    fn parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Checks options up front, before any signal is seen.
    fn validate(&self, _args: &Arguments) -> Result<(), FilterError> {
        Ok(())
    }

    fn can_handle(&self, _ctx: &Context, _signals: &Signals, _args: &Arguments) -> bool {
        true
    }

    fn handle(
        &self,
        ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError>;
}

impl<F: Filter + ?Sized> Filter for Arc<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn parameters(&self) -> &'static [&'static str] {
        (**self).parameters()
    }

    fn validate(&self, args: &Arguments) -> Result<(), FilterError> {
        (**self).validate(args)
    }

    fn can_handle(&self, ctx: &Context, signals: &Signals, args: &Arguments) -> bool {
        (**self).can_handle(ctx, signals, args)
    }

    fn handle(
        &self,
        ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError> {
        (**self).handle(ctx, signals, args)
    }
}

/// Builds one of the built-in filters by name.
pub fn create(name: &str) -> Result<Box<dyn Filter>, FilterError> {
    let filter: Box<dyn Filter> = match name.to_ascii_lowercase().as_str() {
        "arpeggiate" => Box::new(Arpeggiate),
        "chorder" => Box::new(Chorder::new()),
        "scaleenforcer" => Box::new(ScaleEnforcer::new()),
        "monitor" => Box::new(Monitor),
        _ => return Err(FilterError::UnknownFilter(name.to_string())),
    };
    Ok(filter)
}

/// A filter bound to its construction-time arguments.
pub struct Stage {
    filter: Box<dyn Filter>,
    arguments: Arguments,
}

impl Stage {
    pub fn new(filter: Box<dyn Filter>, arguments: Arguments) -> Result<Self, FilterError> {
        arguments.check_known(filter.name(), filter.parameters())?;
        filter.validate(&arguments)?;
        Ok(Self { filter, arguments })
    }

    pub fn named(name: &str, arguments: Arguments) -> Result<Self, FilterError> {
        Stage::new(create(name)?, arguments)
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Runs the stage with optional call-time overrides.
    pub fn run(
        &self,
        ctx: &Context,
        input: Signals,
        overrides: Option<&Arguments>,
    ) -> Result<Signals, FilterError> {
        let args = self.arguments.merged(overrides);
        if overrides.is_some() {
            args.check_known(self.filter.name(), self.filter.parameters())?;
            self.filter.validate(&args)?;
        }

        if !self.filter.can_handle(ctx, &input, &args) {
            return Ok(input);
        }
        self.filter.handle(ctx, input, &args)
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("filter", &self.filter.name())
            .field("arguments", &self.arguments)
            .finish()
    }
}

/// Applies `f` to every signal, collecting what it produces. A signal whose
/// processing fails contributes nothing and the rest of the batch carries on.
pub(crate) fn each_isolated<F>(filter: &str, signals: &Signals, mut f: F) -> Signals
where
    F: FnMut(&Signal, &mut Signals) -> Result<(), TheoryError>,
{
    let mut output = Signals::new();
    for signal in signals {
        let mut produced = Signals::new();
        match f(signal, &mut produced) {
            Ok(()) => output.extend(produced),
            Err(error) => {
                tracing::warn!(filter, %signal, %error, "dropping signal");
            }
        }
    }
    output
}
