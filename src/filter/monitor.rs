use super::{Arguments, Filter, FilterError};
use crate::context::Context;
use crate::signal::Signals;

/// Pass-through stage that logs every signal it sees.
#[derive(Debug, Default, Clone, Copy)]
pub struct Monitor;

impl Filter for Monitor {
    fn name(&self) -> &str {
        "Monitor"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["label"]
    }

    fn handle(
        &self,
        ctx: &Context,
        signals: Signals,
        args: &Arguments,
    ) -> Result<Signals, FilterError> {
        let label = args.text("label").unwrap_or_else(|| "monitor".to_string());
        let now = ctx.now();
        for signal in &signals {
            tracing::info!(
                label = %label,
                now,
                tags = ?signal.attributes().tags(),
                "{signal}"
            );
        }
        Ok(signals)
    }
}
