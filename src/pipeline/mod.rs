mod config;
mod prompts;
mod report;
mod roundtrip;
mod trace;

pub use config::{init_default_config, CliOverrides, PipelineConfig, DEFAULT_PHRASE};
pub use prompts::{PromptSet, PromptTemplate, TemplateName, DEFAULT_DIALECT};
pub use report::{build_report, format_summary, write_report_file, RoundTripReport};
pub use roundtrip::{RoundTrip, RoundTripPipeline, Step};
pub use trace::{StepObserver, TraceWriter, TracingObserver};
