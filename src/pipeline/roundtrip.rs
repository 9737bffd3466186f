use std::fmt;

use serde::Serialize;

use crate::error::RoundTripError;
use crate::models::GenerationClient;
use crate::progress::ConsoleProgress;
use crate::textutil::preview;

use super::prompts::{PromptSet, TemplateName};
use super::trace::StepObserver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    ToDialect,
    RoundTrip,
    Analyze,
    Refine,
    Verify,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::ToDialect,
        Step::RoundTrip,
        Step::Analyze,
        Step::Refine,
        Step::Verify,
    ];

    /// 1-based position in the run.
    pub fn index(self) -> usize {
        match self {
            Self::ToDialect => 1,
            Self::RoundTrip => 2,
            Self::Analyze => 3,
            Self::Refine => 4,
            Self::Verify => 5,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::ToDialect => "to_dialect",
            Self::RoundTrip => "round_trip",
            Self::Analyze => "analyze",
            Self::Refine => "refine",
            Self::Verify => "verify",
        }
    }

    pub fn template(self) -> TemplateName {
        match self {
            Self::ToDialect => TemplateName::ToDialect,
            Self::RoundTrip | Self::Verify => TemplateName::ToEnglish,
            Self::Analyze => TemplateName::Analyze,
            Self::Refine => TemplateName::Refine,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Every value produced by one run, in production order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoundTrip {
    pub original: String,
    pub dialect_phrase: String,
    pub round_trip: String,
    pub analysis: String,
    pub refined: String,
    /// Back-translation of `refined`. Computed for inspection only.
    pub verified: String,
}

pub struct RoundTripPipeline<C> {
    client: C,
    prompts: PromptSet,
    temperature: f32,
    progress: ConsoleProgress,
    log_max_chars: usize,
    observers: Vec<Box<dyn StepObserver>>,
}

impl<C: GenerationClient> RoundTripPipeline<C> {
    pub fn new(client: C, prompts: PromptSet, temperature: f32, progress: ConsoleProgress) -> Self {
        Self {
            client,
            prompts,
            temperature,
            progress,
            log_max_chars: 240,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: impl StepObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn with_log_max_chars(mut self, max_chars: usize) -> Self {
        self.log_max_chars = max_chars;
        self
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn run(&self, original: &str) -> Result<RoundTrip, RoundTripError> {
        self.progress.info(format!(
            "Round trip: english -> {} -> english (model {}, temperature {})",
            self.prompts.dialect,
            self.client.model_id(),
            self.temperature
        ));

        let dialect = self.translate_to_dialect(original)?;
        let round_trip = self.translate_to_english(&dialect)?;
        let analysis = self.analyze_difference(original, &round_trip)?;
        let refined = self.refine(original, &dialect, &round_trip, &analysis)?;
        let verified = self.verify(&refined)?;

        self.progress.info("Done.");
        Ok(RoundTrip {
            original: original.to_string(),
            dialect_phrase: dialect,
            round_trip,
            analysis,
            refined,
            verified,
        })
    }

    pub fn translate_to_dialect(&self, phrase: &str) -> Result<String, RoundTripError> {
        self.run_step(Step::ToDialect, &[("phrase", phrase)])
    }

    pub fn translate_to_english(&self, phrase: &str) -> Result<String, RoundTripError> {
        self.run_step(Step::RoundTrip, &[("phrase", phrase)])
    }

    pub fn analyze_difference(
        &self,
        english_phrase: &str,
        round_trip_phrase: &str,
    ) -> Result<String, RoundTripError> {
        self.run_step(
            Step::Analyze,
            &[
                ("english_phrase", english_phrase),
                ("round_trip_phrase", round_trip_phrase),
            ],
        )
    }

    pub fn refine(
        &self,
        english_phrase: &str,
        dialect_phrase: &str,
        round_trip_phrase: &str,
        analysis: &str,
    ) -> Result<String, RoundTripError> {
        self.run_step(
            Step::Refine,
            &[
                ("english_phrase", english_phrase),
                ("quebecois", dialect_phrase),
                ("round_trip_phrase", round_trip_phrase),
                ("analysis", analysis),
            ],
        )
    }

    /// Back-translates the refined phrase with the same template as the round trip.
    pub fn verify(&self, refined: &str) -> Result<String, RoundTripError> {
        self.run_step(Step::Verify, &[("phrase", refined)])
    }

    fn run_step(&self, step: Step, vars: &[(&str, &str)]) -> Result<String, RoundTripError> {
        let prompt = self.prompts.get(step.template()).render(vars)?;
        self.progress.progress(step.key(), step.index(), Step::ALL.len());

        for obs in &self.observers {
            obs.before_step(step, &prompt);
        }
        let output = self
            .client
            .generate(&prompt, self.temperature)
            .map_err(|source| RoundTripError::Generation { step, source })?;
        for obs in &self.observers {
            obs.after_step(step, &output);
        }

        self.progress
            .info(format!("  {} -> {}", step.key(), preview(&output, self.log_max_chars)));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::GenerationError;
    use crate::pipeline::prompts::DEFAULT_DIALECT;
    use crate::pipeline::TracingObserver;

    const ORIGINAL: &str = "There is value in the remix.";

    /// Answers each call with the next scripted token and records the prompt.
    struct ScriptedClient {
        replies: Vec<&'static str>,
        fail_at: Option<usize>,
        prompts: RefCell<Vec<String>>,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                replies: vec!["D1", "R1", "A1", "F1", "R2"],
                fail_at: None,
                prompts: RefCell::new(Vec::new()),
            }
        }

        fn failing_at(call: usize) -> Self {
            Self {
                fail_at: Some(call),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.prompts.borrow().clone()
        }
    }

    impl GenerationClient for ScriptedClient {
        fn generate(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
            assert!((temperature - 0.7).abs() < f32::EPSILON);
            let n = self.prompts.borrow().len();
            self.prompts.borrow_mut().push(prompt.to_string());
            if self.fail_at == Some(n) {
                return Err(GenerationError::RateLimited {
                    status: 429,
                    body: "slow down".into(),
                });
            }
            Ok(self.replies[n].to_string())
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
        prompts: Rc<RefCell<Vec<String>>>,
        outputs: Rc<RefCell<Vec<String>>>,
    }

    impl StepObserver for Recorder {
        fn before_step(&self, step: Step, prompt: &str) {
            self.events.borrow_mut().push(format!("before:{step}"));
            self.prompts.borrow_mut().push(prompt.to_string());
        }

        fn after_step(&self, step: Step, output: &str) {
            self.events.borrow_mut().push(format!("after:{step}:{output}"));
            self.outputs.borrow_mut().push(output.to_string());
        }
    }

    fn pipeline(client: &ScriptedClient) -> RoundTripPipeline<&ScriptedClient> {
        let prompts = PromptSet::builtin(DEFAULT_DIALECT).unwrap();
        RoundTripPipeline::new(client, prompts, 0.7, ConsoleProgress::new(false))
    }

    #[test]
    fn run_wires_each_output_into_downstream_prompts() {
        let client = ScriptedClient::new();
        let out = pipeline(&client).run(ORIGINAL).unwrap();

        assert_eq!(
            out,
            RoundTrip {
                original: ORIGINAL.into(),
                dialect_phrase: "D1".into(),
                round_trip: "R1".into(),
                analysis: "A1".into(),
                refined: "F1".into(),
                verified: "R2".into(),
            }
        );

        let calls = client.calls();
        assert_eq!(calls.len(), 5);
        let first = format!("Translate the following into Quebecois:\n{ORIGINAL}");
        assert!(calls[0].contains(&first));
        assert!(calls[1].contains("Translate the following into English:\nD1"));
        assert!(calls[2].contains(&format!("Original:\n{ORIGINAL}\n\nRound Trip:\nR1\n")));
        assert!(calls[3].contains(ORIGINAL));
        assert!(calls[3].contains("Quebecois:\nD1\n"));
        assert!(calls[3].contains("Round Trip:\nR1\n"));
        assert!(calls[3].contains("Analysis:\nA1\n"));
        assert!(calls[4].contains("Translate the following into English:\nF1"));
    }

    #[test]
    fn steps_run_in_fixed_order() {
        let client = ScriptedClient::new();
        let recorder = Recorder::default();
        let events = recorder.events.clone();
        pipeline(&client).with_observer(recorder).run(ORIGINAL).unwrap();

        assert_eq!(
            *events.borrow(),
            vec![
                "before:to_dialect",
                "after:to_dialect:D1",
                "before:round_trip",
                "after:round_trip:R1",
                "before:analyze",
                "after:analyze:A1",
                "before:refine",
                "after:refine:F1",
                "before:verify",
                "after:verify:R2",
            ]
        );
    }

    #[test]
    fn observers_see_the_exact_prompt_and_raw_output() {
        let client = ScriptedClient::new();
        let recorder = Recorder::default();
        let prompts = recorder.prompts.clone();
        let outputs = recorder.outputs.clone();
        pipeline(&client).with_observer(recorder).run(ORIGINAL).unwrap();

        assert_eq!(*prompts.borrow(), client.calls());
        assert!(prompts.borrow().iter().all(|p| !p.is_empty()));
        assert_eq!(*outputs.borrow(), vec!["D1", "R1", "A1", "F1", "R2"]);
    }

    #[test]
    fn tracing_observer_logs_prompts_and_responses() {
        let client = ScriptedClient::new();
        let logs = capture_debug_logs(|| {
            pipeline(&client)
                .with_observer(TracingObserver)
                .run(ORIGINAL)
                .unwrap();
        });

        assert!(logs.contains("step="));
        assert!(logs.contains("to_dialect"));
        assert!(logs.contains("verify"));
        assert!(logs.contains("prompt after formatting:"));
        assert!(logs.contains(&format!("Translate the following into Quebecois:\n{ORIGINAL}")));
        assert!(logs.contains("raw response:\nA1"));
        assert_eq!(logs.matches("raw response:").count(), 5);
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture_debug_logs(f: impl FnOnce()) -> String {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn no_prompt_carries_an_unfilled_slot() {
        let client = ScriptedClient::new();
        pipeline(&client).run(ORIGINAL).unwrap();
        for prompt in client.calls() {
            for name in TemplateName::ALL {
                for slot in name.slots() {
                    assert!(!prompt.contains(&format!("{{{slot}}}")));
                }
            }
        }
    }

    #[test]
    fn failure_at_any_step_stops_the_run() {
        for (i, step) in Step::ALL.iter().enumerate() {
            let client = ScriptedClient::failing_at(i);
            let recorder = Recorder::default();
            let events = recorder.events.clone();

            let err = pipeline(&client)
                .with_observer(recorder)
                .run(ORIGINAL)
                .unwrap_err();

            match err {
                RoundTripError::Generation { step: failed, source } => {
                    assert_eq!(failed, *step);
                    assert!(matches!(source, GenerationError::RateLimited { .. }));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(client.calls().len(), i + 1, "calls after failing {step}");
            assert_eq!(events.borrow().last().unwrap(), &format!("before:{step}"));
        }
    }

    #[test]
    fn verify_reuses_the_english_template() {
        assert_eq!(Step::Verify.template(), Step::RoundTrip.template());
        let client = ScriptedClient::new();
        let p = pipeline(&client);
        p.verify("F1").unwrap();
        assert_eq!(
            client.calls()[0],
            p.prompts().to_english.render(&[("phrase", "F1")]).unwrap()
        );
    }

    #[test]
    fn steps_are_numbered_one_to_five() {
        let idx: Vec<usize> = Step::ALL.iter().map(|s| s.index()).collect();
        assert_eq!(idx, vec![1, 2, 3, 4, 5]);
    }
}
