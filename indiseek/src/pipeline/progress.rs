use serde::Serialize;

/// Structured progress emitted by pipeline stages: per-file for
/// parse/summarize, per-batch for embed, start/end for lexical rebuild.
#[derive(Serialize, Clone, Debug)]
pub struct ProgressEvent {
    pub stage: String,
    pub current: u64,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Callback wrapper handed into stages. The task manager installs one that
/// fans events out to SSE subscribers; tests and direct invocations use
/// `noop`.
pub struct ProgressReporter {
    callback: ProgressCallback,
}

impl ProgressReporter {
    pub fn new(callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    pub fn emit(&self, stage: &str, current: u64, total: u64, subject: Option<&str>) {
        (self.callback)(ProgressEvent {
            stage: stage.to_owned(),
            current,
            total,
            subject: subject.map(str::to_owned),
        });
    }
}
