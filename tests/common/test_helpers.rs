use futures::future::{ready, Ready};
use statewait::{Context, WaitError};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError(pub &'static str);

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ProbeError {}

pub type Observation = Result<Option<(usize, &'static str)>, WaitError<ProbeError>>;

/// One scripted answer of a refresh function.
#[derive(Debug, Clone)]
pub enum Step {
    State(&'static str),
    Absent,
    Fail(WaitError<ProbeError>),
}

/// Refresh function replaying `steps` in order and repeating the last one.
///
/// Present objects are the zero-based index of the call that observed them. The returned counter
/// tracks how many times the refresh ran.
pub fn scripted(
    steps: Vec<Step>,
) -> (impl FnMut(Context) -> Ready<Observation> + Send + 'static, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let refresh = move |_ctx: Context| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let step = steps[n.min(steps.len() - 1)].clone();
        ready(match step {
            Step::State(state) => Ok(Some((n, state))),
            Step::Absent => Ok(None),
            Step::Fail(err) => Err(err),
        })
    };
    (refresh, calls)
}

pub fn states(names: &[&'static str]) -> Vec<Step> {
    names.iter().map(|s| Step::State(*s)).collect()
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}

/// Install a test-friendly subscriber so `tracing` output shows up with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::TRACE).try_init();
}
