//! Launch a simulated instance, wait for it to run, then wait for it to terminate.
//!
//! Run with `cargo run --example wait_for_instance`.

use statewait::{Context, NotFoundError, Operation, StateChangeConfig, WaitError};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct ApiError(String);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone)]
struct Instance {
    id: String,
    state: &'static str,
}

/// Eventually consistent fake: each describe call moves the instance one step along `lifecycle`.
#[derive(Clone)]
struct FakeCloud {
    lifecycle: Arc<Mutex<Vec<Option<&'static str>>>>,
}

impl FakeCloud {
    fn new(lifecycle: Vec<Option<&'static str>>) -> Self {
        Self { lifecycle: Arc::new(Mutex::new(lifecycle)) }
    }

    fn describe(&self, id: &str) -> Option<Instance> {
        let mut steps = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        let state = if steps.len() > 1 { steps.remove(0) } else { steps.first().copied().flatten() };
        state.map(|state| Instance { id: id.to_string(), state })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let ctx = Context::background();
    let cloud = FakeCloud::new(vec![None, Some("pending"), Some("pending"), Some("running")]);

    let api = cloud.clone();
    let mut running = StateChangeConfig::new(move |_ctx| {
        let found = api.describe("i-0abc");
        async move { Ok::<_, WaitError<ApiError>>(found.map(|i| (i.clone(), i.state))) }
    })
    .pending(["pending"])
    .target(["running"])
    .min_timeout(Duration::from_millis(50))
    .timeout(Duration::from_secs(30));

    let instance = running.wait_for_state(&ctx).await?;
    println!("instance is up: {:?}", instance);

    let teardown = FakeCloud::new(vec![Some("shutting-down"), Some("shutting-down"), None]);
    let mut gone = Operation::new(move |_ctx| {
        let found = teardown.describe("i-0abc");
        async move {
            match found {
                Some(instance) => Ok(instance.id),
                None => Err(WaitError::NotFound(NotFoundError::<ApiError>::empty_result())),
            }
        }
    })
    .until_not_found();

    gone.run(&ctx, Duration::from_secs(30)).await?;
    println!("instance terminated");
    Ok(())
}
