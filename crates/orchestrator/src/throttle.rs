//! Throttle Coordinator (C3): per-model multiplicative backoff, converging
//! across processes via the store's pub/sub channel (SPEC_FULL.md §4.3).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sa_domain::config::ThrottleConfig;
use sa_domain::error::{Error, Result};
use sa_domain::trace::TraceEvent;
use sa_providers::ChatResponse;
use sa_store::PubSub;

const FIXED_POINT_SCALE: f64 = 1_000_000.0;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Outcome of submitting a call through the coordinator.
pub enum ChatOutcome {
    Response(ChatResponse),
    Throttled,
    Cancelled,
}

enum SlotOutcome {
    Proceed,
    Cancelled,
}

/// Per-process, per-model throttle state with cross-process convergence.
pub struct ThrottleCoordinator {
    config: ThrottleConfig,
    model_id: String,
    multiplier_fp: AtomicU32,
    last_request_at: parking_lot::Mutex<Option<std::time::Instant>>,
    pubsub: Arc<PubSub<String>>,
}

impl ThrottleCoordinator {
    pub fn new(config: ThrottleConfig, model_id: impl Into<String>, pubsub: Arc<PubSub<String>>) -> Arc<Self> {
        let model_id = model_id.into();
        let floor_fp = (config.floor_multiplier * FIXED_POINT_SCALE) as u32;
        let this = Arc::new(Self {
            multiplier_fp: AtomicU32::new(floor_fp),
            config,
            model_id,
            last_request_at: parking_lot::Mutex::new(None),
            pubsub,
        });
        Self::spawn_subscriber(this.clone());
        this
    }

    fn channel_key(&self) -> String {
        format!("throttle:{}", self.model_id)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier_fp.load(Ordering::Acquire) as f64 / FIXED_POINT_SCALE
    }

    fn set_multiplier(&self, value: f64) {
        let clamped = value.clamp(self.config.floor_multiplier, self.config.ceiling_multiplier);
        self.multiplier_fp.store((clamped * FIXED_POINT_SCALE) as u32, Ordering::Release);
    }

    /// Spawn (once, lazily, at construction) the background task that
    /// subscribes to this model's throttle channel and folds received
    /// values into the local multiplier via `max(local, received)`.
    fn spawn_subscriber(this: Arc<Self>) {
        let mut rx = this.pubsub.subscribe(&this.channel_key());
        tokio::spawn(async move {
            while let Ok(received) = rx.recv().await {
                if let Ok(value) = received.parse::<f64>() {
                    if value > this.multiplier() {
                        this.set_multiplier(value);
                    }
                }
            }
        });
    }

    fn base_delay_ms(&self, last_output_tokens: u64) -> f64 {
        (self.config.base_delay_floor_ms as f64)
            .max(last_output_tokens as f64 * self.config.output_tokens_per_ms)
    }

    async fn wait_for_slot(&self, last_output_tokens: u64, is_stopped: &dyn Fn() -> bool) -> SlotOutcome {
        let required = Duration::from_secs_f64(
            self.base_delay_ms(last_output_tokens) / 1000.0 * self.multiplier(),
        );
        let elapsed = {
            let last = self.last_request_at.lock();
            last.map(|t| t.elapsed())
        };

        if let Some(elapsed) = elapsed {
            if elapsed < required {
                let mut remaining = required - elapsed;
                while !remaining.is_zero() {
                    if is_stopped() {
                        return SlotOutcome::Cancelled;
                    }
                    let step = POLL_INTERVAL.min(remaining);
                    tokio::time::sleep(step).await;
                    remaining = remaining.saturating_sub(step);
                }
            }
        }

        *self.last_request_at.lock() = Some(std::time::Instant::now());
        SlotOutcome::Proceed
    }

    fn on_success(&self) {
        let new_value = (self.multiplier() * self.config.decay_factor).max(self.config.floor_multiplier);
        self.set_multiplier(new_value);
        self.pubsub.publish(&self.channel_key(), new_value.to_string());
        TraceEvent::ThrottleStateChanged {
            model_id: self.model_id.clone(),
            multiplier: new_value,
            reason: "success",
        }
        .emit();
    }

    async fn on_throttled(&self) {
        let new_value = (self.multiplier() * self.config.growth_factor).min(self.config.ceiling_multiplier);
        self.set_multiplier(new_value);
        self.pubsub.publish(&self.channel_key(), new_value.to_string());
        TraceEvent::ThrottleStateChanged {
            model_id: self.model_id.clone(),
            multiplier: new_value,
            reason: "throttled",
        }
        .emit();
        tokio::time::sleep(Duration::from_millis(self.config.backoff_window_ms)).await;
    }

    /// Submit `make_call` subject to the throttle delay, updating the
    /// shared multiplier based on its outcome (SPEC_FULL.md §4.3 / §4.6
    /// step 5).
    pub async fn call<Fut>(
        &self,
        last_output_tokens: u64,
        is_stopped: &dyn Fn() -> bool,
        make_call: impl FnOnce() -> Fut,
    ) -> Result<ChatOutcome>
    where
        Fut: std::future::Future<Output = Result<ChatResponse>>,
    {
        match self.wait_for_slot(last_output_tokens, is_stopped).await {
            SlotOutcome::Cancelled => return Ok(ChatOutcome::Cancelled),
            SlotOutcome::Proceed => {}
        }

        match make_call().await {
            Ok(resp) => {
                self.on_success();
                Ok(ChatOutcome::Response(resp))
            }
            Err(Error::Throttled { .. }) => {
                self.on_throttled().await;
                Ok(ChatOutcome::Throttled)
            }
            Err(e) => Err(e),
        }
    }
}
