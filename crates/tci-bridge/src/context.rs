//! Shared session state
//!
//! One [`SessionContext`] is created at process start and handed (via `Arc`)
//! to every component: the session controller, both endpoints, and the
//! shutdown coordinator. It owns the tuning state, the consumer demand flag,
//! the sample buffer, and the shutdown flag, so there are no ambient
//! globals anywhere in the bridge.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::warn;

/// Fixed configuration resolved before the bridge starts
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Which upstream receiver the bridge drives (0 or 1)
    pub receiver: u32,
    /// Issue device `start;`/`stop;` around each streaming session
    pub device_start: bool,
    /// Initial center frequency in Hz
    pub initial_freq: u64,
    /// Initial IQ sample rate
    pub initial_rate: u32,
    /// Sample buffer capacity in blocks (oldest dropped beyond this)
    pub buffer_blocks: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            receiver: 0,
            device_start: false,
            initial_freq: 14_200_000,
            initial_rate: 96_000,
            buffer_blocks: 1024,
        }
    }
}

/// A tuning parameter the control endpoint may set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningParam {
    /// The `center_freq` key, center frequency in Hz
    CenterFreq,
    /// The `samp_rate` key, IQ sample rate
    SampRate,
}

impl TuningParam {
    /// Map a control-message key to a parameter. Unknown keys get `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "center_freq" => Some(TuningParam::CenterFreq),
            "samp_rate" => Some(TuningParam::SampRate),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Tuning {
    center_freq: u64,
    samp_rate: u32,
}

/// Currently desired operating parameters
///
/// Mutated by the control endpoint, read by the session controller both for
/// command serialization and for verifying the radio's echoes.
#[derive(Debug)]
pub struct TuningState {
    inner: Mutex<Tuning>,
}

impl TuningState {
    /// Create with configured defaults
    pub fn new(center_freq: u64, samp_rate: u32) -> Self {
        Self {
            inner: Mutex::new(Tuning {
                center_freq,
                samp_rate,
            }),
        }
    }

    /// Current center frequency in Hz
    pub fn center_freq(&self) -> u64 {
        self.inner.lock().unwrap().center_freq
    }

    /// Current sample rate
    pub fn samp_rate(&self) -> u32 {
        self.inner.lock().unwrap().samp_rate
    }

    /// Set the center frequency
    pub fn set_center_freq(&self, freq: u64) {
        self.inner.lock().unwrap().center_freq = freq;
    }

    /// Set the sample rate
    pub fn set_samp_rate(&self, rate: u32) {
        self.inner.lock().unwrap().samp_rate = rate;
    }
}

/// Edge-triggered consumer demand flag
///
/// Raised the instant a streaming consumer connects, cleared the instant a
/// consumer's relay loop exits. Deliberately a single flag, not a refcount:
/// with two concurrent consumers the first disconnect clears demand for
/// both. The bridge supports one consumer; this quirk is accepted.
#[derive(Debug, Default)]
pub struct DemandFlag {
    raised: AtomicBool,
    notify: Notify,
}

impl DemandFlag {
    /// Raise demand, waking anyone in [`DemandFlag::wait_raised`]
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Clear demand
    pub fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether a consumer currently wants samples
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Wait until the flag is raised
    pub async fn wait_raised(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// Process-wide shutdown flag, set once by signal handling
#[derive(Debug, Default)]
pub struct ShutdownFlag {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownFlag {
    /// Set the flag and wake all waiters
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

struct BufferInner {
    blocks: VecDeque<Vec<u8>>,
    dropped: u64,
}

/// Bounded FIFO of opaque sample blocks
///
/// The producer (upstream data ingestion) never waits: when the buffer is
/// full the oldest block is discarded so the upstream read path cannot
/// stall on a slow consumer. The consumer suspends while the buffer is
/// empty. Drained whenever a session stops so no stale samples reach a
/// future consumer.
pub struct SampleBuffer {
    inner: Mutex<BufferInner>,
    notify: Notify,
    capacity: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` blocks
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "sample buffer capacity must be nonzero");
        Self {
            inner: Mutex::new(BufferInner {
                blocks: VecDeque::with_capacity(capacity.min(256)),
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Append a block, discarding the oldest if full. Never blocks.
    pub fn push(&self, block: Vec<u8>) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.blocks.len() == self.capacity {
                inner.blocks.pop_front();
                inner.dropped += 1;
                if inner.dropped.is_power_of_two() {
                    warn!(dropped = inner.dropped, "sample buffer full, dropping oldest block");
                }
            }
            inner.blocks.push_back(block);
        }
        self.notify.notify_one();
    }

    /// Take the next block without waiting
    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().blocks.pop_front()
    }

    /// Take the next block, suspending while the buffer is empty
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            if let Some(block) = self.try_pop() {
                return block;
            }
            // notify_one stores a permit, so a push between the check above
            // and this await still wakes us
            self.notify.notified().await;
        }
    }

    /// Discard all buffered blocks
    pub fn drain(&self) {
        self.inner.lock().unwrap().blocks.clear();
    }

    /// Number of buffered blocks
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total blocks discarded because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.inner.lock().unwrap().dropped
    }
}

/// Everything the bridge components share, owned in one place
pub struct SessionContext {
    /// Fixed configuration
    pub config: BridgeConfig,
    /// Desired tuning parameters
    pub tuning: TuningState,
    /// Consumer demand flag
    pub demand: DemandFlag,
    /// Buffered sample blocks between producer and consumer
    pub buffer: SampleBuffer,
    /// Process-wide shutdown flag
    pub shutdown: ShutdownFlag,
}

impl SessionContext {
    /// Build the context from resolved configuration
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            tuning: TuningState::new(config.initial_freq, config.initial_rate),
            demand: DemandFlag::default(),
            buffer: SampleBuffer::new(config.buffer_blocks),
            shutdown: ShutdownFlag::default(),
            config,
        }
    }
}
