use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::time::DelayQueue;
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    protocol::{frames::{Frame, FrameType}, table::{ControllerTable, Indicator, Key, State, AQUALOGIC}},
    queue::{CommandQueue, Effect, PendingCommand, VerifyId, Verification},
    state::DeviceState,
};


#[derive(Error, Debug)]
pub enum Error {
    #[error("bus i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a session ended normally.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Disconnect {
    EndOfStream,
    Timeout,
}


struct Inner {
    state: DeviceState,
    queue: CommandQueue,
}

/// Shared handle to a controller on the bus.
///
/// Cloning is cheap; every clone sees the same state and queue. One clone
/// runs [`AquaLogic::process`] while others read values and request changes.
#[derive(Clone)]
pub struct AquaLogic {
    inner: Arc<Mutex<Inner>>,
    table: &'static ControllerTable,
    config: SessionConfig,
}

impl AquaLogic {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_table(&AQUALOGIC, config)
    }

    pub fn with_table(table: &'static ControllerTable, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: DeviceState::default(),
                queue: CommandQueue::new(),
            })),
            table,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // state stays consistent even if a callback panicked while holding the lock
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn table(&self) -> &'static ControllerTable {
        self.table
    }

    /// Process frames from `port` until it ends; `on_change` is called after
    /// every frame that changed a value.
    ///
    /// The state is not carried over between sessions; use a new `AquaLogic`
    /// after reconnecting.
    pub async fn process<T, F>(&self, mut port: T, mut on_change: F) -> Result<Disconnect, Error> where
        T: Stream<Item = std::io::Result<Frame>> + Sink<Frame, Error = std::io::Error> + Unpin,
        F: FnMut(&AquaLogic)
    {
        let mut verifications: DelayQueue<VerifyId> = DelayQueue::new();

        // only a received frame moves the deadline
        let read_deadline = sleep(self.config.read_timeout);
        tokio::pin!(read_deadline);

        loop {
            tokio::select! {
                Some(expired) = verifications.next(), if !verifications.is_empty() => {
                    self.verify(expired.into_inner());
                }

                _ = &mut read_deadline => {
                    warn!("no frame received in {:?}", self.config.read_timeout);
                    return Ok(Disconnect::Timeout);
                }

                frame = port.next() => {
                    let Some(frame) = frame else {
                        return Ok(Disconnect::EndOfStream);
                    };
                    let frame = frame?;

                    read_deadline.as_mut().reset(Instant::now() + self.config.read_timeout);

                    if frame.frame_type == FrameType::KeepAlive {
                        // the only safe window to write to the bus
                        let next = self.lock().queue.transmit_next();

                        if let Some((frame, verify_id)) = next {
                            port.send(frame.clone()).await?;
                            info!("sent: {frame:?}");

                            if let Some(id) = verify_id {
                                verifications.insert(id, self.config.verify_delay);
                            }
                        }

                        continue;
                    }

                    let changed = self.lock().state.dispatch(self.table, &frame);

                    if changed {
                        on_change(self);
                    }
                }
            }
        }
    }

    fn verify(&self, id: VerifyId) {
        let mut inner = self.lock();
        let Inner { state, queue } = &mut *inner;

        let result = queue.verify(id, |s| state.observed(self.table, s));
        match result {
            Verification::Requeued => debug!("state change not seen yet, requeued"),
            Verification::Exhausted => warn!("state change not seen after all retries, giving up"),
            _ => {}
        }
    }

    /// Queue a key press, sent after the next keep-alive.
    ///
    /// Returns false if the controller table has no code for `key`.
    pub fn send_key(&self, key: Key) -> bool {
        let Some(code) = self.table.key_code(key) else {
            return false;
        };

        info!("queueing key {key}");
        self.lock().queue.push(PendingCommand::key_press(Frame::key_event(code)));

        true
    }

    /// Returns true if `state` is enabled, or will be once a queued request
    /// takes effect.
    pub fn get_state(&self, state: State) -> bool {
        let inner = self.lock();
        Self::lookahead(&inner, self.table, state)
    }

    fn lookahead(inner: &Inner, table: &ControllerTable, state: State) -> bool {
        match inner.queue.desired(state) {
            Some(enabled) => enabled,
            None => inner.state.observed(table, state),
        }
    }

    /// Request that `state` be turned on or off.
    ///
    /// Returns false if the state cannot be controlled. Otherwise the key
    /// press is queued and re-sent until the controller reports the new value
    /// or the retries run out; neither outcome is reported.
    pub fn request_state(&self, state: State, enabled: bool) -> bool {
        let mut inner = self.lock();

        if Self::lookahead(&inner, self.table, state) == enabled {
            return true;
        }

        let Some(toggle) = self.table.toggle(state) else {
            debug!("no key toggles {state}");
            return false;
        };

        if toggle.requires_multi_speed_pump && !inner.state.multi_speed_pump {
            debug!("{state} requires a multi-speed pump");
            return false;
        }

        let Some(code) = self.table.key_code(toggle.key) else {
            return false;
        };

        let mut effects = vec![Effect { state, enabled }];
        if let Some((state, enabled)) = toggle.also {
            effects.push(Effect { state, enabled });
        }

        info!("queueing key {} to turn {state} {}", toggle.key, if enabled { "on" } else { "off" });

        // no LED for auto mode; the next `Heater1` display line corrects it if the press is lost
        if self.table.indicator(state) == Some(Indicator::HeaterAutoMode) {
            inner.state.heater_auto_mode = enabled;
        }

        inner.queue.push(PendingCommand::state_change(Frame::key_event(code), effects, self.config.retries));

        true
    }

    /// Override the multi-speed pump detection.
    pub fn enable_multi_speed_pump(&self, enable: bool) {
        self.lock().state.multi_speed_pump = enable;
    }

    /// Enabled states, synthetic ones included.
    pub fn states(&self) -> Vec<State> {
        self.lock().state.enabled_states(self.table)
    }

    pub fn snapshot(&self) -> DeviceState {
        self.lock().state.clone()
    }

    /// Frames waiting for a keep-alive.
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn air_temp(&self) -> Option<i32> {
        self.lock().state.air_temp
    }

    pub fn pool_temp(&self) -> Option<i32> {
        self.lock().state.pool_temp
    }

    pub fn spa_temp(&self) -> Option<i32> {
        self.lock().state.spa_temp
    }

    /// Percent
    pub fn pool_chlorinator(&self) -> Option<u8> {
        self.lock().state.pool_chlorinator
    }

    /// Percent
    pub fn spa_chlorinator(&self) -> Option<u8> {
        self.lock().state.spa_chlorinator
    }

    pub fn salt_level(&self) -> Option<f32> {
        self.lock().state.salt_level
    }

    pub fn pump_speed(&self) -> Option<u16> {
        self.lock().state.pump_speed
    }

    pub fn pump_power(&self) -> Option<u16> {
        self.lock().state.pump_power
    }

    /// True if temperatures and salt level are metric.
    pub fn is_metric(&self) -> bool {
        self.lock().state.is_metric
    }

    pub fn multi_speed_pump(&self) -> bool {
        self.lock().state.multi_speed_pump
    }

    /// The "Check System" message while the CHECK_SYSTEM LED is lit.
    pub fn check_system_msg(&self) -> Option<String> {
        self.lock().state.check_system_message(self.table).map(str::to_owned)
    }

    /// "OK", or the current "Check System" message.
    pub fn status(&self) -> String {
        self.check_system_msg().unwrap_or_else(|| "OK".to_string())
    }
}

impl std::fmt::Debug for AquaLogic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AquaLogic")
            .field("table", &self.table.name)
            .field("state", &self.snapshot())
            .finish()
    }
}
