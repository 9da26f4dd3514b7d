use crate::command::Command;
use crate::dispatcher::Dispatcher;
use crate::events::EventBus;
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Movement bands for the autonomous loop. Defaults follow the original
/// controller: slow rolls, very dim colors, the occasional gentle spin.
#[derive(Debug, Clone)]
pub struct WanderConfig {
    pub speed_range: (u16, u16),
    pub color_max: u16,
    pub roll_secs: (f32, f32),
    pub pause_extra_secs: (f32, f32),
    pub color_chance: f64,
    pub spin_chance: f64,
    pub spin_degrees: Vec<u16>,
    pub spin_secs: (f32, f32),
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            speed_range: (10, 40),
            color_max: 40,
            roll_secs: (0.5, 1.5),
            pause_extra_secs: (1.0, 2.0),
            color_chance: 0.4,
            spin_chance: 0.2,
            spin_degrees: vec![45, 90, 180],
            spin_secs: (2.0, 3.5),
        }
    }
}

/// One tick's worth of pre-drawn random values. Drawn in a block so the
/// thread-local RNG is never held across an await point.
struct Tick {
    color: Option<Command>,
    roll: Command,
    pause: Duration,
    spin: Option<Command>,
}

impl Tick {
    fn draw(config: &WanderConfig) -> Self {
        let mut rng = rand::thread_rng();
        let color = rng.gen_bool(config.color_chance).then(|| Command::SetColor {
            r: rng.gen_range(0..=config.color_max),
            g: rng.gen_range(0..=config.color_max),
            b: rng.gen_range(0..=config.color_max),
        });
        let duration = rng.gen_range(config.roll_secs.0..=config.roll_secs.1);
        let roll = Command::Roll {
            heading: rng.gen_range(0..360),
            speed: rng.gen_range(config.speed_range.0..=config.speed_range.1),
            duration,
        };
        let pause = Duration::from_secs_f32(
            duration + rng.gen_range(config.pause_extra_secs.0..=config.pause_extra_secs.1),
        );
        let spin = rng.gen_bool(config.spin_chance).then(|| Command::Spin {
            degrees: *config.spin_degrees.choose(&mut rng).unwrap_or(&90),
            duration: rng.gen_range(config.spin_secs.0..=config.spin_secs.1),
        });
        Self {
            color,
            roll,
            pause,
            spin,
        }
    }
}

struct Running {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Cancellable background producer of random movement. At most one loop runs
/// at a time; starting while running is a no-op, and stop is cooperative,
/// checked between ticks and after each dispatcher call.
pub struct RandomMover {
    dispatcher: Arc<Dispatcher>,
    events: EventBus,
    config: WanderConfig,
    inner: Mutex<Option<Running>>,
}

impl RandomMover {
    pub fn new(dispatcher: Arc<Dispatcher>, events: EventBus, config: WanderConfig) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            events,
            config,
            inner: Mutex::new(None),
        })
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .lock()
            .expect("wander lock poisoned")
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Starts the loop. Returns `false` when a loop is already running, in
    /// which case nothing changes.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut inner = self.inner.lock().expect("wander lock poisoned");
        if inner.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("random movement already running, start is a no-op");
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let mover = self.clone();
        let handle = tokio::spawn(async move {
            mover.run(stop_rx).await;
        });
        *inner = Some(Running { stop, handle });
        drop(inner);

        self.events.random_movement(true);
        self.events.status("Random movement started");
        true
    }

    /// Signals the loop and waits for it to finish. After this returns, the
    /// loop submits nothing further; an in-flight dispatcher call completes
    /// or times out naturally. Finally rolls the toy to a halt, best effort.
    pub async fn stop(&self) {
        let running = self.inner.lock().expect("wander lock poisoned").take();
        let Some(running) = running else {
            return;
        };
        let _ = running.stop.send(true);
        let _ = running.handle.await;

        let _ = self
            .dispatcher
            .submit(Command::Roll {
                heading: 0,
                speed: 0,
                duration: 0.1,
            })
            .await;
    }

    /// Submits one command and reports whether the loop should keep going.
    /// A transient failure (device timeout, device error) is logged and the
    /// loop carries on next tick; losing the connection or the queue
    /// terminates it.
    async fn submit_keep_going(&self, command: Command) -> bool {
        use crate::error::CommandError;
        match self.dispatcher.submit(command).await {
            Ok(message) => {
                tracing::debug!("random movement: {message}");
                true
            }
            Err(e @ (CommandError::NotConnected | CommandError::QueueClosed)) => {
                tracing::warn!("random movement stopping: {e}");
                false
            }
            Err(e) => {
                tracing::warn!("random movement command failed, will retry next tick: {e}");
                true
            }
        }
    }

    async fn run(&self, mut stop: watch::Receiver<bool>) {
        tracing::info!("random movement loop started");
        loop {
            if *stop.borrow() {
                break;
            }
            let tick = Tick::draw(&self.config);

            if let Some(color) = tick.color {
                if !self.submit_keep_going(color).await {
                    break;
                }
            }
            if *stop.borrow() {
                break;
            }

            if !self.submit_keep_going(tick.roll).await {
                break;
            }

            tokio::select! {
                _ = stop.changed() => break,
                _ = tokio::time::sleep(tick.pause) => {}
            }

            if let Some(spin) = tick.spin {
                if *stop.borrow() {
                    break;
                }
                let wait = spin.duration() + Duration::from_secs(1);
                if !self.submit_keep_going(spin).await {
                    break;
                }
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        tracing::info!("random movement loop finished");
        self.events.random_movement(false);
        self.events.status("Random movement stopped");
    }
}
