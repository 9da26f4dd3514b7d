use crate::command::Command;
use crate::device::{DeviceLink, LinkError};
use crate::error::CommandError;
use crate::events::EventBus;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Outcome of one submission: a human-readable success message or a typed
/// failure. Mirrored to the fanout as a status event either way.
pub type DispatchResult = Result<String, CommandError>;

/// Runtime-adjustable safety caps, matching the original controller: roll
/// speed is clamped and LED colors are scaled down before reaching the toy.
pub struct Limits {
    max_speed: AtomicU8,
    max_brightness: AtomicU8,
}

impl Limits {
    pub fn new(max_speed: u8, max_brightness: u8) -> Self {
        Self {
            max_speed: AtomicU8::new(max_speed),
            max_brightness: AtomicU8::new(max_brightness),
        }
    }

    pub fn max_speed(&self) -> u8 {
        self.max_speed.load(Ordering::Relaxed)
    }

    pub fn max_brightness(&self) -> u8 {
        self.max_brightness.load(Ordering::Relaxed)
    }

    pub fn set_max_speed(&self, value: u8) {
        self.max_speed.store(value, Ordering::Relaxed);
    }

    pub fn set_brightness_limit(&self, value: u8) {
        self.max_brightness.store(value, Ordering::Relaxed);
    }

    /// Applies the caps to a validated command.
    fn apply(&self, command: &Command) -> Command {
        match *command {
            Command::Roll {
                heading,
                speed,
                duration,
            } => Command::Roll {
                heading,
                speed: speed.min(self.max_speed() as u16),
                duration,
            },
            Command::SetColor { r, g, b } => {
                let factor = self.max_brightness() as f32 / 255.0;
                let scale = |v: u16| ((v as f32 * factor) as u16).min(255);
                Command::SetColor {
                    r: scale(r),
                    g: scale(g),
                    b: scale(b),
                }
            }
            Command::Spin { .. } => command.clone(),
        }
    }
}

struct Job {
    command: Command,
    reply: oneshot::Sender<DispatchResult>,
}

/// The serialization point. All producers submit here; a single worker task
/// owns the device link, so at most one command is ever in flight against
/// the toy. Submissions are served strictly in arrival order.
pub struct Dispatcher {
    queue: mpsc::Sender<Job>,
    connected: watch::Receiver<bool>,
    limits: Arc<Limits>,
}

impl Dispatcher {
    /// Spawns the worker that owns the link. Returns the dispatcher and a
    /// channel that fires whenever the adapter reports link loss, for the
    /// orchestrator to consume.
    pub fn spawn(
        link: Arc<dyn DeviceLink>,
        connected: watch::Receiver<bool>,
        limits: Arc<Limits>,
        events: EventBus,
        command_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
        let (queue, mut rx) = mpsc::channel::<Job>(64);
        let (loss_tx, loss_rx) = mpsc::unbounded_channel();

        let worker_connected = connected.clone();
        let worker_limits = limits.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = Self::run_one(
                    &*link,
                    &worker_connected,
                    &worker_limits,
                    command_timeout,
                    &loss_tx,
                    &job.command,
                )
                .await;

                match &result {
                    Ok(message) => events.status(message.clone()),
                    Err(e) => events.status(format!("Command failed: {e}")),
                }
                // The producer may have gone away; the result is still
                // accounted for.
                let _ = job.reply.send(result);
            }
            tracing::debug!("dispatcher worker stopped");
        });

        (
            Arc::new(Self {
                queue,
                connected,
                limits,
            }),
            loss_rx,
        )
    }

    async fn run_one(
        link: &dyn DeviceLink,
        connected: &watch::Receiver<bool>,
        limits: &Limits,
        command_timeout: Duration,
        loss_tx: &mpsc::UnboundedSender<()>,
        command: &Command,
    ) -> DispatchResult {
        // The connection may have dropped while this command sat in the
        // queue.
        if !*connected.borrow() {
            return Err(CommandError::NotConnected);
        }

        let effective = limits.apply(command);
        match tokio::time::timeout(command_timeout, link.execute(&effective)).await {
            Ok(Ok(())) => Ok(effective.describe()),
            Ok(Err(LinkError::LinkLost)) => {
                let _ = loss_tx.send(());
                Err(CommandError::DeviceError(LinkError::LinkLost.to_string()))
            }
            Ok(Err(e)) => Err(CommandError::DeviceError(e.to_string())),
            // A hung transport must not wedge the queue; the timed-out call
            // releases the slot for the next command.
            Err(_) => Err(CommandError::DeviceTimeout),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Submits one command. Blocks the caller only for this command's own
    /// validation, queue slot, and completion or timeout; commands from
    /// other producers interleave at FIFO granularity.
    pub async fn submit(&self, command: Command) -> DispatchResult {
        command.validate()?;

        // Fail fast instead of queueing behind a connection that does not
        // exist.
        if !*self.connected.borrow() {
            return Err(CommandError::NotConnected);
        }

        let (reply, result) = oneshot::channel();
        self.queue
            .send(Job { command, reply })
            .await
            .map_err(|_| CommandError::QueueClosed)?;
        result.await.map_err(|_| CommandError::QueueClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{LinkError, MockDeviceLink};
    use std::sync::Mutex;

    fn connected_flag(value: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(value)
    }

    fn limits() -> Arc<Limits> {
        // Wide-open caps so tests observe commands unmodified.
        Arc::new(Limits::new(255, 255))
    }

    fn roll() -> Command {
        Command::Roll {
            heading: 90,
            speed: 200,
            duration: 0.01,
        }
    }

    #[tokio::test]
    async fn submit_while_disconnected_fails_fast_without_device_call() {
        let mut link = MockDeviceLink::new();
        link.expect_execute().times(0);
        let (_tx, rx) = connected_flag(false);
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_secs(1),
        );

        assert_eq!(dispatcher.submit(roll()).await, Err(CommandError::NotConnected));
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_the_adapter() {
        let mut link = MockDeviceLink::new();
        link.expect_execute().times(0);
        let (_tx, rx) = connected_flag(true);
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_secs(1),
        );

        let result = dispatcher
            .submit(Command::SetColor { r: 300, g: 0, b: 0 })
            .await;
        assert!(matches!(result, Err(CommandError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn connected_roll_dispatches_then_disconnect_fails() {
        let mut link = MockDeviceLink::new();
        link.expect_execute()
            .times(1)
            .returning(|_| Box::pin(async { Ok(()) }));
        let (tx, rx) = connected_flag(true);
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_secs(1),
        );

        let ok = dispatcher.submit(roll()).await.unwrap();
        assert_eq!(ok, "Rolling with heading 90, speed 200");

        tx.send(false).unwrap();
        assert_eq!(dispatcher.submit(roll()).await, Err(CommandError::NotConnected));
    }

    #[tokio::test]
    async fn hung_device_call_times_out_and_frees_the_queue() {
        let mut link = MockDeviceLink::new();
        let mut first = true;
        link.expect_execute().returning(move |_| {
            if std::mem::take(&mut first) {
                Box::pin(std::future::pending())
            } else {
                Box::pin(async { Ok(()) })
            }
        });
        let (_tx, rx) = connected_flag(true);
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_millis(50),
        );

        assert_eq!(dispatcher.submit(roll()).await, Err(CommandError::DeviceTimeout));
        // The slot is released; the next command goes through.
        assert!(dispatcher.submit(roll()).await.is_ok());
    }

    #[tokio::test]
    async fn link_loss_is_reported_on_the_loss_channel() {
        let mut link = MockDeviceLink::new();
        link.expect_execute()
            .returning(|_| Box::pin(async { Err(LinkError::LinkLost) }));
        let (_tx, rx) = connected_flag(true);
        let (dispatcher, mut loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_secs(1),
        );

        assert!(matches!(
            dispatcher.submit(roll()).await,
            Err(CommandError::DeviceError(_))
        ));
        assert!(loss.recv().await.is_some());
    }

    #[tokio::test]
    async fn caps_clamp_speed_and_scale_brightness() {
        let seen: Arc<Mutex<Vec<Command>>> = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut link = MockDeviceLink::new();
        link.expect_execute().returning(move |command| {
            record.lock().unwrap().push(command.clone());
            Box::pin(async { Ok(()) })
        });
        let (_tx, rx) = connected_flag(true);
        let caps = Arc::new(Limits::new(30, 51));
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            caps,
            EventBus::new(8),
            Duration::from_secs(1),
        );

        dispatcher.submit(roll()).await.unwrap();
        dispatcher
            .submit(Command::SetColor { r: 255, g: 0, b: 100 })
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0],
            Command::Roll {
                heading: 90,
                speed: 30,
                duration: 0.01
            }
        );
        // 51/255 = 0.2 brightness factor.
        assert_eq!(seen[1], Command::SetColor { r: 51, g: 0, b: 20 });
    }

    #[tokio::test]
    async fn producers_observe_fifo_order() {
        let seen: Arc<Mutex<Vec<Command>>> = Arc::new(Mutex::new(Vec::new()));
        let record = seen.clone();
        let mut link = MockDeviceLink::new();
        link.expect_execute().returning(move |command| {
            record.lock().unwrap().push(command.clone());
            Box::pin(async { Ok(()) })
        });
        let (_tx, rx) = connected_flag(true);
        let (dispatcher, _loss) = Dispatcher::spawn(
            Arc::new(link),
            rx,
            limits(),
            EventBus::new(8),
            Duration::from_secs(1),
        );

        // Two producers, each submitting an ordered run of headings.
        let a = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for heading in [0u16, 1, 2] {
                    dispatcher
                        .submit(Command::Roll {
                            heading,
                            speed: 50,
                            duration: 0.001,
                        })
                        .await
                        .unwrap();
                }
            })
        };
        let b = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                for heading in [100u16, 101, 102] {
                    dispatcher
                        .submit(Command::Roll {
                            heading,
                            speed: 50,
                            duration: 0.001,
                        })
                        .await
                        .unwrap();
                }
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        let headings: Vec<u16> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|c| match c {
                Command::Roll { heading, .. } => *heading,
                _ => panic!("unexpected command"),
            })
            .collect();
        // Interleaving is allowed; reordering within a producer is not.
        let a_order: Vec<u16> = headings.iter().copied().filter(|h| *h < 100).collect();
        let b_order: Vec<u16> = headings.iter().copied().filter(|h| *h >= 100).collect();
        assert_eq!(a_order, vec![0, 1, 2]);
        assert_eq!(b_order, vec![100, 101, 102]);
    }
}
