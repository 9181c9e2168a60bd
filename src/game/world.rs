//! World module
//!
//! Runs the fixed-cadence tick loop. Each tick snapshots the session registry
//! and ticks every session in turn on this task, so no session is ever ticked
//! concurrently with itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Ticks between milestone log lines
const MILESTONE_TICKS: u64 = 1200;

/// Tick scheduler
pub struct World {
    state: Arc<AppState>,
    tick: AtomicU64,
    running: AtomicBool,
}

impl World {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            tick: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Number of ticks run so far
    pub fn tick_count(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the tick loop until `shutdown_rx` fires
    pub async fn run(&self, shutdown_rx: &mut broadcast::Receiver<()>) {
        let tick_rate_ms = self.state.config.tick_rate_ms;
        info!(tick_rate_ms, "Starting world tick loop");

        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();

        let mut tick_interval = interval(Duration::from_millis(tick_rate_ms));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let begin = Instant::now();
                    self.tick();

                    let elapsed = begin.elapsed();
                    if elapsed > Duration::from_millis(tick_rate_ms) {
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            tick_rate_ms,
                            "Tick overran its budget"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown();
        self.running.store(false, Ordering::SeqCst);
        info!(
            total_ticks = self.tick_count(),
            uptime_secs = started.elapsed().as_secs(),
            "World tick loop stopped"
        );
    }

    /// Run one tick over every registered session
    pub fn tick(&self) {
        let tick_num = self.tick.fetch_add(1, Ordering::SeqCst);

        let sessions = self.state.sessions.snapshot();
        for session in &sessions {
            session.tick(&self.state);
        }

        if tick_num % MILESTONE_TICKS == 0 {
            debug!(
                tick = tick_num,
                sessions = sessions.len(),
                players = self.state.players.count(),
                "World tick milestone"
            );
        }
    }

    /// Tear down every session still registered
    fn shutdown(&self) {
        let sessions = self.state.sessions.snapshot();
        info!(count = sessions.len(), "Disconnecting all sessions");
        for session in sessions {
            session.disconnect(&self.state, "Server closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{login, play, ClientboundMessage};
    use crate::testing::{test_state, TestClient};

    #[test]
    fn test_tick_reaches_every_session() {
        let state = test_state(true);
        let world = World::new(state.app());
        let mut first = TestClient::connect(&state);
        let mut second = TestClient::connect(&state);
        first.login_phase();
        second.login_phase();

        first
            .send(login::LoginStart {
                name: "First".into(),
            })
            .unwrap();
        second
            .send(login::LoginStart {
                name: "Second".into(),
            })
            .unwrap();

        world.tick();
        world.tick();

        assert_eq!(world.tick_count(), 2);
        assert_eq!(state.players.count(), 2);
        assert!(first
            .receive()
            .iter()
            .any(|m| matches!(m, ClientboundMessage::LoginSuccess(_))));
        assert!(second
            .receive()
            .iter()
            .any(|m| matches!(m, ClientboundMessage::LoginSuccess(_))));
    }

    #[test]
    fn test_closed_transport_torn_down_on_tick() {
        let state = test_state(true);
        let world = World::new(state.app());
        let mut client = TestClient::connect(&state);
        client.login(&state, "Steve");

        client.session.on_transport_closed();
        world.tick();

        assert_eq!(state.sessions.count(), 0);
        assert_eq!(state.players.count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let state = test_state(true);
        let mut client = TestClient::connect(&state);
        client.login(&state, "Steve");

        let world = Arc::new(World::new(state.app()));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let runner = {
            let world = world.clone();
            tokio::spawn(async move { world.run(&mut shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();
        runner.await.unwrap();

        assert!(!world.is_running());
        assert!(world.tick_count() >= 1);
        assert_eq!(state.sessions.count(), 0);
        assert!(client.receive().contains(&ClientboundMessage::Disconnect(
            play::Disconnect::new("Server closed")
        )));
    }
}
