//! Sampling loop run on each monitor's thread.

use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{KillRequest, MonitorPhase, Shared, Subscriber};
use crate::collector::{self, Procedures};
use crate::driver::{Connection, Connector};
use crate::error::MonitorError;
use crate::model::Snapshot;

/// Connection plus what was learned about it when it was opened.
struct Session {
    connection: Box<dyn Connection>,
    procedures: Procedures,
}

struct Worker {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    session: Option<Session>,
}

enum Step {
    Idle,
    Cycle(Vec<KillRequest>),
    Stop,
}

pub(super) fn run(shared: Arc<Shared>, connector: Arc<dyn Connector>) {
    let mut worker = Worker {
        shared,
        connector,
        session: None,
    };
    loop {
        match worker.next_step() {
            Step::Stop => break,
            Step::Idle => {}
            Step::Cycle(kills) => {
                let outcome = worker.cycle(kills);
                if !worker.publish(outcome) {
                    break;
                }
            }
        }
        worker.sleep();
    }
    worker.shutdown();
}

impl Worker {
    fn next_step(&self) -> Step {
        let mut state = self.shared.lock();
        if !state.running {
            return Step::Stop;
        }
        if state.subscribers.is_empty() {
            if state.phase != MonitorPhase::Idle {
                debug!(key = %self.shared.key, "no subscribers, idling");
            }
            state.phase = MonitorPhase::Idle;
            state.idle_since.get_or_insert_with(Instant::now);
            return Step::Idle;
        }
        // Wake-ups requested before this point are served by this cycle.
        state.wake = false;
        Step::Cycle(state.kills.drain(..).collect())
    }

    fn connection(&mut self) -> Result<&mut Session, MonitorError> {
        if self.session.is_none() {
            self.shared.lock().phase = MonitorPhase::Connecting;
            debug!(key = %self.shared.key, "connecting");
            let mut connection = self.connector.connect(
                &self.shared.key.address,
                self.shared.key.mode,
                &self.shared.credentials,
            )?;
            let procedures = Procedures::list(connection.as_mut());
            self.session = Some(Session {
                connection,
                procedures,
            });
        }
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(MonitorError::Unreachable("no connection".to_string())),
        }
    }

    /// Applies queued kills, then samples.
    fn cycle(&mut self, kills: Vec<KillRequest>) -> Result<Snapshot, MonitorError> {
        let result = self.sample(kills);
        if let Err(e) = &result {
            if e.drops_connection() {
                self.close();
            }
        }
        result
    }

    fn sample(&mut self, kills: Vec<KillRequest>) -> Result<Snapshot, MonitorError> {
        let shared = Arc::clone(&self.shared);
        let session = match self.connection() {
            Ok(session) => session,
            Err(e) => {
                shared.requeue(kills);
                return Err(e);
            }
        };

        if !kills.is_empty() && !session.procedures.supports(collector::KILL_PROCEDURE) {
            warn!(key = %shared.key, count = kills.len(), "server cannot kill queries, requests dropped");
        } else if !kills.is_empty() {
            let mut applied = 0;
            for (i, kill) in kills.iter().enumerate() {
                match collector::kill_query(session.connection.as_mut(), kill.query_id) {
                    Ok(accepted) => applied += usize::from(accepted),
                    Err(e) => {
                        shared.requeue(kills[i..].to_vec());
                        return Err(e);
                    }
                }
            }
            if applied > 0 {
                info!(key = %shared.key, applied, "queries killed");
            }
        }

        let sampled_at = chrono::Utc::now().timestamp_millis();
        collector::read_snapshot(
            session.connection.as_mut(),
            &shared.key.address,
            &mut session.procedures,
            sampled_at,
        )
    }

    /// Stores the outcome and notifies subscribers. Returns false when the
    /// monitor was stopped while the cycle was in flight; nothing is
    /// published then.
    fn publish(&self, outcome: Result<Snapshot, MonitorError>) -> bool {
        let outcome = outcome.map(Arc::new);
        let subscribers: Vec<Arc<dyn Subscriber>> = {
            let mut state = self.shared.lock();
            if !state.running {
                return false;
            }
            state.cycles += 1;
            match &outcome {
                Ok(snapshot) => {
                    state.latest = Some(Arc::clone(snapshot));
                    state.last_error = None;
                    state.phase = MonitorPhase::Sampling;
                }
                Err(e) => {
                    state.latest = None;
                    state.last_error = Some(e.clone());
                    state.phase = MonitorPhase::Error;
                }
            }
            state.subscribers.values().cloned().collect()
        };

        match &outcome {
            Ok(snapshot) => {
                debug!(key = %self.shared.key, subscribers = subscribers.len(), "publishing snapshot");
                for subscriber in &subscribers {
                    subscriber.on_refresh(Some(snapshot));
                }
            }
            Err(e) => {
                warn!(key = %self.shared.key, error = %e, "sampling failed");
                for subscriber in &subscribers {
                    subscriber.on_error(e);
                    subscriber.on_refresh(None);
                }
            }
        }
        true
    }

    /// Waits out the refresh period, returning early when woken.
    fn sleep(&self) {
        let deadline = Instant::now() + self.shared.config.refresh_period;
        let mut state = self.shared.lock();
        while state.running && !state.wake {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .shared
                .signal
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.wake = false;
    }

    fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            debug!(key = %self.shared.key, "closing connection");
            session.connection.close();
        }
    }

    fn shutdown(&mut self) {
        self.close();
        let subscribers = {
            let mut state = self.shared.lock();
            state.phase = MonitorPhase::Stopped;
            std::mem::take(&mut state.subscribers)
        };
        // Subscribers may own the monitor; release them outside the lock.
        drop(subscribers);
        info!(key = %self.shared.key, "monitor stopped");
    }
}
