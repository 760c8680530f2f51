//! Agents and the runner thread that drives them.
//!
//! An agent is a unit of work driven by repeatedly calling `do_work`; it is
//! expected to return promptly. The runner idles between unproductive ticks
//! and terminates when the agent reports a closed or fatal condition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::context::ErrorHandler;
use crate::error::{ClientError, Result};
use crate::idle::IdleStrategy;

/// A unit of work driven by an external runner.
pub trait Agent: Send {
    /// Name used for the runner thread.
    fn role_name(&self) -> &str;

    /// One tick. Returns the amount of work done; `Err(Closed)` signals
    /// orderly termination, any other error is reported and terminates the
    /// runner.
    fn do_work(&mut self) -> Result<usize>;
}

/// Runs an [`Agent`] on a dedicated thread until it terminates or is stopped.
pub struct AgentRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AgentRunner {
    pub fn start<A: Agent + 'static>(
        mut agent: A,
        idle: IdleStrategy,
        error_handler: ErrorHandler,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_flag = running.clone();

        let handle = std::thread::Builder::new()
            .name(agent.role_name().to_string())
            .spawn(move || {
                tracing::debug!("agent runner started");
                while thread_flag.load(Ordering::Acquire) {
                    match agent.do_work() {
                        Ok(work_count) => idle.idle_for(work_count),
                        Err(ClientError::Closed) => break,
                        Err(error) => {
                            error_handler(&error);
                            break;
                        }
                    }
                }
                tracing::debug!("agent runner stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Ask the runner to stop and join the thread. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AgentRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CountingAgent {
        ticks: Arc<Mutex<usize>>,
        fail_after: Option<usize>,
    }

    impl Agent for CountingAgent {
        fn role_name(&self) -> &str {
            "counting-agent"
        }

        fn do_work(&mut self) -> Result<usize> {
            let mut ticks = self.ticks.lock().unwrap();
            *ticks += 1;
            if let Some(limit) = self.fail_after
                && *ticks > limit
            {
                return Err(ClientError::Closed);
            }
            Ok(1)
        }
    }

    #[test]
    fn runner_drives_agent_until_stopped() {
        let ticks = Arc::new(Mutex::new(0));
        let agent = CountingAgent {
            ticks: ticks.clone(),
            fail_after: None,
        };

        let mut runner =
            AgentRunner::start(agent, IdleStrategy::Yield, Arc::new(|_| {})).unwrap();
        while *ticks.lock().unwrap() < 3 {
            std::thread::yield_now();
        }
        runner.stop();

        let after_stop = *ticks.lock().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(*ticks.lock().unwrap(), after_stop);
    }

    #[test]
    fn closed_agent_terminates_runner_silently() {
        let ticks = Arc::new(Mutex::new(0));
        let errors = Arc::new(Mutex::new(0usize));
        let errors_in_handler = errors.clone();
        let agent = CountingAgent {
            ticks: ticks.clone(),
            fail_after: Some(2),
        };

        let mut runner = AgentRunner::start(
            agent,
            IdleStrategy::Yield,
            Arc::new(move |_| *errors_in_handler.lock().unwrap() += 1),
        )
        .unwrap();

        while *ticks.lock().unwrap() < 3 {
            std::thread::yield_now();
        }
        runner.stop();

        assert_eq!(*errors.lock().unwrap(), 0);
    }
}
