//! Event dispatch: the single entry point for host callbacks.
//!
//! The host may call back into the AI while a previous callback is still
//! running, including from inside a [`crate::host::CommandGateway`] call made
//! by the scheduler itself. [`Engine`] makes that safe:
//!
//! 1. Every event is pushed onto an inbox.
//! 2. The caller then tries to take the core lock. Whoever holds it drains
//!    the inbox until it is empty, one event at a time.
//! 3. A re-entrant or concurrent caller that finds the lock taken returns
//!    straight away; its event is handled by the current holder.
//!
//! No two events are ever interleaved mid-mutation, and a recursive callback
//! can never deadlock on the core lock.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{ConsoleCommand, DiagnosticReport};
use crate::error::AiError;
use crate::goals::WorkflowConfig;
use crate::host::Host;
use crate::scheduler::TaskScheduler;
use crate::units::UnitId;

/// A notification from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    /// A friendly unit was created (construction started).
    UnitCreated {
        /// New unit.
        unit: UnitId,
        /// Its type name.
        unit_type: String,
    },
    /// A friendly unit has no queued action.
    UnitIdle {
        /// Idle unit.
        unit: UnitId,
    },
    /// A friendly unit completed construction.
    UnitFinished {
        /// Finished unit.
        unit: UnitId,
        /// Its type name.
        unit_type: String,
    },
    /// A friendly unit died.
    UnitDestroyed {
        /// Dead unit.
        unit: UnitId,
        /// Killer, if known.
        attacker: Option<UnitId>,
    },
    /// A simulation frame passed.
    Tick,
    /// A chat line was received.
    ChatMessage {
        /// Message text.
        text: String,
        /// Sending player.
        player: u32,
    },
}

/// Outcome of one [`Engine::dispatch`] call.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Events handled by this call, including ones queued by other callers.
    pub processed: usize,
    /// Errors raised while handling them. Each abandoned one decision only.
    pub errors: Vec<AiError>,
}

impl DispatchReport {
    /// Whether the event was queued for another caller to handle.
    #[must_use]
    pub fn deferred(&self) -> bool {
        self.processed == 0
    }
}

struct Core<H> {
    scheduler: TaskScheduler,
    host: H,
}

impl<H: Host> Core<H> {
    fn handle(&mut self, event: HostEvent, errors: &mut Vec<AiError>) {
        match event {
            HostEvent::UnitCreated { unit, unit_type } => {
                self.scheduler.on_unit_created(&mut self.host, unit, &unit_type);
            }
            HostEvent::UnitIdle { unit } => {
                if let Err(err) = self.scheduler.on_unit_idle(&mut self.host, unit) {
                    errors.push(err);
                }
            }
            HostEvent::UnitFinished { unit, unit_type } => {
                let result = self.scheduler.on_unit_finished(&mut self.host, unit, &unit_type);
                if let Err(err) = result {
                    errors.push(err);
                }
            }
            HostEvent::UnitDestroyed { unit, attacker } => {
                self.scheduler.on_unit_destroyed(unit, attacker);
            }
            HostEvent::Tick => errors.extend(self.scheduler.on_tick(&mut self.host)),
            HostEvent::ChatMessage { text, player } => self.handle_chat(&text, player),
        }
    }

    fn handle_chat(&mut self, text: &str, player: u32) {
        let config = self.scheduler.config();
        if !config.debug_commands {
            return;
        }
        let Some(command) = ConsoleCommand::parse(text, config.team) else {
            return;
        };
        tracing::info!(player, ?command, "operator command");
        let lines = match command {
            ConsoleCommand::DumpWorkflow => DiagnosticReport::capture(&self.scheduler).lines(),
            ConsoleCommand::Help => vec![ConsoleCommand::help_text(config.team)],
        };
        for line in lines {
            tracing::info!("{line}");
            self.host.send_text(&line);
        }
    }
}

/// Re-entrancy-safe owner of the scheduler and host binding.
pub struct Engine<H> {
    inbox: Mutex<VecDeque<HostEvent>>,
    core: Mutex<Core<H>>,
}

impl<H: Host> Engine<H> {
    /// Create an engine. Call [`Engine::activate`] once the host is ready.
    pub fn new(config: WorkflowConfig, host: H) -> Self {
        Self {
            inbox: Mutex::new(VecDeque::new()),
            core: Mutex::new(Core {
                scheduler: TaskScheduler::new(config),
                host,
            }),
        }
    }

    /// Load existing units and run the first idle sweep.
    ///
    /// Events the host delivers during the sweep are handled before this
    /// returns; their errors follow the sweep's own.
    pub fn activate(&self) -> Vec<AiError> {
        let mut errors = {
            let mut core = self.core.lock();
            let Core { scheduler, host } = &mut *core;
            let mut errors = scheduler.activate(host);
            self.drain_held(&mut core, &mut errors);
            errors
        };
        if !self.inbox.lock().is_empty() {
            errors.extend(self.drain().errors);
        }
        errors
    }

    /// Deliver one host event.
    ///
    /// Safe to call re-entrantly: if another call is already draining, the
    /// event is queued and this call returns a deferred report.
    pub fn dispatch(&self, event: HostEvent) -> DispatchReport {
        self.inbox.lock().push_back(event);
        self.drain()
    }

    fn drain(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        loop {
            let Some(mut core) = self.core.try_lock() else {
                return report;
            };
            report.processed += self.drain_held(&mut core, &mut report.errors);
            drop(core);

            // An event pushed between the final pop and the unlock would
            // otherwise be stranded.
            if self.inbox.lock().is_empty() {
                return report;
            }
        }
    }

    fn drain_held(&self, core: &mut Core<H>, errors: &mut Vec<AiError>) -> usize {
        let mut processed = 0;
        loop {
            // The inbox lock is released before the event is handled.
            let next = self.inbox.lock().pop_front();
            let Some(event) = next else {
                return processed;
            };
            core.handle(event, errors);
            processed += 1;
        }
    }

    /// Consistent snapshot of goals, orders and assist state.
    ///
    /// Must not be called from inside a host callback that is itself
    /// running under [`Engine::dispatch`].
    pub fn snapshot(&self) -> DiagnosticReport {
        DiagnosticReport::capture(&self.core.lock().scheduler)
    }

    /// Run `f` with exclusive access to the host binding.
    pub fn with_host<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(&mut self.core.lock().host)
    }

    /// Number of events waiting in the inbox.
    pub fn pending_events(&self) -> usize {
        self.inbox.lock().len()
    }

    /// Tear down and return the host binding.
    pub fn into_host(self) -> H {
        self.core.into_inner().host
    }
}
