//! The readout state machine: tracks position within one readout cycle,
//! driven by the module-header ids seen in the stream.

/// Position within one readout cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForStart,
    InReadout,
    AwaitingEoeForEnd,
    Complete,
}

/// Result of feeding a module id to [`ReadoutStateMachine::is_next_module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleAcceptance {
    /// The header was accepted; a module (possibly a dummy sentinel one) is
    /// now open and its end-of-event is awaited.
    Accepted,
    /// The header was dropped: unknown module, or id not valid in this phase.
    Ignored,
    /// A `START_READOUT` was seen while already inside a readout cycle: the
    /// in-flight event must be discarded and a new cycle begun.
    Restart,
}

/// Tracks `WaitingForStart` / `InReadout` / `AwaitingEoeForEnd` / `Complete`,
/// plus whether a module is currently open and whether it is a dummy
/// (sentinel) module. Preserved across input-buffer boundaries so that an
/// event split between two buffers completes cleanly.
#[derive(Debug, Clone)]
pub struct ReadoutStateMachine {
    phase: Phase,
    start_readout_id: u8,
    end_readout_id: u8,
    in_module: bool,
    dummy_module: bool,
}

impl ReadoutStateMachine {
    pub fn new(start_readout_id: u8, end_readout_id: u8) -> Self {
        ReadoutStateMachine {
            phase: Phase::WaitingForStart,
            start_readout_id,
            end_readout_id,
            in_module: false,
            dummy_module: false,
        }
    }

    /// Resets to `WaitingForStart` and clears the per-cycle flags.
    pub fn begin_readout(&mut self) {
        self.phase = Phase::WaitingForStart;
        self.in_module = false;
        self.dummy_module = false;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// `true` only after a recognized header and until its end-of-event is
    /// consumed.
    pub fn reading_module(&self) -> bool {
        self.in_module
    }

    /// `true` iff the module currently open is the start/end sentinel.
    pub fn current_is_dummy(&self) -> bool {
        self.dummy_module
    }

    /// Feeds an incoming module-header id to the state machine.
    pub fn is_next_module(&mut self, id: u8, known_to_crate_map: bool) -> ModuleAcceptance {
        if id == self.start_readout_id {
            return match self.phase {
                Phase::WaitingForStart => {
                    self.phase = Phase::InReadout;
                    self.in_module = true;
                    self.dummy_module = true;
                    ModuleAcceptance::Accepted
                }
                Phase::InReadout | Phase::AwaitingEoeForEnd => ModuleAcceptance::Restart,
                Phase::Complete => ModuleAcceptance::Ignored,
            };
        }
        if id == self.end_readout_id {
            return match self.phase {
                Phase::InReadout => {
                    self.phase = Phase::AwaitingEoeForEnd;
                    self.in_module = true;
                    self.dummy_module = true;
                    ModuleAcceptance::Accepted
                }
                _ => ModuleAcceptance::Ignored,
            };
        }
        match self.phase {
            Phase::InReadout if known_to_crate_map => {
                self.in_module = true;
                self.dummy_module = false;
                ModuleAcceptance::Accepted
            }
            _ => ModuleAcceptance::Ignored,
        }
    }

    /// Called when an end-of-event word is consumed while `reading_module()`
    /// is true. Closes the current module and, if the end sentinel's own
    /// end-of-event was just consumed, transitions to `Complete`.
    pub fn module_end_of_event(&mut self) {
        self.in_module = false;
        self.dummy_module = false;
        if self.phase == Phase::AwaitingEoeForEnd {
            self.phase = Phase::Complete;
        }
    }
}
