//! Per-connection flow-control flags.
//!
//! Two independent flags, `incoming` and `outgoing`, move through the
//! sleep/wake handshake. A requester changes its own flag only when the
//! peer acknowledges; a responder changes its flag when it grants.

use chop_frame::Status;

/// State of one flow-control flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Normal,
    Idle,
    /// Terminal. Reached only through a confirmed `ESCAPE`.
    Cancelled,
}

impl FlowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Idle => "idle",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pair of flags owned by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow {
    pub incoming: FlowState,
    pub outgoing: FlowState,
}

impl Flow {
    /// Responder side of `IDLE`. Grants only from `Normal`.
    pub fn grant_idle(&mut self) -> bool {
        if self.incoming == FlowState::Normal {
            self.incoming = FlowState::Idle;
            true
        } else {
            false
        }
    }

    /// Responder side of `WAKEUP`. Grants only from `Idle`.
    pub fn grant_wakeup(&mut self) -> bool {
        if self.incoming == FlowState::Idle {
            self.incoming = FlowState::Normal;
            true
        } else {
            false
        }
    }

    /// Requester side: the peer acknowledged `status`.
    ///
    /// Returns `true` when the acknowledgement completes a disconnect.
    pub fn on_acknowledge(&mut self, status: u8) -> bool {
        match Status::from_byte(status) {
            Some(Status::Escape) => {
                self.cancel();
                true
            }
            _ if self.is_cancelled() => false,
            Some(Status::Wakeup) => {
                self.incoming = FlowState::Normal;
                false
            }
            Some(Status::Idle) => {
                self.incoming = FlowState::Idle;
                false
            }
            _ => false,
        }
    }

    /// Move both flags to the terminal state.
    pub fn cancel(&mut self) {
        self.incoming = FlowState::Cancelled;
        self.outgoing = FlowState::Cancelled;
    }

    pub fn is_cancelled(&self) -> bool {
        self.incoming == FlowState::Cancelled || self.outgoing == FlowState::Cancelled
    }
}
