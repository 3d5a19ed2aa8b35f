//! Out-of-band control events and the bounded session event queue
//!
//! Hardware and measurement contexts (contactor driver, isolation monitor,
//! power-module sampling loop) run outside the protocol thread. They hand
//! their signals to the running session through a bounded FIFO; the session
//! drains exactly one event per state-machine activation, in push order.
//! Pushing past capacity is a caller error, not a silent drop: losing a
//! hardware safety signal must be visible.

use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity of the per-session control event queue.
pub const CONTROL_EVENT_CAPACITY: usize = 32;

/// Contactor position reported by the power path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactorState {
    Open,
    Closed,
}

/// Verdict of the isolation monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Invalid,
    Valid,
    Warning,
    Fault,
}

/// An out-of-band signal injected into the running session.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Contactor feedback from the power path.
    Contactor(ContactorState),
    /// Control-pilot charge permission.
    ChargePermission(bool),
    /// Measured output voltage and current.
    PresentVoltageCurrent { voltage: f32, current: f32 },
    /// Updated available output envelope from the power modules.
    AvailableLimits { max_voltage: f32, max_current: f32 },
    /// Isolation monitor verdict.
    Isolation(IsolationLevel),
    /// The cable check routine finished in the power hardware.
    CableCheckFinished(bool),
    /// Station-side stop request.
    StopRequested,
    /// Hardware fault.
    Fault(String),
}

/// Failure to enqueue a control event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventQueueError {
    /// The queue is full; the producer is outpacing the session loop.
    #[error("control event queue is full")]
    Full,
    /// The session has ended and its queue is gone.
    #[error("control event queue is closed")]
    Closed,
}

/// Create the bounded event queue for one session.
pub fn control_event_channel() -> (ControlEventSender, ControlEventReceiver) {
    let (tx, rx) = mpsc::channel(CONTROL_EVENT_CAPACITY);
    (
        ControlEventSender { tx },
        ControlEventReceiver { rx },
    )
}

/// Producer half, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct ControlEventSender {
    tx: mpsc::Sender<ControlEvent>,
}

impl ControlEventSender {
    /// Enqueue an event without blocking.
    pub fn push(&self, event: ControlEvent) -> Result<(), EventQueueError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EventQueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EventQueueError::Closed,
        })
    }
}

/// Consumer half, owned by the session loop.
#[derive(Debug)]
pub struct ControlEventReceiver {
    rx: mpsc::Receiver<ControlEvent>,
}

impl ControlEventReceiver {
    /// Wait for the next event. Returns `None` once all senders are gone.
    pub async fn next(&mut self) -> Option<ControlEvent> {
        self.rx.recv().await
    }

    /// Drain one event if immediately available.
    pub fn try_next(&mut self) -> Option<ControlEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn preserves_push_order_without_coalescing() {
        let (tx, mut rx) = control_event_channel();
        for voltage in [100.0f32, 200.0, 300.0] {
            tx.push(ControlEvent::PresentVoltageCurrent {
                voltage,
                current: 0.0,
            })
            .unwrap();
        }
        for voltage in [100.0f32, 200.0, 300.0] {
            assert_eq!(
                rx.try_next(),
                Some(ControlEvent::PresentVoltageCurrent {
                    voltage,
                    current: 0.0,
                })
            );
        }
        assert_eq!(rx.try_next(), None);
    }

    #[test]
    fn overflow_is_a_hard_error() {
        let (tx, _rx) = control_event_channel();
        for _ in 0..CONTROL_EVENT_CAPACITY {
            tx.push(ControlEvent::StopRequested).unwrap();
        }
        assert_eq!(
            tx.push(ControlEvent::StopRequested),
            Err(EventQueueError::Full)
        );
    }

    #[test]
    fn push_after_session_end_reports_closed() {
        let (tx, rx) = control_event_channel();
        drop(rx);
        assert_eq!(
            tx.push(ControlEvent::StopRequested),
            Err(EventQueueError::Closed)
        );
    }
}
