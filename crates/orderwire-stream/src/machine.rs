//! Connection state machine.
//!
//! [`StreamSession::handle`] is a pure transition function: it takes an
//! [`Event`], updates the session and returns the [`Effect`]s the driver
//! must carry out. It never touches sockets or timers itself, which keeps
//! every reconnect rule testable without I/O.

use orderwire_core::RelayError;

/// Lifecycle of the stream connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and nothing scheduled.
    #[default]
    Idle,
    /// Socket handshake in progress.
    Connecting,
    /// Socket open, keepalive running.
    Open,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Manual close in progress.
    Closing,
}

/// Inputs to the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `connect()` was called.
    Connect {
        /// Whether a token was available.
        has_token: bool,
    },
    /// The socket finished its handshake.
    Opened,
    /// The socket closed, failed to open or errored.
    Closed,
    /// The reconnect timer fired.
    ReconnectDue {
        /// Whether a token was available.
        has_token: bool,
    },
    /// The bridge refused the upgrade because the request carried no token.
    ///
    /// Other policy-violation closes are plain [`Event::Closed`].
    Rejected {
        /// Close reason sent by the bridge.
        reason: String,
    },
    /// `disconnect()` was called.
    Disconnect,
}

/// Work the driver performs after a transition, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Open a new socket, superseding any previous one.
    OpenSocket,
    /// Close the current socket.
    CloseSocket,
    /// Start the keepalive timer.
    StartPing,
    /// Stop the keepalive timer.
    StopPing,
    /// Arm the reconnect timer.
    ScheduleReconnect,
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Tell connection subscribers about a change.
    NotifyConnection(bool),
    /// Tell error subscribers.
    NotifyError(RelayError),
}

/// Connection bookkeeping owned by the driver.
#[derive(Clone, Debug)]
pub struct StreamSession {
    state: ConnectionState,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
    is_manual_close: bool,
}

impl StreamSession {
    /// Idle session allowing `max_reconnect_attempts` consecutive retries.
    pub fn new(max_reconnect_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            is_manual_close: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether the last close was requested by the caller.
    pub fn is_manual_close(&self) -> bool {
        self.is_manual_close
    }

    /// Apply `event` and return the effects to execute.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        use ConnectionState as S;

        match (self.state, event) {
            (S::Open | S::Connecting, Event::Connect { .. }) => Vec::new(),
            (_, Event::Connect { has_token: false }) => {
                vec![Effect::NotifyError(RelayError::unauthorized(
                    "no access token available for the order stream",
                ))]
            }
            (S::Idle | S::Closing, Event::Connect { has_token: true }) => {
                self.reconnect_attempts = 0;
                self.is_manual_close = false;
                self.state = S::Connecting;
                vec![Effect::OpenSocket]
            }
            (S::Reconnecting, Event::Connect { has_token: true }) => {
                self.is_manual_close = false;
                self.state = S::Connecting;
                vec![Effect::CancelReconnect, Effect::OpenSocket]
            }

            (S::Connecting, Event::Opened) => {
                self.reconnect_attempts = 0;
                self.state = S::Open;
                vec![Effect::StartPing, Effect::NotifyConnection(true)]
            }
            (_, Event::Opened) => Vec::new(),

            (S::Closing, Event::Closed | Event::Rejected { .. }) => {
                self.state = S::Idle;
                Vec::new()
            }
            (S::Connecting | S::Open, Event::Closed) => {
                let mut effects = Vec::new();
                if self.state == S::Open {
                    effects.push(Effect::StopPing);
                    effects.push(Effect::NotifyConnection(false));
                }
                if self.reconnect_attempts < self.max_reconnect_attempts {
                    self.reconnect_attempts += 1;
                    self.state = S::Reconnecting;
                    effects.push(Effect::ScheduleReconnect);
                } else {
                    self.state = S::Idle;
                    effects.push(Effect::NotifyError(RelayError::MaxReconnectExceeded {
                        attempts: self.reconnect_attempts,
                    }));
                }
                effects
            }
            (S::Idle | S::Reconnecting, Event::Closed) => Vec::new(),

            (S::Connecting | S::Open, Event::Rejected { reason }) => {
                let mut effects = Vec::new();
                if self.state == S::Open {
                    effects.push(Effect::StopPing);
                    effects.push(Effect::NotifyConnection(false));
                }
                self.state = S::Idle;
                effects.push(Effect::NotifyError(RelayError::UpgradeRejected { reason }));
                effects
            }
            (S::Idle | S::Reconnecting, Event::Rejected { .. }) => Vec::new(),

            (S::Reconnecting, Event::ReconnectDue { has_token: true }) => {
                self.state = S::Connecting;
                vec![Effect::OpenSocket]
            }
            (S::Reconnecting, Event::ReconnectDue { has_token: false }) => {
                self.state = S::Idle;
                vec![Effect::NotifyError(RelayError::unauthorized(
                    "access token cleared before reconnect",
                ))]
            }
            (_, Event::ReconnectDue { .. }) => Vec::new(),

            (state, Event::Disconnect) => {
                self.is_manual_close = true;
                match state {
                    S::Open => {
                        self.state = S::Closing;
                        vec![
                            Effect::StopPing,
                            Effect::CloseSocket,
                            Effect::NotifyConnection(false),
                        ]
                    }
                    S::Connecting => {
                        self.state = S::Closing;
                        vec![Effect::CloseSocket]
                    }
                    S::Reconnecting => {
                        self.state = S::Idle;
                        vec![Effect::CancelReconnect]
                    }
                    S::Idle | S::Closing => Vec::new(),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState as S;

    const CONNECT: Event = Event::Connect { has_token: true };
    const DUE: Event = Event::ReconnectDue { has_token: true };

    fn open_session() -> StreamSession {
        let mut session = StreamSession::new(5);
        let _ = session.handle(CONNECT);
        let _ = session.handle(Event::Opened);
        session
    }

    // ── connect ──

    #[test]
    fn connect_from_idle_opens_socket() {
        let mut session = StreamSession::new(5);
        assert_eq!(session.handle(CONNECT), vec![Effect::OpenSocket]);
        assert_eq!(session.state(), S::Connecting);
        assert!(!session.is_manual_close());
    }

    #[test]
    fn connect_while_open_or_connecting_is_noop() {
        let mut session = open_session();
        assert!(session.handle(CONNECT).is_empty());
        assert_eq!(session.state(), S::Open);

        let mut session = StreamSession::new(5);
        let _ = session.handle(CONNECT);
        assert!(session.handle(CONNECT).is_empty());
        assert_eq!(session.state(), S::Connecting);
    }

    #[test]
    fn connect_without_token_reports_unauthorized() {
        let mut session = StreamSession::new(5);
        let effects = session.handle(Event::Connect { has_token: false });
        assert!(matches!(
            effects.as_slice(),
            [Effect::NotifyError(RelayError::Unauthorized { .. })]
        ));
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn connect_during_reconnect_keeps_attempts() {
        let mut session = open_session();
        let _ = session.handle(Event::Closed);
        assert_eq!(session.reconnect_attempts(), 1);

        let effects = session.handle(CONNECT);
        assert_eq!(effects, vec![Effect::CancelReconnect, Effect::OpenSocket]);
        assert_eq!(session.reconnect_attempts(), 1);
        assert_eq!(session.state(), S::Connecting);
    }

    // ── open / close ──

    #[test]
    fn open_starts_ping_and_notifies() {
        let mut session = StreamSession::new(5);
        let _ = session.handle(CONNECT);
        assert_eq!(
            session.handle(Event::Opened),
            vec![Effect::StartPing, Effect::NotifyConnection(true)]
        );
        assert_eq!(session.state(), S::Open);
    }

    #[test]
    fn drop_while_open_schedules_reconnect() {
        let mut session = open_session();
        assert_eq!(
            session.handle(Event::Closed),
            vec![
                Effect::StopPing,
                Effect::NotifyConnection(false),
                Effect::ScheduleReconnect
            ]
        );
        assert_eq!(session.state(), S::Reconnecting);
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut session = open_session();
        let _ = session.handle(Event::Closed);
        let _ = session.handle(DUE);
        let _ = session.handle(Event::Closed);
        assert_eq!(session.reconnect_attempts(), 2);

        let _ = session.handle(DUE);
        let _ = session.handle(Event::Opened);
        assert_eq!(session.reconnect_attempts(), 0);
    }

    #[test]
    fn stale_events_ignored() {
        let mut session = StreamSession::new(5);
        assert!(session.handle(Event::Opened).is_empty());
        assert!(session.handle(Event::Closed).is_empty());
        assert!(session.handle(DUE).is_empty());
        assert_eq!(session.state(), S::Idle);
    }

    // ── reconnect bound ──

    #[test]
    fn sixth_close_exhausts_reconnects() {
        let mut session = StreamSession::new(5);
        let _ = session.handle(CONNECT);

        for attempt in 1..=5 {
            assert_eq!(session.handle(Event::Closed), vec![Effect::ScheduleReconnect]);
            assert_eq!(session.reconnect_attempts(), attempt);
            assert_eq!(session.handle(DUE), vec![Effect::OpenSocket]);
        }

        let effects = session.handle(Event::Closed);
        assert_eq!(
            effects,
            vec![Effect::NotifyError(RelayError::MaxReconnectExceeded {
                attempts: 5
            })]
        );
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn zero_attempts_gives_up_immediately() {
        let mut session = StreamSession::new(0);
        let _ = session.handle(CONNECT);
        assert!(matches!(
            session.handle(Event::Closed).as_slice(),
            [Effect::NotifyError(RelayError::MaxReconnectExceeded {
                attempts: 0
            })]
        ));
    }

    #[test]
    fn reconnect_without_token_gives_up() {
        let mut session = open_session();
        let _ = session.handle(Event::Closed);
        let effects = session.handle(Event::ReconnectDue { has_token: false });
        assert!(matches!(
            effects.as_slice(),
            [Effect::NotifyError(RelayError::Unauthorized { .. })]
        ));
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn policy_close_is_terminal() {
        let mut session = open_session();
        let effects = session.handle(Event::Rejected {
            reason: "No authorization token provided".into(),
        });
        assert_eq!(
            effects,
            vec![
                Effect::StopPing,
                Effect::NotifyConnection(false),
                Effect::NotifyError(RelayError::UpgradeRejected {
                    reason: "No authorization token provided".into()
                })
            ]
        );
        assert_eq!(session.state(), S::Idle);
        assert_eq!(session.reconnect_attempts(), 0);
    }

    // ── disconnect ──

    #[test]
    fn disconnect_while_open_closes_socket() {
        let mut session = open_session();
        assert_eq!(
            session.handle(Event::Disconnect),
            vec![
                Effect::StopPing,
                Effect::CloseSocket,
                Effect::NotifyConnection(false)
            ]
        );
        assert_eq!(session.state(), S::Closing);
        assert!(session.is_manual_close());

        assert!(session.handle(Event::Closed).is_empty());
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn disconnect_while_reconnecting_cancels_timer() {
        let mut session = open_session();
        let _ = session.handle(Event::Closed);
        assert_eq!(session.handle(Event::Disconnect), vec![Effect::CancelReconnect]);
        assert_eq!(session.state(), S::Idle);

        // A timer that slipped through is ignored.
        assert!(session.handle(DUE).is_empty());
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn disconnect_while_connecting() {
        let mut session = StreamSession::new(5);
        let _ = session.handle(CONNECT);
        assert_eq!(session.handle(Event::Disconnect), vec![Effect::CloseSocket]);
        assert_eq!(session.state(), S::Closing);

        // The aborted handshake does not trigger a reconnect.
        assert!(session.handle(Event::Closed).is_empty());
        assert_eq!(session.state(), S::Idle);
    }

    #[test]
    fn connect_after_disconnect_starts_fresh() {
        let mut session = open_session();
        let _ = session.handle(Event::Closed);
        let _ = session.handle(Event::Disconnect);

        assert_eq!(session.handle(CONNECT), vec![Effect::OpenSocket]);
        assert_eq!(session.reconnect_attempts(), 0);
        assert!(!session.is_manual_close());
    }

    // ── timer invariants ──

    /// Tracks which timers the effects would leave running.
    #[derive(Default)]
    struct Timers {
        ping: bool,
        reconnect: bool,
    }

    impl Timers {
        fn apply(&mut self, effects: &[Effect]) {
            for effect in effects {
                match effect {
                    Effect::StartPing => self.ping = true,
                    Effect::StopPing => self.ping = false,
                    Effect::ScheduleReconnect => self.reconnect = true,
                    Effect::CancelReconnect => self.reconnect = false,
                    _ => {}
                }
            }
        }
    }

    const EVENTS: [Event; 8] = [
        Event::Connect { has_token: true },
        Event::Connect { has_token: false },
        Event::Opened,
        Event::Closed,
        Event::ReconnectDue { has_token: true },
        Event::ReconnectDue { has_token: false },
        Event::Rejected {
            reason: String::new(),
        },
        Event::Disconnect,
    ];

    fn check_all_sequences(session: &StreamSession, timers: &Timers, depth: usize) {
        if depth == 0 {
            return;
        }
        for event in EVENTS {
            let mut session = session.clone();
            let mut timers = Timers {
                ping: timers.ping,
                reconnect: timers.reconnect,
            };
            if matches!(event, Event::ReconnectDue { .. }) {
                // A fired timer is spent.
                timers.reconnect = false;
            }
            let effects = session.handle(event.clone());
            timers.apply(&effects);

            assert_eq!(
                timers.ping,
                session.state() == S::Open,
                "ping timer out of sync after {event:?}"
            );
            assert_eq!(
                timers.reconnect,
                session.state() == S::Reconnecting,
                "reconnect timer out of sync after {event:?}"
            );
            assert!(session.reconnect_attempts() <= 2);
            check_all_sequences(&session, &timers, depth - 1);
        }
    }

    #[test]
    fn timers_track_state_for_every_event_sequence() {
        check_all_sequences(&StreamSession::new(2), &Timers::default(), 5);
    }
}
