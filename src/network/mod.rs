//! Network management and the node control loop
//!
//! This module owns the UDP socket, the operator console and the
//! single-threaded poll loop that feeds them to the protocol engine and
//! carries out the effects it emits.

mod connection;
mod console;

pub use self::connection::ChatSocket;
pub use self::console::{Console, LogIndicator, StatusIndicator};

use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::core::{Config, Error, Result};
use crate::protocol::{Effect, Outbox, ProtocolState};
use crate::util::Uptime;

/// Finds the local address used to reach `toward`
pub fn detect_local_ip(toward: SocketAddr) -> Result<IpAddr> {
    let unspecified = match toward {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let probe = std::net::UdpSocket::bind(unspecified)?;
    probe
        .connect(toward)
        .map_err(|e| Error::network(format!("No route towards {}: {}", toward, e)))?;
    Ok(probe.local_addr()?.ip())
}

/// A chat device: socket, console and protocol engine driven by one loop
pub struct Node<W: Write = io::Stdout> {
    state: ProtocolState,
    effects: mpsc::UnboundedReceiver<Effect>,
    socket: ChatSocket,
    console: Console,
    indicator: Box<dyn StatusIndicator>,
    uptime: Uptime,
    poll_interval: Duration,
    display: W,
}

impl<W: Write> Node<W> {
    /// Binds the configured address and builds the node
    pub fn new(config: &Config, console: Console, display: W) -> Result<Self> {
        let socket = ChatSocket::bind(config.network.bind_addr(), config.network.broadcast_addr())?;
        Self::with_socket(config, socket, console, display)
    }

    /// Builds the node around an already bound socket
    pub fn with_socket(
        config: &Config,
        socket: ChatSocket,
        console: Console,
        display: W,
    ) -> Result<Self> {
        let bound = socket.local_addr()?;
        let local_ip = match config.network.local_ip {
            Some(ip) => ip,
            None if !bound.ip().is_unspecified() => bound.ip(),
            None => detect_local_ip(config.network.coordinator_addr())?,
        };
        let local_addr = SocketAddr::new(local_ip, bound.port());

        let (outbox, effects) = Outbox::channel();
        let state = ProtocolState::new(config, local_addr, outbox);
        info!(
            role = %config.role,
            local = %local_addr,
            broadcast = %socket.broadcast_addr(),
            "Node ready"
        );

        Ok(Node {
            state,
            effects,
            socket,
            console,
            indicator: Box::new(LogIndicator::default()),
            uptime: Uptime::start(),
            poll_interval: config.timing.poll_interval,
            display,
        })
    }

    /// Replaces the busy indicator
    pub fn with_indicator(mut self, indicator: Box<dyn StatusIndicator>) -> Self {
        self.indicator = indicator;
        self
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn display(&self) -> &W {
        &self.display
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Performs the role's startup actions
    pub async fn start(&mut self) {
        self.state.start(self.uptime.elapsed());
        self.flush().await;
    }

    /// One loop iteration: a console line, a datagram, the timers, then the
    /// queued effects.
    pub async fn step(&mut self) {
        if let Some(line) = self.console.try_next_line() {
            self.state.submit_local(&line, self.uptime.elapsed());
        }

        match self.socket.try_recv() {
            Ok(Some(inbound)) => self.state.handle_inbound(inbound, self.uptime.elapsed()),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Receive failed"),
        }

        self.state.tick(self.uptime.elapsed());
        self.flush().await;
    }

    /// Runs until Ctrl-C
    pub async fn run(&mut self) -> Result<()> {
        self.start().await;

        let mut poll = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = poll.tick() => self.step().await,
                res = &mut shutdown => {
                    res?;
                    info!(state = ?self.state.state_info(), "Shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn flush(&mut self) {
        while let Ok(effect) = self.effects.try_recv() {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Unicast { to, frame } => {
                if let Err(e) = self.socket.send_frame(frame, to).await {
                    warn!(error = %e, "Send failed");
                }
            }
            Effect::Broadcast(frame) => {
                if let Err(e) = self.socket.broadcast_frame(frame).await {
                    warn!(error = %e, "Broadcast failed");
                }
                self.indicator.toggle_busy();
            }
            Effect::Pause(duration) => tokio::time::sleep(duration).await,
            Effect::Display(line) => {
                if let Err(e) = writeln!(self.display, "{}", line) {
                    warn!(error = %e, "Console write failed");
                }
            }
        }
    }
}
