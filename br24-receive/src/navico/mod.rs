//! Receive thread for one Navico BR24, 3G or 4G radar.
//!
//! The thread owns up to three sockets:
//!
//! ```text
//!   shutdown (loopback) ──┐
//!   report  (multicast) ──┼──► wait ≤ 250 ms ──► frame / report / idle
//!   data    (multicast) ──┘
//! ```
//!
//! The report socket is opened on one interface after the other until a
//! radar answers. Only then is the data socket opened. Watchdog counters
//! close everything again when the radar goes quiet.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::sleep;

use br24_core::protocol::degrees_to_raw;
use br24_core::protocol::spoke::MAX_FRAME_SIZE;
use br24_core::RadarOperatingState;

use crate::network::{
    create_shutdown_pair, create_udp_multicast_listen, recv_buf_from_opt, InterfaceCursor,
    InterfaceSource, SystemInterfaces,
};
use crate::radar::{
    now_ms, RadarError, RadarHost, RadarId, ReceiveSettings, SharedRadarState, StatusText,
};

mod data;
mod report;
mod watchdog;

use data::{FrameContext, FrameProcessor};
use report::ReportProcessor;
use watchdog::{Watchdog, MILLIS_PER_SELECT};

const REPORT_BUFFER_SIZE: usize = 2048;

/// Handle to a running receive thread
pub struct NavicoReceive {
    key: String,
    state: SharedRadarState,
    status: StatusText,
    shutdown_tx: std::net::UdpSocket,
    exited: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NavicoReceive {
    /// Start receiving for radar `id` on the interfaces of this machine
    pub fn start(
        id: RadarId,
        settings: ReceiveSettings,
        host: Arc<dyn RadarHost>,
    ) -> Result<NavicoReceive, RadarError> {
        let interfaces = Box::new(SystemInterfaces::new(settings.interface.clone()));
        Self::start_with_interfaces(id, settings, host, interfaces)
    }

    pub fn start_with_interfaces(
        id: RadarId,
        settings: ReceiveSettings,
        host: Arc<dyn RadarHost>,
        interfaces: Box<dyn InterfaceSource>,
    ) -> Result<NavicoReceive, RadarError> {
        let key = id.to_string();
        let (shutdown_tx, shutdown_rx) = create_shutdown_pair()?;

        let state = SharedRadarState::new();
        let status = StatusText::default();
        let exited = Arc::new(AtomicBool::new(false));

        let receive_loop = ReceiveLoop::new(
            id,
            settings,
            host,
            interfaces,
            state.clone(),
            status.clone(),
            exited.clone(),
        );

        let thread = std::thread::Builder::new()
            .name(format!("{} receive", key))
            .spawn(move || receive_loop.run(shutdown_rx))
            .map_err(RadarError::ThreadSpawn)?;
        log::debug!("{}: receive thread started", key);

        Ok(NavicoReceive {
            key,
            state,
            status,
            shutdown_tx,
            exited,
            thread: Some(thread),
        })
    }

    /// Ask the thread to stop. Does not wait.
    pub fn shutdown(&self) {
        match self.shutdown_tx.send(b"!") {
            Ok(n) if n > 0 => {
                log::debug!("{}: requested receive thread to stop", self.key);
            }
            _ => {
                log::info!("{}: receive thread will take long time to stop", self.key);
            }
        }
    }

    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Block until the thread has exited, or fail after `timeout`
    pub fn wait_exited(&mut self, timeout: Duration) -> Result<(), RadarError> {
        let deadline = Instant::now() + timeout;
        while !self.is_exited() {
            if Instant::now() >= deadline {
                return Err(RadarError::Shutdown);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("{}: receive thread panicked", self.key);
            }
        }
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> SharedRadarState {
        self.state.clone()
    }

    pub fn status(&self) -> String {
        self.status.get()
    }
}

impl Drop for NavicoReceive {
    fn drop(&mut self) {
        if !self.is_exited() {
            self.shutdown();
        }
    }
}

struct ReceiveBuffers {
    shutdown: [u8; 16],
    data: Vec<u8>,
    report: Vec<u8>,
}

impl Default for ReceiveBuffers {
    fn default() -> Self {
        ReceiveBuffers {
            shutdown: [0u8; 16],
            data: Vec::with_capacity(MAX_FRAME_SIZE),
            report: Vec::with_capacity(REPORT_BUFFER_SIZE),
        }
    }
}

/// State owned by the receive thread
struct ReceiveLoop {
    key: String,
    id: RadarId,
    settings: ReceiveSettings,
    host: Arc<dyn RadarHost>,
    state: SharedRadarState,
    status: StatusText,
    exited: Arc<AtomicBool>,
    cursor: InterfaceCursor,
    report_socket: Option<UdpSocket>,
    data_socket: Option<UdpSocket>,
    radar_addr: Option<SocketAddrV4>,
    watchdog: Watchdog,
    frames: FrameProcessor,
    reports: ReportProcessor,
}

impl ReceiveLoop {
    fn new(
        id: RadarId,
        settings: ReceiveSettings,
        host: Arc<dyn RadarHost>,
        interfaces: Box<dyn InterfaceSource>,
        state: SharedRadarState,
        status: StatusText,
        exited: Arc<AtomicBool>,
    ) -> ReceiveLoop {
        let key = id.to_string();
        ReceiveLoop {
            frames: FrameProcessor::new(&key),
            reports: ReportProcessor::new(&key),
            key,
            id,
            settings,
            host,
            state,
            status,
            exited,
            cursor: InterfaceCursor::new(interfaces),
            report_socket: None,
            data_socket: None,
            radar_addr: None,
            watchdog: Watchdog::default(),
        }
    }

    fn run(mut self, shutdown_rx: std::net::UdpSocket) {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.receive(shutdown_rx)),
            Err(e) => log::error!("{}: cannot create runtime: {}", self.key, e),
        }
        self.exited.store(true, Ordering::Release);
    }

    async fn receive(&mut self, shutdown_rx: std::net::UdpSocket) {
        log::debug!("{}: receive thread starting", self.key);

        match UdpSocket::from_std(shutdown_rx) {
            Ok(shutdown) => self.receive_loop(shutdown).await,
            Err(e) => log::error!("{}: cannot use shutdown socket: {}", self.key, e),
        }

        self.close();
        log::debug!("{}: receive thread stopping", self.key);
    }

    async fn receive_loop(&mut self, shutdown: UdpSocket) {
        let mut buffers = ReceiveBuffers::default();
        while self.receive_once(&shutdown, &mut buffers).await {}
    }

    /// Open whichever sockets the loop should have right now
    fn open_sockets(&mut self) {
        if self.report_socket.is_none() {
            self.report_socket = self.pick_next_interface();
            if self.report_socket.is_some() {
                self.watchdog.reset();
            }
        }
        if self.radar_addr.is_some() {
            // only now, a radar answered on this interface
            if self.data_socket.is_none() {
                self.data_socket = self.open_data_socket();
            }
        } else if self.data_socket.take().is_some() {
            log::debug!("{}: closed data socket", self.key);
        }
    }

    /// One pass of the loop. Returns false once asked to stop.
    async fn receive_once(&mut self, shutdown: &UdpSocket, buffers: &mut ReceiveBuffers) -> bool {
        self.open_sockets();

        tokio::select! {
            r = shutdown.recv(&mut buffers.shutdown) => {
                match r {
                    Ok(n) if n > 0 => {
                        log::debug!("{}: received stop instruction", self.key);
                        return false;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("{}: shutdown socket failed: {}", self.key, e);
                        return false;
                    }
                }
            },
            r = recv_buf_from_opt(self.data_socket.as_ref(), &mut buffers.data) => {
                match r {
                    Ok((len, _)) if len > 0 => {
                        self.process_frame(&buffers.data);
                        self.watchdog.data_received();
                    }
                    Ok(_) => {
                        log::error!("{}: illegal frame", self.key);
                        self.data_socket = None;
                    }
                    Err(e) => {
                        log::error!("{}: illegal frame: {}", self.key, e);
                        self.data_socket = None;
                    }
                }
                buffers.data.clear();
            },
            r = recv_buf_from_opt(self.report_socket.as_ref(), &mut buffers.report) => {
                match r {
                    Ok((len, SocketAddr::V4(from))) if len > 0 => {
                        if self.process_report(&buffers.report, from) {
                            if self.radar_addr.is_none() {
                                self.detected_radar(from);
                            }
                            self.watchdog.report_accepted();
                        }
                    }
                    Ok((_, from)) => {
                        log::error!("{}: illegal report from {}", self.key, from);
                        self.report_socket = None;
                    }
                    Err(e) => {
                        log::error!("{}: illegal report: {}", self.key, e);
                        self.report_socket = None;
                    }
                }
                buffers.report.clear();
            },
            _ = sleep(Duration::from_millis(MILLIS_PER_SELECT)) => {
                self.idle();
            },
        }

        if self.report_socket.is_none() && self.data_socket.take().is_some() {
            log::debug!("{}: report socket closed, closed data socket", self.key);
        }
        true
    }

    fn set_status(&self, status: String) {
        self.host.set_status(&status);
        self.status.set(status);
    }

    fn pick_next_interface(&mut self) -> Option<UdpSocket> {
        match self.cursor.pick_next() {
            Ok(nic) => self.open_report_socket(nic),
            Err(e) => {
                log::trace!("{}: no interface to scan: {}", self.key, e);
                None
            }
        }
    }

    fn open_report_socket(&self, nic: Ipv4Addr) -> Option<UdpSocket> {
        let addr = self.id.report_addr();
        match create_udp_multicast_listen(&addr, &nic) {
            Ok(sock) => {
                log::debug!(
                    "{}: scanning interface {} for data from {}",
                    self.key,
                    nic,
                    addr
                );
                self.set_status(format!("{}: Scanning interface {}", self.key, nic));
                Some(sock)
            }
            Err(e) => {
                let error = format!("{}: Unable to listen on {} via {}: {}", self.key, addr, nic, e);
                log::warn!("{}", error);
                self.set_status(error);
                None
            }
        }
    }

    fn open_data_socket(&self) -> Option<UdpSocket> {
        let nic = self.cursor.current()?;
        let addr = self.id.data_addr();
        match create_udp_multicast_listen(&addr, &nic) {
            Ok(sock) => {
                log::debug!("{}: listening for data on {} via {}", self.key, addr, nic);
                Some(sock)
            }
            Err(e) => {
                let error = format!("{}: Unable to listen on {} via {}: {}", self.key, addr, nic, e);
                log::warn!("{}", error);
                self.set_status(error);
                None
            }
        }
    }

    fn process_frame(&mut self, data: &[u8]) {
        let ctx = FrameContext {
            now_ms: now_ms(),
            position: self.host.radar_position(),
            heading_raw: degrees_to_raw(self.host.heading_true()),
            ignore_radar_heading: self.settings.ignore_radar_heading,
            multi_sweep_filter: self.settings.multi_sweep_filter,
        };

        let heading = {
            let mut state = self.state.lock();
            self.frames.process_frame(data, &mut state, &ctx)
        };

        if let Some(heading) = heading {
            self.host.set_radar_heading(heading);
        }
    }

    /// Returns true when the datagram was a radar report
    fn process_report(&mut self, data: &[u8], from: SocketAddrV4) -> bool {
        let outcome = {
            let mut state = self.state.lock();
            self.reports.process_report(data, from, &mut state, now_ms())
        };

        if let Some(status) = outcome.status {
            self.set_status(status);
        }
        if let Some(build_info) = outcome.build_info {
            self.host.set_build_info(&build_info);
        }
        outcome.accepted
    }

    fn detected_radar(&mut self, from: SocketAddrV4) {
        let nic = self.cursor.current().unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.host.detected_radar(nic, from);
        self.radar_addr = Some(from);

        let mut state = self.state.lock();
        if state.operating.get() == RadarOperatingState::Off {
            log::info!("{}: detected at {}", self.key, from);
            state.operating.update(RadarOperatingState::Standby, now_ms());
        }
    }

    /// A wait passed without any packet
    fn idle(&mut self) {
        let expired = self.watchdog.idle();

        if expired.radar && self.report_socket.is_some() {
            log::info!("{}: lost radar at {:?}", self.key, self.radar_addr);
            self.report_socket = None;
            self.state
                .lock()
                .operating
                .update(RadarOperatingState::Off, now_ms());
            self.cursor.clear();
            self.radar_addr = None;
        }

        if expired.spokes {
            self.state.lock().reset_image();
        }
    }

    fn close(&mut self) {
        self.data_socket = None;
        self.report_socket = None;
        self.cursor.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::tests::FixedInterfaces;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        detected: Mutex<Vec<(Ipv4Addr, SocketAddrV4)>>,
        headings: Mutex<Vec<Option<(f64, bool)>>>,
        statuses: Mutex<Vec<String>>,
    }

    impl RadarHost for RecordingHost {
        fn radar_position(&self) -> Option<(f64, f64)> {
            None
        }

        fn heading_true(&self) -> f64 {
            0.0
        }

        fn set_radar_heading(&self, heading: Option<(f64, bool)>) {
            self.headings.lock().unwrap().push(heading);
        }

        fn detected_radar(&self, interface: Ipv4Addr, radar: SocketAddrV4) {
            self.detected.lock().unwrap().push((interface, radar));
        }

        fn set_build_info(&self, _info: &str) {}

        fn set_status(&self, status: &str) {
            self.statuses.lock().unwrap().push(status.to_string());
        }
    }

    fn radar() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(169, 254, 1, 1), 6679)
    }

    fn receive_loop(host: Arc<RecordingHost>) -> ReceiveLoop {
        ReceiveLoop::new(
            RadarId::A,
            ReceiveSettings::default(),
            host,
            Box::new(FixedInterfaces::empty()),
            SharedRadarState::new(),
            StatusText::default(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[test]
    fn test_shutdown_sets_exited() {
        let host = Arc::new(RecordingHost::default());
        let mut receiver = NavicoReceive::start_with_interfaces(
            RadarId::A,
            ReceiveSettings::default(),
            host,
            Box::new(FixedInterfaces::empty()),
        )
        .unwrap();
        assert_eq!(receiver.key(), "Radar A");

        // let the thread settle into its wait
        std::thread::sleep(Duration::from_millis(50));
        assert!(!receiver.is_exited());

        let start = Instant::now();
        receiver.shutdown();
        receiver.wait_exited(Duration::from_secs(5)).unwrap();
        assert!(receiver.is_exited());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(
            receiver.state().snapshot().operating.get(),
            RadarOperatingState::Off
        );
    }

    #[tokio::test]
    async fn test_detection_and_presence_timeout() {
        let host = Arc::new(RecordingHost::default());
        let mut rl = receive_loop(host.clone());

        rl.report_socket = Some(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        rl.detected_radar(radar());
        rl.watchdog.report_accepted();

        assert_eq!(rl.radar_addr, Some(radar()));
        assert_eq!(
            host.detected.lock().unwrap().as_slice(),
            &[(Ipv4Addr::UNSPECIFIED, radar())]
        );
        assert_eq!(
            rl.state.snapshot().operating.get(),
            RadarOperatingState::Standby
        );

        // 15 seconds of silence
        for _ in 0..60 {
            rl.idle();
        }
        assert!(rl.report_socket.is_some());
        for _ in 0..9 {
            rl.idle();
        }
        assert!(rl.report_socket.is_none());
        assert_eq!(rl.radar_addr, None);
        assert_eq!(rl.cursor.current(), None);
        assert_eq!(rl.state.snapshot().operating.get(), RadarOperatingState::Off);
    }

    #[test]
    fn test_detection_keeps_transmit() {
        let host = Arc::new(RecordingHost::default());
        let mut rl = receive_loop(host);
        rl.state
            .lock()
            .operating
            .update(RadarOperatingState::Transmit, 0);
        rl.detected_radar(radar());
        assert_eq!(
            rl.state.snapshot().operating.get(),
            RadarOperatingState::Transmit
        );
    }

    #[test]
    fn test_report_publishes_status_outside_lock() {
        let host = Arc::new(RecordingHost::default());
        let mut rl = receive_loop(host.clone());

        let mut data = vec![0x01, 0xC4, 0x02];
        data.resize(18, 0);
        assert!(rl.process_report(&data, radar()));
        assert_eq!(rl.status.get(), "Radar A IP 169.254.1.1:6679 Transmit");
        assert_eq!(
            host.statuses.lock().unwrap().as_slice(),
            &["Radar A IP 169.254.1.1:6679 Transmit".to_string()]
        );

        assert!(!rl.process_report(&[0x01, 0x00, 0x00], radar()));
    }

    /// A BR24 frame with a single line at angle 0, true heading 90°
    fn one_line_frame() -> Vec<u8> {
        use br24_core::protocol::spoke::{BR24_MARK, FRAME_HEADER_SIZE};

        let mut data = vec![0u8; FRAME_HEADER_SIZE];
        data.extend_from_slice(&[0x18, 0x02, 0x00, 0x00]);
        data.extend_from_slice(&BR24_MARK);
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0x4400u16.to_le_bytes());
        data.resize(FRAME_HEADER_SIZE + 536, 0);
        data
    }

    #[test]
    fn test_frame_publishes_radar_heading() {
        let host = Arc::new(RecordingHost::default());
        let mut rl = receive_loop(host.clone());

        rl.process_frame(&one_line_frame());
        assert_eq!(
            host.headings.lock().unwrap().as_slice(),
            &[Some((90.0, true))]
        );
        assert_eq!(rl.state.snapshot().statistics.spokes, 1);
    }

    #[test]
    fn test_spoke_timeout_resets_image() {
        let host = Arc::new(RecordingHost::default());
        let mut rl = receive_loop(host);
        rl.state.lock().image.process_spoke(
            1,
            &[1, 2, 3],
            br24_core::SpokeMeta::default(),
            false,
        );
        rl.watchdog.data_received();

        for _ in 0..13 {
            rl.idle();
        }
        assert_eq!(rl.state.snapshot().image.spoke_count(), 1);
        rl.idle();
        assert_eq!(rl.state.snapshot().image.spoke_count(), 0);
    }

    fn multicast_sender() -> std::net::UdpSocket {
        let socket =
            socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, None).unwrap();
        socket.set_multicast_if_v4(&Ipv4Addr::LOCALHOST).unwrap();
        socket.set_multicast_loop_v4(true).unwrap();
        socket
            .bind(&SocketAddr::from((Ipv4Addr::LOCALHOST, 0)).into())
            .unwrap();
        socket.into()
    }

    #[test]
    fn test_loopback_sockets() {
        use std::sync::atomic::AtomicUsize;

        let host = Arc::new(RecordingHost::default());
        let exited = Arc::new(AtomicBool::new(false));
        let mut rl = ReceiveLoop::new(
            RadarId::A,
            ReceiveSettings::default(),
            host.clone(),
            Box::new(FixedInterfaces {
                addresses: vec![Ipv4Addr::LOCALHOST],
                enumerations: Arc::new(AtomicUsize::new(0)),
            }),
            SharedRadarState::new(),
            StatusText::default(),
            exited.clone(),
        );
        let sender = multicast_sender();
        let report_addr = RadarId::A.report_addr();
        let data_addr = RadarId::A.data_addr();

        let mut report = vec![0x01, 0xC4, 0x02];
        report.resize(18, 0);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (_quiet_tx, quiet_rx) = create_shutdown_pair().unwrap();

        runtime.block_on(async {
            let shutdown = UdpSocket::from_std(quiet_rx).unwrap();
            let mut buffers = ReceiveBuffers::default();

            // scanning: no data socket before a radar answers
            rl.open_sockets();
            assert!(rl.report_socket.is_some());
            assert!(rl.data_socket.is_none());
            assert_eq!(rl.status.get(), "Radar A: Scanning interface 127.0.0.1");

            sender.send_to(&report, report_addr).unwrap();
            assert!(rl.receive_once(&shutdown, &mut buffers).await);
            let from = rl.radar_addr.unwrap();
            assert_eq!(
                host.detected.lock().unwrap().as_slice(),
                &[(Ipv4Addr::LOCALHOST, from)]
            );
            assert_eq!(
                rl.status.get(),
                format!("Radar A IP {} Transmit", from)
            );
            assert!(rl.data_socket.is_none());

            rl.open_sockets();
            assert!(rl.data_socket.is_some());

            sender.send_to(&one_line_frame(), data_addr).unwrap();
            assert!(rl.receive_once(&shutdown, &mut buffers).await);
            let state = rl.state.snapshot();
            assert_eq!(state.statistics.packets, 1);
            assert_eq!(state.statistics.spokes, 1);
            assert_eq!(state.operating.get(), RadarOperatingState::Transmit);
            assert_eq!(
                host.headings.lock().unwrap().as_slice(),
                &[Some((90.0, true))]
            );

            // an empty datagram closes the data socket, the next pass reopens it
            sender.send_to(&[], data_addr).unwrap();
            assert!(rl.receive_once(&shutdown, &mut buffers).await);
            assert!(rl.data_socket.is_none());
            assert!(rl.report_socket.is_some());
            rl.open_sockets();
            assert!(rl.data_socket.is_some());

            // a steady stream of frames does not hold back a report
            let frame = one_line_frame();
            for _ in 0..60 {
                sender.send_to(&frame, data_addr).unwrap();
            }
            report[2] = 0x01;
            sender.send_to(&report, report_addr).unwrap();
            let standby = format!("Radar A IP {} Standby", from);
            let mut passes = 0;
            while rl.status.get() != standby && passes < 25 {
                assert!(rl.receive_once(&shutdown, &mut buffers).await);
                passes += 1;
            }
            assert_eq!(rl.status.get(), standby);
            assert!(rl.state.snapshot().statistics.packets < 61);
            // drop the frames still queued
            rl.data_socket = None;
            rl.open_sockets();

            // radar goes quiet: losing the report socket takes the data socket along
            rl.watchdog.report_accepted();
            for _ in 0..68 {
                rl.idle();
            }
            assert!(rl.report_socket.is_some());
            assert!(rl.receive_once(&shutdown, &mut buffers).await);
            assert!(rl.report_socket.is_none());
            assert!(rl.data_socket.is_none());
            assert_eq!(rl.radar_addr, None);
            assert_eq!(rl.state.snapshot().operating.get(), RadarOperatingState::Off);
        });

        // a stop request releases everything, even with the report socket reopened
        let (stop_tx, stop_rx) = create_shutdown_pair().unwrap();
        stop_tx.send(b"!").unwrap();
        runtime.block_on(rl.receive(stop_rx));
        assert!(rl.report_socket.is_none());
        assert!(rl.data_socket.is_none());
        assert_eq!(rl.cursor.current(), None);
        drop(runtime);

        let (stop_tx, stop_rx) = create_shutdown_pair().unwrap();
        stop_tx.send(b"!").unwrap();
        rl.run(stop_rx);
        assert!(exited.load(Ordering::Acquire));
    }
}
